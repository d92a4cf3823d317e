//! Plain reads: left joins from the root batch down to every leaf.
//!
//! A batch and its chain of only-children share one statement. A batch with
//! several children gives each child its own statement, repeating the joins
//! that lead to the parent, so rows do not multiply across sibling
//! collections. Every statement produces its own result set.

use query_engine_sql::sql::ast::{
    ColumnAlias, Expression, From, InnerJoin, Join, LeftOuterJoin, Limit, OrderBy,
    OrderByDirection, OrderByElement, OuterApply, Select, SelectList, Statements, Where,
};
use query_engine_sql::sql::helpers::{
    column, conjunction, equals, false_expr, make_column_alias, simple_select, star_select,
    table_from,
};

use super::batch::{BatchItem, JoinInfo};
use super::fields::read_expression;
use super::filtering::row_predicates;

/// Build the statements reading a batch tree.
pub fn build_statements(root: &BatchItem) -> Statements {
    let mut statements = vec![];
    build_chain(root, None, &mut statements);
    Statements(statements)
}

/// The tables joined so far by an enclosing statement, and the batch to join onto.
struct Anchor<'a> {
    from: From,
    joins: Vec<Join>,
    parent: &'a BatchItem,
}

fn build_chain<'a>(
    batch: &'a BatchItem,
    anchor: Option<Anchor<'a>>,
    statements: &mut Vec<Select>,
) {
    let mut chain = vec![batch];
    let mut last = batch;
    while let [only_child] = last.children.as_slice() {
        chain.push(only_child);
        last = only_child;
    }

    let (from, mut joins, mut parent) = match anchor {
        Some(Anchor {
            from,
            joins,
            parent,
        }) => (from, joins, Some(parent)),
        None => (root_source(batch), vec![], None),
    };

    let mut select_list = vec![];
    let mut order_by = vec![];

    for item in chain {
        if let Some(parent) = parent {
            joins.extend(join_child(parent, item));
            select_list.extend(foreign_key_column(parent, item));
        }
        select_list.extend(field_columns(item));
        order_by.extend(order_elements(item));
        parent = Some(item);
    }

    let mut select = simple_select(select_list);
    select.from = Some(from.clone());
    select.joins = joins.clone();
    select.order_by = OrderBy { elements: order_by };
    statements.push(select);

    if last.children.len() > 1 {
        for child in &last.children {
            let anchor = Anchor {
                from: from.clone(),
                joins: joins.clone(),
                parent: last,
            };
            build_chain(child, Some(anchor), statements);
        }
    }
}

fn field_columns(batch: &BatchItem) -> Vec<(ColumnAlias, Expression)> {
    batch
        .fields
        .iter()
        .map(|field| {
            (
                make_column_alias(field.output_alias.clone()),
                read_expression(&batch.alias, &field.descriptor),
            )
        })
        .collect()
}

/// The parent's join key, repeated next to the child's columns.
fn foreign_key_column(
    parent: &BatchItem,
    child: &BatchItem,
) -> Option<(ColumnAlias, Expression)> {
    let join = child.join.as_ref()?;
    let alias = child.foreign_key_alias(parent)?;
    Some((
        make_column_alias(alias),
        column(&parent.alias, join.local.column()),
    ))
}

/// Order on the expressions the fields are read through.
pub(super) fn order_elements(batch: &BatchItem) -> Vec<OrderByElement> {
    batch
        .order_by
        .iter()
        .map(|element| OrderByElement {
            target: read_expression(&batch.alias, &element.field),
            direction: if element.descending {
                OrderByDirection::Desc
            } else {
                OrderByDirection::Asc
            },
        })
        .collect()
}

/// The root table, or a derived table when the root is filtered or paginated.
pub(super) fn root_source(batch: &BatchItem) -> From {
    let predicates = row_predicates(batch);
    if batch.is_paginated() || !predicates.is_empty() {
        From::Select {
            select: Box::new(window_select(
                batch,
                SelectList::SelectStar,
                vec![],
                predicates,
            )),
            alias: batch.alias.clone(),
        }
    } else {
        table_from(&batch.entity.table, &batch.alias)
    }
}

/// `SELECT <list> FROM <table> <joins> WHERE <predicates>`, ordered and
/// windowed when the batch is paginated.
fn window_select(
    batch: &BatchItem,
    select_list: SelectList,
    joins: Vec<Join>,
    mut predicates: Vec<Expression>,
) -> Select {
    let mut select = star_select(table_from(&batch.entity.table, &batch.alias));
    select.select_list = select_list;
    select.joins = joins;
    if batch.count == Some(0) {
        predicates.push(false_expr());
    } else if batch.is_paginated() {
        select.order_by = OrderBy {
            elements: order_elements(batch),
        };
        select.limit = Limit {
            offset: Some(batch.offset.unwrap_or(0)),
            fetch: batch.count,
        };
    }
    select.where_ = Where(conjunction(predicates));
    select
}

fn join_child(parent: &BatchItem, child: &BatchItem) -> Vec<Join> {
    let Some(join) = &child.join else {
        return vec![];
    };
    let parent_key = column(&parent.alias, join.local.column());
    let child_key = column(&child.alias, join.foreign.column());
    let predicates = row_predicates(child);

    if child.is_paginated() {
        return vec![outer_apply(child, join, parent_key, child_key, predicates)];
    }

    let source = if predicates.is_empty() {
        table_from(&child.entity.table, &child.alias)
    } else {
        From::Select {
            select: Box::new(window_select(
                child,
                SelectList::SelectStar,
                vec![],
                predicates,
            )),
            alias: child.alias.clone(),
        }
    };

    match &join.join_table {
        None => vec![Join::LeftOuterJoin(LeftOuterJoin {
            source,
            on: equals(parent_key, child_key),
        })],
        Some(join_table) => vec![
            Join::LeftOuterJoin(LeftOuterJoin {
                source: table_from(&join_table.table, &join_table.alias),
                on: equals(
                    parent_key,
                    column(&join_table.alias, &join_table.local_join_column),
                ),
            }),
            Join::LeftOuterJoin(LeftOuterJoin {
                source,
                on: equals(
                    column(&join_table.alias, &join_table.foreign_join_column),
                    child_key,
                ),
            }),
        ],
    }
}

/// A window of children per parent row.
fn outer_apply(
    child: &BatchItem,
    join: &JoinInfo,
    parent_key: Expression,
    child_key: Expression,
    mut predicates: Vec<Expression>,
) -> Join {
    let select = match &join.join_table {
        None => {
            predicates.insert(0, equals(child_key, parent_key));
            window_select(child, SelectList::SelectStar, vec![], predicates)
        }
        Some(join_table) => {
            predicates.insert(
                0,
                equals(
                    column(&join_table.alias, &join_table.local_join_column),
                    parent_key,
                ),
            );
            let through = Join::InnerJoin(InnerJoin {
                source: table_from(&join_table.table, &join_table.alias),
                on: equals(
                    column(&join_table.alias, &join_table.foreign_join_column),
                    child_key,
                ),
            });
            window_select(
                child,
                SelectList::SelectStarFrom(child.alias.clone()),
                vec![through],
                predicates,
            )
        }
    };
    Join::OuterApply(OuterApply {
        select: Box::new(select),
        alias: child.alias.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::aliases::assign_aliases;
    use crate::translation::query::batch::build_batch;
    use crate::translation::helpers::Env;
    use crate::translation::query::tests::registry;
    use crate::translation::request::{Selection, Variables};
    use serde_json::json;

    fn statements(selection: &Selection) -> Vec<String> {
        let registry = registry();
        let variables = Variables::new();
        let env = Env::new(&registry, &variables);
        let entity = env.lookup_entity("ToDo").unwrap();
        let mut batch = build_batch(&env, &entity, selection).unwrap();
        assign_aliases(&mut batch).unwrap();
        build_statements(&batch)
            .0
            .iter()
            .map(|select| {
                let mut sql = query_engine_sql::sql::string::SQL::new();
                select.to_sql(&mut sql);
                sql.sql
            })
            .collect()
    }

    #[test]
    fn requested_primary_key_is_not_repeated() {
        let sql = statements(&Selection::new("toDos").field("id").field("text"));
        similar_asserts::assert_eq!(
            sql,
            vec![
                "SELECT [_].[Id] AS [__Id], IsNull([_].[Text], '') AS [__Text] \
                 FROM [ToDo] AS [_] WITH (NOLOCK) ORDER BY [_].[due_date] DESC"
                    .to_string()
            ]
        );
    }

    #[test]
    fn a_chain_of_children_shares_a_statement() {
        let sql = statements(
            &Selection::new("toDos")
                .field("text")
                .field(Selection::new("owner").field("name")),
        );
        similar_asserts::assert_eq!(
            sql,
            vec![
                "SELECT IsNull([_].[Text], '') AS [__Text], [_].[OwnerId] AS [__OwnerId], \
                 [_].[Id] AS [__Id], [_].[OwnerId] AS [FK___OwnerId], \
                 IsNull([a].[Name], '') AS [a_Name], [a].[Id] AS [a_Id] \
                 FROM [ToDo] AS [_] WITH (NOLOCK) \
                 LEFT JOIN (SELECT * FROM [Users] AS [a] WITH (NOLOCK) WHERE [a].[TenantId] = @a_Extra) AS [a] \
                 ON [_].[OwnerId] = [a].[Id] \
                 ORDER BY [_].[due_date] DESC, IsNull([a].[Name], '') DESC"
                    .to_string()
            ]
        );
    }

    #[test]
    fn siblings_get_a_statement_each() {
        let sql = statements(
            &Selection::new("toDos")
                .field("text")
                .field(Selection::new("tags").field("name"))
                .field(Selection::new("labels").field("title")),
        );
        assert_eq!(sql.len(), 3);
        assert!(sql[0].starts_with(
            "SELECT IsNull([_].[Text], '') AS [__Text], [_].[Id] AS [__Id] FROM [ToDo]"
        ));
        similar_asserts::assert_eq!(
            sql[1],
            "SELECT [_].[Id] AS [FK___Id], IsNull([a].[Name], '') AS [a_Name], [a].[Id] AS [a_Id] \
             FROM [ToDo] AS [_] WITH (NOLOCK) \
             LEFT JOIN [Tag] AS [a] WITH (NOLOCK) ON [_].[Id] = [a].[ToDoId] \
             ORDER BY [a].[Id] DESC"
        );
        similar_asserts::assert_eq!(
            sql[2],
            "SELECT [_].[Id] AS [FK___Id], IsNull([b].[Title], '') AS [b_Title], [b].[Id] AS [b_Id] \
             FROM [ToDo] AS [_] WITH (NOLOCK) \
             LEFT JOIN [ToDoLabel] AS [c] WITH (NOLOCK) ON [_].[Id] = [c].[ToDoId] \
             LEFT JOIN [Label] AS [b] WITH (NOLOCK) ON [c].[LabelId] = [b].[Id] \
             ORDER BY [b].[Id] DESC"
        );
    }

    #[test]
    fn filtered_roots_become_derived_tables() {
        let sql = statements(
            &Selection::new("toDos")
                .field("id")
                .argument("estimate", json!({ "gte": 5 }))
                .argument("_offset", json!(10))
                .argument("_fetchCount", json!(5)),
        );
        similar_asserts::assert_eq!(
            sql[0],
            "SELECT [_].[Id] AS [__Id] \
             FROM (SELECT * FROM [ToDo] AS [_] WITH (NOLOCK) WHERE [_].[Estimate] >= @__estimate \
             ORDER BY [_].[due_date] DESC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY) AS [_] \
             ORDER BY [_].[due_date] DESC"
        );
    }

    #[test]
    fn paginated_children_are_windowed_per_parent() {
        let sql = statements(
            &Selection::new("toDos").field("id").field(
                Selection::new("tags")
                    .field("name")
                    .argument("_fetchCount", json!(2)),
            ),
        );
        similar_asserts::assert_eq!(
            sql[0],
            "SELECT [_].[Id] AS [__Id], [_].[Id] AS [FK___Id], \
             IsNull([a].[Name], '') AS [a_Name], [a].[Id] AS [a_Id] \
             FROM [ToDo] AS [_] WITH (NOLOCK) \
             OUTER APPLY (SELECT * FROM [Tag] AS [a] WITH (NOLOCK) WHERE [a].[ToDoId] = [_].[Id] \
             ORDER BY [a].[Id] DESC OFFSET 0 ROWS FETCH NEXT 2 ROWS ONLY) AS [a] \
             ORDER BY [_].[due_date] DESC, [a].[Id] DESC"
        );
    }

    #[test]
    fn orders_on_the_expression_a_field_is_read_through() {
        let sql = statements(
            &Selection::new("toDos")
                .field("id")
                .argument("_orderBy", json!([{ "field": "text" }, { "field": "dueDate" }])),
        );
        similar_asserts::assert_eq!(
            sql[0],
            "SELECT [_].[Id] AS [__Id] FROM [ToDo] AS [_] WITH (NOLOCK) \
             ORDER BY IsNull([_].[Text], '') ASC, [_].[due_date] ASC"
        );
    }

    #[test]
    fn fetching_nothing_is_a_false_predicate() {
        let sql = statements(
            &Selection::new("toDos")
                .field("id")
                .argument("_fetchCount", json!(0)),
        );
        assert!(sql[0].contains("(SELECT * FROM [ToDo] AS [_] WITH (NOLOCK) WHERE 1 = 0) AS [_]"));
    }
}
