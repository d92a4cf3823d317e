//! Grouped reads.
//!
//! When any batch reads an aggregate the whole tree becomes one grouped
//! query over inner joins, ranked with `ROW_NUMBER()` inside a common table
//! expression and windowed over the rank outside it. Columns restricted by
//! extra criteria are carried out of the expression as `SEC_{alias}` and
//! filtered on the outside, after grouping.

use query_engine_sql::sql::ast::{
    ColumnAlias, CommonTableExpression, Expression, From, GroupBy, Having, InnerJoin, Join,
    Limit, OrderBy, OrderByDirection, OrderByElement, Select, TableReference, Where, With,
};
use query_engine_sql::sql::helpers::{
    aliased_column, column, conjunction, equals, false_expr, make_column_alias, make_table_alias,
    simple_select, star_select, table_from,
};

use super::batch::BatchItem;
use super::fields::read_expression;
use super::filtering::{filter_predicates, having_predicates, security_criteria};

/// The rank column every grouped row carries.
pub const ROW_NUMBER_COLUMN: &str = "ROW_NUM";

/// Drop the fields that were only selected to link rows; grouping on them
/// would split the groups.
pub fn strip_identifiers(batch: &mut BatchItem) {
    batch.fields.retain(|field| !field.identifier_only);
    for child in &mut batch.children {
        strip_identifiers(child);
    }
}

pub fn security_alias(batch: &BatchItem) -> String {
    format!("SEC_{}", batch.alias.name)
}

/// Everything the grouped query collects from the batches.
#[derive(Default)]
struct Parts {
    select_list: Vec<(ColumnAlias, Expression)>,
    security_columns: Vec<(ColumnAlias, Expression)>,
    joins: Vec<Join>,
    where_: Vec<Expression>,
    group_by: Vec<Expression>,
    having: Vec<Expression>,
    rank_order: Vec<OrderByElement>,
    outer_where: Vec<Expression>,
}

impl Parts {
    fn group_on(&mut self, expression: Expression) {
        if !self.group_by.contains(&expression) {
            self.group_by.push(expression);
        }
    }

    fn collect(&mut self, batch: &BatchItem) {
        for field in batch.output_fields() {
            if self
                .select_list
                .iter()
                .any(|(alias, _)| alias.name == field.output_alias)
            {
                continue;
            }
            let expression = read_expression(&batch.alias, &field.descriptor);
            if !field.descriptor.is_aggregation {
                self.group_on(expression.clone());
            }
            self.select_list
                .push((make_column_alias(field.output_alias.clone()), expression));
        }

        self.where_.extend(filter_predicates(batch));
        self.having.extend(having_predicates(batch));

        if let Some((restricted, value)) = security_criteria(batch) {
            let alias = security_alias(batch);
            self.security_columns
                .push((make_column_alias(alias.clone()), restricted.clone()));
            self.group_on(restricted);
            self.outer_where.push(equals(aliased_column(&alias), value));
        }

        self.collect_rank_order(batch);

        for child in &batch.children {
            if let Some(join) = &child.join {
                let parent_key = column(&batch.alias, join.local.column());
                let child_key = column(&child.alias, join.foreign.column());
                let target = table_from(&child.entity.table, &child.alias);
                match &join.join_table {
                    None => self.joins.push(Join::InnerJoin(InnerJoin {
                        source: target,
                        on: equals(parent_key, child_key),
                    })),
                    Some(join_table) => {
                        self.joins.push(Join::InnerJoin(InnerJoin {
                            source: table_from(&join_table.table, &join_table.alias),
                            on: equals(
                                parent_key,
                                column(&join_table.alias, &join_table.local_join_column),
                            ),
                        }));
                        self.joins.push(Join::InnerJoin(InnerJoin {
                            source: target,
                            on: equals(
                                column(&join_table.alias, &join_table.foreign_join_column),
                                child_key,
                            ),
                        }));
                    }
                }
            }
            self.collect(child);
        }
    }

    /// The requested order, or the first grouped field descending.
    fn collect_rank_order(&mut self, batch: &BatchItem) {
        if batch.explicit_order {
            for element in &batch.order_by {
                let target = read_expression(&batch.alias, &element.field);
                if !element.field.is_aggregation {
                    self.group_on(target.clone());
                }
                self.rank_order.push(OrderByElement {
                    target,
                    direction: direction(element.descending),
                });
            }
        } else if let Some(field) = batch
            .output_fields()
            .find(|field| !field.descriptor.is_aggregation)
        {
            self.rank_order.push(OrderByElement {
                target: read_expression(&batch.alias, &field.descriptor),
                direction: OrderByDirection::Desc,
            });
        }
    }
}

fn direction(descending: bool) -> OrderByDirection {
    if descending {
        OrderByDirection::Desc
    } else {
        OrderByDirection::Asc
    }
}

/// Build the grouped, ranked query for a batch tree.
pub fn build_select(root: &BatchItem) -> Select {
    let mut parts = Parts::default();
    parts.collect(root);

    let mut select_list = vec![(
        make_column_alias(ROW_NUMBER_COLUMN.to_string()),
        Expression::RowNumber(OrderBy {
            elements: parts.rank_order,
        }),
    )];
    select_list.extend(parts.select_list);
    select_list.extend(parts.security_columns);

    let mut inner = simple_select(select_list);
    inner.from = Some(table_from(&root.entity.table, &root.alias));
    inner.joins = parts.joins;
    inner.where_ = Where(conjunction(parts.where_));
    inner.group_by = GroupBy {
        elements: parts.group_by,
    };
    inner.having = Having(conjunction(parts.having));

    let cte = make_table_alias(&format!("cte_{}", uuid::Uuid::new_v4().simple()));
    let mut outer = star_select(From::Reference(TableReference::AliasedTable(cte.clone())));
    outer.with = With {
        common_table_expressions: vec![CommonTableExpression {
            alias: cte,
            select: Box::new(inner),
        }],
    };

    let mut outer_where = parts.outer_where;
    if root.count == Some(0) {
        outer_where.push(false_expr());
    } else {
        outer.order_by = OrderBy {
            elements: vec![OrderByElement {
                target: aliased_column(ROW_NUMBER_COLUMN),
                direction: OrderByDirection::Asc,
            }],
        };
        if root.is_paginated() {
            outer.limit = Limit {
                offset: Some(root.offset.unwrap_or(0)),
                fetch: root.count,
            };
        }
    }
    outer.where_ = Where(conjunction(outer_where));
    outer
}
