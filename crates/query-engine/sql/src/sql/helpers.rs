//! Helpers for building sql::ast types in certain shapes and patterns.

use super::ast::*;
use super::string::DbValue;

// Empty clauses //

/// An empty `WITH` clause.
pub fn empty_with() -> With {
    With {
        common_table_expressions: vec![],
    }
}

/// An empty `WHERE` clause.
pub fn empty_where() -> Expression {
    true_expr()
}

/// An empty `GROUP BY` clause.
pub fn empty_group_by() -> GroupBy {
    GroupBy { elements: vec![] }
}

/// An empty `HAVING` clause.
pub fn empty_having() -> Having {
    Having(true_expr())
}

/// An empty `ORDER BY` clause.
pub fn empty_order_by() -> OrderBy {
    OrderBy { elements: vec![] }
}

/// Empty `OFFSET` and `FETCH` clauses.
pub fn empty_limit() -> Limit {
    Limit {
        offset: None,
        fetch: None,
    }
}

/// A `true` expression.
pub fn true_expr() -> Expression {
    Expression::Value(Value::Bool(true))
}

/// A `false` expression.
pub fn false_expr() -> Expression {
    Expression::Value(Value::Bool(false))
}

/// Combine predicates with `AND`, dropping trivially true ones.
pub fn conjunction(predicates: Vec<Expression>) -> Expression {
    predicates
        .into_iter()
        .filter(|predicate| *predicate != true_expr())
        .reduce(|left, right| Expression::And {
            left: Box::new(left),
            right: Box::new(right),
        })
        .unwrap_or_else(true_expr)
}

/// `left = right`
pub fn equals(left: Expression, right: Expression) -> Expression {
    Expression::BinaryOperation {
        left: Box::new(left),
        operator: BinaryOperator::Equal,
        right: Box::new(right),
    }
}

// Aliasing //

/// Create table aliases using this function so we build everything in one place.
pub fn make_table_alias(name: &str) -> TableAlias {
    TableAlias { name: name.into() }
}

/// Create column aliases using this function so we build everything in one place.
pub fn make_column_alias(name: String) -> ColumnAlias {
    ColumnAlias { name }
}

/// `[table].[column]`
pub fn column(table: &TableAlias, name: &str) -> Expression {
    Expression::ColumnReference(ColumnReference::TableColumn {
        table: table.clone(),
        name: ColumnName(name.to_string()),
    })
}

/// An unqualified reference to an output column.
pub fn aliased_column(name: &str) -> Expression {
    Expression::ColumnReference(ColumnReference::AliasedColumn {
        column: make_column_alias(name.to_string()),
    })
}

/// `@name`
pub fn parameter(name: String, value: DbValue) -> Expression {
    Expression::Parameter(Parameter { name, value })
}

// FROMs //

/// `[table] AS [alias] WITH (NOLOCK)`
pub fn table_from(table: &str, alias: &TableAlias) -> From {
    From::Table {
        reference: TableReference::DBTable(TableName(table.to_string())),
        alias: alias.clone(),
        hint: Some(TableHint::NoLock),
    }
}

// SELECTs //

/// Build a simple select with a select list and the rest are empty.
pub fn simple_select(select_list: Vec<(ColumnAlias, Expression)>) -> Select {
    Select {
        with: empty_with(),
        select_list: SelectList::SelectList(select_list),
        from: None,
        joins: vec![],
        where_: Where(empty_where()),
        group_by: empty_group_by(),
        having: empty_having(),
        order_by: empty_order_by(),
        limit: empty_limit(),
    }
}

/// Build a simple select *
pub fn star_select(from: From) -> Select {
    Select {
        with: empty_with(),
        select_list: SelectList::SelectStar,
        from: Some(from),
        joins: vec![],
        where_: Where(empty_where()),
        group_by: empty_group_by(),
        having: empty_having(),
        order_by: empty_order_by(),
        limit: empty_limit(),
    }
}
