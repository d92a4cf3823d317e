//! Convert a SQL AST to a low-level SQL string.

use super::ast::*;
use super::helpers;
use super::string::*;

// Convert to SQL strings

impl Statements {
    /// Render every statement, terminated by `;`, one per line.
    pub fn to_sql(&self, sql: &mut SQL) {
        let Statements(statements) = self;
        for (index, statement) in statements.iter().enumerate() {
            statement.to_sql(sql);
            sql.append_syntax(";");
            if index < (statements.len() - 1) {
                sql.append_syntax("\n");
            }
        }
    }

    pub fn query_sql(&self) -> SQL {
        let mut sql = SQL::new();
        self.to_sql(&mut sql);
        sql
    }
}

impl With {
    pub fn to_sql(&self, sql: &mut SQL) {
        if !self.common_table_expressions.is_empty() {
            sql.append_syntax("WITH ");
            let ctes = &self.common_table_expressions;
            for (index, cte) in ctes.iter().enumerate() {
                cte.to_sql(sql);
                if index < (ctes.len() - 1) {
                    sql.append_syntax(", ");
                }
            }
            sql.append_syntax(" ");
        }
    }
}

impl CommonTableExpression {
    pub fn to_sql(&self, sql: &mut SQL) {
        self.alias.to_sql(sql);
        sql.append_syntax(" AS (");
        self.select.to_sql(sql);
        sql.append_syntax(")");
    }
}

impl SelectList {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            SelectList::SelectList(select_list) => {
                for (index, (col, expr)) in select_list.iter().enumerate() {
                    expr.to_sql(sql);
                    sql.append_syntax(" AS ");
                    col.to_sql(sql);
                    if index < (select_list.len() - 1) {
                        sql.append_syntax(", ");
                    }
                }
            }
            SelectList::SelectStar => {
                sql.append_syntax("*");
            }
            SelectList::SelectStarFrom(alias) => {
                alias.to_sql(sql);
                sql.append_syntax(".*");
            }
        }
    }
}

impl Select {
    pub fn to_sql(&self, sql: &mut SQL) {
        self.with.to_sql(sql);

        sql.append_syntax("SELECT ");

        self.select_list.to_sql(sql);

        if let Some(from) = &self.from {
            sql.append_syntax(" ");
            from.to_sql(sql);
        }

        for join in &self.joins {
            join.to_sql(sql);
        }

        self.where_.to_sql(sql);

        self.group_by.to_sql(sql);

        self.having.to_sql(sql);

        if !self.order_by.elements.is_empty() {
            sql.append_syntax(" ");
            self.order_by.to_sql(sql);
        }

        self.limit.to_sql(sql);
    }
}

impl From {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_syntax("FROM ");
        self.source_to_sql(sql);
    }

    /// The table or subquery without the `FROM` keyword, as used in joins.
    pub fn source_to_sql(&self, sql: &mut SQL) {
        match &self {
            From::Table {
                reference,
                alias,
                hint,
            } => {
                reference.to_sql(sql);
                sql.append_syntax(" AS ");
                alias.to_sql(sql);
                if let Some(hint) = hint {
                    hint.to_sql(sql);
                }
            }
            From::Select { select, alias } => {
                sql.append_syntax("(");
                select.to_sql(sql);
                sql.append_syntax(")");
                sql.append_syntax(" AS ");
                alias.to_sql(sql);
            }
            From::Reference(reference) => reference.to_sql(sql),
        }
    }
}

impl TableHint {
    pub fn to_sql(self, sql: &mut SQL) {
        match self {
            TableHint::NoLock => sql.append_syntax(" WITH (NOLOCK)"),
        }
    }
}

impl Join {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            Join::LeftOuterJoin(join) => {
                sql.append_syntax(" LEFT JOIN ");
                join.source.source_to_sql(sql);
                sql.append_syntax(" ON ");
                join.on.to_sql(sql);
            }
            Join::InnerJoin(join) => {
                sql.append_syntax(" JOIN ");
                join.source.source_to_sql(sql);
                sql.append_syntax(" ON ");
                join.on.to_sql(sql);
            }
            Join::OuterApply(join) => {
                sql.append_syntax(" OUTER APPLY (");
                join.select.to_sql(sql);
                sql.append_syntax(") AS ");
                join.alias.to_sql(sql);
            }
        }
    }
}

impl Where {
    pub fn to_sql(&self, sql: &mut SQL) {
        let Where(expression) = self;
        if *expression != helpers::true_expr() {
            sql.append_syntax(" WHERE ");
            expression.to_sql(sql);
        }
    }
}

impl GroupBy {
    pub fn to_sql(&self, sql: &mut SQL) {
        if !self.elements.is_empty() {
            sql.append_syntax(" GROUP BY ");
            for (index, element) in self.elements.iter().enumerate() {
                element.to_sql(sql);
                if index < (self.elements.len() - 1) {
                    sql.append_syntax(", ");
                }
            }
        }
    }
}

impl Having {
    pub fn to_sql(&self, sql: &mut SQL) {
        let Having(expression) = self;
        if *expression != helpers::true_expr() {
            sql.append_syntax(" HAVING ");
            expression.to_sql(sql);
        }
    }
}

// scalars
impl Expression {
    pub fn to_sql(&self, sql: &mut SQL) {
        match &self {
            Expression::ColumnReference(column_reference) => column_reference.to_sql(sql),
            Expression::Value(value) => value.to_sql(sql),
            Expression::Parameter(Parameter { name, value }) => sql.append_param(name, value),
            Expression::And { left, right } => {
                sql.append_syntax("(");
                left.to_sql(sql);
                sql.append_syntax(" AND ");
                right.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::Or { left, right } => {
                sql.append_syntax("(");
                left.to_sql(sql);
                sql.append_syntax(" OR ");
                right.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::Nested(expr) => {
                sql.append_syntax("(");
                expr.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::BinaryOperation {
                left,
                operator,
                right,
            } => {
                left.to_sql(sql);
                operator.to_sql(sql);
                right.to_sql(sql);
            }
            Expression::UnaryOperation {
                expression,
                operator,
            } => {
                expression.to_sql(sql);
                operator.to_sql(sql);
            }
            Expression::FunctionCall { function, args } => {
                function.to_sql(sql);
                sql.append_syntax("(");
                for (index, arg) in args.iter().enumerate() {
                    arg.to_sql(sql);
                    if index < (args.len() - 1) {
                        sql.append_syntax(", ");
                    }
                }
                sql.append_syntax(")");
            }
            Expression::Cast {
                expression,
                r#type,
            } => {
                sql.append_syntax("CAST(");
                expression.to_sql(sql);
                sql.append_syntax(" AS ");
                r#type.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::Count(count_type) => {
                sql.append_syntax("COUNT(");
                count_type.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::RowNumber(order_by) => {
                sql.append_syntax("ROW_NUMBER() OVER(");
                if order_by.elements.is_empty() {
                    // window functions refuse constant sort keys
                    sql.append_syntax("ORDER BY (SELECT NULL)");
                } else {
                    order_by.to_sql(sql);
                }
                sql.append_syntax(")");
            }
            Expression::Template { template, args } => render_template(template, args, sql),
        }
    }
}

/// Substitute `{n}` placeholders. `{{` and `}}` stand for literal braces, and a
/// placeholder with no matching argument is emitted unchanged.
fn render_template(template: &str, args: &[TemplateArgument], sql: &mut SQL) {
    let mut rest = template;
    while let Some(start) = rest.find(|c: char| c == '{' || c == '}') {
        sql.append_syntax(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            sql.append_syntax(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            let argument = tail.find('}').and_then(|end| {
                tail[1..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| args.get(index))
                    .map(|argument| (end, argument))
            });
            if let Some((end, argument)) = argument {
                match argument {
                    TemplateArgument::Identifier(name) => {
                        sql.append_syntax(&name.replace(']', "]]"));
                    }
                    TemplateArgument::Expression(expression) => expression.to_sql(sql),
                }
                rest = &tail[end + 1..];
                continue;
            }
        }

        sql.append_syntax(&tail[..1]);
        rest = &tail[1..];
    }
    sql.append_syntax(rest);
}

impl UnaryOperator {
    pub fn to_sql(self, sql: &mut SQL) {
        match self {
            UnaryOperator::IsNull => sql.append_syntax(" IS NULL"),
            UnaryOperator::IsNotNull => sql.append_syntax(" IS NOT NULL"),
        }
    }
}

impl BinaryOperator {
    pub fn to_sql(self, sql: &mut SQL) {
        let operator = match self {
            BinaryOperator::Equal => " = ",
            BinaryOperator::NotEqual => " != ",
            BinaryOperator::GreaterThan => " > ",
            BinaryOperator::LessThan => " < ",
            BinaryOperator::GreaterThanOrEqual => " >= ",
            BinaryOperator::LessThanOrEqual => " <= ",
            BinaryOperator::Like => " LIKE ",
            BinaryOperator::NotLike => " NOT LIKE ",
        };
        sql.append_syntax(operator);
    }
}

impl Function {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            Function::IsNull => sql.append_syntax("IsNull"),
            Function::EditDistance => sql.append_syntax("master.dbo.edit_distance"),
        }
    }
}

impl CountType {
    pub fn to_sql(&self, sql: &mut SQL) {
        match &self {
            CountType::Star => sql.append_syntax("*"),
        }
    }
}

impl Value {
    pub fn to_sql(&self, sql: &mut SQL) {
        match &self {
            Value::Int(i) => sql.append_syntax(&i.to_string()),
            // there are no boolean literals, only predicates
            Value::Bool(true) => sql.append_syntax("1 = 1"),
            Value::Bool(false) => sql.append_syntax("1 = 0"),
            Value::String(s) => sql.append_string_literal(s),
            Value::Null => sql.append_syntax("NULL"),
        }
    }
}

impl ScalarType {
    pub fn to_sql(self, sql: &mut SQL) {
        match self {
            ScalarType::Date => sql.append_syntax("DATE"),
            ScalarType::Text => sql.append_syntax("TEXT"),
        }
    }
}

impl OrderBy {
    pub fn to_sql(&self, sql: &mut SQL) {
        if !self.elements.is_empty() {
            sql.append_syntax("ORDER BY ");
            for (index, order_by_item) in self.elements.iter().enumerate() {
                order_by_item.to_sql(sql);
                if index < (self.elements.len() - 1) {
                    sql.append_syntax(", ");
                }
            }
        }
    }
}

impl OrderByElement {
    pub fn to_sql(&self, sql: &mut SQL) {
        self.target.to_sql(sql);
        self.direction.to_sql(sql);
    }
}

impl OrderByDirection {
    pub fn to_sql(self, sql: &mut SQL) {
        match self {
            OrderByDirection::Asc => sql.append_syntax(" ASC"),
            OrderByDirection::Desc => sql.append_syntax(" DESC"),
        }
    }
}

impl Limit {
    pub fn to_sql(self, sql: &mut SQL) {
        if self.offset.is_none() && self.fetch.is_none() {
            return;
        }
        sql.append_syntax(&format!(" OFFSET {} ROWS", self.offset.unwrap_or(0)));
        if let Some(fetch) = self.fetch {
            sql.append_syntax(&format!(" FETCH NEXT {fetch} ROWS ONLY"));
        }
    }
}

// names
impl TableReference {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            TableReference::DBTable(TableName(name)) => sql.append_identifier(name),
            TableReference::AliasedTable(alias) => alias.to_sql(sql),
        }
    }
}

impl TableAlias {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.name);
    }
}

impl ColumnReference {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            ColumnReference::TableColumn { table, name } => {
                table.to_sql(sql);
                sql.append_syntax(".");
                name.to_sql(sql);
            }
            ColumnReference::AliasedColumn { column } => column.to_sql(sql),
        }
    }
}

impl ColumnName {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.0);
    }
}

impl ColumnAlias {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.name);
    }
}
