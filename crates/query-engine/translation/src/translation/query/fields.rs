//! How fields are read and written in SQL.

use query_engine_metadata::metadata::{FieldDescriptor, ValueType};
use query_engine_sql::sql::ast::{
    Expression, Function, ScalarType, TableAlias, TemplateArgument, Value,
};
use query_engine_sql::sql::helpers::{column, parameter};
use query_engine_sql::sql::string::DbValue;

/// The expression selecting a field: its read template if it has one,
/// otherwise the column, with string columns coalesced to the empty string.
pub fn read_expression(table: &TableAlias, field: &FieldDescriptor) -> Expression {
    match &field.read_transform {
        Some(template) => Expression::Template {
            template: template.clone(),
            args: vec![
                TemplateArgument::Identifier(table.name.to_string()),
                TemplateArgument::Identifier(field.column().to_string()),
            ],
        },
        None if field.value_type == ValueType::String && !field.skip_default_transforms => {
            let empty = Expression::Value(Value::String(String::new()));
            let fallback = if field.is_text_field {
                Expression::Cast {
                    expression: Box::new(empty),
                    r#type: ScalarType::Text,
                }
            } else {
                empty
            };
            Expression::FunctionCall {
                function: Function::IsNull,
                args: vec![column(table, field.column()), fallback],
            }
        }
        None => column(table, field.column()),
    }
}

/// A bound parameter for a field, passed through its write template if it has one.
pub fn write_expression(field: &FieldDescriptor, name: String, value: DbValue) -> Expression {
    let bound = parameter(name, value);
    match &field.write_transform {
        Some(template) => Expression::Template {
            template: template.clone(),
            args: vec![TemplateArgument::Expression(Box::new(bound))],
        },
        None => bound,
    }
}
