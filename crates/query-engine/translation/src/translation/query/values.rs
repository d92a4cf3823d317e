//! Bind request values with the wire type their field calls for.

use query_engine_metadata::metadata::{FieldDescriptor, ValueType};
use query_engine_sql::sql::string::{DbValue, WireType};

/// Convert a filter value for a field into a parameter value.
///
/// Enum variants given by name are bound as their discriminant.
pub fn bind_value(field: &FieldDescriptor, value: &serde_json::Value) -> DbValue {
    match (field.value_type, value) {
        (_, serde_json::Value::Null) => DbValue::new(serde_json::Value::Null),
        (ValueType::Enum, serde_json::Value::String(name)) => {
            match field
                .enum_variants
                .iter()
                .position(|variant| variant.eq_ignore_ascii_case(name))
            {
                Some(index) => DbValue::with_type(serde_json::json!(index), WireType::Int),
                None => DbValue::new(value.clone()),
            }
        }
        (ValueType::Date, serde_json::Value::String(_)) => {
            DbValue::with_type(value.clone(), WireType::Date)
        }
        (ValueType::DateTime, serde_json::Value::String(_)) => {
            DbValue::with_type(value.clone(), WireType::DateTime2)
        }
        (ValueType::Time, serde_json::Value::String(_)) => {
            DbValue::with_type(value.clone(), WireType::Time)
        }
        (ValueType::Guid, serde_json::Value::String(_)) => {
            DbValue::with_type(value.clone(), WireType::UniqueIdentifier)
        }
        (ValueType::Decimal, serde_json::Value::Number(_)) => {
            DbValue::with_type(value.clone(), WireType::Money)
        }
        (ValueType::Float, serde_json::Value::Number(_)) => {
            DbValue::with_type(value.clone(), WireType::Float)
        }
        (ValueType::BigInt, serde_json::Value::Number(_)) => {
            DbValue::with_type(value.clone(), WireType::BigInt)
        }
        _ => DbValue::new(value.clone()),
    }
}
