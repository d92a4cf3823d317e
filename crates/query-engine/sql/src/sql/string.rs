//! Type definitions of a low-level SQL string representation.

use indexmap::IndexMap;
use serde::Serialize;

/// A rendered, parameterized query.
#[derive(Debug, Clone, PartialEq)]
pub struct SQL {
    pub sql: String,
    /// Parameters by name, including the leading `@`, in order of first appearance.
    pub params: IndexMap<String, DbValue>,
}

impl Default for SQL {
    fn default() -> Self {
        Self::new()
    }
}

/// The server-side type a parameter is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WireType {
    NVarChar,
    Int,
    BigInt,
    Bit,
    Real,
    Float,
    Money,
    Date,
    DateTime2,
    Time,
    UniqueIdentifier,
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            WireType::NVarChar => "NVarChar(MAX)",
            WireType::Int => "Int",
            WireType::BigInt => "BigInt",
            WireType::Bit => "Bit",
            WireType::Real => "Real",
            WireType::Float => "Float",
            WireType::Money => "Money",
            WireType::Date => "Date",
            WireType::DateTime2 => "DateTime2",
            WireType::Time => "Time",
            WireType::UniqueIdentifier => "UniqueIdentifier",
        };
        write!(f, "{name}")
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbValue {
    pub value: serde_json::Value,
    pub wire_type: WireType,
}

impl DbValue {
    /// Pick the wire type from the runtime type of the value.
    /// `null` goes over the wire as text.
    pub fn new(value: serde_json::Value) -> DbValue {
        let wire_type = match &value {
            serde_json::Value::Bool(_) => WireType::Bit,
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(int) if i32::try_from(int).is_ok() => WireType::Int,
                Some(_) => WireType::BigInt,
                None if number.is_u64() => WireType::BigInt,
                None => WireType::Float,
            },
            serde_json::Value::Null
            | serde_json::Value::String(_)
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => WireType::NVarChar,
        };
        DbValue { value, wire_type }
    }

    pub fn with_type(value: serde_json::Value, wire_type: WireType) -> DbValue {
        DbValue { value, wire_type }
    }

    /// A literal that can be pasted into a script, used for diagnostics only.
    fn to_literal(&self) -> String {
        match &self.value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => quote_string(s),
            other => quote_string(&other.to_string()),
        }
    }
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier in brackets, doubling embedded closing brackets.
pub fn quote_identifier(value: &str) -> String {
    format!("[{}]", value.replace(']', "]]"))
}

impl SQL {
    pub fn new() -> SQL {
        SQL {
            sql: String::new(),
            params: IndexMap::new(),
        }
    }
    pub fn append_syntax(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }
    pub fn append_identifier(&mut self, sql: &str) {
        self.sql.push_str(&quote_identifier(sql));
    }
    pub fn append_string_literal(&mut self, value: &str) {
        self.sql.push_str(&quote_string(value));
    }
    /// Reference a named parameter. The same name bound to the same value is
    /// one parameter. The server matches names ignoring case, so a name
    /// clashing with a different parameter gets a `_{n}` suffix.
    pub fn append_param(&mut self, name: &str, value: &DbValue) {
        let base = format!("@{name}");
        let mut candidate = base.clone();
        let mut suffix = 0;
        let name = loop {
            match self.params.get(&candidate) {
                Some(bound) if bound == value => break candidate,
                Some(_) => {}
                None if !self
                    .params
                    .keys()
                    .any(|existing| existing.eq_ignore_ascii_case(&candidate)) =>
                {
                    self.params.insert(candidate.clone(), value.clone());
                    break candidate;
                }
                None => {}
            }
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        };
        self.sql.push_str(&name);
    }

    /// `DECLARE` statements reproducing the bound parameters, for pasting the query into a console.
    pub fn declarations(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|(name, value)| {
                format!(
                    "DECLARE {name} {} = {};",
                    value.wire_type,
                    value.to_literal()
                )
            })
            .collect()
    }
}
