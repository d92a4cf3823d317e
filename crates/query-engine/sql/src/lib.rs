//! The T-SQL abstract syntax tree we generate, and its rendering into parameterized SQL text.

pub mod sql;
