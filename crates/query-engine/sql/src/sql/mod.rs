//! Things related to SQL: the AST, helpers to build it, and conversion to a low-level string.

pub mod ast;
pub mod convert;
pub mod helpers;
pub mod string;
