//! Filter arguments: parsing the structured filter objects and turning them
//! into predicates with bound parameters.

use enum_iterator::Sequence;
use serde_json::{Map, Value};

use query_engine_metadata::metadata::{FieldDescriptor, OperatorSet};
use query_engine_sql::sql::ast::{
    BinaryOperator, Expression, Function, ScalarType, UnaryOperator, Value as SqlValue,
};
use query_engine_sql::sql::helpers::{column, equals, parameter};
use query_engine_sql::sql::string::DbValue;

use super::batch::{BatchItem, WhereArg};
use super::fields::{read_expression, write_expression};
use super::values::bind_value;
use crate::translation::error::Error;

/// A parsed filter argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Range(RangeFilter),
    /// A range filter comparing dates only.
    DateRange(RangeFilter),
    String(StringFilter),
    /// Plain equality, for types without a richer operator set.
    Equals(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeFilter {
    Compare(Comparison, Value),
    Between { inclusive: bool, low: Value, high: Value },
    Outside { inclusive: bool, low: Value, high: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringFilter {
    Equals(Value),
    NotEquals(Value),
    Like(String),
    NotLike(String),
    /// Levenshtein distance to `text`, optionally only against the start of the value.
    EditDistance {
        text: String,
        begins: bool,
        comparison: Comparison,
        distance: Value,
    },
    And(Vec<StringFilter>),
    Or(Vec<StringFilter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Sequence)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Sequence)]
enum RangeKey {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    InI,
    InE,
    OutI,
    OutE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Sequence)]
enum StringKey {
    Eq,
    Ne,
    Like,
    NotLike,
    Ld,
    And,
    Or,
}

/// The keys of a filter object.
trait OperatorKey: Sequence + Copy {
    fn name(self) -> &'static str;
}

impl OperatorKey for Comparison {
    fn name(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
            Comparison::Gt => "gt",
            Comparison::Lt => "lt",
            Comparison::Gte => "gte",
            Comparison::Lte => "lte",
        }
    }
}

impl OperatorKey for RangeKey {
    fn name(self) -> &'static str {
        match self {
            RangeKey::Eq => "eq",
            RangeKey::Ne => "ne",
            RangeKey::Gt => "gt",
            RangeKey::Lt => "lt",
            RangeKey::Gte => "gte",
            RangeKey::Lte => "lte",
            RangeKey::InI => "inI",
            RangeKey::InE => "inE",
            RangeKey::OutI => "outI",
            RangeKey::OutE => "outE",
        }
    }
}

impl OperatorKey for StringKey {
    fn name(self) -> &'static str {
        match self {
            StringKey::Eq => "eq",
            StringKey::Ne => "ne",
            StringKey::Like => "like",
            StringKey::NotLike => "notLike",
            StringKey::Ld => "ld",
            StringKey::And => "and",
            StringKey::Or => "or",
        }
    }
}

impl Comparison {
    fn operator(self) -> BinaryOperator {
        match self {
            Comparison::Eq => BinaryOperator::Equal,
            Comparison::Ne => BinaryOperator::NotEqual,
            Comparison::Gt => BinaryOperator::GreaterThan,
            Comparison::Lt => BinaryOperator::LessThan,
            Comparison::Gte => BinaryOperator::GreaterThanOrEqual,
            Comparison::Lte => BinaryOperator::LessThanOrEqual,
        }
    }
}

fn expected<K: OperatorKey>() -> String {
    enum_iterator::all::<K>()
        .map(K::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The one `key: operand` entry of a filter object.
fn single_operator<'v, K: OperatorKey>(
    field: &str,
    object: &'v Map<String, Value>,
) -> Result<(K, &'v Value), Error> {
    let invalid = || Error::InvalidFilter {
        field: field.to_string(),
        expected: expected::<K>(),
    };
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((key, operand)), None) => enum_iterator::all::<K>()
            .find(|candidate| candidate.name() == key)
            .map(|candidate| (candidate, operand))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn invalid_value(field: &str, expected: &str) -> Error {
    Error::InvalidFilterValue {
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

impl Filter {
    /// Parse a filter argument according to the operator set of the field's type.
    /// A bare value is shorthand for `eq`.
    pub fn parse(field: &FieldDescriptor, value: &Value) -> Result<Filter, Error> {
        let name = &field.property;
        match field.value_type.operator_set() {
            OperatorSet::Range => RangeFilter::parse(name, value).map(Filter::Range),
            OperatorSet::DateRange => RangeFilter::parse(name, value).map(Filter::DateRange),
            OperatorSet::String => StringFilter::parse(name, value).map(Filter::String),
            OperatorSet::Equality => Ok(Filter::Equals(value.clone())),
        }
    }

    /// How many parameters the filter binds.
    fn parameter_count(&self) -> usize {
        match self {
            Filter::Range(filter) | Filter::DateRange(filter) => filter.parameter_count(),
            Filter::String(filter) => filter.parameter_count(),
            Filter::Equals(value) => usize::from(!value.is_null()),
        }
    }

    fn to_expression(&self, target: Expression, binder: &mut Binder) -> Expression {
        match self {
            Filter::Range(filter) => filter.to_expression(target, binder, false),
            Filter::DateRange(filter) => filter.to_expression(target, binder, true),
            Filter::String(filter) => filter.to_expression(target, binder),
            Filter::Equals(value) => compare(target, Comparison::Eq, value, binder),
        }
    }
}

impl RangeFilter {
    fn parse(field: &str, value: &Value) -> Result<RangeFilter, Error> {
        let Some(object) = value.as_object() else {
            return Ok(RangeFilter::Compare(Comparison::Eq, value.clone()));
        };
        let (key, operand) = single_operator::<RangeKey>(field, object)?;
        let ordered = |comparison| {
            if operand.is_null() {
                Err(invalid_value(field, "a value to compare with"))
            } else {
                Ok(RangeFilter::Compare(comparison, operand.clone()))
            }
        };
        match key {
            RangeKey::Eq => Ok(RangeFilter::Compare(Comparison::Eq, operand.clone())),
            RangeKey::Ne => Ok(RangeFilter::Compare(Comparison::Ne, operand.clone())),
            RangeKey::Gt => ordered(Comparison::Gt),
            RangeKey::Lt => ordered(Comparison::Lt),
            RangeKey::Gte => ordered(Comparison::Gte),
            RangeKey::Lte => ordered(Comparison::Lte),
            RangeKey::InI | RangeKey::InE | RangeKey::OutI | RangeKey::OutE => {
                let (low, high) = match operand.as_array().map(Vec::as_slice) {
                    Some([low, high]) if !low.is_null() && !high.is_null() => {
                        (low.clone(), high.clone())
                    }
                    _ => return Err(invalid_value(field, "a list of exactly two values")),
                };
                let inclusive = matches!(key, RangeKey::InI | RangeKey::OutI);
                Ok(if matches!(key, RangeKey::InI | RangeKey::InE) {
                    RangeFilter::Between {
                        inclusive,
                        low,
                        high,
                    }
                } else {
                    RangeFilter::Outside {
                        inclusive,
                        low,
                        high,
                    }
                })
            }
        }
    }

    fn parameter_count(&self) -> usize {
        match self {
            RangeFilter::Compare(_, value) => usize::from(!value.is_null()),
            RangeFilter::Between { .. } | RangeFilter::Outside { .. } => 2,
        }
    }

    fn to_expression(&self, target: Expression, binder: &mut Binder, dates: bool) -> Expression {
        let as_date = |expression: Expression| {
            if dates {
                Expression::Cast {
                    expression: Box::new(expression),
                    r#type: ScalarType::Date,
                }
            } else {
                expression
            }
        };
        let target = as_date(target);
        match self {
            RangeFilter::Compare(comparison, value) if value.is_null() => {
                null_check(target, *comparison)
            }
            RangeFilter::Compare(comparison, value) => {
                let bound = as_date(binder.bind(value));
                binary(target, comparison.operator(), bound)
            }
            RangeFilter::Between {
                inclusive,
                low,
                high,
            } => {
                let operator = if *inclusive {
                    BinaryOperator::LessThanOrEqual
                } else {
                    BinaryOperator::LessThan
                };
                let low = as_date(binder.bind(low));
                let high = as_date(binder.bind(high));
                Expression::And {
                    left: Box::new(binary(low, operator, target.clone())),
                    right: Box::new(binary(target, operator, high)),
                }
            }
            RangeFilter::Outside {
                inclusive,
                low,
                high,
            } => {
                let operator = if *inclusive {
                    BinaryOperator::GreaterThanOrEqual
                } else {
                    BinaryOperator::GreaterThan
                };
                let low = as_date(binder.bind(low));
                let high = as_date(binder.bind(high));
                Expression::Or {
                    left: Box::new(binary(low, operator, target.clone())),
                    right: Box::new(binary(target, operator, high)),
                }
            }
        }
    }
}

impl StringFilter {
    fn parse(field: &str, value: &Value) -> Result<StringFilter, Error> {
        let Some(object) = value.as_object() else {
            return Ok(StringFilter::Equals(value.clone()));
        };
        let (key, operand) = single_operator::<StringKey>(field, object)?;
        match key {
            StringKey::Eq => Ok(StringFilter::Equals(operand.clone())),
            StringKey::Ne => Ok(StringFilter::NotEquals(operand.clone())),
            StringKey::Like | StringKey::NotLike => {
                let pattern = match operand {
                    Value::Null => return Err(Error::LikeNull(field.to_string())),
                    Value::String(pattern) => pattern.clone(),
                    _ => return Err(invalid_value(field, "a string pattern")),
                };
                Ok(if key == StringKey::Like {
                    StringFilter::Like(pattern)
                } else {
                    StringFilter::NotLike(pattern)
                })
            }
            StringKey::Ld => Self::parse_edit_distance(field, operand),
            StringKey::And | StringKey::Or => {
                let filters = match operand.as_array() {
                    Some(items) if !items.is_empty() => items
                        .iter()
                        .map(|item| StringFilter::parse(field, item))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(invalid_value(field, "a non-empty list of string filters")),
                };
                Ok(if key == StringKey::And {
                    StringFilter::And(filters)
                } else {
                    StringFilter::Or(filters)
                })
            }
        }
    }

    /// `{ text, begins?, <one comparison>: distance }`
    fn parse_edit_distance(field: &str, operand: &Value) -> Result<StringFilter, Error> {
        let expected = "an object with 'text', an optional 'begins' and one comparison";
        let object = operand
            .as_object()
            .ok_or_else(|| invalid_value(field, expected))?;
        let text = object
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_value(field, expected))?
            .to_string();
        let begins = match object.get("begins") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(begins)) => *begins,
            Some(_) => return Err(invalid_value(field, expected)),
        };
        let comparisons: Map<String, Value> = object
            .iter()
            .filter(|(key, value)| *key != "text" && *key != "begins" && !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let (comparison, distance) = single_operator::<Comparison>(field, &comparisons)?;
        Ok(StringFilter::EditDistance {
            text,
            begins,
            comparison,
            distance: distance.clone(),
        })
    }

    fn parameter_count(&self) -> usize {
        match self {
            StringFilter::Equals(value) | StringFilter::NotEquals(value) => {
                usize::from(!value.is_null())
            }
            StringFilter::Like(_) | StringFilter::NotLike(_) => 1,
            StringFilter::EditDistance { .. } => 2,
            StringFilter::And(filters) | StringFilter::Or(filters) => {
                filters.iter().map(StringFilter::parameter_count).sum()
            }
        }
    }

    fn to_expression(&self, target: Expression, binder: &mut Binder) -> Expression {
        match self {
            StringFilter::Equals(value) => compare(target, Comparison::Eq, value, binder),
            StringFilter::NotEquals(value) => compare(target, Comparison::Ne, value, binder),
            StringFilter::Like(pattern) => {
                let bound = binder.bind(&Value::String(pattern.clone()));
                binary(target, BinaryOperator::Like, bound)
            }
            StringFilter::NotLike(pattern) => {
                let bound = binder.bind(&Value::String(pattern.clone()));
                binary(target, BinaryOperator::NotLike, bound)
            }
            StringFilter::EditDistance {
                text,
                begins,
                comparison,
                distance,
            } => {
                let text = binder.bind(&Value::String(text.clone()));
                let distance_function = Expression::FunctionCall {
                    function: Function::EditDistance,
                    args: vec![
                        target,
                        text,
                        Expression::Value(SqlValue::Int(i64::from(*begins))),
                    ],
                };
                let distance = binder.bind_plain(distance);
                binary(distance_function, comparison.operator(), distance)
            }
            StringFilter::And(filters) | StringFilter::Or(filters) => {
                let and = matches!(self, StringFilter::And(_));
                filters
                    .iter()
                    .map(|filter| {
                        let predicate = filter.to_expression(target.clone(), binder);
                        Expression::Nested(Box::new(predicate))
                    })
                    .reduce(|left, right| {
                        if and {
                            Expression::And {
                                left: Box::new(left),
                                right: Box::new(right),
                            }
                        } else {
                            Expression::Or {
                                left: Box::new(left),
                                right: Box::new(right),
                            }
                        }
                    })
                    .unwrap_or_else(|| Expression::Value(SqlValue::Bool(and)))
            }
        }
    }
}

/// Names parameters `{prefix}` when a filter binds one value and
/// `{prefix}_{n}` when it binds several.
struct Binder<'a> {
    field: &'a FieldDescriptor,
    prefix: String,
    numbered: bool,
    next: usize,
}

impl Binder<'_> {
    fn next_name(&mut self) -> String {
        let name = if self.numbered {
            format!("{}_{}", self.prefix, self.next)
        } else {
            self.prefix.clone()
        };
        self.next += 1;
        name
    }

    /// Bind a value of the field, through its write template.
    fn bind(&mut self, value: &Value) -> Expression {
        let name = self.next_name();
        write_expression(self.field, name, bind_value(self.field, value))
    }

    /// Bind a value that is not of the field's type.
    fn bind_plain(&mut self, value: &Value) -> Expression {
        let name = self.next_name();
        parameter(name, DbValue::new(value.clone()))
    }
}

fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOperation {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

/// `eq null` and `ne null` test for null rather than compare.
fn null_check(target: Expression, comparison: Comparison) -> Expression {
    let operator = if comparison == Comparison::Ne {
        UnaryOperator::IsNotNull
    } else {
        UnaryOperator::IsNull
    };
    Expression::UnaryOperation {
        expression: Box::new(target),
        operator,
    }
}

fn compare(
    target: Expression,
    comparison: Comparison,
    value: &Value,
    binder: &mut Binder,
) -> Expression {
    if value.is_null() {
        null_check(target, comparison)
    } else {
        let bound = binder.bind(value);
        binary(target, comparison.operator(), bound)
    }
}

/// The predicate for one filter argument applied to `target`.
pub fn compile(arg: &WhereArg, target: Expression, prefix: String) -> Expression {
    let mut binder = Binder {
        field: &arg.field,
        prefix,
        numbered: arg.filter.parameter_count() > 1,
        next: 0,
    };
    arg.filter.to_expression(target, &mut binder)
}

/// Row filters of a batch, on the plain columns.
pub fn filter_predicates(batch: &BatchItem) -> Vec<Expression> {
    batch
        .where_
        .iter()
        .map(|arg| {
            compile(
                arg,
                column(&batch.alias, arg.field.column()),
                format!("{}_{}", batch.alias.name, arg.key),
            )
        })
        .collect()
}

/// Group filters of a batch, on the aggregated expressions. Parameters are
/// named after the output column of the aggregate.
pub fn having_predicates(batch: &BatchItem) -> Vec<Expression> {
    batch
        .having
        .iter()
        .map(|arg| {
            compile(
                arg,
                read_expression(&batch.alias, &arg.field),
                batch.output_alias(&arg.field.property),
            )
        })
        .collect()
}

/// The column restricted by the entity's extra criteria, and the bound value it must equal.
pub fn security_criteria(batch: &BatchItem) -> Option<(Expression, Expression)> {
    batch.entity.extra_criteria.as_ref().map(|criteria| {
        (
            column(&batch.alias, &criteria.column),
            parameter(
                format!("{}_Extra", batch.alias.name),
                DbValue::new(criteria.value.clone()),
            ),
        )
    })
}

/// Every row predicate of a batch: the request's filters and the entity's extra criteria.
pub fn row_predicates(batch: &BatchItem) -> Vec<Expression> {
    let mut predicates = filter_predicates(batch);
    if let Some((restricted, value)) = security_criteria(batch) {
        predicates.push(equals(restricted, value));
    }
    predicates
}
