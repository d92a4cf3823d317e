//! Descriptions of the mapped entities: their table, fields and relationships.

use std::collections::BTreeMap;

use enum_iterator::Sequence;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the pseudo-field every entity exposes for counting grouped rows.
pub const COUNT_FIELD: &str = "_count";

/// The semantic type of a field. It picks the set of filter operators
/// available for the field and the wire type of bound values.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Sequence,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    String,
    Int,
    BigInt,
    Float,
    Decimal,
    Bool,
    /// A date without a time of day. Compared after casting both sides to `date`.
    Date,
    DateTime,
    Time,
    Guid,
    /// Stored as an integer discriminant, exposed as the variant name.
    Enum,
    #[default]
    Other,
}

/// Which structured filter a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSet {
    /// `eq, ne, gt, lt, gte, lte, inI, inE, outI, outE`
    Range,
    /// As `Range`, comparing dates only.
    DateRange,
    /// `eq, ne, like, notLike, ld, and, or`
    String,
    /// Plain equality on the supplied value.
    Equality,
}

impl ValueType {
    pub fn operator_set(self) -> OperatorSet {
        match self {
            ValueType::String => OperatorSet::String,
            ValueType::Int
            | ValueType::BigInt
            | ValueType::Float
            | ValueType::Decimal
            | ValueType::DateTime
            | ValueType::Time => OperatorSet::Range,
            ValueType::Date => OperatorSet::DateRange,
            ValueType::Bool | ValueType::Guid | ValueType::Enum | ValueType::Other => {
                OperatorSet::Equality
            }
        }
    }
}

/// One mapped property of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// The declared property name, used in requests and results.
    pub property: String,
    /// The database column. Defaults to the property name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// SQL read template: `{0}` is the table alias and `{1}` the column name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_transform: Option<String>,
    /// SQL write template: `{0}` is the bound value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_transform: Option<String>,
    #[serde(default)]
    pub is_aggregation: bool,
    /// Coalesce nulls to `CAST('' AS TEXT)` instead of `''`.
    #[serde(default)]
    pub is_text_field: bool,
    /// Opt out of the built-in null coalescing of string columns.
    #[serde(default)]
    pub skip_default_transforms: bool,
    #[serde(default)]
    pub value_type: ValueType,
    /// Variant names of an `enum` field, indexed by discriminant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_variants: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(property: impl Into<String>, value_type: ValueType) -> FieldDescriptor {
        FieldDescriptor {
            property: property.into(),
            column_name: None,
            read_transform: None,
            write_transform: None,
            is_aggregation: false,
            is_text_field: false,
            skip_default_transforms: false,
            value_type,
            enum_variants: vec![],
        }
    }

    /// The `_count` pseudo-field.
    pub fn count() -> FieldDescriptor {
        FieldDescriptor {
            column_name: Some(String::new()),
            read_transform: Some("count(*)".to_string()),
            is_aggregation: true,
            ..FieldDescriptor::new(COUNT_FIELD, ValueType::Int)
        }
    }

    pub fn column(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.property)
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_read_transform(mut self, template: impl Into<String>) -> Self {
        self.read_transform = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_write_transform(mut self, template: impl Into<String>) -> Self {
        self.write_transform = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_enum_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value_type = ValueType::Enum;
        self.enum_variants = variants.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn aggregation(mut self) -> Self {
        self.is_aggregation = true;
        self
    }

    #[must_use]
    pub fn text_field(mut self) -> Self {
        self.is_text_field = true;
        self
    }

    #[must_use]
    pub fn skip_default_transforms(mut self) -> Self {
        self.skip_default_transforms = true;
        self
    }
}

/// How many targets a relationship yields per parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    /// A collection of targets.
    #[default]
    Many,
    /// A single nullable target.
    One,
}

/// The intermediate table of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinTable {
    pub table: String,
    /// Column of the join table matching the local property.
    pub local_join_column: String,
    /// Column of the join table matching the foreign property.
    pub foreign_join_column: String,
}

/// An edge from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDescriptor {
    /// The property the related objects are assigned to.
    pub property: String,
    /// Name of the target entity.
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Property of this entity holding the join key.
    pub local_property: String,
    /// Property of the target entity holding the join key.
    pub foreign_property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_table: Option<JoinTable>,
}

/// A predicate applied to every query of an entity, regardless of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtraCriteria {
    pub column: String,
    pub value: serde_json::Value,
}

/// Everything needed to query one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    /// Filled in from the key when read from configuration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub table: String,
    pub primary_property: String,
    pub default_order: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_criteria: Option<ExtraCriteria>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDescriptor>,
}

impl EntityDescriptor {
    /// Look a field up by property name, ignoring case.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.property.eq_ignore_ascii_case(name))
    }

    /// Look a relationship up by property name, ignoring case.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships
            .iter()
            .find(|relationship| relationship.property.eq_ignore_ascii_case(name))
    }

    pub fn primary_field(&self) -> Option<&FieldDescriptor> {
        self.field(&self.primary_property)
    }

    /// Add the `_count` pseudo-field unless the entity declares its own.
    #[must_use]
    pub fn with_count_field(mut self) -> Self {
        if self.field(COUNT_FIELD).is_none() {
            self.fields.push(FieldDescriptor::count());
        }
        self
    }
}

/// Mapping from an entity name to its description.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct EntitiesInfo(pub BTreeMap<String, EntityDescriptor>);

impl EntitiesInfo {
    pub fn empty() -> Self {
        EntitiesInfo(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_field_is_added_once() {
        let entity = EntityDescriptor {
            name: "ToDo".to_string(),
            table: "ToDo".to_string(),
            primary_property: "Id".to_string(),
            default_order: "DueDate".to_string(),
            extra_criteria: None,
            fields: vec![FieldDescriptor::new("Id", ValueType::Guid)],
            relationships: vec![],
        }
        .with_count_field()
        .with_count_field();

        let counts: Vec<_> = entity
            .fields
            .iter()
            .filter(|field| field.property == COUNT_FIELD)
            .collect();
        assert_eq!(counts.len(), 1);
        assert!(counts[0].is_aggregation);
        assert_eq!(counts[0].column(), "");
        assert_eq!(counts[0].read_transform.as_deref(), Some("count(*)"));
    }

    #[test]
    fn lookups_ignore_case() {
        let entity = EntityDescriptor {
            name: "ToDo".to_string(),
            table: "ToDo".to_string(),
            primary_property: "Id".to_string(),
            default_order: "DueDate".to_string(),
            extra_criteria: None,
            fields: vec![
                FieldDescriptor::new("Id", ValueType::Guid),
                FieldDescriptor::new("DueDate", ValueType::Date).with_column("due_date"),
            ],
            relationships: vec![],
        };

        assert_eq!(entity.field("duedate").map(FieldDescriptor::column), Some("due_date"));
        assert_eq!(entity.primary_field().map(|f| f.property.as_str()), Some("Id"));
        assert!(entity.field("missing").is_none());
    }

    #[test]
    fn descriptors_read_from_json() {
        let field: FieldDescriptor = serde_json::from_value(serde_json::json!({
            "property": "Priority",
            "valueType": "enum",
            "enumVariants": ["Low", "Medium", "High"]
        }))
        .unwrap();

        assert_eq!(field.value_type, ValueType::Enum);
        assert_eq!(field.value_type.operator_set(), OperatorSet::Equality);
        assert_eq!(field.column(), "Priority");
        assert!(!field.is_aggregation);
    }

    #[test]
    fn descriptors_carry_only_read_settings() {
        let value = serde_json::to_value(FieldDescriptor::new("Text", ValueType::String)).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();

        assert_eq!(
            keys,
            vec![
                "isAggregation",
                "isTextField",
                "property",
                "skipDefaultTransforms",
                "valueType"
            ]
        );
    }
}
