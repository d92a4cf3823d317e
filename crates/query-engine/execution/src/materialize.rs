//! Rebuild nested objects from the rows of a plan's result sets.
//!
//! Every batch reads its own columns, `{alias}_{property}`, from the first
//! result set carrying any of them. Rows are grouped into objects by the
//! batch's primary key, or by the rank column of a grouped query. Children
//! are linked to a parent through the parent's join key, repeated in the
//! child's rows as `FK_{parent alias}_{property}`, or through the rank when
//! the query was grouped.

use std::collections::HashMap;

use indexmap::IndexMap;
use multimap::MultiMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use query_engine_metadata::metadata::{Cardinality, FieldDescriptor, ValueType};
use query_engine_translation::translation::query::aggregation::ROW_NUMBER_COLUMN;
use query_engine_translation::translation::query::batch::BatchItem;
use query_engine_translation::translation::query::Mode;

use crate::connection::{ResultSet, Row};
use crate::error::{ConversionError, Error, MaterializationError};

/// A built object, keyed by property name.
pub type Object = serde_json::Map<String, Value>;

/// Build the objects of the root batch, with their children attached.
pub fn build_objects(
    result_sets: &[ResultSet],
    root: &BatchItem,
    mode: Mode,
) -> Result<Vec<Object>, MaterializationError> {
    let mut materializer = Materializer {
        result_sets,
        mode,
        links: HashMap::new(),
    };
    let rows = materializer
        .result_set(root)
        .map(|result_set| result_set.rows.iter().collect())
        .unwrap_or_default();
    materializer.build(root, rows)
}

/// Convert built objects into a typed representation.
pub fn deserialize_objects<T: DeserializeOwned>(
    entity: &str,
    objects: Vec<Object>,
) -> Result<Vec<T>, Error> {
    objects
        .into_iter()
        .map(|object| {
            serde_json::from_value(Value::Object(object)).map_err(|source| Error::Deserialize {
                entity: entity.to_string(),
                source,
            })
        })
        .collect()
}

struct Materializer<'a> {
    result_sets: &'a [ResultSet],
    mode: Mode,
    /// Rows of a child batch by the value linking them to a parent, keyed by child alias.
    links: HashMap<String, MultiMap<String, &'a Row>>,
}

impl<'a> Materializer<'a> {
    fn result_set(&self, batch: &BatchItem) -> Option<&'a ResultSet> {
        self.result_sets.iter().find(|result_set| {
            batch
                .fields
                .iter()
                .any(|field| result_set.has_column(&field.output_alias))
        })
    }

    fn build(
        &mut self,
        batch: &BatchItem,
        rows: Vec<&'a Row>,
    ) -> Result<Vec<Object>, MaterializationError> {
        // Nothing of this batch was read: a lone aggregate still yields one object.
        if self.result_set(batch).is_none() {
            let mut object = Object::new();
            self.attach_children(batch, None, &mut object)?;
            return Ok(vec![object]);
        }

        let mut groups: IndexMap<String, &'a Row> = IndexMap::new();
        for row in rows {
            if let Some(key) = self.group_key(batch, row) {
                groups.entry(key).or_insert(row);
            }
        }

        let mut objects = Vec::with_capacity(groups.len());
        for row in groups.into_values() {
            let mut object = assign_fields(batch, row)?;
            self.attach_children(batch, Some(row), &mut object)?;
            objects.push(object);
        }
        Ok(objects)
    }

    fn group_key(&self, batch: &BatchItem, row: &Row) -> Option<String> {
        let value = match self.mode {
            Mode::Aggregation => row.get(ROW_NUMBER_COLUMN),
            Mode::Standard => batch
                .field(&batch.entity.primary_property)
                .and_then(|field| row.get(&field.output_alias)),
        }?;
        link_key(value)
    }

    fn attach_children(
        &mut self,
        batch: &BatchItem,
        row: Option<&'a Row>,
        object: &mut Object,
    ) -> Result<(), MaterializationError> {
        for child in &batch.children {
            let Some(join) = &child.join else {
                continue;
            };
            let rows = self.child_rows(batch, row, child);
            let children = self.build(child, rows)?;
            let value = match join.cardinality {
                Cardinality::Many => Value::Array(children.into_iter().map(Value::Object).collect()),
                Cardinality::One => children
                    .into_iter()
                    .next()
                    .map_or(Value::Null, Value::Object),
            };
            object.insert(join.property.clone(), value);
        }
        Ok(())
    }

    /// The rows of a child batch belonging to one parent row. Without a
    /// parent row every row of the child belongs to it.
    fn child_rows(
        &mut self,
        parent: &BatchItem,
        parent_row: Option<&Row>,
        child: &BatchItem,
    ) -> Vec<&'a Row> {
        let Some(result_set) = self.result_set(child) else {
            return vec![];
        };
        let Some(parent_row) = parent_row else {
            return result_set.rows.iter().collect();
        };

        let (link_column, parent_value) = match self.mode {
            Mode::Aggregation => (
                ROW_NUMBER_COLUMN.to_string(),
                parent_row.get(ROW_NUMBER_COLUMN),
            ),
            Mode::Standard => {
                let (Some(join), Some(link_column)) =
                    (&child.join, child.foreign_key_alias(parent))
                else {
                    return vec![];
                };
                let parent_value = parent
                    .field(&join.local.property)
                    .and_then(|field| parent_row.get(&field.output_alias));
                (link_column, parent_value)
            }
        };
        let Some(key) = parent_value.and_then(link_key) else {
            return vec![];
        };

        self.links
            .entry(child.alias.name.to_string())
            .or_insert_with(|| {
                result_set
                    .rows
                    .iter()
                    .filter_map(|row| {
                        row.get(&link_column)
                            .and_then(link_key)
                            .map(|key| (key, row))
                    })
                    .collect()
            })
            .get_vec(&key)
            .cloned()
            .unwrap_or_default()
    }
}

/// Keys compare by their JSON text; a null key links nothing.
fn link_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        value => Some(value.to_string()),
    }
}

fn assign_fields(batch: &BatchItem, row: &Row) -> Result<Object, MaterializationError> {
    let mut object = Object::new();
    for field in batch.output_fields() {
        let value = row.get(&field.output_alias).unwrap_or(&Value::Null);
        let value = convert(&batch.entity.name, &field.descriptor, value)?;
        object.insert(field.descriptor.property.clone(), value);
    }
    Ok(object)
}

/// Bring a column value to the representation of its property.
fn convert(
    entity: &str,
    field: &FieldDescriptor,
    value: &Value,
) -> Result<Value, MaterializationError> {
    let error = |source: ConversionError| MaterializationError {
        entity: entity.to_string(),
        property: field.property.clone(),
        source,
    };

    match (field.value_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ValueType::Enum, Value::Number(number)) => number
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| field.enum_variants.get(index))
            .map(|variant| Value::String(variant.clone()))
            .ok_or_else(|| {
                error(ConversionError::UnknownDiscriminant {
                    value: number.clone(),
                    variants: field.enum_variants.len(),
                })
            }),
        (ValueType::Enum, Value::String(name)) => field
            .enum_variants
            .iter()
            .find(|variant| variant.eq_ignore_ascii_case(name))
            .map(|variant| Value::String(variant.clone()))
            .ok_or_else(|| error(ConversionError::UnknownVariant(name.clone()))),
        (ValueType::Enum, other) => Err(error(ConversionError::NotAVariant(other.clone()))),
        (ValueType::Bool, Value::Bool(_)) => Ok(value.clone()),
        (ValueType::Bool, Value::Number(number)) => match number.as_u64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(error(ConversionError::NotABit(value.clone()))),
        },
        (ValueType::Bool, other) => Err(error(ConversionError::NotABit(other.clone()))),
        _ => Ok(value.clone()),
    }
}
