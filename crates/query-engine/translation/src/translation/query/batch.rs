//! Turn a selection tree into a tree of batches: one per entity reached,
//! carrying the fields to read, the filters, the ordering and the window.

use std::sync::Arc;

use query_engine_metadata::metadata::{
    Cardinality, EntityDescriptor, FieldDescriptor, RelationshipDescriptor,
};
use query_engine_sql::sql::ast::TableAlias;
use query_engine_sql::sql::helpers::make_table_alias;

use super::filtering::Filter;
use crate::translation::error::Error;
use crate::translation::helpers::Env;
use crate::translation::request::Selection;

/// Reserved argument names.
pub const OFFSET: &str = "_offset";
pub const FETCH_COUNT: &str = "_fetchCount";
pub const ORDER_BY: &str = "_orderBy";
pub const GROUP_BY: &str = "_groupBy";

/// Everything needed to read one entity as part of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub entity: Arc<EntityDescriptor>,
    /// Empty until aliases are assigned.
    pub alias: TableAlias,
    pub fields: Vec<BatchField>,
    pub where_: Vec<WhereArg>,
    pub having: Vec<WhereArg>,
    pub order_by: Vec<OrderElement>,
    /// Whether `order_by` came from the request rather than the entity default.
    pub explicit_order: bool,
    pub offset: Option<u32>,
    pub count: Option<u32>,
    /// Set on every batch but the root.
    pub join: Option<JoinInfo>,
    pub children: Vec<BatchItem>,
}

/// A field read by a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchField {
    pub descriptor: FieldDescriptor,
    /// Selected only to group rows or link children, removed from the built objects.
    pub identifier_only: bool,
    /// `{table alias}_{property}`, empty until aliases are assigned.
    pub output_alias: String,
}

/// How a child batch hangs off its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinInfo {
    /// The relationship property on the parent.
    pub property: String,
    pub cardinality: Cardinality,
    /// Property of the parent holding the join key.
    pub local: FieldDescriptor,
    /// Property of the child holding the join key.
    pub foreign: FieldDescriptor,
    pub join_table: Option<JoinTableInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinTableInfo {
    pub table: String,
    pub local_join_column: String,
    pub foreign_join_column: String,
    pub alias: TableAlias,
}

/// A filter on one field, either a row predicate or a group predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereArg {
    pub field: FieldDescriptor,
    /// The argument name, used to name the bound parameters.
    pub key: String,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderElement {
    pub field: FieldDescriptor,
    pub descending: bool,
}

impl BatchItem {
    fn new(entity: Arc<EntityDescriptor>) -> BatchItem {
        BatchItem {
            entity,
            alias: make_table_alias(""),
            fields: vec![],
            where_: vec![],
            having: vec![],
            order_by: vec![],
            explicit_order: false,
            offset: None,
            count: None,
            join: None,
            children: vec![],
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.offset.is_some() || self.count.is_some()
    }

    /// Whether this batch or anything below it reads an aggregated field.
    pub fn has_aggregation(&self) -> bool {
        self.fields
            .iter()
            .any(|field| field.descriptor.is_aggregation)
            || self.children.iter().any(BatchItem::has_aggregation)
    }

    /// The fields that end up in the built objects.
    pub fn output_fields(&self) -> impl Iterator<Item = &BatchField> {
        self.fields.iter().filter(|field| !field.identifier_only)
    }

    pub fn field(&self, property: &str) -> Option<&BatchField> {
        self.fields
            .iter()
            .find(|field| field.descriptor.property.eq_ignore_ascii_case(property))
    }

    /// The result column holding a property of this batch.
    pub fn output_alias(&self, property: &str) -> String {
        format!("{}_{}", self.alias.name, property)
    }

    /// The result column carrying the parent's join key next to this batch's columns.
    pub fn foreign_key_alias(&self, parent: &BatchItem) -> Option<String> {
        self.join
            .as_ref()
            .map(|join| format!("FK_{}_{}", parent.alias.name, join.local.property))
    }

    /// Add a field, or upgrade an identifier-only one that is now requested.
    fn add_field(&mut self, descriptor: &FieldDescriptor, identifier_only: bool) {
        match self
            .fields
            .iter_mut()
            .find(|field| field.descriptor.property == descriptor.property)
        {
            Some(existing) => existing.identifier_only &= identifier_only,
            None => self.fields.push(BatchField {
                descriptor: descriptor.clone(),
                identifier_only,
                output_alias: String::new(),
            }),
        }
    }
}

/// Build the batch tree for a selection of objects of `entity`.
pub fn build_batch(
    env: &Env,
    entity: &Arc<EntityDescriptor>,
    selection: &Selection,
) -> Result<BatchItem, Error> {
    let primary = entity
        .primary_field()
        .ok_or_else(|| Error::InvalidPrimaryProperty {
            entity: entity.name.clone(),
            property: entity.primary_property.clone(),
        })?;

    let mut batch = BatchItem::new(entity.clone());

    for sub_selection in &selection.selections {
        if let Some(field) = entity.field(&sub_selection.name) {
            batch.add_field(field, false);
        } else if let Some(relationship) = entity.relationship(&sub_selection.name) {
            let local = relationship_field(entity, relationship, "local", entity)?;
            batch.add_field(local, true);

            let target = env.lookup_entity(&relationship.target)?;
            let foreign = relationship_field(entity, relationship, "foreign", &target)?;

            let mut child = build_batch(env, &target, sub_selection)?;
            child.join = Some(JoinInfo {
                property: relationship.property.clone(),
                cardinality: relationship.cardinality,
                local: local.clone(),
                foreign: foreign.clone(),
                join_table: relationship.join_table.as_ref().map(|join_table| JoinTableInfo {
                    table: join_table.table.clone(),
                    local_join_column: join_table.local_join_column.clone(),
                    foreign_join_column: join_table.foreign_join_column.clone(),
                    alias: make_table_alias(""),
                }),
            });
            batch.children.push(child);
        } else {
            tracing::debug!(
                entity = %entity.name,
                field = %sub_selection.name,
                "ignoring unmapped field"
            );
        }
    }

    batch.add_field(primary, true);

    let mut explicit_order = None;

    for (key, value) in &selection.arguments {
        let value = env.resolve(value);
        match key.as_str() {
            OFFSET => batch.offset = window_argument(key, &value)?,
            FETCH_COUNT => batch.count = window_argument(key, &value)?,
            ORDER_BY => explicit_order = Some(order_argument(entity, &value)?),
            GROUP_BY => {}
            _ if value.is_null() => {}
            _ => match entity.field(key) {
                Some(field) if field.is_aggregation => {
                    // group predicates only make sense on aggregates being read
                    let selected = batch
                        .field(&field.property)
                        .is_some_and(|selected| !selected.identifier_only);
                    if selected {
                        batch.having.push(WhereArg {
                            field: field.clone(),
                            key: key.clone(),
                            filter: Filter::parse(field, &value)?,
                        });
                    }
                }
                Some(field) if !key.starts_with('_') => batch.where_.push(WhereArg {
                    field: field.clone(),
                    key: key.clone(),
                    filter: Filter::parse(field, &value)?,
                }),
                _ => {
                    tracing::debug!(entity = %entity.name, argument = %key, "ignoring argument");
                }
            },
        }
    }

    match explicit_order {
        Some(order) if !order.is_empty() => {
            batch.order_by = order;
            batch.explicit_order = true;
        }
        _ => {
            let field =
                entity
                    .field(&entity.default_order)
                    .ok_or_else(|| Error::UnknownOrderField {
                        entity: entity.name.clone(),
                        field: entity.default_order.clone(),
                    })?;
            batch.order_by = vec![OrderElement {
                field: field.clone(),
                descending: true,
            }];
        }
    }

    Ok(batch)
}

/// Outside a grouped read there is nothing to order an aggregate by.
pub fn reject_aggregate_order(batch: &BatchItem) -> Result<(), Error> {
    if let Some(element) = batch
        .order_by
        .iter()
        .find(|element| element.field.is_aggregation)
    {
        return Err(Error::AggregateOrderField {
            entity: batch.entity.name.clone(),
            field: element.field.property.clone(),
        });
    }
    batch.children.iter().try_for_each(reject_aggregate_order)
}

fn relationship_field<'a>(
    entity: &EntityDescriptor,
    relationship: &RelationshipDescriptor,
    side: &'static str,
    owner: &'a EntityDescriptor,
) -> Result<&'a FieldDescriptor, Error> {
    let property = if side == "local" {
        &relationship.local_property
    } else {
        &relationship.foreign_property
    };
    owner
        .field(property)
        .ok_or_else(|| Error::InvalidRelationshipProperty {
            entity: entity.name.clone(),
            relationship: relationship.property.clone(),
            side,
            property: property.clone(),
        })
}

fn window_argument(key: &str, value: &serde_json::Value) -> Result<Option<u32>, Error> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_u64()
        .and_then(|number| u32::try_from(number).ok())
        .map(Some)
        .ok_or_else(|| Error::InvalidArgument {
            argument: key.to_string(),
            message: "expected a non-negative integer".to_string(),
        })
}

/// `_orderBy` takes one `{field, descending}` object or a list of them.
fn order_argument(
    entity: &EntityDescriptor,
    value: &serde_json::Value,
) -> Result<Vec<OrderElement>, Error> {
    let invalid = |message: &str| Error::InvalidArgument {
        argument: ORDER_BY.to_string(),
        message: message.to_string(),
    };

    let elements = match value {
        serde_json::Value::Null => return Ok(vec![]),
        serde_json::Value::Array(elements) => elements.iter().collect::<Vec<_>>(),
        element => vec![element],
    };

    elements
        .into_iter()
        .map(|element| {
            let name = element
                .get("field")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| invalid("expected objects with a 'field' name"))?;
            let descending = match element.get("descending") {
                None | Some(serde_json::Value::Null) => false,
                Some(serde_json::Value::Bool(descending)) => *descending,
                Some(_) => return Err(invalid("'descending' must be a boolean")),
            };
            let field = entity
                .field(name)
                .ok_or_else(|| Error::UnknownOrderField {
                    entity: entity.name.clone(),
                    field: name.to_string(),
                })?;
            Ok(OrderElement {
                field: field.clone(),
                descending,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::tests::registry;
    use crate::translation::request::Variables;
    use serde_json::json;

    fn build(selection: &Selection) -> Result<BatchItem, Error> {
        let registry = registry();
        let variables = Variables::new();
        let env = Env::new(&registry, &variables);
        let entity = env.lookup_entity("ToDo")?;
        build_batch(&env, &entity, selection)
    }

    fn properties(batch: &BatchItem) -> Vec<(&str, bool)> {
        batch
            .fields
            .iter()
            .map(|field| (field.descriptor.property.as_str(), field.identifier_only))
            .collect()
    }

    #[test]
    fn primary_key_is_added_as_identifier() {
        let batch = build(&Selection::new("toDos").field("text")).unwrap();
        assert_eq!(properties(&batch), vec![("Text", false), ("Id", true)]);
    }

    #[test]
    fn fields_are_matched_ignoring_case_and_deduplicated() {
        let batch = build(
            &Selection::new("toDos")
                .field("ID")
                .field("text")
                .field("Text")
                .field("nonsense"),
        )
        .unwrap();
        assert_eq!(properties(&batch), vec![("Id", false), ("Text", false)]);
    }

    #[test]
    fn relationships_add_the_local_key_and_a_child() {
        let batch = build(
            &Selection::new("toDos")
                .field("text")
                .field(Selection::new("tags").field("name")),
        )
        .unwrap();

        assert_eq!(
            properties(&batch),
            vec![("Text", false), ("Id", true)]
        );
        let child = &batch.children[0];
        let join = child.join.as_ref().unwrap();
        assert_eq!(join.property, "Tags");
        assert_eq!(join.local.property, "Id");
        assert_eq!(join.foreign.property, "ToDoId");
        assert_eq!(properties(child), vec![("Name", false), ("Id", true)]);
    }

    #[test]
    fn reserved_arguments_set_the_window_and_order() {
        let batch = build(
            &Selection::new("toDos")
                .field("id")
                .argument(OFFSET, json!(20))
                .argument(FETCH_COUNT, json!(10))
                .argument(ORDER_BY, json!({ "field": "text" }))
                .argument(GROUP_BY, json!(["text"])),
        )
        .unwrap();

        assert_eq!((batch.offset, batch.count), (Some(20), Some(10)));
        assert!(batch.explicit_order);
        assert_eq!(batch.order_by.len(), 1);
        assert_eq!(batch.order_by[0].field.property, "Text");
        assert!(!batch.order_by[0].descending);
        assert!(batch.where_.is_empty());
    }

    #[test]
    fn default_order_is_descending() {
        let batch = build(&Selection::new("toDos").field("id")).unwrap();
        assert!(!batch.explicit_order);
        assert_eq!(batch.order_by[0].field.property, "DueDate");
        assert!(batch.order_by[0].descending);
    }

    #[test]
    fn negative_windows_are_rejected() {
        let result = build(
            &Selection::new("toDos")
                .field("id")
                .argument(FETCH_COUNT, json!(-1)),
        );
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn unknown_order_fields_are_rejected() {
        let result = build(
            &Selection::new("toDos")
                .field("id")
                .argument(ORDER_BY, json!([{ "field": "nope", "descending": true }])),
        );
        assert_eq!(
            result,
            Err(Error::UnknownOrderField {
                entity: "ToDo".to_string(),
                field: "nope".to_string()
            })
        );
    }

    #[test]
    fn aggregate_arguments_become_group_predicates() {
        let batch = build(
            &Selection::new("toDos")
                .field("completed")
                .field("_count")
                .argument("_count", json!({ "gt": 1 }))
                .argument("completed", json!(true))
                .argument("text", serde_json::Value::Null),
        )
        .unwrap();

        assert_eq!(batch.having.len(), 1);
        assert_eq!(batch.having[0].key, "_count");
        assert_eq!(batch.where_.len(), 1);
        assert_eq!(batch.where_[0].field.property, "Completed");
        assert!(batch.has_aggregation());
    }

    #[test]
    fn group_predicates_need_the_aggregate_selected() {
        let batch = build(
            &Selection::new("toDos")
                .field("completed")
                .argument("_count", json!({ "gt": 1 })),
        )
        .unwrap();
        assert!(batch.having.is_empty());
    }

    #[test]
    fn variables_feed_arguments() {
        let registry = registry();
        let variables = Variables::from([("limit".to_string(), json!(5))]);
        let env = Env::new(&registry, &variables);
        let entity = env.lookup_entity("ToDo").unwrap();

        let batch = build_batch(
            &env,
            &entity,
            &Selection::new("toDos")
                .field("id")
                .variable_argument(FETCH_COUNT, "limit")
                .variable_argument(OFFSET, "unbound"),
        )
        .unwrap();

        assert_eq!((batch.offset, batch.count), (None, Some(5)));
    }
}
