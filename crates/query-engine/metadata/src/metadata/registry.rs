//! The registry of entity descriptors handed to the query compiler and the materializer.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::database::EntityDescriptor;
use super::Metadata;

/// Implemented once per entity type to describe how it maps onto a table.
pub trait Entity {
    /// The name requests and relationships refer to the entity by.
    const NAME: &'static str;

    fn descriptor() -> EntityDescriptor;
}

/// Entity descriptors by name.
///
/// Descriptors are immutable once registered. Registration is insert-if-absent,
/// so concurrent first uses of the same entity agree on a single descriptor.
#[derive(Debug, Default)]
pub struct Registry {
    entities: RwLock<BTreeMap<String, Arc<EntityDescriptor>>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Build a registry from entities described in configuration.
    pub fn from_metadata(metadata: &Metadata) -> Registry {
        let registry = Registry::new();
        for (name, descriptor) in &metadata.entities.0 {
            let mut descriptor = descriptor.clone();
            descriptor.name.clone_from(name);
            registry.insert(descriptor);
        }
        registry
    }

    /// Register a descriptor unless one with the same name exists already.
    /// Returns the descriptor that ends up registered.
    pub fn insert(&self, descriptor: EntityDescriptor) -> Arc<EntityDescriptor> {
        if let Some(existing) = self.lookup(&descriptor.name) {
            return existing;
        }
        let mut entities = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entities
            .entry(descriptor.name.clone())
            .or_insert_with(|| {
                tracing::debug!(entity = %descriptor.name, "registering entity descriptor");
                Arc::new(descriptor.with_count_field())
            })
            .clone()
    }

    /// The descriptor of a statically described entity, registering it on first use.
    pub fn register<E: Entity>(&self) -> Arc<EntityDescriptor> {
        match self.lookup(E::NAME) {
            Some(descriptor) => descriptor,
            None => {
                let mut descriptor = E::descriptor();
                descriptor.name = E::NAME.to_string();
                self.insert(descriptor)
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::database::{FieldDescriptor, ValueType, COUNT_FIELD};

    struct Note;

    impl Entity for Note {
        const NAME: &'static str = "Note";

        fn descriptor() -> EntityDescriptor {
            EntityDescriptor {
                name: String::new(),
                table: "Notes".to_string(),
                primary_property: "Id".to_string(),
                default_order: "Id".to_string(),
                extra_criteria: None,
                fields: vec![FieldDescriptor::new("Id", ValueType::Int)],
                relationships: vec![],
            }
        }
    }

    #[test]
    fn static_entities_register_lazily_and_once() {
        let registry = Registry::new();
        assert!(registry.lookup("Note").is_none());

        let first = registry.register::<Note>();
        let second = registry.register::<Note>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "Note");
        assert!(first.field(COUNT_FIELD).is_some());
    }

    #[test]
    fn insert_keeps_the_first_descriptor() {
        let registry = Registry::new();
        let mut original = Note::descriptor();
        original.name = "Note".to_string();
        let mut other = original.clone();
        other.table = "Other".to_string();

        registry.insert(original);
        let kept = registry.insert(other);

        assert_eq!(kept.table, "Notes");
        assert_eq!(registry.entity_names(), vec!["Note".to_string()]);
    }

    #[test]
    fn concurrent_registration_agrees() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register::<Note>())
            })
            .collect();
        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for descriptor in &descriptors {
            assert!(Arc::ptr_eq(descriptor, &descriptors[0]));
        }
    }
}
