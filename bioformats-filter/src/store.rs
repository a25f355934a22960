//! Persistence collaborator for parameter sets.

use crate::error::StoreError;
use crate::types::{ParameterKind, ParameterName, ParameterSetId, ParameterValue, Schema, TypedParameter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage of parameter sets and the per-schema name registry.
///
/// The schema itself is owned by the host; implementations only need to
/// record names and values against it.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// The existing set for `(schema, file_id)`, if any.
    async fn find_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<Option<ParameterSetId>, StoreError>;

    /// Creates an empty set. Fails with [`StoreError::Duplicate`] when one exists.
    async fn create_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<ParameterSetId, StoreError>;

    /// Every name registered in `schema`.
    async fn parameter_names(&self, schema: &Schema) -> Result<Vec<ParameterName>, StoreError>;

    /// Registers `name` with `kind` unless it exists; returns the stored descriptor.
    async fn ensure_parameter_name(
        &self,
        schema: &Schema,
        name: &str,
        kind: ParameterKind,
    ) -> Result<ParameterName, StoreError>;

    /// Appends one value to a set.
    async fn append_parameter(
        &self,
        set: ParameterSetId,
        name: &ParameterName,
        value: ParameterValue,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    sets: HashMap<(Schema, u64), ParameterSetId>,
    names: Vec<ParameterName>,
    values: HashMap<ParameterSetId, Vec<TypedParameter>>,
}

/// In-memory store used by tests and the worker host.
#[derive(Debug, Clone, Default)]
pub struct MemoryParameterStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryParameterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Values appended to `set`, in append order.
    pub async fn parameters(&self, set: ParameterSetId) -> Vec<TypedParameter> {
        self.tables
            .lock()
            .await
            .values
            .get(&set)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of parameter sets across all schemas.
    pub async fn set_count(&self) -> usize {
        self.tables.lock().await.sets.len()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn find_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<Option<ParameterSetId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.sets.get(&(schema.clone(), file_id)).copied())
    }

    async fn create_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<ParameterSetId, StoreError> {
        let mut tables = self.tables.lock().await;
        let key = (schema.clone(), file_id);
        if let Some(existing) = tables.sets.get(&key) {
            return Err(StoreError::Duplicate {
                schema: schema.namespace.clone(),
                file_id,
                existing: *existing,
            });
        }
        tables.next_id += 1;
        let id = ParameterSetId(tables.next_id);
        tables.sets.insert(key, id);
        tables.values.insert(id, Vec::new());
        Ok(id)
    }

    async fn parameter_names(&self, schema: &Schema) -> Result<Vec<ParameterName>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .names
            .iter()
            .filter(|n| n.schema == *schema)
            .cloned()
            .collect())
    }

    async fn ensure_parameter_name(
        &self,
        schema: &Schema,
        name: &str,
        kind: ParameterKind,
    ) -> Result<ParameterName, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .names
            .iter()
            .find(|n| n.schema == *schema && n.name == name)
        {
            return Ok(existing.clone());
        }
        let descriptor = ParameterName {
            schema: schema.clone(),
            name: name.to_string(),
            kind,
        };
        tables.names.push(descriptor.clone());
        Ok(descriptor)
    }

    async fn append_parameter(
        &self,
        set: ParameterSetId,
        name: &ParameterName,
        value: ParameterValue,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let values = tables.values.get_mut(&set).ok_or(StoreError::UnknownSet(set))?;
        values.push(TypedParameter {
            name: name.name.clone(),
            kind: name.kind,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new("http://example.org/bioformats/metadata", "bioformats")
    }

    #[tokio::test]
    async fn test_one_set_per_schema_and_file() {
        let store = MemoryParameterStore::new();
        assert_eq!(store.find_parameter_set(&schema(), 1).await.unwrap(), None);

        let id = store.create_parameter_set(&schema(), 1).await.unwrap();
        assert_eq!(store.find_parameter_set(&schema(), 1).await.unwrap(), Some(id));

        match store.create_parameter_set(&schema(), 1).await.unwrap_err() {
            StoreError::Duplicate { existing, .. } => assert_eq!(existing, id),
            other => panic!("unexpected error: {other}"),
        }

        let other = Schema::new("http://example.org/bioformats/preview", "preview");
        let second = store.create_parameter_set(&other, 1).await.unwrap();
        assert_ne!(id, second);
        assert_eq!(store.set_count().await, 2);
    }

    #[tokio::test]
    async fn test_ensure_name_keeps_first_kind() {
        let store = MemoryParameterStore::new();
        let first = store
            .ensure_parameter_name(&schema(), "width", ParameterKind::Numeric)
            .await
            .unwrap();
        let again = store
            .ensure_parameter_name(&schema(), "width", ParameterKind::Text)
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(again.kind, ParameterKind::Numeric);
        assert_eq!(store.parameter_names(&schema()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = MemoryParameterStore::new();
        let set = store.create_parameter_set(&schema(), 4).await.unwrap();
        let name = store
            .ensure_parameter_name(&schema(), "image_information", ParameterKind::Text)
            .await
            .unwrap();
        for line in ["b", "a"] {
            store
                .append_parameter(set, &name, ParameterValue::Text(line.into()))
                .await
                .unwrap();
        }
        let texts: Vec<_> = store
            .parameters(set)
            .await
            .into_iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(
            texts,
            vec![ParameterValue::Text("b".into()), ParameterValue::Text("a".into())]
        );
    }

    #[tokio::test]
    async fn test_append_to_unknown_set() {
        let store = MemoryParameterStore::new();
        let name = store
            .ensure_parameter_name(&schema(), "x", ParameterKind::Text)
            .await
            .unwrap();
        let err = store
            .append_parameter(ParameterSetId(99), &name, ParameterValue::Text("v".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownSet(ParameterSetId(99))));
    }
}
