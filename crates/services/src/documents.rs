//! Typed access to the document store.
//!
//! Adapters speak `serde_json::Value`; services speak entities. This wrapper
//! does the encoding and relabels store `NotFound` errors with the entity name
//! so user-facing messages read "Question not found." rather than naming a
//! collection.

use std::sync::Arc;

use domains::{AppError, Document, DocumentStore, Filter, FindOptions, Patch, Result};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone)]
pub struct Documents {
    store: Arc<dyn DocumentStore>,
}

impl Documents {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get<T: Document>(&self, id: Uuid) -> Result<T> {
        let doc = self
            .store
            .get_by_id(T::COLLECTION, id)
            .await
            .map_err(|err| relabel::<T>(err, id))?;
        decode(doc)
    }

    pub async fn find<T: Document>(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<T>> {
        self.store
            .find(T::COLLECTION, filter, options)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find_one<T: Document>(&self, filter: &Filter) -> Result<Option<T>> {
        let options = FindOptions::default().page(0, 1);
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    pub async fn count<T: Document>(&self, filter: &Filter) -> Result<u64> {
        self.store.count(T::COLLECTION, filter).await
    }

    pub async fn insert<T: Document>(&self, doc: &T) -> Result<T> {
        let stored = self
            .store
            .insert(T::COLLECTION, serde_json::to_value(doc)?)
            .await?;
        decode(stored)
    }

    pub async fn update<T: Document>(&self, id: Uuid, patch: &Patch) -> Result<T> {
        let doc = self
            .store
            .update_by_id(T::COLLECTION, id, patch)
            .await
            .map_err(|err| relabel::<T>(err, id))?;
        decode(doc)
    }

    pub async fn update_many<T: Document>(&self, filter: &Filter, patch: &Patch) -> Result<u64> {
        self.store.update_many(T::COLLECTION, filter, patch).await
    }

    pub async fn delete<T: Document>(&self, id: Uuid) -> Result<T> {
        let doc = self
            .store
            .delete_by_id(T::COLLECTION, id)
            .await
            .map_err(|err| relabel::<T>(err, id))?;
        decode(doc)
    }

    pub async fn delete_many<T: Document>(&self, filter: &Filter) -> Result<u64> {
        self.store.delete_many(T::COLLECTION, filter).await
    }
}

fn decode<T: Document>(doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(AppError::from)
}

fn relabel<T: Document>(err: AppError, id: Uuid) -> AppError {
    match err {
        AppError::NotFound { .. } => AppError::not_found(T::ENTITY, id),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Collection, MockDocumentStore, Question};

    #[tokio::test]
    async fn not_found_is_labelled_with_the_entity() {
        let mut store = MockDocumentStore::new();
        store
            .expect_get_by_id()
            .returning(|collection, id| Err(AppError::not_found(collection.as_str(), id)));
        let docs = Documents::new(Arc::new(store));

        let err = docs.get::<Question>(Uuid::nil()).await.unwrap_err();
        assert_eq!(err.user_message(), "Question not found.");
    }

    #[tokio::test]
    async fn find_one_limits_to_a_single_document() {
        let mut store = MockDocumentStore::new();
        store
            .expect_find()
            .withf(|collection, _, options| {
                *collection == Collection::Questions && options.limit == Some(1)
            })
            .returning(|_, _, _| Ok(vec![]));
        let docs = Documents::new(Arc::new(store));

        let found = docs.find_one::<Question>(&Filter::new()).await.unwrap();
        assert!(found.is_none());
    }
}
