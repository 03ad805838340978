//! `DocumentStore` over one `DashMap` per collection.
//!
//! Single-document operations hold the shard lock of that document for their
//! whole duration, which makes `insert` a check-and-set on the id and every
//! `update_by_id` patch atomic. `update_many` and `delete_many` visit matching
//! documents one at a time.
//!
//! Unique keys (`domains::unique_keys`) are claimed in a side map before a
//! document takes them and released when it drops them, so two documents
//! never hold the same key even when their writes race.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use domains::{
    unique_keys, AppError, Collection, DocumentStore, Filter, FindOptions, Patch, Result,
};

use super::document_id;

pub struct MemoryDocumentStore {
    collections: HashMap<Collection, DashMap<Uuid, Value>>,
    /// unique key -> id of the document holding it
    claims: DashMap<(Collection, String), Uuid>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Collection::ALL
                .into_iter()
                .map(|collection| (collection, DashMap::new()))
                .collect(),
            claims: DashMap::new(),
        }
    }

    fn table(&self, collection: Collection) -> Result<&DashMap<Uuid, Value>> {
        self.collections
            .get(&collection)
            .ok_or_else(|| AppError::Internal(format!("unknown collection {collection}")))
    }

    /// Ids of matching documents, collected before any mutation so no shard
    /// lock is held across iteration.
    fn matching_ids(&self, table: &DashMap<Uuid, Value>, filter: &Filter) -> Vec<Uuid> {
        table
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Claims every key for `id` and returns the ones newly taken. On a clash
    /// those are released again and nothing changes.
    fn claim(&self, collection: Collection, id: Uuid, keys: &[String]) -> Result<Vec<String>> {
        let mut taken = Vec::new();
        for key in keys {
            match self.claims.entry((collection, key.clone())) {
                Entry::Occupied(owner) if *owner.get() != id => {
                    drop(owner);
                    self.release(collection, id, &taken);
                    return Err(AppError::Conflict(format!("{collection} {key} is already taken")));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(id);
                    taken.push(key.clone());
                }
            }
        }
        Ok(taken)
    }

    fn release(&self, collection: Collection, id: Uuid, keys: &[String]) {
        for key in keys {
            self.claims
                .remove_if(&(collection, key.clone()), |_, owner| *owner == id);
        }
    }

    /// Applies the patch to a locked document, moving its unique claims along.
    fn patch_in_place(
        &self,
        collection: Collection,
        id: Uuid,
        doc: &mut Value,
        patch: &Patch,
    ) -> Result<()> {
        let mut next = doc.clone();
        patch.apply(&mut next);
        let before = unique_keys(collection, doc);
        let after = unique_keys(collection, &next);
        self.claim(collection, id, &after)?;
        let dropped: Vec<String> = before.into_iter().filter(|k| !after.contains(k)).collect();
        self.release(collection, id, &dropped);
        *doc = next;
        Ok(())
    }
}

fn not_found(collection: Collection, id: Uuid) -> AppError {
    AppError::NotFound {
        entity: collection.as_str(),
        id: id.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_by_id(&self, collection: Collection, id: Uuid) -> Result<Value> {
        self.table(collection)?
            .get(&id)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| not_found(collection, id))
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let mut docs: Vec<Value> = self
            .table(collection)?
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| options.compare(a, b));
        let docs = docs.into_iter().skip(options.skip);
        Ok(match options.limit {
            Some(limit) => docs.take(limit).collect(),
            None => docs.collect(),
        })
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let count = self
            .table(collection)?
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, collection: Collection, doc: Value) -> Result<Value> {
        let id = document_id(&doc)?;
        let table = self.table(collection)?;
        let keys = unique_keys(collection, &doc);
        if table.contains_key(&id) {
            return Err(AppError::Conflict(format!(
                "{collection} document {id} already exists"
            )));
        }
        let taken = self.claim(collection, id, &keys)?;
        match table.entry(id) {
            Entry::Occupied(_) => {
                self.release(collection, id, &taken);
                Err(AppError::Conflict(format!(
                    "{collection} document {id} already exists"
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                Ok(doc)
            }
        }
    }

    async fn update_by_id(&self, collection: Collection, id: Uuid, patch: &Patch) -> Result<Value> {
        let table = self.table(collection)?;
        let mut doc = table.get_mut(&id).ok_or_else(|| not_found(collection, id))?;
        self.patch_in_place(collection, id, doc.value_mut(), patch)?;
        Ok(doc.value().clone())
    }

    async fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64> {
        let table = self.table(collection)?;
        let mut updated = 0;
        for id in self.matching_ids(table, filter) {
            if let Some(mut doc) = table.get_mut(&id) {
                // re-check under the lock: the document may have changed since the scan
                if filter.matches(doc.value()) {
                    self.patch_in_place(collection, id, doc.value_mut(), patch)?;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn delete_by_id(&self, collection: Collection, id: Uuid) -> Result<Value> {
        let (_, doc) = self
            .table(collection)?
            .remove(&id)
            .ok_or_else(|| not_found(collection, id))?;
        self.release(collection, id, &unique_keys(collection, &doc));
        Ok(doc)
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let table = self.table(collection)?;
        let mut removed = 0;
        for id in self.matching_ids(table, filter) {
            if let Some((_, doc)) = table.remove_if(&id, |_, doc| filter.matches(doc)) {
                self.release(collection, id, &unique_keys(collection, &doc));
                removed += 1;
            }
        }
        Ok(removed)
    }
}
