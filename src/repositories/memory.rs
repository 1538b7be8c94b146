use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{compare_values, decimal_at, lookup, Filter, FindOptions, Store};

/// In-process store. Each collection sits behind its own map shard lock,
/// so every operation on a collection is applied atomically.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn has_id(document: &Value, id: Uuid) -> bool {
    document.get("id").and_then(Value::as_str) == Some(id.to_string().as_str())
}

fn set_path(document: &mut Value, field: &str, value: Value) {
    if !document.is_object() {
        *document = Value::Object(Map::new());
    }
    let Value::Object(fields) = document else {
        return;
    };

    match field.split_once('.') {
        Some((head, rest)) => {
            let child = fields.entry(head.to_string()).or_insert(Value::Null);
            set_path(child, rest, value);
        }
        None => {
            fields.insert(field.to_string(), value);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(
        &self,
        collection: &str,
        id: Uuid,
        document: Value,
    ) -> Result<(), anyhow::Error> {
        let mut documents = self.collections.entry(collection.to_string()).or_default();
        if documents.iter().any(|d| has_id(d, id)) {
            anyhow::bail!("duplicate key {} in {}", id, collection);
        }

        documents.push(document);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, anyhow::Error> {
        let Some(documents) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Value> = documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        drop(documents);

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                let ordering = compare_values(lookup(a, &sort.field), lookup(b, &sort.field));
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, anyhow::Error> {
        Ok(self
            .collections
            .get(collection)
            .map(|documents| documents.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn replace(
        &self,
        collection: &str,
        id: Uuid,
        document: Value,
    ) -> Result<bool, anyhow::Error> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(false);
        };

        match documents.iter_mut().find(|d| has_id(d, id)) {
            Some(current) => {
                *current = document;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_where(
        &self,
        collection: &str,
        id: Uuid,
        guard: &Filter,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, anyhow::Error> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(None);
        };

        let Some(current) = documents
            .iter_mut()
            .find(|d| has_id(d, id) && guard.matches(d))
        else {
            return Ok(None);
        };

        if let Value::Object(fields) = &mut *current {
            fields.extend(patch);
        }
        Ok(Some(current.clone()))
    }

    async fn increment(
        &self,
        collection: &str,
        id: Uuid,
        field: &str,
        delta: Decimal,
        allow_negative: bool,
    ) -> Result<Option<Value>, anyhow::Error> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(current) = documents.iter_mut().find(|d| has_id(d, id)) else {
            return Ok(None);
        };

        let Some(balance) = decimal_at(current, field) else {
            anyhow::bail!("{} in {} {} is not a decimal", field, collection, id);
        };
        let updated = balance + delta;
        if updated.is_sign_negative() && !updated.is_zero() && !allow_negative {
            return Ok(None);
        }

        set_path(current, field, json!(updated.to_string()));
        set_path(current, "updatedAt", json!(Utc::now()));
        Ok(Some(current.clone()))
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, anyhow::Error> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|d| !filter.matches(d));
        Ok((before - documents.len()) as u64)
    }
}
