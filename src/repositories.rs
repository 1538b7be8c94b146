use std::{cmp::Ordering, collections::HashMap, marker::PhantomData, str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Predicate over a stored document. Fields are dotted camelCase paths
/// (`balances.main`); a missing field compares equal to `null`.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Serialize) -> Self {
        Filter::Eq(field.to_string(), to_value(value))
    }

    pub fn ne(field: &str, value: impl Serialize) -> Self {
        Filter::Ne(field.to_string(), to_value(value))
    }

    pub fn is_in<V: Serialize>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.to_string(), values.into_iter().map(to_value).collect())
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// AND-combines two filters, collapsing `All` operands.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) => other,
            (this, Filter::All) => this,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => lookup(document, field) == value,
            Filter::Ne(field, value) => lookup(document, field) != value,
            Filter::In(field, values) => {
                let current = lookup(document, field);
                values.iter().any(|v| v == current)
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(document)),
        }
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

static NULL: Value = Value::Null;

pub fn lookup<'a>(document: &'a Value, field: &str) -> &'a Value {
    field
        .split('.')
        .try_fold(document, |current, key| current.get(key))
        .unwrap_or(&NULL)
}

/// Orders two field values: timestamps chronologically, decimals
/// numerically, anything else by its JSON text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            if let (Ok(x), Ok(y)) = (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                return x.cmp(&y);
            }
            if let (Ok(x), Ok(y)) = (Decimal::from_str(x), Decimal::from_str(y)) {
                return x.cmp(&y);
            }
            x.cmp(y)
        }
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

pub fn decimal_at(document: &Value, field: &str) -> Option<Decimal> {
    match lookup(document, field) {
        Value::Null => Some(Decimal::ZERO),
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Document collection backend. Documents are JSON objects carrying their
/// own `id`, `createdAt` and `updatedAt` fields.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert(&self, collection: &str, id: Uuid, document: Value)
        -> Result<(), anyhow::Error>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, anyhow::Error>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, anyhow::Error>;

    /// Overwrites a whole document. Returns false if it does not exist.
    async fn replace(&self, collection: &str, id: Uuid, document: Value)
        -> Result<bool, anyhow::Error>;

    /// Merges `patch` into the document only if it currently matches `guard`.
    async fn update_where(
        &self,
        collection: &str,
        id: Uuid,
        guard: &Filter,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, anyhow::Error>;

    /// Atomically adds `delta` to a decimal field. With `allow_negative`
    /// false the update is refused (returns `None`) when the result would
    /// drop below zero.
    async fn increment(
        &self,
        collection: &str,
        id: Uuid,
        field: &str,
        delta: Decimal,
        allow_negative: bool,
    ) -> Result<Option<Value>, anyhow::Error>;

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, anyhow::Error>;
}

pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Soft-deleted documents keep their row and get `isDeleted: true`.
    const SOFT_DELETE: bool = false;

    fn id(&self) -> Uuid;
}

pub struct Repository<T> {
    store: Arc<dyn Store>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _document: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _document: PhantomData,
        }
    }

    pub fn query(&self, filter: Filter) -> Query<'_, T> {
        Query {
            repository: self,
            filter,
            owner: None,
            include_deleted: false,
            options: FindOptions::default(),
        }
    }

    /// Looks a document up by its textual id. Malformed ids yield `None`.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>, anyhow::Error> {
        match Uuid::parse_str(id) {
            Ok(id) => self.get(id).await,
            Err(_) => Ok(None),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<T>, anyhow::Error> {
        self.query(Filter::eq("id", id)).one().await
    }

    pub async fn insert(&self, document: &T) -> Result<(), anyhow::Error> {
        let value = serde_json::to_value(document)?;
        self.store.insert(T::COLLECTION, document.id(), value).await
    }

    /// Persists the whole document and refreshes its `updatedAt`.
    pub async fn save(&self, document: &T) -> Result<T, anyhow::Error> {
        let mut value = serde_json::to_value(document)?;
        if let Value::Object(fields) = &mut value {
            fields.insert("updatedAt".to_string(), json!(Utc::now()));
        }

        let saved = self
            .store
            .replace(T::COLLECTION, document.id(), value.clone())
            .await?;
        if !saved {
            anyhow::bail!("{} {} no longer exists", T::COLLECTION, document.id());
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Compare-and-set: applies `patch` only while the document matches `guard`.
    pub async fn transition(
        &self,
        id: Uuid,
        guard: Filter,
        patch: Value,
    ) -> Result<Option<T>, anyhow::Error> {
        let mut fields = match patch {
            Value::Object(fields) => fields,
            other => anyhow::bail!("patch must be an object, got {}", other),
        };
        fields.insert("updatedAt".to_string(), json!(Utc::now()));

        let updated = self
            .store
            .update_where(T::COLLECTION, id, &guard, fields)
            .await?;

        updated
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub async fn increment(
        &self,
        id: Uuid,
        field: &str,
        delta: Decimal,
        allow_negative: bool,
    ) -> Result<Option<T>, anyhow::Error> {
        let updated = self
            .store
            .increment(T::COLLECTION, id, field, delta, allow_negative)
            .await?;

        updated
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Returns false when nothing was deleted.
    pub async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        if T::SOFT_DELETE {
            let deleted = self
                .transition(id, Filter::ne("isDeleted", true), json!({ "isDeleted": true }))
                .await?;
            return Ok(deleted.is_some());
        }

        let removed = self
            .store
            .delete(T::COLLECTION, &Filter::eq("id", id))
            .await?;
        Ok(removed > 0)
    }

    pub async fn delete_where(&self, filter: Filter) -> Result<u64, anyhow::Error> {
        self.store.delete(T::COLLECTION, &filter).await
    }

    /// Resolves foreign references in one round trip. Soft-deleted
    /// documents are included so that historical records still resolve.
    pub async fn populate(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<HashMap<Uuid, T>, anyhow::Error> {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let documents = self
            .query(Filter::is_in("id", ids))
            .with_deleted()
            .all()
            .await?;

        Ok(documents.into_iter().map(|d| (d.id(), d)).collect())
    }
}

/// Lazily built lookup; nothing touches the store until `all`, `one` or
/// `count` is awaited.
pub struct Query<'a, T> {
    repository: &'a Repository<T>,
    filter: Filter,
    owner: Option<Filter>,
    include_deleted: bool,
    options: FindOptions,
}

impl<'a, T: Document> Query<'a, T> {
    /// Restricts the query to `owner` unless the caller may see all accounts.
    pub fn scoped(mut self, all_accounts: bool, owner: Filter) -> Self {
        self.owner = if all_accounts { None } else { Some(owner) };
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn newest_first(self) -> Self {
        self.sort("createdAt", true)
    }

    pub fn sort(mut self, field: &str, descending: bool) -> Self {
        self.options.sort = Some(Sort {
            field: field.to_string(),
            descending,
        });
        self
    }

    pub fn skip(mut self, skip: Option<u64>) -> Self {
        self.options.skip = skip;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.options.limit = limit;
        self
    }

    pub fn filter(&self) -> Filter {
        let mut filter = self.filter.clone();
        if let Some(owner) = &self.owner {
            filter = filter.and(owner.clone());
        }
        if T::SOFT_DELETE && !self.include_deleted {
            filter = filter.and(Filter::ne("isDeleted", true));
        }
        filter
    }

    pub async fn all(self) -> Result<Vec<T>, anyhow::Error> {
        let filter = self.filter();
        let documents = self
            .repository
            .store
            .find(T::COLLECTION, &filter, &self.options)
            .await?;

        documents
            .into_iter()
            .map(|d| serde_json::from_value(d).map_err(Into::into))
            .collect()
    }

    pub async fn one(mut self) -> Result<Option<T>, anyhow::Error> {
        self.options.limit = Some(1);
        Ok(self.all().await?.into_iter().next())
    }

    pub async fn count(self) -> Result<u64, anyhow::Error> {
        let filter = self.filter();
        self.repository.store.count(T::COLLECTION, &filter).await
    }
}
