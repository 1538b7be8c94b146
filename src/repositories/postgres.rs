use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Filter, FindOptions, Store};

/// Keeps every collection in the `documents` table as JSONB rows.
#[derive(Clone)]
pub struct PgStore {
    conn: PgPool,
}

impl PgStore {
    pub fn new(conn: PgPool) -> Self {
        PgStore { conn }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;
        Ok(())
    }
}

fn path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

// Postgres rejects negative LIMIT and OFFSET values.
fn bound(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_field(builder: &mut QueryBuilder<'_, Postgres>, field: &str) {
    builder.push("COALESCE(data #> ");
    builder.push_bind(path(field));
    builder.push(", 'null'::jsonb)");
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::Eq(field, value) => {
            push_field(builder, field);
            builder.push(" = ");
            builder.push_bind(value.clone());
            builder.push("::jsonb");
        }
        Filter::Ne(field, value) => {
            push_field(builder, field);
            builder.push(" <> ");
            builder.push_bind(value.clone());
            builder.push("::jsonb");
        }
        Filter::In(field, values) => {
            let alternatives: Vec<Filter> = values
                .iter()
                .map(|v| Filter::Eq(field.clone(), v.clone()))
                .collect();
            push_group(builder, &alternatives, " OR ", "FALSE");
        }
        Filter::And(filters) => push_group(builder, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_group(builder, filters, " OR ", "FALSE"),
    }
}

fn push_group(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter],
    separator: &str,
    empty: &str,
) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }

    builder.push("(");
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            builder.push(separator);
        }
        push_filter(builder, filter);
    }
    builder.push(")");
}

fn scoped<'a>(prefix: &str, collection: &str, filter: &Filter) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(prefix);
    builder.push(" WHERE collection = ");
    builder.push_bind(collection.to_string());
    builder.push(" AND ");
    push_filter(&mut builder, filter);
    builder
}

#[async_trait]
impl Store for PgStore {
    async fn insert(
        &self,
        collection: &str,
        id: Uuid,
        document: Value,
    ) -> Result<(), anyhow::Error> {
        let created_at = document
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
                INSERT INTO documents (collection, id, data, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(document)
        .bind(created_at)
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, anyhow::Error> {
        let mut builder = scoped("SELECT data FROM documents", collection, filter);

        if let Some(sort) = &options.sort {
            match sort.field.as_str() {
                "createdAt" => {
                    builder.push(" ORDER BY created_at");
                }
                "updatedAt" => {
                    builder.push(" ORDER BY updated_at");
                }
                field => {
                    builder.push(" ORDER BY data #> ");
                    builder.push_bind(path(field));
                }
            }
            builder.push(if sort.descending { " DESC" } else { " ASC" });
            builder.push(", id");
        }
        if let Some(limit) = options.limit {
            builder.push(" LIMIT ");
            builder.push_bind(bound(limit));
        }
        if let Some(skip) = options.skip {
            builder.push(" OFFSET ");
            builder.push_bind(bound(skip));
        }

        let documents = builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.conn)
            .await?;

        Ok(documents)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, anyhow::Error> {
        let mut builder = scoped("SELECT COUNT(*) FROM documents", collection, filter);
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.conn)
            .await?;

        Ok(count as u64)
    }

    async fn replace(
        &self,
        collection: &str,
        id: Uuid,
        document: Value,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE documents SET data = $3, updated_at = CURRENT_TIMESTAMP WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(document)
        .execute(&self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_where(
        &self,
        collection: &str,
        id: Uuid,
        guard: &Filter,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, anyhow::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE documents SET data = data || ");
        builder.push_bind(Value::Object(patch));
        builder.push("::jsonb, updated_at = CURRENT_TIMESTAMP WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND id = ");
        builder.push_bind(id);
        builder.push(" AND ");
        push_filter(&mut builder, guard);
        builder.push(" RETURNING data");

        let updated = builder
            .build_query_scalar::<Value>()
            .fetch_optional(&self.conn)
            .await?;

        Ok(updated)
    }

    async fn increment(
        &self,
        collection: &str,
        id: Uuid,
        field: &str,
        delta: Decimal,
        allow_negative: bool,
    ) -> Result<Option<Value>, anyhow::Error> {
        let mut statement = String::from(
            r#"
                UPDATE documents
                SET data = jsonb_set(
                        jsonb_set(
                            data,
                            $3,
                            to_jsonb((COALESCE(data #>> $3, '0')::numeric + $4::numeric)::text),
                            true
                        ),
                        '{updatedAt}',
                        to_jsonb($5::text),
                        true
                    ),
                    updated_at = CURRENT_TIMESTAMP
                WHERE collection = $1 AND id = $2
            "#,
        );
        if !allow_negative {
            statement.push_str(" AND COALESCE(data #>> $3, '0')::numeric + $4::numeric >= 0");
        }
        statement.push_str(" RETURNING data");

        let updated = sqlx::query_scalar::<_, Value>(&statement)
            .bind(collection)
            .bind(id)
            .bind(path(field))
            .bind(delta.to_string())
            .bind(Utc::now().to_rfc3339())
            .fetch_optional(&self.conn)
            .await?;

        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, anyhow::Error> {
        let mut builder = scoped("DELETE FROM documents", collection, filter);
        let result = builder.build().execute(&self.conn).await?;

        Ok(result.rows_affected())
    }
}
