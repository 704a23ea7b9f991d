//! Document store for interview records, kept as JSONB documents in Postgres.
//!
//! Reads always return the full collection; derived views are computed by the
//! caller on every request.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, GenericClient};
use uuid::Uuid;

use crate::db_connect::PgPool;
use crate::errors::CaseError;
use crate::models::{CaseSelector, RawRecord};

const CASES_SCHEMA: &str = "customization";
const CASES_TABLE: &str = "cases";

/// A record together with the id of the document holding it.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub document_id: Uuid,
    #[serde(flatten)]
    pub record: RawRecord,
}

fn table() -> String {
    format!(r#""{}"."{}""#, CASES_SCHEMA, CASES_TABLE)
}

/// Creates the schema, table and case index if they do not already exist.
pub async fn ensure_schema(client: &Client) -> Result<()> {
    info!("Ensuring schema '{}' exists...", CASES_SCHEMA);
    client
        .execute(&format!("CREATE SCHEMA IF NOT EXISTS {};", CASES_SCHEMA), &[])
        .await
        .with_context(|| format!("Failed to create schema {}", CASES_SCHEMA))?;

    let create_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            case_id TEXT NOT NULL,
            data JSONB NOT NULL,
            date_added TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        );
        "#,
        table()
    );
    client
        .execute(&create_table, &[])
        .await
        .with_context(|| format!("Failed to create table {}", table()))?;

    let create_index = format!(
        "CREATE INDEX IF NOT EXISTS cases_case_id_idx ON {} (case_id);",
        table()
    );
    client
        .execute(&create_index, &[])
        .await
        .context("Failed to create case_id index")?;
    info!("Table {} ensured.", table());
    Ok(())
}

/// Decodes fetched `(document id, case id, document)` rows. One undecodable
/// document fails the whole batch.
pub fn decode_documents<I>(rows: I) -> Result<Vec<StoredRecord>, CaseError>
where
    I: IntoIterator<Item = (Uuid, String, Value)>,
{
    rows.into_iter()
        .map(|(document_id, case_id, mut data)| {
            if let Value::Object(map) = &mut data {
                map.entry("case_id").or_insert(Value::String(case_id));
            }
            let record = RawRecord::from_document(&document_id.to_string(), data)?;
            Ok(StoredRecord { document_id, record })
        })
        .collect()
}

async fn fetch_where(pool: &PgPool, case_id: Option<&str>) -> Result<Vec<StoredRecord>> {
    let client = pool
        .get()
        .await
        .context("Failed to get DB client for case fetch")?;

    let rows = match case_id {
        Some(case_id) => {
            let query = format!(
                "SELECT id, case_id, data FROM {} WHERE case_id = $1 ORDER BY date_added, id",
                table()
            );
            client.query(&query, &[&case_id]).await
        }
        None => {
            let query = format!(
                "SELECT id, case_id, data FROM {} ORDER BY date_added, id",
                table()
            );
            client.query(&query, &[]).await
        }
    }
    .context("Failed to fetch case documents")?;

    debug!("Fetched {} case documents", rows.len());
    let mut raw = Vec::with_capacity(rows.len());
    for row in rows {
        let document_id: Uuid = row.try_get("id").context("Invalid document id")?;
        let stored_case_id: String = row.try_get("case_id").context("Invalid case_id column")?;
        let data: Value = row.try_get("data").context("Invalid document body")?;
        raw.push((document_id, stored_case_id, data));
    }
    Ok(decode_documents(raw)?)
}

/// Fetches every record in the collection, in insertion order.
pub async fn fetch_all_records(pool: &PgPool) -> Result<Vec<RawRecord>> {
    let records: Vec<RawRecord> = fetch_where(pool, None)
        .await?
        .into_iter()
        .map(|stored| stored.record)
        .collect();
    info!("Fetched {} case records.", records.len());
    Ok(records)
}

/// Fetches the rows of one case for editing.
pub async fn get_case(pool: &PgPool, case_id: &str) -> Result<Vec<StoredRecord>> {
    fetch_where(pool, Some(case_id)).await
}

async fn insert_document<C: GenericClient>(client: &C, record: &RawRecord) -> Result<Uuid> {
    if record.case_id.trim().is_empty() {
        return Err(CaseError::MissingCaseId.into());
    }
    let document_id = Uuid::new_v4();
    let data = serde_json::to_value(record).context("Failed to serialize case record")?;
    let query = format!(
        "INSERT INTO {} (id, case_id, data) VALUES ($1, $2, $3)",
        table()
    );
    client
        .execute(&query, &[&document_id, &record.case_id, &data])
        .await
        .with_context(|| format!("Failed to insert record for case {}", record.case_id))?;
    debug!("Inserted document {} for case {}", document_id, record.case_id);
    Ok(document_id)
}

/// Stores a new document for `record` and returns its document id.
pub async fn insert_record(pool: &PgPool, record: &RawRecord) -> Result<Uuid> {
    let client = pool
        .get()
        .await
        .context("Failed to get DB client for case insert")?;
    insert_document(&*client, record).await
}

/// Loads `records` in a single transaction, emptying the table first when
/// `replace` is set. A failed insert rolls back the whole load, including the
/// clear. `on_inserted` runs after each row.
pub async fn import_records<F>(
    pool: &PgPool,
    records: &[RawRecord],
    replace: bool,
    mut on_inserted: F,
) -> Result<usize>
where
    F: FnMut(&RawRecord),
{
    let mut client = pool
        .get()
        .await
        .context("Failed to get DB client for import")?;
    let tx = client
        .transaction()
        .await
        .context("Failed to start import transaction")?;

    if replace {
        let removed = tx
            .execute(&format!("DELETE FROM {}", table()), &[])
            .await
            .context("Failed to clear case collection")?;
        info!("Removing {} existing documents from {}", removed, table());
    }
    for record in records {
        insert_document(&tx, record).await?;
        on_inserted(record);
    }

    tx.commit().await.context("Failed to commit import transaction")?;
    info!("Committed {} imported records", records.len());
    Ok(records.len())
}

/// Picks the document an update by `case_id` may touch. Several interview rows
/// under one case id are never overwritten together.
fn single_document(case_id: &str, matches: &[Uuid]) -> Result<Option<Uuid>, CaseError> {
    match matches {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => Err(CaseError::AmbiguousCase {
            case_id: case_id.to_string(),
            matches: matches.len(),
        }),
    }
}

/// WHERE clause for deletes: the document id when given, otherwise every
/// document of the case.
fn selector_clause(selector: &CaseSelector) -> Result<(&'static str, SelectorParam), CaseError> {
    match (&selector.document_id, &selector.case_id) {
        (Some(id), _) => Ok(("id = $1", SelectorParam::Document(*id))),
        (None, Some(case_id)) => Ok(("case_id = $1", SelectorParam::Case(case_id.clone()))),
        (None, None) => Err(CaseError::MissingCaseId),
    }
}

enum SelectorParam {
    Document(Uuid),
    Case(String),
}

impl SelectorParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            SelectorParam::Document(id) => id as &(dyn ToSql + Sync),
            SelectorParam::Case(case_id) => case_id as &(dyn ToSql + Sync),
        }
    }
}

/// Replaces the fields of one document with `record`. Without a document id
/// the case must hold exactly one document, otherwise `AmbiguousCase`.
/// Returns the number of documents changed (0 or 1).
pub async fn update_records(pool: &PgPool, selector: &CaseSelector, record: &RawRecord) -> Result<u64> {
    let mut client = pool
        .get()
        .await
        .context("Failed to get DB client for case update")?;
    let tx = client
        .transaction()
        .await
        .context("Failed to start update transaction")?;

    let target = match (selector.document_id, selector.case_id.as_deref()) {
        (Some(document_id), _) => Some(document_id),
        (None, Some(case_id)) => {
            let rows = tx
                .query(&format!("SELECT id FROM {} WHERE case_id = $1", table()), &[&case_id])
                .await
                .with_context(|| format!("Failed to look up documents of case {}", case_id))?;
            let ids = rows
                .iter()
                .map(|row| row.try_get("id"))
                .collect::<Result<Vec<Uuid>, _>>()
                .context("Invalid document id")?;
            single_document(case_id, &ids)?
        }
        (None, None) => return Err(CaseError::MissingCaseId.into()),
    };
    let Some(document_id) = target else {
        return Ok(0);
    };

    let data = serde_json::to_value(record).context("Failed to serialize case record")?;
    let query = format!(
        "UPDATE {} SET case_id = $2, data = $3, updated_at = now() WHERE id = $1",
        table()
    );
    let updated = tx
        .execute(&query, &[&document_id, &record.case_id, &data])
        .await
        .with_context(|| format!("Failed to update case {}", record.case_id))?;
    tx.commit().await.context("Failed to commit case update")?;
    info!("Updated document {} of case {}", document_id, record.case_id);
    Ok(updated)
}

/// Deletes the selected documents and returns how many were removed.
pub async fn delete_records(pool: &PgPool, selector: &CaseSelector) -> Result<u64> {
    let (clause, param) = selector_clause(selector)?;
    let client = pool
        .get()
        .await
        .context("Failed to get DB client for case delete")?;
    let query = format!("DELETE FROM {} WHERE {}", table(), clause);
    let deleted = client
        .execute(&query, &[param.as_sql()])
        .await
        .context("Failed to delete case documents")?;
    info!("Deleted {} case documents", deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_fills_case_id_from_column() {
        let id = Uuid::new_v4();
        let decoded =
            decode_documents(vec![(id, "K2".to_string(), json!({"statement": "hi"}))]).unwrap();
        assert_eq!(decoded[0].document_id, id);
        assert_eq!(decoded[0].record.case_id, "K2");
    }

    #[test]
    fn decode_fails_on_any_non_tabular_document() {
        let rows = vec![
            (Uuid::new_v4(), "C1".to_string(), json!({"statement": "ok"})),
            (Uuid::new_v4(), "C2".to_string(), json!("not a record")),
        ];
        let err = decode_documents(rows).unwrap_err();
        assert!(matches!(err, CaseError::DataIntegrity { .. }));
    }

    #[test]
    fn selector_prefers_document_id() {
        let selector = CaseSelector {
            document_id: Some(Uuid::nil()),
            case_id: Some("C1".to_string()),
        };
        let (clause, _) = selector_clause(&selector).unwrap();
        assert_eq!(clause, "id = $1");

        let selector = CaseSelector {
            document_id: None,
            case_id: None,
        };
        assert!(matches!(selector_clause(&selector), Err(CaseError::MissingCaseId)));
    }

    #[test]
    fn case_id_updates_need_a_single_document() {
        let only = Uuid::new_v4();
        assert_eq!(single_document("R1", &[]).unwrap(), None);
        assert_eq!(single_document("R1", &[only]).unwrap(), Some(only));

        let rows = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let err = single_document("R1", &rows).unwrap_err();
        assert!(matches!(
            err,
            CaseError::AmbiguousCase { ref case_id, matches: 3 } if case_id == "R1"
        ));
    }
}
