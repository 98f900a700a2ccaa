//! Transactional batch persistence with per-record fallback
//!
//! Each batch is written in one transaction: a multi-row upsert into
//! `abn_entities` followed by a multi-row insert into `business_names`. If
//! anything in that transaction fails, it is rolled back and every record
//! is retried once in its own transaction; records that fail again are
//! dropped and reported. There is no further retry.
//!
//! Upserts are keyed by `abn` (last write wins per column) and name inserts
//! ignore existing `(abn, name)` pairs, so batches commute and may be applied
//! by independent workers, each with its own connection.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::db::DbError;
use crate::error::{IngestError, Result};
use crate::models::{BusinessNameRow, EntityRecord};
use crate::pipeline::{BatchSink, DroppedRecord, FlushReport};

/// Entity rows per INSERT statement (9 binds each, well under the 65535 bind limit)
pub const DEFAULT_ENTITY_CHUNK_SIZE: usize = 1000;

/// Business-name rows per INSERT statement (2 binds each)
pub const DEFAULT_NAME_CHUNK_SIZE: usize = 5000;

/// Persists batches of [`EntityRecord`]s into PostgreSQL
#[derive(Clone)]
pub struct BatchUpsertLoader {
    pool: PgPool,
    entity_chunk_size: usize,
    name_chunk_size: usize,
}

impl BatchUpsertLoader {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            entity_chunk_size: DEFAULT_ENTITY_CHUNK_SIZE,
            name_chunk_size: DEFAULT_NAME_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_sizes(mut self, entity_chunk_size: usize, name_chunk_size: usize) -> Self {
        self.entity_chunk_size = entity_chunk_size.max(1);
        self.name_chunk_size = name_chunk_size.max(1);
        self
    }

    /// Persist a batch, falling back to one transaction per record on failure
    pub async fn load_batch(&self, batch: &[EntityRecord]) -> Result<FlushReport> {
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }

        let started = Instant::now();
        let records = coalesce(batch);

        match self.persist_batch(&records).await {
            Ok(()) => {
                debug!(
                    records = batch.len(),
                    unique_abns = records.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Batch committed"
                );
                Ok(FlushReport {
                    attempted: batch.len(),
                    persisted: batch.len(),
                    dropped: Vec::new(),
                    used_fallback: false,
                })
            },
            Err(IngestError::Persistence(e)) => {
                warn!(
                    records = batch.len(),
                    error = %e,
                    "Batch transaction failed, retrying records individually"
                );
                self.load_individually(batch).await
            },
            Err(other) => Err(other),
        }
    }

    async fn persist_batch(&self, records: &[EntityRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let written: std::result::Result<(), sqlx::Error> = async {
            for chunk in records.chunks(self.entity_chunk_size) {
                upsert_entities(&mut tx, chunk).await?;
            }
            insert_business_names(&mut tx, records, self.name_chunk_size).await
        }
        .await;

        match written {
            Ok(()) => tx.commit().await.map_err(IngestError::Persistence),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    debug!(error = %rollback, "Rollback after batch failure also failed");
                }
                Err(IngestError::Persistence(e))
            },
        }
    }

    /// Fallback pass: every record in its own transaction, exactly once
    async fn load_individually(&self, batch: &[EntityRecord]) -> Result<FlushReport> {
        let mut report = FlushReport {
            attempted: batch.len(),
            used_fallback: true,
            ..Default::default()
        };

        for record in batch {
            match self.persist_record(record).await {
                Ok(()) => report.persisted += 1,
                Err(IngestError::RecordConstraint { abn, reason }) => {
                    warn!(abn = %abn, reason = %reason, "Dropping record rejected by store");
                    report.dropped.push(DroppedRecord { abn, reason });
                },
                Err(other) => return Err(other),
            }
        }

        info!(
            persisted = report.persisted,
            dropped = report.dropped.len(),
            "Fallback pass complete"
        );

        Ok(report)
    }

    async fn persist_record(&self, record: &EntityRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let single = std::slice::from_ref(record);

        let written: std::result::Result<(), sqlx::Error> = async {
            upsert_entities(&mut tx, single).await?;
            insert_business_names(&mut tx, single, self.name_chunk_size).await
        }
        .await;

        let outcome = match written {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    debug!(abn = %record.abn, error = %rollback, "Rollback failed");
                }
                Err(e)
            },
        };

        outcome.map_err(|e| classify_record_error(record, e))
    }
}

#[async_trait]
impl BatchSink for BatchUpsertLoader {
    async fn flush(&mut self, batch: Vec<EntityRecord>) -> Result<FlushReport> {
        self.load_batch(&batch).await
    }
}

/// Statement-level errors blame the record; transport errors mean the store is gone
fn classify_record_error(record: &EntityRecord, error: sqlx::Error) -> IngestError {
    match error {
        sqlx::Error::Database(db) => IngestError::RecordConstraint {
            abn: record.abn.clone(),
            reason: db.message().to_string(),
        },
        sqlx::Error::Encode(_) | sqlx::Error::ColumnDecode { .. } => {
            IngestError::RecordConstraint {
                abn: record.abn.clone(),
                reason: error.to_string(),
            }
        },
        other => IngestError::Store(DbError::Sqlx(other)),
    }
}

/// Merge records sharing an `abn` so a single upsert never touches a key twice
///
/// The later record's scalar fields win outright, mirroring sequential
/// upserts; business names are unioned in first-seen order.
pub fn coalesce(batch: &[EntityRecord]) -> Vec<EntityRecord> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(batch.len());
    let mut merged: Vec<EntityRecord> = Vec::with_capacity(batch.len());

    for record in batch {
        match index.get(record.abn.as_str()) {
            Some(&position) => {
                let mut names = std::mem::take(&mut merged[position].business_names);
                names.extend(record.business_names.iter().cloned());
                merged[position] = EntityRecord {
                    business_names: names,
                    ..record.clone()
                };
            },
            None => {
                index.insert(&record.abn, merged.len());
                merged.push(record.clone());
            },
        }
    }

    merged
}

/// Distinct name rows across `records`, in first-seen order
fn distinct_name_rows(records: &[EntityRecord]) -> Vec<BusinessNameRow<'_>> {
    let mut seen = HashSet::new();
    records
        .iter()
        .flat_map(EntityRecord::business_name_rows)
        .filter(|row| seen.insert(*row))
        .collect()
}

async fn upsert_entities(
    tx: &mut Transaction<'_, Postgres>,
    records: &[EntityRecord],
) -> std::result::Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        INSERT INTO abn_entities (
            abn,
            status,
            status_from,
            entity_type,
            legal_name,
            state,
            postcode,
            acn,
            gst_registered
        )
        "#,
    );

    query_builder.push_values(records, |mut b, record| {
        b.push_bind(&record.abn)
            .push_bind(&record.status)
            .push_bind(&record.status_from)
            .push_bind(&record.entity_type)
            .push_bind(&record.legal_name)
            .push_bind(&record.state)
            .push_bind(&record.postcode)
            .push_bind(&record.acn)
            .push_bind(record.gst_registered);
    });

    query_builder.push(
        r#"
        ON CONFLICT (abn) DO UPDATE SET
            status = EXCLUDED.status,
            status_from = EXCLUDED.status_from,
            entity_type = EXCLUDED.entity_type,
            legal_name = EXCLUDED.legal_name,
            state = EXCLUDED.state,
            postcode = EXCLUDED.postcode,
            acn = EXCLUDED.acn,
            gst_registered = EXCLUDED.gst_registered,
            updated_at = NOW()
        "#,
    );

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_business_names(
    tx: &mut Transaction<'_, Postgres>,
    records: &[EntityRecord],
    chunk_size: usize,
) -> std::result::Result<(), sqlx::Error> {
    let rows = distinct_name_rows(records);

    for chunk in rows.chunks(chunk_size) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO business_names (abn, name) ");

        query_builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.abn).push_bind(row.name);
        });

        query_builder.push(" ON CONFLICT (abn, name) DO NOTHING");
        query_builder.build().execute(&mut **tx).await?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(abn: &str, state: Option<&str>, names: &[&str]) -> EntityRecord {
        EntityRecord {
            abn: abn.to_string(),
            state: state.map(String::from),
            business_names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_coalesce_keeps_unique_records_in_order() {
        let batch = vec![
            record("11111111111", Some("NSW"), &[]),
            record("22222222222", Some("VIC"), &[]),
        ];
        assert_eq!(coalesce(&batch), batch);
    }

    #[test]
    fn test_coalesce_last_record_wins_and_names_union() {
        let batch = vec![
            record("11111111111", Some("NSW"), &["ALPHA"]),
            record("22222222222", Some("VIC"), &[]),
            record("11111111111", None, &["BETA", "ALPHA"]),
        ];

        let merged = coalesce(&batch);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].abn, "11111111111");
        assert_eq!(merged[0].state, None);
        assert_eq!(merged[0].business_names, vec!["ALPHA", "BETA", "ALPHA"]);
        assert_eq!(merged[1].abn, "22222222222");
    }

    #[test]
    fn test_distinct_name_rows() {
        let batch = vec![
            record("11111111111", None, &["ALPHA", "ALPHA", "BETA"]),
            record("22222222222", None, &["ALPHA"]),
        ];

        let rows = distinct_name_rows(&batch);
        assert_eq!(
            rows,
            vec![
                BusinessNameRow { abn: "11111111111", name: "ALPHA" },
                BusinessNameRow { abn: "11111111111", name: "BETA" },
                BusinessNameRow { abn: "22222222222", name: "ALPHA" },
            ]
        );
    }

    #[test]
    fn test_connection_errors_stop_the_run() {
        let rec = record("11111111111", None, &[]);
        let fatal = [
            sqlx::Error::PoolTimedOut,
            sqlx::Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            sqlx::Error::Protocol("unexpected message from server".to_string()),
        ];

        for error in fatal {
            let classified = classify_record_error(&rec, error);
            assert!(matches!(classified, IngestError::Store(_)), "{:?}", classified);
        }
    }

    #[test]
    fn test_encode_error_drops_the_record() {
        let rec = record("11111111111", None, &[]);
        let classified = classify_record_error(&rec, sqlx::Error::Encode("value too long".into()));

        match classified {
            IngestError::RecordConstraint { abn, reason } => {
                assert_eq!(abn, "11111111111");
                assert!(reason.contains("value too long"));
            },
            other => panic!("expected record constraint, got {:?}", other),
        }
    }

    #[test]
    fn test_flush_report_serializes() {
        let report = FlushReport {
            attempted: 2,
            persisted: 1,
            dropped: vec![DroppedRecord {
                abn: "bad".into(),
                reason: "violates check constraint".into(),
            }],
            used_fallback: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dropped"][0]["abn"], "bad");
        assert_eq!(json["used_fallback"], true);
    }
}
