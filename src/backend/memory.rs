//! An in-memory [`TableBackend`], modeled on
//! `eventually::event::store::InMemory`'s `Arc<RwLock<...>>`-guarded map.
//! Used by this crate's own test suite instead of a live Azure account —
//! there is no Azure Tables `testcontainers` image to spin up, unlike
//! `eventually-postgres`/`eventually-redis`'s container-backed tests.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::backend::{
    ActionErrorCode, ActionResult, SingleActionOutcome, TableBackend, TableRow,
    TransactionFailure, TransactionOutcome,
};
use crate::operation::EntityOperation;
use crate::properties::PropertyMap;

#[derive(Debug, Clone)]
struct StoredRow {
    etag: String,
    properties: PropertyMap,
}

/// In-memory [`TableBackend`] implementation, backed by a
/// `RwLock<BTreeMap<...>>` keyed by `(partition_key, row_key)`.
///
/// Intended for tests and local development; never use this in production,
/// it holds every row in process memory for the lifetime of the backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    rows: RwLock<BTreeMap<(String, String), StoredRow>>,
    etag_counter: AtomicU64,
}

impl InMemoryBackend {
    /// Creates a new, empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_etag(&self) -> String {
        let n = self.etag_counter.fetch_add(1, Ordering::SeqCst);
        format!("etag-{n}")
    }
}

#[async_trait]
impl TableBackend for InMemoryBackend {
    type Error = Infallible;

    async fn submit_transaction(
        &self,
        partition_key: &str,
        operations: &[EntityOperation],
    ) -> Result<TransactionOutcome, Self::Error> {
        // Validate against a scratch copy first so a mid-batch failure
        // never mutates state -- atomicity of the partition-scoped
        // transaction.
        let mut rows = self.rows.write().unwrap();
        let mut scratch = rows.clone();

        for (index, op) in operations.iter().enumerate() {
            let entity = op.entity();
            let key = (partition_key.to_owned(), entity.row_key.clone());

            let outcome = apply(&mut scratch, &key, op);
            if let Err(code) = outcome {
                return Ok(TransactionOutcome::Failed(TransactionFailure {
                    failed_index: index,
                    code,
                }));
            }
        }

        // Second pass: commit for real, assigning fresh e-tags as we go so
        // each row's e-tag reflects this transaction, not the scratch pass.
        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            let entity = op.entity();
            let key = (partition_key.to_owned(), entity.row_key.clone());
            let is_delete = matches!(op, EntityOperation::Delete(_));

            if is_delete {
                rows.remove(&key);
                results.push(ActionResult { etag: None });
                continue;
            }

            let merged_properties = match op {
                EntityOperation::InsertOrMerge(_) | EntityOperation::UpdateMerge(_) => {
                    let mut merged = rows.get(&key).map(|r| r.properties.clone()).unwrap_or_default();
                    merged.extend(entity.properties.clone());
                    merged
                }
                _ => entity.properties.clone(),
            };

            let etag = self.next_etag();
            rows.insert(
                key,
                StoredRow {
                    etag: etag.clone(),
                    properties: merged_properties,
                },
            );
            results.push(ActionResult { etag: Some(etag) });
        }

        Ok(TransactionOutcome::Committed(results))
    }

    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableRow>, Self::Error> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .get(&(partition_key.to_owned(), row_key.to_owned()))
            .map(|row| TableRow {
                partition_key: partition_key.to_owned(),
                row_key: row_key.to_owned(),
                etag: row.etag.clone(),
                properties: row.properties.clone(),
            }))
    }

    async fn query_range(
        &self,
        partition_key: &str,
        row_key_start: &str,
        row_key_end: &str,
    ) -> Result<Vec<TableRow>, Self::Error> {
        let rows = self.rows.read().unwrap();
        let results = rows
            .range((partition_key.to_owned(), row_key_start.to_owned())..=(partition_key.to_owned(), row_key_end.to_owned()))
            .map(|((pk, rk), row)| TableRow {
                partition_key: pk.clone(),
                row_key: rk.clone(),
                etag: row.etag.clone(),
                properties: row.properties.clone(),
            })
            .collect();

        Ok(results)
    }

    async fn add_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: &PropertyMap,
    ) -> Result<SingleActionOutcome, Self::Error> {
        let mut rows = self.rows.write().unwrap();
        let key = (partition_key.to_owned(), row_key.to_owned());

        if rows.contains_key(&key) {
            return Ok(SingleActionOutcome::Failed(ActionErrorCode::EntityAlreadyExists));
        }

        let etag = self.next_etag();
        rows.insert(
            key,
            StoredRow {
                etag: etag.clone(),
                properties: properties.clone(),
            },
        );
        Ok(SingleActionOutcome::Committed(ActionResult { etag: Some(etag) }))
    }

    async fn update_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        etag: &str,
        properties: &PropertyMap,
    ) -> Result<SingleActionOutcome, Self::Error> {
        let mut rows = self.rows.write().unwrap();
        let key = (partition_key.to_owned(), row_key.to_owned());

        match rows.get(&key) {
            Some(row) if row.etag == etag => {}
            _ => {
                return Ok(SingleActionOutcome::Failed(
                    ActionErrorCode::UpdateConditionNotSatisfied,
                ))
            }
        }

        let new_etag = self.next_etag();
        rows.insert(
            key,
            StoredRow {
                etag: new_etag.clone(),
                properties: properties.clone(),
            },
        );

        Ok(SingleActionOutcome::Committed(ActionResult {
            etag: Some(new_etag),
        }))
    }
}

/// Applies `op` against `scratch`, mutating it to reflect success, or
/// returning the [`ActionErrorCode`] the real backend would report.
fn apply(
    scratch: &mut BTreeMap<(String, String), StoredRow>,
    key: &(String, String),
    op: &EntityOperation,
) -> Result<(), ActionErrorCode> {
    match op {
        EntityOperation::Insert(_) => {
            if scratch.contains_key(key) {
                return Err(ActionErrorCode::EntityAlreadyExists);
            }
            scratch.insert(key.clone(), placeholder());
            Ok(())
        }
        EntityOperation::Replace(entity) | EntityOperation::UpdateMerge(entity) => {
            let current = scratch.get(key);
            match (current, &entity.etag) {
                (None, _) => Err(ActionErrorCode::UpdateConditionNotSatisfied),
                (Some(_), Some(crate::operation::ETag::Any)) => {
                    scratch.insert(key.clone(), placeholder());
                    Ok(())
                }
                (Some(row), Some(crate::operation::ETag::Value(v))) if &row.etag == v => {
                    scratch.insert(key.clone(), placeholder());
                    Ok(())
                }
                _ => Err(ActionErrorCode::UpdateConditionNotSatisfied),
            }
        }
        EntityOperation::Delete(entity) => {
            let current = scratch.get(key);
            match (current, &entity.etag) {
                (None, _) => Err(ActionErrorCode::UpdateConditionNotSatisfied),
                (Some(_), Some(crate::operation::ETag::Any) | None) => {
                    scratch.remove(key);
                    Ok(())
                }
                (Some(row), Some(crate::operation::ETag::Value(v))) if &row.etag == v => {
                    scratch.remove(key);
                    Ok(())
                }
                _ => Err(ActionErrorCode::UpdateConditionNotSatisfied),
            }
        }
        EntityOperation::InsertOrMerge(_) | EntityOperation::InsertOrReplace(_) => {
            scratch.insert(key.clone(), placeholder());
            Ok(())
        }
    }
}

fn placeholder() -> StoredRow {
    StoredRow {
        etag: String::new(),
        properties: PropertyMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Entity, ETag};

    fn entity(row_key: &str) -> Entity {
        Entity::new("p", row_key, PropertyMap::new())
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let backend = InMemoryBackend::new();
        let outcome = backend
            .submit_transaction("p", &[EntityOperation::Insert(entity("r"))])
            .await
            .unwrap();
        assert!(matches!(outcome, TransactionOutcome::Committed(_)));

        let row = backend.get_entity("p", "r").await.unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn insert_twice_fails_at_second_index() {
        let backend = InMemoryBackend::new();
        backend
            .submit_transaction("p", &[EntityOperation::Insert(entity("r"))])
            .await
            .unwrap();

        let outcome = backend
            .submit_transaction("p", &[EntityOperation::Insert(entity("r"))])
            .await
            .unwrap();

        match outcome {
            TransactionOutcome::Failed(failure) => {
                assert_eq!(failure.failed_index, 0);
                assert_eq!(failure.code, ActionErrorCode::EntityAlreadyExists);
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn failed_transaction_does_not_mutate_other_rows() {
        let backend = InMemoryBackend::new();
        backend
            .submit_transaction("p", &[EntityOperation::Insert(entity("existing"))])
            .await
            .unwrap();

        let mut bad = entity("existing");
        bad.etag = Some(ETag::Value("missing".into()));

        let outcome = backend
            .submit_transaction(
                "p",
                &[
                    EntityOperation::Insert(entity("fresh")),
                    EntityOperation::Insert(bad.clone()),
                ],
            )
            .await
            .unwrap();

        assert!(matches!(outcome, TransactionOutcome::Failed(_)));
        assert!(backend.get_entity("p", "fresh").await.unwrap().is_none());
    }
}
