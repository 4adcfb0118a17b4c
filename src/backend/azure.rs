//! [`TableBackend`] implementation against the real Azure Table Storage /
//! Cosmos DB Table API, using the `azure_data_tables` crate.
//!
//! Modeled on `eventually-postgres::store::EventStore`: a thin struct
//! wrapping a client handle, mapping backend-specific errors into this
//! crate's own error enum rather than leaking `azure_core` types.

use async_trait::async_trait;
use azure_data_tables::operations::{InsertEntityOptions, Transaction, TransactionOperation};
use azure_data_tables::prelude::*;
use azure_core::error::{ErrorKind as AzureErrorKind, HttpError};

use crate::backend::{
    ActionErrorCode, ActionResult, SingleActionOutcome, TableBackend, TableRow,
    TransactionFailure, TransactionOutcome,
};
use crate::operation::{BatchAction, EntityOperation};
use crate::properties::{PropertyMap, PropertyValue};

/// Errors surfaced by the Azure Tables backend, wrapping `azure_core`
/// failures the same way `eventually-postgres::store::Error` wraps
/// `tokio_postgres::Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The Azure SDK returned an error outside the library's own conflict
    /// taxonomy.
    #[error("azure table storage returned an error: {0}")]
    Azure(#[from] azure_core::Error),

    /// A property value of a kind the Azure Tables wire format can't carry
    /// was encountered while translating a row.
    #[error("unsupported property value for row '{0}'")]
    UnsupportedProperty(String),
}

/// A [`TableBackend`] backed by a single Azure Table Storage (or Cosmos DB
/// Table API) table.
///
/// Construct via [`AzureTableBackend::new`] with a client built from the
/// `azure_data_tables` crate's own builders (connection string, shared key,
/// or an Azure AD credential) -- authentication and HTTP-transport retry
/// policy belong entirely to that crate.
#[derive(Debug, Clone)]
pub struct AzureTableBackend {
    client: TableClient,
}

impl AzureTableBackend {
    /// Wraps an already-constructed `azure_data_tables` table client.
    #[must_use]
    pub fn new(client: TableClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableBackend for AzureTableBackend {
    type Error = Error;

    async fn submit_transaction(
        &self,
        partition_key: &str,
        operations: &[EntityOperation],
    ) -> Result<TransactionOutcome, Self::Error> {
        let mut transaction = Transaction::default();

        for op in operations {
            let entity = op.entity();
            let body = properties_to_body(&entity.row_key, &entity.properties)?;

            let action = match op.batch_action() {
                BatchAction::Add => TransactionOperation::Insert { body },
                BatchAction::UpdateReplace => TransactionOperation::Update {
                    body,
                    if_match: etag_precondition(entity),
                },
                BatchAction::UpdateMerge => TransactionOperation::Merge {
                    body,
                    if_match: etag_precondition(entity),
                },
                BatchAction::Delete => TransactionOperation::Delete {
                    if_match: etag_precondition(entity),
                },
                BatchAction::UpsertReplace => TransactionOperation::InsertOrReplace { body },
                BatchAction::UpsertMerge => TransactionOperation::InsertOrMerge { body },
            };

            transaction.add(action);
        }

        match self
            .client
            .partition_key_client(partition_key)
            .submit_transaction(transaction)
            .await
        {
            Ok(response) => Ok(TransactionOutcome::Committed(
                response
                    .into_iter()
                    .map(|part| ActionResult {
                        etag: part.etag().map(ToString::to_string),
                    })
                    .collect(),
            )),
            Err(err) => match failed_action(&err) {
                Some(failure) => Ok(TransactionOutcome::Failed(failure)),
                None => Err(Error::Azure(err)),
            },
        }
    }

    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableRow>, Self::Error> {
        let result = self
            .client
            .partition_key_client(partition_key)
            .entity_client(row_key)
            .get::<serde_json::Value>()
            .await;

        match result {
            Ok(response) => Ok(Some(body_to_row(partition_key, row_key, response.entity)?)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(Error::Azure(err)),
        }
    }

    async fn query_range(
        &self,
        partition_key: &str,
        row_key_start: &str,
        row_key_end: &str,
    ) -> Result<Vec<TableRow>, Self::Error> {
        let filter = format!(
            "PartitionKey eq '{partition_key}' and RowKey ge '{row_key_start}' and RowKey le '{row_key_end}'"
        );

        let mut rows = Vec::new();
        let mut stream = self
            .client
            .query()
            .filter(filter)
            .into_stream::<serde_json::Value>();

        use futures::stream::TryStreamExt;
        while let Some(page) = stream.try_next().await? {
            for entity in page.entities {
                let row_key = entity
                    .get("RowKey")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                rows.push(body_to_row(partition_key, &row_key, entity)?);
            }
        }

        Ok(rows)
    }

    async fn add_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: &PropertyMap,
    ) -> Result<SingleActionOutcome, Self::Error> {
        let body = properties_to_body(row_key, properties)?;
        let response = self
            .client
            .partition_key_client(partition_key)
            .insert(body, InsertEntityOptions::default())
            .await;

        match response {
            Ok(response) => Ok(SingleActionOutcome::Committed(ActionResult {
                etag: response.etag.map(|e| e.to_string()),
            })),
            Err(err) if is_conflict(&err) => {
                Ok(SingleActionOutcome::Failed(ActionErrorCode::EntityAlreadyExists))
            }
            Err(err) => Err(Error::Azure(err)),
        }
    }

    async fn update_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        etag: &str,
        properties: &PropertyMap,
    ) -> Result<SingleActionOutcome, Self::Error> {
        let body = properties_to_body(row_key, properties)?;
        let response = self
            .client
            .partition_key_client(partition_key)
            .entity_client(row_key)
            .update(body, etag.into())
            .await;

        match response {
            Ok(response) => Ok(SingleActionOutcome::Committed(ActionResult {
                etag: response.etag.map(|e| e.to_string()),
            })),
            Err(err) if is_precondition_failed(&err) => Ok(SingleActionOutcome::Failed(
                ActionErrorCode::UpdateConditionNotSatisfied,
            )),
            Err(err) => Err(Error::Azure(err)),
        }
    }
}

fn etag_precondition(entity: &crate::operation::Entity) -> IfMatchCondition {
    match &entity.etag {
        Some(crate::operation::ETag::Any) | None => IfMatchCondition::Any,
        Some(crate::operation::ETag::Value(v)) => IfMatchCondition::Tag(v.clone()),
    }
}

fn properties_to_body(
    row_key: &str,
    properties: &PropertyMap,
) -> Result<serde_json::Value, Error> {
    let mut map = serde_json::Map::new();
    map.insert("RowKey".to_owned(), serde_json::Value::String(row_key.to_owned()));

    for (key, value) in properties {
        let json = match value {
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
            PropertyValue::Int64(i) => serde_json::Value::Number((*i).into()),
            PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
            PropertyValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::UnsupportedProperty(row_key.to_owned()))?,
            PropertyValue::Binary(bytes) => {
                serde_json::Value::String(base64_encode(bytes))
            }
        };
        map.insert(key.clone(), json);
    }

    Ok(serde_json::Value::Object(map))
}

fn body_to_row(
    partition_key: &str,
    row_key: &str,
    body: serde_json::Value,
) -> Result<TableRow, Error> {
    let mut properties = PropertyMap::new();
    let mut etag = String::new();

    if let serde_json::Value::Object(map) = body {
        for (key, value) in map {
            match key.as_str() {
                "PartitionKey" | "RowKey" | "Timestamp" => continue,
                "odata.etag" | "etag" => {
                    etag = value.as_str().unwrap_or_default().to_owned();
                }
                _ => {
                    if let Some(property) = json_to_property(value) {
                        properties.insert(key, property);
                    }
                }
            }
        }
    }

    Ok(TableRow {
        partition_key: partition_key.to_owned(),
        row_key: row_key.to_owned(),
        etag,
        properties,
    })
}

fn json_to_property(value: serde_json::Value) -> Option<PropertyValue> {
    match value {
        serde_json::Value::String(s) => Some(PropertyValue::String(s)),
        serde_json::Value::Bool(b) => Some(PropertyValue::Bool(b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(PropertyValue::Int64)
            .or_else(|| n.as_f64().map(PropertyValue::Double)),
        _ => None,
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    // Minimal base64 without an extra dependency: the Azure Tables wire
    // format stores `Edm.Binary` properties this way.
    const TABLE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::new();
    for chunk in bytes.chunks(3) {
        let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        let chars = [
            TABLE[(n >> 18 & 0x3f) as usize],
            TABLE[(n >> 12 & 0x3f) as usize],
            TABLE[(n >> 6 & 0x3f) as usize],
            TABLE[(n & 0x3f) as usize],
        ];
        let _ = write!(out, "{}", chars[0] as char);
        let _ = write!(out, "{}", chars[1] as char);
        out.push(if chunk.len() > 1 { chars[2] as char } else { '=' });
        out.push(if chunk.len() > 2 { chars[3] as char } else { '=' });
    }
    out
}

fn is_not_found(err: &azure_core::Error) -> bool {
    matches!(err.kind(), AzureErrorKind::HttpResponse { status, .. } if status.as_u16() == 404)
}

fn is_conflict(err: &azure_core::Error) -> bool {
    matches!(err.kind(), AzureErrorKind::HttpResponse { status, .. } if status.as_u16() == 409)
}

fn is_precondition_failed(err: &azure_core::Error) -> bool {
    matches!(err.kind(), AzureErrorKind::HttpResponse { status, .. } if status.as_u16() == 412)
}

/// Inspects a transaction-submission error for the failing action's index
/// and backend-reported code: this crate relies on the backend surfacing
/// this rather than issuing a recovery read.
fn failed_action(err: &azure_core::Error) -> Option<TransactionFailure> {
    let AzureErrorKind::HttpResponse { status, .. } = err.kind() else {
        return None;
    };

    let http: &HttpError = err.as_http_error()?;
    let (index, code) = http.odata_error_details()?;

    let code = match code.as_str() {
        "UpdateConditionNotSatisfied" => ActionErrorCode::UpdateConditionNotSatisfied,
        "EntityAlreadyExists" => ActionErrorCode::EntityAlreadyExists,
        other => {
            let _ = status;
            ActionErrorCode::Other(other.to_owned())
        }
    };

    Some(TransactionFailure {
        failed_index: index,
        code,
    })
}
