//! The `TableBackend` trait: the narrow interface this crate uses to talk
//! to the underlying wide-column store. Authentication, HTTP transport and
//! retries are the backend implementation's concern, not this crate's.
//!
//! Two implementations ship with this crate: [`memory::InMemoryBackend`],
//! an in-process double used by the test suite (mirroring
//! `eventually::event::store::InMemory`), and, behind the `azure` feature,
//! [`azure::AzureTableBackend`] against the real Azure Table Storage /
//! Cosmos DB Table API.

pub mod memory;

#[cfg(feature = "azure")]
pub mod azure;

use async_trait::async_trait;

use crate::operation::EntityOperation;
use crate::properties::PropertyMap;

/// A single row as returned by a point or range query: its key, e-tag and
/// flattened attributes. The crate never inspects attributes it doesn't
/// recognize (`Version`, plus whatever the caller's `Properties` held).
#[derive(Debug, Clone)]
pub struct TableRow {
    /// Partition key the row was read from.
    pub partition_key: String,
    /// Row key of this row.
    pub row_key: String,
    /// The row's current e-tag.
    pub etag: String,
    /// Flattened user-visible attributes, reserved names already excluded.
    pub properties: PropertyMap,
}

/// The backend-reported reason a single transaction action failed. This is
/// the vocabulary the write and provisioning operations classify conflicts
/// against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionErrorCode {
    /// An `UpdateReplace`/`UpdateMerge` action's e-tag precondition failed.
    UpdateConditionNotSatisfied,
    /// An `Add` (or `InsertOrReplace`/`InsertOrMerge` acting as an insert)
    /// action targeted a row that already exists.
    EntityAlreadyExists,
    /// Any other backend-reported failure code, propagated unmapped.
    Other(String),
}

/// A transaction failed at a specific action. `failed_index` is the
/// zero-based position of the failing action within the list submitted to
/// [`TableBackend::submit_transaction`]; the library depends on the backend
/// reporting this to classify the failure correctly.
#[derive(Debug, Clone)]
pub struct TransactionFailure {
    /// Index of the action that failed within the submitted batch.
    pub failed_index: usize,
    /// The backend's reported reason.
    pub code: ActionErrorCode,
}

/// The per-action outcome of a successfully committed transaction, in the
/// same order the actions were submitted. Delete actions carry no e-tag.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// The row's new e-tag after this action, if the action left a row
    /// behind (everything but `Delete`).
    pub etag: Option<String>,
}

/// The result of submitting a transaction: either every action committed
/// (with one [`ActionResult`] per action, in order), or the whole batch was
/// rolled back because one action failed.
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    /// Every action in the batch committed.
    Committed(Vec<ActionResult>),
    /// The batch was rejected; no action in it took effect.
    Failed(TransactionFailure),
}

/// The result of a single-action call ([`TableBackend::add_entity`] /
/// [`TableBackend::update_entity`]): committed, or rejected with a reason
/// from the same vocabulary as a transaction failure.
#[derive(Debug, Clone)]
pub enum SingleActionOutcome {
    /// The action committed.
    Committed(ActionResult),
    /// The action was rejected.
    Failed(ActionErrorCode),
}

/// The narrow async interface this crate needs from the underlying
/// partition/table client: submit an atomic partition-scoped batch, query a
/// row-key range, fetch a single row, and the two single-action calls used
/// by provisioning and property updates.
///
/// Implementations own their own transport, authentication and retry
/// policy; none of that is this crate's concern.
#[async_trait]
pub trait TableBackend: Send + Sync + 'static {
    /// The backend's own error type for failures outside the library's own
    /// conflict taxonomy (propagated via [`crate::Error::Transport`]).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submits `operations` (already resolved to one final op per row key
    /// by the change tracker) as a single atomic, partition-scoped
    /// transaction. All operations must target `partition_key`.
    ///
    /// `operations.len()` is guaranteed by the caller (the chunker) to be
    /// within the backend's action limit.
    async fn submit_transaction(
        &self,
        partition_key: &str,
        operations: &[EntityOperation],
    ) -> Result<TransactionOutcome, Self::Error>;

    /// Fetches the single row at `(partition_key, row_key)`, or `None` if
    /// it does not exist.
    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableRow>, Self::Error>;

    /// Queries every row in `partition_key` whose row key falls in
    /// `[row_key_start, row_key_end]` inclusive, ordered by row key
    /// ascending. Used only for the bounded event-version range reads.
    async fn query_range(
        &self,
        partition_key: &str,
        row_key_start: &str,
        row_key_end: &str,
    ) -> Result<Vec<TableRow>, Self::Error>;

    /// Inserts a brand-new row; fails with
    /// [`ActionErrorCode::EntityAlreadyExists`] if one exists already. Used
    /// by `Provision`, a single-action transaction outside the chunked
    /// write path.
    async fn add_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: &PropertyMap,
    ) -> Result<SingleActionOutcome, Self::Error>;

    /// Replaces an existing row's attributes wholesale, guarded by `etag`;
    /// fails with [`ActionErrorCode::UpdateConditionNotSatisfied`] on a
    /// mismatch. Used by `SetProperties`.
    async fn update_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        etag: &str,
        properties: &PropertyMap,
    ) -> Result<SingleActionOutcome, Self::Error>;
}

/// The hard per-transaction action limit the backend enforces: a maximum
/// of 100 actions per batch.
pub const BACKEND_MAX_ACTIONS_PER_TRANSACTION: usize = 100;
