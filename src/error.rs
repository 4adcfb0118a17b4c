//! The error taxonomy returned by every operation in this crate.
//!
//! Transport-level failures from the underlying [`TableBackend`][crate::backend::TableBackend]
//! are never reinterpreted: they are wrapped, unmapped, in
//! [`Error::Transport`].

use crate::operation::OperationKind;
use crate::partition::PartitionKey;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors specific to optimistic-concurrency conflicts on a stream partition.
#[derive(Debug, thiserror::Error)]
pub enum ConcurrencyConflict {
    /// The stream header's e-tag no longer matches what the caller holds:
    /// somebody else committed a transaction on this partition first.
    #[error("stream at partition '{0}' has changed since it was last opened")]
    StreamChanged(PartitionKey),

    /// The header already exists (e.g. a `Provision` raced another writer,
    /// or a transient-stream `Write` found the header had meanwhile been
    /// provisioned).
    #[error("stream at partition '{0}' has changed or already exists")]
    StreamChangedOrExists(PartitionKey),

    /// The event row at `version` is already present; some other writer won
    /// the race to append at that version.
    #[error("event version {version} already exists in partition '{partition}'")]
    EventVersionExists {
        /// Partition the conflict occurred in.
        partition: PartitionKey,
        /// The version that was already taken.
        version: i64,
    },
}

/// The crate's error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No stream header was found at the given partition.
    #[error("no stream found at partition '{0}'")]
    StreamNotFound(PartitionKey),

    /// An optimistic-concurrency conflict was detected. See [`ConcurrencyConflict`].
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(#[from] ConcurrencyConflict),

    /// An event carrying `id` was already recorded in this partition.
    #[error("event with id '{id}' already exists in partition '{partition}'")]
    DuplicateEvent {
        /// Partition the conflict occurred in.
        partition: PartitionKey,
        /// The caller-supplied event id that collided.
        id: String,
    },

    /// One of the caller's included operations conflicted with existing state.
    #[error(
        "included operation {operation:?} on row '{row_key}' conflicted in partition '{partition}'"
    )]
    IncludedOperationConflict {
        /// Partition the conflict occurred in.
        partition: PartitionKey,
        /// Row key of the conflicting included entity.
        row_key: String,
        /// The kind of operation that was attempted.
        operation: OperationKind,
    },

    /// A sequence of operations (or a single operation) is illegal: an
    /// illegal merge in the change tracker, a version regression, a missing
    /// e-tag on a `Replace`, an oversized single event, or properties set on
    /// a transient stream.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An argument was outside its legal range (e.g. `start_version < 1`).
    #[error("argument `{0}` is out of range")]
    ArgumentOutOfRange(&'static str),

    /// A required argument was missing or empty.
    #[error("argument `{0}` must not be empty")]
    ArgumentNull(&'static str),

    /// The underlying table backend returned an error unrelated to the
    /// library's own conflict taxonomy; propagated unmapped.
    #[error("table backend error: {0}")]
    Transport(#[source] anyhow::Error),
}

impl Error {
    pub(crate) fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport(anyhow::Error::new(err))
    }
}
