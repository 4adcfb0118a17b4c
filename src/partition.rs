//! Partition addressing: row-key formats for the header, events and
//! event-id rows, and the reserved row-key prefixes.

use std::sync::Arc;

use crate::backend::TableBackend;
use crate::stream::Stream;

/// Partition key type. A simple `String` alias, kept distinct for readability
/// at call sites and in error messages.
pub type PartitionKey = String;

/// Row key of the single stream header row, per partition.
pub const STREAM_ROW_KEY: &str = "SS-HEAD";

/// Row-key prefix reserved for event rows.
pub const EVENT_ROW_PREFIX: &str = "SS-SE-";

/// Row-key prefix reserved for event-id uniqueness rows.
pub const EVENT_ID_ROW_PREFIX: &str = "SS-UID-";

/// Width events are zero-padded to, so that lexicographic and numeric row-key
/// order agree for every version up to 10 billion.
const VERSION_WIDTH: usize = 10;

/// The row key of the event row at `version`.
///
/// Zero-padded to [`VERSION_WIDTH`] digits: for any `a < b`,
/// `event_version_row_key(a) < event_version_row_key(b)` lexicographically.
#[must_use]
pub fn event_version_row_key(version: i64) -> String {
    format!("{EVENT_ROW_PREFIX}{version:0width$}", width = VERSION_WIDTH)
}

/// The row key of the event-id uniqueness row for a caller-supplied `id`.
#[must_use]
pub fn event_id_row_key(id: &str) -> String {
    format!("{EVENT_ID_ROW_PREFIX}{id}")
}

/// A handle to a single partition in the underlying table: the atomicity and
/// range-query unit of the store, pairing a table backend with a partition
/// key.
///
/// Every row this crate writes or reads lives in exactly one `Partition`;
/// cross-partition transactions are out of scope for this crate.
#[derive(Debug)]
pub struct Partition<B> {
    backend: Arc<B>,
    partition_key: PartitionKey,
}

impl<B> Clone for Partition<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            partition_key: self.partition_key.clone(),
        }
    }
}

impl<B> Partition<B>
where
    B: TableBackend,
{
    /// Creates a new partition handle over `backend`, addressed by `partition_key`.
    pub fn new(backend: Arc<B>, partition_key: impl Into<PartitionKey>) -> Self {
        Self {
            backend,
            partition_key: partition_key.into(),
        }
    }

    /// The partition key this handle addresses.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens the stream at this partition, failing with
    /// [`crate::Error::StreamNotFound`] if no header row exists.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", name = "Partition::open", skip(self), fields(partition_key = %self.partition_key), err)
    )]
    pub async fn open(&self) -> crate::Result<Stream<B>> {
        crate::provision::open(self).await
    }

    /// Opens the stream at this partition, returning `None` instead of an
    /// error when no header row exists.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", name = "Partition::try_open", skip(self), fields(partition_key = %self.partition_key), err)
    )]
    pub async fn try_open(&self) -> crate::Result<Option<Stream<B>>> {
        crate::provision::try_open(self).await
    }

    /// `true` iff a stream header exists at this partition.
    pub async fn exists(&self) -> crate::Result<bool> {
        Ok(self.try_open().await?.is_some())
    }

    /// Provisions a new, empty stream header at this partition.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", name = "Partition::provision", skip(self), fields(partition_key = %self.partition_key), err)
    )]
    pub async fn provision(&self) -> crate::Result<Stream<B>> {
        crate::provision::provision(self, crate::properties::PropertyMap::new()).await
    }

    /// Provisions a new stream header at this partition with the given
    /// initial properties.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", name = "Partition::provision_with_properties", skip(self, properties), fields(partition_key = %self.partition_key), err)
    )]
    pub async fn provision_with_properties(
        &self,
        properties: crate::properties::PropertyMap,
    ) -> crate::Result<Stream<B>> {
        crate::provision::provision(self, properties).await
    }

    /// Writes `events` to this partition, first opening the stream (if
    /// `expected_version > 0`) and verifying its version matches
    /// `expected_version`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            name = "Partition::write",
            skip(self, options, events),
            fields(partition_key = %self.partition_key, expected_version, event_count = events.len()),
            err
        )
    )]
    pub async fn write(
        &self,
        expected_version: i64,
        options: crate::write::StreamWriteOptions,
        events: Vec<crate::event::EventData>,
    ) -> crate::Result<(Stream<B>, Vec<crate::event::RecordedEvent>)> {
        crate::write::write_expected_version(self, expected_version, options, events).await
    }

    /// Reads a bounded, contiguous slice of events from this partition.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            name = "Partition::read",
            skip(self, transform),
            fields(partition_key = %self.partition_key, start_version, slice_size),
            err
        )
    )]
    pub async fn read<T>(
        &self,
        start_version: i64,
        slice_size: usize,
        transform: impl Fn(crate::read::EventRow) -> crate::Result<T>,
    ) -> crate::Result<crate::read::StreamSlice<B, T>> {
        crate::read::read(self, start_version, slice_size, transform).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_version_row_key_preserves_numeric_order() {
        assert!(event_version_row_key(1) < event_version_row_key(2));
        assert!(event_version_row_key(9) < event_version_row_key(10));
        assert!(event_version_row_key(99) < event_version_row_key(100));
        assert!(event_version_row_key(9_999_999_999) > event_version_row_key(1));
    }

    #[test]
    fn event_version_row_key_is_fixed_width() {
        assert_eq!(event_version_row_key(1), "SS-SE-0000000001");
        assert_eq!(event_version_row_key(0), "SS-SE-0000000000");
    }

    #[test]
    fn event_id_row_key_embeds_caller_id() {
        assert_eq!(event_id_row_key("order-42"), "SS-UID-order-42");
    }
}
