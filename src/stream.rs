//! The stream header snapshot: version, e-tag and user properties of a
//! single partition, as last observed by the caller.

use crate::backend::TableBackend;
use crate::partition::Partition;
use crate::properties::PropertyMap;

/// A snapshot of a stream's header row, as returned by `Provision`, `Open`,
/// `Write` or `SetProperties`.
///
/// Every stream-touching operation takes the *previous* `Stream` value and
/// returns a *new* one carrying the updated version and e-tag; callers must
/// thread the returned value into their next call.
#[derive(Debug)]
pub struct Stream<B> {
    pub(crate) partition: Partition<B>,
    pub(crate) version: i64,
    pub(crate) etag: Option<String>,
    pub(crate) properties: PropertyMap,
}

// Written by hand rather than `#[derive(Clone)]`: the derive would add a
// spurious `B: Clone` bound, but `Partition<B>` (and therefore `Stream<B>`)
// is cloneable for any backend since the backend itself is only ever held
// behind an `Arc`.
impl<B> Clone for Stream<B> {
    fn clone(&self) -> Self {
        Self {
            partition: self.partition.clone(),
            version: self.version,
            etag: self.etag.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<B> Stream<B>
where
    B: TableBackend,
{
    pub(crate) fn new(
        partition: Partition<B>,
        version: i64,
        etag: Option<String>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            partition,
            version,
            etag,
            properties,
        }
    }

    /// The partition this stream's header lives in.
    #[must_use]
    pub fn partition(&self) -> &Partition<B> {
        &self.partition
    }

    /// The stream's current version: the count of events appended so far.
    /// `0` for a freshly provisioned, empty stream.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The header row's current e-tag, or `None` for a transient stream
    /// that has never been persisted.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// `true` iff this stream has never been provisioned or written: no
    /// e-tag has been observed for its header row yet.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.etag.is_none()
    }

    /// The header's user-defined properties, as last observed.
    #[must_use]
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Writes `events` onto this stream, returning the updated header and
    /// the recorded events.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            name = "Stream::write",
            skip(self, options, events),
            fields(partition_key = %self.partition.partition_key(), version = self.version, event_count = events.len()),
            err
        )
    )]
    pub async fn write(
        &self,
        options: crate::write::StreamWriteOptions,
        events: Vec<crate::event::EventData>,
    ) -> crate::Result<(Self, Vec<crate::event::RecordedEvent>)> {
        crate::write::write(self, options, events).await
    }

    /// Replaces this stream's header properties wholesale, guarded by its
    /// e-tag. Fails on a transient stream.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            name = "Stream::set_properties",
            skip(self, properties),
            fields(partition_key = %self.partition.partition_key(), version = self.version),
            err
        )
    )]
    pub async fn set_properties(&self, properties: PropertyMap) -> crate::Result<Self> {
        crate::provision::set_properties(self, properties).await
    }
}
