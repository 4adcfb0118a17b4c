//! The read operation: co-issues a bounded row-key range query for events
//! and a point query for the stream header, assembling a typed,
//! end-of-stream-aware slice.

use futures::future::try_join;

use crate::backend::{TableBackend, TableRow};
use crate::partition::{event_version_row_key, Partition, STREAM_ROW_KEY};
use crate::properties::{PropertyMap, PropertyValue};
use crate::stream::Stream;

/// An event row as read back from the partition, before the caller's
/// `transform` turns it into whatever type `T` the caller wants.
#[derive(Debug, Clone)]
pub struct EventRow {
    /// The event's version.
    pub version: i64,
    /// The event's stored properties (the `Version` attribute already
    /// split out into [`EventRow::version`]).
    pub properties: PropertyMap,
}

/// A bounded, contiguous window of events read from a stream, plus the
/// header snapshot observed alongside it.
#[derive(Debug, Clone)]
pub struct StreamSlice<B, T> {
    /// The header snapshot observed in the same read.
    pub stream: Stream<B>,
    /// The events in this slice, in version order.
    pub events: Vec<T>,
    /// `true` iff fewer than `slice_size` events were returned, or the next
    /// version the caller would request exceeds the header's version.
    pub is_end_of_stream: bool,
    /// The `start_version` this slice was read from.
    pub start_version: i64,
    /// The `slice_size` requested for this slice.
    pub slice_size: usize,
}

/// Identity transform: returns the raw [`EventRow`] unchanged.
pub fn raw_row(row: EventRow) -> crate::Result<EventRow> {
    Ok(row)
}

/// Transform into the event's bare [`PropertyMap`], discarding the version
/// (already available on [`StreamSlice`] positionally).
pub fn property_map(row: EventRow) -> crate::Result<PropertyMap> {
    Ok(row.properties)
}

/// Transform that reflects an event's properties into a caller-supplied
/// `serde`-deserializable type, the same shape [`crate::properties::from_serializable`]
/// reflects out of.
#[cfg(feature = "serde")]
pub fn reflect<T>(row: EventRow) -> crate::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut object = serde_json::Map::new();
    for (key, value) in row.properties {
        let json = match value {
            PropertyValue::String(s) => serde_json::Value::String(s),
            PropertyValue::Int64(i) => serde_json::Value::Number(i.into()),
            PropertyValue::Bool(b) => serde_json::Value::Bool(b),
            PropertyValue::Double(d) => serde_json::Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropertyValue::Binary(bytes) => {
                serde_json::Value::Array(bytes.into_iter().map(|b| serde_json::Value::from(b)).collect())
            }
        };
        object.insert(key, json);
    }

    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|err| crate::Error::InvalidOperation(format!("failed to reflect event into target type: {err}")))
}

/// Reads at most `slice_size` events starting at `start_version` from
/// `partition`, transforming each row with `transform`.
pub(crate) async fn read<B, T>(
    partition: &Partition<B>,
    start_version: i64,
    slice_size: usize,
    transform: impl Fn(EventRow) -> crate::Result<T>,
) -> crate::Result<StreamSlice<B, T>>
where
    B: TableBackend,
{
    if start_version < 1 {
        return Err(crate::Error::ArgumentOutOfRange("start_version"));
    }
    if slice_size < 1 {
        return Err(crate::Error::ArgumentOutOfRange("slice_size"));
    }

    let partition_key = partition.partition_key();
    let end_version = start_version + slice_size as i64 - 1;

    let range_fut = partition.backend().query_range(
        partition_key,
        &event_version_row_key(start_version),
        &event_version_row_key(end_version),
    );
    let header_fut = partition.backend().get_entity(partition_key, STREAM_ROW_KEY);

    let (rows, header_row) = try_join(range_fut, header_fut)
        .await
        .map_err(crate::Error::transport)?;

    let header_row = header_row.ok_or_else(|| crate::Error::StreamNotFound(partition_key.to_owned()))?;
    let header_version = match header_row.properties.get("Version") {
        Some(PropertyValue::Int64(v)) => *v,
        _ => 0,
    };
    let mut header_properties = header_row.properties;
    header_properties.remove("Version");

    let stream = Stream::new(
        partition.clone(),
        header_version,
        Some(header_row.etag),
        header_properties,
    );

    let events = rows
        .into_iter()
        .map(|row| transform(row_to_event_row(row)))
        .collect::<crate::Result<Vec<_>>>()?;

    let is_end_of_stream = events.len() < slice_size
        || start_version + events.len() as i64 - 1 >= header_version;

    Ok(StreamSlice {
        stream,
        events,
        is_end_of_stream,
        start_version,
        slice_size,
    })
}

fn row_to_event_row(row: TableRow) -> EventRow {
    let version = match row.properties.get("Version") {
        Some(PropertyValue::Int64(v)) => *v,
        _ => 0,
    };
    let mut properties = row.properties;
    properties.remove("Version");
    EventRow { version, properties }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::event::EventData;
    use crate::write::{write, StreamWriteOptions};
    use std::sync::Arc;

    fn partition() -> Partition<InMemoryBackend> {
        Partition::new(Arc::new(InMemoryBackend::new()), "p")
    }

    #[tokio::test]
    async fn read_nonexistent_stream_fails() {
        let partition = partition();
        let err = read(&partition, 1, 10, raw_row).await.unwrap_err();
        assert!(matches!(err, crate::Error::StreamNotFound(_)));
    }

    #[tokio::test]
    async fn start_version_below_one_is_rejected() {
        let partition = partition();
        let err = read(&partition, 0, 10, raw_row).await.unwrap_err();
        assert!(matches!(err, crate::Error::ArgumentOutOfRange("start_version")));
    }

    #[tokio::test]
    async fn slice_size_below_one_is_rejected() {
        let partition = partition();
        let err = read(&partition, 1, 0, raw_row).await.unwrap_err();
        assert!(matches!(err, crate::Error::ArgumentOutOfRange("slice_size")));
    }

    #[tokio::test]
    async fn read_past_header_version_returns_empty_end_of_stream_slice() {
        let partition = partition();
        let stream = partition.provision().await.unwrap();
        write(&stream, StreamWriteOptions::default(), vec![EventData::new(PropertyMap::new())])
            .await
            .unwrap();

        let slice = read(&partition, 5, 10, raw_row).await.unwrap();
        assert!(slice.events.is_empty());
        assert!(slice.is_end_of_stream);
    }

    #[tokio::test]
    async fn read_returns_contiguous_ascending_slice() {
        let partition = partition();
        let stream = partition.provision().await.unwrap();
        write(
            &stream,
            StreamWriteOptions::default(),
            vec![
                EventData::new(PropertyMap::new()),
                EventData::new(PropertyMap::new()),
                EventData::new(PropertyMap::new()),
            ],
        )
        .await
        .unwrap();

        let slice = read(&partition, 1, 2, raw_row).await.unwrap();
        assert_eq!(slice.events.len(), 2);
        assert_eq!(slice.events[0].version, 1);
        assert_eq!(slice.events[1].version, 2);
        assert!(!slice.is_end_of_stream);

        let slice = read(&partition, 3, 2, raw_row).await.unwrap();
        assert_eq!(slice.events.len(), 1);
        assert!(slice.is_end_of_stream);
    }
}
