//! Provision and SetProperties: the two single-action transactions outside
//! the chunked write path -- creating the header, and replacing its
//! properties wholesale.

use crate::backend::{ActionErrorCode, SingleActionOutcome, TableBackend};
use crate::error::ConcurrencyConflict;
use crate::partition::{Partition, STREAM_ROW_KEY};
use crate::properties::{filter_reserved, PropertyMap, PropertyValue};
use crate::stream::Stream;

/// Provisions a new, empty stream header at `partition` with `properties`.
///
/// A single-action transaction inserting the header at `Version = 0`.
/// `EntityAlreadyExists` maps to
/// [`ConcurrencyConflict::StreamChangedOrExists`].
pub(crate) async fn provision<B>(
    partition: &Partition<B>,
    properties: PropertyMap,
) -> crate::Result<Stream<B>>
where
    B: TableBackend,
{
    let properties = filter_reserved(properties);
    let mut row = properties.clone();
    row.insert("Version".to_owned(), PropertyValue::Int64(0));

    let outcome = partition
        .backend()
        .add_entity(partition.partition_key(), STREAM_ROW_KEY, &row)
        .await
        .map_err(crate::Error::transport)?;

    match outcome {
        SingleActionOutcome::Committed(result) => {
            Ok(Stream::new(partition.clone(), 0, result.etag, properties))
        }
        SingleActionOutcome::Failed(ActionErrorCode::EntityAlreadyExists) => Err(
            ConcurrencyConflict::StreamChangedOrExists(partition.partition_key().to_owned()).into(),
        ),
        SingleActionOutcome::Failed(code) => Err(crate::Error::Transport(anyhow::anyhow!(
            "unexpected provision failure code: {code:?}"
        ))),
    }
}

/// Replaces the header's properties wholesale, guarded by `stream`'s e-tag.
///
/// Rejects transient streams. Returns a new header carrying the updated
/// e-tag. `UpdateConditionNotSatisfied` maps to
/// [`ConcurrencyConflict::StreamChanged`].
pub(crate) async fn set_properties<B>(
    stream: &Stream<B>,
    properties: PropertyMap,
) -> crate::Result<Stream<B>>
where
    B: TableBackend,
{
    let partition = stream.partition();
    let etag = stream.etag().ok_or_else(|| {
        crate::Error::InvalidOperation(
            "cannot set properties on a transient stream; provision or write it first".to_owned(),
        )
    })?;

    let properties = filter_reserved(properties);
    let mut row = properties.clone();
    row.insert(
        "Version".to_owned(),
        PropertyValue::Int64(stream.version()),
    );

    let outcome = partition
        .backend()
        .update_entity(partition.partition_key(), STREAM_ROW_KEY, etag, &row)
        .await
        .map_err(crate::Error::transport)?;

    match outcome {
        SingleActionOutcome::Committed(result) => Ok(Stream::new(
            partition.clone(),
            stream.version(),
            result.etag,
            properties,
        )),
        SingleActionOutcome::Failed(ActionErrorCode::UpdateConditionNotSatisfied) => {
            Err(ConcurrencyConflict::StreamChanged(partition.partition_key().to_owned()).into())
        }
        SingleActionOutcome::Failed(code) => Err(crate::Error::Transport(anyhow::anyhow!(
            "unexpected set_properties failure code: {code:?}"
        ))),
    }
}

/// Opens the stream at `partition`, failing with
/// [`crate::Error::StreamNotFound`] if no header row exists.
pub(crate) async fn open<B>(partition: &Partition<B>) -> crate::Result<Stream<B>>
where
    B: TableBackend,
{
    try_open(partition)
        .await?
        .ok_or_else(|| crate::Error::StreamNotFound(partition.partition_key().to_owned()))
}

/// Opens the stream at `partition`, returning `None` if no header row
/// exists.
pub(crate) async fn try_open<B>(partition: &Partition<B>) -> crate::Result<Option<Stream<B>>>
where
    B: TableBackend,
{
    let row = partition
        .backend()
        .get_entity(partition.partition_key(), STREAM_ROW_KEY)
        .await
        .map_err(crate::Error::transport)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let version = match row.properties.get("Version") {
        Some(PropertyValue::Int64(v)) => *v,
        _ => 0,
    };

    let mut properties = row.properties;
    properties.remove("Version");

    Ok(Some(Stream::new(
        partition.clone(),
        version,
        Some(row.etag),
        properties,
    )))
}
