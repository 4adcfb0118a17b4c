//! The write operation: provisions/updates the stream header, records
//! events, drives the change tracker and chunker, submits each chunk's
//! transaction, and classifies every flavor of conflict the backend can
//! return.

use crate::backend::{ActionErrorCode, TableBackend, TransactionOutcome};
use crate::error::ConcurrencyConflict;
use crate::event::{EventData, RecordedEvent};
use crate::operation::{Entity, EntityOperation, ETag, OperationKind};
use crate::partition::{Partition, PartitionKey, STREAM_ROW_KEY};
use crate::properties::{PropertyMap, PropertyValue};
use crate::stream::Stream;
use crate::{chunker, event, tracker};

/// Options controlling how a `Write` resolves its included operations.
#[derive(Debug, Clone, Copy)]
pub struct StreamWriteOptions {
    /// When `true` (the default), included operations targeting the same
    /// row are folded through the change tracker. When `false`, every
    /// include passes through as-is, in the order given -- no
    /// deduplication, conflicting operations against the same row become
    /// the caller's responsibility.
    pub track_changes: bool,
}

impl Default for StreamWriteOptions {
    fn default() -> Self {
        Self {
            track_changes: true,
        }
    }
}

/// Origin of a single flattened operation in a submitted chunk, used to
/// classify which row a transaction failure landed on.
enum Origin {
    Header,
    EventRow { version: i64 },
    EventIdRow { version: i64, id: String },
    Include { row_key: String, kind: OperationKind },
}

/// Writes `events` onto `stream`, returning the updated header and the
/// recorded events.
///
/// Preconditions: `events` must be non-empty.
pub(crate) async fn write<B>(
    stream: &Stream<B>,
    options: StreamWriteOptions,
    events: Vec<EventData>,
) -> crate::Result<(Stream<B>, Vec<RecordedEvent>)>
where
    B: TableBackend,
{
    if events.is_empty() {
        return Err(crate::Error::ArgumentNull("events"));
    }

    let partition = stream.partition().clone();
    let partition_key = partition.partition_key().to_owned();

    let recorded = event::record(&partition_key, stream.version(), events);
    let chunks = chunker::chunk(recorded)?;

    let mut current = stream.clone();
    let mut all_recorded = Vec::new();

    for chunk_events in chunks {
        current = submit_chunk(&partition, &partition_key, &current, chunk_events.clone(), &options).await?;
        all_recorded.extend(chunk_events);
    }

    Ok((current, all_recorded))
}

/// Writes to a partition by expected version: opens the stream first when
/// `expected_version > 0` and verifies the version matches, otherwise
/// treats the partition as freshly provisioned-or-absent.
pub(crate) async fn write_expected_version<B>(
    partition: &Partition<B>,
    expected_version: i64,
    options: StreamWriteOptions,
    events: Vec<EventData>,
) -> crate::Result<(Stream<B>, Vec<RecordedEvent>)>
where
    B: TableBackend,
{
    let stream = if expected_version > 0 {
        let stream = partition.open().await?;
        if stream.version() != expected_version {
            return Err(ConcurrencyConflict::StreamChanged(partition.partition_key().to_owned()).into());
        }
        stream
    } else {
        match partition.try_open().await? {
            Some(stream) if stream.version() != 0 => {
                return Err(ConcurrencyConflict::StreamChanged(partition.partition_key().to_owned()).into());
            }
            Some(stream) => stream,
            None => Stream::new(partition.clone(), 0, None, PropertyMap::new()),
        }
    };

    write(&stream, options, events).await
}

async fn submit_chunk<B>(
    partition: &Partition<B>,
    partition_key: &PartitionKey,
    stream: &Stream<B>,
    chunk_events: Vec<RecordedEvent>,
    options: &StreamWriteOptions,
) -> crate::Result<Stream<B>>
where
    B: TableBackend,
{
    let new_version = stream.version() + chunk_events.len() as i64;

    let mut ops = Vec::new();
    let mut origins = Vec::new();

    ops.push(header_operation(partition_key, stream, new_version));
    origins.push(Origin::Header);

    let mut includes = Vec::new();

    for recorded in &chunk_events {
        for op in &recorded.event_operations {
            let is_id_row = matches!(op, EntityOperation::Insert(e) if e.row_key.starts_with(crate::partition::EVENT_ID_ROW_PREFIX));
            if is_id_row {
                origins.push(Origin::EventIdRow {
                    version: recorded.version,
                    id: recorded.id.clone().unwrap_or_default(),
                });
            } else {
                origins.push(Origin::EventRow {
                    version: recorded.version,
                });
            }
            ops.push(op.clone());
        }

        includes.extend(recorded.included_operations.iter().cloned());
    }

    let tracked_includes = tracker::track(includes, options)?;
    for op in &tracked_includes {
        origins.push(Origin::Include {
            row_key: op.entity().row_key.clone(),
            kind: op.kind(),
        });
    }
    ops.extend(tracked_includes);

    let outcome = partition
        .backend()
        .submit_transaction(partition_key, &ops)
        .await
        .map_err(crate::Error::transport)?;

    match outcome {
        TransactionOutcome::Committed(results) => {
            let header_etag = results
                .first()
                .and_then(|r| r.etag.clone())
                .ok_or_else(|| {
                    crate::Error::InvalidOperation(
                        "backend committed a transaction without returning a header e-tag".to_owned(),
                    )
                })?;

            Ok(Stream::new(
                partition.clone(),
                new_version,
                Some(header_etag),
                stream.properties().clone(),
            ))
        }
        TransactionOutcome::Failed(failure) => {
            Err(classify_failure(partition_key, &origins, failure.failed_index, failure.code))
        }
    }
}

fn header_operation<B>(partition_key: &PartitionKey, stream: &Stream<B>, new_version: i64) -> EntityOperation {
    let mut version_only = PropertyMap::new();
    version_only.insert("Version".to_owned(), PropertyValue::Int64(new_version));

    if stream.is_transient() {
        let mut properties = stream.properties().clone();
        properties.insert("Version".to_owned(), PropertyValue::Int64(new_version));
        EntityOperation::Insert(Entity::new(partition_key.clone(), STREAM_ROW_KEY, properties))
    } else {
        let mut entity = Entity::new(partition_key.clone(), STREAM_ROW_KEY, version_only);
        entity.etag = stream.etag().map(|e| ETag::Value(e.to_owned()));
        EntityOperation::UpdateMerge(entity)
    }
}

fn classify_failure(
    partition_key: &PartitionKey,
    origins: &[Origin],
    failed_index: usize,
    code: ActionErrorCode,
) -> crate::Error {
    match code {
        ActionErrorCode::UpdateConditionNotSatisfied => {
            ConcurrencyConflict::StreamChanged(partition_key.clone()).into()
        }
        ActionErrorCode::EntityAlreadyExists => match origins.get(failed_index) {
            Some(Origin::Header) | None => {
                ConcurrencyConflict::StreamChangedOrExists(partition_key.clone()).into()
            }
            Some(Origin::EventIdRow { id, .. }) => crate::Error::DuplicateEvent {
                partition: partition_key.clone(),
                id: id.clone(),
            },
            Some(Origin::EventRow { version }) => {
                ConcurrencyConflict::EventVersionExists {
                    partition: partition_key.clone(),
                    version: *version,
                }
                .into()
            }
            Some(Origin::Include { row_key, kind }) => crate::Error::IncludedOperationConflict {
                partition: partition_key.clone(),
                row_key: row_key.clone(),
                operation: *kind,
            },
        },
        ActionErrorCode::Other(code) => {
            crate::Error::Transport(anyhow::anyhow!("table backend reported error code '{code}'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::partition::Partition;
    use std::sync::Arc;

    fn partition() -> Partition<InMemoryBackend> {
        Partition::new(Arc::new(InMemoryBackend::new()), "test-partition")
    }

    #[tokio::test]
    async fn write_on_transient_stream_provisions_and_appends() {
        let partition = partition();
        let stream = Stream::new(partition.clone(), 0, None, PropertyMap::new());

        let (updated, recorded) = write(
            &stream,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap();

        assert_eq!(updated.version(), 1);
        assert_eq!(recorded.len(), 1);
        assert!(updated.etag().is_some());
    }

    #[tokio::test]
    async fn sequential_writes_accumulate_version() {
        let partition = partition();
        let stream = partition.provision().await.unwrap();

        let (stream, _) = write(
            &stream,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new()), EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap();
        assert_eq!(stream.version(), 2);

        let (stream, _) = write(
            &stream,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new()), EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap();
        assert_eq!(stream.version(), 4);
    }

    #[tokio::test]
    async fn concurrent_writers_race_on_the_header_etag() {
        let partition = partition();
        let h1 = partition.provision().await.unwrap();
        let h2 = h1.clone();

        let (_, _) = write(&h1, StreamWriteOptions::default(), vec![EventData::new(PropertyMap::new())])
            .await
            .unwrap();

        let err = write(&h2, StreamWriteOptions::default(), vec![EventData::new(PropertyMap::new())])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::Error::ConcurrencyConflict(ConcurrencyConflict::StreamChanged(_))
        ));
    }

    #[tokio::test]
    async fn rewriting_the_same_event_id_is_rejected() {
        let partition = partition();
        let stream = partition.provision().await.unwrap();

        let (stream, _) = write(
            &stream,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new()).with_id("a")],
        )
        .await
        .unwrap();

        let err = write(
            &stream,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new()).with_id("a")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, crate::Error::DuplicateEvent { .. }));
    }

    #[tokio::test]
    async fn expected_version_write_conflicts_on_second_writer() {
        let partition = partition();

        let (_, _) = write_expected_version(
            &partition,
            0,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap();

        let err = write_expected_version(
            &partition,
            0,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            crate::Error::ConcurrencyConflict(ConcurrencyConflict::StreamChanged(_))
        ));
    }

    #[tokio::test]
    async fn empty_events_is_rejected() {
        let partition = partition();
        let stream = Stream::new(partition.clone(), 0, None, PropertyMap::new());
        let err = write(&stream, StreamWriteOptions::default(), vec![]).await.unwrap_err();
        assert!(matches!(err, crate::Error::ArgumentNull("events")));
    }
}
