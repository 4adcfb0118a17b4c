//! End-to-end scenarios exercising the façade against the in-memory
//! `TableBackend`, modeled on `eventually-postgres/tests/event_store.rs`.

use std::sync::Arc;

use eventually_tables::backend::memory::InMemoryBackend;
use eventually_tables::operation::{Entity, EntityOperation};
use eventually_tables::read::raw_row;
use eventually_tables::{EventData, Error, Partition, PropertyMap, StreamWriteOptions};

fn partition() -> Partition<InMemoryBackend> {
    Partition::new(Arc::new(InMemoryBackend::new()), "orders/order-42")
}

#[tokio::test]
async fn sequential_writes_accumulate_a_gap_free_version() {
    let partition = partition();
    let stream = partition.provision().await.unwrap();

    let (stream, recorded) = stream
        .write(
            StreamWriteOptions::default(),
            vec![
                EventData::new(PropertyMap::new()),
                EventData::new(PropertyMap::new()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(stream.version(), 2);
    assert_eq!(recorded[0].version, 1);
    assert_eq!(recorded[1].version, 2);

    let (stream, recorded) = stream
        .write(
            StreamWriteOptions::default(),
            vec![
                EventData::new(PropertyMap::new()),
                EventData::new(PropertyMap::new()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(stream.version(), 4);
    assert_eq!(recorded[0].version, 3);
    assert_eq!(recorded[1].version, 4);

    let slice = partition.read(1, 1000, raw_row).await.unwrap();
    assert_eq!(slice.events.len(), 4);
    assert!(slice.is_end_of_stream);
}

#[tokio::test]
async fn writing_events_with_ids_enforces_cross_event_uniqueness() {
    let partition = partition();
    let stream = partition.provision().await.unwrap();

    let (stream, recorded) = stream
        .write(
            StreamWriteOptions::default(),
            vec![
                EventData::new(PropertyMap::new()).with_id("a"),
                EventData::new(PropertyMap::new()).with_id("b"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(recorded[0].event_operations.len(), 2);
    assert_eq!(recorded[1].event_operations.len(), 2);

    let err = stream
        .write(
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new()).with_id("b")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateEvent { id, .. } if id == "b"));
}

#[tokio::test]
async fn concurrent_writers_race_and_the_loser_must_reopen() {
    let partition = partition();
    let h1 = partition.provision().await.unwrap();
    let h2 = h1.clone();

    h1.write(
        StreamWriteOptions::default(),
        vec![EventData::new(PropertyMap::new())],
    )
    .await
    .unwrap();

    let err = h2
        .write(
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConcurrencyConflict(_)));

    // the losing writer's attempt left the partition unchanged
    let reopened = partition.open().await.unwrap();
    assert_eq!(reopened.version(), 1);
}

#[tokio::test]
async fn expected_version_write_detects_a_raced_provision() {
    let partition = partition();

    let (stream, _) = partition
        .write(
            0,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap();
    assert_eq!(stream.version(), 1);

    let err = partition
        .write(
            0,
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConcurrencyConflict(_)));
}

#[tokio::test]
async fn set_properties_round_trips_after_reserved_name_filtering() {
    let partition = partition();
    let stream = partition.provision().await.unwrap();

    let mut properties = PropertyMap::new();
    properties.insert(
        "owner".to_owned(),
        eventually_tables::PropertyValue::String("alice".to_owned()),
    );
    properties.insert(
        "PartitionKey".to_owned(),
        eventually_tables::PropertyValue::String("should-be-dropped".to_owned()),
    );

    let stream = stream.set_properties(properties).await.unwrap();
    assert_eq!(stream.properties().len(), 1);

    let reopened = partition.open().await.unwrap();
    assert_eq!(
        reopened.properties().get("owner"),
        Some(&eventually_tables::PropertyValue::String("alice".to_owned()))
    );
}

#[tokio::test]
async fn includes_are_co_committed_atomically_with_the_event() {
    let partition = partition();
    let stream = partition.provision().await.unwrap();

    let include = EntityOperation::Insert(Entity::new(
        "ignored-stamped-to-stream-partition",
        "projection/order-42",
        PropertyMap::new(),
    ));

    // Inserting the same include row twice in one event is illegal (no
    // handle reuse, same row key): proves the change tracker sees includes
    // from the same event and rejects the bad sequence rather than
    // silently letting both through.
    let err = stream
        .write(
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())
                .with_include(include.clone())
                .with_include(include)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidOperation(_)));
}

#[tokio::test]
async fn read_with_start_version_past_header_returns_empty_end_of_stream() {
    let partition = partition();
    let stream = partition.provision().await.unwrap();
    stream
        .write(
            StreamWriteOptions::default(),
            vec![EventData::new(PropertyMap::new())],
        )
        .await
        .unwrap();

    let slice = partition.read(5, 10, raw_row).await.unwrap();
    assert!(slice.events.is_empty());
    assert!(slice.is_end_of_stream);
}

#[tokio::test]
async fn opening_a_nonexistent_stream_fails() {
    let partition = partition();
    let err = partition.open().await.unwrap_err();
    assert!(matches!(err, Error::StreamNotFound(_)));
}

#[tokio::test]
async fn writing_more_than_one_chunk_worth_of_events_commits_them_all_in_order() {
    let partition = partition();
    let stream = partition.provision().await.unwrap();

    let event_count = 250;
    let events = (0..event_count)
        .map(|_| EventData::new(PropertyMap::new()))
        .collect::<Vec<_>>();

    let (stream, recorded) = stream
        .write(StreamWriteOptions::default(), events)
        .await
        .unwrap();

    assert_eq!(stream.version(), event_count as i64);
    assert_eq!(recorded.len(), event_count);
    assert_eq!(
        recorded.iter().map(|e| e.version).collect::<Vec<_>>(),
        (1..=event_count as i64).collect::<Vec<_>>()
    );

    let slice = partition.read(1, event_count, raw_row).await.unwrap();
    assert_eq!(slice.events.len(), event_count);
    assert!(slice.is_end_of_stream);
}
