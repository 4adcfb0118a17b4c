//! The event record model: the caller-supplied [`EventData`] and the
//! library-assigned [`RecordedEvent`] it becomes once a version is
//! attached.

use crate::operation::{Entity, EntityOperation};
use crate::partition::{event_id_row_key, event_version_row_key, PartitionKey};
use crate::properties::{filter_reserved, PropertyMap};

/// An event as the caller supplies it to `Write`: no version yet assigned.
#[derive(Debug, Clone)]
pub struct EventData {
    /// Caller-supplied identifier. When present, reserves
    /// [`crate::partition::event_id_row_key`] and is enforced unique across
    /// every event ever appended to the partition.
    pub id: Option<String>,
    /// User-defined attributes for this event (reserved names filtered).
    pub properties: PropertyMap,
    /// Co-mutations to apply in the same transaction as this event.
    pub includes: Vec<EntityOperation>,
}

impl EventData {
    /// Creates a new event with no id and no includes.
    #[must_use]
    pub fn new(properties: PropertyMap) -> Self {
        Self {
            id: None,
            properties: filter_reserved(properties),
            includes: Vec::new(),
        }
    }

    /// Sets this event's id, reserving its uniqueness row.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Appends an included operation, to be co-committed with this event.
    #[must_use]
    pub fn with_include(mut self, include: EntityOperation) -> Self {
        self.includes.push(include);
        self
    }
}

/// An event once the library has assigned it a version and built its
/// persisted rows.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Strictly-increasing version assigned by the library, `>= 1`.
    pub version: i64,
    /// Copied from the source [`EventData`].
    pub id: Option<String>,
    /// Copied from the source [`EventData`].
    pub properties: PropertyMap,
    /// The event row's `Insert`, plus, iff `id` is present, the event-id
    /// row's `Insert`.
    pub event_operations: Vec<EntityOperation>,
    /// The caller's includes, partition key stamped to the stream's own.
    pub included_operations: Vec<EntityOperation>,
}

impl RecordedEvent {
    /// Total action count this event contributes to a transaction: used by
    /// the chunker for per-chunk budgeting.
    #[must_use]
    pub fn operations(&self) -> usize {
        self.event_operations.len() + self.included_operations.len()
    }
}

/// Assigns versions `previous_version + 1 ..= previous_version + events.len()`
/// to `events`, in order, building each one's persisted rows.
///
/// Property maps are copied defensively: each `EventData`'s `properties`
/// and `includes` are consumed, not referenced, so later mutation by the
/// caller can never retroactively change what was recorded.
pub(crate) fn record(
    partition_key: &PartitionKey,
    previous_version: i64,
    events: Vec<crate::event::EventData>,
) -> Vec<RecordedEvent> {
    events
        .into_iter()
        .enumerate()
        .map(|(offset, event)| {
            let version = previous_version + 1 + offset as i64;

            let mut event_operations = vec![EntityOperation::Insert(Entity::new(
                partition_key.clone(),
                event_version_row_key(version),
                event_row_properties(version, &event.properties),
            ))];

            if let Some(id) = &event.id {
                event_operations.push(EntityOperation::Insert(Entity::new(
                    partition_key.clone(),
                    event_id_row_key(id),
                    event_id_row_properties(version),
                )));
            }

            let included_operations = event
                .includes
                .into_iter()
                .map(|op| stamp_partition_key(op, partition_key))
                .collect();

            RecordedEvent {
                version,
                id: event.id,
                properties: event.properties,
                event_operations,
                included_operations,
            }
        })
        .collect()
}

fn event_row_properties(version: i64, properties: &PropertyMap) -> PropertyMap {
    let mut row = properties.clone();
    row.insert(
        "Version".to_owned(),
        crate::properties::PropertyValue::Int64(version),
    );
    row
}

fn event_id_row_properties(version: i64) -> PropertyMap {
    let mut row = PropertyMap::new();
    row.insert(
        "Version".to_owned(),
        crate::properties::PropertyValue::Int64(version),
    );
    row
}

fn stamp_partition_key(op: EntityOperation, partition_key: &PartitionKey) -> EntityOperation {
    let stamp = |mut entity: Entity| {
        entity.partition_key = partition_key.clone();
        entity
    };

    match op {
        EntityOperation::Insert(e) => EntityOperation::Insert(stamp(e)),
        EntityOperation::Replace(e) => EntityOperation::Replace(stamp(e)),
        EntityOperation::Delete(e) => EntityOperation::Delete(stamp(e)),
        EntityOperation::InsertOrMerge(e) => EntityOperation::InsertOrMerge(stamp(e)),
        EntityOperation::InsertOrReplace(e) => EntityOperation::InsertOrReplace(stamp(e)),
        EntityOperation::UpdateMerge(e) => EntityOperation::UpdateMerge(stamp(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_assigns_strictly_increasing_versions() {
        let events = vec![
            EventData::new(PropertyMap::new()),
            EventData::new(PropertyMap::new()),
            EventData::new(PropertyMap::new()),
        ];

        let recorded = record(&"p".to_owned(), 5, events);

        assert_eq!(
            recorded.iter().map(|e| e.version).collect::<Vec<_>>(),
            vec![6, 7, 8]
        );
    }

    #[test]
    fn record_emits_one_operation_without_id_and_two_with_id() {
        let events = vec![
            EventData::new(PropertyMap::new()),
            EventData::new(PropertyMap::new()).with_id("order-1"),
        ];

        let recorded = record(&"p".to_owned(), 0, events);

        assert_eq!(recorded[0].event_operations.len(), 1);
        assert_eq!(recorded[1].event_operations.len(), 2);
        assert_eq!(recorded[0].operations(), 1);
        assert_eq!(recorded[1].operations(), 2);
    }

    #[test]
    fn record_stamps_includes_with_the_stream_partition_key() {
        let include = EntityOperation::Insert(Entity::new("other", "row", PropertyMap::new()));
        let events = vec![EventData::new(PropertyMap::new()).with_include(include)];

        let recorded = record(&"stream-partition".to_owned(), 0, events);

        assert_eq!(
            recorded[0].included_operations[0].entity().partition_key,
            "stream-partition"
        );
    }
}
