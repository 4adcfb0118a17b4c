//! The typed operations a caller can include in a write, and the `merge`
//! composition used by the change tracker to fold repeated operations
//! against the same row into a single legal backend action.

use std::sync::Arc;

use crate::properties::PropertyMap;

/// An opaque identity marker for an [`Entity`], used by the change tracker
/// to tell "the same entity handle, mutated between steps" apart from "a
/// different entity that happens to target the same row key".
///
/// Rust has no object-identity concept at the value level; this crate
/// expresses it explicitly with an `Arc` marker instead. Cloning an
/// `Entity` (e.g. to update its e-tag after a previous step) preserves the
/// handle, since cloning an `Arc` shares the pointee; constructing a fresh
/// `Entity` via [`Entity::new`] always mints a new one.
#[derive(Debug, Clone)]
pub struct EntityHandle(Arc<()>);

impl EntityHandle {
    fn new() -> Self {
        Self(Arc::new(()))
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EntityHandle {}

/// Opaque version token attached to a row by the backend, used for
/// optimistic concurrency. `Any` is the sentinel accepted in place of a
/// caller-supplied tag when the caller doesn't care about the prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ETag {
    /// A concrete e-tag previously returned by the backend.
    Value(String),
    /// The `"any"` sentinel: skip the optimistic-concurrency check.
    Any,
}

impl ETag {
    fn is_empty_value(&self) -> bool {
        matches!(self, ETag::Value(v) if v.is_empty())
    }
}

/// The target row of an entity operation: partition key, row key, the e-tag
/// the caller last observed for it (if any), and its user-supplied
/// attributes.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Partition key; stamped to the stream's own partition key when the
    /// entity is recorded as part of a write.
    pub partition_key: String,
    /// Row key of the target row. Must not fall within the reserved
    /// `SS-HEAD`, `SS-SE-` or `SS-UID-` ranges (see [`crate::partition`]).
    pub row_key: String,
    /// The e-tag the caller last observed for this row, if any.
    pub etag: Option<ETag>,
    /// User-supplied attributes to write.
    pub properties: PropertyMap,
    /// Identity marker used by the change tracker to distinguish a reused
    /// handle from a distinct entity sharing the same row key.
    pub handle: EntityHandle,
}

impl Entity {
    /// Creates a new entity with a fresh identity handle and no known
    /// e-tag.
    #[must_use]
    pub fn new(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            etag: None,
            properties,
            handle: EntityHandle::new(),
        }
    }
}

/// A discriminant-only view of [`EntityOperation`], used in error messages
/// and error variants where the payload itself is uninteresting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// See [`EntityOperation::Insert`].
    Insert,
    /// See [`EntityOperation::Replace`].
    Replace,
    /// See [`EntityOperation::Delete`].
    Delete,
    /// See [`EntityOperation::InsertOrMerge`].
    InsertOrMerge,
    /// See [`EntityOperation::InsertOrReplace`].
    InsertOrReplace,
    /// See [`EntityOperation::UpdateMerge`].
    UpdateMerge,
}

/// A typed operation against a single row. Variants mirror the backend's
/// batch actions, plus an internal `UpdateMerge` used only for header
/// updates, never exposed to callers as an include.
#[derive(Debug, Clone)]
pub enum EntityOperation {
    /// Inserts a new row; fails if one already exists at the same key.
    Insert(Entity),
    /// Replaces an existing row entirely, guarded by its e-tag.
    Replace(Entity),
    /// Deletes an existing row.
    Delete(Entity),
    /// Inserts the row, or merges supplied attributes into it if it exists.
    InsertOrMerge(Entity),
    /// Inserts the row, or replaces it entirely if it exists.
    InsertOrReplace(Entity),
    /// Merges supplied attributes into an existing row, guarded by its
    /// e-tag. Internal: only ever produced for the stream header, to
    /// preserve properties the caller didn't touch.
    UpdateMerge(Entity),
}

impl EntityOperation {
    /// The discriminant of this operation, ignoring its payload.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            EntityOperation::Insert(_) => OperationKind::Insert,
            EntityOperation::Replace(_) => OperationKind::Replace,
            EntityOperation::Delete(_) => OperationKind::Delete,
            EntityOperation::InsertOrMerge(_) => OperationKind::InsertOrMerge,
            EntityOperation::InsertOrReplace(_) => OperationKind::InsertOrReplace,
            EntityOperation::UpdateMerge(_) => OperationKind::UpdateMerge,
        }
    }

    /// The target entity of this operation.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        match self {
            EntityOperation::Insert(e)
            | EntityOperation::Replace(e)
            | EntityOperation::Delete(e)
            | EntityOperation::InsertOrMerge(e)
            | EntityOperation::InsertOrReplace(e)
            | EntityOperation::UpdateMerge(e) => e,
        }
    }

    /// Partition key and row key of the target entity, used by the change
    /// tracker to group operations.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        let entity = self.entity();
        (entity.partition_key.clone(), entity.row_key.clone())
    }

    /// Validates the e-tag requirement for `Replace`/`UpdateMerge`: a
    /// non-empty caller-supplied e-tag, or the `Any` sentinel. Neither
    /// operation can be submitted without one.
    pub(crate) fn validate_etag(&self) -> crate::Result<()> {
        let needs_etag = matches!(
            self,
            EntityOperation::Replace(_) | EntityOperation::UpdateMerge(_)
        );

        if !needs_etag {
            return Ok(());
        }

        match &self.entity().etag {
            Some(etag) if !etag.is_empty_value() => Ok(()),
            _ => Err(crate::Error::InvalidOperation(format!(
                "{:?} on row '{}' requires a non-empty e-tag or the Any sentinel",
                self.kind(),
                self.entity().row_key
            ))),
        }
    }
}

/// A pseudo-variant representing a cancelled pair of operations (e.g.
/// `Insert` followed by `Delete`): the row never needs to be touched.
enum Folded {
    Op(EntityOperation),
    Null,
}

/// Folds `first` and `second`, two operations already known to target the
/// same `(PartitionKey, RowKey)`, per the operation composition table.
/// Returns the single resulting legal operation, or an error if the
/// sequence is illegal.
///
/// `first` having already been folded from `Null` is represented by the
/// caller passing `None` for `first`.
pub(crate) fn merge(
    first: Option<EntityOperation>,
    second: EntityOperation,
) -> crate::Result<Option<EntityOperation>> {
    use EntityOperation::{Delete, Insert, InsertOrMerge, InsertOrReplace, Replace};

    let folded = match first {
        None => match second {
            Insert(e) => Folded::Op(Insert(e)),
            InsertOrMerge(e) => Folded::Op(InsertOrMerge(e)),
            InsertOrReplace(e) => Folded::Op(InsertOrReplace(e)),
            Replace(_) | Delete(_) => {
                return Err(cannot_apply_to_null(&second));
            }
            EntityOperation::UpdateMerge(e) => Folded::Op(EntityOperation::UpdateMerge(e)),
        },
        Some(Insert(_)) => match second {
            Replace(e) => Folded::Op(Insert(e)),
            Delete(_) => Folded::Null,
            Insert(_) | InsertOrMerge(_) | InsertOrReplace(_) => {
                return Err(illegal_sequence(OperationKind::Insert, second.kind()));
            }
            EntityOperation::UpdateMerge(_) => {
                return Err(illegal_sequence(OperationKind::Insert, second.kind()));
            }
        },
        Some(Replace(_)) => match second {
            Replace(e) => Folded::Op(Replace(e)),
            Delete(e) => Folded::Op(Delete(e)),
            Insert(_) | InsertOrMerge(_) | InsertOrReplace(_) => {
                return Err(illegal_sequence(OperationKind::Replace, second.kind()));
            }
            EntityOperation::UpdateMerge(_) => {
                return Err(illegal_sequence(OperationKind::Replace, second.kind()));
            }
        },
        Some(Delete(_)) => match second {
            Insert(e) => Folded::Op(Replace(e)),
            Replace(_) | Delete(_) | InsertOrMerge(_) | InsertOrReplace(_) => {
                return Err(illegal_sequence(OperationKind::Delete, second.kind()));
            }
            EntityOperation::UpdateMerge(_) => {
                return Err(illegal_sequence(OperationKind::Delete, second.kind()));
            }
        },
        Some(InsertOrMerge(_)) => match second {
            InsertOrMerge(e) => Folded::Op(InsertOrMerge(e)),
            _ => return Err(illegal_sequence(OperationKind::InsertOrMerge, second.kind())),
        },
        Some(InsertOrReplace(_)) => match second {
            InsertOrReplace(e) => Folded::Op(InsertOrReplace(e)),
            _ => {
                return Err(illegal_sequence(
                    OperationKind::InsertOrReplace,
                    second.kind(),
                ))
            }
        },
        Some(EntityOperation::UpdateMerge(_)) => {
            return Err(illegal_sequence(OperationKind::UpdateMerge, second.kind()));
        }
    };

    Ok(match folded {
        Folded::Op(op) => Some(op),
        Folded::Null => None,
    })
}

fn illegal_sequence(first: OperationKind, second: OperationKind) -> crate::Error {
    crate::Error::InvalidOperation(format!("{first:?} cannot be followed by {second:?}"))
}

fn cannot_apply_to_null(second: &EntityOperation) -> crate::Error {
    crate::Error::InvalidOperation(format!(
        "{:?} cannot be applied to NULL",
        second.kind()
    ))
}

/// Maps a resolved [`EntityOperation`] to the backend batch action used to
/// submit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    /// `Insert` -> `Add`.
    Add,
    /// `Replace` -> `UpdateReplace`.
    UpdateReplace,
    /// `UpdateMerge` -> `UpdateMerge`.
    UpdateMerge,
    /// `Delete` -> `Delete`.
    Delete,
    /// `InsertOrReplace` -> `UpsertReplace`.
    UpsertReplace,
    /// `InsertOrMerge` -> `UpsertMerge`.
    UpsertMerge,
}

impl EntityOperation {
    /// The backend batch action this operation submits as.
    #[must_use]
    pub fn batch_action(&self) -> BatchAction {
        match self {
            EntityOperation::Insert(_) => BatchAction::Add,
            EntityOperation::Replace(_) => BatchAction::UpdateReplace,
            EntityOperation::UpdateMerge(_) => BatchAction::UpdateMerge,
            EntityOperation::Delete(_) => BatchAction::Delete,
            EntityOperation::InsertOrReplace(_) => BatchAction::UpsertReplace,
            EntityOperation::InsertOrMerge(_) => BatchAction::UpsertMerge,
        }
    }
}
