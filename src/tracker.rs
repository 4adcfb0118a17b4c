//! The included-operation change tracker: groups a write's included
//! operations by `(PartitionKey, RowKey)`, folds each group with the
//! operation algebra, and emits the final per-row operation set in a
//! stable order.

use std::collections::HashMap;

use crate::operation::{merge, EntityOperation};
use crate::write::StreamWriteOptions;

/// Folds `includes`, the included operations collected from every event in
/// a write, into the final set of operations to submit.
///
/// When `options.track_changes` is `true` (the default), operations
/// targeting the same row key are grouped, in order of first appearance,
/// and folded with [`merge`]; groups that collapse to `Null` are dropped.
/// Entities within a group are compared by identity
/// ([`crate::operation::EntityHandle`]), not by value: a second, distinct
/// handle against an already-seen row key is rejected as "different entity
/// instances for the same row key".
///
/// When `options.track_changes` is `false`, every include passes through
/// unmodified, in the order given, with no deduplication; conflicting
/// operations against the same row are the caller's responsibility in that
/// mode. The e-tag requirement on `Replace`/`UpdateMerge` is still enforced
/// in both modes, since it's a property of the operation itself rather than
/// of the tracking the `track_changes` flag toggles.
pub(crate) fn track(
    includes: Vec<EntityOperation>,
    options: &StreamWriteOptions,
) -> crate::Result<Vec<EntityOperation>> {
    if !options.track_changes {
        for op in &includes {
            op.validate_etag()?;
        }
        return Ok(includes);
    }

    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), GroupState> = HashMap::new();

    for op in includes {
        let key = op.key();
        let handle = op.entity().handle.clone();

        match groups.get_mut(&key) {
            None => {
                order.push(key.clone());
                groups.insert(
                    key,
                    GroupState {
                        handle,
                        current: Some(op),
                    },
                );
            }
            Some(state) => {
                if state.handle != handle {
                    return Err(crate::Error::InvalidOperation(format!(
                        "different entity instances for the same row key '{}'",
                        op.entity().row_key
                    )));
                }

                state.current = merge(state.current.take(), op)?;
            }
        }
    }

    let mut result = Vec::with_capacity(order.len());
    for key in order {
        if let Some(op) = groups.remove(&key).and_then(|state| state.current) {
            op.validate_etag()?;
            result.push(op);
        }
    }

    Ok(result)
}

struct GroupState {
    handle: crate::operation::EntityHandle,
    current: Option<EntityOperation>,
}
