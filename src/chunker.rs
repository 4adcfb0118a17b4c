//! Splits an ordered sequence of [`RecordedEvent`]s into batches that
//! respect the backend's per-transaction action cap, leaving room for the
//! header operation the write operation accounts for separately.

use crate::event::RecordedEvent;

/// One less than the backend's hard limit of 100 actions per transaction,
/// so there is always room for the header operation in the first chunk
/// even though, in practice, the header op is accounted separately from
/// this budget.
pub const MAX_OPERATIONS_PER_CHUNK: usize = 99;

/// Splits `events` into non-empty, order-preserving chunks, each with a
/// total [`RecordedEvent::operations`] sum `<= MAX_OPERATIONS_PER_CHUNK`.
///
/// Fails fatally if any single event's own operation count exceeds the
/// cap -- no chunk boundary could ever accommodate it.
pub(crate) fn chunk(events: Vec<RecordedEvent>) -> crate::Result<Vec<Vec<RecordedEvent>>> {
    let mut chunks: Vec<Vec<RecordedEvent>> = Vec::new();
    let mut current: Vec<RecordedEvent> = Vec::new();
    let mut current_ops = 0usize;

    for event in events {
        let ops = event.operations();

        if ops > MAX_OPERATIONS_PER_CHUNK {
            return Err(crate::Error::InvalidOperation(format!(
                "event at version {} has {ops} operations, exceeding the per-chunk cap of {MAX_OPERATIONS_PER_CHUNK}",
                event.version
            )));
        }

        if !current.is_empty() && current_ops + ops > MAX_OPERATIONS_PER_CHUNK {
            chunks.push(std::mem::take(&mut current));
            current_ops = 0;
        }

        current_ops += ops;
        current.push(event);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}
