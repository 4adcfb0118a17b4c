#![deny(unsafe_code, unused_qualifications, trivial_casts)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]

//! An event-sourcing library on top of a wide-column NoSQL row store with
//! per-partition batch transactions (optimistic concurrency via e-tags).
//!
//! A [`Partition`] exposes an append-only, gap-free, version-numbered
//! *stream* of events, together with the atomic co-mutation of unrelated
//! *included* entities (read-model projections, idempotency markers,
//! secondary indexes) in the same transaction that appends the events.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use eventually_tables::backend::memory::InMemoryBackend;
//! use eventually_tables::{EventData, Partition};
//!
//! # #[tokio::main]
//! # async fn main() -> eventually_tables::Result<()> {
//! let partition = Partition::new(Arc::new(InMemoryBackend::new()), "order-42");
//! let stream = partition.provision().await?;
//!
//! let (stream, recorded) = stream
//!     .write(
//!         Default::default(),
//!         vec![EventData::new(Default::default()).with_id("created")],
//!     )
//!     .await?;
//!
//! assert_eq!(stream.version(), 1);
//! assert_eq!(recorded.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod chunker;
mod error;
mod event;
pub mod operation;
pub mod partition;
pub mod properties;
mod provision;
pub mod read;
mod shard;
mod stream;
mod tracker;
pub mod write;

pub use error::{ConcurrencyConflict, Error, Result};
pub use event::{EventData, RecordedEvent};
pub use partition::{Partition, PartitionKey};
pub use properties::{PropertyMap, PropertyValue};
pub use read::{EventRow, StreamSlice};
pub use shard::resolve as resolve_shard;
pub use stream::Stream;
pub use write::StreamWriteOptions;
