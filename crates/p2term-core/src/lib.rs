//! Lock-free serial ingest core for a Parallax Propeller 2 debug terminal.
//!
//! Bytes arrive from a serial driver callback, are buffered in a
//! single-producer/single-consumer [`byte_ring::ByteRing`], framed and
//! classified by a dedicated [`extractor::Extractor`] thread into
//! size-tiered, refcounted [`slot::SlotPool`] entries, and fanned out by a
//! [`router::Router`] to whatever sinks the embedder registered. [`Core`]
//! wires the four together and owns the golden-sync resynchronization
//! choreography.

mod backoff;
mod byte_ring;
mod config;
mod control;
mod error;
mod extractor;
mod invariants;
mod mailbox;
mod message;
mod metrics;
mod reader;
mod router;
mod slot;

pub use config::CoreConfig;
pub use control::Core;
pub use error::{CoreError, Tier};
pub use message::{MessageType, NameId, WindowKind};
pub use metrics::StatsSnapshot;
pub use router::{EventListener, NullEventListener, SinkFn};
pub use slot::{ReadHandle, SlotId};
