//! fleetgate-queue — message queue plumbing.
//!
//! The queue transport is reached only through the [`MessageQueue`] trait.
//! [`MemoryQueue`] implements it in-process with at-least-once semantics
//! (receipt handles, visibility timeout, redelivery), which is what the
//! daemon's standalone mode and the tests run against.
//!
//! [`QueuePoller`] is the long-running loop that drains the response queue
//! into the [`fleetgate_results::ResultStore`].
//!
//! # Poll cycle
//!
//! ```text
//! receive(batch_size, wait) ──err──▶ log, sleep error_backoff, retry
//!        │ ok
//!        ▼
//! for each message, concurrently:
//!     parse {fileName, prediction} ──err──▶ skip (left for redelivery)
//!     store[fileName] = prediction
//!     delete(receipt)               ──err──▶ log (result already stored)
//! ```

pub mod error;
pub mod memory;
pub mod poller;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use memory::{MemoryQueue, QueueOp};
pub use poller::{BatchReport, QueuePoller};
pub use queue::{MessageQueue, ReceivedMessage};
