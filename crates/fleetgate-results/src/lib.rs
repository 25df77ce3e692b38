//! fleetgate-results — in-memory correlation of requests with results.
//!
//! The queue poller writes `identifier → result` entries; submissions wait
//! for their identifier and take the entry out once it appears.
//!
//! # Architecture
//!
//! ```text
//! ResultStore (Clone, Arc-backed)
//!   ├── entries: RwLock<HashMap<identifier, result>>
//!   ├── insert() ← queue poller, wakes all waiters
//!   ├── wait_for() ← gateway, deadline + cancellation
//!   └── clear()  ← idle drain
//! ```
//!
//! Waiting is notification-driven: each insert wakes every pending waiter,
//! which re-checks its own identifier. Entries have a single consumer; the
//! first waiter to take an identifier removes it.

pub mod error;
pub mod store;

pub use error::WaitError;
pub use store::ResultStore;
