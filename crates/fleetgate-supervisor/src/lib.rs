//! fleetgate-supervisor — ownership of the controller's background loops.
//!
//! Every long-running loop (queue poller, fleet scaler, result drain) runs
//! in a named [`Supervisor`] slot. A slot holds the task handle, the
//! loop's shutdown sender, and the factory that builds the loop, so a loop
//! can be restarted on its own.
//!
//! # Architecture
//!
//! ```text
//! Supervisor
//!   └── slot per loop name
//!       ├── factory(shutdown_rx) → loop future
//!       ├── panic → log, wait restart_delay, call factory again
//!       ├── clean return → slot finished
//!       └── shutdown_tx ← stop() / restart() / shutdown()
//! ```
//!
//! `shutdown()` signals every loop and waits up to `shutdown_grace` before
//! aborting the ones still running.

pub mod supervisor;

pub use supervisor::{ShutdownReport, Supervisor, TaskFactory};
