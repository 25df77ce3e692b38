//! fleetgate-autoscale — queue-depth driven fleet scaling.
//!
//! [`FleetScaler`] reads the request queue's approximate depth and the
//! fleet's active count every tick and decides whether to grow the fleet,
//! shrink it, or leave it alone. [`ResultDrain`] clears the result store
//! once the fleet has been observed fully idle twice in a row.
//!
//! # Scaling algorithm
//!
//! ```text
//! pending = approximate depth of the request queue
//! active  = pending + running instances with the fleet tag
//!
//! if over-provisioned (queue_empty: pending == 0 && active > 0,
//!                      pending_below_active: pending < active):
//!     first tick          → arm idle timer, AwaitingIdle
//!     armed < idle_delay  → AwaitingIdle
//!     armed >= idle_delay → ScaleDown(min(batch, excess)), re-arm
//!
//! else if pending > 0 and active < ceiling:
//!     ScaleUp(min(pending, ceiling - active))      // capacity_aware
//!     ScaleUp(min(batch, ceiling - active))        // fixed_batch
//!
//! ScaleUp(want):   start min(want, batch, stopped) stopped instances,
//!                  or create min(want, max_creates_per_tick) if none are stopped
//! ScaleDown(n):    stop the first n running instances
//! ```
//!
//! Every provisioning call is bounded by `ceiling - active`, so the active
//! count never exceeds the ceiling.

pub mod drain;
pub mod error;
pub mod scaler;

pub use drain::{DrainOutcome, ResultDrain};
pub use error::{ScaleError, ScaleResult};
pub use scaler::{FleetScaler, ScaleDecision, TickReport};
