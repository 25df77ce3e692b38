//! fleetgate-fleet — the worker fleet as seen through the provisioning API.
//!
//! [`Provisioner`] is the seam to the compute-provisioning API: tag-filtered
//! describe plus start, stop and create. [`MemoryProvisioner`] implements
//! it in-process for standalone mode and tests.
//!
//! [`FleetDirectory`] layers the read-through queries the scaler and the
//! idle drain need on top of a provisioner. Nothing is cached; every call
//! goes back to the provider.
//!
//! # Instance lifecycle
//!
//! ```text
//! (none) ──create──▶ pending ──boot──▶ running ──stop──▶ stopped
//!                       ▲                                   │
//!                       └──────────────start────────────────┘
//! ```

pub mod directory;
pub mod error;
pub mod memory;
pub mod provisioner;

pub use directory::FleetDirectory;
pub use error::{ProvisionError, ProvisionResult};
pub use memory::{MemoryProvisioner, ProvisionOp};
pub use provisioner::Provisioner;
