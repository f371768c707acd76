//! pregen driver
//!
//! Starts a target server through the compatibility adapter, waits until it
//! is ready, generates every chunk of a rectangle in each requested
//! dimension and stops it.
//!
//! # Overview
//!
//! - **Driver**: lifecycle state machine over a [`TargetProcess`] and
//!   [`TargetOps`]
//! - **Region**: inclusive chunk rectangle walked row-major, with resume
//! - **Progress**: half-percent reports and a JSON resumability store
//! - **Session**: one complete run with resume and guaranteed stop
//! - **Config**: TOML driver configuration
//! - **Setup**: release detection, mapping and catalog loading, adapter
//!   preparation
//!
//! # Example
//!
//! ```rust
//! use pregen_driver::{ChunkPos, Region};
//!
//! let region = Region::new(9, 9, 0, 0);
//! let mut plan = region.resume(ChunkPos::new(3, 9));
//! assert_eq!(plan.next(), Some(ChunkPos::new(4, 0)));
//! assert_eq!(plan.remaining(), 59);
//! ```
//!
//! [`TargetProcess`]: pregen_adapter::TargetProcess
//! [`TargetOps`]: pregen_adapter::TargetOps

#![warn(missing_docs)]

pub mod check;
pub mod config;
pub mod driver;
pub mod error;
pub mod pacing;
pub mod progress;
pub mod region;
pub mod session;
pub mod setup;
pub mod signal;
pub mod state;
pub mod store;

// Re-exports
pub use check::{check_compatibility, CompatibilityReport, Selection};
pub use config::{ConfigError, DriverConfig, DriverSettings, Timeouts};
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use pacing::Pacer;
pub use progress::{LogObserver, ProgressObserver, ProgressReport, ProgressTracker};
pub use region::{ChunkPos, GenerationPlan, Region};
pub use session::{Session, SessionOutcome};
pub use setup::{run_session, TargetSetup};
pub use signal::ShutdownSignal;
pub use state::{allowed_transitions, validate_transition, DriverState};
pub use store::{JsonProgressStore, ProgressRecord, ProgressStore, StoreError};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a generation session
    pub use crate::{
        ChunkPos, Driver, DriverConfig, DriverError, DriverState, Region, Session, SessionOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
