//! Driver error types

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::state::DriverState;
use pregen_adapter::{CompatibilityError, LaunchError};
use pregen_symbol::MapError;

/// Result alias for driver operations
pub type Result<T, E = DriverError> = std::result::Result<T, E>;

/// Driver failures
///
/// All are fatal to the run. Losing the target while generating is not an
/// error; [`crate::Driver::generate`] reports it by returning `false`.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Adapter failure
    #[error(transparent)]
    Compatibility(#[from] CompatibilityError),

    /// Mapping document could not be read
    #[error(transparent)]
    Mapping(#[from] MapError),

    /// Entry point did not return in time
    #[error("target did not finish starting within {secs}s")]
    StartupTimeout {
        /// Configured timeout
        secs: u64,
    },

    /// Target never reported ready
    #[error("target not ready after {attempts} polls")]
    NotReady {
        /// Polls performed
        attempts: u32,
    },

    /// Entry point failed
    #[error("failed to launch target: {0}")]
    Launch(#[from] LaunchError),

    /// Entry point panicked on its launch thread
    #[error("target launch thread panicked")]
    LaunchPanicked,

    /// Launch thread could not be spawned
    #[error("failed to spawn launch thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Entry point returned but the main thread is gone
    #[error("target exited during startup")]
    TargetExited,

    /// Shutdown was requested before the operation finished
    #[error("interrupted while {0}")]
    Interrupted(DriverState),

    /// Transition not in the state table
    #[error("illegal driver transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: DriverState,
        /// Requested state
        to: DriverState,
    },

    /// Stop command could not be delivered
    #[error("failed to send stop command: {0}")]
    Command(#[source] std::io::Error),

    /// Progress store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DriverError {
    /// Whether the error came from a shutdown request
    #[inline]
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_state() {
        let err = DriverError::IllegalTransition {
            from: DriverState::Stopped,
            to: DriverState::Generating,
        };
        assert_eq!(err.to_string(), "illegal driver transition Stopped -> Generating");
        assert!(DriverError::Interrupted(DriverState::WaitingReady).is_interrupted());
        assert_eq!(
            DriverError::NotReady { attempts: 3 }.to_string(),
            "target not ready after 3 polls"
        );
    }
}
