//! Driver lifecycle states and the transition table

use crate::error::DriverError;
use std::fmt;

/// Lifecycle of one driven target
///
/// `Failed` is reachable from every state except `Stopped` and leads only to
/// `Stopping`, since a failed target still has to be shut down. `Stopped`
/// is the only terminal state: a failure reported after the target stopped
/// is an illegal transition and the state stays `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// Nothing launched yet
    NotStarted,
    /// Entry point running on the launch thread
    Starting,
    /// Polling the readiness capability
    WaitingReady,
    /// Inside a generation loop
    Generating,
    /// Stop requested or being delivered
    Stopping,
    /// Target exited or was left behind
    Stopped,
    /// A run failed; the target still has to be stopped
    Failed,
}

impl DriverState {
    /// Every state
    pub const ALL: [Self; 7] = [
        Self::NotStarted,
        Self::Starting,
        Self::WaitingReady,
        Self::Generating,
        Self::Stopping,
        Self::Stopped,
        Self::Failed,
    ];

    /// No transition leaves this state
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Check a transition against the table
///
/// # Errors
/// Returns [`DriverError::IllegalTransition`] if `to` is not reachable from
/// `from` in one step.
pub fn validate_transition(from: DriverState, to: DriverState) -> Result<(), DriverError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(DriverError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
///
/// Every state but `Stopped` and `Failed` itself may fail.
#[must_use]
pub fn allowed_transitions(from: DriverState) -> Vec<DriverState> {
    use DriverState::*;
    match from {
        NotStarted => vec![Starting, Stopping, Failed],
        Starting => vec![WaitingReady, Stopping, Failed],
        WaitingReady => vec![Generating, Stopping, Failed],
        Generating => vec![Generating, Stopping, Failed],
        Stopping => vec![Stopped, Failed],
        Failed => vec![Stopping],
        Stopped => vec![],
    }
}

fn allowed(from: DriverState, to: DriverState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            DriverState::NotStarted,
            DriverState::Starting,
            DriverState::WaitingReady,
            DriverState::Generating,
            DriverState::Generating,
            DriverState::Stopping,
            DriverState::Stopped,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_only_leads_to_stopping() {
        assert_eq!(allowed_transitions(DriverState::Failed), vec![DriverState::Stopping]);
        assert!(validate_transition(DriverState::Failed, DriverState::Generating).is_err());
    }

    #[test]
    fn every_live_state_can_fail() {
        for from in DriverState::ALL {
            let can_fail = validate_transition(from, DriverState::Failed).is_ok();
            let expected = !matches!(from, DriverState::Stopped | DriverState::Failed);
            assert_eq!(can_fail, expected, "{from} -> Failed");
        }
    }

    #[test]
    fn stopped_is_terminal() {
        assert!(DriverState::Stopped.is_terminal());
        assert!(!DriverState::Failed.is_terminal());
        for to in DriverState::ALL {
            assert!(validate_transition(DriverState::Stopped, to).is_err());
        }
    }

    #[test]
    fn cannot_generate_before_ready() {
        assert!(matches!(
            validate_transition(DriverState::Starting, DriverState::Generating),
            Err(DriverError::IllegalTransition {
                from: DriverState::Starting,
                to: DriverState::Generating
            })
        ));
    }
}
