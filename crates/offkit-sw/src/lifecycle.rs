//! Worker lifecycle state machine.
//!
//! `installing → installed (waiting) → activating → activated`, made
//! explicit so the skip-waiting race is observable: a skip-waiting
//! request arriving before install completes is latched and applied
//! the moment the worker reaches the waiting state.

use crate::SwError;

/// Service worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Initial state, before install begins.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activation handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed or worker replaced; the previous version stays
    /// in control.
    Redundant,
}

impl WorkerState {
    /// String form, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle tracker with explicit transitions.
#[derive(Debug, Default)]
pub struct WorkerLifecycle {
    state: WorkerState,
    skip_waiting_requested: bool,
}

impl WorkerLifecycle {
    /// Create a tracker in the initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Whether a skip-waiting request is latched but not yet applied.
    pub fn skip_waiting_pending(&self) -> bool {
        self.skip_waiting_requested
    }

    /// Enter the install handler.
    pub fn begin_install(&mut self) -> Result<(), SwError> {
        self.expect(WorkerState::Parsed, "install may only start once")?;
        self.state = WorkerState::Installing;
        Ok(())
    }

    /// Install handler finished successfully. Returns true when a
    /// latched skip-waiting request means activation should start
    /// immediately instead of waiting.
    pub fn install_succeeded(&mut self) -> Result<bool, SwError> {
        self.expect(WorkerState::Installing, "install was not running")?;
        self.state = WorkerState::Installed;
        Ok(std::mem::take(&mut self.skip_waiting_requested))
    }

    /// Install handler failed; the worker becomes redundant.
    pub fn install_failed(&mut self) {
        self.state = WorkerState::Redundant;
    }

    /// Enter the activation handler.
    pub fn begin_activate(&mut self) -> Result<(), SwError> {
        self.expect(WorkerState::Installed, "worker is not waiting")?;
        self.state = WorkerState::Activating;
        Ok(())
    }

    /// Activation handler finished.
    pub fn activation_complete(&mut self) -> Result<(), SwError> {
        self.expect(WorkerState::Activating, "activation was not running")?;
        self.state = WorkerState::Activated;
        Ok(())
    }

    /// Record a skip-waiting request. Returns true when the worker is
    /// currently waiting and the caller should activate now; earlier
    /// states latch the request instead.
    pub fn request_skip_waiting(&mut self) -> bool {
        match self.state {
            WorkerState::Installed => true,
            WorkerState::Parsed | WorkerState::Installing => {
                self.skip_waiting_requested = true;
                false
            }
            // Already activating, activated, or dead: nothing to skip.
            _ => false,
        }
    }

    fn expect(&self, state: WorkerState, reason: &str) -> Result<(), SwError> {
        if self.state != state {
            return Err(SwError::State {
                from: self.state,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}
