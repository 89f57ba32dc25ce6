use serde::{Deserialize, Serialize};

use super::state::{AxisPhase, AxisState};

/// What an observer (a display, a log sink) gets to see about the axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisStatus {
    pub connected: bool,
    /// Latest position, updated sample by sample during execution.
    pub position: f64,
    /// Last snapshot read back from the backend.
    pub state: AxisState,
    pub message: Option<String>,
}

impl AxisStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            position: 0.0,
            state: AxisState::default(),
            message: None,
        }
    }

    pub fn from_snapshot(state: AxisState) -> Self {
        Self {
            connected: true,
            position: state.position,
            state,
            message: None,
        }
    }

    pub fn phase(&self) -> AxisPhase {
        self.state.phase()
    }

    pub fn is_moving(&self) -> bool {
        self.state.busy
    }

    pub fn is_faulted(&self) -> bool {
        self.state.alarm
    }

    pub fn is_ready(&self) -> bool {
        self.connected && self.state.is_ready()
    }
}

impl Default for AxisStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_needs_connection() {
        let mut state = AxisState::default();
        state.servo_on = true;
        let status = AxisStatus::from_snapshot(state);
        assert!(status.is_ready());
        assert_eq!(status.phase(), AxisPhase::Idle);

        let offline = AxisStatus {
            connected: false,
            ..status
        };
        assert!(!offline.is_ready());
        assert!(!AxisStatus::default().is_moving());
        assert!(!AxisStatus::default().is_faulted());
    }
}
