use serde::{Deserialize, Serialize};

use crate::axis::state_info::AxisStatus;
use crate::trajectory::summary::PlanSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Completed,
    /// Ended early by stop, estop, disconnect or a newer execution.
    Cancelled,
}

/// What a planned execution did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub summary: PlanSummary,
    /// Samples the backend applied before the run ended.
    pub applied: usize,
    pub outcome: ExecutionOutcome,
    /// Status read back after the run.
    pub status: AxisStatus,
}

impl ExecutionReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }
}
