pub mod limits;
pub mod movement_parameters;
pub mod state;
pub mod state_info;

pub use limits::{LimitSide, SoftLimits};
pub use movement_parameters::MovementParams;
pub use state::{AxisPhase, AxisState, MotionKind};
pub use state_info::AxisStatus;
