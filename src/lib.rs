pub mod axis;
pub mod backend;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod trajectory;

pub use axis::{AxisState, AxisStatus, MovementParams, SoftLimits};
pub use backend::{create_backend, BackendKind, MotionBackend, PositionStream};
pub use config::AppConfig;
pub use error::{AxisError, Result};
pub use orchestrator::{ExecutionOutcome, ExecutionReport, Orchestrator};
pub use trajectory::{MotionProfile, PlanSummary};
