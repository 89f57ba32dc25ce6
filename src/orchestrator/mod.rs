pub mod config;
pub mod report;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::axis::state_info::AxisStatus;
use crate::backend::{create_backend, BackendKind, MotionBackend};
use crate::config::AppConfig;
use crate::error::{AxisError, Result};
use crate::trajectory::MotionProfile;

pub use config::ExecutionConfig;
pub use report::{ExecutionOutcome, ExecutionReport};

/// Caller-side driver for one axis.
///
/// Holds the connected backend, turns operator actions into backend calls
/// and publishes an [`AxisStatus`] feed. Planned moves are executed through
/// the backend's sample stream so every position shows up in the feed as it
/// is applied.
pub struct Orchestrator {
    config: AppConfig,
    backend: RwLock<Option<Arc<dyn MotionBackend>>>,
    execution: Mutex<Option<(Uuid, CancellationToken)>>,
    status: watch::Sender<AxisStatus>,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> Self {
        let (status, _) = watch::channel(AxisStatus::disconnected());
        Self {
            config,
            backend: RwLock::new(None),
            execution: Mutex::new(None),
            status,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<AxisStatus> {
        self.status.subscribe()
    }

    /// Latest published status.
    pub fn status(&self) -> AxisStatus {
        self.status.borrow().clone()
    }

    pub async fn is_connected(&self) -> bool {
        let backend = self.backend.read().await.clone();
        match backend {
            Some(backend) => backend.is_open().await,
            None => false,
        }
    }

    /// Builds and opens the backend for `kind`, replacing any current one,
    /// then applies the configured soft limits.
    pub async fn connect(&self, kind: BackendKind) -> Result<AxisStatus> {
        if self.backend.read().await.is_some() {
            self.disconnect().await?;
        }

        let backend = create_backend(kind, &self.config.simulator, &self.config.device);
        if let Err(e) = backend.open().await {
            self.reject("connect", &e);
            return Err(e);
        }
        let axis = self.axis();
        if axis >= backend.axis_count() {
            if let Err(e) = backend.close().await {
                warn!("Failed to close {} backend after rejecting axis {}: {}", kind, axis, e);
            }
            let e = AxisError::UnknownAxis(axis);
            self.reject("connect", &e);
            return Err(e);
        }
        let limits = self.config.execution.soft_limits();
        backend.apply_soft_limit(axis, limits.min, limits.max)?;

        *self.backend.write().await = Some(backend);
        info!("Connected {} backend, driving axis {}", kind, axis);
        self.refresh_state().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.cancel_execution();
        let backend = self.backend.write().await.take();
        if let Some(backend) = backend {
            backend.close().await?;
            info!("Disconnected {} backend", backend.kind());
        }
        self.status.send_replace(AxisStatus::disconnected());
        Ok(())
    }

    /// Connects the configured backend when disconnected, disconnects
    /// otherwise. Returns whether a backend is connected afterwards.
    pub async fn toggle_connect(&self) -> Result<bool> {
        if self.is_connected().await {
            self.disconnect().await?;
            Ok(false)
        } else {
            self.connect(self.config.backend).await?;
            Ok(true)
        }
    }

    pub async fn servo_on(&self) -> Result<AxisStatus> {
        let backend = self.backend("servo on").await?;
        let result = backend.servo_on(self.axis()).await;
        self.finish("servo on", result).await
    }

    pub async fn servo_off(&self) -> Result<AxisStatus> {
        let backend = self.backend("servo off").await?;
        let result = backend.servo_off(self.axis()).await;
        self.finish("servo off", result).await
    }

    pub async fn home(&self) -> Result<AxisStatus> {
        let backend = self.backend("home").await?;
        let result = backend.home(self.axis()).await;
        self.finish("home", result).await
    }

    pub async fn jog_positive(&self) -> Result<AxisStatus> {
        self.jog(self.config.execution.jog_velocity.abs()).await
    }

    pub async fn jog_negative(&self) -> Result<AxisStatus> {
        self.jog(-self.config.execution.jog_velocity.abs()).await
    }

    pub async fn jog_stop(&self) -> Result<AxisStatus> {
        let backend = self.backend("jog stop").await?;
        let result = backend.jog_stop(self.axis()).await;
        self.finish("jog stop", result).await
    }

    /// Cancels any planned execution, then stops the axis.
    pub async fn stop(&self) -> Result<AxisStatus> {
        self.cancel_execution();
        let backend = self.backend("stop").await?;
        let result = backend.stop(self.axis()).await;
        self.finish("stop", result).await
    }

    pub async fn estop(&self) -> Result<AxisStatus> {
        self.cancel_execution();
        let backend = self.backend("estop").await?;
        let result = backend.estop(self.axis()).await;
        self.finish("estop", result).await
    }

    /// Applies the configured soft limits.
    pub async fn apply_soft_limit(&self) -> Result<AxisStatus> {
        let limits = self.config.execution.soft_limits();
        self.apply_soft_limits(limits.min, limits.max).await
    }

    pub async fn apply_soft_limits(&self, min: f64, max: f64) -> Result<AxisStatus> {
        let backend = self.backend("soft limit").await?;
        let result = backend.apply_soft_limit(self.axis(), min, max);
        self.finish("soft limit", result).await
    }

    /// Plans a move from the current position without executing it.
    pub async fn preview(&self, target: f64) -> Result<MotionProfile> {
        let backend = self.backend("plan").await?;
        let result = self.plan_from(backend.as_ref(), target).await;
        if let Err(e) = &result {
            self.reject("plan", e);
        }
        result
    }

    /// Plans a move to `target` and executes it sample by sample.
    ///
    /// A previous execution is cancelled first. Stop, estop, disconnect or
    /// a newer execution end this one early; that is reported as
    /// [`ExecutionOutcome::Cancelled`], not as an error. However the run
    /// ends, the axis state is read back once before returning.
    pub async fn plan_and_execute(&self, target: f64) -> Result<ExecutionReport> {
        let backend = self.backend("execute").await?;
        let profile = match self.plan_from(backend.as_ref(), target).await {
            Ok(profile) => profile,
            Err(e) => {
                self.reject("execute", &e);
                return Err(e);
            }
        };
        let summary = profile.summary();
        info!("Plan ready: {}", summary);

        let (id, token) = self.begin_execution();
        let total = profile.len();
        let run = self
            .drive(
                backend.as_ref(),
                profile.into_positions(),
                self.config.execution.sample_interval(),
                token,
            )
            .await;
        self.end_execution(id);

        let refreshed = self.refresh_state().await;
        let applied = match run {
            Ok(applied) => applied,
            Err(e) => {
                self.reject("execute", &e);
                return Err(e);
            }
        };
        let status = refreshed?;

        let outcome = if applied == total {
            ExecutionOutcome::Completed
        } else {
            ExecutionOutcome::Cancelled
        };
        info!(?outcome, applied, total, position = status.position, "execution finished");
        Ok(ExecutionReport {
            summary,
            applied,
            outcome,
            status,
        })
    }

    /// Reads position and axis state back from the backend and publishes
    /// them.
    pub async fn refresh_state(&self) -> Result<AxisStatus> {
        let backend = self.backend("refresh").await?;
        let state = backend.get_axis_state(self.axis()).await?;
        let status = AxisStatus::from_snapshot(state);
        self.status.send_replace(status.clone());
        Ok(status)
    }

    fn axis(&self) -> usize {
        self.config.execution.axis
    }

    async fn jog(&self, velocity: f64) -> Result<AxisStatus> {
        let backend = self.backend("jog").await?;
        let result = backend.jog(self.axis(), velocity).await;
        self.finish("jog", result).await
    }

    async fn plan_from(&self, backend: &dyn MotionBackend, target: f64) -> Result<MotionProfile> {
        let start = backend.get_position(self.axis()).await?;
        let dt = self.config.execution.sample_interval().as_secs_f64();
        MotionProfile::plan(start, target, self.config.execution.params, dt)
    }

    /// Feeds the samples through the backend and publishes each applied
    /// position. Returns how many samples were applied.
    async fn drive(
        &self,
        backend: &dyn MotionBackend,
        samples: Vec<f64>,
        dt: Duration,
        token: CancellationToken,
    ) -> Result<usize> {
        let mut stream = backend.stream_positions(self.axis(), samples, dt, token.clone())?;
        let mut applied = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    // The backend stops on the same token; collect what it
                    // had already applied.
                    while let Some(position) = stream.next().await {
                        applied += 1;
                        self.status.send_modify(|status| status.position = position);
                    }
                    debug!(applied, "execution cancelled");
                    break;
                }
                next = stream.next() => match next {
                    Some(position) => {
                        applied += 1;
                        self.status.send_modify(|status| status.position = position);
                    }
                    None => break,
                },
            }
        }
        Ok(applied)
    }

    async fn backend(&self, action: &str) -> Result<Arc<dyn MotionBackend>> {
        let backend = self.backend.read().await.clone();
        match backend {
            Some(backend) => Ok(backend),
            None => {
                let e = AxisError::NotConnected;
                self.reject(action, &e);
                Err(e)
            }
        }
    }

    async fn finish(&self, action: &str, result: Result<()>) -> Result<AxisStatus> {
        match result {
            Ok(()) => self.refresh_state().await,
            Err(e) => {
                self.reject(action, &e);
                Err(e)
            }
        }
    }

    /// Leaves the published status as it was, plus an explanation.
    fn reject(&self, action: &str, error: &AxisError) {
        warn!(action, code = error.code(), "command rejected: {}", error);
        self.status
            .send_modify(|status| status.message = Some(format!("{}: {}", action, error)));
    }

    fn begin_execution(&self) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let previous = self.lock_execution().replace((id, token.clone()));
        if let Some((previous, token)) = previous {
            debug!(execution = %previous, "superseding previous execution");
            token.cancel();
        }
        (id, token)
    }

    fn end_execution(&self, id: Uuid) {
        let mut current = self.lock_execution();
        if current.as_ref().is_some_and(|(current, _)| *current == id) {
            *current = None;
        }
    }

    fn cancel_execution(&self) {
        if let Some((id, token)) = self.lock_execution().take() {
            debug!(execution = %id, "cancelling execution");
            token.cancel();
        }
    }

    fn lock_execution(&self) -> std::sync::MutexGuard<'_, Option<(Uuid, CancellationToken)>> {
        self.execution.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::movement_parameters::MovementParams;
    use crate::backend::SimulatorConfig;

    fn fast() -> AppConfig {
        AppConfig {
            simulator: SimulatorConfig {
                tick_ms: 1,
                home_ms: 10,
                ..SimulatorConfig::default()
            },
            execution: ExecutionConfig {
                sample_period_ms: 1,
                params: MovementParams::new(1000.0, 10000.0, 10000.0),
                jog_velocity: 50.0,
                ..ExecutionConfig::default()
            },
            ..AppConfig::default()
        }
    }

    async fn connected(config: AppConfig) -> Arc<Orchestrator> {
        let orchestrator = Arc::new(Orchestrator::new(config));
        orchestrator.connect(BackendKind::Simulator).await.unwrap();
        orchestrator.servo_on().await.unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_commands_without_backend() {
        let orchestrator = Orchestrator::new(fast());
        assert!(!orchestrator.is_connected().await);
        assert_eq!(orchestrator.servo_on().await, Err(AxisError::NotConnected));
        assert!(matches!(
            orchestrator.plan_and_execute(10.0).await,
            Err(AxisError::NotConnected)
        ));

        let status = orchestrator.status();
        assert!(!status.connected);
        assert!(status.message.unwrap().contains("not connected"));
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_axis() {
        let orchestrator = Orchestrator::new(AppConfig {
            execution: ExecutionConfig {
                axis: 3,
                ..ExecutionConfig::default()
            },
            ..fast()
        });
        let err = orchestrator.connect(BackendKind::Simulator).await.unwrap_err();
        assert_eq!(err, AxisError::UnknownAxis(3));
        assert!(!orchestrator.is_connected().await);
        assert!(orchestrator.status().message.unwrap().contains("connect"));
    }

    #[tokio::test]
    async fn test_connect_applies_configured_limits() {
        let orchestrator = Orchestrator::new(fast());
        let status = orchestrator.connect(BackendKind::Simulator).await.unwrap();
        assert!(status.connected);
        assert_eq!(status.state.soft_min, -500.0);
        assert_eq!(status.state.soft_max, 500.0);

        assert!(!orchestrator.toggle_connect().await.unwrap());
        assert!(!orchestrator.status().connected);
        assert!(orchestrator.toggle_connect().await.unwrap());
        assert!(orchestrator.is_connected().await);
    }

    #[tokio::test]
    async fn test_execute_reaches_target() {
        let orchestrator = connected(fast()).await;
        let mut feed = orchestrator.subscribe();

        let report = orchestrator.plan_and_execute(10.0).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.applied, report.summary.samples);
        assert_eq!(report.summary.target, 10.0);
        assert_eq!(report.status.position, 10.0);
        assert!(!report.status.state.busy);
        assert_eq!(report.status.state.velocity, 0.0);

        assert!(feed.has_changed().unwrap());
        assert_eq!(feed.borrow_and_update().position, 10.0);
    }

    #[tokio::test]
    async fn test_stop_cancels_execution() {
        let orchestrator = connected(AppConfig {
            execution: ExecutionConfig {
                sample_period_ms: 1,
                params: MovementParams::new(20.0, 200.0, 200.0),
                ..ExecutionConfig::default()
            },
            ..fast()
        })
        .await;

        let run = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.plan_and_execute(100.0).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stopped = orchestrator.stop().await.unwrap();
        assert!(!stopped.state.busy);
        assert_eq!(stopped.state.velocity, 0.0);

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcome, ExecutionOutcome::Cancelled);
        assert!(report.applied < report.summary.samples);
        assert!(report.status.position > 0.0 && report.status.position < 100.0);
        assert!(!report.status.state.busy);
    }

    #[tokio::test]
    async fn test_rejection_keeps_state_and_explains() {
        let orchestrator = connected(fast()).await;
        orchestrator.servo_off().await.unwrap();

        let err = orchestrator.plan_and_execute(10.0).await.unwrap_err();
        assert_eq!(err, AxisError::servo_off(0));
        let status = orchestrator.status();
        assert_eq!(status.position, 0.0);
        assert!(status.message.unwrap().contains("Servo OFF"));

        orchestrator.servo_on().await.unwrap();
        assert!(matches!(
            orchestrator.plan_and_execute(600.0).await,
            Err(AxisError::LimitViolation { .. })
        ));
        assert!(orchestrator.status().message.is_some());
    }

    #[tokio::test]
    async fn test_home_jog_and_preview() {
        let orchestrator = connected(fast()).await;
        let homed = orchestrator.home().await.unwrap();
        assert!(homed.state.homed);

        orchestrator.jog_negative().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = orchestrator.jog_stop().await.unwrap();
        assert!(status.position < 0.0);
        assert!(!status.state.busy);

        let profile = orchestrator.preview(status.position + 5.0).await.unwrap();
        assert_eq!(profile.start(), status.position);
        assert_eq!(profile.positions().last().copied(), Some(status.position + 5.0));
    }

    #[tokio::test]
    async fn test_apply_soft_limits() {
        let orchestrator = connected(fast()).await;
        let status = orchestrator.apply_soft_limits(-20.0, 20.0).await.unwrap();
        assert_eq!((status.state.soft_min, status.state.soft_max), (-20.0, 20.0));

        let status = orchestrator.apply_soft_limit().await.unwrap();
        assert_eq!((status.state.soft_min, status.state.soft_max), (-500.0, 500.0));
    }
}
