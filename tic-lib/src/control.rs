//! Front-end facing verbs.
//!
//! A control panel (GUI, CLI, script) drives the motor only through
//! [`MotorControl`]. Every verb reports a [`Status`] with a short message that
//! can be shown as-is; errors are folded into that message instead of being
//! returned.

use crate::calibration::{CalibrationConfig, CalibrationOutcome, Calibrator, Recovery};
use crate::device::{SessionConfig, TicSession, steps_per_second_to_device};
use crate::error::TicError;
use crate::transport::{SerialTransport, Transport};
use tracing::{error, info};

/// Outcome of one front-end verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status<V = ()> {
    pub ok: bool,
    pub message: String,
    pub value: Option<V>,
}

impl<V> Status<V> {
    fn success(value: V, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            value: Some(value),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("{}", message);
        Self {
            ok: false,
            message,
            value: None,
        }
    }
}

pub struct MotorControl<T> {
    session: TicSession<T>,
    calibration: CalibrationConfig,
}

impl MotorControl<SerialTransport> {
    /// Open the serial port and energize the motor.
    pub async fn connect(config: &SessionConfig, calibration: CalibrationConfig) -> (Status, Option<Self>) {
        info!(port = %config.port_name, "Connecting...");
        let session = match TicSession::open(config) {
            Ok(session) => session,
            Err(e) => return (Status::failure(format!("Failed: {e}")), None),
        };
        let mut control = MotorControl::new(session, calibration);
        let status = control.energize_sequence().await;
        if !status.ok {
            return (status, None);
        }
        (Status::success((), "Connected"), Some(control))
    }
}

impl<T: Transport> MotorControl<T> {
    pub fn new(session: TicSession<T>, calibration: CalibrationConfig) -> Self {
        Self { session, calibration }
    }

    pub fn session(&self) -> &TicSession<T> {
        &self.session
    }

    pub fn into_session(self) -> TicSession<T> {
        self.session
    }

    /// Exit safe start, then energize.
    pub async fn energize_sequence(&mut self) -> Status {
        match self.energize_inner().await {
            Ok(()) => Status::success((), "Energized motor"),
            Err(e) => Status::failure(format!("Failed: {e}")),
        }
    }

    async fn energize_inner(&mut self) -> Result<(), TicError> {
        self.session.exit_safe_start().await?;
        self.session.energize().await
    }

    /// Move by `relative_steps` from the current position. Negative steps reverse.
    pub async fn jog(&mut self, relative_steps: i32) -> Status<i32> {
        match self.jog_inner(relative_steps).await {
            Ok(target) => Status::success(target, format!("Setting target position to {target}.")),
            Err(e) => Status::failure(format!("Jog failed: {e}")),
        }
    }

    async fn jog_inner(&mut self, relative_steps: i32) -> Result<i32, TicError> {
        let position = self.session.get_current_position().await?;
        let target = position.saturating_add(relative_steps);
        self.session.exit_safe_start().await?;
        self.session.set_target_position(target).await?;
        Ok(target)
    }

    /// Set the max speed in steps per second. The value is clamped to the session limit.
    pub async fn set_max_speed(&mut self, hz: u32) -> Status<u32> {
        match self.session.set_max_speed(steps_per_second_to_device(hz)).await {
            Ok(sent) => Status::success(sent, format!("Speed set to {hz} Hz")),
            Err(e) => Status::failure(format!("Setting speed failed: {e}")),
        }
    }

    pub async fn stop_and_deenergize(&mut self) -> Status {
        match self.session.stop_and_deenergize().await {
            Ok(()) => Status::success((), "Deenergized motor"),
            Err(e) => Status::failure(format!("Stop failed: {e}")),
        }
    }

    /// Run limit-switch calibration. A timeout is reported with `ok == false`
    /// and the outcome still attached.
    pub async fn calibrate(&mut self) -> Status<CalibrationOutcome> {
        let mut calibrator = Calibrator::new(&mut self.session, self.calibration.clone());
        match calibrator.calibrate().await {
            Ok(outcome @ CalibrationOutcome::Found { home, .. }) => {
                Status::success(outcome, format!("Calibrated! Home is {home}"))
            }
            Ok(outcome @ CalibrationOutcome::TimedOut { recovery, .. }) => {
                let message = match recovery {
                    Recovery::Failed { .. } => {
                        "Calibration failed, did not interface with limit switch; could not return home"
                    }
                    _ => "Calibration failed, did not interface with limit switch",
                };
                error!("{}", message);
                Status {
                    ok: false,
                    message: message.to_string(),
                    value: Some(outcome),
                }
            }
            Err(e) => Status::failure(format!("Calibration aborted: {e}")),
        }
    }

    pub async fn go_home(&mut self) -> Status<u32> {
        let mut calibrator = Calibrator::new(&mut self.session, self.calibration.clone());
        match calibrator.go_home().await {
            Ok(attempts) => Status::success(attempts, "At home"),
            Err(e) => Status::failure(format!("Going home failed: {e}")),
        }
    }

    pub async fn displayed_position(&mut self) -> Status<i32> {
        match self.session.displayed_position().await {
            Ok(position) => Status::success(position, format!("{position} Steps")),
            Err(e) => Status::failure(format!("Position unavailable: {e}")),
        }
    }
}
