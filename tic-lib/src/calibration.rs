//! Limit-switch homing and return-to-home.
//!
//! Calibration creeps the motor toward the limit switch a few steps at a time,
//! polling the switch between moves, and gives up after a wall-clock budget so
//! a broken switch cannot drive the axis forever. When the switch is found the
//! motor backs off by a fixed offset and that point becomes home.

use crate::constants::{
    DEFAULT_CALIBRATION_OFFSET, DEFAULT_CALIBRATION_SETTLE, DEFAULT_CALIBRATION_STEP, DEFAULT_CALIBRATION_TIME_LIMIT,
    DEFAULT_HOME_MAX_ATTEMPTS, DEFAULT_HOME_POLL_INTERVAL,
};
use crate::device::TicSession;
use crate::error::{ErrorKind, TicError};
use crate::transport::Transport;
use std::time::Duration;
use strum_macros::Display;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Probing stops once this much time has passed without the switch
    pub time_limit: Duration,
    /// Steps moved toward the switch per poll
    pub step_size: i32,
    /// Wait after each probing move
    pub settle: Duration,
    /// Steps backed off from the switch; this point becomes home
    pub offset: i32,
    /// Return to the previous home when probing times out
    pub recover_on_timeout: bool,
    pub home_max_attempts: u32,
    pub home_poll_interval: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_CALIBRATION_TIME_LIMIT,
            step_size: DEFAULT_CALIBRATION_STEP,
            settle: DEFAULT_CALIBRATION_SETTLE,
            offset: DEFAULT_CALIBRATION_OFFSET,
            recover_on_timeout: true,
            home_max_attempts: DEFAULT_HOME_MAX_ATTEMPTS,
            home_poll_interval: DEFAULT_HOME_POLL_INTERVAL,
        }
    }
}

impl CalibrationConfig {
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_step_size(mut self, step_size: i32) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_recover_on_timeout(mut self, recover: bool) -> Self {
        self.recover_on_timeout = recover;
        self
    }

    pub fn with_home_max_attempts(mut self, attempts: u32) -> Self {
        self.home_max_attempts = attempts;
        self
    }

    pub fn with_home_poll_interval(mut self, interval: Duration) -> Self {
        self.home_poll_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CalibrationState {
    Idle,
    Probing,
    Found,
    TimedOut,
}

/// What happened to the motor after probing timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// `recover_on_timeout` was off; the motor stays where probing stopped
    Skipped,
    /// Back at the previous home after this many move/read cycles
    Returned { attempts: u32 },
    /// The return to home did not complete
    Failed { kind: ErrorKind },
}

/// Result of a calibration run whose probing did not hit an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// The switch triggered; `home` is the new home position
    Found { home: i32, polls: u32 },
    /// The time limit passed first; home was left unchanged
    TimedOut {
        polls: u32,
        elapsed: Duration,
        recovery: Recovery,
    },
}

impl CalibrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CalibrationOutcome::Found { .. })
    }
}

/// Runs homing against a borrowed session.
pub struct Calibrator<'a, T> {
    session: &'a mut TicSession<T>,
    config: CalibrationConfig,
    state: CalibrationState,
}

impl<'a, T: Transport> Calibrator<'a, T> {
    pub fn new(session: &'a mut TicSession<T>, config: CalibrationConfig) -> Self {
        Self {
            session,
            config,
            state: CalibrationState::Idle,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Probe for the limit switch and, if found, make `switch + offset` home.
    ///
    /// On timeout home is not touched. With `recover_on_timeout` set the motor
    /// is then sent back to the existing home; how that went is recorded in
    /// the outcome rather than returned as an error.
    pub async fn calibrate(&mut self) -> Result<CalibrationOutcome, TicError> {
        let result = self.probe().await;
        if result.is_err() {
            self.state = CalibrationState::Idle;
        }
        let mut outcome = result?;

        if let CalibrationOutcome::TimedOut { recovery, .. } = &mut outcome {
            if self.config.recover_on_timeout {
                info!("Returning to previous home after failed calibration");
                *recovery = match self.go_home().await {
                    Ok(attempts) => Recovery::Returned { attempts },
                    Err(e) => {
                        warn!("Return to home after calibration failed: {}", e);
                        Recovery::Failed { kind: e.kind() }
                    }
                };
            }
        }
        debug!(state = %self.state, "Calibration finished");
        Ok(outcome)
    }

    async fn probe(&mut self) -> Result<CalibrationOutcome, TicError> {
        info!("Calibrating...");
        self.session.exit_safe_start().await?;
        self.state = CalibrationState::Probing;

        let started = Instant::now();
        let mut triggered = self.session.get_limit_switch_state().await?;
        let mut polls = 0u32;

        while !triggered && started.elapsed() <= self.config.time_limit {
            let position = self.session.get_current_position().await?;
            let target = position.saturating_sub(self.config.step_size);
            self.session.set_target_position(target).await?;
            sleep(self.config.settle).await;
            triggered = self.session.get_limit_switch_state().await?;
            polls += 1;
            debug!(polls, position, target, "Probing for limit switch");
        }

        if !triggered {
            let elapsed = started.elapsed();
            self.state = CalibrationState::TimedOut;
            warn!(
                polls,
                elapsed_ms = elapsed.as_millis() as u64,
                "Calibration failed, limit switch never triggered"
            );
            return Ok(CalibrationOutcome::TimedOut {
                polls,
                elapsed,
                recovery: Recovery::Skipped,
            });
        }

        let position = self.session.get_current_position().await?;
        let home = position.saturating_add(self.config.offset);
        self.session.set_target_position(home).await?;
        self.session.update_home(home);
        self.state = CalibrationState::Found;
        info!(switch_position = position, home, polls, "Calibrated!");
        Ok(CalibrationOutcome::Found { home, polls })
    }

    /// Move to home and re-command until the position reads back exactly home.
    ///
    /// Returns the number of move/read cycles used. Gives up with
    /// [`TicError::HomingFailed`] after `home_max_attempts`; any I/O error ends
    /// the loop immediately.
    pub async fn go_home(&mut self) -> Result<u32, TicError> {
        let home = self.session.home();
        let attempts = self.config.home_max_attempts.max(1);
        info!(home, "Going home...");

        let mut last_position = 0;
        for attempt in 1..=attempts {
            self.session.exit_safe_start().await?;
            self.session.set_target_position(home).await?;
            sleep(self.config.home_poll_interval).await;
            last_position = self.session.get_current_position().await?;
            if last_position == home {
                info!(attempt, "At home");
                return Ok(attempt);
            }
            debug!(attempt, position = last_position, home, "Not home yet");
        }

        warn!(attempts, last_position, home, "Giving up on returning home");
        Err(TicError::HomingFailed {
            home,
            attempts,
            last_position,
        })
    }
}
