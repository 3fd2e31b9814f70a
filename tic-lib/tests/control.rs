//! Tests for the front-end verbs and their status messages

mod common;

use common::*;
use tic_lib::control::MotorControl;

fn control(sim: &SimulatedTic, home: i32) -> MotorControl<SimulatedTic> {
    let calibration = CalibrationConfig::default().with_recover_on_timeout(false);
    MotorControl::new(session(sim, home), calibration)
}

#[tokio::test]
async fn test_energize_sequence_order() {
    let sim = SimulatedTic::at(0);
    let mut control = control(&sim, 0);

    let status = control.energize_sequence().await;
    assert!(status.ok, "{}", status.message);
    assert_eq!(status.message, "Energized motor");
    assert_eq!(sim.state().opcodes, vec![0x83, 0x85]);
    assert!(sim.state().energized);
}

#[tokio::test]
async fn test_energize_sequence_failure() {
    let sim = SimulatedTic::at(0);
    sim.state().fail_writes = true;
    let mut control = control(&sim, 0);

    let status = control.energize_sequence().await;
    assert!(!status.ok);
    assert!(status.message.starts_with("Failed"), "{}", status.message);
}

#[tokio::test]
async fn test_jog_forward_and_reverse() {
    let sim = SimulatedTic::at(500);
    let mut control = control(&sim, 0);

    let status = control.jog(25).await;
    assert_eq!(status.value, Some(525));
    assert_eq!(status.message, "Setting target position to 525.");

    let status = control.jog(-100).await;
    // the simulator moves instantly, so the reverse jog starts from 525
    assert_eq!(status.value, Some(425));
    assert_eq!(sim.state().targets, vec![525, 425]);
    assert_eq!(sim.state().opcodes, vec![0xA1, 0x83, 0xE0, 0xA1, 0x83, 0xE0]);
}

#[tokio::test]
async fn test_set_max_speed_in_hz() {
    let sim = SimulatedTic::at(0);
    let mut control = control(&sim, 0);

    let status = control.set_max_speed(200).await;
    assert!(status.ok);
    assert_eq!(status.value, Some(2_000_000));
    assert_eq!(status.message, "Speed set to 200 Hz");

    // default limit is 5000 steps/s
    let status = control.set_max_speed(9000).await;
    assert_eq!(status.value, Some(50_000_000));
    assert_eq!(sim.state().max_speed, Some(50_000_000));
}

#[tokio::test(start_paused = true)]
async fn test_stop_and_deenergize_status() {
    let sim = SimulatedTic::at(0);
    let mut control = control(&sim, 0);
    control.energize_sequence().await;

    let status = control.stop_and_deenergize().await;
    assert!(status.ok);
    assert_eq!(status.message, "Deenergized motor");
    assert!(!sim.state().energized);
    assert_eq!(sim.state().opcodes, vec![0x83, 0x85, 0x92, 0x86]);
}

#[tokio::test(start_paused = true)]
async fn test_calibrate_then_display_relative_to_new_home() {
    let sim = SimulatedTic::at(70);
    sim.state().switch_position = Some(10);
    let mut control = control(&sim, 0);

    let status = control.calibrate().await;
    assert!(status.ok, "{}", status.message);
    assert_eq!(status.message, "Calibrated! Home is 30");
    assert_eq!(control.session().home(), 30);

    let position = control.displayed_position().await;
    assert_eq!(position.value, Some(0));
    assert_eq!(position.message, "0 Steps");

    control.jog(15).await;
    assert_eq!(control.displayed_position().await.value, Some(15));

    let status = control.go_home().await;
    assert!(status.ok);
    assert_eq!(status.message, "At home");
    assert_eq!(control.displayed_position().await.value, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_calibrate_timeout_is_reported() {
    let sim = SimulatedTic::at(70);
    let mut control = control(&sim, 3);

    let status = control.calibrate().await;
    assert!(!status.ok);
    assert_eq!(status.message, "Calibration failed, did not interface with limit switch");
    assert!(matches!(status.value, Some(CalibrationOutcome::TimedOut { .. })));
    assert_eq!(control.into_session().home(), 3);
}

#[tokio::test]
async fn test_position_failure_is_reported() {
    let sim = SimulatedTic::at(0);
    sim.state().truncate_to = Some(2);
    let mut control = control(&sim, 0);

    let status = control.displayed_position().await;
    assert!(!status.ok);
    assert_eq!(status.value, None);
    assert!(status.message.contains("Short read"), "{}", status.message);
}

#[tokio::test(start_paused = true)]
async fn test_calibrate_timeout_reports_failed_return_home() {
    let sim = SimulatedTic::at(400);
    sim.state().stuck = true;
    let calibration = CalibrationConfig::default()
        .with_time_limit(std::time::Duration::from_secs(1))
        .with_home_max_attempts(3);
    let mut control = MotorControl::new(session(&sim, 0), calibration);

    let status = control.calibrate().await;
    assert!(!status.ok);
    assert!(status.message.ends_with("could not return home"), "{}", status.message);
    assert!(matches!(
        status.value,
        Some(CalibrationOutcome::TimedOut {
            recovery: Recovery::Failed { .. },
            ..
        })
    ));
}
