use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::{signal, time::sleep};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tic_lib::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CALIBRATION_OFFSET, DEFAULT_CALIBRATION_STEP, DEFAULT_HOME_MAX_ATTEMPTS,
    DEFAULT_MAX_SPEED_HZ,
};
use tic_lib::{
    CalibrationConfig, CalibrationOutcome, DeviceAddress, MotorControl, SerialTransport, SessionConfig, Status,
    TicSession,
};

/// Drive a Tic stepper motor controller over its serial port.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port the Tic is attached to (e.g. /dev/ttyACM0 or COM4).
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,
    /// Baud rate; must match the Tic's serial settings.
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Device number for the addressed protocol. Omit to use the compact protocol.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=127))]
    device_number: Option<u8>,
    /// Raw position treated as home (printed by a successful `calibrate`).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    home: i32,
    /// Speed limit in steps per second.
    #[arg(long, default_value_t = DEFAULT_MAX_SPEED_HZ)]
    max_speed: u32,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Exit safe start and energize the motor.
    Energize,
    /// Move by a number of steps; negative values reverse.
    Jog {
        #[arg(allow_negative_numbers = true)]
        steps: i32,
    },
    /// Set the max speed in steps per second.
    Speed { hz: u32 },
    /// Stop the motor and cut power.
    Stop,
    /// Find the limit switch and define home next to it.
    Calibrate {
        /// Give up after this many seconds without the switch.
        #[arg(long, default_value_t = 30)]
        time_limit_s: u64,
        /// Steps to back off from the switch.
        #[arg(long, default_value_t = DEFAULT_CALIBRATION_OFFSET, allow_negative_numbers = true)]
        offset: i32,
        /// Steps moved toward the switch per poll.
        #[arg(long, default_value_t = DEFAULT_CALIBRATION_STEP)]
        step: i32,
        /// Wait between probing moves, in milliseconds.
        #[arg(long, default_value_t = 150)]
        settle_ms: u64,
        /// Stay where probing stopped instead of returning to the old home.
        #[arg(long)]
        no_recover: bool,
    },
    /// Return to home and wait until the position reads back exactly.
    Home {
        #[arg(long, default_value_t = DEFAULT_HOME_MAX_ATTEMPTS)]
        max_attempts: u32,
    },
    /// Print the position relative to home.
    Position,
    /// Keep printing the position relative to home.
    Watch {
        /// Polling interval in milliseconds.
        #[arg(short, long, default_value_t = 200)]
        interval_ms: u64,
        /// Stop after this many readings; runs until Ctrl+C otherwise.
        #[arg(short, long)]
        count: Option<u32>,
    },
}

/// Console logs go to stderr so command output on stdout stays clean. With
/// `--log-file` the same events are appended to that file.
fn init_tracing(verbosity: &Verbosity<InfoLevel>, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let file_writer = log_file
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))
                .map(tracing_appender::non_blocking)
        })
        .transpose()?;
    let (writer, guard) = file_writer.unzip();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false).without_time())
        .with(writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false)))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.verbose, cli.log_file.as_deref())?;

    tokio::select! {
        res = run(cli) => {
            if let Err(e) = res {
                error!("{:#}", e);
                process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down.");
        }
    }
    Ok(())
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig::new(cli.port.clone())
        .with_baud_rate(cli.baud)
        .with_home(cli.home)
        .with_max_speed_hz(cli.max_speed);
    if let Some(number) = cli.device_number {
        config = config.with_address(DeviceAddress::try_from(number)?);
    }
    Ok(config)
}

fn report<V>(status: &Status<V>) -> Result<()> {
    if !status.ok {
        bail!("{}", status.message);
    }
    println!("{}", status.message);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = session_config(&cli)?;
    let mut calibration = CalibrationConfig::default();
    match cli.command {
        Cmd::Calibrate {
            time_limit_s,
            offset,
            step,
            settle_ms,
            no_recover,
        } => {
            calibration = calibration
                .with_time_limit(Duration::from_secs(time_limit_s))
                .with_offset(offset)
                .with_step_size(step)
                .with_settle(Duration::from_millis(settle_ms))
                .with_recover_on_timeout(!no_recover);
        }
        Cmd::Home { max_attempts } => {
            calibration = calibration.with_home_max_attempts(max_attempts);
        }
        _ => {}
    }

    let open = |calibration: CalibrationConfig| -> Result<MotorControl<SerialTransport>> {
        let session = TicSession::open(&config).with_context(|| format!("Failed to open {}", config.port_name))?;
        Ok(MotorControl::new(session, calibration))
    };

    match cli.command {
        Cmd::Energize => {
            let (status, _control) = MotorControl::connect(&config, calibration).await;
            report(&status)
        }
        Cmd::Jog { steps } => report(&open(calibration)?.jog(steps).await),
        Cmd::Speed { hz } => report(&open(calibration)?.set_max_speed(hz).await),
        Cmd::Stop => report(&open(calibration)?.stop_and_deenergize().await),
        Cmd::Calibrate { .. } => {
            let status = open(calibration)?.calibrate().await;
            report(&status)?;
            if let Some(CalibrationOutcome::Found { home, .. }) = status.value {
                println!("Pass --home {home} to later commands to keep this calibration.");
            }
            Ok(())
        }
        Cmd::Home { .. } => report(&open(calibration)?.go_home().await),
        Cmd::Position => report(&open(calibration)?.displayed_position().await),
        Cmd::Watch { interval_ms, count } => {
            let mut control = open(calibration)?;
            let mut readings = 0u32;
            loop {
                report(&control.displayed_position().await)?;
                readings += 1;
                if count.is_some_and(|limit| readings >= limit) {
                    return Ok(());
                }
                sleep(Duration::from_millis(interval_ms)).await;
            }
        }
    }
}
