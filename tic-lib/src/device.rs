use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_IO_TIMEOUT, DEFAULT_MAX_SPEED_HZ, SPEED_UNITS_PER_STEP_HZ, STOP_SETTLE_DELAY,
};
use crate::error::TicError;
use crate::protocol::{Command, DeviceAddress, Variable, decode_int32, decode_limit_switch, encode_checked};
use crate::transport::{SerialTransport, Transport, open_serial};
use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

/// Convert a speed in steps per second to the controller's units (saturating).
pub fn steps_per_second_to_device(hz: u32) -> u32 {
    hz.saturating_mul(SPEED_UNITS_PER_STEP_HZ)
}

/// Connection settings for a [`TicSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// `None` selects the compact protocol
    pub address: Option<DeviceAddress>,
    /// Raw position that is displayed as zero until a calibration replaces it
    pub home: i32,
    /// Upper bound for `set_max_speed`, in device units
    pub max_speed: u32,
    pub io_timeout: Duration,
    pub stop_settle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::from("/dev/ttyACM0"),
            baud_rate: DEFAULT_BAUD_RATE,
            address: None,
            home: 0,
            max_speed: steps_per_second_to_device(DEFAULT_MAX_SPEED_HZ),
            io_timeout: DEFAULT_IO_TIMEOUT,
            stop_settle: STOP_SETTLE_DELAY,
        }
    }
}

impl SessionConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_address(mut self, address: DeviceAddress) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_home(mut self, home: i32) -> Self {
        self.home = home;
        self
    }

    pub fn with_max_speed_hz(mut self, hz: u32) -> Self {
        self.max_speed = steps_per_second_to_device(hz);
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn with_stop_settle(mut self, stop_settle: Duration) -> Self {
        self.stop_settle = stop_settle;
        self
    }
}

/// An exclusive connection to one Tic controller.
///
/// Each operation writes one frame and, for reads, waits for the reply before
/// returning. The serial port is released when the session is dropped.
pub struct TicSession<T> {
    transport: T,
    address: Option<DeviceAddress>,
    home: i32,
    max_speed: u32,
    io_timeout: Duration,
    stop_settle: Duration,
}

impl TicSession<SerialTransport> {
    /// Open the serial port named in `config`
    pub fn open(config: &SessionConfig) -> Result<Self, TicError> {
        let transport = open_serial(&config.port_name, config.baud_rate, config.io_timeout)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> TicSession<T> {
    pub fn new(transport: T, config: &SessionConfig) -> Self {
        info!(
            address = ?config.address.map(|a| a.get()),
            home = config.home,
            "Tic session created"
        );
        Self {
            transport,
            address: config.address,
            home: config.home,
            max_speed: config.max_speed,
            io_timeout: config.io_timeout,
            stop_settle: config.stop_settle,
        }
    }

    pub fn home(&self) -> i32 {
        self.home
    }

    /// Give the transport back, ending the session
    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TicError> {
        debug!(bytes = hex::encode(frame), "Serial Write");
        timeout(self.io_timeout, self.transport.write_all(frame)).await??;
        Ok(())
    }

    async fn send(&mut self, command: Command) -> Result<(), TicError> {
        let frame = command.encode(self.address);
        self.write_frame(&frame).await
    }

    /// Send a raw opcode; the data length is checked before anything is written
    pub async fn send_command(&mut self, opcode: u8, data: &[u8]) -> Result<(), TicError> {
        let frame = encode_checked(opcode, data, self.address)?;
        self.write_frame(&frame).await
    }

    pub async fn exit_safe_start(&mut self) -> Result<(), TicError> {
        self.send(Command::ExitSafeStart).await
    }

    /// Callers normally exit safe start first.
    pub async fn energize(&mut self) -> Result<(), TicError> {
        info!("Energizing motor");
        self.send(Command::Energize).await
    }

    pub async fn deenergize(&mut self) -> Result<(), TicError> {
        info!("Deenergizing motor");
        self.send(Command::Deenergize).await
    }

    pub async fn stop(&mut self) -> Result<(), TicError> {
        self.send(Command::Stop).await
    }

    /// Start a move. Returns once the command is written, not when the motor arrives.
    pub async fn set_target_position(&mut self, target: i32) -> Result<(), TicError> {
        debug!(target, "Set target position");
        self.send(Command::SetTargetPosition(target)).await
    }

    /// Set the max speed in device units, clamped to the configured limit.
    /// Returns the value actually sent.
    pub async fn set_max_speed(&mut self, speed: u32) -> Result<u32, TicError> {
        let clamped = speed.min(self.max_speed);
        if clamped != speed {
            warn!(requested = speed, limit = self.max_speed, "Max speed clamped");
        }
        self.send(Command::SetMaxSpeed(clamped)).await?;
        Ok(clamped)
    }

    /// Stop, wait for the motor to settle, then cut power.
    pub async fn stop_and_deenergize(&mut self) -> Result<(), TicError> {
        info!("Stopping motor...");
        self.stop().await?;
        sleep(self.stop_settle).await;
        self.deenergize().await
    }

    /// Read `length` bytes of variables starting at `offset`.
    ///
    /// Bytes left over from an earlier reply that arrived too late are
    /// discarded before the request goes out.
    pub async fn get_variables(&mut self, offset: u8, length: u8) -> Result<Bytes, TicError> {
        let stale = self.transport.discard_input().await?;
        if stale > 0 {
            warn!(stale, "Discarded stale input before variable read");
        }
        self.send(Command::GetVariable { offset, length }).await?;

        let expected = usize::from(length);
        let mut buf = vec![0u8; expected];
        let mut filled = 0;
        let deadline = Instant::now() + self.io_timeout;
        while filled < expected {
            match timeout_at(deadline, self.transport.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        if filled < expected {
            warn!(offset, expected, actual = filled, "Short variable read");
            return Err(TicError::ShortRead {
                expected,
                actual: filled,
            });
        }
        debug!(bytes = hex::encode(&buf), "Serial Read");
        Ok(Bytes::from(buf))
    }

    async fn read_variable<const N: usize>(&mut self, variable: Variable) -> Result<[u8; N], TicError> {
        let bytes = self.get_variables(variable.offset(), variable.length()).await?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes[..N]);
        Ok(out)
    }

    pub async fn get_current_position(&mut self) -> Result<i32, TicError> {
        let raw = self.read_variable::<4>(Variable::CurrentPosition).await?;
        Ok(decode_int32(&raw))
    }

    pub async fn get_limit_switch_state(&mut self) -> Result<bool, TicError> {
        let raw = self.read_variable::<2>(Variable::LimitSwitchStatus).await?;
        let triggered = decode_limit_switch(&raw);
        debug!(status = hex::encode(raw), triggered, "Limit switch");
        Ok(triggered)
    }

    /// Replace the home reference. No I/O.
    pub fn update_home(&mut self, new_home: i32) {
        info!(old = self.home, new = new_home, "Home updated");
        self.home = new_home;
    }

    /// Current position relative to home
    pub async fn displayed_position(&mut self) -> Result<i32, TicError> {
        let position = self.get_current_position().await?;
        Ok(position.wrapping_sub(self.home))
    }
}
