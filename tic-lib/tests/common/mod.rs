//! Common test utilities and shared imports

// Not every test file uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[allow(unused_imports)]
pub use tic_lib::calibration::{CalibrationConfig, CalibrationOutcome, CalibrationState, Calibrator, Recovery};
#[allow(unused_imports)]
pub use tic_lib::device::{SessionConfig, TicSession};
#[allow(unused_imports)]
pub use tic_lib::error::{ErrorKind, TicError};
#[allow(unused_imports)]
pub use tic_lib::protocol::{Command, DeviceAddress, Opcode};
use tic_lib::constants::{ADDRESSED_FRAME_MARKER, LIMIT_SWITCH_TRIGGERED_PATTERNS};
use tic_lib::protocol::unpack_int32;
use tic_lib::transport::Transport;

/// Status word the simulator reports while the switch is open
pub const SWITCH_OPEN: [u8; 2] = [0x00, 0x7A];

/// State of the simulated controller, shared with the test body.
#[derive(Debug, Default)]
pub struct SimState {
    pub position: i32,
    pub target: i32,
    /// Steps moved toward the target per variable read; `None` moves instantly
    pub step_per_read: Option<i32>,
    /// The switch closes at or below this position
    pub switch_position: Option<i32>,
    /// The switch reads closed from this (1-based) switch read onwards
    pub trigger_on_read: Option<u32>,
    /// Ignore target commands
    pub stuck: bool,
    /// Answer variable reads with at most this many bytes
    pub truncate_to: Option<usize>,
    /// Fail every write with a broken pipe
    pub fail_writes: bool,
    pub energized: bool,
    pub max_speed: Option<i32>,
    pub switch_reads: u32,
    /// Opcodes received, addressed frames normalised to the compact opcode
    pub opcodes: Vec<u8>,
    pub targets: Vec<i32>,
    pub frames: Vec<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl SimState {
    fn advance(&mut self) {
        let delta = self.target - self.position;
        let step = match self.step_per_read {
            Some(step) => delta.clamp(-step, step),
            None => delta,
        };
        self.position += step;
    }

    fn switch_closed(&self) -> bool {
        let by_position = self.switch_position.is_some_and(|at| self.position <= at);
        let by_count = self.trigger_on_read.is_some_and(|n| self.switch_reads >= n);
        by_position || by_count
    }

    fn handle(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
        let (opcode, data) = match frame {
            [ADDRESSED_FRAME_MARKER, _address, opcode, data @ ..] => (opcode | 0x80, data),
            [opcode, data @ ..] => (*opcode, data),
            [] => return,
        };
        self.opcodes.push(opcode);

        match opcode {
            0x85 => self.energized = true,
            0x86 => self.energized = false,
            0x92 => self.target = self.position,
            0xE0 => {
                let packed: [u8; 5] = data.try_into().expect("5 packed bytes");
                let target = unpack_int32(&packed);
                self.targets.push(target);
                if !self.stuck {
                    self.target = target;
                }
            }
            0xE6 => {
                let packed: [u8; 5] = data.try_into().expect("5 packed bytes");
                self.max_speed = Some(unpack_int32(&packed));
            }
            0xA1 => {
                self.advance();
                let (offset, length) = (data[0], usize::from(data[1]));
                let mut reply = match offset {
                    0x22 => self.position.to_le_bytes().to_vec(),
                    0x47 => {
                        self.switch_reads += 1;
                        if self.switch_closed() {
                            LIMIT_SWITCH_TRIGGERED_PATTERNS[0].to_vec()
                        } else {
                            SWITCH_OPEN.to_vec()
                        }
                    }
                    other => panic!("simulator has no variable at {other:#04x}"),
                };
                reply.truncate(length);
                if let Some(limit) = self.truncate_to {
                    reply.truncate(limit);
                }
                self.pending.extend(reply);
            }
            _ => {}
        }
    }
}

/// A fake Tic that decodes frames and answers variable reads.
#[derive(Clone, Default)]
pub struct SimulatedTic {
    pub state: Arc<Mutex<SimState>>,
}

impl SimulatedTic {
    pub fn at(position: i32) -> Self {
        let sim = Self::default();
        {
            let mut state = sim.state();
            state.position = position;
            state.target = position;
        }
        sim
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("simulator state poisoned")
    }
}

impl Transport for SimulatedTic {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state.handle(bytes);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        let mut n = 0;
        while n < buf.len() {
            match state.pending.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    async fn discard_input(&mut self) -> io::Result<usize> {
        let mut state = self.state();
        let discarded = state.pending.len();
        state.pending.clear();
        Ok(discarded)
    }
}

/// Session over `sim` with the compact protocol and fast timeouts.
pub fn session(sim: &SimulatedTic, home: i32) -> TicSession<SimulatedTic> {
    let config = SessionConfig::new("sim")
        .with_home(home)
        .with_io_timeout(Duration::from_millis(20));
    TicSession::new(sim.clone(), &config)
}

/// Install a test subscriber so `RUST_LOG` works when debugging a failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
