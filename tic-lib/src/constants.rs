// Protocol and timing constants for Tic stepper motor controllers

use std::time::Duration;

/// Marker byte that starts an addressed (Pololu protocol) frame
pub const ADDRESSED_FRAME_MARKER: u8 = 0xAA;

/// Highest device number accepted in addressed framing
pub const MAX_DEVICE_ADDRESS: u8 = 0x7F;

/// Length of a packed 32-bit command argument (overflow byte + 4 data bytes)
pub const PACKED_INT32_SIZE: usize = 5;

/// Mask for the 7 usable bits of every data byte
pub const DATA_BYTE_MASK: u8 = 0x7F;

/// Status word values that mean the limit switch is pressed.
///
/// These were read back from the reference hardware while the switch was held
/// down, they are not a documented status bit. Other wiring or firmware may
/// report different words.
pub const LIMIT_SWITCH_TRIGGERED_PATTERNS: [[u8; 2]; 2] = [[0x17, 0x7A], [0x1F, 0x7A]];

/// Device speed units per step/s
pub const SPEED_UNITS_PER_STEP_HZ: u32 = 10_000;

/// Default serial baud rate, must match the Tic's serial settings
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default max speed in steps per second
pub const DEFAULT_MAX_SPEED_HZ: u32 = 5000;

/// Default serial read/write timeout
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause between Stop and Deenergize so the rotor can come to rest
pub const STOP_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Wall-clock budget for one calibration run
pub const DEFAULT_CALIBRATION_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Steps moved toward the switch on each probing poll
pub const DEFAULT_CALIBRATION_STEP: i32 = 3;

/// Time given to each probing move before the switch is polled again
pub const DEFAULT_CALIBRATION_SETTLE: Duration = Duration::from_millis(150);

/// Distance backed off from the switch to define home
pub const DEFAULT_CALIBRATION_OFFSET: i32 = 20;

/// Upper bound on move/read-back cycles when returning home
pub const DEFAULT_HOME_MAX_ATTEMPTS: u32 = 200;

/// Delay between commanding home and reading the position back
pub const DEFAULT_HOME_POLL_INTERVAL: Duration = Duration::from_millis(150);
