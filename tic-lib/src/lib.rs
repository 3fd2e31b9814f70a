pub mod calibration;
pub mod constants;
pub mod control;
pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;


// Re-export the main types for easy access
pub use calibration::{CalibrationConfig, CalibrationOutcome, CalibrationState, Calibrator, Recovery};
pub use control::{MotorControl, Status};
pub use device::{SessionConfig, TicSession};
pub use error::{ErrorKind, TicError};
pub use protocol::{Command, DeviceAddress, Opcode, Variable};
pub use transport::{SerialTransport, StreamTransport, Transport};
