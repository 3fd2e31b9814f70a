//! Wire codec for the Tic serial command set.
//!
//! Everything here is pure: functions turn commands into frames and raw
//! variable bytes into typed values, they never touch the transport.

use crate::constants::{
    ADDRESSED_FRAME_MARKER, DATA_BYTE_MASK, LIMIT_SWITCH_TRIGGERED_PATTERNS, MAX_DEVICE_ADDRESS, PACKED_INT32_SIZE,
};
use crate::error::TicError;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// Command opcodes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    #[strum(to_string = "Exit safe start")]
    ExitSafeStart = 0x83,
    #[strum(to_string = "Energize")]
    Energize = 0x85,
    #[strum(to_string = "Deenergize")]
    Deenergize = 0x86,
    #[strum(to_string = "Stop")]
    Stop = 0x92,
    #[strum(to_string = "Get variable")]
    GetVariable = 0xA1,
    #[strum(to_string = "Set target position")]
    SetTargetPosition = 0xE0,
    #[strum(to_string = "Set max speed")]
    SetMaxSpeed = 0xE6,
}

impl Opcode {
    /// Number of data bytes that follow this opcode on the wire
    pub fn data_len(&self) -> usize {
        match self {
            Opcode::ExitSafeStart | Opcode::Energize | Opcode::Deenergize | Opcode::Stop => 0,
            Opcode::GetVariable => 2,
            Opcode::SetTargetPosition | Opcode::SetMaxSpeed => PACKED_INT32_SIZE,
        }
    }
}

/// Variables read through [`Opcode::GetVariable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Variable {
    #[strum(to_string = "Current position")]
    CurrentPosition = 0x22,
    /// Status word carrying the limit switch state on the reference wiring
    #[strum(to_string = "Limit switch status")]
    LimitSwitchStatus = 0x47,
}

impl Variable {
    pub fn offset(&self) -> u8 {
        (*self).into()
    }

    pub fn length(&self) -> u8 {
        match self {
            Variable::CurrentPosition => 4,
            Variable::LimitSwitchStatus => 2,
        }
    }
}

/// Device number on a shared serial bus (0..=127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DeviceAddress {
    type Error = TicError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > MAX_DEVICE_ADDRESS {
            return Err(TicError::InvalidAddress(value));
        }
        Ok(DeviceAddress(value))
    }
}

/// A typed command. Every variant carries exactly the data its opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ExitSafeStart,
    Energize,
    Deenergize,
    Stop,
    SetTargetPosition(i32),
    /// Speed in device units (steps per 10000 s)
    SetMaxSpeed(u32),
    GetVariable { offset: u8, length: u8 },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::ExitSafeStart => Opcode::ExitSafeStart,
            Command::Energize => Opcode::Energize,
            Command::Deenergize => Opcode::Deenergize,
            Command::Stop => Opcode::Stop,
            Command::SetTargetPosition(_) => Opcode::SetTargetPosition,
            Command::SetMaxSpeed(_) => Opcode::SetMaxSpeed,
            Command::GetVariable { .. } => Opcode::GetVariable,
        }
    }

    pub fn read(variable: Variable) -> Self {
        Command::GetVariable {
            offset: variable.offset(),
            length: variable.length(),
        }
    }

    fn data(&self) -> Vec<u8> {
        match *self {
            Command::ExitSafeStart | Command::Energize | Command::Deenergize | Command::Stop => Vec::new(),
            Command::SetTargetPosition(target) => encode_int32(target).to_vec(),
            Command::SetMaxSpeed(speed) => encode_u32(speed).to_vec(),
            Command::GetVariable { offset, length } => vec![offset, length],
        }
    }

    /// Build the complete frame for this command
    pub fn encode(&self, address: Option<DeviceAddress>) -> Bytes {
        encode_command(self.opcode().into(), &self.data(), address)
    }
}

/// Frame `opcode` and `data` for the wire.
///
/// Without an address the compact protocol is used (`[opcode, data..]`). With
/// one, the addressed protocol (`[0xAA, address, opcode & 0x7F, data..]`).
/// The data length is not checked, see [`encode_checked`].
pub fn encode_command(opcode: u8, data: &[u8], address: Option<DeviceAddress>) -> Bytes {
    let mut frame = BytesMut::with_capacity(3 + data.len());
    match address {
        None => frame.put_u8(opcode),
        Some(address) => {
            frame.put_u8(ADDRESSED_FRAME_MARKER);
            frame.put_u8(address.get());
            frame.put_u8(opcode & DATA_BYTE_MASK);
        }
    }
    frame.extend_from_slice(data);
    frame.freeze()
}

/// Like [`encode_command`] but rejects unknown opcodes and wrong data lengths.
pub fn encode_checked(opcode: u8, data: &[u8], address: Option<DeviceAddress>) -> Result<Bytes, TicError> {
    let known = Opcode::try_from(opcode).map_err(|_| TicError::UnknownOpcode(opcode))?;
    if data.len() != known.data_len() {
        return Err(TicError::ArityMismatch {
            opcode,
            expected: known.data_len(),
            actual: data.len(),
        });
    }
    Ok(encode_command(opcode, data, address))
}

/// Pack a 32-bit argument into the 7-bits-per-byte form.
///
/// Byte 0 collects the top bit of each little-endian byte (bit 7, 15, 23 and
/// 31 land in bits 0..=3), bytes 1..=4 carry the low 7 bits of each byte.
pub fn encode_int32(value: i32) -> [u8; PACKED_INT32_SIZE] {
    encode_u32(value as u32)
}

fn encode_u32(value: u32) -> [u8; PACKED_INT32_SIZE] {
    let overflow = ((value >> 7) & 1) | ((value >> 14) & 2) | ((value >> 21) & 4) | ((value >> 28) & 8);
    let [b0, b1, b2, b3] = value.to_le_bytes();
    [
        overflow as u8,
        b0 & DATA_BYTE_MASK,
        b1 & DATA_BYTE_MASK,
        b2 & DATA_BYTE_MASK,
        b3 & DATA_BYTE_MASK,
    ]
}

/// Inverse of [`encode_int32`]: fold the overflow bits back into each byte.
pub fn unpack_int32(packed: &[u8; PACKED_INT32_SIZE]) -> i32 {
    let overflow = packed[0];
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = (packed[i + 1] & DATA_BYTE_MASK) | (((overflow >> i) & 1) << 7);
    }
    decode_int32(&bytes)
}

/// Decode a little-endian 4-byte variable as a signed 32-bit value.
pub fn decode_int32(bytes: &[u8; 4]) -> i32 {
    let raw = u32::from_le_bytes(*bytes);
    if raw >= 1 << 31 {
        (i64::from(raw) - (1i64 << 32)) as i32
    } else {
        raw as i32
    }
}

/// Whether the status word is one of the known "switch pressed" readings.
pub fn decode_limit_switch(bytes: &[u8; 2]) -> bool {
    LIMIT_SWITCH_TRIGGERED_PATTERNS.contains(bytes)
}
