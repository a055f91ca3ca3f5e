//! Modbus RTU framing.
//!
//! Builds request frames (`[slave][PDU][CRC lo][CRC hi]`) and validates
//! response frames. CRC is checked first and fails closed: a mismatched
//! frame is discarded entirely, never partially trusted.

use crate::constants::{
    EXCEPTION_BIT, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_REGISTER, MIN_RTU_FRAME_LEN,
};
use crate::error::{Result, Sdm120Error};
use crate::pdu::{ModbusPdu, PduBuilder};

/// Function codes the SDM120 register map uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// FC03 - read the 4X (holding) address space
    ReadHolding,
    /// FC04 - read the 3X (input) address space
    ReadInput,
    /// FC06 - write a single holding register (accepted, never emitted)
    WriteSingle,
    /// FC16 - write multiple holding registers
    WriteMultiple,
}

impl FunctionCode {
    /// Wire value of the function code
    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadHolding => FC_READ_HOLDING_REGISTERS,
            FunctionCode::ReadInput => FC_READ_INPUT_REGISTERS,
            FunctionCode::WriteSingle => FC_WRITE_SINGLE_REGISTER,
            FunctionCode::WriteMultiple => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Whether responses to this function carry a byte-count prefix
    fn is_read(self) -> bool {
        matches!(self, FunctionCode::ReadHolding | FunctionCode::ReadInput)
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Sdm120Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            FC_READ_HOLDING_REGISTERS => Ok(FunctionCode::ReadHolding),
            FC_READ_INPUT_REGISTERS => Ok(FunctionCode::ReadInput),
            FC_WRITE_SINGLE_REGISTER => Ok(FunctionCode::WriteSingle),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(FunctionCode::WriteMultiple),
            _ => Err(Sdm120Error::Protocol(format!(
                "Unsupported function code: 0x{value:02X}"
            ))),
        }
    }
}

/// Calculate CRC-16/Modbus (polynomial 0xA001, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the CRC (low byte first) to a slave-address-prefixed PDU.
fn finish_frame(body: Vec<u8>) -> Vec<u8> {
    let mut frame = body;
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Build a read request frame (FC03/FC04).
pub fn build_read_frame(
    slave: u8,
    function: FunctionCode,
    register: u16,
    count: u16,
) -> Result<Vec<u8>> {
    let pdu = PduBuilder::new()
        .function_code(function.code())?
        .address(register)?
        .quantity(count)?
        .build();

    let mut body = Vec::with_capacity(1 + pdu.len() + 2);
    body.push(slave);
    body.extend_from_slice(pdu.as_slice());
    Ok(finish_frame(body))
}

/// Build a write-multiple-registers frame (FC16) carrying one register
/// pair: register count 2, byte count 4, 4 payload bytes.
pub fn build_write_frame(slave: u8, register: u16, payload: &[u8; 4]) -> Result<Vec<u8>> {
    let pdu = PduBuilder::new()
        .function_code(FunctionCode::WriteMultiple.code())?
        .address(register)?
        .quantity(2)?
        .byte(4)?
        .data(payload)?
        .build();

    let mut body = Vec::with_capacity(1 + pdu.len() + 2);
    body.push(slave);
    body.extend_from_slice(pdu.as_slice());
    Ok(finish_frame(body))
}

/// Validate a response frame and extract its payload.
///
/// Checks run in order: CRC (fail-closed), slave address echo, exception
/// bit, function code. For reads the payload is the register bytes after
/// the byte-count prefix; for writes it is the echoed address + quantity.
pub fn parse_response(frame: &[u8], slave: u8, expected: FunctionCode) -> Result<Vec<u8>> {
    if frame.len() < MIN_RTU_FRAME_LEN {
        return Err(Sdm120Error::Protocol(format!(
            "RTU frame too short: {} bytes",
            frame.len()
        )));
    }

    let crc_pos = frame.len() - 2;
    let actual = u16::from_le_bytes([frame[crc_pos], frame[crc_pos + 1]]);
    let calculated = crc16(&frame[..crc_pos]);
    if actual != calculated {
        return Err(Sdm120Error::CrcMismatch {
            expected: calculated,
            actual,
        });
    }

    if frame[0] != slave {
        return Err(Sdm120Error::Protocol(format!(
            "Response from unexpected slave: expected {}, got {}",
            slave, frame[0]
        )));
    }

    let pdu = ModbusPdu::from_slice(&frame[1..crc_pos])?;
    let raw_fc = pdu
        .function_code()
        .ok_or_else(|| Sdm120Error::Protocol("Empty PDU".to_string()))?;
    if pdu.is_exception() {
        let code = pdu.exception_code().ok_or_else(|| {
            Sdm120Error::Protocol("Truncated exception response".to_string())
        })?;
        return Err(Sdm120Error::DeviceException {
            function: raw_fc & !EXCEPTION_BIT,
            code,
        });
    }
    // Classify before comparing: an unknown code is a protocol error, a
    // known-but-different one (FC06 included) is a mismatch.
    let fc = FunctionCode::try_from(raw_fc)?;
    if fc != expected {
        return Err(Sdm120Error::FunctionCodeMismatch {
            expected: expected.code(),
            actual: fc.code(),
        });
    }

    let body = &frame[2..crc_pos];
    if expected.is_read() {
        // [byte count][register bytes...]
        let Some((&byte_count, registers)) = body.split_first() else {
            return Err(Sdm120Error::Protocol(
                "Read response missing byte count".to_string(),
            ));
        };
        if registers.len() != byte_count as usize {
            return Err(Sdm120Error::Protocol(format!(
                "Read response byte count mismatch: declared {}, got {}",
                byte_count,
                registers.len()
            )));
        }
        Ok(registers.to_vec())
    } else {
        Ok(body.to_vec())
    }
}
