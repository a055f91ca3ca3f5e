//! Protocol constants for the SDM120 and Modbus RTU framing.
//!
//! Register addresses are vendor-fixed per the SDM120 Modbus protocol
//! document (SDM120-Modbus_protocol_V2.1); frame limits follow the Modbus
//! specification for RS485 (ADU limit of 256 bytes).

use std::time::Duration;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum PDU (Protocol Data Unit) size per Modbus specification:
/// RS485 ADU (256 bytes) - slave address (1 byte) - CRC (2 bytes)
pub const MAX_PDU_SIZE: usize = 253;

/// Buffer size for receiving RTU frames (max ADU with margin)
pub const RESPONSE_BUFFER_SIZE: usize = 256;

/// Minimum valid RTU frame: slave address + function code + CRC
pub const MIN_RTU_FRAME_LEN: usize = 4;

/// Every SDM120 value spans two 16-bit registers (one float32)
pub const FLOAT_REGISTER_COUNT: u16 = 2;

// ============================================================================
// Timing
// ============================================================================

/// Per-transaction response timeout. Observed round-trip times on the
/// SDM120 reach ~900 ms at 2400 baud, so 1000 ms.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Inter-byte gap that marks the end of an RTU frame
pub const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(50);

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers (FC03, the 4X address space)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04, the 3X address space)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// High bit set on the function code of an exception response
pub const EXCEPTION_BIT: u8 = 0x80;

// ============================================================================
// SDM120 Register Map
// ============================================================================

/// Line voltage in volts (input register, float32)
pub const REG_VOLTAGE: u16 = 0x0000;

/// Active power in watts (input register, float32)
pub const REG_ACTIVE_POWER: u16 = 0x000C;

/// Meter slave address, float32-encoded integer (holding register)
pub const HOLDING_METER_ID: u16 = 0x0014;

/// Baud-rate code, float32-encoded integer (holding register)
pub const HOLDING_BAUD_RATE: u16 = 0x001C;

/// CT1 amp rating, float32 (holding register)
pub const HOLDING_CT1: u16 = 0x0032;

// ============================================================================
// Device Limits
// ============================================================================

/// Lowest valid Modbus slave address
pub const MIN_SLAVE_ADDRESS: u8 = 1;

/// Highest valid Modbus slave address
pub const MAX_SLAVE_ADDRESS: u8 = 247;

/// Plausible mains voltage window for the sanity check (exclusive bounds)
pub const SANE_VOLTAGE_MIN: f32 = 100.0;
pub const SANE_VOLTAGE_MAX: f32 = 250.0;

/// Process exit code signalling a failed sanity check
pub const EXIT_NOT_SANE: i32 = 42;
