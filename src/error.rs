//! Error types for SDM120 setup operations.

use thiserror::Error;

/// Result type for sdm120-setup operations
pub type Result<T> = std::result::Result<T, Sdm120Error>;

/// Errors raised by the transport, framing, and device layers.
///
/// Protocol errors are never swallowed: a CRC or exception failure aborts
/// the current transaction and propagates to the caller, which decides
/// whether the run continues (it does not; see the workflow in
/// [`crate::settings`]).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Sdm120Error {
    /// Serial port cannot be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// IO errors on an open link
    #[error("IO error: {0}")]
    Io(String),

    /// No response within the timeout window
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Response frame failed the CRC-16 integrity check
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Response carried a different function code than the request
    #[error("Function code mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    FunctionCodeMismatch { expected: u8, actual: u8 },

    /// Meter explicitly rejected the request
    #[error("Device exception for function 0x{function:02X}: code 0x{code:02X} ({})", exception_description(*.code))]
    DeviceException { function: u8, code: u8 },

    /// Malformed or truncated frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Illegal setting or address value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Voltage reading outside the plausible mains range
    #[error("Sanity check failed: voltage {voltage:.1} V outside 100-250 V range")]
    SanityCheckFailed { voltage: f32 },
}

impl From<std::io::Error> for Sdm120Error {
    fn from(err: std::io::Error) -> Self {
        Sdm120Error::Io(err.to_string())
    }
}

/// Human-readable description of a Modbus exception code.
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}
