//! # sdm120-setup
//!
//! Modbus RTU master for configuring and querying Eastron SDM120
//! single-phase energy meters over an RS-485 serial link.
//!
//! The protocol layer is self-contained: RTU frame construction,
//! CRC-16/Modbus validation, and the float32 register-pair codec live in
//! this crate rather than behind an external Modbus library.
//!
//! ## Layers
//!
//! - [`transport`]: exclusively owned serial link, strict send-then-receive
//!   round trips with a 1 s response timeout
//! - [`frame`]: RTU framing and CRC validation (fail-closed)
//! - [`codec`]: float32 <-> big-endian register-pair conversion
//! - [`client`]: the SDM120 register map and operation set, including the
//!   session-retiring address/baud writes
//! - [`settings`]: read-modify-write configuration workflow gated by the
//!   device sanity check
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sdm120_setup::{run_setup, Result, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 2400)?;
//!     let report = run_setup(transport, 1, None).await?;
//!     println!("voltage: {} V, power: {} W", report.voltage, report.power);
//!     Ok(())
//! }
//! ```

/// Core error types and result handling
pub mod error;

/// Protocol and register-map constants
pub mod constants;

/// Stack-allocated Modbus PDU
pub mod pdu;

/// Float register codec
pub mod codec;

/// RTU frame construction and validation
pub mod frame;

/// Serial transport layer
pub mod transport;

/// SDM120 device client
pub mod client;

/// Configuration workflow
pub mod settings;

pub use client::{voltage_is_sane, RetiredSession, Sdm120Client};
pub use codec::{decode_f32, encode_f32};
pub use error::{Result, Sdm120Error};
pub use frame::{build_read_frame, build_write_frame, crc16, parse_response, FunctionCode};
pub use pdu::{ModbusPdu, PduBuilder};
pub use settings::{
    apply_setting, run_setup, AppliedSetting, BaudCode, CtRating, Setting, SetupReport,
};
pub use transport::{ModbusTransport, SerialTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
