//! SDM120 device client.
//!
//! High-level register operations for one Eastron SDM120 on an exclusively
//! owned transport. Every value is a float32 register pair, read and
//! written atomically as one 4-byte unit.
//!
//! Writing the meter-address or baud-rate holding register changes how the
//! meter must be addressed the moment the write completes. Those writes
//! consume the client and hand back a [`RetiredSession`] carrying the new
//! connection parameters, so stale-identity requests are unrepresentable.

use tracing::{debug, info};

use crate::codec::{f32_from_be_bytes, f32_to_be_bytes};
use crate::constants::{
    FLOAT_REGISTER_COUNT, HOLDING_BAUD_RATE, HOLDING_METER_ID, MAX_SLAVE_ADDRESS,
    MIN_SLAVE_ADDRESS, REG_ACTIVE_POWER, REG_VOLTAGE, SANE_VOLTAGE_MAX, SANE_VOLTAGE_MIN,
};
use crate::error::{Result, Sdm120Error};
use crate::frame::{build_read_frame, build_write_frame, parse_response, FunctionCode};
use crate::settings::BaudCode;
use crate::transport::ModbusTransport;

/// Connection parameters the meter answers under after a session-retiring
/// write. Reopen the link with these before issuing further requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetiredSession {
    /// Slave address the meter now responds to
    pub slave_address: u8,
    /// New serial baud rate, if the write changed it
    pub baud: Option<u32>,
}

/// Client for one SDM120 meter.
pub struct Sdm120Client<T: ModbusTransport> {
    transport: T,
    slave: u8,
}

impl<T: ModbusTransport> Sdm120Client<T> {
    /// Create a client for the meter at `slave` on the given transport.
    pub fn new(transport: T, slave: u8) -> Result<Self> {
        validate_slave_address(slave)?;
        Ok(Self { transport, slave })
    }

    /// Slave address this client addresses.
    pub fn slave_address(&self) -> u8 {
        self.slave
    }

    async fn read_float(&mut self, function: FunctionCode, register: u16) -> Result<f32> {
        let request = build_read_frame(self.slave, function, register, FLOAT_REGISTER_COUNT)?;
        let response = self.transport.transact(&request).await?;
        let payload = parse_response(&response, self.slave, function)?;
        let value = f32_from_be_bytes(&payload).ok_or_else(|| {
            Sdm120Error::Protocol(format!(
                "Expected 4 register bytes, got {}",
                payload.len()
            ))
        })?;
        debug!("read reg 0x{:04X} (FC{:02X}) = {}", register, function.code(), value);
        Ok(value)
    }

    /// Read a float32 input register pair (FC04).
    pub async fn read_float_input(&mut self, register: u16) -> Result<f32> {
        self.read_float(FunctionCode::ReadInput, register).await
    }

    /// Read a float32 holding register pair (FC03).
    pub async fn read_float_holding(&mut self, register: u16) -> Result<f32> {
        self.read_float(FunctionCode::ReadHolding, register).await
    }

    /// Write a float32 to a holding register pair in a single FC16 frame.
    /// No read-back verification; callers re-read if they need confirmation.
    pub async fn write_float_holding(&mut self, register: u16, value: f32) -> Result<()> {
        let payload = f32_to_be_bytes(value);
        let request = build_write_frame(self.slave, register, &payload)?;
        let response = self.transport.transact(&request).await?;
        let echo = parse_response(&response, self.slave, FunctionCode::WriteMultiple)?;

        // Echo carries the written address and register count
        if echo.len() != 4 {
            return Err(Sdm120Error::Protocol(format!(
                "Malformed write echo: {} bytes",
                echo.len()
            )));
        }
        let echoed_register = u16::from_be_bytes([echo[0], echo[1]]);
        let echoed_count = u16::from_be_bytes([echo[2], echo[3]]);
        if echoed_register != register || echoed_count != FLOAT_REGISTER_COUNT {
            return Err(Sdm120Error::Protocol(format!(
                "Write echo mismatch: register 0x{echoed_register:04X}, count {echoed_count}"
            )));
        }
        debug!("wrote reg 0x{:04X} = {}", register, value);
        Ok(())
    }

    /// Line voltage in volts.
    pub async fn voltage(&mut self) -> Result<f32> {
        self.read_float_input(REG_VOLTAGE).await
    }

    /// Active power in watts.
    pub async fn power(&mut self) -> Result<f32> {
        self.read_float_input(REG_ACTIVE_POWER).await
    }

    /// Heuristic liveness check: the meter is considered sane iff it
    /// reports a plausible mains voltage. Not a protocol guarantee.
    pub async fn is_device_sane(&mut self) -> Result<bool> {
        let voltage = self.voltage().await?;
        let sane = voltage_is_sane(voltage);
        info!(
            "received voltage of {:.1} V, which is {}sane",
            voltage,
            if sane { "" } else { "NOT " }
        );
        Ok(sane)
    }

    /// Change the meter's slave address. The meter answers under the new
    /// address immediately, so this retires the session.
    pub async fn set_meter_address(mut self, new_address: u8) -> Result<RetiredSession> {
        validate_slave_address(new_address)?;
        self.write_float_holding(HOLDING_METER_ID, new_address as f32)
            .await?;
        Ok(RetiredSession {
            slave_address: new_address,
            baud: None,
        })
    }

    /// Change the meter's baud-rate code. The meter switches speed
    /// immediately, so this retires the session.
    pub async fn set_baud_code(mut self, code: BaudCode) -> Result<RetiredSession> {
        self.write_float_holding(HOLDING_BAUD_RATE, code.code() as f32)
            .await?;
        Ok(RetiredSession {
            slave_address: self.slave,
            baud: Some(code.bps()),
        })
    }
}

/// Plausible-mains-voltage predicate backing [`Sdm120Client::is_device_sane`].
pub fn voltage_is_sane(voltage: f32) -> bool {
    voltage > SANE_VOLTAGE_MIN && voltage < SANE_VOLTAGE_MAX
}

fn validate_slave_address(slave: u8) -> Result<()> {
    if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&slave) {
        return Err(Sdm120Error::InvalidParameter(format!(
            "Slave address {slave} outside {MIN_SLAVE_ADDRESS}-{MAX_SLAVE_ADDRESS}"
        )));
    }
    Ok(())
}
