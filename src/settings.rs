//! Configuration workflow.
//!
//! Read-modify-write orchestration for the three writable settings: meter
//! slave address, baud-rate code, and CT1 scale. A run is sequential and
//! gate-checked: the device must pass the sanity check before any setter
//! logic executes, and any protocol error aborts the remaining steps. There
//! is no rollback of an already-completed write.

use tracing::debug;

use crate::client::{voltage_is_sane, RetiredSession, Sdm120Client};
use crate::constants::{HOLDING_BAUD_RATE, HOLDING_CT1, HOLDING_METER_ID};
use crate::error::{Result, Sdm120Error};
use crate::transport::ModbusTransport;

/// SDM120 baud-rate register codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudCode {
    /// Code 0: 2400 bps (factory default)
    B2400,
    /// Code 1: 4800 bps
    B4800,
    /// Code 2: 9600 bps
    B9600,
    /// Code 5: 1200 bps
    B1200,
}

impl BaudCode {
    /// Register code written to the meter
    pub fn code(self) -> u8 {
        match self {
            BaudCode::B2400 => 0,
            BaudCode::B4800 => 1,
            BaudCode::B9600 => 2,
            BaudCode::B1200 => 5,
        }
    }

    /// Serial speed the meter switches to
    pub fn bps(self) -> u32 {
        match self {
            BaudCode::B2400 => 2400,
            BaudCode::B4800 => 4800,
            BaudCode::B9600 => 9600,
            BaudCode::B1200 => 1200,
        }
    }
}

impl TryFrom<u8> for BaudCode {
    type Error = Sdm120Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(BaudCode::B2400),
            1 => Ok(BaudCode::B4800),
            2 => Ok(BaudCode::B9600),
            5 => Ok(BaudCode::B1200),
            _ => Err(Sdm120Error::InvalidParameter(format!(
                "Baud-rate code {code} not one of 0/1/2/5"
            ))),
        }
    }
}

impl std::fmt::Display for BaudCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bps)", self.code(), self.bps())
    }
}

/// CT1 current-transformer rating in amps: 5..=60 in steps of 5. Every
/// rating is encoded through the general float path; the vendor-quoted
/// 0x42700000 for 60 A is exactly float 60.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtRating(u8);

impl CtRating {
    /// Rating in amps
    pub fn amps(self) -> u8 {
        self.0
    }

    /// Register value written to the meter
    pub fn as_f32(self) -> f32 {
        self.0 as f32
    }
}

impl TryFrom<u8> for CtRating {
    type Error = Sdm120Error;

    fn try_from(amps: u8) -> Result<Self> {
        if (5..=60).contains(&amps) && amps % 5 == 0 {
            Ok(CtRating(amps))
        } else {
            Err(Sdm120Error::InvalidParameter(format!(
                "CT1 rating {amps} A not one of 5, 10, ... 60"
            )))
        }
    }
}

/// One requested configuration change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    /// New meter slave address (1..=247)
    MeterId(u8),
    /// New baud-rate code
    Baud(BaudCode),
    /// New CT1 amp rating
    Ct1(CtRating),
}

impl Setting {
    /// Holding register this setting lives in
    pub fn register(self) -> u16 {
        match self {
            Setting::MeterId(_) => HOLDING_METER_ID,
            Setting::Baud(_) => HOLDING_BAUD_RATE,
            Setting::Ct1(_) => HOLDING_CT1,
        }
    }

    /// Register value the setting writes
    pub fn target_value(self) -> f32 {
        match self {
            Setting::MeterId(addr) => addr as f32,
            Setting::Baud(code) => code.code() as f32,
            Setting::Ct1(rating) => rating.as_f32(),
        }
    }

    /// Short name for reporting
    pub fn label(self) -> &'static str {
        match self {
            Setting::MeterId(_) => "device id",
            Setting::Baud(_) => "baudrate",
            Setting::Ct1(_) => "CT1 amps",
        }
    }
}

/// Result of one completed read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedSetting {
    pub setting: Setting,
    /// Register value before the write
    pub old_value: f32,
    /// Register value the write carried
    pub new_value: f32,
    /// Present when the write invalidated the session (address/baud)
    pub retired: Option<RetiredSession>,
}

/// What a full run observed and did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupReport {
    /// Sanity-check voltage reading
    pub voltage: f32,
    /// Active power reading
    pub power: f32,
    pub applied: Option<AppliedSetting>,
}

/// Read the setting's current value, then write the new one. The read and
/// the write are two sequential transactions; the client is consumed
/// because the write may retire the session.
pub async fn apply_setting<T: ModbusTransport>(
    mut client: Sdm120Client<T>,
    setting: Setting,
) -> Result<AppliedSetting> {
    let old_value = client.read_float_holding(setting.register()).await?;
    let new_value = setting.target_value();
    debug!("{}: {} -> {}", setting.label(), old_value, new_value);

    let retired = match setting {
        Setting::MeterId(addr) => Some(client.set_meter_address(addr).await?),
        Setting::Baud(code) => Some(client.set_baud_code(code).await?),
        Setting::Ct1(rating) => {
            client
                .write_float_holding(HOLDING_CT1, rating.as_f32())
                .await?;
            None
        },
    };

    Ok(AppliedSetting {
        setting,
        old_value,
        new_value,
        retired,
    })
}

/// Run the full workflow: sanity check, power reading, then the requested
/// setting (if any). An implausible voltage aborts before any setter logic
/// runs.
pub async fn run_setup<T: ModbusTransport>(
    transport: T,
    meter_id: u8,
    setting: Option<Setting>,
) -> Result<SetupReport> {
    let mut client = Sdm120Client::new(transport, meter_id)?;

    let voltage = client.voltage().await?;
    if !voltage_is_sane(voltage) {
        return Err(Sdm120Error::SanityCheckFailed { voltage });
    }

    let power = client.power().await?;

    let applied = match setting {
        Some(setting) => Some(apply_setting(client, setting).await?),
        None => None,
    };

    Ok(SetupReport {
        voltage,
        power,
        applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;

    const VOLTAGE_119_RESP: &[u8] = &[0x01, 0x04, 0x04, 0x42, 0xEE, 0x00, 0x00, 0x8F, 0xC9];
    const VOLTAGE_300_RESP: &[u8] = &[0x01, 0x04, 0x04, 0x43, 0x96, 0x00, 0x00, 0x0E, 0x2C];
    const POWER_52_RESP: &[u8] = &[0x01, 0x04, 0x04, 0x42, 0x50, 0x00, 0x00, 0xEF, 0xED];
    const BAUD_CODE_0_RESP: &[u8] = &[0x01, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0xFA, 0x33];
    const WRITE_BAUD_ECHO: &[u8] = &[0x01, 0x10, 0x00, 0x1C, 0x00, 0x02, 0x80, 0x0E];
    const CT1_5_RESP: &[u8] = &[0x01, 0x03, 0x04, 0x40, 0xA0, 0x00, 0x00, 0xEF, 0xD1];
    const WRITE_CT1_ECHO: &[u8] = &[0x01, 0x10, 0x00, 0x32, 0x00, 0x02, 0xE0, 0x07];

    #[test]
    fn test_baud_code_mapping() {
        assert_eq!(BaudCode::try_from(0).unwrap(), BaudCode::B2400);
        assert_eq!(BaudCode::try_from(1).unwrap(), BaudCode::B4800);
        assert_eq!(BaudCode::try_from(2).unwrap(), BaudCode::B9600);
        assert_eq!(BaudCode::try_from(5).unwrap(), BaudCode::B1200);
        assert!(BaudCode::try_from(3).is_err());
        assert!(BaudCode::try_from(4).is_err());

        assert_eq!(BaudCode::B1200.bps(), 1200);
        assert_eq!(BaudCode::B9600.bps(), 9600);
        assert_eq!(BaudCode::B4800.to_string(), "1 (4800 bps)");
    }

    #[test]
    fn test_ct_rating_validation() {
        for amps in (5..=60).step_by(5) {
            assert!(CtRating::try_from(amps as u8).is_ok());
        }
        assert!(CtRating::try_from(0).is_err());
        assert!(CtRating::try_from(7).is_err());
        assert!(CtRating::try_from(65).is_err());
        assert_eq!(CtRating::try_from(60).unwrap().as_f32(), 60.0);
    }

    #[tokio::test]
    async fn test_set_baudrate_transaction_sequence() {
        // Meter currently at code 0; setting code 1 must issue exactly
        // ReadHolding(0x001C) then WriteHolding(0x001C, 1.0), in order.
        let transport = ScriptedTransport::new()
            .respond(BAUD_CODE_0_RESP)
            .respond(WRITE_BAUD_ECHO);
        let recorder = transport.recorder();
        let client = Sdm120Client::new(transport, 1).unwrap();

        let applied = apply_setting(client, Setting::Baud(BaudCode::B4800))
            .await
            .unwrap();
        assert_eq!(applied.old_value, 0.0);
        assert_eq!(applied.new_value, 1.0);
        assert_eq!(
            applied.retired,
            Some(RetiredSession {
                slave_address: 1,
                baud: Some(4800),
            })
        );

        let sent = recorder.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            vec![0x01, 0x03, 0x00, 0x1C, 0x00, 0x02, 0x05, 0xCD]
        );
        assert_eq!(
            sent[1],
            vec![0x01, 0x10, 0x00, 0x1C, 0x00, 0x02, 0x04, 0x3F, 0x80, 0x00, 0x00, 0xFF, 0x0A]
        );
    }

    #[tokio::test]
    async fn test_set_ct1_60_writes_expected_pattern() {
        let transport = ScriptedTransport::new()
            .respond(CT1_5_RESP)
            .respond(WRITE_CT1_ECHO);
        let recorder = transport.recorder();
        let client = Sdm120Client::new(transport, 1).unwrap();

        let rating = CtRating::try_from(60).unwrap();
        let applied = apply_setting(client, Setting::Ct1(rating)).await.unwrap();
        assert_eq!(applied.old_value, 5.0);
        assert_eq!(applied.new_value, 60.0);
        assert_eq!(applied.retired, None);

        // Payload is the 0x42700000 pattern, i.e. float 60.0
        let sent = recorder.lock().unwrap();
        assert_eq!(
            sent[1],
            vec![0x01, 0x10, 0x00, 0x32, 0x00, 0x02, 0x04, 0x42, 0x70, 0x00, 0x00, 0x64, 0xC1]
        );
    }

    #[tokio::test]
    async fn test_run_aborts_on_insane_voltage_before_setters() {
        let transport = ScriptedTransport::new().respond(VOLTAGE_300_RESP);
        let recorder = transport.recorder();

        let err = run_setup(transport, 1, Some(Setting::Baud(BaudCode::B4800)))
            .await
            .unwrap_err();
        assert_eq!(err, Sdm120Error::SanityCheckFailed { voltage: 300.0 });

        // Only the voltage read went out; no setter transaction was issued
        let sent = recorder.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][1], 0x04);
    }

    #[tokio::test]
    async fn test_run_full_sequence() {
        let transport = ScriptedTransport::new()
            .respond(VOLTAGE_119_RESP)
            .respond(POWER_52_RESP)
            .respond(BAUD_CODE_0_RESP)
            .respond(WRITE_BAUD_ECHO);
        let recorder = transport.recorder();

        let report = run_setup(transport, 1, Some(Setting::Baud(BaudCode::B4800)))
            .await
            .unwrap();
        assert_eq!(report.voltage, 119.0);
        assert_eq!(report.power, 52.0);
        let applied = report.applied.unwrap();
        assert_eq!(applied.old_value, 0.0);

        // Strict issue order: voltage, power, read setting, write setting
        let sent = recorder.lock().unwrap();
        let summary: Vec<(u8, u16)> = sent
            .iter()
            .map(|f| (f[1], u16::from_be_bytes([f[2], f[3]])))
            .collect();
        assert_eq!(
            summary,
            vec![(0x04, 0x0000), (0x04, 0x000C), (0x03, 0x001C), (0x10, 0x001C)]
        );
    }

    #[tokio::test]
    async fn test_run_without_setting() {
        let transport = ScriptedTransport::new()
            .respond(VOLTAGE_119_RESP)
            .respond(POWER_52_RESP);
        let report = run_setup(transport, 1, None).await.unwrap();
        assert_eq!(report.voltage, 119.0);
        assert_eq!(report.power, 52.0);
        assert!(report.applied.is_none());
    }

    #[tokio::test]
    async fn test_run_aborts_on_protocol_error() {
        // CRC-corrupted power response kills the run before the setter
        let bad_power = &[0x01, 0x04, 0x04, 0x42, 0x50, 0x00, 0x00, 0xFF, 0xFF];
        let transport = ScriptedTransport::new()
            .respond(VOLTAGE_119_RESP)
            .respond(bad_power);
        let recorder = transport.recorder();

        let err = run_setup(transport, 1, Some(Setting::Ct1(CtRating::try_from(30).unwrap())))
            .await
            .unwrap_err();
        assert!(matches!(err, Sdm120Error::CrcMismatch { .. }));
        assert_eq!(recorder.lock().unwrap().len(), 2);
    }
}
