use std::process;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sdm120_setup::constants::EXIT_NOT_SANE;
use sdm120_setup::{run_setup, BaudCode, CtRating, Sdm120Error, SerialTransport, Setting};

/// Eastron SDM120 setup tool
#[derive(Parser)]
#[command(name = "sdm120-setup", version, about)]
struct Cli {
    /// Port where the serial RS485 dongle is connected
    #[arg(long, default_value = "/dev/ttyUSB_SDM120_house")]
    port: String,

    /// Serial link speed in bps
    #[arg(long = "serialBaudRate", default_value_t = 2400, value_parser = parse_serial_baud)]
    serial_baud_rate: u32,

    /// Modbus slave address of the meter
    #[arg(long = "meterID", default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=247))]
    meter_id: u8,

    /// New slave address to program (1-247)
    #[arg(long = "setMeterID", group = "setter", value_parser = clap::value_parser!(u8).range(1..=247))]
    set_meter_id: Option<u8>,

    /// New baud-rate code: 0:2400bps(default), 1:4800bps, 2:9600bps, 5:1200bps
    #[arg(long = "setBaudrate", group = "setter", value_parser = parse_baud_code)]
    set_baudrate: Option<BaudCode>,

    /// New CT1 rating in amps: 5:5Amps(default), 10:10Amps, ... 60:60Amps
    #[arg(long = "setCT1", group = "setter", value_parser = parse_ct_rating)]
    set_ct1: Option<CtRating>,
}

impl Cli {
    fn setting(&self) -> Option<Setting> {
        // The "setter" arg group guarantees at most one is present
        if let Some(addr) = self.set_meter_id {
            Some(Setting::MeterId(addr))
        } else if let Some(code) = self.set_baudrate {
            Some(Setting::Baud(code))
        } else {
            self.set_ct1.map(Setting::Ct1)
        }
    }
}

fn parse_serial_baud(s: &str) -> Result<u32, String> {
    let baud: u32 = s.parse().map_err(|e| format!("{e}"))?;
    match baud {
        1200 | 2400 | 4800 | 9600 => Ok(baud),
        _ => Err(format!("{baud} is not one of 1200, 2400, 4800, 9600")),
    }
}

fn parse_baud_code(s: &str) -> Result<BaudCode, String> {
    let code: u8 = s.parse().map_err(|e| format!("{e}"))?;
    BaudCode::try_from(code).map_err(|e| e.to_string())
}

fn parse_ct_rating(s: &str) -> Result<CtRating, String> {
    let amps: u8 = s.parse().map_err(|e| format!("{e}"))?;
    CtRating::try_from(amps).map_err(|e| e.to_string())
}

async fn run(cli: Cli) -> Result<()> {
    let setting = cli.setting();

    println!("TESTING sdm connection on port: {}", cli.port);
    let transport = SerialTransport::open(&cli.port, cli.serial_baud_rate)?;

    let report = run_setup(transport, cli.meter_id, setting).await?;

    println!(
        "received voltage of {:.1} V, which is sane",
        report.voltage
    );
    println!("power: {:.1} W", report.power);

    if let Some(applied) = report.applied {
        println!(
            "OLD {} is: {}, set to: {}",
            applied.setting.label(),
            applied.old_value,
            applied.new_value
        );
        if let Some(retired) = applied.retired {
            // The meter already answers under its new identity; this run
            // issues nothing further on the old session.
            match retired.baud {
                Some(bps) => println!(
                    "meter now communicates at {bps} bps; rerun with --serialBaudRate {bps}"
                ),
                None => println!(
                    "meter now answers at address {addr}; rerun with --meterID {addr}",
                    addr = retired.slave_address
                ),
            }
        }
    }

    Ok(())
}

/// Process exit code for a failed run: 42 when the sanity check rejected
/// the device, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Sdm120Error>() {
        Some(Sdm120Error::SanityCheckFailed { .. }) => EXIT_NOT_SANE,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<Sdm120Error>() {
            Some(Sdm120Error::SanityCheckFailed { voltage }) => {
                println!("received voltage of {voltage:.1} V, which is NOT sane");
                println!("Instance not sane, bye");
            },
            _ => eprintln!("error: {err:#}"),
        }
        process::exit(exit_code(&err));
    }
}
