//! Serial transport for Modbus RTU.
//!
//! One exclusively owned serial handle, blocking round trips: every
//! transaction is a strict send-then-receive exchange and no two
//! transactions are ever in flight on the same link. The OS handle is
//! released when the transport is dropped.

use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error};

use crate::constants::{INTER_BYTE_TIMEOUT, MIN_RTU_FRAME_LEN, RESPONSE_BUFFER_SIZE, RESPONSE_TIMEOUT};
use crate::error::{Result, Sdm120Error};

/// One request/response exchange on a Modbus link.
///
/// The serial implementation talks RS-485; tests substitute a scripted
/// double that records the frames it is given.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Send a request frame and receive the response frame.
    async fn transact(&mut self, frame: &[u8]) -> Result<Vec<u8>>;
}

/// RS-485 serial link (parity none, 8 data bits, 1 stop bit).
pub struct SerialTransport {
    port: SerialStream,
    path: String,
}

impl SerialTransport {
    /// Open the serial device. Fatal on failure: there is nothing to retry
    /// when the configured port does not exist or is held by another
    /// process.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        debug!("RTU: {} @{}baud", path, baud_rate);

        match tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(RESPONSE_TIMEOUT)
            .open_native_async()
        {
            Ok(port) => {
                debug!("RTU opened: {}", path);
                Ok(Self {
                    port,
                    path: path.to_string(),
                })
            },
            Err(e) => {
                error!("RTU err: {} - {}", path, e);
                Err(Sdm120Error::Connection(format!(
                    "Failed to open serial port {path}: {e}"
                )))
            },
        }
    }

    /// Serial device path this transport is bound to.
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data).await.map_err(|e| {
            error!("RTU TX: {}", e);
            Sdm120Error::Io(format!("Serial send error: {e}"))
        })?;
        self.port.flush().await.map_err(|e| {
            error!("RTU flush: {}", e);
            Sdm120Error::Io(format!("Serial flush error: {e}"))
        })?;
        debug!("RTU TX: {}", hex::encode(data));
        Ok(())
    }

    /// Read one RTU frame: bytes accumulate until an inter-byte gap after
    /// at least a minimal frame, bounded by the total response timeout.
    async fn receive(&mut self) -> Result<Vec<u8>> {
        let mut buffer = [0u8; RESPONSE_BUFFER_SIZE];
        let mut total_bytes = 0;
        let start_time = Instant::now();

        loop {
            if start_time.elapsed() >= RESPONSE_TIMEOUT {
                if total_bytes < MIN_RTU_FRAME_LEN {
                    debug!("RTU timeout: {}B", total_bytes);
                    return Err(Sdm120Error::Timeout(
                        "No response within timeout window".to_string(),
                    ));
                }
                break;
            }

            let remaining = &mut buffer[total_bytes..];
            match timeout(INTER_BYTE_TIMEOUT, self.port.read(remaining)).await {
                Ok(Ok(0)) => {
                    error!("RTU closed");
                    return Err(Sdm120Error::Connection(
                        "Serial connection closed".to_string(),
                    ));
                },
                Ok(Ok(bytes)) => {
                    total_bytes += bytes;
                    if total_bytes >= buffer.len() {
                        error!("RTU overflow: {}B", total_bytes);
                        return Err(Sdm120Error::Protocol(
                            "RTU frame exceeds buffer size".to_string(),
                        ));
                    }
                },
                Ok(Err(e)) => {
                    error!("RTU RX: {}", e);
                    return Err(Sdm120Error::Io(format!("Serial read error: {e}")));
                },
                Err(_) => {
                    // Inter-byte gap: frame complete once minimally sized
                    if total_bytes >= MIN_RTU_FRAME_LEN {
                        break;
                    } else if total_bytes > 0 {
                        debug!("RTU partial: {}B", total_bytes);
                        return Err(Sdm120Error::Timeout(
                            "RTU frame incomplete: inter-byte timeout".to_string(),
                        ));
                    }
                    // Nothing received yet, keep waiting for the slave
                },
            }
        }

        debug!("RTU RX: {}", hex::encode(&buffer[..total_bytes]));
        Ok(buffer[..total_bytes].to_vec())
    }
}

#[async_trait]
impl ModbusTransport for SerialTransport {
    async fn transact(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.send(frame).await?;
        self.receive().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Scripted transport double: replies with canned frames in order and
    /// records every request frame it was handed. The recorder handle
    /// survives the transport being moved into a client.
    pub(crate) struct ScriptedTransport {
        responses: VecDeque<Result<Vec<u8>>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self {
                responses: VecDeque::new(),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn respond(mut self, frame: &[u8]) -> Self {
            self.responses.push_back(Ok(frame.to_vec()));
            self
        }

        pub(crate) fn fail(mut self, err: Sdm120Error) -> Self {
            self.responses.push_back(Err(err));
            self
        }

        pub(crate) fn recorder(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
            Arc::clone(&self.sent)
        }
    }

    #[async_trait]
    impl ModbusTransport for ScriptedTransport {
        async fn transact(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
            self.sent.lock().unwrap().push(frame.to_vec());
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(Sdm120Error::Timeout("script exhausted".to_string())))
        }
    }
}
