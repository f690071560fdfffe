/// Line-oriented serial channel to the attached sensor nodes
use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::{ClearBuffer, SerialPort};

use crate::error::Result;

const BAUD_RATE: u32 = 115200;

/// Fixed read timeout. A slow or silent device yields empty reads instead
/// of blocking the control loop.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport seam between the poller and the serial hardware.
pub trait SensorLink {
    /// Send one command, newline-terminated on the wire. A no-op when no
    /// device is configured, so the hub can run headless.
    fn send_command(&mut self, command: &str) -> Result<()>;

    /// Read one line, stripped of surrounding whitespace. `None` on an
    /// empty or timed-out read.
    fn wait_response(&mut self) -> Option<String>;

    /// Discard bytes queued in both directions, so stale responses from a
    /// previous round are not misattributed to the current one.
    fn clear_buffer(&mut self);
}

/// Serial device implementation of [`SensorLink`].
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open the configured serial device, or a headless link when no port
    /// name is configured.
    pub fn open(port_name: Option<&str>) -> Result<Self> {
        let port = match port_name {
            Some(name) => {
                let port = serialport::new(name, BAUD_RATE)
                    .timeout(READ_TIMEOUT)
                    .open()?;
                debug!("Opened serial port {}", name);
                Some(port)
            }
            None => {
                warn!("No serial port configured, running without hardware");
                None
            }
        };
        Ok(SerialLink { port })
    }
}

impl SensorLink for SerialLink {
    fn send_command(&mut self, command: &str) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.write_all(format!("{}\n", command).as_bytes())?;
        }
        Ok(())
    }

    fn wait_response(&mut self) -> Option<String> {
        let port = self.port.as_mut()?;

        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                // A line already begun when the timeout fires is returned
                // as-is; rejecting noise is the parser's job.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => {
                    debug!("Serial read error: {}", e);
                    break;
                }
            }
        }

        let response = String::from_utf8_lossy(&line).trim().to_string();
        if response.is_empty() {
            None
        } else {
            Some(response)
        }
    }

    fn clear_buffer(&mut self) {
        if let Some(port) = self.port.as_ref() {
            if let Err(e) = port.clear(ClearBuffer::All) {
                warn!("Failed to clear serial buffers: {}", e);
            }
        }
    }
}
