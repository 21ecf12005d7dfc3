//! Serial connection to the meter device.
//!
//! One connection at a time, opened at a fixed 9600 baud with fixed
//! read/write timeouts. Failures are classified so the caller can react per
//! kind: open failures get a tailored user message each, write failures
//! split into a transient "device not functioning" condition (seen across
//! sleep/resume, the port self-heals) and link loss (device unplugged).

pub mod fake;

use std::error::Error;
use std::fmt;
use std::io;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Fixed line rate of the meter protocol.
pub const BAUD_RATE: u32 = 9600;
/// Bounds a blocking read on the port.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Bounds a blocking write, and the buffer drain performed by `close`.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Port selection for [`SerialChannel::open`]. Baud rate and timeouts are
/// constants of the protocol, not configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub port_name: String,
}

impl PortConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug)]
pub enum ChannelError {
    /// The port exists but is claimed by another process.
    AccessDenied { port_name: String },
    /// The named port does not exist or cannot be opened.
    PortUnavailable { port_name: String },
    /// `write` was called while the channel is disconnected.
    NotConnected,
    /// The "device not functioning" condition; the port self-heals and the
    /// connection stays up.
    TransientIo(io::Error),
    /// Any other I/O failure during a write; the connection is gone.
    LinkLost(io::Error),
    /// Unclassified OS-level failure while opening.
    Unknown(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessDenied { port_name } => write!(
                f,
                "access to {} is denied; it may already be in use by another application or process",
                port_name
            ),
            Self::PortUnavailable { port_name } => write!(
                f,
                "{} could not be opened; check that it is a valid serial port",
                port_name
            ),
            Self::NotConnected => write!(f, "serial channel is not connected"),
            Self::TransientIo(e) => write!(f, "device not functioning (transient): {}", e),
            Self::LinkLost(e) => write!(f, "communication lost: {}", e),
            Self::Unknown(e) => write!(f, "serial port error: {}", e),
        }
    }
}

impl Error for ChannelError {}

/// Seam between the driver and the serial port so tests can script a link.
pub trait MeterLink {
    fn open(&mut self, config: &PortConfig) -> Result<(), ChannelError>;
    fn write(&mut self, frame: &[u8]) -> Result<(), ChannelError>;
    fn close(&mut self) -> Result<(), ChannelError>;
    fn state(&self) -> ConnectionState;
    /// Name of the currently open port, if connected.
    fn port_name(&self) -> Option<&str>;
}

/// Owns the OS serial handle and the connect/disconnect lifecycle.
#[derive(Default)]
pub struct SerialChannel {
    port: Option<Box<dyn serialport::SerialPort>>,
    port_name: Option<String>,
}

impl SerialChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_port(&mut self) {
        self.port = None;
        self.port_name = None;
    }
}

impl MeterLink for SerialChannel {
    fn open(&mut self, config: &PortConfig) -> Result<(), ChannelError> {
        // Reopening replaces any existing connection.
        self.close()?;

        match serialport::new(&config.port_name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
        {
            Ok(port) => {
                info!(port = %config.port_name, "serial port opened");
                self.port = Some(port);
                self.port_name = Some(config.port_name.clone());
                Ok(())
            }
            Err(e) => Err(classify_open_error(&config.port_name, e)),
        }
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let Some(port) = self.port.as_mut() else {
            return Err(ChannelError::NotConnected);
        };

        match port.write_all(frame) {
            Ok(()) => Ok(()),
            Err(e) if is_transient(&e) => {
                debug!(error = %e, "transient serial write failure, keeping connection");
                Err(ChannelError::TransientIo(e))
            }
            Err(e) => {
                // The link is gone; release the handle so state reads
                // Disconnected immediately.
                self.drop_port();
                Err(ChannelError::LinkLost(e))
            }
        }
    }

    /// Drain the outbound buffer, bounded by the write timeout, then
    /// release the handle. A device that vanished between open and close
    /// (virtual ports unplugged mid-session) still counts as a successful
    /// close; the handle is gone either way. No-op when already closed.
    fn close(&mut self) -> Result<(), ChannelError> {
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };

        let deadline = Instant::now() + WRITE_TIMEOUT;
        loop {
            match port.bytes_to_write() {
                Ok(0) => break,
                Err(_) => break,
                Ok(_) if Instant::now() >= deadline => {
                    debug!("outbound buffer still non-empty at close deadline");
                    break;
                }
                Ok(_) => thread::sleep(Duration::from_millis(5)),
            }
        }

        info!("serial port closed");
        self.drop_port();
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.port.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }
}

/// Map an open failure onto the user-facing taxonomy. Claimed ports show up
/// as permission errors, missing ports as no-device/not-found.
fn classify_open_error(port_name: &str, error: serialport::Error) -> ChannelError {
    use serialport::ErrorKind;

    match error.kind() {
        ErrorKind::Io(io::ErrorKind::PermissionDenied) => ChannelError::AccessDenied {
            port_name: port_name.to_string(),
        },
        ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) => {
            ChannelError::PortUnavailable {
                port_name: port_name.to_string(),
            }
        }
        _ => ChannelError::Unknown(error.to_string()),
    }
}

/// The "device not functioning" condition surfaces as ERROR_GEN_FAILURE on
/// Windows after sleep/resume; the port keeps working on later writes.
#[cfg(windows)]
const GEN_FAILURE: i32 = 31;

fn is_transient(error: &io::Error) -> bool {
    if matches!(error.kind(), io::ErrorKind::Interrupted) {
        return true;
    }
    #[cfg(windows)]
    if error.raw_os_error() == Some(GEN_FAILURE) {
        return true;
    }
    false
}

/// Names of serial ports currently present on the system.
pub fn available_port_names() -> Result<Vec<String>, ChannelError> {
    let ports = serialport::available_ports().map_err(|e| ChannelError::Unknown(e.to_string()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
