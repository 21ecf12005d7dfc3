use tracing::{debug, error, info, warn};

use crate::serial::ChannelError;

use super::StatusSink;

/// Headless status surface: readings and lifecycle events go to the log.
///
/// Stands in for the tray icon menu of the original program; the wording of
/// the user-visible messages is kept.
#[derive(Default)]
pub struct ConsoleStatus;

impl ConsoleStatus {
    pub fn new() -> Self {
        Self
    }
}

impl StatusSink for ConsoleStatus {
    fn readings_updated(&mut self, cpu_percent: u8, mem_percent: u8) {
        info!("CPU: {}%  Memory: {}%", cpu_percent, mem_percent);
    }

    fn connected(&mut self, port_name: &str) {
        info!("PC Meter connected to {}", port_name);
    }

    fn disconnected(&mut self) {
        info!("PC Meter disconnected");
    }

    fn connect_failed(&mut self, _port_name: &str, error: &ChannelError) {
        error!("{}", error);
    }

    fn link_lost(&mut self, details: &str) {
        warn!(
            "Communication with the device has been lost. Has it been unplugged? Details: {}",
            details
        );
    }

    fn fatal_error(&mut self, activity: &str, details: &str) {
        error!("{} failed: {}", activity, details);
    }

    fn connection_state_changed(&mut self, connected: bool) {
        // Settings changes are locked out while the port is open.
        debug!(settings_locked = connected, "connection state changed");
    }
}
