mod console;

pub use console::ConsoleStatus;

use crate::serial::ChannelError;

/// User-facing surface the driver reports into.
///
/// The original program showed these through a tray icon menu and message
/// boxes; here it is a seam so any front-end (console, tray, tests) can
/// observe the driver. Transient write failures are deliberately never
/// surfaced here, they would be pure noise across sleep/resume cycles.
pub trait StatusSink {
    /// Fresh readings, pushed every tick whether or not the port is open.
    fn readings_updated(&mut self, cpu_percent: u8, mem_percent: u8);

    /// The serial port was opened.
    fn connected(&mut self, port_name: &str);

    /// The serial port was closed, by request or after link loss.
    fn disconnected(&mut self);

    /// An open attempt failed; the error carries a message per kind.
    fn connect_failed(&mut self, port_name: &str, error: &ChannelError);

    /// Communication with the device was lost mid-session.
    fn link_lost(&mut self, details: &str);

    /// Unexpected failure, reported with the activity that produced it.
    /// When raised from a tick the driver also tells the host to exit.
    fn fatal_error(&mut self, activity: &str, details: &str);

    /// Connection-dependent affordances should be refreshed (the original
    /// grays out Settings while connected). Called after every connect or
    /// disconnect attempt, success or failure.
    fn connection_state_changed(&mut self, connected: bool);
}

/// Shared-ownership sinks, so a caller can keep a handle on a sink it has
/// handed to the driver (tests inspect a [`RecordingSink`] this way).
impl<T: StatusSink> StatusSink for std::rc::Rc<std::cell::RefCell<T>> {
    fn readings_updated(&mut self, cpu_percent: u8, mem_percent: u8) {
        self.borrow_mut().readings_updated(cpu_percent, mem_percent);
    }

    fn connected(&mut self, port_name: &str) {
        self.borrow_mut().connected(port_name);
    }

    fn disconnected(&mut self) {
        self.borrow_mut().disconnected();
    }

    fn connect_failed(&mut self, port_name: &str, error: &ChannelError) {
        self.borrow_mut().connect_failed(port_name, error);
    }

    fn link_lost(&mut self, details: &str) {
        self.borrow_mut().link_lost(details);
    }

    fn fatal_error(&mut self, activity: &str, details: &str) {
        self.borrow_mut().fatal_error(activity, details);
    }

    fn connection_state_changed(&mut self, connected: bool) {
        self.borrow_mut().connection_state_changed(connected);
    }
}

/// Sink that records every call, for driving the tick loop in tests.
#[derive(Default)]
pub struct RecordingSink {
    pub readings: Vec<(u8, u8)>,
    pub connected_ports: Vec<String>,
    pub disconnects: usize,
    pub connect_failures: Vec<String>,
    pub link_losses: Vec<String>,
    pub fatal_errors: Vec<(String, String)>,
    pub state_changes: Vec<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for RecordingSink {
    fn readings_updated(&mut self, cpu_percent: u8, mem_percent: u8) {
        self.readings.push((cpu_percent, mem_percent));
    }

    fn connected(&mut self, port_name: &str) {
        self.connected_ports.push(port_name.to_string());
    }

    fn disconnected(&mut self) {
        self.disconnects += 1;
    }

    fn connect_failed(&mut self, _port_name: &str, error: &ChannelError) {
        self.connect_failures.push(error.to_string());
    }

    fn link_lost(&mut self, details: &str) {
        self.link_losses.push(details.to_string());
    }

    fn fatal_error(&mut self, activity: &str, details: &str) {
        self.fatal_errors.push((activity.to_string(), details.to_string()));
    }

    fn connection_state_changed(&mut self, connected: bool) {
        self.state_changes.push(connected);
    }
}
