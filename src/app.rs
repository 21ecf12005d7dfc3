//! The meter driver: ties sampler, encoder and serial channel together and
//! applies the failure policy.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::monitor::{MetricSource, Sample};
use crate::protocol;
use crate::serial::{ChannelError, ConnectionState, MeterLink, PortConfig};
use crate::ui::StatusSink;

/// Fixed tick period; sampling and the bounded serial write comfortably fit
/// inside it, so ticks never overlap in the cooperative loop.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Running,
}

/// What the host loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep ticking.
    Continue,
    /// Unrecoverable; the host should terminate the process.
    Fatal,
}

/// Periodic scheduler for the sample -> encode -> write path.
///
/// Owns the current readings and the start/stop lifecycle; the serial
/// channel owns its own connection state. Failure policy per tick:
/// transient I/O is swallowed, link loss auto-disconnects but ticking
/// resumes display-only, anything else is fatal.
pub struct MeterDriver<S: MetricSource, L: MeterLink> {
    sampler: S,
    link: L,
    sink: Box<dyn StatusSink>,
    state: DriverState,
    last_sample: Option<Sample>,
}

impl<S: MetricSource, L: MeterLink> MeterDriver<S, L> {
    /// Build a stopped driver. Constructing one requires an initialized
    /// sampler, so a driver can never start without working counters.
    pub fn new(sampler: S, link: L, sink: Box<dyn StatusSink>) -> Self {
        Self {
            sampler,
            link,
            sink,
            state: DriverState::Stopped,
            last_sample: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Most recent readings, if a tick has run.
    pub fn current_sample(&self) -> Option<Sample> {
        self.last_sample
    }

    pub fn start(&mut self) {
        if self.state == DriverState::Running {
            return;
        }
        info!("meter driver started");
        self.state = DriverState::Running;
    }

    /// Halt ticking. Idempotent; an in-flight tick is unaffected because
    /// ticks run to completion before the host checks state again.
    pub fn stop(&mut self) {
        if self.state == DriverState::Stopped {
            return;
        }
        info!("meter driver stopped");
        self.state = DriverState::Stopped;
    }

    /// Open the configured port. The sink's connection-dependent state is
    /// refreshed after the attempt whether it succeeded or not.
    pub fn connect(&mut self, config: &PortConfig) -> bool {
        let opened = match self.link.open(config) {
            Ok(()) => {
                self.sink.connected(config.port_name.as_str());
                true
            }
            Err(error) => {
                warn!(port = %config.port_name, %error, "serial connect failed");
                self.sink.connect_failed(&config.port_name, &error);
                false
            }
        };
        self.refresh_connection_state();
        opened
    }

    /// Close the port on user request. Closing an already-closed channel
    /// succeeds quietly.
    pub fn disconnect(&mut self) {
        let was_connected = self.link.state() == ConnectionState::Connected;
        match self.link.close() {
            Ok(()) => {
                if was_connected {
                    self.sink.disconnected();
                }
            }
            Err(error) => {
                self.sink
                    .fatal_error("Disposing and closing serial port", &error.to_string());
            }
        }
        self.refresh_connection_state();
    }

    /// One scheduling period: sample, push readings to the sink, and write
    /// to the meter when connected.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != DriverState::Running {
            return TickOutcome::Continue;
        }

        let sample = match self.sampler.sample() {
            Ok(sample) => sample,
            Err(error) => {
                // Without a sampler the program is not useful; stop and
                // tell the host to exit.
                self.stop();
                self.sink.fatal_error("Update meters", &error.to_string());
                return TickOutcome::Fatal;
            }
        };

        self.last_sample = Some(sample);
        self.sink
            .readings_updated(sample.cpu_percent, sample.mem_percent);

        if self.link.state() == ConnectionState::Connected {
            match self.link.write(&protocol::encode(sample)) {
                Ok(()) => {}
                Err(ChannelError::TransientIo(error)) => {
                    // Seen across sleep/resume; the port self-heals, so no
                    // state change and no user notification.
                    debug!(%error, "transient serial failure swallowed");
                }
                Err(ChannelError::LinkLost(error)) => {
                    warn!(%error, "serial link lost, disconnecting");
                    let _ = self.link.close();
                    self.sink.link_lost(&error.to_string());
                    self.sink.disconnected();
                    self.refresh_connection_state();
                    // Ticking resumes display-only until the user
                    // reconnects.
                }
                Err(error) => {
                    self.stop();
                    self.sink.fatal_error("Update meters", &error.to_string());
                    return TickOutcome::Fatal;
                }
            }
        }

        TickOutcome::Continue
    }

    /// Stop ticking and release the port, draining pending output.
    pub fn shutdown(&mut self) {
        self.stop();
        self.disconnect();
    }

    fn refresh_connection_state(&mut self) {
        self.sink
            .connection_state_changed(self.link.state() == ConnectionState::Connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::SamplerError;
    use crate::serial::fake::FakeLink;
    use crate::ui::RecordingSink;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    struct ScriptedSource {
        sample: Sample,
        fail_after: Option<usize>,
        calls: usize,
    }

    impl ScriptedSource {
        fn steady(cpu_percent: u8, mem_percent: u8) -> Self {
            Self {
                sample: Sample {
                    cpu_percent,
                    mem_percent,
                },
                fail_after: None,
                calls: 0,
            }
        }

        fn failing_after(cpu_percent: u8, mem_percent: u8, calls: usize) -> Self {
            Self {
                fail_after: Some(calls),
                ..Self::steady(cpu_percent, mem_percent)
            }
        }
    }

    impl MetricSource for ScriptedSource {
        fn sample(&mut self) -> Result<Sample, SamplerError> {
            if let Some(limit) = self.fail_after {
                if self.calls >= limit {
                    return Err(SamplerError::NoProcessors);
                }
            }
            self.calls += 1;
            Ok(self.sample)
        }
    }

    fn shared_sink() -> Rc<RefCell<RecordingSink>> {
        Rc::new(RefCell::new(RecordingSink::new()))
    }

    fn link_lost() -> ChannelError {
        ChannelError::LinkLost(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }

    fn transient() -> ChannelError {
        ChannelError::TransientIo(io::Error::new(io::ErrorKind::Interrupted, "resume hiccup"))
    }

    #[test]
    fn ticks_write_frames_while_connected() {
        let sink = shared_sink();
        let mut driver = MeterDriver::new(
            ScriptedSource::steady(50, 60),
            FakeLink::connected("COM3"),
            Box::new(sink.clone()),
        );
        driver.start();

        for _ in 0..3 {
            assert_eq!(driver.tick(), TickOutcome::Continue);
        }

        assert_eq!(sink.borrow().readings, vec![(50, 60); 3]);
        assert_eq!(
            driver.link().writes(),
            vec![b"C50\rM60\r".to_vec(); 3].as_slice()
        );
        assert_eq!(driver.current_sample().unwrap().cpu_percent, 50);
    }

    #[test]
    fn transient_failure_keeps_connection_and_ticking() {
        let sink = shared_sink();
        let mut link = FakeLink::connected("COM3");
        link.script_writes(vec![Err(transient()), Ok(())]);
        let mut driver =
            MeterDriver::new(ScriptedSource::steady(10, 20), link, Box::new(sink.clone()));
        driver.start();

        assert_eq!(driver.tick(), TickOutcome::Continue);
        assert_eq!(driver.tick(), TickOutcome::Continue);

        let sink = sink.borrow();
        // No disconnect, no user-visible notice, both readings displayed.
        assert_eq!(sink.disconnects, 0);
        assert!(sink.link_losses.is_empty());
        assert_eq!(sink.readings.len(), 2);
        assert_eq!(driver.state(), DriverState::Running);
    }

    #[test]
    fn link_loss_disconnects_once_and_resumes_display_only() {
        let sink = shared_sink();
        let mut link = FakeLink::connected("COM3");
        link.script_writes(vec![Err(link_lost())]);
        let mut driver =
            MeterDriver::new(ScriptedSource::steady(10, 20), link, Box::new(sink.clone()));
        driver.start();

        assert_eq!(driver.tick(), TickOutcome::Continue);
        // Display keeps updating after the loss, nothing more hits the port.
        assert_eq!(driver.tick(), TickOutcome::Continue);
        assert_eq!(driver.tick(), TickOutcome::Continue);

        let sink = sink.borrow();
        assert_eq!(sink.disconnects, 1);
        assert_eq!(sink.link_losses.len(), 1);
        assert_eq!(sink.state_changes, vec![false]);
        assert_eq!(sink.readings.len(), 3);
        assert_eq!(driver.state(), DriverState::Running);
    }

    #[test]
    fn sampler_failure_is_fatal_and_stops_the_driver() {
        let sink = shared_sink();
        let mut driver = MeterDriver::new(
            ScriptedSource::failing_after(10, 20, 2),
            FakeLink::connected("COM3"),
            Box::new(sink.clone()),
        );
        driver.start();

        assert_eq!(driver.tick(), TickOutcome::Continue);
        assert_eq!(driver.tick(), TickOutcome::Continue);
        assert_eq!(driver.tick(), TickOutcome::Fatal);

        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(sink.borrow().fatal_errors.len(), 1);
        assert_eq!(sink.borrow().fatal_errors[0].0, "Update meters");
    }

    #[test]
    fn connect_failure_is_surfaced_and_refreshes_state() {
        let sink = shared_sink();
        let mut link = FakeLink::new();
        link.fail_next_open(ChannelError::AccessDenied {
            port_name: "COM3".into(),
        });
        let mut driver =
            MeterDriver::new(ScriptedSource::steady(10, 20), link, Box::new(sink.clone()));

        assert!(!driver.connect(&PortConfig::new("COM3")));

        let sink = sink.borrow();
        assert_eq!(sink.connect_failures.len(), 1);
        assert!(sink.connect_failures[0].contains("denied"));
        assert_eq!(sink.state_changes, vec![false]);
    }

    #[test]
    fn connect_success_announces_port_and_state() {
        let sink = shared_sink();
        let mut driver = MeterDriver::new(
            ScriptedSource::steady(10, 20),
            FakeLink::new(),
            Box::new(sink.clone()),
        );

        assert!(driver.connect(&PortConfig::new("COM4")));

        let sink = sink.borrow();
        assert_eq!(sink.connected_ports, vec!["COM4".to_string()]);
        assert_eq!(sink.state_changes, vec![true]);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let sink = shared_sink();
        let mut driver = MeterDriver::new(
            ScriptedSource::steady(10, 20),
            FakeLink::connected("COM3"),
            Box::new(sink.clone()),
        );

        driver.disconnect();
        driver.disconnect();

        let sink = sink.borrow();
        assert_eq!(sink.disconnects, 1);
        assert_eq!(sink.state_changes, vec![false, false]);
    }

    #[test]
    fn ticks_while_disconnected_update_display_only() {
        let sink = shared_sink();
        let mut driver = MeterDriver::new(
            ScriptedSource::steady(33, 44),
            FakeLink::new(),
            Box::new(sink.clone()),
        );
        driver.start();

        assert_eq!(driver.tick(), TickOutcome::Continue);

        assert_eq!(sink.borrow().readings, vec![(33, 44)]);
    }

    #[test]
    fn stopped_driver_does_not_sample() {
        let sink = shared_sink();
        let mut driver = MeterDriver::new(
            ScriptedSource::steady(33, 44),
            FakeLink::new(),
            Box::new(sink.clone()),
        );

        assert_eq!(driver.tick(), TickOutcome::Continue);
        assert!(sink.borrow().readings.is_empty());

        driver.start();
        driver.stop();
        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}
