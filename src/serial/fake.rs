//! Scripted in-memory link used by tests to exercise the driver without
//! hardware.

use std::collections::VecDeque;

use super::{ChannelError, ConnectionState, MeterLink, PortConfig};

/// Fake serial link: records every frame written and plays back a script of
/// write outcomes. An exhausted script means writes succeed.
#[derive(Default)]
pub struct FakeLink {
    state: ConnectionState,
    port_name: Option<String>,
    script: VecDeque<Result<(), ChannelError>>,
    writes: Vec<Vec<u8>>,
    open_error: Option<ChannelError>,
    close_calls: usize,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that starts out connected, as if `open` already succeeded.
    pub fn connected(port_name: &str) -> Self {
        Self {
            state: ConnectionState::Connected,
            port_name: Some(port_name.to_string()),
            ..Self::default()
        }
    }

    /// Queue outcomes for upcoming writes, consumed in order.
    pub fn script_writes(&mut self, outcomes: Vec<Result<(), ChannelError>>) {
        self.script = outcomes.into();
    }

    /// Make the next `open` call fail with the given error.
    pub fn fail_next_open(&mut self, error: ChannelError) {
        self.open_error = Some(error);
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }
}

impl MeterLink for FakeLink {
    fn open(&mut self, config: &PortConfig) -> Result<(), ChannelError> {
        if let Some(error) = self.open_error.take() {
            return Err(error);
        }
        self.state = ConnectionState::Connected;
        self.port_name = Some(config.port_name.clone());
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.state == ConnectionState::Disconnected {
            return Err(ChannelError::NotConnected);
        }
        match self.script.pop_front() {
            Some(Ok(())) | None => {
                self.writes.push(frame.to_vec());
                Ok(())
            }
            Some(Err(error)) => {
                if matches!(error, ChannelError::LinkLost(_)) {
                    self.state = ConnectionState::Disconnected;
                    self.port_name = None;
                }
                Err(error)
            }
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.close_calls += 1;
        self.state = ConnectionState::Disconnected;
        self.port_name = None;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn records_writes_and_replays_script() {
        let mut link = FakeLink::connected("COM3");
        link.script_writes(vec![
            Ok(()),
            Err(ChannelError::LinkLost(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "unplugged",
            ))),
        ]);

        assert!(link.write(b"C1\rM2\r").is_ok());
        assert!(matches!(
            link.write(b"C1\rM2\r"),
            Err(ChannelError::LinkLost(_))
        ));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.writes(), &[b"C1\rM2\r".to_vec()]);
    }

    #[test]
    fn disconnected_write_is_rejected_before_the_script() {
        let mut link = FakeLink::new();
        link.script_writes(vec![Ok(())]);
        assert!(matches!(
            link.write(b"C1\rM2\r"),
            Err(ChannelError::NotConnected)
        ));
        assert!(link.writes().is_empty());
    }
}
