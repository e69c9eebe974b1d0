//! Test and helper mocks for kegmeter_core.

use crossbeam_channel as xch;
use kegmeter_traits::{LoadCell, Transport};
use std::time::Duration;

/// A load cell that always errors on read; useful when driving the state
/// machine directly with `KegMeter::tick`.
pub struct NoopLoadCell;

impl LoadCell for NoopLoadCell {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop load cell")))
    }
}

/// Replays a fixed sequence of readings, then repeats the last one forever.
pub struct ScriptedLoadCell {
    values: Vec<f64>,
    pos: usize,
}

impl ScriptedLoadCell {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, pos: 0 }
    }
}

impl LoadCell for ScriptedLoadCell {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let Some(&last) = self.values.last() else {
            return Err(Box::new(std::io::Error::other("script exhausted")));
        };
        let v = self.values.get(self.pos).copied().unwrap_or(last);
        self.pos += 1;
        Ok(v)
    }
}

/// In-memory transport for loop tests: the test feeds inbound bytes through
/// `inbound_tx` and collects everything the loop sent from `outbound_rx`.
pub struct LoopbackTransport {
    inbound: xch::Receiver<Vec<u8>>,
    outbound: xch::Sender<Vec<u8>>,
}

impl LoopbackTransport {
    /// Returns (transport, inbound sender, outbound receiver).
    pub fn new() -> (Self, xch::Sender<Vec<u8>>, xch::Receiver<Vec<u8>>) {
        let (in_tx, in_rx) = xch::unbounded();
        let (out_tx, out_rx) = xch::unbounded();
        (
            Self {
                inbound: in_rx,
                outbound: out_tx,
            },
            in_tx,
            out_rx,
        )
    }
}

impl Transport for LoopbackTransport {
    fn recv(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>> {
        match self.inbound.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|e| Box::new(std::io::Error::other(e.to_string())) as _)
    }
}
