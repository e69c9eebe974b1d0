//! Host link over stdin/stdout.
//!
//! Stdin has no portable timed read, so a reader thread pumps bytes into a
//! channel and `recv` does a bounded wait on that. The thread exits with
//! the process; there is nothing to join.

use crossbeam_channel as xch;
use kegmeter_traits::Transport;
use std::io::{Read, Write};
use std::time::Duration;

pub struct StdioTransport {
    rx: xch::Receiver<Vec<u8>>,
    stdout: std::io::Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        let (tx, rx) = xch::bounded(64);
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 256];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break, // EOF: host closed the pipe
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "stdin read failed");
                        break;
                    }
                }
            }
            tracing::debug!("stdin reader exiting");
        });
        Self {
            rx,
            stdout: std::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn recv(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>> {
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            // Reader thread gone (EOF); the loop keeps metering without a host.
            Err(xch::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut out = self.stdout.lock();
        out.write_all(bytes)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}
