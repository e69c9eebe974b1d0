pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// One load sensor channel. Implementations block for at most `timeout`
/// waiting for a fresh reading and return the approximate load in kilograms.
pub trait LoadCell {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

impl<L: LoadCell + ?Sized> LoadCell for Box<L> {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }
}

/// Byte-stream link to the host (serial, TCP, stdio).
///
/// `recv` must be a bounded wait: it returns `Ok(None)` when the timeout
/// expires with no bytes, which is not an error. `send` is best-effort;
/// callers must keep running when it fails.
pub trait Transport {
    fn recv(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>>;

    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
