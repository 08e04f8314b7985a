use std::io::Write;

use ublox_fix::{FixEvent, FixSink};

use crate::store::FixStore;

/// Publishes each fix as a JSON line on `out`, and keeps a copy in a [`FixStore`] if given.
///
/// Output failures are logged and otherwise ignored, so a broken consumer
/// never stops acquisition.
pub struct PublisherSink<W: Write> {
    out: W,
    store: Option<FixStore>,
}

impl<W: Write> PublisherSink<W> {
    pub fn new(out: W, store: Option<FixStore>) -> Self {
        Self { out, store }
    }
}

impl<W: Write> FixSink for PublisherSink<W> {
    fn publish(&mut self, event: FixEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Could not convert fix to JSON: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            log::warn!("Failed to publish fix: {e}");
        }
        if let Some(store) = &mut self.store {
            if let Err(e) = store.store(event.fix.captured_at(), line.as_bytes()) {
                log::warn!("Failed to store fix: {e}");
            }
        }
    }
}
