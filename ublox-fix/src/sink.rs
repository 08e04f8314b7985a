use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use serde::{Deserialize, Serialize};

use crate::GeoFix;

/// Default label attached to published fixes
pub const DEFAULT_FRAME_ID: &str = "gps";

/// Default capacity of a [`ChannelSink`]
pub const DEFAULT_QUEUE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A fix ready for delivery downstream
pub struct FixEvent {
    /// Fixed label identifying the source of the fix
    pub label: String,
    /// The fix itself
    #[serde(flatten)]
    pub fix: GeoFix,
}

/// Receives fixes for downstream delivery.
///
/// Publishing is fire-and-forget: a sink must not fail the caller, and any
/// back-pressure handling is up to the sink.
pub trait FixSink {
    /// Hand over one fix event
    fn publish(&mut self, event: FixEvent);
}

impl<F: FnMut(FixEvent)> FixSink for F {
    fn publish(&mut self, event: FixEvent) {
        self(event)
    }
}

/// A bounded queue of fix events. Events are dropped when the queue is full.
#[derive(Debug)]
pub struct ChannelSink {
    tx: SyncSender<FixEvent>,
    dropped: u64,
    disconnected: bool,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its queue
    pub fn new(queue_size: usize) -> (Self, Receiver<FixEvent>) {
        let (tx, rx) = mpsc::sync_channel(queue_size);
        (
            Self {
                tx,
                dropped: 0,
                disconnected: false,
            },
            rx,
        )
    }

    /// Number of events dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FixSink for ChannelSink {
    fn publish(&mut self, event: FixEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::warn!("Fix queue full, dropped {} events so far", self.dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                if !self.disconnected {
                    log::warn!("Fix queue receiver is gone, dropping fixes");
                    self.disconnected = true;
                }
            }
        }
    }
}
