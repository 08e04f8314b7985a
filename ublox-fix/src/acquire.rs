use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use chrono::Utc;

use crate::{
    nmea::{parse_sentence, GeoFix, Sentence, FIX_REPORT_ID},
    sink::{FixEvent, FixSink, DEFAULT_FRAME_ID},
    transport::{ReadLine, Transport},
    ubx::UbxCommand,
    FixError, DEFAULT_READ_TIMEOUT, DEFAULT_SETTLE_DELAY,
};

#[derive(Debug, Clone, Default)]
/// Cooperative shutdown flag, shared between the loop and whoever stops it
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// Create an untriggered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
/// Tunables of the acquisition loop
pub struct AcquisitionConfig {
    /// Upper bound of a single line read, and so of the shutdown latency
    pub read_timeout: Duration,
    /// Pause after the configuration command before reading
    pub settle_delay: Duration,
    /// Label attached to every published fix
    pub frame_id: String,
    /// Command sent once before streaming
    pub command: UbxCommand,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            frame_id: DEFAULT_FRAME_ID.to_string(),
            command: UbxCommand::rate_10hz(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Lifecycle of an [`AcquisitionLoop`]
pub enum LoopState {
    /// Holding an open transport, not yet configured
    Connecting,
    /// Sending the configuration command
    Configuring,
    /// Reading and publishing fixes
    Streaming,
    /// Transport released; terminal
    Closed,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
/// Line counters of one run
pub struct StreamStats {
    /// Fixes published
    pub fixes: u64,
    /// Fix sentences that failed to decode
    pub malformed: u64,
    /// Other sentences, discarded
    pub ignored: u64,
    /// Reads that returned no line
    pub timeouts: u64,
}

/// Reads sentences from a transport and publishes decoded fixes.
///
/// The loop owns its transport and closes it exactly once: when [`run`]
/// returns, whatever the outcome, or when the loop is dropped.
///
/// [`run`]: AcquisitionLoop::run
pub struct AcquisitionLoop<T: Transport, S: FixSink> {
    transport: T,
    sink: S,
    shutdown: Shutdown,
    config: AcquisitionConfig,
    state: LoopState,
    stats: StreamStats,
}

impl<T: Transport, S: FixSink> AcquisitionLoop<T, S> {
    /// Take over an already open transport
    pub fn new(transport: T, sink: S, shutdown: Shutdown, config: AcquisitionConfig) -> Self {
        Self {
            transport,
            sink,
            shutdown,
            config,
            state: LoopState::Connecting,
            stats: StreamStats::default(),
        }
    }

    /// Acquire a transport with `open`, failing before any read if it cannot be opened
    pub fn connect<F>(
        open: F,
        sink: S,
        shutdown: Shutdown,
        config: AcquisitionConfig,
    ) -> Result<Self, FixError>
    where
        F: FnOnce() -> Result<T, FixError>,
    {
        Ok(Self::new(open()?, sink, shutdown, config))
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// The sink fixes are published to
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Configure the receiver, then publish fixes until shutdown or a transport failure.
    ///
    /// Malformed sentences are logged and skipped. Transport errors end the
    /// run and are returned once the transport is closed.
    pub fn run(&mut self) -> Result<StreamStats, FixError> {
        if self.state == LoopState::Closed {
            return Err(FixError::Closed);
        }
        let res = self.configure().and_then(|()| self.stream());
        self.close();
        match res {
            Ok(()) => {
                log::info!("Terminating GPS data publisher.");
                Ok(self.stats)
            }
            Err(e) => {
                log::error!("Terminating GPS data publisher: {e}");
                Err(e)
            }
        }
    }

    fn configure(&mut self) -> Result<(), FixError> {
        self.state = LoopState::Configuring;
        log::info!("Sending {:?} to the receiver...", self.config.command);
        self.transport.write_all(&self.config.command.frame())?;
        // no acknowledgment is read back, the receiver gets a fixed time to apply it
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }
        Ok(())
    }

    fn stream(&mut self) -> Result<(), FixError> {
        self.state = LoopState::Streaming;
        while !self.shutdown.is_triggered() {
            match self.transport.read_line(self.config.read_timeout)? {
                ReadLine::Timeout => {
                    self.stats.timeouts += 1;
                    log::debug!("No data within {:?}", self.config.read_timeout);
                }
                ReadLine::Line(line) => self.handle_line(line.trim()),
            }
        }
        log::info!("Shutdown requested.");
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        if !line.starts_with(FIX_REPORT_ID) {
            self.stats.ignored += 1;
            return;
        }
        match parse_sentence(line) {
            Sentence::Fix(pos) => {
                let fix = GeoFix::new(pos, Utc::now());
                log::info!(
                    "Published GPS data: Lat: {:.6}, Lon: {:.6}, Alt: {:.2} m",
                    fix.latitude_deg(),
                    fix.longitude_deg(),
                    fix.altitude_m()
                );
                self.sink.publish(FixEvent {
                    label: self.config.frame_id.clone(),
                    fix,
                });
                self.stats.fixes += 1;
            }
            Sentence::Malformed(e) => {
                self.stats.malformed += 1;
                log::warn!("Failed to parse NMEA sentence {line:?}: {e}");
            }
            Sentence::NotApplicable => {
                self.stats.ignored += 1;
                log::debug!("Ignoring {line:?}");
            }
        }
    }

    fn close(&mut self) {
        if self.state != LoopState::Closed {
            self.transport.close();
            self.state = LoopState::Closed;
        }
    }
}

impl<T: Transport, S: FixSink> Drop for AcquisitionLoop<T, S> {
    fn drop(&mut self) {
        self.close();
    }
}
