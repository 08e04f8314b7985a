use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, ErrorKind},
    panic::{self, AssertUnwindSafe},
    rc::Rc,
    time::Duration,
};

use ublox_fix::{
    AcquisitionConfig, AcquisitionLoop, ChannelSink, FixError, FixEvent, LineReader, LoopState,
    ReadLine, Shutdown, StreamStats, Transport, UbxCommand,
};

const SCENARIO_A: &str = "$GNGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,,,,";
const SCENARIO_B: &str = "$GNGGA,123519,4807.038,S,01131.000,W,1,08,0.9,545.4,M,,,,";
const SCENARIO_C: &str = "$GPGLL,4916.45,N,12311.12,W,225444,A";
const SCENARIO_D: &str = "$GNGGA,bad,data";

#[derive(Default)]
struct Record {
    written: Vec<u8>,
    reads: usize,
    closes: usize,
}

/// Plays back scripted reads, then requests shutdown once the script runs dry
struct MockTransport {
    script: VecDeque<io::Result<ReadLine>>,
    write_error: Option<io::Error>,
    shutdown: Shutdown,
    record: Rc<RefCell<Record>>,
}

impl MockTransport {
    fn new(script: Vec<io::Result<ReadLine>>, shutdown: &Shutdown) -> (Self, Rc<RefCell<Record>>) {
        let record = Rc::new(RefCell::new(Record::default()));
        (
            Self {
                script: script.into(),
                write_error: None,
                shutdown: shutdown.clone(),
                record: record.clone(),
            },
            record,
        )
    }
}

impl Transport for MockTransport {
    fn read_line(&mut self, _timeout: Duration) -> io::Result<ReadLine> {
        self.record.borrow_mut().reads += 1;
        self.script.pop_front().unwrap_or_else(|| {
            self.shutdown.trigger();
            Ok(ReadLine::Timeout)
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(e) = self.write_error.take() {
            return Err(e);
        }
        self.record.borrow_mut().written.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.record.borrow_mut().closes += 1;
    }
}

fn line(s: &str) -> io::Result<ReadLine> {
    Ok(ReadLine::Line(s.to_string()))
}

fn config() -> AcquisitionConfig {
    AcquisitionConfig {
        settle_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn events(rx: &std::sync::mpsc::Receiver<FixEvent>) -> Vec<FixEvent> {
    rx.try_iter().collect()
}

#[test]
fn publishes_fixes_and_skips_noise() {
    let shutdown = Shutdown::new();
    let (transport, record) = MockTransport::new(
        vec![
            line(SCENARIO_A),
            line(SCENARIO_C),
            Ok(ReadLine::Timeout),
            line(SCENARIO_D),
            line(&format!("  {SCENARIO_B}\r")),
        ],
        &shutdown,
    );
    let (sink, rx) = ChannelSink::new(16);
    let mut acq = AcquisitionLoop::new(transport, sink, shutdown, config());

    let stats = acq.run().unwrap();

    assert_eq!(
        stats,
        StreamStats {
            fixes: 2,
            malformed: 1,
            ignored: 1,
            timeouts: 2,
        }
    );
    let fixes = events(&rx);
    assert_eq!(fixes.len(), 2);
    assert!(fixes.iter().all(|ev| ev.label == "gps"));
    assert!((fixes[0].fix.latitude_deg() - 48.1173).abs() < 1e-4);
    assert!((fixes[0].fix.longitude_deg() - 11.5167).abs() < 1e-4);
    assert_eq!(fixes[0].fix.altitude_m(), 545.4);
    assert!((fixes[1].fix.latitude_deg() + 48.1173).abs() < 1e-4);
    assert!((fixes[1].fix.longitude_deg() + 11.5167).abs() < 1e-4);
    assert!(fixes[0].fix.captured_at() <= fixes[1].fix.captured_at());

    assert_eq!(acq.state(), LoopState::Closed);
    assert_eq!(record.borrow().closes, 1);
    assert_eq!(record.borrow().written, UbxCommand::rate_10hz().frame());
}

#[test]
fn unrecognized_sentence_emits_nothing() {
    let shutdown = Shutdown::new();
    let (transport, _record) = MockTransport::new(vec![line(SCENARIO_C)], &shutdown);
    let (sink, rx) = ChannelSink::new(4);
    let stats = AcquisitionLoop::new(transport, sink, shutdown, config())
        .run()
        .unwrap();
    assert_eq!(stats.fixes, 0);
    assert_eq!(stats.malformed, 0);
    assert!(events(&rx).is_empty());
}

#[test]
fn io_error_mid_stream_closes_once_and_propagates() {
    let shutdown = Shutdown::new();
    let (transport, record) = MockTransport::new(
        vec![
            line(SCENARIO_A),
            Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged")),
            line(SCENARIO_B),
        ],
        &shutdown,
    );
    let (sink, rx) = ChannelSink::new(4);
    let mut acq = AcquisitionLoop::new(transport, sink, shutdown, config());

    let err = acq.run().unwrap_err();
    assert!(matches!(&err, FixError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    assert_eq!(acq.state(), LoopState::Closed);
    assert_eq!(acq.stats().fixes, 1);
    assert_eq!(events(&rx).len(), 1);
    assert_eq!(record.borrow().reads, 2);

    drop(acq);
    assert_eq!(record.borrow().closes, 1);
}

#[test]
fn write_error_closes_before_reading() {
    let shutdown = Shutdown::new();
    let (mut transport, record) = MockTransport::new(vec![line(SCENARIO_A)], &shutdown);
    transport.write_error = Some(io::Error::new(ErrorKind::PermissionDenied, "read-only"));
    let (sink, _rx) = ChannelSink::new(4);
    let mut acq = AcquisitionLoop::new(transport, sink, shutdown, config());

    assert!(matches!(acq.run(), Err(FixError::Io(_))));
    assert_eq!(record.borrow().reads, 0);
    assert_eq!(record.borrow().closes, 1);
}

#[test]
fn shutdown_before_streaming() {
    let shutdown = Shutdown::new();
    let (transport, record) = MockTransport::new(vec![line(SCENARIO_A)], &shutdown);
    shutdown.trigger();
    let (sink, rx) = ChannelSink::new(4);
    let mut acq = AcquisitionLoop::new(transport, sink, shutdown, config());

    assert_eq!(acq.run().unwrap(), StreamStats::default());
    assert!(events(&rx).is_empty());
    assert_eq!(record.borrow().reads, 0);
    assert_eq!(record.borrow().closes, 1);
    assert!(matches!(acq.run(), Err(FixError::Closed)));
    assert_eq!(record.borrow().closes, 1);
}

#[test]
fn dropping_an_unused_loop_closes_the_transport() {
    let shutdown = Shutdown::new();
    let (transport, record) = MockTransport::new(vec![], &shutdown);
    let acq = AcquisitionLoop::new(transport, |_ev: FixEvent| {}, shutdown, config());
    assert_eq!(acq.state(), LoopState::Connecting);
    drop(acq);
    assert_eq!(record.borrow().closes, 1);
}

#[test]
fn panicking_sink_still_closes_the_transport() {
    let shutdown = Shutdown::new();
    let (transport, record) = MockTransport::new(vec![line(SCENARIO_A)], &shutdown);
    let sink = |_ev: FixEvent| panic!("downstream exploded");
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        AcquisitionLoop::new(transport, sink, shutdown, config()).run()
    }));
    assert!(res.is_err());
    assert_eq!(record.borrow().closes, 1);
}

#[test]
fn connect_fails_fast() {
    let shutdown = Shutdown::new();
    let res = AcquisitionLoop::<MockTransport, _>::connect(
        || Err(FixError::Io(io::Error::new(ErrorKind::NotFound, "/dev/ttyACM0"))),
        |_ev: FixEvent| {},
        shutdown,
        config(),
    );
    assert!(matches!(res, Err(FixError::Io(_))));
}

#[test]
fn custom_label_and_command() {
    let shutdown = Shutdown::new();
    let (transport, record) = MockTransport::new(vec![line(SCENARIO_A)], &shutdown);
    let (sink, rx) = ChannelSink::new(4);
    let config = AcquisitionConfig {
        frame_id: "base_link".into(),
        command: UbxCommand::rate_hz(5),
        ..config()
    };
    AcquisitionLoop::new(transport, sink, shutdown, config)
        .run()
        .unwrap();
    assert_eq!(events(&rx)[0].label, "base_link");
    assert_eq!(record.borrow().written, UbxCommand::rate_hz(5).frame());
}

/// Serves a fixed byte stream through the line reassembly used on real ports
struct StreamTransport(LineReader<io::Cursor<Vec<u8>>>);

impl Transport for StreamTransport {
    fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine> {
        self.0.read_line(timeout)
    }

    fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

#[test]
fn truncated_last_sentence_publishes_nothing() {
    let stream = format!("{SCENARIO_A}\r\n$GNGGA,123519,4807.038,N,01131.000,E,1,08,0.9,54");
    let transport = StreamTransport(LineReader::new(io::Cursor::new(stream.into_bytes())));
    let (sink, rx) = ChannelSink::new(4);
    let mut acq = AcquisitionLoop::new(transport, sink, Shutdown::new(), config());

    let err = acq.run().unwrap_err();
    assert!(matches!(&err, FixError::Io(e) if e.kind() == ErrorKind::UnexpectedEof));
    assert_eq!(acq.stats().fixes, 1);
    let fixes = events(&rx);
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].fix.altitude_m(), 545.4);
}
