use std::{
    io::{self, ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use serialport::SerialPort;

use crate::FixError;

/// Longest run of bytes kept while waiting for a line terminator
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of a bounded line read
pub enum ReadLine {
    /// A complete line, without its terminator
    Line(String),
    /// No complete line arrived before the timeout
    Timeout,
}

/// Byte stream connected to a receiver.
pub trait Transport {
    /// Read one line, waiting at most `timeout`. Invalid UTF-8 is replaced, not rejected.
    fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine>;
    /// Write raw bytes to the receiver
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Release the underlying device. Further reads and writes fail.
    fn close(&mut self);
}

/// Reassembles newline-terminated lines from a chunked byte stream.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    /// Wrap a byte source
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Underlying byte source
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Mutable access to the underlying byte source
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Read until a full line is buffered or `timeout` elapses.
    ///
    /// A source timeout (`ErrorKind::TimedOut`) counts as no data; partial
    /// lines stay buffered for the next call. End of stream fails with
    /// `UnexpectedEof`; an unterminated tail is discarded, never returned.
    pub fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadLine::Line(line));
            }
            let mut tmp = [0; 1024];
            match self.reader.read(&mut tmp) {
                Ok(0) => {
                    if !self.buf.is_empty() {
                        log::warn!(
                            "Discarding {} bytes of an unterminated line at end of stream",
                            self.buf.len()
                        );
                        self.buf.clear();
                    }
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "Receiver stream ended",
                    ));
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&tmp[..n]);
                    if self.buf.len() > MAX_LINE_LEN && !self.buf.contains(&b'\n') {
                        log::warn!(
                            "Discarding {} bytes without a line terminator",
                            self.buf.len()
                        );
                        self.buf.clear();
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(ReadLine::Timeout),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(self
                    .take_line()
                    .map(ReadLine::Line)
                    .unwrap_or(ReadLine::Timeout));
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let line = self.buf.drain(..=end).collect::<Vec<_>>();
        Some(decode(&line))
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// A receiver attached to a serial port.
pub struct SerialTransport {
    port_name: String,
    reader: Option<LineReader<Box<dyn SerialPort>>>,
}

impl SerialTransport {
    /// Open `port` at `baud_rate`.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, FixError> {
        let serial_port = serialport::new(port, baud_rate)
            .timeout(crate::DEFAULT_READ_TIMEOUT)
            .open()
            .map_err(|source| FixError::Open {
                port: port.to_string(),
                source,
            })?;
        log::info!("Connected to GPS module on {port} at {baud_rate} bps.");
        Ok(Self {
            port_name: port.to_string(),
            reader: Some(LineReader::new(serial_port)),
        })
    }

    /// Name of the serial device
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn reader(&mut self) -> io::Result<&mut LineReader<Box<dyn SerialPort>>> {
        self.reader.as_mut().ok_or_else(|| {
            io::Error::new(ErrorKind::NotConnected, "Serial port already closed")
        })
    }
}

impl Transport for SerialTransport {
    fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine> {
        let reader = self.reader()?;
        // a port timeout longer than ours would make the deadline unobservable
        if reader.get_ref().timeout() > timeout {
            reader.get_mut().set_timeout(timeout)?;
        }
        reader.read_line(timeout)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.reader()?.get_mut();
        port.write_all(bytes)?;
        port.flush()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            log::info!("Serial connection {} closed.", self.port_name);
        }
    }
}
