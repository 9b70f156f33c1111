//! The ingestion loop: transport reads, validation, buffering, persistence,
//! and the fault-signal feedback path.
//!
//! One dedicated thread owns the transport, the [`CsvLog`] handle, and the
//! writer side of [`History`] for the lifetime of the process. Rejected
//! frames are discarded and answered with a fault signal; they are never
//! buffered or retried, since there is nothing to re-request from a
//! streaming device. The next line read is the next opportunity for
//! correct data.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::errors::{FrameError, IngestError, Result};
use crate::history::History;
use crate::protocol::{self, Reading, FAULT_COMMAND};
use crate::storage::CsvLog;

/// Bound on a blocking transport read. Keeps the loop responsive to stop
/// requests and turns an idle feed into a periodic "no data" tick.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default device baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ============================================================================
// Transport
// ============================================================================

/// Trait for Read + Write + Send, allowing different transport backends.
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

/// Open the device serial port with the loop's read timeout applied.
pub fn open_port(path: &str, baud: u32) -> Result<Box<dyn Transport>> {
    let port = serialport::new(path, baud).timeout(READ_TIMEOUT).open()?;
    info!("opened serial port {path} at {baud} baud");
    Ok(Box::new(port))
}

// ============================================================================
// Collector
// ============================================================================

/// Outcome of one attempt to pull a line off the transport.
enum LineEvent {
    Line(String),
    Idle,
    Closed,
}

/// The ingestion pipeline: owns the transport, the log writer, and the
/// writer side of the history buffer.
pub struct Collector {
    transport: Box<dyn Transport>,
    history: History,
    log: CsvLog,
    pending: Vec<u8>,
}

impl Collector {
    pub fn new(transport: Box<dyn Transport>, history: History, log: CsvLog) -> Self {
        Self {
            transport,
            history,
            log,
            pending: Vec::new(),
        }
    }

    /// Spawn the ingestion thread and hand back its lifecycle handle.
    pub fn start(self) -> CollectorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            let mut collector = self;
            collector.run(&flag)
        });
        CollectorHandle { stop, thread }
    }

    /// Run the loop on the current thread until the transport closes, a
    /// fatal error occurs, or `stop` is raised.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            match self.read_line() {
                Ok(LineEvent::Line(line)) => self.handle_line(&line)?,
                Ok(LineEvent::Idle) => debug!("no data received from device"),
                Ok(LineEvent::Closed) => {
                    info!("transport closed, ingestion finished");
                    return Ok(());
                }
                Err(e) => {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    return Err(IngestError::Transport(e));
                }
            }
        }
        debug!("stop requested, ingestion loop exiting");
        Ok(())
    }

    /// Pull one newline-terminated line off the transport.
    ///
    /// Bytes are accumulated across reads, so a frame split over several
    /// reads reassembles. A read timeout with no complete line is `Idle`;
    /// a zero-byte read means the transport is gone.
    fn read_line(&mut self) -> io::Result<LineEvent> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(LineEvent::Line(String::from_utf8_lossy(&line).into_owned()));
            }

            let mut buf = [0u8; 256];
            match self.transport.read(&mut buf) {
                Ok(0) => {
                    if self.pending.is_empty() {
                        return Ok(LineEvent::Closed);
                    }
                    // Unterminated tail before close still counts as a line.
                    let line: Vec<u8> = self.pending.drain(..).collect();
                    return Ok(LineEvent::Line(String::from_utf8_lossy(&line).into_owned()));
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(LineEvent::Idle)
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate one line end to end; accepted readings go to the history
    /// buffer and the durable log. Only persistence failures propagate.
    fn handle_line(&mut self, line: &str) -> Result<()> {
        let payload = match protocol::decode_frame(line) {
            Ok((payload, _)) => payload,
            Err(FrameError::EmptyLine) => {
                // Idle tick, not corruption; no fault signal.
                debug!("no data received from device");
                return Ok(());
            }
            Err(e) => {
                warn!("frame rejected: {e}");
                self.signal_fault();
                return Ok(());
            }
        };

        let values = match protocol::decode_payload(payload) {
            Ok(values) => values,
            Err(e) => {
                warn!("payload rejected: {e}");
                self.signal_fault();
                return Ok(());
            }
        };

        let reading = Reading::stamped_now(values);
        self.history.append(reading.clone());
        self.log.append(&reading)?;
        debug!(
            "accepted reading: T={:.2} HUM={:.2} PRES={:.2} LUX={:.2} WIND={:.2}",
            reading.values.temperature,
            reading.values.humidity,
            reading.values.pressure,
            reading.values.illuminance,
            reading.values.wind_speed,
        );
        Ok(())
    }

    /// Tell the device the last frame was bad. Fire and forget: a failed
    /// write here must not stop ingestion of subsequent frames.
    fn signal_fault(&mut self) {
        let result = self
            .transport
            .write_all(format!("{FAULT_COMMAND}\n").as_bytes())
            .and_then(|()| self.transport.flush());
        if let Err(e) = result {
            warn!("failed to send {FAULT_COMMAND} fault signal: {e}");
        }
    }
}

// ============================================================================
// Lifecycle handle
// ============================================================================

/// Handle to a running ingestion thread. Owned by the process entry point;
/// dropping it detaches the thread, so call [`stop`](Self::stop) or
/// [`join`](Self::join) for a clean shutdown.
pub struct CollectorHandle {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<Result<()>>,
}

impl CollectorHandle {
    /// Request shutdown and wait for the loop to finish its iteration.
    /// The read timeout bounds how long this blocks.
    pub fn stop(self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        self.join()
    }

    /// Wait for the loop to exit on its own (closed transport or fatal
    /// error) and surface its result.
    pub fn join(self) -> Result<()> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => Err(IngestError::Transport(io::Error::other(
                "ingestion thread panicked",
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, xor_checksum, Channel};
    use std::io::Cursor;
    use std::sync::Mutex;

    const PAYLOAD: &str = "T:21.50 HUM:45.00 PRES:1013.20 LUX:300.00 WIND:1.20";

    /// In-memory transport: scripted input, shared capture of device-bound
    /// writes. `chunk` caps bytes per read to emulate trickling input.
    struct ScriptedTransport {
        input: Cursor<Vec<u8>>,
        sent: Arc<Mutex<Vec<u8>>>,
        chunk: usize,
    }

    impl ScriptedTransport {
        fn new(lines: &[&str]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let mut input = Vec::new();
            for line in lines {
                input.extend_from_slice(line.as_bytes());
                input.push(b'\n');
            }
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    input: Cursor::new(input),
                    sent: Arc::clone(&sent),
                    chunk: usize::MAX,
                },
                sent,
            )
        }
    }

    impl Read for ScriptedTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let cap = buf.len().min(self.chunk);
            self.input.read(&mut buf[..cap])
        }
    }

    impl Write for ScriptedTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        history: History,
        sent: Arc<Mutex<Vec<u8>>>,
        log_path: std::path::PathBuf,
        _dir: tempfile::TempDir,
        collector: Collector,
    }

    fn fixture(lines: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.csv");
        let log = CsvLog::create(&log_path).unwrap();
        let history = History::with_capacity(16);
        let (transport, sent) = ScriptedTransport::new(lines);
        let collector = Collector::new(Box::new(transport), history.clone(), log);
        Fixture {
            history,
            sent,
            log_path,
            _dir: dir,
            collector,
        }
    }

    fn fault_count(sent: &Arc<Mutex<Vec<u8>>>) -> usize {
        let sent = sent.lock().unwrap();
        let text = String::from_utf8_lossy(&sent);
        text.matches("LED_ON\n").count()
    }

    fn log_lines(path: &std::path::Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn valid_frame_is_accepted() {
        let mut fx = fixture(&[&encode_frame(PAYLOAD)]);
        fx.collector.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(fx.history.len(), 1);
        assert_eq!(fx.history.snapshot(Channel::Temperature, 10), vec![21.50]);
        assert_eq!(log_lines(&fx.log_path), 2);
        assert_eq!(fault_count(&fx.sent), 0);
    }

    #[test]
    fn checksum_mismatch_signals_fault_and_persists_nothing() {
        let bad = u32::from(xor_checksum(PAYLOAD)) ^ 0xFF;
        let line = format!("{PAYLOAD} CHK:{bad:02X}");
        let mut fx = fixture(&[&line]);
        fx.collector.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(fx.history.len(), 0);
        assert_eq!(log_lines(&fx.log_path), 1);
        assert_eq!(fault_count(&fx.sent), 1);
    }

    #[test]
    fn unknown_key_signals_fault() {
        // Valid checksum over a payload whose WIND token was replaced.
        let payload = "T:21.5 HUM:45 PRES:1013 LUX:300 EXTRA:9";
        let mut fx = fixture(&[&encode_frame(payload)]);
        fx.collector.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(fx.history.len(), 0);
        assert_eq!(fault_count(&fx.sent), 1);
    }

    #[test]
    fn blank_line_is_idle_not_fault() {
        let mut fx = fixture(&["", "   "]);
        fx.collector.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(fx.history.len(), 0);
        assert_eq!(fault_count(&fx.sent), 0);
    }

    #[test]
    fn loop_continues_past_rejected_frames() {
        let first = encode_frame(PAYLOAD);
        let garbled = format!("{PAYLOAD} CHK:zz");
        let second = encode_frame("T:22.00 HUM:46.00 PRES:1012.00 LUX:280.00 WIND:2.00");
        let mut fx = fixture(&[&first, &garbled, &second]);
        fx.collector.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(fx.history.len(), 2);
        assert_eq!(
            fx.history.snapshot(Channel::Temperature, 10),
            vec![21.50, 22.00]
        );
        assert_eq!(log_lines(&fx.log_path), 3);
        assert_eq!(fault_count(&fx.sent), 1);
    }

    #[test]
    fn frame_split_across_reads_reassembles() {
        // Trickle the bytes seven at a time; the assembler must join on the
        // newline, not on read boundaries.
        let (mut transport, _sent) = ScriptedTransport::new(&[&encode_frame(PAYLOAD)]);
        transport.chunk = 7;

        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::create(dir.path().join("log.csv")).unwrap();
        let history = History::with_capacity(4);
        let mut collector = Collector::new(Box::new(transport), history.clone(), log);
        collector.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(history.len(), 1);
    }

    #[test]
    fn stop_flag_prevents_further_reads() {
        let mut fx = fixture(&[&encode_frame(PAYLOAD)]);
        let stop = AtomicBool::new(true);
        fx.collector.run(&stop).unwrap();

        assert_eq!(fx.history.len(), 0);
    }

    #[test]
    fn start_and_stop_lifecycle() {
        let fx = fixture(&[&encode_frame(PAYLOAD)]);
        let history = fx.history.clone();
        let handle = fx.collector.start();
        // Scripted input ends immediately, so the thread finishes on its own.
        handle.join().unwrap();
        assert_eq!(history.len(), 1);
    }
}
