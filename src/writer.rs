use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use crate::config::{LogConfig, QueueInfo};
use crate::format;
use crate::queue::{PushOutcome, QueueMessage, RecordQueue};
use crate::record::Dispatch;
use crate::sink::{ConsoleSink, FileSink};

pub(crate) const SOURCE_FILE: &str = file!();

/// Idle flush interval for the queue consumer.
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// The sinks, owned by whichever thread currently writes: the calling
/// thread in direct mode, the single consumer thread in queue mode.
struct Sinks {
    console: ConsoleSink,
    file: Option<FileSink>,
    file_error_warned: AtomicBool,
}

impl Sinks {
    fn write(&self, dispatch: &Dispatch) {
        if dispatch.console {
            let line = format::render_line(&dispatch.record, true);
            let _ = self.console.write_line(&line);
        }
        if dispatch.file
            && let Some(file) = &self.file
            && let Err(e) = file.write_line(&format::render_line(&dispatch.record, false))
        {
            // Reported once; the writer keeps attempting later records.
            if !self.file_error_warned.swap(true, Ordering::Relaxed) {
                let _ = self
                    .console
                    .write_line(&format!("runlog: session file write failed: {e}"));
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.flush();
        }
    }
}

struct QueueState {
    queue: RecordQueue,
    consumer: Mutex<Option<JoinHandle<()>>>,
    done_rx: Receiver<()>,
    #[cfg(unix)]
    acceptor: Mutex<Option<JoinHandle<()>>>,
    #[cfg(unix)]
    accept_running: Option<Arc<AtomicBool>>,
    #[cfg(unix)]
    socket_path: Option<std::path::PathBuf>,
}

#[cfg(unix)]
struct ForwardState {
    client: crate::queue::ipc::SocketClient,
    fail_warned: AtomicBool,
}

enum Mode {
    Direct,
    Queue(QueueState),
    #[cfg(unix)]
    Forward(ForwardState),
}

/// Record pipeline back end. Exactly one logical consumer per session
/// performs file I/O; no second holder of the session file ever exists.
pub(crate) struct Writer {
    sinks: Arc<Sinks>,
    mode: Mode,
}

impl Writer {
    pub fn new(config: &LogConfig) -> io::Result<Writer> {
        // A worker forwarding to a remote writer must not open the
        // session file; the writer process owns it exclusively.
        #[cfg(unix)]
        let owns_file = !matches!(config.queue, QueueInfo::SocketConnect { .. });
        #[cfg(not(unix))]
        let owns_file = true;

        let file = match (&config.log_file, owns_file) {
            (Some(path), true) => Some(FileSink::new(path, config.flush_every)?),
            _ => None,
        };
        let sinks = Arc::new(Sinks {
            console: ConsoleSink::new(),
            file,
            file_error_warned: AtomicBool::new(false),
        });

        let mode = match &config.queue {
            QueueInfo::Direct => Mode::Direct,
            QueueInfo::Local { capacity } => {
                let (queue, rx) = RecordQueue::bounded(*capacity, config.backpressure);
                let (done_tx, done_rx) = bounded(1);
                let consumer = spawn_consumer(Arc::clone(&sinks), rx, done_tx);
                Mode::Queue(QueueState {
                    queue,
                    consumer: Mutex::new(Some(consumer)),
                    done_rx,
                    #[cfg(unix)]
                    acceptor: Mutex::new(None),
                    #[cfg(unix)]
                    accept_running: None,
                    #[cfg(unix)]
                    socket_path: None,
                })
            }
            #[cfg(unix)]
            QueueInfo::SocketServe { path, capacity } => {
                // A previous run may have left the socket file behind.
                let _ = std::fs::remove_file(path);
                let listener = std::os::unix::net::UnixListener::bind(path)?;

                let (queue, rx) = RecordQueue::bounded(*capacity, config.backpressure);
                let (done_tx, done_rx) = bounded(1);
                let consumer = spawn_consumer(Arc::clone(&sinks), rx, done_tx);
                let accept_running = Arc::new(AtomicBool::new(true));
                let acceptor = crate::queue::ipc::spawn_acceptor(
                    listener,
                    queue.sender(),
                    Arc::clone(&accept_running),
                )?;
                Mode::Queue(QueueState {
                    queue,
                    consumer: Mutex::new(Some(consumer)),
                    done_rx,
                    acceptor: Mutex::new(Some(acceptor)),
                    accept_running: Some(accept_running),
                    socket_path: Some(path.clone()),
                })
            }
            #[cfg(unix)]
            QueueInfo::SocketConnect { path } => Mode::Forward(ForwardState {
                client: crate::queue::ipc::SocketClient::connect(path)?,
                fail_warned: AtomicBool::new(false),
            }),
        };

        Ok(Writer { sinks, mode })
    }

    /// Hand one finished record to the pipeline: written under the sink
    /// locks in direct mode, enqueued otherwise.
    pub fn dispatch(&self, dispatch: Dispatch) {
        match &self.mode {
            Mode::Direct => self.sinks.write(&dispatch),
            Mode::Queue(state) => match state.queue.push(dispatch) {
                PushOutcome::Sent | PushOutcome::Stopped => {}
                PushOutcome::Dropped { warn } => {
                    if warn {
                        let _ = self.sinks.console.write_line(
                            "runlog: record queue full; dropping records (reported once)",
                        );
                    }
                }
            },
            #[cfg(unix)]
            Mode::Forward(state) => {
                if let Err(e) = state.client.send(&dispatch)
                    && !state.fail_warned.swap(true, Ordering::Relaxed)
                {
                    let _ = self
                        .sinks
                        .console
                        .write_line(&format!("runlog: forwarding to session writer failed: {e}"));
                }
            }
        }
    }

    /// Engine-internal report, console sink only. Used for swallowed
    /// format errors so a bad log call can never reach the session file
    /// out of band or crash the host.
    pub fn report_internal(&self, line: &str) {
        let _ = self.sinks.console.write_line(line);
    }

    /// Drain and close. Everything enqueued before this call is written
    /// before the sinks flush; waiting on the consumer is bounded by
    /// `drain_timeout`, and anything still in flight past the bound is
    /// reported rather than silently lost.
    pub fn shutdown(&self, drain_timeout: Duration) {
        match &self.mode {
            Mode::Direct => self.sinks.flush(),
            Mode::Queue(state) => {
                #[cfg(unix)]
                if let Some(flag) = &state.accept_running {
                    flag.store(false, Ordering::Release);
                }

                state.queue.push_shutdown();
                let drained = state.done_rx.recv_timeout(drain_timeout).is_ok();
                if let Some(consumer) = state.consumer.lock().take() {
                    if drained {
                        let _ = consumer.join();
                    } else {
                        eprintln!(
                            "runlog: teardown timed out after {drain_timeout:?} with records still queued"
                        );
                    }
                }

                #[cfg(unix)]
                {
                    if let Some(acceptor) = state.acceptor.lock().take() {
                        let _ = acceptor.join();
                    }
                    if let Some(path) = &state.socket_path {
                        let _ = std::fs::remove_file(path);
                    }
                }
            }
            #[cfg(unix)]
            Mode::Forward(state) => state.client.close(),
        }
    }
}

fn spawn_consumer(
    sinks: Arc<Sinks>,
    rx: Receiver<QueueMessage>,
    done_tx: Sender<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match rx.recv_timeout(FLUSH_INTERVAL) {
                Ok(QueueMessage::Record(dispatch)) => sinks.write(&dispatch),
                Ok(QueueMessage::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => sinks.flush(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Socket readers may still be forwarding frames that arrived
        // before their connections closed; take what is already here.
        while let Ok(QueueMessage::Record(dispatch)) = rx.try_recv() {
            sinks.write(&dispatch);
        }
        sinks.flush();
        let _ = done_tx.send(());
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::*;
    use crate::caller::CallerInfo;
    use crate::level::Level;
    use crate::record::LogRecord;

    fn file_dispatch(message: &str) -> Dispatch {
        let caller = CallerInfo {
            module_id: "writer_t".to_string(),
            line: 9,
        };
        Dispatch {
            record: LogRecord::new(Level::Info, "t", caller, message.to_string()),
            console: false,
            file: true,
        }
    }

    #[test]
    fn test_direct_mode_appends_to_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let config = LogConfig::default().with_log_file(&path);
        let writer = Writer::new(&config).unwrap();

        writer.dispatch(file_dispatch("direct hello"));
        writer.shutdown(Duration::from_secs(1));

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("direct hello"));
        assert!(contents.contains("writer_t:9"));
    }

    #[test]
    fn test_queue_mode_drains_everything_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let config = LogConfig::default()
            .with_log_file(&path)
            .with_queue(QueueInfo::Local { capacity: 512 });
        let writer = Writer::new(&config).unwrap();

        for i in 0..100 {
            writer.dispatch(file_dispatch(&format!("record {i}")));
        }
        writer.shutdown(Duration::from_secs(5));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 100);
        // FIFO arrival order, which for one producer is emission order.
        assert!(lines[0].contains("record 0"));
        assert!(lines[99].contains("record 99"));
    }

    #[test]
    fn test_dispatch_without_file_sink_is_harmless() {
        let config = LogConfig::default();
        let writer = Writer::new(&config).unwrap();
        writer.dispatch(file_dispatch("nowhere to go"));
        writer.shutdown(Duration::from_secs(1));
    }
}
