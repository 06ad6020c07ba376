use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};

use crate::config::BackpressurePolicy;
use crate::record::Dispatch;

pub(crate) const SOURCE_FILE: &str = file!();

/// Messages flowing to the queue consumer.
pub(crate) enum QueueMessage {
    Record(Box<Dispatch>),
    /// Teardown marker. Everything enqueued ahead of it must reach the
    /// sinks before the consumer exits.
    Shutdown,
}

/// Outcome of an enqueue attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Sent,
    /// Overflow under the configured policy. `warn` is set exactly once
    /// per queue so the caller can emit the one-time console warning.
    Dropped { warn: bool },
    /// Consumer already gone (teardown finished); nothing to report.
    Stopped,
}

/// Producer handle over the bounded record queue. Cloneable across
/// threads; per-producer FIFO order is the channel's guarantee.
pub(crate) struct RecordQueue {
    tx: Sender<QueueMessage>,
    policy: BackpressurePolicy,
    drop_warned: AtomicBool,
}

impl RecordQueue {
    pub fn bounded(
        capacity: usize,
        policy: BackpressurePolicy,
    ) -> (RecordQueue, Receiver<QueueMessage>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            RecordQueue {
                tx,
                policy,
                drop_warned: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub(crate) fn sender(&self) -> Sender<QueueMessage> {
        self.tx.clone()
    }

    /// Enqueue one dispatch, honoring the backpressure policy. The wait
    /// under [`BackpressurePolicy::Block`] is the only point where a log
    /// call may suspend its caller, and it is bounded.
    pub fn push(&self, dispatch: Dispatch) -> PushOutcome {
        let message = QueueMessage::Record(Box::new(dispatch));
        let full = match self.policy {
            BackpressurePolicy::Drop => match self.tx.try_send(message) {
                Ok(()) => return PushOutcome::Sent,
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            },
            BackpressurePolicy::Block(timeout) => match self.tx.send_timeout(message, timeout) {
                Ok(()) => return PushOutcome::Sent,
                Err(SendTimeoutError::Timeout(_)) => true,
                Err(SendTimeoutError::Disconnected(_)) => false,
            },
        };
        if full {
            let warn = !self.drop_warned.swap(true, Ordering::Relaxed);
            PushOutcome::Dropped { warn }
        } else {
            PushOutcome::Stopped
        }
    }

    /// Push the teardown marker. Blocking is correct here: the consumer
    /// is live and draining, so room opens up; records already queued
    /// stay ahead of the marker.
    pub fn push_shutdown(&self) {
        let _ = self.tx.send(QueueMessage::Shutdown);
    }
}

/// Cross-process transport: workers forward records over one Unix socket
/// connection each; the writer side feeds every connection into the same
/// bounded channel, so interleaving is arrival order and lines are never
/// torn (complete-line frames, one writer for the file).
#[cfg(unix)]
pub(crate) mod ipc {
    use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
    use std::net::Shutdown;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use crossbeam_channel::Sender;
    use parking_lot::Mutex;

    use super::QueueMessage;
    use crate::record::Dispatch;

    /// Poll interval for the non-blocking accept loop.
    const ACCEPT_POLL: Duration = Duration::from_millis(50);

    /// Worker-side client: one connection, newline-delimited JSON frames,
    /// one lock so the process's records stay ordered.
    pub(crate) struct SocketClient {
        stream: Mutex<BufWriter<UnixStream>>,
    }

    impl SocketClient {
        pub fn connect(path: &Path) -> io::Result<SocketClient> {
            let stream = UnixStream::connect(path)?;
            Ok(SocketClient {
                stream: Mutex::new(BufWriter::new(stream)),
            })
        }

        pub fn send(&self, dispatch: &Dispatch) -> io::Result<()> {
            let frame = serde_json::to_string(dispatch).map_err(io::Error::other)?;
            let mut stream = self.stream.lock();
            stream.write_all(frame.as_bytes())?;
            stream.write_all(b"\n")?;
            stream.flush()
        }

        /// Flush and close the write half so the writer-side reader sees
        /// EOF and finishes this connection.
        pub fn close(&self) {
            let mut stream = self.stream.lock();
            let _ = stream.flush();
            let _ = stream.get_ref().shutdown(Shutdown::Write);
        }
    }

    /// Writer-side acceptor. Runs until `running` clears; each accepted
    /// connection gets its own reader thread that forwards frames into
    /// the consumer's channel and exits on EOF or when the consumer is
    /// gone.
    pub(crate) fn spawn_acceptor(
        listener: UnixListener,
        tx: Sender<QueueMessage>,
        running: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        listener.set_nonblocking(true)?;
        Ok(thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let tx = tx.clone();
                        thread::spawn(move || read_connection(stream, tx));
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                    Err(_) => break,
                }
            }
        }))
    }

    fn read_connection(stream: UnixStream, tx: Sender<QueueMessage>) {
        if stream.set_nonblocking(false).is_err() {
            return;
        }
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.is_empty() {
                continue;
            }
            // A frame that does not parse came from a mismatched peer;
            // skip it rather than poison the whole connection.
            let Ok(dispatch) = serde_json::from_str::<Dispatch>(&line) else {
                continue;
            };
            if tx.send(QueueMessage::Record(Box::new(dispatch))).is_err() {
                break;
            }
        }
    }
}
