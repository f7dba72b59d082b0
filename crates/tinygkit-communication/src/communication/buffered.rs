//! Flow-controlled command writer
//!
//! Streams queued commands to the controller without overrunning its serial
//! receive buffer. Every transmitted byte is debited from the shared
//! [`BufferAccounting`] budget; footers on the responses credit it back. When
//! a command does not fit, the worker waits on the accounting condition until
//! enough space returns or the queue is cleared.
//!
//! Priority writes (feed hold, resume, queue flush, reset) skip the queue and
//! the budget entirely and may land between queued commands.

use crate::communication::accounting::{BufferAccounting, Reservation};
use crate::communication::serial::Transport;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tinygkit_core::{ConnectionError, EventDispatcher, Result, RoutingEvent};

/// Legacy marker that ends a file send
pub const FILE_DONE_SENTINEL: &str = "**FILEDONE**";

/// Legacy prefix of a comment meant for display only
pub const COMMENT_SENTINEL: &str = "**COMMENT**";

/// What a queued command carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    /// Bytes for the controller
    Data(String),
    /// End of a streamed file; never transmitted
    FileComplete,
    /// Comment for display; never transmitted
    Comment(String),
}

/// A command for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    /// Payload
    pub payload: CommandPayload,
    /// Bypass the queue and the budget
    pub priority: bool,
}

impl OutboundCommand {
    /// Ordinary queued command; recognizes the legacy sentinel strings
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let payload = if text.trim_end() == FILE_DONE_SENTINEL {
            CommandPayload::FileComplete
        } else if let Some(comment) = text.strip_prefix(COMMENT_SENTINEL) {
            CommandPayload::Comment(comment.trim_end().to_string())
        } else {
            CommandPayload::Data(text)
        };
        Self {
            payload,
            priority: false,
        }
    }

    /// Command for the priority path
    pub fn priority(text: impl Into<String>) -> Self {
        Self {
            payload: CommandPayload::Data(text.into()),
            priority: true,
        }
    }

    /// File-complete marker
    pub fn file_complete() -> Self {
        Self {
            payload: CommandPayload::FileComplete,
            priority: false,
        }
    }

    /// Display-only comment
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            payload: CommandPayload::Comment(text.into()),
            priority: false,
        }
    }

    /// Bytes to put on the wire: the payload terminated by exactly one `\n`
    pub fn wire_bytes(&self) -> Option<Vec<u8>> {
        match &self.payload {
            CommandPayload::Data(text) => {
                let mut line = text.trim_end_matches(['\r', '\n']).to_string();
                line.push('\n');
                Some(line.into_bytes())
            }
            _ => None,
        }
    }
}

/// Something that accepts outbound commands
pub trait CommandSink: Send + Sync {
    /// Queue a command; returns false if it was refused
    fn enqueue(&self, command: OutboundCommand) -> bool;
}

/// A queued command stamped with the clear epoch it was queued under
#[derive(Debug)]
struct Queued {
    command: OutboundCommand,
    epoch: u64,
}

/// Outbound channel for one session. The writer keeps a receiver clone so it
/// can drain the queue; dropping the whole pair disconnects the worker.
struct SessionQueue {
    tx: Sender<Queued>,
    rx: Receiver<Queued>,
}

/// Writer worker plus its queue
pub struct FlowControlledWriter {
    accounting: Arc<BufferAccounting>,
    queue: Mutex<Option<SessionQueue>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    events: EventDispatcher,
    sending_file: AtomicBool,
    bytes_sent: AtomicU64,
}

impl FlowControlledWriter {
    /// Create a writer with no transport attached
    pub fn new(accounting: Arc<BufferAccounting>, events: EventDispatcher) -> Self {
        Self {
            accounting,
            queue: Mutex::new(None),
            transport: RwLock::new(None),
            events,
            sending_file: AtomicBool::new(false),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Attach a transport and open a fresh queue for a new session
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
        let (tx, rx) = crossbeam_channel::unbounded();
        *self.queue.lock() = Some(SessionQueue { tx, rx });
        self.sending_file.store(false, Ordering::SeqCst);
    }

    /// Close the queue, cancel any waiting command and drop the transport
    pub fn detach(&self) {
        let queue = self.queue.lock().take();
        self.accounting.clear();
        let dropped = queue.map_or(0, |queue| queue.rx.try_iter().count());
        if dropped > 0 {
            tracing::debug!("Dropped {} queued commands on detach", dropped);
        }
        self.transport.write().take();
        self.sending_file.store(false, Ordering::SeqCst);
    }

    /// Start the worker thread for the attached session
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let rx = self
            .queue
            .lock()
            .as_ref()
            .map(|queue| queue.rx.clone())
            .ok_or(ConnectionError::NotConnected)?;
        let writer = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("tinyg-writer".to_string())
            .spawn(move || writer.run(rx))?;
        Ok(handle)
    }

    /// Worker loop; returns once the session's queue is dropped
    fn run(&self, rx: Receiver<Queued>) {
        tracing::debug!("Writer worker started");
        while let Ok(queued) = rx.recv() {
            self.process(queued);
        }
        tracing::debug!("Writer worker stopped");
    }

    fn process(&self, queued: Queued) {
        let Queued { command, epoch } = queued;
        match command.payload {
            CommandPayload::FileComplete => {
                self.sending_file.store(false, Ordering::SeqCst);
                self.events.emit(RoutingEvent::FileSendComplete);
            }
            CommandPayload::Comment(text) => {
                self.events.emit(RoutingEvent::Comment(text));
            }
            CommandPayload::Data(_) => {
                let Some(bytes) = command.wire_bytes() else {
                    return;
                };
                match self.accounting.reserve(bytes.len(), epoch) {
                    Reservation::Cleared => {
                        tracing::debug!(
                            "Queue cleared; dropped {:?}",
                            String::from_utf8_lossy(&bytes).trim_end()
                        );
                    }
                    Reservation::Granted { remaining } => {
                        tracing::debug!(
                            "Sending {:?} (budget {})",
                            String::from_utf8_lossy(&bytes).trim_end(),
                            remaining
                        );
                        if let Err(e) = self.transmit(&bytes) {
                            self.handle_transport_failure(e);
                        }
                    }
                }
            }
        }
    }

    fn transmit(&self, bytes: &[u8]) -> Result<()> {
        let transport = self
            .transport
            .read()
            .clone()
            .ok_or(ConnectionError::NotConnected)?;
        transport.write_bytes(bytes)?;
        self.bytes_sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Bump the clear epoch and drain the queue. The queue lock is held
    /// throughout so nothing is stamped with the old epoch afterwards.
    fn drain(&self) -> usize {
        let queue = self.queue.lock();
        self.accounting.clear();
        queue
            .as_ref()
            .map_or(0, |queue| queue.rx.try_iter().count())
    }

    fn handle_transport_failure(&self, err: tinygkit_core::Error) {
        tracing::error!("Serial write failed: {}", err);
        let dropped = self.drain();
        self.sending_file.store(false, Ordering::SeqCst);
        tracing::warn!("Dropped {} queued commands after write failure", dropped);
        self.events
            .emit(RoutingEvent::ConnectionLost(format!("write failed: {}", err)));
    }

    /// Queue a command; priority commands are written immediately instead
    pub fn write(&self, command: OutboundCommand) -> Result<()> {
        if command.priority {
            return match command.wire_bytes() {
                Some(bytes) => self.priority_write(&bytes),
                None => Ok(()),
            };
        }
        let queue = self.queue.lock();
        let queue = queue.as_ref().ok_or(ConnectionError::NotConnected)?;
        let epoch = self.accounting.clear_epoch();
        queue
            .tx
            .send(Queued { command, epoch })
            .map_err(|_| ConnectionError::NotConnected)?;
        Ok(())
    }

    /// Write bytes now, bypassing queue and budget
    pub fn priority_write(&self, bytes: &[u8]) -> Result<()> {
        tracing::debug!("Priority write {:?}", String::from_utf8_lossy(bytes));
        self.transmit(bytes)
    }

    /// Set the throttle flag
    pub fn set_throttled(&self, throttled: bool) {
        self.accounting.set_throttled(throttled);
    }

    /// Credit freed device buffer space
    pub fn add_bytes_returned(&self, n: usize) -> usize {
        self.accounting.add_bytes_returned(n)
    }

    /// Budget back to capacity
    pub fn reset_buffer(&self) {
        self.accounting.reset_buffer();
    }

    /// Drop everything queued and release a throttled waiter without sending
    pub fn clear_queue_buffer(&self) {
        let dropped = self.drain();
        self.sending_file.store(false, Ordering::SeqCst);
        tracing::debug!("Cleared {} queued commands", dropped);
    }

    /// Mark the start of a file stream
    pub fn begin_file_send(&self) {
        self.sending_file.store(true, Ordering::SeqCst);
    }

    /// True from `begin_file_send` until the file-complete marker is dequeued
    pub fn is_sending_file(&self) -> bool {
        self.sending_file.load(Ordering::SeqCst)
    }

    /// Number of queued commands
    pub fn queued_len(&self) -> usize {
        self.queue.lock().as_ref().map_or(0, |queue| queue.rx.len())
    }

    /// Current budget
    pub fn budget(&self) -> usize {
        self.accounting.budget()
    }

    /// Total bytes written by the worker
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

impl CommandSink for FlowControlledWriter {
    fn enqueue(&self, command: OutboundCommand) -> bool {
        self.write(command).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Default)]
    struct RecordingTransport {
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl Transport for RecordingTransport {
        fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
            self.writes.lock().push(data.to_vec());
            Ok(())
        }

        fn read_bytes(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn name(&self) -> String {
            "recording".to_string()
        }

        fn close(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn take_queued(writer: &FlowControlledWriter) -> Queued {
        let queue = writer.queue.lock();
        queue.as_ref().unwrap().rx.try_recv().unwrap()
    }

    #[test]
    fn test_sentinels_recognized() {
        assert_eq!(
            OutboundCommand::new("**FILEDONE**").payload,
            CommandPayload::FileComplete
        );
        assert_eq!(
            OutboundCommand::new("**COMMENT**tool change\n").payload,
            CommandPayload::Comment("tool change".to_string())
        );
        assert_eq!(
            OutboundCommand::new("G0 X1").payload,
            CommandPayload::Data("G0 X1".to_string())
        );
    }

    #[test]
    fn test_wire_bytes_single_newline() {
        assert_eq!(
            OutboundCommand::new("G0 X1").wire_bytes().unwrap(),
            b"G0 X1\n".to_vec()
        );
        assert_eq!(
            OutboundCommand::new("G0 X1\r\n").wire_bytes().unwrap(),
            b"G0 X1\n".to_vec()
        );
        assert!(OutboundCommand::comment("x").wire_bytes().is_none());
    }

    #[test]
    fn test_write_refused_when_detached() {
        let writer = FlowControlledWriter::new(
            Arc::new(BufferAccounting::new(100, false)),
            EventDispatcher::default(),
        );
        assert!(writer.write(OutboundCommand::new("G0 X1")).is_err());
        assert!(writer.priority_write(b"!").is_err());
    }

    #[test]
    fn test_command_dequeued_before_clear_is_not_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let writer = FlowControlledWriter::new(
            Arc::new(BufferAccounting::new(100, false)),
            EventDispatcher::default(),
        );
        writer.attach(transport.clone());

        writer.write(OutboundCommand::new("G1 X10")).unwrap();
        let in_flight = take_queued(&writer);
        writer.clear_queue_buffer();
        writer.process(in_flight);
        assert!(transport.writes.lock().is_empty());
        assert_eq!(writer.budget(), 100);

        writer.write(OutboundCommand::new("G1 X20")).unwrap();
        let fresh = take_queued(&writer);
        writer.process(fresh);
        assert_eq!(*transport.writes.lock(), vec![b"G1 X20\n".to_vec()]);
    }

    #[test]
    fn test_detach_drains_queue() {
        let writer = FlowControlledWriter::new(
            Arc::new(BufferAccounting::new(100, false)),
            EventDispatcher::default(),
        );
        writer.attach(Arc::new(RecordingTransport::default()));
        writer.write(OutboundCommand::new("G0 X1")).unwrap();
        writer.write(OutboundCommand::new("G0 X2")).unwrap();
        assert_eq!(writer.queued_len(), 2);
        writer.detach();
        assert_eq!(writer.queued_len(), 0);
        assert!(writer.write(OutboundCommand::new("G0 X3")).is_err());
    }
}
