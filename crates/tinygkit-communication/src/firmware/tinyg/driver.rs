//! TinyG driver facade
//!
//! Owns one connection's worth of engine state and wires the pieces
//! together:
//!
//! ```text
//! transport -> reader (LineFramer) -> line channel -> ResponseParser -> events
//!                                                        |
//!                                           BufferAccounting (footers)
//!                                                        |
//! write() -> outbound channel -> FlowControlledWriter -> transport
//! priority_write() / send_control() ------------------> transport
//! ```
//!
//! Collaborators subscribe to [`RoutingEvent`]s through [`TinygDriver::subscribe`]
//! or an async [`TinygDriver::receiver`].

use crate::communication::accounting::BufferAccounting;
use crate::communication::buffered::{CommandSink, FlowControlledWriter, OutboundCommand};
use crate::communication::framer::LineFramer;
use crate::communication::serial::{SerialTransport, Transport};
use crate::firmware::connection_watch::ConnectionWatchdog;
use crate::firmware::tinyg::mnemonics::{
    build_command, requery_commands, status_interval_command, status_report_format_command,
    ControlSignal, CMD_DISABLE_LOCAL_ECHO, CMD_FLOW_CONTROL, CMD_JSON_VERBOSITY,
    CMD_QUERY_BUILD, CMD_QUERY_HARDWARE_VERSION, CMD_QUERY_PLATFORM, CMD_TEXT_VERBOSITY,
};
use crate::firmware::tinyg::response_parser::ResponseParser;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tinygkit_core::{
    ConnectionError, DriverConfig, EventDispatcher, EventFilter, EventKind, MachineModel, Result,
    RoutingEvent, Setting, SubscriptionId,
};

const READ_CHUNK_SIZE: usize = 512;

/// Worker threads and transport of a live connection
struct Session {
    transport: Arc<dyn Transport>,
    running: Arc<AtomicBool>,
    /// Inbound line channel; the parser exits once every sender is gone
    lines: Sender<String>,
    workers: Vec<JoinHandle<()>>,
}

/// Serial transport and protocol engine for one TinyG board
pub struct TinygDriver {
    config: DriverConfig,
    model: Arc<dyn MachineModel>,
    events: EventDispatcher,
    accounting: Arc<BufferAccounting>,
    writer: Arc<FlowControlledWriter>,
    watchdog: Arc<ConnectionWatchdog>,
    link_lost: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
    internal_subscriptions: Vec<SubscriptionId>,
}

impl TinygDriver {
    /// Create a disconnected driver handing decoded settings to `model`
    pub fn new(config: DriverConfig, model: Arc<dyn MachineModel>) -> Self {
        let events = EventDispatcher::new(config.event_channel_capacity.max(1));
        let accounting = Arc::new(BufferAccounting::new(
            config.buffer_capacity,
            config.throttle_on_zero_length_move,
        ));
        let writer = Arc::new(FlowControlledWriter::new(
            accounting.clone(),
            events.clone(),
        ));
        let watchdog = Arc::new(ConnectionWatchdog::new());
        let link_lost = Arc::new(AtomicBool::new(false));

        let mut internal_subscriptions = Vec::new();
        {
            let watchdog = Arc::downgrade(&watchdog);
            internal_subscriptions.push(events.subscribe(
                EventFilter::Kinds(vec![EventKind::Build]),
                move |_| {
                    if let Some(watchdog) = watchdog.upgrade() {
                        watchdog.disarm();
                    }
                },
            ));
        }
        {
            let link_lost = link_lost.clone();
            let watchdog = Arc::downgrade(&watchdog);
            internal_subscriptions.push(events.subscribe(
                EventFilter::Kinds(vec![EventKind::ConnectionLost]),
                move |event| {
                    tracing::warn!("{}", event.description());
                    link_lost.store(true, Ordering::SeqCst);
                    if let Some(watchdog) = watchdog.upgrade() {
                        watchdog.disarm();
                    }
                },
            ));
        }

        Self {
            config,
            model,
            events,
            accounting,
            writer,
            watchdog,
            link_lost,
            session: Mutex::new(None),
            internal_subscriptions,
        }
    }

    /// Driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Open a serial port and connect; failures are logged and reported as `false`
    pub fn connect(&self, port: &str, baud: u32) -> bool {
        let transport = match SerialTransport::open(port, baud, self.config.read_timeout()) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!("Cannot open {} at {} baud: {}", port, baud, e);
                return false;
            }
        };
        match self.connect_transport(Arc::new(transport)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", port, e);
                false
            }
        }
    }

    /// Connect over an already-open transport
    ///
    /// Starts the reader, parser and writer workers, arms the watchdog and
    /// runs the configuration sequence. Blocks for the sequence's delays.
    pub fn connect_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        self.config.validate()?;
        let lines = {
            let mut session = self.session.lock();
            if session.is_some() {
                return Err(ConnectionError::AlreadyConnected.into());
            }
            let started = self.start_session(transport.clone())?;
            let lines = started.lines.clone();
            *session = Some(started);
            lines
        };
        tracing::info!("Connected to {}", transport.name());

        self.watchdog.arm(self.config.watchdog_timeout(), lines);
        if let Err(e) = self.configure_controller() {
            tracing::warn!("Configuration sequence aborted: {}", e);
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    fn start_session(&self, transport: Arc<dyn Transport>) -> Result<Session> {
        self.accounting.clear();
        self.link_lost.store(false, Ordering::SeqCst);
        self.writer.attach(transport.clone());

        let (lines, parsed) = crossbeam_channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let mut session = Session {
            transport,
            running,
            lines,
            workers: Vec::with_capacity(3),
        };
        match self.spawn_workers(&mut session, parsed) {
            Ok(()) => Ok(session),
            Err(e) => {
                tracing::error!("Failed to start worker threads: {}", e);
                self.stop_session(session);
                Err(e)
            }
        }
    }

    fn spawn_workers(&self, session: &mut Session, parsed: Receiver<String>) -> Result<()> {
        let sink: Arc<dyn CommandSink> = self.writer.clone();
        let parser = ResponseParser::new(
            self.accounting.clone(),
            self.model.clone(),
            sink,
            self.events.clone(),
            self.config.min_build_version,
        );
        session.workers.push(parser.spawn(parsed)?);
        session.workers.push(self.writer.spawn()?);

        let reader = Reader {
            transport: session.transport.clone(),
            lines: session.lines.clone(),
            running: session.running.clone(),
            writer: self.writer.clone(),
            events: self.events.clone(),
            framer: LineFramer::new(self.config.max_line_length),
        };
        session.workers.push(
            thread::Builder::new()
                .name("tinyg-reader".to_string())
                .spawn(move || reader.run())?,
        );
        Ok(())
    }

    /// Privileged configuration writes with their mandated delays
    fn configure_controller(&self) -> Result<()> {
        let delay = self.config.setting_write_delay();
        let interval = status_interval_command(self.config.status_interval_ms);
        for command in [
            CMD_DISABLE_LOCAL_ECHO,
            CMD_JSON_VERBOSITY,
            CMD_TEXT_VERBOSITY,
            interval.as_str(),
            CMD_FLOW_CONTROL,
        ] {
            self.write(command)?;
            thread::sleep(delay);
        }

        // the board stops processing while it persists the report format
        self.write(&status_report_format_command())?;
        thread::sleep(self.config.status_report_format_delay());

        self.write(CMD_QUERY_BUILD)?;
        self.write(CMD_QUERY_PLATFORM)?;
        self.write(CMD_QUERY_HARDWARE_VERSION)?;
        for command in requery_commands() {
            self.write(&command)?;
        }
        Ok(())
    }

    /// Tear down the connection; no-op when not connected
    pub fn disconnect(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        let name = session.transport.name();
        self.stop_session(session);
        tracing::info!("Disconnected from {}", name);
    }

    fn stop_session(&self, session: Session) {
        let Session {
            transport,
            running,
            lines,
            workers,
        } = session;
        self.watchdog.disarm();
        running.store(false, Ordering::SeqCst);
        self.writer.detach();
        drop(lines);
        if let Err(e) = transport.close() {
            tracing::warn!("Error closing {}: {}", transport.name(), e);
        }

        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
        self.accounting.reset_buffer();
    }

    /// Whether a session is open and its link has not failed
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some() && !self.link_lost.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected.into())
        }
    }

    /// Queue a command for the flow-controlled writer
    pub fn write(&self, command: &str) -> Result<()> {
        self.ensure_connected()?;
        self.writer.write(OutboundCommand::new(command))
    }

    /// Send a line immediately, ahead of anything queued
    pub fn priority_write(&self, command: &str) -> Result<()> {
        self.ensure_connected()?;
        self.writer.write(OutboundCommand::priority(command))
    }

    /// Send a single-byte control on the priority path
    pub fn send_control(&self, signal: ControlSignal) -> Result<()> {
        self.ensure_connected()?;
        tracing::info!("Sending {:?}", signal);
        self.writer.priority_write(&[signal.as_byte()])
    }

    /// Queue every line of a program followed by a file-complete marker
    ///
    /// Returns the number of lines queued. Blank lines are skipped.
    pub fn send_file<I, S>(&self, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_connected()?;
        self.writer.begin_file_send();
        let mut queued = 0;
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            self.writer.write(OutboundCommand::new(line))?;
            queued += 1;
        }
        self.writer.write(OutboundCommand::file_complete())?;
        tracing::info!("Queued {} program lines", queued);
        Ok(queued)
    }

    /// Queue a display-only comment; it is routed in order and never sent
    pub fn write_comment(&self, text: &str) -> Result<()> {
        self.ensure_connected()?;
        self.writer.write(OutboundCommand::comment(text))
    }

    /// Feed hold, drop everything queued locally, then flush the board's planner
    pub fn cancel_motion(&self) -> Result<()> {
        self.send_control(ControlSignal::Pause)?;
        self.writer.clear_queue_buffer();
        self.send_control(ControlSignal::QueueFlush)
    }

    /// Write one setting to the board
    pub fn apply_setting(&self, setting: &Setting) -> Result<()> {
        self.write(&build_command(setting))
    }

    /// Bytes the board's receive buffer can still take
    pub fn buffer_budget(&self) -> usize {
        self.accounting.budget()
    }

    /// Whether a program stream is in progress
    pub fn is_sending_file(&self) -> bool {
        self.writer.is_sending_file()
    }

    /// Commands waiting for the writer
    pub fn queued_commands(&self) -> usize {
        self.writer.queued_len()
    }

    /// Register a synchronous event handler
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(RoutingEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(filter, handler)
    }

    /// Remove a handler registered with [`subscribe`](Self::subscribe)
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Async event stream
    pub fn receiver(&self) -> tokio::sync::broadcast::Receiver<RoutingEvent> {
        self.events.receiver()
    }

    /// The dispatcher events are routed through
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }
}

impl Drop for TinygDriver {
    fn drop(&mut self) {
        self.disconnect();
        for id in self.internal_subscriptions.drain(..) {
            self.events.unsubscribe(id);
        }
    }
}

/// Inbound half: frames transport bytes into the line channel
struct Reader {
    transport: Arc<dyn Transport>,
    lines: Sender<String>,
    running: Arc<AtomicBool>,
    writer: Arc<FlowControlledWriter>,
    events: EventDispatcher,
    framer: LineFramer,
}

impl Reader {
    fn run(mut self) {
        tracing::debug!("Reader started on {}", self.transport.name());
        let mut buf = [0u8; READ_CHUNK_SIZE];
        while self.running.load(Ordering::SeqCst) {
            match self.transport.read_bytes(&mut buf) {
                Ok(0) => continue,
                Ok(n) => {
                    let lines = &self.lines;
                    self.framer.feed(&buf[..n], |line| {
                        lines.send(line).ok();
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        tracing::error!("Serial read failed: {}", e);
                        self.writer.clear_queue_buffer();
                        self.events
                            .emit(RoutingEvent::ConnectionLost(format!("read failed: {}", e)));
                    }
                    break;
                }
            }
        }
        tracing::debug!("Reader stopped");
    }
}
