#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tinygkit_communication::Transport;
use tinygkit_core::{DriverConfig, EventDispatcher, EventFilter, RoutingEvent};

type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

// Mock transport standing in for a TinyG board
pub struct MockTransport {
    writes: Mutex<Vec<Vec<u8>>>,
    inbound: Mutex<VecDeque<u8>>,
    responder: Option<Responder>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
            responder: None,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Reply to every newline-terminated write with whatever `responder` returns
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Acknowledge every line with an OK footer crediting its length
    pub fn acking() -> Self {
        Self::with_responder(|line| Some(ok_footer(line.len() + 1)))
    }

    pub fn push_inbound(&self, text: &str) {
        self.inbound.lock().extend(text.bytes());
    }

    /// Every write call, lossily decoded
    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .map(|w| String::from_utf8_lossy(w).to_string())
            .collect()
    }

    /// Newline-terminated writes with the newline stripped
    pub fn lines(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| w.strip_suffix('\n').map(str::to_string))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
        }
        self.writes.lock().push(data.to_vec());

        if let Some(responder) = &self.responder {
            let text = String::from_utf8_lossy(data);
            if let Some(line) = text.strip_suffix('\n') {
                if let Some(reply) = responder(line) {
                    self.push_inbound(&reply);
                    self.push_inbound("\n");
                }
            }
        }
        Ok(())
    }

    fn read_bytes(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
        }
        let n = {
            let mut inbound = self.inbound.lock();
            let n = inbound.len().min(buf.len());
            for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
                *slot = byte;
            }
            n
        };
        if n == 0 {
            thread::sleep(Duration::from_millis(2));
        }
        Ok(n)
    }

    fn name(&self) -> String {
        "mock".to_string()
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn ok_footer(rx: usize) -> String {
    format!(r#"{{"r":{{}},"f":[1,0,{},1]}}"#, rx)
}

/// Config without the real-hardware delays
pub fn fast_config() -> DriverConfig {
    DriverConfig {
        setting_write_delay_ms: 0,
        status_report_format_delay_ms: 0,
        watchdog_timeout_ms: 2000,
        read_timeout_ms: 5,
        ..DriverConfig::default()
    }
}

/// Collect every routed event
pub fn record(events: &EventDispatcher) -> Arc<Mutex<Vec<RoutingEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    events.subscribe(EventFilter::All, move |event| sink.lock().push(event));
    seen
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
