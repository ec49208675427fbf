//! In-process link for tests and offline runs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{FrameSink, Link};
use crate::endpoint::{ClientIdentity, Endpoint};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub connected: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { connected: true }
    }
}

/// Link that records outbound frames and lets the caller inject inbound ones.
#[derive(Clone)]
pub struct MockLink {
    inner: Arc<MockLinkInner>,
}

struct MockLinkInner {
    sink: FrameSink,
    sent: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl MockLink {
    /// Inject a frame as if it arrived from the server.
    pub fn deliver(&self, frame: impl Into<Vec<u8>>) {
        self.inner.sink.deliver(frame.into());
    }

    /// All frames sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.sent.lock().clone()
    }

    /// Drain the recorded frames.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.inner.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.inner.sent.lock().len()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Link for MockLink {
    type Config = MockConfig;

    fn open(
        config: &MockConfig,
        _endpoint: &Endpoint,
        _identity: &ClientIdentity,
        sink: FrameSink,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(MockLinkInner {
                sink,
                sent: Mutex::new(Vec::new()),
                connected: AtomicBool::new(config.connected),
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn send(&self, frame: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::connection("link closed"));
        }
        self.inner.sent.lock().push(frame);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire) && !self.is_closed()
    }

    fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}
