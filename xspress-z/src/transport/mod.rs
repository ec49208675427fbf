//! Asynchronous transport to the detector control server.
//!
//! A [`TransportClient`] owns one persistent [`Link`] for the lifetime of the
//! process. It hands out message ids, counts frames that went out without a
//! matching frame coming back ([`QueueDepth`]), and forwards every inbound
//! frame to the handler registered with [`TransportClient::on_receive`].
//!
//! ```text
//! send(frame) ──> QueueDepth += 1 ──> Link ──> wire
//!                                               │
//! handler(frame) <── QueueDepth -= 1 <── FrameSink <┘
//! ```

pub mod mock;
pub mod zlink;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::common::DataHandler;
use crate::endpoint::{ClientIdentity, Endpoint};

pub use mock::MockLink;
pub use zlink::{ZLink, ZLinkConfig};

/// A raw connection able to move encoded frames to and from the server.
pub trait Link: Sized + Send + Sync + 'static {
    type Config;

    /// Open the connection. Every inbound frame must be passed to `sink`.
    fn open(
        config: &Self::Config,
        endpoint: &Endpoint,
        identity: &ClientIdentity,
        sink: FrameSink,
    ) -> Result<Self>;

    /// Queue one frame for transmission without waiting for the peer.
    fn send(&self, frame: Vec<u8>) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn close(&self) -> Result<()>;
}

/// Count of frames sent but not yet answered by an inbound frame.
#[derive(Debug, Default)]
pub struct QueueDepth(AtomicUsize);

impl QueueDepth {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement, saturating at zero. Returns false if the counter was
    /// already zero.
    pub(crate) fn decrement(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Message id sequence, wrapping at 2^32.
#[derive(Debug, Default)]
pub struct MessageIdGen {
    next: u32,
}

impl MessageIdGen {
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Entry point for inbound frames, shared between the client and its link.
#[derive(Clone)]
pub struct FrameSink {
    depth: Arc<QueueDepth>,
    handler: Arc<RwLock<Option<DataHandler<Vec<u8>>>>>,
}

impl FrameSink {
    fn new() -> Self {
        Self {
            depth: Arc::new(QueueDepth::default()),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Account for one inbound frame, then delegate it to the handler.
    pub fn deliver(&self, frame: Vec<u8>) {
        if !self.depth.decrement() {
            warn!("[RX] frame received with no message outstanding");
        }
        trace!("[RX] {} bytes, queue depth {}", frame.len(), self.depth.get());
        match self.handler.read().as_ref() {
            Some(handler) => handler.handle(frame),
            None => warn!("[RX] no receive handler registered, frame dropped"),
        }
    }
}

pub struct TransportClient<L: Link> {
    endpoint: Endpoint,
    identity: ClientIdentity,
    ids: MessageIdGen,
    sink: FrameSink,
    link: L,
}

impl<L: Link> TransportClient<L> {
    /// Open a persistent connection to `endpoint` under a fresh identity.
    #[tracing::instrument(name = "transport_connect", skip(config), fields(endpoint = %endpoint))]
    pub fn connect(endpoint: Endpoint, config: &L::Config) -> Result<Self> {
        let identity = ClientIdentity::generate();
        let sink = FrameSink::new();
        let link = L::open(config, &endpoint, &identity, sink.clone())?;
        debug!("[TX] connected to {} as {}", endpoint, identity);
        Ok(Self {
            endpoint,
            identity,
            ids: MessageIdGen::default(),
            sink,
            link,
        })
    }

    /// Replace the id sequence, e.g. to resume from a known id.
    pub fn with_ids(mut self, ids: MessageIdGen) -> Self {
        self.ids = ids;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn next_id(&mut self) -> u32 {
        self.ids.next_id()
    }

    /// Enqueue a frame.
    ///
    /// The depth is raised before the link sees the frame, since a reply may
    /// be delivered on another thread before `send` returns. A refused frame
    /// takes its increment back.
    pub fn send(&self, frame: Vec<u8>) -> Result<()> {
        let len = frame.len();
        let depth = self.sink.depth.increment();
        if let Err(e) = self.link.send(frame) {
            self.sink.depth.decrement();
            return Err(e);
        }
        trace!("[TX] {} bytes, queue depth {}", len, depth);
        Ok(())
    }

    pub fn on_receive(&self, handler: DataHandler<Vec<u8>>) {
        *self.sink.handler.write() = Some(handler);
    }

    pub fn queue_depth(&self) -> usize {
        self.sink.depth.get()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn close(&self) -> Result<()> {
        self.link.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_never_negative() {
        let depth = QueueDepth::default();
        assert!(!depth.decrement());
        assert_eq!(depth.get(), 0);
        depth.increment();
        assert!(depth.decrement());
        assert!(!depth.decrement());
        assert_eq!(depth.get(), 0);
    }

    #[test]
    fn test_id_wraps() {
        let mut ids = MessageIdGen::starting_at(u32::MAX - 1);
        assert_eq!(ids.next_id(), u32::MAX - 1);
        assert_eq!(ids.next_id(), u32::MAX);
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.peek(), 1);
    }
}
