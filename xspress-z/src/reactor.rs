//! Event loop driving a detector controller.
//!
//! The reactor multiplexes three sources in priority order: inbound frames
//! from the transport, requests from [`DetectorHandle`]s, and the recurring
//! poll timer. The controller pulls one [`Event`] at a time and handles it
//! before pulling the next, so nothing it owns needs a lock.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::common::DataHandler;
use crate::handle::{DetectorHandle, DetectorRequest};

#[derive(Debug)]
pub enum Event {
    Frame(Vec<u8>),
    Request(DetectorRequest),
    Poll,
    /// The reactor was closed; no further events will arrive.
    Closed,
}

pub struct Reactor {
    frame_tx: flume::Sender<Vec<u8>>,
    frame_rx: Option<flume::Receiver<Vec<u8>>>,
    request_tx: flume::Sender<DetectorRequest>,
    request_rx: Option<flume::Receiver<DetectorRequest>>,
    poll: Option<Interval>,
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

async fn tick(poll: Option<&mut Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Reactor {
    pub fn new() -> Self {
        let (frame_tx, frame_rx) = flume::unbounded();
        let (request_tx, request_rx) = flume::unbounded();
        Self {
            frame_tx,
            frame_rx: Some(frame_rx),
            request_tx,
            request_rx: Some(request_rx),
            poll: None,
        }
    }

    /// Receive handler that queues frames for this reactor.
    pub fn frame_handler(&self) -> DataHandler<Vec<u8>> {
        DataHandler::Queue(self.frame_tx.clone())
    }

    pub fn handle(&self) -> DetectorHandle {
        DetectorHandle::new(self.request_tx.clone())
    }

    /// Start (or restart) the poll timer. The first tick fires one full
    /// `period` from now.
    pub fn schedule_poll(&mut self, period: Duration) {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(interval);
        debug!("[RCT] polling every {:?}", period);
    }

    pub fn cancel_poll(&mut self) {
        if self.poll.take().is_some() {
            debug!("[RCT] polling cancelled");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.request_rx.is_none()
    }

    /// Stop producing events. Queued requests are dropped, which fails their
    /// callers, and later handle calls fail immediately.
    pub fn close(&mut self) {
        self.cancel_poll();
        self.frame_rx = None;
        if let Some(requests) = self.request_rx.take() {
            let dropped = requests.drain().count();
            if dropped > 0 {
                debug!("[RCT] dropped {} queued requests on close", dropped);
            }
        }
    }

    /// Wait for the next event.
    pub async fn next_event(&mut self) -> Event {
        let (Some(frames), Some(requests)) = (self.frame_rx.as_ref(), self.request_rx.as_ref())
        else {
            return Event::Closed;
        };
        let poll = self.poll.as_mut();

        tokio::select! {
            biased;
            Ok(frame) = frames.recv_async() => Event::Frame(frame),
            Ok(request) = requests.recv_async() => Event::Request(request),
            _ = tick(poll) => Event::Poll,
            else => Event::Closed,
        }
    }

    /// An event that is already queued, without waiting. Never yields
    /// [`Event::Poll`].
    pub fn try_next_event(&mut self) -> Option<Event> {
        let (Some(frames), Some(requests)) = (self.frame_rx.as_ref(), self.request_rx.as_ref())
        else {
            return Some(Event::Closed);
        };
        if let Ok(frame) = frames.try_recv() {
            return Some(Event::Frame(frame));
        }
        requests.try_recv().ok().map(Event::Request)
    }
}
