//! Outstanding request ids and what each was sent for.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Backpressure;
use crate::message::{MessageKind, Verb};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingIntent {
    pub kind: MessageKind,
    pub verb: Verb,
    pub sent_at: Instant,
}

/// Bounded id → intent map, oldest first.
///
/// Ids are issued in increasing order and entries are appended as they are
/// sent, so the front of the queue is always the oldest entry.
#[derive(Debug)]
pub struct PendingRequests {
    entries: VecDeque<(u32, PendingIntent)>,
    capacity: usize,
    timeout: Duration,
    policy: Backpressure,
}

impl PendingRequests {
    pub fn new(capacity: usize, timeout: Duration, policy: Backpressure) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            timeout,
            policy,
        }
    }

    /// Make room for one more entry, applying the backpressure policy when
    /// full. Call before the frame is sent so a refused send costs nothing.
    pub fn reserve(&mut self, verb: Verb) -> Result<()> {
        if self.entries.len() < self.capacity {
            return Ok(());
        }
        match self.policy {
            Backpressure::Reject => Err(Error::ResourceExhausted(format!(
                "{} requests pending, refusing '{}'",
                self.entries.len(),
                verb
            ))),
            Backpressure::DropOldest => {
                if let Some((old_id, old)) = self.entries.pop_front() {
                    warn!(
                        "[PND] evicting pending '{}' id={} to make room for '{}'",
                        old.verb, old_id, verb
                    );
                }
                Ok(())
            }
        }
    }

    /// Record a sent id. Assumes [`reserve`](Self::reserve) made room.
    pub fn insert(&mut self, id: u32, verb: Verb) {
        self.entries.push_back((
            id,
            PendingIntent {
                kind: verb.kind(),
                verb,
                sent_at: Instant::now(),
            },
        ));
    }

    /// [`reserve`](Self::reserve) then [`insert`](Self::insert).
    pub fn admit(&mut self, id: u32, verb: Verb) -> Result<()> {
        self.reserve(verb)?;
        self.insert(id, verb);
        Ok(())
    }

    /// Remove an id regardless of its age.
    pub fn cancel(&mut self, id: u32) -> Option<PendingIntent> {
        let pos = self.entries.iter().position(|(i, _)| *i == id)?;
        self.entries.remove(pos).map(|(_, intent)| intent)
    }

    /// Take the intent for a reply id. Unknown and timed-out ids yield `None`.
    pub fn resolve(&mut self, id: u32) -> Option<PendingIntent> {
        let intent = self.cancel(id)?;
        if intent.sent_at.elapsed() >= self.timeout {
            debug!("[PND] reply to '{}' id={} arrived after timeout", intent.verb, id);
            return None;
        }
        Some(intent)
    }

    /// Drop every entry older than the timeout and return them.
    pub fn expire(&mut self) -> Vec<(u32, PendingIntent)> {
        let now = Instant::now();
        let mut expired = Vec::new();
        while let Some((_, intent)) = self.entries.front() {
            if now.duration_since(intent.sent_at) < self.timeout {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                expired.push(entry);
            }
        }
        expired
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|(i, _)| *i == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(capacity: usize, policy: Backpressure) -> PendingRequests {
        PendingRequests::new(capacity, Duration::from_secs(5), policy)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_once() {
        let mut p = pending(4, Backpressure::Reject);
        p.admit(0, Verb::Configure).unwrap();
        p.admit(1, Verb::RequestConfiguration).unwrap();

        let intent = p.resolve(1).unwrap();
        assert_eq!(intent.verb, Verb::RequestConfiguration);
        assert_eq!(intent.kind, MessageKind::Request);
        assert!(p.resolve(1).is_none());
        assert!(p.resolve(42).is_none());
        assert_eq!(p.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_timeout() {
        let mut p = pending(4, Backpressure::Reject);
        p.admit(0, Verb::Start).unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        p.admit(1, Verb::Stop).unwrap();

        assert!(p.expire().is_empty());
        tokio::time::advance(Duration::from_secs(2)).await;
        let expired = p.expire();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, 0);
        assert!(p.contains(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_discarded() {
        let mut p = pending(4, Backpressure::Reject);
        p.admit(7, Verb::RequestConfiguration).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(p.resolve(7).is_none());
        assert!(p.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_at_capacity() {
        let mut p = pending(2, Backpressure::Reject);
        p.admit(0, Verb::Start).unwrap();
        p.admit(1, Verb::Stop).unwrap();
        assert!(matches!(
            p.admit(2, Verb::Trigger),
            Err(Error::ResourceExhausted(_))
        ));
        assert_eq!(p.len(), 2);
        assert!(!p.contains(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_oldest_at_capacity() {
        let mut p = pending(2, Backpressure::DropOldest);
        p.admit(0, Verb::Start).unwrap();
        p.admit(1, Verb::Stop).unwrap();
        p.admit(2, Verb::Trigger).unwrap();
        assert_eq!(p.len(), 2);
        assert!(!p.contains(0));
        assert!(p.contains(1) && p.contains(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let mut p = pending(2, Backpressure::Reject);
        p.admit(5, Verb::Save).unwrap();
        assert_eq!(p.cancel(5).map(|i| i.verb), Some(Verb::Save));
        assert!(p.cancel(5).is_none());
    }
}
