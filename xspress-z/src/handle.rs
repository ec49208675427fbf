//! Thread-safe access to a running detector controller.
//!
//! The controller runs on its own task and owns all detector state. A
//! [`DetectorHandle`] sends it a [`DetectorRequest`] carrying a one-shot reply
//! channel and waits for the answer, so the REST layer never touches the
//! controller directly.

use serde_json::Value;

use crate::message::Verb;
use crate::{Error, Result};

type Reply<T> = flume::Sender<Result<T>>;

#[derive(Debug)]
pub enum DetectorRequest {
    Get { path: String, reply: Reply<Value> },
    Set { path: String, value: Value, reply: Reply<()> },
    Command { verb: Verb, reply: Reply<()> },
    Reset { reply: Reply<()> },
    PausePolling { reply: Reply<()> },
    ResumePolling { reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

#[derive(Clone, Debug)]
pub struct DetectorHandle {
    tx: flume::Sender<DetectorRequest>,
}

impl DetectorHandle {
    pub(crate) fn new(tx: flume::Sender<DetectorRequest>) -> Self {
        Self { tx }
    }

    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> DetectorRequest) -> Result<T> {
        let (reply, rx) = flume::bounded(1);
        self.tx
            .send_async(request(reply))
            .await
            .map_err(|_| Error::connection("detector controller is not running"))?;
        rx.recv_async()
            .await
            .map_err(|_| Error::connection("detector controller dropped the request"))?
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<Value> {
        let path = path.into();
        self.call(|reply| DetectorRequest::Get { path, reply }).await
    }

    pub async fn set(&self, path: impl Into<String>, value: Value) -> Result<()> {
        let path = path.into();
        self.call(|reply| DetectorRequest::Set { path, value, reply })
            .await
    }

    pub async fn command(&self, verb: Verb) -> Result<()> {
        self.call(|reply| DetectorRequest::Command { verb, reply })
            .await
    }

    pub async fn reset(&self) -> Result<()> {
        self.call(|reply| DetectorRequest::Reset { reply }).await
    }

    pub async fn pause_polling(&self) -> Result<()> {
        self.call(|reply| DetectorRequest::PausePolling { reply })
            .await
    }

    pub async fn resume_polling(&self) -> Result<()> {
        self.call(|reply| DetectorRequest::ResumePolling { reply })
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| DetectorRequest::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_without_controller() {
        let (tx, rx) = flume::unbounded();
        let handle = DetectorHandle::new(tx);
        drop(rx);
        assert!(matches!(
            handle.get("xsp/num_cards").await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_request_dropped() {
        let (tx, rx) = flume::unbounded();
        let handle = DetectorHandle::new(tx);
        let server = tokio::spawn(async move {
            // Take the request and drop its reply channel unanswered.
            let _ = rx.recv_async().await;
        });
        assert!(matches!(
            handle.command(Verb::Start).await,
            Err(Error::Connection(_))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (tx, rx) = flume::unbounded();
        let handle = DetectorHandle::new(tx);
        let server = tokio::spawn(async move {
            match rx.recv_async().await.unwrap() {
                DetectorRequest::Get { path, reply } => {
                    reply.send(Ok(Value::String(path))).unwrap();
                }
                other => panic!("unexpected {other:?}"),
            }
        });
        assert_eq!(handle.get("daq").await.unwrap(), Value::String("daq".into()));
        server.await.unwrap();
    }
}
