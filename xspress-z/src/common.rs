use std::sync::Arc;

/// Where inbound frames go once the transport has accounted for them
pub enum DataHandler<T> {
    /// Queue-based: hand over to the reactor for later processing
    Queue(flume::Sender<T>),

    /// Direct callback: process immediately on the delivering thread
    Callback(Arc<dyn Fn(T) + Send + Sync>),
}

impl<T> DataHandler<T> {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    pub(crate) fn handle(&self, data: T) {
        match self {
            DataHandler::Queue(tx) => {
                if tx.send(data).is_err() {
                    tracing::warn!("[RX] receiver queue closed, frame dropped");
                }
            }
            DataHandler::Callback(cb) => cb(data),
        }
    }
}

impl<T> Clone for DataHandler<T> {
    fn clone(&self) -> Self {
        match self {
            DataHandler::Queue(tx) => DataHandler::Queue(tx.clone()),
            DataHandler::Callback(cb) => DataHandler::Callback(cb.clone()),
        }
    }
}
