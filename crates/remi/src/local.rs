//! # In-Process Transport
//!
//! A duplex channel transport pair for two channels living in the same
//! process: workers talking over queues, or a test suite standing in for
//! a real boundary. Messages sent on one side appear on the other's
//! `recv` in send order.

use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of an in-process duplex pair.
pub struct LocalTransport {
    tx: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl LocalTransport {
    /// Creates a pair of transports connected to each other.
    ///
    /// Messages sent on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: StdMutex::new(Some(tx_a)),
            rx: Mutex::new(rx_b),
        };

        let b = Self {
            tx: StdMutex::new(Some(tx_b)),
            rx: Mutex::new(rx_a),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn send(&self, message: &str, _transfer_list: &[u64]) -> transport::Result<()> {
        // In-process delivery shares memory; there is nothing to transfer.
        let guard = self
            .tx
            .lock()
            .map_err(|_| transport::Error::Io("Sender lock poisoned".into()))?;
        match guard.as_ref() {
            Some(tx) => tx
                .send(message.to_owned())
                .map_err(|_| transport::Error::ConnectionLost("Peer closed".into())),
            None => Err(transport::Error::Closed),
        }
    }

    async fn recv(&self) -> transport::Result<Option<String>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    fn close(&self) {
        // Dropping the sender ends the peer's recv stream.
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}
