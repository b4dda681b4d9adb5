//! # Message Adaptor
//!
//! The correlation layer between proxies and the transport: allocates
//! correlation ids, tracks pending continuations, and encodes/decodes
//! messages through the wire codec.
//!
//! ## Invariants
//!
//! - One Invoke, at most one settlement. A Return with no pending entry
//!   is dropped (late or fire-and-forget traffic).
//! - No timeout: a peer that never answers leaks a pending correlation
//!   until the channel is destroyed. That is the caller's responsibility.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use remi_wire::Codec;
use remi_wire::InvokeMessage;
use remi_wire::Message;
use remi_wire::ReturnFault;
use remi_wire::ReturnMessage;
use remi_wire::Target;
use remi_wire::WireArg;

use crate::error::Error;
use crate::error::Fault;
use crate::error::Result;
use crate::transport::Transport;

pub(crate) struct Adaptor {
    transport: Arc<dyn Transport>,
    codec: Box<dyn Codec>,
    pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
    correlations: AtomicU64,
}

impl Adaptor {
    pub(crate) fn new(transport: Box<dyn Transport>, codec: Box<dyn Codec>) -> Self {
        Self {
            transport: Arc::from(transport),
            codec,
            pending: DashMap::new(),
            correlations: AtomicU64::new(1),
        }
    }

    pub(crate) async fn recv(&self) -> crate::transport::Result<Option<String>> {
        self.transport.recv().await
    }

    pub(crate) fn decode(&self, text: &str) -> remi_wire::Result<Message> {
        self.codec.decode(text)
    }

    /// Sends an Invoke and awaits the correlated Return.
    pub(crate) async fn invoke(
        &self,
        rmi_id: &str,
        target: Target,
        args: Vec<WireArg>,
        transfer_list: Vec<u64>,
    ) -> Result<Value> {
        let correlation_id = self.correlations.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id, tx);

        if let Err(e) = self
            .send_invoke(rmi_id, correlation_id, target, args, transfer_list)
            .await
        {
            self.pending.remove(&correlation_id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            // Settlement side dropped without sending: the channel died.
            Err(_) => Err(Error::ChannelClosed),
        }
    }

    /// Sends an Invoke without registering a pending continuation. The
    /// eventual Return arrives with an unknown correlation id and is
    /// dropped by the pump.
    pub(crate) async fn invoke_forget(
        &self,
        rmi_id: &str,
        target: Target,
        args: Vec<WireArg>,
        transfer_list: Vec<u64>,
    ) -> Result<()> {
        let correlation_id = self.correlations.fetch_add(1, Ordering::Relaxed);
        self.send_invoke(rmi_id, correlation_id, target, args, transfer_list)
            .await
    }

    async fn send_invoke(
        &self,
        rmi_id: &str,
        correlation_id: u64,
        target: Target,
        args: Vec<WireArg>,
        transfer_list: Vec<u64>,
    ) -> Result<()> {
        let message = Message::Invoke(InvokeMessage {
            rmi_id: rmi_id.to_string(),
            correlation_id,
            target,
            args,
            transfer_list: transfer_list.clone(),
        });
        let text = self.codec.encode(&message)?;
        self.transport.send(&text, &transfer_list).await?;
        Ok(())
    }

    /// Answers one dispatched Invoke with its Return.
    pub(crate) async fn send_return(
        &self,
        rmi_id: &str,
        correlation_id: u64,
        outcome: std::result::Result<Value, Fault>,
    ) -> Result<()> {
        let message = Message::Return(match outcome {
            Ok(value) => ReturnMessage::success(rmi_id, correlation_id, value),
            Err(fault) => ReturnMessage::failure(
                rmi_id,
                correlation_id,
                ReturnFault {
                    message: fault.message,
                    stack: fault.stack,
                },
            ),
        });
        let text = self.codec.encode(&message)?;
        self.transport.send(&text, &[]).await?;
        Ok(())
    }

    /// Routes an inbound Return to its pending continuation.
    pub(crate) fn settle(&self, ret: ReturnMessage) {
        let Some((_, tx)) = self.pending.remove(&ret.correlation_id) else {
            // Fire-and-forget reply, or a correlation already rejected.
            tracing::debug!(correlation = ret.correlation_id, "Dropping unmatched Return");
            return;
        };

        let result = if ret.ok {
            Ok(ret.value.unwrap_or(Value::Null))
        } else {
            let fault = ret.error.unwrap_or(ReturnFault {
                message: "Remote call failed without detail".into(),
                stack: String::new(),
            });
            Err(Error::Remote {
                message: fault.message,
                stack: fault.stack,
            })
        };

        // Caller may have stopped waiting; nothing to do then.
        let _ = tx.send(result);
    }

    /// Rejects every pending continuation with `ChannelClosed`.
    pub(crate) fn reject_all(&self) {
        let correlations: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for correlation_id in correlations {
            if let Some((_, tx)) = self.pending.remove(&correlation_id) {
                let _ = tx.send(Err(Error::ChannelClosed));
            }
        }
    }

    pub(crate) fn close(&self) {
        self.transport.close();
    }
}
