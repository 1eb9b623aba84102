//! In-process duplex channel carrying one provisioning session.
//!
//! [`channel`] returns the orchestrator half ([`ProvisionClient`]) and the
//! provisioner half ([`SessionStream`]). Both directions are bounded `mpsc`
//! queues. The stream also carries a context token that the transport
//! cancels when the connection itself goes away.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProtoError, ProtoResult};
use crate::models::{Complete, LogRecord, ProvisionResponse, Request};

/// Inbound item: transports surface per-message decode failures in-band.
pub type InboundRequest = ProtoResult<Request>;

/// Create a connected client/session pair.
pub fn channel(capacity: usize) -> (ProvisionClient, SessionStream) {
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (response_tx, response_rx) = mpsc::channel(capacity);
    let context = CancellationToken::new();

    let client = ProvisionClient {
        requests: request_tx,
        responses: response_rx,
        context: context.clone(),
    };
    let stream = SessionStream {
        requests: request_rx,
        responses: ResponseSender { tx: response_tx },
        context,
    };
    (client, stream)
}

/// Provisioner side of a session.
pub struct SessionStream {
    pub requests: mpsc::Receiver<InboundRequest>,
    pub responses: ResponseSender,
    /// Cancelled when the underlying transport is gone.
    pub context: CancellationToken,
}

/// Cloneable handle for writing responses.
///
/// Log delivery is fire-and-forget; only the completion send reports a
/// closed channel to the caller.
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: mpsc::Sender<ProvisionResponse>,
}

impl ResponseSender {
    pub fn new(tx: mpsc::Sender<ProvisionResponse>) -> Self {
        Self { tx }
    }

    /// Forward a log record, ignoring a closed channel.
    pub async fn log(&self, record: LogRecord) {
        let _ = self.tx.send(ProvisionResponse::Log(record)).await;
    }

    /// Send the terminal completion.
    pub async fn complete(&self, complete: Complete) -> ProtoResult<()> {
        self.tx
            .send(ProvisionResponse::Complete(complete))
            .await
            .map_err(|_| ProtoError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Orchestrator side of a session.
pub struct ProvisionClient {
    requests: mpsc::Sender<InboundRequest>,
    responses: mpsc::Receiver<ProvisionResponse>,
    context: CancellationToken,
}

impl ProvisionClient {
    pub async fn send(&self, request: Request) -> ProtoResult<()> {
        self.requests
            .send(Ok(request))
            .await
            .map_err(|_| ProtoError::ChannelClosed)
    }

    /// Forward an inbound item as-is, including decode failures.
    pub async fn send_raw(&self, item: InboundRequest) -> ProtoResult<()> {
        self.requests
            .send(item)
            .await
            .map_err(|_| ProtoError::ChannelClosed)
    }

    pub async fn cancel(&self) -> ProtoResult<()> {
        self.send(Request::Cancel).await
    }

    /// Next response, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<ProvisionResponse> {
        self.responses.recv().await
    }

    /// Token the transport cancels when the connection drops.
    pub fn context(&self) -> CancellationToken {
        self.context.clone()
    }

    /// Split into raw parts for transports that pump each direction
    /// from its own task.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Sender<InboundRequest>,
        mpsc::Receiver<ProvisionResponse>,
        CancellationToken,
    ) {
        (self.requests, self.responses, self.context)
    }
}
