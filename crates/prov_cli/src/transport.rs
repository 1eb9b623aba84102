//! Line-delimited JSON transport for a single session.
//!
//! Each inbound line is one `Request`; each outbound line is one
//! `ProvisionResponse`. A line that does not decode is passed to the
//! session as an error, which is fatal only for the first message.

use std::io::BufRead;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use prov_core::Provisioner;
use prov_proto::{channel, ProtoError, Request};

/// Read stdin lines on a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so it stays off the runtime
/// and is abandoned at process exit.
pub fn stdin_lines(capacity: usize) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(capacity);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Run one session, decoding `lines` and writing responses to `writer`.
///
/// Cancelling `stop`, or failing to write a response, cancels the session
/// context so a running engine command is killed.
pub async fn serve_session<W>(
    provisioner: &Provisioner,
    mut lines: mpsc::Receiver<String>,
    writer: W,
    stop: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, stream) = channel(provisioner.config().log_buffer);
    let (requests, mut responses, context) = client.into_parts();

    let inbound = tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str::<Request>(&line).map_err(ProtoError::from);
            if requests.send(item).await.is_err() {
                break;
            }
        }
        debug!("Inbound stream closed");
    });

    let link = {
        let context = context.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => context.cancel(),
                _ = context.cancelled() => {}
            }
        })
    };

    let outbound = {
        let context = context.clone();
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = responses.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                if let Err(e) = write_line(&mut writer, &line).await {
                    context.cancel();
                    return Err(anyhow::Error::from(e).context("write response"));
                }
            }
            Ok::<(), anyhow::Error>(())
        })
    };

    let result = provisioner.provision(stream).await;
    inbound.abort();
    link.abort();
    let written = outbound.await.context("response writer")?;

    result?;
    written
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}
