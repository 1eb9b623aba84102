//! Relays engine stdout to the session as `Log` responses.
//!
//! The supervisor pushes stdout lines into a bounded channel; a relay task
//! drains it and forwards records through the [`ResponseSender`]. The
//! channel closes when the child's stdout reaches EOF, which ends the task.
//! Callers await the returned handle before sending the completion so that
//! every log precedes it.

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use prov_proto::{Diagnostic, LogLevel, LogRecord, ResponseSender};

/// One line of `terraform -json` machine-readable UI output.
#[derive(Debug, Deserialize)]
struct UiLine {
    #[serde(rename = "@level")]
    level: String,
    #[serde(rename = "@message", default)]
    message: String,
    #[serde(default)]
    diagnostic: Option<Diagnostic>,
}

/// Forward every line verbatim at `DEBUG`. Used for `init`, which has no
/// JSON mode. Resolves to the number of records forwarded.
pub fn spawn_raw_relay(mut lines: mpsc::Receiver<String>, responses: ResponseSender) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut forwarded = 0;
        while let Some(line) = lines.recv().await {
            responses.log(LogRecord::new(LogLevel::Debug, line)).await;
            forwarded += 1;
        }
        forwarded
    })
}

/// Decode each line as a JSON UI record and forward the result.
pub fn spawn_structured_relay(
    mut lines: mpsc::Receiver<String>,
    responses: ResponseSender,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut forwarded = 0;
        while let Some(line) = lines.recv().await {
            for record in decode_structured_line(&line) {
                responses.log(record).await;
                forwarded += 1;
            }
        }
        forwarded
    })
}

/// Turn one JSON UI line into zero, one or two log records.
///
/// The message is logged at the record's level. A diagnostic adds a second
/// record with its detail at the diagnostic's own severity. Lines that do
/// not decode and levels outside the known set produce nothing.
pub fn decode_structured_line(line: &str) -> Vec<LogRecord> {
    let parsed: UiLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Skipping undecodable engine output {:?}: {}", line, e);
            return Vec::new();
        }
    };

    let mut records = Vec::with_capacity(2);
    match parsed.level.parse::<LogLevel>() {
        Ok(level) => records.push(LogRecord::new(level, parsed.message)),
        Err(_) => {
            debug!("Dropping engine log with level {:?}", parsed.level);
            return records;
        }
    }

    if let Some(diagnostic) = parsed.diagnostic {
        if let Ok(level) = diagnostic.severity.parse::<LogLevel>() {
            records.push(LogRecord::new(level, diagnostic.detail.clone()).with_diagnostic(diagnostic));
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_proto::ProvisionResponse;

    #[test]
    fn test_decode_plain_record() {
        let records = decode_structured_line(
            r#"{"@level":"info","@message":"Terraform 1.3.7","@module":"terraform.ui","type":"version"}"#,
        );
        assert_eq!(records, vec![LogRecord::new(LogLevel::Info, "Terraform 1.3.7")]);
    }

    #[test]
    fn test_decode_diagnostic_adds_detail_record() {
        let records = decode_structured_line(
            r#"{"@level":"error","@message":"Error: Invalid reference","diagnostic":{"severity":"error","summary":"Invalid reference","detail":"A reference must be followed by an attribute."}}"#,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, LogLevel::Error);
        assert_eq!(records[0].output, "Error: Invalid reference");
        assert_eq!(records[1].output, "A reference must be followed by an attribute.");
        assert_eq!(
            records[1].diagnostic.as_ref().map(|d| d.summary.as_str()),
            Some("Invalid reference")
        );
    }

    #[test]
    fn test_unknown_levels_are_dropped() {
        assert!(decode_structured_line(r#"{"@level":"loud","@message":"x"}"#).is_empty());

        // "warning" is not a level the engine uses for records, only a
        // diagnostic severity; such details are dropped.
        let records = decode_structured_line(
            r#"{"@level":"warn","@message":"careful","diagnostic":{"severity":"warning","detail":"d"}}"#,
        );
        assert_eq!(records, vec![LogRecord::new(LogLevel::Warn, "careful")]);
    }

    #[test]
    fn test_undecodable_lines_are_skipped() {
        assert!(decode_structured_line("Terraform has been successfully initialized!").is_empty());
        assert!(decode_structured_line("").is_empty());
    }

    #[tokio::test]
    async fn test_raw_relay_forwards_verbatim() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let relay = spawn_raw_relay(rx, ResponseSender::new(out_tx));

        tx.send("Initializing provider plugins...".to_string()).await.unwrap();
        tx.send(String::new()).await.unwrap();
        drop(tx);

        assert_eq!(relay.await.unwrap(), 2);
        match out_rx.recv().await {
            Some(ProvisionResponse::Log(record)) => {
                assert_eq!(record.level, LogLevel::Debug);
                assert_eq!(record.output, "Initializing provider plugins...");
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_structured_relay_finishes_when_session_is_gone() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);
        let relay = spawn_structured_relay(rx, ResponseSender::new(out_tx));

        for _ in 0..3 {
            tx.send(r#"{"@level":"info","@message":"m"}"#.to_string())
                .await
                .unwrap();
        }
        drop(tx);

        // Sends to a closed session are ignored, not fatal.
        assert_eq!(relay.await.unwrap(), 3);
    }
}
