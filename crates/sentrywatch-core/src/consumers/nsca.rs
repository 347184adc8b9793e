//! NSCA-compatible consumer: pushes classified results to a remote NSCA
//! daemon over TCP. Grounded on `consumers/nsca/nsca.go`; the historical
//! wire framing itself is out of scope per the source material (treated as
//! replaceable transport), so the packet layout here is a fresh, documented
//! design rather than a byte-for-byte port of any upstream NSCA client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConsumerConfig;
use crate::consumer::{ClassifiedResult, Consumer, QueueRuntime, DEFAULT_QUEUE_CAPACITY};
use crate::error::ConsumerError;

const HOST_FIELD_SIZE: usize = 64;
const SERVICE_FIELD_SIZE: usize = 128;
const MESSAGE_FIELD_SIZE: usize = 512;
const HANDSHAKE_SIZE: usize = 128 + 4; // server IV + big-endian timestamp

/// Strips characters the wire payload forbids, matching the source's
/// `strings.NewReplacer(",", "", "\"", "")`.
fn sanitize(message: &str) -> String {
    message.chars().filter(|&c| c != ',' && c != '"').collect()
}

fn pack_fixed(field: &str, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    let bytes = field.as_bytes();
    let n = bytes.len().min(size.saturating_sub(1));
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

struct EncryptionContext {
    method: i64,
    key: String,
}

impl EncryptionContext {
    /// XOR the payload against the server-supplied IV and, if configured, a
    /// shared key. Method `0` disables encryption entirely; any other code
    /// is treated as XOR-class encryption mixed with the IV and key, which
    /// covers the common NSCA deployments this consumer targets.
    fn apply(&self, payload: &mut [u8], iv: &[u8; 128]) {
        if self.method == 0 {
            return;
        }
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= iv[i % iv.len()];
        }
        if !self.key.is_empty() {
            let key_bytes = self.key.as_bytes();
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= key_bytes[i % key_bytes.len()];
            }
        }
    }
}

fn build_packet(result: &ClassifiedResult, server_timestamp: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(2 + 4 + 4 + 2 + HOST_FIELD_SIZE + SERVICE_FIELD_SIZE + MESSAGE_FIELD_SIZE);
    packet.extend_from_slice(&3i16.to_be_bytes()); // packet version
    packet.extend_from_slice(&[0u8; 4]); // crc32 placeholder, filled below
    packet.extend_from_slice(&server_timestamp.to_be_bytes());
    packet.extend_from_slice(&result.severity.wire_code().to_be_bytes());
    packet.extend_from_slice(&pack_fixed(&result.hostname, HOST_FIELD_SIZE));
    packet.extend_from_slice(&pack_fixed(result.checker.service_name(), SERVICE_FIELD_SIZE));
    packet.extend_from_slice(&pack_fixed(&sanitize(&result.message), MESSAGE_FIELD_SIZE));

    let crc = crc32fast::hash(&packet);
    packet[2..6].copy_from_slice(&crc.to_be_bytes());
    packet
}

async fn deliver(
    server: &str,
    port: u16,
    timeout: Duration,
    encryption: &EncryptionContext,
    result: &ClassifiedResult,
) -> Result<(), ConsumerError> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect((server, port)))
        .await
        .map_err(|_| ConsumerError::Delivery(format!("connect to {server}:{port} timed out")))?
        .map_err(|err| ConsumerError::Delivery(format!("connect to {server}:{port}: {err}")))?;

    let mut handshake = [0u8; HANDSHAKE_SIZE];
    tokio::time::timeout(timeout, stream.read_exact(&mut handshake))
        .await
        .map_err(|_| ConsumerError::Delivery("handshake read timed out".to_string()))?
        .map_err(|err| ConsumerError::Delivery(format!("handshake read: {err}")))?;

    let mut iv = [0u8; 128];
    iv.copy_from_slice(&handshake[..128]);
    let server_timestamp = u32::from_be_bytes(handshake[128..132].try_into().unwrap());

    let mut packet = build_packet(result, server_timestamp);
    encryption.apply(&mut packet, &iv);

    tokio::time::timeout(timeout, stream.write_all(&packet))
        .await
        .map_err(|_| ConsumerError::Delivery("packet write timed out".to_string()))?
        .map_err(|err| ConsumerError::Delivery(format!("packet write: {err}")))?;

    debug!(server, port, host = %result.hostname, service = result.checker.service_name(), "nsca: delivered result");
    Ok(())
}

pub struct NscaConsumer {
    runtime: QueueRuntime<ClassifiedResult>,
    label: String,
}

impl NscaConsumer {
    pub fn new(cfg: ConsumerConfig) -> Self {
        let label = format!("nsca:{}:{}", cfg.server, cfg.port);
        let server = Arc::new(cfg.server);
        let port = cfg.port;
        let timeout = cfg.timeout;
        let encryption = Arc::new(EncryptionContext {
            method: cfg.encryption,
            key: cfg.key,
        });

        tracing::info!(server = %server, port, instances = cfg.instances, "consumer: starting NSCA sender pool");

        let runtime = QueueRuntime::spawn(
            DEFAULT_QUEUE_CAPACITY,
            cfg.instances.max(1) as usize,
            move |result: ClassifiedResult, error_tx: mpsc::Sender<ConsumerError>, cancel: CancellationToken| {
                let server = server.clone();
                let encryption = encryption.clone();
                async move {
                    let outcome = tokio::select! {
                        outcome = deliver(&server, port, timeout, &encryption, &result) => outcome,
                        _ = cancel.cancelled() => return,
                    };
                    if let Err(err) = outcome {
                        warn!(server = %server, port, "consumer: nsca delivery failed: {err}");
                        let _ = error_tx.send(err).await;
                    }
                }
            },
        );

        Self { runtime, label }
    }
}

#[async_trait]
impl Consumer for NscaConsumer {
    fn name(&self) -> &str {
        &self.label
    }

    async fn submit(&self, result: ClassifiedResult, deadline: Duration) -> Result<(), ConsumerError> {
        self.runtime.submit(result, deadline).await
    }

    async fn next_error(&self) -> Option<ConsumerError> {
        self.runtime.next_error().await
    }

    async fn shutdown(&self) {
        self.runtime.shutdown().await;
    }
}
