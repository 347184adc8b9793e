// Exercises the NSCA consumer's wire client against a loopback TCP listener
// standing in for a real NSCA daemon, per the teacher's integration-test
// style: no mocking of the consumer itself, a real socket round-trip.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentrywatch_core::checker::{CheckResult, Checker, CheckerRef};
use sentrywatch_core::config::ConsumerConfig;
use sentrywatch_core::consumer::{ClassifiedResult, Consumer};
use sentrywatch_core::consumers::nsca::NscaConsumer;
use sentrywatch_core::severity::Severity;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

struct Dummy;

#[async_trait]
impl Checker for Dummy {
    fn kind(&self) -> &str {
        "Dummy"
    }
    fn service_name(&self) -> &str {
        "loopback-svc"
    }
    async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
        unreachable!()
    }
}

fn sample_result() -> ClassifiedResult {
    ClassifiedResult {
        severity: Severity::Critical,
        message: "disk at 97%, \"urgent\", check now".to_string(),
        checker: Arc::new(Dummy) as CheckerRef,
        hostname: "web-1".to_string(),
    }
}

// Handshake: 128-byte IV followed by a 4-byte big-endian server timestamp.
// The header that follows is: 2-byte version, 4-byte CRC, 4-byte timestamp,
// 2-byte state, then fixed-width host/service/message fields.
const HOST_FIELD_SIZE: usize = 64;
const SERVICE_FIELD_SIZE: usize = 128;
const MESSAGE_FIELD_SIZE: usize = 512;
const PACKET_SIZE: usize = 2 + 4 + 4 + 2 + HOST_FIELD_SIZE + SERVICE_FIELD_SIZE + MESSAGE_FIELD_SIZE;

#[tokio::test]
async fn delivers_a_well_formed_packet_to_a_loopback_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind loopback listener");
    let addr = listener.local_addr().expect("failed to read local addr");

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept failed");
        let iv = [7u8; 128];
        let mut handshake = Vec::with_capacity(132);
        handshake.extend_from_slice(&iv);
        handshake.extend_from_slice(&42u32.to_be_bytes());
        socket.write_all(&handshake).await.expect("handshake write failed");

        let mut packet = vec![0u8; PACKET_SIZE];
        socket.read_exact(&mut packet).await.expect("packet read failed");
        packet
    });

    let cfg = ConsumerConfig {
        kind: "NSCA".to_string(),
        server: addr.ip().to_string(),
        port: addr.port(),
        timeout: Duration::from_secs(2),
        encryption: 0,
        key: String::new(),
        instances: 1,
    };
    let consumer = NscaConsumer::new(cfg);

    consumer
        .submit(sample_result(), Duration::from_secs(2))
        .await
        .expect("submit failed");

    let packet = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server task timed out")
        .expect("server task panicked");

    assert_eq!(packet.len(), PACKET_SIZE);

    let state = i16::from_be_bytes(packet[10..12].try_into().unwrap());
    assert_eq!(state, Severity::Critical.wire_code());

    let host_field = &packet[12..12 + HOST_FIELD_SIZE];
    assert!(String::from_utf8_lossy(host_field).starts_with("web-1"));

    let service_field = &packet[12 + HOST_FIELD_SIZE..12 + HOST_FIELD_SIZE + SERVICE_FIELD_SIZE];
    assert!(String::from_utf8_lossy(service_field).starts_with("loopback-svc"));

    let message_field = &packet[12 + HOST_FIELD_SIZE + SERVICE_FIELD_SIZE..];
    let message = String::from_utf8_lossy(message_field);
    assert!(message.contains("disk at 97%"));
    assert!(!message.contains(','));
    assert!(!message.contains('"'));

    consumer.shutdown().await;
}
