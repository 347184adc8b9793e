//! SSL checker: connects over TLS and classifies by certificate expiry.
//! Grounded on `plugins/ssl/{ssl.go,config.go}`; uses `tokio-rustls` in
//! place of the source's `crypto/tls`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls_pki_types::{CertificateDer, ServerName};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::info;

use super::decode_config;
use crate::checker::{CheckResult, Checker, CheckerFactory, CheckerRef};
use crate::config::parse_duration_str;
use crate::error::CheckerConstructError;
use crate::severity::Severity;

pub const KIND: &str = "SSL";

#[derive(Debug, Clone, Deserialize)]
pub struct SslConfigRaw {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub warn: Option<String>,
    #[serde(default)]
    pub crit: Option<String>,
    /// Overrides the global periodicity for this check. Certificate
    /// expiry moves on the scale of days, so operators commonly want
    /// SSL checks running far less often than e.g. HTTP probes.
    #[serde(default)]
    pub periodicity: Option<String>,
}

/// Upper bound on the combined TCP connect + TLS handshake, separate from
/// the scheduler deadline: a handshake has no business taking this long
/// even when the deadline would otherwise allow it.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SslChecker {
    name: String,
    host: String,
    warning: Duration,
    critical: Duration,
    periodicity: Option<Duration>,
}

#[async_trait]
impl Checker for SslChecker {
    fn kind(&self) -> &str {
        KIND
    }

    fn service_name(&self) -> &str {
        &self.name
    }

    fn periodicity(&self) -> Option<Duration> {
        self.periodicity
    }

    async fn run(self: Arc<Self>, deadline: Instant) -> CheckResult {
        match self.clone().inspect_certificate(deadline).await {
            Ok(result) => result,
            Err(reason) => CheckResult {
                severity: Severity::Critical,
                message: reason,
                checker: self,
            },
        }
    }
}

impl SslChecker {
    async fn inspect_certificate(self: Arc<Self>, deadline: Instant) -> Result<CheckResult, String> {
        let (host, port) = split_host_port(&self.host);
        let handshake_budget = HANDSHAKE_TIMEOUT.min(deadline.saturating_duration_since(Instant::now()));

        let tls_stream = tokio::time::timeout(handshake_budget, connect_and_handshake(host.clone(), port))
            .await
            .map_err(|_| "can't dial host: connect + handshake timed out".to_string())??;

        let (_, session) = tls_stream.get_ref();
        let chain = session
            .peer_certificates()
            .ok_or_else(|| format!("no certificate found for {:?}", self.host))?;

        let least = least_expiring(chain)?;
        let remaining = least
            .not_after
            .checked_sub(now_unix())
            .map(Duration::from_secs)
            .unwrap_or_default();

        if least.not_after <= now_unix() {
            return Ok(CheckResult {
                severity: Severity::Critical,
                message: format!("certificate expired: {:?}", least.subject),
                checker: self,
            });
        }

        if remaining < self.critical {
            return Ok(CheckResult {
                severity: Severity::Critical,
                message: format!("expiration due in {remaining:?} for {:?}", least.subject),
                checker: self,
            });
        }
        if remaining < self.warning {
            return Ok(CheckResult {
                severity: Severity::Warning,
                message: format!("expiration due in {remaining:?} for {:?}", least.subject),
                checker: self,
            });
        }

        Ok(CheckResult {
            severity: Severity::Ok,
            message: format!("{:?} expires in {remaining:?}", least.subject),
            checker: self,
        })
    }
}

/// Dials `host:port` and completes the TLS handshake. Kept separate from
/// `inspect_certificate` so the whole thing — connect and handshake
/// together — can be wrapped in a single deadline-bounded
/// `tokio::time::timeout` by the caller.
async fn connect_and_handshake(
    host: String,
    port: u16,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, String> {
    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|err| format!("can't dial host: {err}"))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots_certs());
    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

    let server_name = ServerName::try_from(host.clone()).map_err(|_| format!("invalid server name {host:?}"))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|err| format!("can't dial host: {err}"))
}

struct CertSummary {
    subject: String,
    not_after: u64,
}

fn least_expiring(chain: &[CertificateDer<'static>]) -> Result<CertSummary, String> {
    let mut least: Option<CertSummary> = None;
    for cert in chain {
        let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
            .map_err(|err| format!("unable to parse certificate: {err}"))?;
        let not_after = parsed.validity().not_after.timestamp().max(0) as u64;
        let subject = parsed.subject().to_string();

        if least.as_ref().map(|l| not_after < l.not_after).unwrap_or(true) {
            least = Some(CertSummary { subject, not_after });
        }
    }
    least.ok_or_else(|| "no certificate found".to_string())
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn webpki_roots_certs() -> Vec<rustls_pki_types::TrustAnchor<'static>> {
    webpki_roots::TLS_SERVER_ROOTS.to_vec()
}

fn split_host_port(host: &str) -> (String, u16) {
    if let Some((h, p)) = host.rsplit_once(':') {
        if let Ok(port) = p.parse() {
            return (h.to_string(), port);
        }
    }
    (host.to_string(), 443)
}

fn build(
    checker_cfg: &serde_json::Value,
    _plugin_cfg: &serde_json::Value,
) -> Result<CheckerRef, CheckerConstructError> {
    let raw: SslConfigRaw = decode_config(KIND, checker_cfg)?;

    let parse = |text: &Option<String>, default_secs: u64| -> Result<Duration, CheckerConstructError> {
        match text {
            Some(text) => parse_duration_str(text).map_err(|reason| CheckerConstructError::InvalidConfig {
                kind: KIND.to_string(),
                reason,
            }),
            None => Ok(Duration::from_secs(default_secs)),
        }
    };

    let warning = parse(&raw.warn, 30 * 24 * 3600)?;
    let critical = parse(&raw.crit, 7 * 24 * 3600)?;

    let periodicity = raw
        .periodicity
        .as_deref()
        .map(|text| {
            parse_duration_str(text).map_err(|reason| CheckerConstructError::InvalidConfig {
                kind: KIND.to_string(),
                reason,
            })
        })
        .transpose()?;

    let host = if raw.host.contains(':') {
        raw.host.clone()
    } else {
        format!("{}:443", raw.host)
    };

    info!(host = %host, "SSL: checker activated");
    Ok(Arc::new(SslChecker {
        name: raw.name,
        host,
        warning,
        critical,
        periodicity,
    }))
}

pub fn factory() -> CheckerFactory {
    Arc::new(build)
}
