use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme};
use x509_parser::prelude::*;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.sslCheck";
static EVENT_TYPE: &str = "SslCheckSample";
static PROVIDER: &str = "sslCheck";
static DEFAULT_PORT: u16 = 443;
static SECONDS_PER_DAY: i64 = 86_400;
static IO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SslCheckConfig {
    pub hosts: String,
}

impl SslCheckConfig {
    pub fn from_env(env: &Env) -> SslCheckConfig {
        SslCheckConfig { hosts: env.get("SSLCHECK_HOSTS") }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("SSLCHECK_HOSTS", &self.hosts)])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

/// Parses a comma separated list of `host[:port]` entries; IPv6 hosts need brackets.
pub fn parse_targets(hosts: &str) -> Result<Vec<Target>, Error> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_target)
        .collect()
}

fn parse_target(entry: &str) -> Result<Target, Error> {
    let (host, port) = if let Some(rest) = entry.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidConfig(format!("SSLCHECK_HOSTS entry '{}' lacks a closing ']'", entry)))?;
        (host, after.strip_prefix(':'))
    } else {
        match entry.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (entry, None),
        }
    };
    if host.is_empty() {
        return Err(Error::InvalidConfig(format!("SSLCHECK_HOSTS entry '{}' has no host", entry)));
    }
    let port = match port {
        Some(port) => config::parse_port("SSLCHECK_HOSTS", port)?,
        None => DEFAULT_PORT,
    };

    Ok(Target { host: host.to_string(), port })
}

pub struct SslCheck {
    id: Id,
    targets: Vec<Target>,
    provider: Arc<CryptoProvider>,
    roots: Arc<RootCertStore>,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = SslCheckConfig::from_env(env);
    config.validate()?;
    let targets = parse_targets(&config.hosts)?;
    if targets.is_empty() {
        return Err(Error::MissingConfig(vec!["SSLCHECK_HOSTS".to_string()]));
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let id = format!("sslCheck#{}", targets.iter().map(|t| format!("{}:{}", t.host, t.port)).join(","));
    info!("Created instance of sslCheck collector: {}", id);

    Ok(Box::new(SslCheck {
        id,
        targets,
        provider: Arc::new(crypto::ring::default_provider()),
        roots: Arc::new(roots),
    }))
}

impl Collector for SslCheck {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let now = Utc::now().timestamp();
        let metric_data = self
            .targets
            .iter()
            .map(|target| match self.check(target) {
                Ok((cert, chain_trusted)) => certificate_to_metric(target, &cert, chain_trusted, now),
                Err(err) => {
                    warn!("Failed to check certificate of {}:{}: {}", target.host, target.port, err);
                    failure_to_metric(target, &err)
                }
            })
            .collect::<Vec<_>>();
        debug!("metric_data = {:#?}", metric_data);

        Ok(metric_data)
    }
}

impl SslCheck {
    /// Handshakes with `target` and returns its leaf certificate plus whether the chain is trusted.
    fn check(&self, target: &Target) -> Result<(CertificateFacts, bool), Error> {
        let config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider: self.provider.clone() }))
            .with_no_client_auth();
        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|err| Error::InvalidConfig(format!("'{}' is not a valid server name: {}", target.host, err)))?;

        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Tls(format!("could not resolve {}", target.host)))?;
        let mut sock = TcpStream::connect_timeout(&addr, IO_TIMEOUT)?;
        sock.set_read_timeout(Some(IO_TIMEOUT))?;
        sock.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut conn = ClientConnection::new(Arc::new(config), server_name.clone())?;
        while conn.is_handshaking() {
            conn.complete_io(&mut sock)?;
        }

        let chain = conn
            .peer_certificates()
            .ok_or_else(|| Error::Tls(format!("{} presented no certificates", target.host)))?;
        let (leaf, intermediates) = chain
            .split_first()
            .ok_or_else(|| Error::Tls(format!("{} presented an empty certificate chain", target.host)))?;

        let cert = CertificateFacts::from_der(leaf)?;
        let chain_trusted = self.chain_trusted(leaf, intermediates, &server_name);
        conn.send_close_notify();
        let _ = conn.complete_io(&mut sock);

        Ok((cert, chain_trusted))
    }

    fn chain_trusted(
        &self,
        leaf: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
    ) -> bool {
        let verifier = match WebPkiServerVerifier::builder_with_provider(self.roots.clone(), self.provider.clone()).build()
        {
            Ok(verifier) => verifier,
            Err(err) => {
                warn!("Failed to build certificate verifier: {}", err);
                return false;
            }
        };
        match verifier.verify_server_cert(leaf, intermediates, server_name, &[], UnixTime::now()) {
            Ok(_) => true,
            Err(err) => {
                debug!("Certificate chain of {:?} is not trusted: {}", server_name, err);
                false
            }
        }
    }
}

/// Accepts every certificate so expired or self signed ones can still be inspected.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// The parts of a leaf certificate that end up in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    pub subject: String,
    pub issuer: String,
    pub not_before: i64,
    pub not_after: i64,
}

impl CertificateFacts {
    pub fn from_der(der: &[u8]) -> Result<CertificateFacts, Error> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|err| Error::Tls(format!("failed to parse X.509 certificate: {}", err)))?;
        let validity = cert.validity();

        Ok(CertificateFacts {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }
}

/// Builds the record for a certificate as seen at unix time `now`.
pub fn certificate_to_metric(target: &Target, cert: &CertificateFacts, chain_trusted: bool, now: i64) -> Metric {
    Metric::new(EVENT_TYPE, PROVIDER)
        .with("host", target.host.clone())
        .with("port", target.port)
        .with("subject", cert.subject.clone())
        .with("issuer", cert.issuer.clone())
        .with("notBefore", rfc3339(cert.not_before))
        .with("notAfter", rfc3339(cert.not_after))
        .with("daysLeft", (cert.not_after - now) / SECONDS_PER_DAY)
        .with("expired", now > cert.not_after)
        .with("chainTrusted", chain_trusted)
}

fn failure_to_metric(target: &Target, err: &Error) -> Metric {
    Metric::new(EVENT_TYPE, PROVIDER)
        .with("host", target.host.clone())
        .with("port", target.port)
        .with("error", err.to_string())
}

fn rfc3339(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
