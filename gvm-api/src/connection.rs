//! GMP transport layer.
//!
//! gvmd speaks GMP as a plain exchange of XML documents over a TLS socket or
//! a local Unix socket, with no length prefix or message terminator. This
//! module owns the socket, writes one command at a time and reads until the
//! response's root element closes.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::CryptoProvider;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::{GvmConfig, GvmError, Result};

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// A connected GMP transport.
///
/// Created by [`GvmConnection::connect`]; the Unix socket transport is used
/// when the configuration carries a socket path, TLS otherwise.
pub struct GvmConnection {
    transport: Transport,
    response_timeout_secs: u64,
}

enum Transport {
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl GvmConnection {
    /// Establish the transport selected by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be connected, the TLS trust
    /// settings are invalid, the handshake fails, or the connect deadline
    /// is exceeded.
    pub async fn connect(config: &GvmConfig) -> Result<Self> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        #[cfg(unix)]
        if let Some(path) = &config.socket_path {
            debug!("Connecting to gvmd Unix socket {}", path.display());
            let stream = timeout(connect_timeout, UnixStream::connect(path))
                .await
                .map_err(|_| GvmError::Timeout {
                    operation: "connect",
                    seconds: config.connect_timeout_secs,
                })??;
            return Ok(Self {
                transport: Transport::Unix(stream),
                response_timeout_secs: config.response_timeout_secs,
            });
        }

        let tls_config = build_tls_config(config)?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(config.host.clone()).map_err(|_| {
            GvmError::InvalidConfig(format!("invalid GVM host name: {}", config.host))
        })?;

        debug!("Connecting to gvmd at {}:{}", config.host, config.port);
        let tcp = timeout(
            connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| GvmError::Timeout {
            operation: "connect",
            seconds: config.connect_timeout_secs,
        })??;

        let stream = timeout(connect_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| GvmError::Timeout {
                operation: "TLS handshake",
                seconds: config.connect_timeout_secs,
            })??;

        Ok(Self {
            transport: Transport::Tls(Box::new(stream)),
            response_timeout_secs: config.response_timeout_secs,
        })
    }

    /// Send one GMP command and read its response document.
    ///
    /// # Errors
    ///
    /// Returns an error on socket I/O failure, on the read deadline, when
    /// the peer closes mid-document, or when the response is not UTF-8.
    pub async fn send_request(&mut self, command: &str) -> Result<String> {
        // Command text can carry credentials, so only the size is logged.
        debug!("Sending GMP command ({} bytes)", command.len());
        self.write_all(command.as_bytes()).await?;
        let response = self.read_document().await?;
        debug!("Received GMP response ({} bytes)", response.len());
        Ok(response)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.transport {
            Transport::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            #[cfg(unix)]
            Transport::Unix(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.transport {
            Transport::Tls(stream) => stream.read(buf).await,
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf).await,
        }
    }

    async fn read_document(&mut self) -> Result<String> {
        let response_timeout = Duration::from_secs(self.response_timeout_secs);
        let mut document: Vec<u8> = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = timeout(response_timeout, self.read_chunk(&mut chunk))
                .await
                .map_err(|_| GvmError::Timeout {
                    operation: "response read",
                    seconds: self.response_timeout_secs,
                })??;
            if n == 0 {
                return Err(GvmError::InvalidResponse(
                    "connection closed before the response completed".to_string(),
                ));
            }
            document.extend_from_slice(&chunk[..n]);
            // A document can only complete on a chunk that closes a tag.
            if chunk[..n].contains(&b'>') && document_complete(&document) {
                break;
            }
        }

        Ok(String::from_utf8(document)?)
    }
}

/// Check whether `buf` holds one complete XML document.
///
/// Scans events until the root element closes. A truncated document (or a
/// parse error mid-token, which looks the same on a partial buffer) reports
/// incomplete; the caller's read deadline bounds how long we wait for the
/// rest.
fn document_complete(buf: &[u8]) -> bool {
    let mut reader = Reader::from_reader(buf);
    let mut depth: usize = 0;
    let mut saw_element = false;
    let mut scratch = Vec::new();

    loop {
        match reader.read_event_into(&mut scratch) {
            Ok(Event::Start(_)) => {
                depth += 1;
                saw_element = true;
            }
            Ok(Event::End(_)) => {
                if depth <= 1 {
                    return saw_element;
                }
                depth -= 1;
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    return true;
                }
            }
            Ok(Event::Eof) => return false,
            Ok(_) => {}
            Err(_) => return false,
        }
        scratch.clear();
    }
}

fn build_tls_config(config: &GvmConfig) -> Result<ClientConfig> {
    // The provider is pinned explicitly so the choice does not depend on
    // which rustls backends other dependencies enable.
    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let builder =
        ClientConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    if !config.validate_certificates {
        warn!("⚠️ TLS certificate validation is disabled for the GVM connection");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    if let Some(ca_path) = &config.ca_cert {
        let file = File::open(ca_path).map_err(|e| {
            GvmError::InvalidConfig(format!("cannot open CA file {}: {e}", ca_path.display()))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| {
                GvmError::InvalidConfig(format!("cannot read CA file {}: {e}", ca_path.display()))
            })?;
        let (added, _) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(GvmError::InvalidConfig(format!(
                "no usable certificates in CA file {}",
                ca_path.display()
            )));
        }
    } else {
        let loaded = rustls_native_certs::load_native_certs();
        for error in &loaded.errors {
            warn!("Platform trust store: {error}");
        }
        let (added, _) = roots.add_parsable_certificates(loaded.certs);
        if added == 0 {
            return Err(GvmError::InvalidConfig(
                "no usable certificates in the platform trust store".to_string(),
            ));
        }
    }

    Ok(builder
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Verifier for deployments running gvmd with its generated self-signed
/// certificate. Skips chain and hostname checks but still verifies the
/// handshake signatures, keeping the session encrypted.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        tokio_rustls::rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        tokio_rustls::rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
