// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TLS upgrade (spec §4.5 step 4): takes an already-connected plain
//! socket plus TLS parameters and returns a wrapped handle.
//!
//! Grounded on the Mozilla-root-store rustls setup pattern used for
//! async TCP clients in this corpus (`tls_rustls.rs` in the reference
//! pack), adapted to `tokio-rustls` for use inside an async driver loop
//! instead of a blocking `Read`/`Write` adapter.

use std::{io, sync::Arc, time::Duration};

use rustls::{ClientConfig, client::danger::ServerCertVerifier};
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::{TlsConnector, client::TlsStream};

use crate::cfg::config::TlsConfig as TlsParams;

#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn client_config(params: &TlsParams) -> Arc<ClientConfig> {
    if params.insecure_skip_verify {
        let mut cfg = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();
        cfg.enable_sni = true;
        return Arc::new(cfg);
    }

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// Perform the TLS handshake over an already-connected plain socket.
/// `timeout` matches the connect-timeout per spec §4.5 step 4.
pub async fn upgrade(
    stream: TcpStream,
    params: &TlsParams,
    default_server_name: &str,
    timeout: Duration,
) -> io::Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(client_config(params));
    let server_name = params
        .server_name
        .as_deref()
        .unwrap_or(default_server_name)
        .to_owned();
    let name = ServerName::try_from(server_name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    tokio::time::timeout(timeout, connector.connect(name, stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tls handshake timed out"))?
}
