//! API-key request signing.
//!
//! The compute API authenticates every request with an HTTP signature
//! (`Signature version="1"`). The key id is `tenancy/user/fingerprint` and the
//! signature is RSA-SHA256 over a fixed list of headers. Writes additionally
//! sign a SHA-256 digest of the body.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, Url};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};

use super::GatewayError;

const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const REQUEST_TARGET: &str = "(request-target)";
const CONTENT_SHA256: &str = "x-content-sha256";

/// Identity of the API signing key.
#[derive(Clone)]
pub struct ApiKeyCredentials {
    pub tenancy_id: String,
    pub user_id: String,
    pub fingerprint: String,

    /// PEM-encoded RSA private key, PKCS#8 or PKCS#1.
    pub private_key_pem: String,
}

impl ApiKeyCredentials {
    pub fn key_id(&self) -> String {
        format!("{}/{}/{}", self.tenancy_id, self.user_id, self.fingerprint)
    }
}

impl fmt::Debug for ApiKeyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredentials")
            .field("tenancy_id", &self.tenancy_id)
            .field("user_id", &self.user_id)
            .field("fingerprint", &self.fingerprint)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Signs outgoing requests in place.
pub struct RequestSigner {
    key_id: String,
    key: SigningKey<Sha256>,
}

impl RequestSigner {
    /// Parse the private key. Encrypted keys are not supported.
    pub fn new(credentials: &ApiKeyCredentials) -> Result<Self, GatewayError> {
        let pem = credentials.private_key_pem.trim();
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| GatewayError::Signing(format!("unreadable private key: {e}")))?;

        Ok(Self {
            key_id: credentials.key_id(),
            key: SigningKey::<Sha256>::new(key),
        })
    }

    /// Add `date`, `host`, body digest headers and `authorization`.
    pub fn sign(&self, request: &mut Request) -> Result<(), GatewayError> {
        self.sign_at(request, Utc::now())
    }

    fn sign_at(&self, request: &mut Request, now: DateTime<Utc>) -> Result<(), GatewayError> {
        let mut signed: Vec<(&'static str, String)> = vec![
            ("date", now.format(DATE_FORMAT).to_string()),
            (REQUEST_TARGET, request_target(request.method(), request.url())),
            ("host", host(request.url())?),
        ];

        if matches!(*request.method(), Method::POST | Method::PUT) {
            let body = request
                .body()
                .and_then(|body| body.as_bytes())
                .unwrap_or_default();
            let content_type = request
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("application/json")
                .to_string();

            signed.push((CONTENT_SHA256, STANDARD.encode(Sha256::digest(body))));
            signed.push(("content-type", content_type));
            signed.push(("content-length", body.len().to_string()));
        }

        let signature = self
            .key
            .try_sign(signing_string(&signed).as_bytes())
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        let names = signed
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(" ");
        let authorization = format!(
            r#"Signature version="1",keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
            self.key_id,
            names,
            STANDARD.encode(signature.to_bytes())
        );

        let headers = request.headers_mut();
        for (name, value) in &signed {
            if *name == REQUEST_TARGET {
                continue;
            }
            headers.insert(HeaderName::from_static(*name), header_value(value)?);
        }
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }
}

fn signing_string(signed: &[(&str, String)]) -> String {
    signed
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn request_target(method: &Method, url: &Url) -> String {
    let mut target = format!("{} {}", method.as_str().to_ascii_lowercase(), url.path());
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

fn host(url: &Url) -> Result<String, GatewayError> {
    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::Signing(format!("URL has no host: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn header_value(value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value)
        .map_err(|e| GatewayError::Signing(format!("invalid header value: {e}")))
}
