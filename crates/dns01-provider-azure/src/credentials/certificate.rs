// # Service Principal Certificate Credential
//
// Client-credentials grant authenticated with a signed client assertion
// instead of a secret:
//
// ```http
// POST {authority}/{tenant}/oauth2/v2.0/token
//
// grant_type=client_credentials
// &client_assertion_type=urn:ietf:params:oauth:client-assertion-type:jwt-bearer
// &client_assertion={PS256 JWT, header x5t#S256 = certificate thumbprint}
// &client_id=...&scope=...
// ```
//
// The PEM file holds the certificate and its unencrypted RSA private key.
// It is read once, when the credential is built; a fresh assertion is
// signed for every token request.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{Error, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{JWT_BEARER_ASSERTION, http_client, read_token_response, token_transport_error};

/// Lifetime of a signed assertion
const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Signing key and thumbprint loaded from a PEM file
struct SigningCertificate {
    /// ⚠️ NEVER log this value
    key: EncodingKey,
    /// Base64url SHA-256 of the DER certificate
    thumbprint: String,
}

impl SigningCertificate {
    fn from_pem(pem_bytes: &[u8], origin: &str) -> Result<Self> {
        let blocks = pem::parse_many(pem_bytes)
            .map_err(|e| Error::config(format!("Certificate {} is not valid PEM: {}", origin, e)))?;

        let certificate = blocks
            .iter()
            .find(|block| block.tag() == "CERTIFICATE")
            .ok_or_else(|| Error::config(format!("Certificate {} contains no certificate", origin)))?;

        if blocks.iter().any(|block| block.tag() == "ENCRYPTED PRIVATE KEY") {
            return Err(Error::config(format!(
                "Certificate {} has an encrypted private key; password-protected keys are not supported",
                origin
            )));
        }
        let private_key = blocks
            .iter()
            .find(|block| matches!(block.tag(), "PRIVATE KEY" | "RSA PRIVATE KEY"))
            .ok_or_else(|| Error::config(format!("Certificate {} contains no private key", origin)))?;

        let key = EncodingKey::from_rsa_pem(pem::encode(private_key).as_bytes()).map_err(|e| {
            Error::config(format!("Certificate {} private key is not an RSA key: {}", origin, e))
        })?;

        Ok(Self {
            key,
            thumbprint: URL_SAFE_NO_PAD.encode(Sha256::digest(certificate.contents())),
        })
    }
}

/// Claims of a client assertion
#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// Entra ID application authenticating with a certificate
pub struct CertificateCredential {
    tenant_id: String,
    client_id: String,
    certificate_path: PathBuf,
    signing: SigningCertificate,
    authority_host: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CertificateCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("certificate_path", &self.certificate_path)
            .field("thumbprint", &self.signing.thumbprint)
            .field("private_key", &"<REDACTED>")
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl CertificateCredential {
    /// Create a credential from a PEM file holding certificate and key
    ///
    /// An unreadable file, or one without a certificate and an RSA key, is
    /// a configuration error.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        certificate_path: impl Into<PathBuf>,
        authority_host: impl Into<String>,
    ) -> Result<Self> {
        let certificate_path = certificate_path.into();
        let pem_bytes = std::fs::read(&certificate_path).map_err(|e| {
            Error::config(format!(
                "Cannot read certificate {}: {}",
                certificate_path.display(),
                e
            ))
        })?;
        let signing =
            SigningCertificate::from_pem(&pem_bytes, &certificate_path.display().to_string())?;

        Ok(Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            certificate_path,
            signing,
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    /// Path of the PEM file
    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    /// Base64url SHA-256 thumbprint sent as `x5t#S256`
    pub fn thumbprint(&self) -> &str {
        &self.signing.thumbprint
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }

    fn sign_assertion(&self, audience: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: audience,
            iss: &self.client_id,
            sub: &self.client_id,
            jti: format!("{:032x}", rand::random::<u128>()),
            nbf: now,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::PS256);
        header.x5t_s256 = Some(self.signing.thumbprint.clone());

        jsonwebtoken::encode(&header, &claims, &self.signing.key)
            .map_err(|e| Error::auth(format!("service_principal_certificate: cannot sign assertion: {}", e)))
    }
}

#[async_trait]
impl TokenSource for CertificateCredential {
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken> {
        let token_url = self.token_url();
        let assertion = self.sign_assertion(&token_url)?;
        tracing::debug!(
            tenant = %self.tenant_id,
            client_id = %self.client_id,
            thumbprint = %self.signing.thumbprint,
            "Requesting service principal token with certificate"
        );

        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_assertion_type", JWT_BEARER_ASSERTION),
                ("client_assertion", assertion.as_str()),
                ("client_id", self.client_id.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| token_transport_error(self.source_name(), e))?;

        read_token_response(response, self.source_name()).await
    }

    fn source_name(&self) -> &'static str {
        "service_principal_certificate"
    }
}
