//! Ephemeral self-signed certificates for TLS interception.
//!
//! Each intercepted connection gets a freshly generated key pair and a
//! self-signed certificate. Nothing is written to disk and nothing is cached:
//! the certificate lives exactly as long as the handshake that uses it.
//!
//! Certificates are valid for 24 hours from creation. Clients are expected to
//! skip verification, so there is no issuing CA and no trust chain.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Certificate validity window.
pub const CERT_VALIDITY_HOURS: i64 = 24;

/// Errors from certificate synthesis.
#[derive(Debug, Error)]
pub enum CertError {
    /// Key pair generation failed.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Building or signing the certificate failed.
    #[error("Certificate generation failed: {0}")]
    CertGeneration(String),

    /// The requested common name is empty.
    #[error("Common name must not be empty")]
    EmptyCommonName,
}

/// A single-use self-signed certificate and its private key.
pub struct EphemeralCertificate {
    common_name: String,
    cert_der: CertificateDer<'static>,
    key_der: PrivatePkcs8KeyDer<'static>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl EphemeralCertificate {
    /// Generate a new key pair and self-signed certificate for `common_name`.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or key/certificate generation fails.
    pub fn generate(common_name: &str) -> Result<Self, CertError> {
        if common_name.is_empty() {
            return Err(CertError::EmptyCommonName);
        }

        debug!("Generating ephemeral certificate for CN={}", common_name);

        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384)
            .map_err(|e| CertError::KeyGeneration(e.to_string()))?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let not_before = OffsetDateTime::now_utc();
        let not_after = not_before + Duration::hours(CERT_VALIDITY_HOURS);
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertError::CertGeneration(e.to_string()))?;

        Ok(Self {
            common_name: common_name.to_string(),
            cert_der: cert.der().clone(),
            key_der: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
            not_before,
            not_after,
        })
    }

    /// Common name the certificate was issued for.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// DER-encoded certificate.
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Consume into the chain/key pair rustls expects.
    pub fn into_rustls_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (vec![self.cert_der], PrivateKeyDer::Pkcs8(self.key_der))
    }
}

impl std::fmt::Debug for EphemeralCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralCertificate")
            .field("common_name", &self.common_name)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}
