//! Admission control for large requests.
//!
//! Requests whose estimated track count exceeds the free threshold need the
//! operator's shared secret. The secret is kept only as an HMAC-SHA256 tag and
//! candidates are checked with `Mac::verify_slice`, which compares in constant time.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use sha2::Sha256;

use crate::core::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Fixed HMAC key; the tag only has to be stable, not secret
const CREDENTIAL_KEY: &[u8] = b"melodrop-access-credential";

fn credential_mac(value: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(CREDENTIAL_KEY).map_err(|e| anyhow!("HMAC key rejected: {}", e))?;
    mac.update(value.as_bytes());
    Ok(mac)
}

/// Hex tag stored in `access_secret_hash` for a given secret.
pub fn credential_tag(secret: &str) -> Result<String> {
    Ok(hex::encode(credential_mac(secret)?.finalize().into_bytes()))
}

/// The operator's shared secret, reduced to its tag.
pub struct AccessCredential {
    tag: Option<SecretSlice<u8>>,
}

impl AccessCredential {
    /// No secret configured: every credential is rejected.
    pub fn disabled() -> Self {
        Self { tag: None }
    }

    /// Builds the credential from a plain secret or a pre-computed hex tag.
    /// The plain secret wins when both are given.
    pub fn from_config(secret: Option<&SecretString>, hex_tag: Option<&str>) -> Result<Self> {
        if let Some(secret) = secret.filter(|s| !s.expose_secret().is_empty()) {
            let tag = credential_mac(secret.expose_secret())?.finalize().into_bytes().to_vec();
            return Ok(Self {
                tag: Some(SecretSlice::from(tag)),
            });
        }

        match hex_tag.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hex_tag) => {
                let tag = hex::decode(hex_tag).map_err(|e| anyhow!("access_secret_hash is not valid hex: {}", e))?;
                if tag.len() != 32 {
                    return Err(anyhow!(
                        "access_secret_hash must be 32 bytes (64 hex chars), got {}",
                        tag.len()
                    ));
                }
                Ok(Self {
                    tag: Some(SecretSlice::from(tag)),
                })
            }
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.tag.is_some()
    }

    /// Exact-match check of a candidate against the configured secret.
    pub fn verify(&self, candidate: &str) -> bool {
        let Some(tag) = &self.tag else {
            return false;
        };
        if candidate.is_empty() {
            return false;
        }
        match credential_mac(candidate) {
            Ok(mac) => mac.verify_slice(tag.expose_secret()).is_ok(),
            Err(_) => false,
        }
    }
}

/// Threshold plus credential.
pub struct AdmissionPolicy {
    free_threshold: u32,
    credential: AccessCredential,
}

impl AdmissionPolicy {
    pub fn new(free_threshold: u32, credential: AccessCredential) -> Self {
        Self {
            free_threshold,
            credential,
        }
    }

    pub fn free_threshold(&self) -> u32 {
        self.free_threshold
    }

    pub fn requires_credential(&self, total_tracks: u32) -> bool {
        total_tracks > self.free_threshold
    }

    pub fn has_valid_credential(&self, credential: Option<&str>) -> bool {
        credential.is_some_and(|c| self.credential.verify(c))
    }

    /// Admits `total_tracks` when under the threshold or with a valid credential.
    pub fn check(&self, total_tracks: u32, credential: Option<&str>) -> AppResult<()> {
        if !self.requires_credential(total_tracks) || self.has_valid_credential(credential) {
            return Ok(());
        }

        let reason = if credential.is_some() {
            "invalid credential"
        } else {
            "a credential is required"
        };
        Err(AppError::AdmissionDenied(format!(
            "Request expands to {} tracks, over the free limit of {}: {}",
            total_tracks, self.free_threshold, reason
        )))
    }
}
