//! Authentication of inbound webhooks.
//!
//! Two HMAC-SHA256 schemes are supported, selected by [`Provider`]:
//!
//! - **Body-keyed** (commerce platform): `base64(HMAC(secret, body))`, sent in
//!   `X-Shopify-Hmac-Sha256`. Both sides are compared as raw bytes.
//! - **Timestamp-keyed** (chat platform): `"v0=" + hex(HMAC(secret,
//!   "v0:" + timestamp + ":" + body))`, sent in `X-Slack-Signature` with the
//!   timestamp in `X-Slack-Request-Timestamp`. The full prefixed string is
//!   compared.
//!
//! Every comparison is constant-time. Secrets come from a [`SecretResolver`]
//! owned by the service root; when the caller does not name an identity, every
//! secret registered for the provider is tried in registration order and the
//! first match wins.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Environment, SecretIdentity, VerificationError};

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Providers and envelopes
// ---------------------------------------------------------------------------

/// A webhook sender and, with it, a signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Commerce platform; body-keyed scheme.
    Commerce,
    /// Chat platform; timestamp-keyed scheme.
    Chat,
}

impl Provider {
    /// Lowercase header carrying the signature.
    pub fn signature_header(self) -> &'static str {
        match self {
            Self::Commerce => "x-shopify-hmac-sha256",
            Self::Chat => "x-slack-signature",
        }
    }

    /// Lowercase header carrying the request timestamp, if the scheme uses one.
    pub fn timestamp_header(self) -> Option<&'static str> {
        match self {
            Self::Commerce => None,
            Self::Chat => Some("x-slack-request-timestamp"),
        }
    }

    /// Short name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commerce => "commerce",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound webhook exactly as received.
///
/// Never mutated; consumed by verification and then handed to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    raw_body: Vec<u8>,
    headers: BTreeMap<String, String>,
    provided_signature: Option<String>,
    timestamp: Option<String>,
}

impl WebhookEnvelope {
    /// Builds an envelope from the raw body and request headers.
    ///
    /// Header names are matched case-insensitively. Empty signature or
    /// timestamp headers are treated as absent.
    pub fn from_parts<K, V>(
        provider: Provider,
        raw_body: impl Into<Vec<u8>>,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers: BTreeMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        let non_empty = |name: &str| {
            headers
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let provided_signature = non_empty(provider.signature_header());
        let timestamp = provider.timestamp_header().and_then(non_empty);

        Self {
            raw_body: raw_body.into(),
            headers,
            provided_signature,
            timestamp,
        }
    }

    /// The body bytes exactly as received.
    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Looks up a header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The signature the sender supplied, if any.
    pub fn provided_signature(&self) -> Option<&str> {
        self.provided_signature.as_deref()
    }

    /// The request timestamp the sender supplied, if any.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// A webhook signing secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps a secret, returning `None` if it is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// One candidate secret and the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSecret {
    /// Owner of the secret.
    pub identity: SecretIdentity,
    /// The secret itself.
    pub secret: SecretValue,
}

/// Environment-scoped store of webhook secrets, owned by the service root.
///
/// Secrets are kept per provider in registration order. That order is the
/// probe order when no identity is named, so verification outcomes are
/// reproducible.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    environment: Environment,
    secrets: BTreeMap<Provider, Vec<NamedSecret>>,
}

impl SecretResolver {
    /// Creates an empty resolver for `environment`.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            secrets: BTreeMap::new(),
        }
    }

    /// Registers a secret for `provider`. Later registrations are probed later.
    ///
    /// Registering the same identity twice replaces the earlier secret in
    /// place, keeping its probe position.
    pub fn with_secret(mut self, provider: Provider, identity: SecretIdentity, secret: SecretValue) -> Self {
        let list = self.secrets.entry(provider).or_default();
        match list.iter_mut().find(|s| s.identity == identity) {
            Some(existing) => existing.secret = secret,
            None => list.push(NamedSecret { identity, secret }),
        }
        self
    }

    /// The environment this resolver was configured for.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the ordered candidate secrets for `provider`.
    ///
    /// With an explicit `identity`, at most that one secret is returned.
    pub fn candidates(&self, provider: Provider, identity: Option<&SecretIdentity>) -> Vec<&NamedSecret> {
        let all = self.secrets.get(&provider).map(Vec::as_slice).unwrap_or(&[]);
        match identity {
            Some(id) => all.iter().filter(|s| &s.identity == id).collect(),
            None => all.iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

fn mac_for(secret: &[u8]) -> Option<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(secret).ok()
}

/// Computes the body-keyed signature: `base64(HMAC-SHA256(secret, body))`.
pub fn sign_body(secret: &SecretValue, body: &[u8]) -> String {
    match mac_for(secret.as_bytes()) {
        Some(mut mac) => {
            mac.update(body);
            BASE64.encode(mac.finalize().into_bytes())
        }
        None => String::new(),
    }
}

/// Computes the timestamp-keyed signature:
/// `"v0=" + hex(HMAC-SHA256(secret, "v0:" + timestamp + ":" + body))`.
pub fn sign_timestamped(secret: &SecretValue, timestamp: &str, body: &[u8]) -> String {
    match mac_for(secret.as_bytes()) {
        Some(mut mac) => {
            mac.update(b"v0:");
            mac.update(timestamp.as_bytes());
            mac.update(b":");
            mac.update(body);
            format!("v0={}", hex::encode(mac.finalize().into_bytes()))
        }
        None => String::new(),
    }
}

fn body_signature_matches(secret: &SecretValue, body: &[u8], provided: &[u8]) -> bool {
    match mac_for(secret.as_bytes()) {
        Some(mut mac) => {
            mac.update(body);
            mac.verify_slice(provided).is_ok()
        }
        None => false,
    }
}

fn timestamped_signature_matches(secret: &SecretValue, timestamp: &str, body: &[u8], provided: &str) -> bool {
    let expected = sign_timestamped(secret, timestamp, body);
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Successful verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verified {
    /// The signature matched the secret of `identity`.
    Matched {
        /// Identity whose secret matched.
        identity: SecretIdentity,
    },
    /// No secret is configured and the environment is not production; the
    /// webhook was accepted without checking its signature.
    Unchecked,
}

/// Verifies webhook envelopes for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureVerifier {
    provider: Provider,
}

impl SignatureVerifier {
    /// Creates a verifier for `provider`'s scheme.
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }

    /// The provider whose scheme this verifier applies.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Verifies `envelope`, returning `true` only for an authentic webhook
    /// (or an unchecked one in a non-production environment with no secret).
    ///
    /// Never panics or errors; every failure resolves to `false`.
    pub fn verify(
        &self,
        envelope: &WebhookEnvelope,
        resolver: &SecretResolver,
        identity: Option<&SecretIdentity>,
    ) -> bool {
        match self.check(envelope, resolver, identity) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(provider = %self.provider, error = %err, "Webhook verification failed");
                false
            }
        }
    }

    /// Verifies `envelope`, reporting why verification failed.
    pub fn check(
        &self,
        envelope: &WebhookEnvelope,
        resolver: &SecretResolver,
        identity: Option<&SecretIdentity>,
    ) -> Result<Verified, VerificationError> {
        let candidates = resolver.candidates(self.provider, identity);
        if candidates.is_empty() {
            if resolver.environment().is_production() {
                return Err(VerificationError::SecretNotConfigured {
                    provider: self.provider.to_string(),
                    identity: identity.cloned(),
                });
            }
            tracing::warn!(
                provider = %self.provider,
                environment = %resolver.environment(),
                "No webhook secret configured; accepting unverified webhook outside production"
            );
            return Ok(Verified::Unchecked);
        }

        let provided = envelope
            .provided_signature()
            .ok_or(VerificationError::SignatureMissing)?;

        let matched = match self.provider {
            Provider::Commerce => {
                let Ok(decoded) = BASE64.decode(provided) else {
                    return Err(VerificationError::SignatureMismatch);
                };
                candidates
                    .into_iter()
                    .find(|c| body_signature_matches(&c.secret, envelope.raw_body(), &decoded))
            }
            Provider::Chat => {
                let timestamp = envelope
                    .timestamp()
                    .ok_or(VerificationError::TimestampMissing)?;
                candidates.into_iter().find(|c| {
                    timestamped_signature_matches(&c.secret, timestamp, envelope.raw_body(), provided)
                })
            }
        };

        match matched {
            Some(secret) => {
                tracing::debug!(provider = %self.provider, identity = %secret.identity, "Webhook signature verified");
                Ok(Verified::Matched {
                    identity: secret.identity.clone(),
                })
            }
            None => Err(VerificationError::SignatureMismatch),
        }
    }
}
