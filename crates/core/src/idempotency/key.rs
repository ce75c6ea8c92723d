//! Idempotency key, scope, and request fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use uuid::Uuid;
use defter_shared::types::{LegalEntityId, TenantId};

use super::error::IdempotencyError;

/// Maximum accepted key length.
const MAX_KEY_LEN: usize = 128;

/// Caller-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validates a raw key: trimmed, 1..=128 printable ASCII characters.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::InvalidKey` for empty, oversized, or non-printable keys.
    pub fn parse(raw: &str) -> Result<Self, IdempotencyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdempotencyError::InvalidKey("key is empty".into()));
        }
        if trimmed.len() > MAX_KEY_LEN {
            return Err(IdempotencyError::InvalidKey(format!(
                "key exceeds {MAX_KEY_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_graphic()) {
            return Err(IdempotencyError::InvalidKey(
                "key must be printable ASCII without spaces".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = IdempotencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(value: IdempotencyKey) -> Self {
        value.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespace a key lives in.
///
/// Two requests collide only when tenant, rendered scope, and key are all equal, so
/// the same key used on two registers produces two effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyScope {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Operation family, e.g. `settlement` or `run.post`.
    pub operation: String,
    /// Legal entity, when the operation is entity scoped.
    pub legal_entity_id: Option<LegalEntityId>,
    /// Target resource such as a register or run.
    pub resource_id: Option<Uuid>,
}

impl IdempotencyScope {
    /// Creates a scope for an operation within a tenant.
    #[must_use]
    pub fn new(tenant_id: TenantId, operation: impl Into<String>) -> Self {
        Self {
            tenant_id,
            operation: operation.into(),
            legal_entity_id: None,
            resource_id: None,
        }
    }

    /// Narrows the scope to a legal entity.
    #[must_use]
    pub fn with_legal_entity(mut self, legal_entity_id: LegalEntityId) -> Self {
        self.legal_entity_id = Some(legal_entity_id);
        self
    }

    /// Narrows the scope to a target resource.
    #[must_use]
    pub fn with_resource(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    /// Stable string stored next to the key; the tenant is a separate column.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.operation.clone();
        out.push('/');
        match self.legal_entity_id {
            Some(le) => out.push_str(&le.to_string()),
            None => out.push('*'),
        }
        out.push('/');
        match self.resource_id {
            Some(id) => out.push_str(&id.to_string()),
            None => out.push('*'),
        }
        out
    }
}

/// SHA-256 of the canonical JSON form of a request payload, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Fingerprints a serializable payload.
    ///
    /// `serde_json` writes struct fields in declaration order and the payload types use
    /// `Vec`s rather than hash maps, so equal requests hash equally.
    ///
    /// # Errors
    ///
    /// Returns the serialization error for payloads that cannot be encoded.
    pub fn of<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        let digest = Sha256::digest(&bytes);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(Self(hex))
    }

    /// Wraps a stored fingerprint.
    #[must_use]
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of an idempotency-guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Idempotent<T> {
    /// The produced (or previously produced) result.
    #[serde(flatten)]
    pub value: T,
    /// True when the result was read back from an earlier call.
    #[serde(rename = "idempotentReplay")]
    pub replay: bool,
}

impl<T> Idempotent<T> {
    /// First execution.
    pub const fn fresh(value: T) -> Self {
        Self {
            value,
            replay: false,
        }
    }

    /// Replayed result.
    pub const fn replayed(value: T) -> Self {
        Self {
            value,
            replay: true,
        }
    }

    /// Maps the wrapped value, keeping the replay flag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Idempotent<U> {
        Idempotent {
            value: f(self.value),
            replay: self.replay,
        }
    }
}

/// Decides whether an existing row may be returned as a replay.
///
/// The stored row must carry the same rendered scope and, when both sides have one,
/// the same fingerprint.
///
/// # Errors
///
/// Returns `ScopeMismatch` or `PayloadMismatch` when the key is being reused for a
/// different request.
pub fn verify_replay(
    key: &IdempotencyKey,
    scope: &IdempotencyScope,
    stored_scope: &str,
    fingerprint: Option<&RequestFingerprint>,
    stored_fingerprint: Option<&str>,
) -> Result<(), IdempotencyError> {
    let requested = scope.render();
    if requested != stored_scope {
        return Err(IdempotencyError::ScopeMismatch {
            key: key.to_string(),
            stored: stored_scope.to_string(),
            requested,
        });
    }
    if let (Some(fp), Some(stored)) = (fingerprint, stored_fingerprint) {
        if fp.as_str() != stored {
            return Err(IdempotencyError::PayloadMismatch(key.to_string()));
        }
    }
    Ok(())
}
