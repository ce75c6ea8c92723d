//! Key, scope and fingerprint of one idempotency-guarded request.

use serde::Serialize;
use defter_core::idempotency::{IdempotencyKey, IdempotencyScope, RequestFingerprint, verify_replay};

use super::error::StoreError;

/// Everything stored next to the row a guarded request produces.
#[derive(Debug, Clone)]
pub struct GuardedRequest {
    key: IdempotencyKey,
    scope: IdempotencyScope,
    rendered_scope: String,
    fingerprint: RequestFingerprint,
}

impl GuardedRequest {
    /// Fingerprints `payload` for `key` inside `scope`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the payload cannot be encoded.
    pub fn new<T: Serialize>(
        key: IdempotencyKey,
        scope: IdempotencyScope,
        payload: &T,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            key,
            rendered_scope: scope.render(),
            scope,
            fingerprint: RequestFingerprint::of(payload)?,
        })
    }

    /// Caller-supplied key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Rendered scope string.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.rendered_scope
    }

    /// Hex fingerprint of the payload.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.fingerprint.as_str()
    }

    /// Checks that a stored row may be replayed for this request.
    ///
    /// # Errors
    ///
    /// Returns an idempotency conflict when the stored scope or fingerprint differs.
    pub fn verify(&self, stored_scope: &str, stored_fingerprint: Option<&str>) -> Result<(), StoreError> {
        verify_replay(
            &self.key,
            &self.scope,
            stored_scope,
            Some(&self.fingerprint),
            stored_fingerprint,
        )?;
        Ok(())
    }
}
