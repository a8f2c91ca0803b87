//! Auth-key check (spec.md §4.9): the seam, not the implementation. The
//! concrete check against an external key store is explicitly out of scope
//! (spec.md §1); this module defines the trait every bus consumer gates on
//! plus a minimal default binding for local/test deployments.

use async_trait::async_trait;

use crate::error::AuthError;

/// Gates a bus request on `(encryptKey, authKey, appId)` before dispatch.
#[async_trait]
pub trait AuthChecker: Send + Sync {
    async fn check(&self, encrypt_key: &str, auth_key: &str, app_id: &str) -> Result<(), AuthError>;
}

/// Default binding: accepts any request whose `authKey` matches a single
/// configured shared secret. `encryptKey`/`appId` are accepted unchecked —
/// a real deployment is expected to supply its own `AuthChecker`.
pub struct StaticAuthChecker {
    shared_secret: String,
}

impl StaticAuthChecker {
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
        }
    }
}

#[async_trait]
impl AuthChecker for StaticAuthChecker {
    async fn check(&self, _encrypt_key: &str, auth_key: &str, _app_id: &str) -> Result<(), AuthError> {
        if auth_key == self.shared_secret {
            Ok(())
        } else {
            Err(AuthError::Unauthorized)
        }
    }
}
