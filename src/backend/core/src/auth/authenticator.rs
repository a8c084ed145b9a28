//! The authentication step: bearer token in, active principal out.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use metrics::counter;
use tracing::{debug, warn};

use super::error::{AuthError, Forbidden, Unauthenticated};
use super::token::{fingerprint, TokenCodec};
use crate::rbac::Principal;
use crate::store::{CredentialStore, StoreError};

/// Pull the raw token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Resolve a raw bearer token to a loaded, active principal.
///
/// Checks run in a fixed order: presence, token validity, principal
/// existence, then the active flag. Deactivation takes effect immediately
/// even for tokens issued before it.
pub async fn authenticate(
    codec: &TokenCodec,
    store: &dyn CredentialStore,
    raw_token: Option<&str>,
) -> Result<Principal, AuthError> {
    let token = raw_token.ok_or(AuthError::Unauthenticated(
        Unauthenticated::MissingCredential,
    ))?;

    let identity = codec.verify(token)?;

    let principal = match store.find_principal_by_id(identity.principal_id).await {
        Ok(principal) => principal,
        Err(StoreError::NotFound { .. }) => {
            debug!(
                principal_id = %identity.principal_id,
                token = %fingerprint(token),
                "Token subject no longer exists"
            );
            return Err(Unauthenticated::PrincipalGone.into());
        }
        Err(e) => {
            warn!(error = %e, "Credential store lookup failed during authentication");
            return Err(AuthError::Store(e.to_string()));
        }
    };

    if !principal.is_active {
        debug!(principal_id = %principal.id, "Rejected deactivated principal");
        return Err(Forbidden::AccountDeactivated.into());
    }

    counter!("auth_success_total", "method" => "bearer").increment(1);
    Ok(principal)
}
