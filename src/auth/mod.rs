//! Minimal role-based access check for the knowledge-management surface
//! (document ingest). Spec §6 keeps every route publicly reachable at
//! the transport layer (no JWT/session middleware, matching the "No
//! authentication/authorization subsystem" non-goal for the query path),
//! but SPEC_FULL §2 still carries the original's `ADMIN/MANAGER/AGENT/
//! END_USER` role ordering for ingestion, since an unauthenticated
//! ingest endpoint would let any caller rewrite a tenant's corpus.
//! Grounded on the teacher's `security::authorization::DocumentAuthorization`
//! shape (a role check returning `CoreError::Permission`), with the JWT
//! claim lookup replaced by a plain request header since there is no
//! session/token subsystem left to decode it from.

use crate::utils::error::CoreError;
use axum::http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    EndUser,
    Agent,
    Manager,
    Admin,
}

impl Role {
    fn from_header(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "MANAGER" => Some(Self::Manager),
            "AGENT" => Some(Self::Agent),
            "END_USER" => Some(Self::EndUser),
            _ => None,
        }
    }
}

/// Header carrying the caller's role. There is no session store backing
/// this value; deployments that need a real identity boundary are
/// expected to terminate auth upstream (API gateway, service mesh) and
/// forward a trusted role claim in this header.
const ROLE_HEADER: &str = "x-user-role";

/// Returns `Ok(())` if the caller's declared role meets `minimum`,
/// otherwise a `CoreError::Permission`. Missing or unrecognized header
/// values are treated as the lowest privilege, not as an error, so
/// read-only/query routes that never call this function are unaffected.
pub fn require_role(headers: &HeaderMap, minimum: Role) -> Result<(), CoreError> {
    let role = headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(Role::from_header)
        .unwrap_or(Role::EndUser);

    if role >= minimum {
        Ok(())
    } else {
        Err(CoreError::Permission(format!(
            "requires at least {minimum:?} role"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn agent_role_passes_agent_minimum() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLE_HEADER, HeaderValue::from_static("AGENT"));
        assert!(require_role(&headers, Role::Agent).is_ok());
    }

    #[test]
    fn missing_header_is_rejected_for_elevated_minimum() {
        let headers = HeaderMap::new();
        assert!(require_role(&headers, Role::Manager).is_err());
    }

    #[test]
    fn end_user_cannot_ingest() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLE_HEADER, HeaderValue::from_static("END_USER"));
        assert!(require_role(&headers, Role::Agent).is_err());
    }
}
