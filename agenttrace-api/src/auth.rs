use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use agenttrace_core::domain::ids::OrganizationId;
use agenttrace_query::{Capability, PermissionSet};

use crate::{error::ApiError, AppState};

/// JWT claims for an AgentTrace API principal. `org` scopes every C6 query
/// to a single organization (spec.md §4.6 queries are always org-scoped);
/// `capabilities` map onto [`Capability`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub org: uuid::Uuid,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Clone)]
pub struct AuthUser {
    pub principal: String,
    pub organization_id: OrganizationId,
    pub permissions: PermissionSet,
}

fn parse_capability(raw: &str) -> Option<Capability> {
    match raw {
        "audit:read" => Some(Capability::AuditRead),
        "audit:export" => Some(Capability::AuditExport),
        "audit:admin" => Some(Capability::AuditAdmin),
        _ => None,
    }
}

/// Validates the bearer token and inserts [`AuthUser`] into request
/// extensions (modeled on the teacher's `middleware::auth::auth_middleware`,
/// adapted from user/roles to org/capabilities).
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = header_value.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(state.jwt_secret.as_bytes()), &validation)
        .map_err(|_| ApiError::Unauthorized)?;
    let claims = token_data.claims;

    let permissions = PermissionSet::new(claims.capabilities.iter().filter_map(|c| parse_capability(c)));
    let auth_user = AuthUser {
        principal: claims.sub,
        organization_id: OrganizationId::from_uuid(claims.org),
        permissions,
    };

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

pub fn require(user: &AuthUser, capability: Capability) -> Result<(), ApiError> {
    user.permissions
        .require(capability)
        .map_err(|_| ApiError::Forbidden(format!("missing capability '{}'", capability.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_capability_strings() {
        assert!(matches!(parse_capability("audit:read"), Some(Capability::AuditRead)));
        assert!(matches!(parse_capability("audit:export"), Some(Capability::AuditExport)));
        assert!(matches!(parse_capability("audit:admin"), Some(Capability::AuditAdmin)));
    }

    #[test]
    fn rejects_unknown_capability_strings() {
        assert!(parse_capability("audit:delete").is_none());
        assert!(parse_capability("").is_none());
    }

    #[test]
    fn require_rejects_a_user_without_the_capability() {
        let user = AuthUser {
            principal: "svc-1".into(),
            organization_id: OrganizationId::new(),
            permissions: PermissionSet::new([Capability::AuditRead]),
        };
        assert!(require(&user, Capability::AuditRead).is_ok());
        assert!(matches!(require(&user, Capability::AuditAdmin), Err(ApiError::Forbidden(_))));
    }
}
