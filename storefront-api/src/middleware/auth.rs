use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use storefront_core::Role;

use crate::error::AppError;
use crate::state::AppState;

type BearerHeader = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims issued by the auth service. `sub` is the account email, which is
/// also the caller's notification recipient identity.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Identity of the caller on routes where authentication is optional.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Claims>);

pub fn decode_claims(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))
}

/// Used by tests and local tooling to mint tokens with the shared secret.
pub fn issue_token(secret: &str, claims: &Claims) -> Result<String, AppError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}

fn required(secret: &str, bearer: BearerHeader) -> Result<Claims, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| AppError::AuthenticationError("Missing bearer token".to_string()))?;
    decode_claims(secret, bearer.token())
}

// ============================================================================
// Optional Authentication (guest checkout)
// ============================================================================

pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // A missing header means guest; a present but bad one is still rejected.
    let claims = match bearer {
        Err(rejection) if rejection.is_missing() => None,
        other => Some(required(&state.auth.secret, other)?),
    };

    req.extensions_mut().insert(Caller(claims));
    Ok(next.run(req).await)
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

/// Any valid token. Admins are customers too for their own orders and feed.
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = required(&state.auth.secret, bearer)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = required(&state.auth.secret, bearer)?;

    if !claims.is_admin() {
        return Err(AppError::AuthorizationError("Admin role required".to_string()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, exp: usize) -> Claims {
        Claims {
            sub: "ana@example.com".to_string(),
            role,
            exp,
        }
    }

    #[test]
    fn token_round_trip_and_secret_mismatch() {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        let token = issue_token("secret", &claims(Role::Admin, exp)).unwrap();

        let decoded = decode_claims("secret", &token).unwrap();
        assert_eq!(decoded.sub, "ana@example.com");
        assert!(decoded.is_admin());

        assert!(matches!(
            decode_claims("other-secret", &token),
            Err(AppError::AuthenticationError(_))
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue_token("secret", &claims(Role::Customer, 1)).unwrap();
        assert!(matches!(decode_claims("secret", &token), Err(AppError::AuthenticationError(_))));
    }
}
