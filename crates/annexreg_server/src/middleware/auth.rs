//! Bearer-token middleware.
//!
//! Validates the HS256 signature of externally issued access tokens,
//! builds a `CurrentUser` from the claims, and injects it into request
//! extensions. Token issuance (passwords, refresh, lockout) lives with
//! the external auth provider.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::json;

use annexreg_core::principal::TokenClaims;

#[derive(Clone)]
pub struct JwtConfig {
    pub decoding_key: DecodingKey,
    pub validation: Validation,
}

impl JwtConfig {
    /// Symmetric HS256 validation against the shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::default();
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": message, "code": 401})),
    )
        .into_response()
}

/// Layer validating `Authorization: Bearer <token>` and injecting
/// `CurrentUser`.
pub async fn bearer_auth(mut req: Request, next: Next) -> Result<Response, Response> {
    let jwt = req
        .extensions()
        .get::<JwtConfig>()
        .cloned()
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "JWT config not initialized", "code": 500})),
            )
                .into_response()
        })?;

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("invalid Authorization header format"))?;

    let token_data = decode::<TokenClaims>(token, &jwt.decoding_key, &jwt.validation)
        .map_err(|e| {
            tracing::warn!("token validation failed: {e}");
            unauthorized("invalid token")
        })?;

    req.extensions_mut()
        .insert(token_data.claims.into_current_user());

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use annexreg_core::types::UserRole;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    #[test]
    fn claims_round_trip_through_hs256() {
        let secret = b"test-secret";
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            email: "user@example.com".into(),
            role: UserRole::Editor,
            exp: Some(chrono::Utc::now().timestamp() + 600),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();

        let config = JwtConfig::from_secret(secret);
        let decoded =
            decode::<TokenClaims>(&token, &config.decoding_key, &config.validation).unwrap();
        let user = decoded.claims.into_current_user();
        assert_eq!(user.role, UserRole::Editor);
        assert_eq!(user.email, "user@example.com");
    }

    #[test]
    fn wrong_secret_fails_validation() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            email: "user@example.com".into(),
            role: UserRole::Admin,
            exp: Some(chrono::Utc::now().timestamp() + 600),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret-a"),
        )
        .unwrap();
        let config = JwtConfig::from_secret(b"secret-b");
        assert!(decode::<TokenClaims>(&token, &config.decoding_key, &config.validation).is_err());
    }
}
