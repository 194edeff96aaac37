//! Authentication middleware.
//!
//! `auth_layer` verifies a bearer token when one is presented and stores its
//! claims in the request extensions. Requests without an `Authorization`
//! header pass through anonymously; the guard decides whether that is
//! acceptable for the route.

use super::logging::{extract_client_ip, extract_user_agent};
use crate::{token::TokenClaims, ApiError, ApiResult, AppState};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use keystone_access::{ActorContext, PermissionRequirement};
use keystone_core::UserId;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies the bearer token, if any.
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .ok_or_else(|| {
                    warn!(path = %req.uri().path(), "Malformed authorization header");
                    ApiError::Unauthorized("Invalid authorization header".to_string())
                })?;
            Some(state.tokens.verify(token)?)
        }
        None => None,
    };

    if let Some(claims) = claims {
        if claims.user_id().is_none() {
            return Err(ApiError::Unauthorized("Invalid token subject".to_string()));
        }
        debug!(user_id = %claims.sub, path = %req.uri().path(), "Request authenticated");
        req.extensions_mut().insert(claims);
    }

    Ok(next.run(req).await)
}

/// The caller of a request: verified principal plus client details.
#[derive(Debug, Clone, Default)]
pub struct RequestActor {
    /// Verified principal, if a token was presented.
    pub principal: Option<UserId>,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl RequestActor {
    /// Runs the access guard for this caller.
    pub async fn require(
        &self,
        state: &AppState,
        requirement: impl Into<PermissionRequirement>,
    ) -> ApiResult<()> {
        let requirement = requirement.into();
        state
            .access
            .guard()
            .require(self.principal, &requirement)
            .await
            .map_err(ApiError::from)
    }

    /// Returns the acting context for audited mutations.
    pub fn context(&self) -> ActorContext {
        ActorContext {
            user_id: self.principal,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            principal: parts
                .extensions
                .get::<TokenClaims>()
                .and_then(TokenClaims::user_id),
            ip_address: extract_client_ip(&parts.headers),
            user_agent: extract_user_agent(&parts.headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_actor_from_parts() {
        let user = UserId::new();
        let (mut parts, ()) = axum::http::Request::builder()
            .header("x-forwarded-for", "198.51.100.4")
            .header(header::USER_AGENT, HeaderValue::from_static("curl/8.0"))
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(TokenClaims {
            sub: user.to_string(),
            iss: "keystone".into(),
            aud: None,
            exp: 0,
            iat: 0,
            jti: "t".into(),
        });

        let actor = RequestActor::from_request_parts(&mut parts, &()).await.unwrap();
        let ctx = actor.context();
        assert_eq!(ctx.user_id, Some(user));
        assert_eq!(ctx.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_anonymous_actor() {
        let (mut parts, ()) = axum::http::Request::builder()
            .body(())
            .unwrap()
            .into_parts();
        let actor = RequestActor::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(actor.principal.is_none());
        assert_eq!(actor.context(), ActorContext::system());
    }
}
