//! Bearer-token guard for protected route groups

use crate::auth::token::{AuthError, Claims, TokenVerifier};
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, warn};

/// Protected routes sharing one issuer allow-list
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RouteGroup {
    Ingest,
    Search,
    Maintenance,
    Stats,
    Info,
}

/// Verifies tokens and applies the per-group issuer allow-lists
pub struct Authenticator {
    verifier: TokenVerifier,
    allowed: HashMap<RouteGroup, HashSet<String>>,
}

impl Authenticator {
    pub fn new(verifier: TokenVerifier, allowed: HashMap<RouteGroup, Vec<String>>) -> Self {
        let allowed = RouteGroup::iter()
            .map(|group| {
                let issuers = allowed
                    .get(&group)
                    .map(|list| list.iter().cloned().collect())
                    .unwrap_or_default();
                (group, issuers)
            })
            .collect();
        Self { verifier, allowed }
    }

    /// Authenticate a request for `group` from its headers
    pub fn authorize(&self, group: RouteGroup, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = bearer_token(headers)?;
        let claims = self.verifier.verify(token)?;

        let permitted = self
            .allowed
            .get(&group)
            .is_some_and(|issuers| issuers.contains(&claims.iss));
        if !permitted {
            return Err(AuthError::IssuerNotAllowed {
                issuer: claims.iss,
                group: group.to_string(),
            });
        }
        Ok(claims)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token.trim())
}

/// State handed to [`require_bearer`] for one route group
#[derive(Clone)]
pub struct RouteGuard {
    pub authenticator: Arc<Authenticator>,
    pub group: RouteGroup,
}

impl RouteGuard {
    pub fn new(authenticator: Arc<Authenticator>, group: RouteGroup) -> Self {
        Self {
            authenticator,
            group,
        }
    }
}

/// Reject unauthenticated requests before the handler runs; verified claims
/// are stored in the request extensions.
pub async fn require_bearer(
    State(guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match guard.authenticator.authorize(guard.group, request.headers()) {
        Ok(claims) => {
            debug!(
                group = %guard.group,
                issuer = %claims.iss,
                jti = %claims.jti,
                path = %request.uri().path(),
                "Authenticated request"
            );
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(group = %guard.group, path = %request.uri().path(), error = %e, "Rejected request");
            Err(e.into())
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::IssuerNotAllowed { .. } => AppError::Authorization(err.to_string()),
            AuthError::Key(msg) => AppError::Configuration(msg),
            other => AppError::Authentication(other.to_string()),
        }
    }
}
