use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

pub mod audit;
pub mod credentials;
pub mod gate;
pub mod permissions;

pub use audit::*;
pub use credentials::*;
pub use gate::*;
pub use permissions::*;

use crate::logging::TraceId;

/// Who is calling, resolved once per request
#[derive(Debug, Clone, Serialize)]
pub struct CallerContext {
    pub role: Role,
    pub username: Option<String>,
    pub trace_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
}

impl CallerContext {
    pub fn new(role: Role, trace_id: impl Into<String>) -> Self {
        Self {
            role,
            username: None,
            trace_id: trace_id.into(),
            ip_address: None,
            user_agent: None,
            token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.role.is_authenticated()
    }
}

/// Bearer token from the `authorization` header, if well-formed
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First `x-forwarded-for` hop, falling back to the socket peer
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Maps request credentials to a [`CallerContext`]
///
/// No bearer token yields `default_role`; a token that does not resolve
/// yields [`Role::Anonymous`].
#[derive(Debug, Clone)]
pub struct CallerResolver {
    auth: Arc<AuthService>,
    default_role: Role,
}

impl CallerResolver {
    pub fn new(auth: Arc<AuthService>, default_role: Role) -> Self {
        Self { auth, default_role }
    }

    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trace_id: String,
    ) -> CallerContext {
        let mut caller = CallerContext::new(self.default_role, trace_id);
        caller.ip_address = extract_client_ip(headers, peer);
        caller.user_agent = headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        if let Some(token) = extract_bearer_token(headers) {
            match self.auth.resolve(&token).await {
                Some(user) => {
                    caller.role = user.role;
                    caller.username = Some(user.username);
                }
                None => caller.role = Role::Anonymous,
            }
            caller.token = Some(token);
        }

        caller
    }
}

/// Attach a [`CallerContext`] to every request's extensions
pub async fn caller_context_middleware(
    State(resolver): State<CallerResolver>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let trace_id = request
        .extensions()
        .get::<TraceId>()
        .cloned()
        .unwrap_or_else(TraceId::generate)
        .to_string();

    let caller = resolver.resolve(request.headers(), peer, trace_id).await;
    request.extensions_mut().insert(caller);
    next.run(request).await
}
