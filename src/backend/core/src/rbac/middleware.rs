//! Axum middleware that puts a route behind the access engine.
//!
//! The layer authenticates the bearer token, evaluates the route's
//! [`Requirement`], and only then calls the inner service with the resolved
//! principal in the request extensions. Rejections are rendered from the
//! [`AuthError`] directly. When the route carries audit labels, every
//! terminal state of the request is recorded once.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::models::{PermissionKeyError, Principal};
use super::policy::Requirement;
use crate::audit::RequestMeta;
use crate::auth::{bearer_token, AuthError, Unauthenticated};
use crate::engine::{AccessEngine, AuditLabel};

// ═══════════════════════════════════════════════════════════════════════════════
// Current Principal (extracted in handlers)
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated, authorized caller of a guarded route.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentPrincipal>()
            .cloned()
            .ok_or(AuthError::Unauthenticated(Unauthenticated::MissingCredential))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Route Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// What a route requires, and how (if at all) it is audited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    requirement: Requirement,
    audit: Option<(String, String)>,
}

impl RouteGuard {
    pub fn new(requirement: Requirement) -> Self {
        Self {
            requirement,
            audit: None,
        }
    }

    pub fn authenticated() -> Self {
        Self::new(Requirement::Authenticated)
    }

    /// Require every key, e.g. `&["read:users"]`. Fails on a malformed key.
    pub fn permissions<S: AsRef<str>>(keys: &[S]) -> Result<Self, PermissionKeyError> {
        Requirement::permissions(keys).map(Self::new)
    }

    pub fn any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Requirement::any_role(roles))
    }

    /// Record every outcome under these labels.
    pub fn audited(mut self, action: impl Into<String>, resource: impl Into<String>) -> Self {
        self.audit = Some((action.into(), resource.into()));
        self
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn label(&self) -> Option<AuditLabel<'_>> {
        self.audit
            .as_ref()
            .map(|(action, resource)| AuditLabel::new(action, resource))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that wraps a route with a [`RouteGuard`].
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::rbac::{GuardLayer, RouteGuard};
///
/// let guard = RouteGuard::permissions(&["delete:users"])?.audited("delete_user", "users");
/// let app = Router::new()
///     .route("/api/users/:id", delete(delete_user).layer(GuardLayer::new(engine.clone(), guard)));
/// ```
#[derive(Clone)]
pub struct GuardLayer {
    engine: Arc<AccessEngine>,
    guard: Arc<RouteGuard>,
}

impl GuardLayer {
    pub fn new(engine: Arc<AccessEngine>, guard: RouteGuard) -> Self {
        Self {
            engine,
            guard: Arc::new(guard),
        }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            engine: self.engine.clone(),
            guard: self.guard.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct GuardService<S> {
    inner: S,
    engine: Arc<AccessEngine>,
    guard: Arc<RouteGuard>,
}

impl<S> Service<Request<Body>> for GuardService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let engine = self.engine.clone();
        let guard = self.guard.clone();
        // The polled-ready service handles this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let token = bearer_token(request.headers()).map(str::to_owned);
            let meta = RequestMeta::from_headers(request.headers())
                .with_route(request.method().as_str(), request.uri().path());

            let outcome = engine
                .guard(
                    token.as_deref(),
                    &meta,
                    guard.requirement(),
                    guard.label(),
                    move |principal| {
                        request.extensions_mut().insert(CurrentPrincipal(principal));
                        async move {
                            match inner.call(request).await {
                                Ok(response) => response,
                                Err(never) => match never {},
                            }
                        }
                    },
                )
                .await;

            Ok(match outcome {
                Ok(response) => response,
                Err(rejection) => rejection.into_response(),
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
