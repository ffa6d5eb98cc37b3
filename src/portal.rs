//!
//! Portal context
//! --------------
//! The one object an application constructs at startup: the session store,
//! the authenticated request wrapper, the redirect sink and the route table,
//! wired together and shared by reference.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::AuthResult;
use crate::guard::{GuardOutcome, GuardState, RouteGuard};
use crate::http::{ApiClient, HttpTransport, ReqwestTransport};
use crate::identity::{AuthProvider, LoginInput, LoginOutcome, RemoteAuthProvider, RoleConstraint, SessionSnapshot, SessionStore};
use crate::navigation::Navigator;
use crate::routes::{Access, RouteTable};
use crate::storage::{CredentialStore, FileCredentialStore};

/// Result of navigating to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    Public { pattern: String },
    Protected { pattern: String, state: GuardState, outcome: GuardOutcome },
    NotFound,
}

impl Visit {
    pub fn renders(&self) -> bool {
        match self {
            Visit::Public { .. } => true,
            Visit::Protected { outcome, .. } => *outcome == GuardOutcome::Render,
            Visit::NotFound => false,
        }
    }
}

pub struct Portal {
    session: Arc<SessionStore>,
    client: ApiClient,
    navigator: Arc<dyn Navigator>,
    routes: RouteTable,
}

impl Portal {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Arc<dyn CredentialStore>, navigator: Arc<dyn Navigator>) -> Self {
        let provider: Arc<dyn AuthProvider> = Arc::new(RemoteAuthProvider::new(transport.clone()));
        let session = Arc::new(SessionStore::new(provider, credentials));
        let client = ApiClient::new(transport, session.clone(), navigator.clone());
        Self { session, client, navigator, routes: RouteTable::platform() }
    }

    pub fn from_config(config: &ClientConfig, navigator: Arc<dyn Navigator>) -> AuthResult<Self> {
        let transport = ReqwestTransport::new(config.api_base.clone(), config.request_timeout)?;
        let credentials = FileCredentialStore::in_dir(&config.state_dir);
        info!(target: "portal", api = %config.api_base, credentials = %credentials.path().display(), "portal configured");
        Ok(Self::new(Arc::new(transport), Arc::new(credentials), navigator))
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> { &self.session }
    pub fn client(&self) -> &ApiClient { &self.client }
    pub fn routes(&self) -> &RouteTable { &self.routes }

    pub async fn start(&self) -> SessionSnapshot { self.session.bootstrap().await }

    pub async fn login(&self, identifier: &str, password: &str) -> AuthResult<LoginOutcome> {
        let outcome = self.session.login(LoginInput::new(identifier, password)).await?;
        self.navigator.redirect(&outcome.redirect_to);
        Ok(outcome)
    }

    pub async fn logout(&self) -> SessionSnapshot { self.session.logout().await }

    pub async fn request_password_reset(&self, email: &str) -> AuthResult<String> {
        self.session.provider().request_password_reset(email).await
    }

    pub fn mount_guard(&self, constraint: RoleConstraint) -> RouteGuard {
        RouteGuard::mount(&self.session, constraint)
    }

    /// Navigate to `path`: resolve the route, and for protected routes start
    /// the session if nobody has yet, wait for the guard to settle and follow
    /// its redirect.
    pub async fn open(&self, path: &str) -> Visit {
        let Some(entry) = self.routes.resolve(path) else {
            debug!(target: "portal", path, "no route");
            return Visit::NotFound;
        };
        let constraint = match &entry.access {
            Access::Public => return Visit::Public { pattern: entry.pattern.clone() },
            Access::Protected(c) => c.clone(),
        };
        let guard = self.mount_guard(constraint);
        // a protected view is what triggers session validation; runs at most once
        self.session.bootstrap().await;
        let state = guard.wait_settled().await;
        let outcome = state.outcome();
        if let GuardOutcome::Redirect(to) = outcome {
            self.navigator.redirect(to);
        }
        debug!(target: "portal", path, pattern = %entry.pattern, ?state, "visited");
        Visit::Protected { pattern: entry.pattern.clone(), state, outcome }
    }
}
