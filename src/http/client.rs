use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ratelimit::RateLimitStatus;
use super::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::error::{AuthError, AuthResult};
use crate::identity::{ScopeHandle, SessionStore};
use crate::navigation::{Navigator, LOGIN_ROUTE};

/// Authenticated request wrapper. Every view-level call goes through here so
/// the credential is attached in one place and a backend rejection of the
/// credential is handled in one place.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, session: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { transport, session, navigator }
    }

    pub fn session(&self) -> &Arc<SessionStore> { &self.session }

    /// Send on behalf of the application. Never retries.
    pub async fn send(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.dispatch(None, request).await
    }

    /// Send on behalf of a mounted view. If the view is gone by the time the
    /// response arrives, the response is dropped and nothing is mutated.
    pub async fn send_scoped(&self, scope: ScopeHandle, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.dispatch(Some(scope), request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> AuthResult<T> {
        let body = serde_json::to_value(body).map_err(|e| AuthError::invalid_input(e.to_string()))?;
        self.send(ApiRequest::post(path, body)).await?.json()
    }

    async fn dispatch(&self, scope: Option<ScopeHandle>, mut request: ApiRequest) -> AuthResult<ApiResponse> {
        let (credential, generation) = self.session.credential_with_generation();
        if let Some(c) = &credential {
            request = request.with_header("authorization", c.bearer_header());
        }
        let request_id = Uuid::new_v4().to_string();
        request = request.with_header("x-request-id", request_id.clone());
        let method = request.method.as_str();
        let path = request.path.clone();
        debug!(target: "http", method, path = %path, request_id = %request_id, authenticated = credential.is_some(), "sending");

        let outcome = self.transport.send(request).await;

        if let Some(scope) = &scope {
            if !scope.is_alive() {
                debug!(target: "http", path = %path, scope = scope.name(), "owner unmounted; dropping response");
                return Err(AuthError::Cancelled);
            }
        }

        let response = match outcome {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "http", method, path = %path, error = %e, "no response");
                return Err(e.into());
            }
        };
        RateLimitStatus::from_response(&response).log(response.status, &path);
        if response.is_success() {
            return Ok(response);
        }

        match AuthError::from_response(&response) {
            AuthError::SessionExpired if credential.is_some() => {
                self.reject_session(generation);
                Err(AuthError::SessionExpired)
            }
            // 401 on an anonymous call is an ordinary rejection
            AuthError::SessionExpired => Err(AuthError::Rejected { status: 401, message: response.error_message() }),
            other => {
                debug!(target: "http", method, path = %path, status = response.status, code = other.code(), "request failed");
                Err(other)
            }
        }
    }

    // Concurrent rejections of the same credential race here; only the one
    // that wins the purge redirects.
    fn reject_session(&self, generation: u64) {
        if self.session.expire(generation) {
            info!(target: "http", "credential rejected by backend; redirecting to login");
            self.navigator.redirect(LOGIN_ROUTE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportError;
    use crate::identity::{AuthProvider, ComponentScope, LoginInput, LoginReply, Role, User};
    use crate::navigation::RecordingNavigator;
    use crate::storage::{Credential, MemoryCredentialStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct StaticProvider;

    #[async_trait]
    impl AuthProvider for StaticProvider {
        async fn whoami(&self, _c: &Credential) -> AuthResult<User> { Ok(User::new("u1", "Amina", Role::Landlord)) }
        async fn login(&self, _i: &LoginInput) -> AuthResult<LoginReply> {
            Ok(LoginReply { token: "fresh".into(), user: User::new("u1", "Amina", Role::Landlord), redirect_to: None })
        }
        async fn logout(&self, _c: Option<&Credential>) -> AuthResult<()> { Ok(()) }
        async fn request_password_reset(&self, _e: &str) -> AuthResult<String> { Ok(String::new()) }
    }

    /// Answers every request with `status`, yielding once first so that
    /// concurrent callers are all in flight together.
    struct Answer {
        status: u16,
        body: serde_json::Value,
        seen: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl HttpTransport for Answer {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.seen.lock().push(request);
            tokio::task::yield_now().await;
            Ok(ApiResponse::json_body(self.status, &self.body))
        }
    }

    fn setup(status: u16, token: Option<&str>) -> (ApiClient, Arc<SessionStore>, Arc<RecordingNavigator>, Arc<Answer>) {
        let creds = Arc::new(match token {
            Some(t) => MemoryCredentialStore::with_credential(t),
            None => MemoryCredentialStore::new(),
        });
        let session = Arc::new(SessionStore::new(Arc::new(StaticProvider), creds));
        let nav = Arc::new(RecordingNavigator::new());
        let transport = Arc::new(Answer { status, body: json!({"message": "x"}), seen: Mutex::new(Vec::new()) });
        let client = ApiClient::new(transport.clone(), session.clone(), nav.clone());
        (client, session, nav, transport)
    }

    #[tokio::test]
    async fn attaches_bearer_when_logged_in() {
        let (client, session, _, transport) = setup(200, Some("abc"));
        session.bootstrap().await;
        client.send(ApiRequest::get("/houses")).await.unwrap();
        let seen = transport.seen.lock();
        assert_eq!(seen[0].header("authorization"), Some("Bearer abc"));
        assert!(seen[0].header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn anonymous_calls_carry_no_bearer() {
        let (client, _, nav, transport) = setup(401, None);
        let err = client.send(ApiRequest::get("/public")).await.unwrap_err();
        assert_eq!(err.code(), "rejected");
        assert!(transport.seen.lock()[0].header("authorization").is_none());
        assert!(nav.history().is_empty());
    }

    #[tokio::test]
    async fn concurrent_rejections_redirect_once() {
        let (client, session, nav, _) = setup(401, Some("abc"));
        session.bootstrap().await;
        assert!(session.snapshot().is_authenticated());
        let (a, b, c) = tokio::join!(
            client.send(ApiRequest::get("/houses")),
            client.send(ApiRequest::get("/payments")),
            client.send(ApiRequest::get("/maintenance")),
        );
        for r in [a, b, c] {
            assert_eq!(r.unwrap_err(), AuthError::SessionExpired);
        }
        assert_eq!(nav.count(LOGIN_ROUTE), 1);
        assert!(!session.snapshot().is_authenticated());
        assert!(session.credential().is_none());
    }

    #[tokio::test]
    async fn server_errors_leave_session_alone() {
        let (client, session, nav, _) = setup(500, Some("abc"));
        session.bootstrap().await;
        let before = session.snapshot();
        let err = client.send(ApiRequest::get("/houses")).await.unwrap_err();
        assert_eq!(err.code(), "server_error");
        assert_eq!(session.snapshot(), before);
        assert!(nav.history().is_empty());
    }

    #[tokio::test]
    async fn forbidden_is_surfaced_not_purged() {
        let (client, session, nav, _) = setup(403, Some("abc"));
        session.bootstrap().await;
        let err = client.send(ApiRequest::get("/admin/audit-logs")).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");
        assert!(session.snapshot().is_authenticated());
        assert!(nav.history().is_empty());
    }

    #[tokio::test]
    async fn unmounted_scope_does_not_mutate_session() {
        let (client, session, nav, _) = setup(401, Some("abc"));
        session.bootstrap().await;
        let scope = ComponentScope::new("landlord/houses");
        let handle = scope.handle();
        let fut = client.send_scoped(handle, ApiRequest::get("/houses"));
        drop(scope);
        assert_eq!(fut.await.unwrap_err(), AuthError::Cancelled);
        assert!(session.snapshot().is_authenticated());
        assert!(nav.history().is_empty());
    }

    #[tokio::test]
    async fn get_json_decodes_body() {
        let (client, _, _, _) = setup(200, None);
        let v: serde_json::Value = client.get_json("/about").await.unwrap();
        assert_eq!(v["message"], "x");
    }
}
