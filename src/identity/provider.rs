use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::principal::User;
use crate::error::{AuthError, AuthResult};
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use crate::storage::Credential;

pub const WHOAMI_PATH: &str = "/users/profile";
pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PASSWORD_RESET_PATH: &str = "/auth/requestPasswordReset";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email regex"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10,}$").expect("phone regex"));

pub fn is_email(s: &str) -> bool { EMAIL_RE.is_match(s.trim()) }
pub fn is_phone(s: &str) -> bool { PHONE_RE.is_match(s.trim()) }

/// What the login form submits. The identifier is an email or a phone number.
#[derive(Clone)]
pub struct LoginInput {
    pub identifier: String,
    pub password: String,
}

impl std::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInput").field("identifier", &self.identifier).finish_non_exhaustive()
    }
}

impl LoginInput {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), password: password.into() }
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.identifier.trim().is_empty() || self.password.is_empty() {
            return Err(AuthError::invalid_input("Please fill in all fields"));
        }
        if !is_email(&self.identifier) && !is_phone(&self.identifier) {
            return Err(AuthError::invalid_input("Enter a valid email or phone number"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    #[serde(rename = "emailOrPhone")]
    identifier: &'a str,
    password: &'a str,
}

/// Successful `POST /auth/login` body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginReply {
    pub token: String,
    pub user: User,
    #[serde(default, rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// The backend's authentication endpoints. The session store talks to the
/// backend only through this trait.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the identity behind a credential.
    async fn whoami(&self, credential: &Credential) -> AuthResult<User>;
    async fn login(&self, input: &LoginInput) -> AuthResult<LoginReply>;
    async fn logout(&self, credential: Option<&Credential>) -> AuthResult<()>;
    /// Returns the backend's confirmation message.
    async fn request_password_reset(&self, email: &str) -> AuthResult<String>;
}

/// [`AuthProvider`] over the REST API.
pub struct RemoteAuthProvider {
    transport: Arc<dyn HttpTransport>,
}

impl RemoteAuthProvider {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self { Self { transport } }
}

// Login reports every 4xx as bad credentials; other endpoints classify normally.
fn login_error(resp: &ApiResponse) -> AuthError {
    match resp.status {
        s if s >= 500 => AuthError::ServerError { status: s, message: resp.error_message() },
        400..=499 => AuthError::invalid_credentials(resp.error_message()),
        s => AuthError::malformed(format!("unexpected HTTP {} from login", s)),
    }
}

fn parse_profile(resp: &ApiResponse) -> AuthResult<User> {
    let v: Value = resp.json()?;
    // Some deployments wrap the profile as { "user": {...} }.
    let inner = match v.get("user") {
        Some(u) if u.is_object() => u.clone(),
        _ => v,
    };
    serde_json::from_value(inner).map_err(|e| AuthError::malformed(format!("profile: {}", e)))
}

#[async_trait]
impl AuthProvider for RemoteAuthProvider {
    async fn whoami(&self, credential: &Credential) -> AuthResult<User> {
        let req = ApiRequest::get(WHOAMI_PATH).with_header("authorization", credential.bearer_header());
        let resp = self.transport.send(req).await?;
        if !resp.is_success() {
            return Err(AuthError::from_response(&resp));
        }
        parse_profile(&resp)
    }

    async fn login(&self, input: &LoginInput) -> AuthResult<LoginReply> {
        let body = LoginBody { identifier: input.identifier.trim(), password: &input.password };
        let body = serde_json::to_value(&body).map_err(|e| AuthError::invalid_input(e.to_string()))?;
        let resp = self.transport.send(ApiRequest::post(LOGIN_PATH, body)).await?;
        if !resp.is_success() {
            return Err(login_error(&resp));
        }
        let reply: LoginReply = resp.json()?;
        if reply.token.is_empty() {
            return Err(AuthError::malformed("login response without token"));
        }
        debug!(target: "session", role = %reply.user.role, "login accepted by backend");
        Ok(reply)
    }

    async fn logout(&self, credential: Option<&Credential>) -> AuthResult<()> {
        let mut req = ApiRequest::post(LOGOUT_PATH, json!({}));
        if let Some(c) = credential {
            req = req.with_header("authorization", c.bearer_header());
        }
        let resp = self.transport.send(req).await?;
        if resp.is_success() { Ok(()) } else { Err(AuthError::from_response(&resp)) }
    }

    async fn request_password_reset(&self, email: &str) -> AuthResult<String> {
        if !is_email(email) {
            return Err(AuthError::invalid_input("Please enter your email"));
        }
        let resp = self.transport.send(ApiRequest::post(PASSWORD_RESET_PATH, json!({ "email": email.trim() }))).await?;
        if !resp.is_success() {
            return Err(AuthError::from_response(&resp));
        }
        let v: Value = resp.json().unwrap_or(Value::Null);
        Ok(v.get("message").and_then(|m| m.as_str()).unwrap_or("Reset link sent").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportError;
    use crate::identity::Role;
    use parking_lot::Mutex;

    /// Replays canned responses and records what was sent.
    struct Canned {
        responses: Mutex<Vec<Result<ApiResponse, TransportError>>>,
        sent: Mutex<Vec<ApiRequest>>,
    }

    impl Canned {
        fn new(responses: Vec<Result<ApiResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self { responses: Mutex::new(responses), sent: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl HttpTransport for Canned {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.sent.lock().push(request);
            self.responses.lock().remove(0)
        }
    }

    #[test]
    fn login_input_validation() {
        assert!(LoginInput::new("user@x.com", "secret").validate().is_ok());
        assert!(LoginInput::new("0712345678", "secret").validate().is_ok());
        assert_eq!(LoginInput::new("", "secret").validate().unwrap_err().code(), "invalid_input");
        assert_eq!(LoginInput::new("user@x.com", "").validate().unwrap_err().code(), "invalid_input");
        assert!(LoginInput::new("12345", "secret").validate().is_err());
        assert!(LoginInput::new("not an email", "secret").validate().is_err());
    }

    #[test]
    fn debug_omits_password() {
        let s = format!("{:?}", LoginInput::new("user@x.com", "hunter2"));
        assert!(!s.contains("hunter2"));
    }

    #[tokio::test]
    async fn login_sends_email_or_phone_body() {
        let t = Canned::new(vec![Ok(ApiResponse::json_body(200, &json!({
            "token": "abc", "user": { "role": "landlord" }
        })))]);
        let p = RemoteAuthProvider::new(t.clone());
        let reply = p.login(&LoginInput::new("user@x.com", "secret")).await.unwrap();
        assert_eq!(reply.token, "abc");
        assert_eq!(reply.user.role, Role::Landlord);
        let sent = t.sent.lock();
        assert_eq!(sent[0].path, LOGIN_PATH);
        assert_eq!(sent[0].body.as_ref().unwrap(), &json!({ "emailOrPhone": "user@x.com", "password": "secret" }));
    }

    #[tokio::test]
    async fn login_failures_are_classified() {
        let t = Canned::new(vec![
            Ok(ApiResponse::json_body(401, &json!({"message": "Invalid credentials"}))),
            Ok(ApiResponse::new(503, "")),
            Err(TransportError("connection refused".into())),
            Ok(ApiResponse::json_body(200, &json!({"token": "", "user": {"role": "tenant"}}))),
        ]);
        let p = RemoteAuthProvider::new(t);
        let input = LoginInput::new("user@x.com", "secret");
        assert_eq!(p.login(&input).await.unwrap_err(), AuthError::invalid_credentials("Invalid credentials"));
        assert_eq!(p.login(&input).await.unwrap_err().code(), "server_error");
        assert_eq!(p.login(&input).await.unwrap_err().code(), "network_failure");
        assert_eq!(p.login(&input).await.unwrap_err().code(), "malformed_response");
    }

    #[tokio::test]
    async fn whoami_attaches_bearer_and_unwraps_user() {
        let t = Canned::new(vec![Ok(ApiResponse::json_body(200, &json!({
            "user": { "_id": "u1", "name": "Otieno", "role": "caretaker" }
        })))]);
        let p = RemoteAuthProvider::new(t.clone());
        let u = p.whoami(&Credential::new("abc")).await.unwrap();
        assert_eq!(u.role, Role::Caretaker);
        assert_eq!(t.sent.lock()[0].header("Authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn whoami_rejects_unknown_role() {
        let t = Canned::new(vec![Ok(ApiResponse::json_body(200, &json!({ "role": "owner" })))]);
        let err = RemoteAuthProvider::new(t).whoami(&Credential::new("abc")).await.unwrap_err();
        assert_eq!(err.code(), "malformed_response");
    }

    #[tokio::test]
    async fn password_reset_returns_backend_message() {
        let t = Canned::new(vec![Ok(ApiResponse::json_body(200, &json!({"message": "Check your inbox"})))]);
        let p = RemoteAuthProvider::new(t);
        assert!(p.request_password_reset("nope").await.is_err());
        assert_eq!(p.request_password_reset("jane@x.com").await.unwrap(), "Check your inbox");
    }
}
