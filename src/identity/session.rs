use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::principal::{Role, User};
use super::provider::{AuthProvider, LoginInput};
use crate::error::AuthResult;
use crate::storage::{Credential, CredentialStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Bootstrap has not finished.
    Pending,
    Resolved,
    /// Stored credential was rejected or the session was expired by the backend.
    Failed,
}

/// One committed view of the session. Every listener sees the same snapshot
/// for a given commit.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<User>,
    pub state: ResolutionState,
    /// Bumped on every credential write (login, logout, purge).
    pub generation: u64,
    /// Bumped on every commit; lets observers drop out-of-order deliveries.
    pub revision: u64,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool { self.identity.is_some() }
    pub fn role(&self) -> Option<Role> { self.identity.as_ref().map(|u| u.role) }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub user: User,
    /// Where the caller should navigate next.
    pub redirect_to: String,
}

type Listener = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

struct Inner {
    identity: Option<User>,
    state: ResolutionState,
    credential: Option<Credential>,
    /// Stored credential exists but could not be read.
    unreadable: bool,
    generation: u64,
    revision: u64,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            state: self.state,
            generation: self.generation,
            revision: self.revision,
        }
    }

    /// Drop credential and identity; the caller picks the resulting state.
    fn purge(&mut self, state: ResolutionState) {
        self.credential = None;
        self.unreadable = false;
        self.identity = None;
        self.state = state;
        self.generation += 1;
    }
}

/// Single source of truth for who is logged in.
///
/// Constructed once per application and shared by `Arc`. Credential writes
/// happen only in `login`, `logout`, the failure path of `bootstrap`, and
/// `expire`; each write goes to durable storage under the same lock that
/// updates the in-memory state, then all listeners are notified.
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    credentials: Arc<dyn CredentialStore>,
    inner: RwLock<Inner>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
    bootstrap: OnceCell<SessionSnapshot>,
}

impl SessionStore {
    /// Reads the persisted credential; the session stays `Pending` until
    /// [`SessionStore::bootstrap`] validates it.
    pub fn new(provider: Arc<dyn AuthProvider>, credentials: Arc<dyn CredentialStore>) -> Self {
        // an unreadable credential is purged by bootstrap, not here
        let (credential, unreadable) = match credentials.load() {
            Ok(c) => (c, false),
            Err(e) => {
                warn!(target: "session", error = %e, "unreadable stored credential");
                (None, true)
            }
        };
        Self {
            provider,
            credentials,
            inner: RwLock::new(Inner {
                identity: None,
                state: ResolutionState::Pending,
                credential,
                unreadable,
                generation: 0,
                revision: 0,
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
            bootstrap: OnceCell::new(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot { self.inner.read().snapshot() }

    pub fn credential(&self) -> Option<Credential> { self.inner.read().credential.clone() }

    /// Current credential together with the generation it belongs to.
    pub fn credential_with_generation(&self) -> (Option<Credential>, u64) {
        let inner = self.inner.read();
        (inner.credential.clone(), inner.generation)
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> { &self.provider }

    /// Resolve the stored credential into an identity. Runs at most once per
    /// store; concurrent and later callers get the same result.
    pub async fn bootstrap(&self) -> SessionSnapshot {
        self.bootstrap.get_or_init(|| self.resolve_stored()).await.clone()
    }

    async fn resolve_stored(&self) -> SessionSnapshot {
        let (credential, unreadable, generation) = {
            let inner = self.inner.read();
            if inner.state != ResolutionState::Pending {
                // login or logout already settled the session
                return inner.snapshot();
            }
            (inner.credential.clone(), inner.unreadable, inner.generation)
        };

        if unreadable {
            return self.commit(|inner| {
                if inner.generation != generation || inner.state != ResolutionState::Pending {
                    return false;
                }
                if let Err(e) = self.credentials.clear() {
                    warn!(target: "session", error = %e, "failed to purge unreadable credential");
                }
                inner.purge(ResolutionState::Failed);
                warn!(target: "session", "unreadable stored credential purged");
                true
            }).unwrap_or_else(|| self.snapshot());
        }

        let Some(credential) = credential else {
            info!(target: "session", "no stored credential; session resolved as anonymous");
            return self.commit(|inner| {
                if inner.state != ResolutionState::Pending {
                    return false;
                }
                inner.identity = None;
                inner.state = ResolutionState::Resolved;
                true
            }).unwrap_or_else(|| self.snapshot());
        };

        let result = self.provider.whoami(&credential).await;
        let committed = self.commit(|inner| {
            if inner.generation != generation || inner.state != ResolutionState::Pending {
                return false;
            }
            match &result {
                Ok(user) => {
                    inner.identity = Some(user.clone());
                    inner.state = ResolutionState::Resolved;
                }
                Err(_) => {
                    if let Err(e) = self.credentials.clear() {
                        warn!(target: "session", error = %e, "failed to purge rejected credential");
                    }
                    inner.purge(ResolutionState::Failed);
                }
            }
            true
        });
        match (&result, &committed) {
            (Ok(user), Some(_)) => info!(target: "session", user_id = %user.id, role = %user.role, "session restored"),
            (Err(e), Some(_)) => warn!(target: "session", error = %e, code = e.code(), "stored credential rejected; purged"),
            (_, None) => debug!(target: "session", "bootstrap result superseded by a newer session change"),
        }
        committed.unwrap_or_else(|| self.snapshot())
    }

    /// Authenticate against the backend. On failure nothing is mutated and
    /// the error is returned for display on the login form.
    pub async fn login(&self, input: LoginInput) -> AuthResult<LoginOutcome> {
        input.validate()?;
        let reply = match self.provider.login(&input).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "session", error = %e, code = e.code(), "login failed");
                return Err(e);
            }
        };
        let credential = Credential::new(reply.token);
        let user = reply.user;
        let redirect_to = reply.redirect_to
            .filter(|p| p.starts_with('/'))
            .unwrap_or_else(|| user.role.home_path().to_string());

        let mut save_error = None;
        let committed = self.commit(|inner| {
            if let Err(e) = self.credentials.save(&credential) {
                save_error = Some(e);
                return false;
            }
            inner.credential = Some(credential.clone());
            inner.unreadable = false;
            inner.identity = Some(user.clone());
            inner.state = ResolutionState::Resolved;
            inner.generation += 1;
            true
        });
        if let Some(e) = save_error {
            warn!(target: "session", error = %e, "could not persist credential; login aborted");
            return Err(e);
        }
        let generation = committed.map(|s| s.generation).unwrap_or_default();
        info!(target: "session", user_id = %user.id, role = %user.role, generation, redirect_to = %redirect_to, "login succeeded");
        Ok(LoginOutcome { user, redirect_to })
    }

    /// Clear the session locally, then tell the backend. The backend call is
    /// best-effort: its failure is logged and never undoes the local logout.
    pub async fn logout(&self) -> SessionSnapshot {
        let mut previous = None;
        let snapshot = self.commit(|inner| {
            previous = inner.credential.take();
            if let Err(e) = self.credentials.clear() {
                warn!(target: "session", error = %e, "failed to remove stored credential");
            }
            inner.purge(ResolutionState::Resolved);
            true
        }).unwrap_or_else(|| self.snapshot());
        info!(target: "session", generation = snapshot.generation, "logged out locally");

        if let Err(e) = self.provider.logout(previous.as_ref()).await {
            warn!(target: "session", error = %e, code = e.code(), "backend logout failed; local session already cleared");
        }
        snapshot
    }

    /// Forced purge after the backend rejected a credential. Only the
    /// credential generation the rejected request was sent with may be
    /// purged; returns true for the single caller that performed it.
    pub fn expire(&self, observed_generation: u64) -> bool {
        let committed = self.commit(|inner| {
            if inner.generation != observed_generation || inner.credential.is_none() {
                return false;
            }
            if let Err(e) = self.credentials.clear() {
                warn!(target: "session", error = %e, "failed to remove expired credential");
            }
            inner.purge(ResolutionState::Failed);
            true
        });
        if let Some(s) = &committed {
            info!(target: "session", generation = s.generation, "session expired by backend; credential purged");
        }
        committed.is_some()
    }

    /// Register an observer for every committed session change. Dropping the
    /// returned [`Subscription`] unregisters it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription { id, listeners: Arc::downgrade(&self.listeners) }
    }

    pub fn listener_count(&self) -> usize { self.listeners.lock().len() }

    // Apply `mutate` under the write lock; if it reports a change, bump the
    // revision and publish the new snapshot after the lock is released.
    fn commit<F>(&self, mutate: F) -> Option<SessionSnapshot>
    where
        F: FnOnce(&mut Inner) -> bool,
    {
        let snapshot = {
            let mut inner = self.inner.write();
            if !mutate(&mut *inner) {
                return None;
            }
            inner.revision += 1;
            inner.snapshot()
        };
        self.publish(&snapshot);
        Some(snapshot)
    }

    fn publish(&self, snapshot: &SessionSnapshot) {
        let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        debug!(target: "session", revision = snapshot.revision, listeners = listeners.len(), "publishing session change");
        for l in listeners {
            l(snapshot);
        }
    }
}

/// Registration handle returned by [`SessionStore::subscribe`].
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.listeners.upgrade() {
            list.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::identity::provider::LoginReply;
    use crate::storage::MemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeProvider {
        whoami: Mutex<Option<AuthResult<User>>>,
        login: Mutex<Option<AuthResult<LoginReply>>>,
        logout_fails: bool,
        whoami_delay: Option<Duration>,
        whoami_calls: AtomicUsize,
        logout_calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        async fn whoami(&self, _credential: &Credential) -> AuthResult<User> {
            self.whoami_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.whoami_delay {
                tokio::time::sleep(d).await;
            }
            self.whoami.lock().clone().unwrap_or(Err(AuthError::SessionExpired))
        }
        async fn login(&self, _input: &LoginInput) -> AuthResult<LoginReply> {
            self.login.lock().clone().unwrap_or_else(|| Err(AuthError::network("offline")))
        }
        async fn logout(&self, _credential: Option<&Credential>) -> AuthResult<()> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            if self.logout_fails { Err(AuthError::network("connection refused")) } else { Ok(()) }
        }
        async fn request_password_reset(&self, _email: &str) -> AuthResult<String> { Ok("sent".into()) }
    }

    fn store_with(provider: FakeProvider, creds: Arc<MemoryCredentialStore>) -> (Arc<SessionStore>, Arc<FakeProvider>) {
        let p = Arc::new(provider);
        (Arc::new(SessionStore::new(p.clone(), creds)), p)
    }

    fn reply(token: &str, role: Role) -> LoginReply {
        LoginReply { token: token.into(), user: User::new("u1", "Test", role), redirect_to: None }
    }

    #[tokio::test]
    async fn bootstrap_without_credential_is_anonymous() {
        let (store, p) = store_with(FakeProvider::default(), Arc::new(MemoryCredentialStore::new()));
        assert_eq!(store.snapshot().state, ResolutionState::Pending);
        let s = store.bootstrap().await;
        assert_eq!(s.state, ResolutionState::Resolved);
        assert!(s.identity.is_none());
        assert_eq!(p.whoami_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bootstrap_with_rejected_credential_purges_it() {
        let creds = Arc::new(MemoryCredentialStore::with_credential("stale"));
        let (store, _) = store_with(FakeProvider::default(), creds.clone());
        let s = store.bootstrap().await;
        assert_eq!(s.state, ResolutionState::Failed);
        assert!(s.identity.is_none());
        assert!(creds.current().is_none());
        assert!(store.credential().is_none());
    }

    #[tokio::test]
    async fn unreadable_credential_is_purged_by_bootstrap() {
        let tmp = tempfile::tempdir().unwrap();
        let file = crate::storage::FileCredentialStore::in_dir(tmp.path());
        std::fs::write(file.path(), "{not json").unwrap();
        let path = file.path().to_path_buf();
        let p = Arc::new(FakeProvider::default());
        let store = SessionStore::new(p.clone(), Arc::new(file));
        // construction only reads
        assert!(path.exists());
        assert_eq!(store.snapshot().state, ResolutionState::Pending);

        let s = store.bootstrap().await;
        assert_eq!(s.state, ResolutionState::Failed);
        assert!(s.identity.is_none());
        assert!(!path.exists());
        assert_eq!(p.whoami_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bootstrap_is_single_flight() {
        let provider = FakeProvider {
            whoami: Mutex::new(Some(Ok(User::new("u1", "T", Role::Tenant)))),
            whoami_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let (store, p) = store_with(provider, Arc::new(MemoryCredentialStore::with_credential("abc")));
        let (a, b, c) = tokio::join!(store.bootstrap(), store.bootstrap(), store.bootstrap());
        assert_eq!(p.whoami_calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.role(), Some(Role::Tenant));
        store.bootstrap().await;
        assert_eq!(p.whoami_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn login_persists_and_notifies() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let provider = FakeProvider { login: Mutex::new(Some(Ok(reply("abc", Role::Landlord)))), ..Default::default() };
        let (store, _) = store_with(provider, creds.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = store.subscribe(move |s| seen2.lock().push(s.role()));

        let out = store.login(LoginInput::new("user@x.com", "secret")).await.unwrap();
        assert_eq!(out.user.role, Role::Landlord);
        assert_eq!(out.redirect_to, "/landlord/dashboard");
        assert_eq!(creds.current(), Some(Credential::new("abc")));
        assert_eq!(*seen.lock(), vec![Some(Role::Landlord)]);
    }

    #[tokio::test]
    async fn failed_login_mutates_nothing() {
        let creds = Arc::new(MemoryCredentialStore::with_credential("keep"));
        let provider = FakeProvider {
            login: Mutex::new(Some(Err(AuthError::invalid_credentials("Invalid credentials")))),
            ..Default::default()
        };
        let (store, _) = store_with(provider, creds.clone());
        let before = store.snapshot();
        let err = store.login(LoginInput::new("user@x.com", "wrong")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_credentials");
        assert_eq!(store.snapshot(), before);
        assert_eq!(creds.current(), Some(Credential::new("keep")));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_backend() {
        let (store, _) = store_with(FakeProvider::default(), Arc::new(MemoryCredentialStore::new()));
        let err = store.login(LoginInput::new("bob", "x")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let provider = FakeProvider {
            login: Mutex::new(Some(Ok(reply("abc", Role::Tenant)))),
            logout_fails: true,
            ..Default::default()
        };
        let (store, p) = store_with(provider, creds.clone());
        store.login(LoginInput::new("user@x.com", "secret")).await.unwrap();
        let s = store.logout().await;
        assert!(s.identity.is_none());
        assert_eq!(s.state, ResolutionState::Resolved);
        assert!(creds.current().is_none());
        assert_eq!(p.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expire_only_once_per_generation() {
        let provider = FakeProvider { login: Mutex::new(Some(Ok(reply("abc", Role::Admin)))), ..Default::default() };
        let (store, _) = store_with(provider, Arc::new(MemoryCredentialStore::new()));
        store.login(LoginInput::new("user@x.com", "secret")).await.unwrap();
        let (_, gen) = store.credential_with_generation();
        assert!(store.expire(gen));
        assert!(!store.expire(gen));
        let s = store.snapshot();
        assert_eq!(s.state, ResolutionState::Failed);
        assert!(s.identity.is_none());
    }

    #[tokio::test]
    async fn stale_expiry_does_not_touch_newer_login() {
        let provider = FakeProvider { login: Mutex::new(Some(Ok(reply("abc", Role::Admin)))), ..Default::default() };
        let (store, _) = store_with(provider, Arc::new(MemoryCredentialStore::new()));
        let (_, old_gen) = store.credential_with_generation();
        store.login(LoginInput::new("user@x.com", "secret")).await.unwrap();
        assert!(!store.expire(old_gen));
        assert!(store.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn login_before_bootstrap_wins() {
        let provider = FakeProvider {
            whoami: Mutex::new(Some(Ok(User::new("old", "Old", Role::Tenant)))),
            login: Mutex::new(Some(Ok(reply("new", Role::Admin)))),
            ..Default::default()
        };
        let (store, p) = store_with(provider, Arc::new(MemoryCredentialStore::with_credential("old")));
        store.login(LoginInput::new("user@x.com", "secret")).await.unwrap();
        let s = store.bootstrap().await;
        assert_eq!(s.role(), Some(Role::Admin));
        assert_eq!(p.whoami_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let (store, _) = store_with(FakeProvider::default(), Arc::new(MemoryCredentialStore::new()));
        let sub = store.subscribe(|_| {});
        assert_eq!(store.listener_count(), 1);
        drop(sub);
        assert_eq!(store.listener_count(), 0);
    }
}
