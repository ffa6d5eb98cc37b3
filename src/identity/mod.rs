//! Identity and session management for the portal client.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod request_context;
mod authorizer;

pub use principal::{ContactInfo, Role, User};
pub use session::{LoginOutcome, ResolutionState, SessionSnapshot, SessionStore, Subscription};
pub use provider::{
    is_email, is_phone, AuthProvider, LoginInput, LoginReply, RemoteAuthProvider,
    LOGIN_PATH, LOGOUT_PATH, PASSWORD_RESET_PATH, WHOAMI_PATH,
};
pub use request_context::{ComponentScope, ScopeHandle};
pub use authorizer::RoleConstraint;
