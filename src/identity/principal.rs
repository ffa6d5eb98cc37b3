use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// The four portal roles. Anything else coming from the backend is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Admin,
    Landlord,
    Caretaker,
    Tenant,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Landlord, Role::Caretaker, Role::Tenant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Landlord => "landlord",
            Role::Caretaker => "caretaker",
            Role::Tenant => "tenant",
        }
    }

    /// Landing page after login when the backend does not name one.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Landlord => "/landlord/dashboard",
            Role::Caretaker => "/caretaker/dashboard",
            Role::Tenant => "/tenant/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "landlord" => Ok(Role::Landlord),
            "caretaker" => Ok(Role::Caretaker),
            "tenant" => Ok(Role::Tenant),
            other => Err(AuthError::malformed(format!("unknown role '{}'", other))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = AuthError;
    fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Role> for String {
    fn from(r: Role) -> Self { r.as_str().to_string() }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// The authenticated identity as returned by the backend. Read-only on the
/// client; profile edits go through their own endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default, rename = "name", alias = "fullName", alias = "displayName")]
    pub display_name: String,
    pub role: Role,
    #[serde(flatten)]
    pub contact: ContactInfo,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), display_name: display_name.into(), role, contact: ContactInfo::default() }
    }

    /// Name for display, falling back to email, phone, then id.
    pub fn label(&self) -> &str {
        if !self.display_name.is_empty() { return &self.display_name; }
        self.contact.email.as_deref()
            .or(self.contact.phone.as_deref())
            .unwrap_or(&self.id)
    }
}
