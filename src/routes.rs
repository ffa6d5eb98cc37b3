//! Portal route table: which paths are public and which role each protected
//! section requires. Patterns use `:param` for one segment and a trailing `*`
//! for any remainder.

use crate::identity::{Role, RoleConstraint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected(RoleConstraint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub pattern: String,
    pub access: Access,
}

impl RouteEntry {
    pub fn public(pattern: &str) -> Self { Self { pattern: pattern.to_string(), access: Access::Public } }

    pub fn protected(pattern: &str, constraint: impl Into<RoleConstraint>) -> Self {
        Self { pattern: pattern.to_string(), access: Access::Protected(constraint.into()) }
    }

    pub fn matches(&self, path: &str) -> bool { pattern_matches(&self.pattern, path) }

    pub fn constraint(&self) -> Option<&RoleConstraint> {
        match &self.access {
            Access::Public => None,
            Access::Protected(c) => Some(c),
        }
    }
}

fn segments(s: &str) -> Vec<&str> {
    s.split('/').filter(|p| !p.is_empty()).collect()
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    // ignore query string and fragment
    let path = path.split(['?', '#']).next().unwrap_or("");
    let pat = segments(pattern);
    let got = segments(path);
    let mut i = 0;
    while i < pat.len() {
        if pat[i] == "*" {
            return i == pat.len() - 1;
        }
        let Some(seg) = got.get(i) else { return false };
        if !pat[i].starts_with(':') && pat[i] != *seg {
            return false;
        }
        i += 1;
    }
    got.len() == pat.len()
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, entry: RouteEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// A protected section: the bare prefix plus each child path.
    pub fn section(&mut self, prefix: &str, children: &[&str], constraint: RoleConstraint) -> &mut Self {
        self.add(RouteEntry::protected(prefix, constraint.clone()));
        for child in children {
            let pattern = format!("{}/{}", prefix.trim_end_matches('/'), child.trim_start_matches('/'));
            self.add(RouteEntry::protected(&pattern, constraint.clone()));
        }
        self
    }

    /// First matching entry in declaration order.
    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.matches(path))
    }

    pub fn entries(&self) -> &[RouteEntry] { &self.entries }

    /// The rental portal's routes.
    pub fn platform() -> Self {
        let mut t = RouteTable::new();
        for p in [
            "/", "/splash", "/register", "/login", "/reset-password", "/verify-account/:token",
            "/request-reset", "/reset-password/:token", "/about", "/services", "/unauthorized",
        ] {
            t.add(RouteEntry::public(p));
        }
        let admin = RoleConstraint::Role(Role::Admin);
        t.add(RouteEntry::protected("/dashboard", admin.clone()));
        t.section("/admin", &[
            "dashboard", "staff", "staff/register", "staff/list", "staff/edit", "broadcast",
            "defaulters", "relocations", "relocation/view", "charts", "audit-logs",
        ], admin);
        // tenant pages only require a logged-in user
        t.section("/tenant", &[
            "dashboard", "payments", "payment", "payment-history", "relocation", "relocation/request",
            "chat", "maintenance", "visit", "notifications", "profile",
        ], RoleConstraint::AnyAuthenticated);
        // unknown landlord pages still render the landlord layout (with a not-found body)
        t.section("/landlord", &["*"], RoleConstraint::Role(Role::Landlord));
        t.section("/caretaker", &[
            "dashboard", "maintenance", "relocation", "messages", "tenant-registration", "visits",
        ], RoleConstraint::Role(Role::Caretaker));
        t
    }
}
