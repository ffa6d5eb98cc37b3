use std::fmt;

use super::principal::Role;

/// Which roles may enter a protected view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleConstraint {
    /// Any logged-in user, whatever the role.
    AnyAuthenticated,
    Role(Role),
    AnyOf(Vec<Role>),
}

impl RoleConstraint {
    /// An empty role list places no role restriction.
    pub fn any_of<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        let mut v: Vec<Role> = Vec::new();
        for r in roles {
            if !v.contains(&r) { v.push(r); }
        }
        match v.len() {
            0 => RoleConstraint::AnyAuthenticated,
            1 => RoleConstraint::Role(v[0]),
            _ => RoleConstraint::AnyOf(v),
        }
    }

    pub fn is_satisfied_by(&self, role: Role) -> bool {
        match self {
            RoleConstraint::AnyAuthenticated => true,
            RoleConstraint::Role(r) => *r == role,
            RoleConstraint::AnyOf(rs) => rs.contains(&role),
        }
    }
}

impl From<Role> for RoleConstraint {
    fn from(r: Role) -> Self { RoleConstraint::Role(r) }
}

impl fmt::Display for RoleConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleConstraint::AnyAuthenticated => f.write_str("authenticated"),
            RoleConstraint::Role(r) => write!(f, "{}", r),
            RoleConstraint::AnyOf(rs) => {
                let names: Vec<&str> = rs.iter().map(|r| r.as_str()).collect();
                f.write_str(&names.join("|"))
            }
        }
    }
}
