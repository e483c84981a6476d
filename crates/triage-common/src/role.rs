use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of the caller as reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Employee,
    DepartmentHead,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::DepartmentHead => "DepartmentHead",
            Self::Admin => "Admin",
        }
    }

    /// The raiser role this role snapshots to when it creates a ticket.
    /// Admins do not raise tickets.
    pub fn as_raiser(&self) -> Option<RaiserRole> {
        match self {
            Self::Employee => Some(RaiserRole::Employee),
            Self::DepartmentHead => Some(RaiserRole::DepartmentHead),
            Self::Admin => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "employee" => Ok(Self::Employee),
            "departmenthead" => Ok(Self::DepartmentHead),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Role snapshotted onto a ticket at creation. Never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaiserRole {
    Employee,
    DepartmentHead,
}

impl RaiserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::DepartmentHead => "DepartmentHead",
        }
    }
}

impl fmt::Display for RaiserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaiserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Role::from_str(s)? {
            Role::Employee => Ok(Self::Employee),
            Role::DepartmentHead => Ok(Self::DepartmentHead),
            Role::Admin => Err(format!("Invalid raiser role: {}", s)),
        }
    }
}

/// The `{identity, role, department}` tuple trusted verbatim per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub identity: String,
    pub role: Role,
    pub department: String,
}

impl Actor {
    pub fn new(identity: impl Into<String>, role: Role, department: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role,
            department: department.into(),
        }
    }

    pub fn employee(identity: impl Into<String>, department: impl Into<String>) -> Self {
        Self::new(identity, Role::Employee, department)
    }

    pub fn department_head(identity: impl Into<String>, department: impl Into<String>) -> Self {
        Self::new(identity, Role::DepartmentHead, department)
    }

    pub fn admin(identity: impl Into<String>) -> Self {
        Self::new(identity, Role::Admin, "")
    }
}

/// Lowercase and drop separators so "Department Head", "department_head"
/// and "DepartmentHead" all compare equal.
pub(crate) fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
