use anyhow::Error;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    TakeQuiz,
    ViewOwnResults,

    ManageQuestions,
    ViewTenantUsers,
    CreateUsers,
    ResetPasswords,
    ViewTenantResults,
    ViewTenantActivity,
    ViewOwnCompany,

    ManageCompanies,
    CreateMasters,
    ReassignCompany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Admin,
    Staff,
}

static STAFF_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::TakeQuiz);
    permissions.insert(Permission::ViewOwnResults);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(STAFF_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageQuestions);
    permissions.insert(Permission::ViewTenantUsers);
    permissions.insert(Permission::CreateUsers);
    permissions.insert(Permission::ResetPasswords);
    permissions.insert(Permission::ViewTenantResults);
    permissions.insert(Permission::ViewTenantActivity);
    permissions.insert(Permission::ViewOwnCompany);

    permissions
});

static MASTER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(ADMIN_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageCompanies);
    permissions.insert(Permission::CreateMasters);
    permissions.insert(Permission::ReassignCompany);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Staff => &STAFF_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
            Role::Master => &MASTER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    // "user" is the older name for staff accounts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Role::Master),
            "admin" => Ok(Role::Admin),
            "staff" | "user" => Ok(Role::Staff),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
