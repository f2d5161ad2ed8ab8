//! Capabilities of an authenticated administrator

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
    Viewer,
}

impl AdminRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "super-admin" | "superadmin" => Some(AdminRole::SuperAdmin),
            "admin" => Some(AdminRole::Admin),
            "viewer" => Some(AdminRole::Viewer),
            _ => None,
        }
    }
}

/// Passed explicitly into every admin operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminContext {
    pub admin_id: String,
    pub role: AdminRole,
    pub can_view_all_schools: bool,
    pub assigned_schools: Vec<String>,
}

impl AdminContext {
    pub fn super_admin(admin_id: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
            role: AdminRole::SuperAdmin,
            can_view_all_schools: true,
            assigned_schools: Vec::new(),
        }
    }

    pub fn sees_all_schools(&self) -> bool {
        self.role == AdminRole::SuperAdmin || self.can_view_all_schools
    }

    pub fn can_view_school(&self, school: &str) -> bool {
        self.sees_all_schools()
            || self
                .assigned_schools
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(school.trim()))
    }

    pub fn can_modify(&self) -> bool {
        self.role != AdminRole::Viewer
    }
}
