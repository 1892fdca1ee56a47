//! Authenticated principal attached to a request.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Role name that grants every capability check below.
pub const ADMIN_ROLE: &str = "admin";

/// The authenticated user behind a request.
///
/// Supplied by a [`SessionProvider`](crate::security::session::SessionProvider)
/// and immutable for the lifetime of the request. Handlers behind the
/// authorization gate read it through `Extension<Principal>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn has_any_permission<'a, I>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        permissions.into_iter().any(|p| self.permissions.contains(p))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    /// Editors hold `content:edit`; admins count as editors.
    pub fn is_editor(&self) -> bool {
        self.has_permission("content:edit") || self.is_admin()
    }

    pub fn can_view_content(&self) -> bool {
        self.has_permission("content:view") || self.is_admin() || self.is_editor()
    }

    pub fn can_edit_content(&self) -> bool {
        self.has_permission("content:edit") || self.is_admin()
    }

    pub fn can_delete_content(&self) -> bool {
        self.has_permission("content:delete") || self.is_admin()
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_permission("users:manage") || self.is_admin()
    }

    pub fn can_view_analytics(&self) -> bool {
        self.has_permission("analytics:view") || self.is_admin() || self.is_editor()
    }

    /// Snapshot of the capability checks, as reported by the session endpoint.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_admin: self.is_admin(),
            is_editor: self.is_editor(),
            can_view_content: self.can_view_content(),
            can_edit_content: self.can_edit_content(),
            can_delete_content: self.can_delete_content(),
            can_manage_users: self.can_manage_users(),
            can_view_analytics: self.can_view_analytics(),
        }
    }
}

/// Derived capability flags for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub is_admin: bool,
    pub is_editor: bool,
    pub can_view_content: bool,
    pub can_edit_content: bool,
    pub can_delete_content: bool,
    pub can_manage_users: bool,
    pub can_view_analytics: bool,
}

#[cfg(test)]
pub(crate) fn principal(role: &str, permissions: &[&str]) -> Principal {
    Principal {
        id: format!("{role}-1"),
        name: format!("Test {role}"),
        email: format!("{role}@example.com"),
        role: role.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}
