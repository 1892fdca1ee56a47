//! Composable access requirements.
//!
//! # Design Decisions
//! - One tagged variant per predicate kind; composition through `AllOf`
//! - `AllOf(vec![])` is the "any authenticated principal" requirement
//! - `HasAnyPermission` over an empty set never matches

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::security::principal::Principal;

/// A predicate over a [`Principal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    RoleEquals(String),
    HasPermission(String),
    HasAnyPermission(BTreeSet<String>),
    AllOf(Vec<Requirement>),
}

impl Requirement {
    /// Requirement met by every authenticated principal.
    pub fn authenticated() -> Self {
        Requirement::AllOf(Vec::new())
    }

    pub fn role(role: impl Into<String>) -> Self {
        Requirement::RoleEquals(role.into())
    }

    pub fn permission(permission: impl Into<String>) -> Self {
        Requirement::HasPermission(permission.into())
    }

    pub fn any_permission<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::HasAnyPermission(permissions.into_iter().map(Into::into).collect())
    }

    /// Combine with another requirement (logical AND).
    pub fn and(self, other: Requirement) -> Self {
        match self {
            Requirement::AllOf(mut all) => {
                all.push(other);
                Requirement::AllOf(all)
            }
            single => Requirement::AllOf(vec![single, other]),
        }
    }

    pub fn is_satisfied_by(&self, principal: &Principal) -> bool {
        match self {
            Requirement::RoleEquals(role) => principal.has_role(role),
            Requirement::HasPermission(permission) => principal.has_permission(permission),
            Requirement::HasAnyPermission(permissions) => principal.has_any_permission(permissions),
            Requirement::AllOf(all) => all.iter().all(|r| r.is_satisfied_by(principal)),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::RoleEquals(role) => write!(f, "role={role}"),
            Requirement::HasPermission(permission) => write!(f, "permission={permission}"),
            Requirement::HasAnyPermission(permissions) => {
                let joined: Vec<&str> = permissions.iter().map(String::as_str).collect();
                write!(f, "any_permission=[{}]", joined.join(","))
            }
            Requirement::AllOf(all) if all.is_empty() => write!(f, "authenticated"),
            Requirement::AllOf(all) => {
                for (i, r) in all.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{r}")?;
                }
                Ok(())
            }
        }
    }
}

/// Route access options in their configuration shape.
///
/// Each field that is set adds one predicate; all of them must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    pub required_role: Option<String>,
    pub required_permission: Option<String>,
    pub required_any_permission: Option<Vec<String>>,
}

impl AccessPolicy {
    pub fn requirement(&self) -> Requirement {
        let mut all = Vec::new();
        if let Some(role) = &self.required_role {
            all.push(Requirement::role(role.clone()));
        }
        if let Some(permission) = &self.required_permission {
            all.push(Requirement::permission(permission.clone()));
        }
        if let Some(any) = &self.required_any_permission {
            all.push(Requirement::any_permission(any.iter().cloned()));
        }
        match all.len() {
            1 => all.remove(0),
            _ => Requirement::AllOf(all),
        }
    }
}

impl From<AccessPolicy> for Requirement {
    fn from(policy: AccessPolicy) -> Self {
        policy.requirement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::principal::principal;

    #[test]
    fn test_role_equality_is_exact() {
        let req = Requirement::role("admin");
        assert!(req.is_satisfied_by(&principal("admin", &[])));
        assert!(!req.is_satisfied_by(&principal("Admin", &[])));
        assert!(!req.is_satisfied_by(&principal("editor", &["users:manage"])));
    }

    #[test]
    fn test_permission_membership() {
        let req = Requirement::permission("content:delete");
        let editor = principal("editor", &["content:view", "content:edit"]);
        assert!(!req.is_satisfied_by(&editor));
        assert!(req.is_satisfied_by(&principal("editor", &["content:delete"])));
    }

    #[test]
    fn test_any_permission() {
        let req = Requirement::any_permission(["media:upload", "content:edit"]);
        assert!(req.is_satisfied_by(&principal("editor", &["content:edit"])));
        assert!(!req.is_satisfied_by(&principal("viewer", &["content:view"])));
        assert!(!Requirement::any_permission(Vec::<String>::new())
            .is_satisfied_by(&principal("admin", &["content:edit"])));
    }

    #[test]
    fn test_all_of_requires_every_category() {
        let policy = AccessPolicy {
            required_role: Some("editor".into()),
            required_permission: Some("content:edit".into()),
            required_any_permission: Some(vec!["media:upload".into()]),
        };
        let req = policy.requirement();

        assert!(req.is_satisfied_by(&principal(
            "editor",
            &["content:edit", "media:upload"]
        )));
        assert!(!req.is_satisfied_by(&principal("editor", &["content:edit"])));
        assert!(!req.is_satisfied_by(&principal(
            "admin",
            &["content:edit", "media:upload"]
        )));
    }

    #[test]
    fn test_empty_policy_means_authenticated() {
        let req = AccessPolicy::default().requirement();
        assert_eq!(req, Requirement::authenticated());
        assert!(req.is_satisfied_by(&principal("viewer", &[])));
    }

    #[test]
    fn test_single_field_policy_is_not_wrapped() {
        let policy = AccessPolicy {
            required_permission: Some("content:view".into()),
            ..Default::default()
        };
        assert_eq!(policy.requirement(), Requirement::permission("content:view"));
    }

    #[test]
    fn test_display() {
        let req = Requirement::role("admin").and(Requirement::permission("users:manage"));
        assert_eq!(req.to_string(), "role=admin & permission=users:manage");
        assert_eq!(Requirement::authenticated().to_string(), "authenticated");
    }
}
