//! Grant resolution.
//!
//! [`ObjectPermissionBackend`] turns a user's stored grants into permission
//! names and, for each name, the filter sets limiting which objects it
//! covers. Views and querysets talk to it through the [`Authorizer`] trait.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ExemptSettings;
use crate::constraint::{Constraints, FilterSet};
use crate::error::Result;
use crate::model::User;
use crate::perms::{format_permission, permission_is_exempt};
use crate::permission::ObjectPermission;
use crate::read::{groups_for_user, permissions_for_user};

/// How far a granted permission reaches
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// Every object of the type
    Unrestricted,
    /// Objects matching any of the filter sets
    Filtered(Vec<FilterSet>),
    /// No objects
    Denied,
}

/// Answers permission questions for a user
pub trait Authorizer {
    /// Whether the user holds `perm` on at least some objects
    fn has_perm(&self, user: &User, perm: &str) -> Result<bool>;

    /// Whether the user holds every permission in `perms`
    fn has_perms(&self, user: &User, perms: &[&str]) -> Result<bool> {
        for perm in perms {
            if !self.has_perm(user, perm)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Which objects `perm` lets the user act on
    fn restriction(&self, user: &User, perm: &str) -> Result<Restriction>;
}

/// Authorizer backed by the permission store
#[derive(Debug, Clone, Default)]
pub struct ObjectPermissionBackend {
    exempt: ExemptSettings,
}

impl ObjectPermissionBackend {
    pub fn new(exempt: ExemptSettings) -> Self {
        Self { exempt }
    }

    /// Permission name -> constraints of every grant that yields it.
    ///
    /// Inactive and anonymous users get an empty map.
    pub fn get_all_permissions(&self, user: &User) -> Result<HashMap<String, Vec<Constraints>>> {
        if !user.is_active || !user.is_authenticated {
            return Ok(HashMap::new());
        }
        Ok(expand(&permissions_for_user(user)?))
    }

    /// Names of the user's permissions, sorted
    pub fn permission_names(&self, user: &User) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.get_all_permissions(user)?.into_keys().collect();
        names.sort();
        Ok(names)
    }

    /// Ids of the groups the user belongs to
    pub fn get_group_ids(&self, user: &User) -> Result<Vec<u64>> {
        groups_for_user(user.id)
    }

    fn is_exempt(&self, perm: &str) -> Result<bool> {
        permission_is_exempt(perm, &self.exempt)
    }
}

/// One entry per (object type, action) a grant covers
fn expand(perms: &[ObjectPermission]) -> HashMap<String, Vec<Constraints>> {
    let mut map: HashMap<String, Vec<Constraints>> = HashMap::new();
    for p in perms {
        for object_type in &p.object_types {
            for action in &p.actions {
                let name = format_permission(object_type.app_label(), action, object_type.model());
                map.entry(name).or_default().push(p.constraints.clone());
            }
        }
    }
    map
}

impl Authorizer for ObjectPermissionBackend {
    fn has_perm(&self, user: &User, perm: &str) -> Result<bool> {
        if user.is_superuser && user.is_active {
            return Ok(true);
        }
        if self.is_exempt(perm)? {
            debug!(perm, "exempt permission");
            return Ok(true);
        }
        let granted = self.get_all_permissions(user)?.contains_key(perm);
        debug!(user = user.id, perm, granted, "permission check");
        Ok(granted)
    }

    fn has_perms(&self, user: &User, perms: &[&str]) -> Result<bool> {
        if user.is_superuser && user.is_active {
            return Ok(true);
        }
        // resolve grants once for the whole list
        let mut all = None;
        for perm in perms {
            if self.is_exempt(perm)? {
                continue;
            }
            if all.is_none() {
                all = Some(self.get_all_permissions(user)?);
            }
            if !all.as_ref().is_some_and(|m| m.contains_key(*perm)) {
                debug!(user = user.id, perm, "missing permission");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn restriction(&self, user: &User, perm: &str) -> Result<Restriction> {
        if self.is_exempt(perm)? || (user.is_superuser && user.is_active) {
            return Ok(Restriction::Unrestricted);
        }
        let all = self.get_all_permissions(user)?;
        let Some(grants) = all.get(perm) else {
            return Ok(Restriction::Denied);
        };
        let mut sets = Vec::new();
        for constraints in grants {
            if constraints.is_none() {
                return Ok(Restriction::Unrestricted);
            }
            for set in constraints.list_constraints() {
                if set.is_empty() {
                    return Ok(Restriction::Unrestricted);
                }
                sets.push(set);
            }
        }
        Ok(Restriction::Filtered(sets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectType;
    use serde_json::json;

    #[test]
    fn test_expand_covers_types_and_actions() {
        let p = ObjectPermission::new("p")
            .object_type(ObjectType::parse("dcim.site").unwrap())
            .object_type(ObjectType::parse("dcim.rack").unwrap())
            .actions(["view", "change"]);
        let map = expand(&[p]);
        let mut names: Vec<_> = map.keys().cloned().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["dcim.change_rack", "dcim.change_site", "dcim.view_rack", "dcim.view_site"]
        );
    }

    #[test]
    fn test_expand_collects_constraints_per_name() {
        let site = ObjectType::parse("dcim.site").unwrap();
        let a = ObjectPermission::new("a")
            .object_type(site.clone())
            .action("view")
            .constraints(Constraints::from_value(json!({"status": "active"})).unwrap());
        let b = ObjectPermission::new("b").object_type(site).action("view");
        let map = expand(&[a, b]);
        assert_eq!(map["dcim.view_site"].len(), 2);
    }
}
