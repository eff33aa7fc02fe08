//! The ObjectPermission grant record

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ACTION_LEN, MAX_DESCRIPTION_LEN, MAX_NAME_LEN};
use crate::constraint::{Constraints, FilterSet};
use crate::error::{ObjpermError, Result};
use crate::model::ObjectType;

/// Grants view, add, change, delete (or custom) actions to users and groups
/// on the objects of some types that match the constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPermission {
    /// Assigned on first save; 0 until then
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub object_types: BTreeSet<ObjectType>,
    #[serde(default)]
    pub groups: BTreeSet<u64>,
    #[serde(default)]
    pub users: BTreeSet<u64>,
    /// The list of actions granted by this permission
    pub actions: Vec<String>,
    /// Filter matching the applicable objects of the selected type(s)
    #[serde(default)]
    pub constraints: Constraints,
}

fn default_enabled() -> bool {
    true
}

impl ObjectPermission {
    /// An enabled, unconstrained grant with no types, actions or grantees yet
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            description: String::new(),
            enabled: true,
            object_types: BTreeSet::new(),
            groups: BTreeSet::new(),
            users: BTreeSet::new(),
            actions: Vec::new(),
            constraints: Constraints::None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_types.insert(object_type);
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        if !self.actions.iter().any(|a| a == action) {
            self.actions.push(action.to_string());
        }
        self
    }

    pub fn actions<I, S>(self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        actions.into_iter().fold(self, |p, a| p.action(a.as_ref()))
    }

    pub fn user(mut self, user_id: u64) -> Self {
        self.users.insert(user_id);
        self
    }

    pub fn group(mut self, group_id: u64) -> Self {
        self.groups.insert(group_id);
        self
    }

    pub fn constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// All constraint sets as a list, even if only one set is defined
    pub fn list_constraints(&self) -> Vec<FilterSet> {
        self.constraints.list_constraints()
    }

    /// Check field rules before the record is stored
    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.chars().count();
        if name_len == 0 {
            return Err(ObjpermError::validation("name", "cannot be empty"));
        }
        if name_len > MAX_NAME_LEN {
            return Err(ObjpermError::validation(
                "name",
                format!("{} chars (max {})", name_len, MAX_NAME_LEN),
            ));
        }
        let desc_len = self.description.chars().count();
        if desc_len > MAX_DESCRIPTION_LEN {
            return Err(ObjpermError::validation(
                "description",
                format!("{} chars (max {})", desc_len, MAX_DESCRIPTION_LEN),
            ));
        }
        if self.object_types.is_empty() {
            return Err(ObjpermError::validation("object_types", "select at least one object type"));
        }
        if self.actions.is_empty() {
            return Err(ObjpermError::validation("actions", "grant at least one action"));
        }
        for action in &self.actions {
            let len = action.chars().count();
            if len == 0 || len > MAX_ACTION_LEN {
                return Err(ObjpermError::validation(
                    "actions",
                    format!("'{}' must be 1 to {} chars", action, MAX_ACTION_LEN),
                ));
            }
        }
        self.constraints.validate()
    }
}

impl fmt::Display for ObjectPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
