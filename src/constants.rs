//! Field limits, setting tokens and the standard actions

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

// ObjectPermission field limits
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 200;
pub const MAX_ACTION_LEN: usize = 30;

/// Listed in the exempt view permissions, makes every model exempt
pub const EXEMPT_WILDCARD: &str = "*";

/// Placeholder in constraint values, replaced by the requesting user's id
pub const USER_TOKEN: &str = "$user";

/// The four model-level actions every object type carries.
///
/// Grants may name other actions too; those are kept as plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_action_names_are_lowercase() {
        let names: Vec<_> = Action::iter().map(Action::as_str).collect();
        assert_eq!(names, vec!["view", "add", "change", "delete"]);
        for action in Action::iter() {
            assert_eq!(action.to_string(), action.as_str());
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }
}
