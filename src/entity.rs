//! Single-operation write API; each call is its own transaction

use crate::error::Result;
use crate::model::ObjectType;
use crate::permission::ObjectPermission;
use crate::tx::transact;

/// Insert or update a permission, returning its id
pub fn save_permission(perm: &mut ObjectPermission) -> Result<u64> {
    transact(|tx| tx.save_permission(perm))
}

/// Delete a permission and its associations
pub fn delete_permission(id: u64) -> Result<bool> {
    transact(|tx| tx.delete_permission(id))
}

pub fn set_enabled(id: u64, enabled: bool) -> Result<()> {
    transact(|tx| tx.set_enabled(id, enabled))
}

/// Register an object type, returning its id
pub fn register_object_type(object_type: &ObjectType) -> Result<u64> {
    transact(|tx| tx.register_object_type(object_type))
}

/// Add a user to a group
pub fn add_member(user: u64, group: u64) -> Result<()> {
    transact(|tx| tx.add_member(user, group))
}

/// Remove a user from a group
pub fn remove_member(user: u64, group: u64) -> Result<bool> {
    transact(|tx| tx.remove_member(user, group))
}
