//! Read operations (direct LMDB access)

use heed::RoTxn;

use crate::db::{read, Dbs};
use crate::error::{err, Result};
use crate::model::{ObjectType, User};
use crate::permission::ObjectPermission;

/// Load one record inside an open transaction
#[inline]
pub(crate) fn load(d: &Dbs, tx: &RoTxn, id: u64) -> Result<Option<ObjectPermission>> {
    match d.perms.get(tx, &id.to_be_bytes()).map_err(err)? {
        Some(raw) => Ok(Some(serde_json::from_slice(raw)?)),
        None => Ok(None),
    }
}

fn load_many(d: &Dbs, tx: &RoTxn, ids: impl IntoIterator<Item = u64>) -> Result<Vec<ObjectPermission>> {
    let mut r = Vec::new();
    for id in ids {
        if let Some(p) = load(d, tx, id)? {
            r.push(p);
        }
    }
    Ok(r)
}

/// Listings are ordered by name, then id
fn sort(perms: &mut [ObjectPermission]) {
    perms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}

/// Get a permission by id
pub fn get_permission(id: u64) -> Result<Option<ObjectPermission>> {
    read(|d, tx| load(d, tx, id))
}

/// List every stored permission
pub fn list_permissions() -> Result<Vec<ObjectPermission>> {
    read(|d, tx| {
        let mut r = Vec::new();
        for item in d.perms.iter(tx).map_err(err)? {
            let (_, raw) = item.map_err(err)?;
            r.push(serde_json::from_slice::<ObjectPermission>(raw)?);
        }
        sort(&mut r);
        Ok(r)
    })
}

/// Groups the user belongs to
pub fn groups_for_user(user: u64) -> Result<Vec<u64>> {
    read(|d, tx| Ok(d.members.list_fwd(tx, user)?.into_iter().map(|(g, _)| g).collect()))
}

/// Members of a group
pub fn users_in_group(group: u64) -> Result<Vec<u64>> {
    read(|d, tx| Ok(d.members.list_rev(tx, group)?.into_iter().map(|(u, _)| u).collect()))
}

/// Enabled permissions naming the user directly or through a group
pub fn permissions_for_user(user: &User) -> Result<Vec<ObjectPermission>> {
    read(|d, tx| {
        let mut ids: Vec<u64> = d.users.list_fwd(tx, user.id)?.into_iter().map(|(p, _)| p).collect();
        for (group, _) in d.members.list_fwd(tx, user.id)? {
            ids.extend(d.groups.list_fwd(tx, group)?.into_iter().map(|(p, _)| p));
        }
        ids.sort_unstable();
        ids.dedup();
        let mut r: Vec<_> = load_many(d, tx, ids)?.into_iter().filter(|p| p.enabled).collect();
        sort(&mut r);
        Ok(r)
    })
}

/// Permissions (enabled or not) covering an object type
pub fn permissions_for_object_type(object_type: &ObjectType) -> Result<Vec<ObjectPermission>> {
    read(|d, tx| {
        let Some(type_id) = d.type_names.get(tx, &object_type.to_string()).map_err(err)? else {
            return Ok(Vec::new());
        };
        let ids = d.types.list_fwd(tx, type_id)?.into_iter().map(|(p, _)| p);
        let mut r = load_many(d, tx, ids)?;
        sort(&mut r);
        Ok(r)
    })
}

/// Count permissions granted directly to a user
pub fn count_for_user(user: u64) -> Result<usize> {
    read(|d, tx| d.users.count_fwd(tx, user))
}

/// Count permissions granted to a group
pub fn count_for_group(group: u64) -> Result<usize> {
    read(|d, tx| d.groups.count_fwd(tx, group))
}

/// Get the object type for an id
pub fn get_object_type(id: u64) -> Result<Option<ObjectType>> {
    read(|d, tx| {
        d.type_labels
            .get(tx, &id.to_be_bytes())
            .map_err(err)?
            .map(ObjectType::parse)
            .transpose()
    })
}

/// Get an object type's id
pub fn get_object_type_id(object_type: &ObjectType) -> Result<Option<u64>> {
    read(|d, tx| d.type_names.get(tx, &object_type.to_string()).map_err(err))
}

/// List all registered object types
pub fn list_object_types() -> Result<Vec<(u64, ObjectType)>> {
    read(|d, tx| {
        let mut r = Vec::new();
        for item in d.type_labels.iter(tx).map_err(err)? {
            let (k, v) = item.map_err(err)?;
            if let Ok(id) = <[u8; 8]>::try_from(k) {
                r.push((u64::from_be_bytes(id), ObjectType::parse(v)?));
            }
        }
        Ok(r)
    })
}
