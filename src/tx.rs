//! Transaction wrapper for batched writes

use heed::RwTxn;
use tracing::{debug, info};

use crate::db::{current_epoch, dbs, env, Dbs};
use crate::error::{err, ObjpermError, Result};
use crate::model::ObjectType;
use crate::permission::ObjectPermission;

const NEXT_PERM_ID: &str = "next_perm_id";
const NEXT_TYPE_ID: &str = "next_type_id";

/// Transaction wrapper for batched writes
pub struct Tx {
    txn: Option<RwTxn<'static>>,
    dbs: &'static Dbs,
}

impl Tx {
    #[inline]
    pub(crate) fn new() -> Result<Self> {
        Ok(Tx {
            txn: Some(env()?.write_txn().map_err(err)?),
            dbs: dbs()?,
        })
    }

    #[inline]
    pub(crate) fn tx(&mut self) -> &mut RwTxn<'static> {
        // only `commit` takes the transaction, and it consumes self
        self.txn.as_mut().expect("transaction already committed")
    }

    #[inline]
    pub(crate) fn dbs(&self) -> &'static Dbs {
        self.dbs
    }

    #[inline]
    pub(crate) fn commit(mut self) -> Result<()> {
        match self.txn.take() {
            Some(txn) => txn.commit().map_err(err),
            None => Ok(()),
        }
    }

    /// Register an object type, returning its id (existing id if known)
    pub fn register_object_type(&mut self, object_type: &ObjectType) -> Result<u64> {
        let name = object_type.to_string();
        if let Some(id) = self.dbs.type_names.get(self.tx(), &name).map_err(err)? {
            return Ok(id);
        }
        let id = self.next_id(NEXT_TYPE_ID)?;
        self.dbs.type_labels.put(self.tx(), &id.to_be_bytes(), &name).map_err(err)?;
        self.dbs.type_names.put(self.tx(), &name, &id).map_err(err)?;
        self.set_next_id(NEXT_TYPE_ID, id + 1)?;
        debug!(id, object_type = %name, "registered object type");
        Ok(id)
    }

    /// Insert or update a permission and rebuild its indexes.
    ///
    /// A permission with id 0 is inserted and receives a fresh id; any other
    /// id must already exist.
    pub fn save_permission(&mut self, perm: &mut ObjectPermission) -> Result<u64> {
        perm.validate()?;

        if perm.id == 0 {
            perm.id = self.next_id(NEXT_PERM_ID)?;
            self.set_next_id(NEXT_PERM_ID, perm.id + 1)?;
        } else if !self.permission_exists(perm.id)? {
            return Err(ObjpermError::NotFound(format!("permission {}", perm.id)));
        } else {
            self.unindex(perm.id)?;
        }

        let id = perm.id;
        let bytes = serde_json::to_vec(&*perm)?;
        self.dbs.perms.put(self.tx(), &id.to_be_bytes(), &bytes).map_err(err)?;

        let now = current_epoch();
        for &user in &perm.users {
            self.dbs.users.put(self.tx(), user, id, now)?;
        }
        for &group in &perm.groups {
            self.dbs.groups.put(self.tx(), group, id, now)?;
        }
        for object_type in &perm.object_types {
            let type_id = self.register_object_type(object_type)?;
            self.dbs.types.put(self.tx(), type_id, id, now)?;
        }

        info!(id, name = %perm.name, enabled = perm.enabled, "saved object permission");
        Ok(id)
    }

    /// Delete a permission along with its user, group and object type links
    pub fn delete_permission(&mut self, id: u64) -> Result<bool> {
        let existed = self.dbs.perms.delete(self.tx(), &id.to_be_bytes()).map_err(err)?;
        if existed {
            self.unindex(id)?;
            info!(id, "deleted object permission");
        }
        Ok(existed)
    }

    /// Enable or disable a permission without touching anything else
    pub fn set_enabled(&mut self, id: u64, enabled: bool) -> Result<()> {
        let raw = self
            .dbs
            .perms
            .get(self.tx(), &id.to_be_bytes())
            .map_err(err)?
            .ok_or_else(|| ObjpermError::NotFound(format!("permission {}", id)))?
            .to_vec();
        let mut perm: ObjectPermission = serde_json::from_slice(&raw)?;
        perm.enabled = enabled;
        let bytes = serde_json::to_vec(&perm)?;
        self.dbs.perms.put(self.tx(), &id.to_be_bytes(), &bytes).map_err(err)
    }

    /// Make `user` a member of `group`
    #[inline]
    pub fn add_member(&mut self, user: u64, group: u64) -> Result<()> {
        self.dbs.members.put(self.tx(), user, group, current_epoch())
    }

    #[inline]
    pub fn remove_member(&mut self, user: u64, group: u64) -> Result<bool> {
        self.dbs.members.del(self.tx(), user, group)
    }

    fn permission_exists(&mut self, id: u64) -> Result<bool> {
        Ok(self.dbs.perms.get(self.tx(), &id.to_be_bytes()).map_err(err)?.is_some())
    }

    fn unindex(&mut self, id: u64) -> Result<()> {
        self.dbs.users.del_rev(self.tx(), id)?;
        self.dbs.groups.del_rev(self.tx(), id)?;
        self.dbs.types.del_rev(self.tx(), id)?;
        Ok(())
    }

    /// Missing counters start at 1; unreadable ones are an error
    fn next_id(&mut self, counter: &str) -> Result<u64> {
        match self.dbs.meta.get(self.tx(), counter).map_err(err)? {
            Some(raw) => raw.parse().map_err(|_| {
                ObjpermError::Storage(format!("corrupt counter {}: {:?}", counter, raw))
            }),
            None => Ok(1),
        }
    }

    fn set_next_id(&mut self, counter: &str, id: u64) -> Result<()> {
        self.dbs.meta.put(self.tx(), counter, &id.to_string()).map_err(err)
    }
}

/// Run multiple operations in a single transaction
#[inline]
pub fn transact<T, F: FnOnce(&mut Tx) -> Result<T>>(f: F) -> Result<T> {
    let mut tx = Tx::new()?;
    let r = f(&mut tx)?;
    tx.commit()?;
    Ok(r)
}
