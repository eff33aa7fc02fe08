//! objperm - Object-level permissions
//!
//! Grants a view/add/change/delete (or custom) action to users and groups on
//! the subset of objects of a type that match a declarative filter, on top
//! of ordinary `app_label.action_model` permission names.
//!
//! ```no_run
//! use objperm::*;
//! use serde_json::json;
//!
//! init("./data/objperm.mdb")?;
//! let mut perm = ObjectPermission::new("EU sites")
//!     .object_type(ObjectType::parse("dcim.site")?)
//!     .action("view")
//!     .user(42)
//!     .constraints(Constraints::from_value(json!({"region__slug": "eu"}))?);
//! save_permission(&mut perm)?;
//!
//! let backend = ObjectPermissionBackend::new(ExemptSettings::default());
//! assert!(backend.has_perm(&User::new(42, "alice"), "dcim.view_site")?);
//! # Ok::<(), ObjpermError>(())
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod constraint;
pub mod db;
pub mod entity;
pub mod error;
pub mod model;
pub mod permission;
pub mod perms;
pub mod queryset;
pub mod read;
pub mod tx;
pub mod view;

// Re-exports
pub use backend::{Authorizer, ObjectPermissionBackend, Restriction};
pub use config::{ConfigError, ExemptSettings, Settings};
pub use constants::Action;
pub use constraint::{Constraints, FilterSet, Lookup};
pub use db::{clear_all, init, test_lock};
pub use entity::{add_member, delete_permission, register_object_type, remove_member, save_permission, set_enabled};
pub use error::{ObjpermError, Result};
pub use model::{Model, ModelMeta, ObjectType, User};
pub use permission::ObjectPermission;
pub use perms::{get_permission_for_model, permission_is_exempt, resolve_permission, ResolvedPermission};
pub use queryset::{QuerySet, Restrict};
pub use read::{
    count_for_group, count_for_user, get_object_type, get_object_type_id, get_permission,
    groups_for_user, list_object_types, list_permissions, permissions_for_object_type,
    permissions_for_user, users_in_group,
};
pub use tx::{transact, Tx};
pub use view::{Denial, Dispatch, ObjectPermissionRequired, PermissionRequiredView, Request};
