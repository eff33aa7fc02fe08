//! Backend tests
//!
//! Permission checks and object restrictions resolved from stored grants.

use objperm::{
    add_member, clear_all, init, save_permission, set_enabled, test_lock, Authorizer, Constraints,
    ExemptSettings, ObjectPermission, ObjectPermissionBackend, ObjectType, ObjpermError,
    Restriction, User,
};
use serde_json::json;
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();
static mut TEST_DIR: Option<TempDir> = None;

fn setup() {
    INIT.call_once(|| {
        let dir = TempDir::new().unwrap();
        init(dir.path().to_str().unwrap()).unwrap();
        unsafe { TEST_DIR = Some(dir); }
    });
}

fn setup_clean() -> std::sync::MutexGuard<'static, ()> {
    let lock = test_lock();
    setup();
    clear_all().unwrap();
    lock
}

fn site() -> ObjectType {
    ObjectType::parse("dcim.site").unwrap()
}

fn grant(name: &str, actions: &[&str], constraints: serde_json::Value) -> ObjectPermission {
    ObjectPermission::new(name)
        .object_type(site())
        .actions(actions.iter().copied())
        .constraints(Constraints::from_value(constraints).unwrap())
}

fn backend() -> ObjectPermissionBackend {
    ObjectPermissionBackend::new(ExemptSettings::default())
}

fn alice() -> User {
    User::new(1, "alice")
}

// ============================================================================
// has_perm
// ============================================================================

#[test]
fn direct_grant_gives_permission() {
    let _lock = setup_clean();

    let mut p = grant("p", &["view", "change"], json!(null)).user(1);
    save_permission(&mut p).unwrap();

    let b = backend();
    assert!(b.has_perm(&alice(), "dcim.view_site").unwrap());
    assert!(b.has_perm(&alice(), "dcim.change_site").unwrap());
    assert!(!b.has_perm(&alice(), "dcim.delete_site").unwrap());
    assert!(!b.has_perm(&alice(), "dcim.view_rack").unwrap());
    assert!(!b.has_perm(&User::new(2, "bob"), "dcim.view_site").unwrap());
}

#[test]
fn constrained_grant_still_counts_for_has_perm() {
    let _lock = setup_clean();

    let mut p = grant("p", &["view"], json!({"status": "active"})).user(1);
    save_permission(&mut p).unwrap();

    assert!(backend().has_perm(&alice(), "dcim.view_site").unwrap());
}

#[test]
fn group_grant_gives_permission() {
    let _lock = setup_clean();

    let mut p = grant("p", &["delete"], json!(null)).group(50);
    save_permission(&mut p).unwrap();

    assert!(!backend().has_perm(&alice(), "dcim.delete_site").unwrap());
    add_member(1, 50).unwrap();
    assert!(backend().has_perm(&alice(), "dcim.delete_site").unwrap());
    assert_eq!(backend().get_group_ids(&alice()).unwrap(), vec![50]);
}

#[test]
fn custom_actions_are_granted_by_name() {
    let _lock = setup_clean();

    let mut p = grant("p", &["run_script"], json!(null)).user(1);
    save_permission(&mut p).unwrap();

    assert!(backend().has_perm(&alice(), "dcim.run_script_site").unwrap());
}

#[test]
fn disabled_grant_gives_nothing() {
    let _lock = setup_clean();

    let mut p = grant("p", &["view"], json!(null)).user(1);
    let id = save_permission(&mut p).unwrap();
    set_enabled(id, false).unwrap();

    assert!(!backend().has_perm(&alice(), "dcim.view_site").unwrap());
    assert_eq!(backend().restriction(&alice(), "dcim.view_site").unwrap(), Restriction::Denied);
}

#[test]
fn inactive_and_anonymous_users_hold_nothing() {
    let _lock = setup_clean();

    let mut p = grant("p", &["view"], json!(null)).user(1).user(0);
    save_permission(&mut p).unwrap();

    let mut inactive = alice();
    inactive.is_active = false;
    let b = backend();
    assert!(!b.has_perm(&inactive, "dcim.view_site").unwrap());
    assert!(!b.has_perm(&User::anonymous(), "dcim.view_site").unwrap());
    assert!(b.get_all_permissions(&inactive).unwrap().is_empty());
}

#[test]
fn active_superuser_has_everything() {
    let _lock = setup_clean();

    let b = backend();
    let root = User::superuser(9, "root");
    assert!(b.has_perm(&root, "dcim.delete_site").unwrap());
    assert!(b.has_perms(&root, &["dcim.view_site", "ipam.add_vlan"]).unwrap());
    assert_eq!(b.restriction(&root, "dcim.view_site").unwrap(), Restriction::Unrestricted);

    let mut retired = User::superuser(9, "root");
    retired.is_active = false;
    assert!(!b.has_perm(&retired, "dcim.delete_site").unwrap());
}

#[test]
fn has_perms_needs_all() {
    let _lock = setup_clean();

    let mut p = grant("p", &["view", "change"], json!(null)).user(1);
    save_permission(&mut p).unwrap();

    let b = backend();
    assert!(b.has_perms(&alice(), &["dcim.view_site", "dcim.change_site"]).unwrap());
    assert!(!b.has_perms(&alice(), &["dcim.view_site", "dcim.delete_site"]).unwrap());
    assert!(b.has_perms(&alice(), &[]).unwrap());
}

#[test]
fn malformed_names_are_errors() {
    let _lock = setup_clean();

    let e = backend().has_perm(&alice(), "view_site").unwrap_err();
    assert!(matches!(e, ObjpermError::InvalidArgument(_)));
}

#[test]
fn permission_names_are_sorted() {
    let _lock = setup_clean();

    let mut p = grant("p", &["view", "add"], json!(null)).user(1);
    save_permission(&mut p).unwrap();

    assert_eq!(
        backend().permission_names(&alice()).unwrap(),
        vec!["dcim.add_site", "dcim.view_site"]
    );
}

// ============================================================================
// Exemptions
// ============================================================================

#[test]
fn exempt_view_needs_no_grant() {
    let _lock = setup_clean();

    let b = ObjectPermissionBackend::new(ExemptSettings::all().exclude("users", "token"));
    assert!(b.has_perm(&alice(), "dcim.view_site").unwrap());
    assert!(b.has_perm(&User::anonymous(), "dcim.view_site").unwrap());
    assert!(!b.has_perm(&alice(), "users.view_token").unwrap());
    assert!(!b.has_perm(&alice(), "dcim.change_site").unwrap());
    assert_eq!(b.restriction(&alice(), "dcim.view_site").unwrap(), Restriction::Unrestricted);
}

#[test]
fn listed_models_are_exempt() {
    let _lock = setup_clean();

    let b = ObjectPermissionBackend::new(ExemptSettings::models(["dcim.site"]));
    assert!(b.has_perm(&alice(), "dcim.view_site").unwrap());
    assert!(!b.has_perm(&alice(), "dcim.view_rack").unwrap());
}

// ============================================================================
// Restrictions
// ============================================================================

#[test]
fn no_grant_is_denied() {
    let _lock = setup_clean();
    assert_eq!(backend().restriction(&alice(), "dcim.view_site").unwrap(), Restriction::Denied);
}

#[test]
fn unconstrained_grant_is_unrestricted() {
    let _lock = setup_clean();

    let mut scoped = grant("scoped", &["view"], json!({"status": "active"})).user(1);
    let mut open = grant("open", &["view"], json!(null)).user(1);
    save_permission(&mut scoped).unwrap();
    save_permission(&mut open).unwrap();

    assert_eq!(
        backend().restriction(&alice(), "dcim.view_site").unwrap(),
        Restriction::Unrestricted
    );
}

#[test]
fn constrained_grants_are_unioned() {
    let _lock = setup_clean();

    let mut a = grant("a", &["view"], json!({"status": "active"})).user(1);
    let mut b = grant("b", &["view"], json!([{"region": "eu"}, {"owner": "$user"}])).group(7);
    save_permission(&mut a).unwrap();
    save_permission(&mut b).unwrap();
    add_member(1, 7).unwrap();

    match backend().restriction(&alice(), "dcim.view_site").unwrap() {
        Restriction::Filtered(sets) => {
            assert_eq!(sets.len(), 3);
            let values: Vec<_> = sets.into_iter().map(serde_json::Value::Object).collect();
            assert!(values.contains(&json!({"status": "active"})));
            assert!(values.contains(&json!({"region": "eu"})));
            assert!(values.contains(&json!({"owner": "$user"})));
        }
        other => panic!("unexpected {:?}", other),
    }
}
