//! Permission names.
//!
//! A permission name has the form `<app_label>.<action>_<model_name>`, e.g.
//! `dcim.view_site`. These functions build and decode such names and decide
//! whether a `view` permission is exempt from enforcement.

use crate::config::ExemptSettings;
use crate::constants::Action;
use crate::error::{ObjpermError, Result};
use crate::model::ModelMeta;

/// A permission name split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPermission {
    pub app_label: String,
    pub action: String,
    pub model_name: String,
}

impl ResolvedPermission {
    /// `(app_label, action, model_name)` borrowed
    pub fn as_tuple(&self) -> (&str, &str, &str) {
        (&self.app_label, &self.action, &self.model_name)
    }
}

/// Build the permission name for a model (or instance) and a standard action.
///
/// ```
/// use objperm::{get_permission_for_model, ObjectType};
/// let site = ObjectType::parse("dcim.site").unwrap();
/// assert_eq!(get_permission_for_model(&site, "view").unwrap(), "dcim.view_site");
/// assert!(get_permission_for_model(&site, "run").is_err());
/// ```
pub fn get_permission_for_model<M: ModelMeta + ?Sized>(model: &M, action: &str) -> Result<String> {
    let action: Action = action
        .parse()
        .map_err(|_| ObjpermError::InvalidArgument(format!("Unsupported action: {}", action)))?;
    Ok(format_permission(model.app_label(), action.as_str(), model.model_name()))
}

/// Join the three parts without checking the action
#[inline]
pub(crate) fn format_permission(app_label: &str, action: &str, model_name: &str) -> String {
    format!("{}.{}_{}", app_label, action, model_name)
}

/// Split a permission name into app label, action and model name.
///
/// The name must contain exactly one `.`; the codename after it is split
/// on its last `_`, so actions may themselves contain underscores.
pub fn resolve_permission(name: &str) -> Result<ResolvedPermission> {
    let invalid = || {
        ObjpermError::InvalidArgument(format!(
            "Invalid permission name: {}. Must be in the format <app_label>.<action>_<model>",
            name
        ))
    };

    let mut parts = name.split('.');
    let (app_label, codename) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(c), None) => (a, c),
        _ => return Err(invalid()),
    };
    let (action, model_name) = codename.rsplit_once('_').ok_or_else(invalid)?;

    Ok(ResolvedPermission {
        app_label: app_label.to_string(),
        action: action.to_string(),
        model_name: model_name.to_string(),
    })
}

/// Whether the named permission skips enforcement.
///
/// Only `view` permissions can be exempt: either every model is exempt
/// (`"*"`) and this one is not excluded, or this `app_label.model_name`
/// is listed explicitly.
pub fn permission_is_exempt(name: &str, settings: &ExemptSettings) -> Result<bool> {
    let p = resolve_permission(name)?;

    if p.action != Action::View.as_str() {
        return Ok(false);
    }

    let wildcard = settings.has_wildcard() && !settings.is_excluded(&p.app_label, &p.model_name);
    Ok(wildcard || settings.lists(&p.app_label, &p.model_name))
}
