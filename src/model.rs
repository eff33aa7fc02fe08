//! Object types, models and the requesting user.
//!
//! An object type is the `(app_label, model)` pair that permission names are
//! built from, written `app_label.model` (e.g. `dcim.site`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ObjpermError, Result};

/// An `app_label.model` pair identifying a kind of object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectType {
    app_label: String,
    model: String,
}

impl ObjectType {
    /// Create from separate app label and model name.
    ///
    /// Both parts must be non-empty and free of `.`; model names are
    /// lowercased the way permission names expect them.
    pub fn new(app_label: &str, model: &str) -> Result<Self> {
        if app_label.is_empty() {
            return Err(ObjpermError::InvalidArgument("App label cannot be empty".into()));
        }
        if model.is_empty() {
            return Err(ObjpermError::InvalidArgument("Model name cannot be empty".into()));
        }
        if app_label.contains('.') || model.contains('.') {
            return Err(ObjpermError::InvalidArgument(format!(
                "Invalid object type '{}.{}': parts cannot contain '.'",
                app_label, model
            )));
        }
        Ok(Self {
            app_label: app_label.to_string(),
            model: model.to_lowercase(),
        })
    }

    /// Parse from "app_label.model" format.
    ///
    /// # Example
    /// ```
    /// use objperm::ObjectType;
    /// let ot = ObjectType::parse("dcim.site").unwrap();
    /// assert_eq!(ot.app_label(), "dcim");
    /// assert_eq!(ot.model(), "site");
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let (app_label, model) = s.split_once('.').ok_or_else(|| {
            ObjpermError::InvalidArgument(format!(
                "Invalid object type '{}': must be 'app_label.model' format",
                s
            ))
        })?;
        Self::new(app_label, model)
    }

    #[inline]
    pub fn app_label(&self) -> &str {
        &self.app_label
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

impl FromStr for ObjectType {
    type Err = ObjpermError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ObjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A Rust type whose values are the objects permissions are granted on.
///
/// `MODEL_NAME` is used verbatim in permission names, so keep it lowercase.
///
/// ```
/// use objperm::Model;
///
/// #[derive(serde::Serialize, Clone)]
/// struct Site { id: u64, name: String }
///
/// impl Model for Site {
///     const APP_LABEL: &'static str = "dcim";
///     const MODEL_NAME: &'static str = "site";
/// }
///
/// assert_eq!(Site::object_type().to_string(), "dcim.site");
/// ```
pub trait Model {
    const APP_LABEL: &'static str;
    const MODEL_NAME: &'static str;

    fn object_type() -> ObjectType {
        ObjectType {
            app_label: Self::APP_LABEL.to_string(),
            model: Self::MODEL_NAME.to_string(),
        }
    }
}

/// App label and model name of a model type or one of its instances
pub trait ModelMeta {
    fn app_label(&self) -> &str;
    fn model_name(&self) -> &str;
}

impl ModelMeta for ObjectType {
    fn app_label(&self) -> &str {
        &self.app_label
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

impl<M: Model> ModelMeta for M {
    fn app_label(&self) -> &str {
        M::APP_LABEL
    }

    fn model_name(&self) -> &str {
        M::MODEL_NAME
    }
}

/// The user a request is made on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_true")]
    pub is_authenticated: bool,
}

fn default_true() -> bool {
    true
}

impl User {
    /// An active, authenticated, non-superuser account
    pub fn new(id: u64, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            is_active: true,
            is_superuser: false,
            is_authenticated: true,
        }
    }

    pub fn superuser(id: u64, username: &str) -> Self {
        Self { is_superuser: true, ..Self::new(id, username) }
    }

    /// The unauthenticated visitor
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            username: String::new(),
            is_active: false,
            is_superuser: false,
            is_authenticated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Device;

    impl Model for Device {
        const APP_LABEL: &'static str = "dcim";
        const MODEL_NAME: &'static str = "device";
    }

    #[test]
    fn test_parse() {
        let ot = ObjectType::parse("dcim.site").unwrap();
        assert_eq!(ot.app_label(), "dcim");
        assert_eq!(ot.model(), "site");
        assert_eq!(ot.to_string(), "dcim.site");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ObjectType::parse("nodot").is_err());
        assert!(ObjectType::parse("").is_err());
        assert!(ObjectType::parse(".site").is_err());
        assert!(ObjectType::parse("dcim.").is_err());
        assert!(ObjectType::parse("a.b.c").is_err());
    }

    #[test]
    fn test_model_name_lowercased() {
        let ot = ObjectType::new("dcim", "RackRole").unwrap();
        assert_eq!(ot.model(), "rackrole");
    }

    #[test]
    fn test_serde_as_string() {
        let ot = ObjectType::parse("ipam.prefix").unwrap();
        let json = serde_json::to_string(&ot).unwrap();
        assert_eq!(json, "\"ipam.prefix\"");
        let back: ObjectType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ot);
        assert!(serde_json::from_str::<ObjectType>("\"bogus\"").is_err());
    }

    #[test]
    fn test_model_meta_for_instances() {
        assert_eq!(Device.app_label(), "dcim");
        assert_eq!(Device.model_name(), "device");
        assert_eq!(Device::object_type(), ObjectType::parse("dcim.device").unwrap());
    }

    #[test]
    fn test_anonymous_user() {
        let u = User::anonymous();
        assert!(!u.is_authenticated);
        assert!(!u.is_active);
        assert!(User::superuser(1, "admin").is_superuser);
    }
}
