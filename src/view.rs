//! Object-level permission enforcement for views.
//!
//! Works like a model-level permission check, extended to object-level
//! grants: when the user holds the required permission only through
//! constrained grants, the view's queryset is narrowed to the objects those
//! grants cover.
//!
//! A view opts in by implementing [`PermissionRequiredView`]; the check
//! itself lives in [`ObjectPermissionRequired`], which can be paired with
//! any [`Authorizer`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::Authorizer;
use crate::error::{ObjpermError, Result};
use crate::model::{Model, User};
use crate::perms::resolve_permission;
use crate::queryset::{QuerySet, Restrict};

/// Where unauthenticated users are sent by default
pub const DEFAULT_LOGIN_URL: &str = "/login/";

/// The parts of an incoming request the permission check needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub user: User,
    pub path: String,
}

impl Request {
    pub fn new(user: User, path: &str) -> Self {
        Self { user, path: path.to_string() }
    }
}

/// The response produced when permission is lacking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    /// Authenticated but not permitted (403)
    Forbidden,
    /// Anonymous; send to the login page and come back to `next`
    LoginRequired { login_url: String, next: String },
}

/// Outcome of [`ObjectPermissionRequired::dispatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<R> {
    /// The handler ran with the narrowed queryset in place
    Handled(R),
    Denied(Denial),
}

/// A view that needs a permission on a queryset of `Object`.
pub trait PermissionRequiredView {
    type Object: Model + Serialize + Clone;

    /// The specific permission needed to perform the requested action
    fn get_required_permission(&self) -> Result<String> {
        Err(ObjpermError::NotImplemented(format!(
            "{} must implement get_required_permission()",
            short_type_name::<Self>()
        )))
    }

    /// Statically declared permissions checked along with the required one
    fn additional_permissions(&self) -> &[String] {
        &[]
    }

    /// The base queryset; `None` if the view declares none
    fn queryset(&self) -> Option<&QuerySet<Self::Object>>;

    fn set_queryset(&mut self, queryset: QuerySet<Self::Object>);

    fn login_url(&self) -> &str {
        DEFAULT_LOGIN_URL
    }

    /// Forbidden for signed-in users, a login redirect for everyone else
    fn handle_no_permission(&self, request: &Request) -> Denial {
        if request.user.is_authenticated {
            Denial::Forbidden
        } else {
            Denial::LoginRequired {
                login_url: self.login_url().to_string(),
                next: request.path.clone(),
            }
        }
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Checks a view's permissions and restricts its queryset
#[derive(Debug, Clone)]
pub struct ObjectPermissionRequired<A> {
    authorizer: A,
}

impl<A: Authorizer> ObjectPermissionRequired<A> {
    pub fn new(authorizer: A) -> Self {
        Self { authorizer }
    }

    /// Whether `user` holds the view's required and additional permissions.
    ///
    /// On success the view's queryset is replaced by the objects the user
    /// may perform the required action on.
    pub fn has_permission<V: PermissionRequiredView>(&self, view: &mut V, user: &User) -> Result<bool> {
        let required = view.get_required_permission()?;

        let mut perms: Vec<&str> = vec![required.as_str()];
        perms.extend(view.additional_permissions().iter().map(String::as_str));

        if !self.authorizer.has_perms(user, &perms)? {
            debug!(user = user.id, perm = %required, "permission denied");
            return Ok(false);
        }

        let action = resolve_permission(&required)?.action;
        let narrowed = match view.queryset() {
            Some(qs) => qs.restrict(&self.authorizer, user, &action)?,
            None => return Err(missing_queryset::<V>()),
        };
        view.set_queryset(narrowed);
        Ok(true)
    }

    /// Run `handler` if the request's user is permitted, otherwise produce
    /// the view's no-permission response.
    ///
    /// A view without a base queryset is a wiring mistake and fails before
    /// any permission is evaluated.
    pub fn dispatch<V, R, F>(&self, view: &mut V, request: &Request, handler: F) -> Result<Dispatch<R>>
    where
        V: PermissionRequiredView,
        F: FnOnce(&mut V, &Request) -> R,
    {
        if view.queryset().is_none() {
            let e = missing_queryset::<V>();
            warn!(error = %e, "view misconfigured");
            return Err(e);
        }

        if !self.has_permission(view, &request.user)? {
            return Ok(Dispatch::Denied(view.handle_no_permission(request)));
        }

        Ok(Dispatch::Handled(handler(view, request)))
    }
}

fn missing_queryset<V: ?Sized>() -> ObjpermError {
    ObjpermError::ImproperlyConfigured(format!(
        "{} has no queryset defined. ObjectPermissionRequired may only be used on views which define a base queryset",
        short_type_name::<V>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, serde::Serialize)]
    struct Widget {
        id: u64,
    }

    impl Model for Widget {
        const APP_LABEL: &'static str = "shop";
        const MODEL_NAME: &'static str = "widget";
    }

    struct Bare {
        qs: Option<QuerySet<Widget>>,
    }

    impl PermissionRequiredView for Bare {
        type Object = Widget;

        fn queryset(&self) -> Option<&QuerySet<Widget>> {
            self.qs.as_ref()
        }

        fn set_queryset(&mut self, queryset: QuerySet<Widget>) {
            self.qs = Some(queryset);
        }
    }

    #[test]
    fn test_required_permission_must_be_implemented() {
        let view = Bare { qs: None };
        match view.get_required_permission() {
            Err(ObjpermError::NotImplemented(m)) => {
                assert_eq!(m, "Bare must implement get_required_permission()")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_handle_no_permission() {
        let view = Bare { qs: None };
        let signed_in = Request::new(User::new(1, "a"), "/widgets/");
        assert_eq!(view.handle_no_permission(&signed_in), Denial::Forbidden);

        let anon = Request::new(User::anonymous(), "/widgets/");
        assert_eq!(
            view.handle_no_permission(&anon),
            Denial::LoginRequired { login_url: "/login/".into(), next: "/widgets/".into() }
        );
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Bare>(), "Bare");
        assert_eq!(short_type_name::<QuerySet<Widget>>(), "QuerySet");
    }
}
