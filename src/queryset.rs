//! In-memory result sets that can be narrowed to what a user may act upon

use serde::Serialize;
use tracing::debug;

use crate::backend::{Authorizer, Restriction};
use crate::constraint::{filter_matches, FilterSet};
use crate::error::Result;
use crate::model::{Model, ObjectType, User};
use crate::perms::get_permission_for_model;

/// Narrow a result set to the objects a user may perform an action on
pub trait Restrict: Sized {
    fn restrict<A: Authorizer + ?Sized>(&self, authorizer: &A, user: &User, action: &str) -> Result<Self>;
}

/// An ordered collection of objects of one model
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySet<T> {
    items: Vec<T>,
}

impl<T: Model + Serialize + Clone> QuerySet<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// An empty set
    pub fn none() -> Self {
        Self { items: Vec::new() }
    }

    /// A copy of the whole set
    pub fn all(&self) -> Self {
        self.clone()
    }

    pub fn object_type(&self) -> ObjectType {
        T::object_type()
    }

    /// Objects satisfying every parameter of `set`
    pub fn filter(&self, set: &FilterSet, user: &User) -> Result<Self> {
        self.filter_any(std::slice::from_ref(set), user)
    }

    /// Objects satisfying at least one of `sets`
    pub fn filter_any(&self, sets: &[FilterSet], user: &User) -> Result<Self> {
        let mut items = Vec::new();
        for item in &self.items {
            let value = serde_json::to_value(item)?;
            for set in sets {
                if filter_matches(set, &value, user)? {
                    items.push(item.clone());
                    break;
                }
            }
        }
        Ok(Self { items })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Model + Serialize + Clone> Restrict for QuerySet<T> {
    /// Only the standard actions can be restricted on.
    fn restrict<A: Authorizer + ?Sized>(&self, authorizer: &A, user: &User, action: &str) -> Result<Self> {
        let perm = get_permission_for_model(&T::object_type(), action)?;
        let narrowed = match authorizer.restriction(user, &perm)? {
            Restriction::Unrestricted => self.all(),
            Restriction::Filtered(sets) => self.filter_any(&sets, user)?,
            Restriction::Denied => Self::none(),
        };
        debug!(perm, user = user.id, before = self.len(), after = narrowed.len(), "restricted queryset");
        Ok(narrowed)
    }
}

impl<T> From<Vec<T>> for QuerySet<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> IntoIterator for QuerySet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
