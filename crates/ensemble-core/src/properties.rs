//! Properties: multi-valued key to [`Atom`] maps with a visibility context.

use crate::atom::Atom;
use crate::uri::Uri;
use crate::uris;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

/// Visibility and persistence scope of a property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Context {
    /// Visible everywhere.
    #[default]
    Default,
    /// Part of the object's public description.
    External,
    /// Only meaningful inside the object's parent graph.
    Internal,
}

impl Context {
    /// Whether a property tagged `self` is visible when asking for `ctx`.
    pub fn matches(self, ctx: Context) -> bool {
        self == Context::Default || ctx == Context::Default || self == ctx
    }
}

/// An [`Atom`] tagged with a [`Context`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Property {
    value: Atom,
    context: Context,
}

impl Property {
    pub fn new(value: Atom, context: Context) -> Self {
        Self { value, context }
    }

    pub fn value(&self) -> &Atom {
        &self.value
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn into_value(self) -> Atom {
        self.value
    }
}

impl Deref for Property {
    type Target = Atom;

    fn deref(&self) -> &Atom {
        &self.value
    }
}

impl From<Atom> for Property {
    fn from(value: Atom) -> Self {
        Self::new(value, Context::Default)
    }
}

/// Multi-valued map from key to [`Property`].
///
/// Values under one key are kept sorted, so two collections holding the same
/// pairs compare equal regardless of insertion order. Duplicate keys are
/// allowed; an identical `(key, value, context)` triple is stored once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    map: BTreeMap<Uri, Vec<Property>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<Uri>, value: impl Into<Property>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a value. Returns false if the exact pair was already present.
    pub fn insert(&mut self, key: impl Into<Uri>, value: impl Into<Property>) -> bool {
        let value = value.into();
        let values = self.map.entry(key.into()).or_default();
        match values.binary_search(&value) {
            Ok(_) => false,
            Err(pos) => {
                values.insert(pos, value);
                true
            }
        }
    }

    /// Replace every value of `key` with `value`, returning the old values.
    pub fn set(&mut self, key: impl Into<Uri>, value: impl Into<Property>) -> Vec<Property> {
        let old = self.map.insert(key.into(), vec![value.into()]);
        old.unwrap_or_default()
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&Atom> {
        self.map
            .get(key)
            .and_then(|values| values.first())
            .map(Property::value)
    }

    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Property> + 'a {
        self.map.get(key).into_iter().flatten()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Whether `key` has `value` under any context.
    pub fn contains(&self, key: &str, value: &Atom) -> bool {
        self.get_all(key).any(|p| p.value() == value)
    }

    /// Remove every value of `key` equal to `value` (any context).
    ///
    /// A [`uris::WILDCARD`] URI value removes every value of `key`.
    pub fn remove(&mut self, key: &str, value: &Atom) -> Vec<Property> {
        if is_wildcard(value) {
            return self.remove_key(key);
        }
        let Some(values) = self.map.get_mut(key) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        values.retain(|p| {
            if p.value() == value {
                removed.push(p.clone());
                false
            } else {
                true
            }
        });
        if values.is_empty() {
            self.map.remove(key);
        }
        removed
    }

    pub fn remove_key(&mut self, key: &str) -> Vec<Property> {
        self.map.remove(key).unwrap_or_default()
    }

    /// Add every pair of `other`.
    pub fn extend(&mut self, other: &Properties) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uri, &Property)> {
        self.map
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Uri> {
        self.map.keys()
    }

    /// Number of key/value pairs.
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether `TYPE` includes the class URI `class`.
    pub fn has_type(&self, class: &str) -> bool {
        self.get_all(uris::TYPE)
            .any(|p| p.as_str() == Some(class))
    }

    /// Copy of these properties with every value retagged to `ctx`.
    pub fn with_context(&self, ctx: Context) -> Properties {
        let mut out = Properties::new();
        for (key, value) in self.iter() {
            out.insert(key.clone(), Property::new(value.value().clone(), ctx));
        }
        out
    }

    /// Properties visible in `ctx`.
    pub fn filtered(&self, ctx: Context) -> Properties {
        let mut out = Properties::new();
        for (key, value) in self.iter().filter(|(_, p)| p.context().matches(ctx)) {
            out.insert(key.clone(), value.clone());
        }
        out
    }
}

impl<K: Into<Uri>, V: Into<Property>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (key, value) in iter {
            props.insert(key, value);
        }
        props
    }
}

fn is_wildcard(value: &Atom) -> bool {
    value.as_str() == Some(uris::WILDCARD) && value.atom_type() == crate::atom::types::URI
}
