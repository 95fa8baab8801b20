//! URIs, object paths and the URI-to-integer map.

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer id for a mapped URI.
pub type Urid = u32;

/// A subject or key identifier.
///
/// Graph objects are addressed by URIs that are themselves [`Path`]s
/// (`/main/osc`); anything else (`ens:value`, a plugin URI) is an opaque
/// identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this URI names a graph object.
    pub fn is_path(&self) -> bool {
        self.0.starts_with('/')
    }

    pub fn to_path(&self) -> Option<Path> {
        Path::new(&self.0)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for Uri {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Path> for Uri {
    fn from(path: &Path) -> Self {
        Self(path.0.clone())
    }
}

impl From<Path> for Uri {
    fn from(path: Path) -> Self {
        Self(path.0)
    }
}

/// Whether `s` is a valid path segment: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A validated absolute object path such as `/` or `/main/osc/out`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path(String);

impl Path {
    /// Parse a path, returning `None` if it is malformed.
    pub fn new(s: &str) -> Option<Self> {
        if s == "/" {
            return Some(Self::root());
        }
        let rest = s.strip_prefix('/')?;
        if rest.split('/').all(is_valid_symbol) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment, empty for the root.
    pub fn symbol(&self) -> &str {
        match self.0.rfind('/') {
            Some(i) => &self.0[i + 1..],
            None => "",
        }
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(i) => Some(Self(self.0[..i].to_string())),
            None => None,
        }
    }

    pub fn child(&self, symbol: &str) -> Option<Path> {
        if !is_valid_symbol(symbol) {
            return None;
        }
        if self.is_root() {
            Some(Self(format!("/{symbol}")))
        } else {
            Some(Self(format!("{}/{symbol}", self.0)))
        }
    }

    pub fn is_child_of(&self, parent: &Path) -> bool {
        self.parent().as_ref() == Some(parent)
    }

    /// Strict descendant test (a path is not its own descendant).
    pub fn is_descendant_of(&self, ancestor: &Path) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    /// Replace the `from` prefix of this path with `to`.
    ///
    /// Returns `None` unless this path equals or descends from `from`.
    pub fn rebase(&self, from: &Path, to: &Path) -> Option<Path> {
        if self == from {
            return Some(to.clone());
        }
        if !self.is_descendant_of(from) {
            return None;
        }
        let suffix = if from.is_root() {
            &self.0[1..]
        } else {
            &self.0[from.0.len() + 1..]
        };
        if to.is_root() {
            Some(Self(format!("/{suffix}")))
        } else {
            Some(Self(format!("{}/{suffix}", to.0)))
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Path {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Path::new(&s).ok_or(s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.0
    }
}

struct UriTable {
    ids: HashMap<String, Urid>,
    uris: Vec<String>,
}

/// Bidirectional URI to [`Urid`] map.
///
/// Id 0 is never assigned. The built-in atom types are registered first so
/// their ids match the constants in [`crate::atom::types`]. Mapping takes a
/// write lock and must stay off the realtime thread; ids themselves are plain
/// integers and safe to use anywhere.
pub struct UriMap {
    table: RwLock<UriTable>,
}

impl UriMap {
    pub fn new() -> Self {
        let map = Self {
            table: RwLock::new(UriTable {
                ids: HashMap::new(),
                uris: vec![String::new()],
            }),
        };
        for uri in crate::atom::types::BUILTIN {
            map.map(uri);
        }
        map
    }

    pub fn map(&self, uri: &str) -> Urid {
        if let Some(&id) = self.table.read().ids.get(uri) {
            return id;
        }
        let mut table = self.table.write();
        if let Some(&id) = table.ids.get(uri) {
            return id;
        }
        let id = table.uris.len() as Urid;
        table.uris.push(uri.to_string());
        table.ids.insert(uri.to_string(), id);
        id
    }

    pub fn unmap(&self, id: Urid) -> Option<String> {
        if id == 0 {
            return None;
        }
        self.table.read().uris.get(id as usize).cloned()
    }
}

impl Default for UriMap {
    fn default() -> Self {
        Self::new()
    }
}
