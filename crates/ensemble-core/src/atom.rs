//! Self-describing typed values.
//!
//! An [`Atom`] is `(type, size, body)`. Bodies no larger than a pointer live
//! inline in the atom; larger bodies live in an owned heap block that starts
//! with an 8-byte header repeating `(size, type)`, so the block can be handed
//! to code that expects a standalone atom.
//!
//! # RT Safety
//!
//! Constructing, cloning or dropping a heap-backed atom allocates or frees.
//! The audio thread only ever uses [`Atom::set_rt`], which refuses to touch
//! anything that is not inline.

use crate::uri::{Path, Urid};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Largest body stored inline.
pub const INLINE_CAPACITY: usize = std::mem::size_of::<usize>();

const HEADER_SIZE: usize = 8;

/// Largest body an atom can describe. Longer inputs are cut to fit.
pub const MAX_BODY: usize = u32::MAX as usize;

/// Bytes of `len` that fit next to `reserved` trailing bytes, and the
/// resulting size field.
fn fit(len: usize, reserved: u32) -> (usize, u32) {
    let len = len.min(MAX_BODY - reserved as usize);
    match u32::try_from(len) {
        Ok(n) => (len, n + reserved),
        Err(_) => (0, reserved),
    }
}

/// Ids of the built-in atom types. [`crate::UriMap`] registers them first so
/// mapping their URIs yields these exact values.
pub mod types {
    use crate::uri::Urid;

    pub const NIL: Urid = 0;
    pub const INT: Urid = 1;
    pub const LONG: Urid = 2;
    pub const FLOAT: Urid = 3;
    pub const DOUBLE: Urid = 4;
    pub const BOOL: Urid = 5;
    pub const URID: Urid = 6;
    pub const STRING: Urid = 7;
    pub const URI: Urid = 8;
    pub const PATH: Urid = 9;
    pub const CHUNK: Urid = 10;
    pub const SEQUENCE: Urid = 11;
    pub const SOUND: Urid = 12;
    pub const MIDI_EVENT: Urid = 13;

    pub const INT_URI: &str = "atom:Int";
    pub const LONG_URI: &str = "atom:Long";
    pub const FLOAT_URI: &str = "atom:Float";
    pub const DOUBLE_URI: &str = "atom:Double";
    pub const BOOL_URI: &str = "atom:Bool";
    pub const URID_URI: &str = "atom:URID";
    pub const STRING_URI: &str = "atom:String";
    pub const URI_URI: &str = "atom:URI";
    pub const PATH_URI: &str = "atom:Path";
    pub const CHUNK_URI: &str = "atom:Chunk";
    pub const SEQUENCE_URI: &str = "atom:Sequence";
    pub const SOUND_URI: &str = "atom:Sound";
    pub const MIDI_EVENT_URI: &str = "midi:MidiEvent";

    /// Registration order for [`crate::UriMap::new`]; index + 1 is the id.
    pub const BUILTIN: [&str; 13] = [
        INT_URI,
        LONG_URI,
        FLOAT_URI,
        DOUBLE_URI,
        BOOL_URI,
        URID_URI,
        STRING_URI,
        URI_URI,
        PATH_URI,
        CHUNK_URI,
        SEQUENCE_URI,
        SOUND_URI,
        MIDI_EVENT_URI,
    ];
}

/// Plain scalar types with a fixed atom type and native-endian encoding.
pub trait Primitive: Copy {
    const TYPE: Urid;
    const SIZE: usize;

    fn write(self, out: &mut [u8]);
    fn read(bytes: &[u8]) -> Self;
}

macro_rules! primitive {
    ($ty:ty, $atom_type:expr) => {
        impl Primitive for $ty {
            const TYPE: Urid = $atom_type;
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn write(self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
            }

            fn read(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_ne_bytes(raw)
            }
        }
    };
}

primitive!(i32, types::INT);
primitive!(i64, types::LONG);
primitive!(f32, types::FLOAT);
primitive!(f64, types::DOUBLE);

impl Primitive for bool {
    const TYPE: Urid = types::BOOL;
    const SIZE: usize = 4;

    fn write(self, out: &mut [u8]) {
        (self as i32).write(out)
    }

    fn read(bytes: &[u8]) -> Self {
        i32::read(bytes) != 0
    }
}

#[derive(Clone)]
enum Body {
    Inline([u8; INLINE_CAPACITY]),
    /// Header followed by `size` body bytes.
    Heap(Box<[u8]>),
}

/// A typed value, inline when small and heap-backed otherwise.
#[derive(Clone)]
pub struct Atom {
    size: u32,
    atom_type: Urid,
    body: Body,
}

impl Atom {
    /// Construct from `(size, type, body)`.
    ///
    /// `body` may be shorter than `size` (including empty); the remainder is
    /// zeroed. Passing more than `size` bytes is a contract violation.
    pub fn new(size: u32, atom_type: Urid, body: &[u8]) -> Self {
        debug_assert!(body.len() <= size as usize);
        let len = body.len().min(size as usize);
        if size as usize <= INLINE_CAPACITY {
            let mut inline = [0u8; INLINE_CAPACITY];
            inline[..len].copy_from_slice(&body[..len]);
            Self {
                size,
                atom_type,
                body: Body::Inline(inline),
            }
        } else {
            let mut block = vec![0u8; HEADER_SIZE + size as usize].into_boxed_slice();
            block[..4].copy_from_slice(&size.to_ne_bytes());
            block[4..8].copy_from_slice(&atom_type.to_ne_bytes());
            block[HEADER_SIZE..HEADER_SIZE + len].copy_from_slice(&body[..len]);
            Self {
                size,
                atom_type,
                body: Body::Heap(block),
            }
        }
    }

    /// Construct from a complete body slice, cut to [`MAX_BODY`] bytes.
    pub fn from_bytes(atom_type: Urid, body: &[u8]) -> Self {
        let (len, size) = fit(body.len(), 0);
        Self::new(size, atom_type, &body[..len])
    }

    pub fn from_value<T: Primitive>(value: T) -> Self {
        let mut raw = [0u8; INLINE_CAPACITY];
        value.write(&mut raw);
        Self::new(T::SIZE as u32, T::TYPE, &raw[..T::SIZE])
    }

    pub fn int(value: i32) -> Self {
        Self::from_value(value)
    }

    pub fn long(value: i64) -> Self {
        Self::from_value(value)
    }

    pub fn float(value: f32) -> Self {
        Self::from_value(value)
    }

    pub fn double(value: f64) -> Self {
        Self::from_value(value)
    }

    pub fn bool(value: bool) -> Self {
        Self::from_value(value)
    }

    pub fn urid(value: Urid) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&value.to_ne_bytes());
        Self::new(4, types::URID, &raw)
    }

    /// NUL-terminated string, like every textual atom type.
    pub fn string(value: &str) -> Self {
        Self::text(types::STRING, value)
    }

    pub fn uri(value: &str) -> Self {
        Self::text(types::URI, value)
    }

    pub fn path(value: &Path) -> Self {
        Self::text(types::PATH, value.as_str())
    }

    /// Text past [`MAX_BODY`] less the terminator is cut at a char boundary.
    fn text(atom_type: Urid, value: &str) -> Self {
        let (mut len, _) = fit(value.len(), 1);
        while !value.is_char_boundary(len) {
            len -= 1;
        }
        Self::new(len as u32 + 1, atom_type, &value.as_bytes()[..len])
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn atom_type(&self) -> Urid {
        self.atom_type
    }

    /// False for the default (nil) atom.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.atom_type != types::NIL
    }

    /// Whether the body lives in a separately owned block.
    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self.body, Body::Heap(_))
    }

    #[inline]
    pub fn get_body(&self) -> &[u8] {
        match &self.body {
            Body::Inline(raw) => &raw[..self.size as usize],
            Body::Heap(block) => &block[HEADER_SIZE..],
        }
    }

    #[inline]
    pub fn get_body_mut(&mut self) -> &mut [u8] {
        match &mut self.body {
            Body::Inline(raw) => &mut raw[..self.size as usize],
            Body::Heap(block) => &mut block[HEADER_SIZE..],
        }
    }

    /// Header plus body of a heap-backed atom.
    pub fn as_block(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Inline(_) => None,
            Body::Heap(block) => Some(block),
        }
    }

    /// Read a primitive value if the type matches.
    pub fn get<T: Primitive>(&self) -> Option<T> {
        (self.atom_type == T::TYPE && self.size as usize >= T::SIZE)
            .then(|| T::read(self.get_body()))
    }

    /// Numeric value as `f32`, converting ints, longs, doubles and bools.
    pub fn as_f32(&self) -> Option<f32> {
        match self.atom_type {
            types::FLOAT => self.get::<f32>(),
            types::DOUBLE => self.get::<f64>().map(|v| v as f32),
            types::INT => self.get::<i32>().map(|v| v as f32),
            types::LONG => self.get::<i64>().map(|v| v as f32),
            types::BOOL => self.get::<bool>().map(|v| if v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer value, accepting int and long.
    pub fn as_i64(&self) -> Option<i64> {
        match self.atom_type {
            types::INT => self.get::<i32>().map(i64::from),
            types::LONG => self.get::<i64>(),
            _ => None,
        }
    }

    pub fn as_urid(&self) -> Option<Urid> {
        (self.atom_type == types::URID && self.size == 4).then(|| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&self.get_body()[..4]);
            Urid::from_ne_bytes(raw)
        })
    }

    /// Text of a string, URI or path atom, without the terminator.
    pub fn as_str(&self) -> Option<&str> {
        if !matches!(self.atom_type, types::STRING | types::URI | types::PATH) {
            return None;
        }
        let body = self.get_body();
        let body = body.strip_suffix(&[0]).unwrap_or(body);
        std::str::from_utf8(body).ok()
    }

    /// Realtime-safe assignment.
    ///
    /// Succeeds only when both `self` and `other` are inline; otherwise
    /// returns false and leaves `self` untouched.
    #[inline]
    pub fn set_rt(&mut self, other: &Atom) -> bool {
        match (&mut self.body, &other.body) {
            (Body::Inline(dst), Body::Inline(src)) => {
                *dst = *src;
                self.size = other.size;
                self.atom_type = other.atom_type;
                true
            }
            _ => false,
        }
    }
}

impl Default for Atom {
    fn default() -> Self {
        Self {
            size: 0,
            atom_type: types::NIL,
            body: Body::Inline([0u8; INLINE_CAPACITY]),
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.atom_type == other.atom_type && self.get_body() == other.get_body()
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    /// Type first, then body bytes; on a common prefix the shorter body sorts first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.atom_type
            .cmp(&other.atom_type)
            .then_with(|| self.get_body().cmp(other.get_body()))
    }
}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.atom_type.hash(state);
        self.get_body().hash(state);
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({}, {})", self.atom_type, self)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.atom_type {
            types::NIL => f.write_str("nil"),
            types::INT | types::LONG => match self.as_i64() {
                Some(v) => write!(f, "{v}"),
                None => f.write_str("?"),
            },
            types::FLOAT => write!(f, "{}", self.get::<f32>().unwrap_or_default()),
            types::DOUBLE => write!(f, "{}", self.get::<f64>().unwrap_or_default()),
            types::BOOL => write!(f, "{}", self.get::<bool>().unwrap_or_default()),
            types::URID => write!(f, "urid:{}", self.as_urid().unwrap_or_default()),
            types::STRING => write!(f, "{:?}", self.as_str().unwrap_or_default()),
            types::URI | types::PATH => write!(f, "<{}>", self.as_str().unwrap_or_default()),
            _ => write!(f, "[{} bytes]", self.size),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct AtomRepr {
    #[serde(rename = "type")]
    atom_type: Urid,
    body: Vec<u8>,
}

impl Serialize for Atom {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AtomRepr {
            atom_type: self.atom_type,
            body: self.get_body().to_vec(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Atom {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = AtomRepr::deserialize(deserializer)?;
        Ok(Atom::from_bytes(repr.atom_type, &repr.body))
    }
}

impl From<f32> for Atom {
    fn from(value: f32) -> Self {
        Atom::float(value)
    }
}

impl From<i32> for Atom {
    fn from(value: i32) -> Self {
        Atom::int(value)
    }
}

impl From<bool> for Atom {
    fn from(value: bool) -> Self {
        Atom::bool(value)
    }
}

impl From<&str> for Atom {
    fn from(value: &str) -> Self {
        Atom::string(value)
    }
}
