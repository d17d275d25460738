//! Deterministic hash-based identity for types and members.
//!
//! [`TypeHash`] is a 64-bit hash computed from names and signatures. The
//! renderer uses it to deduplicate hoisted reflection lookups and the
//! registry uses it as its primary key, so the same member always maps to
//! the same identity regardless of registration order.
//!
//! # Examples
//!
//! ```
//! use opgraph_core::TypeHash;
//!
//! let int_hash = TypeHash::from_name("int");
//! assert_eq!(int_hash, TypeHash::from_name("int"));
//!
//! let owner = TypeHash::from_name("System.Math");
//! let a = TypeHash::from_method(owner, "Max", &[int_hash, int_hash]);
//! let b = TypeHash::from_method(owner, "Max", &[int_hash]);
//! assert_ne!(a, b);
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants.
///
/// Different member kinds sharing a name must never collide.
pub mod hash_constants {
    /// Separator constant for signature components.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for type hashes.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for method hashes.
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes.
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Domain marker for field hashes.
    pub const FIELD: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for property hashes.
    pub const PROPERTY: u64 = 0x3e9f5d2a8c7b1403;

    /// Domain marker for event hashes.
    pub const EVENT: u64 = 0x1a095090689d4647;

    /// Parameter position markers; order of parameters matters.
    pub const PARAM_MARKERS: [u64; 16] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
        0x7c3e9f2a5b8d1403,
        0x5d8c7b4a3e9f2106,
        0x3f1e9d8c7b5a4203,
        0x1a2b3c4d5e6f7089,
        0x9f8e7d6c5b4a3210,
        0x2468ace013579bdf,
        0xfdb97531eca86420,
        0x123456789abcdef0,
    ];
}

/// A deterministic 64-bit identity for a type or member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Hash of a fully qualified type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a method from owner, name and parameter types.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str, params: &[TypeHash]) -> Self {
        let seed = hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0);
        TypeHash(mix_params(seed, params))
    }

    /// Hash of a constructor from owner and parameter types.
    #[inline]
    pub fn from_constructor(owner: TypeHash, params: &[TypeHash]) -> Self {
        TypeHash(mix_params(hash_constants::CONSTRUCTOR ^ owner.0, params))
    }

    /// Hash of a field from owner and name.
    #[inline]
    pub fn from_field(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::FIELD ^ owner.0.rotate_left(7) ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a property from owner and name.
    #[inline]
    pub fn from_property(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::PROPERTY ^ owner.0.rotate_left(13) ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of an event from owner and name.
    #[inline]
    pub fn from_event(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::EVENT ^ owner.0.rotate_left(19) ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is the empty hash.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

fn mix_params(seed: u64, params: &[TypeHash]) -> u64 {
    let mut hash = seed;
    for (i, param) in params.iter().enumerate() {
        let marker = hash_constants::PARAM_MARKERS
            .get(i)
            .copied()
            .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
        // wrapping_mul keeps parameter order significant
        hash = hash
            .wrapping_mul(hash_constants::SEP)
            .wrapping_add(marker ^ param.0);
    }
    hash
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash(0x{:016x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_deterministic() {
        assert_eq!(TypeHash::from_name("int"), TypeHash::from_name("int"));
        assert_ne!(TypeHash::from_name("int"), TypeHash::from_name("long"));
    }

    #[test]
    fn parameter_order_matters() {
        let owner = TypeHash::from_name("Demo.Widget");
        let int = TypeHash::from_name("int");
        let text = TypeHash::from_name("string");
        assert_ne!(
            TypeHash::from_method(owner, "Set", &[int, text]),
            TypeHash::from_method(owner, "Set", &[text, int])
        );
    }

    #[test]
    fn member_kinds_do_not_collide() {
        let owner = TypeHash::from_name("Demo.Widget");
        let field = TypeHash::from_field(owner, "Count");
        let property = TypeHash::from_property(owner, "Count");
        let event = TypeHash::from_event(owner, "Count");
        let method = TypeHash::from_method(owner, "Count", &[]);
        assert_ne!(field, property);
        assert_ne!(property, event);
        assert_ne!(field, method);
    }

    #[test]
    fn constructors_differ_by_signature() {
        let owner = TypeHash::from_name("System.Exception");
        let text = TypeHash::from_name("string");
        assert_ne!(
            TypeHash::from_constructor(owner, &[]),
            TypeHash::from_constructor(owner, &[text])
        );
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("int").is_empty());
    }
}
