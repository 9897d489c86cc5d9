//! Map Key Module
//!
//! Keys used by the near cache must be hashable and must be able to say
//! whether they are the reserved null marker. Looking up the null key is a
//! caller error, never a cache miss.

use std::hash::Hash;

/// A key that can be stored in a near cache.
pub trait MapKey: Eq + Hash + Clone + Send + Sync + 'static {
    /// Returns true if this key is the reserved null marker.
    fn is_null(&self) -> bool {
        false
    }
}

impl<T: MapKey> MapKey for Option<T> {
    fn is_null(&self) -> bool {
        match self {
            Some(inner) => inner.is_null(),
            None => true,
        }
    }
}

impl MapKey for String {}
impl MapKey for Vec<u8> {}
impl MapKey for u32 {}
impl MapKey for u64 {}
impl MapKey for i32 {}
impl MapKey for i64 {}
impl MapKey for usize {}
