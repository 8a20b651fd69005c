//! Type-safe SAI object ID wrappers.
//!
//! Group, member and next-hop ids share one raw representation in SAI. The
//! typed wrappers keep a member id from being handed to a group call. Group
//! ids of single-member groups alias a next-hop id, so those travel as
//! [`RawSaiObjectId`].

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw SAI object ID type (matches sai_object_id_t in C).
pub type RawSaiObjectId = u64;

/// SAI_NULL_OBJECT_ID.
pub const SAI_NULL_OBJECT_ID: RawSaiObjectId = 0;

/// Marker trait for SAI object kinds.
///
/// Each SAI object type implements this trait to enable compile-time
/// type checking of object IDs.
pub trait SaiObjectKind: Send + Sync + 'static {
    /// Returns the SAI object type name for debugging.
    fn type_name() -> &'static str;
}

/// A type-safe SAI object ID.
///
/// This wrapper ensures that object IDs of different types cannot be
/// accidentally mixed. The phantom type parameter `T` indicates what
/// kind of SAI object this ID refers to.
///
/// # Examples
///
/// ```
/// use sonic_sai::{NextHopGroupOid, NextHopOid};
///
/// // Different OID types are incompatible at compile time
/// let group: NextHopGroupOid = NextHopGroupOid::from_raw(0x5000000000001).unwrap();
/// let nhop: NextHopOid = NextHopOid::from_raw(0x4000000000001).unwrap();
///
/// // This would fail to compile:
/// // fn takes_group(g: NextHopGroupOid) {}
/// // takes_group(nhop);  // Error: expected NextHopGroupOid, found NextHopOid
/// ```
#[derive(Clone, Copy)]
pub struct SaiObjectId<T: SaiObjectKind> {
    raw: RawSaiObjectId,
    _marker: PhantomData<T>,
}

impl<T: SaiObjectKind> SaiObjectId<T> {
    /// The null object ID (SAI_NULL_OBJECT_ID).
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Creates a new object ID from a raw value.
    ///
    /// Returns `None` if the raw value is 0 (null object ID).
    /// Use `NULL` constant for explicitly null IDs.
    pub fn from_raw(raw: RawSaiObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    /// Creates a new object ID from a raw value, including null.
    ///
    /// Unlike `from_raw`, this allows creating null object IDs.
    pub const fn from_raw_unchecked(raw: RawSaiObjectId) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw object ID value.
    pub const fn as_raw(&self) -> RawSaiObjectId {
        self.raw
    }

    /// Returns true if this is a null object ID.
    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// Returns true if this is a valid (non-null) object ID.
    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }
}

impl<T: SaiObjectKind> fmt::Debug for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", T::type_name(), self.raw)
    }
}

impl<T: SaiObjectKind> fmt::Display for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.raw)
    }
}

impl<T: SaiObjectKind> PartialEq for SaiObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: SaiObjectKind> Eq for SaiObjectId<T> {}

impl<T: SaiObjectKind> Hash for SaiObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: SaiObjectKind> Default for SaiObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

// ============================================================================
// Object Kind Markers
// ============================================================================

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $oid_alias:ident) => {
        /// Marker type for SAI $type_name objects.
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl SaiObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        /// Type alias for $type_name object IDs.
        pub type $oid_alias = SaiObjectId<$name>;
    };
}

// Object kinds touched by next-hop-group programming
define_object_kind!(SwitchKind, "Switch", SwitchOid);
define_object_kind!(NextHopKind, "NextHop", NextHopOid);
define_object_kind!(NextHopGroupKind, "NextHopGroup", NextHopGroupOid);
define_object_kind!(NextHopGroupMemberKind, "NextHopGroupMember", NextHopGroupMemberOid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_creation() {
        let group = NextHopGroupOid::from_raw(0x5000000000001).unwrap();
        assert_eq!(group.as_raw(), 0x5000000000001);
        assert!(group.is_valid());
        assert!(!group.is_null());
    }

    #[test]
    fn test_null_oid() {
        assert!(NextHopGroupMemberOid::from_raw(SAI_NULL_OBJECT_ID).is_none());
        assert!(NextHopGroupMemberOid::NULL.is_null());
        assert!(NextHopGroupMemberOid::default().is_null());
    }

    #[test]
    fn test_oid_debug() {
        let nh = NextHopOid::from_raw(0x4000000000001).unwrap();
        let debug = format!("{:?}", nh);
        assert!(debug.contains("NextHop"));
        assert!(debug.contains("0x0004000000000001"));
    }

    #[test]
    fn test_oid_equality() {
        let a = NextHopGroupOid::from_raw_unchecked(0x10);
        let b = NextHopGroupOid::from_raw(0x10).unwrap();
        let c = NextHopGroupOid::from_raw(0x11).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
