//! Slot handles for arena-backed nodes.
//!
//! The [`Handle`] trait abstracts over the index types used to address
//! nodes in an [`Arena`](crate::Arena). It provides a sentinel value
//! (`NONE`) so links can be stored without `Option` overhead.

/// A copyable slot index with a sentinel "none" value.
///
/// Implemented for the unsigned integer types. Links between chain nodes
/// are stored as handles; `NONE` marks an absent neighbor.
///
/// # Example
///
/// ```
/// use linkmap::Handle;
///
/// let h: u32 = 42;
/// assert!(h.is_some());
/// assert!(u32::NONE.is_none());
/// ```
pub trait Handle: Copy + Eq + core::fmt::Debug {
    /// Sentinel value representing "no handle".
    ///
    /// For integer types this is `MAX`; an arena never hands it out.
    const NONE: Self;

    /// Creates a handle from a slot position.
    fn from_usize(val: usize) -> Self;

    /// Returns the slot position.
    fn as_usize(self) -> usize;

    /// Returns `true` if this is the sentinel value.
    #[inline]
    fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Returns `true` if this is NOT the sentinel value.
    #[inline]
    fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Converts the sentinel into `None`.
    #[inline]
    fn into_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }
}

macro_rules! impl_handle_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Handle for $ty {
                const NONE: Self = <$ty>::MAX;

                #[inline]
                fn from_usize(val: usize) -> Self {
                    val as Self
                }

                #[inline]
                fn as_usize(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_handle_for_unsigned!(u16, u32, u64, usize);
