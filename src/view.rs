//! Provides the immutable byte payload handed out by cache groups.
//!
//! A [ByteView] wraps the bytes of a cached value. Once constructed, its contents never
//! change: the cache can hand the same view to any number of callers without one of them
//! being able to corrupt the data seen by the others. Reads which could alias external
//! storage ([ByteView::byte_slice]) therefore return a fresh copy.
//!
//! Views are cheap to clone (the underlying buffer is shared, not copied), which is what
//! permits the cache to keep a value and return it to a caller at the same time.
//!
//! # Examples
//! ```
//! # use callisto::view::ByteView;
//! let view = ByteView::from("630");
//!
//! assert_eq!(view.len(), 3);
//! assert_eq!(view.byte_slice(), b"630".to_vec());
//! assert_eq!(view.to_string(), "630");
//!
//! // Mutating the returned copy has no effect on the view itself...
//! let mut copy = view.byte_slice();
//! copy[0] = b'X';
//! assert_eq!(view.byte_slice(), b"630".to_vec());
//! ```
use bytes::Bytes;

use crate::lru::ByteSize;

/// Wraps an immutable sequence of bytes.
///
/// This is the value type stored in and returned by a
/// [CacheGroup](crate::group::CacheGroup).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if this view contains no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the underlying bytes.
    ///
    /// The returned vector is owned by the caller and can be modified freely without
    /// affecting the view (or other callers holding the same view).
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Grants read access to the underlying bytes without copying them.
    ///
    /// As the buffer itself is immutable, handing out a reference is safe. Use
    /// [byte_slice](ByteView::byte_slice) when an owned (and therefore mutable) copy
    /// is required.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<Bytes> for ByteView {
    fn from(data: Bytes) -> Self {
        ByteView { data }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data.as_bytes()),
        }
    }
}

impl std::fmt::Display for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.data.as_ref()))
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}
