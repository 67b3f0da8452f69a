/// Defines a trait for encoding graph topologies to bytes.
/// Implementors of this trait can convert themselves into the corpus payload format.
pub trait TopologyEncode {
    /// Encodes the implementing type to a vector of bytes.
    ///
    /// # Returns
    /// A vector of bytes representing the encoded topology.
    fn encode_topology(&self) -> Vec<u8>;
}

/// Defines a trait for decoding graph topologies from bytes.
/// This trait enables reconstruction of a graph from its corpus payload slice.
pub trait TopologyDecode: Sized {
    /// Creates an instance of the implementing type from a byte slice.
    ///
    /// # Parameters
    /// * `bytes` - The byte slice containing the encoded topology.
    ///
    /// # Returns
    /// `Some(Self)` if decoding was successful, `None` if the slice is truncated or malformed.
    fn from_bytes_topology(bytes: &[u8]) -> Option<Self>;
}

/// Defines a generic trait for fixed-width integers stored in little-endian order.
pub trait ByteEncodable: Sized {
    /// Converts the implementing type to a vector of bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Creates an instance of the implementing type from a byte slice.
    ///
    /// # Returns
    /// `Some(Self)` if the slice holds at least `byte_size()` bytes, `None` otherwise.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;

    /// Returns the number of bytes required to encode this type.
    fn byte_size() -> usize;
}

impl ByteEncodable for u8 {
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self]
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.first().copied()
    }

    fn byte_size() -> usize {
        1
    }
}

macro_rules! impl_le_bytes {
    ($($int:ty),*) => {$(
        impl ByteEncodable for $int {
            fn to_bytes(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }

            fn from_bytes(bytes: &[u8]) -> Option<Self> {
                let array = bytes.get(..std::mem::size_of::<$int>())?.try_into().ok()?;
                Some(<$int>::from_le_bytes(array))
            }

            fn byte_size() -> usize {
                std::mem::size_of::<$int>()
            }
        }
    )*};
}

impl_le_bytes!(u32, u64);

/// A forward-only reader over an encoded topology.
///
/// Every read checks the remaining length, so a truncated payload decodes to `None`
/// instead of panicking on a slice bound.
pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub(crate) fn read<T: ByteEncodable>(&mut self) -> Option<T> {
        let end = self.position.checked_add(T::byte_size())?;
        if end > self.bytes.len() {
            return None;
        }
        let value = T::from_bytes(&self.bytes[self.position..end])?;
        self.position = end;
        Some(value)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.position == self.bytes.len()
    }
}

#[cfg(test)]
mod test_graph_serialize {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(0x0102_0304u32.to_bytes(), vec![4, 3, 2, 1]);
        assert_eq!(u64::from_bytes(&[1, 0, 0, 0, 0, 0, 0, 0]), Some(1));
        assert_eq!(u32::from_bytes(&[1, 2, 3]), None);
        assert_eq!((u32::byte_size(), u64::byte_size()), (4, 8));
    }

    #[test]
    fn test_cursor_stops_on_truncation() {
        let mut bytes = 7u64.to_bytes();
        bytes.extend_from_slice(&[9, 9]);
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(cursor.read::<u64>(), Some(7));
        assert!(!cursor.is_exhausted());
        assert_eq!(cursor.read::<u32>(), None);
        assert_eq!(cursor.read::<u8>(), Some(9));
    }
}
