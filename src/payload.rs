//! Chunk emitter.
use bytes::Bytes;

/// Payload written on every tick of the default stream.
pub static PAYLOAD: &[u8] = b"hello world\n";

/// One body write.
///
/// The data references the payload memory directly, emitting a chunk never copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    last: bool,
}

impl Chunk {
    /// Returns the chunk data.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the chunk length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the chunk has no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if no more chunk follows in this body.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Consumes self into the chunk data.
    #[inline]
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// Build the chunk for one tick.
#[inline]
pub fn emit(payload: &'static [u8], last: bool) -> Chunk {
    Chunk { data: Bytes::from_static(payload), last }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_references_payload() {
        let chunk = emit(PAYLOAD, false);
        assert_eq!(chunk.data().as_ptr(), PAYLOAD.as_ptr());
        assert_eq!(chunk.len(), 12);
        assert!(!chunk.is_last());

        let chunk = emit(PAYLOAD, true);
        assert!(chunk.is_last());
        assert_eq!(&chunk.into_data()[..], b"hello world\n");
    }
}
