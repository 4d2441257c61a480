//! Append-only script source accumulator.

use std::io::Read;

use crate::error::SessionError;

/// Growable byte string holding a session's script source.
///
/// Only supports appending whole chunks and reading the contents back. A
/// failed append leaves the buffer exactly as it was before the call.
#[derive(Debug, Default)]
pub struct ScriptBuffer {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl ScriptBuffer {
    /// Create an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Append `chunk` to the end of the buffer and return its length.
    ///
    /// # Errors
    /// Returns [`SessionError::Allocation`] if the buffer cannot grow to hold
    /// the chunk.
    pub fn append(&mut self, chunk: &[u8]) -> Result<usize, SessionError> {
        self.reserve(chunk.len())?;
        self.bytes.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    /// Copy exactly `len` bytes from `reader` onto the end of the buffer.
    ///
    /// If the reader fails or ends early, the bytes already copied by this
    /// call are discarded and the buffer is restored to its previous length.
    ///
    /// # Errors
    /// Returns [`SessionError::Allocation`] if the buffer cannot grow, or
    /// [`SessionError::CopyFault`] if the reader cannot supply `len` bytes.
    pub fn append_from<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        len: usize,
    ) -> Result<usize, SessionError> {
        self.reserve(len)?;

        let start = self.bytes.len();
        self.bytes.resize(start + len, 0);

        let mut copied = 0;
        while copied < len {
            match reader.read(&mut self.bytes[start + copied..]) {
                Ok(0) => {
                    self.bytes.truncate(start);
                    return Err(SessionError::CopyFault {
                        copied,
                        expected: len,
                        source: std::io::ErrorKind::UnexpectedEof.into(),
                    });
                }
                Ok(n) => copied += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.bytes.truncate(start);
                    return Err(SessionError::CopyFault {
                        copied,
                        expected: len,
                        source: e,
                    });
                }
            }
        }

        Ok(len)
    }

    /// The accumulated source, in write order.
    pub fn contents(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn reserve(&mut self, additional: usize) -> Result<(), SessionError> {
        let wanted = self.bytes.len().checked_add(additional).ok_or_else(|| {
            SessionError::Allocation(format!("source length overflows adding {additional} bytes"))
        })?;

        if let Some(limit) = self.limit
            && wanted > limit
        {
            return Err(SessionError::Allocation(format!(
                "source would grow to {wanted} bytes, limit is {limit}"
            )));
        }

        self.bytes
            .try_reserve(additional)
            .map_err(|e| SessionError::Allocation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Yields `good` bytes, then fails every subsequent read.
    struct FaultAfter {
        good: Vec<u8>,
        pos: usize,
    }

    impl Read for FaultAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.good.len() {
                return Err(io::Error::other("bad address"));
            }
            let n = buf.len().min(self.good.len() - self.pos);
            buf[..n].copy_from_slice(&self.good[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_append_concatenates_in_order() {
        let mut buf = ScriptBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.append(b"return ").unwrap(), 7);
        assert_eq!(buf.append(b"").unwrap(), 0);
        assert_eq!(buf.append(b"2+2").unwrap(), 3);
        assert_eq!(buf.contents(), b"return 2+2");
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_limit_rejects_whole_chunk() {
        let mut buf = ScriptBuffer::with_limit(Some(8));
        buf.append(b"return").unwrap();
        let err = buf.append(b" 123").unwrap_err();
        assert!(matches!(err, SessionError::Allocation(_)));
        assert_eq!(buf.contents(), b"return");
        buf.append(b" 1").unwrap();
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_append_from_reads_exact_length() {
        let mut buf = ScriptBuffer::new();
        let mut src = Cursor::new(b"return 1 -- trailing".to_vec());
        assert_eq!(buf.append_from(&mut src, 8).unwrap(), 8);
        assert_eq!(buf.contents(), b"return 1");
    }

    #[test]
    fn test_append_from_fault_rolls_back_prefix() {
        let mut buf = ScriptBuffer::new();
        buf.append(b"local x = 1\n").unwrap();

        let mut src = FaultAfter {
            good: b"return".to_vec(),
            pos: 0,
        };
        let err = buf.append_from(&mut src, 20).unwrap_err();
        match err {
            SessionError::CopyFault {
                copied, expected, ..
            } => {
                assert_eq!(copied, 6);
                assert_eq!(expected, 20);
            }
            other => panic!("expected CopyFault, got {other:?}"),
        }
        assert_eq!(buf.contents(), b"local x = 1\n");
    }

    #[test]
    fn test_append_from_short_source_is_fault() {
        let mut buf = ScriptBuffer::new();
        let mut src = Cursor::new(b"abc".to_vec());
        assert!(matches!(
            buf.append_from(&mut src, 10),
            Err(SessionError::CopyFault { copied: 3, .. })
        ));
        assert!(buf.is_empty());
    }
}
