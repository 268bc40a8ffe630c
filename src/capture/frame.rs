use std::time::Duration;

use bytes::Bytes;

use crate::{Error, Result};

/// Captured JPEG photo.
///
/// Frames are never mutated after construction; the cache swaps whole
/// `Arc<Frame>` values, so a reader holding one keeps a consistent view.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded JPEG bytes, owned by this frame
    pub data: Bytes,

    pub meta: FrameMetadata,
}

/// Frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Time since the node booted
    pub captured_at: Duration,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Capture time in whole seconds since boot
    pub fn timestamp_secs(&self) -> u64 {
        self.meta.captured_at.as_secs()
    }
}

/// Copy `src` into a freshly allocated buffer sized exactly to it.
pub(crate) fn copy_owned(src: &[u8]) -> Result<Bytes> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())
        .map_err(|_| Error::OutOfMemory(src.len()))?;
    buf.extend_from_slice(src);
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_is_independent() {
        let src = vec![1u8, 2, 3, 4];
        let copy = copy_owned(&src).unwrap();
        assert_eq!(&copy[..], &src[..]);
        assert_ne!(copy.as_ptr(), src.as_ptr());
    }

    #[test]
    fn timestamp_truncates_to_seconds() {
        let frame = Frame {
            data: Bytes::from_static(b"\xff\xd8"),
            meta: FrameMetadata {
                sequence: 1,
                width: 160,
                height: 120,
                captured_at: Duration::from_millis(2750),
            },
        };
        assert_eq!(frame.timestamp_secs(), 2);
        assert_eq!(frame.len(), 2);
    }
}
