//! Overlapping windows over a long recording.

use crate::error::{FdmtError, Result};

/// Half-open sample range `start..end` of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Windows of `length` samples, consecutive ones sharing `overlap` samples so
/// a pulse straddling a boundary is seen whole by at least one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    length: usize,
    overlap: usize,
}

impl ChunkPlan {
    pub fn new(length: usize, overlap: usize) -> Result<Self> {
        if length == 0 {
            return Err(FdmtError::config("chunk length must be positive"));
        }
        if overlap >= length {
            return Err(FdmtError::config(format!(
                "overlap ({overlap}) must be shorter than the chunk length ({length})"
            )));
        }
        Ok(Self { length, overlap })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn stride(&self) -> usize {
        self.length - self.overlap
    }

    /// Windows covering `0..total`; the last one may be short, and none is
    /// emitted once a window has reached `total`.
    pub fn windows(&self, total: usize) -> impl Iterator<Item = Chunk> + '_ {
        let mut next = Some(0usize).filter(|_| total > 0);
        std::iter::from_fn(move || {
            let start = next?;
            let end = (start + self.length).min(total);
            next = if end < total {
                Some(start + self.stride())
            } else {
                None
            };
            Some(Chunk { start, end })
        })
    }
}
