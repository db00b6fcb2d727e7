use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrowthError {
    #[error("allocator refused to grow the buffer: {0}")]
    Reserve(#[from] TryReserveError),
    #[error("buffer capped at {0} elements")]
    Capped(usize),
}

/// Growable integer buffer owned by exactly one worker.
///
/// Storage is never cleared in place: [`ChurnBuffer::abandon`] drops the old
/// allocation and hands back a buffer with none, so every cycle reallocates
/// from scratch.
#[derive(Debug, Default)]
pub struct ChurnBuffer {
    data: Vec<u64>,
    cap: Option<usize>,
}

impl ChurnBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            cap: None,
        }
    }

    /// A buffer that fails to grow past `cap` elements, as if memory ran out there.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap: Some(cap),
        }
    }

    /// Appends `0..target` one element at a time.
    ///
    /// Growth goes through `try_reserve`, so running out of memory surfaces as
    /// an error with the buffer holding whatever was appended so far.
    pub fn fill(&mut self, target: usize) -> Result<(), GrowthError> {
        for value in 0..target as u64 {
            if self.cap == Some(self.data.len()) {
                return Err(GrowthError::Capped(self.data.len()));
            }
            if self.data.len() == self.data.capacity() {
                self.data.try_reserve(1)?;
            }
            self.data.push(value);
        }
        std::hint::black_box(&self.data);
        Ok(())
    }

    /// Drops the storage. The returned buffer keeps the cap, not the allocation.
    pub fn abandon(self) -> Self {
        let cap = self.cap;
        drop(self);
        Self {
            data: Vec::new(),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.data
    }
}
