//! Retention of the most recently decoded frame.
use std::sync::Arc;

use tracing::trace;

use crate::frame::DecodedFrame;

/// Holds at most one decoded frame.
#[derive(Debug, Default)]
pub struct FrameCache {
    entry: Option<(u32, Arc<DecodedFrame>)>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached frame, if it is the one at `index`.
    pub fn get(&self, index: u32) -> Option<&Arc<DecodedFrame>> {
        match &self.entry {
            Some((i, frame)) if *i == index => Some(frame),
            _ => None,
        }
    }

    /// The index of the cached frame.
    pub fn cached_index(&self) -> Option<u32> {
        self.entry.as_ref().map(|(i, _)| *i)
    }

    /// Obtain the frame at `index`, decoding it with `decode` on a miss.
    ///
    /// A miss drops the previous frame before decoding,
    /// so a failed decode leaves the cache empty.
    pub fn get_or_try_insert_with<F, E>(
        &mut self,
        index: u32,
        decode: F,
    ) -> Result<Arc<DecodedFrame>, E>
    where
        F: FnOnce() -> Result<DecodedFrame, E>,
    {
        if let Some(frame) = self.get(index) {
            trace!("Frame #{} served from cache", index);
            return Ok(Arc::clone(frame));
        }
        self.entry = None;
        trace!("Frame #{} not cached, decoding", index);
        let frame = Arc::new(decode()?);
        self.entry = Some((index, Arc::clone(&frame)));
        Ok(frame)
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
