use crate::error::ConfigError;

/// Fixed-depth history of observations, oldest first.
///
/// Backed by one flat buffer of `depth * frame_len` floats. Pushing shifts
/// the buffer in place, so steady-state stepping does not allocate.
#[derive(Debug, Clone)]
pub struct FrameStack {
    depth: usize,
    frame_len: usize,
    buf: Vec<f32>,
    primed: bool,
}

impl FrameStack {
    pub fn new(depth: usize, frame_len: usize) -> Result<Self, ConfigError> {
        if depth == 0 {
            return Err(ConfigError::InvalidFrameStack);
        }
        Ok(Self {
            depth,
            frame_len,
            buf: vec![0.0; depth * frame_len],
            primed: false,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn stacked_len(&self) -> usize {
        self.depth * self.frame_len
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buf
    }

    /// Copy the stacked frames into `out`.
    pub fn write_into(&self, out: &mut [f32]) {
        out.copy_from_slice(&self.buf);
    }

    /// Fill every slot with `frame`. Used at episode start.
    pub fn reset(&mut self, frame: &[f32]) -> &[f32] {
        debug_assert_eq!(frame.len(), self.frame_len);
        for chunk in self.buf.chunks_exact_mut(self.frame_len.max(1)) {
            chunk.copy_from_slice(frame);
        }
        self.primed = true;
        &self.buf
    }

    /// Drop the oldest frame and append `frame`.
    pub fn push(&mut self, frame: &[f32]) -> &[f32] {
        if !self.primed {
            return self.reset(frame);
        }
        debug_assert_eq!(frame.len(), self.frame_len);
        let n = self.frame_len;
        self.buf.copy_within(n.., 0);
        let tail = self.buf.len() - n;
        self.buf[tail..].copy_from_slice(frame);
        &self.buf
    }
}
