//! Buffered output streaming.
//!
//! Wraps a fragment iterator and optionally regroups its output into
//! larger chunks, so callers feeding a socket or a chunked response can
//! trade latency for fewer writes without touching the render itself.

use crate::error::{Result, WeftError};
use crate::vm::Fragment;

/// A fragment iterator with switchable buffering.
///
/// Unbuffered (the default) it is a transparent pass-through. Buffered,
/// it concatenates `size` non-empty fragments per item; empty fragments
/// are dropped, a final short chunk is flushed as-is, and no empty
/// trailing chunk is ever produced. Buffering can be reconfigured
/// mid-iteration; fragments already handed out are unaffected.
#[derive(Debug)]
pub struct TemplateStream<I> {
    upstream: I,
    /// Non-empty fragments per chunk; zero means pass-through.
    buffer_size: usize,
}

impl<I> TemplateStream<I>
where
    I: Iterator<Item = Result<Fragment>>,
{
    pub fn new(upstream: I) -> Self {
        Self {
            upstream,
            buffer_size: 0,
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer_size > 0
    }

    /// Groups output into chunks of `size` non-empty fragments.
    ///
    /// A size of zero or one defeats the point of buffering and is
    /// rejected without changing the current mode.
    pub fn enable_buffering(&mut self, size: usize) -> Result<()> {
        if size <= 1 {
            return Err(WeftError::Configuration(format!(
                "buffer size {size} is too small, need at least 2"
            )));
        }
        self.buffer_size = size;
        Ok(())
    }

    /// Returns to transparent pass-through.
    pub fn disable_buffering(&mut self) {
        self.buffer_size = 0;
    }
}

impl<I> Iterator for TemplateStream<I>
where
    I: Iterator<Item = Result<Fragment>>,
{
    type Item = Result<Fragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer_size == 0 {
            return self.upstream.next();
        }
        let mut chunk = String::new();
        let mut collected = 0;
        while collected < self.buffer_size {
            match self.upstream.next() {
                Some(Ok(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    chunk.push_str(&fragment);
                    collected += 1;
                }
                Some(Err(err)) => return Some(Err(err)),
                None => break,
            }
        }
        if collected == 0 {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}
