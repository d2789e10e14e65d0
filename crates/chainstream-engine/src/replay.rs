//! Range replayer: a fixed historical window of blocks, fetched one height
//! at a time in the requested direction.

use chainstream_core::{Block, BlockId, StreamError};

use crate::fetcher::BlockFetcher;

/// Resolves replay windows and hands out [`Replay`] cursors over them.
#[derive(Clone)]
pub struct RangeReplayer {
    fetcher: BlockFetcher,
}

impl RangeReplayer {
    pub fn new(fetcher: BlockFetcher) -> Self {
        Self { fetcher }
    }

    /// Resolve `start` and `end` once and return a cursor over the window.
    ///
    /// Tags are resolved here and never again. The window is the inclusive
    /// span between the two heights; `ascending` only picks the emission
    /// order, so `(2, 0, false)` and `(0, 2, false)` both yield 2, 1, 0.
    pub async fn replay(
        &self,
        start: BlockId,
        end: BlockId,
        ascending: bool,
        full: bool,
    ) -> Result<Replay, StreamError> {
        let a = self.fetcher.resolve(start).await?;
        let b = self.fetcher.resolve(end).await?;
        Replay::new(self.fetcher.clone(), a.min(b), a.max(b), ascending, full)
    }
}

/// Pull-based cursor over a resolved window.
///
/// Each [`next`](Self::next) fetches exactly one height. An error ends the
/// window: callers stop at the first `Err`.
pub struct Replay {
    fetcher: BlockFetcher,
    start: u64,
    end: u64,
    ascending: bool,
    full: bool,
    next: Option<u64>,
}

impl Replay {
    pub fn new(
        fetcher: BlockFetcher,
        start: u64,
        end: u64,
        ascending: bool,
        full: bool,
    ) -> Result<Self, StreamError> {
        if start > end {
            return Err(StreamError::InvalidRange { start, end });
        }
        Ok(Self {
            fetcher,
            start,
            end,
            ascending,
            full,
            next: Some(if ascending { start } else { end }),
        })
    }

    /// Inclusive bounds of the window.
    pub fn bounds(&self) -> (u64, u64) {
        (self.start, self.end)
    }

    /// Fetch the next block of the window, or `None` when it is exhausted.
    pub async fn next(&mut self) -> Option<Result<Block, StreamError>> {
        let height = self.next?;
        self.next = step(height, self.start, self.end, self.ascending);
        Some(self.fetcher.fetch(BlockId::Number(height), self.full).await)
    }
}

fn step(height: u64, start: u64, end: u64, ascending: bool) -> Option<u64> {
    if ascending {
        (height < end).then(|| height + 1)
    } else {
        (height > start).then(|| height - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heights(start: u64, end: u64, ascending: bool) -> Vec<u64> {
        let mut out = Vec::new();
        let mut next = Some(if ascending { start } else { end });
        while let Some(h) = next {
            out.push(h);
            next = step(h, start, end, ascending);
        }
        out
    }

    #[test]
    fn ascending_heights() {
        assert_eq!(heights(0, 2, true), vec![0, 1, 2]);
    }

    #[test]
    fn descending_heights() {
        assert_eq!(heights(0, 2, false), vec![2, 1, 0]);
    }

    #[test]
    fn single_block_window() {
        assert_eq!(heights(7, 7, true), vec![7]);
        assert_eq!(heights(7, 7, false), vec![7]);
    }

    #[test]
    fn window_touching_zero_and_max() {
        assert_eq!(heights(0, 0, false), vec![0]);
        assert_eq!(heights(u64::MAX - 1, u64::MAX, true), vec![u64::MAX - 1, u64::MAX]);
    }

    #[test]
    fn length_is_span_plus_one() {
        for (s, e) in [(0u64, 0u64), (3, 9), (100, 163)] {
            assert_eq!(heights(s, e, true).len() as u64, e - s + 1);
            assert_eq!(heights(s, e, false).len() as u64, e - s + 1);
        }
    }
}
