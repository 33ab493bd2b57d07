//! Sliding-window extremum over a monotonic deque.
//!
//! Each entry holds a candidate `(value, expiry)`. The front is always the
//! current extremum; candidates behind it are strictly "better" than
//! everything pushed before them and expire later. The deque grows with
//! the candidates actually held, never with the nominal window.

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;

use contracts::{PipeError, PipeResult};

/// Minimum (or, with an inverted comparator, maximum) of the trailing
/// `window` elements in O(1) amortized time per push.
pub struct SlidingExtremum<T, F> {
    candidates: VecDeque<(T, u64)>,
    window: NonZeroUsize,
    position: u64,
    lt: F,
}

impl<T, F> fmt::Debug for SlidingExtremum<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingExtremum")
            .field("window", &self.window)
            .field("candidates", &self.candidates.len())
            .field("position", &self.position)
            .finish()
    }
}

impl<T, F> SlidingExtremum<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    /// Create a tracker for windows of `window` elements
    ///
    /// # Errors
    /// `InvalidParam` if `window` is zero.
    pub fn new(window: usize, lt: F) -> PipeResult<Self> {
        let window = NonZeroUsize::new(window).ok_or_else(|| {
            PipeError::invalid_param("window", window, "window length must be positive")
        })?;
        Ok(Self::with_window(window, lt))
    }

    /// Create a tracker for an already validated window length
    pub fn with_window(window: NonZeroUsize, lt: F) -> Self {
        Self {
            candidates: VecDeque::new(),
            window,
            position: 0,
            lt,
        }
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.window.get()
    }

    /// Number of candidates currently held
    #[inline]
    pub fn candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Feed the next element and return the extremum of the window ending at it
    pub fn push(&mut self, value: T) -> &T {
        let i = self.position;

        if self.candidates.front().is_some_and(|(_, expiry)| *expiry == i) {
            self.candidates.pop_front();
        }

        while let Some((candidate, _)) = self.candidates.back() {
            if (self.lt)(candidate, &value) {
                break;
            }
            self.candidates.pop_back();
        }

        let expiry = i.saturating_add(self.window.get() as u64);
        self.candidates.push_back((value, expiry));
        self.position += 1;

        match self.candidates.front() {
            Some((front, _)) => front,
            None => unreachable!("deque holds at least the value just pushed"),
        }
    }
}
