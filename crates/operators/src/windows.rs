//! Sliding-window filters over the trailing `window` elements.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::rc::Rc;

use contracts::{PipeError, PipeResult, Value};
use order_stats::{Handle, SlidingExtremum, Treap};
use pipe_core::Pipe;
use ringbuf::{traits::*, HeapRb};

use crate::node::{middle, Emitter, Operator};

/// Shared strict-weak ordering on values
pub type Less = Rc<dyn Fn(&Value, &Value) -> bool>;

type BoxedLess = Box<dyn Fn(&Value, &Value) -> bool>;

/// Natural [`Value`] order
pub fn natural_order() -> Less {
    Rc::new(|a: &Value, b: &Value| a < b)
}

fn boxed(lt: &Less) -> BoxedLess {
    let lt = Rc::clone(lt);
    Box::new(move |a: &Value, b: &Value| lt(a, b))
}

fn window_len(window: i64) -> PipeResult<NonZeroUsize> {
    usize::try_from(window)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            PipeError::invalid_param("window", window, "window length must be positive")
        })
}

// ===== Mean =====

/// Initial ring capacity; the ring doubles up to the window length
const RING_START: usize = 64;

struct WindowMean {
    ring: HeapRb<f64>,
    window: usize,
    sum: f64,
}

impl WindowMean {
    fn grow(&mut self) {
        let cap = self.ring.capacity().get().saturating_mul(2).min(self.window);
        let mut next = HeapRb::new(cap);
        next.push_iter(self.ring.pop_iter());
        self.ring = next;
    }
}

impl Operator for WindowMean {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let x = value.expect_f64("window_mean")?;
        if self.ring.is_full() {
            if self.ring.capacity().get() < self.window {
                self.grow();
            } else if let Some(oldest) = self.ring.try_pop() {
                self.sum -= oldest;
            }
        }
        let _ = self.ring.try_push(x);
        self.sum += x;
        out.emit(Value::Float(self.sum / self.ring.occupied_len() as f64))
    }
}

/// Simple moving average; shorter windows while the first ones fill
pub fn window_mean(window: i64) -> PipeResult<Pipe> {
    let len = window_len(window)?.get();
    Ok(middle("window_mean", move || WindowMean {
        ring: HeapRb::new(len.min(RING_START)),
        window: len,
        sum: 0.0,
    }))
}

// ===== Min / max =====

struct WindowExtremum {
    tracker: SlidingExtremum<Value, BoxedLess>,
}

impl Operator for WindowExtremum {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let best = self.tracker.push(value).clone();
        out.emit(best)
    }
}

fn extremum(label: &str, window: i64, lt: Less) -> PipeResult<Pipe> {
    let len = window_len(window)?;
    Ok(middle(label, move || WindowExtremum {
        tracker: SlidingExtremum::with_window(len, boxed(&lt)),
    }))
}

/// Minimum of each trailing window under `lt`
pub fn window_min_by(window: i64, lt: Less) -> PipeResult<Pipe> {
    extremum("window_min", window, lt)
}

/// Maximum of each trailing window under `lt`
pub fn window_max_by(window: i64, lt: Less) -> PipeResult<Pipe> {
    let inverted: Less = Rc::new(move |a: &Value, b: &Value| !lt(a, b));
    extremum("window_max", window, inverted)
}

pub fn window_min(window: i64) -> PipeResult<Pipe> {
    window_min_by(window, natural_order())
}

pub fn window_max(window: i64) -> PipeResult<Pipe> {
    window_max_by(window, natural_order())
}

// ===== Quantile =====

struct WindowQuantile {
    tree: Treap<Value, BoxedLess>,
    handles: VecDeque<Handle>,
    window: usize,
    quantile: f64,
    rank: usize,
}

impl Operator for WindowQuantile {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.handles.len() == self.window {
            if let Some(oldest) = self.handles.pop_front() {
                self.tree.erase(oldest);
            }
            self.handles.push_back(self.tree.insert(value));
        } else {
            self.handles.push_back(self.tree.insert(value));
            self.rank = (self.quantile * self.handles.len() as f64) as usize;
        }
        let k = self.rank.min(self.tree.size() - 1);
        out.emit(self.tree.kth(k).clone())
    }
}

/// The `quantile` of each trailing window under `lt`
///
/// The rank is `floor(quantile * len)`, fixed once the window is full and
/// clamped to the largest element. `seed` makes treap priorities
/// reproducible.
///
/// # Errors
/// `InvalidParam` for a non-positive window or a quantile outside `[0, 1]`.
pub fn window_quantile_by(
    window: i64,
    quantile: f64,
    lt: Less,
    seed: Option<u64>,
) -> PipeResult<Pipe> {
    let len = window_len(window)?.get();
    if !(0.0..=1.0).contains(&quantile) {
        return Err(PipeError::invalid_param(
            "quantile",
            quantile,
            "quantile fraction must be within [0, 1]",
        ));
    }
    Ok(middle("window_quantile", move || {
        let tree = match seed {
            Some(s) => Treap::with_seed(boxed(&lt), s),
            None => Treap::new(boxed(&lt)),
        };
        WindowQuantile {
            tree,
            handles: VecDeque::with_capacity(len.min(RING_START)),
            window: len,
            quantile,
            rank: 0,
        }
    }))
}

pub fn window_quantile(window: i64, quantile: f64, seed: Option<u64>) -> PipeResult<Pipe> {
    window_quantile_by(window, quantile, natural_order(), seed)
}
