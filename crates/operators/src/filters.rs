//! Element-wise and stateful filter stages (category Middle).

use std::collections::VecDeque;
use std::rc::Rc;

use contracts::{CastSpec, CastType, PipeError, PipeResult, Selection, Value};
use pipe_core::Pipe;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::node::{middle, Emitter, Operator};

/// Shared element transformation
pub type MapFn = Rc<dyn Fn(Value) -> PipeResult<Value>>;

/// Shared element predicate
pub type Predicate = Rc<dyn Fn(&Value) -> PipeResult<bool>>;

/// Element condition: a predicate, or equality with a fixed value
#[derive(Clone)]
pub enum Cond {
    Equals(Value),
    When(Predicate),
}

impl Cond {
    /// Condition from a plain closure
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::When(Rc::new(move |v: &Value| -> PipeResult<bool> { Ok(f(v)) }))
    }

    pub fn matches(&self, value: &Value) -> PipeResult<bool> {
        match self {
            Self::Equals(expected) => Ok(expected == value),
            Self::When(pred) => pred(value),
        }
    }
}

impl From<Value> for Cond {
    fn from(value: Value) -> Self {
        Self::Equals(value)
    }
}

impl From<i64> for Cond {
    fn from(value: i64) -> Self {
        Self::Equals(Value::Int(value))
    }
}

impl From<i32> for Cond {
    fn from(value: i32) -> Self {
        Self::Equals(Value::from(value))
    }
}

impl From<&str> for Cond {
    fn from(value: &str) -> Self {
        Self::Equals(Value::from(value))
    }
}

// ===== Transform / suppress =====

struct Filt {
    trans: Option<MapFn>,
    pre: Option<Predicate>,
    post: Option<Predicate>,
}

impl Operator for Filt {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if let Some(pre) = &self.pre {
            if !pre(&value)? {
                return Ok(());
            }
        }
        let value = match &self.trans {
            Some(trans) => trans(value)?,
            None => value,
        };
        if let Some(post) = &self.post {
            if !post(&value)? {
                return Ok(());
            }
        }
        out.emit(value)
    }
}

/// Transform and/or suppress elements
///
/// `pre` is checked before `trans`, `post` after it. Errors from any of
/// them abort the run unchanged.
pub fn filt(trans: Option<MapFn>, pre: Option<Predicate>, post: Option<Predicate>) -> Pipe {
    middle("filt", move || Filt {
        trans: trans.clone(),
        pre: pre.clone(),
        post: post.clone(),
    })
}

pub fn map<F>(f: F) -> Pipe
where
    F: Fn(Value) -> Value + 'static,
{
    let trans: MapFn = Rc::new(move |v: Value| -> PipeResult<Value> { Ok(f(v)) });
    filt(Some(trans), None, None).named("map")
}

/// Fallible transform; an error aborts the run
pub fn try_map<F>(f: F) -> Pipe
where
    F: Fn(Value) -> PipeResult<Value> + 'static,
{
    let trans: MapFn = Rc::new(f);
    filt(Some(trans), None, None).named("try_map")
}

pub fn filter<F>(pred: F) -> Pipe
where
    F: Fn(&Value) -> bool + 'static,
{
    let pre: Predicate = Rc::new(move |v: &Value| -> PipeResult<bool> { Ok(pred(v)) });
    filt(None, Some(pre), None).named("filter")
}

pub fn relay() -> Pipe {
    filt(None, None, None).named("relay")
}

/// Pass each element with probability `prob`
///
/// # Errors
/// `InvalidParam` unless `0 <= prob <= 1`.
pub fn prob_sample(prob: f64, seed: Option<u64>) -> PipeResult<Pipe> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(PipeError::invalid_param(
            "prob",
            prob,
            "probability must be within [0, 1]",
        ));
    }
    Ok(middle("prob_sample", move || ProbSample {
        prob,
        rng: match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        },
    }))
}

struct ProbSample {
    prob: f64,
    rng: StdRng,
}

impl Operator for ProbSample {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.rng.random::<f64>() < self.prob {
            out.emit(value)?;
        }
        Ok(())
    }
}

// ===== Positional =====

struct Enumerate {
    next: i64,
}

impl Operator for Enumerate {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let index = self.next;
        self.next += 1;
        out.emit(Value::pair(index, value))
    }
}

/// Pairs each element with a running index: `(i, e)`
pub fn enumerate(start: i64) -> Pipe {
    middle("enumerate", move || Enumerate { next: start })
}

struct SkipFirst {
    remaining: u64,
}

impl Operator for SkipFirst {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(());
        }
        out.emit(value)
    }
}

struct SkipLast {
    held: VecDeque<Value>,
    keep: usize,
}

impl Operator for SkipLast {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        self.held.push_back(value);
        if self.held.len() > self.keep {
            if let Some(front) = self.held.pop_front() {
                out.emit(front)?;
            }
        }
        Ok(())
    }
}

/// Skip the first `n` elements, or with a negative `n`, the last `|n|`
pub fn skip(n: i64) -> Pipe {
    if n >= 0 {
        let remaining = n.unsigned_abs();
        middle("skip", move || SkipFirst { remaining })
    } else {
        let keep = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
        middle("skip", move || SkipLast {
            held: VecDeque::new(),
            keep,
        })
    }
}

struct Slice {
    start: u64,
    stop: Option<u64>,
    step: u64,
    index: u64,
}

impl Operator for Slice {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.stop.is_some_and(|stop| self.index >= stop) {
            return out.finish();
        }
        let i = self.index;
        self.index += 1;
        if i >= self.start && (i - self.start) % self.step == 0 {
            out.emit(value)?;
        }
        if self.stop == Some(self.index) {
            out.finish()?;
        }
        Ok(())
    }
}

/// Elements at positions `start, start + step, ...` below `stop`
///
/// Finishes early once `stop` elements have passed.
///
/// # Errors
/// `InvalidParam` if no bound is given or `step` is zero.
pub fn slice(start: Option<u64>, stop: Option<u64>, step: Option<u64>) -> PipeResult<Pipe> {
    if start.is_none() && stop.is_none() && step.is_none() {
        return Err(PipeError::invalid_param(
            "slice",
            "unbounded",
            "at least one of start, stop, step is required",
        ));
    }
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(PipeError::invalid_param("step", step, "slice step must be positive"));
    }
    let start = start.unwrap_or(0);
    Ok(middle("slice", move || Slice {
        start,
        stop,
        step,
        index: 0,
    }))
}

struct Tail {
    held: VecDeque<Value>,
    n: usize,
}

impl Operator for Tail {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        if self.n == 0 {
            return Ok(());
        }
        if self.held.len() == self.n {
            self.held.pop_front();
        }
        self.held.push_back(value);
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        while let Some(value) = self.held.pop_front() {
            out.emit(value)?;
        }
        Ok(())
    }
}

/// The last `n` elements, emitted on close
pub fn tail(n: usize) -> Pipe {
    middle("tail", move || Tail {
        held: VecDeque::new(),
        n,
    })
}

struct Prepend {
    head: Option<Value>,
}

impl Operator for Prepend {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if let Some(head) = self.head.take() {
            out.emit(head)?;
        }
        out.emit(value)
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        match self.head.take() {
            Some(head) => out.emit(head),
            None => Ok(()),
        }
    }
}

/// Emit `value` before the first element, even for an empty stream
pub fn prepend(value: impl Into<Value>) -> Pipe {
    let value = value.into();
    middle("prepend", move || Prepend {
        head: Some(value.clone()),
    })
}

struct Append {
    last: Value,
}

impl Operator for Append {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        out.emit(value)
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        out.emit(self.last.clone())
    }
}

pub fn append(value: impl Into<Value>) -> Pipe {
    let last = value.into();
    middle("append", move || Append { last: last.clone() })
}

// ===== Running aggregates =====

#[derive(Default)]
struct CumSum {
    acc: Option<Value>,
}

impl Operator for CumSum {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let acc = match self.acc.take() {
            Some(acc) => acc.try_add(&value)?,
            None => value,
        };
        self.acc = Some(acc.clone());
        out.emit(acc)
    }
}

/// `y[i] = x[0] + ... + x[i]`
pub fn cum_sum() -> Pipe {
    middle("cum_sum", CumSum::default)
}

#[derive(Default)]
struct CumMean {
    mean: f64,
    n: u64,
}

impl Operator for CumMean {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let x = value.expect_f64("cum_mean")?;
        self.n += 1;
        self.mean += (x - self.mean) / self.n as f64;
        out.emit(Value::Float(self.mean))
    }
}

/// `y[i] = (x[0] + ... + x[i]) / (i + 1)`
pub fn cum_mean() -> Pipe {
    middle("cum_mean", CumMean::default)
}

struct ExpMean {
    alpha: f64,
    y: Option<f64>,
}

impl Operator for ExpMean {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let x = value.expect_f64("exp_mean")?;
        let y = match self.y {
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
            None => x,
        };
        self.y = Some(y);
        out.emit(Value::Float(y))
    }
}

/// `y[0] = x[0]`, `y[i] = alpha * x[i] + (1 - alpha) * y[i - 1]`
///
/// # Errors
/// `InvalidParam` unless `0 <= alpha <= 1`.
pub fn exp_mean(alpha: f64) -> PipeResult<Pipe> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(PipeError::invalid_param(
            "alpha",
            alpha,
            "responsiveness must be within [0, 1]",
        ));
    }
    Ok(middle("exp_mean", move || ExpMean { alpha, y: None }))
}

// ===== Conditional ranges =====

struct FromCond {
    cond: Cond,
    inclusive: bool,
    open: bool,
}

impl Operator for FromCond {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.open {
            return out.emit(value);
        }
        if self.cond.matches(&value)? {
            self.open = true;
            if self.inclusive {
                out.emit(value)?;
            }
        }
        Ok(())
    }
}

/// Elements starting from the first one matching `cond`
pub fn from_(cond: impl Into<Cond>, inclusive: bool) -> Pipe {
    let cond = cond.into();
    middle("from", move || FromCond {
        cond: cond.clone(),
        inclusive,
        open: false,
    })
}

struct ToCond {
    cond: Cond,
    inclusive: bool,
}

impl Operator for ToCond {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if !self.cond.matches(&value)? {
            return out.emit(value);
        }
        if self.inclusive {
            out.emit(value)?;
        }
        out.finish()
    }
}

/// Elements up to the first one matching `cond`; finishes early there
pub fn to(cond: impl Into<Cond>, inclusive: bool) -> Pipe {
    let cond = cond.into();
    middle("to", move || ToCond {
        cond: cond.clone(),
        inclusive,
    })
}

/// Boundaries of a [`from_to`] stage
#[derive(Clone)]
pub struct FromTo {
    pub from: Cond,
    pub to: Cond,
    pub from_inclusive: bool,
    pub to_inclusive: bool,
    /// Drop a trailing range that never met its `to` condition
    pub strict: bool,
}

impl FromTo {
    pub fn new(from: impl Into<Cond>, to: impl Into<Cond>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            from_inclusive: true,
            to_inclusive: true,
            strict: false,
        }
    }
}

struct FromToOp {
    spec: FromTo,
    inside: bool,
    pending: Vec<Value>,
}

impl FromToOp {
    fn pass(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.spec.strict {
            self.pending.push(value);
            Ok(())
        } else {
            out.emit(value)
        }
    }
}

impl Operator for FromToOp {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if !self.inside {
            if self.spec.from.matches(&value)? {
                self.inside = true;
                if self.spec.from_inclusive {
                    self.pass(value, out)?;
                }
            }
            return Ok(());
        }
        if !self.spec.to.matches(&value)? {
            return self.pass(value, out);
        }
        self.inside = false;
        if self.spec.to_inclusive {
            self.pass(value, out)?;
        }
        for held in std::mem::take(&mut self.pending) {
            out.emit(held)?;
        }
        Ok(())
    }
}

/// Every run of elements between a `from` match and the next `to` match
pub fn from_to(spec: FromTo) -> Pipe {
    middle("from_to", move || FromToOp {
        spec: spec.clone(),
        inside: false,
        pending: Vec::new(),
    })
}

// ===== Conversions =====

/// Convert one value; unconvertible input is a `TypeMismatch`
pub fn cast_value(value: Value, to: CastType) -> PipeResult<Value> {
    let fail = |v: &Value| PipeError::TypeMismatch {
        op: "cast".to_string(),
        left: v.type_name(),
        right: cast_name(to),
    };
    match to {
        CastType::Int => match &value {
            Value::Int(_) => Ok(value),
            Value::Float(x) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        CastType::Float => match &value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        CastType::Str => match value {
            Value::Str(_) => Ok(value),
            other => Ok(Value::Str(other.to_string())),
        },
        CastType::Bool => Ok(Value::Bool(value.is_truthy())),
    }
}

fn cast_name(to: CastType) -> &'static str {
    match to {
        CastType::Int => "int",
        CastType::Float => "float",
        CastType::Str => "str",
        CastType::Bool => "bool",
    }
}

struct Cast {
    spec: CastSpec,
}

impl Operator for Cast {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let cast = match &self.spec {
            CastSpec::One(to) => cast_value(value, *to)?,
            CastSpec::Fields(types) => {
                let Some(items) = value.as_slice() else {
                    return Err(PipeError::TypeMismatch {
                        op: "cast".to_string(),
                        left: value.type_name(),
                        right: "tuple",
                    });
                };
                let fields = items
                    .iter()
                    .zip(types)
                    .map(|(item, to)| cast_value(item.clone(), *to))
                    .collect::<PipeResult<Vec<_>>>()?;
                Value::Tuple(fields)
            }
        };
        out.emit(cast)
    }
}

/// Cast each element, or each field of a tuple element
pub fn cast(spec: CastSpec) -> Pipe {
    middle("cast", move || Cast { spec: spec.clone() })
}

struct SplitStr {
    delimiter: String,
}

impl Operator for SplitStr {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let Some(line) = value.as_str() else {
            return Err(PipeError::TypeMismatch {
                op: "split_str".to_string(),
                left: value.type_name(),
                right: "str",
            });
        };
        let fields = line
            .split(self.delimiter.as_str())
            .map(|f| Value::Str(f.to_string()))
            .collect();
        out.emit(Value::Tuple(fields))
    }
}

/// Split string elements into tuples of fields
pub fn split_str(delimiter: &str) -> Pipe {
    let delimiter = delimiter.to_string();
    middle("split_str", move || SplitStr {
        delimiter: delimiter.clone(),
    })
}

struct Grep {
    needle: String,
}

impl Operator for Grep {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let Some(line) = value.as_str() else {
            return Err(PipeError::TypeMismatch {
                op: "grep".to_string(),
                left: value.type_name(),
                right: "str",
            });
        };
        if line.contains(self.needle.as_str()) {
            out.emit(value)?;
        }
        Ok(())
    }
}

/// Keep string elements containing `needle`
pub fn grep(needle: &str) -> Pipe {
    let needle = needle.to_string();
    middle("grep", move || Grep {
        needle: needle.clone(),
    })
}

fn pick(value: &Value, index: i64) -> PipeResult<Value> {
    let Some(items) = value.as_slice() else {
        return Err(PipeError::TypeMismatch {
            op: "select_inds".to_string(),
            left: value.type_name(),
            right: "tuple",
        });
    };
    let len = items.len() as i64;
    let at = if index < 0 { len + index } else { index };
    usize::try_from(at)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| {
            PipeError::invalid_param(
                "inds",
                index,
                format!("index out of range for a {} of length {len}", value.type_name()),
            )
        })
}

struct SelectInds {
    inds: Selection,
}

impl Operator for SelectInds {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        let picked = match &self.inds {
            Selection::One(i) => pick(&value, *i)?,
            Selection::Many(inds) => Value::Tuple(
                inds.iter()
                    .map(|i| pick(&value, *i))
                    .collect::<PipeResult<Vec<_>>>()?,
            ),
        };
        out.emit(picked)
    }
}

/// Project indexable elements onto `inds`
///
/// A single index yields the field itself; a list of indices yields a
/// tuple, `()` for an empty list. Negative indices count from the end.
pub fn select_inds(inds: Selection) -> Pipe {
    middle("select_inds", move || SelectInds { inds: inds.clone() })
}

struct Trace {
    enumerate: bool,
    index: u64,
}

impl Operator for Trace {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.enumerate {
            info!(target: "dagpipe::trace", index = self.index, value = %value, "element");
        } else {
            info!(target: "dagpipe::trace", value = %value, "element");
        }
        self.index += 1;
        out.emit(value)
    }
}

/// Log every element passing through
pub fn trace(enumerate: bool) -> Pipe {
    middle("trace", move || Trace {
        enumerate,
        index: 0,
    })
}
