//! Terminal aggregations (category Sink).
//!
//! A sink emits at most one value, on close, then closes downstream.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use contracts::{PipeError, PipeResult, Value};
use pipe_core::Pipe;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::node::{sink, Emitter, Operator};
use crate::windows::{natural_order, Less};

#[derive(Default)]
struct Sum {
    acc: Option<Value>,
}

impl Operator for Sum {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        self.acc = Some(match self.acc.take() {
            Some(acc) => acc.try_add(&value)?,
            None => value,
        });
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        match self.acc.take() {
            Some(total) => out.emit(total),
            None => Ok(()),
        }
    }
}

/// Sum of all elements; nothing for an empty stream
pub fn sum() -> Pipe {
    sink("sum", Sum::default)
}

#[derive(Default)]
struct Count {
    n: i64,
}

impl Operator for Count {
    fn on_value(&mut self, _value: Value, _out: &mut Emitter) -> PipeResult<()> {
        self.n += 1;
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        out.emit(Value::Int(self.n))
    }
}

/// Number of elements; `0` for an empty stream
pub fn count() -> Pipe {
    sink("count", Count::default)
}

struct NthFromStart {
    remaining: u64,
}

impl Operator for NthFromStart {
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(());
        }
        out.emit(value)?;
        out.finish()
    }
}

struct NthFromEnd {
    held: VecDeque<Value>,
    back: usize,
}

impl Operator for NthFromEnd {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        if self.held.len() == self.back {
            self.held.pop_front();
        }
        self.held.push_back(value);
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        if self.held.len() == self.back {
            if let Some(value) = self.held.pop_front() {
                out.emit(value)?;
            }
        }
        Ok(())
    }
}

/// The `n`-th element (0-indexed), or with a negative `n`, the `|n|`-th
/// from the end
///
/// A non-negative `n` finishes the run as soon as the element arrives.
pub fn nth(n: i64) -> Pipe {
    if n >= 0 {
        let remaining = n.unsigned_abs();
        sink("nth", move || NthFromStart { remaining })
    } else {
        let back = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
        sink("nth", move || NthFromEnd {
            held: VecDeque::new(),
            back,
        })
    }
}

#[derive(Default)]
struct ToList {
    items: Vec<Value>,
}

impl Operator for ToList {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        self.items.push(value);
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        out.emit(Value::List(std::mem::take(&mut self.items)))
    }
}

/// All elements as a list; `[]` for an empty stream
pub fn to_list() -> Pipe {
    sink("to_list", ToList::default)
}

#[derive(Default)]
struct ToDict {
    entries: BTreeMap<Value, Value>,
}

impl Operator for ToDict {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        match value.as_slice() {
            Some([key, data, ..]) => {
                self.entries.insert(key.clone(), data.clone());
                Ok(())
            }
            _ => Err(PipeError::TypeMismatch {
                op: "to_dict".to_string(),
                left: value.type_name(),
                right: "pair",
            }),
        }
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        let pairs = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(k, v)| Value::pair(k, v))
            .collect();
        out.emit(Value::List(pairs))
    }
}

/// `(key, data, ..)` elements collected into a mapping
///
/// Emitted as a key-ordered list of `(key, data)` pairs; a later element
/// replaces an earlier one with an equal key.
pub fn to_dict() -> Pipe {
    sink("to_dict", ToDict::default)
}

struct SizeRandSample {
    sample: Vec<Value>,
    size: usize,
    seen: u64,
    rng: StdRng,
}

impl Operator for SizeRandSample {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        if self.seen == 0 {
            self.sample.try_reserve_exact(self.size).map_err(|_| {
                PipeError::invalid_param("size", self.size, "sample does not fit in memory")
            })?;
            self.sample.resize(self.size, value);
        } else {
            let seen = self.seen;
            for slot in &mut self.sample {
                if self.rng.random_range(0..=seen) == 0 {
                    *slot = value.clone();
                }
            }
        }
        self.seen += 1;
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        if self.seen == 0 {
            return Ok(());
        }
        out.emit(Value::List(std::mem::take(&mut self.sample)))
    }
}

/// A uniform sample of `size` elements drawn with replacement
///
/// Every slot is an independent reservoir of one. Nothing for an empty
/// stream.
///
/// # Errors
/// `InvalidParam` if `size` is zero.
pub fn size_rand_sample(size: usize, seed: Option<u64>) -> PipeResult<Pipe> {
    if size == 0 {
        return Err(PipeError::invalid_param(
            "size",
            size,
            "sample size must be positive",
        ));
    }
    Ok(sink("size_rand_sample", move || SizeRandSample {
        sample: Vec::new(),
        size,
        seen: 0,
        rng: match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        },
    }))
}

/// Running moments for mean and standard deviation
#[derive(Default)]
struct Moments {
    n: u64,
    sum: f64,
    sum_sq: f64,
    ddof: Option<u64>,
}

impl Operator for Moments {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        let x = value.expect_f64(if self.ddof.is_some() { "stddev" } else { "mean" })?;
        self.n += 1;
        self.sum += x;
        self.sum_sq += x * x;
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        let n = self.n as f64;
        match self.ddof {
            None if self.n > 0 => out.emit(Value::Float(self.sum / n)),
            Some(ddof) if self.n > ddof => {
                let var = (self.sum_sq - self.sum * self.sum / n) / (self.n - ddof) as f64;
                out.emit(Value::Float(var.max(0.0).sqrt()))
            }
            _ => Ok(()),
        }
    }
}

/// Arithmetic mean; nothing for an empty stream
pub fn mean() -> Pipe {
    sink("mean", Moments::default)
}

/// Standard deviation with `ddof` degrees of freedom removed
///
/// Emits nothing unless more than `ddof` elements arrived.
pub fn stddev(ddof: u64) -> Pipe {
    sink("stddev", move || Moments {
        ddof: Some(ddof),
        ..Moments::default()
    })
}

struct Best {
    best: Option<Value>,
    lt: Less,
}

impl Operator for Best {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        let replace = match &self.best {
            Some(best) => (self.lt)(&value, best),
            None => true,
        };
        if replace {
            self.best = Some(value);
        }
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        match self.best.take() {
            Some(best) => out.emit(best),
            None => Ok(()),
        }
    }
}

/// Smallest element under `lt`; the first of equals wins
pub fn min_by(lt: Less) -> Pipe {
    sink("min", move || Best {
        best: None,
        lt: Rc::clone(&lt),
    })
}

/// Largest element under `lt`; the first of equals wins
pub fn max_by(lt: Less) -> Pipe {
    let greater: Less = Rc::new(move |a: &Value, b: &Value| lt(b, a));
    min_by(greater).named("max")
}

pub fn min() -> Pipe {
    min_by(natural_order())
}

pub fn max() -> Pipe {
    max_by(natural_order())
}

struct Constant {
    value: Value,
}

impl Operator for Constant {
    fn on_value(&mut self, _value: Value, _out: &mut Emitter) -> PipeResult<()> {
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        out.emit(self.value.clone())
    }
}

/// Ignores the stream and yields `value`
pub fn constant(value: impl Into<Value>) -> Pipe {
    let value = value.into();
    sink("constant", move || Constant {
        value: value.clone(),
    })
}

struct LastWith {
    last: Option<Value>,
    f: Rc<dyn Fn(Value) -> PipeResult<Value>>,
}

impl Operator for LastWith {
    fn on_value(&mut self, value: Value, _out: &mut Emitter) -> PipeResult<()> {
        self.last = Some(value);
        Ok(())
    }

    fn on_close(&mut self, out: &mut Emitter) -> PipeResult<()> {
        match self.last.take() {
            Some(last) => out.emit((self.f)(last)?),
            None => Ok(()),
        }
    }
}

/// `f` applied to the last element; nothing for an empty stream
pub fn last_with<F>(f: F) -> Pipe
where
    F: Fn(Value) -> PipeResult<Value> + 'static,
{
    let f: Rc<dyn Fn(Value) -> PipeResult<Value>> = Rc::new(f);
    sink("last_with", move || LastWith {
        last: None,
        f: Rc::clone(&f),
    })
}

pub fn last() -> Pipe {
    last_with(Ok).named("last")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{source, split};

    #[test]
    fn test_sum_and_count() {
        assert_eq!(source([1, 2, 3, 4]).run(sum()).unwrap(), Value::Int(10));
        assert_eq!(
            source(["1", "2", "3", "4"]).run(sum()).unwrap(),
            Value::from("1234")
        );
        assert_eq!(source([1, 2, 3, 4]).run(count()).unwrap(), Value::Int(4));
        assert_eq!(source(Vec::<i64>::new()).run(count()).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_empty_sum_is_no_result() {
        let err = source(Vec::<i64>::new()).run(sum()).unwrap_err();
        assert!(err.is_no_result(), "got: {err}");
    }

    #[test]
    fn test_sum_type_mismatch() {
        let err = source(vec![Value::Int(1), Value::from("a")])
            .run(sum())
            .unwrap_err();
        assert!(matches!(err, PipeError::TypeMismatch { .. }), "got: {err}");
    }

    #[test]
    fn test_nth() {
        assert_eq!(source([1, 2, 3, 4]).run(nth(0)).unwrap(), Value::Int(1));
        assert_eq!(source([1, 2, 3, 4]).run(nth(-1)).unwrap(), Value::Int(4));
        assert_eq!(source([1, 2, 3, 4]).run(nth(-4)).unwrap(), Value::Int(1));
        assert!(source([1, 2]).run(nth(5)).unwrap_err().is_no_result());
        assert!(source([1, 2]).run(nth(-3)).unwrap_err().is_no_result());
    }

    #[test]
    fn test_nth_from_end_with_huge_count() {
        let err = source([1, 2, 3]).run(nth(i64::MIN)).unwrap_err();
        assert!(err.is_no_result(), "got: {err}");
        let err = source([1, 2, 3]).run(nth(-(1 << 62))).unwrap_err();
        assert!(err.is_no_result(), "got: {err}");
    }

    #[test]
    fn test_nth_stops_infinite_source() {
        let naturals = crate::source_iter(|| (0i64..).map(Value::Int));
        assert_eq!(naturals.run(nth(1000)).unwrap(), Value::Int(1000));
    }

    #[test]
    fn test_mean_and_stddev() {
        assert_eq!(source([2, 4, 6, 8]).run(mean()).unwrap(), Value::Float(5.0));
        let sd = source([2, 4, 4, 4, 5, 5, 7, 9]).run(stddev(0)).unwrap();
        assert_eq!(sd, Value::Float(2.0));
        assert!(source([1]).run(stddev(1)).unwrap_err().is_no_result());
        assert!(source(Vec::<i64>::new())
            .run(mean())
            .unwrap_err()
            .is_no_result());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(source([3, 1, 4, 1]).run(min()).unwrap(), Value::Int(1));
        assert_eq!(source([3, 1, 4, 1]).run(max()).unwrap(), Value::Int(4));

        let by_len: Less = Rc::new(|a: &Value, b: &Value| {
            a.as_str().map(str::len) < b.as_str().map(str::len)
        });
        let longest = source(["ab", "abcd", "xyzw"]).run(max_by(by_len)).unwrap();
        assert_eq!(longest, Value::from("abcd"));
    }

    #[test]
    fn test_to_dict() {
        let rows = vec![
            Value::pair(3, "b"),
            Value::pair(1, "a"),
            Value::pair(4, "j"),
            Value::pair(3, "c"),
        ];
        let out = source(rows).run(to_dict()).unwrap();
        assert_eq!(out.to_string(), "[(1, 'a'), (3, 'c'), (4, 'j')]");
        assert_eq!(
            source(Vec::<i64>::new()).run(to_dict()).unwrap(),
            Value::List(vec![])
        );
        let err = source([1]).run(to_dict()).unwrap_err();
        assert!(matches!(err, PipeError::TypeMismatch { .. }), "got: {err}");
    }

    #[test]
    fn test_size_rand_sample() {
        let out = source(0..100i64)
            .run(size_rand_sample(5, Some(9)).unwrap())
            .unwrap();
        let Value::List(sample) = out else {
            panic!("expected a list, got {out}");
        };
        assert_eq!(sample.len(), 5);
        assert!(sample
            .iter()
            .all(|v| v.as_i64().is_some_and(|x| (0..100).contains(&x))));

        let again = source(0..100i64)
            .run(size_rand_sample(5, Some(9)).unwrap())
            .unwrap();
        assert_eq!(again, Value::List(sample));

        assert_eq!(
            source([7]).run(size_rand_sample(3, None).unwrap()).unwrap(),
            Value::List(vec![Value::Int(7); 3])
        );
        assert!(source(Vec::<i64>::new())
            .run(size_rand_sample(2, None).unwrap())
            .unwrap_err()
            .is_no_result());
        assert!(size_rand_sample(0, None).is_err());
    }

    #[test]
    fn test_size_rand_sample_too_large_is_an_error() {
        let err = source([1])
            .run(size_rand_sample(usize::MAX, Some(1)).unwrap())
            .unwrap_err();
        assert!(
            matches!(err, PipeError::InvalidParam { ref param, .. } if param == "size"),
            "got: {err}"
        );
    }

    #[test]
    fn test_size_rand_sample_is_roughly_uniform() {
        let mut hits = [0u32; 4];
        for seed in 0..400 {
            let out = source(0..4i64)
                .run(size_rand_sample(1, Some(seed)).unwrap())
                .unwrap();
            let picked = out.get(0).and_then(Value::as_i64).unwrap();
            hits[picked as usize] += 1;
        }
        assert!(hits.iter().all(|&h| (50..150).contains(&h)), "got: {hits:?}");
    }

    #[test]
    fn test_constant_and_last() {
        assert_eq!(
            source([1, 2]).run(constant("hello")).unwrap(),
            Value::from("hello")
        );
        assert_eq!(
            source(Vec::<i64>::new()).run(constant("hello")).unwrap(),
            Value::from("hello")
        );
        assert_eq!(source([1, 2, 3]).run(last()).unwrap(), Value::Int(3));
        let squared = last_with(|v| v.try_mul(&v));
        assert_eq!(source([1, 2, 3]).run(squared).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_to_list() {
        assert_eq!(
            source(Vec::<i64>::new()).run(to_list()).unwrap(),
            Value::List(vec![])
        );
    }

    #[test]
    fn test_fanned_sinks() {
        let both = split(vec![count(), sum()]).unwrap();
        assert_eq!(
            source([1, 2, 3, 4]).run(both).unwrap(),
            Value::pair(4, 10)
        );
    }
}
