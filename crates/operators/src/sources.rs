//! Source stages: tick-driven element producers.

use contracts::{BoxTarget, Flow, PipeError, PipeResult, Producer, Target, Value};
use pipe_core::Pipe;
use tracing::trace;

/// Emits one produced element per tick; closes downstream on exhaustion
struct SourceTarget<P> {
    producer: Option<P>,
    downstream: BoxTarget,
    emitted: u64,
}

impl<P: Producer> Target for SourceTarget<P> {
    fn push(&mut self, _tick: Value) -> PipeResult<Flow> {
        let Some(producer) = self.producer.as_mut() else {
            return Ok(Flow::Done);
        };
        match producer.next_value()? {
            Some(value) => {
                self.emitted += 1;
                if self.downstream.push(value)?.is_done() {
                    // downstream stopped early: release the producer
                    self.producer = None;
                    return Ok(Flow::Done);
                }
                Ok(Flow::Continue)
            }
            None => {
                self.producer = None;
                trace!(emitted = self.emitted, "source exhausted");
                self.downstream.close()?;
                Ok(Flow::Done)
            }
        }
    }

    fn close(&mut self) -> PipeResult<()> {
        if self.producer.take().is_some() {
            self.downstream.close()?;
        }
        Ok(())
    }
}

/// Source over a fresh producer for every instantiated chain
pub fn source_iter<F, P>(factory: F) -> Pipe
where
    F: Fn() -> P + 'static,
    P: Producer + 'static,
{
    Pipe::source("source_iter", move |downstream| {
        Box::new(SourceTarget {
            producer: Some(factory()),
            downstream,
            emitted: 0,
        })
    })
}

/// Replays a fixed sequence
///
/// ```
/// use contracts::Value;
/// use operators::{count, source};
///
/// assert_eq!(source([1, 2, 3, 4]).run(count()).unwrap(), Value::Int(4));
/// ```
pub fn source<I, V>(values: I) -> Pipe
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    source_iter(move || values.clone().into_iter()).named("source")
}

/// Integers from `start` toward `stop` (exclusive) by `step`
///
/// # Errors
/// `InvalidParam` if `step` is zero.
pub fn range(start: i64, stop: i64, step: i64) -> PipeResult<Pipe> {
    if step == 0 {
        return Err(PipeError::invalid_param(
            "step",
            step,
            "range step must be non-zero",
        ));
    }
    let pipe = source_iter(move || {
        std::iter::successors(Some(start), move |&x| x.checked_add(step))
            .take_while(move |&x| if step > 0 { x < stop } else { x > stop })
            .map(Value::Int)
    });
    Ok(pipe.named(format!("range({start}, {stop}, {step})")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{count, to_list};

    fn ints(xs: &[i64]) -> Value {
        Value::List(xs.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_source_replays_for_every_run() {
        let src = source([1, 2, 3]);
        assert_eq!(src.clone().run(to_list()).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(src.run(count()).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_range_forward_and_backward() {
        let up = range(0, 5, 2).unwrap().run(to_list()).unwrap();
        assert_eq!(up, ints(&[0, 2, 4]));
        let down = range(3, 0, -1).unwrap().run(to_list()).unwrap();
        assert_eq!(down, ints(&[3, 2, 1]));
        let empty = range(3, 3, 1).unwrap().run(count()).unwrap();
        assert_eq!(empty, Value::Int(0));
    }

    #[test]
    fn test_range_zero_step_rejected() {
        let err = range(0, 3, 0).unwrap_err();
        assert!(
            matches!(err, PipeError::InvalidParam { ref param, .. } if param == "step"),
            "got: {err}"
        );
    }

    #[test]
    fn test_producer_error_propagates() {
        struct Failing;
        impl Producer for Failing {
            fn next_value(&mut self) -> PipeResult<Option<Value>> {
                Err(PipeError::user("read failed"))
            }
        }
        let err = source_iter(|| Failing).run(count()).unwrap_err();
        assert!(matches!(err, PipeError::User(_)), "got: {err}");
    }
}
