//! Recording target for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use contracts::{BoxTarget, Flow, PipeResult, Target, Value};

use crate::Pipe;

#[derive(Default)]
struct Record {
    values: Vec<Value>,
    closes: usize,
}

/// Handle to what a [`Collect`] target received
#[derive(Clone, Default)]
pub(crate) struct Seen(Rc<RefCell<Record>>);

impl Seen {
    pub(crate) fn values(&self) -> Vec<Value> {
        self.0.borrow().values.clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.0.borrow().closes
    }
}

/// Target that records every push and close
pub(crate) struct Collect {
    seen: Seen,
    limit: Option<usize>,
}

impl Collect {
    pub(crate) fn new() -> (Self, Seen) {
        let seen = Seen::default();
        (
            Self {
                seen: seen.clone(),
                limit: None,
            },
            seen,
        )
    }

    /// Finishes (closes itself and returns `Done`) after `limit` values
    pub(crate) fn with_limit(limit: usize) -> (Self, Seen) {
        let (mut collect, seen) = Self::new();
        collect.limit = Some(limit);
        (collect, seen)
    }
}

impl Target for Collect {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        let mut record = self.seen.0.borrow_mut();
        record.values.push(value);
        if self.limit == Some(record.values.len()) {
            record.closes += 1;
            return Ok(Flow::Done);
        }
        Ok(Flow::Continue)
    }

    fn close(&mut self) -> PipeResult<()> {
        self.seen.0.borrow_mut().closes += 1;
        Ok(())
    }
}

/// Source replaying `values` on ticks
struct Replay {
    values: std::vec::IntoIter<Value>,
    downstream: BoxTarget,
}

impl Target for Replay {
    fn push(&mut self, _tick: Value) -> PipeResult<Flow> {
        match self.values.next() {
            Some(v) => self.downstream.push(v),
            None => {
                self.downstream.close()?;
                Ok(Flow::Done)
            }
        }
    }

    fn close(&mut self) -> PipeResult<()> {
        self.downstream.close()
    }
}

pub(crate) fn replay(values: Vec<i64>) -> Pipe {
    Pipe::source("replay", move |downstream| {
        Box::new(Replay {
            values: values
                .iter()
                .copied()
                .map(Value::Int)
                .collect::<Vec<_>>()
                .into_iter(),
            downstream,
        })
    })
}

struct AddN {
    n: i64,
    downstream: BoxTarget,
}

impl Target for AddN {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        let out = value.try_add(&Value::Int(self.n))?;
        self.downstream.push(out)
    }

    fn close(&mut self) -> PipeResult<()> {
        self.downstream.close()
    }
}

pub(crate) fn add(n: i64) -> Pipe {
    Pipe::middle("add", move |downstream| Box::new(AddN { n, downstream }))
}

/// Folding sink: `tally` counts, `total` sums and emits nothing when empty
struct Fold {
    acc: Option<Value>,
    count_only: bool,
    downstream: BoxTarget,
}

impl Target for Fold {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        let step = if self.count_only { Value::Int(1) } else { value };
        self.acc = Some(match self.acc.take() {
            Some(acc) => acc.try_add(&step)?,
            None => step,
        });
        Ok(Flow::Continue)
    }

    fn close(&mut self) -> PipeResult<()> {
        let out = match self.acc.take() {
            Some(v) => Some(v),
            None if self.count_only => Some(Value::Int(0)),
            None => None,
        };
        if let Some(v) = out {
            if self.downstream.push(v)?.is_done() {
                return Ok(());
            }
        }
        self.downstream.close()
    }
}

pub(crate) fn total() -> Pipe {
    Pipe::sink("total", |downstream| {
        Box::new(Fold {
            acc: None,
            count_only: false,
            downstream,
        })
    })
}

pub(crate) fn tally() -> Pipe {
    Pipe::sink("tally", |downstream| {
        Box::new(Fold {
            acc: None,
            count_only: true,
            downstream,
        })
    })
}
