//! Fan multiplexer: split broadcasts to branches, join zips them back.
//!
//! ```text
//!            ┌─ branch 0 ─ Relay(0) ─┐
//! ─ Split ───┤                       ├─ Join ─ downstream
//!            └─ branch 1 ─ Relay(1) ─┘
//! ```
//!
//! Join queues are unbounded: a fast branch never waits for a slow one.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use contracts::{BoxTarget, Flow, PipeResult, Target, Value};
use tracing::{debug, warn};

use crate::chain::{build_chain, Link};

/// Backlog depth that triggers a one-time warning
const JOIN_BACKLOG_WARN: usize = 10_000;

/// Build the split/join bracket around `branches`, feeding `downstream`
pub(crate) fn connect(branches: &[Vec<Link>], downstream: BoxTarget) -> BoxTarget {
    let join = Rc::new(RefCell::new(JoinState::new(branches.len(), downstream)));
    let heads = branches
        .iter()
        .enumerate()
        .map(|(index, links)| {
            let relay = Relay {
                index,
                join: Rc::clone(&join),
            };
            build_chain(links, Box::new(relay))
        })
        .collect();
    Box::new(Split::new(heads))
}

/// Broadcasts every element to each live branch
pub struct Split {
    branches: Vec<Option<BoxTarget>>,
    live: usize,
    closed: bool,
}

impl fmt::Debug for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Split")
            .field("branches", &self.branches.len())
            .field("live", &self.live)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Split {
    pub fn new(branches: Vec<BoxTarget>) -> Self {
        let live = branches.len();
        Self {
            branches: branches.into_iter().map(Some).collect(),
            live,
            closed: false,
        }
    }
}

impl Target for Split {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        for (i, slot) in self.branches.iter_mut().enumerate() {
            let Some(branch) = slot else { continue };
            if branch.push(value.clone())?.is_done() {
                *slot = None;
                self.live -= 1;
                debug!(branch = i, live = self.live, "split branch finished");
            }
        }
        if self.live == 0 {
            Ok(Flow::Done)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn close(&mut self) -> PipeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for slot in &mut self.branches {
            if let Some(mut branch) = slot.take() {
                branch.close()?;
            }
        }
        Ok(())
    }
}

/// Shared state of one join: one FIFO per branch
struct JoinState {
    queues: Vec<VecDeque<Value>>,
    closed: Vec<bool>,
    open: usize,
    downstream: BoxTarget,
    finished: bool,
    warned: bool,
}

impl JoinState {
    fn new(size: usize, downstream: BoxTarget) -> Self {
        Self {
            queues: (0..size).map(|_| VecDeque::new()).collect(),
            closed: vec![false; size],
            open: size,
            downstream,
            finished: false,
            warned: false,
        }
    }

    fn accept(&mut self, index: usize, payload: Value) -> PipeResult<Flow> {
        if self.finished {
            return Ok(Flow::Done);
        }
        self.queues[index].push_back(payload);
        self.track_backlog(index);

        if self.queues.iter().any(VecDeque::is_empty) {
            return Ok(Flow::Continue);
        }
        let row = self
            .queues
            .iter_mut()
            .filter_map(VecDeque::pop_front)
            .collect();
        if self.downstream.push(Value::Tuple(row))?.is_done() {
            self.finished = true;
            return Ok(Flow::Done);
        }
        Ok(Flow::Continue)
    }

    fn close_branch(&mut self, index: usize) -> PipeResult<()> {
        if self.finished || self.closed[index] {
            return Ok(());
        }
        self.closed[index] = true;
        self.open -= 1;
        if self.open == 0 {
            self.finished = true;
            self.downstream.close()?;
        }
        Ok(())
    }

    fn track_backlog(&mut self, index: usize) {
        let depth = self.queues[index].len();
        if depth >= JOIN_BACKLOG_WARN && !self.warned {
            self.warned = true;
            observability::record_join_backlog(depth);
            warn!(
                branch = index,
                depth, "join backlog is growing; branches produce at different rates"
            );
        }
    }
}

/// Tags a branch's output with its index on the way into the join
struct Relay {
    index: usize,
    join: Rc<RefCell<JoinState>>,
}

impl Target for Relay {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        self.join.borrow_mut().accept(self.index, value)
    }

    fn close(&mut self) -> PipeResult<()> {
        self.join.borrow_mut().close_branch(self.index)
    }
}
