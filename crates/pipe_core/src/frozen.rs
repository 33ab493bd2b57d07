//! Reusable sinks: build once, feed many runs, thaw once.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use contracts::{PipeCategory, PipeError, PipeResult, Target, Value};
use tracing::{debug, instrument};

use crate::chain::{build_chain, Link};
use crate::driver;
use crate::final_actor::{FinalActor, ResultSlot};
use crate::pipe::Pipe;
use crate::shared::{CloseAbsorber, SharedTarget};

struct FrozenCore {
    head: SharedTarget,
    slot: ResultSlot,
    thawed: Cell<bool>,
    feeds: Cell<u64>,
    name: String,
}

/// A sink whose live chain outlives the runs that feed it
///
/// Every feed ends with a close that is absorbed before it reaches the
/// chain, so accumulated state carries over. [`FrozenSink::thaw`] delivers
/// the one real close and returns the result. Clones share the chain.
#[derive(Clone)]
pub struct FrozenSink {
    core: Rc<FrozenCore>,
    prefix: Vec<Link>,
}

impl fmt::Debug for FrozenSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenSink")
            .field("name", &self.core.name)
            .field("prefix", &self.prefix.len())
            .field("feeds", &self.core.feeds.get())
            .field("thawed", &self.core.thawed.get())
            .finish()
    }
}

impl FrozenSink {
    pub(crate) fn new(sink: &Pipe) -> Self {
        let (actor, slot) = FinalActor::new();
        let head = build_chain(&sink.links(), Box::new(actor));
        debug!(sink = %sink.label(), "frozen sink built");
        Self {
            core: Rc::new(FrozenCore {
                head: SharedTarget::new(head),
                slot,
                thawed: Cell::new(false),
                feeds: Cell::new(0),
                name: sink.label().to_string(),
            }),
            prefix: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_thawed(&self) -> bool {
        self.core.thawed.get()
    }

    /// Completed feeds so far, across all clones
    pub fn feeds(&self) -> u64 {
        self.core.feeds.get()
    }

    /// A frozen sink reached through `middle` first
    ///
    /// The returned handle shares this one's chain; the middle stages are
    /// rebuilt for every feed.
    pub fn prepend(&self, middle: &Pipe) -> PipeResult<FrozenSink> {
        if middle.category() != PipeCategory::Middle {
            return Err(PipeError::invalid_composition(
                middle.label(),
                self.name(),
                format!("only a middle can prefix a frozen sink, got {}", middle.category()),
            ));
        }
        let mut prefix = middle.links();
        prefix.extend(self.prefix.iter().cloned());
        Ok(FrozenSink {
            core: Rc::clone(&self.core),
            prefix,
        })
    }

    /// Run `source` into the frozen chain; returns ticks sent
    ///
    /// # Errors
    /// `AlreadyThawed` after [`FrozenSink::thaw`]; `InvalidParam` if
    /// `source` is not a source; any stage error.
    #[instrument(skip_all, fields(sink = %self.core.name))]
    pub fn feed(&self, source: &Pipe) -> PipeResult<u64> {
        if self.is_thawed() {
            return Err(PipeError::AlreadyThawed);
        }
        if source.category() != PipeCategory::Source {
            return Err(PipeError::invalid_composition(
                source.label(),
                self.name(),
                format!("only a source can feed a frozen sink, got {}", source.category()),
            ));
        }

        let mut links = source.links();
        links.extend(self.prefix.iter().cloned());
        let absorber = CloseAbsorber::new(self.core.head.clone());
        let mut head = build_chain(&links, Box::new(absorber));
        let ticks = driver::drive(head.as_mut())?;

        self.core.feeds.set(self.core.feeds.get() + 1);
        observability::record_frozen_feed(&self.core.name);
        debug!(ticks, feeds = self.core.feeds.get(), "feed absorbed");
        Ok(ticks)
    }

    /// Close the chain for real and return its result
    ///
    /// # Errors
    /// `NoResult` if no value ever reached the end; `AlreadyThawed` on a
    /// second call through any clone.
    #[instrument(skip_all, fields(sink = %self.core.name))]
    pub fn thaw(&self) -> PipeResult<Value> {
        if self.core.thawed.replace(true) {
            return Err(PipeError::AlreadyThawed);
        }
        let mut head = self.core.head.clone();
        let result = head.close().and_then(|()| self.core.slot.take());
        observability::record_thaw(&self.core.name, result.is_ok());
        debug!(feeds = self.core.feeds.get(), ok = result.is_ok(), "thawed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add, replay, tally, total};

    #[test]
    fn test_state_accumulates_across_feeds() {
        let frozen = total().freeze().unwrap();
        for _ in 0..4 {
            replay(vec![1, 2, 3, 4]).feed(&frozen).unwrap();
        }
        assert_eq!(frozen.feeds(), 4);
        assert_eq!(frozen.thaw().unwrap(), Value::Int(40));
    }

    #[test]
    fn test_thaw_without_values_is_no_result() {
        let frozen = total().freeze().unwrap();
        replay(vec![]).feed(&frozen).unwrap();
        let err = frozen.thaw().unwrap_err();
        assert!(err.is_no_result(), "got: {err}");
    }

    #[test]
    fn test_second_thaw_and_late_feed_rejected() {
        let frozen = tally().freeze().unwrap();
        assert_eq!(frozen.thaw().unwrap(), Value::Int(0));

        let err = frozen.thaw().unwrap_err();
        assert!(matches!(err, PipeError::AlreadyThawed), "got: {err}");
        let err = replay(vec![1]).feed(&frozen).unwrap_err();
        assert!(matches!(err, PipeError::AlreadyThawed), "got: {err}");
    }

    #[test]
    fn test_prefix_applies_per_feed_and_shares_state() {
        let frozen = total().freeze().unwrap();
        let shifted = frozen.prepend(&add(10)).unwrap();

        replay(vec![1]).feed(&shifted).unwrap();
        replay(vec![1]).feed(&frozen).unwrap();
        assert_eq!(frozen.thaw().unwrap(), Value::Int(12));
        assert!(shifted.is_thawed());
    }

    #[test]
    fn test_feed_requires_source() {
        let frozen = total().freeze().unwrap();
        let err = frozen.feed(&add(1)).unwrap_err();
        assert!(
            matches!(err, PipeError::InvalidParam { ref param, .. } if param == "composition"),
            "got: {err}"
        );
        let err = frozen.prepend(&tally()).unwrap_err();
        assert!(err.to_string().contains("only a middle"), "got: {err}");
    }
}
