//! Pipe expressions and their composition algebra.
//!
//! | left \ right | Source  | Middle | Sink        | Frozen      |
//! |--------------|---------|--------|-------------|-------------|
//! | Source       | invalid | Source | run → value | feed        |
//! | Middle       | invalid | Middle | Sink        | Frozen      |
//! | Sink         | invalid | invalid| invalid     | invalid     |
//! | Frozen       | invalid | invalid| invalid     | invalid     |
//!
//! Parallel composition ([`Pipe::and`], [`split`]) only joins expressions of
//! the same category. A fanned expression used sequentially collapses into a
//! single split/join link first.

use std::fmt;
use std::rc::Rc;

use contracts::{BoxTarget, PipeCategory, PipeError, PipeResult, RunReport, Value};
use tracing::debug;

use crate::chain::{build_chain, Link};
use crate::driver;
use crate::final_actor::FinalActor;
use crate::frozen::FrozenSink;

/// Stage layout of a pipe expression
#[derive(Debug, Clone)]
pub enum Shape {
    /// An ordered list of links
    Simple(Vec<Link>),
    /// Parallel branches, each an ordered list of links
    Fanned(Vec<Vec<Link>>),
}

/// An unconnected pipe expression of category Source, Middle or Sink
#[derive(Clone)]
pub struct Pipe {
    category: PipeCategory,
    shape: Shape,
    label: String,
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("category", &self.category)
            .field("label", &self.label)
            .field("shape", &self.shape)
            .finish()
    }
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Pipe {
    fn single<F>(category: PipeCategory, label: &str, stage: F) -> Self
    where
        F: Fn(BoxTarget) -> BoxTarget + 'static,
    {
        Self {
            category,
            shape: Shape::Simple(vec![Link::Stage(Rc::new(stage))]),
            label: label.to_string(),
        }
    }

    /// A self-driving stage: each tick it receives emits the next element
    pub fn source<F>(label: &str, stage: F) -> Self
    where
        F: Fn(BoxTarget) -> BoxTarget + 'static,
    {
        Self::single(PipeCategory::Source, label, stage)
    }

    pub fn middle<F>(label: &str, stage: F) -> Self
    where
        F: Fn(BoxTarget) -> BoxTarget + 'static,
    {
        Self::single(PipeCategory::Middle, label, stage)
    }

    pub fn sink<F>(label: &str, stage: F) -> Self
    where
        F: Fn(BoxTarget) -> BoxTarget + 'static,
    {
        Self::single(PipeCategory::Sink, label, stage)
    }

    #[inline]
    pub fn category(&self) -> PipeCategory {
        self.category
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_fanned(&self) -> bool {
        matches!(self.shape, Shape::Fanned(_))
    }

    /// Replace the label used in logs and error messages
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sequential view: a fan collapses into one split/join link
    pub fn links(&self) -> Vec<Link> {
        match &self.shape {
            Shape::Simple(links) => links.clone(),
            Shape::Fanned(branches) => vec![Link::Fan(branches.clone())],
        }
    }

    /// Parallel view: a simple pipe is a single branch
    pub fn branches(&self) -> Vec<Vec<Link>> {
        match &self.shape {
            Shape::Simple(links) => vec![links.clone()],
            Shape::Fanned(branches) => branches.clone(),
        }
    }

    /// Sequential composition `self | next` for the cases that yield a pipe
    ///
    /// # Errors
    /// `InvalidParam` (param `composition`) for any pair outside the
    /// Source|Middle, Middle|Middle and Middle|Sink rules. A Source|Sink
    /// pair executes instead; see [`Pipe::run`] and [`compose`].
    pub fn then(self, next: Pipe) -> PipeResult<Pipe> {
        use PipeCategory::*;

        let category = match (self.category, next.category) {
            (Source, Middle) => Source,
            (Middle, Middle) => Middle,
            (Middle, Sink) => Sink,
            (Source, Sink) => {
                return Err(PipeError::invalid_composition(
                    &self.label,
                    &next.label,
                    "a source followed by a sink executes; use run",
                ))
            }
            (Sink, _) | (Frozen, _) => {
                return Err(PipeError::invalid_composition(
                    &self.label,
                    &next.label,
                    format!("nothing may follow a {}", self.category),
                ))
            }
            (_, Source) => {
                return Err(PipeError::invalid_composition(
                    &self.label,
                    &next.label,
                    "a source cannot have an upstream",
                ))
            }
            (_, Frozen) => {
                return Err(PipeError::invalid_composition(
                    &self.label,
                    &next.label,
                    "frozen sinks compose through compose()",
                ))
            }
        };

        let mut links = self.links();
        links.extend(next.links());
        Ok(Pipe {
            category,
            shape: Shape::Simple(links),
            label: format!("{} | {}", self.label, next.label),
        })
    }

    /// Parallel composition: one more branch per branch of `other`
    ///
    /// # Errors
    /// `InvalidParam` if the two categories differ.
    pub fn and(self, other: Pipe) -> PipeResult<Pipe> {
        if self.category != other.category {
            return Err(PipeError::invalid_composition(
                &self.label,
                &other.label,
                format!(
                    "parallel branches must share a category, got {} and {}",
                    self.category, other.category
                ),
            ));
        }
        let mut branches = self.branches();
        branches.extend(other.branches());
        Ok(Pipe {
            category: self.category,
            shape: Shape::Fanned(branches),
            label: format!("{} + {}", self.label, other.label),
        })
    }

    /// Run a source into a sink and return the sink's result
    ///
    /// # Errors
    /// `NoResult` if the sink emitted nothing; any error raised by a stage.
    pub fn run(self, sink: Pipe) -> PipeResult<Value> {
        let (mut head, slot) = self.connect_terminal(sink)?;
        driver::pump(head.as_mut(), &slot)
    }

    /// [`Pipe::run`] with timing, a [`RunReport`] and recorded metrics
    pub fn run_reported(
        self,
        sink: Pipe,
        name: &str,
    ) -> PipeResult<(PipeResult<Value>, RunReport)> {
        let (mut head, slot) = self.connect_terminal(sink)?;
        Ok(driver::pump_reported(head.as_mut(), &slot, name))
    }

    fn connect_terminal(self, sink: Pipe) -> PipeResult<(BoxTarget, crate::ResultSlot)> {
        if self.category != PipeCategory::Source || sink.category != PipeCategory::Sink {
            return Err(PipeError::invalid_composition(
                &self.label,
                &sink.label,
                format!(
                    "run needs a source and a sink, got {} and {}",
                    self.category, sink.category
                ),
            ));
        }
        let mut links = self.links();
        links.extend(sink.links());
        debug!(source = %self.label, sink = %sink.label, links = links.len(), "connecting run");

        let (actor, slot) = FinalActor::new();
        Ok((build_chain(&links, Box::new(actor)), slot))
    }

    /// Build this sink's chain once, for reuse across many feeds
    ///
    /// # Errors
    /// `InvalidParam` unless this is a sink.
    pub fn freeze(self) -> PipeResult<FrozenSink> {
        if self.category != PipeCategory::Sink {
            return Err(PipeError::invalid_param(
                "freeze",
                &self.label,
                format!("only a sink can be frozen, got {}", self.category),
            ));
        }
        Ok(FrozenSink::new(&self))
    }

    /// Run this source into a frozen sink; its state carries over
    pub fn feed(self, frozen: &FrozenSink) -> PipeResult<u64> {
        frozen.feed(&self)
    }
}

/// Parallel composition of two or more pipes of one category
///
/// # Errors
/// `InvalidParam` for fewer than two pipes or mixed categories.
pub fn split(pipes: Vec<Pipe>) -> PipeResult<Pipe> {
    if pipes.len() < 2 {
        return Err(PipeError::invalid_param(
            "branches",
            pipes.len(),
            "split needs at least two branches",
        ));
    }
    let mut iter = pipes.into_iter();
    let first = match iter.next() {
        Some(p) => p,
        None => unreachable!("length checked above"),
    };
    iter.try_fold(first, Pipe::and)
}

/// Either side of a composition
#[derive(Debug, Clone)]
pub enum Expr {
    Pipe(Pipe),
    Frozen(FrozenSink),
}

impl From<Pipe> for Expr {
    fn from(pipe: Pipe) -> Self {
        Self::Pipe(pipe)
    }
}

impl From<FrozenSink> for Expr {
    fn from(frozen: FrozenSink) -> Self {
        Self::Frozen(frozen)
    }
}

impl Expr {
    pub fn category(&self) -> PipeCategory {
        match self {
            Self::Pipe(p) => p.category(),
            Self::Frozen(_) => PipeCategory::Frozen,
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Pipe(p) => p.label(),
            Self::Frozen(f) => f.name(),
        }
    }
}

/// Result of [`compose`]
#[derive(Debug)]
pub enum Composed {
    /// A new, still unconnected pipe
    Pipe(Pipe),
    /// A frozen sink with a longer prefix
    Frozen(FrozenSink),
    /// Source|Sink executed; this is the captured result
    Value(Value),
    /// Source|Frozen executed; the frozen sink absorbed the run
    Fed,
}

impl Composed {
    /// The executed result, if this composition ran
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_pipe(self) -> Option<Pipe> {
        match self {
            Self::Pipe(p) => Some(p),
            _ => None,
        }
    }
}

/// Full sequential composition over every category pair
pub fn compose(left: impl Into<Expr>, right: impl Into<Expr>) -> PipeResult<Composed> {
    let (left, right) = (left.into(), right.into());
    match (left, right) {
        (Expr::Pipe(l), Expr::Pipe(r)) => {
            if l.category() == PipeCategory::Source && r.category() == PipeCategory::Sink {
                l.run(r).map(Composed::Value)
            } else {
                l.then(r).map(Composed::Pipe)
            }
        }
        (Expr::Pipe(l), Expr::Frozen(f)) => match l.category() {
            PipeCategory::Source => {
                f.feed(&l)?;
                Ok(Composed::Fed)
            }
            PipeCategory::Middle => f.prepend(&l).map(Composed::Frozen),
            other => Err(PipeError::invalid_composition(
                l.label(),
                f.name(),
                format!("a {other} cannot feed a frozen sink"),
            )),
        },
        (l @ Expr::Frozen(_), r) => Err(PipeError::invalid_composition(
            l.label(),
            r.label(),
            "nothing may follow a frozen sink",
        )),
    }
}
