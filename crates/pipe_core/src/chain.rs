//! Chainer: instantiates a list of stage constructors against a terminal target.

use std::fmt;

use contracts::{BoxTarget, Stage};
use tracing::trace;

use crate::fan;

/// One element of a stage list
#[derive(Clone)]
pub enum Link {
    /// A single stage constructor
    Stage(Stage),
    /// Parallel branches, bracketed by split and join
    Fan(Vec<Vec<Link>>),
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(_) => f.write_str("Stage"),
            Self::Fan(branches) => f.debug_tuple("Fan").field(branches).finish(),
        }
    }
}

/// Build one live chain ending in `terminal`
///
/// Stages are instantiated right to left: each constructor receives the
/// already-built downstream target. A fan builds its split/join bracket
/// around independently chained branches.
pub fn build_chain(links: &[Link], terminal: BoxTarget) -> BoxTarget {
    trace!(links = links.len(), "building chain");
    links.iter().rev().fold(terminal, |downstream, link| match link {
        Link::Stage(stage) => stage(downstream),
        Link::Fan(branches) => fan::connect(branches, downstream),
    })
}
