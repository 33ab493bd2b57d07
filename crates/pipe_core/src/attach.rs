//! Run-time attachment of ad-hoc sub-pipes to a shared downstream.

use contracts::{BoxTarget, PipeCategory, PipeResult};
use tracing::{instrument, trace};

use crate::chain::build_chain;
use crate::driver;
use crate::pipe::Pipe;
use crate::shared::{CloseAbsorber, SharedTarget};

/// Wire `pipe` in front of `downstream`
///
/// Closing the returned target flushes only the sub-pipe's own stages; the
/// shared downstream stays open for its owner to close. A source pipe has
/// nothing to push into, so it is driven to completion here and `None` is
/// returned.
#[instrument(level = "trace", skip_all, fields(pipe = %pipe.label()))]
pub fn attach(pipe: &Pipe, downstream: &SharedTarget) -> PipeResult<Option<BoxTarget>> {
    let absorber = Box::new(CloseAbsorber::new(downstream.clone()));
    let mut head = build_chain(&pipe.links(), absorber);
    observability::record_sub_pipe_attached();

    if pipe.category() == PipeCategory::Source {
        let ticks = driver::drive(head.as_mut())?;
        trace!(ticks, "source sub-pipe replayed");
        return Ok(None);
    }
    Ok(Some(head))
}
