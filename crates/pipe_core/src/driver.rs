//! Tick-driven execution of a source-headed chain.

use std::time::Instant;

use contracts::{PipeResult, RunOutcome, RunReport, Target, Value};
use tracing::{debug, instrument};

use crate::final_actor::ResultSlot;

/// Push ticks into `head` until it reports `Done`
///
/// The head must be a source stage: it turns each tick into the next
/// element and answers `Done` once it has closed everything downstream.
/// Returns the number of ticks sent.
pub fn drive(head: &mut dyn Target) -> PipeResult<u64> {
    let mut ticks = 0u64;
    loop {
        ticks += 1;
        if head.push(Value::Null)?.is_done() {
            return Ok(ticks);
        }
    }
}

/// Drive `head` and take the terminal result from `slot`
pub fn pump(head: &mut dyn Target, slot: &ResultSlot) -> PipeResult<Value> {
    drive(head)?;
    slot.take()
}

/// Like [`pump`], but also times the run and records its metrics
#[instrument(skip_all, fields(pipeline = %name))]
pub fn pump_reported(
    head: &mut dyn Target,
    slot: &ResultSlot,
    name: &str,
) -> (PipeResult<Value>, RunReport) {
    let started = Instant::now();
    let mut ticks = 0;
    let result = drive(head).and_then(|n| {
        ticks = n;
        slot.take()
    });

    let outcome = RunOutcome::of(&result);
    let report = RunReport {
        pipeline: name.to_string(),
        ticks,
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        outcome,
    };
    debug!(ticks, outcome = outcome.as_str(), "run finished");
    observability::record_run(&report);
    (result, report)
}
