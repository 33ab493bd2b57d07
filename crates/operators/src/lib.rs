//! # Operators
//!
//! The concrete stage library built on `pipe_core`: sources, element-wise
//! filters, sliding-window filters, terminal sinks and grouping operators,
//! plus instantiation of declarative blueprints.
//!
//! ```
//! use contracts::Value;
//! use operators::{count, source, sum, window_max};
//!
//! let rolling = window_max(2).unwrap().then(sum()).unwrap();
//! assert_eq!(source([1, 3, 2]).run(rolling).unwrap(), Value::Int(7));
//! assert_eq!(source([1, 3, 2]).run(count()).unwrap(), Value::Int(3));
//! ```

mod blueprint;
mod filters;
mod groups;
mod node;
mod sinks;
mod sources;
mod windows;

pub use blueprint::{build_pipe, build_source, build_stage, build_stages};
pub use filters::{
    append, cast, cast_value, cum_mean, cum_sum, enumerate, exp_mean, filt, filter, from_,
    from_to, grep, map, prepend, prob_sample, relay, select_inds, skip, slice, split_str, tail,
    to, trace, try_map, Cond, FromTo, MapFn, Predicate,
};
pub use groups::{chain, consec_group, dict_join, group, DictJoin, JoinPipeFn, KeyFn, KeyPipeFn};
pub use node::{middle, sink, Emitter, Node, Operator};
pub use sinks::{
    constant, count, last, last_with, max, max_by, mean, min, min_by, nth, size_rand_sample,
    stddev, sum, to_dict, to_list,
};
pub use sources::{range, source, source_iter};
pub use windows::{
    natural_order, window_max, window_max_by, window_mean, window_min, window_min_by,
    window_quantile, window_quantile_by, Less,
};

pub use pipe_core::{compose, split, Composed, Expr, FrozenSink, Pipe};
