//! # Order Stats
//!
//! Data structures backing the windowed operators:
//! - [`Treap`]: randomized order-statistic tree (rank queries, handle-based erase)
//! - [`SlidingExtremum`]: O(1) amortized trailing-window min/max
//!
//! Both take the ordering as an `lt` closure, so the same structure serves
//! min and max (inverted comparator) and arbitrary element types.
//!
//! ## 使用示例
//!
//! ```
//! use order_stats::{SlidingExtremum, Treap};
//!
//! let mut t = Treap::with_seed(|a: &i64, b: &i64| a < b, 42);
//! let h = t.insert(3);
//! t.insert(1);
//! assert_eq!(*t.kth(1), 3);
//! t.erase(h);
//! assert_eq!(t.size(), 1);
//!
//! let mut m = SlidingExtremum::new(2, |a: &i64, b: &i64| a < b).unwrap();
//! assert_eq!(*m.push(5), 5);
//! assert_eq!(*m.push(7), 5);
//! assert_eq!(*m.push(9), 7);
//! ```

mod extremum;
mod treap;

pub use extremum::SlidingExtremum;
pub use treap::{Handle, Treap};
