//! Symbolic and numeric core of a pocket calculator.
//!
//! Expressions are trees of byte-encoded nodes living contiguously in a
//! fixed-capacity [`Pool`]. On top of the pool sit a pattern-matching
//! rewrite engine, an exact reduction pipeline with a numeric fallback,
//! and floating-point evaluation.
//!
//! ```
//! use mathcore::{Pool, Preferences, UserExpression};
//!
//! let mut pool = Pool::new(1024);
//! pool.push_integer(2).unwrap();
//! pool.push_integer(3).unwrap();
//! pool.push_add(2).unwrap();
//! let user = UserExpression::adopt(&mut pool).unwrap();
//!
//! let prefs = Preferences::default();
//! let reduced = user.reduce(&mut pool, &prefs).unwrap();
//! assert!(reduced.node(&pool).unwrap().is_integer(5));
//! ```

#[macro_use]
extern crate serde_derive;

pub mod approx;
pub mod block;
pub mod expression;
pub mod integer;
pub mod node;
pub mod pattern;
pub mod pool;
pub mod prefs;
pub mod properties;
pub mod reduce;
pub mod tree_ref;

pub use crate::block::{ConstantId, Filter, PlaceholderTag, Type};
pub use crate::expression::{ApproximateExpression, ReducedExpression, UserExpression};
pub use crate::integer::BigInt;
pub use crate::node::Node;
pub use crate::pattern::{Bindings, Rule};
pub use crate::pool::{Checkpoint, Pool, PoolError};
pub use crate::prefs::{AngleUnit, Budgets, ComplexFormat, Preferences, Strategy};
pub use crate::reduce::{Interrupt, ReduceContext, ReduceOutcome};
pub use crate::tree_ref::TreeRef;
