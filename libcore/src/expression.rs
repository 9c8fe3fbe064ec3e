//! The expression pipeline.
//!
//! Trees flow one way: a [`UserExpression`] is what was typed, a
//! [`ReducedExpression`] is its canonical form, an
//! [`ApproximateExpression`] is a number. Each stage is produced from the
//! previous one and never goes back; display goes through a beautified
//! copy so the canonical tree itself is never mangled for printing.
//!
//! All three stages hold [`TreeRef`] handles, not offsets, so they stay
//! valid across unrelated pool activity.

use crate::pool::{Pool, PoolError};
use crate::prefs::Preferences;
use crate::reduce::{self, ReduceOutcome};
use crate::tree_ref::TreeRef;
use crate::{approx, node::Node};

pub struct UserExpression {
    reference: TreeRef,
}

impl UserExpression {
    /// Adopt the most recently pushed tree as a user expression.
    pub fn adopt(pool: &mut Pool) -> Result<UserExpression, PoolError> {
        let offset = pool.last_tree().ok_or(PoolError::StaleReference)?;
        let reference = pool.bind(offset);
        Ok(UserExpression { reference })
    }

    pub fn node<'a>(&self, pool: &'a Pool) -> Result<Node<'a>, PoolError> {
        let offset = pool.resolve(&self.reference).ok_or(PoolError::StaleReference)?;
        Ok(pool.view(offset))
    }

    /// Reduce a copy of this expression. The input tree is kept; on an
    /// interrupted reduction the outcome says the result is numeric.
    pub fn reduce(
        &self,
        pool: &mut Pool,
        prefs: &Preferences,
    ) -> Result<ReducedExpression, PoolError> {
        let offset = pool.resolve(&self.reference).ok_or(PoolError::StaleReference)?;
        let copy = pool.clone_tree(offset)?;
        let outcome = reduce::reduce_root(pool, copy, prefs)?;
        let reference = pool.bind(copy);
        Ok(ReducedExpression { reference, outcome })
    }

    pub fn release(self, pool: &mut Pool) {
        pool.release(self.reference);
    }
}

pub struct ReducedExpression {
    reference: TreeRef,
    outcome: ReduceOutcome,
}

impl ReducedExpression {
    pub fn is_exact(&self) -> bool {
        self.outcome == ReduceOutcome::Symbolic
    }

    pub fn node<'a>(&self, pool: &'a Pool) -> Result<Node<'a>, PoolError> {
        let offset = pool.resolve(&self.reference).ok_or(PoolError::StaleReference)?;
        Ok(pool.view(offset))
    }

    /// Render through a beautified copy; the canonical tree is untouched.
    pub fn display(&self, pool: &mut Pool) -> Result<String, PoolError> {
        let offset = pool.resolve(&self.reference).ok_or(PoolError::StaleReference)?;
        let copy = pool.clone_tree(offset)?;
        let rendered = match reduce::beautify(pool, copy) {
            Ok(()) => Ok(pool.view(copy).to_string()),
            Err(error) => Err(error),
        };
        pool.remove_tree(copy);
        rendered
    }

    pub fn approximate(
        &self,
        pool: &Pool,
        prefs: &Preferences,
    ) -> Result<ApproximateExpression, PoolError> {
        let offset = pool.resolve(&self.reference).ok_or(PoolError::StaleReference)?;
        let ctx = approx::ApproxContext::new(prefs);
        let value = ctx.project(approx::approximate(pool, offset, &ctx));
        Ok(ApproximateExpression { value })
    }

    pub fn release(self, pool: &mut Pool) {
        pool.release(self.reference);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproximateExpression {
    value: f64,
}

impl ApproximateExpression {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_undefined(&self) -> bool {
        self.value.is_nan()
    }
}

impl std::fmt::Display for ApproximateExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_undefined() {
            write!(f, "undef")
        } else {
            write!(f, "{}", self.value)
        }
    }
}
