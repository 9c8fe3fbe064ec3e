//! The reduction pipeline.
//!
//! Reduction rewrites a tree toward a canonical form: `Sub` becomes
//! `Add` plus `Opp`, `Sqrt` becomes a half power, `Ln` becomes `Log` in
//! base e, sums and products flatten and fold their numeric terms.
//! Structural identities go through the pattern engine as [`Rule`]s;
//! numeric folding works on the integer payloads directly.
//!
//! [`deep_reduce`] is a post-order walk: children first, then the node's
//! own shallow reduction from the dispatch table, repeated until the node
//! settles. Everything is metered by a step budget and every rewrite is
//! atomic, so an interrupted reduction leaves a valid tree behind.
//!
//! [`reduce_root`] adds the escalation protocol on top: on arena
//! exhaustion, integer overflow or budget exhaustion, the original tree
//! is restored and, when the strategy allows it, evaluated numerically
//! instead. At most one downgrade per computation.
//!
//! The beautify pass runs the other direction, turning canonical forms
//! back into what a user expects to read. It only ever runs on a copy
//! bound for display.

use std::convert::TryFrom;

use thiserror::Error;

use crate::approx::{self, ApproxContext};
use crate::block::{ConstantId, Filter, PlaceholderTag, Type};
use crate::integer::BigInt;
use crate::pattern::{self, Rule};
use crate::pool::{Pool, PoolError};
use crate::prefs::{Preferences, Strategy};
use crate::properties::properties;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// An exact result would exceed the integer digit cap.
    #[error("integer magnitude limit exceeded")]
    IntegerOverflow,
    #[error("reduction step budget exceeded")]
    BudgetExceeded,
}

pub struct ReduceContext {
    steps: usize,
    depth: usize,
    rewrite_passes: usize,
}

impl ReduceContext {
    pub fn new(prefs: &Preferences) -> ReduceContext {
        ReduceContext {
            steps: prefs.budgets.reduction_steps,
            depth: prefs.budgets.recursion_depth,
            rewrite_passes: prefs.budgets.rewrite_passes,
        }
    }

    fn charge(&mut self) -> Result<(), Interrupt> {
        if self.steps == 0 {
            return Err(Interrupt::BudgetExceeded);
        }
        self.steps -= 1;
        Ok(())
    }

    fn descend(&mut self) -> Result<(), Interrupt> {
        if self.depth == 0 {
            return Err(Interrupt::BudgetExceeded);
        }
        self.depth -= 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth += 1;
    }
}

// -- Rewrite rules ----------------------------------------------------------

fn sub_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
    pool.push_sub()
}

fn sub_replacement(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
    pool.push_opp()?;
    pool.push_add(2)
}

static SUB_TO_ADD: Rule = Rule {
    name: "a - b = a + (-b)",
    pattern: sub_pattern,
    replacement: sub_replacement,
};

fn sqrt_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_sqrt()
}

fn sqrt_replacement(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_integer(1)?;
    pool.push_integer(2)?;
    pool.push_div()?;
    pool.push_pow()
}

static SQRT_TO_POW: Rule = Rule {
    name: "sqrt(a) = a^(1/2)",
    pattern: sqrt_pattern,
    replacement: sqrt_replacement,
};

fn ln_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_ln()
}

fn ln_replacement(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_constant(ConstantId::E)?;
    pool.push_log()
}

static LN_TO_LOG: Rule = Rule {
    name: "ln(a) = log(a, e)",
    pattern: ln_pattern,
    replacement: ln_replacement,
};

fn log_own_base_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_log()
}

fn one_replacement(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_integer(1)
}

static LOG_OWN_BASE: Rule = Rule {
    name: "log(a, a) = 1",
    pattern: log_own_base_pattern,
    replacement: one_replacement,
};

fn log_of_one_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_integer(1)?;
    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
    pool.push_log()
}

fn zero_replacement(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_integer(0)
}

static LOG_OF_ONE: Rule = Rule {
    name: "log(1, a) = 0",
    pattern: log_of_one_pattern,
    replacement: zero_replacement,
};

fn add_cancel_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::ZeroOrMore)?;
    pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
    pool.push_placeholder(PlaceholderTag::C, Filter::ZeroOrMore)?;
    pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
    pool.push_opp()?;
    pool.push_placeholder(PlaceholderTag::D, Filter::ZeroOrMore)?;
    pool.push_add(5)
}

fn add_cancel_replacement(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::ZeroOrMore)?;
    pool.push_placeholder(PlaceholderTag::C, Filter::ZeroOrMore)?;
    pool.push_placeholder(PlaceholderTag::D, Filter::ZeroOrMore)?;
    pool.push_add(3)
}

static ADD_CANCEL: Rule = Rule {
    name: "b + (-b) cancels inside a sum",
    pattern: add_cancel_pattern,
    replacement: add_cancel_replacement,
};

// Same cancellation with the negated term in front
fn add_cancel_mirror_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
    pool.push_placeholder(PlaceholderTag::A, Filter::ZeroOrMore)?;
    pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
    pool.push_opp()?;
    pool.push_placeholder(PlaceholderTag::C, Filter::ZeroOrMore)?;
    pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
    pool.push_placeholder(PlaceholderTag::D, Filter::ZeroOrMore)?;
    pool.push_add(5)
}

static ADD_CANCEL_MIRROR: Rule = Rule {
    name: "(-b) + b cancels inside a sum",
    pattern: add_cancel_mirror_pattern,
    replacement: add_cancel_replacement,
};

// -- N-ary surgery helpers --------------------------------------------------

fn set_nary_count(pool: &mut Pool, parent: usize, count: usize) {
    debug_assert!(count <= u8::MAX as usize);
    pool.write_block(parent + 1, count as u8);
}

/// Splice the most recently pushed tree in as the parent's first child.
fn insert_first_child(pool: &mut Pool, parent: usize, source: usize) {
    let count = pool.view(parent).number_of_children();
    pool.insert_tree_before(parent + 3, source);
    set_nary_count(pool, parent, count + 1);
}

fn replace_with_integer(pool: &mut Pool, target: usize, value: &BigInt) -> Result<(), PoolError> {
    let pushed = pool.push_big_integer(value)?;
    pool.replace_tree(target, pushed);
    Ok(())
}

fn replace_with_undefined(pool: &mut Pool, target: usize) -> Result<(), PoolError> {
    let pushed = pool.push_undefined()?;
    pool.replace_tree(target, pushed);
    Ok(())
}

/// Replace a two-child node by its first child, in place: remove the
/// second child's span, then the head.
fn collapse_to_first_child(pool: &mut Pool, offset: usize) {
    let second = pool.view(offset).child(1).offset();
    let len = pool.view(second).tree_size();
    pool.remove_span(second, len);
    pool.collapse_head(offset, 1);
}

fn first_two_integer_children(pool: &Pool, parent: usize) -> Vec<(usize, BigInt)> {
    pool.view(parent)
        .children()
        .filter_map(|child| child.as_integer().map(|big| (child.offset(), big)))
        .take(2)
        .collect()
}

// -- Shallow reductions -----------------------------------------------------

fn flatten_nested(pool: &mut Pool, offset: usize, tag: Type) -> bool {
    let nested = pool
        .view(offset)
        .children()
        .find(|child| child.tag() == tag)
        .map(|child| (child.offset(), child.number_of_children()));
    match nested {
        Some((child, inner)) => {
            let count = pool.view(offset).number_of_children();
            // Drop the inner head; its children become our children
            pool.remove_span(child, 3);
            set_nary_count(pool, offset, count - 1 + inner);
            true
        }
        None => false,
    }
}

pub fn shallow_add(pool: &mut Pool, offset: usize, ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    debug_assert_eq!(pool.view(offset).tag(), Type::Add);
    let mut changed = false;

    while flatten_nested(pool, offset, Type::Add) {
        ctx.charge()?;
        changed = true;
    }

    changed |= pattern::apply_until_stable(pool, offset, &ADD_CANCEL, ctx.rewrite_passes)? > 0;
    changed |= pattern::apply_until_stable(pool, offset, &ADD_CANCEL_MIRROR, ctx.rewrite_passes)? > 0;

    // Fold numeric terms pairwise, accumulating at the front
    loop {
        let pair = first_two_integer_children(pool, offset);
        if pair.len() < 2 {
            break;
        }
        ctx.charge()?;
        let sum = pair[0].1.checked_add(&pair[1].1).ok_or(Interrupt::IntegerOverflow)?;
        pool.remove_child(offset, pair[1].0);
        pool.remove_child(offset, pair[0].0);
        let pushed = pool.push_big_integer(&sum)?;
        insert_first_child(pool, offset, pushed);
        changed = true;
    }

    // A zero term disappears unless it is the whole sum
    if pool.view(offset).number_of_children() > 1 {
        let zero = pool
            .view(offset)
            .children()
            .find(|child| child.is_integer(0))
            .map(|child| child.offset());
        if let Some(zero) = zero {
            pool.remove_child(offset, zero);
            changed = true;
        }
    }

    match pool.view(offset).number_of_children() {
        0 => {
            replace_with_integer(pool, offset, &BigInt::zero())?;
            changed = true;
        }
        1 => {
            pool.collapse_head(offset, 3);
            changed = true;
        }
        _ => {}
    }
    Ok(changed)
}

pub fn shallow_mul(pool: &mut Pool, offset: usize, ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    debug_assert_eq!(pool.view(offset).tag(), Type::Mul);
    let mut changed = false;

    while flatten_nested(pool, offset, Type::Mul) {
        ctx.charge()?;
        changed = true;
    }

    // A zero factor annihilates the whole product
    if pool.view(offset).children().any(|child| child.is_integer(0)) {
        replace_with_integer(pool, offset, &BigInt::zero())?;
        return Ok(true);
    }

    loop {
        let pair = first_two_integer_children(pool, offset);
        if pair.len() < 2 {
            break;
        }
        ctx.charge()?;
        let product = pair[0].1.checked_mul(&pair[1].1).ok_or(Interrupt::IntegerOverflow)?;
        pool.remove_child(offset, pair[1].0);
        pool.remove_child(offset, pair[0].0);
        let pushed = pool.push_big_integer(&product)?;
        insert_first_child(pool, offset, pushed);
        changed = true;
    }

    // Unit factors disappear
    loop {
        if pool.view(offset).number_of_children() <= 1 {
            break;
        }
        let one = pool
            .view(offset)
            .children()
            .find(|child| child.is_integer(1))
            .map(|child| child.offset());
        match one {
            Some(one) => {
                pool.remove_child(offset, one);
                changed = true;
            }
            None => break,
        }
    }

    match pool.view(offset).number_of_children() {
        0 => {
            replace_with_integer(pool, offset, &BigInt::from_i64(1))?;
            changed = true;
        }
        1 => {
            pool.collapse_head(offset, 3);
            changed = true;
        }
        _ => {}
    }
    Ok(changed)
}

pub fn shallow_sub(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    Ok(pattern::apply_rule(pool, offset, &SUB_TO_ADD)?)
}

pub fn shallow_div(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    let node = pool.view(offset);
    let numerator = node.child(0).as_integer();
    let denominator = node.child(1).as_integer();
    if let Some(denominator) = &denominator {
        if denominator.is_zero() {
            replace_with_undefined(pool, offset)?;
            return Ok(true);
        }
        if denominator.is_one() {
            collapse_to_first_child(pool, offset);
            return Ok(true);
        }
        if let Some(numerator) = &numerator {
            if numerator.is_zero() {
                replace_with_integer(pool, offset, &BigInt::zero())?;
                return Ok(true);
            }
            if let Some(quotient) = numerator.checked_exact_div(denominator) {
                replace_with_integer(pool, offset, &quotient)?;
                return Ok(true);
            }
        }
    }
    // Inexact or symbolic quotients stay fractions
    Ok(false)
}

pub fn shallow_pow(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    let node = pool.view(offset);
    let base = node.child(0).as_integer();
    let exponent = match node.child(1).as_integer() {
        Some(exponent) => exponent,
        None => return Ok(false),
    };
    if exponent.is_zero() {
        if base.as_ref().map(|b| b.is_zero()).unwrap_or(false) {
            replace_with_undefined(pool, offset)?;
        } else {
            replace_with_integer(pool, offset, &BigInt::from_i64(1))?;
        }
        return Ok(true);
    }
    if exponent.is_one() {
        collapse_to_first_child(pool, offset);
        return Ok(true);
    }
    let base = match base {
        Some(base) => base,
        None => return Ok(false),
    };
    match exponent.to_i64() {
        Some(e) if e > 1 => {
            let e = u32::try_from(e).map_err(|_| Interrupt::IntegerOverflow)?;
            let result = base.checked_pow(e).ok_or(Interrupt::IntegerOverflow)?;
            replace_with_integer(pool, offset, &result)?;
            Ok(true)
        }
        Some(e) if e < 0 => {
            if base.is_zero() {
                replace_with_undefined(pool, offset)?;
                return Ok(true);
            }
            if base.is_one() {
                replace_with_integer(pool, offset, &BigInt::from_i64(1))?;
                return Ok(true);
            }
            if base.negated().is_one() {
                let sign = if e % 2 == 0 { 1 } else { -1 };
                replace_with_integer(pool, offset, &BigInt::from_i64(sign))?;
                return Ok(true);
            }
            // Negative powers of other integers stay symbolic
            Ok(false)
        }
        _ => Err(Interrupt::IntegerOverflow),
    }
}

pub fn shallow_opp(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    let child = pool.view(offset).child(0);
    match child.tag() {
        Type::Opp => {
            // -(-x) = x
            pool.collapse_head(offset, 1);
            pool.collapse_head(offset, 1);
            Ok(true)
        }
        Type::Integer => {
            let big = match child.as_integer() {
                Some(big) => big,
                None => return Ok(false),
            };
            // Flip the sign block, then drop the Opp head
            if !big.is_zero() {
                pool.write_block(offset + 1 + 2, (!big.negative) as u8);
            }
            pool.collapse_head(offset, 1);
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub fn shallow_sqrt(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    // Perfect squares resolve exactly
    if let Some(big) = pool.view(offset).child(0).as_integer() {
        if let Some(value) = big.to_i64() {
            if value >= 0 {
                // checked: near i64::MAX the candidate square overflows
                let root = (value as f64).sqrt().round() as i64;
                if root.checked_mul(root) == Some(value) {
                    replace_with_integer(pool, offset, &BigInt::from_i64(root))?;
                    return Ok(true);
                }
            }
        }
    }
    Ok(pattern::apply_rule(pool, offset, &SQRT_TO_POW)?)
}

pub fn shallow_log(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    if pattern::apply_rule(pool, offset, &LOG_OWN_BASE)? {
        return Ok(true);
    }
    if pattern::apply_rule(pool, offset, &LOG_OF_ONE)? {
        return Ok(true);
    }
    Ok(false)
}

pub fn shallow_ln(pool: &mut Pool, offset: usize, _ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    Ok(pattern::apply_rule(pool, offset, &LN_TO_LOG)?)
}

// -- The deep walk ----------------------------------------------------------

/// An undefined child poisons scalar operators. Containers keep their
/// entries, undefined or not.
fn propagate_undefined(pool: &mut Pool, offset: usize) -> Result<bool, PoolError> {
    let node = pool.view(offset);
    match node.tag() {
        Type::Undefined | Type::List | Type::Matrix => return Ok(false),
        _ => {}
    }
    if node.children().any(|child| child.tag() == Type::Undefined) {
        replace_with_undefined(pool, offset)?;
        return Ok(true);
    }
    Ok(false)
}

/// Reduce the tree at `offset` in place: children first, then the node
/// itself, repeating while shallow reductions keep firing. Metered by
/// both the step and the recursion-depth budget.
pub fn deep_reduce(pool: &mut Pool, offset: usize, ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    ctx.charge()?;
    ctx.descend()?;
    let reduced = reduce_node(pool, offset, ctx);
    ctx.ascend();
    reduced
}

fn reduce_node(pool: &mut Pool, offset: usize, ctx: &mut ReduceContext) -> Result<bool, Interrupt> {
    let mut changed = false;
    loop {
        let count = pool.view(offset).number_of_children();
        for index in 0..count {
            let child = pool.view(offset).child(index).offset();
            changed |= deep_reduce(pool, child, ctx)?;
        }
        if propagate_undefined(pool, offset)? {
            return Ok(true);
        }
        let tag = pool.view(offset).tag();
        let shallow = match properties(tag).shallow_reduce {
            Some(shallow) => shallow,
            None => break,
        };
        if shallow(pool, offset, ctx)? {
            changed = true;
        } else {
            break;
        }
    }
    Ok(changed)
}

// -- The escalation protocol ------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOutcome {
    /// The tree at the target offset is the exact reduced form.
    Symbolic,
    /// Symbolic reduction was interrupted; the tree is a numeric
    /// approximation (or `Undefined` when even that has no value).
    Approximated,
}

/// Reduce the tree at `target` according to the strategy. The tree is
/// rewritten in place; its offset stays valid.
pub fn reduce_root(
    pool: &mut Pool,
    target: usize,
    prefs: &Preferences,
) -> Result<ReduceOutcome, PoolError> {
    if prefs.strategy == Strategy::ApproxOnly {
        approximate_in_place(pool, target, prefs)?;
        return Ok(ReduceOutcome::Approximated);
    }
    let original = pool.dump_tree(target);
    let mut ctx = ReduceContext::new(prefs);
    match deep_reduce(pool, target, &mut ctx) {
        Ok(_) => Ok(ReduceOutcome::Symbolic),
        Err(_interrupt) => {
            // Every rewrite is atomic, so whatever stands at `target` is a
            // valid equivalent of the input; it approximates directly, with
            // no headroom needed for a reload
            if prefs.strategy == Strategy::SymbolicThenApprox {
                approximate_in_place(pool, target, prefs)?;
                return Ok(ReduceOutcome::Approximated);
            }
            // Symbolic callers get the input back, best effort: a pool too
            // full to reload it keeps the equivalent partial form
            if pool.dump_tree(target) != original {
                if let Ok(loaded) = pool.load_tree(&original) {
                    pool.replace_tree(target, loaded);
                }
            }
            Ok(ReduceOutcome::Symbolic)
        }
    }
}

fn approximate_in_place(pool: &mut Pool, target: usize, prefs: &Preferences) -> Result<(), PoolError> {
    let ctx = ApproxContext::new(prefs);
    let value = approx::approximate(pool, target, &ctx);
    let projected = ctx.project(value);
    let pushed = if projected.is_nan() {
        pool.push_undefined()?
    } else {
        pool.push_float(projected)?
    };
    pool.replace_tree(target, pushed);
    Ok(())
}

// -- Beautification ---------------------------------------------------------

/// `a + (-b)` reads as `a - b`; the negated term may sit anywhere in the
/// sum, it becomes the subtrahend.
pub fn beautify_add(pool: &mut Pool, offset: usize) -> Result<bool, PoolError> {
    let node = pool.view(offset);
    if node.number_of_children() < 2 {
        return Ok(false);
    }
    let children: Vec<usize> = node.children().map(|c| c.offset()).collect();
    let negated = match children
        .iter()
        .rposition(|&child| pool.view(child).tag() == Type::Opp)
    {
        Some(index) => index,
        None => return Ok(false),
    };
    let operand = pool.view(children[negated]).child(0).offset();
    for (index, child) in children.iter().enumerate() {
        if index != negated {
            pool.clone_tree(*child)?;
        }
    }
    if children.len() > 2 {
        pool.push_add(children.len() - 1)?;
    }
    pool.clone_tree(operand)?;
    let built = pool.push_sub()?;
    pool.replace_tree(offset, built);
    Ok(true)
}

/// `a^(1/2)` reads as `sqrt(a)`.
pub fn beautify_pow(pool: &mut Pool, offset: usize) -> Result<bool, PoolError> {
    let node = pool.view(offset);
    let exponent = node.child(1);
    let is_half = exponent.tag() == Type::Div
        && exponent.child(0).is_integer(1)
        && exponent.child(1).is_integer(2);
    if !is_half {
        return Ok(false);
    }
    let base = node.child(0).offset();
    pool.clone_tree(base)?;
    let built = pool.push_sqrt()?;
    pool.replace_tree(offset, built);
    Ok(true)
}

/// `log(a, e)` reads as `ln(a)`.
pub fn beautify_log(pool: &mut Pool, offset: usize) -> Result<bool, PoolError> {
    let node = pool.view(offset);
    if node.child(1).constant_id() != Some(ConstantId::E) {
        return Ok(false);
    }
    let argument = node.child(0).offset();
    pool.clone_tree(argument)?;
    let built = pool.push_ln()?;
    pool.replace_tree(offset, built);
    Ok(true)
}

/// Rewrite canonical forms back into display forms, bottom-up.
pub fn beautify(pool: &mut Pool, offset: usize) -> Result<(), PoolError> {
    let count = pool.view(offset).number_of_children();
    for index in 0..count {
        let child = pool.view(offset).child(index).offset();
        beautify(pool, child)?;
    }
    let tag = pool.view(offset).tag();
    if let Some(pass) = properties(tag).beautify {
        if pass(pool, offset)? {
            // The replacement may expose another display form here
            beautify(pool, offset)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod specs {
    use super::*;

    fn reduce_all(pool: &mut Pool, offset: usize) -> ReduceOutcome {
        reduce_root(pool, offset, &Preferences::default()).unwrap()
    }

    #[test]
    fn constants_fold() {
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        pool.push_integer(3).unwrap();
        let add = pool.push_add(2).unwrap();
        assert_eq!(reduce_all(&mut pool, add), ReduceOutcome::Symbolic);
        assert!(pool.view(add).is_integer(5));
        assert!(pool.spans_are_dense());
    }

    #[test]
    fn subtraction_goes_through_canonical_form() {
        let mut pool = Pool::new(512);
        pool.push_integer(5).unwrap();
        pool.push_integer(2).unwrap();
        let sub = pool.push_sub().unwrap();
        reduce_all(&mut pool, sub);
        assert!(pool.view(sub).is_integer(3));
    }

    #[test]
    fn sums_flatten_and_drop_zero() {
        // 0 + (1 + x) + 2 -> Add(3, x)
        let mut pool = Pool::new(512);
        pool.push_integer(0).unwrap();
        pool.push_integer(1).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_add(2).unwrap();
        pool.push_integer(2).unwrap();
        let add = pool.push_add(3).unwrap();
        reduce_all(&mut pool, add);
        assert_eq!(pool.view(add).to_string(), "Add(3, x)");
    }

    #[test]
    fn reduction_is_idempotent() {
        // 0 + (1 + x) + 2 settles after one pass; a second pass is a no-op
        let mut pool = Pool::new(512);
        pool.push_integer(0).unwrap();
        pool.push_integer(1).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_add(2).unwrap();
        pool.push_integer(2).unwrap();
        let add = pool.push_add(3).unwrap();
        reduce_all(&mut pool, add);
        let settled = pool.dump_tree(add);
        reduce_all(&mut pool, add);
        assert_eq!(pool.dump_tree(add), settled);
    }

    #[test]
    fn opposite_terms_cancel() {
        // x + 5 + (-x) -> 5
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        pool.push_integer(5).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_opp().unwrap();
        let add = pool.push_add(3).unwrap();
        reduce_all(&mut pool, add);
        assert!(pool.view(add).is_integer(5));
    }

    #[test]
    fn zero_annihilates_products() {
        let mut pool = Pool::new(512);
        pool.push_integer(0).unwrap();
        pool.push_symbol("x").unwrap();
        let mul = pool.push_mul(2).unwrap();
        reduce_all(&mut pool, mul);
        assert!(pool.view(mul).is_integer(0));
    }

    #[test]
    fn unit_factors_disappear() {
        // 1 * x * 3 -> Mul(3, x)
        let mut pool = Pool::new(512);
        pool.push_integer(1).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_integer(3).unwrap();
        let mul = pool.push_mul(3).unwrap();
        reduce_all(&mut pool, mul);
        assert_eq!(pool.view(mul).to_string(), "Mul(3, x)");
    }

    #[test]
    fn double_negation_vanishes() {
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        pool.push_opp().unwrap();
        let opp = pool.push_opp().unwrap();
        reduce_all(&mut pool, opp);
        assert_eq!(pool.view(opp).symbol_name(), Some("x"));
    }

    #[test]
    fn negation_folds_into_integers() {
        let mut pool = Pool::new(512);
        pool.push_integer(7).unwrap();
        let opp = pool.push_opp().unwrap();
        reduce_all(&mut pool, opp);
        assert!(pool.view(opp).is_integer(-7));
    }

    #[test]
    fn division_cases() {
        let mut pool = Pool::new(512);
        pool.push_integer(84).unwrap();
        pool.push_integer(4).unwrap();
        let exact = pool.push_div().unwrap();
        reduce_all(&mut pool, exact);
        assert!(pool.view(exact).is_integer(21));

        pool.push_symbol("x").unwrap();
        pool.push_integer(1).unwrap();
        let by_one = pool.push_div().unwrap();
        reduce_all(&mut pool, by_one);
        assert_eq!(pool.view(by_one).symbol_name(), Some("x"));

        pool.push_integer(3).unwrap();
        pool.push_integer(0).unwrap();
        let by_zero = pool.push_div().unwrap();
        reduce_all(&mut pool, by_zero);
        assert_eq!(pool.view(by_zero).tag(), Type::Undefined);

        pool.push_integer(3).unwrap();
        pool.push_integer(7).unwrap();
        let inexact = pool.push_div().unwrap();
        reduce_all(&mut pool, inexact);
        assert_eq!(pool.view(inexact).to_string(), "Div(3, 7)");
    }

    #[test]
    fn power_cases() {
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        pool.push_integer(10).unwrap();
        let pow = pool.push_pow().unwrap();
        reduce_all(&mut pool, pow);
        assert!(pool.view(pow).is_integer(1024));

        pool.push_symbol("x").unwrap();
        pool.push_integer(0).unwrap();
        let to_zero = pool.push_pow().unwrap();
        reduce_all(&mut pool, to_zero);
        assert!(pool.view(to_zero).is_integer(1));

        pool.push_symbol("x").unwrap();
        pool.push_integer(1).unwrap();
        let to_one = pool.push_pow().unwrap();
        reduce_all(&mut pool, to_one);
        assert_eq!(pool.view(to_one).symbol_name(), Some("x"));

        pool.push_integer(0).unwrap();
        pool.push_integer(0).unwrap();
        let zero_zero = pool.push_pow().unwrap();
        reduce_all(&mut pool, zero_zero);
        assert_eq!(pool.view(zero_zero).tag(), Type::Undefined);
    }

    #[test]
    fn undefined_poisons_scalar_operators() {
        // x + 1/0 -> undef
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        pool.push_integer(1).unwrap();
        pool.push_integer(0).unwrap();
        pool.push_div().unwrap();
        let add = pool.push_add(2).unwrap();
        reduce_all(&mut pool, add);
        assert_eq!(pool.view(add).tag(), Type::Undefined);
    }

    #[test]
    fn log_identities() {
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        pool.push_symbol("x").unwrap();
        let own_base = pool.push_log().unwrap();
        reduce_all(&mut pool, own_base);
        assert!(pool.view(own_base).is_integer(1));

        pool.push_integer(1).unwrap();
        pool.push_symbol("b").unwrap();
        let of_one = pool.push_log().unwrap();
        reduce_all(&mut pool, of_one);
        assert!(pool.view(of_one).is_integer(0));
    }

    #[test]
    fn sqrt_of_perfect_square() {
        let mut pool = Pool::new(512);
        pool.push_integer(49).unwrap();
        let sqrt = pool.push_sqrt().unwrap();
        reduce_all(&mut pool, sqrt);
        assert!(pool.view(sqrt).is_integer(7));
    }

    #[test]
    fn sqrt_handles_integers_near_the_i64_limit() {
        let mut pool = Pool::new(512);
        // 3037000499^2, the largest perfect square in i64
        pool.push_integer(9223372024852035001).unwrap();
        let square = pool.push_sqrt().unwrap();
        reduce_all(&mut pool, square);
        assert!(pool.view(square).is_integer(3037000499));

        pool.push_integer(i64::MAX).unwrap();
        let not_square = pool.push_sqrt().unwrap();
        reduce_all(&mut pool, not_square);
        assert_eq!(pool.view(not_square).tag(), Type::Pow);
    }

    #[test]
    fn sqrt_canonicalizes_and_beautifies_back() {
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        let sqrt = pool.push_sqrt().unwrap();
        reduce_all(&mut pool, sqrt);
        assert_eq!(pool.view(sqrt).to_string(), "Pow(x, Div(1, 2))");
        beautify(&mut pool, sqrt).unwrap();
        assert_eq!(pool.view(sqrt).to_string(), "Sqrt(x)");
    }

    #[test]
    fn ln_canonicalizes_and_beautifies_back() {
        let mut pool = Pool::new(512);
        pool.push_integer(7).unwrap();
        let ln = pool.push_ln().unwrap();
        reduce_all(&mut pool, ln);
        assert_eq!(pool.view(ln).to_string(), "Log(7, e)");
        beautify(&mut pool, ln).unwrap();
        assert_eq!(pool.view(ln).to_string(), "Ln(7)");
    }

    #[test]
    fn leading_opposite_cancels() {
        // (-x) + x + 7 -> 7
        let mut pool = Pool::new(1024);
        pool.push_symbol("x").unwrap();
        pool.push_opp().unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_integer(7).unwrap();
        let add = pool.push_add(3).unwrap();
        reduce_all(&mut pool, add);
        assert!(pool.view(add).is_integer(7));
    }

    #[test]
    fn trailing_opposite_beautifies_to_sub() {
        // Reduce keeps Add(x, Opp(y)); display shows x - y
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        pool.push_symbol("y").unwrap();
        let sub = pool.push_sub().unwrap();
        reduce_all(&mut pool, sub);
        assert_eq!(pool.view(sub).to_string(), "Add(x, Opp(y))");
        beautify(&mut pool, sub).unwrap();
        assert_eq!(pool.view(sub).to_string(), "Sub(x, y)");
    }

    #[test]
    fn leading_opposite_beautifies_to_sub() {
        // Add(Opp(y), x) displays as x - y
        let mut pool = Pool::new(512);
        pool.push_symbol("y").unwrap();
        pool.push_opp().unwrap();
        pool.push_symbol("x").unwrap();
        let add = pool.push_add(2).unwrap();
        beautify(&mut pool, add).unwrap();
        assert_eq!(pool.view(add).to_string(), "Sub(x, y)");
        assert!(pool.spans_are_dense());
    }

    #[test]
    fn integer_overflow_escalates_to_float() {
        // 2^500 does not fit the digit cap
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        pool.push_integer(500).unwrap();
        let pow = pool.push_pow().unwrap();
        let outcome = reduce_all(&mut pool, pow);
        assert_eq!(outcome, ReduceOutcome::Approximated);
        let value = pool.view(pow).as_float().unwrap();
        assert!((value - (2.0f64).powi(500)).abs() / value < 1e-12);
    }

    #[test]
    fn arena_exhaustion_escalates_to_float() {
        // Too tight for rule scaffolding, roomy enough for a float
        let mut pool = Pool::new(28);
        pool.push_integer(10).unwrap();
        pool.push_integer(2).unwrap();
        let sub = pool.push_sub().unwrap();
        let outcome = reduce_all(&mut pool, sub);
        assert_eq!(outcome, ReduceOutcome::Approximated);
        assert_eq!(pool.view(sub).as_float(), Some(8.0));
        assert!(pool.spans_are_dense());
    }

    #[test]
    fn interrupt_after_partial_rewrites_still_approximates() {
        // Sqrt(2) canonicalizes before 2^500 overflows; the partially
        // rewritten sum approximates as it stands, no reload needed
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        pool.push_sqrt().unwrap();
        pool.push_integer(2).unwrap();
        pool.push_integer(500).unwrap();
        pool.push_pow().unwrap();
        let add = pool.push_add(2).unwrap();
        let outcome = reduce_all(&mut pool, add);
        assert_eq!(outcome, ReduceOutcome::Approximated);
        assert_eq!(pool.view(add).as_float(), Some(2.0f64.powi(500)));
        assert!(pool.spans_are_dense());
    }

    #[test]
    fn symbolic_strategy_never_downgrades() {
        let mut prefs = Preferences::default();
        prefs.strategy = Strategy::Symbolic;
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        pool.push_integer(500).unwrap();
        let pow = pool.push_pow().unwrap();
        let outcome = reduce_root(&mut pool, pow, &prefs).unwrap();
        assert_eq!(outcome, ReduceOutcome::Symbolic);
        // The input survives untouched
        assert_eq!(pool.view(pow).to_string(), "Pow(2, 500)");
    }

    #[test]
    fn budget_exhaustion_escalates() {
        let mut prefs = Preferences::default();
        prefs.budgets.reduction_steps = 2;
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        pool.push_integer(3).unwrap();
        pool.push_add(2).unwrap();
        pool.push_integer(4).unwrap();
        let add = pool.push_add(2).unwrap();
        let outcome = reduce_root(&mut pool, add, &prefs).unwrap();
        assert_eq!(outcome, ReduceOutcome::Approximated);
        assert_eq!(pool.view(add).as_float(), Some(9.0));
    }

    #[test]
    fn depth_budget_escalates_deep_nests() {
        let mut prefs = Preferences::default();
        prefs.budgets.recursion_depth = 4;
        let mut pool = Pool::new(512);
        pool.push_integer(2).unwrap();
        let mut opp = 0;
        for _ in 0..8 {
            opp = pool.push_opp().unwrap();
        }
        let outcome = reduce_root(&mut pool, opp, &prefs).unwrap();
        assert_eq!(outcome, ReduceOutcome::Approximated);
        assert_eq!(pool.view(opp).as_float(), Some(2.0));
    }

    #[test]
    fn approx_only_strategy_skips_symbolics() {
        let mut prefs = Preferences::default();
        prefs.strategy = Strategy::ApproxOnly;
        let mut pool = Pool::new(512);
        pool.push_integer(1).unwrap();
        pool.push_integer(3).unwrap();
        let div = pool.push_div().unwrap();
        let outcome = reduce_root(&mut pool, div, &prefs).unwrap();
        assert_eq!(outcome, ReduceOutcome::Approximated);
        let value = pool.view(div).as_float().unwrap();
        assert!((value - 1.0 / 3.0).abs() < 1e-15);
    }
}
