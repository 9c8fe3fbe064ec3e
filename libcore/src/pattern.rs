//! Structural pattern matching and rewriting.
//!
//! Patterns are ordinary trees containing placeholder nodes (`KA` to
//! `KH`). Matching walks pattern and target in lockstep; a placeholder
//! binds the subtree (or, under an n-ary node, the run of sibling
//! subtrees) it faces, and a placeholder seen twice only matches
//! byte-identical structure. Variadic placeholders search shortest run
//! first and grow on backtracking.
//!
//! A [`Rule`] pairs a pattern builder with a replacement builder. Applying
//! one is atomic: the scaffolding trees are pushed above the target,
//! matched, the replacement is materialized from the bindings, spliced
//! over the target, and the scaffolding is dropped. On mismatch or
//! overflow the pool is unwound and the target is untouched.

use crate::block::PlaceholderTag;
use crate::pool::{Pool, PoolError};
use crate::properties::Arity;

/// A run of `count` consecutive sibling trees starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub offset: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Bindings {
    slots: [Option<Binding>; PlaceholderTag::COUNT],
}

impl Bindings {
    pub fn get(&self, tag: PlaceholderTag) -> Option<Binding> {
        self.slots[tag as usize]
    }

    fn set(&mut self, tag: PlaceholderTag, binding: Binding) {
        self.slots[tag as usize] = Some(binding);
    }
}

/// Match `pattern` against `target`, both trees in `pool`. Returns the
/// placeholder bindings of the first match found, `None` otherwise.
pub fn matches(pool: &Pool, pattern: usize, target: usize) -> Option<Bindings> {
    let mut bindings = Bindings::default();
    if matches_tree(pool, pattern, target, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn matches_tree(pool: &Pool, pattern: usize, target: usize, bindings: &mut Bindings) -> bool {
    let p = pool.view(pattern);
    if let Some((tag, _)) = p.placeholder() {
        // In a single-tree position every filter binds exactly one tree
        return bind_run(pool, tag, target, 1, bindings);
    }
    let t = pool.view(target);
    if p.tag() != t.tag() {
        return false;
    }
    match p.properties().arity {
        Arity::Leaf => p.is_identical_to(t),
        Arity::Fixed(_) => {
            let pattern_children: Vec<usize> = p.children().map(|c| c.offset()).collect();
            let target_children: Vec<usize> = t.children().map(|c| c.offset()).collect();
            pattern_children
                .iter()
                .zip(target_children.iter())
                .all(|(pc, tc)| matches_tree(pool, *pc, *tc, bindings))
        }
        Arity::Grid => {
            if p.matrix_dimensions() != t.matrix_dimensions() {
                return false;
            }
            let pattern_children: Vec<usize> = p.children().map(|c| c.offset()).collect();
            let target_children: Vec<usize> = t.children().map(|c| c.offset()).collect();
            pattern_children
                .iter()
                .zip(target_children.iter())
                .all(|(pc, tc)| matches_tree(pool, *pc, *tc, bindings))
        }
        Arity::NAry => {
            let pattern_children: Vec<usize> = p.children().map(|c| c.offset()).collect();
            let target_children: Vec<usize> = t.children().map(|c| c.offset()).collect();
            match_sequence(pool, &pattern_children, &target_children, bindings)
        }
    }
}

/// Match a sequence of pattern children against a sequence of target
/// children, letting variadic placeholders absorb runs. Choice points
/// snapshot the bindings, so backtracking is a copy.
fn match_sequence(
    pool: &Pool,
    pattern: &[usize],
    targets: &[usize],
    bindings: &mut Bindings,
) -> bool {
    let head = match pattern.first() {
        Some(head) => *head,
        None => return targets.is_empty(),
    };
    if let Some((tag, filter)) = pool.view(head).placeholder() {
        if let Some(bound) = bindings.get(tag) {
            // Already bound: the same run must reappear here
            if targets.len() < bound.count {
                return false;
            }
            let start = targets.first().copied().unwrap_or(0);
            if !runs_equal(pool, bound, Binding { offset: start, count: bound.count }) {
                return false;
            }
            return match_sequence(pool, &pattern[1..], &targets[bound.count..], bindings);
        }
        // Shortest run first, growing on failure of the rest
        for count in filter.minimum_trees()..=targets.len() {
            let saved = *bindings;
            let offset = targets.first().copied().unwrap_or(0);
            bindings.set(tag, Binding { offset, count });
            if match_sequence(pool, &pattern[1..], &targets[count..], bindings) {
                return true;
            }
            *bindings = saved;
        }
        return false;
    }
    let target = match targets.first() {
        Some(target) => *target,
        None => return false,
    };
    let saved = *bindings;
    if matches_tree(pool, head, target, bindings)
        && match_sequence(pool, &pattern[1..], &targets[1..], bindings)
    {
        return true;
    }
    *bindings = saved;
    false
}

fn run_blocks(pool: &Pool, binding: Binding) -> usize {
    let mut offset = binding.offset;
    for _ in 0..binding.count {
        offset += pool.view(offset).tree_size();
    }
    offset - binding.offset
}

fn runs_equal(pool: &Pool, a: Binding, b: Binding) -> bool {
    if a.count != b.count {
        return false;
    }
    let a_len = run_blocks(pool, a);
    let b_len = run_blocks(pool, b);
    pool.blocks()[a.offset..a.offset + a_len] == pool.blocks()[b.offset..b.offset + b_len]
}

/// Bind `tag` to the run of `count` trees at `offset`. A tag seen before
/// only accepts a byte-identical run.
fn bind_run(
    pool: &Pool,
    tag: PlaceholderTag,
    offset: usize,
    count: usize,
    bindings: &mut Bindings,
) -> bool {
    let run = Binding { offset, count };
    match bindings.get(tag) {
        Some(bound) => runs_equal(pool, bound, run),
        None => {
            bindings.set(tag, run);
            true
        }
    }
}

/// Materialize `template` at the pool cursor, substituting bound runs for
/// placeholders. Returns the offset of the built tree.
pub fn build(pool: &mut Pool, template: usize, bindings: &Bindings) -> Result<usize, PoolError> {
    let offset = pool.size();
    let pushed = build_tree(pool, template, bindings)?;
    debug_assert_eq!(pushed, 1, "template must build exactly one tree");
    Ok(offset)
}

fn build_tree(pool: &mut Pool, template: usize, bindings: &Bindings) -> Result<usize, PoolError> {
    let view = pool.view(template);
    let tag = view.tag();
    if let Some((name, _)) = view.placeholder() {
        let binding = match bindings.get(name) {
            Some(binding) => binding,
            None => {
                debug_assert!(false, "unbound placeholder in a template");
                pool.push_undefined()?;
                return Ok(1);
            }
        };
        let mut offset = binding.offset;
        for _ in 0..binding.count {
            let len = pool.view(offset).tree_size();
            pool.clone_tree(offset)?;
            offset += len;
        }
        return Ok(binding.count);
    }
    match view.properties().arity {
        Arity::Leaf => {
            pool.clone_tree(template)?;
            Ok(1)
        }
        arity => {
            let dimensions = view.matrix_dimensions();
            let children: Vec<usize> = view.children().map(|c| c.offset()).collect();
            let mut total = 0;
            for child in children {
                total += build_tree(pool, child, bindings)?;
            }
            match arity {
                Arity::NAry => {
                    pool.push_nary(tag, total)?;
                }
                Arity::Grid => {
                    let (rows, cols) = dimensions.unwrap_or((0, 0));
                    debug_assert_eq!(total, rows * cols);
                    pool.push_matrix(rows, cols)?;
                }
                _ => {
                    pool.push_fixed(tag)?;
                }
            }
            Ok(1)
        }
    }
}

/// A rewrite rule: two tree builders, pattern and replacement. Builders
/// rather than stored trees, so a rule is a `'static` value and its
/// scaffolding only occupies the pool while it is being applied.
pub struct Rule {
    pub name: &'static str,
    pub pattern: fn(&mut Pool) -> Result<usize, PoolError>,
    pub replacement: fn(&mut Pool) -> Result<usize, PoolError>,
}

/// Try `rule` once on the tree at `target`. `Ok(true)` when the target
/// was rewritten in place.
pub fn apply_rule(pool: &mut Pool, target: usize, rule: &Rule) -> Result<bool, PoolError> {
    let checkpoint = pool.checkpoint();
    let outcome = apply_rule_impl(pool, target, rule, checkpoint);
    if outcome.is_err() {
        pool.unwind(checkpoint);
    }
    outcome
}

fn apply_rule_impl(
    pool: &mut Pool,
    target: usize,
    rule: &Rule,
    checkpoint: crate::pool::Checkpoint,
) -> Result<bool, PoolError> {
    let pattern = (rule.pattern)(pool)?;
    let bindings = match matches(pool, pattern, target) {
        Some(bindings) => bindings,
        None => {
            pool.unwind(checkpoint);
            return Ok(false);
        }
    };
    let template = (rule.replacement)(pool)?;
    let built = build(pool, template, &bindings)?;
    pool.replace_tree(target, built);
    // The pattern and template are now the two newest trees; drop them
    for _ in 0..2 {
        if let Some(top) = pool.last_tree() {
            pool.remove_tree(top);
        }
    }
    debug_assert!(pool.spans_are_dense());
    Ok(true)
}

/// Apply `rule` at `target` until it stops matching, at most `budget`
/// times. Returns the number of rewrites performed.
pub fn apply_until_stable(
    pool: &mut Pool,
    target: usize,
    rule: &Rule,
    budget: usize,
) -> Result<usize, PoolError> {
    let mut applied = 0;
    while applied < budget && apply_rule(pool, target, rule)? {
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod specs {
    use super::*;
    use crate::block::Filter;

    fn push_pair_pattern(pool: &mut Pool) -> Result<usize, PoolError> {
        // Add(KA, KA)
        pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
        pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
        pool.push_add(2)
    }

    #[test]
    fn repeated_placeholder_needs_identical_trees() {
        let mut pool = Pool::new(512);
        let pattern = push_pair_pattern(&mut pool).unwrap();
        pool.push_integer(2).unwrap();
        pool.push_integer(2).unwrap();
        let same = pool.push_add(2).unwrap();
        pool.push_integer(2).unwrap();
        pool.push_integer(3).unwrap();
        let different = pool.push_add(2).unwrap();

        let bindings = matches(&pool, pattern, same).unwrap();
        assert_eq!(bindings.get(PlaceholderTag::A).unwrap().count, 1);
        assert!(matches(&pool, pattern, different).is_none());
    }

    #[test]
    fn variadic_binding_is_shortest_first() {
        let mut pool = Pool::new(512);
        // Add(KA+, KB+)
        pool.push_placeholder(PlaceholderTag::A, Filter::OneOrMore)
            .unwrap();
        pool.push_placeholder(PlaceholderTag::B, Filter::OneOrMore)
            .unwrap();
        let pattern = pool.push_add(2).unwrap();
        pool.push_integer(1).unwrap();
        pool.push_integer(2).unwrap();
        pool.push_integer(3).unwrap();
        let target = pool.push_add(3).unwrap();

        let bindings = matches(&pool, pattern, target).unwrap();
        assert_eq!(bindings.get(PlaceholderTag::A).unwrap().count, 1);
        assert_eq!(bindings.get(PlaceholderTag::B).unwrap().count, 2);
    }

    #[test]
    fn zero_or_more_accepts_an_empty_run() {
        let mut pool = Pool::new(512);
        // Add(KA*, 7, KB*)
        pool.push_placeholder(PlaceholderTag::A, Filter::ZeroOrMore)
            .unwrap();
        pool.push_integer(7).unwrap();
        pool.push_placeholder(PlaceholderTag::B, Filter::ZeroOrMore)
            .unwrap();
        let pattern = pool.push_add(3).unwrap();
        pool.push_integer(7).unwrap();
        pool.push_integer(9).unwrap();
        let target = pool.push_add(2).unwrap();

        let bindings = matches(&pool, pattern, target).unwrap();
        assert_eq!(bindings.get(PlaceholderTag::A).unwrap().count, 0);
        assert_eq!(bindings.get(PlaceholderTag::B).unwrap().count, 1);
    }

    #[test]
    fn repeated_placeholder_descends_into_fixed_arity() {
        let mut pool = Pool::new(512);
        // Div(KA, KA)
        pool.push_placeholder(PlaceholderTag::A, Filter::One)
            .unwrap();
        pool.push_placeholder(PlaceholderTag::A, Filter::One)
            .unwrap();
        let pattern = pool.push_div().unwrap();
        pool.push_integer(6).unwrap();
        pool.push_integer(6).unwrap();
        let same = pool.push_div().unwrap();
        pool.push_integer(6).unwrap();
        pool.push_integer(7).unwrap();
        let different = pool.push_div().unwrap();

        let bindings = matches(&pool, pattern, same).unwrap();
        let bound = bindings.get(PlaceholderTag::A).unwrap();
        assert_eq!(bound.offset, pool.view(same).child(0).offset());
        assert_eq!(bound.count, 1);
        assert!(matches(&pool, pattern, different).is_none());
    }

    #[test]
    fn fixed_arity_matches_descend() {
        let mut pool = Pool::new(512);
        // Pow(KA, 2)
        pool.push_placeholder(PlaceholderTag::A, Filter::One)
            .unwrap();
        pool.push_integer(2).unwrap();
        let pattern = pool.push_pow().unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_integer(2).unwrap();
        let square = pool.push_pow().unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_integer(3).unwrap();
        let cube = pool.push_pow().unwrap();

        assert!(matches(&pool, pattern, square).is_some());
        assert!(matches(&pool, pattern, cube).is_none());
    }

    #[test]
    fn build_from_match_reproduces_the_target() {
        let mut pool = Pool::new(512);
        // Add(KA, KB+)
        pool.push_placeholder(PlaceholderTag::A, Filter::One)
            .unwrap();
        pool.push_placeholder(PlaceholderTag::B, Filter::OneOrMore)
            .unwrap();
        let pattern = pool.push_add(2).unwrap();
        pool.push_integer(5).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_integer(2).unwrap();
        pool.push_pow().unwrap();
        pool.push_integer(7).unwrap();
        let target = pool.push_add(3).unwrap();

        let bindings = matches(&pool, pattern, target).unwrap();
        let rebuilt = build(&mut pool, pattern, &bindings).unwrap();
        assert!(pool.view(rebuilt).is_identical_to(pool.view(target)));
    }

    #[test]
    fn rule_rewrites_in_place() {
        // Log(KA, KA) -> 1
        let rule = Rule {
            name: "log of own base",
            pattern: |pool| {
                pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
                pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
                pool.push_log()
            },
            replacement: |pool| pool.push_integer(1),
        };
        let mut pool = Pool::new(512);
        pool.push_symbol("x").unwrap();
        pool.push_symbol("x").unwrap();
        let target = pool.push_log().unwrap();
        let roots_before = pool.roots().len();

        assert!(apply_rule(&mut pool, target, &rule).unwrap());
        assert!(pool.view(target).is_integer(1));
        assert_eq!(pool.roots().len(), roots_before);
        assert!(pool.spans_are_dense());

        // A second application no longer matches
        assert!(!apply_rule(&mut pool, target, &rule).unwrap());
    }

    #[test]
    fn rule_cancels_opposite_pair_inside_nary() {
        // Add(KA*, KB, KC*, Opp(KB), KD*) -> Add(KA*, KC*, KD*)
        let rule = Rule {
            name: "cancel opposite terms",
            pattern: |pool| {
                pool.push_placeholder(PlaceholderTag::A, Filter::ZeroOrMore)?;
                pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
                pool.push_placeholder(PlaceholderTag::C, Filter::ZeroOrMore)?;
                pool.push_placeholder(PlaceholderTag::B, Filter::One)?;
                pool.push_opp()?;
                pool.push_placeholder(PlaceholderTag::D, Filter::ZeroOrMore)?;
                pool.push_add(5)
            },
            replacement: |pool| {
                pool.push_placeholder(PlaceholderTag::A, Filter::ZeroOrMore)?;
                pool.push_placeholder(PlaceholderTag::C, Filter::ZeroOrMore)?;
                pool.push_placeholder(PlaceholderTag::D, Filter::ZeroOrMore)?;
                pool.push_add(3)
            },
        };
        let mut pool = Pool::new(1024);
        // Add(1, x, Opp(x), 2)
        pool.push_integer(1).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_opp().unwrap();
        pool.push_integer(2).unwrap();
        let target = pool.push_add(4).unwrap();

        assert!(apply_rule(&mut pool, target, &rule).unwrap());
        assert_eq!(pool.view(target).to_string(), "Add(1, 2)");
        assert!(pool.spans_are_dense());
    }

    #[test]
    fn failed_match_leaves_the_pool_unchanged() {
        let rule = Rule {
            name: "never matches here",
            pattern: |pool| {
                pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
                pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
                pool.push_log()
            },
            replacement: |pool| pool.push_integer(1),
        };
        let mut pool = Pool::new(512);
        pool.push_integer(4).unwrap();
        let target = *pool.roots().last().unwrap();
        let size_before = pool.size();
        assert!(!apply_rule(&mut pool, target, &rule).unwrap());
        assert_eq!(pool.size(), size_before);
    }

    #[test]
    fn overflow_during_a_rule_is_atomic() {
        let rule = Rule {
            name: "big replacement",
            pattern: |pool| pool.push_placeholder(PlaceholderTag::A, Filter::One),
            replacement: |pool| {
                for _ in 0..8 {
                    pool.push_placeholder(PlaceholderTag::A, Filter::One)?;
                }
                pool.push_add(8)
            },
        };
        // Tight pool: matching succeeds, materializing overflows
        let mut pool = Pool::new(40);
        pool.push_integer(5).unwrap();
        let target = *pool.roots().last().unwrap();
        let size_before = pool.size();
        assert!(apply_rule(&mut pool, target, &rule).is_err());
        assert_eq!(pool.size(), size_before);
        assert!(pool.view(target).is_integer(5));
    }
}
