//! Per-tag behavior without per-instance vtables.
//!
//! Nodes are raw bytes, so polymorphism goes through a flat table indexed
//! by the tag byte. Adding a node kind means one [`Type`] variant and one
//! row here; no existing node changes its physical layout.

use crate::approx::{self, ApproxContext, Complex};
use crate::block::Type;
use crate::node::Node;
use crate::pool::{Pool, PoolError};
use crate::reduce::{self, Interrupt, ReduceContext};

/// Child-count discipline of a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Leaf,
    Fixed(u8),
    /// Child count stored in the first value block.
    NAry,
    /// Rows and columns stored in the first two value blocks.
    Grid,
}

pub type NodeSizeFn = fn(node_blocks: &[u8]) -> usize;
pub type ChildCountFn = fn(node_blocks: &[u8]) -> usize;
pub type ApproxFn = fn(node: Node, children: &[Complex], ctx: &ApproxContext) -> Complex;
pub type ReduceFn = fn(pool: &mut Pool, offset: usize, ctx: &mut ReduceContext) -> Result<bool, Interrupt>;
pub type BeautifyFn = fn(pool: &mut Pool, offset: usize) -> Result<bool, PoolError>;

pub struct Properties {
    pub name: &'static str,
    pub arity: Arity,
    pub node_size: NodeSizeFn,
    pub number_of_children: ChildCountFn,
    pub approximate: ApproxFn,
    /// Simplification of a single node whose children are already reduced.
    pub shallow_reduce: Option<ReduceFn>,
    /// Display-oriented rewrite, applied only by the beautify pass.
    pub beautify: Option<BeautifyFn>,
}

fn size_one(_blocks: &[u8]) -> usize {
    1
}

fn size_float(_blocks: &[u8]) -> usize {
    1 + std::mem::size_of::<f64>()
}

fn size_constant(_blocks: &[u8]) -> usize {
    2
}

fn size_nary(_blocks: &[u8]) -> usize {
    3
}

fn size_grid(_blocks: &[u8]) -> usize {
    3
}

fn size_placeholder(_blocks: &[u8]) -> usize {
    3
}

// [INT][LEN][SIGN][digits...][LEN][INT]
fn size_integer(blocks: &[u8]) -> usize {
    5 + blocks[1] as usize
}

// [SYM][LEN][bytes...][LEN][SYM]
fn size_symbol(blocks: &[u8]) -> usize {
    4 + blocks[1] as usize
}

fn children_none(_blocks: &[u8]) -> usize {
    0
}

fn children_one(_blocks: &[u8]) -> usize {
    1
}

fn children_two(_blocks: &[u8]) -> usize {
    2
}

fn children_nary(blocks: &[u8]) -> usize {
    blocks[1] as usize
}

fn children_grid(blocks: &[u8]) -> usize {
    blocks[1] as usize * blocks[2] as usize
}

// Order has to be the same as Type
pub static PROPERTIES: [Properties; Type::COUNT] = [
    Properties {
        name: "Integer",
        arity: Arity::Leaf,
        node_size: size_integer,
        number_of_children: children_none,
        approximate: approx::approx_integer,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Float",
        arity: Arity::Leaf,
        node_size: size_float,
        number_of_children: children_none,
        approximate: approx::approx_float,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Constant",
        arity: Arity::Leaf,
        node_size: size_constant,
        number_of_children: children_none,
        approximate: approx::approx_constant,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Symbol",
        arity: Arity::Leaf,
        node_size: size_symbol,
        number_of_children: children_none,
        approximate: approx::approx_symbol,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Undefined",
        arity: Arity::Leaf,
        node_size: size_one,
        number_of_children: children_none,
        approximate: approx::approx_undefined,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Add",
        arity: Arity::NAry,
        node_size: size_nary,
        number_of_children: children_nary,
        approximate: approx::approx_add,
        shallow_reduce: Some(reduce::shallow_add),
        beautify: Some(reduce::beautify_add),
    },
    Properties {
        name: "Mul",
        arity: Arity::NAry,
        node_size: size_nary,
        number_of_children: children_nary,
        approximate: approx::approx_mul,
        shallow_reduce: Some(reduce::shallow_mul),
        beautify: None,
    },
    Properties {
        name: "Sub",
        arity: Arity::Fixed(2),
        node_size: size_one,
        number_of_children: children_two,
        approximate: approx::approx_sub,
        shallow_reduce: Some(reduce::shallow_sub),
        beautify: None,
    },
    Properties {
        name: "Div",
        arity: Arity::Fixed(2),
        node_size: size_one,
        number_of_children: children_two,
        approximate: approx::approx_div,
        shallow_reduce: Some(reduce::shallow_div),
        beautify: None,
    },
    Properties {
        name: "Pow",
        arity: Arity::Fixed(2),
        node_size: size_one,
        number_of_children: children_two,
        approximate: approx::approx_pow,
        shallow_reduce: Some(reduce::shallow_pow),
        beautify: Some(reduce::beautify_pow),
    },
    Properties {
        name: "Opp",
        arity: Arity::Fixed(1),
        node_size: size_one,
        number_of_children: children_one,
        approximate: approx::approx_opp,
        shallow_reduce: Some(reduce::shallow_opp),
        beautify: None,
    },
    Properties {
        name: "Sqrt",
        arity: Arity::Fixed(1),
        node_size: size_one,
        number_of_children: children_one,
        approximate: approx::approx_sqrt,
        shallow_reduce: Some(reduce::shallow_sqrt),
        beautify: None,
    },
    Properties {
        name: "Log",
        arity: Arity::Fixed(2),
        node_size: size_one,
        number_of_children: children_two,
        approximate: approx::approx_log,
        shallow_reduce: Some(reduce::shallow_log),
        beautify: Some(reduce::beautify_log),
    },
    Properties {
        name: "Ln",
        arity: Arity::Fixed(1),
        node_size: size_one,
        number_of_children: children_one,
        approximate: approx::approx_ln,
        shallow_reduce: Some(reduce::shallow_ln),
        beautify: None,
    },
    Properties {
        name: "Sin",
        arity: Arity::Fixed(1),
        node_size: size_one,
        number_of_children: children_one,
        approximate: approx::approx_sin,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Cos",
        arity: Arity::Fixed(1),
        node_size: size_one,
        number_of_children: children_one,
        approximate: approx::approx_cos,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "List",
        arity: Arity::NAry,
        node_size: size_nary,
        number_of_children: children_nary,
        approximate: approx::approx_opaque,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Matrix",
        arity: Arity::Grid,
        node_size: size_grid,
        number_of_children: children_grid,
        approximate: approx::approx_opaque,
        shallow_reduce: None,
        beautify: None,
    },
    Properties {
        name: "Placeholder",
        arity: Arity::Leaf,
        node_size: size_placeholder,
        number_of_children: children_none,
        approximate: approx::approx_opaque,
        shallow_reduce: None,
        beautify: None,
    },
];

#[inline]
pub fn properties(tag: Type) -> &'static Properties {
    &PROPERTIES[tag as usize]
}

#[cfg(test)]
mod specs {
    use super::*;

    #[test]
    fn table_is_aligned_with_tags() {
        assert_eq!(PROPERTIES.len(), Type::COUNT);
        assert_eq!(properties(Type::Integer).name, "Integer");
        assert_eq!(properties(Type::Pow).name, "Pow");
        assert_eq!(properties(Type::Placeholder).name, "Placeholder");
    }

    #[test]
    fn fixed_arities_need_no_stored_count() {
        assert_eq!((properties(Type::Pow).node_size)(&[Type::Pow.block()]), 1);
        assert_eq!(
            (properties(Type::Pow).number_of_children)(&[Type::Pow.block()]),
            2
        );
        assert_eq!(
            (properties(Type::Opp).number_of_children)(&[Type::Opp.block()]),
            1
        );
    }

    #[test]
    fn variable_sizes_come_from_metadata() {
        let int_blocks = [Type::Integer.block(), 3, 0, 1, 2, 3, 3, Type::Integer.block()];
        assert_eq!((properties(Type::Integer).node_size)(&int_blocks), 8);
        let add_blocks = [Type::Add.block(), 4, Type::Add.block()];
        assert_eq!((properties(Type::Add).node_size)(&add_blocks), 3);
        assert_eq!((properties(Type::Add).number_of_children)(&add_blocks), 4);
        let grid = [Type::Matrix.block(), 2, 3];
        assert_eq!((properties(Type::Matrix).number_of_children)(&grid), 6);
    }
}
