//! Read-only views over nodes in a pool.
//!
//! A [`Node`] is an offset plus a borrow of the pool. It stays cheap to
//! copy and impossible to hold across a mutation: any `&mut Pool` call
//! ends the borrow, which is exactly when block motion could have moved
//! the node. Long-lived handles go through [`crate::tree_ref`] instead.

use crate::block::{ConstantId, Filter, PlaceholderTag, Type};
use crate::integer::BigInt;
use crate::pool::Pool;
use crate::properties::{properties, Properties};

#[derive(Clone, Copy)]
pub struct Node<'a> {
    pool: &'a Pool,
    offset: usize,
}

impl<'a> Node<'a> {
    pub(crate) fn new(pool: &'a Pool, offset: usize) -> Node<'a> {
        Node { pool, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn blocks(&self) -> &'a [u8] {
        &self.pool.blocks()[self.offset..]
    }

    pub fn tag(&self) -> Type {
        // The pool only ever stores valid tag blocks
        Type::from_block(self.blocks()[0]).unwrap_or(Type::Undefined)
    }

    pub fn properties(&self) -> &'static Properties {
        properties(self.tag())
    }

    pub fn node_size(&self) -> usize {
        (self.properties().node_size)(self.blocks())
    }

    pub fn number_of_children(&self) -> usize {
        (self.properties().number_of_children)(self.blocks())
    }

    // -- Navigation -------------------------------------------------------

    /// The node right after this one in depth-first order: the first child
    /// if there is one, the next sibling otherwise.
    pub fn next_node(&self) -> Node<'a> {
        Node::new(self.pool, self.offset + self.node_size())
    }

    /// The first node past this whole subtree.
    pub fn next_tree(&self) -> Node<'a> {
        let mut remaining = 1usize;
        let mut node = *self;
        while remaining > 0 {
            remaining += node.number_of_children();
            remaining -= 1;
            node = node.next_node();
        }
        node
    }

    /// Number of blocks of the subtree rooted here: the node's own blocks
    /// plus those of every descendant.
    pub fn tree_size(&self) -> usize {
        self.next_tree().offset - self.offset
    }

    pub fn child(&self, index: usize) -> Node<'a> {
        debug_assert!(index < self.number_of_children());
        let mut child = self.next_node();
        for _ in 0..index {
            child = child.next_tree();
        }
        child
    }

    pub fn children(&self) -> Children<'a> {
        Children {
            next: self.next_node(),
            remaining: self.number_of_children(),
        }
    }

    /// Every node of the subtree, in depth-first order, the root included.
    pub fn descendants(&self) -> Descendants<'a> {
        Descendants {
            pool: self.pool,
            next: self.offset,
            end: self.offset + self.tree_size(),
        }
    }

    /// The parent node, found by walking down from the containing
    /// top-level tree. `None` for a top-level tree itself.
    pub fn parent(&self) -> Option<Node<'a>> {
        let root = self
            .pool
            .roots()
            .iter()
            .copied()
            .filter(|root| *root <= self.offset)
            .last()?;
        let mut parent = None;
        let mut candidate = Node::new(self.pool, root);
        while candidate.offset != self.offset {
            let inside = candidate
                .children()
                .find(|child| child.offset <= self.offset && self.offset < child.next_tree().offset);
            match inside {
                Some(child) => {
                    parent = Some(candidate);
                    candidate = child;
                }
                None => return None,
            }
        }
        parent
    }

    /// Structural equality is byte equality of the spans.
    pub fn is_identical_to(&self, other: Node) -> bool {
        let a = &self.pool.blocks()[self.offset..self.offset + self.tree_size()];
        let b = &other.pool.blocks()[other.offset..other.offset + other.tree_size()];
        a == b
    }

    // -- Payload accessors ------------------------------------------------

    pub fn as_integer(&self) -> Option<BigInt> {
        if self.tag() != Type::Integer {
            return None;
        }
        let blocks = self.blocks();
        let len = blocks[1] as usize;
        Some(BigInt::from_blocks(blocks[2] != 0, &blocks[3..3 + len]))
    }

    pub fn as_float(&self) -> Option<f64> {
        if self.tag() != Type::Float {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.blocks()[1..9]);
        Some(f64::from_le_bytes(bytes))
    }

    pub fn constant_id(&self) -> Option<ConstantId> {
        if self.tag() != Type::Constant {
            return None;
        }
        ConstantId::from_block(self.blocks()[1])
    }

    pub fn symbol_name(&self) -> Option<&'a str> {
        if self.tag() != Type::Symbol {
            return None;
        }
        let blocks = self.blocks();
        let len = blocks[1] as usize;
        std::str::from_utf8(&blocks[2..2 + len]).ok()
    }

    pub fn placeholder(&self) -> Option<(PlaceholderTag, Filter)> {
        if self.tag() != Type::Placeholder {
            return None;
        }
        let blocks = self.blocks();
        Some((
            PlaceholderTag::from_block(blocks[1])?,
            Filter::from_block(blocks[2])?,
        ))
    }

    pub fn matrix_dimensions(&self) -> Option<(usize, usize)> {
        if self.tag() != Type::Matrix {
            return None;
        }
        let blocks = self.blocks();
        Some((blocks[1] as usize, blocks[2] as usize))
    }

    /// An integer node holding exactly `value`.
    pub fn is_integer(&self, value: i64) -> bool {
        match self.as_integer() {
            Some(big) => big.to_i64() == Some(value),
            None => false,
        }
    }

    pub(crate) fn print_tree_impl(&self, buffer: &mut String, depth: usize) {
        for _ in 0..depth {
            buffer.push_str("  ");
        }
        buffer.push_str(&self.label());
        buffer.push('\n');
        for child in self.children() {
            child.print_tree_impl(buffer, depth + 1);
        }
    }

    fn label(&self) -> String {
        match self.tag() {
            Type::Integer => match self.as_integer() {
                Some(big) => big.to_string(),
                None => "Integer".to_string(),
            },
            Type::Float => match self.as_float() {
                Some(value) => format!("{:?}", value),
                None => "Float".to_string(),
            },
            Type::Constant => match self.constant_id() {
                Some(id) => id.name().to_string(),
                None => "Constant".to_string(),
            },
            Type::Symbol => self.symbol_name().unwrap_or("Symbol").to_string(),
            Type::Undefined => "undef".to_string(),
            Type::Placeholder => match self.placeholder() {
                Some((tag, filter)) => {
                    let suffix = match filter {
                        Filter::One => "",
                        Filter::OneOrMore => "+",
                        Filter::ZeroOrMore => "*",
                    };
                    format!("K{}{}", tag.name(), suffix)
                }
                None => "Placeholder".to_string(),
            },
            Type::Matrix => match self.matrix_dimensions() {
                Some((rows, cols)) => format!("Matrix[{}x{}]", rows, cols),
                None => "Matrix".to_string(),
            },
            tag => properties(tag).name.to_string(),
        }
    }
}

pub struct Children<'a> {
    next: Node<'a>,
    remaining: usize,
}

impl<'a> Iterator for Children<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next;
        self.next = current.next_tree();
        self.remaining -= 1;
        Some(current)
    }
}

pub struct Descendants<'a> {
    pool: &'a Pool,
    next: usize,
    end: usize,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        if self.next >= self.end {
            return None;
        }
        let current = Node::new(self.pool, self.next);
        self.next = current.next_node().offset;
        Some(current)
    }
}

impl<'a> std::fmt::Display for Node<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.label())?;
        if self.number_of_children() > 0 {
            write!(f, "(")?;
            for (i, child) in self.children().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl<'a> std::fmt::Debug for Node<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Node@{} {}", self.offset, self)
    }
}

#[cfg(test)]
mod specs {
    use super::*;

    fn sample() -> Pool {
        // Add(Pow(x, 2), Mul(3, x), 1)
        let mut pool = Pool::new(256);
        pool.push_symbol("x").unwrap();
        pool.push_integer(2).unwrap();
        pool.push_pow().unwrap();
        pool.push_integer(3).unwrap();
        pool.push_symbol("x").unwrap();
        pool.push_mul(2).unwrap();
        pool.push_integer(1).unwrap();
        pool.push_add(3).unwrap();
        pool
    }

    #[test]
    fn display_is_structural() {
        let pool = sample();
        let root = pool.view(pool.roots()[0]);
        assert_eq!(root.to_string(), "Add(Pow(x, 2), Mul(3, x), 1)");
    }

    #[test]
    fn child_navigation() {
        let pool = sample();
        let root = pool.view(pool.roots()[0]);
        assert_eq!(root.number_of_children(), 3);
        assert_eq!(root.child(0).tag(), Type::Pow);
        assert_eq!(root.child(1).tag(), Type::Mul);
        assert!(root.child(2).is_integer(1));
        assert_eq!(root.children().count(), 3);
    }

    #[test]
    fn descendants_cover_the_span() {
        let pool = sample();
        let root = pool.view(pool.roots()[0]);
        // Add, Pow, x, 2, Mul, 3, x, 1
        assert_eq!(root.descendants().count(), 8);
        let total: usize = root.descendants().map(|node| node.node_size()).sum();
        assert_eq!(total, root.tree_size());
    }

    #[test]
    fn parent_lookup() {
        let pool = sample();
        let root = pool.view(pool.roots()[0]);
        let pow = root.child(0);
        let x = pow.child(0);
        assert_eq!(x.parent().map(|p| p.offset()), Some(pow.offset()));
        assert_eq!(pow.parent().map(|p| p.offset()), Some(root.offset()));
        assert!(root.parent().is_none());
    }

    #[test]
    fn payload_accessors() {
        let mut pool = Pool::new(256);
        let f = pool.push_float(2.5).unwrap();
        let c = pool.push_constant(ConstantId::E).unwrap();
        let s = pool.push_symbol("theta").unwrap();
        let p = pool
            .push_placeholder(PlaceholderTag::C, Filter::OneOrMore)
            .unwrap();
        assert_eq!(pool.view(f).as_float(), Some(2.5));
        assert_eq!(pool.view(c).constant_id(), Some(ConstantId::E));
        assert_eq!(pool.view(s).symbol_name(), Some("theta"));
        assert_eq!(
            pool.view(p).placeholder(),
            Some((PlaceholderTag::C, Filter::OneOrMore))
        );
        assert_eq!(pool.view(p).to_string(), "KC+");
    }
}
