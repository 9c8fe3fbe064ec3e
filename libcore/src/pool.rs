//! The tree pool: one growable-up-to-capacity byte buffer holding many
//! trees contiguously.
//!
//! The pool never fragments. Every mutation is a block motion that shifts
//! the trailing bytes to keep the buffer dense, so a live tree always
//! occupies a single contiguous span, but the span's start offset can move
//! on any mutation. External holders that must survive mutations go
//! through the reference table ([`crate::tree_ref`]); raw [`Node`] views
//! borrow the pool and die at the next mutating call.
//!
//! Construction is stack-like: children are pushed first, then the parent
//! head is spliced in front of the most recently pushed spans, e.g.
//!
//! ```
//! use mathcore::pool::Pool;
//!
//! let mut pool = Pool::new(256);
//! pool.push_integer(2).unwrap();
//! pool.push_integer(3).unwrap();
//! let add = pool.push_add(2).unwrap();
//! assert_eq!(pool.view(add).to_string(), "Add(2, 3)");
//! ```

use thiserror::Error;

use crate::block::{ConstantId, Filter, PlaceholderTag, Type};
use crate::integer::BigInt;
use crate::node::Node;
use crate::properties::{properties, Arity};
use crate::tree_ref::RefTable;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The configured capacity is exceeded. Recoverable: unwind to a
    /// checkpoint and retry with a degraded strategy.
    #[error("pool exhausted: capacity of {capacity} blocks exceeded")]
    Overflow { capacity: usize },
    /// A handle whose tree is gone and cannot be rebuilt.
    #[error("reference no longer resolves to a tree")]
    StaleReference,
}

/// A resumption point. Unwinding discards every block pushed since and
/// invalidates references bound above the watermark, in O(1).
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    size: usize,
    roots: usize,
}

pub struct Pool {
    name: &'static str,
    data: Vec<u8>,
    capacity: usize,
    pub(crate) refs: RefTable,
    /// Offsets of the top-level trees, in pool order. The tail of this
    /// stack is the construction cursor the `push_*` builders wrap.
    roots: Vec<usize>,
}

impl Pool {
    pub fn new(capacity: usize) -> Pool {
        Pool::with_name("pool", capacity)
    }

    /// At least two pools exist in a running system: a transient scratch
    /// pool and an edition pool backing interactive trees. The name only
    /// shows up in logs.
    pub fn with_name(name: &'static str, capacity: usize) -> Pool {
        Pool {
            name,
            data: Vec::with_capacity(capacity),
            capacity,
            refs: RefTable::new((capacity / 8).max(1)),
            roots: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn blocks(&self) -> &[u8] {
        &self.data
    }

    /// Offsets of the top-level trees currently in the pool.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn last_tree(&self) -> Option<usize> {
        self.roots.last().copied()
    }

    /// A read-only view of the node starting at `offset`. Valid only until
    /// the next mutating call, which the borrow checker enforces.
    pub fn view(&self, offset: usize) -> Node {
        debug_assert!(offset < self.size(), "view past the pool end");
        debug_assert!(
            Type::from_block(self.data[offset]).is_some(),
            "offset does not start a node"
        );
        Node::new(self, offset)
    }

    // -- Checkpoints ------------------------------------------------------

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            size: self.size(),
            roots: self.roots.len(),
        }
    }

    pub fn unwind(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.size <= self.size());
        self.truncate_to(checkpoint.size);
        self.roots.truncate(checkpoint.roots);
    }

    // -- The splice primitive ---------------------------------------------

    /// Append raw blocks at the cursor.
    fn push_bytes(&mut self, bytes: &[u8]) -> Result<usize, PoolError> {
        self.ensure_room(bytes.len())?;
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn ensure_room(&self, extra: usize) -> Result<(), PoolError> {
        if self.data.len() + extra > self.capacity {
            Err(PoolError::Overflow {
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Move the `len` blocks starting at `src` so that they begin at `dst`,
    /// shifting everything in between to close and reopen the gap. `dst` is
    /// an offset in the current buffer and must not fall inside the moved
    /// span. Reference-table entries and root offsets are remapped as part
    /// of the same motion; this is the single place in the crate where
    /// blocks move under live trees.
    pub(crate) fn move_span(&mut self, dst: usize, src: usize, len: usize) {
        debug_assert!(src + len <= self.size());
        debug_assert!(dst <= self.size());
        debug_assert!(
            dst <= src || dst >= src + len,
            "destination inside the moved span"
        );
        if len == 0 || dst == src || dst == src + len {
            return;
        }
        if dst < src {
            self.data[dst..src + len].rotate_right(len);
        } else {
            self.data[src..dst].rotate_left(len);
        }
        let remap = |offset: usize| -> usize {
            if dst < src {
                if offset >= src && offset < src + len {
                    dst + (offset - src)
                } else if offset >= dst && offset < src {
                    offset + len
                } else {
                    offset
                }
            } else {
                if offset >= src && offset < src + len {
                    (dst - len) + (offset - src)
                } else if offset >= src + len && offset < dst {
                    offset - len
                } else {
                    offset
                }
            }
        };
        self.refs.remap(&remap);
        for root in self.roots.iter_mut() {
            *root = remap(*root);
        }
        self.roots.sort_unstable();
    }

    /// Drop every block from `size` up, invalidating references into the
    /// discarded region.
    fn truncate_to(&mut self, size: usize) {
        debug_assert!(size <= self.data.len());
        self.data.truncate(size);
        self.refs.invalidate_from(size);
        self.roots.retain(|root| *root < size);
    }

    /// Remove a span by moving it to the cursor and truncating: references
    /// into it are invalidated, references after it shift down.
    pub(crate) fn remove_span(&mut self, offset: usize, len: usize) {
        let end = self.size();
        self.move_span(end, offset, len);
        self.truncate_to(end - len);
    }

    /// Patch a single value block in place. The caller keeps the node
    /// layout consistent.
    pub(crate) fn write_block(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Remove the `head_len` head blocks of the node at `offset`, promoting
    /// its first child into the node's place. If the node was a top-level
    /// tree, the child takes over its root entry.
    pub(crate) fn collapse_head(&mut self, offset: usize, head_len: usize) {
        let was_root = self.roots.contains(&offset);
        self.remove_span(offset, head_len);
        if was_root && !self.roots.contains(&offset) {
            self.roots.push(offset);
            self.roots.sort_unstable();
        }
    }

    // -- Tree-level operations --------------------------------------------

    /// Remove a whole tree, closing the gap.
    pub fn remove_tree(&mut self, offset: usize) {
        let len = self.view(offset).tree_size();
        self.remove_span(offset, len);
        debug_assert!(self.spans_are_dense());
    }

    /// Remove a direct child of an n-ary node, patching the stored count.
    /// `child` is the child's current offset.
    pub fn remove_child(&mut self, parent: usize, child: usize) {
        debug_assert!(self.view(parent).tag().is_nary());
        debug_assert!(self
            .view(parent)
            .children()
            .any(|candidate| candidate.offset() == child));
        let count = self.view(parent).number_of_children();
        let len = self.view(child).tree_size();
        self.remove_span(child, len);
        self.write_block(parent + 1, (count - 1) as u8);
    }

    /// Copy a tree's span to the cursor; the clone becomes the newest
    /// top-level tree. Sharing spans is disallowed, so this is how a
    /// subtree gets referenced in two places.
    pub fn clone_tree(&mut self, offset: usize) -> Result<usize, PoolError> {
        let len = self.view(offset).tree_size();
        self.ensure_room(len)?;
        let clone = self.data.len();
        self.data.extend_from_within(offset..offset + len);
        self.roots.push(clone);
        Ok(clone)
    }

    /// Move the most recently pushed tree in front of `target`'s span.
    /// Count metadata of a surrounding n-ary node is the caller's business.
    pub fn insert_tree_before(&mut self, target: usize, source: usize) {
        debug_assert_eq!(Some(source), self.last_tree());
        let len = self.view(source).tree_size();
        self.roots.pop();
        self.move_span(target, source, len);
    }

    /// Move the most recently pushed tree right after `target`'s span.
    pub fn insert_tree_after(&mut self, target: usize, source: usize) {
        let end = self.view(target).offset() + self.view(target).tree_size();
        self.insert_tree_before(end, source);
    }

    /// Replace `target`'s span with the most recently pushed tree, which
    /// must live above `target`. `target`'s offset is unchanged.
    pub fn replace_tree(&mut self, target: usize, source: usize) {
        debug_assert_eq!(Some(source), self.last_tree());
        debug_assert!(source > target);
        let was_root = self.roots.contains(&target);
        let target_len = self.view(target).tree_size();
        let source_len = self.view(source).tree_size();
        self.roots.pop();
        self.move_span(target, source, source_len);
        self.remove_span(target + source_len, target_len);
        // A replaced top-level tree keeps its root entry; the motion above
        // carried it onto the discarded span
        if was_root && !self.roots.contains(&target) {
            self.roots.push(target);
            self.roots.sort_unstable();
        }
        debug_assert!(self.spans_are_dense());
    }

    /// Replace `target` with a fresh node pushed by `build`, in place.
    /// `build` runs at the cursor; whatever single tree it leaves on top
    /// becomes the replacement.
    pub fn replace_with<F>(&mut self, target: usize, build: F) -> Result<(), PoolError>
    where
        F: FnOnce(&mut Pool) -> Result<usize, PoolError>,
    {
        let checkpoint = self.checkpoint();
        match build(self) {
            Ok(source) => {
                self.replace_tree(target, source);
                Ok(())
            }
            Err(error) => {
                self.unwind(checkpoint);
                Err(error)
            }
        }
    }

    // -- Builder API ------------------------------------------------------

    pub fn push_integer(&mut self, value: i64) -> Result<usize, PoolError> {
        self.push_big_integer(&BigInt::from_i64(value))
    }

    pub fn push_big_integer(&mut self, value: &BigInt) -> Result<usize, PoolError> {
        let offset = self.push_bytes(&value.encode())?;
        self.roots.push(offset);
        Ok(offset)
    }

    pub fn push_float(&mut self, value: f64) -> Result<usize, PoolError> {
        let mut blocks = [0u8; 9];
        blocks[0] = Type::Float.block();
        blocks[1..9].copy_from_slice(&value.to_le_bytes());
        let offset = self.push_bytes(&blocks)?;
        self.roots.push(offset);
        Ok(offset)
    }

    pub fn push_constant(&mut self, id: ConstantId) -> Result<usize, PoolError> {
        let offset = self.push_bytes(&[Type::Constant.block(), id as u8])?;
        self.roots.push(offset);
        Ok(offset)
    }

    pub fn push_symbol(&mut self, name: &str) -> Result<usize, PoolError> {
        debug_assert!(!name.is_empty() && name.len() <= u8::MAX as usize);
        let mut blocks = Vec::with_capacity(name.len() + 4);
        blocks.push(Type::Symbol.block());
        blocks.push(name.len() as u8);
        blocks.extend_from_slice(name.as_bytes());
        blocks.push(name.len() as u8);
        blocks.push(Type::Symbol.block());
        let offset = self.push_bytes(&blocks)?;
        self.roots.push(offset);
        Ok(offset)
    }

    pub fn push_undefined(&mut self) -> Result<usize, PoolError> {
        let offset = self.push_bytes(&[Type::Undefined.block()])?;
        self.roots.push(offset);
        Ok(offset)
    }

    pub fn push_placeholder(
        &mut self,
        tag: PlaceholderTag,
        filter: Filter,
    ) -> Result<usize, PoolError> {
        let offset = self.push_bytes(&[Type::Placeholder.block(), tag as u8, filter as u8])?;
        self.roots.push(offset);
        Ok(offset)
    }

    /// Wrap the `children` most recently pushed trees in an n-ary node.
    pub fn push_nary(&mut self, tag: Type, children: usize) -> Result<usize, PoolError> {
        debug_assert!(tag.is_nary());
        debug_assert!(children <= u8::MAX as usize);
        debug_assert!(children <= self.roots.len(), "children must be pushed first");
        let head = [tag.block(), children as u8, tag.block()];
        self.wrap_last_roots(&head, children)
    }

    pub fn push_add(&mut self, children: usize) -> Result<usize, PoolError> {
        self.push_nary(Type::Add, children)
    }

    pub fn push_mul(&mut self, children: usize) -> Result<usize, PoolError> {
        self.push_nary(Type::Mul, children)
    }

    pub fn push_list(&mut self, children: usize) -> Result<usize, PoolError> {
        self.push_nary(Type::List, children)
    }

    /// Wrap the `rows * cols` most recently pushed trees, row major.
    pub fn push_matrix(&mut self, rows: usize, cols: usize) -> Result<usize, PoolError> {
        debug_assert!(rows <= u8::MAX as usize && cols <= u8::MAX as usize);
        let head = [Type::Matrix.block(), rows as u8, cols as u8];
        self.wrap_last_roots(&head, rows * cols)
    }

    /// Wrap the tag-determined number of most recently pushed trees in a
    /// fixed-arity node.
    pub fn push_fixed(&mut self, tag: Type) -> Result<usize, PoolError> {
        let arity = match properties(tag).arity {
            Arity::Fixed(arity) => arity as usize,
            _ => {
                debug_assert!(false, "push_fixed on a non-fixed tag");
                0
            }
        };
        self.wrap_last_roots(&[tag.block()], arity)
    }

    pub fn push_sub(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Sub)
    }

    pub fn push_div(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Div)
    }

    pub fn push_pow(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Pow)
    }

    pub fn push_opp(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Opp)
    }

    pub fn push_sqrt(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Sqrt)
    }

    pub fn push_log(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Log)
    }

    pub fn push_ln(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Ln)
    }

    pub fn push_sin(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Sin)
    }

    pub fn push_cos(&mut self) -> Result<usize, PoolError> {
        self.push_fixed(Type::Cos)
    }

    fn wrap_last_roots(&mut self, head: &[u8], children: usize) -> Result<usize, PoolError> {
        debug_assert!(children <= self.roots.len(), "children must be pushed first");
        let head_offset = self.push_bytes(head)?;
        let destination = if children == 0 {
            head_offset
        } else {
            self.roots[self.roots.len() - children]
        };
        self.move_span(destination, head_offset, head.len());
        self.roots.truncate(self.roots.len() - children);
        self.roots.push(destination);
        Ok(destination)
    }

    // -- Byte-span round trip ---------------------------------------------

    /// A tree's span is also its short-term storage format (copy/paste,
    /// undo, history): these bytes re-wrap as a tree via [`Pool::load_tree`].
    pub fn dump_tree(&self, offset: usize) -> Vec<u8> {
        let len = self.view(offset).tree_size();
        self.data[offset..offset + len].to_vec()
    }

    pub fn load_tree(&mut self, bytes: &[u8]) -> Result<usize, PoolError> {
        debug_assert!(tree_is_valid(bytes), "malformed tree bytes");
        let offset = self.push_bytes(bytes)?;
        self.roots.push(offset);
        Ok(offset)
    }

    // -- Invariant checks (tests and debug builds) ------------------------

    /// Live tree spans tile the buffer exactly: no gaps, no overlaps.
    pub fn spans_are_dense(&self) -> bool {
        let mut offset = 0;
        for root in self.roots.iter() {
            if *root != offset {
                return false;
            }
            match checked_tree_size(&self.data[offset..]) {
                Some(len) => offset += len,
                None => return false,
            }
        }
        offset == self.data.len()
    }

    pub fn log(&self) -> String {
        let mut buffer = format!("<Pool {} {}/{} blocks>\n", self.name, self.size(), self.capacity);
        for root in self.roots.iter() {
            self.view(*root).print_tree_impl(&mut buffer, 1);
        }
        buffer
    }
}

/// Structural validation of a standalone byte span: every tag byte is
/// known, sizes stay in bounds, and the span is exactly one tree.
pub fn tree_is_valid(bytes: &[u8]) -> bool {
    match checked_tree_size(bytes) {
        Some(len) => len == bytes.len(),
        None => false,
    }
}

fn checked_tree_size(bytes: &[u8]) -> Option<usize> {
    let mut offset = 0;
    let mut remaining_trees = 1usize;
    while remaining_trees > 0 {
        let tag = Type::from_block(*bytes.get(offset)?)?;
        let props = properties(tag);
        // Metadata blocks must be in bounds before sizing the node
        let metadata_len = match props.arity {
            Arity::NAry | Arity::Grid => 3,
            _ => match tag {
                Type::Integer | Type::Symbol => 2,
                _ => 1,
            },
        };
        if offset + metadata_len > bytes.len() {
            return None;
        }
        let node_size = (props.node_size)(&bytes[offset..]);
        if offset + node_size > bytes.len() {
            return None;
        }
        remaining_trees += (props.number_of_children)(&bytes[offset..]);
        remaining_trees -= 1;
        offset += node_size;
    }
    Some(offset)
}
