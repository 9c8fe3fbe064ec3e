//! The physical encoding of trees.
//!
//! A block is one byte. A type block carries a tag from the closed [`Type`]
//! enumeration; a value block is an opaque payload byte (a digit of a big
//! integer, a child count, one byte of a float, ...). Several blocks form a
//! node, like:
//!
//! ```text
//! [INT][LEN][SIGN][DIGIT0]...[DIGITN][LEN][INT]
//! [ADD][COUNT][ADD]
//! ```
//!
//! A node can also be a single block: `[POW]`.

/// Tags of the closed set of node kinds.
///
/// The discriminant doubles as the index into the dispatch table
/// ([`crate::properties::PROPERTIES`]), so the order here and there must
/// stay in sync.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Integer = 0,
    Float,
    Constant,
    Symbol,
    Undefined,
    Add,
    Mul,
    Sub,
    Div,
    Pow,
    Opp,
    Sqrt,
    Log,
    Ln,
    Sin,
    Cos,
    List,
    Matrix,
    Placeholder,
}

impl Type {
    pub const COUNT: usize = 19;

    pub fn from_block(block: u8) -> Option<Type> {
        if (block as usize) < Type::COUNT {
            // The discriminants are exactly 0..COUNT
            Some(unsafe { std::mem::transmute::<u8, Type>(block) })
        } else {
            None
        }
    }

    #[inline]
    pub fn block(self) -> u8 {
        self as u8
    }

    /// N-ary nodes store their child count in a value block
    #[inline]
    pub fn is_nary(self) -> bool {
        matches!(self, Type::Add | Type::Mul | Type::List)
    }
}

/// Indices stored in the value block of a `Constant` node.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantId {
    Pi = 0,
    E,
}

impl ConstantId {
    pub fn from_block(block: u8) -> Option<ConstantId> {
        match block {
            0 => Some(ConstantId::Pi),
            1 => Some(ConstantId::E),
            _ => None,
        }
    }

    pub fn value(self) -> f64 {
        match self {
            ConstantId::Pi => std::f64::consts::PI,
            ConstantId::E => std::f64::consts::E,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConstantId::Pi => "π",
            ConstantId::E => "e",
        }
    }
}

/// Placeholder names used by pattern trees. Eight are enough for every
/// rewrite rule in the reduction pipeline.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderTag {
    A = 0,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl PlaceholderTag {
    pub const COUNT: usize = 8;

    pub fn from_block(block: u8) -> Option<PlaceholderTag> {
        if (block as usize) < PlaceholderTag::COUNT {
            Some(unsafe { std::mem::transmute::<u8, PlaceholderTag>(block) })
        } else {
            None
        }
    }

    pub fn name(self) -> char {
        (b'A' + self as u8) as char
    }
}

/// How many sibling trees a placeholder may bind inside an n-ary node.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    One = 0,
    OneOrMore,
    ZeroOrMore,
}

impl Filter {
    pub fn from_block(block: u8) -> Option<Filter> {
        match block {
            0 => Some(Filter::One),
            1 => Some(Filter::OneOrMore),
            2 => Some(Filter::ZeroOrMore),
            _ => None,
        }
    }

    /// The smallest run the filter accepts, where the shortest-first
    /// binding search starts.
    pub fn minimum_trees(self) -> usize {
        match self {
            Filter::One | Filter::OneOrMore => 1,
            Filter::ZeroOrMore => 0,
        }
    }
}
