//! Arena-backed abstract syntax tree.
//!
//! Nodes live in a flat vector and refer to each other by [`NodeId`]
//! index. The tree is built bottom-up, so a node's children always carry
//! smaller indices than the node itself. Rewrites (constant folding and
//! the like) replace a node in place; nothing ever moves, so stored ids
//! stay valid for the life of the arena.

use std::collections::HashMap;

/// Index of a node inside an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A literal value known at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    /// Logical negation (`not x`).
    Not,
    /// Numeric negation (`-x`).
    Neg,
    /// Numeric identity (`+x`).
    Pos,
}

/// A single syntax tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw template text emitted verbatim.
    Text(String),
    /// An ordered sequence of children: text, print expressions, and
    /// statements. Statement bodies are `Output` nodes.
    Output(Vec<NodeId>),
    If {
        cond: NodeId,
        /// Body to run when the condition holds; an `Output` node.
        then_body: NodeId,
        /// `else` body, or the next `If` in an `elif` chain.
        else_body: Option<NodeId>,
    },
    For {
        var: String,
        iter: NodeId,
        body: NodeId,
    },
    Block {
        name: String,
        body: NodeId,
    },
    Extends {
        /// Expression evaluating to the parent template name.
        parent: NodeId,
    },
    Literal(Const),
    /// A name looked up in the render context.
    Name(String),
    /// Attribute access (`obj.field`).
    Attr {
        obj: NodeId,
        name: String,
    },
    /// Subscript access (`obj[expr]`).
    Subscript {
        obj: NodeId,
        index: NodeId,
    },
    BinaryOp {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: NodeId,
    },
    /// Filter application (`value|name(args)`).
    Filter {
        input: NodeId,
        name: String,
        args: Vec<NodeId>,
    },
    /// Test application (`value is [not] name(args)`).
    Test {
        input: NodeId,
        name: String,
        args: Vec<NodeId>,
        negated: bool,
    },
    /// Call syntax (`callee(args)`); `super()` is the common case.
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
}

/// The arena holding all nodes of one parsed template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
    /// Source line per node, parallel to `nodes`.
    lines: Vec<u32>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn push(&mut self, node: Node, line: usize) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        self.lines.push(line as u32);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Replaces the node at `id`, keeping its source line.
    pub fn replace(&mut self, id: NodeId, node: Node) {
        self.nodes[id.index()] = node;
    }

    pub fn line(&self, id: NodeId) -> usize {
        self.lines[id.index()] as usize
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Result of parsing one template.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// Node arena for the whole template.
    pub ast: Ast,
    /// Top-level `Output` node.
    pub root: NodeId,
    /// Block name to block body (`Output` node), unique per template.
    pub blocks: HashMap<String, NodeId>,
}
