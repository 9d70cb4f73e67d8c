//! The executable form of a compiled template.
//!
//! Statements lower to a flat instruction list per routine; expression
//! trees stay in the arena and are referenced by node id, evaluated only
//! when their instruction runs.

use std::collections::HashMap;

use weft_syntax::{Ast, NodeId};

/// A single instruction of a compiled routine.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Yield a raw text fragment.
    EmitText(String),
    /// Evaluate the expression, apply the undefined policy and the
    /// finalize hook, yield the result.
    Emit(NodeId),
    /// Evaluate the condition and jump to the target when falsy.
    JumpIfFalse(NodeId, usize),
    /// Unconditional jump.
    Jump(usize),
    /// Evaluate the iterable and enter a loop, or jump to `end` when it
    /// is empty.
    BeginLoop { iter: NodeId, var: String, end: usize },
    /// Advance the innermost loop: jump back to `body` while items remain,
    /// otherwise leave the loop and fall through.
    ContinueLoop { body: usize },
    /// Run the named block. The most derived definition in the
    /// inheritance chain wins.
    CallBlock(String),
    /// Evaluate the parent template name and continue rendering there.
    Extend(NodeId),
}

/// A compiled template: one root routine plus one routine per block,
/// all sharing a single expression arena.
///
/// Units are immutable once built and shared behind an `Arc`, so a
/// template handle, a render in flight and a loader cache can all hold
/// the same unit.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    /// Loader name of the template, or `None` for anonymous sources.
    pub name: Option<String>,
    /// Expression arena referenced by `Emit`, jumps and loops.
    pub ast: Ast,
    /// Top-level routine. For an extending template this is a single
    /// `Extend` instruction.
    pub root: Vec<Instr>,
    /// Block routines by block name.
    pub blocks: HashMap<String, Vec<Instr>>,
}

impl ExecutableUnit {
    /// True when the unit was compiled from a template that extends
    /// another.
    pub fn extends(&self) -> bool {
        matches!(self.root.first(), Some(Instr::Extend(_)))
    }
}
