//! Lowering from the syntax tree to executable routines.
//!
//! Each statement body flattens into a jump-threaded instruction list;
//! expressions stay in the arena and are referenced by id. Block bodies
//! become separate routines so the inheritance machinery can dispatch on
//! block name, leaving a `CallBlock` marker at the definition site.

use std::collections::HashMap;

use weft_syntax::{Ast, Node, NodeId, Parsed, SyntaxError};

use crate::instructions::{ExecutableUnit, Instr};

/// Compiles a parsed template into an [`ExecutableUnit`].
///
/// A template that extends another compiles to a root holding a single
/// `Extend` instruction; its non-block root content is dropped here, the
/// one place that rule is applied.
pub(crate) fn generate(
    parsed: Parsed,
    name: Option<&str>,
) -> std::result::Result<ExecutableUnit, SyntaxError> {
    let Parsed { ast, root, blocks } = parsed;

    let mut routines = HashMap::new();
    for (block_name, body) in &blocks {
        let mut compiler = Compiler::new(&ast, name, true);
        compiler.compile_node(*body)?;
        routines.insert(block_name.clone(), compiler.finish());
    }

    let mut extend = None;
    if let Node::Output(children) = ast.node(root) {
        for &child in children {
            if let Node::Extends { parent } = ast.node(child) {
                extend = Some(*parent);
                break;
            }
        }
    }
    let root_routine = match extend {
        Some(parent) => vec![Instr::Extend(parent)],
        None => {
            let mut compiler = Compiler::new(&ast, name, false);
            compiler.compile_node(root)?;
            compiler.finish()
        }
    };

    Ok(ExecutableUnit {
        name: name.map(str::to_string),
        ast,
        root: root_routine,
        blocks: routines,
    })
}

struct Compiler<'a> {
    ast: &'a Ast,
    filename: Option<&'a str>,
    /// Whether this routine is a block body, where `super()` is legal.
    in_block: bool,
    instrs: Vec<Instr>,
}

impl<'a> Compiler<'a> {
    fn new(ast: &'a Ast, filename: Option<&'a str>, in_block: bool) -> Self {
        Self {
            ast,
            filename,
            in_block,
            instrs: Vec::new(),
        }
    }

    fn finish(self) -> Vec<Instr> {
        self.instrs
    }

    fn compile_node(&mut self, id: NodeId) -> Result<(), SyntaxError> {
        match self.ast.node(id) {
            Node::Text(text) => {
                if !text.is_empty() {
                    self.instrs.push(Instr::EmitText(text.clone()));
                }
            }
            Node::Output(children) => {
                for &child in children {
                    self.compile_node(child)?;
                }
            }
            Node::If {
                cond,
                then_body,
                else_body,
            } => self.compile_if(*cond, *then_body, *else_body)?,
            Node::For { var, iter, body } => {
                if !self.in_block {
                    self.reject_super(*iter)?;
                }
                let begin = self.instrs.len();
                self.instrs.push(Instr::BeginLoop {
                    iter: *iter,
                    var: var.clone(),
                    end: 0,
                });
                self.compile_node(*body)?;
                self.instrs.push(Instr::ContinueLoop { body: begin + 1 });
                let end = self.instrs.len();
                if let Some(Instr::BeginLoop { end: slot, .. }) = self.instrs.get_mut(begin) {
                    *slot = end;
                }
            }
            Node::Block { name, .. } => {
                self.instrs.push(Instr::CallBlock(name.clone()));
            }
            // The parser pins extends to the top level and the root
            // routine handles it before lowering; nothing remains here.
            Node::Extends { .. } => {}
            _ => {
                if !self.in_block {
                    self.reject_super(id)?;
                }
                self.instrs.push(Instr::Emit(id));
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        cond: NodeId,
        then_body: NodeId,
        else_body: Option<NodeId>,
    ) -> Result<(), SyntaxError> {
        if !self.in_block {
            self.reject_super(cond)?;
        }
        let jump_on_false = self.instrs.len();
        self.instrs.push(Instr::JumpIfFalse(cond, 0));
        self.compile_node(then_body)?;
        match else_body {
            Some(else_id) => {
                let jump_over_else = self.instrs.len();
                self.instrs.push(Instr::Jump(0));
                self.patch(jump_on_false, self.instrs.len());
                self.compile_node(else_id)?;
                self.patch(jump_over_else, self.instrs.len());
            }
            None => {
                self.patch(jump_on_false, self.instrs.len());
            }
        }
        Ok(())
    }

    fn patch(&mut self, index: usize, target: usize) {
        if let Some(Instr::JumpIfFalse(_, slot) | Instr::Jump(slot)) = self.instrs.get_mut(index) {
            *slot = target;
        }
    }

    /// Rejects `super()` in expressions outside block routines, where no
    /// parent block exists to call.
    fn reject_super(&self, id: NodeId) -> Result<(), SyntaxError> {
        match self.ast.node(id) {
            Node::Call { callee, args } => {
                if let Node::Name(name) = self.ast.node(*callee) {
                    if name == "super" {
                        return Err(SyntaxError::new(
                            "'super' is only available inside a block",
                            self.ast.line(id),
                            self.filename,
                        ));
                    }
                }
                self.reject_super(*callee)?;
                for &arg in args {
                    self.reject_super(arg)?;
                }
            }
            Node::Attr { obj, .. } => self.reject_super(*obj)?,
            Node::Subscript { obj, index } => {
                self.reject_super(*obj)?;
                self.reject_super(*index)?;
            }
            Node::BinaryOp { left, right, .. } => {
                self.reject_super(*left)?;
                self.reject_super(*right)?;
            }
            Node::UnaryOp { operand, .. } => self.reject_super(*operand)?,
            Node::Filter { input, args, .. } | Node::Test { input, args, .. } => {
                self.reject_super(*input)?;
                for &arg in args {
                    self.reject_super(arg)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
