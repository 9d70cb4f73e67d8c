//! Conservative compile-time folding.
//!
//! Runs between parse and code generation when the environment has
//! optimization enabled. Two rewrites, both in place on the arena:
//!
//! * literal-only operator applications fold to their result,
//! * names bound to scalar environment globals inline as literals.
//!
//! Everything observable stays observable: a fold that would error is
//! left for the runtime (the branch may never run), aggregates keep
//! their reference identity, and filters, tests and calls never fold
//! because their registries bind late.

use std::collections::HashMap;

use weft_syntax::{Ast, Node, NodeId, Parsed};

use crate::value::{ops, Value};

pub(crate) fn optimize(parsed: &mut Parsed, globals: &HashMap<String, Value>) {
    let root = parsed.root;
    let mut folder = Folder {
        globals,
        bound: Vec::new(),
        folded: 0,
    };
    folder.fold(&mut parsed.ast, root);
    tracing::trace!(folded = folder.folded, "constant folding finished");
}

struct Folder<'a> {
    globals: &'a HashMap<String, Value>,
    /// Names shadowed by enclosing `for` statements, plus `loop` itself.
    bound: Vec<String>,
    folded: usize,
}

impl Folder<'_> {
    fn fold(&mut self, ast: &mut Ast, id: NodeId) {
        match ast.node(id).clone() {
            Node::Text(_) | Node::Literal(_) => {}
            Node::Output(children) => {
                for child in children {
                    self.fold(ast, child);
                }
            }
            Node::If {
                cond,
                then_body,
                else_body,
            } => {
                self.fold(ast, cond);
                self.fold(ast, then_body);
                if let Some(else_body) = else_body {
                    self.fold(ast, else_body);
                }
            }
            Node::For { var, iter, body } => {
                self.fold(ast, iter);
                self.bound.push(var);
                self.bound.push("loop".to_string());
                self.fold(ast, body);
                self.bound.pop();
                self.bound.pop();
            }
            Node::Block { body, .. } => {
                // Blocks run in their own frame and cannot see enclosing
                // loop variables, so folding restarts from a clean scope.
                let saved = std::mem::take(&mut self.bound);
                self.fold(ast, body);
                self.bound = saved;
            }
            Node::Extends { parent } => self.fold(ast, parent),
            Node::Name(name) => self.fold_name(ast, id, &name),
            Node::Attr { obj, .. } => self.fold(ast, obj),
            Node::Subscript { obj, index } => {
                self.fold(ast, obj);
                self.fold(ast, index);
            }
            Node::BinaryOp { op, left, right } => {
                self.fold(ast, left);
                self.fold(ast, right);
                let (Node::Literal(l), Node::Literal(r)) = (ast.node(left), ast.node(right))
                else {
                    return;
                };
                let left_value = Value::from_const(l);
                let right_value = Value::from_const(r);
                // A fold that errors stays unfolded; the error belongs to
                // whichever render actually reaches this expression.
                if let Ok(value) = ops::binary(op, &left_value, &right_value) {
                    self.replace_with_literal(ast, id, &value);
                }
            }
            Node::UnaryOp { op, operand } => {
                self.fold(ast, operand);
                let Node::Literal(constant) = ast.node(operand) else {
                    return;
                };
                let operand_value = Value::from_const(constant);
                if let Ok(value) = ops::unary(op, &operand_value) {
                    self.replace_with_literal(ast, id, &value);
                }
            }
            Node::Filter { input, args, .. } | Node::Test { input, args, .. } => {
                self.fold(ast, input);
                for arg in args {
                    self.fold(ast, arg);
                }
            }
            Node::Call { args, .. } => {
                // The callee is left alone so `super` stays a name.
                for arg in args {
                    self.fold(ast, arg);
                }
            }
        }
    }

    /// Inlines a name bound to a scalar environment global. Aggregates
    /// never inline, and a name shadowed by a loop variable is not a
    /// global reference at all.
    fn fold_name(&mut self, ast: &mut Ast, id: NodeId, name: &str) {
        if self.bound.iter().any(|bound| bound == name) {
            return;
        }
        if let Some(value) = self.globals.get(name) {
            self.replace_with_literal(ast, id, value);
        }
    }

    fn replace_with_literal(&mut self, ast: &mut Ast, id: NodeId, value: &Value) {
        if let Some(constant) = value.to_const() {
            ast.replace(id, Node::Literal(constant));
            self.folded += 1;
        }
    }
}
