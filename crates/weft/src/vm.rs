//! The execution engine.
//!
//! [`Render`] is a pull-driven machine over [`ExecutableUnit`] routines.
//! Each `next()` call executes instructions until one produces output,
//! then suspends with that fragment; nothing downstream of the cursor has
//! run yet when a fragment is handed out. A render is finite and never
//! restarts: once the frame stack drains or an error surfaces, the
//! iterator stays exhausted.
//!
//! Inheritance works on the same stack. An `Extend` instruction loads the
//! parent and pushes its root frame, while recording which unit provides
//! which block; `CallBlock` then dispatches to the most derived provider,
//! and `super()` re-enters the same machinery one provider further up.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use weft_syntax::{BinOp, Node, NodeId, UnaryOpKind};

use crate::environment::Environment;
use crate::error::{Result, WeftError};
use crate::instructions::{ExecutableUnit, Instr};
use crate::value::{ops, UndefinedValue, Value};

/// One chunk of rendered output.
pub type Fragment = String;

/// Which routine of a unit a frame is executing.
#[derive(Debug, Clone)]
enum Routine {
    Root,
    Block {
        name: String,
        /// Position in the block provider chain; `super()` runs the same
        /// block at `level + 1`.
        level: usize,
    },
}

#[derive(Debug, Clone)]
struct LoopState {
    var: String,
    items: Vec<Value>,
    /// Position of the item the loop variable currently holds.
    index: usize,
}

impl LoopState {
    fn current(&self) -> Value {
        self.items.get(self.index).cloned().unwrap_or_default()
    }

    /// The `loop` helper visible inside the body.
    fn loop_map(&self) -> Value {
        let length = self.items.len();
        let index = self.index;
        let mut map = BTreeMap::new();
        map.insert("index".to_string(), Value::from(index + 1));
        map.insert("index0".to_string(), Value::from(index));
        map.insert("revindex".to_string(), Value::from(length - index));
        map.insert("revindex0".to_string(), Value::from(length - index - 1));
        map.insert("first".to_string(), Value::Bool(index == 0));
        map.insert("last".to_string(), Value::Bool(index + 1 == length));
        map.insert("length".to_string(), Value::from(length));
        Value::Map(map)
    }
}

/// One routine in flight: a unit, a routine selector, a cursor, and the
/// loops opened inside the routine. Block frames start with no loops, so
/// a block never sees the loop variables of its call site.
#[derive(Debug, Clone)]
struct Frame {
    unit: Arc<ExecutableUnit>,
    routine: Routine,
    pc: usize,
    loops: Vec<LoopState>,
}

impl Frame {
    fn root(unit: Arc<ExecutableUnit>) -> Self {
        Self {
            unit,
            routine: Routine::Root,
            pc: 0,
            loops: Vec::new(),
        }
    }

    fn block(unit: Arc<ExecutableUnit>, name: String, level: usize) -> Self {
        Self {
            unit,
            routine: Routine::Block { name, level },
            pc: 0,
            loops: Vec::new(),
        }
    }
}

/// A lazy render: an iterator of output fragments.
///
/// Produced by [`Template::generate`]; [`Template::render`] drains one to
/// a string and [`Template::stream`] wraps one in a [`TemplateStream`].
///
/// [`Template::generate`]: crate::Template::generate
/// [`Template::render`]: crate::Template::render
/// [`Template::stream`]: crate::Template::stream
/// [`TemplateStream`]: crate::TemplateStream
pub struct Render<'env> {
    env: &'env Environment,
    context: HashMap<String, Value>,
    frames: Vec<Frame>,
    /// Block providers by name, most derived first.
    block_chain: HashMap<String, Vec<Arc<ExecutableUnit>>>,
    /// Parent names already entered, guarding against extends cycles.
    extended: Vec<String>,
    done: bool,
}

impl<'env> Render<'env> {
    pub(crate) fn new(
        env: &'env Environment,
        unit: Arc<ExecutableUnit>,
        context: HashMap<String, Value>,
    ) -> Self {
        let mut block_chain: HashMap<String, Vec<Arc<ExecutableUnit>>> = HashMap::new();
        for name in unit.blocks.keys() {
            block_chain.insert(name.clone(), vec![unit.clone()]);
        }
        Self {
            env,
            context,
            frames: vec![Frame::root(unit)],
            block_chain,
            extended: Vec::new(),
            done: false,
        }
    }

    /// Executes one instruction of the innermost frame, or retires the
    /// frame when its routine is exhausted.
    fn step_once(&mut self) -> Result<Option<Fragment>> {
        let (unit, routine, pc) = {
            let Some(frame) = self.frames.last() else {
                return Ok(None);
            };
            (frame.unit.clone(), frame.routine.clone(), frame.pc)
        };
        let instrs: &[Instr] = match &routine {
            Routine::Root => &unit.root,
            Routine::Block { name, .. } => match unit.blocks.get(name) {
                Some(instrs) => instrs,
                None => {
                    self.frames.pop();
                    return Ok(None);
                }
            },
        };
        let Some(instr) = instrs.get(pc) else {
            self.frames.pop();
            return Ok(None);
        };

        match instr {
            Instr::EmitText(text) => {
                self.jump(pc + 1);
                Ok(Some(text.clone()))
            }
            Instr::Emit(expr) => {
                self.jump(pc + 1);
                let value = self.eval_expr(&unit, *expr)?;
                Ok(Some(self.textualize(value)?))
            }
            Instr::JumpIfFalse(cond, target) => {
                let value = self.eval_expr(&unit, *cond)?;
                let truthy = self.truthiness(&value)?;
                self.jump(if truthy { pc + 1 } else { *target });
                Ok(None)
            }
            Instr::Jump(target) => {
                self.jump(*target);
                Ok(None)
            }
            Instr::BeginLoop { iter, var, end } => {
                let value = self.eval_expr(&unit, *iter)?;
                let items = self.materialize(value)?;
                if items.is_empty() {
                    self.jump(*end);
                } else {
                    let state = LoopState {
                        var: var.clone(),
                        items,
                        index: 0,
                    };
                    if let Some(frame) = self.frames.last_mut() {
                        frame.loops.push(state);
                        frame.pc = pc + 1;
                    }
                }
                Ok(None)
            }
            Instr::ContinueLoop { body } => {
                let body = *body;
                if let Some(frame) = self.frames.last_mut() {
                    frame.pc = match frame.loops.last_mut() {
                        Some(state) if state.index + 1 < state.items.len() => {
                            state.index += 1;
                            body
                        }
                        _ => {
                            frame.loops.pop();
                            pc + 1
                        }
                    };
                }
                Ok(None)
            }
            Instr::CallBlock(name) => {
                self.jump(pc + 1);
                self.push_block_frame(name, 0)?;
                Ok(None)
            }
            Instr::Extend(parent_expr) => {
                self.jump(pc + 1);
                self.extend(&unit, *parent_expr)?;
                Ok(None)
            }
        }
    }

    fn jump(&mut self, target: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = target;
        }
    }

    /// Loads the parent template and stacks its root under the block
    /// chain collected so far. The child's blocks stay ahead of the
    /// parent's, so the most derived definition keeps winning.
    fn extend(&mut self, unit: &ExecutableUnit, parent_expr: NodeId) -> Result<()> {
        let value = self.eval_expr(unit, parent_expr)?;
        let Value::String(parent_name) = value else {
            return Err(WeftError::InvalidOperation(format!(
                "extends expects a template name string, got {}",
                value.kind_name()
            )));
        };
        if self.extended.iter().any(|seen| seen == &parent_name) {
            return Err(WeftError::InvalidOperation(format!(
                "circular extends chain through '{parent_name}'"
            )));
        }
        tracing::trace!(parent = %parent_name, "extending template");
        let requester = unit.name.clone();
        let parent = self
            .env
            .get_template(&parent_name, requester.as_deref(), None)?;
        let parent_unit = parent.unit_arc();
        for block_name in parent_unit.blocks.keys() {
            self.block_chain
                .entry(block_name.clone())
                .or_default()
                .push(parent_unit.clone());
        }
        self.extended.push(parent_name);
        self.frames.pop();
        self.frames.push(Frame::root(parent_unit));
        Ok(())
    }

    fn push_block_frame(&mut self, name: &str, level: usize) -> Result<()> {
        let provider = self
            .block_chain
            .get(name)
            .and_then(|chain| chain.get(level))
            .cloned();
        let Some(unit) = provider else {
            return Err(WeftError::InvalidOperation(if level == 0 {
                format!("no definition for block '{name}'")
            } else {
                format!("no parent definition for block '{name}'")
            }));
        };
        self.frames.push(Frame::block(unit, name.to_string(), level));
        Ok(())
    }

    /// Runs a block routine to completion, collecting its fragments.
    /// Used by `super()`, which needs the parent block's output as a
    /// value mid-expression.
    fn run_block_to_string(&mut self, name: &str, level: usize) -> Result<String> {
        let depth = self.frames.len();
        self.push_block_frame(name, level)?;
        let mut collected = String::new();
        while self.frames.len() > depth {
            if let Some(fragment) = self.step_once()? {
                collected.push_str(&fragment);
            }
        }
        Ok(collected)
    }

    fn eval_super(&mut self) -> Result<Value> {
        let (name, level) = match self.frames.last().map(|frame| &frame.routine) {
            Some(Routine::Block { name, level }) => (name.clone(), *level),
            _ => {
                return Err(WeftError::InvalidOperation(
                    "'super' is only available inside a block".to_string(),
                ))
            }
        };
        let text = self.run_block_to_string(&name, level + 1)?;
        Ok(Value::String(text))
    }

    fn eval_expr(&mut self, unit: &ExecutableUnit, id: NodeId) -> Result<Value> {
        match unit.ast.node(id) {
            Node::Literal(constant) => Ok(Value::from_const(constant)),
            Node::Name(name) => Ok(self.lookup_name(name)),
            Node::Attr { obj, name } => {
                let base = self.eval_expr(unit, *obj)?;
                Ok(base.resolve(&Value::String(name.clone())))
            }
            Node::Subscript { obj, index } => {
                let base = self.eval_expr(unit, *obj)?;
                let key = self.eval_expr(unit, *index)?;
                Ok(base.resolve(&key))
            }
            Node::BinaryOp { op, left, right } => self.eval_binary(unit, *op, *left, *right),
            Node::UnaryOp { op, operand } => {
                let value = self.eval_expr(unit, *operand)?;
                if let UnaryOpKind::Not = op {
                    let truthy = self.truthiness(&value)?;
                    return Ok(Value::Bool(!truthy));
                }
                ops::unary(*op, &value)
            }
            Node::Filter { input, name, args } => {
                let value = self.eval_expr(unit, *input)?;
                let arg_values = self.eval_args(unit, args)?;
                let Some(filter) = self.env.filter(name) else {
                    return Err(WeftError::UnknownFilter { name: name.clone() });
                };
                filter(value, &arg_values)
            }
            Node::Test {
                input,
                name,
                args,
                negated,
            } => {
                let value = self.eval_expr(unit, *input)?;
                let arg_values = self.eval_args(unit, args)?;
                let Some(test) = self.env.test(name) else {
                    return Err(WeftError::UnknownTest { name: name.clone() });
                };
                let passed = test(&value, &arg_values)?;
                Ok(Value::Bool(passed != *negated))
            }
            Node::Call { callee, args } => {
                if let Node::Name(name) = unit.ast.node(*callee) {
                    if name == "super" {
                        if !args.is_empty() {
                            return Err(WeftError::InvalidOperation(
                                "super() takes no arguments".to_string(),
                            ));
                        }
                        return self.eval_super();
                    }
                }
                Err(WeftError::InvalidOperation(
                    "value is not callable".to_string(),
                ))
            }
            _ => Err(WeftError::InvalidOperation(
                "statement node in expression position".to_string(),
            )),
        }
    }

    fn eval_args(&mut self, unit: &ExecutableUnit, args: &[NodeId]) -> Result<Vec<Value>> {
        args.iter()
            .map(|&arg| self.eval_expr(unit, arg))
            .collect()
    }

    fn eval_binary(
        &mut self,
        unit: &ExecutableUnit,
        op: BinOp,
        left: NodeId,
        right: NodeId,
    ) -> Result<Value> {
        match op {
            BinOp::And => {
                let lhs = self.eval_expr(unit, left)?;
                if !self.truthiness(&lhs)? {
                    return Ok(lhs);
                }
                self.eval_expr(unit, right)
            }
            BinOp::Or => {
                let lhs = self.eval_expr(unit, left)?;
                if self.truthiness(&lhs)? {
                    return Ok(lhs);
                }
                self.eval_expr(unit, right)
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let lhs = self.eval_expr(unit, left)?;
                let rhs = self.eval_expr(unit, right)?;
                self.check_comparable(&lhs)?;
                self.check_comparable(&rhs)?;
                ops::binary(op, &lhs, &rhs)
            }
            _ => {
                let lhs = self.eval_expr(unit, left)?;
                let rhs = self.eval_expr(unit, right)?;
                ops::binary(op, &lhs, &rhs)
            }
        }
    }

    fn check_comparable(&self, value: &Value) -> Result<()> {
        if let Value::Undefined(undefined) = value {
            self.env.undefined_behavior().on_compare(undefined)?;
        }
        Ok(())
    }

    /// Resolves a bare name: loop variables of the current frame first,
    /// innermost loop winning, then the context, then undefined.
    fn lookup_name(&self, name: &str) -> Value {
        if let Some(frame) = self.frames.last() {
            for state in frame.loops.iter().rev() {
                if state.var == name {
                    return state.current();
                }
                if name == "loop" {
                    return state.loop_map();
                }
            }
        }
        match self.context.get(name) {
            Some(value) => value.clone(),
            None => Value::Undefined(UndefinedValue::unresolved(name)),
        }
    }

    fn truthiness(&self, value: &Value) -> Result<bool> {
        if let Value::Undefined(undefined) = value {
            return self.env.undefined_behavior().truthiness(undefined);
        }
        Ok(value.is_truthy())
    }

    /// Applies the undefined policy, then the finalize hook, producing
    /// the output form of an emitted value.
    fn textualize(&self, value: Value) -> Result<Fragment> {
        let value = match value {
            Value::Undefined(undefined) => {
                Value::String(self.env.undefined_behavior().textualize(&undefined)?)
            }
            other => other,
        };
        Ok(self.env.finalize_value(&value))
    }

    fn materialize(&self, value: Value) -> Result<Vec<Value>> {
        match value {
            Value::Seq(items) => Ok(items),
            Value::String(text) => Ok(text
                .chars()
                .map(|c| Value::String(c.to_string()))
                .collect()),
            Value::Map(map) => Ok(map.keys().map(|key| Value::String(key.clone())).collect()),
            Value::Undefined(undefined) => self.env.undefined_behavior().iterate(&undefined),
            other => Err(WeftError::InvalidOperation(format!(
                "value of type {} is not iterable",
                other.kind_name()
            ))),
        }
    }
}

impl Iterator for Render<'_> {
    type Item = Result<Fragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while !self.frames.is_empty() {
            match self.step_once() {
                Ok(Some(fragment)) => return Some(Ok(fragment)),
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        self.done = true;
        None
    }
}
