//! Tree-walking interpreter for lowered, validated graphs.
//!
//! Statements produce a [`Flow`]; an exception travels as the `Err` side
//! of [`Exec`]. Jumps propagate outward until the block that places the
//! target label resumes after it, or a loop recognises its own break or
//! continue label. `finally` blocks and `using` disposal run on every way
//! out of their bodies.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use opgraph_core::{
    BinaryOp, CatchHandler, DataType, Expr, IteratorOp, IteratorState, LabelId, Node, Shared,
    SwitchCase, Value, Variable, exceptions,
};
use opgraph_registry::TypeRegistry;

use crate::dynamic;
use crate::ops::{self, fault, null_reference};

/// Result of executing code: `Err` carries a thrown exception value.
pub(crate) type Exec<T> = Result<T, Value>;

/// How a statement completed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Jump(LabelId),
    Return(Value),
}

pub(crate) struct Interpreter<'c> {
    registry: &'c TypeRegistry,
    return_type: &'c DataType,
    slots: &'c FxHashMap<Rc<str>, usize>,
    values: Vec<Value>,
    /// Exceptions whose handlers are running, innermost last.
    handling: Vec<Value>,
}

impl<'c> Interpreter<'c> {
    pub(crate) fn new(
        registry: &'c TypeRegistry,
        return_type: &'c DataType,
        slots: &'c FxHashMap<Rc<str>, usize>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            registry,
            return_type,
            slots,
            values,
            handling: Vec::new(),
        }
    }

    pub(crate) fn run(&mut self, body: &[Node]) -> Exec<Flow> {
        self.block(body)
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn block(&mut self, nodes: &[Node]) -> Exec<Flow> {
        let mut pc = 0;
        while let Some(node) = nodes.get(pc) {
            match self.node(node)? {
                Flow::Normal => pc += 1,
                Flow::Jump(target) => match placed_at(nodes, target) {
                    Some(index) => pc = index + 1,
                    None => return Ok(Flow::Jump(target)),
                },
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn node(&mut self, node: &Node) -> Exec<Flow> {
        match node {
            Node::Sequence(body) => self.block(body),
            Node::Declare(_) | Node::Label(_) => Ok(Flow::Normal),
            Node::Assign { target, value } => {
                let value = self.eval(value)?;
                self.store(target, value)?;
                Ok(Flow::Normal)
            }
            Node::Act(value) => {
                self.eval(value)?;
                Ok(Flow::Normal)
            }
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(condition)? {
                    self.block(then_branch)
                } else {
                    else_branch
                        .as_deref()
                        .map_or(Ok(Flow::Normal), |b| self.block(b))
                }
            }
            Node::Loop {
                condition,
                body,
                break_label,
                continue_label,
            } => {
                loop {
                    if let Some(condition) = condition {
                        if !self.eval_bool(condition)? {
                            break;
                        }
                    }
                    match self.block(body)? {
                        Flow::Normal => {}
                        Flow::Jump(label) if label == *continue_label => {}
                        Flow::Jump(label) if label == *break_label => break,
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Node::Switch { selector, cases } => self.switch(selector, cases),
            Node::Try {
                body,
                handlers,
                finally,
                ..
            } => self.try_catch(body, handlers, finally.as_deref()),
            Node::Using {
                resource,
                value,
                body,
            } => {
                let value = self.eval(value)?;
                self.store(resource, value)?;
                let outcome = self.block(body);
                self.dispose(resource)?;
                outcome
            }
            Node::Throw(Some(value)) => match self.eval(value)? {
                Value::Null => Err(null_reference("throw")),
                exception => Err(exception),
            },
            Node::Throw(None) => Err(self.handling.last().cloned().unwrap_or_else(|| {
                fault(exceptions::INVALID_OPERATION, "no exception is being handled")
            })),
            Node::Return { value, .. } => {
                let value = match value {
                    Some(value) => {
                        let value = self.eval(value)?;
                        self.coerce(value, self.return_type)?
                    }
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Node::Goto { target, .. } => Ok(Flow::Jump(*target)),
        }
    }

    /// First section with a matching value wins; otherwise the default.
    fn switch(&mut self, selector: &Expr, cases: &[SwitchCase]) -> Exec<Flow> {
        let selected = self.eval(selector)?;
        let mut chosen = None;
        'sections: for case in cases.iter().filter(|case| !case.is_default) {
            for value in &case.values {
                if ops::values_equal(&selected, &self.eval(value)?) {
                    chosen = Some(case);
                    break 'sections;
                }
            }
        }
        match chosen.or_else(|| cases.iter().find(|case| case.is_default)) {
            Some(case) => self.block(&case.body),
            None => Ok(Flow::Normal),
        }
    }

    fn try_catch(
        &mut self,
        body: &[Node],
        handlers: &[CatchHandler],
        finally: Option<&[Node]>,
    ) -> Exec<Flow> {
        let outcome = match self.block(body) {
            Err(exception) => self.catch(handlers, exception),
            completed => completed,
        };
        if let Some(finally) = finally {
            match self.block(finally)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn catch(&mut self, handlers: &[CatchHandler], exception: Value) -> Exec<Flow> {
        let handler = handlers.iter().find(|handler| match &handler.test {
            Some(ty) => self.registry.is_instance(&exception, ty),
            None => true,
        });
        let Some(handler) = handler else {
            return Err(exception);
        };
        tracing::trace!(
            "caught {}",
            exception.runtime_type().friendly_name(true)
        );
        if let Some(variable) = &handler.variable {
            self.store(variable, exception.clone())?;
        }
        self.handling.push(exception);
        let outcome = self.block(&handler.body);
        self.handling.pop();
        outcome
    }

    /// Dispose the value held by `resource`. `null` is skipped.
    fn dispose(&mut self, resource: &Variable) -> Exec<()> {
        let slot = self.slot(resource)?;
        let value = &mut self.values[slot];
        match value {
            Value::Null => Ok(()),
            Value::Iterator(state) => {
                state.disposed.set(true);
                Ok(())
            }
            _ => {
                let dispose = self
                    .registry
                    .dispose_fn(&value.runtime_type())
                    .or_else(|| self.registry.dispose_fn(&resource.ty));
                match dispose {
                    Some(dispose) => dispose(value),
                    None => Ok(()),
                }
            }
        }
    }

    // ==========================================================================
    // Variables
    // ==========================================================================

    fn slot(&self, variable: &Variable) -> Exec<usize> {
        self.slots.get(&variable.name).copied().ok_or_else(|| {
            fault(
                exceptions::INVALID_OPERATION,
                format!("variable '{}' has no storage", variable.name),
            )
        })
    }

    fn load(&self, variable: &Variable) -> Exec<Value> {
        let slot = self.slot(variable)?;
        Ok(self.values[slot].clone())
    }

    fn store(&mut self, variable: &Variable, value: Value) -> Exec<()> {
        let slot = self.slot(variable)?;
        self.values[slot] = self.coerce(value, &variable.ty)?;
        Ok(())
    }

    /// Widen a number to a numeric destination type.
    fn coerce(&self, value: Value, ty: &DataType) -> Exec<Value> {
        if ty.is_numeric() && value.as_f64().is_some() && value.runtime_type() != *ty {
            ops::convert(self.registry, value, ty)
        } else {
            Ok(value)
        }
    }

    // ==========================================================================
    // Expressions
    // ==========================================================================

    fn eval_bool(&mut self, expr: &Expr) -> Exec<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Err(null_reference("condition")),
            other => Err(fault(
                exceptions::INVALID_CAST,
                format!(
                    "'{}' is not a condition",
                    other.runtime_type().friendly_name(true)
                ),
            )),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Exec<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    /// Evaluate the target of an instance member; `null` raises.
    fn eval_target(&mut self, target: Option<&Expr>, member: &str) -> Exec<Value> {
        let Some(target) = target else {
            return Err(fault(
                exceptions::INVALID_OPERATION,
                format!("instance member '{member}' needs a target"),
            ));
        };
        match self.eval(target)? {
            Value::Null => Err(null_reference(format_args!("member '{member}'"))),
            value => Ok(value),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        match expr {
            Expr::Constant { value, .. } => Ok(value.clone()),
            Expr::Variable(variable) => self.load(variable),
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
                ..
            } => {
                let left = self.eval_bool(left)?;
                if left == (*op == BinaryOp::Or) {
                    return Ok(Value::Bool(left));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            Expr::Unary { op, operand, .. } => {
                let operand = self.eval(operand)?;
                ops::unary(*op, &operand)
            }
            Expr::Convert { operand, ty } => {
                let operand = self.eval(operand)?;
                ops::convert(self.registry, operand, ty)
            }
            Expr::Call {
                method,
                target,
                args,
            } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                if !method.is_static {
                    values.push(self.eval_target(target.as_deref(), &method.name)?);
                }
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                (method.native)(&values)
            }
            Expr::New { constructor, args } => {
                let values = self.eval_all(args)?;
                (constructor.native)(&values)
            }
            Expr::Field { field, target } => {
                if field.is_static {
                    return Ok(field
                        .static_slot
                        .as_ref()
                        .map_or(Value::Null, |slot| slot.borrow().clone()));
                }
                let target = self.eval_target(target.as_deref(), &field.name)?;
                let value = match &target {
                    Value::Object(obj) => obj.fields.borrow().get(field.index).cloned(),
                    Value::Struct(s) => s.fields.get(field.index).cloned(),
                    _ => None,
                };
                value.ok_or_else(|| {
                    fault(
                        exceptions::INVALID_OPERATION,
                        format!(
                            "'{}' has no field '{}'",
                            target.runtime_type().friendly_name(true),
                            field.name
                        ),
                    )
                })
            }
            Expr::Property { property, target } => {
                if property.is_static {
                    return (property.getter)(&[]);
                }
                let target = self.eval_target(target.as_deref(), &property.name)?;
                (property.getter)(&[target])
            }
            Expr::Subscribe {
                event,
                target,
                handler,
            } => {
                let mut values = Vec::with_capacity(2);
                if !event.is_static {
                    values.push(self.eval_target(target.as_deref(), &event.name)?);
                }
                values.push(self.eval(handler)?);
                (event.add)(&values)
            }
            Expr::Dynamic { site, args } => {
                let values = self.eval_all(args)?;
                dynamic::invoke(self.registry, site, &values)
            }
            Expr::Iterator { op, operand } => {
                let operand = self.eval(operand)?;
                iterate(*op, &operand)
            }
            Expr::Extension(extension) => Err(fault(
                exceptions::NOT_SUPPORTED,
                format!("extension '{}' was not reduced", extension.0.name()),
            )),
        }
    }
}

/// Index of the `Label(target)` node in `nodes`.
fn placed_at(nodes: &[Node], target: LabelId) -> Option<usize> {
    nodes
        .iter()
        .position(|node| matches!(node, Node::Label(id) if *id == target))
}

fn iterate(op: IteratorOp, operand: &Value) -> Exec<Value> {
    match (op, operand) {
        (_, Value::Null) => Err(null_reference(format_args!("'{}'", op.name()))),
        (IteratorOp::Begin, Value::Sequence(seq)) => Ok(Value::Iterator(Shared::new(
            IteratorState::new(seq.clone()),
        ))),
        (IteratorOp::MoveNext | IteratorOp::Current, Value::Iterator(state))
            if state.disposed.get() =>
        {
            Err(fault(
                exceptions::OBJECT_DISPOSED,
                "the iterator has been disposed",
            ))
        }
        (IteratorOp::MoveNext, Value::Iterator(state)) => {
            let len = state.source.items.len();
            let next = state.position.get().map_or(0, |p| (p + 1).min(len));
            state.position.set(Some(next));
            Ok(Value::Bool(next < len))
        }
        (IteratorOp::Current, Value::Iterator(state)) => state
            .position
            .get()
            .and_then(|p| state.source.items.get(p))
            .cloned()
            .ok_or_else(|| {
                fault(
                    exceptions::INVALID_OPERATION,
                    "the iterator is not positioned on an element",
                )
            }),
        _ => Err(fault(
            exceptions::INVALID_OPERATION,
            format!(
                "'{}' cannot be applied to '{}'",
                op.name(),
                operand.runtime_type().friendly_name(true)
            ),
        )),
    }
}
