//! Fluent function builder.
//!
//! [`FunctionBuilder`] assembles one function. Every operation validates
//! its input against the current construct and the scope before changing
//! anything, so a failed call leaves the builder as it was.
//!
//! ```
//! use std::rc::Rc;
//! use opgraph_builder::{FunctionBuilder, Lambda, LambdaParam, Param};
//! use opgraph_core::{DataType, Expr};
//! use opgraph_registry::TypeRegistry;
//!
//! let registry = Rc::new(TypeRegistry::with_builtins());
//! let mut b = FunctionBuilder::new(registry, vec![Param::named("n", DataType::Int32)], DataType::Int32);
//! b.if_(Lambda::build(vec![LambdaParam::new("n", DataType::Int32)], |p: &[Expr]| {
//!     Expr::lt(p[0].clone(), Expr::constant(0))
//! }))?
//! .ret_value(Expr::constant(0))?
//! .end_if()?
//! .ret_value(Expr::var("n", DataType::Int32))?;
//! let function = b.finish()?;
//! assert_eq!(function.parameters.len(), 1);
//! # Ok::<(), opgraph_core::BuildError>(())
//! ```

mod control;
mod frame;
mod switch;
mod try_catch;

use std::rc::Rc;

use opgraph_core::{BuildError, DataType, Expr, Function, JumpKind, LabelId, Node};
use opgraph_registry::TypeRegistry;

use crate::lambda::Producer;
use crate::rewrite::rewrite;
use crate::scope::ScopeContext;
use crate::typecheck;

use frame::{Frame, FrameKind};

// ============================================================================
// Options
// ============================================================================

/// One function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// `None` is named `p1..pN` by position.
    pub name: Option<String>,
    pub ty: DataType,
}

impl Param {
    pub fn named(name: &str, ty: DataType) -> Self {
        Self {
            name: Some(name.to_string()),
            ty,
        }
    }

    pub fn anon(ty: DataType) -> Self {
        Self { name: None, ty }
    }
}

/// Function-wide options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionOptions {
    /// Let literals embed captured values for names not in scope.
    pub allow_outer_capture: bool,
}

// ============================================================================
// FunctionBuilder
// ============================================================================

/// Builder of one structured function.
#[derive(Debug)]
pub struct FunctionBuilder {
    registry: Rc<TypeRegistry>,
    scope: ScopeContext,
    frames: Vec<Frame>,
    /// First error raised while declaring parameters; reported by `finish`.
    parameter_error: Option<BuildError>,
}

impl FunctionBuilder {
    /// Start a function with default options.
    pub fn new(registry: Rc<TypeRegistry>, params: Vec<Param>, return_type: DataType) -> Self {
        Self::with_options(registry, params, return_type, FunctionOptions::default())
    }

    /// Start a function.
    ///
    /// Parameter name errors (blank or duplicate) surface from
    /// [`finish`](Self::finish).
    pub fn with_options(
        registry: Rc<TypeRegistry>,
        params: Vec<Param>,
        return_type: DataType,
        options: FunctionOptions,
    ) -> Self {
        let mut scope = ScopeContext::new(return_type, options.allow_outer_capture);
        let mut parameter_error = None;
        for (position, param) in params.into_iter().enumerate() {
            let name = param
                .name
                .unwrap_or_else(|| format!("p{}", position + 1));
            if let Err(err) = scope.declare_parameter(&name, param.ty) {
                parameter_error.get_or_insert(err);
            }
        }
        Self {
            registry,
            scope,
            frames: vec![Frame::new(FrameKind::Root)],
            parameter_error,
        }
    }

    /// The scope shared by every open construct.
    pub fn scope(&self) -> &ScopeContext {
        &self.scope
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Number of constructs currently open.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    // ==========================================================================
    // Plumbing
    // ==========================================================================

    fn top(&self) -> &Frame {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn ensure_statements(&self) -> Result<(), BuildError> {
        if self.top().kind.accepts_statements() {
            Ok(())
        } else {
            Err(BuildError::state(
                "statements inside a switch must be placed in a case or default body",
            ))
        }
    }

    fn append(&mut self, node: Node) {
        self.top_mut().body.push(node);
    }

    fn push_frame(&mut self, kind: FrameKind) {
        tracing::trace!("open {}", kind.name());
        self.frames.push(Frame::new(kind));
    }

    fn pop_frame(&mut self) -> Frame {
        debug_assert!(self.frames.len() > 1, "the root frame is never popped");
        let frame = self.frames.pop().unwrap_or_else(|| Frame::new(FrameKind::Root));
        tracing::trace!("close {}", frame.kind.name());
        frame
    }

    fn produce(&self, producer: impl Into<Producer>) -> Result<Expr, BuildError> {
        rewrite(producer, &self.scope, &self.registry)
    }

    fn produce_bool(
        &self,
        producer: impl Into<Producer>,
        context: &str,
    ) -> Result<Expr, BuildError> {
        let expr = self.produce(producer)?;
        let ty = expr.data_type();
        if ty != DataType::Bool {
            return Err(typecheck::mismatch(context, &DataType::Bool, &ty));
        }
        Ok(expr)
    }

    /// Fit `expr` to `ty`, widening numbers explicitly.
    fn coerce(&self, expr: Expr, ty: &DataType, context: &str) -> Result<Expr, BuildError> {
        let found = expr.data_type();
        if found == *ty {
            return Ok(expr);
        }
        if let Expr::Constant { value, .. } = &expr {
            if value.is_null() && ty.is_nullable() && !self.registry.is_value_type(ty) {
                return Ok(Expr::null(ty.clone()));
            }
        }
        typecheck::expect_assignable(&self.registry, context, &found, ty)?;
        if found.is_numeric() && ty.is_numeric() {
            Ok(Expr::convert(expr, ty.clone()))
        } else {
            Ok(expr)
        }
    }

    // ==========================================================================
    // Simple statements
    // ==========================================================================

    /// Declare a local initialized to its type's default.
    pub fn declare(&mut self, name: &str, ty: DataType) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        if ty.is_void() {
            return Err(BuildError::InvalidArgument {
                message: format!("variable '{name}' cannot be void"),
            });
        }
        let var = self.scope.declare_variable(name, ty)?;
        self.append(Node::Declare(var));
        Ok(self)
    }

    /// Assign to `name`, declaring it with the value's type if needed.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<Producer>,
    ) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        self.scope.check_assignable(name)?;
        let expr = self.produce(value)?;
        if let Some(var) = self.scope.variable(name) {
            let var = var.clone();
            let expr = self.coerce(expr, &var.ty, &format!("assignment to '{name}'"))?;
            self.append(Node::Assign { target: var, value: expr });
            return Ok(self);
        }
        let ty = expr.data_type();
        if ty.is_void() {
            return Err(BuildError::InvalidArgument {
                message: format!("cannot assign a void value to '{name}'"),
            });
        }
        let var = self.scope.declare_variable(name, ty)?;
        self.append(Node::Declare(var.clone()));
        self.append(Node::Assign { target: var, value: expr });
        Ok(self)
    }

    /// Assign to `name` as `ty`; an existing declaration must agree.
    pub fn set_typed(
        &mut self,
        name: &str,
        ty: DataType,
        value: impl Into<Producer>,
    ) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        self.scope.check_assignable(name)?;
        if let Some(existing) = self.scope.variable(name) {
            if existing.ty != ty {
                return Err(typecheck::mismatch(
                    &format!("declaration of '{name}'"),
                    &existing.ty,
                    &ty,
                ));
            }
        } else {
            self.scope.check_variable_name(name)?;
        }
        if ty.is_void() {
            return Err(BuildError::InvalidArgument {
                message: format!("variable '{name}' cannot be void"),
            });
        }
        let expr = self.produce(value)?;
        let expr = self.coerce(expr, &ty, &format!("assignment to '{name}'"))?;
        let var = match self.scope.variable(name) {
            Some(var) => var.clone(),
            None => {
                let var = self.scope.declare_variable(name, ty)?;
                self.append(Node::Declare(var.clone()));
                var
            }
        };
        self.append(Node::Assign { target: var, value: expr });
        Ok(self)
    }

    /// Evaluate for effect.
    pub fn act(&mut self, action: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let expr = self.produce(action)?;
        self.append(Node::Act(expr));
        Ok(self)
    }

    /// Return from a void function.
    pub fn ret(&mut self) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let ty = self.scope.return_type();
        if !ty.is_void() {
            return Err(typecheck::mismatch("return", ty, &DataType::Void));
        }
        let label = self.scope.return_label();
        self.append(Node::Return { label, value: None });
        Ok(self)
    }

    /// Return a value.
    pub fn ret_value(&mut self, value: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let ty = self.scope.return_type().clone();
        if ty.is_void() {
            return Err(BuildError::InvalidArgument {
                message: "a void function cannot return a value".to_string(),
            });
        }
        let expr = self.produce(value)?;
        let expr = self.coerce(expr, &ty, "return")?;
        let label = self.scope.return_label();
        self.append(Node::Return {
            label,
            value: Some(expr),
        });
        Ok(self)
    }

    /// Throw an exception object.
    pub fn throw(&mut self, exception: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let expr = self.produce(exception)?;
        let ty = expr.data_type();
        if !self.registry.is_exception(&ty) {
            return Err(typecheck::mismatch(
                "throw",
                &DataType::named(opgraph_core::exceptions::EXCEPTION),
                &ty,
            ));
        }
        self.append(Node::Throw(Some(expr)));
        Ok(self)
    }

    /// Re-raise the exception being handled.
    pub fn rethrow(&mut self) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        if !self.scope.in_catch() {
            return Err(BuildError::RethrowOutsideCatch);
        }
        self.append(Node::Throw(None));
        Ok(self)
    }

    // ==========================================================================
    // Labels and jumps
    // ==========================================================================

    /// Declare and place a label here.
    pub fn insert_label(&mut self, name: &str) -> Result<&mut Self, BuildError> {
        self.insert_label_id(name)?;
        Ok(self)
    }

    /// Declare and place a label here, returning its identity.
    pub fn insert_label_id(&mut self, name: &str) -> Result<LabelId, BuildError> {
        self.ensure_statements()?;
        let id = self.scope.declare_label(name)?;
        self.scope.place_label(id)?;
        self.append(Node::Label(id));
        Ok(id)
    }

    /// Declare a label to be placed later with [`place_label`](Self::place_label).
    pub fn declare_label(&mut self, name: &str) -> Result<LabelId, BuildError> {
        self.scope.declare_label(name)
    }

    /// Place a previously declared label here.
    pub fn place_label(&mut self, id: LabelId) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        self.scope.place_label(id)?;
        self.append(Node::Label(id));
        Ok(self)
    }

    /// Jump to a named label, which may be declared later.
    pub fn goto(&mut self, name: &str) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let target = self.scope.reference_label(name)?;
        self.append(Node::Goto {
            target,
            kind: JumpKind::Goto,
        });
        Ok(self)
    }

    /// Jump to a label by identity.
    pub fn goto_label(&mut self, id: LabelId) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        self.scope.reference_label_id(id)?;
        self.append(Node::Goto {
            target: id,
            kind: JumpKind::Goto,
        });
        Ok(self)
    }

    /// Leave the innermost loop.
    pub fn break_(&mut self) -> Result<&mut Self, BuildError> {
        self.jump(false)
    }

    /// Start the next iteration of the innermost loop.
    pub fn continue_(&mut self) -> Result<&mut Self, BuildError> {
        self.jump(true)
    }

    fn jump(&mut self, want_continue: bool) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let target = self.scope.loop_label(want_continue)?;
        let kind = if want_continue {
            JumpKind::Continue
        } else {
            JumpKind::Break
        };
        self.append(Node::Goto { target, kind });
        Ok(self)
    }

    // ==========================================================================
    // Closing
    // ==========================================================================

    /// Close the innermost construct.
    ///
    /// Closes loop, foreach, using and case bodies; on an if, try or a
    /// switch with no open section it behaves like `end_if`, `end_try` or
    /// `end_switch`.
    pub fn end(&mut self) -> Result<&mut Self, BuildError> {
        match &self.top().kind {
            FrameKind::Root => Err(BuildError::state("end() with no open construct")),
            FrameKind::If { .. } => self.end_if(),
            FrameKind::Try { .. } => self.end_try(),
            FrameKind::Switch { section: None, .. } => self.end_switch(),
            FrameKind::Switch { .. } => self.end_section(),
            FrameKind::Loop { .. } | FrameKind::Foreach { .. } => self.end_loop(),
            FrameKind::Using { .. } => self.end_using(),
        }
    }

    /// Validate the whole graph and produce the function.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn finish(self) -> Result<Function, BuildError> {
        if let Some(err) = self.parameter_error {
            return Err(err);
        }
        if self.frames.len() > 1 {
            return Err(BuildError::UnclosedConstruct {
                construct: self.top().kind.name(),
            });
        }
        if let Some(name) = self.scope.unresolved_labels().first() {
            return Err(BuildError::UnresolvedLabel {
                name: name.to_string(),
            });
        }

        let body = self
            .frames
            .into_iter()
            .next()
            .map(|root| root.body)
            .unwrap_or_default();
        let function = Function {
            parameters: self.scope.parameters().to_vec(),
            return_type: self.scope.return_type().clone(),
            return_label: self.scope.return_label(),
            allow_outer_capture: self.scope.allow_outer_capture(),
            variables: self.scope.locals().to_vec(),
            labels: self.scope.label_defs().to_vec(),
            body,
        };
        tracing::debug!(
            "finished function: {} parameter(s), {} local(s), {} label(s), {} top-level node(s)",
            function.parameters.len(),
            function.variables.len(),
            function.labels.len(),
            function.body.len()
        );
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::{Lambda, LambdaParam};
    use opgraph_core::Value;
    use pretty_assertions::assert_eq;

    pub(super) fn builder(params: Vec<Param>, ret: DataType) -> FunctionBuilder {
        FunctionBuilder::new(Rc::new(TypeRegistry::with_builtins()), params, ret)
    }

    #[test]
    fn anonymous_parameters_are_numbered() {
        let b = builder(
            vec![
                Param::anon(DataType::Int32),
                Param::named("x", DataType::Bool),
                Param::anon(DataType::String),
            ],
            DataType::Void,
        );
        let f = b.finish().unwrap();
        let names: Vec<&str> = f.parameters.iter().map(|p| &*p.name).collect();
        assert_eq!(names, vec!["p1", "x", "p3"]);
    }

    #[test]
    fn duplicate_parameter_surfaces_at_finish() {
        let b = builder(
            vec![
                Param::named("a", DataType::Int32),
                Param::named("a", DataType::Int32),
            ],
            DataType::Void,
        );
        assert_eq!(
            b.finish().unwrap_err(),
            BuildError::DuplicateVariable { name: "a".into() }
        );
    }

    #[test]
    fn set_declares_once() {
        let mut b = builder(vec![], DataType::Void);
        b.set("x", Expr::constant(1)).unwrap();
        b.set("x", Expr::constant(2)).unwrap();
        let f = b.finish().unwrap();
        assert_eq!(f.variables.len(), 1);
        assert_eq!(f.body.len(), 3);
    }

    #[test]
    fn set_widens_into_declared_type() {
        let mut b = builder(vec![], DataType::Void);
        b.declare("d", DataType::Float64).unwrap();
        b.set("d", Expr::constant(3)).unwrap();
        let f = b.finish().unwrap();
        assert_eq!(
            f.body[1],
            Node::Assign {
                target: opgraph_core::Variable::new("d", DataType::Float64),
                value: Expr::convert(Expr::constant(3), DataType::Float64),
            }
        );
    }

    #[test]
    fn set_rejects_narrowing() {
        let mut b = builder(vec![], DataType::Void);
        b.declare("i", DataType::Int32).unwrap();
        assert!(matches!(
            b.set("i", Expr::constant(1.5)),
            Err(BuildError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn set_typed_conflicts_with_declaration() {
        let mut b = builder(vec![], DataType::Void);
        b.declare("i", DataType::Int32).unwrap();
        assert!(matches!(
            b.set_typed("i", DataType::Int64, Expr::constant(1i64)),
            Err(BuildError::TypeMismatch { .. })
        ));
        b.set_typed("l", DataType::Int64, Expr::constant(1)).unwrap();
        assert_eq!(b.scope().variable("l").unwrap().ty, DataType::Int64);
    }

    #[test]
    fn duplicate_declaration() {
        let mut b = builder(vec![], DataType::Void);
        b.declare("x", DataType::Int32).unwrap();
        assert_eq!(
            b.declare("x", DataType::Int32).err(),
            Some(BuildError::DuplicateVariable { name: "x".into() })
        );
    }

    #[test]
    fn failed_call_leaves_builder_unchanged() {
        let mut b = builder(vec![], DataType::Void);
        let bad = Lambda::build(vec![LambdaParam::new("nope", DataType::Int32)], |p: &[Expr]| {
            p[0].clone()
        });
        assert!(b.set("y", bad).is_err());
        assert!(b.scope().variable("y").is_none());
        assert!(b.finish().unwrap().body.is_empty());
    }

    #[test]
    fn return_checks_function_type() {
        let mut b = builder(vec![], DataType::Int32);
        assert!(b.ret().is_err());
        assert!(b.ret_value(Expr::constant("s")).is_err());
        b.ret_value(Expr::constant(1)).unwrap();

        let mut v = builder(vec![], DataType::Void);
        assert!(v.ret_value(Expr::constant(1)).is_err());
        v.ret().unwrap();
    }

    #[test]
    fn throw_requires_exception() {
        let mut b = builder(vec![], DataType::Void);
        assert!(matches!(
            b.throw(Expr::constant("boom")),
            Err(BuildError::TypeMismatch { .. })
        ));
        let ex = Expr::typed_constant(
            Value::exception(opgraph_core::exceptions::ARGUMENT, "bad"),
            DataType::named(opgraph_core::exceptions::ARGUMENT),
        );
        b.throw(ex).unwrap();
    }

    #[test]
    fn rethrow_outside_catch() {
        let mut b = builder(vec![], DataType::Void);
        assert_eq!(b.rethrow().err(), Some(BuildError::RethrowOutsideCatch));
    }

    #[test]
    fn break_outside_loop() {
        let mut b = builder(vec![], DataType::Void);
        let err = b.break_().err().unwrap();
        assert_eq!(err, BuildError::NotInLoop { statement: "break" });
        assert!(err.is_state_error());
        assert!(b.continue_().is_err());
    }

    #[test]
    fn forward_goto_resolves_at_finish() {
        let mut b = builder(vec![], DataType::Void);
        b.goto("skip").unwrap();
        b.act(Expr::constant(1)).unwrap();
        b.insert_label("skip").unwrap();
        let f = b.finish().unwrap();
        let (Node::Goto { target, .. }, Node::Label(placed)) = (&f.body[0], &f.body[2]) else {
            panic!("unexpected body {:?}", f.body);
        };
        assert_eq!(target, placed);
    }

    #[test]
    fn unplaced_goto_fails_finish() {
        let mut b = builder(vec![], DataType::Void);
        b.goto("nowhere").unwrap();
        assert_eq!(
            b.finish().unwrap_err(),
            BuildError::UnresolvedLabel { name: "nowhere".into() }
        );
    }

    #[test]
    fn declared_label_placed_later() {
        let mut b = builder(vec![], DataType::Void);
        let id = b.declare_label("later").unwrap();
        b.goto_label(id).unwrap();
        assert!(b.place_label(id).is_ok());
        assert!(b.place_label(id).is_err());
        assert!(b.finish().is_ok());
    }

    #[test]
    fn duplicate_label_name() {
        let mut b = builder(vec![], DataType::Void);
        b.insert_label("top").unwrap();
        assert_eq!(
            b.insert_label("top").err(),
            Some(BuildError::DuplicateLabel { name: "top".into() })
        );
    }

    #[test]
    fn end_without_construct() {
        let mut b = builder(vec![], DataType::Void);
        assert!(b.end().unwrap_err().is_state_error());
    }
}
