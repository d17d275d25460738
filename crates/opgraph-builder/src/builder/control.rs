//! If chains, loops, foreach and using.

use opgraph_core::{BuildError, DataType, Expr, Node};

use super::FunctionBuilder;
use super::frame::FrameKind;
use crate::lambda::Producer;
use crate::typecheck;

impl FunctionBuilder {
    // ==========================================================================
    // If
    // ==========================================================================

    /// Open an if; statements go to the then branch.
    pub fn if_(&mut self, condition: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let condition = self.produce_bool(condition, "if condition")?;
        self.push_frame(FrameKind::If {
            clauses: Vec::new(),
            condition: Some(condition),
        });
        Ok(self)
    }

    /// Close the current branch and open an else-if branch.
    pub fn else_if(&mut self, condition: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        match &self.top().kind {
            FrameKind::If {
                condition: Some(_), ..
            } => {}
            FrameKind::If { condition: None, .. } => {
                return Err(BuildError::state("else-if after else"));
            }
            _ => return Err(BuildError::state("else-if without an open if")),
        }
        let condition = self.produce_bool(condition, "else-if condition")?;
        self.close_clause(Some(condition));
        Ok(self)
    }

    /// Close the current branch and open the else branch.
    pub fn else_(&mut self) -> Result<&mut Self, BuildError> {
        match &self.top().kind {
            FrameKind::If {
                condition: Some(_), ..
            } => {}
            FrameKind::If { condition: None, .. } => {
                return Err(BuildError::state("else already defined"));
            }
            _ => return Err(BuildError::state("else without an open if")),
        }
        self.close_clause(None);
        Ok(self)
    }

    fn close_clause(&mut self, next: Option<Expr>) {
        let frame = self.top_mut();
        let body = std::mem::take(&mut frame.body);
        if let FrameKind::If { clauses, condition } = &mut frame.kind {
            if let Some(done) = condition.take() {
                clauses.push((done, body));
            }
            *condition = next;
        }
    }

    /// Close the if and append the assembled chain.
    pub fn end_if(&mut self) -> Result<&mut Self, BuildError> {
        if !matches!(self.top().kind, FrameKind::If { .. }) {
            return Err(BuildError::state("end_if without an open if"));
        }
        let frame = self.pop_frame();
        let FrameKind::If {
            mut clauses,
            condition,
        } = frame.kind
        else {
            return Err(BuildError::state("end_if without an open if"));
        };
        let mut tail = match condition {
            Some(last) => {
                clauses.push((last, frame.body));
                None
            }
            None => Some(frame.body),
        };
        for (condition, then_branch) in clauses.into_iter().rev() {
            tail = Some(vec![Node::If {
                condition,
                then_branch,
                else_branch: tail.take(),
            }]);
        }
        if let Some(node) = tail.and_then(|mut nodes| nodes.pop()) {
            self.append(node);
        }
        Ok(self)
    }

    // ==========================================================================
    // Loops
    // ==========================================================================

    /// Open a loop re-checking `condition` before every iteration.
    pub fn while_(&mut self, condition: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let condition = self.produce_bool(condition, "loop condition")?;
        let labels = self.scope.push_loop();
        self.push_frame(FrameKind::Loop {
            condition: Some(condition),
            labels,
        });
        Ok(self)
    }

    /// Open an unconditional loop, left through `break_`, `ret` or `throw`.
    pub fn do_(&mut self) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let labels = self.scope.push_loop();
        self.push_frame(FrameKind::Loop {
            condition: None,
            labels,
        });
        Ok(self)
    }

    /// Open a loop over a sequence, binding each element to `name`.
    ///
    /// Lowers to a declaration of the element, a `using` of a hidden
    /// iterator and a loop conditioned on advancing it.
    pub fn foreach(
        &mut self,
        name: &str,
        collection: impl Into<Producer>,
    ) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let collection = self.produce(collection)?;
        let ty = collection.data_type();
        let DataType::Sequence(element_type) = &ty else {
            return Err(typecheck::mismatch(
                "foreach",
                &DataType::sequence(DataType::Object),
                &ty,
            ));
        };
        self.scope.check_variable_name(name)?;

        let element = self.scope.declare_variable(name, (**element_type).clone())?;
        let hidden = self.scope.hidden_name("it");
        let iterator = self
            .scope
            .declare_variable(&hidden, DataType::iterator((**element_type).clone()))?;
        self.scope.mark_read_only(&iterator);
        let labels = self.scope.push_loop();
        self.push_frame(FrameKind::Foreach {
            element,
            iterator,
            collection,
            labels,
        });
        Ok(self)
    }

    pub(super) fn end_loop(&mut self) -> Result<&mut Self, BuildError> {
        let frame = self.pop_frame();
        self.scope.pop_loop();
        let node = match frame.kind {
            FrameKind::Loop { condition, labels } => Node::Loop {
                condition,
                body: frame.body,
                break_label: labels.break_label,
                continue_label: labels.continue_label,
            },
            FrameKind::Foreach {
                element,
                iterator,
                collection,
                labels,
            } => {
                let cursor = Expr::Variable(iterator.clone());
                let mut body = Vec::with_capacity(frame.body.len() + 1);
                body.push(Node::Assign {
                    target: element.clone(),
                    value: Expr::iter_current(cursor.clone()),
                });
                body.extend(frame.body);
                Node::Sequence(vec![
                    Node::Declare(element),
                    Node::Using {
                        resource: iterator,
                        value: Expr::iter_begin(collection),
                        body: vec![Node::Loop {
                            condition: Some(Expr::iter_next(cursor)),
                            body,
                            break_label: labels.break_label,
                            continue_label: labels.continue_label,
                        }],
                    },
                ])
            }
            other => {
                return Err(BuildError::state(format!(
                    "end of loop while '{}' is open",
                    other.name()
                )));
            }
        };
        self.append(node);
        Ok(self)
    }

    // ==========================================================================
    // Using
    // ==========================================================================

    /// Bind a disposable resource to `name` for the body; it is disposed
    /// on every exit.
    pub fn using(
        &mut self,
        name: &str,
        resource: impl Into<Producer>,
    ) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let value = self.produce(resource)?;
        let ty = value.data_type();
        if !self.registry.is_disposable(&ty) {
            return Err(BuildError::InvalidArgument {
                message: format!("'{}' is not disposable", ty.friendly_name(true)),
            });
        }
        let resource = self.scope.declare_variable(name, ty)?;
        self.scope.mark_read_only(&resource);
        self.push_frame(FrameKind::Using { resource, value });
        Ok(self)
    }

    pub(super) fn end_using(&mut self) -> Result<&mut Self, BuildError> {
        let frame = self.pop_frame();
        let FrameKind::Using { resource, value } = frame.kind else {
            return Err(BuildError::state("end of using while another construct is open"));
        };
        self.append(Node::Using {
            resource,
            value,
            body: frame.body,
        });
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::builder;
    use super::*;
    use crate::lambda::{Lambda, LambdaParam};
    use opgraph_core::{JumpKind, LabelId, Value};
    use pretty_assertions::assert_eq;

    fn flag(name: &str) -> Expr {
        Expr::var(name, DataType::Bool)
    }

    #[test]
    fn else_if_chain_is_right_nested() {
        let mut b = builder(vec![], DataType::Void);
        b.declare("a", DataType::Bool).unwrap();
        b.declare("c", DataType::Bool).unwrap();
        b.if_(flag("a"))
            .unwrap()
            .act(Expr::constant(1))
            .unwrap()
            .else_if(flag("c"))
            .unwrap()
            .act(Expr::constant(2))
            .unwrap()
            .else_()
            .unwrap()
            .act(Expr::constant(3))
            .unwrap()
            .end_if()
            .unwrap();
        let f = b.finish().unwrap();
        assert_eq!(
            f.body[2],
            Node::If {
                condition: flag("a"),
                then_branch: vec![Node::Act(Expr::constant(1))],
                else_branch: Some(vec![Node::If {
                    condition: flag("c"),
                    then_branch: vec![Node::Act(Expr::constant(2))],
                    else_branch: Some(vec![Node::Act(Expr::constant(3))]),
                }]),
            }
        );
    }

    #[test]
    fn double_else_is_state_error() {
        let mut b = builder(vec![], DataType::Void);
        b.if_(Expr::constant(true)).unwrap().else_().unwrap();
        let err = b.else_().err().unwrap();
        assert!(err.is_state_error());
        assert!(b.else_if(Expr::constant(false)).unwrap_err().is_state_error());
        b.end_if().unwrap();
        assert!(b.finish().is_ok());
    }

    #[test]
    fn if_requires_bool() {
        let mut b = builder(vec![], DataType::Void);
        assert!(matches!(
            b.if_(Expr::constant(1)),
            Err(BuildError::TypeMismatch { .. })
        ));
        assert_eq!(b.depth(), 0);
    }

    #[test]
    fn end_closes_if() {
        let mut b = builder(vec![], DataType::Void);
        b.if_(Expr::constant(true)).unwrap().end().unwrap();
        let f = b.finish().unwrap();
        assert!(matches!(&f.body[0], Node::If { else_branch: None, .. }));
    }

    #[test]
    fn unclosed_if_fails_finish() {
        let mut b = builder(vec![], DataType::Void);
        b.if_(Expr::constant(true)).unwrap();
        assert_eq!(
            b.finish().unwrap_err(),
            BuildError::UnclosedConstruct { construct: "if" }
        );
    }

    #[test]
    fn nested_loops_break_to_nearest() {
        let mut b = builder(vec![], DataType::Void);
        b.do_().unwrap().while_(Expr::constant(true)).unwrap();
        b.break_().unwrap().end().unwrap();
        b.continue_().unwrap().end().unwrap();
        let f = b.finish().unwrap();
        let Node::Loop {
            body: outer_body,
            continue_label: outer_continue,
            ..
        } = &f.body[0]
        else {
            panic!("expected loop");
        };
        let Node::Loop {
            body: inner_body,
            break_label: inner_break,
            ..
        } = &outer_body[0]
        else {
            panic!("expected inner loop");
        };
        assert_eq!(
            inner_body[0],
            Node::Goto {
                target: *inner_break,
                kind: JumpKind::Break
            }
        );
        assert_eq!(
            outer_body[1],
            Node::Goto {
                target: *outer_continue,
                kind: JumpKind::Continue
            }
        );
    }

    #[test]
    fn break_after_loop_closes_fails() {
        let mut b = builder(vec![], DataType::Void);
        b.do_().unwrap().break_().unwrap().end().unwrap();
        assert!(matches!(b.break_(), Err(BuildError::NotInLoop { .. })));
    }

    #[test]
    fn foreach_lowers_to_using_and_loop() {
        let mut b = builder(vec![], DataType::Void);
        let items = Value::sequence(DataType::Int32, vec![Value::Int32(1), Value::Int32(2)]);
        b.declare("sum", DataType::Int32).unwrap();
        b.foreach("x", Expr::constant(items)).unwrap();
        b.set(
            "sum",
            Lambda::build(
                vec![
                    LambdaParam::new("sum", DataType::Int32),
                    LambdaParam::new("x", DataType::Int32),
                ],
                |p: &[Expr]| Expr::add(p[0].clone(), p[1].clone()),
            ),
        )
        .unwrap();
        b.end().unwrap();
        let f = b.finish().unwrap();

        assert!(f.variable("x").is_some());
        assert_eq!(f.variable("$it0").unwrap().ty, DataType::iterator(DataType::Int32));
        let Node::Sequence(parts) = &f.body[1] else {
            panic!("expected lowered foreach");
        };
        assert!(matches!(&parts[0], Node::Declare(v) if &*v.name == "x"));
        let Node::Using { body, .. } = &parts[1] else {
            panic!("expected using");
        };
        let Node::Loop {
            condition: Some(Expr::Iterator { .. }),
            body,
            ..
        } = &body[0]
        else {
            panic!("expected loop");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn foreach_requires_sequence() {
        let mut b = builder(vec![], DataType::Void);
        assert!(b.foreach("x", Expr::constant(3)).is_err());
        assert!(b.scope().variable("x").is_none());
    }

    #[test]
    fn using_requires_disposable() {
        let mut b = builder(vec![], DataType::Void);
        assert!(matches!(
            b.using("r", Expr::constant("text")),
            Err(BuildError::InvalidArgument { .. })
        ));
        let seq = Expr::constant(Value::sequence(DataType::Int32, vec![]));
        b.using("it", Expr::iter_begin(seq)).unwrap().end().unwrap();
        let f = b.finish().unwrap();
        assert!(matches!(&f.body[0], Node::Using { .. }));
    }

    #[test]
    fn using_name_must_be_fresh() {
        let mut b = builder(vec![], DataType::Void);
        b.declare("it", DataType::Int32).unwrap();
        let seq = Expr::constant(Value::sequence(DataType::Int32, vec![]));
        assert!(matches!(
            b.using("it", Expr::iter_begin(seq)),
            Err(BuildError::DuplicateVariable { .. })
        ));
    }

    #[test]
    fn using_resource_cannot_be_reassigned() {
        let mut b = builder(vec![], DataType::Void);
        let seq = || Expr::constant(Value::sequence(DataType::Int32, vec![]));
        b.using("it", Expr::iter_begin(seq())).unwrap();
        let err = b.set("it", Expr::iter_begin(seq())).unwrap_err();
        assert!(err.is_state_error());
        let err = b
            .set_typed("it", DataType::iterator(DataType::Int32), Expr::iter_begin(seq()))
            .unwrap_err();
        assert!(err.is_state_error());
        b.end().unwrap();
        assert!(b.set("it", Expr::iter_begin(seq())).is_err());

        let f = b.finish().unwrap();
        let Node::Using { body, .. } = &f.body[0] else {
            panic!("expected using");
        };
        assert!(body.is_empty());
    }

    #[test]
    fn foreach_iterator_cannot_be_reassigned() {
        let mut b = builder(vec![], DataType::Void);
        let items = Value::sequence(DataType::Int32, vec![Value::Int32(1)]);
        b.foreach("x", Expr::constant(items.clone())).unwrap();
        assert!(
            b.set("$it0", Expr::iter_begin(Expr::constant(items)))
                .unwrap_err()
                .is_state_error()
        );
        b.set("x", Expr::constant(2)).unwrap().end().unwrap();
        assert!(b.finish().is_ok());
    }

    #[test]
    fn goto_out_of_loop() {
        let mut b = builder(vec![], DataType::Void);
        b.do_().unwrap().goto("out").unwrap().end().unwrap();
        let out = b.insert_label_id("out").unwrap();
        assert_ne!(out, LabelId(0));
        assert!(b.finish().is_ok());
    }
}
