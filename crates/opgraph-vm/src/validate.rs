//! Pre-execution checks on a lowered graph.
//!
//! A graph is accepted only when:
//!
//! - every variable it reads or writes is a parameter or declared local,
//!   and every named type it mentions is registered
//! - every jump targets a label placed in the same or an enclosing block;
//!   a loop's break and continue labels are visible inside its body and
//!   the return label is visible everywhere
//! - rethrow appears only inside a catch handler
//! - it uses no fault blocks, exception filters or foreign call-site
//!   binders

use rustc_hash::FxHashSet;

use opgraph_core::{BackendError, DataType, Expr, Function, LabelId, Node, Variable};
use opgraph_registry::TypeRegistry;

pub(crate) fn validate(function: &Function, registry: &TypeRegistry) -> Result<(), BackendError> {
    let mut validator = Validator {
        function,
        registry,
        declared: FxHashSet::default(),
        scopes: Vec::new(),
        catch_depth: 0,
    };
    validator.check_type(&function.return_type)?;
    for variable in function.parameters.iter().chain(&function.variables) {
        validator.check_type(&variable.ty)?;
        validator.declared.insert(&*variable.name);
    }
    validator.block(&function.body)
}

struct Validator<'f> {
    function: &'f Function,
    registry: &'f TypeRegistry,
    declared: FxHashSet<&'f str>,
    /// Labels visible at the current position, one set per open block.
    scopes: Vec<FxHashSet<LabelId>>,
    catch_depth: usize,
}

impl<'f> Validator<'f> {
    fn block(&mut self, nodes: &'f [Node]) -> Result<(), BackendError> {
        let placed = nodes
            .iter()
            .filter_map(|node| match node {
                Node::Label(id) => Some(*id),
                _ => None,
            })
            .collect();
        self.scoped(placed, |v| nodes.iter().try_for_each(|node| v.node(node)))
    }

    fn scoped(
        &mut self,
        labels: FxHashSet<LabelId>,
        body: impl FnOnce(&mut Self) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        self.scopes.push(labels);
        let result = body(self);
        self.scopes.pop();
        result
    }

    fn node(&mut self, node: &'f Node) -> Result<(), BackendError> {
        match node {
            Node::Sequence(body) => self.block(body),
            Node::Declare(variable) => self.variable(variable),
            Node::Assign { target, value } => {
                self.variable(target)?;
                self.expr(value)
            }
            Node::Act(value) => self.expr(value),
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition)?;
                self.block(then_branch)?;
                else_branch.as_deref().map_or(Ok(()), |b| self.block(b))
            }
            Node::Loop {
                condition,
                body,
                break_label,
                continue_label,
            } => {
                if let Some(condition) = condition {
                    self.expr(condition)?;
                }
                let loop_labels = [*break_label, *continue_label].into_iter().collect();
                self.scoped(loop_labels, |v| v.block(body))
            }
            Node::Switch { selector, cases } => {
                self.expr(selector)?;
                for case in cases {
                    case.values.iter().try_for_each(|value| self.expr(value))?;
                    self.block(&case.body)?;
                }
                Ok(())
            }
            Node::Try {
                body,
                handlers,
                finally,
                fault,
            } => {
                if fault.is_some() {
                    return Err(unsupported("a fault block"));
                }
                self.block(body)?;
                for handler in handlers {
                    if handler.filter.is_some() {
                        return Err(unsupported("an exception filter"));
                    }
                    if let Some(test) = &handler.test {
                        self.check_type(test)?;
                    }
                    if let Some(variable) = &handler.variable {
                        self.variable(variable)?;
                    }
                    self.catch_depth += 1;
                    let result = self.block(&handler.body);
                    self.catch_depth -= 1;
                    result?;
                }
                finally.as_deref().map_or(Ok(()), |b| self.block(b))
            }
            Node::Using {
                resource,
                value,
                body,
            } => {
                self.variable(resource)?;
                self.expr(value)?;
                self.block(body)
            }
            Node::Throw(Some(value)) => self.expr(value),
            Node::Throw(None) if self.catch_depth == 0 => Err(BackendError::RethrowOutsideCatch),
            Node::Throw(None) => Ok(()),
            Node::Return { label, value } => {
                self.jump(*label)?;
                value.as_ref().map_or(Ok(()), |value| self.expr(value))
            }
            Node::Goto { target, .. } => self.jump(*target),
            Node::Label(_) => Ok(()),
        }
    }

    fn jump(&self, target: LabelId) -> Result<(), BackendError> {
        if target == self.function.return_label
            || self.scopes.iter().any(|scope| scope.contains(&target))
        {
            return Ok(());
        }
        let label = self
            .function
            .label_name(target)
            .map_or_else(|| format!("#{}", target.0), str::to_string);
        Err(BackendError::UnreachableLabel { label })
    }

    fn expr(&self, expr: &Expr) -> Result<(), BackendError> {
        let mut failure = None;
        expr.walk(&mut |e| {
            if failure.is_some() {
                return;
            }
            failure = match e {
                Expr::Variable(variable) => self.variable(variable).err(),
                Expr::Convert { ty, .. } => self.check_type(ty).err(),
                Expr::Dynamic { site, .. } if !site.binder.is_supported() => Some(unsupported(
                    &format!("call-site binder '{}'", site.binder.kind_name()),
                )),
                Expr::Extension(extension) => Some(BackendError::IrreducibleExtension {
                    name: extension.0.name().to_string(),
                }),
                _ => None,
            };
        });
        failure.map_or(Ok(()), Err)
    }

    fn variable(&self, variable: &Variable) -> Result<(), BackendError> {
        if self.declared.contains(&*variable.name) {
            Ok(())
        } else {
            Err(BackendError::UndeclaredVariable {
                name: variable.name.to_string(),
            })
        }
    }

    fn check_type(&self, ty: &DataType) -> Result<(), BackendError> {
        if self.registry.is_known(ty) {
            Ok(())
        } else {
            Err(BackendError::UnknownType {
                name: ty.friendly_name(true),
            })
        }
    }
}

fn unsupported(construct: &str) -> BackendError {
    BackendError::Unsupported {
        construct: construct.to_string(),
    }
}
