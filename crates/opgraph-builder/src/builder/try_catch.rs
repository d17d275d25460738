//! Try / catch / finally construction.

use opgraph_core::{BuildError, CatchHandler, DataType, Node, exceptions};

use super::FunctionBuilder;
use super::frame::{FrameKind, PendingCatch, TryStage};
use crate::typecheck;

impl FunctionBuilder {
    /// Open a protected body.
    pub fn try_(&mut self) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        self.push_frame(FrameKind::Try {
            stage: TryStage::Body,
            body: Vec::new(),
            catch: None,
            handler: None,
            guard: None,
        });
        Ok(self)
    }

    fn try_stage(&self, operation: &str) -> Result<TryStage, BuildError> {
        match &self.top().kind {
            FrameKind::Try { stage, .. } => Ok(*stage),
            _ => Err(BuildError::state(format!("{operation} without an open try"))),
        }
    }

    /// Open the catch clause.
    ///
    /// `exception_type` defaults to catching everything; `bind` names a
    /// fresh variable receiving the exception.
    pub fn catch(
        &mut self,
        exception_type: Option<DataType>,
        bind: Option<&str>,
    ) -> Result<&mut Self, BuildError> {
        match self.try_stage("catch")? {
            TryStage::Body => {}
            TryStage::Catch => return Err(BuildError::state("catch already defined")),
            TryStage::Finally => return Err(BuildError::state("catch after finally")),
        }
        if let Some(ty) = &exception_type {
            if !self.registry.is_exception(ty) {
                return Err(typecheck::mismatch(
                    "catch",
                    &DataType::named(exceptions::EXCEPTION),
                    ty,
                ));
            }
        }
        if let Some(name) = bind {
            self.scope.check_variable_name(name)?;
        }

        let variable = match bind {
            Some(name) => {
                let ty = exception_type
                    .clone()
                    .unwrap_or_else(|| DataType::named(exceptions::EXCEPTION));
                Some(self.scope.declare_variable(name, ty)?)
            }
            None => None,
        };
        let guard = self.scope.enter_catch();
        let frame = self.top_mut();
        let protected = std::mem::take(&mut frame.body);
        if let FrameKind::Try {
            stage,
            body,
            catch,
            guard: slot,
            ..
        } = &mut frame.kind
        {
            *stage = TryStage::Catch;
            *body = protected;
            *catch = Some(PendingCatch {
                test: exception_type,
                variable,
            });
            *slot = Some(guard);
        }
        Ok(self)
    }

    /// Open the finally clause.
    pub fn finally(&mut self) -> Result<&mut Self, BuildError> {
        if self.try_stage("finally")? == TryStage::Finally {
            return Err(BuildError::state("finally already defined"));
        }
        self.close_try_stage();
        if let FrameKind::Try { stage, .. } = &mut self.top_mut().kind {
            *stage = TryStage::Finally;
        }
        Ok(self)
    }

    /// Move the open region's statements to their clause.
    fn close_try_stage(&mut self) {
        let frame = self.top_mut();
        let region = std::mem::take(&mut frame.body);
        let mut released = None;
        if let FrameKind::Try {
            stage,
            body,
            catch,
            handler,
            guard,
        } = &mut frame.kind
        {
            match stage {
                TryStage::Body => *body = region,
                TryStage::Catch => {
                    if let Some(pending) = catch.take() {
                        *handler = Some(CatchHandler {
                            test: pending.test,
                            variable: pending.variable,
                            filter: None,
                            body: region,
                        });
                    }
                    released = guard.take();
                }
                // Finally keeps its statements in the frame body.
                TryStage::Finally => frame.body = region,
            }
        }
        if let Some(guard) = released {
            self.scope.exit_catch(guard);
        }
    }

    /// Close the try and append it.
    pub fn end_try(&mut self) -> Result<&mut Self, BuildError> {
        let stage = self.try_stage("end_try")?;
        if stage == TryStage::Body {
            return Err(BuildError::MissingHandler);
        }
        let finally = if stage == TryStage::Finally {
            Some(std::mem::take(&mut self.top_mut().body))
        } else {
            self.close_try_stage();
            None
        };
        let frame = self.pop_frame();
        if let FrameKind::Try { body, handler, .. } = frame.kind {
            self.append(Node::Try {
                body,
                handlers: handler.into_iter().collect(),
                finally,
                fault: None,
            });
        }
        Ok(self)
    }
}
