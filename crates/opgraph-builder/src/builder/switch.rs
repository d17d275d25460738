//! Switch construction.
//!
//! Case values accumulate with `case` until `begin` opens their shared
//! body; `end` closes it. `default` marks the next section as the default
//! one and may share its body with pending case values.

use opgraph_core::{BuildError, Expr, Node, SwitchCase, Value};

use super::FunctionBuilder;
use super::frame::FrameKind;
use crate::lambda::Producer;

impl FunctionBuilder {
    /// Open a switch over `selector`.
    pub fn switch(&mut self, selector: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.ensure_statements()?;
        let selector = self.produce(selector)?;
        if selector.data_type().is_void() {
            return Err(BuildError::InvalidArgument {
                message: "switch selector cannot be void".to_string(),
            });
        }
        self.push_frame(FrameKind::Switch {
            selector,
            cases: Vec::new(),
            pending: Vec::new(),
            pending_default: false,
            has_default: false,
            seen: Vec::new(),
            section: None,
        });
        Ok(self)
    }

    fn idle_switch(&self, operation: &str) -> Result<(), BuildError> {
        match &self.top().kind {
            FrameKind::Switch { section: None, .. } => Ok(()),
            FrameKind::Switch { .. } => Err(BuildError::state(format!(
                "{operation} inside an open section; call end() first"
            ))),
            _ => Err(BuildError::state(format!("{operation} without an open switch"))),
        }
    }

    /// Add a match value for the next section.
    pub fn case(&mut self, value: impl Into<Producer>) -> Result<&mut Self, BuildError> {
        self.idle_switch("case")?;
        let value = self.produce(value)?;
        let FrameKind::Switch {
            selector,
            pending,
            seen,
            ..
        } = &self.top().kind
        else {
            return Err(BuildError::state("case without an open switch"));
        };
        let selector_type = selector.data_type();
        let value = self.coerce(value, &selector_type, "case value")?;
        if let Some(constant) = constant_of(&value) {
            let repeated = seen.contains(constant)
                || pending.iter().filter_map(constant_of).any(|v| v == constant);
            if repeated {
                return Err(BuildError::InvalidArgument {
                    message: format!("duplicate case value {constant}"),
                });
            }
        }
        if let FrameKind::Switch { pending, .. } = &mut self.top_mut().kind {
            pending.push(value);
        }
        Ok(self)
    }

    /// Mark the next section as the default one.
    pub fn default(&mut self) -> Result<&mut Self, BuildError> {
        self.idle_switch("default")?;
        if let FrameKind::Switch {
            pending_default,
            has_default,
            ..
        } = &mut self.top_mut().kind
        {
            if *pending_default || *has_default {
                return Err(BuildError::state("default already defined"));
            }
            *pending_default = true;
        }
        Ok(self)
    }

    /// Open the body shared by the pending values.
    pub fn begin(&mut self) -> Result<&mut Self, BuildError> {
        self.idle_switch("begin")?;
        if let FrameKind::Switch {
            pending,
            pending_default,
            has_default,
            seen,
            section,
            ..
        } = &mut self.top_mut().kind
        {
            if pending.is_empty() && !*pending_default {
                return Err(BuildError::state("begin() requires a case or default"));
            }
            let values = std::mem::take(pending);
            seen.extend(values.iter().filter_map(constant_of).cloned());
            let is_default = std::mem::take(pending_default);
            *has_default |= is_default;
            *section = Some((values, is_default));
        }
        Ok(self)
    }

    pub(super) fn end_section(&mut self) -> Result<&mut Self, BuildError> {
        let frame = self.top_mut();
        let body = std::mem::take(&mut frame.body);
        if let FrameKind::Switch { cases, section, .. } = &mut frame.kind {
            if let Some((values, is_default)) = section.take() {
                cases.push(SwitchCase {
                    values,
                    is_default,
                    body,
                });
            }
        }
        Ok(self)
    }

    /// Close the switch and append it.
    pub fn end_switch(&mut self) -> Result<&mut Self, BuildError> {
        self.idle_switch("end_switch")?;
        if let FrameKind::Switch {
            cases,
            pending,
            pending_default,
            ..
        } = &self.top().kind
        {
            if !pending.is_empty() || *pending_default {
                return Err(BuildError::state("case values without a body"));
            }
            if cases.is_empty() {
                return Err(BuildError::EmptySwitch);
            }
        }
        let frame = self.pop_frame();
        if let FrameKind::Switch { selector, cases, .. } = frame.kind {
            self.append(Node::Switch { selector, cases });
        }
        Ok(self)
    }
}

fn constant_of(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Constant { value, .. } => Some(value),
        Expr::Convert { operand, .. } => constant_of(operand),
        _ => None,
    }
}
