//! Scope context shared by every open construct of one function.
//!
//! This module provides `ScopeContext`, which tracks:
//! - Declared variables (parameters and locals), unique function-wide
//! - Read-only variables: `using` resources and foreach iterators
//! - Declared labels, including forward references from `goto`
//! - The stack of enclosing loop labels for `break`/`continue`
//! - The return label and type
//! - Whether a catch body is currently open (gates `rethrow`)
//!
//! Visibility is flat: a name declared inside a branch stays visible after
//! the branch closes and may not be declared again anywhere in the function.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use opgraph_core::{BuildError, DataType, LabelDef, LabelId, Variable};

// ============================================================================
// Types
// ============================================================================

/// Break and continue targets of one open loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLabels {
    pub break_label: LabelId,
    pub continue_label: LabelId,
}

/// Proof that a catch body was entered; hand it back to
/// [`ScopeContext::exit_catch`] to restore the previous state.
#[must_use = "a catch guard must be returned to exit_catch"]
#[derive(Debug)]
pub struct CatchGuard {
    previous: bool,
}

// ============================================================================
// ScopeContext
// ============================================================================

/// Per-function scope state.
#[derive(Debug)]
pub struct ScopeContext {
    /// Every declared name, parameters included.
    variables: FxHashMap<Rc<str>, Variable>,
    parameters: Vec<Variable>,
    /// Locals in declaration order.
    locals: Vec<Variable>,
    /// Bound by `using` or `foreach`; never reassigned.
    read_only: FxHashSet<Rc<str>>,

    labels: FxHashMap<Rc<str>, LabelId>,
    /// Names referenced by `goto` before being declared.
    pending: FxHashMap<Rc<str>, LabelId>,
    label_defs: Vec<LabelDef>,
    placed: FxHashSet<LabelId>,
    referenced: Vec<LabelId>,
    next_label: u32,

    loops: Vec<LoopLabels>,
    return_label: LabelId,
    return_type: DataType,
    allow_outer_capture: bool,
    in_catch: bool,
    next_hidden: u32,
}

impl ScopeContext {
    /// Create the scope of a function returning `return_type`.
    pub fn new(return_type: DataType, allow_outer_capture: bool) -> Self {
        let mut scope = Self {
            variables: FxHashMap::default(),
            parameters: Vec::new(),
            locals: Vec::new(),
            read_only: FxHashSet::default(),
            labels: FxHashMap::default(),
            pending: FxHashMap::default(),
            label_defs: Vec::new(),
            placed: FxHashSet::default(),
            referenced: Vec::new(),
            next_label: 0,
            loops: Vec::new(),
            return_label: LabelId(0),
            return_type,
            allow_outer_capture,
            in_catch: false,
            next_hidden: 0,
        };
        scope.return_label = scope.hidden_label("return");
        scope
    }

    // ==========================================================================
    // Variables
    // ==========================================================================

    /// Check that `name` could be declared, without declaring it.
    pub fn check_variable_name(&self, name: &str) -> Result<(), BuildError> {
        if name.trim().is_empty() {
            return Err(BuildError::BlankName { what: "variable" });
        }
        if self.variables.contains_key(name) {
            return Err(BuildError::DuplicateVariable {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Declare a parameter.
    pub fn declare_parameter(&mut self, name: &str, ty: DataType) -> Result<Variable, BuildError> {
        self.check_variable_name(name)?;
        let var = Variable::new(name, ty);
        self.variables.insert(Rc::clone(&var.name), var.clone());
        self.parameters.push(var.clone());
        Ok(var)
    }

    /// Declare a local variable.
    pub fn declare_variable(&mut self, name: &str, ty: DataType) -> Result<Variable, BuildError> {
        self.check_variable_name(name)?;
        let var = Variable::new(name, ty);
        self.variables.insert(Rc::clone(&var.name), var.clone());
        self.locals.push(var.clone());
        Ok(var)
    }

    /// Forbid assignments to `variable` for the rest of the function.
    pub fn mark_read_only(&mut self, variable: &Variable) {
        self.read_only.insert(Rc::clone(&variable.name));
    }

    /// Check that `name` may be the target of an assignment.
    pub fn check_assignable(&self, name: &str) -> Result<(), BuildError> {
        if self.read_only.contains(name) {
            return Err(BuildError::state(format!(
                "'{name}' is a disposable binding and cannot be assigned"
            )));
        }
        Ok(())
    }

    /// Look up a parameter or local.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Check if a name is declared.
    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }

    /// Locals in declaration order.
    pub fn locals(&self) -> &[Variable] {
        &self.locals
    }

    /// A fresh name for a compiler-introduced variable, e.g. `$it0`.
    pub fn hidden_name(&mut self, prefix: &str) -> String {
        loop {
            let name = format!("${prefix}{}", self.next_hidden);
            self.next_hidden += 1;
            if !self.variables.contains_key(name.as_str()) {
                return name;
            }
        }
    }

    // ==========================================================================
    // Labels
    // ==========================================================================

    /// Check that a label named `name` could be declared.
    pub fn check_label_name(&self, name: &str) -> Result<(), BuildError> {
        if name.trim().is_empty() {
            return Err(BuildError::BlankName { what: "label" });
        }
        if self.labels.contains_key(name) {
            return Err(BuildError::DuplicateLabel {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Declare a named label. A name already used by a forward `goto`
    /// keeps the identity handed out then.
    pub fn declare_label(&mut self, name: &str) -> Result<LabelId, BuildError> {
        self.check_label_name(name)?;
        let id = match self.pending.remove(name) {
            Some(id) => id,
            None => self.new_label(name),
        };
        self.labels.insert(Rc::from(name), id);
        Ok(id)
    }

    /// Mark a declared label as placed in the body.
    pub fn place_label(&mut self, id: LabelId) -> Result<(), BuildError> {
        let name = self.label_name(id).ok_or_else(|| BuildError::InvalidArgument {
            message: format!("label {id} does not belong to this function"),
        })?;
        if self.pending.values().any(|pending| *pending == id) {
            return Err(BuildError::InvalidArgument {
                message: format!("label '{name}' must be declared before it is placed"),
            });
        }
        if self.placed.contains(&id) {
            return Err(BuildError::DuplicateLabel {
                name: name.to_string(),
            });
        }
        self.placed.insert(id);
        Ok(())
    }

    /// Check whether a label id was handed out by this scope.
    pub fn owns_label(&self, id: LabelId) -> bool {
        self.label_defs.iter().any(|def| def.id == id)
    }

    /// Whether a label has been placed.
    pub fn is_placed(&self, id: LabelId) -> bool {
        self.placed.contains(&id)
    }

    /// Identity of a named label, reserving one for a forward reference.
    pub fn reference_label(&mut self, name: &str) -> Result<LabelId, BuildError> {
        if name.trim().is_empty() {
            return Err(BuildError::BlankName { what: "label" });
        }
        let id = match self.labels.get(name).or_else(|| self.pending.get(name)) {
            Some(&id) => id,
            None => {
                let id = self.new_label(name);
                self.pending.insert(Rc::from(name), id);
                id
            }
        };
        self.referenced.push(id);
        Ok(id)
    }

    /// Record a jump to a label known by identity.
    pub fn reference_label_id(&mut self, id: LabelId) -> Result<(), BuildError> {
        if !self.owns_label(id) {
            return Err(BuildError::InvalidArgument {
                message: format!("label {id} does not belong to this function"),
            });
        }
        self.referenced.push(id);
        Ok(())
    }

    /// A compiler-introduced label; placed by the construct owning it.
    pub fn hidden_label(&mut self, name: &str) -> LabelId {
        let id = self.new_label(name);
        self.placed.insert(id);
        id
    }

    fn new_label(&mut self, name: &str) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        self.label_defs.push(LabelDef {
            id,
            name: Rc::from(name),
        });
        id
    }

    /// Name of a label.
    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.label_defs
            .iter()
            .find(|def| def.id == id)
            .map(|def| &*def.name)
    }

    /// Every label handed out so far.
    pub fn label_defs(&self) -> &[LabelDef] {
        &self.label_defs
    }

    /// Labels that were jumped to but never placed, in reference order.
    pub fn unresolved_labels(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.referenced
            .iter()
            .filter(|id| !self.placed.contains(id) && seen.insert(**id))
            .filter_map(|id| self.label_name(*id))
            .collect()
    }

    // ==========================================================================
    // Loops
    // ==========================================================================

    /// Enter a loop with fresh break/continue labels.
    pub fn push_loop(&mut self) -> LoopLabels {
        let labels = LoopLabels {
            break_label: self.hidden_label("break"),
            continue_label: self.hidden_label("continue"),
        };
        self.loops.push(labels);
        labels
    }

    /// Leave the innermost loop.
    pub fn pop_loop(&mut self) -> Option<LoopLabels> {
        self.loops.pop()
    }

    /// Target of `break` (or `continue`) in the nearest open loop.
    pub fn loop_label(&self, want_continue: bool) -> Result<LabelId, BuildError> {
        let labels = self.loops.last().ok_or(BuildError::NotInLoop {
            statement: if want_continue { "continue" } else { "break" },
        })?;
        Ok(if want_continue {
            labels.continue_label
        } else {
            labels.break_label
        })
    }

    /// Number of open loops.
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    // ==========================================================================
    // Function-level state
    // ==========================================================================

    pub fn return_label(&self) -> LabelId {
        self.return_label
    }

    pub fn return_type(&self) -> &DataType {
        &self.return_type
    }

    pub fn allow_outer_capture(&self) -> bool {
        self.allow_outer_capture
    }

    /// Enter a catch body; rethrow becomes legal.
    pub fn enter_catch(&mut self) -> CatchGuard {
        let guard = CatchGuard {
            previous: self.in_catch,
        };
        self.in_catch = true;
        guard
    }

    /// Leave a catch body, restoring the state seen by `enter_catch`.
    pub fn exit_catch(&mut self, guard: CatchGuard) {
        self.in_catch = guard.previous;
    }

    /// Whether an argument-less rethrow is legal here.
    pub fn in_catch(&self) -> bool {
        self.in_catch
    }
}
