//! Frames of the builder stack.
//!
//! Each open construct owns one frame. Statements always go to the body of
//! the top frame; clauses finished so far wait in the frame's kind until
//! the construct's terminator assembles the node.

use opgraph_core::{CatchHandler, DataType, Expr, Node, SwitchCase, Value, Variable};

use crate::scope::{CatchGuard, LoopLabels};

/// Where a try construct currently appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TryStage {
    Body,
    Catch,
    Finally,
}

/// The catch clause of a try construct, minus its body.
#[derive(Debug)]
pub(crate) struct PendingCatch {
    pub test: Option<DataType>,
    pub variable: Option<Variable>,
}

#[derive(Debug)]
pub(crate) enum FrameKind {
    Root,
    Loop {
        condition: Option<Expr>,
        labels: LoopLabels,
    },
    Foreach {
        element: Variable,
        iterator: Variable,
        collection: Expr,
        labels: LoopLabels,
    },
    Using {
        resource: Variable,
        value: Expr,
    },
    If {
        /// Closed `(condition, body)` clauses.
        clauses: Vec<(Expr, Vec<Node>)>,
        /// Condition of the open clause; `None` once in the else branch.
        condition: Option<Expr>,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
        pending: Vec<Expr>,
        pending_default: bool,
        has_default: bool,
        /// Values seen in earlier sections, for duplicate detection.
        seen: Vec<Value>,
        /// Open section: its values and whether it is the default.
        section: Option<(Vec<Expr>, bool)>,
    },
    Try {
        stage: TryStage,
        body: Vec<Node>,
        catch: Option<PendingCatch>,
        handler: Option<CatchHandler>,
        guard: Option<CatchGuard>,
    },
}

impl FrameKind {
    /// Construct name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Root => "function",
            FrameKind::Loop { .. } => "loop",
            FrameKind::Foreach { .. } => "foreach",
            FrameKind::Using { .. } => "using",
            FrameKind::If { .. } => "if",
            FrameKind::Switch { .. } => "switch",
            FrameKind::Try { .. } => "try",
        }
    }

    /// Whether statements may be appended.
    pub fn accepts_statements(&self) -> bool {
        !matches!(self, FrameKind::Switch { section: None, .. })
    }
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub body: Vec<Node>,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            body: Vec::new(),
        }
    }
}
