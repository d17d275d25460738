//! Operation nodes and the finished [`Function`].
//!
//! Nodes form a closed set of structured statements. Blocks are plain
//! `Vec<Node>`; an `else if` chain is an `If` whose else block holds a
//! single nested `If`.

use std::fmt;
use std::rc::Rc;

use crate::{DataType, Expr, Variable};

/// Identity of a jump target.
///
/// Labels are identified by id, not by name; names exist for diagnostics
/// and rendering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A label known to the function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDef {
    pub id: LabelId,
    pub name: Rc<str>,
}

/// How a jump was requested. Execution is identical; the kind only
/// affects rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Goto,
    Break,
    Continue,
}

impl JumpKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JumpKind::Goto => "goto",
            JumpKind::Break => "break",
            JumpKind::Continue => "continue",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "goto" => Some(JumpKind::Goto),
            "break" => Some(JumpKind::Break),
            "continue" => Some(JumpKind::Continue),
            _ => None,
        }
    }
}

/// One section of a switch: match values sharing a body.
///
/// The default section may also carry match values when they share its
/// body; it is taken only when no other section matches.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub is_default: bool,
    pub body: Vec<Node>,
}

/// One `catch` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchHandler {
    /// Exception type tested; `None` catches everything.
    pub test: Option<DataType>,
    /// Variable bound to the caught exception.
    pub variable: Option<Variable>,
    /// Exception filter. Never produced by the builder.
    pub filter: Option<Expr>,
    pub body: Vec<Node>,
}

/// A structured operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Sequence(Vec<Node>),
    Declare(Variable),
    Assign {
        target: Variable,
        value: Expr,
    },
    /// Evaluate for effect.
    Act(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },
    /// `condition == None` loops until a jump leaves it.
    Loop {
        condition: Option<Expr>,
        body: Vec<Node>,
        break_label: LabelId,
        continue_label: LabelId,
    },
    /// First section with a matching value wins; no fall-through.
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        body: Vec<Node>,
        handlers: Vec<CatchHandler>,
        finally: Option<Vec<Node>>,
        /// Runs only when the body throws. Never produced by the builder.
        fault: Option<Vec<Node>>,
    },
    /// Bind `resource = value`, run `body`, dispose the resource.
    Using {
        resource: Variable,
        value: Expr,
        body: Vec<Node>,
    },
    /// `None` rethrows the exception being handled.
    Throw(Option<Expr>),
    Return {
        label: LabelId,
        value: Option<Expr>,
    },
    Goto {
        target: LabelId,
        kind: JumpKind,
    },
    Label(LabelId),
}

impl Node {
    /// Nested blocks, in source order.
    pub fn blocks(&self) -> Vec<&[Node]> {
        match self {
            Node::Sequence(body) | Node::Loop { body, .. } | Node::Using { body, .. } => {
                vec![body.as_slice()]
            }
            Node::If {
                then_branch,
                else_branch,
                ..
            } => std::iter::once(then_branch.as_slice())
                .chain(else_branch.as_deref())
                .collect(),
            Node::Switch { cases, .. } => cases.iter().map(|case| case.body.as_slice()).collect(),
            Node::Try {
                body,
                handlers,
                finally,
                fault,
            } => std::iter::once(body.as_slice())
                .chain(handlers.iter().map(|h| h.body.as_slice()))
                .chain(finally.as_deref())
                .chain(fault.as_deref())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Expressions held directly by this node, in evaluation order.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Node::Assign { value, .. } | Node::Act(value) | Node::Using { value, .. } => {
                vec![value]
            }
            Node::If { condition, .. } => vec![condition],
            Node::Loop { condition, .. } => condition.iter().collect(),
            Node::Switch {
                selector, cases, ..
            } => std::iter::once(selector)
                .chain(cases.iter().flat_map(|c| c.values.iter()))
                .collect(),
            Node::Try { handlers, .. } => handlers.iter().filter_map(|h| h.filter.as_ref()).collect(),
            Node::Throw(value) | Node::Return { value, .. } => value.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Visit this node and every nested node, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for block in self.blocks() {
            for node in block {
                node.walk(visit);
            }
        }
    }
}

/// A finished operation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub parameters: Vec<Variable>,
    pub return_type: DataType,
    /// Target of every `Return` node; marks the end of the body.
    pub return_label: LabelId,
    pub allow_outer_capture: bool,
    /// Declared locals, parameters excluded, in declaration order.
    pub variables: Vec<Variable>,
    /// Every label, hidden loop labels included.
    pub labels: Vec<LabelDef>,
    pub body: Vec<Node>,
}

impl Function {
    /// Name of a label.
    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.labels
            .iter()
            .find(|def| def.id == id)
            .map(|def| &*def.name)
    }

    /// Find a parameter or local by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.parameters
            .iter()
            .chain(&self.variables)
            .find(|var| &*var.name == name)
    }

    /// Parameter types, in order.
    pub fn parameter_types(&self) -> Vec<DataType> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }

    /// Visit every node of the body.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        for node in &self.body {
            node.walk(visit);
        }
    }

    /// Visit every expression of the body, sub-expressions included.
    pub fn walk_expressions<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        self.walk(&mut |node| {
            for expr in node.expressions() {
                expr.walk(&mut *visit);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Function {
        let i = Variable::new("i", DataType::Int32);
        Function {
            parameters: vec![],
            return_type: DataType::Void,
            return_label: LabelId(0),
            allow_outer_capture: false,
            variables: vec![i.clone()],
            labels: vec![
                LabelDef { id: LabelId(0), name: Rc::from("return") },
                LabelDef { id: LabelId(1), name: Rc::from("break") },
                LabelDef { id: LabelId(2), name: Rc::from("continue") },
            ],
            body: vec![
                Node::Declare(i.clone()),
                Node::Loop {
                    condition: Some(Expr::lt(Expr::Variable(i.clone()), Expr::constant(3))),
                    body: vec![Node::Assign {
                        target: i.clone(),
                        value: Expr::add(Expr::Variable(i), Expr::constant(1)),
                    }],
                    break_label: LabelId(1),
                    continue_label: LabelId(2),
                },
            ],
        }
    }

    #[test]
    fn walk_reaches_nested_nodes() {
        let func = sample();
        let mut count = 0;
        func.walk(&mut |_| count += 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn walk_expressions_includes_loop_condition() {
        let func = sample();
        let mut constants = Vec::new();
        func.walk_expressions(&mut |expr| {
            if let Expr::Constant { value, .. } = expr {
                constants.push(value.clone());
            }
        });
        assert_eq!(constants.len(), 2);
    }

    #[test]
    fn label_lookup() {
        let func = sample();
        assert_eq!(func.label_name(LabelId(1)), Some("break"));
        assert_eq!(func.label_name(LabelId(9)), None);
        assert!(func.variable("i").is_some());
    }

    #[test]
    fn else_branch_is_a_block() {
        let node = Node::If {
            condition: Expr::constant(true),
            then_branch: vec![],
            else_branch: Some(vec![Node::Label(LabelId(4))]),
        };
        assert_eq!(node.blocks().len(), 2);
    }

    #[test]
    fn jump_keywords() {
        assert_eq!(JumpKind::from_keyword("break"), Some(JumpKind::Break));
        assert_eq!(JumpKind::Continue.keyword(), "continue");
    }
}
