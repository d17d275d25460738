//! Value-producing expressions.
//!
//! Expressions are immutable trees. Each node knows its static
//! [`DataType`]; the helper constructors compute it, and the builder's
//! type checker validates operand types before a node reaches a graph.

use std::fmt;
use std::rc::Rc;

use crate::{
    CallSite, ConstructorInfo, DataType, EventInfo, FieldInfo, MethodInfo, PropertyInfo, Value,
};

// ============================================================================
// Operators
// ============================================================================

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Every binary operator, in declaration order.
    pub const ALL: [BinaryOp; 13] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Rem,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
        BinaryOp::And,
        BinaryOp::Or,
    ];

    /// Dialect name (`add`, `lt`, ...).
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Inverse of [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// `eq`, `ne`, `lt`, `le`, `gt`, `ge`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// `and`, `or`. Both short-circuit.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// `add`, `sub`, `mul`, `div`, `rem`.
    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison() && !self.is_logical()
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    /// Dialect name.
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
        }
    }

    /// Inverse of [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "neg" => Some(UnaryOp::Neg),
            "not" => Some(UnaryOp::Not),
            _ => None,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Iterator protocol steps used by desugared `foreach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IteratorOp {
    /// `seq<T>` to a fresh `iter<T>`.
    Begin,
    /// Advance; `bool` result.
    MoveNext,
    /// Current element.
    Current,
}

impl IteratorOp {
    /// Dialect name.
    pub fn name(self) -> &'static str {
        match self {
            IteratorOp::Begin => "iter_begin",
            IteratorOp::MoveNext => "iter_next",
            IteratorOp::Current => "iter_current",
        }
    }

    /// Inverse of [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "iter_begin" => Some(IteratorOp::Begin),
            "iter_next" => Some(IteratorOp::MoveNext),
            "iter_current" => Some(IteratorOp::Current),
            _ => None,
        }
    }
}

// ============================================================================
// Variables and extensions
// ============================================================================

/// A named, typed local variable or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: Rc<str>,
    pub ty: DataType,
}

impl Variable {
    pub fn new(name: &str, ty: DataType) -> Self {
        Self {
            name: Rc::from(name),
            ty,
        }
    }
}

/// An open-ended expression kind supplied by a caller.
///
/// The backend executes an extension by reducing it to ordinary nodes;
/// extensions that do not reduce cannot be compiled. The renderer never
/// renders extensions.
pub trait ExtensionExpr: fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Static result type.
    fn data_type(&self) -> DataType;

    /// Lower into ordinary expressions, if possible.
    fn reduce(&self) -> Option<Expr>;
}

/// Shared handle to an extension, compared by identity.
#[derive(Debug, Clone)]
pub struct ExtensionNode(pub Rc<dyn ExtensionExpr>);

impl PartialEq for ExtensionNode {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const (),
            Rc::as_ptr(&other.0) as *const (),
        )
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A value-producing expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant {
        value: Value,
        ty: DataType,
    },
    Variable(Variable),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        ty: DataType,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        ty: DataType,
    },
    Convert {
        operand: Box<Expr>,
        ty: DataType,
    },
    /// Method call; `target` is `None` for static methods.
    Call {
        method: Rc<MethodInfo>,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    New {
        constructor: Rc<ConstructorInfo>,
        args: Vec<Expr>,
    },
    Field {
        field: Rc<FieldInfo>,
        target: Option<Box<Expr>>,
    },
    Property {
        property: Rc<PropertyInfo>,
        target: Option<Box<Expr>>,
    },
    /// Attach `handler` to an event.
    Subscribe {
        event: Rc<EventInfo>,
        target: Option<Box<Expr>>,
        handler: Box<Expr>,
    },
    /// Late-bound operation; `args` includes the target.
    Dynamic {
        site: CallSite,
        args: Vec<Expr>,
    },
    Iterator {
        op: IteratorOp,
        operand: Box<Expr>,
    },
    Extension(ExtensionNode),
}

impl Expr {
    /// A constant typed by its runtime value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.runtime_type();
        Expr::Constant { value, ty }
    }

    /// A constant with an explicit static type.
    pub fn typed_constant(value: Value, ty: DataType) -> Self {
        Expr::Constant { value, ty }
    }

    /// `null` of a reference type.
    pub fn null(ty: DataType) -> Self {
        Expr::Constant {
            value: Value::Null,
            ty,
        }
    }

    /// Reference a variable by name.
    pub fn var(name: &str, ty: DataType) -> Self {
        Expr::Variable(Variable::new(name, ty))
    }

    /// Binary operation; the result type follows the operator.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            DataType::Bool
        } else {
            let (l, r) = (left.data_type(), right.data_type());
            DataType::promote(&l, &r).unwrap_or(l)
        };
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Sub, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Mul, left, right)
    }

    pub fn equal(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Lt, left, right)
    }

    /// Unary operation.
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = match op {
            UnaryOp::Not => DataType::Bool,
            UnaryOp::Neg => operand.data_type(),
        };
        Expr::Unary {
            op,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn not(operand: Expr) -> Self {
        Self::unary(UnaryOp::Not, operand)
    }

    /// Conversion to `ty`.
    pub fn convert(operand: Expr, ty: DataType) -> Self {
        Expr::Convert {
            operand: Box::new(operand),
            ty,
        }
    }

    /// Instance method call.
    pub fn call(method: Rc<MethodInfo>, target: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            method,
            target: Some(Box::new(target)),
            args,
        }
    }

    /// Static method call.
    pub fn call_static(method: Rc<MethodInfo>, args: Vec<Expr>) -> Self {
        Expr::Call {
            method,
            target: None,
            args,
        }
    }

    /// Constructor invocation.
    pub fn new_object(constructor: Rc<ConstructorInfo>, args: Vec<Expr>) -> Self {
        Expr::New { constructor, args }
    }

    /// Field read; `target` is `None` for static fields.
    pub fn field(field: Rc<FieldInfo>, target: Option<Expr>) -> Self {
        Expr::Field {
            field,
            target: target.map(Box::new),
        }
    }

    /// Property read; `target` is `None` for static properties.
    pub fn property(property: Rc<PropertyInfo>, target: Option<Expr>) -> Self {
        Expr::Property {
            property,
            target: target.map(Box::new),
        }
    }

    /// Event subscription.
    pub fn subscribe(event: Rc<EventInfo>, target: Option<Expr>, handler: Expr) -> Self {
        Expr::Subscribe {
            event,
            target: target.map(Box::new),
            handler: Box::new(handler),
        }
    }

    /// Late-bound call through a call site.
    pub fn dynamic(site: CallSite, args: Vec<Expr>) -> Self {
        Expr::Dynamic { site, args }
    }

    pub fn iter_begin(sequence: Expr) -> Self {
        Self::iterator(IteratorOp::Begin, sequence)
    }

    pub fn iter_next(iterator: Expr) -> Self {
        Self::iterator(IteratorOp::MoveNext, iterator)
    }

    pub fn iter_current(iterator: Expr) -> Self {
        Self::iterator(IteratorOp::Current, iterator)
    }

    fn iterator(op: IteratorOp, operand: Expr) -> Self {
        Expr::Iterator {
            op,
            operand: Box::new(operand),
        }
    }

    /// Wrap a caller-supplied extension.
    pub fn extension(node: Rc<dyn ExtensionExpr>) -> Self {
        Expr::Extension(ExtensionNode(node))
    }

    /// Static type of the value produced.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Constant { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Convert { ty, .. } => ty.clone(),
            Expr::Variable(var) => var.ty.clone(),
            Expr::Call { method, .. } => method.return_type.clone(),
            Expr::New { constructor, .. } => constructor.owner.clone(),
            Expr::Field { field, .. } => field.ty.clone(),
            Expr::Property { property, .. } => property.ty.clone(),
            Expr::Subscribe { .. } => DataType::Void,
            Expr::Dynamic { site, .. } => site.result_type.clone(),
            Expr::Iterator { op, operand } => {
                let element = operand
                    .data_type()
                    .element_type()
                    .cloned()
                    .unwrap_or(DataType::Object);
                match op {
                    IteratorOp::Begin => DataType::iterator(element),
                    IteratorOp::MoveNext => DataType::Bool,
                    IteratorOp::Current => element,
                }
            }
            Expr::Extension(ext) => ext.0.data_type(),
        }
    }

    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant { .. } | Expr::Variable(_) | Expr::Extension(_) => Vec::new(),
            Expr::Binary { left, right, .. } => vec![&**left, &**right],
            Expr::Unary { operand, .. }
            | Expr::Convert { operand, .. }
            | Expr::Iterator { operand, .. } => vec![&**operand],
            Expr::Call { target, args, .. } => target.iter().map(|t| &**t).chain(args).collect(),
            Expr::New { args, .. } | Expr::Dynamic { args, .. } => args.iter().collect(),
            Expr::Field { target, .. } | Expr::Property { target, .. } => {
                target.iter().map(|t| &**t).collect()
            }
            Expr::Subscribe {
                target, handler, ..
            } => target
                .iter()
                .map(|t| &**t)
                .chain(std::iter::once(&**handler))
                .collect(),
        }
    }

    /// Visit this expression and all descendants, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_promotes() {
        let e = Expr::add(Expr::constant(1), Expr::constant(2.5));
        assert_eq!(e.data_type(), DataType::Float64);
        let e = Expr::add(Expr::constant(1), Expr::constant(2i64));
        assert_eq!(e.data_type(), DataType::Int64);
    }

    #[test]
    fn string_concatenation_stays_string() {
        let e = Expr::add(Expr::constant("a"), Expr::constant("b"));
        assert_eq!(e.data_type(), DataType::String);
    }

    #[test]
    fn comparison_is_bool() {
        let e = Expr::lt(Expr::var("i", DataType::Int32), Expr::constant(10));
        assert_eq!(e.data_type(), DataType::Bool);
    }

    #[test]
    fn iterator_types_follow_sequence() {
        let seq = Expr::var("xs", DataType::sequence(DataType::String));
        let it = Expr::iter_begin(seq);
        assert_eq!(it.data_type(), DataType::iterator(DataType::String));
        assert_eq!(Expr::iter_next(it.clone()).data_type(), DataType::Bool);
        assert_eq!(Expr::iter_current(it).data_type(), DataType::String);
    }

    #[test]
    fn operator_names_round_trip() {
        for op in BinaryOp::ALL {
            assert_eq!(BinaryOp::from_name(op.name()), Some(op));
        }
        assert_eq!(UnaryOp::from_name("neg"), Some(UnaryOp::Neg));
        assert_eq!(IteratorOp::from_name("iter_next"), Some(IteratorOp::MoveNext));
    }

    #[test]
    fn walk_visits_every_node() {
        let e = Expr::add(
            Expr::var("a", DataType::Int32),
            Expr::unary(UnaryOp::Neg, Expr::var("b", DataType::Int32)),
        );
        let mut names = Vec::new();
        e.walk(&mut |node| {
            if let Expr::Variable(v) = node {
                names.push(v.name.to_string());
            }
        });
        assert_eq!(names, ["a", "b"]);
    }

    #[derive(Debug)]
    struct Answer;

    impl ExtensionExpr for Answer {
        fn name(&self) -> &str {
            "answer"
        }

        fn data_type(&self) -> DataType {
            DataType::Int32
        }

        fn reduce(&self) -> Option<Expr> {
            Some(Expr::constant(42))
        }
    }

    #[test]
    fn extensions_compare_by_identity() {
        let node: Rc<dyn ExtensionExpr> = Rc::new(Answer);
        let a = Expr::extension(Rc::clone(&node));
        let b = Expr::extension(node);
        let c = Expr::extension(Rc::new(Answer));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.data_type(), DataType::Int32);
    }
}
