//! Function literals handed to builder operations.
//!
//! A [`Lambda`] names its parameters; each one is bound by the rewriter to
//! the scope variable of the same name, or to a captured value when the
//! function allows outer capture.

use opgraph_core::{DataType, Expr, Value, Variable};

/// Largest number of parameters a literal may declare.
pub const MAX_ARITY: usize = 16;

/// One literal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParam {
    pub name: String,
    pub ty: DataType,
    /// Value embedded when the name is not in scope and capture is allowed.
    pub captured: Option<Value>,
}

impl LambdaParam {
    pub fn new(name: &str, ty: DataType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            captured: None,
        }
    }

    /// A parameter carrying an outer value.
    pub fn captured(name: &str, ty: DataType, value: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            ty,
            captured: Some(value.into()),
        }
    }

    pub fn variable(&self) -> Variable {
        Variable::new(&self.name, self.ty.clone())
    }
}

/// A function literal: typed parameters and a body expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<LambdaParam>,
    pub body: Expr,
}

impl Lambda {
    /// A literal over an already built body.
    pub fn new(params: Vec<LambdaParam>, body: Expr) -> Self {
        Self { params, body }
    }

    /// A literal whose body is built from its parameter references.
    ///
    /// ```
    /// use opgraph_builder::{Lambda, LambdaParam};
    /// use opgraph_core::{DataType, Expr};
    ///
    /// let next = Lambda::build(vec![LambdaParam::new("i", DataType::Int32)], |p: &[Expr]| {
    ///     Expr::add(p[0].clone(), Expr::constant(1))
    /// });
    /// assert_eq!(next.arity(), 1);
    /// ```
    pub fn build(params: Vec<LambdaParam>, body: impl FnOnce(&[Expr]) -> Expr) -> Self {
        let refs: Vec<Expr> = params
            .iter()
            .map(|p| Expr::Variable(p.variable()))
            .collect();
        let body = body(&refs);
        Self { params, body }
    }

    /// A parameterless literal.
    pub fn value(body: Expr) -> Self {
        Self::new(Vec::new(), body)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn param(&self, name: &str) -> Option<&LambdaParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Anything a builder operation accepts as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Producer {
    Literal(Lambda),
    Node(Expr),
}

impl From<Lambda> for Producer {
    fn from(lambda: Lambda) -> Self {
        Producer::Literal(lambda)
    }
}

impl From<Expr> for Producer {
    fn from(expr: Expr) -> Self {
        Producer::Node(expr)
    }
}
