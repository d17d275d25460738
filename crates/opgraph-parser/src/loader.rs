//! Rebuild a [`Function`] from a parsed [`Document`].
//!
//! Declarations are bound in order; every declaration may only refer to
//! earlier ones. Reflection lookups are resolved against the registry by
//! signature and binding flags. Label ids are assigned in declaration
//! order.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use opgraph_core::{
    BinaryOp, Binder, BindingFlags, CallSite, CallSiteFlags, CatchHandler, ConstructorInfo,
    DataType, EventInfo, Expr, FieldInfo, Function, IteratorOp, JumpKind, LabelDef, LabelId,
    LoadError, MethodInfo, Node, PropertyInfo, QualifiedName, SwitchCase, UnaryOp, Value,
    Variable,
};
use opgraph_registry::TypeRegistry;

use crate::term::{Declaration, Document, Term, TermKind};

/// A resolved reflection lookup.
#[derive(Debug, Clone)]
enum MemberRef {
    Method(Rc<MethodInfo>),
    Constructor(Rc<ConstructorInfo>),
    Field(Rc<FieldInfo>),
    Property(Rc<PropertyInfo>),
    Event(Rc<EventInfo>),
}

/// What a declared identifier stands for.
#[derive(Debug, Clone)]
enum Binding {
    Type(DataType),
    Variable(Variable),
    Label(LabelId),
    Member(MemberRef),
    /// A lookup whose metadata was unavailable when rendered.
    Placeholder,
    CallSite(CallSite),
}

impl Binding {
    fn kind(&self) -> &'static str {
        match self {
            Binding::Type(_) => "a type",
            Binding::Variable(_) => "a variable",
            Binding::Label(_) => "a label",
            Binding::Member(_) | Binding::Placeholder => "a member",
            Binding::CallSite(_) => "a call site",
        }
    }
}

pub(crate) struct Loader<'r, 'a> {
    registry: &'r TypeRegistry,
    bindings: FxHashMap<&'a str, Binding>,
    /// Locals in declaration order.
    variables: Vec<Variable>,
    labels: Vec<LabelDef>,
}

impl<'r, 'a> Loader<'r, 'a> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            bindings: FxHashMap::default(),
            variables: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn load(mut self, document: &Document<'a>) -> Result<Function, LoadError> {
        for decl in document.declarations {
            self.declare(decl)?;
        }
        let args = expect_apply(&document.body, "lambda", 5)?;

        let return_type = self.type_ref(&args[0])?;
        let TermKind::List(param_terms) = args[1].kind else {
            return Err(malformed("lambda", "expected a parameter list"));
        };
        let mut parameters = Vec::with_capacity(param_terms.len());
        for term in param_terms {
            let var = self.variable_ref(term)?;
            self.variables.retain(|local| local.name != var.name);
            parameters.push(var);
        }
        let return_label = self.label_ref(&args[2])?;
        let allow_outer_capture = match args[3].as_ident() {
            Some("true") => true,
            Some("false") => false,
            _ => return Err(malformed("lambda", "expected true or false")),
        };
        let body = self.block(&args[4])?;

        tracing::debug!(
            "loaded function with {} parameter(s), {} local(s), {} label(s)",
            parameters.len(),
            self.variables.len(),
            self.labels.len()
        );
        Ok(Function {
            parameters,
            return_type,
            return_label,
            allow_outer_capture,
            variables: self.variables,
            labels: self.labels,
            body,
        })
    }

    // ==========================================================================
    // Declarations
    // ==========================================================================

    fn declare(&mut self, decl: &Declaration<'a>) -> Result<(), LoadError> {
        if self.bindings.contains_key(decl.name) {
            return Err(LoadError::DuplicateIdentifier {
                name: decl.name.to_string(),
            });
        }
        let binding = match decl.value.kind {
            TermKind::Ident("null") => Binding::Placeholder,
            TermKind::Apply { head, args } => match head {
                "type" => Binding::Type(self.data_type(expect_args(head, args, 1)?.first())?),
                "param" | "var" => {
                    let args = expect_args(head, args, 2)?;
                    let ty = self.type_ref(&args[0])?;
                    let var = Variable::new(expect_str(&args[1])?, ty);
                    // Parameters leave the locals when the lambda lists them.
                    self.variables.push(var.clone());
                    Binding::Variable(var)
                }
                "label" => {
                    let args = expect_args(head, args, 1)?;
                    let id = LabelId(self.labels.len() as u32);
                    self.labels.push(LabelDef {
                        id,
                        name: Rc::from(expect_str(&args[0])?),
                    });
                    Binding::Label(id)
                }
                "method" | "ctor" | "field" | "property" | "event" => {
                    Binding::Member(self.member(head, args)?)
                }
                "callsite" => Binding::CallSite(self.call_site(args)?),
                other => {
                    return Err(malformed(
                        "declaration",
                        format!("unknown form '{other}' for '{}'", decl.name),
                    ));
                }
            },
            _ => {
                return Err(malformed(
                    "declaration",
                    format!("'{}' is not a declaration form", decl.name),
                ));
            }
        };
        self.bindings.insert(decl.name, binding);
        Ok(())
    }

    /// Type syntax inside `type(...)`.
    fn data_type(&self, term: Option<&Term<'a>>) -> Result<DataType, LoadError> {
        let Some(term) = term else {
            return Err(malformed("type", "missing type"));
        };
        match term.kind {
            TermKind::Ident(name) => {
                if let Some(ty) = DataType::from_keyword(name) {
                    return Ok(ty);
                }
                if self.registry.contains(&QualifiedName::new(name)) {
                    Ok(DataType::named(name))
                } else {
                    Err(LoadError::UnknownType {
                        name: name.to_string(),
                    })
                }
            }
            TermKind::Generic { head: "seq", arg } => {
                Ok(DataType::sequence(self.data_type(Some(arg))?))
            }
            TermKind::Generic { head: "iter", arg } => {
                Ok(DataType::iterator(self.data_type(Some(arg))?))
            }
            _ => Err(malformed("type", "expected a type name")),
        }
    }

    fn member(&self, kind: &str, args: &[Term<'a>]) -> Result<MemberRef, LoadError> {
        let owner = self.type_ref(args.first().ok_or_else(|| malformed(kind_what(kind), "missing owner"))?)?;
        let flags_term = args
            .last()
            .ok_or_else(|| malformed(kind_what(kind), "missing binding flags"))?;
        let flags = BindingFlags::from_source(&flag_names(flags_term)?)
            .ok_or_else(|| malformed("flags", "unknown binding flag"))?;

        let not_found = |signature: String| LoadError::UnknownMember {
            description: format!("{kind} {signature} with {}", flags.to_source()),
        };
        let owner_name = owner.friendly_name(true);
        match kind {
            "method" => {
                let args = expect_args(kind, args, 4)?;
                let name = expect_str(&args[1])?;
                let params = self.type_list(&args[2])?;
                self.registry
                    .find_method(&owner, name, &params, flags)
                    .map(MemberRef::Method)
                    .ok_or_else(|| not_found(signature(&owner_name, Some(name), &params)))
            }
            "ctor" => {
                let args = expect_args(kind, args, 3)?;
                let params = self.type_list(&args[1])?;
                self.registry
                    .find_constructor(&owner, &params, flags)
                    .map(MemberRef::Constructor)
                    .ok_or_else(|| not_found(signature(&owner_name, None, &params)))
            }
            _ => {
                let args = expect_args(kind, args, 3)?;
                let name = expect_str(&args[1])?;
                let found = match kind {
                    "field" => self
                        .registry
                        .find_field(&owner, name, flags)
                        .map(MemberRef::Field),
                    "property" => self
                        .registry
                        .find_property(&owner, name, flags)
                        .map(MemberRef::Property),
                    _ => self
                        .registry
                        .find_event(&owner, name, flags)
                        .map(MemberRef::Event),
                };
                found.ok_or_else(|| not_found(format!("{owner_name}.{name}")))
            }
        }
    }

    /// `callsite(binder, arg_count, flags, result_type)`
    fn call_site(&self, args: &[Term<'a>]) -> Result<CallSite, LoadError> {
        let args = expect_args("callsite", args, 4)?;
        let binder = self.binder(&args[0])?;
        let TermKind::Int(count) = args[1].kind else {
            return Err(malformed("call site", "expected an argument count"));
        };
        let arg_count =
            usize::try_from(count).map_err(|_| malformed("call site", "negative argument count"))?;
        let flags = CallSiteFlags::from_source(&flag_names(&args[2])?)
            .ok_or_else(|| malformed("flags", "unknown call site flag"))?;
        let result_type = self.type_ref(&args[3])?;
        Ok(CallSite::new(binder, arg_count, result_type).with_flags(flags))
    }

    fn binder(&self, term: &Term<'a>) -> Result<Binder, LoadError> {
        let named = |args: &[Term<'a>]| -> Result<Rc<str>, LoadError> {
            Ok(Rc::from(expect_str(&expect_args("binder", args, 1)?[0])?))
        };
        match term.kind {
            TermKind::Ident("Invoke") => Ok(Binder::Invoke),
            TermKind::Ident("GetIndex") => Ok(Binder::GetIndex),
            TermKind::Ident("SetIndex") => Ok(Binder::SetIndex),
            TermKind::Apply { head, args } => match head {
                "GetMember" => Ok(Binder::GetMember { name: named(args)? }),
                "SetMember" => Ok(Binder::SetMember { name: named(args)? }),
                "InvokeMember" => Ok(Binder::InvokeMember { name: named(args)? }),
                "BinaryOperation" => {
                    let op = expect_args(head, args, 1)?[0].as_ident();
                    op.and_then(BinaryOp::from_name)
                        .map(Binder::BinaryOperation)
                        .ok_or_else(|| malformed("binder", "unknown binary operator"))
                }
                "UnaryOperation" => {
                    let op = expect_args(head, args, 1)?[0].as_ident();
                    op.and_then(UnaryOp::from_name)
                        .map(Binder::UnaryOperation)
                        .ok_or_else(|| malformed("binder", "unknown unary operator"))
                }
                "Convert" => Ok(Binder::Convert(
                    self.type_ref(&expect_args(head, args, 1)?[0])?,
                )),
                other => Err(malformed("binder", format!("unknown binder '{other}'"))),
            },
            _ => Err(malformed("binder", "expected a binder")),
        }
    }

    // ==========================================================================
    // References
    // ==========================================================================

    fn lookup(&self, term: &Term<'a>) -> Result<&Binding, LoadError> {
        let name = term
            .as_ident()
            .ok_or_else(|| malformed("reference", "expected an identifier"))?;
        self.bindings
            .get(name)
            .ok_or_else(|| LoadError::UnknownIdentifier {
                name: name.to_string(),
            })
    }

    fn wrong_kind(term: &Term<'a>, binding: &Binding, wanted: &str) -> LoadError {
        malformed(
            "reference",
            format!(
                "'{}' is {}, not {wanted}",
                term.as_ident().unwrap_or_default(),
                binding.kind()
            ),
        )
    }

    fn type_ref(&self, term: &Term<'a>) -> Result<DataType, LoadError> {
        match self.lookup(term)? {
            Binding::Type(ty) => Ok(ty.clone()),
            other => Err(Self::wrong_kind(term, other, "a type")),
        }
    }

    fn type_list(&self, term: &Term<'a>) -> Result<Vec<DataType>, LoadError> {
        let TermKind::List(items) = term.kind else {
            return Err(malformed("member", "expected a parameter type list"));
        };
        items.iter().map(|item| self.type_ref(item)).collect()
    }

    fn variable_ref(&self, term: &Term<'a>) -> Result<Variable, LoadError> {
        match self.lookup(term)? {
            Binding::Variable(var) => Ok(var.clone()),
            other => Err(Self::wrong_kind(term, other, "a variable")),
        }
    }

    fn label_ref(&self, term: &Term<'a>) -> Result<LabelId, LoadError> {
        match self.lookup(term)? {
            Binding::Label(id) => Ok(*id),
            other => Err(Self::wrong_kind(term, other, "a label")),
        }
    }

    fn member_ref(&self, term: &Term<'a>) -> Result<MemberRef, LoadError> {
        match self.lookup(term)? {
            Binding::Member(member) => Ok(member.clone()),
            Binding::Placeholder => Err(LoadError::UnknownMember {
                description: format!(
                    "'{}' (metadata was unavailable when rendered)",
                    term.as_ident().unwrap_or_default()
                ),
            }),
            other => Err(Self::wrong_kind(term, other, "a member")),
        }
    }

    fn call_site_ref(&self, term: &Term<'a>) -> Result<CallSite, LoadError> {
        match self.lookup(term)? {
            Binding::CallSite(site) => Ok(site.clone()),
            other => Err(Self::wrong_kind(term, other, "a call site")),
        }
    }

    // ==========================================================================
    // Nodes
    // ==========================================================================

    /// `block(...)` as a list of nodes.
    fn block(&self, term: &Term<'a>) -> Result<Vec<Node>, LoadError> {
        match term.as_apply() {
            Some(("block", children)) => children.iter().map(|child| self.node(child)).collect(),
            _ => Err(malformed("block", "expected block(...)")),
        }
    }

    fn node(&self, term: &Term<'a>) -> Result<Node, LoadError> {
        let Some((head, args)) = term.as_apply() else {
            return Err(malformed("statement", "expected a statement form"));
        };
        let node = match head {
            "block" => Node::Sequence(self.block(term)?),
            "declare" => Node::Declare(self.variable_ref(&expect_args(head, args, 1)?[0])?),
            "assign" => {
                let args = expect_args(head, args, 2)?;
                Node::Assign {
                    target: self.variable_ref(&args[0])?,
                    value: self.expr(&args[1])?,
                }
            }
            "act" => Node::Act(self.expr(&expect_args(head, args, 1)?[0])?),
            "if" => {
                if args.len() != 2 && args.len() != 3 {
                    return Err(arity(head, "2 or 3", args.len()));
                }
                Node::If {
                    condition: self.expr(&args[0])?,
                    then_branch: self.block(&args[1])?,
                    else_branch: args.get(2).map(|b| self.block(b)).transpose()?,
                }
            }
            "loop" => {
                let args = expect_args(head, args, 4)?;
                let condition = match args[0].kind {
                    TermKind::Ident("forever") => None,
                    TermKind::Apply {
                        head: "while",
                        args: cond,
                    } => Some(self.expr(&expect_args("while", cond, 1)?[0])?),
                    _ => return Err(malformed("loop", "expected while(...) or forever")),
                };
                Node::Loop {
                    condition,
                    body: self.block(&args[1])?,
                    break_label: self.label_ref(&args[2])?,
                    continue_label: self.label_ref(&args[3])?,
                }
            }
            "switch" => {
                let (selector, sections) = args
                    .split_first()
                    .ok_or_else(|| arity(head, "at least 1", 0))?;
                Node::Switch {
                    selector: self.expr(selector)?,
                    cases: sections
                        .iter()
                        .map(|section| self.switch_case(section))
                        .collect::<Result<_, _>>()?,
                }
            }
            "try" => self.try_node(args)?,
            "using" => {
                let args = expect_args(head, args, 3)?;
                Node::Using {
                    resource: self.variable_ref(&args[0])?,
                    value: self.expr(&args[1])?,
                    body: self.block(&args[2])?,
                }
            }
            "throw" => Node::Throw(Some(self.expr(&expect_args(head, args, 1)?[0])?)),
            "rethrow" => {
                expect_args(head, args, 0)?;
                Node::Throw(None)
            }
            "return" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(arity(head, "1 or 2", args.len()));
                }
                Node::Return {
                    label: self.label_ref(&args[0])?,
                    value: args.get(1).map(|v| self.expr(v)).transpose()?,
                }
            }
            "mark" => Node::Label(self.label_ref(&expect_args(head, args, 1)?[0])?),
            other => match JumpKind::from_keyword(other) {
                Some(kind) => Node::Goto {
                    target: self.label_ref(&expect_args(head, args, 1)?[0])?,
                    kind,
                },
                None => {
                    return Err(malformed("statement", format!("unknown statement '{other}'")));
                }
            },
        };
        Ok(node)
    }

    fn switch_case(&self, term: &Term<'a>) -> Result<SwitchCase, LoadError> {
        let (head, args) = term
            .as_apply()
            .filter(|(head, _)| matches!(*head, "case" | "default"))
            .ok_or_else(|| malformed("switch", "expected case(...) or default(...)"))?;
        let args = expect_args(head, args, 2)?;
        let TermKind::List(values) = args[0].kind else {
            return Err(malformed("switch", "expected a list of case values"));
        };
        Ok(SwitchCase {
            values: values
                .iter()
                .map(|value| self.expr(value))
                .collect::<Result<_, _>>()?,
            is_default: head == "default",
            body: self.block(&args[1])?,
        })
    }

    /// `try(block, catch(...)*, finally(block)?)`
    fn try_node(&self, args: &[Term<'a>]) -> Result<Node, LoadError> {
        let (body, clauses) = args
            .split_first()
            .ok_or_else(|| arity("try", "at least 1", 0))?;
        let mut handlers = Vec::new();
        let mut finally = None;
        for clause in clauses {
            if finally.is_some() {
                return Err(malformed("try", "finally must be the last clause"));
            }
            match clause.as_apply() {
                Some(("catch", catch)) => {
                    let catch = expect_args("catch", catch, 3)?;
                    let test = match catch[0].as_ident() {
                        Some("any") => None,
                        _ => Some(self.type_ref(&catch[0])?),
                    };
                    let variable = match catch[1].as_ident() {
                        Some("none") => None,
                        _ => Some(self.variable_ref(&catch[1])?),
                    };
                    handlers.push(CatchHandler {
                        test,
                        variable,
                        filter: None,
                        body: self.block(&catch[2])?,
                    });
                }
                Some(("finally", block)) => {
                    finally = Some(self.block(&expect_args("finally", block, 1)?[0])?);
                }
                _ => return Err(malformed("try", "expected catch(...) or finally(...)")),
            }
        }
        Ok(Node::Try {
            body: self.block(body)?,
            handlers,
            finally,
            fault: None,
        })
    }

    // ==========================================================================
    // Expressions
    // ==========================================================================

    fn exprs(&self, term: &Term<'a>) -> Result<Vec<Expr>, LoadError> {
        let TermKind::List(items) = term.kind else {
            return Err(malformed("expression", "expected an argument list"));
        };
        items.iter().map(|item| self.expr(item)).collect()
    }

    /// `none` or an expression.
    fn target(&self, term: &Term<'a>) -> Result<Option<Box<Expr>>, LoadError> {
        match term.as_ident() {
            Some("none") => Ok(None),
            _ => Ok(Some(Box::new(self.expr(term)?))),
        }
    }

    fn expr(&self, term: &Term<'a>) -> Result<Expr, LoadError> {
        let (head, args) = match term.kind {
            TermKind::Ident(_) => return Ok(Expr::Variable(self.variable_ref(term)?)),
            TermKind::Apply { head, args } => (head, args),
            _ => return Err(malformed("expression", "expected an expression form")),
        };
        if let Some(op) = BinaryOp::from_name(head) {
            let args = expect_args(head, args, 2)?;
            return Ok(Expr::binary(op, self.expr(&args[0])?, self.expr(&args[1])?));
        }
        if let Some(op) = UnaryOp::from_name(head) {
            return Ok(Expr::unary(op, self.expr(&expect_args(head, args, 1)?[0])?));
        }
        if let Some(op) = IteratorOp::from_name(head) {
            return Ok(Expr::Iterator {
                op,
                operand: Box::new(self.expr(&expect_args(head, args, 1)?[0])?),
            });
        }
        let expr = match head {
            "constant" => {
                let args = expect_args(head, args, 2)?;
                let ty = self.type_ref(&args[0])?;
                let value = literal(&args[1], &ty)?;
                Expr::typed_constant(value, ty)
            }
            "convert" => {
                let args = expect_args(head, args, 2)?;
                Expr::convert(self.expr(&args[0])?, self.type_ref(&args[1])?)
            }
            "call" => {
                let args = expect_args(head, args, 3)?;
                let MemberRef::Method(method) = self.member_ref(&args[0])? else {
                    return Err(malformed("call", "callee is not a method"));
                };
                Expr::Call {
                    method,
                    target: self.target(&args[1])?,
                    args: self.exprs(&args[2])?,
                }
            }
            "new" => {
                let args = expect_args(head, args, 2)?;
                let MemberRef::Constructor(constructor) = self.member_ref(&args[0])? else {
                    return Err(malformed("new", "callee is not a constructor"));
                };
                Expr::new_object(constructor, self.exprs(&args[1])?)
            }
            "get" => {
                let args = expect_args(head, args, 2)?;
                let target = self.target(&args[1])?;
                match self.member_ref(&args[0])? {
                    MemberRef::Field(field) => Expr::Field { field, target },
                    MemberRef::Property(property) => Expr::Property { property, target },
                    _ => return Err(malformed("get", "member is not a field or property")),
                }
            }
            "subscribe" => {
                let args = expect_args(head, args, 3)?;
                let MemberRef::Event(event) = self.member_ref(&args[0])? else {
                    return Err(malformed("subscribe", "member is not an event"));
                };
                Expr::Subscribe {
                    event,
                    target: self.target(&args[1])?,
                    handler: Box::new(self.expr(&args[2])?),
                }
            }
            "dynamic" => {
                let args = expect_args(head, args, 2)?;
                Expr::dynamic(self.call_site_ref(&args[0])?, self.exprs(&args[1])?)
            }
            other => {
                return Err(malformed("expression", format!("unknown expression '{other}'")));
            }
        };
        Ok(expr)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Literal of a constant, shaped by its static type where the text alone is
/// ambiguous (integers and sequence elements).
fn literal(term: &Term<'_>, ty: &DataType) -> Result<Value, LoadError> {
    let value = match term.kind {
        TermKind::Ident("null") => Value::Null,
        TermKind::Ident("true") => Value::Bool(true),
        TermKind::Ident("false") => Value::Bool(false),
        TermKind::Int(n) => match ty {
            DataType::Int64 => Value::Int64(n),
            DataType::Float64 => Value::float(n as f64),
            _ => match i32::try_from(n) {
                Ok(n) => Value::Int32(n),
                Err(_) => Value::Int64(n),
            },
        },
        TermKind::Float(f) => Value::float(f),
        TermKind::Str(text) => Value::string(text),
        TermKind::List(items) => {
            let element = ty.element_type().cloned().unwrap_or(DataType::Object);
            let items = items
                .iter()
                .map(|item| literal(item, &element))
                .collect::<Result<Vec<_>, _>>()?;
            Value::sequence(element, items)
        }
        _ => return Err(malformed("constant", "expected a literal")),
    };
    Ok(value)
}

fn flag_names<'a>(term: &Term<'a>) -> Result<Vec<&'a str>, LoadError> {
    match term.kind {
        TermKind::Ident(name) => Ok(vec![name]),
        TermKind::Flags(names) => Ok(names.to_vec()),
        _ => Err(malformed("flags", "expected flag names")),
    }
}

fn signature(owner: &str, name: Option<&str>, params: &[DataType]) -> String {
    let params: Vec<String> = params.iter().map(|p| p.friendly_name(true)).collect();
    match name {
        Some(name) => format!("{owner}.{name}({})", params.join(", ")),
        None => format!("{owner}({})", params.join(", ")),
    }
}

fn kind_what(kind: &str) -> &'static str {
    match kind {
        "method" => "method",
        "ctor" => "constructor",
        "field" => "field",
        "property" => "property",
        _ => "event",
    }
}

fn expect_apply<'t, 'a>(
    term: &'t Term<'a>,
    head: &'static str,
    count: usize,
) -> Result<&'a [Term<'a>], LoadError> {
    match term.as_apply() {
        Some((found, args)) if found == head => expect_args(head, args, count),
        _ => Err(malformed("body", format!("expected {head}(...)"))),
    }
}

fn expect_args<'a>(head: &str, args: &'a [Term<'a>], count: usize) -> Result<&'a [Term<'a>], LoadError> {
    if args.len() == count {
        Ok(args)
    } else {
        Err(arity(head, &count.to_string(), args.len()))
    }
}

fn expect_str<'a>(term: &Term<'a>) -> Result<&'a str, LoadError> {
    match term.kind {
        TermKind::Str(text) => Ok(text),
        _ => Err(malformed("declaration", "expected a string")),
    }
}

fn arity(head: &str, expected: &str, found: usize) -> LoadError {
    LoadError::Malformed {
        what: "form",
        message: format!("{head}(...) takes {expected} argument(s), found {found}"),
    }
}

fn malformed(what: &'static str, message: impl Into<String>) -> LoadError {
    LoadError::Malformed {
        what,
        message: message.into(),
    }
}
