//! Graph walker producing dialect text.

use std::fmt::Write;
use std::rc::Rc;

use opgraph_core::{
    Binder, CallSite, CatchHandler, DataType, Expr, Function, LabelId, Member, MemberKind,
    MetadataError, Node, RenderError, SwitchCase, Variable,
};

use crate::RenderOptions;
use crate::literal::{write_literal, write_string};
use crate::pool::{DeclKey, DeclarationPool, Section};

pub(crate) struct Renderer<'f> {
    function: &'f Function,
    options: &'f RenderOptions,
    pool: DeclarationPool,
}

impl<'f> Renderer<'f> {
    pub fn new(function: &'f Function, options: &'f RenderOptions) -> Self {
        Self {
            function,
            options,
            pool: DeclarationPool::new(),
        }
    }

    /// Render the whole function: declarations, a blank line, the body.
    pub fn render(mut self) -> Result<String, RenderError> {
        let function = self.function;
        let return_type = self.type_ref(&function.return_type)?;
        let mut params = Vec::with_capacity(function.parameters.len());
        for param in &function.parameters {
            params.push(self.declare_variable(param, true)?);
        }
        for local in &function.variables {
            self.declare_variable(local, false)?;
        }
        for def in &function.labels {
            self.label_ref(def.id)?;
        }
        let return_label = self.label_ref(function.return_label)?;

        let mut body = String::new();
        write!(
            body,
            "lambda({return_type}, [{}], {return_label}, {}, ",
            params.join(", "),
            function.allow_outer_capture
        )?;
        self.block(&mut body, &function.body, 0)?;
        body.push_str(")\n");

        let mut out = String::new();
        for section in Section::ALL {
            let decls = self.pool.section(section);
            if decls.is_empty() {
                continue;
            }
            if self.options.section_comments {
                writeln!(out, "// {}", section.title())?;
            }
            for decl in decls {
                writeln!(out, "let {} = {};", decl.id, decl.text)?;
            }
            out.push('\n');
        }
        tracing::debug!(
            "rendered {} declaration(s), {} byte(s) of body",
            self.pool.len(),
            body.len()
        );
        out.push_str(&body);
        Ok(out)
    }

    // ==========================================================================
    // Declarations
    // ==========================================================================

    fn type_ref(&mut self, ty: &DataType) -> Result<String, RenderError> {
        self.pool.intern(DeclKey::Type(ty.clone()), |_| {
            Ok(format!("type({})", ty.friendly_name(true)))
        })
    }

    fn declare_variable(&mut self, var: &Variable, is_param: bool) -> Result<String, RenderError> {
        let ty = self.type_ref(&var.ty)?;
        self.pool.intern(DeclKey::Variable(Rc::clone(&var.name)), |_| {
            let mut text = String::new();
            text.push_str(if is_param { "param(" } else { "var(" });
            text.push_str(&ty);
            text.push_str(", ");
            write_string(&mut text, &var.name)?;
            text.push(')');
            Ok(text)
        })
    }

    fn variable_ref(&mut self, var: &Variable) -> Result<String, RenderError> {
        match self.pool.get(&DeclKey::Variable(Rc::clone(&var.name))) {
            Some(id) => Ok(id.to_string()),
            None => self.declare_variable(var, false),
        }
    }

    fn label_ref(&mut self, id: LabelId) -> Result<String, RenderError> {
        let name = self
            .function
            .label_name(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("L{}", id.0));
        self.pool.intern(DeclKey::Label(id), |_| {
            let mut text = String::from("label(");
            write_string(&mut text, &name)?;
            text.push(')');
            Ok(text)
        })
    }

    /// Reflection lookup of a member, rebuilt from its descriptor.
    ///
    /// Access denial degrades to a commented `null`.
    fn member_ref(&mut self, member: &dyn Member) -> Result<String, RenderError> {
        let descriptor = match member.describe() {
            Ok(descriptor) => descriptor,
            Err(denied @ MetadataError::AccessDenied { .. }) => {
                let reason = denied.to_string().replace("*/", "* /");
                tracing::trace!("metadata placeholder for {}", member.display_name());
                return self.pool.intern(DeclKey::Member(member.member_hash()), |_| {
                    Ok(format!("/* metadata unavailable: {reason} */ null"))
                });
            }
            Err(other) => return Err(other.into()),
        };
        let owner = self.type_ref(&descriptor.owner)?;
        let mut params = Vec::with_capacity(descriptor.params.len());
        for param in &descriptor.params {
            params.push(self.type_ref(param)?);
        }
        self.pool.intern(DeclKey::Member(member.member_hash()), |_| {
            let mut text = format!("{}({owner}, ", descriptor.kind.keyword());
            if let Some(name) = &descriptor.name {
                write_string(&mut text, name)?;
                text.push_str(", ");
            }
            if matches!(descriptor.kind, MemberKind::Method | MemberKind::Constructor) {
                write!(text, "[{}], ", params.join(", "))?;
            }
            text.push_str(&descriptor.flags.to_source());
            text.push(')');
            Ok(text)
        })
    }

    fn call_site_ref(&mut self, site: &CallSite) -> Result<String, RenderError> {
        let binder = match &site.binder {
            Binder::GetMember { name } => quoted("GetMember", name)?,
            Binder::SetMember { name } => quoted("SetMember", name)?,
            Binder::InvokeMember { name } => quoted("InvokeMember", name)?,
            Binder::Invoke => "Invoke".to_string(),
            Binder::GetIndex => "GetIndex".to_string(),
            Binder::SetIndex => "SetIndex".to_string(),
            Binder::BinaryOperation(op) => format!("BinaryOperation({})", op.name()),
            Binder::UnaryOperation(op) => format!("UnaryOperation({})", op.name()),
            Binder::Convert(ty) => format!("Convert({})", self.type_ref(ty)?),
            Binder::Foreign(name) => {
                return Err(RenderError::Unsupported {
                    construct: format!("call site binder '{name}'"),
                });
            }
        };
        let result = self.type_ref(&site.result_type)?;
        self.pool.intern(DeclKey::CallSite(site.clone()), |_| {
            Ok(format!(
                "callsite({binder}, {}, {}, {result})",
                site.arg_count,
                site.flags.to_source()
            ))
        })
    }

    // ==========================================================================
    // Nodes
    // ==========================================================================

    fn indent(&self, out: &mut String, depth: usize) {
        for _ in 0..depth * self.options.indent {
            out.push(' ');
        }
    }

    /// `block(...)` with one child per line at `depth + 1`.
    fn block(&mut self, out: &mut String, nodes: &[Node], depth: usize) -> Result<(), RenderError> {
        if nodes.is_empty() {
            out.push_str("block()");
            return Ok(());
        }
        out.push_str("block(\n");
        for (i, node) in nodes.iter().enumerate() {
            self.indent(out, depth + 1);
            self.node(out, node, depth + 1)?;
            if i + 1 < nodes.len() {
                out.push(',');
            }
            out.push('\n');
        }
        self.indent(out, depth);
        out.push(')');
        Ok(())
    }

    fn node(&mut self, out: &mut String, node: &Node, depth: usize) -> Result<(), RenderError> {
        match node {
            Node::Sequence(nodes) => self.block(out, nodes, depth)?,
            Node::Declare(var) => {
                let v = self.variable_ref(var)?;
                write!(out, "declare({v})")?;
            }
            Node::Assign { target, value } => {
                let v = self.variable_ref(target)?;
                write!(out, "assign({v}, ")?;
                self.expr(out, value)?;
                out.push(')');
            }
            Node::Act(expr) => {
                out.push_str("act(");
                self.expr(out, expr)?;
                out.push(')');
            }
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push_str("if(");
                self.expr(out, condition)?;
                out.push_str(", ");
                self.block(out, then_branch, depth)?;
                if let Some(else_branch) = else_branch {
                    out.push_str(", ");
                    self.block(out, else_branch, depth)?;
                }
                out.push(')');
            }
            Node::Loop {
                condition,
                body,
                break_label,
                continue_label,
            } => {
                out.push_str("loop(");
                match condition {
                    Some(condition) => {
                        out.push_str("while(");
                        self.expr(out, condition)?;
                        out.push_str("), ");
                    }
                    None => out.push_str("forever, "),
                }
                self.block(out, body, depth)?;
                let (lb, lc) = (self.label_ref(*break_label)?, self.label_ref(*continue_label)?);
                write!(out, ", {lb}, {lc})")?;
            }
            Node::Switch { selector, cases } => {
                out.push_str("switch(");
                self.expr(out, selector)?;
                for case in cases {
                    out.push_str(", ");
                    self.switch_case(out, case, depth)?;
                }
                out.push(')');
            }
            Node::Try {
                body,
                handlers,
                finally,
                fault,
            } => {
                if fault.is_some() {
                    return Err(RenderError::Unsupported {
                        construct: "a fault block".to_string(),
                    });
                }
                out.push_str("try(");
                self.block(out, body, depth)?;
                for handler in handlers {
                    out.push_str(", ");
                    self.catch(out, handler, depth)?;
                }
                if let Some(finally) = finally {
                    out.push_str(", finally(");
                    self.block(out, finally, depth)?;
                    out.push(')');
                }
                out.push(')');
            }
            Node::Using {
                resource,
                value,
                body,
            } => {
                let v = self.variable_ref(resource)?;
                write!(out, "using({v}, ")?;
                self.expr(out, value)?;
                out.push_str(", ");
                self.block(out, body, depth)?;
                out.push(')');
            }
            Node::Throw(Some(expr)) => {
                out.push_str("throw(");
                self.expr(out, expr)?;
                out.push(')');
            }
            Node::Throw(None) => out.push_str("rethrow()"),
            Node::Return { label, value } => {
                let l = self.label_ref(*label)?;
                write!(out, "return({l}")?;
                if let Some(value) = value {
                    out.push_str(", ");
                    self.expr(out, value)?;
                }
                out.push(')');
            }
            Node::Goto { target, kind } => {
                let l = self.label_ref(*target)?;
                write!(out, "{}({l})", kind.keyword())?;
            }
            Node::Label(id) => {
                let l = self.label_ref(*id)?;
                write!(out, "mark({l})")?;
            }
        }
        Ok(())
    }

    fn switch_case(
        &mut self,
        out: &mut String,
        case: &SwitchCase,
        depth: usize,
    ) -> Result<(), RenderError> {
        out.push_str(if case.is_default { "default([" } else { "case([" });
        self.expr_list(out, &case.values)?;
        out.push_str("], ");
        self.block(out, &case.body, depth)?;
        out.push(')');
        Ok(())
    }

    fn catch(
        &mut self,
        out: &mut String,
        handler: &CatchHandler,
        depth: usize,
    ) -> Result<(), RenderError> {
        if handler.filter.is_some() {
            return Err(RenderError::Unsupported {
                construct: "a filtered catch block".to_string(),
            });
        }
        let test = match &handler.test {
            Some(ty) => self.type_ref(ty)?,
            None => "any".to_string(),
        };
        let variable = match &handler.variable {
            Some(var) => self.variable_ref(var)?,
            None => "none".to_string(),
        };
        write!(out, "catch({test}, {variable}, ")?;
        self.block(out, &handler.body, depth)?;
        out.push(')');
        Ok(())
    }

    // ==========================================================================
    // Expressions
    // ==========================================================================

    fn expr_list(&mut self, out: &mut String, exprs: &[Expr]) -> Result<(), RenderError> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.expr(out, expr)?;
        }
        Ok(())
    }

    fn target(&mut self, out: &mut String, target: Option<&Expr>) -> Result<(), RenderError> {
        match target {
            Some(target) => self.expr(out, target),
            None => {
                out.push_str("none");
                Ok(())
            }
        }
    }

    fn expr(&mut self, out: &mut String, expr: &Expr) -> Result<(), RenderError> {
        match expr {
            Expr::Constant { value, ty } => {
                let t = self.type_ref(ty)?;
                write!(out, "constant({t}, ")?;
                write_literal(out, value)?;
                out.push(')');
            }
            Expr::Variable(var) => {
                let v = self.variable_ref(var)?;
                out.push_str(&v);
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                write!(out, "{}(", op.name())?;
                self.expr(out, left)?;
                out.push_str(", ");
                self.expr(out, right)?;
                out.push(')');
            }
            Expr::Unary { op, operand, .. } => {
                write!(out, "{}(", op.name())?;
                self.expr(out, operand)?;
                out.push(')');
            }
            Expr::Convert { operand, ty } => {
                let t = self.type_ref(ty)?;
                out.push_str("convert(");
                self.expr(out, operand)?;
                write!(out, ", {t})")?;
            }
            Expr::Call {
                method,
                target,
                args,
            } => {
                let m = self.member_ref(method.as_ref())?;
                write!(out, "call({m}, ")?;
                self.target(out, target.as_deref())?;
                out.push_str(", [");
                self.expr_list(out, args)?;
                out.push_str("])");
            }
            Expr::New { constructor, args } => {
                let m = self.member_ref(constructor.as_ref())?;
                write!(out, "new({m}, [")?;
                self.expr_list(out, args)?;
                out.push_str("])");
            }
            Expr::Field { field, target } => {
                let m = self.member_ref(field.as_ref())?;
                write!(out, "get({m}, ")?;
                self.target(out, target.as_deref())?;
                out.push(')');
            }
            Expr::Property { property, target } => {
                let m = self.member_ref(property.as_ref())?;
                write!(out, "get({m}, ")?;
                self.target(out, target.as_deref())?;
                out.push(')');
            }
            Expr::Subscribe {
                event,
                target,
                handler,
            } => {
                let m = self.member_ref(event.as_ref())?;
                write!(out, "subscribe({m}, ")?;
                self.target(out, target.as_deref())?;
                out.push_str(", ");
                self.expr(out, handler)?;
                out.push(')');
            }
            Expr::Dynamic { site, args } => {
                let s = self.call_site_ref(site)?;
                write!(out, "dynamic({s}, [")?;
                self.expr_list(out, args)?;
                out.push_str("])");
            }
            Expr::Iterator { op, operand } => {
                write!(out, "{}(", op.name())?;
                self.expr(out, operand)?;
                out.push(')');
            }
            Expr::Extension(ext) => {
                return Err(RenderError::Unsupported {
                    construct: format!("extension node '{}'", ext.0.name()),
                });
            }
        }
        Ok(())
    }
}

fn quoted(kind: &str, name: &str) -> Result<String, RenderError> {
    let mut text = format!("{kind}(");
    write_string(&mut text, name)?;
    text.push(')');
    Ok(text)
}
