//! Extension reduction.
//!
//! Every extension expression is replaced by its reduction before
//! validation. An extension whose reduction keeps producing extensions
//! past [`MAX_REDUCTIONS`] is treated as irreducible.

use std::rc::Rc;

use opgraph_core::{BackendError, Expr, Function, Node};

const MAX_REDUCTIONS: usize = 64;

/// A copy of `function` without extension expressions.
pub(crate) fn reduce_extensions(function: &Function) -> Result<Function, BackendError> {
    let mut lowered = function.clone();
    reduce_block(&mut lowered.body)?;
    Ok(lowered)
}

fn reduce_block(nodes: &mut [Node]) -> Result<(), BackendError> {
    nodes.iter_mut().try_for_each(reduce_node)
}

fn reduce_node(node: &mut Node) -> Result<(), BackendError> {
    match node {
        Node::Sequence(body) => reduce_block(body),
        Node::Assign { value, .. } | Node::Act(value) => reduce_expr(value),
        Node::If {
            condition,
            then_branch,
            else_branch,
        } => {
            reduce_expr(condition)?;
            reduce_block(then_branch)?;
            else_branch.as_deref_mut().map_or(Ok(()), reduce_block)
        }
        Node::Loop {
            condition, body, ..
        } => {
            if let Some(condition) = condition {
                reduce_expr(condition)?;
            }
            reduce_block(body)
        }
        Node::Switch { selector, cases } => {
            reduce_expr(selector)?;
            for case in cases {
                case.values.iter_mut().try_for_each(reduce_expr)?;
                reduce_block(&mut case.body)?;
            }
            Ok(())
        }
        Node::Try {
            body,
            handlers,
            finally,
            fault,
        } => {
            reduce_block(body)?;
            for handler in handlers {
                if let Some(filter) = &mut handler.filter {
                    reduce_expr(filter)?;
                }
                reduce_block(&mut handler.body)?;
            }
            finally.as_deref_mut().map_or(Ok(()), reduce_block)?;
            fault.as_deref_mut().map_or(Ok(()), reduce_block)
        }
        Node::Using { value, body, .. } => {
            reduce_expr(value)?;
            reduce_block(body)
        }
        Node::Throw(value) | Node::Return { value, .. } => {
            value.as_mut().map_or(Ok(()), reduce_expr)
        }
        Node::Declare(_) | Node::Goto { .. } | Node::Label(_) => Ok(()),
    }
}

fn reduce_expr(expr: &mut Expr) -> Result<(), BackendError> {
    let mut reductions = 0;
    while let Expr::Extension(extension) = &*expr {
        let extension = Rc::clone(&extension.0);
        let name = extension.name().to_string();
        if reductions == MAX_REDUCTIONS {
            return Err(BackendError::IrreducibleExtension { name });
        }
        let reduced = extension
            .reduce()
            .ok_or(BackendError::IrreducibleExtension { name })?;
        tracing::trace!("reduced extension '{}'", extension.name());
        *expr = reduced;
        reductions += 1;
    }

    match expr {
        Expr::Constant { .. } | Expr::Variable(_) | Expr::Extension(_) => Ok(()),
        Expr::Binary { left, right, .. } => {
            reduce_expr(left)?;
            reduce_expr(right)
        }
        Expr::Unary { operand, .. }
        | Expr::Convert { operand, .. }
        | Expr::Iterator { operand, .. } => reduce_expr(operand),
        Expr::Call { target, args, .. } => {
            if let Some(target) = target {
                reduce_expr(target)?;
            }
            args.iter_mut().try_for_each(reduce_expr)
        }
        Expr::New { args, .. } | Expr::Dynamic { args, .. } => {
            args.iter_mut().try_for_each(reduce_expr)
        }
        Expr::Field { target, .. } | Expr::Property { target, .. } => {
            target.as_deref_mut().map_or(Ok(()), reduce_expr)
        }
        Expr::Subscribe {
            target, handler, ..
        } => {
            if let Some(target) = target {
                reduce_expr(target)?;
            }
            reduce_expr(handler)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use opgraph_core::{DataType, ExtensionExpr, LabelDef, LabelId};

    #[derive(Debug)]
    struct Twice(i32);

    impl ExtensionExpr for Twice {
        fn name(&self) -> &str {
            "twice"
        }
        fn data_type(&self) -> DataType {
            DataType::Int32
        }
        fn reduce(&self) -> Option<Expr> {
            Some(Expr::add(Expr::constant(self.0), Expr::constant(self.0)))
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl ExtensionExpr for Opaque {
        fn name(&self) -> &str {
            "opaque"
        }
        fn data_type(&self) -> DataType {
            DataType::Int32
        }
        fn reduce(&self) -> Option<Expr> {
            None
        }
    }

    #[derive(Debug)]
    struct Forever;

    impl ExtensionExpr for Forever {
        fn name(&self) -> &str {
            "forever"
        }
        fn data_type(&self) -> DataType {
            DataType::Int32
        }
        fn reduce(&self) -> Option<Expr> {
            Some(Expr::extension(Rc::new(Forever)))
        }
    }

    fn function(body: Vec<Node>) -> Function {
        Function {
            parameters: vec![],
            return_type: DataType::Int32,
            return_label: LabelId(0),
            allow_outer_capture: false,
            variables: vec![],
            labels: vec![LabelDef {
                id: LabelId(0),
                name: "return".into(),
            }],
            body,
        }
    }

    fn returning(expr: Expr) -> Function {
        function(vec![Node::Return {
            label: LabelId(0),
            value: Some(expr),
        }])
    }

    #[test]
    fn nested_extensions_are_replaced() {
        let nested = Expr::not(Expr::equal(
            Expr::extension(Rc::new(Twice(2))),
            Expr::constant(4),
        ));
        let lowered = reduce_extensions(&returning(nested)).unwrap();
        let mut extensions = 0;
        lowered.walk_expressions(&mut |expr| {
            if matches!(expr, Expr::Extension(_)) {
                extensions += 1;
            }
        });
        assert_eq!(extensions, 0);
    }

    #[test]
    fn irreducible_extension() {
        let err = reduce_extensions(&returning(Expr::extension(Rc::new(Opaque)))).unwrap_err();
        assert_eq!(
            err,
            BackendError::IrreducibleExtension {
                name: "opaque".to_string()
            }
        );
    }

    #[test]
    fn endless_reduction_is_irreducible() {
        let err = reduce_extensions(&returning(Expr::extension(Rc::new(Forever)))).unwrap_err();
        assert!(matches!(err, BackendError::IrreducibleExtension { .. }));
    }
}
