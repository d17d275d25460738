//! Core types shared by every opgraph crate.
//!
//! - [`TypeHash`], [`QualifiedName`] and [`DataType`]: type identity.
//! - [`Value`]: runtime values.
//! - [`reflect`]: member metadata and binding flags.
//! - [`CallSite`]: dynamic call-site descriptors.
//! - [`Expr`], [`Node`] and [`Function`]: the operation graph.
//! - [`error`]: per-phase error types.

pub mod call_site;
pub mod data_type;
pub mod error;
pub mod expr;
pub mod node;
pub mod qualified_name;
pub mod reflect;
pub mod span;
pub mod type_hash;
pub mod value;

pub use call_site::{Binder, CallSite, CallSiteFlags};
pub use data_type::DataType;
pub use error::{
    BackendError, BuildError, LoadError, MetadataError, OpGraphError, ReadError, RegistryError,
    RenderError, RuntimeError,
};
pub use expr::{BinaryOp, Expr, ExtensionExpr, ExtensionNode, IteratorOp, UnaryOp, Variable};
pub use node::{CatchHandler, Function, JumpKind, LabelDef, LabelId, Node, SwitchCase};
pub use qualified_name::QualifiedName;
pub use reflect::{
    BindingFlags, ConstructorInfo, DisposeFn, EventInfo, FieldInfo, Member, MemberDescriptor,
    MemberKind, MetadataAccess, MethodInfo, NativeFn, PropertyInfo, Visibility,
};
pub use span::Span;
pub use type_hash::TypeHash;
pub use value::{exceptions, IteratorState, ObjectValue, SequenceValue, Shared, StructValue, Value};
