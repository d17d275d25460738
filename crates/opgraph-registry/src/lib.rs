//! Type registry for operation graphs.
//!
//! The registry knows every named type a graph may mention: its kind
//! (value or reference), its base type, its dispose behaviour and its
//! members. The builder asks it about assignability, the renderer's reader
//! resolves reflection lookups through it, and the backend binds dynamic
//! call sites against it at run time.

mod builtins;
mod entry;
mod hierarchy;
mod registry;

pub use entry::{TypeBuilder, TypeEntry, TypeKind};
pub use hierarchy::TypeHierarchy;
pub use registry::{LateMember, TypeRegistry};
