//! Dynamic call-site descriptors.
//!
//! A call site pairs a [`Binder`] describing the late-bound operation with
//! the number of arguments it receives (target included), behaviour flags
//! and the static result type. Binders form a closed tagged set;
//! [`Binder::Foreign`] stands for any binder this workspace cannot express
//! and is rejected by both the renderer and the backend.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::{BinaryOp, DataType, UnaryOp};

bitflags! {
    /// Behaviour flags of a dynamic call site.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallSiteFlags: u8 {
        /// Arithmetic is overflow-checked.
        const CHECKED = 1 << 0;
        /// The result is discarded by the caller.
        const DISCARD_RESULT = 1 << 1;
        /// The operation is part of a compound assignment.
        const COMPOUND = 1 << 2;
    }
}

const SITE_FLAG_NAMES: [(CallSiteFlags, &str); 3] = [
    (CallSiteFlags::CHECKED, "Checked"),
    (CallSiteFlags::DISCARD_RESULT, "DiscardResult"),
    (CallSiteFlags::COMPOUND, "Compound"),
];

impl CallSiteFlags {
    /// Render as `Checked | DiscardResult`, or `None` when empty.
    pub fn to_source(self) -> String {
        let names: Vec<&str> = SITE_FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "None".to_string()
        } else {
            names.join(" | ")
        }
    }

    /// Parse the names produced by [`to_source`](Self::to_source).
    pub fn from_source(names: &[&str]) -> Option<Self> {
        let mut flags = CallSiteFlags::empty();
        for name in names {
            if *name == "None" {
                continue;
            }
            let (flag, _) = SITE_FLAG_NAMES.iter().find(|(_, n)| n == name)?;
            flags |= *flag;
        }
        Some(flags)
    }
}

/// The late-bound operation of a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binder {
    /// `target.name`
    GetMember { name: Rc<str> },
    /// `target.name = value`
    SetMember { name: Rc<str> },
    /// `target.name(args...)`
    InvokeMember { name: Rc<str> },
    /// `target(args...)`
    Invoke,
    /// `target[index...]`
    GetIndex,
    /// `target[index...] = value`
    SetIndex,
    /// `left op right`
    BinaryOperation(BinaryOp),
    /// `op operand`
    UnaryOperation(UnaryOp),
    /// `(T) operand`
    Convert(DataType),
    /// A binder kind with no representation here.
    Foreign(Rc<str>),
}

impl Binder {
    /// Binder tag as written in the dialect.
    pub fn kind_name(&self) -> &str {
        match self {
            Binder::GetMember { .. } => "GetMember",
            Binder::SetMember { .. } => "SetMember",
            Binder::InvokeMember { .. } => "InvokeMember",
            Binder::Invoke => "Invoke",
            Binder::GetIndex => "GetIndex",
            Binder::SetIndex => "SetIndex",
            Binder::BinaryOperation(_) => "BinaryOperation",
            Binder::UnaryOperation(_) => "UnaryOperation",
            Binder::Convert(_) => "Convert",
            Binder::Foreign(name) => name,
        }
    }

    /// Whether the binder belongs to the supported set.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Binder::Foreign(_))
    }

    /// Accepted argument counts, target included: `(min, max)`.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Binder::GetMember { .. } | Binder::UnaryOperation(_) | Binder::Convert(_) => {
                (1, Some(1))
            }
            Binder::SetMember { .. } | Binder::BinaryOperation(_) => (2, Some(2)),
            Binder::InvokeMember { .. } | Binder::Invoke => (1, None),
            Binder::GetIndex => (2, None),
            Binder::SetIndex => (3, None),
            Binder::Foreign(_) => (0, None),
        }
    }
}

/// A dynamic call-site descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub binder: Binder,
    /// Argument count, target included.
    pub arg_count: usize,
    pub flags: CallSiteFlags,
    /// Static type of the call's result.
    pub result_type: DataType,
}

impl CallSite {
    /// Create a call site with no flags.
    pub fn new(binder: Binder, arg_count: usize, result_type: DataType) -> Self {
        Self {
            binder,
            arg_count,
            flags: CallSiteFlags::empty(),
            result_type,
        }
    }

    /// Set flags.
    pub fn with_flags(mut self, flags: CallSiteFlags) -> Self {
        self.flags = flags;
        self
    }

    /// `target.name` returning `result_type`.
    pub fn get_member(name: &str, result_type: DataType) -> Self {
        Self::new(Binder::GetMember { name: Rc::from(name) }, 1, result_type)
    }

    /// `target.name(args...)` with `args` arguments after the target.
    pub fn invoke_member(name: &str, args: usize, result_type: DataType) -> Self {
        Self::new(
            Binder::InvokeMember { name: Rc::from(name) },
            args + 1,
            result_type,
        )
    }

    /// Check the argument count against the binder.
    pub fn accepts(&self, count: usize) -> bool {
        let (min, max) = self.binder.arity();
        count == self.arg_count && count >= min && max.map_or(true, |max| count <= max)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.binder.kind_name(), self.arg_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_member_takes_one_argument() {
        let site = CallSite::get_member("Length", DataType::Int32);
        assert!(site.accepts(1));
        assert!(!site.accepts(2));
    }

    #[test]
    fn invoke_member_counts_target() {
        let site = CallSite::invoke_member("Add", 2, DataType::Void);
        assert_eq!(site.arg_count, 3);
        assert!(site.accepts(3));
    }

    #[test]
    fn foreign_binder_is_unsupported() {
        let binder = Binder::Foreign(Rc::from("CSharpIsEventBinder"));
        assert!(!binder.is_supported());
        assert_eq!(binder.kind_name(), "CSharpIsEventBinder");
    }

    #[test]
    fn flags_render() {
        assert_eq!(CallSiteFlags::empty().to_source(), "None");
        let flags = CallSiteFlags::CHECKED | CallSiteFlags::COMPOUND;
        assert_eq!(flags.to_source(), "Checked | Compound");
        assert_eq!(CallSiteFlags::from_source(&["Checked", "Compound"]), Some(flags));
    }
}
