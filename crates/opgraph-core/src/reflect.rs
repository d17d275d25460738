//! Reflection metadata for methods, constructors, fields, properties and
//! events.
//!
//! Every member carries a deterministic [`TypeHash`], its binding shape
//! (static or instance, public or not) and the native behaviour invoked by
//! the interpreter. Equality of members is identity of their hash.
//!
//! Access to a member's metadata can be restricted. The renderer asks a
//! member to [`describe`](Member::describe) itself and degrades gracefully
//! when access is denied.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::{DataType, MetadataError, TypeHash, Value};

/// Native behaviour behind a member.
///
/// Instance members receive the target as `args[0]`. An `Err` carries the
/// thrown exception value.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, Value>>;

/// Dispose behaviour of a disposable type. Receives the resource slot
/// itself so value-typed resources are disposed in place.
pub type DisposeFn = Rc<dyn Fn(&mut Value) -> Result<(), Value>>;

bitflags! {
    /// Flags selecting members during a reflection lookup.
    ///
    /// A lookup matches a member when the flags admit both its binding
    /// (`STATIC` or `INSTANCE`) and its visibility (`PUBLIC` or
    /// `NON_PUBLIC`).
    ///
    /// ```
    /// use opgraph_core::BindingFlags;
    ///
    /// let flags = BindingFlags::lookup(true);
    /// assert_eq!(flags.to_source(), "Public | NonPublic | Static");
    /// assert_eq!(BindingFlags::from_source(&["Public", "NonPublic", "Static"]), Some(flags));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindingFlags: u8 {
        /// Instance members.
        const INSTANCE = 1 << 0;
        /// Static members.
        const STATIC = 1 << 1;
        /// Public members.
        const PUBLIC = 1 << 2;
        /// Non-public members.
        const NON_PUBLIC = 1 << 3;
    }
}

const FLAG_NAMES: [(BindingFlags, &str); 4] = [
    (BindingFlags::PUBLIC, "Public"),
    (BindingFlags::NON_PUBLIC, "NonPublic"),
    (BindingFlags::STATIC, "Static"),
    (BindingFlags::INSTANCE, "Instance"),
];

impl BindingFlags {
    /// Generalized lookup flags: any visibility, the given binding.
    pub fn lookup(is_static: bool) -> Self {
        let binding = if is_static {
            BindingFlags::STATIC
        } else {
            BindingFlags::INSTANCE
        };
        BindingFlags::PUBLIC | BindingFlags::NON_PUBLIC | binding
    }

    /// Check whether a member with this shape is selected.
    pub fn admits(self, is_static: bool, visibility: Visibility) -> bool {
        let binding = if is_static {
            BindingFlags::STATIC
        } else {
            BindingFlags::INSTANCE
        };
        let vis = match visibility {
            Visibility::Public => BindingFlags::PUBLIC,
            Visibility::NonPublic => BindingFlags::NON_PUBLIC,
        };
        self.contains(binding) && self.contains(vis)
    }

    /// Render as `Public | NonPublic | Static`.
    pub fn to_source(self) -> String {
        let names: Vec<&str> = FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "Default".to_string()
        } else {
            names.join(" | ")
        }
    }

    /// Parse the names produced by [`to_source`](Self::to_source).
    pub fn from_source(names: &[&str]) -> Option<Self> {
        let mut flags = BindingFlags::empty();
        for name in names {
            if *name == "Default" {
                continue;
            }
            let (flag, _) = FLAG_NAMES.iter().find(|(_, n)| n == name)?;
            flags |= *flag;
        }
        Some(flags)
    }
}

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    NonPublic,
}

/// Whether a member's metadata may be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MetadataAccess {
    /// Freely inspectable.
    #[default]
    Open,
    /// Inspection is denied by policy.
    Restricted,
    /// Inspection fails for another reason.
    Broken(String),
}

/// Kind of a reflected member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Constructor,
    Field,
    Property,
    Event,
}

impl MemberKind {
    /// Dialect keyword of a hoisted lookup of this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::Constructor => "ctor",
            MemberKind::Field => "field",
            MemberKind::Property => "property",
            MemberKind::Event => "event",
        }
    }

    /// Inverse of [`keyword`](Self::keyword).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "method" => MemberKind::Method,
            "ctor" => MemberKind::Constructor,
            "field" => MemberKind::Field,
            "property" => MemberKind::Property,
            "event" => MemberKind::Event,
            _ => return None,
        })
    }
}

/// Everything needed to look a member up again by reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub kind: MemberKind,
    pub owner: DataType,
    /// `None` for constructors.
    pub name: Option<Rc<str>>,
    /// Parameter types of methods and constructors.
    pub params: Vec<DataType>,
    /// Generalized lookup flags.
    pub flags: BindingFlags,
}

/// Common reflection surface of all members.
pub trait Member {
    /// Deterministic identity.
    fn member_hash(&self) -> TypeHash;

    /// Human-readable `Owner.Name` form used in diagnostics.
    fn display_name(&self) -> String;

    /// Describe the member for a reflection lookup.
    fn describe(&self) -> Result<MemberDescriptor, MetadataError>;
}

fn check_access(access: &MetadataAccess, member: String) -> Result<(), MetadataError> {
    match access {
        MetadataAccess::Open => Ok(()),
        MetadataAccess::Restricted => Err(MetadataError::AccessDenied { member }),
        MetadataAccess::Broken(reason) => Err(MetadataError::Unavailable {
            member,
            reason: reason.clone(),
        }),
    }
}

macro_rules! identity_by_hash {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.hash == other.hash
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.hash.hash(state);
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.display_name())
            }
        }
    };
}

// ============================================================================
// Methods
// ============================================================================

/// A callable method.
pub struct MethodInfo {
    pub owner: DataType,
    pub name: Rc<str>,
    pub params: Vec<DataType>,
    pub return_type: DataType,
    pub is_static: bool,
    pub visibility: Visibility,
    pub access: MetadataAccess,
    pub native: NativeFn,
    hash: TypeHash,
}

impl MethodInfo {
    /// Create a public instance method.
    pub fn new(
        owner: DataType,
        name: &str,
        params: Vec<DataType>,
        return_type: DataType,
        native: NativeFn,
    ) -> Self {
        let param_hashes: Vec<TypeHash> = params.iter().map(DataType::type_hash).collect();
        let hash = TypeHash::from_method(owner.type_hash(), name, &param_hashes);
        Self {
            owner,
            name: Rc::from(name),
            params,
            return_type,
            is_static: false,
            visibility: Visibility::Public,
            access: MetadataAccess::Open,
            native,
            hash,
        }
    }

    /// Mark as static.
    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Set visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set metadata access.
    pub fn with_access(mut self, access: MetadataAccess) -> Self {
        self.access = access;
        self
    }
}

impl Member for MethodInfo {
    fn member_hash(&self) -> TypeHash {
        self.hash
    }

    fn display_name(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!(
            "{}.{}({})",
            self.owner.friendly_name(true),
            self.name,
            params.join(", ")
        )
    }

    fn describe(&self) -> Result<MemberDescriptor, MetadataError> {
        check_access(&self.access, self.display_name())?;
        Ok(MemberDescriptor {
            kind: MemberKind::Method,
            owner: self.owner.clone(),
            name: Some(Rc::clone(&self.name)),
            params: self.params.clone(),
            flags: BindingFlags::lookup(self.is_static),
        })
    }
}

identity_by_hash!(MethodInfo);

// ============================================================================
// Constructors
// ============================================================================

/// An object constructor. The native receives the arguments and returns
/// the new instance.
pub struct ConstructorInfo {
    pub owner: DataType,
    pub params: Vec<DataType>,
    pub visibility: Visibility,
    pub access: MetadataAccess,
    pub native: NativeFn,
    hash: TypeHash,
}

impl ConstructorInfo {
    /// Create a public constructor.
    pub fn new(owner: DataType, params: Vec<DataType>, native: NativeFn) -> Self {
        let param_hashes: Vec<TypeHash> = params.iter().map(DataType::type_hash).collect();
        let hash = TypeHash::from_constructor(owner.type_hash(), &param_hashes);
        Self {
            owner,
            params,
            visibility: Visibility::Public,
            access: MetadataAccess::Open,
            native,
            hash,
        }
    }

    /// Set visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set metadata access.
    pub fn with_access(mut self, access: MetadataAccess) -> Self {
        self.access = access;
        self
    }
}

impl Member for ConstructorInfo {
    fn member_hash(&self) -> TypeHash {
        self.hash
    }

    fn display_name(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({})", self.owner.friendly_name(true), params.join(", "))
    }

    fn describe(&self) -> Result<MemberDescriptor, MetadataError> {
        check_access(&self.access, self.display_name())?;
        Ok(MemberDescriptor {
            kind: MemberKind::Constructor,
            owner: self.owner.clone(),
            name: None,
            params: self.params.clone(),
            flags: BindingFlags::lookup(false),
        })
    }
}

identity_by_hash!(ConstructorInfo);

// ============================================================================
// Fields
// ============================================================================

/// A data field. Instance fields address a slot of the object; static
/// fields own their storage.
pub struct FieldInfo {
    pub owner: DataType,
    pub name: Rc<str>,
    pub ty: DataType,
    pub is_static: bool,
    pub visibility: Visibility,
    pub access: MetadataAccess,
    /// Slot index into the instance's field list.
    pub index: usize,
    /// Storage of a static field.
    pub static_slot: Option<Rc<RefCell<Value>>>,
    hash: TypeHash,
}

impl FieldInfo {
    /// Create a public instance field at `index`.
    pub fn new(owner: DataType, name: &str, ty: DataType, index: usize) -> Self {
        let hash = TypeHash::from_field(owner.type_hash(), name);
        Self {
            owner,
            name: Rc::from(name),
            ty,
            is_static: false,
            visibility: Visibility::Public,
            access: MetadataAccess::Open,
            index,
            static_slot: None,
            hash,
        }
    }

    /// Create a public static field holding `initial`.
    pub fn new_static(owner: DataType, name: &str, ty: DataType, initial: Value) -> Self {
        let mut field = Self::new(owner, name, ty, 0);
        field.is_static = true;
        field.static_slot = Some(Rc::new(RefCell::new(initial)));
        field
    }

    /// Set visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set metadata access.
    pub fn with_access(mut self, access: MetadataAccess) -> Self {
        self.access = access;
        self
    }
}

impl Member for FieldInfo {
    fn member_hash(&self) -> TypeHash {
        self.hash
    }

    fn display_name(&self) -> String {
        format!("{}.{}", self.owner.friendly_name(true), self.name)
    }

    fn describe(&self) -> Result<MemberDescriptor, MetadataError> {
        check_access(&self.access, self.display_name())?;
        Ok(MemberDescriptor {
            kind: MemberKind::Field,
            owner: self.owner.clone(),
            name: Some(Rc::clone(&self.name)),
            params: Vec::new(),
            flags: BindingFlags::lookup(self.is_static),
        })
    }
}

identity_by_hash!(FieldInfo);

// ============================================================================
// Properties
// ============================================================================

/// A read-only property backed by a native getter.
pub struct PropertyInfo {
    pub owner: DataType,
    pub name: Rc<str>,
    pub ty: DataType,
    pub is_static: bool,
    pub visibility: Visibility,
    pub access: MetadataAccess,
    pub getter: NativeFn,
    hash: TypeHash,
}

impl PropertyInfo {
    /// Create a public instance property.
    pub fn new(owner: DataType, name: &str, ty: DataType, getter: NativeFn) -> Self {
        let hash = TypeHash::from_property(owner.type_hash(), name);
        Self {
            owner,
            name: Rc::from(name),
            ty,
            is_static: false,
            visibility: Visibility::Public,
            access: MetadataAccess::Open,
            getter,
            hash,
        }
    }

    /// Mark as static.
    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Set metadata access.
    pub fn with_access(mut self, access: MetadataAccess) -> Self {
        self.access = access;
        self
    }
}

impl Member for PropertyInfo {
    fn member_hash(&self) -> TypeHash {
        self.hash
    }

    fn display_name(&self) -> String {
        format!("{}.{}", self.owner.friendly_name(true), self.name)
    }

    fn describe(&self) -> Result<MemberDescriptor, MetadataError> {
        check_access(&self.access, self.display_name())?;
        Ok(MemberDescriptor {
            kind: MemberKind::Property,
            owner: self.owner.clone(),
            name: Some(Rc::clone(&self.name)),
            params: Vec::new(),
            flags: BindingFlags::lookup(self.is_static),
        })
    }
}

identity_by_hash!(PropertyInfo);

// ============================================================================
// Events
// ============================================================================

/// An event. Subscribing calls `add` with `[target?, handler]`.
pub struct EventInfo {
    pub owner: DataType,
    pub name: Rc<str>,
    pub handler_type: DataType,
    pub is_static: bool,
    pub visibility: Visibility,
    pub access: MetadataAccess,
    pub add: NativeFn,
    hash: TypeHash,
}

impl EventInfo {
    /// Create a public instance event.
    pub fn new(owner: DataType, name: &str, handler_type: DataType, add: NativeFn) -> Self {
        let hash = TypeHash::from_event(owner.type_hash(), name);
        Self {
            owner,
            name: Rc::from(name),
            handler_type,
            is_static: false,
            visibility: Visibility::Public,
            access: MetadataAccess::Open,
            add,
            hash,
        }
    }

    /// Mark as static.
    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Set metadata access.
    pub fn with_access(mut self, access: MetadataAccess) -> Self {
        self.access = access;
        self
    }
}

impl Member for EventInfo {
    fn member_hash(&self) -> TypeHash {
        self.hash
    }

    fn display_name(&self) -> String {
        format!("{}.{}", self.owner.friendly_name(true), self.name)
    }

    fn describe(&self) -> Result<MemberDescriptor, MetadataError> {
        check_access(&self.access, self.display_name())?;
        Ok(MemberDescriptor {
            kind: MemberKind::Event,
            owner: self.owner.clone(),
            name: Some(Rc::clone(&self.name)),
            params: Vec::new(),
            flags: BindingFlags::lookup(self.is_static),
        })
    }
}

identity_by_hash!(EventInfo);
