//! Registered type entries and their builder.

use std::fmt;
use std::rc::Rc;

use opgraph_core::{
    ConstructorInfo, DataType, DisposeFn, EventInfo, FieldInfo, Member, MethodInfo, NativeFn,
    PropertyInfo, QualifiedName, TypeHash, Value,
};

/// Value types are copied on assignment; reference types are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Value,
    Reference,
}

/// A registered named type.
pub struct TypeEntry {
    pub name: QualifiedName,
    pub kind: TypeKind,
    pub base: Option<QualifiedName>,
    /// Present on disposable types.
    pub dispose: Option<DisposeFn>,
    pub methods: Vec<Rc<MethodInfo>>,
    pub constructors: Vec<Rc<ConstructorInfo>>,
    pub fields: Vec<Rc<FieldInfo>>,
    pub properties: Vec<Rc<PropertyInfo>>,
    pub events: Vec<Rc<EventInfo>>,
}

impl TypeEntry {
    /// Identity of this type.
    pub fn type_hash(&self) -> TypeHash {
        self.name.type_hash()
    }

    /// The type as a [`DataType`].
    pub fn data_type(&self) -> DataType {
        DataType::Named(self.name.clone())
    }

    /// Number of instance field slots declared directly on this type.
    pub fn instance_field_count(&self) -> usize {
        self.fields.iter().filter(|f| !f.is_static).count()
    }

    /// Hashes of every member, for duplicate detection.
    pub(crate) fn member_hashes(&self) -> Vec<(TypeHash, String)> {
        let mut out = Vec::new();
        out.extend(self.methods.iter().map(|m| (m.member_hash(), m.display_name())));
        out.extend(self.constructors.iter().map(|m| (m.member_hash(), m.display_name())));
        out.extend(self.fields.iter().map(|m| (m.member_hash(), m.display_name())));
        out.extend(self.properties.iter().map(|m| (m.member_hash(), m.display_name())));
        out.extend(self.events.iter().map(|m| (m.member_hash(), m.display_name())));
        out
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base", &self.base)
            .field("disposable", &self.dispose.is_some())
            .field("methods", &self.methods.len())
            .field("constructors", &self.constructors.len())
            .field("fields", &self.fields.len())
            .field("properties", &self.properties.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Fluent construction of a [`TypeEntry`].
///
/// Member owners are filled in from the type being built. Instance fields
/// are assigned consecutive slots in declaration order, after the slots of
/// the base type.
///
/// ```
/// use std::rc::Rc;
/// use opgraph_core::{DataType, Value};
/// use opgraph_registry::TypeBuilder;
///
/// let counter = TypeBuilder::reference("Demo.Counter")
///     .field("Count", DataType::Int32)
///     .constructor(vec![], Rc::new(|_: &[Value]| Ok(Value::object("Demo.Counter", vec![Value::Int32(0)]))))
///     .build();
/// assert_eq!(counter.fields[0].index, 0);
/// ```
pub struct TypeBuilder {
    entry: TypeEntry,
    next_slot: usize,
}

impl TypeBuilder {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            entry: TypeEntry {
                name: QualifiedName::new(name),
                kind,
                base: None,
                dispose: None,
                methods: Vec::new(),
                constructors: Vec::new(),
                fields: Vec::new(),
                properties: Vec::new(),
                events: Vec::new(),
            },
            next_slot: 0,
        }
    }

    /// Start a reference type.
    pub fn reference(name: &str) -> Self {
        Self::new(name, TypeKind::Reference)
    }

    /// Start a value type.
    pub fn value(name: &str) -> Self {
        Self::new(name, TypeKind::Value)
    }

    /// Derive from `base`, whose instance fields occupy the first
    /// `base_fields` slots.
    pub fn base(mut self, base: &str, base_fields: usize) -> Self {
        self.entry.base = Some(QualifiedName::new(base));
        self.next_slot = self.next_slot.max(base_fields);
        self
    }

    /// Make the type disposable.
    pub fn dispose(mut self, dispose: DisposeFn) -> Self {
        self.entry.dispose = Some(dispose);
        self
    }

    fn owner(&self) -> DataType {
        self.entry.data_type()
    }

    /// Public instance method.
    pub fn method(
        self,
        name: &str,
        params: Vec<DataType>,
        return_type: DataType,
        native: NativeFn,
    ) -> Self {
        let info = MethodInfo::new(self.owner(), name, params, return_type, native);
        self.with_method(info)
    }

    /// Public static method.
    pub fn static_method(
        self,
        name: &str,
        params: Vec<DataType>,
        return_type: DataType,
        native: NativeFn,
    ) -> Self {
        let info = MethodInfo::new(self.owner(), name, params, return_type, native).with_static();
        self.with_method(info)
    }

    /// Add a fully configured method.
    pub fn with_method(mut self, info: MethodInfo) -> Self {
        self.entry.methods.push(Rc::new(info));
        self
    }

    /// Public constructor.
    pub fn constructor(mut self, params: Vec<DataType>, native: NativeFn) -> Self {
        let info = ConstructorInfo::new(self.owner(), params, native);
        self.entry.constructors.push(Rc::new(info));
        self
    }

    /// Public instance field in the next free slot.
    pub fn field(self, name: &str, ty: DataType) -> Self {
        let info = FieldInfo::new(self.owner(), name, ty, self.next_slot);
        self.with_field(info)
    }

    /// Public static field.
    pub fn static_field(self, name: &str, ty: DataType, initial: Value) -> Self {
        let info = FieldInfo::new_static(self.owner(), name, ty, initial);
        self.with_field(info)
    }

    /// Add a fully configured field. Instance fields take the next free slot.
    pub fn with_field(mut self, mut info: FieldInfo) -> Self {
        if !info.is_static {
            info.index = self.next_slot;
            self.next_slot += 1;
        }
        self.entry.fields.push(Rc::new(info));
        self
    }

    /// Public instance property.
    pub fn property(self, name: &str, ty: DataType, getter: NativeFn) -> Self {
        let info = PropertyInfo::new(self.owner(), name, ty, getter);
        self.with_property(info)
    }

    /// Add a fully configured property.
    pub fn with_property(mut self, info: PropertyInfo) -> Self {
        self.entry.properties.push(Rc::new(info));
        self
    }

    /// Public instance event.
    pub fn event(mut self, name: &str, handler_type: DataType, add: NativeFn) -> Self {
        let info = EventInfo::new(self.owner(), name, handler_type, add);
        self.entry.events.push(Rc::new(info));
        self
    }

    /// Add a fully configured event.
    pub fn with_event(mut self, info: EventInfo) -> Self {
        self.entry.events.push(Rc::new(info));
        self
    }

    /// Finish the entry.
    pub fn build(self) -> TypeEntry {
        self.entry
    }
}
