//! TypeRegistry - storage and queries for named types.
//!
//! Types are stored by [`TypeHash`]; the inheritance graph lives in a
//! [`TypeHierarchy`]. Member lookups walk the ancestry nearest first, so a
//! derived member hides a base member with the same signature.
//!
//! # Example
//!
//! ```
//! use opgraph_core::DataType;
//! use opgraph_registry::TypeRegistry;
//!
//! let registry = TypeRegistry::with_builtins();
//! let argument = DataType::named("System.ArgumentException");
//! assert!(registry.is_exception(&argument));
//! assert!(registry.is_assignable(&argument, &DataType::named("System.Exception")));
//! assert!(registry.is_assignable(&DataType::Int32, &DataType::Float64));
//! assert!(!registry.is_assignable(&DataType::Float64, &DataType::Int32));
//! ```

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use opgraph_core::{
    BindingFlags, ConstructorInfo, DataType, DisposeFn, EventInfo, FieldInfo, MethodInfo,
    PropertyInfo, QualifiedName, RegistryError, TypeHash, Value, exceptions,
};

use crate::{TypeEntry, TypeHierarchy, TypeKind};

/// A member found by name during late binding.
#[derive(Debug, Clone)]
pub enum LateMember {
    Field(Rc<FieldInfo>),
    Property(Rc<PropertyInfo>),
}

/// Registry of named types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: FxHashMap<TypeHash, TypeEntry>,
    hierarchy: TypeHierarchy,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in exception family and
    /// `System.Math`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry);
        registry
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register a type. Its base, if any, must already be registered.
    pub fn register(&mut self, entry: TypeEntry) -> Result<(), RegistryError> {
        let hash = entry.type_hash();
        if self.types.contains_key(&hash) {
            return Err(RegistryError::DuplicateType {
                name: entry.name.to_string(),
            });
        }

        if let Some(base) = &entry.base {
            let base_entry = self.types.get(&base.type_hash()).ok_or_else(|| {
                RegistryError::UnknownType {
                    name: base.to_string(),
                }
            })?;
            if base_entry.kind != entry.kind || base == &entry.name {
                return Err(RegistryError::InvalidBase {
                    name: entry.name.to_string(),
                    base: base.to_string(),
                });
            }
        }

        let mut seen = FxHashSet::default();
        for (member_hash, member) in entry.member_hashes() {
            if !seen.insert(member_hash) {
                return Err(RegistryError::DuplicateMember {
                    owner: entry.name.to_string(),
                    member,
                });
            }
        }

        self.hierarchy.add_type(hash);
        if let Some(base) = &entry.base {
            self.hierarchy.add_base(hash, base.type_hash());
        }
        self.types.insert(hash, entry);
        Ok(())
    }

    // ==========================================================================
    // Type queries
    // ==========================================================================

    /// Look up a type by name.
    pub fn get(&self, name: &QualifiedName) -> Option<&TypeEntry> {
        self.types.get(&name.type_hash())
    }

    /// Look up a type by hash.
    pub fn get_by_hash(&self, hash: TypeHash) -> Option<&TypeEntry> {
        self.types.get(&hash)
    }

    /// Entry of a named data type.
    pub fn entry_of(&self, ty: &DataType) -> Option<&TypeEntry> {
        ty.name().and_then(|name| self.get(name))
    }

    /// Check whether a named type is registered.
    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.types.contains_key(&name.type_hash())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The inheritance graph.
    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Every data type mentioned must be a primitive or registered.
    pub fn is_known(&self, ty: &DataType) -> bool {
        match ty {
            DataType::Named(name) => self.contains(name),
            DataType::Sequence(elem) | DataType::Iterator(elem) => self.is_known(elem),
            _ => true,
        }
    }

    /// Entries of a named type and its ancestors, nearest first.
    pub fn ancestry(&self, name: &QualifiedName) -> Vec<&TypeEntry> {
        self.hierarchy
            .ancestry(name.type_hash())
            .into_iter()
            .filter_map(|hash| self.types.get(&hash))
            .collect()
    }

    /// Widening-only assignability.
    ///
    /// Identity; `int -> long -> double`; any non-void type to `object`;
    /// a named type to any of its bases.
    pub fn is_assignable(&self, from: &DataType, to: &DataType) -> bool {
        if from == to {
            return true;
        }
        if from.is_void() || to.is_void() {
            return false;
        }
        if let (Some(f), Some(t)) = (from.numeric_rank(), to.numeric_rank()) {
            return f < t;
        }
        match (from, to) {
            (_, DataType::Object) => true,
            (DataType::Named(derived), DataType::Named(base)) => self
                .hierarchy
                .derives_from(derived.type_hash(), base.type_hash()),
            _ => false,
        }
    }

    /// Whether the type is `System.Exception` or derives from it.
    pub fn is_exception(&self, ty: &DataType) -> bool {
        match ty {
            DataType::Named(name) => self.hierarchy.derives_from(
                name.type_hash(),
                TypeHash::from_name(exceptions::EXCEPTION),
            ),
            _ => false,
        }
    }

    /// Whether a runtime value is an instance of `ty`.
    pub fn is_instance(&self, value: &Value, ty: &DataType) -> bool {
        if value.is_null() {
            return false;
        }
        self.is_assignable(&value.runtime_type(), ty)
    }

    /// Whether the type has dispose behaviour. Iterators always do.
    pub fn is_disposable(&self, ty: &DataType) -> bool {
        matches!(ty, DataType::Iterator(_)) || self.dispose_fn(ty).is_some()
    }

    /// Dispose behaviour of a named type, inherited from the nearest
    /// ancestor that defines one.
    pub fn dispose_fn(&self, ty: &DataType) -> Option<DisposeFn> {
        let name = ty.name()?;
        self.ancestry(name)
            .into_iter()
            .find_map(|entry| entry.dispose.clone())
    }

    /// Whether values of the type are copied on assignment.
    pub fn is_value_type(&self, ty: &DataType) -> bool {
        match ty {
            DataType::Bool | DataType::Int32 | DataType::Int64 | DataType::Float64 => true,
            DataType::Named(_) => self
                .entry_of(ty)
                .is_some_and(|entry| entry.kind == TypeKind::Value),
            _ => false,
        }
    }

    /// Default value of a variable of type `ty`. Value structs start with
    /// every instance field at its own default.
    pub fn default_value(&self, ty: &DataType) -> Value {
        let Some(name) = ty.name() else {
            return Value::default_for(ty);
        };
        let ancestry = self.ancestry(name);
        match ancestry.first() {
            Some(entry) if entry.kind == TypeKind::Value => {
                let mut fields: Vec<(usize, &DataType)> = ancestry
                    .iter()
                    .flat_map(|e| e.fields.iter())
                    .filter(|f| !f.is_static)
                    .map(|f| (f.index, &f.ty))
                    .collect();
                fields.sort_by_key(|(index, _)| *index);
                let values = fields
                    .into_iter()
                    .map(|(_, field_ty)| self.default_value(field_ty))
                    .collect();
                Value::structure(name.clone(), values)
            }
            _ => Value::Null,
        }
    }

    // ==========================================================================
    // Member lookup by signature
    // ==========================================================================

    /// Find a method by exact parameter types.
    pub fn find_method(
        &self,
        owner: &DataType,
        name: &str,
        params: &[DataType],
        flags: BindingFlags,
    ) -> Option<Rc<MethodInfo>> {
        self.owner_chain(owner).into_iter().find_map(|entry| {
            entry
                .methods
                .iter()
                .find(|m| {
                    &*m.name == name
                        && m.params == params
                        && flags.admits(m.is_static, m.visibility)
                })
                .cloned()
        })
    }

    /// Find a constructor declared on `owner` by exact parameter types.
    pub fn find_constructor(
        &self,
        owner: &DataType,
        params: &[DataType],
        flags: BindingFlags,
    ) -> Option<Rc<ConstructorInfo>> {
        self.entry_of(owner)?
            .constructors
            .iter()
            .find(|c| c.params == params && flags.admits(false, c.visibility))
            .cloned()
    }

    /// Find a field by name.
    pub fn find_field(
        &self,
        owner: &DataType,
        name: &str,
        flags: BindingFlags,
    ) -> Option<Rc<FieldInfo>> {
        self.owner_chain(owner).into_iter().find_map(|entry| {
            entry
                .fields
                .iter()
                .find(|f| &*f.name == name && flags.admits(f.is_static, f.visibility))
                .cloned()
        })
    }

    /// Find a property by name.
    pub fn find_property(
        &self,
        owner: &DataType,
        name: &str,
        flags: BindingFlags,
    ) -> Option<Rc<PropertyInfo>> {
        self.owner_chain(owner).into_iter().find_map(|entry| {
            entry
                .properties
                .iter()
                .find(|p| &*p.name == name && flags.admits(p.is_static, p.visibility))
                .cloned()
        })
    }

    /// Find an event by name.
    pub fn find_event(
        &self,
        owner: &DataType,
        name: &str,
        flags: BindingFlags,
    ) -> Option<Rc<EventInfo>> {
        self.owner_chain(owner).into_iter().find_map(|entry| {
            entry
                .events
                .iter()
                .find(|e| &*e.name == name && flags.admits(e.is_static, e.visibility))
                .cloned()
        })
    }

    // ==========================================================================
    // Late binding
    // ==========================================================================

    /// Find a public instance field or property by name on a runtime type.
    pub fn late_member(&self, owner: &DataType, name: &str) -> Option<LateMember> {
        let flags = BindingFlags::PUBLIC | BindingFlags::INSTANCE;
        if let Some(field) = self.find_field(owner, name, flags) {
            return Some(LateMember::Field(field));
        }
        self.find_property(owner, name, flags)
            .map(LateMember::Property)
    }

    /// Pick a public instance method whose parameters accept `args`.
    ///
    /// Exact matches win over widening matches.
    pub fn late_method(
        &self,
        owner: &DataType,
        name: &str,
        args: &[DataType],
    ) -> Option<Rc<MethodInfo>> {
        let flags = BindingFlags::PUBLIC | BindingFlags::INSTANCE;
        let candidates: Vec<Rc<MethodInfo>> = self
            .owner_chain(owner)
            .into_iter()
            .flat_map(|entry| entry.methods.iter())
            .filter(|m| {
                &*m.name == name
                    && m.params.len() == args.len()
                    && flags.admits(m.is_static, m.visibility)
            })
            .cloned()
            .collect();

        candidates
            .iter()
            .find(|m| m.params == args)
            .or_else(|| {
                candidates.iter().find(|m| {
                    m.params
                        .iter()
                        .zip(args)
                        .all(|(param, arg)| self.is_assignable(arg, param))
                })
            })
            .cloned()
    }

    fn owner_chain(&self, owner: &DataType) -> Vec<&TypeEntry> {
        match owner.name() {
            Some(name) => self.ancestry(name),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeBuilder;
    use opgraph_core::{MetadataAccess, NativeFn, Visibility};

    fn noop() -> NativeFn {
        Rc::new(|_: &[Value]| Ok(Value::Null))
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry
            .register(
                TypeBuilder::reference("Demo.Shape")
                    .field("Name", DataType::String)
                    .method("Area", vec![], DataType::Float64, noop())
                    .method("Scale", vec![DataType::Float64], DataType::Void, noop())
                    .build(),
            )
            .unwrap();
        registry
            .register(
                TypeBuilder::reference("Demo.Circle")
                    .base("Demo.Shape", 1)
                    .field("Radius", DataType::Float64)
                    .with_method(
                        MethodInfo::new(
                            DataType::named("Demo.Circle"),
                            "Secret",
                            vec![],
                            DataType::Int32,
                            noop(),
                        )
                        .with_visibility(Visibility::NonPublic)
                        .with_access(MetadataAccess::Restricted),
                    )
                    .build(),
            )
            .unwrap();
        registry
            .register(
                TypeBuilder::value("Demo.Point")
                    .field("X", DataType::Int32)
                    .field("Y", DataType::Float64)
                    .build(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(TypeBuilder::reference("Demo.Shape").build())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType { .. }));
    }

    #[test]
    fn unknown_base_is_rejected() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register(TypeBuilder::reference("Demo.Orphan").base("Demo.Missing", 0).build())
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType { .. }));
    }

    #[test]
    fn value_type_cannot_derive_from_reference() {
        let mut registry = registry();
        let err = registry
            .register(TypeBuilder::value("Demo.Bad").base("Demo.Shape", 1).build())
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidBase { .. }));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register(
                TypeBuilder::reference("Demo.Twice")
                    .method("Run", vec![], DataType::Void, noop())
                    .method("Run", vec![], DataType::Int32, noop())
                    .build(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateMember { .. }));
    }

    #[test]
    fn widening_rules() {
        let registry = registry();
        let circle = DataType::named("Demo.Circle");
        let shape = DataType::named("Demo.Shape");
        assert!(registry.is_assignable(&DataType::Int32, &DataType::Int64));
        assert!(registry.is_assignable(&DataType::Int64, &DataType::Float64));
        assert!(!registry.is_assignable(&DataType::Int64, &DataType::Int32));
        assert!(registry.is_assignable(&circle, &shape));
        assert!(!registry.is_assignable(&shape, &circle));
        assert!(registry.is_assignable(&DataType::String, &DataType::Object));
        assert!(!registry.is_assignable(&DataType::Void, &DataType::Object));
        assert!(!registry.is_assignable(&DataType::String, &DataType::Int32));
    }

    #[test]
    fn members_are_inherited() {
        let registry = registry();
        let circle = DataType::named("Demo.Circle");
        let flags = BindingFlags::lookup(false);
        let area = registry.find_method(&circle, "Area", &[], flags).unwrap();
        assert_eq!(area.owner, DataType::named("Demo.Shape"));
        let name = registry.find_field(&circle, "Name", flags).unwrap();
        assert_eq!(name.index, 0);
        let radius = registry.find_field(&circle, "Radius", flags).unwrap();
        assert_eq!(radius.index, 1);
    }

    #[test]
    fn binding_flags_filter_visibility() {
        let registry = registry();
        let circle = DataType::named("Demo.Circle");
        let public_only = BindingFlags::PUBLIC | BindingFlags::INSTANCE;
        assert!(registry.find_method(&circle, "Secret", &[], public_only).is_none());
        assert!(
            registry
                .find_method(&circle, "Secret", &[], BindingFlags::lookup(false))
                .is_some()
        );
    }

    #[test]
    fn late_method_prefers_exact_then_widening() {
        let registry = registry();
        let shape = DataType::named("Demo.Shape");
        let scale = registry
            .late_method(&shape, "Scale", &[DataType::Int32])
            .unwrap();
        assert_eq!(scale.params, vec![DataType::Float64]);
        assert!(registry.late_method(&shape, "Scale", &[DataType::String]).is_none());
    }

    #[test]
    fn late_member_finds_fields() {
        let registry = registry();
        let member = registry.late_member(&DataType::named("Demo.Circle"), "Radius");
        assert!(matches!(member, Some(LateMember::Field(_))));
        assert!(registry.late_member(&DataType::named("Demo.Circle"), "Nope").is_none());
    }

    #[test]
    fn value_types_default_to_zeroed_structs() {
        let registry = registry();
        let point = registry.default_value(&DataType::named("Demo.Point"));
        assert_eq!(
            point,
            Value::structure("Demo.Point", vec![Value::Int32(0), Value::float(0.0)])
        );
        assert_eq!(registry.default_value(&DataType::named("Demo.Shape")), Value::Null);
        assert!(registry.is_value_type(&DataType::named("Demo.Point")));
        assert!(!registry.is_value_type(&DataType::String));
    }

    #[test]
    fn iterators_are_disposable() {
        let registry = registry();
        assert!(registry.is_disposable(&DataType::iterator(DataType::Int32)));
        assert!(!registry.is_disposable(&DataType::named("Demo.Shape")));
    }

    #[test]
    fn dispose_is_inherited() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeBuilder::reference("Demo.Resource")
                    .dispose(Rc::new(|_: &mut Value| Ok(())))
                    .build(),
            )
            .unwrap();
        registry
            .register(TypeBuilder::reference("Demo.File").base("Demo.Resource", 0).build())
            .unwrap();
        assert!(registry.is_disposable(&DataType::named("Demo.File")));
    }

    #[test]
    fn known_types() {
        let registry = registry();
        assert!(registry.is_known(&DataType::sequence(DataType::named("Demo.Shape"))));
        assert!(!registry.is_known(&DataType::named("Demo.Missing")));
    }
}
