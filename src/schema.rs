// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::InvariantViolation;
use crate::types::{
    builtin_scalars, standard_directives, Directive, NamedType, ObjectType, TypeRef,
};

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{anyhow, Result};
use indexmap::IndexMap;

/// Resolves a type name to its definition on demand. Returning `None`
/// means the name is unknown to the schema.
pub type TypeLoaderFn = Rc<dyn Fn(&str) -> Option<NamedType>>;

pub type TypeMap = IndexMap<Rc<str>, NamedType>;

/// A GraphQL schema: root operation types plus a registry of every named
/// type, filled either eagerly (no loader, full scan at construction) or
/// lazily through a type loader as execution touches names.
///
/// The registry's invariant is that a name maps to exactly one type
/// instance. Conflicting instances for one name are an
/// [`InvariantViolation`] wherever they are discovered.
pub struct Schema {
    query: Rc<ObjectType>,
    mutation: Option<Rc<ObjectType>>,
    subscription: Option<Rc<ObjectType>>,
    directives: Vec<Rc<Directive>>,
    type_loader: Option<TypeLoaderFn>,
    // Lazy enumeration of every type, consulted only when a full scan
    // becomes unavoidable. Traversal alone cannot discover interface
    // implementors nothing else references.
    types_fn: RefCell<Option<Box<dyn FnOnce() -> Vec<NamedType>>>>,
    resolved_types: RefCell<TypeMap>,
    fully_loaded: Cell<bool>,
    possible_types: RefCell<Option<IndexMap<Rc<str>, Vec<Rc<ObjectType>>>>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("query", &self.query.name()).finish()
    }
}

impl Schema {
    pub fn build(query: Rc<ObjectType>) -> SchemaBuilder {
        SchemaBuilder {
            query,
            mutation: None,
            subscription: None,
            extra_types: vec![],
            directives: vec![],
            type_loader: None,
            types_fn: None,
        }
    }

    pub fn query_type(&self) -> &Rc<ObjectType> {
        &self.query
    }

    pub fn mutation_type(&self) -> Option<&Rc<ObjectType>> {
        self.mutation.as_ref()
    }

    pub fn subscription_type(&self) -> Option<&Rc<ObjectType>> {
        self.subscription.as_ref()
    }

    pub fn directive(&self, name: &str) -> Option<Rc<Directive>> {
        self.directives.iter().find(|d| d.name.as_ref() == name).cloned()
    }

    pub fn has_loader(&self) -> bool {
        self.type_loader.is_some()
    }

    /// True once every type reachable from the roots has been resolved.
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.get()
    }

    /// Looks up a named type, consulting the loader on a miss. The loader
    /// must return the type matching the requested name; anything else is
    /// a contract violation.
    pub fn get_type(&self, name: &str) -> Result<Option<NamedType>> {
        if let Some(ty) = self.resolved_types.borrow().get(name) {
            return Ok(Some(ty.clone()));
        }
        if self.fully_loaded.get() {
            return Ok(None);
        }
        let Some(loader) = &self.type_loader else {
            return Ok(None);
        };
        let Some(ty) = loader(name) else {
            return Ok(None);
        };
        if ty.name().as_ref() != name {
            return Err(anyhow!(InvariantViolation(format!(
                "Type loader is expected to return type \"{}\", but it returned type \"{}\".",
                name,
                ty.name()
            ))));
        }
        self.resolved_types.borrow_mut().insert(ty.name(), ty.clone());
        Ok(Some(ty))
    }

    /// Records a type instance produced outside the registry, e.g. by an
    /// abstract type's `resolve_type` callback. A different instance
    /// already registered under the same name is a violation.
    pub fn check_instance(&self, ty: &NamedType) -> Result<()> {
        let name = ty.name();
        if let Some(known) = self.get_type(&name)? {
            if !known.same_instance(ty) {
                return Err(anyhow!(InvariantViolation(format!(
                    "Schema must contain unique named types but contains multiple types named \
                     \"{name}\"."
                ))));
            }
            return Ok(());
        }
        self.resolved_types.borrow_mut().insert(name, ty.clone());
        Ok(())
    }

    /// The complete name-to-type map. Forces a full load on lazy schemas.
    pub fn type_map(&self) -> Result<TypeMap> {
        self.ensure_fully_loaded()?;
        Ok(self.resolved_types.borrow().clone())
    }

    /// Concrete object types that can stand in for the given abstract
    /// type, in registration order. Forces a full load on lazy schemas
    /// since membership can only be known by scanning every object type.
    pub fn possible_types(&self, abstract_name: &str) -> Result<Vec<Rc<ObjectType>>> {
        self.ensure_fully_loaded()?;
        if self.possible_types.borrow().is_none() {
            let mut map: IndexMap<Rc<str>, Vec<Rc<ObjectType>>> = IndexMap::new();
            for ty in self.resolved_types.borrow().values() {
                match ty {
                    NamedType::Object(object) => {
                        for interface in object.interfaces() {
                            map.entry(interface.clone()).or_default().push(object.clone());
                        }
                    }
                    NamedType::Union(union) => {
                        let entry = map.entry(union.name().clone()).or_default();
                        for member in union.member_types() {
                            if let Some(NamedType::Object(object)) =
                                self.resolved_types.borrow().get(member.as_ref())
                            {
                                entry.push(object.clone());
                            }
                        }
                    }
                    _ => {}
                }
            }
            *self.possible_types.borrow_mut() = Some(map);
        }
        Ok(self
            .possible_types
            .borrow()
            .as_ref()
            .and_then(|map| map.get(abstract_name).cloned())
            .unwrap_or_default())
    }

    /// Whether `object` is a valid concrete type for the named abstract
    /// type. Unlike [`Self::possible_types`] this never forces a full
    /// load: interface membership is declared on the object itself and
    /// union membership on the union.
    pub fn is_possible_type(&self, abstract_name: &str, object: &Rc<ObjectType>) -> Result<bool> {
        match self.get_type(abstract_name)? {
            Some(NamedType::Interface(_)) => Ok(object.implements(abstract_name)),
            Some(NamedType::Union(union)) => Ok(union.has_member(object.name())),
            _ => Ok(false),
        }
    }

    /// Covariance check used for interface implementations:
    /// `maybe_subtype` is acceptable wherever `super_type` is expected.
    pub fn is_sub_type_of(&self, maybe_subtype: &TypeRef, super_type: &TypeRef) -> Result<bool> {
        if maybe_subtype == super_type {
            return Ok(true);
        }
        match (maybe_subtype, super_type) {
            (TypeRef::NonNull(sub), TypeRef::NonNull(sup)) => self.is_sub_type_of(sub, sup),
            // Non-null narrows a nullable expectation.
            (TypeRef::NonNull(sub), sup) => self.is_sub_type_of(sub, sup),
            (TypeRef::List(sub), TypeRef::List(sup)) => self.is_sub_type_of(sub, sup),
            (TypeRef::Named(sub), TypeRef::Named(sup)) => {
                match (self.get_type(sub)?, self.get_type(sup)?) {
                    (Some(NamedType::Object(object)), Some(sup_ty)) if sup_ty.is_abstract() => {
                        self.is_possible_type(sup, &object)
                    }
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    fn ensure_fully_loaded(&self) -> Result<()> {
        if self.fully_loaded.get() {
            return Ok(());
        }

        if let Some(types_fn) = self.types_fn.borrow_mut().take() {
            for ty in types_fn() {
                let name = ty.name();
                let known = self.resolved_types.borrow().get(&name).cloned();
                match known {
                    Some(known) if !known.same_instance(&ty) => {
                        return Err(anyhow!(InvariantViolation(format!(
                            "Schema must contain unique named types but contains multiple \
                             types named \"{name}\"."
                        ))));
                    }
                    Some(_) => {}
                    None => {
                        self.resolved_types.borrow_mut().insert(name, ty);
                    }
                }
            }
        }

        // Closure over every type name reachable from the already-known
        // types. Visiting a type can grow the frontier.
        let mut pending: Vec<Rc<str>> = self.resolved_types.borrow().keys().cloned().collect();
        for directive in &self.directives {
            for arg in &directive.args {
                pending.push(arg.ty.unwrapped_name().clone());
            }
        }

        let mut visited = std::collections::BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(ty) = self.get_type(&name)? else {
                return Err(anyhow!(InvariantViolation(format!(
                    "Type \"{name}\" not found in schema."
                ))));
            };
            match &ty {
                NamedType::Object(object) => {
                    for field in object.fields().values() {
                        pending.push(field.ty.unwrapped_name().clone());
                        for arg in &field.args {
                            pending.push(arg.ty.unwrapped_name().clone());
                        }
                    }
                    for interface in object.interfaces() {
                        pending.push(interface.clone());
                    }
                }
                NamedType::Interface(interface) => {
                    for field in interface.fields().values() {
                        pending.push(field.ty.unwrapped_name().clone());
                        for arg in &field.args {
                            pending.push(arg.ty.unwrapped_name().clone());
                        }
                    }
                }
                NamedType::Union(union) => {
                    for member in union.member_types() {
                        pending.push(member.clone());
                    }
                }
                NamedType::InputObject(input) => {
                    for field in input.fields().values() {
                        pending.push(field.ty.unwrapped_name().clone());
                    }
                }
                NamedType::Scalar(_) | NamedType::Enum(_) => {}
            }
        }

        self.fully_loaded.set(true);
        Ok(())
    }

    /// Validates the whole schema: the registry invariant, loader
    /// consistency, interface implementations and union membership.
    /// Intended for tests and tooling; execution does not require it.
    pub fn assert_valid(&self) -> Result<()> {
        self.ensure_fully_loaded()?;
        let types = self.resolved_types.borrow().clone();

        if let Some(loader) = &self.type_loader {
            for (name, ty) in &types {
                if let Some(loaded) = loader(name) {
                    if !loaded.same_instance(ty) {
                        return Err(anyhow!(InvariantViolation(format!(
                            "Type loader returns different instance for \"{name}\" than the one \
                             referenced by the schema."
                        ))));
                    }
                }
            }
        }

        for ty in types.values() {
            match ty {
                NamedType::Object(object) => {
                    for interface_name in object.interfaces() {
                        match types.get(interface_name.as_ref()) {
                            Some(NamedType::Interface(interface)) => {
                                self.assert_implements(object, interface)?;
                            }
                            Some(other) => {
                                return Err(anyhow!(InvariantViolation(format!(
                                    "Type \"{}\" declares implementing \"{}\", which is a {}, \
                                     not an Interface.",
                                    object.name(),
                                    interface_name,
                                    other.kind()
                                ))));
                            }
                            None => {
                                return Err(anyhow!(InvariantViolation(format!(
                                    "Type \"{}\" declares implementing unknown interface \"{}\".",
                                    object.name(),
                                    interface_name
                                ))));
                            }
                        }
                    }
                }
                NamedType::Interface(interface) => {
                    if self.possible_types(interface.name())?.is_empty() {
                        return Err(anyhow!(InvariantViolation(format!(
                            "Could not find possible implementing types for \"{}\" in the \
                             schema.",
                            interface.name()
                        ))));
                    }
                }
                NamedType::Union(union) => {
                    if union.member_types().is_empty() {
                        return Err(anyhow!(InvariantViolation(format!(
                            "Union \"{}\" must define one or more member types.",
                            union.name()
                        ))));
                    }
                    for member in union.member_types() {
                        match types.get(member.as_ref()) {
                            Some(NamedType::Object(_)) => {}
                            Some(other) => {
                                return Err(anyhow!(InvariantViolation(format!(
                                    "Union \"{}\" may only contain Object types, it cannot \
                                     contain \"{}\" which is a {}.",
                                    union.name(),
                                    member,
                                    other.kind()
                                ))));
                            }
                            None => {
                                return Err(anyhow!(InvariantViolation(format!(
                                    "Union \"{}\" contains unknown type \"{}\".",
                                    union.name(),
                                    member
                                ))));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn assert_implements(
        &self,
        object: &Rc<ObjectType>,
        interface: &Rc<crate::types::InterfaceType>,
    ) -> Result<()> {
        for (field_name, interface_field) in interface.fields() {
            let Some(object_field) = object.field(field_name) else {
                return Err(anyhow!(InvariantViolation(format!(
                    "Interface field {}.{} expected but {} does not provide it.",
                    interface.name(),
                    field_name,
                    object.name()
                ))));
            };

            // Field types are covariant.
            if !self.is_sub_type_of(&object_field.ty, &interface_field.ty)? {
                return Err(anyhow!(InvariantViolation(format!(
                    "Interface field {}.{} expects type {} but {}.{} is type {}.",
                    interface.name(),
                    field_name,
                    interface_field.ty,
                    object.name(),
                    field_name,
                    object_field.ty
                ))));
            }

            // Argument types are invariant.
            for interface_arg in &interface_field.args {
                let Some(object_arg) = object_field.argument(&interface_arg.name) else {
                    return Err(anyhow!(InvariantViolation(format!(
                        "Interface field argument {}.{}({}:) expected but {}.{} does not \
                         provide it.",
                        interface.name(),
                        field_name,
                        interface_arg.name,
                        object.name(),
                        field_name
                    ))));
                };
                if object_arg.ty != interface_arg.ty {
                    return Err(anyhow!(InvariantViolation(format!(
                        "Interface field argument {}.{}({}:) expects type {} but {}.{}({}:) \
                         is type {}.",
                        interface.name(),
                        field_name,
                        interface_arg.name,
                        interface_arg.ty,
                        object.name(),
                        field_name,
                        interface_arg.name,
                        object_arg.ty
                    ))));
                }
            }

            // Arguments beyond the interface contract must be optional.
            for object_arg in &object_field.args {
                let known = interface_field.argument(&object_arg.name).is_some();
                if !known && object_arg.ty.is_non_null() {
                    return Err(anyhow!(InvariantViolation(format!(
                        "Object field {}.{} includes required argument {} that is missing from \
                         the Interface field {}.{}.",
                        object.name(),
                        field_name,
                        object_arg.name,
                        interface.name(),
                        field_name
                    ))));
                }
            }
        }
        Ok(())
    }
}

pub struct SchemaBuilder {
    query: Rc<ObjectType>,
    mutation: Option<Rc<ObjectType>>,
    subscription: Option<Rc<ObjectType>>,
    extra_types: Vec<NamedType>,
    directives: Vec<Rc<Directive>>,
    type_loader: Option<TypeLoaderFn>,
    types_fn: Option<Box<dyn FnOnce() -> Vec<NamedType>>>,
}

impl SchemaBuilder {
    pub fn mutation(mut self, ty: Rc<ObjectType>) -> Self {
        self.mutation = Some(ty);
        self
    }

    pub fn subscription(mut self, ty: Rc<ObjectType>) -> Self {
        self.subscription = Some(ty);
        self
    }

    /// Registers a type not reachable from the roots by plain traversal,
    /// e.g. one only produced by a `resolve_type` callback.
    pub fn add_type(mut self, ty: impl Into<NamedType>) -> Self {
        self.extra_types.push(ty.into());
        self
    }

    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(Rc::new(directive));
        self
    }

    /// Makes the schema lazy: types are resolved by name through the
    /// loader as execution reaches them, instead of all at construction.
    pub fn type_loader(mut self, loader: impl Fn(&str) -> Option<NamedType> + 'static) -> Self {
        self.type_loader = Some(Rc::new(loader));
        self
    }

    /// Lazily enumerates every type of the schema. A lazy schema needs
    /// this for operations that require a full scan, because plain
    /// traversal cannot discover interface implementors that nothing
    /// else references. Invoked at most once.
    pub fn types(mut self, f: impl FnOnce() -> Vec<NamedType> + 'static) -> Self {
        self.types_fn = Some(Box::new(f));
        self
    }

    pub fn finish(self) -> Result<Rc<Schema>> {
        let mut directives = self.directives;
        for standard in standard_directives() {
            if !directives.iter().any(|d| d.name == standard.name) {
                directives.push(standard);
            }
        }

        let mut resolved_types = TypeMap::new();
        for ty in builtin_scalars() {
            resolved_types.insert(ty.name(), ty);
        }

        let mut seed = |ty: NamedType| -> Result<()> {
            let name = ty.name();
            if let Some(known) = resolved_types.get(&name) {
                if !known.same_instance(&ty) {
                    return Err(anyhow!(InvariantViolation(format!(
                        "Schema must contain unique named types but contains multiple types \
                         named \"{name}\"."
                    ))));
                }
                return Ok(());
            }
            resolved_types.insert(name, ty);
            Ok(())
        };

        seed(NamedType::Object(self.query.clone()))?;
        if let Some(mutation) = &self.mutation {
            seed(NamedType::Object(mutation.clone()))?;
        }
        if let Some(subscription) = &self.subscription {
            seed(NamedType::Object(subscription.clone()))?;
        }
        for ty in self.extra_types {
            seed(ty)?;
        }

        let lazy = self.type_loader.is_some();
        let schema = Rc::new(Schema {
            query: self.query,
            mutation: self.mutation,
            subscription: self.subscription,
            directives,
            type_loader: self.type_loader,
            types_fn: RefCell::new(self.types_fn),
            resolved_types: RefCell::new(resolved_types),
            fully_loaded: Cell::new(false),
            possible_types: RefCell::new(None),
        });

        // Without a loader every type must be declared up front, so the
        // full scan happens here and surfaces dangling names immediately.
        if !lazy {
            schema.ensure_fully_loaded()?;
        }
        Ok(schema)
    }
}
