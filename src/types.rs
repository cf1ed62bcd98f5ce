// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::ValueNode;
use crate::deferred::Resolved;
use crate::executor::ResolveInfo;
use crate::value::{FieldMap, Value};

use core::fmt;
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use anyhow::Result;
use indexmap::IndexMap;

/// Field resolver: `(source, args, context, info) -> value or deferred`.
pub type ResolveFn = Rc<dyn Fn(&Value, &FieldMap, &Value, &ResolveInfo) -> Result<Resolved>>;

/// Fallback predicate probed on object types during abstract-type
/// resolution when `resolve_type` is absent or inconclusive.
pub type IsTypeOfFn = Rc<dyn Fn(&Value) -> bool>;

/// Abstract-type resolution outcome: a concrete type instance or a name to
/// be looked up in the schema registry.
#[derive(Clone)]
pub enum TypeResolution {
    Type(Rc<ObjectType>),
    Name(String),
}

pub type ResolveTypeFn = Rc<dyn Fn(&Value) -> Option<TypeResolution>>;

pub type SerializeFn = Rc<dyn Fn(&Value) -> Option<Value>>;
pub type ParseLiteralFn = Rc<dyn Fn(&ValueNode) -> Result<Value, String>>;

/// A lazily evaluated, memoized value. Type definitions use thunks for
/// their field/interface/member lists so that cyclic schemas can be
/// declared and so that lazy schemas only evaluate what execution touches.
pub struct Thunk<T> {
    cell: OnceCell<T>,
    init: RefCell<Option<Box<dyn FnOnce() -> T>>>,
}

impl<T: Default> Thunk<T> {
    pub fn value(value: T) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(value);
        Self {
            cell,
            init: RefCell::new(None),
        }
    }

    pub fn new(init: impl FnOnce() -> T + 'static) -> Self {
        Self {
            cell: OnceCell::new(),
            init: RefCell::new(Some(Box::new(init))),
        }
    }

    pub fn get(&self) -> &T {
        self.cell.get_or_init(|| match self.init.borrow_mut().take() {
            Some(init) => init(),
            None => T::default(),
        })
    }
}

impl<T: fmt::Debug + Default> fmt::Debug for Thunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(v) => v.fmt(f),
            None => f.write_str("<thunk>"),
        }
    }
}

/// Reference to a type as it appears in a field or argument position.
/// Named types are resolved by name through the schema registry; `List`
/// and `NonNull` are structural wrappers composable to unlimited depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(Rc<str>),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: &str) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    pub fn string() -> Self {
        Self::named("String")
    }

    pub fn int() -> Self {
        Self::named("Int")
    }

    pub fn float() -> Self {
        Self::named("Float")
    }

    pub fn boolean() -> Self {
        Self::named("Boolean")
    }

    pub fn id() -> Self {
        Self::named("ID")
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Strips all wrappers down to the underlying type name.
    pub fn unwrapped_name(&self) -> &Rc<str> {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.unwrapped_name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// An argument or input-object field definition.
pub struct InputValueDef {
    pub name: Rc<str>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
    pub description: Option<String>,
}

impl InputValueDef {
    pub fn new(name: &str, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default_value: None,
            description: None,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }
}

pub struct FieldDef {
    pub name: Rc<str>,
    pub ty: TypeRef,
    pub args: Vec<Rc<InputValueDef>>,
    pub resolve: Option<ResolveFn>,
    pub deprecation_reason: Option<String>,
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(name: &str, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            args: vec![],
            resolve: None,
            deprecation_reason: None,
            description: None,
        }
    }

    pub fn arg(mut self, arg: InputValueDef) -> Self {
        self.args.push(Rc::new(arg));
        self
    }

    pub fn resolve(
        mut self,
        f: impl Fn(&Value, &FieldMap, &Value, &ResolveInfo) -> Result<Resolved> + 'static,
    ) -> Self {
        self.resolve = Some(Rc::new(f));
        self
    }

    pub fn deprecated(mut self, reason: &str) -> Self {
        self.deprecation_reason = Some(reason.to_owned());
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Rc<InputValueDef>> {
        self.args.iter().find(|a| a.name.as_ref() == name)
    }
}

pub type FieldDefMap = IndexMap<Rc<str>, Rc<FieldDef>>;

fn to_field_map(fields: Vec<FieldDef>) -> FieldDefMap {
    fields
        .into_iter()
        .map(|f| (f.name.clone(), Rc::new(f)))
        .collect()
}

enum FieldsInit {
    Eager(Vec<FieldDef>),
    Lazy(Box<dyn FnOnce() -> Vec<FieldDef>>),
}

impl FieldsInit {
    fn into_thunk(self) -> Thunk<FieldDefMap> {
        match self {
            Self::Eager(fields) => Thunk::value(to_field_map(fields)),
            Self::Lazy(init) => Thunk::new(move || to_field_map(init())),
        }
    }
}

// ---------------------------------------------------------------------------
// Object

pub struct ObjectType {
    name: Rc<str>,
    description: Option<String>,
    fields: Thunk<FieldDefMap>,
    interfaces: Thunk<Vec<Rc<str>>>,
    pub is_type_of: Option<IsTypeOfFn>,
}

impl ObjectType {
    pub fn new(name: &str) -> ObjectTypeBuilder {
        ObjectTypeBuilder {
            name: name.into(),
            description: None,
            fields: FieldsInit::Eager(vec![]),
            interfaces: None,
            is_type_of: None,
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Evaluates the field thunk on first use.
    pub fn fields(&self) -> &FieldDefMap {
        self.fields.get()
    }

    pub fn field(&self, name: &str) -> Option<Rc<FieldDef>> {
        self.fields().get(name).cloned()
    }

    /// Names of the interfaces this type declares.
    pub fn interfaces(&self) -> &Vec<Rc<str>> {
        self.interfaces.get()
    }

    pub fn implements(&self, interface_name: &str) -> bool {
        self.interfaces().iter().any(|i| i.as_ref() == interface_name)
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType").field("name", &self.name).finish()
    }
}

pub struct ObjectTypeBuilder {
    name: Rc<str>,
    description: Option<String>,
    fields: FieldsInit,
    interfaces: Option<Thunk<Vec<Rc<str>>>>,
    is_type_of: Option<IsTypeOfFn>,
}

impl ObjectTypeBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        match &mut self.fields {
            FieldsInit::Eager(fields) => fields.push(field),
            FieldsInit::Lazy(_) => self.fields = FieldsInit::Eager(vec![field]),
        }
        self
    }

    /// Defers field construction until first use; replaces any eager
    /// fields added so far.
    pub fn fields(mut self, init: impl FnOnce() -> Vec<FieldDef> + 'static) -> Self {
        self.fields = FieldsInit::Lazy(Box::new(init));
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        let name: Rc<str> = name.into();
        match self.interfaces.take() {
            Some(thunk) => {
                let mut names = thunk.get().clone();
                names.push(name);
                self.interfaces = Some(Thunk::value(names));
            }
            None => self.interfaces = Some(Thunk::value(vec![name])),
        }
        self
    }

    pub fn interfaces(mut self, init: impl FnOnce() -> Vec<Rc<str>> + 'static) -> Self {
        self.interfaces = Some(Thunk::new(init));
        self
    }

    pub fn is_type_of(mut self, f: impl Fn(&Value) -> bool + 'static) -> Self {
        self.is_type_of = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<ObjectType> {
        Rc::new(ObjectType {
            name: self.name,
            description: self.description,
            fields: self.fields.into_thunk(),
            interfaces: self.interfaces.unwrap_or_else(|| Thunk::value(vec![])),
            is_type_of: self.is_type_of,
        })
    }
}

// ---------------------------------------------------------------------------
// Interface

pub struct InterfaceType {
    name: Rc<str>,
    description: Option<String>,
    fields: Thunk<FieldDefMap>,
    pub resolve_type: Option<ResolveTypeFn>,
}

impl InterfaceType {
    pub fn new(name: &str) -> InterfaceTypeBuilder {
        InterfaceTypeBuilder {
            name: name.into(),
            description: None,
            fields: FieldsInit::Eager(vec![]),
            resolve_type: None,
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn fields(&self) -> &FieldDefMap {
        self.fields.get()
    }

    pub fn field(&self, name: &str) -> Option<Rc<FieldDef>> {
        self.fields().get(name).cloned()
    }
}

impl fmt::Debug for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceType").field("name", &self.name).finish()
    }
}

pub struct InterfaceTypeBuilder {
    name: Rc<str>,
    description: Option<String>,
    fields: FieldsInit,
    resolve_type: Option<ResolveTypeFn>,
}

impl InterfaceTypeBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        match &mut self.fields {
            FieldsInit::Eager(fields) => fields.push(field),
            FieldsInit::Lazy(_) => self.fields = FieldsInit::Eager(vec![field]),
        }
        self
    }

    pub fn fields(mut self, init: impl FnOnce() -> Vec<FieldDef> + 'static) -> Self {
        self.fields = FieldsInit::Lazy(Box::new(init));
        self
    }

    pub fn resolve_type(mut self, f: impl Fn(&Value) -> Option<TypeResolution> + 'static) -> Self {
        self.resolve_type = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<InterfaceType> {
        Rc::new(InterfaceType {
            name: self.name,
            description: self.description,
            fields: self.fields.into_thunk(),
            resolve_type: self.resolve_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Union

pub struct UnionType {
    name: Rc<str>,
    description: Option<String>,
    types: Thunk<Vec<Rc<str>>>,
    pub resolve_type: Option<ResolveTypeFn>,
}

impl UnionType {
    pub fn new(name: &str) -> UnionTypeBuilder {
        UnionTypeBuilder {
            name: name.into(),
            description: None,
            types: None,
            resolve_type: None,
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    /// Member type names, in declaration order.
    pub fn member_types(&self) -> &Vec<Rc<str>> {
        self.types.get()
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member_types().iter().any(|t| t.as_ref() == name)
    }
}

impl fmt::Debug for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionType").field("name", &self.name).finish()
    }
}

pub struct UnionTypeBuilder {
    name: Rc<str>,
    description: Option<String>,
    types: Option<Thunk<Vec<Rc<str>>>>,
    resolve_type: Option<ResolveTypeFn>,
}

impl UnionTypeBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    pub fn member(mut self, name: &str) -> Self {
        let name: Rc<str> = name.into();
        match self.types.take() {
            Some(thunk) => {
                let mut names = thunk.get().clone();
                names.push(name);
                self.types = Some(Thunk::value(names));
            }
            None => self.types = Some(Thunk::value(vec![name])),
        }
        self
    }

    pub fn members(mut self, init: impl FnOnce() -> Vec<Rc<str>> + 'static) -> Self {
        self.types = Some(Thunk::new(init));
        self
    }

    pub fn resolve_type(mut self, f: impl Fn(&Value) -> Option<TypeResolution> + 'static) -> Self {
        self.resolve_type = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<UnionType> {
        Rc::new(UnionType {
            name: self.name,
            description: self.description,
            types: self.types.unwrap_or_else(|| Thunk::value(vec![])),
            resolve_type: self.resolve_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Enum

pub struct EnumValueDef {
    pub name: Rc<str>,
    pub value: Value,
    pub deprecation_reason: Option<String>,
    pub description: Option<String>,
}

pub struct EnumType {
    name: Rc<str>,
    description: Option<String>,
    values: Vec<Rc<EnumValueDef>>,
}

impl EnumType {
    pub fn new(name: &str) -> EnumTypeBuilder {
        EnumTypeBuilder {
            name: name.into(),
            description: None,
            values: vec![],
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn values(&self) -> &[Rc<EnumValueDef>] {
        &self.values
    }

    /// Maps a literal enum name to its internal value.
    pub fn parse_name(&self, name: &str) -> Option<Value> {
        self.values
            .iter()
            .find(|v| v.name.as_ref() == name)
            .map(|v| v.value.clone())
    }

    /// Maps an internal value back to its symbolic name. Unserializable
    /// values yield `None` (silent null substitution).
    pub fn serialize(&self, value: &Value) -> Option<Value> {
        self.values
            .iter()
            .find(|v| &v.value == value)
            .map(|v| Value::String(v.name.clone()))
    }
}

impl fmt::Debug for EnumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumType").field("name", &self.name).finish()
    }
}

pub struct EnumTypeBuilder {
    name: Rc<str>,
    description: Option<String>,
    values: Vec<Rc<EnumValueDef>>,
}

impl EnumTypeBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    /// Adds a value whose internal representation is its own name.
    pub fn value(self, name: &str) -> Self {
        let internal = Value::String(name.into());
        self.value_as(name, internal)
    }

    pub fn value_as(mut self, name: &str, internal: impl Into<Value>) -> Self {
        self.values.push(Rc::new(EnumValueDef {
            name: name.into(),
            value: internal.into(),
            deprecation_reason: None,
            description: None,
        }));
        self
    }

    pub fn build(self) -> Rc<EnumType> {
        Rc::new(EnumType {
            name: self.name,
            description: self.description,
            values: self.values,
        })
    }
}

// ---------------------------------------------------------------------------
// Input object

pub struct InputObjectType {
    name: Rc<str>,
    description: Option<String>,
    fields: Thunk<IndexMap<Rc<str>, Rc<InputValueDef>>>,
}

impl InputObjectType {
    pub fn new(name: &str) -> InputObjectTypeBuilder {
        InputObjectTypeBuilder {
            name: name.into(),
            description: None,
            fields: vec![],
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn fields(&self) -> &IndexMap<Rc<str>, Rc<InputValueDef>> {
        self.fields.get()
    }
}

impl fmt::Debug for InputObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputObjectType").field("name", &self.name).finish()
    }
}

pub struct InputObjectTypeBuilder {
    name: Rc<str>,
    description: Option<String>,
    fields: Vec<InputValueDef>,
}

impl InputObjectTypeBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    pub fn field(mut self, field: InputValueDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Rc<InputObjectType> {
        let fields = self
            .fields
            .into_iter()
            .map(|f| (f.name.clone(), Rc::new(f)))
            .collect();
        Rc::new(InputObjectType {
            name: self.name,
            description: self.description,
            fields: Thunk::value(fields),
        })
    }
}

// ---------------------------------------------------------------------------
// Scalars

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinScalar {
    Int,
    Float,
    String,
    Boolean,
    Id,
}

enum ScalarImpl {
    Builtin(BuiltinScalar),
    Custom {
        serialize: SerializeFn,
        parse_literal: Option<ParseLiteralFn>,
    },
}

pub struct ScalarType {
    name: Rc<str>,
    description: Option<String>,
    imp: ScalarImpl,
}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarType").field("name", &self.name).finish()
    }
}

impl ScalarType {
    fn builtin(name: &str, which: BuiltinScalar) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            description: None,
            imp: ScalarImpl::Builtin(which),
        })
    }

    pub fn int() -> Rc<Self> {
        Self::builtin("Int", BuiltinScalar::Int)
    }

    pub fn float() -> Rc<Self> {
        Self::builtin("Float", BuiltinScalar::Float)
    }

    pub fn string() -> Rc<Self> {
        Self::builtin("String", BuiltinScalar::String)
    }

    pub fn boolean() -> Rc<Self> {
        Self::builtin("Boolean", BuiltinScalar::Boolean)
    }

    pub fn id() -> Rc<Self> {
        Self::builtin("ID", BuiltinScalar::Id)
    }

    /// A custom scalar. `serialize` returning `None` substitutes null in
    /// the response without recording an error; `parse_literal` rejects
    /// query literals with a message the caller contextualizes.
    pub fn custom(
        name: &str,
        serialize: impl Fn(&Value) -> Option<Value> + 'static,
    ) -> ScalarTypeBuilder {
        ScalarTypeBuilder {
            name: name.into(),
            description: None,
            serialize: Rc::new(serialize),
            parse_literal: None,
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    /// Serializes an internal value for output. `None` means the value is
    /// unserializable and null is substituted, deliberately without error.
    pub fn serialize(&self, value: &Value) -> Option<Value> {
        match &self.imp {
            ScalarImpl::Custom { serialize, .. } => serialize(value),
            ScalarImpl::Builtin(which) => match which {
                BuiltinScalar::Int => match value {
                    Value::Int(n) if i32::try_from(*n).is_ok() => Some(value.clone()),
                    Value::Float(f) if f.fract() == 0.0 && (*f as i64) as f64 == *f => {
                        Some(Value::Int(*f as i64))
                    }
                    Value::Bool(b) => Some(Value::Int(*b as i64)),
                    Value::String(s) => s.parse::<i64>().ok().map(Value::Int),
                    _ => None,
                },
                BuiltinScalar::Float => match value {
                    Value::Float(_) => Some(value.clone()),
                    Value::Int(n) => Some(Value::Float(*n as f64)),
                    Value::Bool(b) => Some(Value::Float(*b as i64 as f64)),
                    Value::String(s) => s.parse::<f64>().ok().map(Value::Float),
                    _ => None,
                },
                BuiltinScalar::String => match value {
                    Value::String(_) => Some(value.clone()),
                    Value::Int(n) => Some(Value::from(n.to_string())),
                    Value::Float(f) => Some(Value::from(f.to_string())),
                    Value::Bool(b) => Some(Value::from(if *b { "true" } else { "false" })),
                    _ => None,
                },
                BuiltinScalar::Boolean => match value {
                    Value::Bool(_) => Some(value.clone()),
                    Value::Int(n) => Some(Value::Bool(*n != 0)),
                    _ => None,
                },
                BuiltinScalar::Id => match value {
                    Value::String(_) => Some(value.clone()),
                    Value::Int(n) => Some(Value::from(n.to_string())),
                    _ => None,
                },
            },
        }
    }

    /// Converts a query literal into an internal value, honoring the
    /// scalar's own parsing rules. Errors are descriptive messages that
    /// callers wrap with positional context.
    pub fn parse_literal(&self, node: &ValueNode) -> Result<Value, String> {
        match &self.imp {
            ScalarImpl::Custom { parse_literal, .. } => match parse_literal {
                Some(parse) => parse(node),
                // A custom scalar without a literal parser accepts the
                // structural form of the literal.
                None => literal_to_value(node),
            },
            ScalarImpl::Builtin(which) => {
                let text = node.span().text();
                match which {
                    BuiltinScalar::Int => match node {
                        ValueNode::Int { .. } => match text.parse::<i32>() {
                            Ok(n) => Ok(Value::Int(n as i64)),
                            Err(_) => Err(format!(
                                "Int cannot represent non 32-bit signed integer value: {text}"
                            )),
                        },
                        _ => Err(format!("Int cannot represent non-integer value: {text}")),
                    },
                    BuiltinScalar::Float => match node {
                        ValueNode::Int { .. } | ValueNode::Float { .. } => {
                            text.parse::<f64>().map(Value::Float).map_err(|_| {
                                format!("Float cannot represent non numeric value: {text}")
                            })
                        }
                        _ => Err(format!("Float cannot represent non numeric value: {text}")),
                    },
                    BuiltinScalar::String => match node {
                        ValueNode::String { .. } => unescape_string(text),
                        _ => Err(format!("String cannot represent a non string value: {text}")),
                    },
                    BuiltinScalar::Boolean => match node {
                        ValueNode::Boolean { value, .. } => Ok(Value::Bool(*value)),
                        _ => Err(format!(
                            "Boolean cannot represent a non boolean value: {text}"
                        )),
                    },
                    BuiltinScalar::Id => match node {
                        ValueNode::String { .. } => unescape_string(text),
                        ValueNode::Int { .. } => Ok(Value::from(text)),
                        _ => Err(format!("ID cannot represent value: {text}")),
                    },
                }
            }
        }
    }
}

pub struct ScalarTypeBuilder {
    name: Rc<str>,
    description: Option<String>,
    serialize: SerializeFn,
    parse_literal: Option<ParseLiteralFn>,
}

impl ScalarTypeBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_owned());
        self
    }

    pub fn parse_literal(mut self, f: impl Fn(&ValueNode) -> Result<Value, String> + 'static) -> Self {
        self.parse_literal = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<ScalarType> {
        Rc::new(ScalarType {
            name: self.name,
            description: self.description,
            imp: ScalarImpl::Custom {
                serialize: self.serialize,
                parse_literal: self.parse_literal,
            },
        })
    }
}

/// Decodes a string literal's escape sequences. The raw text is the span
/// between the quotes.
pub(crate) fn unescape_string(raw: &str) -> Result<Value, String> {
    serde_json::from_str::<String>(&format!("\"{raw}\""))
        .map(Value::from)
        .map_err(|_| format!("invalid string literal: {raw}"))
}

/// Converts a variable-free literal into a structural value without any
/// type guidance. Used for custom scalars without a literal parser.
pub(crate) fn literal_to_value(node: &ValueNode) -> Result<Value, String> {
    match node {
        ValueNode::Int { span } => span
            .text()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("invalid int literal: {}", span.text())),
        ValueNode::Float { span } => span
            .text()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("invalid float literal: {}", span.text())),
        ValueNode::String { span } => unescape_string(span.text()),
        ValueNode::Boolean { value, .. } => Ok(Value::Bool(*value)),
        ValueNode::Null { .. } => Ok(Value::Null),
        ValueNode::Enum { span } => Ok(Value::Enum(span.text().into())),
        ValueNode::List { items, .. } => {
            let mut list = vec![];
            for item in items {
                list.push(literal_to_value(item)?);
            }
            Ok(Value::from(list))
        }
        ValueNode::Object { fields, .. } => {
            let mut map = FieldMap::new();
            for (name, value) in fields {
                map.insert(name.text().into(), literal_to_value(value)?);
            }
            Ok(Value::from(map))
        }
        ValueNode::Variable { span, .. } => {
            Err(format!("unexpected variable literal: {}", span.text()))
        }
    }
}

// ---------------------------------------------------------------------------
// Named type

/// Any named type in a schema. Cheap to clone; identity is pointer
/// identity of the inner definition, which the schema registry relies on
/// for its uniqueness invariant.
#[derive(Debug, Clone)]
pub enum NamedType {
    Scalar(Rc<ScalarType>),
    Object(Rc<ObjectType>),
    Interface(Rc<InterfaceType>),
    Union(Rc<UnionType>),
    Enum(Rc<EnumType>),
    InputObject(Rc<InputObjectType>),
}

impl NamedType {
    pub fn name(&self) -> Rc<str> {
        match self {
            Self::Scalar(t) => t.name().clone(),
            Self::Object(t) => t.name().clone(),
            Self::Interface(t) => t.name().clone(),
            Self::Union(t) => t.name().clone(),
            Self::Enum(t) => t.name().clone(),
            Self::InputObject(t) => t.name().clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "Scalar",
            Self::Object(_) => "Object",
            Self::Interface(_) => "Interface",
            Self::Union(_) => "Union",
            Self::Enum(_) => "Enum",
            Self::InputObject(_) => "InputObject",
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Pointer identity. Two types with the same name but different
    /// instances violate the registry invariant.
    pub fn same_instance(&self, other: &NamedType) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Interface(a), Self::Interface(b)) => Rc::ptr_eq(a, b),
            (Self::Union(a), Self::Union(b)) => Rc::ptr_eq(a, b),
            (Self::Enum(a), Self::Enum(b)) => Rc::ptr_eq(a, b),
            (Self::InputObject(a), Self::InputObject(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<ObjectType>> {
        match self {
            Self::Object(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Rc<ScalarType>> for NamedType {
    fn from(t: Rc<ScalarType>) -> Self {
        Self::Scalar(t)
    }
}

impl From<Rc<ObjectType>> for NamedType {
    fn from(t: Rc<ObjectType>) -> Self {
        Self::Object(t)
    }
}

impl From<Rc<InterfaceType>> for NamedType {
    fn from(t: Rc<InterfaceType>) -> Self {
        Self::Interface(t)
    }
}

impl From<Rc<UnionType>> for NamedType {
    fn from(t: Rc<UnionType>) -> Self {
        Self::Union(t)
    }
}

impl From<Rc<EnumType>> for NamedType {
    fn from(t: Rc<EnumType>) -> Self {
        Self::Enum(t)
    }
}

impl From<Rc<InputObjectType>> for NamedType {
    fn from(t: Rc<InputObjectType>) -> Self {
        Self::InputObject(t)
    }
}

// ---------------------------------------------------------------------------
// Directives

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Subscription,
    Field,
    FragmentDefinition,
    FragmentSpread,
    InlineFragment,
}

pub struct Directive {
    pub name: Rc<str>,
    pub description: Option<String>,
    pub locations: Vec<DirectiveLocation>,
    pub args: Vec<Rc<InputValueDef>>,
}

impl Directive {
    pub fn new(name: &str, locations: Vec<DirectiveLocation>) -> Self {
        Self {
            name: name.into(),
            description: None,
            locations,
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: InputValueDef) -> Self {
        self.args.push(Rc::new(arg));
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Rc<InputValueDef>> {
        self.args.iter().find(|a| a.name.as_ref() == name)
    }
}

/// The `@skip` and `@include` directives every schema carries by default.
pub fn standard_directives() -> Vec<Rc<Directive>> {
    use DirectiveLocation::*;
    vec![
        Rc::new(
            Directive::new("skip", vec![Field, FragmentSpread, InlineFragment]).arg(
                InputValueDef::new("if", TypeRef::non_null(TypeRef::boolean())),
            ),
        ),
        Rc::new(
            Directive::new("include", vec![Field, FragmentSpread, InlineFragment]).arg(
                InputValueDef::new("if", TypeRef::non_null(TypeRef::boolean())),
            ),
        ),
    ]
}

/// The built-in scalars seeded into every schema's registry.
pub fn builtin_scalars() -> Vec<NamedType> {
    vec![
        NamedType::Scalar(ScalarType::string()),
        NamedType::Scalar(ScalarType::int()),
        NamedType::Scalar(ScalarType::float()),
        NamedType::Scalar(ScalarType::boolean()),
        NamedType::Scalar(ScalarType::id()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::ast::{Definition, Selection};

    fn first_arg_literal(doc: &str) -> ValueNode {
        let document = parser::parse(doc).unwrap();
        let Definition::Operation(op) = &document.definitions[0] else {
            panic!("expected operation");
        };
        let Selection::Field(field) = &op.selection_set.items[0] else {
            panic!("expected field");
        };
        field.arguments[0].value.clone()
    }

    #[test]
    fn int_literal_bounds() {
        let node = first_arg_literal("{ f(x: 2147483647) }");
        assert_eq!(ScalarType::int().parse_literal(&node), Ok(Value::Int(2147483647)));

        let node = first_arg_literal("{ f(x: 2147483648) }");
        assert!(ScalarType::int()
            .parse_literal(&node)
            .unwrap_err()
            .contains("non 32-bit"));
    }

    #[test]
    fn string_literal_unescaping() {
        let node = first_arg_literal(r#"{ f(x: "a\nb\"cA") }"#);
        assert_eq!(
            ScalarType::string().parse_literal(&node),
            Ok(Value::from("a\nb\"cA"))
        );
    }

    #[test]
    fn serialize_is_lenient() {
        assert_eq!(ScalarType::int().serialize(&Value::Float(2.0)), Some(Value::Int(2)));
        assert_eq!(ScalarType::int().serialize(&Value::from("nope")), None);
        assert_eq!(
            ScalarType::id().serialize(&Value::Int(7)),
            Some(Value::from("7"))
        );
        assert_eq!(ScalarType::boolean().serialize(&Value::new_list()), None);
    }

    #[test]
    fn enum_round_trip() {
        let colors = EnumType::new("Color")
            .value("RED")
            .value_as("GREEN", 2)
            .build();
        assert_eq!(colors.parse_name("GREEN"), Some(Value::Int(2)));
        assert_eq!(colors.parse_name("BLUE"), None);
        assert_eq!(colors.serialize(&Value::Int(2)), Some(Value::from("GREEN")));
        assert_eq!(colors.serialize(&Value::from("RED")), Some(Value::from("RED")));
        assert_eq!(colors.serialize(&Value::Int(9)), None);
    }

    #[test]
    fn field_thunks_evaluate_once() {
        use std::cell::Cell;
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let ty = ObjectType::new("Thing")
            .fields(move || {
                calls2.set(calls2.get() + 1);
                vec![FieldDef::new("a", TypeRef::string())]
            })
            .build();
        assert_eq!(calls.get(), 0);
        assert!(ty.field("a").is_some());
        assert!(ty.field("a").is_some());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn type_ref_display() {
        let ty = TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::int())));
        assert_eq!(ty.to_string(), "[Int!]!");
        assert_eq!(ty.unwrapped_name().as_ref(), "Int");
    }
}
