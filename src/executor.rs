// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{
    Definition, Document, FieldNode, FragmentDefinition, OperationDefinition, OperationKind, Ref,
    Selection, SelectionSet,
};
use crate::coercion::{get_argument_values, get_variable_values, should_include};
use crate::deferred::{Deferred, Resolved};
use crate::error::{ExecutionResult, GraphqlError, InvariantViolation, PathSegment};
use crate::lexer::Span;
use crate::schema::Schema;
use crate::types::{FieldDef, NamedType, ObjectType, ResolveFn, TypeRef, TypeResolution};
use crate::value::{FieldMap, Value};

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::rc::{Rc, Weak};

use anyhow::anyhow;
use indexmap::IndexMap;

/// Knobs for a single execution.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Emit a warning the first time an abstract type has to be resolved
    /// by probing every possible type of a lazily loaded schema.
    pub warn_full_schema_scan: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            warn_full_schema_scan: true,
        }
    }
}

/// Everything a resolver may want to know about the field being resolved.
pub struct ResolveInfo {
    pub field_name: Rc<str>,
    pub field_nodes: Rc<Vec<Ref<FieldNode>>>,
    pub return_type: TypeRef,
    pub parent_type: Rc<ObjectType>,
    pub path: Vec<PathSegment>,
    pub schema: Rc<Schema>,
    pub fragments: Rc<IndexMap<Rc<str>, Ref<FragmentDefinition>>>,
    pub root_value: Value,
    pub operation: Ref<OperationDefinition>,
    pub variable_values: Rc<FieldMap>,
}

/// Executes the sole operation of `document` against `schema` with all
/// knobs at their defaults. Use [`Execution`] to set any of them.
pub fn execute(schema: Rc<Schema>, document: &Document) -> ExecutionResult {
    Execution::new(schema, document).run()
}

/// Parses and executes a query in one step. Syntax errors come back in
/// the result's error list.
pub fn graphql(schema: Rc<Schema>, query: &str) -> ExecutionResult {
    match crate::parser::parse(query) {
        Ok(document) => execute(schema, &document),
        Err(err) => ExecutionResult::from_errors(vec![GraphqlError::new(err.to_string())]),
    }
}

/// Builder for one execution of a parsed document.
pub struct Execution<'a> {
    schema: Rc<Schema>,
    document: &'a Document,
    root_value: Value,
    context_value: Value,
    variable_values: FieldMap,
    operation_name: Option<String>,
    field_resolver: Option<ResolveFn>,
    options: ExecutionOptions,
}

impl<'a> Execution<'a> {
    pub fn new(schema: Rc<Schema>, document: &'a Document) -> Self {
        Self {
            schema,
            document,
            root_value: Value::Null,
            context_value: Value::Null,
            variable_values: FieldMap::new(),
            operation_name: None,
            field_resolver: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn root_value(mut self, value: Value) -> Self {
        self.root_value = value;
        self
    }

    pub fn context_value(mut self, value: Value) -> Self {
        self.context_value = value;
        self
    }

    /// Runtime values for the operation's variables, keyed by name
    /// without the `$`.
    pub fn variable_values(mut self, values: FieldMap) -> Self {
        self.variable_values = values;
        self
    }

    pub fn operation_name(mut self, name: &str) -> Self {
        self.operation_name = Some(name.to_owned());
        self
    }

    /// Resolver used for fields that do not define their own. The default
    /// looks the field name up as a property of the source value.
    pub fn field_resolver(
        mut self,
        f: impl Fn(&Value, &FieldMap, &Value, &ResolveInfo) -> anyhow::Result<Resolved> + 'static,
    ) -> Self {
        self.field_resolver = Some(Rc::new(f));
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run(self) -> ExecutionResult {
        // Split the document. Type-system definitions cannot be executed
        // and fail the whole request with a located error.
        let mut operations = vec![];
        let mut fragments = IndexMap::new();
        for definition in &self.document.definitions {
            match definition {
                Definition::Operation(op) => operations.push(op.clone()),
                Definition::Fragment(fragment) => {
                    fragments.insert(fragment.name.text().into(), fragment.clone());
                }
                Definition::TypeSystem(def) => {
                    return ExecutionResult::from_errors(vec![GraphqlError::new(format!(
                        "GraphQL cannot execute a request containing a \"{}\" definition.",
                        def.keyword
                    ))
                    .with_nodes(vec![def.span.clone()])]);
                }
            }
        }

        let operation = match select_operation(&operations, self.operation_name.as_deref()) {
            Ok(op) => op,
            Err(err) => return ExecutionResult::from_errors(vec![err]),
        };

        let root_type = match operation.kind {
            OperationKind::Query => self.schema.query_type().clone(),
            OperationKind::Mutation => match self.schema.mutation_type() {
                Some(ty) => ty.clone(),
                None => {
                    return ExecutionResult::from_errors(vec![GraphqlError::new(
                        "Schema is not configured for mutations.",
                    )
                    .with_nodes(vec![operation.span.clone()])]);
                }
            },
            OperationKind::Subscription => match self.schema.subscription_type() {
                Some(ty) => ty.clone(),
                None => {
                    return ExecutionResult::from_errors(vec![GraphqlError::new(
                        "Schema is not configured for subscriptions.",
                    )
                    .with_nodes(vec![operation.span.clone()])]);
                }
            },
        };

        let variable_values = match get_variable_values(
            &self.schema,
            &operation.variable_definitions,
            &self.variable_values,
        ) {
            Ok(values) => values,
            Err(errors) => return ExecutionResult::from_errors(errors),
        };

        let ctx = ExecContext {
            schema: self.schema,
            fragments: Rc::new(fragments),
            operation: operation.clone(),
            root_value: self.root_value,
            context_value: self.context_value,
            variable_values: Rc::new(variable_values),
            field_resolver: self.field_resolver,
            errors: RefCell::new(vec![]),
            queue: RefCell::new(VecDeque::new()),
            options: self.options,
            warned_full_scan: Cell::new(false),
        };

        // Mutations run their root fields serially: each one, deferred
        // work included, finishes before the next starts.
        let serial = operation.kind == OperationKind::Mutation;
        let root = OutNode::root();
        ctx.execute_selection_set(
            &root_type,
            &operation.selection_set,
            ctx.root_value.clone(),
            &root,
            vec![],
            serial,
        );
        ctx.drain();

        ExecutionResult::new(Some(root.to_value()), ctx.errors.into_inner())
    }
}

fn select_operation(
    operations: &[Ref<OperationDefinition>],
    name: Option<&str>,
) -> Result<Ref<OperationDefinition>, GraphqlError> {
    // A document defining exactly one operation executes it regardless of
    // the requested name.
    if operations.len() == 1 {
        return Ok(operations[0].clone());
    }
    match name {
        None => match operations.len() {
            0 => Err(GraphqlError::new("Must provide an operation.")),
            _ => Err(GraphqlError::new(
                "Must provide operation name if query contains multiple operations.",
            )),
        },
        Some(name) => operations
            .iter()
            .find(|op| op.name.as_ref().map(|n| n.text()) == Some(name))
            .cloned()
            .ok_or_else(|| GraphqlError::new(format!("Unknown operation named \"{name}\"."))),
    }
}

// ---------------------------------------------------------------------------
// Output tree

enum OutState {
    Pending,
    Leaf(Value),
    Object(IndexMap<Rc<str>, Rc<OutNode>>),
    List(Vec<Rc<OutNode>>),
    Nulled,
}

/// One position of the response under construction. Deferred resolvers
/// fill their node later, and a non-nullable position receiving null
/// walks up this tree nulling ancestors.
struct OutNode {
    parent: Option<Weak<OutNode>>,
    non_null: bool,
    state: RefCell<OutState>,
}

impl OutNode {
    fn root() -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            non_null: false,
            state: RefCell::new(OutState::Pending),
        })
    }

    fn child(self: &Rc<Self>, non_null: bool) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(Rc::downgrade(self)),
            non_null,
            state: RefCell::new(OutState::Pending),
        })
    }

    /// Nulls this position; a non-nullable position propagates the null
    /// to its parent.
    fn null_and_bubble(self: &Rc<Self>) {
        *self.state.borrow_mut() = OutState::Nulled;
        if !self.non_null {
            return;
        }
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            if !matches!(&*parent.state.borrow(), OutState::Nulled) {
                parent.null_and_bubble();
            }
        }
    }

    fn to_value(&self) -> Value {
        match &*self.state.borrow() {
            OutState::Pending | OutState::Nulled => Value::Null,
            OutState::Leaf(value) => value.clone(),
            OutState::Object(fields) => {
                let mut map = FieldMap::new();
                for (key, child) in fields {
                    map.insert(key.clone(), child.to_value());
                }
                Value::from(map)
            }
            OutState::List(items) => {
                Value::from(items.iter().map(|i| i.to_value()).collect::<Vec<_>>())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Execution context

/// Per-field context threaded through completion, cheap to clone into
/// deferred jobs.
#[derive(Clone)]
struct FieldCtx {
    parent_type: Rc<ObjectType>,
    field_def: Rc<FieldDef>,
    field_nodes: Rc<Vec<Ref<FieldNode>>>,
    path: Vec<PathSegment>,
}

impl FieldCtx {
    fn spans(&self) -> Vec<Span> {
        self.field_nodes.iter().map(|n| n.span.clone()).collect()
    }

    fn coordinate(&self) -> String {
        format!("{}.{}", self.parent_type.name(), self.field_def.name)
    }
}

struct Job {
    deferred: Deferred,
    ty: TypeRef,
    node: Rc<OutNode>,
    fctx: FieldCtx,
}

struct ExecContext {
    schema: Rc<Schema>,
    fragments: Rc<IndexMap<Rc<str>, Ref<FragmentDefinition>>>,
    operation: Ref<OperationDefinition>,
    root_value: Value,
    context_value: Value,
    variable_values: Rc<FieldMap>,
    field_resolver: Option<ResolveFn>,
    errors: RefCell<Vec<GraphqlError>>,
    queue: RefCell<VecDeque<Job>>,
    options: ExecutionOptions,
    warned_full_scan: Cell<bool>,
}

impl ExecContext {
    fn record(&self, err: GraphqlError) {
        self.errors.borrow_mut().push(err);
    }

    fn field_error(&self, message: String, fctx: &FieldCtx) -> GraphqlError {
        GraphqlError::new(message)
            .with_nodes(fctx.spans())
            .with_path(fctx.path.clone())
    }

    /// An error raised outside resolver code, e.g. a registry invariant
    /// violation. Masked like any non-user resolver failure.
    fn internal_error(&self, err: anyhow::Error, fctx: &FieldCtx) -> GraphqlError {
        GraphqlError::located(err, fctx.spans(), fctx.path.clone())
    }

    // -- field collection ---------------------------------------------------

    fn collect_fields(
        &self,
        object_type: &Rc<ObjectType>,
        selection_set: &SelectionSet,
    ) -> Result<IndexMap<Rc<str>, Rc<Vec<Ref<FieldNode>>>>, GraphqlError> {
        let mut grouped: IndexMap<Rc<str>, Vec<Ref<FieldNode>>> = IndexMap::new();
        let mut visited = BTreeSet::new();
        self.collect_into(object_type, selection_set, &mut grouped, &mut visited)?;
        Ok(grouped
            .into_iter()
            .map(|(key, nodes)| (key, Rc::new(nodes)))
            .collect())
    }

    fn collect_into(
        &self,
        object_type: &Rc<ObjectType>,
        selection_set: &SelectionSet,
        grouped: &mut IndexMap<Rc<str>, Vec<Ref<FieldNode>>>,
        visited: &mut BTreeSet<Rc<str>>,
    ) -> Result<(), GraphqlError> {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if !should_include(&self.schema, &field.directives, &self.variable_values)? {
                        continue;
                    }
                    grouped
                        .entry(field.response_key().into())
                        .or_default()
                        .push(field.clone());
                }
                Selection::FragmentSpread(spread) => {
                    let name: Rc<str> = spread.name.text().into();
                    if visited.contains(&name)
                        || !should_include(&self.schema, &spread.directives, &self.variable_values)?
                    {
                        continue;
                    }
                    visited.insert(name.clone());
                    // An undefined fragment contributes nothing.
                    let Some(fragment) = self.fragments.get(&name).cloned() else {
                        continue;
                    };
                    if self.fragment_applies(object_type, fragment.type_condition.text())? {
                        self.collect_into(
                            object_type,
                            &fragment.selection_set,
                            grouped,
                            visited,
                        )?;
                    }
                }
                Selection::InlineFragment(inline) => {
                    if !should_include(&self.schema, &inline.directives, &self.variable_values)? {
                        continue;
                    }
                    let applies = match &inline.type_condition {
                        None => true,
                        Some(condition) => self.fragment_applies(object_type, condition.text())?,
                    };
                    if applies {
                        self.collect_into(object_type, &inline.selection_set, grouped, visited)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn fragment_applies(
        &self,
        object_type: &Rc<ObjectType>,
        condition: &str,
    ) -> Result<bool, GraphqlError> {
        if condition == object_type.name().as_ref() {
            return Ok(true);
        }
        let condition_type = self
            .schema
            .get_type(condition)
            .map_err(|err| GraphqlError::located(err, vec![], vec![]))?;
        match condition_type {
            Some(NamedType::Interface(_)) => Ok(object_type.implements(condition)),
            Some(NamedType::Union(union)) => Ok(union.has_member(object_type.name())),
            _ => Ok(false),
        }
    }

    // -- selection sets and fields ------------------------------------------

    fn execute_selection_set(
        &self,
        object_type: &Rc<ObjectType>,
        selection_set: &SelectionSet,
        source: Value,
        node: &Rc<OutNode>,
        path: Vec<PathSegment>,
        serial: bool,
    ) {
        let grouped = match self.collect_fields(object_type, selection_set) {
            Ok(grouped) => grouped,
            Err(err) => {
                self.record(err.locate(vec![selection_set.span.clone()], path));
                node.null_and_bubble();
                return;
            }
        };

        *node.state.borrow_mut() = OutState::Object(IndexMap::new());

        for (response_key, field_nodes) in grouped {
            let field_node = &field_nodes[0];
            let field_name = field_node.name.text();

            // The type-name introspection field works on any object type.
            if field_name == "__typename" {
                let child = node.child(false);
                *child.state.borrow_mut() =
                    OutState::Leaf(Value::String(object_type.name().clone()));
                self.attach(node, response_key, child);
                continue;
            }

            // Fields the type does not define are excluded from the
            // response entirely rather than reported as errors.
            let Some(field_def) = object_type.field(field_name) else {
                continue;
            };

            let child = node.child(field_def.ty.is_non_null());
            self.attach(node, response_key.clone(), child.clone());

            let mut field_path = path.clone();
            field_path.push(PathSegment::Field(response_key));
            let fctx = FieldCtx {
                parent_type: object_type.clone(),
                field_def,
                field_nodes: field_nodes.clone(),
                path: field_path,
            };

            self.resolve_field(&source, &child, &fctx);
            if serial {
                self.drain();
            }
        }
    }

    fn attach(&self, parent: &Rc<OutNode>, key: Rc<str>, child: Rc<OutNode>) {
        if let OutState::Object(fields) = &mut *parent.state.borrow_mut() {
            fields.insert(key, child);
        }
    }

    fn resolve_field(&self, source: &Value, node: &Rc<OutNode>, fctx: &FieldCtx) {
        let field_node = &fctx.field_nodes[0];
        let args = match get_argument_values(
            &self.schema,
            &fctx.field_def.args,
            &field_node.arguments,
            &self.variable_values,
        ) {
            Ok(args) => args,
            Err(err) => {
                self.record(err.locate(fctx.spans(), fctx.path.clone()));
                node.null_and_bubble();
                return;
            }
        };

        let info = ResolveInfo {
            field_name: fctx.field_def.name.clone(),
            field_nodes: fctx.field_nodes.clone(),
            return_type: fctx.field_def.ty.clone(),
            parent_type: fctx.parent_type.clone(),
            path: fctx.path.clone(),
            schema: self.schema.clone(),
            fragments: self.fragments.clone(),
            root_value: self.root_value.clone(),
            operation: self.operation.clone(),
            variable_values: self.variable_values.clone(),
        };

        let resolved = match &fctx.field_def.resolve {
            Some(resolve) => resolve(source, &args, &self.context_value, &info),
            None => match &self.field_resolver {
                Some(resolve) => resolve(source, &args, &self.context_value, &info),
                None => Ok(Resolved::Value(source.get(&fctx.field_def.name))),
            },
        };

        match resolved {
            Ok(resolved) => self.complete(&fctx.field_def.ty, node, resolved, fctx),
            Err(err) => {
                self.record(self.internal_error(err, fctx));
                node.null_and_bubble();
            }
        }
    }

    // -- value completion ---------------------------------------------------

    fn complete(&self, ty: &TypeRef, node: &Rc<OutNode>, resolved: Resolved, fctx: &FieldCtx) {
        let value = match resolved {
            Resolved::Value(value) => value,
            Resolved::Deferred(deferred) => {
                self.queue.borrow_mut().push_back(Job {
                    deferred,
                    ty: ty.clone(),
                    node: node.clone(),
                    fctx: fctx.clone(),
                });
                return;
            }
        };
        self.complete_value(ty, node, value, fctx);
    }

    fn complete_value(&self, ty: &TypeRef, node: &Rc<OutNode>, value: Value, fctx: &FieldCtx) {
        match ty {
            TypeRef::NonNull(inner) => {
                if value.is_null() {
                    self.store_leaf(node, Value::Null, fctx);
                } else {
                    self.complete_value(inner, node, value, fctx);
                }
            }
            _ if value.is_null() => self.store_leaf(node, Value::Null, fctx),
            TypeRef::List(inner) => {
                let Value::List(items) = &value else {
                    self.record(self.field_error(
                        format!(
                            "Expected Iterable, but did not find one for field {}.",
                            fctx.coordinate()
                        ),
                        fctx,
                    ));
                    node.null_and_bubble();
                    return;
                };
                let mut children = Vec::with_capacity(items.len());
                for _ in 0..items.len() {
                    children.push(node.child(inner.is_non_null()));
                }
                *node.state.borrow_mut() = OutState::List(children.clone());
                for (i, (item, child)) in items.iter().zip(children).enumerate() {
                    let mut item_fctx = fctx.clone();
                    item_fctx.path.push(PathSegment::Index(i));
                    self.complete_value(inner, &child, item.clone(), &item_fctx);
                }
            }
            TypeRef::Named(name) => {
                let named = match self.schema.get_type(name) {
                    Ok(Some(named)) => named,
                    Ok(None) => {
                        self.record(self.internal_error(
                            anyhow!(InvariantViolation(format!(
                                "Type \"{name}\" not found in schema."
                            ))),
                            fctx,
                        ));
                        node.null_and_bubble();
                        return;
                    }
                    Err(err) => {
                        self.record(self.internal_error(err, fctx));
                        node.null_and_bubble();
                        return;
                    }
                };
                match named {
                    NamedType::Scalar(scalar) => {
                        // Unserializable values become null silently.
                        let out = scalar.serialize(&value).unwrap_or(Value::Null);
                        self.store_leaf(node, out, fctx);
                    }
                    NamedType::Enum(enum_type) => {
                        let out = enum_type.serialize(&value).unwrap_or(Value::Null);
                        self.store_leaf(node, out, fctx);
                    }
                    NamedType::Object(object_type) => {
                        self.complete_object(&object_type, node, value, fctx);
                    }
                    NamedType::Interface(_) | NamedType::Union(_) => {
                        match self.resolve_abstract(&named, &value, fctx) {
                            Ok(object_type) => {
                                self.complete_object(&object_type, node, value, fctx)
                            }
                            Err(err) => {
                                self.record(err);
                                node.null_and_bubble();
                            }
                        }
                    }
                    NamedType::InputObject(_) => {
                        self.record(self.internal_error(
                            anyhow!(InvariantViolation(format!(
                                "Field {} has input type \"{name}\" in an output position.",
                                fctx.coordinate()
                            ))),
                            fctx,
                        ));
                        node.null_and_bubble();
                    }
                }
            }
        }
    }

    /// Stores a leaf value, enforcing the non-null contract of the node's
    /// position.
    fn store_leaf(&self, node: &Rc<OutNode>, value: Value, fctx: &FieldCtx) {
        if value.is_null() && node.non_null {
            self.record(self.field_error(
                format!(
                    "Cannot return null for non-nullable field {}.",
                    fctx.coordinate()
                ),
                fctx,
            ));
            node.null_and_bubble();
            return;
        }
        *node.state.borrow_mut() = OutState::Leaf(value);
    }

    fn complete_object(
        &self,
        object_type: &Rc<ObjectType>,
        node: &Rc<OutNode>,
        value: Value,
        fctx: &FieldCtx,
    ) {
        // The merged sub-selections of every field node for this key.
        let mut merged_items = vec![];
        let mut span = None;
        for field_node in fctx.field_nodes.iter() {
            if let Some(selection_set) = &field_node.selection_set {
                if span.is_none() {
                    span = Some(selection_set.span.clone());
                }
                merged_items.extend(selection_set.items.iter().cloned());
            }
        }
        let Some(span) = span else {
            self.record(self.field_error(
                format!(
                    "Field {} of type \"{}\" must have a selection of subfields.",
                    fctx.coordinate(),
                    object_type.name()
                ),
                fctx,
            ));
            node.null_and_bubble();
            return;
        };
        let selection_set = SelectionSet {
            span,
            items: merged_items,
        };
        self.execute_selection_set(
            object_type,
            &selection_set,
            value,
            node,
            fctx.path.clone(),
            false,
        );
    }

    // -- abstract types -----------------------------------------------------

    fn resolve_abstract(
        &self,
        abstract_type: &NamedType,
        value: &Value,
        fctx: &FieldCtx,
    ) -> Result<Rc<ObjectType>, GraphqlError> {
        let abstract_name = abstract_type.name();
        let resolve_type = match abstract_type {
            NamedType::Interface(interface) => interface.resolve_type.clone(),
            NamedType::Union(union) => union.resolve_type.clone(),
            _ => None,
        };

        let resolved = resolve_type.as_ref().and_then(|f| f(value));
        let object_type = match resolved {
            Some(TypeResolution::Type(object_type)) => {
                // A fresh instance enters the registry here; a second
                // instance under a known name is a violation.
                self.schema
                    .check_instance(&NamedType::Object(object_type.clone()))
                    .map_err(|err| self.internal_error(err, fctx))?;
                object_type
            }
            Some(TypeResolution::Name(name)) => {
                let named = self
                    .schema
                    .get_type(&name)
                    .map_err(|err| self.internal_error(err, fctx))?;
                match named {
                    Some(NamedType::Object(object_type)) => object_type,
                    _ => {
                        return Err(self.internal_error(
                            anyhow!(InvariantViolation(format!(
                                "Abstract type \"{abstract_name}\" must resolve to an Object \
                                 type at runtime for field {}, it resolved to \"{name}\".",
                                fctx.coordinate()
                            ))),
                            fctx,
                        ));
                    }
                }
            }
            None => self.probe_possible_types(&abstract_name, value, fctx)?,
        };

        let possible = self
            .schema
            .is_possible_type(&abstract_name, &object_type)
            .map_err(|err| self.internal_error(err, fctx))?;
        if !possible {
            return Err(self.field_error(
                format!(
                    "Runtime Object type \"{}\" is not a possible type for \"{abstract_name}\".",
                    object_type.name()
                ),
                fctx,
            ));
        }
        Ok(object_type)
    }

    /// Fallback resolution: ask each possible type's `is_type_of`, in
    /// declaration order. On a lazily loaded schema this forces the full
    /// scan the loader existed to avoid, hence the one-shot warning.
    fn probe_possible_types(
        &self,
        abstract_name: &str,
        value: &Value,
        fctx: &FieldCtx,
    ) -> Result<Rc<ObjectType>, GraphqlError> {
        if self.options.warn_full_schema_scan
            && self.schema.has_loader()
            && !self.schema.is_fully_loaded()
            && !self.warned_full_scan.get()
        {
            self.warned_full_scan.set(true);
            log::warn!(
                "full schema scan triggered while resolving abstract type \"{abstract_name}\" \
                 for field {}: without a resolve_type callback every possible type must be \
                 loaded and probed, which defeats lazy type loading",
                fctx.coordinate()
            );
        }

        let possible = self
            .schema
            .possible_types(abstract_name)
            .map_err(|err| self.internal_error(err, fctx))?;
        for object_type in &possible {
            if let Some(is_type_of) = &object_type.is_type_of {
                if is_type_of(value) {
                    return Ok(object_type.clone());
                }
            }
        }
        Err(self.internal_error(
            anyhow!(InvariantViolation(format!(
                "Abstract type \"{abstract_name}\" must resolve to an Object type at runtime \
                 for field {} with value {}. Either the \"{abstract_name}\" type should \
                 provide a \"resolve_type\" callback or each possible type should provide an \
                 \"is_type_of\" callback.",
                fctx.coordinate(),
                value.display_for_error()
            ))),
            fctx,
        ))
    }

    // -- deferred drain -----------------------------------------------------

    /// Runs queued deferred computations until none remain. A deferred
    /// chaining into another deferred goes to the back of the queue, so
    /// deep chains trampoline instead of recursing.
    fn drain(&self) {
        loop {
            let job = self.queue.borrow_mut().pop_front();
            let Some(job) = job else { break };
            match job.deferred.run() {
                Ok(Resolved::Value(value)) => {
                    self.complete_value(&job.ty, &job.node, value, &job.fctx)
                }
                Ok(Resolved::Deferred(deferred)) => {
                    self.queue.borrow_mut().push_back(Job { deferred, ..job })
                }
                Err(err) => {
                    self.record(self.internal_error(err, &job.fctx));
                    job.node.null_and_bubble();
                }
            }
        }
    }
}
