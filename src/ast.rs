// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::*;

use core::{cmp, fmt, ops::Deref};
use std::rc::Rc;

/// Shared AST node handle. Equality and ordering are pointer identity so
/// that nodes can key maps and sets without comparing subtrees.
pub struct NodeRef<T> {
    r: Rc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.r).eq(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> cmp::Ord for NodeRef<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Rc::as_ptr(&self.r).cmp(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::PartialOrd for NodeRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Rc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

/// A name token. The text lives in the shared source.
#[derive(Debug, Clone)]
pub struct Name {
    pub span: Span,
}

impl Name {
    pub fn text(&self) -> &str {
        self.span.text()
    }
}

#[derive(Debug)]
pub struct Document {
    pub definitions: Vec<Definition>,
}

#[derive(Debug)]
pub enum Definition {
    Operation(Ref<OperationDefinition>),
    Fragment(Ref<FragmentDefinition>),
    /// A type-system definition. Executable documents must not contain
    /// these; the executor rejects them with a located error. Only the
    /// leading keyword is retained.
    TypeSystem(Ref<TypeSystemDefinition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        })
    }
}

#[derive(Debug)]
pub struct OperationDefinition {
    pub span: Span,
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: SelectionSet,
}

#[derive(Debug)]
pub struct FragmentDefinition {
    pub span: Span,
    pub name: Name,
    pub type_condition: Name,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: SelectionSet,
}

#[derive(Debug)]
pub struct TypeSystemDefinition {
    pub span: Span,
    /// Leading keyword, e.g. `type`, `interface`, `schema`.
    pub keyword: String,
}

#[derive(Debug)]
pub struct VariableDefinition {
    pub span: Span,
    pub name: Name,
    pub ty: TypeNode,
    pub default_value: Option<ValueNode>,
}

#[derive(Debug, Clone)]
pub struct SelectionSet {
    pub span: Span,
    pub items: Vec<Selection>,
}

#[derive(Debug, Clone)]
pub enum Selection {
    Field(Ref<FieldNode>),
    FragmentSpread(Ref<FragmentSpreadNode>),
    InlineFragment(Ref<InlineFragmentNode>),
}

#[derive(Debug)]
pub struct FieldNode {
    pub span: Span,
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<ArgumentNode>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: Option<SelectionSet>,
}

impl FieldNode {
    /// Response key: alias when present, field name otherwise.
    pub fn response_key(&self) -> &str {
        match &self.alias {
            Some(alias) => alias.text(),
            None => self.name.text(),
        }
    }
}

#[derive(Debug)]
pub struct FragmentSpreadNode {
    pub span: Span,
    pub name: Name,
    pub directives: Vec<DirectiveNode>,
}

#[derive(Debug)]
pub struct InlineFragmentNode {
    pub span: Span,
    pub type_condition: Option<Name>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone)]
pub struct ArgumentNode {
    pub span: Span,
    pub name: Name,
    pub value: ValueNode,
}

#[derive(Debug, Clone)]
pub struct DirectiveNode {
    pub span: Span,
    pub name: Name,
    pub arguments: Vec<ArgumentNode>,
}

#[derive(Debug, Clone)]
pub enum ValueNode {
    Variable { span: Span, name: Name },
    Int { span: Span },
    Float { span: Span },
    String { span: Span },
    Boolean { span: Span, value: bool },
    Null { span: Span },
    Enum { span: Span },
    List { span: Span, items: Vec<ValueNode> },
    Object { span: Span, fields: Vec<(Name, ValueNode)> },
}

impl ValueNode {
    pub fn span(&self) -> &Span {
        match self {
            Self::Variable { span, .. }
            | Self::Int { span }
            | Self::Float { span }
            | Self::String { span }
            | Self::Boolean { span, .. }
            | Self::Null { span }
            | Self::Enum { span }
            | Self::List { span, .. }
            | Self::Object { span, .. } => span,
        }
    }
}

/// Type reference as written in a variable definition, e.g. `[Int!]!`.
#[derive(Debug, Clone)]
pub enum TypeNode {
    Named { span: Span },
    List { span: Span, inner: Box<TypeNode> },
    NonNull { span: Span, inner: Box<TypeNode> },
}

impl TypeNode {
    pub fn span(&self) -> &Span {
        match self {
            Self::Named { span } | Self::List { span, .. } | Self::NonNull { span, .. } => span,
        }
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { span } => f.write_str(span.text()),
            Self::List { inner, .. } => write!(f, "[{inner}]"),
            Self::NonNull { inner, .. } => write!(f, "{inner}!"),
        }
    }
}
