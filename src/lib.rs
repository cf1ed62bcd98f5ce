// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! **regraph** is a GraphQL query engine: a code-first type system, a
//! schema registry with optional lazy type loading, and an executor that
//! produces spec-shaped results with partial data and located errors.
//!
//! ```rust
//! use regraph::{graphql, FieldDef, ObjectType, Schema, TypeRef};
//!
//! let query = ObjectType::new("Query")
//!     .field(FieldDef::new("hello", TypeRef::string()).resolve(|_, _, _, _| Ok("world".into())))
//!     .build();
//! let schema = Schema::build(query).finish()?;
//!
//! let result = graphql(schema, "{ hello }");
//! assert_eq!(result.to_json_str()?, r#"{"data":{"hello":"world"}}"#);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod ast;
pub mod coercion;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod types;
pub mod value;

pub use deferred::{Deferred, Resolved};
pub use error::{ExecutionResult, GraphqlError, InvariantViolation, PathSegment, UserError};
pub use executor::{execute, graphql, Execution, ExecutionOptions, ResolveInfo};
pub use parser::parse;
pub use schema::{Schema, SchemaBuilder, TypeLoaderFn};
pub use types::{
    Directive, DirectiveLocation, EnumType, FieldDef, InputObjectType, InputValueDef,
    InterfaceType, NamedType, ObjectType, ScalarType, TypeRef, TypeResolution, UnionType,
};
pub use value::{FieldMap, Value};
