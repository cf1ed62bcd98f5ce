// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{ArgumentNode, DirectiveNode, TypeNode, ValueNode, VariableDefinition};
use crate::error::GraphqlError;
use crate::schema::Schema;
use crate::types::{Directive, InputValueDef, NamedType, TypeRef};
use crate::value::{FieldMap, Value};

use std::rc::Rc;

/// Converts a type reference as written in a query (e.g. `[Int!]!`) into
/// the schema's representation.
pub fn type_ref_from_node(node: &TypeNode) -> TypeRef {
    match node {
        TypeNode::Named { span } => TypeRef::named(span.text()),
        TypeNode::List { inner, .. } => TypeRef::list(type_ref_from_node(inner)),
        TypeNode::NonNull { inner, .. } => TypeRef::non_null(type_ref_from_node(inner)),
    }
}

fn is_input_type(schema: &Schema, ty: &TypeRef) -> anyhow::Result<bool> {
    match ty {
        TypeRef::List(inner) | TypeRef::NonNull(inner) => is_input_type(schema, inner),
        TypeRef::Named(name) => Ok(matches!(
            schema.get_type(name)?,
            Some(NamedType::Scalar(_) | NamedType::Enum(_) | NamedType::InputObject(_))
        )),
    }
}

/// Coerces the runtime values supplied for an operation's variables.
/// Every variable is checked: unknown types, non-input types, missing
/// required values and malformed values each produce a request error, and
/// all errors are collected rather than stopping at the first.
pub fn get_variable_values(
    schema: &Schema,
    definitions: &[VariableDefinition],
    inputs: &FieldMap,
) -> Result<FieldMap, Vec<GraphqlError>> {
    let mut coerced = FieldMap::new();
    let mut errors = vec![];

    for def in definitions {
        let name = def.name.text();
        let ty = type_ref_from_node(&def.ty);

        match is_input_type(schema, &ty) {
            Ok(true) => {}
            Ok(false) => {
                errors.push(
                    GraphqlError::new(format!(
                        "Variable \"${name}\" expected value of type \"{ty}\" which cannot be \
                         used as an input type."
                    ))
                    .with_nodes(vec![def.span.clone()]),
                );
                continue;
            }
            Err(err) => {
                errors.push(
                    GraphqlError::located(err, vec![def.span.clone()], vec![]),
                );
                continue;
            }
        }

        match inputs.get(name) {
            None => {
                if let Some(default) = &def.default_value {
                    match coerce_literal(schema, &ty, default, &FieldMap::new()) {
                        Ok(value) => {
                            coerced.insert(name.into(), value);
                        }
                        Err(err) => errors.push(
                            GraphqlError::new(format!(
                                "Variable \"${name}\" has invalid default value: {err}"
                            ))
                            .with_nodes(vec![default.span().clone()]),
                        ),
                    }
                } else if ty.is_non_null() {
                    errors.push(
                        GraphqlError::new(format!(
                            "Variable \"${name}\" of required type \"{ty}\" was not provided."
                        ))
                        .with_nodes(vec![def.span.clone()]),
                    );
                }
            }
            Some(value) => match coerce_runtime(schema, &ty, value) {
                Ok(value) => {
                    coerced.insert(name.into(), value);
                }
                Err(err) => errors.push(
                    GraphqlError::new(format!(
                        "Variable \"${name}\" got invalid value {}; {err}",
                        value.display_for_error()
                    ))
                    .with_nodes(vec![def.span.clone()]),
                ),
            },
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Coerces a runtime (JSON) value against an input type. Error strings
/// describe the mismatch; callers prepend the variable context.
fn coerce_runtime(schema: &Schema, ty: &TypeRef, value: &Value) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(format!("Expected non-nullable type \"{ty}\" not to be null."));
            }
            coerce_runtime(schema, inner, value)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let coerced = coerce_runtime(schema, inner, item)
                        .map_err(|err| format!("In element #{i}: {err}"))?;
                    out.push(coerced);
                }
                Ok(Value::from(out))
            }
            // A single value coerces to a one-element list.
            _ => Ok(Value::from(vec![coerce_runtime(schema, inner, value)?])),
        },
        TypeRef::Named(name) => {
            let named = schema
                .get_type(name)
                .map_err(|err| err.to_string())?
                .ok_or_else(|| format!("Unknown type \"{name}\"."))?;
            match named {
                NamedType::Scalar(scalar) => coerce_runtime_scalar(&scalar, value),
                NamedType::Enum(enum_type) => {
                    let name_str = match value {
                        Value::String(s) | Value::Enum(s) => Some(s.clone()),
                        _ => None,
                    };
                    name_str
                        .and_then(|s| enum_type.parse_name(&s))
                        .ok_or_else(|| {
                            format!(
                                "Value {} does not exist in \"{}\" enum.",
                                value.display_for_error(),
                                enum_type.name()
                            )
                        })
                }
                NamedType::InputObject(input) => {
                    let Value::Object(fields) = value else {
                        return Err(format!(
                            "Expected type \"{}\" to be an object.",
                            input.name()
                        ));
                    };
                    for key in fields.keys() {
                        if !input.fields().contains_key(key) {
                            return Err(format!(
                                "Field \"{}\" is not defined by type \"{}\".",
                                key,
                                input.name()
                            ));
                        }
                    }
                    let mut out = FieldMap::new();
                    for (field_name, field_def) in input.fields() {
                        match fields.get(field_name) {
                            Some(provided) => {
                                let coerced = coerce_runtime(schema, &field_def.ty, provided)
                                    .map_err(|err| format!("In field \"{field_name}\": {err}"))?;
                                out.insert(field_name.clone(), coerced);
                            }
                            None => {
                                if let Some(default) = &field_def.default_value {
                                    out.insert(field_name.clone(), default.clone());
                                } else if field_def.ty.is_non_null() {
                                    return Err(format!(
                                        "Field \"{}\" of required type \"{}\" was not provided.",
                                        field_name, field_def.ty
                                    ));
                                }
                            }
                        }
                    }
                    Ok(Value::from(out))
                }
                NamedType::Object(_) | NamedType::Interface(_) | NamedType::Union(_) => Err(
                    format!("Type \"{name}\" cannot be used as an input type."),
                ),
            }
        }
    }
}

// Runtime scalar coercion is strict, unlike output serialization: a
// variable value must already have the right shape.
fn coerce_runtime_scalar(
    scalar: &Rc<crate::types::ScalarType>,
    value: &Value,
) -> Result<Value, String> {
    match scalar.name().as_ref() {
        "Int" => match value {
            Value::Int(n) if i32::try_from(*n).is_ok() => Ok(value.clone()),
            Value::Int(n) => Err(format!(
                "Int cannot represent non 32-bit signed integer value: {n}"
            )),
            _ => Err(format!(
                "Int cannot represent non-integer value: {}",
                value.display_for_error()
            )),
        },
        "Float" => match value {
            Value::Float(_) => Ok(value.clone()),
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            _ => Err(format!(
                "Float cannot represent non numeric value: {}",
                value.display_for_error()
            )),
        },
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(format!(
                "String cannot represent a non string value: {}",
                value.display_for_error()
            )),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(format!(
                "Boolean cannot represent a non boolean value: {}",
                value.display_for_error()
            )),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Int(n) => Ok(Value::from(n.to_string())),
            _ => Err(format!(
                "ID cannot represent value: {}",
                value.display_for_error()
            )),
        },
        // Custom scalars take runtime values as-is; their serialize
        // callback guards the output side.
        _ => Ok(value.clone()),
    }
}

/// Coerces a query literal against an input type, substituting variable
/// references from the pre-coerced variable map. An absent nullable
/// variable coerces to null; callers handle the top-level absent case
/// before calling in, so defaults can apply.
fn coerce_literal(
    schema: &Schema,
    ty: &TypeRef,
    node: &ValueNode,
    variables: &FieldMap,
) -> Result<Value, String> {
    if let ValueNode::Variable { name, .. } = node {
        let var_name = name.text();
        return match variables.get(var_name) {
            Some(value) => {
                if value.is_null() && ty.is_non_null() {
                    Err(format!(
                        "Variable \"${var_name}\" of type null used in position expecting \
                         type \"{ty}\"."
                    ))
                } else {
                    Ok(value.clone())
                }
            }
            None => {
                if ty.is_non_null() {
                    Err(format!(
                        "Variable \"${var_name}\" of required type \"{ty}\" was not provided \
                         a runtime value."
                    ))
                } else {
                    Ok(Value::Null)
                }
            }
        };
    }

    match ty {
        TypeRef::NonNull(inner) => {
            if matches!(node, ValueNode::Null { .. }) {
                return Err(format!("Expected value of type \"{ty}\", found null."));
            }
            coerce_literal(schema, inner, node, variables)
        }
        _ if matches!(node, ValueNode::Null { .. }) => Ok(Value::Null),
        TypeRef::List(inner) => match node {
            ValueNode::List { items, .. } => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let coerced = coerce_literal(schema, inner, item, variables)
                        .map_err(|err| format!("In element #{i}: {err}"))?;
                    out.push(coerced);
                }
                Ok(Value::from(out))
            }
            _ => Ok(Value::from(vec![coerce_literal(
                schema, inner, node, variables,
            )?])),
        },
        TypeRef::Named(name) => {
            let named = schema
                .get_type(name)
                .map_err(|err| err.to_string())?
                .ok_or_else(|| format!("Unknown type \"{name}\"."))?;
            match named {
                NamedType::Scalar(scalar) => scalar.parse_literal(node),
                NamedType::Enum(enum_type) => match node {
                    ValueNode::Enum { span } => {
                        enum_type.parse_name(span.text()).ok_or_else(|| {
                            format!(
                                "Value \"{}\" does not exist in \"{}\" enum.",
                                span.text(),
                                enum_type.name()
                            )
                        })
                    }
                    _ => Err(format!(
                        "Enum \"{}\" cannot represent non-enum value: {}",
                        enum_type.name(),
                        node.span().text()
                    )),
                },
                NamedType::InputObject(input) => {
                    let ValueNode::Object { fields, .. } = node else {
                        return Err(format!(
                            "Expected type \"{}\" to be an object.",
                            input.name()
                        ));
                    };
                    for (field_name, _) in fields {
                        if !input.fields().contains_key(field_name.text()) {
                            return Err(format!(
                                "Field \"{}\" is not defined by type \"{}\".",
                                field_name.text(),
                                input.name()
                            ));
                        }
                    }
                    let mut out = FieldMap::new();
                    for (field_name, field_def) in input.fields() {
                        let provided = fields
                            .iter()
                            .find(|(n, _)| n.text() == field_name.as_ref())
                            .map(|(_, v)| v);
                        match provided {
                            Some(value_node) => {
                                let coerced =
                                    coerce_literal(schema, &field_def.ty, value_node, variables)
                                        .map_err(|err| {
                                            format!("In field \"{field_name}\": {err}")
                                        })?;
                                out.insert(field_name.clone(), coerced);
                            }
                            None => {
                                if let Some(default) = &field_def.default_value {
                                    out.insert(field_name.clone(), default.clone());
                                } else if field_def.ty.is_non_null() {
                                    return Err(format!(
                                        "Field \"{}\" of required type \"{}\" was not provided.",
                                        field_name, field_def.ty
                                    ));
                                }
                            }
                        }
                    }
                    Ok(Value::from(out))
                }
                NamedType::Object(_) | NamedType::Interface(_) | NamedType::Union(_) => Err(
                    format!("Type \"{name}\" cannot be used as an input type."),
                ),
            }
        }
    }
}

/// Computes the argument map for one field or directive application.
/// Defaults are substituted only for arguments that are omitted outright;
/// any provided literal, however falsy, is kept. Arguments the definition
/// does not name are ignored.
pub fn get_argument_values(
    schema: &Schema,
    definitions: &[Rc<InputValueDef>],
    nodes: &[ArgumentNode],
    variables: &FieldMap,
) -> Result<FieldMap, GraphqlError> {
    let mut coerced = FieldMap::new();

    for def in definitions {
        let node = nodes.iter().find(|n| n.name.text() == def.name.as_ref());

        // A reference to an unprovided variable counts as omission.
        let omitted = match node {
            None => true,
            Some(node) => match &node.value {
                ValueNode::Variable { name, .. } => !variables.contains_key(name.text()),
                _ => false,
            },
        };

        if omitted {
            if let Some(default) = &def.default_value {
                coerced.insert(def.name.clone(), default.clone());
            } else if def.ty.is_non_null() {
                let mut err = GraphqlError::new(format!(
                    "Argument \"{}\" of required type \"{}\" was not provided.",
                    def.name, def.ty
                ));
                if let Some(node) = node {
                    err = err.with_nodes(vec![node.value.span().clone()]);
                }
                return Err(err);
            }
            continue;
        }

        let node = match node {
            Some(node) => node,
            None => continue,
        };
        match coerce_literal(schema, &def.ty, &node.value, variables) {
            Ok(value) => {
                coerced.insert(def.name.clone(), value);
            }
            Err(err) => {
                return Err(GraphqlError::new(format!(
                    "Argument \"{}\" has invalid value {}: {err}",
                    def.name,
                    node.value.span().text()
                ))
                .with_nodes(vec![node.value.span().clone()]));
            }
        }
    }

    Ok(coerced)
}

fn directive_values(
    schema: &Schema,
    directive: &Directive,
    nodes: &[DirectiveNode],
    variables: &FieldMap,
) -> Result<Option<FieldMap>, GraphqlError> {
    let Some(node) = nodes.iter().find(|n| n.name.text() == directive.name.as_ref()) else {
        return Ok(None);
    };
    let args = get_argument_values(schema, &directive.args, &node.arguments, variables)?;
    Ok(Some(args))
}

/// Evaluates `@skip` and `@include` on a selection. `@skip` wins when both
/// are present and disagree.
pub fn should_include(
    schema: &Schema,
    directives: &[DirectiveNode],
    variables: &FieldMap,
) -> Result<bool, GraphqlError> {
    if directives.is_empty() {
        return Ok(true);
    }

    if let Some(skip) = schema.directive("skip") {
        if let Some(args) = directive_values(schema, &skip, directives, variables)? {
            if args.get("if").map(|v| v == &Value::Bool(true)).unwrap_or(false) {
                return Ok(false);
            }
        }
    }

    if let Some(include) = schema.directive("include") {
        if let Some(args) = directive_values(schema, &include, directives, variables)? {
            if args.get("if").map(|v| v == &Value::Bool(false)).unwrap_or(false) {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Definition, Selection};
    use crate::parser;
    use crate::types::{FieldDef, InputObjectType, ObjectType};

    fn test_schema() -> Rc<Schema> {
        let point = InputObjectType::new("Point")
            .field(InputValueDef::new("x", TypeRef::non_null(TypeRef::int())))
            .field(InputValueDef::new("y", TypeRef::int()).default_value(0))
            .build();
        let query = ObjectType::new("Query")
            .field(
                FieldDef::new("f", TypeRef::string())
                    .arg(InputValueDef::new("i", TypeRef::int()))
                    .arg(InputValueDef::new("s", TypeRef::string()).default_value("dflt"))
                    .arg(InputValueDef::new("req", TypeRef::non_null(TypeRef::boolean())))
                    .arg(InputValueDef::new("p", TypeRef::named("Point")))
                    .arg(InputValueDef::new("l", TypeRef::list(TypeRef::int()))),
            )
            .build();
        Schema::build(query).add_type(point).finish().unwrap()
    }

    fn field_args(doc: &str) -> (Vec<ArgumentNode>, Rc<Schema>) {
        let document = parser::parse(doc).unwrap();
        let Definition::Operation(op) = &document.definitions[0] else {
            panic!("expected operation");
        };
        let Selection::Field(field) = &op.selection_set.items[0] else {
            panic!("expected field");
        };
        (field.arguments.clone(), test_schema())
    }

    fn defs(schema: &Schema) -> Vec<Rc<InputValueDef>> {
        schema.query_type().field("f").unwrap().args.clone()
    }

    #[test]
    fn literals_coerce_by_declared_type() {
        let (nodes, schema) = field_args(r#"{ f(i: 3, req: true, l: [1, 2]) }"#);
        let args = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new()).unwrap();
        assert_eq!(args.get("i"), Some(&Value::Int(3)));
        assert_eq!(args.get("req"), Some(&Value::Bool(true)));
        assert_eq!(
            args.get("l"),
            Some(&Value::from(vec![Value::Int(1), Value::Int(2)]))
        );
        // Default substituted for the omitted argument only.
        assert_eq!(args.get("s"), Some(&Value::from("dflt")));
        assert!(!args.contains_key("p"));
    }

    #[test]
    fn provided_falsy_values_beat_defaults() {
        let (nodes, schema) = field_args(r#"{ f(s: "", req: false) }"#);
        let args = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new()).unwrap();
        assert_eq!(args.get("s"), Some(&Value::from("")));
        assert_eq!(args.get("req"), Some(&Value::Bool(false)));
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        let (nodes, schema) = field_args("{ f(i: 1) }");
        let err = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new())
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Argument \"req\" of required type \"Boolean!\" was not provided."));
    }

    #[test]
    fn invalid_literal_reports_argument_context() {
        let (nodes, schema) = field_args("{ f(i: 3.5, req: true) }");
        let err = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Argument \"i\" has invalid value 3.5"));
        assert!(msg.contains("Int cannot represent non-integer value"));
    }

    #[test]
    fn input_objects_check_fields_and_defaults() {
        let (nodes, schema) = field_args("{ f(req: true, p: {x: 1}) }");
        let args = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new()).unwrap();
        let p = args.get("p").unwrap();
        assert_eq!(p.get("x"), Value::Int(1));
        assert_eq!(p.get("y"), Value::Int(0));

        let (nodes, schema) = field_args("{ f(req: true, p: {x: 1, z: 2}) }");
        let err = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new())
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Field \"z\" is not defined by type \"Point\"."));

        let (nodes, schema) = field_args("{ f(req: true, p: {y: 2}) }");
        let err = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new())
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Field \"x\" of required type \"Int!\" was not provided."));
    }

    #[test]
    fn absent_variable_falls_back_to_default() {
        let (nodes, schema) = field_args("query Q($v: String) { f(s: $v, req: true) }");
        let args = get_argument_values(&schema, &defs(&schema), &nodes, &FieldMap::new()).unwrap();
        assert_eq!(args.get("s"), Some(&Value::from("dflt")));

        let mut vars = FieldMap::new();
        vars.insert("v".into(), Value::from("given"));
        let args = get_argument_values(&schema, &defs(&schema), &nodes, &vars).unwrap();
        assert_eq!(args.get("s"), Some(&Value::from("given")));
    }

    #[test]
    fn variable_values_are_validated() {
        let schema = test_schema();
        let document =
            parser::parse("query Q($a: Int!, $b: [Int], $c: Int = 7) { f(req: true) }").unwrap();
        let Definition::Operation(op) = &document.definitions[0] else {
            panic!("expected operation");
        };

        let mut inputs = FieldMap::new();
        inputs.insert("a".into(), Value::Int(1));
        inputs.insert("b".into(), Value::Int(5));
        let vars = get_variable_values(&schema, &op.variable_definitions, &inputs).unwrap();
        assert_eq!(vars.get("a"), Some(&Value::Int(1)));
        // Single values coerce to one-element lists.
        assert_eq!(vars.get("b"), Some(&Value::from(vec![Value::Int(5)])));
        assert_eq!(vars.get("c"), Some(&Value::Int(7)));

        let errors =
            get_variable_values(&schema, &op.variable_definitions, &FieldMap::new()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message(),
            "Variable \"$a\" of required type \"Int!\" was not provided."
        );

        let mut inputs = FieldMap::new();
        inputs.insert("a".into(), Value::from("nope"));
        let errors = get_variable_values(&schema, &op.variable_definitions, &inputs).unwrap_err();
        assert!(errors[0]
            .message()
            .contains("Variable \"$a\" got invalid value \"nope\""));
    }

    #[test]
    fn skip_and_include_directives() {
        let schema = test_schema();
        let doc = parser::parse(
            "{ a @skip(if: true) b @skip(if: false) c @include(if: false) d @include(if: $v) }",
        )
        .unwrap();
        let Definition::Operation(op) = &doc.definitions[0] else {
            panic!("expected operation");
        };
        let field_directives: Vec<_> = op
            .selection_set
            .items
            .iter()
            .map(|s| match s {
                Selection::Field(f) => f.directives.clone(),
                _ => panic!("expected field"),
            })
            .collect();

        let mut vars = FieldMap::new();
        vars.insert("v".into(), Value::Bool(true));
        assert!(!should_include(&schema, &field_directives[0], &vars).unwrap());
        assert!(should_include(&schema, &field_directives[1], &vars).unwrap());
        assert!(!should_include(&schema, &field_directives[2], &vars).unwrap());
        assert!(should_include(&schema, &field_directives[3], &vars).unwrap());
    }
}
