// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use regraph::{
    graphql, Deferred, EnumType, Execution, FieldDef, InputValueDef, ObjectType, PathSegment,
    Resolved, ScalarType, Schema, TypeRef, UserError, Value,
};

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

fn json(s: &str) -> Value {
    Value::from_json_str(s).unwrap()
}

#[test]
fn default_resolver_reads_source_properties() -> Result<()> {
    let address = ObjectType::new("Address")
        .field(FieldDef::new("street", TypeRef::string()))
        .field(FieldDef::new("city", TypeRef::string()))
        .build();
    let query = ObjectType::new("Query")
        .field(FieldDef::new("name", TypeRef::string()))
        .field(FieldDef::new("address", TypeRef::named("Address")))
        .build();
    let schema = Schema::build(query).add_type(address).finish()?;

    let document = regraph::parse("{ name address { city street } }")?;
    let root = json(r#"{"name": "Ada", "address": {"street": "Pine", "city": "Oslo"}}"#);
    let result = Execution::new(schema, &document).root_value(root).run();

    // Response keys follow selection order, not source order.
    assert_eq!(
        result.to_json_str()?,
        r#"{"data":{"name":"Ada","address":{"city":"Oslo","street":"Pine"}}}"#
    );
    Ok(())
}

#[test]
fn aliases_arguments_and_enums() -> Result<()> {
    let color = EnumType::new("Color").value("RED").value("GREEN").build();
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("pick", TypeRef::named("Color"))
                .arg(InputValueDef::new("first", TypeRef::boolean()).default_value(true))
                .resolve(|_, args, _, _| {
                    let first = args.get("first") == Some(&Value::Bool(true));
                    Ok(Value::from(if first { "RED" } else { "GREEN" }).into())
                }),
        )
        .build();
    let schema = Schema::build(query).add_type(color).finish()?;

    let result = graphql(schema, "{ a: pick b: pick(first: false) }");
    assert_eq!(result.to_json_str()?, r#"{"data":{"a":"RED","b":"GREEN"}}"#);
    Ok(())
}

#[test]
fn variables_flow_into_arguments() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("echo", TypeRef::string())
                .arg(InputValueDef::new("msg", TypeRef::non_null(TypeRef::string())))
                .resolve(|_, args, _, _| {
                    Ok(args.get("msg").cloned().unwrap_or(Value::Null).into())
                }),
        )
        .build();
    let schema = Schema::build(query).finish()?;
    let document = regraph::parse("query Echo($m: String!) { echo(msg: $m) }")?;

    let mut vars = regraph::FieldMap::new();
    vars.insert("m".into(), Value::from("hi"));
    let result = Execution::new(schema.clone(), &document).variable_values(vars).run();
    assert_eq!(result.to_json_str()?, r#"{"data":{"echo":"hi"}}"#);

    // Missing required variable fails the request before execution; the
    // serialized envelope carries no data key at all.
    let result = Execution::new(schema, &document).run();
    assert_eq!(result.data, None);
    assert_eq!(
        result.errors[0].message(),
        "Variable \"$m\" of required type \"String!\" was not provided."
    );
    Ok(())
}

#[test]
fn fragments_spread_and_merge() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("a", TypeRef::string()).resolve(|_, _, _, _| Ok("a".into())))
        .field(FieldDef::new("b", TypeRef::string()).resolve(|_, _, _, _| Ok("b".into())))
        .build();
    let schema = Schema::build(query).finish()?;

    let result = graphql(
        schema.clone(),
        "{ ...Both } fragment Both on Query { a b }",
    );
    assert_eq!(result.to_json_str()?, r#"{"data":{"a":"a","b":"b"}}"#);

    // A cyclic spread terminates; each fragment contributes once.
    let result = graphql(
        schema.clone(),
        "{ ...A } fragment A on Query { a ...B } fragment B on Query { b ...A }",
    );
    assert_eq!(result.to_json_str()?, r#"{"data":{"a":"a","b":"b"}}"#);

    // Unknown fragments contribute nothing.
    let result = graphql(schema, "{ a ...Missing }");
    assert_eq!(result.to_json_str()?, r#"{"data":{"a":"a"}}"#);
    Ok(())
}

#[test]
fn skip_and_include_respect_variables() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("a", TypeRef::string()).resolve(|_, _, _, _| Ok("a".into())))
        .field(FieldDef::new("b", TypeRef::string()).resolve(|_, _, _, _| Ok("b".into())))
        .build();
    let schema = Schema::build(query).finish()?;
    let document =
        regraph::parse("query Q($on: Boolean!) { a @skip(if: $on) b @include(if: $on) }")?;

    let mut vars = regraph::FieldMap::new();
    vars.insert("on".into(), Value::Bool(true));
    let result = Execution::new(schema.clone(), &document).variable_values(vars).run();
    assert_eq!(result.to_json_str()?, r#"{"data":{"b":"b"}}"#);

    let mut vars = regraph::FieldMap::new();
    vars.insert("on".into(), Value::Bool(false));
    let result = Execution::new(schema, &document).variable_values(vars).run();
    assert_eq!(result.to_json_str()?, r#"{"data":{"a":"a"}}"#);
    Ok(())
}

#[test]
fn deferred_fields_fill_in_after_the_sync_pass() -> Result<()> {
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(vec![]));

    let o1 = order.clone();
    let o2 = order.clone();
    let o3 = order.clone();
    let query = ObjectType::new("Query")
        .field(FieldDef::new("a", TypeRef::string()).resolve(move |_, _, _, _| {
            o1.borrow_mut().push("a");
            Ok("a".into())
        }))
        .field(FieldDef::new("b", TypeRef::string()).resolve(move |_, _, _, _| {
            let o = o2.clone();
            Ok(Resolved::Deferred(Deferred::new(move || {
                o.borrow_mut().push("b (deferred)");
                Ok("b".into())
            })))
        }))
        .field(FieldDef::new("c", TypeRef::string()).resolve(move |_, _, _, _| {
            o3.borrow_mut().push("c");
            Ok("c".into())
        }))
        .build();
    let schema = Schema::build(query).finish()?;

    let result = graphql(schema, "{ a b c }");
    // The deferred resolver ran last, yet its value sits in selection
    // order in the response.
    assert_eq!(*order.borrow(), vec!["a", "c", "b (deferred)"]);
    assert_eq!(result.to_json_str()?, r#"{"data":{"a":"a","b":"b","c":"c"}}"#);
    Ok(())
}

#[test]
fn deferred_chains_trampoline() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("n", TypeRef::int()).resolve(|_, _, _, _| {
            fn step(n: i64) -> Deferred {
                Deferred::new(move || {
                    if n == 0 {
                        Ok(Resolved::Value(Value::Int(0)))
                    } else {
                        Ok(Resolved::Deferred(step(n - 1)))
                    }
                })
            }
            Ok(Resolved::Deferred(step(10_000)))
        }))
        .build();
    let schema = Schema::build(query).finish()?;

    let result = graphql(schema, "{ n }");
    assert_eq!(result.to_json_str()?, r#"{"data":{"n":0}}"#);
    Ok(())
}

#[test]
fn mutations_run_serially_including_deferred_work() -> Result<()> {
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(vec![]));

    let o1 = order.clone();
    let o2 = order.clone();
    let mutation = ObjectType::new("Mutation")
        .field(FieldDef::new("first", TypeRef::string()).resolve(move |_, _, _, _| {
            let o = o1.clone();
            o.borrow_mut().push("first");
            Ok(Resolved::Deferred(Deferred::new(move || {
                o.borrow_mut().push("first (deferred)");
                Ok("1".into())
            })))
        }))
        .field(FieldDef::new("second", TypeRef::string()).resolve(move |_, _, _, _| {
            o2.borrow_mut().push("second");
            Ok("2".into())
        }))
        .build();
    let query = ObjectType::new("Query")
        .field(FieldDef::new("ok", TypeRef::boolean()).resolve(|_, _, _, _| Ok(true.into())))
        .build();
    let schema = Schema::build(query).mutation(mutation).finish()?;

    let result = graphql(schema, "mutation { first second }");
    assert_eq!(
        *order.borrow(),
        vec!["first", "first (deferred)", "second"]
    );
    assert_eq!(result.to_json_str()?, r#"{"data":{"first":"1","second":"2"}}"#);
    Ok(())
}

#[test]
fn resolver_errors_become_located_field_errors() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("safe", TypeRef::string()).resolve(|_, _, _, _| {
            bail!(UserError::new("No user with id 7."))
        }))
        .field(FieldDef::new("leaky", TypeRef::string()).resolve(|_, _, _, _| {
            Err(anyhow!("connection refused (10.0.0.7:5432)"))
        }))
        .field(FieldDef::new("fine", TypeRef::string()).resolve(|_, _, _, _| Ok("ok".into())))
        .build();
    let schema = Schema::build(query).finish()?;

    let result = graphql(schema, "{ safe leaky fine }");
    let data = result.data.clone().unwrap();
    assert_eq!(data, json(r#"{"safe": null, "leaky": null, "fine": "ok"}"#));

    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].message(), "No user with id 7.");
    assert!(result.errors[0].is_client_safe());
    assert_eq!(result.errors[0].path(), &[PathSegment::Field("safe".into())]);
    assert_eq!(result.errors[0].locations()[0].column, 3);

    // Foreign errors are masked in the message and kept for debugging.
    assert_eq!(result.errors[1].message(), "Internal server error");
    assert!(!result.errors[1].is_client_safe());
    assert_eq!(
        result.errors[1].debug_message().as_deref(),
        Some("connection refused (10.0.0.7:5432)")
    );
    Ok(())
}

#[test]
fn a_deferred_resolver_can_fail() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("late", TypeRef::string()).resolve(|_, _, _, _| {
            Ok(Resolved::Deferred(Deferred::new(|| {
                bail!(UserError::new("came apart late"))
            })))
        }))
        .build();
    let schema = Schema::build(query).finish()?;

    let result = graphql(schema, "{ late }");
    assert_eq!(result.data, Some(json(r#"{"late": null}"#)));
    assert_eq!(result.errors[0].message(), "came apart late");
    assert_eq!(result.errors[0].path(), &[PathSegment::Field("late".into())]);
    Ok(())
}

#[test]
fn lists_complete_positionally() -> Result<()> {
    let item = ObjectType::new("Item")
        .field(FieldDef::new("id", TypeRef::int()))
        .build();
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("items", TypeRef::list(TypeRef::named("Item"))).resolve(|_, _, _, _| {
                Ok(Value::from_json_str(r#"[{"id": 1}, null, {"id": 3}]"#)?.into())
            }),
        )
        .field(FieldDef::new("notAList", TypeRef::list(TypeRef::int())).resolve(
            |_, _, _, _| Ok(Value::Int(5).into()),
        ))
        .build();
    let schema = Schema::build(query).add_type(item).finish()?;

    let result = graphql(schema, "{ items { id } notAList }");
    assert_eq!(
        result.data,
        Some(json(r#"{"items": [{"id": 1}, null, {"id": 3}], "notAList": null}"#))
    );
    assert_eq!(
        result.errors[0].message(),
        "Expected Iterable, but did not find one for field Query.notAList."
    );
    assert_eq!(
        result.errors[0].path(),
        &[PathSegment::Field("notAList".into())]
    );
    Ok(())
}

#[test]
fn custom_field_resolver_is_the_fallback() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("anything", TypeRef::string()))
        .field(FieldDef::new("own", TypeRef::string()).resolve(|_, _, _, _| Ok("own".into())))
        .build();
    let schema = Schema::build(query).finish()?;
    let document = regraph::parse("{ anything own }")?;

    let result = Execution::new(schema, &document)
        .field_resolver(|_, _, _, info| Ok(Value::from(format!("fell back: {}", info.field_name)).into()))
        .run();
    assert_eq!(
        result.to_json_str()?,
        r#"{"data":{"anything":"fell back: anything","own":"own"}}"#
    );
    Ok(())
}

#[test]
fn context_value_reaches_resolvers() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("viewer", TypeRef::string()).resolve(|_, _, context, _| {
            Ok(context.get("user").into())
        }))
        .build();
    let schema = Schema::build(query).finish()?;
    let document = regraph::parse("{ viewer }")?;

    let result = Execution::new(schema, &document)
        .context_value(json(r#"{"user": "ada"}"#))
        .run();
    assert_eq!(result.to_json_str()?, r#"{"data":{"viewer":"ada"}}"#);
    Ok(())
}

#[test]
fn custom_scalars_serialize_leniently() -> Result<()> {
    let upper = ScalarType::custom("Upper", |v| match v {
        Value::String(s) => Some(Value::from(s.to_uppercase())),
        _ => None,
    })
    .build();
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("shout", TypeRef::named("Upper"))
                .resolve(|_, _, _, _| Ok("hello".into())),
        )
        .field(
            FieldDef::new("bad", TypeRef::named("Upper"))
                .resolve(|_, _, _, _| Ok(Value::Int(3).into())),
        )
        .build();
    let schema = Schema::build(query).add_type(upper).finish()?;

    let result = graphql(schema, "{ shout bad }");
    // An unserializable value becomes null without an error.
    assert!(result.errors.is_empty());
    assert_eq!(result.data, Some(json(r#"{"shout": "HELLO", "bad": null}"#)));
    Ok(())
}

#[test]
fn syntax_errors_come_back_in_the_envelope() -> Result<()> {
    let query = ObjectType::new("Query")
        .field(FieldDef::new("a", TypeRef::string()))
        .build();
    let schema = Schema::build(query).finish()?;

    let result = graphql(schema, "{ a");
    assert_eq!(result.data, None);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message().contains("expecting name"));
    Ok(())
}
