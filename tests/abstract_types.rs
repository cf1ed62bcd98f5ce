// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use regraph::{
    graphql, FieldDef, InterfaceType, ObjectType, Schema, TypeRef, TypeResolution, UnionType,
    Value,
};

use std::rc::Rc;

use anyhow::Result;

fn json(s: &str) -> Value {
    Value::from_json_str(s).unwrap()
}

fn dog() -> Rc<ObjectType> {
    ObjectType::new("Dog")
        .field(FieldDef::new("name", TypeRef::string()))
        .field(FieldDef::new("barks", TypeRef::boolean()))
        .interface("Pet")
        .is_type_of(|value| !value.get("barks").is_null())
        .build()
}

fn cat() -> Rc<ObjectType> {
    ObjectType::new("Cat")
        .field(FieldDef::new("name", TypeRef::string()))
        .field(FieldDef::new("meows", TypeRef::boolean()))
        .interface("Pet")
        .is_type_of(|value| !value.get("meows").is_null())
        .build()
}

fn pets_value() -> Value {
    json(r#"[{"name": "Odie", "barks": true}, {"name": "Garfield", "meows": false}]"#)
}

fn pet_query() -> Rc<ObjectType> {
    ObjectType::new("Query")
        .field(
            FieldDef::new("pets", TypeRef::list(TypeRef::named("Pet")))
                .resolve(|_, _, _, _| Ok(pets_value().into())),
        )
        .build()
}

const PET_QUERY: &str = "{
  pets {
    __typename
    name
    ... on Dog { barks }
    ... on Cat { meows }
  }
}";

#[test]
fn interface_resolution_via_is_type_of() -> Result<()> {
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .build();
    let schema = Schema::build(pet_query())
        .add_type(pet)
        .add_type(dog())
        .add_type(cat())
        .finish()?;

    let result = graphql(schema, PET_QUERY);
    assert!(result.errors.is_empty());
    assert_eq!(
        result.data,
        Some(json(
            r#"{"pets": [
                {"__typename": "Dog", "name": "Odie", "barks": true},
                {"__typename": "Cat", "name": "Garfield", "meows": false}
            ]}"#
        ))
    );
    Ok(())
}

#[test]
fn interface_resolution_via_resolve_type_name() -> Result<()> {
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .resolve_type(|value| {
            let kind = if value.get("barks").is_null() { "Cat" } else { "Dog" };
            Some(TypeResolution::Name(kind.to_owned()))
        })
        .build();
    let schema = Schema::build(pet_query())
        .add_type(pet)
        .add_type(dog())
        .add_type(cat())
        .finish()?;

    let result = graphql(schema, PET_QUERY);
    assert!(result.errors.is_empty());
    let pets = result.data.unwrap().get("pets");
    assert_eq!(pets.as_list()?[0].get("__typename"), Value::from("Dog"));
    assert_eq!(pets.as_list()?[1].get("__typename"), Value::from("Cat"));
    Ok(())
}

#[test]
fn resolve_type_may_return_an_instance() -> Result<()> {
    let the_dog = dog();
    let returned = the_dog.clone();
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .resolve_type(move |_| Some(TypeResolution::Type(returned.clone())))
        .build();
    let schema = Schema::build(pet_query())
        .add_type(pet)
        .add_type(the_dog)
        .add_type(cat())
        .finish()?;

    let result = graphql(schema, "{ pets { __typename name } }");
    assert!(result.errors.is_empty());
    let pets = result.data.unwrap().get("pets");
    assert_eq!(pets.as_list()?[0].get("__typename"), Value::from("Dog"));
    assert_eq!(pets.as_list()?[1].get("__typename"), Value::from("Dog"));
    Ok(())
}

#[test]
fn a_conflicting_instance_under_a_known_name_is_rejected() -> Result<()> {
    // Same name as the registered Dog, different instance.
    let impostor = ObjectType::new("Dog")
        .field(FieldDef::new("name", TypeRef::string()))
        .interface("Pet")
        .build();
    let returned = impostor.clone();
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .resolve_type(move |_| Some(TypeResolution::Type(returned.clone())))
        .build();
    let schema = Schema::build(pet_query())
        .add_type(pet)
        .add_type(dog())
        .add_type(cat())
        .finish()?;

    let result = graphql(schema, "{ pets { name } }");
    assert_eq!(result.data, Some(json(r#"{"pets": [null, null]}"#)));
    assert_eq!(result.errors[0].message(), "Internal server error");
    assert!(result.errors[0]
        .debug_message()
        .unwrap()
        .contains("multiple types named \"Dog\""));
    Ok(())
}

#[test]
fn runtime_type_must_be_a_possible_type() -> Result<()> {
    let stranger = ObjectType::new("Stranger")
        .field(FieldDef::new("name", TypeRef::string()))
        .build();
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .resolve_type(|_| Some(TypeResolution::Name("Stranger".to_owned())))
        .build();
    let schema = Schema::build(pet_query())
        .add_type(pet)
        .add_type(dog())
        .add_type(cat())
        .add_type(stranger)
        .finish()?;

    let result = graphql(schema, "{ pets { name } }");
    assert_eq!(result.data, Some(json(r#"{"pets": [null, null]}"#)));
    assert_eq!(
        result.errors[0].message(),
        "Runtime Object type \"Stranger\" is not a possible type for \"Pet\"."
    );
    Ok(())
}

#[test]
fn unresolvable_abstract_value_is_masked() -> Result<()> {
    // No resolve_type on the interface and no is_type_of matches.
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .build();
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("pet", TypeRef::named("Pet"))
                .resolve(|_, _, _, _| Ok(json(r#"{"name": "Blob"}"#).into())),
        )
        .build();
    let schema = Schema::build(query)
        .add_type(pet)
        .add_type(dog())
        .add_type(cat())
        .finish()?;

    let result = graphql(schema, "{ pet { name } }");
    assert_eq!(result.data, Some(json(r#"{"pet": null}"#)));
    assert_eq!(result.errors[0].message(), "Internal server error");
    assert!(result.errors[0]
        .debug_message()
        .unwrap()
        .contains("Abstract type \"Pet\" must resolve to an Object type at runtime"));
    Ok(())
}

#[test]
fn unions_resolve_and_narrow_with_inline_fragments() -> Result<()> {
    let human = ObjectType::new("Human")
        .field(FieldDef::new("name", TypeRef::string()))
        .is_type_of(|v| !v.get("name").is_null())
        .build();
    let droid = ObjectType::new("Droid")
        .field(FieldDef::new("serial", TypeRef::int()))
        .is_type_of(|v| !v.get("serial").is_null())
        .build();
    let found = UnionType::new("SearchResult").member("Human").member("Droid").build();
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("search", TypeRef::list(TypeRef::named("SearchResult"))).resolve(
                |_, _, _, _| {
                    Ok(Value::from_json_str(r#"[{"serial": 42}, {"name": "Leia"}]"#)?.into())
                },
            ),
        )
        .build();
    let schema = Schema::build(query)
        .add_type(human)
        .add_type(droid)
        .add_type(found)
        .finish()?;

    let result = graphql(
        schema,
        "{ search { __typename ... on Human { name } ... on Droid { serial } } }",
    );
    assert!(result.errors.is_empty());
    assert_eq!(
        result.data,
        Some(json(
            r#"{"search": [
                {"__typename": "Droid", "serial": 42},
                {"__typename": "Human", "name": "Leia"}
            ]}"#
        ))
    );
    Ok(())
}

#[test]
fn fragments_on_interfaces_apply_to_implementors() -> Result<()> {
    let pet = InterfaceType::new("Pet")
        .field(FieldDef::new("name", TypeRef::string()))
        .build();
    let query = ObjectType::new("Query")
        .field(
            FieldDef::new("dog", TypeRef::named("Dog"))
                .resolve(|_, _, _, _| Ok(json(r#"{"name": "Odie", "barks": true}"#).into())),
        )
        .build();
    let schema = Schema::build(query).add_type(pet).add_type(dog()).add_type(cat()).finish()?;

    let result = graphql(
        schema,
        "{ dog { ...PetFields ... on Cat { meows } } } fragment PetFields on Pet { name }",
    );
    // The Pet fragment applies to Dog; the Cat fragment does not.
    assert_eq!(result.data, Some(json(r#"{"dog": {"name": "Odie"}}"#)));
    Ok(())
}
