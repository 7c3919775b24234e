//! Introspection types and the resolvers answering `__schema` and `__type`.
//!
//! A `__Type` value is a reference, resolved field by field on demand:
//! `{"name": "Topic"}` for a named type, or
//! `{"kind": "LIST" | "NON_NULL", "ofType": <reference>}` for a wrapper. Since
//! nothing is expanded eagerly, the depth of an introspection result is bounded
//! by the selection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::DataSourceError;
use crate::execution::Resolver;
use crate::execution::ResolverContext;
use crate::json_ext::Value;
use crate::spec::ArgumentDefinition;
use crate::spec::EnumType;
use crate::spec::FieldDefinition;
use crate::spec::FieldType;
use crate::spec::ObjectType;
use crate::spec::QUERY_TYPE;
use crate::spec::Schema;
use crate::spec::TypeDefinition;

const TYPE_KINDS: [&str; 8] = [
    "SCALAR",
    "OBJECT",
    "INTERFACE",
    "UNION",
    "ENUM",
    "INPUT_OBJECT",
    "LIST",
    "NON_NULL",
];

const DIRECTIVE_LOCATIONS: [&str; 19] = [
    "QUERY",
    "MUTATION",
    "SUBSCRIPTION",
    "FIELD",
    "FRAGMENT_DEFINITION",
    "FRAGMENT_SPREAD",
    "INLINE_FRAGMENT",
    "VARIABLE_DEFINITION",
    "SCHEMA",
    "SCALAR",
    "OBJECT",
    "FIELD_DEFINITION",
    "ARGUMENT_DEFINITION",
    "INTERFACE",
    "UNION",
    "ENUM",
    "ENUM_VALUE",
    "INPUT_OBJECT",
    "INPUT_FIELD_DEFINITION",
];

fn field(name: &str, ty: FieldType) -> FieldDefinition {
    FieldDefinition::builder().name(name).ty(ty).build()
}

fn string() -> FieldType {
    FieldType::named("String")
}

fn boolean() -> FieldType {
    FieldType::named("Boolean").non_null()
}

fn list_of(name: &str) -> FieldType {
    FieldType::named(name).non_null().list()
}

fn include_deprecated() -> ArgumentDefinition {
    ArgumentDefinition::builder()
        .name("includeDeprecated")
        .ty(FieldType::named("Boolean"))
        .default_value(Value::Bool(false))
        .build()
}

/// The introspection types, pre-registered in every schema.
pub(crate) fn meta_types() -> Vec<TypeDefinition> {
    let type_resolver: Arc<dyn Resolver> = Arc::new(TypeResolver);
    let type_field = |name: &str, ty: FieldType| field(name, ty).with_resolver(type_resolver.clone());
    let with_deprecated = |name: &str, ty: FieldType| {
        FieldDefinition::builder()
            .name(name)
            .ty(ty)
            .argument(include_deprecated())
            .build()
            .with_resolver(type_resolver.clone())
    };

    vec![
        ObjectType::builder()
            .name("__Schema")
            .description("A GraphQL Schema defines the capabilities of a GraphQL server.")
            .field(field("description", string()))
            .field(field("types", list_of("__Type").non_null()))
            .field(field("queryType", FieldType::named("__Type").non_null()))
            .field(field("mutationType", FieldType::named("__Type")))
            .field(field("subscriptionType", FieldType::named("__Type")))
            .field(field("directives", list_of("__Directive").non_null()))
            .build()
            .into(),
        ObjectType::builder()
            .name("__Type")
            .field(type_field("kind", FieldType::named("__TypeKind").non_null()))
            .field(type_field("name", string()))
            .field(type_field("description", string()))
            .field(type_field("specifiedByURL", string()))
            .field(with_deprecated("fields", list_of("__Field")))
            .field(type_field("interfaces", list_of("__Type")))
            .field(type_field("possibleTypes", list_of("__Type")))
            .field(with_deprecated("enumValues", list_of("__EnumValue")))
            .field(with_deprecated("inputFields", list_of("__InputValue")))
            .field(type_field("ofType", FieldType::named("__Type")))
            .build()
            .into(),
        ObjectType::builder()
            .name("__Field")
            .field(field("name", string().non_null()))
            .field(field("description", string()))
            .field(
                FieldDefinition::builder()
                    .name("args")
                    .ty(list_of("__InputValue").non_null())
                    .argument(include_deprecated())
                    .build(),
            )
            .field(field("type", FieldType::named("__Type").non_null()))
            .field(field("isDeprecated", boolean()))
            .field(field("deprecationReason", string()))
            .build()
            .into(),
        ObjectType::builder()
            .name("__InputValue")
            .field(field("name", string().non_null()))
            .field(field("description", string()))
            .field(field("type", FieldType::named("__Type").non_null()))
            .field(field("defaultValue", string()))
            .field(field("isDeprecated", boolean()))
            .field(field("deprecationReason", string()))
            .build()
            .into(),
        ObjectType::builder()
            .name("__EnumValue")
            .field(field("name", string().non_null()))
            .field(field("description", string()))
            .field(field("isDeprecated", boolean()))
            .field(field("deprecationReason", string()))
            .build()
            .into(),
        ObjectType::builder()
            .name("__Directive")
            .field(field("name", string().non_null()))
            .field(field("description", string()))
            .field(field("locations", list_of("__DirectiveLocation").non_null()))
            .field(
                FieldDefinition::builder()
                    .name("args")
                    .ty(list_of("__InputValue").non_null())
                    .argument(include_deprecated())
                    .build(),
            )
            .field(field("isRepeatable", boolean()))
            .build()
            .into(),
        EnumType::builder()
            .name("__TypeKind")
            .values(TYPE_KINDS.iter().map(|kind| kind.to_string()).collect())
            .build()
            .into(),
        EnumType::builder()
            .name("__DirectiveLocation")
            .values(DIRECTIVE_LOCATIONS.iter().map(|location| location.to_string()).collect())
            .build()
            .into(),
    ]
}

/// `__schema: __Schema!`
pub(crate) fn schema_field() -> FieldDefinition {
    field("__schema", FieldType::named("__Schema").non_null())
        .with_resolver(Arc::new(SchemaResolver))
}

/// `__type(name: String!): __Type`
pub(crate) fn type_field() -> FieldDefinition {
    FieldDefinition::builder()
        .name("__type")
        .ty(FieldType::named("__Type"))
        .argument(
            ArgumentDefinition::builder()
                .name("name")
                .ty(string().non_null())
                .build(),
        )
        .build()
        .with_resolver(Arc::new(TypeLookup))
}

fn type_ref(ty: &FieldType) -> Value {
    match ty {
        FieldType::Named(name) => json!({ "name": name }),
        FieldType::List(inner) => json!({ "kind": "LIST", "ofType": type_ref(inner) }),
        FieldType::NonNull(inner) => json!({ "kind": "NON_NULL", "ofType": type_ref(inner) }),
    }
}

fn named_ref(name: &str) -> Value {
    json!({ "name": name })
}

/// Prints a default value as a GraphQL literal.
fn graphql_literal(value: &Value) -> String {
    match value {
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(graphql_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(name, value)| format!("{name}: {}", graphql_literal(value)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}

fn input_value(argument: &ArgumentDefinition) -> Value {
    json!({
        "name": argument.name(),
        "description": argument.description,
        "type": type_ref(argument.ty()),
        "defaultValue": argument.default_value.as_ref().map(graphql_literal),
        "isDeprecated": false,
        "deprecationReason": null,
    })
}

fn field_value(field: &FieldDefinition) -> Value {
    json!({
        "name": field.name(),
        "description": field.description,
        "args": field.arguments().map(input_value).collect::<Vec<_>>(),
        "type": type_ref(field.ty()),
        "isDeprecated": false,
        "deprecationReason": null,
    })
}

fn directives() -> Value {
    let condition = |description: &str| {
        json!({
            "name": "if",
            "description": description,
            "type": type_ref(&FieldType::named("Boolean").non_null()),
            "defaultValue": null,
            "isDeprecated": false,
            "deprecationReason": null,
        })
    };
    json!([
        {
            "name": "include",
            "description": "Directs the executor to include this field or fragment only when the `if` argument is true.",
            "locations": ["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
            "args": [condition("Included when true.")],
            "isRepeatable": false,
        },
        {
            "name": "skip",
            "description": "Directs the executor to skip this field or fragment when the `if` argument is true.",
            "locations": ["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
            "args": [condition("Skipped when true.")],
            "isRepeatable": false,
        },
        {
            "name": "specifiedBy",
            "description": "Exposes a URL that specifies the behavior of this scalar.",
            "locations": ["SCALAR"],
            "args": [{
                "name": "url",
                "description": "The URL that specifies the behavior of this scalar.",
                "type": type_ref(&FieldType::named("String").non_null()),
                "defaultValue": null,
                "isDeprecated": false,
                "deprecationReason": null,
            }],
            "isRepeatable": false,
        },
    ])
}

struct SchemaResolver;

#[async_trait]
impl Resolver for SchemaResolver {
    async fn resolve(
        &self,
        context: ResolverContext<'_>,
    ) -> Result<Option<Value>, DataSourceError> {
        let types: Vec<Value> = context
            .schema
            .types()
            .map(|ty| named_ref(ty.name()))
            .collect();
        Ok(Some(json!({
            "description": null,
            "types": types,
            "queryType": named_ref(QUERY_TYPE),
            "mutationType": null,
            "subscriptionType": null,
            "directives": directives(),
        })))
    }
}

struct TypeLookup;

#[async_trait]
impl Resolver for TypeLookup {
    async fn resolve(
        &self,
        context: ResolverContext<'_>,
    ) -> Result<Option<Value>, DataSourceError> {
        let name = context.string_argument("name")?;
        Ok(context.schema.get(name).map(|ty| named_ref(ty.name())))
    }
}

/// Resolves every field of `__Type` from a type reference.
struct TypeResolver;

#[async_trait]
impl Resolver for TypeResolver {
    async fn resolve(
        &self,
        context: ResolverContext<'_>,
    ) -> Result<Option<Value>, DataSourceError> {
        let reference = context.parent;
        // Wrappers only have a kind and an inner type
        if let Some(kind) = reference.get("kind") {
            return Ok(match context.field_name {
                "kind" => Some(kind.clone()),
                "ofType" => reference.get("ofType").cloned(),
                _ => None,
            });
        }
        let Some(ty) = reference
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| context.schema.get(name))
        else {
            return Ok(None);
        };
        Ok(resolve_named_type_field(context.schema, ty, context.field_name))
    }
}

fn resolve_named_type_field(schema: &Schema, ty: &TypeDefinition, field_name: &str) -> Option<Value> {
    match field_name {
        "kind" => Some(
            match ty {
                TypeDefinition::Scalar(_) => "SCALAR",
                TypeDefinition::Enum(_) => "ENUM",
                TypeDefinition::Interface(_) => "INTERFACE",
                TypeDefinition::Object(_) => "OBJECT",
            }
            .into(),
        ),
        "name" => Some(ty.name().into()),
        "description" => ty.description().map(Value::from),
        "specifiedByURL" => match ty {
            TypeDefinition::Scalar(scalar) => scalar.specified_by_url.clone().map(Value::from),
            _ => None,
        },
        "fields" => ty
            .fields()
            .map(|fields| fields.values().map(field_value).collect()),
        "interfaces" => match ty {
            TypeDefinition::Object(object) => Some(
                object
                    .interfaces
                    .iter()
                    .map(|name| named_ref(name))
                    .collect(),
            ),
            TypeDefinition::Interface(_) => Some(Value::Array(Vec::new())),
            _ => None,
        },
        "possibleTypes" => match ty {
            TypeDefinition::Interface(interface) => Some(
                schema
                    .possible_types(interface.name())
                    .into_iter()
                    .map(named_ref)
                    .collect(),
            ),
            _ => None,
        },
        "enumValues" => match ty {
            TypeDefinition::Enum(enum_type) => Some(
                enum_type
                    .values
                    .values()
                    .map(|value| {
                        json!({
                            "name": value.name,
                            "description": value.description,
                            "isDeprecated": false,
                            "deprecationReason": null,
                        })
                    })
                    .collect(),
            ),
            _ => None,
        },
        // `inputFields` stays null: there are no input object types
        _ => None,
    }
}
