use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::spec::TypeDefinition;
use crate::spec::TypeResolution;

#[test]
fn every_object_conforms_to_its_interfaces() {
    let schema = test_schema();
    for ty in schema.types() {
        let TypeDefinition::Object(object) = ty else {
            continue;
        };
        for interface_name in &object.interfaces {
            let interface = schema.interface(interface_name).unwrap();
            for (name, field) in &interface.fields {
                let implementation = object.field(name).unwrap_or_else(|| {
                    panic!("{}.{name} is missing", object.name())
                });
                assert_eq!(
                    implementation.ty().inner_type_name(),
                    field.ty().inner_type_name(),
                    "{}.{name}",
                    object.name()
                );
                assert!(
                    implementation.ty().is_non_null() || !field.ty().is_non_null(),
                    "{}.{name} is wider than {interface_name}.{name}",
                    object.name()
                );
            }
        }
    }
}

#[test]
fn interfaces_know_their_implementations() {
    let schema = test_schema();
    assert_eq!(
        schema.interface("Node").unwrap().possible_types(),
        ["Topic", "User", "Organization", "Repository"]
    );
    assert_eq!(
        schema.interface("UniformResourceLocatable").unwrap().possible_types(),
        ["User", "Organization", "Repository"]
    );
    let owner = schema.interface("RepositoryOwner").unwrap();
    assert!(matches!(
        owner.discriminate(&schema, &json!({ "type": "Organization" })),
        TypeResolution::Object(object) if object.name() == "Organization"
    ));
    // Topics are nodes but not owners
    assert!(matches!(
        owner.discriminate(&schema, &json!({ "type": "Topic" })),
        TypeResolution::Unresolvable
    ));
}

#[test]
fn root_fields_are_declared_with_their_arguments() {
    let schema = test_schema();
    assert_eq!(
        schema
            .resolve_field_type("Query", "repositoryOwner")
            .unwrap()
            .to_string(),
        "RepositoryOwner"
    );
    let repository = schema.field("Query", "repository").unwrap();
    let arguments: Vec<&str> = repository.arguments().map(|a| a.name()).collect();
    assert_eq!(arguments, ["owner", "name"]);
    assert!(repository.arguments().all(|a| a.is_required()));
    assert_eq!(
        schema
            .resolve_field_type("Topic", "relatedTopics")
            .unwrap()
            .to_string(),
        "[Topic!]!"
    );
}

#[test]
fn it_prints_the_schema() {
    let sdl = test_schema().to_sdl();
    assert!(sdl.contains("scalar URI @specifiedBy(url: \"https://tools.ietf.org/html/rfc3986\")"));
    assert!(sdl.contains("type User implements Node & RepositoryOwner & UniformResourceLocatable {"));
    assert!(sdl.contains("  repository(owner: String!, name: String!): Repository\n"));
    assert!(!sdl.contains("__Type"));
}

#[tokio::test]
async fn topic_lists_drop_unknown_names() {
    let mut data_source = MockGithubDataSource::new();
    data_source
        .expect_get_topic()
        .withf(|name| name == "rust")
        .returning(|name| Ok(Some(json!({ "type": "Topic", "id": "t", "name": name }))));
    data_source
        .expect_get_topic()
        .withf(|name| name == "gone")
        .returning(|_| Ok(None));
    let schema = schema(Arc::new(data_source)).unwrap();
    let resolver = schema
        .field("Repository", "topics")
        .unwrap()
        .resolver
        .clone()
        .unwrap();

    let parent = json!({
        "topics": ["rust", "gone", { "type": "Topic", "id": "e", "name": "embedded" }]
    });
    let arguments = crate::json_ext::Object::new();
    let resolved = resolver
        .resolve(ResolverContext {
            schema: &schema,
            parent_type: "Repository",
            field_name: "topics",
            parent: &parent,
            arguments: &arguments,
        })
        .await
        .unwrap();
    assert_eq!(
        resolved,
        Some(json!([
            { "type": "Topic", "id": "t", "name": "rust" },
            { "type": "Topic", "id": "e", "name": "embedded" }
        ]))
    );

    let parent = json!({});
    let resolved = resolver
        .resolve(ResolverContext {
            schema: &schema,
            parent_type: "Repository",
            field_name: "topics",
            parent: &parent,
            arguments: &arguments,
        })
        .await
        .unwrap();
    assert_eq!(resolved, Some(json!([])));
}

#[tokio::test]
async fn invalid_resource_urls_are_argument_errors() {
    let schema = schema(Arc::new(MockGithubDataSource::new())).unwrap();
    let resolver = schema
        .field("Query", "resource")
        .unwrap()
        .resolver
        .clone()
        .unwrap();
    let parent = json!({});
    let arguments = json!({ "url": "not a url" });
    let error = resolver
        .resolve(ResolverContext {
            schema: &schema,
            parent_type: "Query",
            field_name: "resource",
            parent: &parent,
            arguments: arguments.as_object().unwrap(),
        })
        .await
        .unwrap_err();
    assert!(matches!(error, DataSourceError::InvalidArguments { .. }));
}
