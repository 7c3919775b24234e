//! Query execution.
//!
//! Fields are resolved top-down: a field only runs once its parent value
//! exists, and siblings run concurrently. A field error nulls the nearest
//! nullable position above it and is reported exactly once.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod resolver;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use indexmap::IndexMap;
pub use resolver::Resolver;
pub use resolver::ResolverContext;

use crate::error::ArgumentValidationError;
use crate::error::DataSourceError;
use crate::error::FieldError;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::FieldDefinition;
use crate::spec::FieldType;
use crate::spec::Fragments;
use crate::spec::ObjectType;
use crate::spec::QUERY_TYPE;
use crate::spec::Query;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;
use crate::spec::TYPENAME;
use crate::spec::TypeDefinition;
use crate::spec::query::QueryOptions;
use crate::spec::query::coerce_input_value;
use crate::spec::query::value_to_json;
use crate::spec::selection::Field;

pub(crate) const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_MAX_DEPTH: usize = 32;

/// Executes GraphQL requests against a closed [`Schema`].
#[derive(Debug, Clone)]
pub struct Executor {
    schema: Arc<Schema>,
    resolver_timeout: Duration,
    query_options: QueryOptions,
}

#[buildstructor::buildstructor]
impl Executor {
    #[builder(visibility = "pub")]
    fn new(
        schema: Arc<Schema>,
        resolver_timeout: Option<Duration>,
        max_depth: Option<usize>,
        introspection: Option<bool>,
    ) -> Self {
        Self {
            schema,
            resolver_timeout: resolver_timeout.unwrap_or(DEFAULT_RESOLVER_TIMEOUT),
            query_options: QueryOptions {
                max_depth: max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
                introspection: introspection.unwrap_or(true),
            },
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Runs the whole request pipeline.
    ///
    /// Requests rejected before execution get a response without `data`.
    pub async fn execute(&self, request: &Request) -> Response {
        let Some(query) = request.query.as_deref() else {
            return Response::from_errors(vec![SpecError::MissingQuery.to_error()]);
        };
        let query = match Query::parse(
            query,
            request.operation_name.as_deref(),
            &self.schema,
            &self.query_options,
        ) {
            Ok(query) => query,
            Err(errors) => {
                tracing::debug!(errors = errors.len(), "query rejected");
                return Response::from_errors(errors.iter().map(SpecError::to_error).collect());
            }
        };
        let variables = match query.coerce_variables(&self.schema, &request.variables) {
            Ok(variables) => variables,
            Err(errors) => {
                tracing::debug!(errors = errors.len(), "variables rejected");
                return Response::from_errors(errors.iter().map(SpecError::to_error).collect());
            }
        };
        let Some(query_type) = self.schema.query_type() else {
            return Response::from_errors(vec![
                Error::builder()
                    .message("the schema has no query type")
                    .extension_code("INTERNAL_SERVER_ERROR")
                    .build(),
            ]);
        };

        tracing::debug!(operation = ?query.operation.name, "executing query");
        let context = ExecutionContext {
            schema: &self.schema,
            fragments: &query.fragments,
            variables: &variables,
            resolver_timeout: self.resolver_timeout,
        };
        let root = Value::Object(Object::new());
        let (result, errors) = context
            .execute_selection_set(
                Path::empty(),
                query_type,
                &root,
                vec![query.operation.selection_set.as_slice()],
            )
            .await;
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "query executed with field errors");
        }

        Response::builder()
            .data(result.map(Value::Object).unwrap_or(Value::Null))
            .errors(errors)
            .build()
    }

    /// Validates `arguments` and invokes the resolver bound to `Query.{field_name}`.
    pub async fn resolve_root_field(
        &self,
        field_name: &str,
        arguments: &Object,
    ) -> Result<Option<Value>, FieldError> {
        let unknown = || FieldError::UnknownField {
            parent: QUERY_TYPE.to_string(),
            field: field_name.to_string(),
        };
        let definition = self
            .schema
            .field(QUERY_TYPE, field_name)
            .map_err(|_| unknown())?;
        let resolver = definition.resolver.as_ref().ok_or_else(unknown)?;
        let arguments = coerce_arguments(&self.schema, QUERY_TYPE, definition, arguments)?;
        let root = Value::Object(Object::new());
        let context = ResolverContext {
            schema: &self.schema,
            parent_type: QUERY_TYPE,
            field_name,
            parent: &root,
            arguments: &arguments,
        };
        Ok(invoke(resolver.as_ref(), context, self.resolver_timeout).await?)
    }
}

/// Validates field arguments against their definitions and applies defaults.
pub(crate) fn coerce_arguments(
    schema: &Schema,
    parent_type: &str,
    definition: &FieldDefinition,
    provided: &Object,
) -> Result<Object, ArgumentValidationError> {
    let coordinate = format!("{parent_type}.{}", definition.name());
    if let Some(unknown) = provided
        .keys()
        .find(|name| definition.argument(name).is_none())
    {
        return Err(ArgumentValidationError::Unknown {
            field: coordinate,
            argument: unknown.clone(),
        });
    }
    let mut coerced = Object::new();
    for argument in definition.arguments() {
        match provided.get(argument.name()) {
            Some(value) => {
                let value = coerce_input_value(schema, argument.ty(), value).map_err(|reason| {
                    ArgumentValidationError::Invalid {
                        field: coordinate.clone(),
                        argument: argument.name().to_string(),
                        reason,
                    }
                })?;
                coerced.insert(argument.name().to_string(), value);
            }
            None => {
                if let Some(default) = &argument.default_value {
                    coerced.insert(argument.name().to_string(), default.clone());
                } else if argument.ty().is_non_null() {
                    return Err(ArgumentValidationError::Missing {
                        field: coordinate,
                        argument: argument.name().to_string(),
                        ty: argument.ty().to_string(),
                    });
                }
            }
        }
    }
    Ok(coerced)
}

async fn invoke(
    resolver: &dyn Resolver,
    context: ResolverContext<'_>,
    timeout: Duration,
) -> Result<Option<Value>, DataSourceError> {
    match tokio::time::timeout(timeout, resolver.resolve(context)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                field = %format_args!("{}.{}", context.parent_type, context.field_name),
                ?timeout,
                "resolver timed out"
            );
            Err(DataSourceError::Timeout {
                field: format!("{}.{}", context.parent_type, context.field_name),
                timeout_ms: timeout.as_millis(),
            })
        }
    }
}

/// A field error is being propagated upwards to find a nullable place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PropagateNull;

/// A completed value and the errors recorded while completing it.
type Completion<T> = (Result<T, PropagateNull>, Vec<Error>);

/// Nulls `result` if `ty` allows it, otherwise keeps propagating.
fn try_nullify(ty: &FieldType, result: Result<Value, PropagateNull>) -> Result<Value, PropagateNull> {
    match result {
        Ok(value) => Ok(value),
        Err(PropagateNull) if ty.is_non_null() => Err(PropagateNull),
        Err(PropagateNull) => Ok(Value::Null),
    }
}

struct ExecutionContext<'a> {
    schema: &'a Schema,
    fragments: &'a Fragments,
    variables: &'a Object,
    resolver_timeout: Duration,
}

impl<'a> ExecutionContext<'a> {
    /// Spec: https://spec.graphql.org/October2021/#ExecuteSelectionSet()
    fn execute_selection_set<'b>(
        &'b self,
        path: Path,
        object_type: &'a ObjectType,
        parent: &'b Value,
        selection_sets: Vec<&'a [Selection]>,
    ) -> BoxFuture<'b, Completion<Object>> {
        async move {
            let grouped = self.collect_fields(object_type, &selection_sets);
            let completions = join_all(grouped.iter().map(|(response_key, fields)| {
                self.execute_field(
                    path.join(response_key.as_str()),
                    object_type,
                    parent,
                    fields.clone(),
                )
            }))
            .await;

            let mut object = Object::new();
            let mut errors = Vec::new();
            let mut nulled = false;
            // Completion order is irrelevant: results are merged in selection order
            for ((response_key, _), (result, field_errors)) in grouped.into_iter().zip(completions)
            {
                errors.extend(field_errors);
                match result {
                    Ok(value) => {
                        object.insert(response_key, value);
                    }
                    Err(PropagateNull) => nulled = true,
                }
            }
            if nulled {
                (Err(PropagateNull), errors)
            } else {
                (Ok(object), errors)
            }
        }
        .boxed()
    }

    /// Spec: https://spec.graphql.org/October2021/#CollectFields()
    fn collect_fields(
        &self,
        object_type: &ObjectType,
        selection_sets: &[&'a [Selection]],
    ) -> IndexMap<String, Vec<&'a Field>> {
        let mut fields = IndexMap::new();
        let mut visited_fragments = HashSet::new();
        for selection_set in selection_sets {
            self.collect_fields_into(object_type, selection_set, &mut fields, &mut visited_fragments);
        }
        fields
    }

    fn collect_fields_into(
        &self,
        object_type: &ObjectType,
        selections: &'a [Selection],
        fields: &mut IndexMap<String, Vec<&'a Field>>,
        visited_fragments: &mut HashSet<&'a str>,
    ) {
        let fragments: &'a Fragments = self.fragments;
        for selection in selections {
            if selection.include_skip().should_skip(self.variables) {
                continue;
            }
            match selection {
                Selection::Field(field) => fields
                    .entry(field.response_key().to_string())
                    .or_default()
                    .push(field),
                Selection::InlineFragment {
                    type_condition,
                    selection_set,
                    ..
                } => {
                    let applies = type_condition.as_deref().is_none_or(|type_condition| {
                        self.schema.fragment_applies_to(object_type, type_condition)
                    });
                    if applies {
                        self.collect_fields_into(object_type, selection_set, fields, visited_fragments);
                    }
                }
                Selection::FragmentSpread { name, .. } => {
                    if !visited_fragments.insert(name.as_str()) {
                        continue;
                    }
                    let Some(fragment) = fragments.get(name) else {
                        continue;
                    };
                    if self
                        .schema
                        .fragment_applies_to(object_type, &fragment.type_condition)
                    {
                        self.collect_fields_into(
                            object_type,
                            &fragment.selection_set,
                            fields,
                            visited_fragments,
                        );
                    }
                }
            }
        }
    }

    /// Spec: https://spec.graphql.org/October2021/#ExecuteField()
    fn execute_field<'b>(
        &'b self,
        path: Path,
        object_type: &'a ObjectType,
        parent: &'b Value,
        fields: Vec<&'a Field>,
    ) -> BoxFuture<'b, Completion<Value>> {
        async move {
            let Some(field) = fields.first().copied() else {
                return (Ok(Value::Null), Vec::new());
            };
            if field.name == TYPENAME {
                return (Ok(Value::String(object_type.name().to_string())), Vec::new());
            }
            let Ok(definition) = self.schema.field(object_type.name(), &field.name) else {
                let error = FieldError::UnknownField {
                    parent: object_type.name().to_string(),
                    field: field.name.clone(),
                };
                return (
                    Ok(Value::Null),
                    vec![error.to_graphql_error(Some(path), field.locations())],
                );
            };

            let resolved = match &definition.resolver {
                Some(resolver) => {
                    let arguments =
                        match self.argument_values(object_type.name(), definition, field) {
                            Ok(arguments) => arguments,
                            Err(error) => {
                                return field_failure(definition.ty(), path, field, error.into());
                            }
                        };
                    let context = ResolverContext {
                        schema: self.schema,
                        parent_type: object_type.name(),
                        field_name: &field.name,
                        parent,
                        arguments: &arguments,
                    };
                    match invoke(resolver.as_ref(), context, self.resolver_timeout).await {
                        Ok(value) => value.unwrap_or_default(),
                        Err(error) => {
                            return field_failure(definition.ty(), path, field, error.into());
                        }
                    }
                }
                // Default resolution: the property of the same name on the parent
                None => parent
                    .get(field.name.as_str())
                    .cloned()
                    .unwrap_or_default(),
            };

            let (result, errors) = self
                .complete_value(path, object_type, &fields, definition.ty(), resolved)
                .await;
            (try_nullify(definition.ty(), result), errors)
        }
        .boxed()
    }

    fn argument_values(
        &self,
        parent_type: &str,
        definition: &FieldDefinition,
        field: &Field,
    ) -> Result<Object, ArgumentValidationError> {
        let mut provided = Object::new();
        for argument in &field.arguments {
            // An argument bound to an absent variable counts as not provided
            if let apollo_compiler::ast::Value::Variable(variable) = argument.value.as_ref() {
                if !self.variables.contains_key(variable.as_str()) {
                    continue;
                }
            }
            provided.insert(
                argument.name.to_string(),
                value_to_json(&argument.value, self.variables),
            );
        }
        coerce_arguments(self.schema, parent_type, definition, &provided)
    }

    /// Spec: https://spec.graphql.org/October2021/#CompleteValue()
    fn complete_value<'b>(
        &'b self,
        path: Path,
        parent_type: &'a ObjectType,
        fields: &'b [&'a Field],
        ty: &'a FieldType,
        value: Value,
    ) -> BoxFuture<'b, Completion<Value>> {
        async move {
            let Some(field) = fields.first().copied() else {
                return (Ok(Value::Null), Vec::new());
            };
            let fail = |error: FieldError, path: Path| -> Completion<Value> {
                (
                    Err(PropagateNull),
                    vec![error.to_graphql_error(Some(path), field.locations())],
                )
            };

            if value.is_null() {
                if ty.is_non_null() {
                    return fail(
                        FieldError::NonNullViolation {
                            parent: parent_type.name().to_string(),
                            field: field.name.clone(),
                        },
                        path,
                    );
                }
                return (Ok(Value::Null), Vec::new());
            }

            match ty.nullable() {
                FieldType::NonNull(inner) => {
                    self.complete_value(path, parent_type, fields, inner, value)
                        .await
                }
                FieldType::List(inner) => {
                    let Value::Array(items) = value else {
                        return fail(
                            FieldError::NotAList {
                                parent: parent_type.name().to_string(),
                                field: field.name.clone(),
                                found: value.json_type_name(),
                            },
                            path,
                        );
                    };
                    let completions = join_all(items.into_iter().enumerate().map(|(index, item)| {
                        self.complete_value(path.join(index), parent_type, fields, inner, item)
                    }))
                    .await;

                    let mut list = Vec::with_capacity(completions.len());
                    let mut errors = Vec::new();
                    let mut nulled = false;
                    for (result, item_errors) in completions {
                        errors.extend(item_errors);
                        // On field error, try to nullify that item
                        match try_nullify(inner, result) {
                            Ok(item) => list.push(item),
                            // If the item is non-null, the list itself is nulled
                            Err(PropagateNull) => nulled = true,
                        }
                    }
                    if nulled {
                        (Err(PropagateNull), errors)
                    } else {
                        (Ok(Value::Array(list)), errors)
                    }
                }
                FieldType::Named(type_name) => match self.schema.get(type_name) {
                    Some(TypeDefinition::Scalar(scalar)) => match scalar.serialize(&value) {
                        Ok(value) => (Ok(value), Vec::new()),
                        Err(error) => fail(
                            FieldError::Serialization {
                                ty: type_name.clone(),
                                reason: error.to_string(),
                            },
                            path,
                        ),
                    },
                    Some(TypeDefinition::Enum(enum_type)) => {
                        if value.as_str().is_some_and(|value| enum_type.contains(value)) {
                            (Ok(value), Vec::new())
                        } else {
                            fail(
                                FieldError::Serialization {
                                    ty: type_name.clone(),
                                    reason: format!("{value} is not one of its values"),
                                },
                                path,
                            )
                        }
                    }
                    Some(TypeDefinition::Object(object_type)) => {
                        self.complete_object(path, object_type, fields, value).await
                    }
                    Some(TypeDefinition::Interface(_)) => {
                        match self.schema.resolve_interface_type(type_name, &value) {
                            Ok(object_type) => {
                                self.complete_object(path, object_type, fields, value).await
                            }
                            Err(error) => fail(error, path),
                        }
                    }
                    None => fail(
                        FieldError::Serialization {
                            ty: type_name.clone(),
                            reason: "the type is not registered".to_string(),
                        },
                        path,
                    ),
                },
            }
        }
        .boxed()
    }

    async fn complete_object(
        &self,
        path: Path,
        object_type: &'a ObjectType,
        fields: &[&'a Field],
        value: Value,
    ) -> Completion<Value> {
        if !value.is_object() {
            let error = FieldError::Serialization {
                ty: object_type.name().to_string(),
                reason: format!("expected an object, got a(n) {}", value.json_type_name()),
            };
            let locations = fields.first().map(|f| f.locations()).unwrap_or_default();
            return (
                Err(PropagateNull),
                vec![error.to_graphql_error(Some(path), locations)],
            );
        }
        // Sub-selections of every field sharing this response key are merged
        let selection_sets = fields
            .iter()
            .map(|field| field.selection_set.as_slice())
            .collect();
        let (result, errors) = self
            .execute_selection_set(path, object_type, &value, selection_sets)
            .await;
        (result.map(Value::Object), errors)
    }
}

fn field_failure(
    ty: &FieldType,
    path: Path,
    field: &Field,
    error: FieldError,
) -> Completion<Value> {
    tracing::debug!(%path, %error, "field failed");
    (
        try_nullify(ty, Err(PropagateNull)),
        vec![error.to_graphql_error(Some(path), field.locations())],
    )
}

#[cfg(test)]
mod tests;
