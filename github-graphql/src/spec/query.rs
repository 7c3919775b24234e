//! Query parsing, validation and input coercion.
//!
//! A [`Query`] only exists once the document is known to be executable
//! against the schema: every failure is reported before any resolver runs.

use std::collections::HashMap;

use apollo_compiler::Node;
use apollo_compiler::ast;
use indexmap::IndexMap;

use crate::error::ArgumentValidationError;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldDefinition;
use crate::spec::FieldType;
use crate::spec::Fragments;
use crate::spec::QUERY_TYPE;
use crate::spec::SCHEMA_FIELD;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;
use crate::spec::TYPE_FIELD;
use crate::spec::TYPENAME;
use crate::spec::TypeDefinition;
use crate::spec::selection::Field;
use crate::spec::selection::location;

/// Limits applied while validating a query.
#[derive(Debug, Clone)]
pub(crate) struct QueryOptions {
    pub(crate) max_depth: usize,
    pub(crate) introspection: bool,
}

/// A parsed and validated query operation.
#[derive(Debug, Clone)]
pub(crate) struct Query {
    pub(crate) operation: Operation,
    pub(crate) fragments: Fragments,
}

#[derive(Debug, Clone)]
pub(crate) struct Operation {
    pub(crate) name: Option<String>,
    pub(crate) variables: IndexMap<String, Variable>,
    pub(crate) selection_set: Vec<Selection>,
}

#[derive(Debug, Clone)]
pub(crate) struct Variable {
    pub(crate) ty: FieldType,
    pub(crate) default_value: Option<Value>,
    pub(crate) location: Option<Location>,
}

impl Query {
    pub(crate) fn parse(
        query: &str,
        operation_name: Option<&str>,
        schema: &Schema,
        options: &QueryOptions,
    ) -> Result<Self, Vec<SpecError>> {
        let document = ast::Document::parse(query, "query.graphql").map_err(|invalid| {
            invalid
                .errors
                .iter()
                .map(|diagnostic| SpecError::ParsingError {
                    message: diagnostic.error.to_string(),
                    locations: diagnostic
                        .line_column_range()
                        .map(|range| Location {
                            line: range.start.line as u32,
                            column: range.start.column as u32,
                        })
                        .into_iter()
                        .collect(),
                })
                .collect::<Vec<_>>()
        })?;

        let operation = select_operation(&document, operation_name).map_err(|e| vec![e])?;
        match operation.operation_type {
            ast::OperationType::Query => {}
            ast::OperationType::Mutation => {
                return Err(vec![SpecError::UnsupportedOperation(
                    "mutation".to_string(),
                )]);
            }
            ast::OperationType::Subscription => {
                return Err(vec![SpecError::UnsupportedOperation(
                    "subscription".to_string(),
                )]);
            }
        }

        let fragments = Fragments::from_ast(&document).map_err(|e| vec![e])?;
        let mut errors = Vec::new();
        let mut variables = IndexMap::new();
        for definition in &operation.variables {
            let ty = FieldType::from(&*definition.ty);
            let variable_location = location(definition, &document.sources);
            let is_input = schema
                .get(ty.inner_type_name())
                .is_some_and(TypeDefinition::is_input);
            if !is_input {
                errors.push(SpecError::validation(
                    format!(
                        r#"Variable "${}" cannot be non-input type "{ty}"."#,
                        definition.name
                    ),
                    variable_location.clone(),
                ));
            }
            // Spec: https://spec.graphql.org/October2021/#sec-Values-of-Correct-Type
            let default_value = match &definition.default_value {
                Some(value) if is_input => match coerce_literal(schema, &ty, value) {
                    Ok(value) => Some(value),
                    Err(reason) => {
                        errors.push(SpecError::InvalidVariable {
                            name: definition.name.to_string(),
                            reason: format!("has invalid default value {value}; {reason}"),
                            locations: variable_location.iter().cloned().collect(),
                        });
                        None
                    }
                },
                _ => None,
            };
            let previous = variables.insert(
                definition.name.to_string(),
                Variable {
                    ty,
                    default_value,
                    location: variable_location.clone(),
                },
            );
            if previous.is_some() {
                errors.push(SpecError::validation(
                    format!(
                        r#"There can be only one variable named "${}"."#,
                        definition.name
                    ),
                    variable_location,
                ));
            }
        }

        let selection_set = Selection::from_ast_set(&operation.selection_set, &document.sources);
        let mut validator = Validator {
            schema,
            fragments: &fragments,
            variables: &variables,
            options,
            errors,
            depth: 0,
            fragment_depths: HashMap::new(),
        };
        validator.validate_selection_set(QUERY_TYPE, &selection_set, 0, &mut Vec::new());
        if validator.depth > options.max_depth {
            validator.errors.push(SpecError::MaxDepthExceeded {
                depth: validator.depth,
                max_depth: options.max_depth,
            });
        }
        if !validator.errors.is_empty() {
            return Err(validator.errors);
        }

        Ok(Query {
            operation: Operation {
                name: operation.name.as_ref().map(|name| name.to_string()),
                variables,
                selection_set,
            },
            fragments,
        })
    }

    /// Coerces the request variables against the operation's variable definitions.
    ///
    /// Spec: https://spec.graphql.org/October2021/#sec-Coercing-Variable-Values
    pub(crate) fn coerce_variables(
        &self,
        schema: &Schema,
        provided: &Object,
    ) -> Result<Object, Vec<SpecError>> {
        let mut coerced = Object::new();
        let mut errors = Vec::new();
        for (name, variable) in &self.operation.variables {
            let invalid = |reason: String| SpecError::InvalidVariable {
                name: name.clone(),
                reason,
                locations: variable.location.iter().cloned().collect(),
            };
            match provided.get(name) {
                Some(value) => match coerce_input_value(schema, &variable.ty, value) {
                    Ok(value) => {
                        coerced.insert(name.clone(), value);
                    }
                    Err(reason) => errors.push(invalid(format!("got invalid value {value}; {reason}"))),
                },
                None => {
                    if let Some(default) = &variable.default_value {
                        coerced.insert(name.clone(), default.clone());
                    } else if variable.ty.is_non_null() {
                        errors.push(invalid(format!(
                            r#"of required type "{}" was not provided."#,
                            variable.ty
                        )));
                    }
                }
            }
        }
        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }
}

fn select_operation<'d>(
    document: &'d ast::Document,
    operation_name: Option<&str>,
) -> Result<&'d Node<ast::OperationDefinition>, SpecError> {
    let mut operations = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => Some(operation),
            _ => None,
        });
    match operation_name {
        Some(name) => operations
            .find(|operation| operation.name.as_ref().is_some_and(|n| n.as_str() == name))
            .ok_or_else(|| SpecError::UnknownOperation(name.to_string())),
        None => {
            let first = operations.next().ok_or(SpecError::NoOperation)?;
            if operations.next().is_some() {
                return Err(SpecError::MissingOperationName);
            }
            Ok(first)
        }
    }
}

struct Validator<'a> {
    schema: &'a Schema,
    fragments: &'a Fragments,
    variables: &'a IndexMap<String, Variable>,
    options: &'a QueryOptions,
    errors: Vec<SpecError>,
    /// Deepest field nesting seen so far.
    depth: usize,
    /// Fragments already validated, with the depth their selection set adds.
    fragment_depths: HashMap<String, usize>,
}

impl Validator<'_> {
    fn validate_selection_set(
        &mut self,
        parent_type: &str,
        selections: &[Selection],
        depth: usize,
        spread_fragments: &mut Vec<String>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    self.validate_field(parent_type, field, depth + 1, spread_fragments)
                }
                Selection::InlineFragment {
                    type_condition,
                    selection_set,
                    location,
                    ..
                } => {
                    let ty = type_condition.as_deref().unwrap_or(parent_type);
                    if self.check_type_condition(parent_type, ty, location) {
                        self.validate_selection_set(ty, selection_set, depth, spread_fragments);
                    }
                }
                Selection::FragmentSpread { name, location, .. } => {
                    let fragments = self.fragments;
                    let Some(fragment) = fragments.get(name) else {
                        self.error(format!(r#"Unknown fragment "{name}"."#), location);
                        continue;
                    };
                    if spread_fragments.contains(name) {
                        self.error(
                            format!(r#"Cannot spread fragment "{name}" within itself."#),
                            location,
                        );
                        continue;
                    }
                    if !self.check_type_condition(parent_type, &fragment.type_condition, location)
                    {
                        continue;
                    }
                    // Validated once against its own type condition
                    if let Some(fragment_depth) = self.fragment_depths.get(name).copied() {
                        self.depth = self.depth.max(depth + fragment_depth);
                        continue;
                    }
                    let outer_depth = std::mem::replace(&mut self.depth, depth);
                    spread_fragments.push(name.clone());
                    self.validate_selection_set(
                        &fragment.type_condition,
                        &fragment.selection_set,
                        depth,
                        spread_fragments,
                    );
                    spread_fragments.pop();
                    self.fragment_depths
                        .insert(name.clone(), self.depth - depth);
                    self.depth = self.depth.max(outer_depth);
                }
            }
        }
    }

    fn check_type_condition(
        &mut self,
        parent_type: &str,
        type_condition: &str,
        location: &Option<Location>,
    ) -> bool {
        match self.schema.get(type_condition) {
            None => {
                self.error(format!(r#"Unknown type "{type_condition}"."#), location);
                false
            }
            Some(ty) if !ty.is_composite() => {
                self.error(
                    format!(
                        r#"Fragment cannot condition on non composite type "{type_condition}"."#
                    ),
                    location,
                );
                false
            }
            Some(_) if !self.schema.fragment_can_apply(parent_type, type_condition) => {
                self.error(
                    format!(
                        r#"Fragment cannot be spread here as objects of type "{parent_type}" can never be of type "{type_condition}"."#
                    ),
                    location,
                );
                false
            }
            Some(_) => true,
        }
    }

    fn validate_field(
        &mut self,
        parent_type: &str,
        field: &Field,
        depth: usize,
        spread_fragments: &mut Vec<String>,
    ) {
        self.depth = self.depth.max(depth);
        if depth > self.options.max_depth {
            // Reported once by the caller
            return;
        }
        let name = field.name.as_str();
        if !self.options.introspection
            && parent_type == QUERY_TYPE
            && (name == SCHEMA_FIELD || name == TYPE_FIELD)
        {
            self.errors
                .push(SpecError::IntrospectionDisabled(name.to_string()));
            return;
        }
        let schema = self.schema;
        let Ok(definition) = schema.field(parent_type, name) else {
            self.error(
                format!(r#"Cannot query field "{name}" on type "{parent_type}"."#),
                &field.location,
            );
            return;
        };
        self.validate_arguments(parent_type, definition, field);

        let type_name = definition.ty.inner_type_name();
        let Some(ty) = schema.get(type_name) else {
            return;
        };
        if name == TYPENAME || ty.is_leaf() {
            if !field.selection_set.is_empty() {
                self.error(
                    format!(
                        r#"Field "{name}" must not have a selection since type "{}" has no subfields."#,
                        definition.ty
                    ),
                    &field.location,
                );
            }
        } else if field.selection_set.is_empty() {
            self.error(
                format!(
                    r#"Field "{name}" of type "{}" must have a selection of subfields. Did you mean "{name} {{ ... }}"?"#,
                    definition.ty
                ),
                &field.location,
            );
        } else {
            self.validate_selection_set(type_name, &field.selection_set, depth, spread_fragments);
        }
    }

    fn validate_arguments(&mut self, parent_type: &str, definition: &FieldDefinition, field: &Field) {
        let coordinate = format!("{parent_type}.{}", field.name);
        for argument in &field.arguments {
            let Some(argument_definition) = definition.argument(&argument.name) else {
                self.argument_error(
                    ArgumentValidationError::Unknown {
                        field: coordinate.clone(),
                        argument: argument.name.to_string(),
                    },
                    field,
                );
                continue;
            };
            if let ast::Value::Variable(variable_name) = argument.value.as_ref() {
                self.validate_variable_usage(
                    variable_name.as_str(),
                    &argument_definition.ty,
                    argument_definition.default_value.is_some(),
                    field,
                );
            } else if let Err(reason) =
                coerce_literal(self.schema, &argument_definition.ty, &argument.value)
            {
                self.argument_error(
                    ArgumentValidationError::Invalid {
                        field: coordinate.clone(),
                        argument: argument.name.to_string(),
                        reason,
                    },
                    field,
                );
            }
        }
        for argument_definition in definition.arguments() {
            let provided = field
                .arguments
                .iter()
                .any(|argument| argument.name.as_str() == argument_definition.name);
            if !provided && argument_definition.is_required() {
                self.argument_error(
                    ArgumentValidationError::Missing {
                        field: coordinate.clone(),
                        argument: argument_definition.name.clone(),
                        ty: argument_definition.ty.to_string(),
                    },
                    field,
                );
            }
        }
    }

    /// Spec: https://spec.graphql.org/October2021/#sec-All-Variable-Usages-are-Allowed
    fn validate_variable_usage(
        &mut self,
        variable_name: &str,
        location_type: &FieldType,
        location_has_default: bool,
        field: &Field,
    ) {
        let variables = self.variables;
        let Some(variable) = variables.get(variable_name) else {
            self.error(
                format!(r#"Variable "${variable_name}" is not defined."#),
                &field.location,
            );
            return;
        };
        let has_default = variable
            .default_value
            .as_ref()
            .is_some_and(|value| !value.is_null());
        let location_type = if location_type.is_non_null()
            && !variable.ty.is_non_null()
            && (has_default || location_has_default)
        {
            location_type.nullable()
        } else {
            location_type
        };
        if !is_input_subtype(&variable.ty, location_type) {
            self.error(
                format!(
                    r#"Variable "${variable_name}" of type "{}" used in position expecting type "{location_type}"."#,
                    variable.ty
                ),
                &field.location,
            );
        }
    }

    fn argument_error(&mut self, error: ArgumentValidationError, field: &Field) {
        self.error(error.to_string(), &field.location);
    }

    fn error(&mut self, message: String, location: &Option<Location>) {
        self.errors
            .push(SpecError::validation(message, location.clone()));
    }
}

fn is_input_subtype(sub: &FieldType, sup: &FieldType) -> bool {
    match (sub, sup) {
        (FieldType::NonNull(sub), FieldType::NonNull(sup)) => is_input_subtype(sub, sup),
        (_, FieldType::NonNull(_)) => false,
        (FieldType::NonNull(sub), sup) => is_input_subtype(sub, sup),
        (FieldType::List(sub), FieldType::List(sup)) => is_input_subtype(sub, sup),
        (FieldType::Named(sub), FieldType::Named(sup)) => sub == sup,
        _ => false,
    }
}

/// Coerces a document literal (with no variables) against an input type.
///
/// Spec: https://spec.graphql.org/October2021/#sec-Input-Values
fn coerce_literal(schema: &Schema, ty: &FieldType, value: &ast::Value) -> Result<Value, String> {
    if contains_variables(value) {
        return Ok(Value::Null);
    }
    match (ty, value) {
        (FieldType::NonNull(_), ast::Value::Null) => {
            Err(format!(r#"Expected value of non-null type "{ty}" not to be null."#))
        }
        (FieldType::NonNull(inner), value) => coerce_literal(schema, inner, value),
        (_, ast::Value::Null) => Ok(Value::Null),
        (FieldType::List(inner), ast::Value::List(items)) => items
            .iter()
            .map(|item| coerce_literal(schema, inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldType::List(inner), value) => {
            coerce_literal(schema, inner, value).map(|item| Value::Array(vec![item]))
        }
        (FieldType::Named(name), value) => match schema.get(name) {
            Some(TypeDefinition::Enum(enum_type)) => match value {
                ast::Value::Enum(value) if enum_type.contains(value.as_str()) => {
                    Ok(Value::String(value.to_string()))
                }
                _ => Err(format!(r#"Enum "{name}" cannot represent value: {value}"#)),
            },
            Some(TypeDefinition::Scalar(scalar)) => match value {
                ast::Value::Enum(_) | ast::Value::List(_) | ast::Value::Object(_) => Err(format!(
                    "{name} cannot represent a non {} value: {value}",
                    name.to_lowercase()
                )),
                value => scalar
                    .parse(&value_to_json(value, &Object::new()))
                    .map_err(|e| e.to_string()),
            },
            _ => Err(format!(r#"Type "{name}" is not an input type."#)),
        },
    }
}

fn contains_variables(value: &ast::Value) -> bool {
    match value {
        ast::Value::Variable(_) => true,
        ast::Value::List(items) => items.iter().any(|item| contains_variables(item)),
        ast::Value::Object(fields) => fields.iter().any(|(_, value)| contains_variables(value)),
        _ => false,
    }
}

/// Coerces a JSON input value (a variable or a resolved argument) against an input type.
pub(crate) fn coerce_input_value(
    schema: &Schema,
    ty: &FieldType,
    value: &Value,
) -> Result<Value, String> {
    match (ty, value) {
        (FieldType::NonNull(_), Value::Null) => {
            Err(format!(r#"Expected non-nullable type "{ty}" not to be null."#))
        }
        (FieldType::NonNull(inner), value) => coerce_input_value(schema, inner, value),
        (_, Value::Null) => Ok(Value::Null),
        (FieldType::List(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce_input_value(schema, inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldType::List(inner), value) => {
            coerce_input_value(schema, inner, value).map(|item| Value::Array(vec![item]))
        }
        (FieldType::Named(name), value) => match schema.get(name) {
            Some(TypeDefinition::Scalar(scalar)) => scalar.parse(value).map_err(|e| e.to_string()),
            Some(TypeDefinition::Enum(enum_type)) => match value.as_str() {
                Some(s) if enum_type.contains(s) => Ok(value.clone()),
                _ => Err(format!(r#"Enum "{name}" cannot represent value: {value}"#)),
            },
            _ => Err(format!(r#"Type "{name}" is not an input type."#)),
        },
    }
}

/// Converts a document value to JSON, substituting variables.
///
/// Variables missing from `variables` become `null`.
pub(crate) fn value_to_json(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::String(name.to_string()),
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or_default(),
        ast::Value::String(value) => Value::String(value.clone()),
        ast::Value::Float(value) => value
            .try_to_f64()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_default(),
        ast::Value::Int(value) => match value.try_to_i32() {
            Ok(int) => Value::from(int),
            // Out of range integers are kept so that `Int` coercion can reject them
            Err(_) => value
                .try_to_f64()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_default(),
        },
        ast::Value::Boolean(value) => Value::Bool(*value),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}
