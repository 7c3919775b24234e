//! The type registry.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use derivative::Derivative;
use indexmap::IndexMap;

use super::FieldType;
use super::ScalarType;
use super::scalar::builtin_scalars;
use crate::error::FieldError;
use crate::error::SchemaError;
use crate::execution::Resolver;
use crate::introspection;
use crate::json_ext::Value;

/// The data property that names the concrete type of a value returned for an interface.
pub const DISCRIMINATOR: &str = "type";

pub(crate) const QUERY_TYPE: &str = "Query";
pub(crate) const TYPENAME: &str = "__typename";
pub(crate) const SCHEMA_FIELD: &str = "__schema";
pub(crate) const TYPE_FIELD: &str = "__type";

/// An argument accepted by a field.
#[derive(Debug, Clone)]
pub struct ArgumentDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) ty: FieldType,
    pub(crate) default_value: Option<Value>,
}

#[buildstructor::buildstructor]
impl ArgumentDefinition {
    #[builder(visibility = "pub")]
    fn new(
        name: String,
        description: Option<String>,
        ty: FieldType,
        default_value: Option<Value>,
    ) -> Self {
        Self {
            name,
            description,
            ty,
            default_value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// A non-null argument without a default value must be provided.
    pub fn is_required(&self) -> bool {
        self.ty.is_non_null() && self.default_value.is_none()
    }
}

/// A field of an object or interface type.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct FieldDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) ty: FieldType,
    pub(crate) arguments: IndexMap<String, ArgumentDefinition>,
    #[derivative(Debug = "ignore")]
    pub(crate) resolver: Option<Arc<dyn Resolver>>,
}

#[buildstructor::buildstructor]
impl FieldDefinition {
    #[builder(visibility = "pub")]
    fn new(
        name: String,
        description: Option<String>,
        ty: FieldType,
        arguments: Vec<ArgumentDefinition>,
    ) -> Self {
        Self {
            name,
            description,
            ty,
            arguments: arguments
                .into_iter()
                .map(|argument| (argument.name.clone(), argument))
                .collect(),
            resolver: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.arguments.get(name)
    }

    pub fn arguments(&self) -> impl Iterator<Item = &ArgumentDefinition> {
        self.arguments.values()
    }

    pub(crate) fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// A concrete type with its own fields.
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) fields: IndexMap<String, FieldDefinition>,
}

#[buildstructor::buildstructor]
impl ObjectType {
    #[builder(visibility = "pub")]
    fn new(
        name: String,
        description: Option<String>,
        interfaces: Vec<String>,
        fields: Vec<FieldDefinition>,
    ) -> Self {
        Self {
            name,
            description,
            interfaces,
            fields: fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|name| name == interface)
    }
}

/// A field contract shared by several object types.
#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) fields: IndexMap<String, FieldDefinition>,
    /// Filled in by [`SchemaBuilder::build`].
    pub(crate) possible_types: Vec<String>,
}

#[buildstructor::buildstructor]
impl InterfaceType {
    #[builder(visibility = "pub")]
    fn new(name: String, description: Option<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name,
            description,
            fields: fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
            possible_types: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn possible_types(&self) -> &[String] {
        &self.possible_types
    }

    /// Picks the implementing object type named by the `type` property of `data`.
    ///
    /// Matching is exact string equality against the names of the object types
    /// implementing this interface.
    pub fn discriminate<'s>(&self, schema: &'s Schema, data: &Value) -> TypeResolution<'s> {
        let Some(tag) = data.get(DISCRIMINATOR).and_then(Value::as_str) else {
            return TypeResolution::Unresolvable;
        };
        if !self.possible_types.iter().any(|name| name == tag) {
            return TypeResolution::Unresolvable;
        }
        match schema.object(tag) {
            Some(object) => TypeResolution::Object(object),
            None => TypeResolution::Unresolvable,
        }
    }
}

/// Result of discriminating an interface value.
#[derive(Debug, Clone, Copy)]
pub enum TypeResolution<'s> {
    Object(&'s ObjectType),
    Unresolvable,
}

#[derive(Debug, Clone)]
pub struct EnumValueDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
}

/// An enumeration of string values.
#[derive(Debug, Clone)]
pub struct EnumType {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) values: IndexMap<String, EnumValueDefinition>,
}

#[buildstructor::buildstructor]
impl EnumType {
    #[builder(visibility = "pub")]
    fn new(name: String, description: Option<String>, values: Vec<String>) -> Self {
        Self {
            name,
            description,
            values: values
                .into_iter()
                .map(|value| {
                    (
                        value.clone(),
                        EnumValueDefinition {
                            name: value,
                            description: None,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains_key(value)
    }
}

/// Any named type the registry can hold.
#[derive(Debug, Clone)]
pub enum TypeDefinition {
    Scalar(ScalarType),
    Enum(EnumType),
    Interface(InterfaceType),
    Object(ObjectType),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Scalar(ty) => &ty.name,
            TypeDefinition::Enum(ty) => &ty.name,
            TypeDefinition::Interface(ty) => &ty.name,
            TypeDefinition::Object(ty) => &ty.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TypeDefinition::Scalar(ty) => ty.description.as_deref(),
            TypeDefinition::Enum(ty) => ty.description.as_deref(),
            TypeDefinition::Interface(ty) => ty.description.as_deref(),
            TypeDefinition::Object(ty) => ty.description.as_deref(),
        }
    }

    /// Scalars and enums: types with no sub-selection.
    pub fn is_leaf(&self) -> bool {
        matches!(self, TypeDefinition::Scalar(_) | TypeDefinition::Enum(_))
    }

    pub fn is_composite(&self) -> bool {
        !self.is_leaf()
    }

    /// Types that can be used for arguments and variables.
    pub fn is_input(&self) -> bool {
        self.is_leaf()
    }

    pub(crate) fn fields(&self) -> Option<&IndexMap<String, FieldDefinition>> {
        match self {
            TypeDefinition::Interface(ty) => Some(&ty.fields),
            TypeDefinition::Object(ty) => Some(&ty.fields),
            TypeDefinition::Scalar(_) | TypeDefinition::Enum(_) => None,
        }
    }

    fn fields_mut(&mut self) -> Option<&mut IndexMap<String, FieldDefinition>> {
        match self {
            TypeDefinition::Interface(ty) => Some(&mut ty.fields),
            TypeDefinition::Object(ty) => Some(&mut ty.fields),
            TypeDefinition::Scalar(_) | TypeDefinition::Enum(_) => None,
        }
    }

    fn is_meta(&self) -> bool {
        self.name().starts_with("__")
    }
}

impl From<ScalarType> for TypeDefinition {
    fn from(ty: ScalarType) -> Self {
        TypeDefinition::Scalar(ty)
    }
}

impl From<EnumType> for TypeDefinition {
    fn from(ty: EnumType) -> Self {
        TypeDefinition::Enum(ty)
    }
}

impl From<InterfaceType> for TypeDefinition {
    fn from(ty: InterfaceType) -> Self {
        TypeDefinition::Interface(ty)
    }
}

impl From<ObjectType> for TypeDefinition {
    fn from(ty: ObjectType) -> Self {
        TypeDefinition::Object(ty)
    }
}

/// First phase of schema construction.
///
/// Types may reference each other (or themselves) by name in any order. Names
/// are only checked in [`SchemaBuilder::build`], once every type is registered.
#[derive(Debug)]
pub struct SchemaBuilder {
    types: IndexMap<String, TypeDefinition>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// A builder holding the built-in scalars and the introspection types.
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        for scalar in builtin_scalars() {
            types.insert(scalar.name.clone(), TypeDefinition::Scalar(scalar));
        }
        for ty in introspection::meta_types() {
            types.insert(ty.name().to_string(), ty);
        }
        Self { types }
    }

    pub fn register_type(
        &mut self,
        descriptor: impl Into<TypeDefinition>,
    ) -> Result<&mut Self, SchemaError> {
        let descriptor = descriptor.into();
        let name = descriptor.name().to_string();
        if self.types.contains_key(&name) {
            return Err(SchemaError::DuplicateType(name));
        }
        tracing::trace!(type_name = %name, "registered type");
        self.types.insert(name, descriptor);
        Ok(self)
    }

    /// Binds `resolver` to `type_name.field_name`, replacing property lookup on the parent value.
    pub fn bind_resolver(
        &mut self,
        type_name: &str,
        field_name: &str,
        resolver: Arc<dyn Resolver>,
    ) -> Result<&mut Self, SchemaError> {
        let ty = self
            .types
            .get_mut(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: format!("resolver binding for '{type_name}.{field_name}'"),
            })?;
        let field = ty
            .fields_mut()
            .and_then(|fields| fields.get_mut(field_name))
            .ok_or_else(|| SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: field_name.to_string(),
            })?;
        field.resolver = Some(resolver);
        Ok(self)
    }

    /// Second phase: checks every reference and closes the registry.
    pub fn build(mut self) -> Result<Schema, SchemaError> {
        self.check_references()?;

        let mut possible_types: IndexMap<String, Vec<String>> = IndexMap::new();
        for ty in self.types.values() {
            if let TypeDefinition::Object(object) = ty {
                for interface_name in &object.interfaces {
                    let interface = match self.types.get(interface_name) {
                        Some(TypeDefinition::Interface(interface)) => interface,
                        Some(_) => {
                            return Err(SchemaError::InterfaceConformance {
                                object: object.name.clone(),
                                interface: interface_name.clone(),
                                reason: "it is not an interface type".to_string(),
                            });
                        }
                        None => {
                            return Err(SchemaError::UnknownType {
                                name: interface_name.clone(),
                                referenced_by: format!("'{}' implements clause", object.name),
                            });
                        }
                    };
                    check_conformance(&self.types, object, interface)?;
                    possible_types
                        .entry(interface_name.clone())
                        .or_default()
                        .push(object.name.clone());
                }
            }
        }
        for (interface_name, objects) in possible_types {
            if let Some(TypeDefinition::Interface(interface)) = self.types.get_mut(&interface_name)
            {
                interface.possible_types = objects;
            }
        }

        match self.types.get(QUERY_TYPE) {
            Some(TypeDefinition::Object(query)) => {
                if let Some(field) = query.fields.values().find(|field| field.resolver.is_none())
                {
                    return Err(SchemaError::MissingResolver(field.name.clone()));
                }
            }
            _ => return Err(SchemaError::MissingQueryType),
        }

        tracing::debug!(types = self.types.len(), "schema built");
        Ok(Schema {
            types: self.types,
            meta_fields: MetaFields::new(),
        })
    }

    fn check_references(&self) -> Result<(), SchemaError> {
        for ty in self.types.values() {
            let Some(fields) = ty.fields() else {
                continue;
            };
            for field in fields.values() {
                let location = format!("field '{}.{}'", ty.name(), field.name);
                self.check_type_reference(&field.ty, &location, false)?;
                for argument in field.arguments.values() {
                    let location = format!(
                        "argument '{}.{}({}:)'",
                        ty.name(),
                        field.name,
                        argument.name
                    );
                    self.check_type_reference(&argument.ty, &location, true)?;
                }
            }
        }
        Ok(())
    }

    fn check_type_reference(
        &self,
        ty: &FieldType,
        location: &str,
        input: bool,
    ) -> Result<(), SchemaError> {
        let definition =
            self.types
                .get(ty.inner_type_name())
                .ok_or_else(|| SchemaError::UnknownType {
                    name: ty.inner_type_name().to_string(),
                    referenced_by: location.to_string(),
                })?;
        if input && !definition.is_input() {
            return Err(SchemaError::InvalidFieldType {
                location: location.to_string(),
                ty: ty.to_string(),
                expected: "an input type",
            });
        }
        Ok(())
    }
}

fn check_conformance(
    types: &IndexMap<String, TypeDefinition>,
    object: &ObjectType,
    interface: &InterfaceType,
) -> Result<(), SchemaError> {
    let fail = |reason: String| SchemaError::InterfaceConformance {
        object: object.name.clone(),
        interface: interface.name.clone(),
        reason,
    };
    for interface_field in interface.fields.values() {
        let Some(object_field) = object.fields.get(&interface_field.name) else {
            return Err(fail(format!("missing field '{}'", interface_field.name)));
        };
        if !is_subtype(types, &object_field.ty, &interface_field.ty) {
            return Err(fail(format!(
                "field '{}' has type '{}', which is not a subtype of '{}'",
                interface_field.name, object_field.ty, interface_field.ty
            )));
        }
        for interface_argument in interface_field.arguments.values() {
            match object_field.arguments.get(&interface_argument.name) {
                Some(argument) if argument.ty == interface_argument.ty => {}
                Some(argument) => {
                    return Err(fail(format!(
                        "argument '{}.{}' has type '{}', expected '{}'",
                        interface_field.name,
                        argument.name,
                        argument.ty,
                        interface_argument.ty
                    )));
                }
                None => {
                    return Err(fail(format!(
                        "field '{}' is missing argument '{}'",
                        interface_field.name, interface_argument.name
                    )));
                }
            }
        }
        // Extra arguments on the object field must stay optional
        for argument in object_field.arguments.values() {
            if !interface_field.arguments.contains_key(&argument.name) && argument.is_required() {
                return Err(fail(format!(
                    "field '{}' adds required argument '{}'",
                    interface_field.name, argument.name
                )));
            }
        }
    }
    Ok(())
}

/// Whether a value of type `sub` may appear where `sup` is declared.
fn is_subtype(types: &IndexMap<String, TypeDefinition>, sub: &FieldType, sup: &FieldType) -> bool {
    match (sub, sup) {
        (FieldType::NonNull(sub), FieldType::NonNull(sup)) => is_subtype(types, sub, sup),
        (_, FieldType::NonNull(_)) => false,
        (FieldType::NonNull(sub), sup) => is_subtype(types, sub, sup),
        (FieldType::List(sub), FieldType::List(sup)) => is_subtype(types, sub, sup),
        (FieldType::Named(sub), FieldType::Named(sup)) => {
            sub == sup
                || matches!(
                    types.get(sub),
                    Some(TypeDefinition::Object(object)) if object.implements(sup)
                )
        }
        _ => false,
    }
}

/// Definitions of the fields every schema answers without declaring them.
#[derive(Debug, Clone)]
struct MetaFields {
    typename: FieldDefinition,
    schema: FieldDefinition,
    ty: FieldDefinition,
}

impl MetaFields {
    fn new() -> Self {
        Self {
            typename: FieldDefinition::builder()
                .name(TYPENAME)
                .description("The name of the current Object type at runtime.")
                .ty(FieldType::named("String").non_null())
                .build(),
            schema: introspection::schema_field(),
            ty: introspection::type_field(),
        }
    }
}

/// The closed, immutable type registry.
#[derive(Debug, Clone)]
pub struct Schema {
    types: IndexMap<String, TypeDefinition>,
    meta_fields: MetaFields,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        match self.types.get(name) {
            Some(TypeDefinition::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceType> {
        match self.types.get(name) {
            Some(TypeDefinition::Interface(interface)) => Some(interface),
            _ => None,
        }
    }

    pub fn query_type(&self) -> Option<&ObjectType> {
        self.object(QUERY_TYPE)
    }

    /// Field lookup including the meta fields (`__typename` everywhere,
    /// `__schema` and `__type` on the query root).
    pub fn field(&self, type_name: &str, field_name: &str) -> Result<&FieldDefinition, SchemaError> {
        let ty = self
            .types
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: format!("lookup of field '{field_name}'"),
            })?;
        let unknown_field = || SchemaError::UnknownField {
            type_name: type_name.to_string(),
            field: field_name.to_string(),
        };
        let fields = ty.fields().ok_or_else(unknown_field)?;
        match field_name {
            TYPENAME => Ok(&self.meta_fields.typename),
            SCHEMA_FIELD if type_name == QUERY_TYPE => Ok(&self.meta_fields.schema),
            TYPE_FIELD if type_name == QUERY_TYPE => Ok(&self.meta_fields.ty),
            _ => fields.get(field_name).ok_or_else(unknown_field),
        }
    }

    /// Returns the declared type of `type_name.field_name`.
    pub fn resolve_field_type(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Result<&FieldType, SchemaError> {
        self.field(type_name, field_name).map(FieldDefinition::ty)
    }

    /// Applies the discriminator of `interface_name` to `data`.
    pub fn resolve_interface_type(
        &self,
        interface_name: &str,
        data: &Value,
    ) -> Result<&ObjectType, FieldError> {
        let unresolvable = || FieldError::UnresolvableType {
            interface: interface_name.to_string(),
            tag: match data.get(DISCRIMINATOR) {
                Some(Value::String(tag)) => tag.clone(),
                Some(other) => other.to_string(),
                None => "null".to_string(),
            },
        };
        let interface = self.interface(interface_name).ok_or_else(unresolvable)?;
        match interface.discriminate(self, data) {
            TypeResolution::Object(object) => Ok(object),
            TypeResolution::Unresolvable => Err(unresolvable()),
        }
    }

    /// Object types a value of `type_name` may have at runtime.
    pub(crate) fn possible_types(&self, type_name: &str) -> Vec<&str> {
        match self.types.get(type_name) {
            Some(TypeDefinition::Object(object)) => vec![object.name.as_str()],
            Some(TypeDefinition::Interface(interface)) => {
                interface.possible_types.iter().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Whether a fragment with `type_condition` can apply to values of `parent_type`.
    pub(crate) fn fragment_can_apply(&self, parent_type: &str, type_condition: &str) -> bool {
        let parent: HashSet<&str> = self.possible_types(parent_type).into_iter().collect();
        self.possible_types(type_condition)
            .into_iter()
            .any(|name| parent.contains(name))
    }

    /// Whether a fragment with `type_condition` applies to a value of `object`.
    pub(crate) fn fragment_applies_to(&self, object: &ObjectType, type_condition: &str) -> bool {
        object.name == type_condition || object.implements(type_condition)
    }

    /// Prints the user-declared part of the schema as SDL.
    pub fn to_sdl(&self) -> String {
        let mut sdl = String::new();
        let declared = self
            .types
            .values()
            .filter(|ty| !ty.is_meta())
            .filter(|ty| !matches!(ty, TypeDefinition::Scalar(scalar) if scalar.is_builtin()));
        for ty in declared {
            if !sdl.is_empty() {
                sdl.push('\n');
            }
            write_description(&mut sdl, ty.description(), "");
            match ty {
                TypeDefinition::Scalar(scalar) => {
                    let _ = write!(sdl, "scalar {}", scalar.name);
                    if let Some(url) = &scalar.specified_by_url {
                        let _ = write!(sdl, " @specifiedBy(url: {})", quote(url));
                    }
                    sdl.push('\n');
                }
                TypeDefinition::Enum(enum_type) => {
                    let _ = writeln!(sdl, "enum {} {{", enum_type.name);
                    for value in enum_type.values.values() {
                        write_description(&mut sdl, value.description.as_deref(), "  ");
                        let _ = writeln!(sdl, "  {}", value.name);
                    }
                    sdl.push_str("}\n");
                }
                TypeDefinition::Interface(interface) => {
                    let _ = writeln!(sdl, "interface {} {{", interface.name);
                    write_fields(&mut sdl, &interface.fields);
                    sdl.push_str("}\n");
                }
                TypeDefinition::Object(object) => {
                    let _ = write!(sdl, "type {}", object.name);
                    if !object.interfaces.is_empty() {
                        let _ = write!(sdl, " implements {}", object.interfaces.join(" & "));
                    }
                    sdl.push_str(" {\n");
                    write_fields(&mut sdl, &object.fields);
                    sdl.push_str("}\n");
                }
            }
        }
        sdl
    }
}

fn write_fields(sdl: &mut String, fields: &IndexMap<String, FieldDefinition>) {
    for field in fields.values() {
        write_description(sdl, field.description.as_deref(), "  ");
        let _ = write!(sdl, "  {}", field.name);
        if !field.arguments.is_empty() {
            let arguments = field
                .arguments
                .values()
                .map(|argument| match &argument.default_value {
                    Some(default) => format!("{}: {} = {default}", argument.name, argument.ty),
                    None => format!("{}: {}", argument.name, argument.ty),
                })
                .collect::<Vec<_>>();
            let _ = write!(sdl, "({})", arguments.join(", "));
        }
        let _ = writeln!(sdl, ": {}", field.ty);
    }
}

fn write_description(sdl: &mut String, description: Option<&str>, indent: &str) {
    if let Some(description) = description {
        if description.contains('\n') || description.contains('"') {
            let _ = writeln!(sdl, "{indent}\"\"\"");
            for line in description.lines() {
                let _ = writeln!(sdl, "{indent}{line}");
            }
            let _ = writeln!(sdl, "{indent}\"\"\"");
        } else {
            let _ = writeln!(sdl, "{indent}\"{description}\"");
        }
    }
}

fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}
