use apollo_compiler::ast;
use serde::Deserialize;
use serde::Serialize;

/// A reference to a registered type, possibly wrapped in list and non-null modifiers.
///
/// References are by name: a field of `Topic` may point at `Topic` before the
/// registry knows anything about it. Names are checked when the schema is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
        }
    }
}

impl FieldType {
    pub fn named(name: impl Into<String>) -> Self {
        FieldType::Named(name.into())
    }

    /// Wraps this type in a non-null modifier. Already non-null types are returned unchanged.
    pub fn non_null(self) -> Self {
        match self {
            FieldType::NonNull(_) => self,
            other => FieldType::NonNull(Box::new(other)),
        }
    }

    pub fn list(self) -> Self {
        FieldType::List(Box::new(self))
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }

    /// The type with its outermost non-null modifier removed.
    pub fn nullable(&self) -> &FieldType {
        match self {
            FieldType::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl From<&ast::Type> for FieldType {
    fn from(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => FieldType::Named(name.to_string()),
            ast::Type::NonNullNamed(name) => FieldType::Named(name.to_string()).non_null(),
            ast::Type::List(inner) => FieldType::from(&**inner).list(),
            ast::Type::NonNullList(inner) => FieldType::from(&**inner).list().non_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_sdl() {
        let ty = FieldType::named("Topic").non_null().list().non_null();
        assert_eq!(ty.to_string(), "[Topic!]!");
        assert_eq!(ty.inner_type_name(), "Topic");
        assert!(ty.is_non_null());
        assert_eq!(ty.nullable().to_string(), "[Topic!]");
    }

    #[test]
    fn non_null_is_idempotent() {
        let ty = FieldType::named("ID").non_null().non_null();
        assert_eq!(ty.to_string(), "ID!");
    }

    #[test]
    fn converts_ast_types() {
        let ty = ast::Type::NonNullList(Box::new(ast::Type::NonNullNamed(
            apollo_compiler::name!("String"),
        )));
        assert_eq!(FieldType::from(&ty).to_string(), "[String!]!");
    }
}
