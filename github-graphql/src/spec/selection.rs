use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::parser::SourceMap;

use crate::graphql::Location;
use crate::json_ext::Object;

/// A field selection with everything execution needs from the document.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) arguments: Vec<Node<ast::Argument>>,
    pub(crate) selection_set: Vec<Selection>,
    pub(crate) include_skip: IncludeSkip,
    pub(crate) location: Option<Location>,
}

impl Field {
    /// The key of this field in the response: the alias if there is one.
    pub(crate) fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub(crate) fn locations(&self) -> Vec<Location> {
        self.location.iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Selection {
    Field(Field),
    InlineFragment {
        type_condition: Option<String>,
        include_skip: IncludeSkip,
        selection_set: Vec<Selection>,
        location: Option<Location>,
    },
    FragmentSpread {
        name: String,
        include_skip: IncludeSkip,
        location: Option<Location>,
    },
}

impl Selection {
    pub(crate) fn from_ast(selection: &ast::Selection, sources: &SourceMap) -> Self {
        match selection {
            // Spec: https://spec.graphql.org/October2021/#Field
            ast::Selection::Field(field) => Selection::Field(Field {
                name: field.name.to_string(),
                alias: field.alias.as_ref().map(|alias| alias.to_string()),
                arguments: field.arguments.clone(),
                selection_set: Self::from_ast_set(&field.selection_set, sources),
                include_skip: IncludeSkip::parse(&field.directives),
                location: location(field, sources),
            }),
            // Spec: https://spec.graphql.org/October2021/#InlineFragment
            ast::Selection::InlineFragment(fragment) => Selection::InlineFragment {
                type_condition: fragment.type_condition.as_ref().map(|ty| ty.to_string()),
                include_skip: IncludeSkip::parse(&fragment.directives),
                selection_set: Self::from_ast_set(&fragment.selection_set, sources),
                location: location(fragment, sources),
            },
            // Spec: https://spec.graphql.org/October2021/#FragmentSpread
            ast::Selection::FragmentSpread(spread) => Selection::FragmentSpread {
                name: spread.fragment_name.to_string(),
                include_skip: IncludeSkip::parse(&spread.directives),
                location: location(spread, sources),
            },
        }
    }

    pub(crate) fn from_ast_set(selections: &[ast::Selection], sources: &SourceMap) -> Vec<Self> {
        selections
            .iter()
            .map(|selection| Self::from_ast(selection, sources))
            .collect()
    }

    pub(crate) fn include_skip(&self) -> &IncludeSkip {
        match self {
            Selection::Field(field) => &field.include_skip,
            Selection::InlineFragment { include_skip, .. }
            | Selection::FragmentSpread { include_skip, .. } => include_skip,
        }
    }
}

pub(crate) fn location<T>(node: &Node<T>, sources: &SourceMap) -> Option<Location> {
    node.line_column_range(sources).map(|range| Location {
        line: range.start.line as u32,
        column: range.start.column as u32,
    })
}

/// The `@include` and `@skip` conditions of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(String),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &ast::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in directives.iter() {
            if include.is_none() && directive.name == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn should_skip(&self, variables: &Object) -> bool {
        // Variables are coerced before execution, so a missing value can only
        // come from an optional variable without a default
        self.skip.eval(variables).unwrap_or(false) || !self.include.eval(variables).unwrap_or(true)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &ast::Directive) -> Option<Self> {
        match directive.specified_argument_by_name("if")?.as_ref() {
            ast::Value::Boolean(true) => Some(Condition::Yes),
            ast::Value::Boolean(false) => Some(Condition::No),
            ast::Value::Variable(variable) => Some(Condition::Variable(variable.to_string())),
            _ => None,
        }
    }

    pub(crate) fn eval(&self, variables: &Object) -> Option<bool> {
        match self {
            Condition::Yes => Some(true),
            Condition::No => Some(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|v| v.as_bool()),
        }
    }
}
