use std::collections::HashMap;

use apollo_compiler::ast;

use crate::spec::Selection;
use crate::spec::SpecError;
use crate::spec::selection::location;

#[derive(Debug, Default, Clone)]
pub(crate) struct Fragments {
    map: HashMap<String, Fragment>,
}

#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub(crate) type_condition: String,
    pub(crate) selection_set: Vec<Selection>,
}

impl Fragments {
    pub(crate) fn from_ast(document: &ast::Document) -> Result<Self, SpecError> {
        let mut map = HashMap::new();
        for definition in &document.definitions {
            // Spec: https://spec.graphql.org/October2021/#FragmentDefinition
            let ast::Definition::FragmentDefinition(fragment) = definition else {
                continue;
            };
            let previous = map.insert(
                fragment.name.to_string(),
                Fragment {
                    type_condition: fragment.type_condition.to_string(),
                    selection_set: Selection::from_ast_set(
                        &fragment.selection_set,
                        &document.sources,
                    ),
                },
            );
            if previous.is_some() {
                return Err(SpecError::validation(
                    format!(r#"There can be only one fragment named "{}"."#, fragment.name),
                    location(fragment, &document.sources),
                ));
            }
        }
        Ok(Fragments { map })
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Fragment> {
        self.map.get(key)
    }
}
