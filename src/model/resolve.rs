use log::debug;
use std::collections::HashMap;

use super::construct::{CrossReference, Namespaces};
use super::{ModelBackend, ObjectId, ResolvedReference, Value};
use crate::error::SemanticError;
use crate::metamodel::{ClassId, Metamodel};

struct Resolver<'m, 'n, 'b> {
    metamodel: &'m Metamodel,
    namespaces: &'n Namespaces,
    backend: &'b mut dyn ModelBackend,
    /// Builtin objects already added to the backend, by name.
    materialized: HashMap<String, ObjectId>,
}

/// Resolves every link by name. The first concrete class below the link's
/// declared class, in alternative order, that defines the name wins.
/// Builtins are the fallback.
pub(crate) fn resolve(
    metamodel: &Metamodel,
    input: &str,
    crossrefs: Vec<CrossReference>,
    namespaces: &Namespaces,
    backend: &mut dyn ModelBackend,
) -> Result<Vec<ResolvedReference>, SemanticError> {
    let mut resolver = Resolver {
        metamodel,
        namespaces,
        backend,
        materialized: HashMap::new(),
    };
    let mut resolved = Vec::with_capacity(crossrefs.len());
    for crossref in crossrefs {
        let target = match resolver.lookup(crossref.class, &crossref.name)? {
            Some(target) => target,
            None => {
                let (line, column) = grammar::line_col(input, crossref.span.start);
                return Err(SemanticError::UnresolvedReference {
                    name: crossref.name,
                    class: metamodel.get(crossref.class).name.clone(),
                    line,
                    column,
                });
            }
        };
        debug!(name = crossref.name.as_str(), attribute = crossref.attribute.as_str(); "Resolved reference");

        if crossref.many {
            resolver
                .backend
                .append_attribute(crossref.holder, &crossref.attribute, Value::Object(target));
        } else {
            resolver
                .backend
                .set_attribute(crossref.holder, &crossref.attribute, Value::Object(target));
        }
        resolved.push(ResolvedReference {
            holder: crossref.holder,
            attribute: crossref.attribute,
            name: crossref.name,
            span: crossref.span,
            target,
        });
    }
    Ok(resolved)
}

impl<'m, 'n, 'b> Resolver<'m, 'n, 'b> {
    fn lookup(&mut self, class: ClassId, name: &str) -> Result<Option<ObjectId>, SemanticError> {
        let candidates = self.metamodel.concrete_descendants(class);
        let found = candidates
            .iter()
            .find_map(|c| self.namespaces.get(c).and_then(|ns| ns.get(name)));
        if let Some(found) = found {
            return Ok(Some(*found));
        }

        let builtin = match self.metamodel.builtins.get(name) {
            Some(builtin) => builtin,
            None => return Ok(None),
        };
        let builtin_class = match self.metamodel.class(&builtin.class) {
            Some(builtin_class) if candidates.contains(&builtin_class.id) => builtin_class,
            _ => return Ok(None),
        };
        if let Some(id) = self.materialized.get(name) {
            return Ok(Some(*id));
        }

        let id = self.backend.allocate(builtin_class);
        for attribute in builtin_class.attributes.values() {
            let default = attribute.default_value(self.metamodel.auto_init);
            self.backend.set_attribute(id, &attribute.name, default);
        }
        for (attribute, value) in &builtin.attributes {
            self.backend.set_attribute(id, attribute, value.clone());
        }
        self.backend
            .initialize(id, builtin_class)
            .map_err(|source| SemanticError::Initialize {
                class: builtin_class.name.clone(),
                source,
            })?;
        debug!(name, class = builtin_class.name.as_str(); "Materialized builtin object");
        self.materialized.insert(name.to_owned(), id);
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, SemanticError};
    use crate::metamodel::{Metamodel, MetamodelBuilder};
    use crate::model::Value;

    const GRAMMAR: &str = "
        Model: types*=Type vars*=Var;
        Type: Simple | Compound;
        Simple: 'type' name=ID;
        Compound: 'struct' name=ID '{' fields*=Var '}';
        Var: 'var' name=ID ':' type=[Type];
    ";

    #[test]
    fn resolves_through_abstract_targets() {
        let mm: Metamodel = GRAMMAR.parse().unwrap();
        let model = mm
            .model_from_str("type int struct point { var x: int } var p: point")
            .unwrap();
        let root = model.root_object().unwrap();
        let types = model.get(root, "types").unwrap().objects();
        let vars = model.get(root, "vars").unwrap().objects();

        assert_eq!(model.get(vars[0], "type"), Some(&Value::Object(types[1])));
        let fields = model.get(types[1], "fields").unwrap().objects();
        assert_eq!(model.get(fields[0], "type"), Some(&Value::Object(types[0])));
        assert_eq!(model.references().len(), 2);
    }

    #[test]
    fn forward_references() {
        let mm: Metamodel = "Model: vars*=Var types*=Simple; Simple: 'type' name=ID; Var: 'var' name=ID ':' type=[Simple];"
            .parse()
            .unwrap();
        let model = mm.model_from_str("var a: t type t").unwrap();
        let root = model.root_object().unwrap();
        let var = model.get(root, "vars").unwrap().objects()[0];
        let simple = model.get(root, "types").unwrap().objects()[0];
        assert_eq!(model.get(var, "type"), Some(&Value::Object(simple)));
    }

    #[test]
    fn unresolved_reference() {
        let mm: Metamodel = GRAMMAR.parse().unwrap();
        let err = mm.model_from_str("type int\nvar p: point").unwrap_err();
        match err {
            Error::Semantic(SemanticError::UnresolvedReference {
                name,
                class,
                line,
                column,
            }) => {
                assert_eq!(name, "point");
                assert_eq!(class, "Type");
                assert_eq!((line, column), (2, 8));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn builtins_fill_in() {
        let mm = MetamodelBuilder::new()
            .builtin("float", "Simple", [("name", Value::from("float"))])
            .build(GRAMMAR)
            .unwrap();
        let model = mm.model_from_str("var a: float var b: float").unwrap();
        let root = model.root_object().unwrap();
        let vars = model.get(root, "vars").unwrap().objects();
        let a = model.get(vars[0], "type").and_then(Value::as_object).unwrap();
        let b = model.get(vars[1], "type").and_then(Value::as_object).unwrap();
        assert_eq!(a, b);
        assert_eq!(model.get(a, "name"), Some(&Value::from("float")));
        assert_eq!(model.parent(a), None);
        assert!(model.object(a).unwrap().span.is_none());
    }

    #[test]
    fn builtins_respect_target_class() {
        let grammar = "Model: things*=Thing vars*=Var; Thing: 'thing' name=ID; Other: name=ID; Var: 'var' name=ID ':' type=[Thing];";
        let mm = MetamodelBuilder::new()
            .builtin("x", "Other", [("name", Value::from("x"))])
            .build(grammar)
            .unwrap();
        assert!(matches!(
            mm.model_from_str("var a: x"),
            Err(Error::Semantic(SemanticError::UnresolvedReference { .. }))
        ));
    }
}
