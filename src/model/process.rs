use log::debug;
use std::collections::HashSet;

use super::{contained, ModelBackend, ObjectId, Value};
use crate::error::SemanticError;
use crate::metamodel::{ClassId, Metamodel};

/// Runs object processors over the containment tree below `root`, children
/// before their container. Links are not followed, so every object is
/// visited once.
pub(crate) fn process(metamodel: &Metamodel, root: &Value, backend: &mut dyn ModelBackend) -> Result<(), SemanticError> {
    if metamodel.processors.is_empty() {
        return Ok(());
    }
    let mut visited = HashSet::new();
    for object in root.objects() {
        visit(metamodel, backend, object, &mut visited)?;
    }
    Ok(())
}

fn visit(
    metamodel: &Metamodel,
    backend: &mut dyn ModelBackend,
    object: ObjectId,
    visited: &mut HashSet<ObjectId>,
) -> Result<(), SemanticError> {
    if !visited.insert(object) {
        return Ok(());
    }
    for child in contained(metamodel, &*backend, object) {
        visit(metamodel, backend, child, visited)?;
    }

    let class = backend.class_of(object);
    for key in processors_for(metamodel, class) {
        let processor = match metamodel.processors.get(&key) {
            Some(processor) => processor,
            None => continue,
        };
        let name = &metamodel.get(key).name;
        debug!(class = name.as_str(), object = object.0; "Running object processor");
        processor(&mut *backend, object).map_err(|source| SemanticError::Processor {
            class: name.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Processors registered for `class` itself come first, then those of its
/// superclasses.
fn processors_for(metamodel: &Metamodel, class: ClassId) -> Vec<ClassId> {
    let mut keys: Vec<ClassId> = metamodel
        .processors
        .keys()
        .copied()
        .filter(|key| metamodel.is_subclass(class, *key))
        .collect();
    keys.sort_by_key(|key| (*key != class, key.0));
    keys
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::error::{Error, SemanticError};
    use crate::metamodel::MetamodelBuilder;
    use crate::model::{ModelBackend, Value};

    const GRAMMAR: &str = "
        Tree: 'tree' name=ID children*=Node refs*=Ref;
        Node: Branch | Leaf;
        Branch: '(' name=ID children*=Node ')';
        Leaf: name=ID;
        Ref: '->' target=[Node];
    ";

    fn name_of(backend: &dyn ModelBackend, id: crate::model::ObjectId) -> String {
        backend
            .attribute(id, "name")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    #[test]
    fn post_order_over_containment() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (leaves, branches, trees) = (seen.clone(), seen.clone(), seen.clone());
        let mm = MetamodelBuilder::new()
            .processor("Leaf", move |backend, id| {
                leaves.lock().unwrap().push(name_of(backend, id));
                Ok(())
            })
            .processor("Branch", move |backend, id| {
                branches.lock().unwrap().push(name_of(backend, id));
                Ok(())
            })
            .processor("Tree", move |backend, id| {
                trees.lock().unwrap().push(name_of(backend, id));
                Ok(())
            })
            .build(GRAMMAR)
            .unwrap();

        mm.model_from_str("tree t (b1 a (b2 c)) d -> a -> b2").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "c", "b2", "b1", "d", "t"]);
    }

    #[test]
    fn superclass_processors() {
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let mm = MetamodelBuilder::new()
            .processor("Node", move |_, _| {
                *counter.lock().unwrap() += 1;
                Ok(())
            })
            .build(GRAMMAR)
            .unwrap();
        mm.model_from_str("tree t (b a) c").unwrap();
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn processors_can_modify_objects() {
        let mm = MetamodelBuilder::new()
            .processor("Leaf", |backend, id| {
                let upper = name_of(backend, id).to_uppercase();
                backend.set_attribute(id, "name", Value::Str(upper));
                Ok(())
            })
            .build(GRAMMAR)
            .unwrap();
        let model = mm.model_from_str("tree t x").unwrap();
        let root = model.root_object().unwrap();
        let leaf = model.get(root, "children").unwrap().objects()[0];
        assert_eq!(model.get(leaf, "name"), Some(&Value::from("X")));
    }

    #[test]
    fn processor_failure() {
        let mm = MetamodelBuilder::new()
            .processor("Leaf", |backend, id| {
                if name_of(backend, id) == "bad" {
                    anyhow::bail!("leaf names must not be 'bad'");
                }
                Ok(())
            })
            .build(GRAMMAR)
            .unwrap();
        assert!(mm.model_from_str("tree t ok").is_ok());
        let err = mm.model_from_str("tree t ok bad").unwrap_err();
        match err {
            Error::Semantic(SemanticError::Processor { class, source }) => {
                assert_eq!(class, "Leaf");
                assert_eq!(source.to_string(), "leaf names must not be 'bad'");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
