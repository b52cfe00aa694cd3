use indexmap::IndexMap;
use std::ops::Range;

use super::{ObjectId, Value};
use crate::metamodel::{Class, ClassId};

/// Storage for model objects. Construction, resolution and processors only
/// touch objects through this interface, so any representation that can
/// allocate objects and get, set and append attributes by name will do.
pub trait ModelBackend {
    /// Creates an empty object of a concrete class.
    fn allocate(&mut self, class: &Class) -> ObjectId;

    fn class_of(&self, object: ObjectId) -> ClassId;

    fn attribute(&self, object: ObjectId, name: &str) -> Option<Value>;

    fn set_attribute(&mut self, object: ObjectId, name: &str, value: Value);

    /// Appends to a multi-valued attribute.
    fn append_attribute(&mut self, object: ObjectId, name: &str, value: Value);

    fn is_collection(&self, value: &Value) -> bool {
        matches!(value, Value::List(_))
    }

    fn set_parent(&mut self, object: ObjectId, parent: ObjectId);

    fn parent(&self, object: ObjectId) -> Option<ObjectId>;

    fn set_span(&mut self, object: ObjectId, span: Range<usize>);

    /// Called once every attribute assigned in the model text is set and
    /// every contained object is initialized. Links are still unresolved.
    fn initialize(&mut self, _object: ObjectId, _class: &Class) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An object in the default store.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelObject {
    pub class: ClassId,
    pub attributes: IndexMap<String, Value>,
    /// Innermost object containing this one.
    pub parent: Option<ObjectId>,
    /// Byte range in the model text. Builtin objects have none.
    pub span: Option<Range<usize>>,
}

/// Default backend: objects in a vector, indexed by [`ObjectId`].
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Vec<ModelObject>,
}

impl ObjectStore {
    pub fn get(&self, id: ObjectId) -> Option<&ModelObject> {
        self.objects.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ModelObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i), o))
    }

    fn object_mut(&mut self, id: ObjectId) -> &mut ModelObject {
        &mut self.objects[id.0]
    }
}

impl ModelBackend for ObjectStore {
    fn allocate(&mut self, class: &Class) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(ModelObject {
            class: class.id,
            attributes: IndexMap::with_capacity(class.attributes.len()),
            parent: None,
            span: None,
        });
        id
    }

    fn class_of(&self, object: ObjectId) -> ClassId {
        self.objects[object.0].class
    }

    fn attribute(&self, object: ObjectId, name: &str) -> Option<Value> {
        self.get(object)?.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, object: ObjectId, name: &str, value: Value) {
        self.object_mut(object).attributes.insert(name.to_owned(), value);
    }

    fn append_attribute(&mut self, object: ObjectId, name: &str, value: Value) {
        let slot = self
            .object_mut(object)
            .attributes
            .entry(name.to_owned())
            .or_insert_with(|| Value::List(Vec::new()));
        match slot {
            Value::List(items) => items.push(value),
            other => *other = Value::List(vec![std::mem::take(other), value]),
        }
    }

    fn set_parent(&mut self, object: ObjectId, parent: ObjectId) {
        self.object_mut(object).parent = Some(parent);
    }

    fn parent(&self, object: ObjectId) -> Option<ObjectId> {
        self.get(object)?.parent
    }

    fn set_span(&mut self, object: ObjectId, span: Range<usize>) {
        self.object_mut(object).span = Some(span);
    }
}
