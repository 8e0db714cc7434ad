use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use crate::error::Result;
use crate::error::TaxonomyError;
use crate::item::Item;
use crate::listeners::ListenerId;
use crate::listeners::Listeners;
use crate::property::Property;
use crate::property_type::PropertyType;
use crate::property_type::PropertyTypes;
use crate::property_type::TaxonomyLookup;
use crate::protocol::CoCoMessage;
use crate::protocol::ItemMessage;
use crate::protocol::NewTypeMessage;
use crate::protocol::TypeMessage;
use crate::protocol::UpdateMessage;
use crate::protocol::UpdatedItemMessage;
use crate::types::PropertyMap;
use crate::types::Type;

/// Registry-level notifications. `type_removed` and `item_removed` only fire
/// for explicit removals; a `coco` snapshot replaces entities silently.
pub trait CoCoListener: Send + Sync {
    fn new_type(&self, _tp: &Arc<Type>) {}
    fn new_item(&self, _item: &Arc<Item>) {}
    fn type_removed(&self, _tp: &Arc<Type>) {}
    fn item_removed(&self, _item: &Arc<Item>) {}
}

/// The client-side mirror of a server's taxonomy.
///
/// All mutation goes through [`CoCo::update_coco`] (or [`CoCo::apply`] for an
/// already decoded message) and runs synchronously on the caller's thread.
/// Registry locks are released before any listener runs.
pub struct CoCo {
    property_types: PropertyTypes,
    types: RwLock<BTreeMap<String, Arc<Type>>>,
    items: RwLock<BTreeMap<String, Arc<Item>>>,
    listeners: Listeners<dyn CoCoListener>,
}

impl Default for CoCo {
    fn default() -> Self {
        Self::with_property_types(PropertyTypes::default())
    }
}

impl CoCo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property_types(property_types: PropertyTypes) -> Self {
        Self {
            property_types,
            types: RwLock::new(BTreeMap::new()),
            items: RwLock::new(BTreeMap::new()),
            listeners: Listeners::default(),
        }
    }

    pub fn property_types(&self) -> &PropertyTypes {
        &self.property_types
    }

    pub fn register_property_type(&self, decoder: Arc<dyn PropertyType>) {
        self.property_types.register(decoder);
    }

    /// Decodes a single wire descriptor against the current registry.
    pub fn decode_property(&self, descriptor: &Value) -> Result<Property> {
        self.property_types.decode_descriptor(self, descriptor)
    }

    pub fn render(&self, property: &Property, value: &Value) -> Result<String> {
        self.property_types.render(self, property.kind(), value)
    }

    pub fn render_or_raw(&self, property: &Property, value: &Value) -> String {
        self.property_types.render_or_raw(self, property.kind(), value)
    }

    pub fn types(&self) -> Vec<Arc<Type>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn items(&self) -> Vec<Arc<Item>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn require_type(&self, name: &str) -> Result<Arc<Type>> {
        self.get_type(name)
            .ok_or_else(|| TaxonomyError::UnknownType(name.to_string()))
    }

    pub fn require_item(&self, id: &str) -> Result<Arc<Item>> {
        self.get_item(id)
            .ok_or_else(|| TaxonomyError::UnknownItem(id.to_string()))
    }

    pub fn add_listener(&self, listener: Arc<dyn CoCoListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Applies one raw update message. Messages without a `msg_type` tag or
    /// with an unknown tag are ignored.
    pub fn update_coco(&self, message: Value) -> Result<()> {
        match UpdateMessage::from_value(message)? {
            Some(message) => self.apply(message),
            None => Ok(()),
        }
    }

    pub fn apply(&self, message: UpdateMessage) -> Result<()> {
        match message {
            UpdateMessage::CoCo(msg) => self.init(msg),
            UpdateMessage::NewType(NewTypeMessage { name, body }) => {
                match self.get_type(&name) {
                    Some(tp) => {
                        tracing::debug!("refining type `{name}`");
                        if body.data.is_some() {
                            tp.set_data(body.data.clone());
                        }
                        self.refine_type(&tp, &body);
                    }
                    None => {
                        tracing::debug!("new type `{name}`");
                        let tp = Arc::new(Type::new(name, body.data.clone()));
                        self.insert_type(&tp);
                        self.refine_type(&tp, &body);
                    }
                }
                Ok(())
            }
            UpdateMessage::NewItem(msg) => {
                tracing::debug!("new item `{}`", msg.id);
                let item = self.make_item(msg.id, msg.body)?;
                self.insert_item(&item);
                Ok(())
            }
            UpdateMessage::UpdatedItem(msg) => self.update_item(msg),
            UpdateMessage::NewData(msg) => {
                let (id, datum) = msg.into_parts();
                self.require_item(&id)?.append_datum(datum);
                Ok(())
            }
        }
    }

    /// Replaces the registry from a full snapshot. Every type is created by
    /// name before any is refined, so descriptors may reference types in any
    /// order. A type already registered under a snapshot name is reset and
    /// reused, so items and property domains bound to it stay valid.
    ///
    /// The snapshot is checked before anything is touched: an item naming
    /// a type that will not exist fails the whole message.
    fn init(&self, msg: CoCoMessage) -> Result<()> {
        self.check_snapshot(&msg)?;
        if let Some(types) = msg.types {
            tracing::debug!("initializing {} types", types.len());
            let previous =
                std::mem::take(&mut *self.types.write().unwrap_or_else(PoisonError::into_inner));
            let created: Vec<(Arc<Type>, TypeMessage)> = types
                .into_iter()
                .map(|(name, body)| {
                    let tp = match previous.get(&name) {
                        Some(tp) => {
                            tp.reset(body.data.clone());
                            Arc::clone(tp)
                        }
                        None => Arc::new(Type::new(name, body.data.clone())),
                    };
                    (tp, body)
                })
                .collect();
            for (tp, _) in &created {
                self.insert_type(tp);
            }
            for (tp, body) in &created {
                self.refine_type(tp, body);
            }
        }
        if let Some(items) = msg.items {
            tracing::debug!("initializing {} items", items.len());
            let old = std::mem::take(&mut *self.items.write().unwrap_or_else(PoisonError::into_inner));
            for item in old.values() {
                for tp in item.types() {
                    tp.remove_instance(item.id());
                }
            }
            for (id, body) in items {
                let item = self.make_item(id, body)?;
                self.insert_item(&item);
            }
        }
        Ok(())
    }

    fn check_snapshot(&self, msg: &CoCoMessage) -> Result<()> {
        let Some(items) = &msg.items else {
            return Ok(());
        };
        let known = |name: &str| match &msg.types {
            Some(types) => types.contains_key(name),
            None => self.get_type(name).is_some(),
        };
        for body in items.values() {
            if let Some(name) = body.types.iter().flatten().find(|name| !known(name.as_str())) {
                return Err(TaxonomyError::UnknownType(name.clone()));
            }
        }
        Ok(())
    }

    fn insert_type(&self, tp: &Arc<Type>) {
        let replaced = self
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tp.name().to_string(), Arc::clone(tp));
        if replaced.is_some() {
            tracing::debug!("type `{}` replaced", tp.name());
        }
        self.listeners.notify(|l| l.new_type(tp));
    }

    fn insert_item(&self, item: &Arc<Item>) {
        let replaced = self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id().to_string(), Arc::clone(item));
        if let Some(old) = replaced {
            tracing::debug!("item `{}` replaced", old.id());
            for tp in old.types() {
                if !item.has_type(tp.name()) {
                    tp.remove_instance(old.id());
                }
            }
        }
        self.listeners.notify(|l| l.new_item(item));
    }

    /// Sets parents, then static and dynamic properties, from `body`.
    /// Unknown parents and undecodable descriptors are skipped with a
    /// warning.
    fn refine_type(&self, tp: &Arc<Type>, body: &TypeMessage) {
        if let Some(names) = &body.parents {
            let parents = names
                .iter()
                .filter_map(|name| {
                    let parent = self.get_type(name);
                    if parent.is_none() {
                        tracing::warn!("type `{}`: unknown parent `{name}` skipped", tp.name());
                    }
                    parent
                })
                .collect();
            tp.set_parents(parents);
        }
        if let Some(descriptors) = &body.static_properties {
            tp.set_static_properties(Some(self.decode_properties(tp, descriptors)));
        }
        if let Some(descriptors) = &body.dynamic_properties {
            tp.set_dynamic_properties(Some(self.decode_properties(tp, descriptors)));
        }
        tp.mark_refined();
    }

    fn decode_properties(&self, tp: &Type, descriptors: &BTreeMap<String, Value>) -> PropertyMap {
        let mut out = PropertyMap::new();
        for (name, descriptor) in descriptors {
            match self.decode_property(descriptor) {
                Ok(prop) => {
                    out.insert(name.clone(), prop);
                }
                Err(e) => {
                    tracing::warn!("type `{}`: skipping property `{name}`: {e}", tp.name());
                }
            }
        }
        out
    }

    fn resolve_types(&self, names: &[String]) -> Result<Vec<Arc<Type>>> {
        names.iter().map(|name| self.require_type(name)).collect()
    }

    fn make_item(&self, id: String, body: ItemMessage) -> Result<Arc<Item>> {
        let types = match &body.types {
            Some(names) => self.resolve_types(names)?,
            None => Vec::new(),
        };
        Ok(Item::new(id, types, body.properties, body.value, body.slots))
    }

    fn update_item(&self, msg: UpdatedItemMessage) -> Result<()> {
        let item = self.require_item(&msg.id)?;
        let types = match &msg.types {
            Some(names) => Some(self.resolve_types(names)?),
            None => None,
        };
        if let Some(types) = types {
            item.set_types(types);
        }
        if let Some(properties) = msg.properties {
            item.set_properties(Some(properties));
        }
        Ok(())
    }

    /// Removes a type, dropping it from the type set of each of its items
    /// and from the parents of other types.
    pub fn remove_type(&self, name: &str) -> Option<Arc<Type>> {
        let tp = self
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)?;
        for item in tp.instances() {
            item.drop_type(name);
        }
        for other in self.types() {
            let parents = other.parents();
            if parents.iter().any(|p| p.name() == name) {
                other.set_parents(parents.into_iter().filter(|p| p.name() != name).collect());
            }
        }
        self.listeners.notify(|l| l.type_removed(&tp));
        Some(tp)
    }

    /// Removes an item and detaches it from the instance index of each of
    /// its types.
    pub fn remove_item(&self, id: &str) -> Option<Arc<Item>> {
        let item = self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        for tp in item.types() {
            tp.remove_instance(id);
        }
        self.listeners.notify(|l| l.item_removed(&item));
        Some(item)
    }
}

impl TaxonomyLookup for CoCo {
    fn get_type(&self, name: &str) -> Option<Arc<Type>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn get_item(&self, id: &str) -> Option<Arc<Item>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn new_type_registers_and_refines() {
        let coco = CoCo::new();
        coco.update_coco(json!({
            "msg_type": "new_type",
            "name": "Room",
            "data": {"icon": "door"},
            "static_properties": {"floor": {"type": "int", "min": 0}}
        }))
        .unwrap();
        let room = coco.require_type("Room").unwrap();
        assert!(room.is_refined());
        assert_eq!(room.data(), Some(json!({"icon": "door"})));
        assert_eq!(room.all_static_properties().len(), 1);
    }

    #[test]
    fn unknown_parent_is_skipped() {
        let coco = CoCo::new();
        coco.update_coco(json!({
            "msg_type": "new_type",
            "name": "Room",
            "parents": ["Ghost"]
        }))
        .unwrap();
        assert!(coco.require_type("Room").unwrap().parents().is_empty());
    }

    #[test]
    fn new_item_with_unknown_type_registers_nothing() {
        let coco = CoCo::new();
        let err = coco
            .update_coco(json!({"msg_type": "new_item", "id": "r1", "types": ["Room"]}))
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::UnknownType(name) if name == "Room"));
        assert!(coco.items().is_empty());
    }

    #[test]
    fn snapshot_reuses_registered_types() {
        let coco = CoCo::new();
        coco.update_coco(json!({
            "msg_type": "new_type",
            "name": "Room",
            "static_properties": {"floor": {"type": "int"}}
        }))
        .unwrap();
        let room = coco.require_type("Room").unwrap();

        coco.update_coco(json!({"msg_type": "coco", "types": {"Room": {"data": 1}}}))
            .unwrap();

        assert!(Arc::ptr_eq(&room, &coco.require_type("Room").unwrap()));
        assert_eq!(room.data(), Some(json!(1)));
        assert_eq!(room.static_properties(), None);
        assert!(room.is_refined());
    }

    #[test]
    fn replacing_an_item_detaches_the_old_one() {
        let coco = CoCo::new();
        coco.update_coco(json!({"msg_type": "new_type", "name": "A"}))
            .unwrap();
        coco.update_coco(json!({"msg_type": "new_type", "name": "B"}))
            .unwrap();
        coco.update_coco(json!({"msg_type": "new_item", "id": "x", "types": ["A"]}))
            .unwrap();
        coco.update_coco(json!({"msg_type": "new_item", "id": "x", "types": ["B"]}))
            .unwrap();
        assert!(coco.require_type("A").unwrap().instances().is_empty());
        assert_eq!(coco.require_type("B").unwrap().instances().len(), 1);
    }
}
