use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::Weak;

use crate::item::Item;
use crate::listeners::ListenerId;
use crate::listeners::Listeners;
use crate::property::Property;

pub type PropertyMap = BTreeMap<String, Property>;

/// Field-level change notifications for a single [`Type`].
pub trait TypeListener: Send + Sync {
    fn parents_updated(&self, _tp: &Type) {}
    fn data_updated(&self, _tp: &Type) {}
    fn static_properties_updated(&self, _tp: &Type) {}
    fn dynamic_properties_updated(&self, _tp: &Type) {}
}

#[derive(Default)]
struct TypeState {
    parents: Vec<Arc<Type>>,
    data: Option<Value>,
    static_properties: Option<PropertyMap>,
    dynamic_properties: Option<PropertyMap>,
    refined: bool,
}

/// A named class of items.
///
/// Types are created by name first and refined afterwards, so that property
/// descriptors can reference types that are declared later in the same
/// snapshot. Listeners may observe a type before [`Type::is_refined`] holds.
pub struct Type {
    name: String,
    state: RwLock<TypeState>,
    instances: Mutex<BTreeMap<String, Weak<Item>>>,
    listeners: Listeners<dyn TypeListener>,
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type").field("name", &self.name).finish()
    }
}

impl Type {
    pub fn new(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(TypeState {
                data,
                ..TypeState::default()
            }),
            instances: Mutex::new(BTreeMap::new()),
            listeners: Listeners::default(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TypeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TypeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> Vec<Arc<Type>> {
        self.read().parents.clone()
    }

    pub fn data(&self) -> Option<Value> {
        self.read().data.clone()
    }

    /// Own static properties; `None` until the type has been refined with
    /// a static property map.
    pub fn static_properties(&self) -> Option<PropertyMap> {
        self.read().static_properties.clone()
    }

    pub fn dynamic_properties(&self) -> Option<PropertyMap> {
        self.read().dynamic_properties.clone()
    }

    pub fn is_refined(&self) -> bool {
        self.read().refined
    }

    pub(crate) fn mark_refined(&self) {
        self.write().refined = true;
    }

    /// Drops parents and property maps ahead of a re-refinement from a
    /// snapshot. Fires no events; the refinement that follows does.
    pub(crate) fn reset(&self, data: Option<Value>) {
        *self.write() = TypeState {
            data,
            ..TypeState::default()
        };
    }

    /// Static properties of this type and all of its ancestors.
    ///
    /// Ancestors are visited breadth-first in parent order; when a name is
    /// declared more than once the first declaration seen wins, so the
    /// type's own properties shadow those of its parents.
    pub fn all_static_properties(&self) -> PropertyMap {
        self.collect_properties(|s| s.static_properties.as_ref())
    }

    pub fn all_dynamic_properties(&self) -> PropertyMap {
        self.collect_properties(|s| s.dynamic_properties.as_ref())
    }

    fn collect_properties(&self, pick: impl Fn(&TypeState) -> Option<&PropertyMap>) -> PropertyMap {
        let mut out = PropertyMap::new();
        let mut seen = HashSet::from([self.name.clone()]);
        let mut queue = VecDeque::new();

        let mut visit = |state: &TypeState, queue: &mut VecDeque<Arc<Type>>| {
            if let Some(props) = pick(state) {
                for (name, prop) in props {
                    out.entry(name.clone()).or_insert_with(|| prop.clone());
                }
            }
            for parent in &state.parents {
                if seen.insert(parent.name.clone()) {
                    queue.push_back(Arc::clone(parent));
                }
            }
        };

        visit(&self.read(), &mut queue);
        while let Some(tp) = queue.pop_front() {
            visit(&tp.read(), &mut queue);
        }
        out
    }

    pub fn set_parents(&self, parents: Vec<Arc<Type>>) {
        self.write().parents = parents;
        self.listeners.notify(|l| l.parents_updated(self));
    }

    pub fn set_data(&self, data: Option<Value>) {
        self.write().data = data;
        self.listeners.notify(|l| l.data_updated(self));
    }

    pub fn set_static_properties(&self, properties: Option<PropertyMap>) {
        self.write().static_properties = properties;
        self.listeners.notify(|l| l.static_properties_updated(self));
    }

    pub fn set_dynamic_properties(&self, properties: Option<PropertyMap>) {
        self.write().dynamic_properties = properties;
        self.listeners.notify(|l| l.dynamic_properties_updated(self));
    }

    /// Items currently classified under this type.
    pub fn instances(&self) -> Vec<Arc<Item>> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn add_instance(&self, item: &Arc<Item>) {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id().to_string(), Arc::downgrade(item));
    }

    pub(crate) fn remove_instance(&self, id: &str) {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// `(property, domain type)` pairs for the item-valued properties this
    /// type declares, static ones first.
    pub fn item_references(&self) -> Vec<(String, String)> {
        let state = self.read();
        [&state.static_properties, &state.dynamic_properties]
            .into_iter()
            .flatten()
            .flat_map(|props| props.iter())
            .filter_map(|(name, prop)| match prop {
                Property::Item(p) => Some((name.clone(), p.domain_name().to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn add_listener(&self, listener: Arc<dyn TypeListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        let state = self.read();
        if !state.parents.is_empty() {
            let parents: Vec<&str> = state.parents.iter().map(|p| p.name()).collect();
            write!(f, " : {}", parents.join(", "))?;
        }
        for (label, props) in [
            ("static", &state.static_properties),
            ("dynamic", &state.dynamic_properties),
        ] {
            let Some(props) = props else {
                continue;
            };
            for (name, prop) in props {
                write!(f, "\n  {label} {name}: {prop}")?;
            }
        }
        Ok(())
    }
}
