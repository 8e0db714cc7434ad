use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use crate::Record;
use crate::listeners::ListenerId;
use crate::listeners::Listeners;
use crate::types::PropertyMap;
use crate::types::Type;

/// One timestamped observation of an item's dynamic properties. On the wire
/// the timestamp is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    #[serde(default)]
    pub data: Record,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Datum {
    pub fn new(data: Record, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }
}

/// Field-level change notifications for a single [`Item`].
pub trait ItemListener: Send + Sync {
    fn types_updated(&self, _item: &Item) {}
    fn properties_updated(&self, _item: &Item) {}
    fn values_updated(&self, _item: &Item) {}
    fn new_value(&self, _item: &Item, _datum: &Datum) {}
    fn slots_updated(&self, _item: &Item) {}
}

#[derive(Default)]
struct ItemState {
    types: Vec<Arc<Type>>,
    properties: Option<Record>,
    datum: Option<Datum>,
    history: Vec<Datum>,
    slots: Option<Record>,
}

/// A taxonomy instance, classified under one or more [`Type`]s.
pub struct Item {
    id: String,
    state: RwLock<ItemState>,
    listeners: Listeners<dyn ItemListener>,
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item").field("id", &self.id).finish()
    }
}

fn dedup_by_name(types: Vec<Arc<Type>>) -> Vec<Arc<Type>> {
    let mut out: Vec<Arc<Type>> = Vec::with_capacity(types.len());
    for tp in types {
        if !out.iter().any(|t| t.name() == tp.name()) {
            out.push(tp);
        }
    }
    out
}

impl Item {
    /// Creates an item and enters it into the instance index of each of its
    /// types. The initial datum becomes the current value; the history
    /// starts empty.
    pub fn new(
        id: impl Into<String>,
        types: Vec<Arc<Type>>,
        properties: Option<Record>,
        datum: Option<Datum>,
        slots: Option<Record>,
    ) -> Arc<Self> {
        let item = Arc::new(Self {
            id: id.into(),
            state: RwLock::new(ItemState {
                types: dedup_by_name(types),
                properties,
                datum,
                history: Vec::new(),
                slots,
            }),
            listeners: Listeners::default(),
        });
        for tp in &item.read().types {
            tp.add_instance(&item);
        }
        item.warn_undeclared();
        item
    }

    fn read(&self) -> RwLockReadGuard<'_, ItemState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ItemState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A copy of the current type set. Re-read after `types_updated`.
    pub fn types(&self) -> Vec<Arc<Type>> {
        self.read().types.clone()
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.read().types.iter().any(|t| t.name() == name)
    }

    pub fn properties(&self) -> Option<Record> {
        self.read().properties.clone()
    }

    pub fn datum(&self) -> Option<Datum> {
        self.read().datum.clone()
    }

    pub fn history(&self) -> Vec<Datum> {
        self.read().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.read().history.len()
    }

    pub fn slots(&self) -> Option<Record> {
        self.read().slots.clone()
    }

    /// Reclassifies the item: leaves the instance index of every dropped
    /// type, joins the index of every new one, then fires `types_updated`
    /// once. An unchanged set still fires.
    pub fn set_types(self: &Arc<Self>, types: Vec<Arc<Type>>) {
        let types = dedup_by_name(types);
        let old = std::mem::replace(&mut self.write().types, types.clone());
        for tp in &old {
            if !types.iter().any(|t| t.name() == tp.name()) {
                tp.remove_instance(&self.id);
            }
        }
        for tp in &types {
            tp.add_instance(self);
        }
        self.listeners.notify(|l| l.types_updated(self));
    }

    /// Drops a single type from the item's classification, as done when the
    /// type itself is removed from the registry.
    pub(crate) fn drop_type(self: &Arc<Self>, name: &str) {
        let remaining: Vec<Arc<Type>> = self
            .types()
            .into_iter()
            .filter(|t| t.name() != name)
            .collect();
        self.set_types(remaining);
    }

    pub fn set_properties(&self, properties: Option<Record>) {
        self.write().properties = properties;
        self.warn_undeclared();
        self.listeners.notify(|l| l.properties_updated(self));
    }

    /// Replaces the whole history, e.g. after fetching a time range. The
    /// current datum is left alone.
    pub fn set_data(&self, history: Vec<Datum>) {
        self.write().history = history;
        self.listeners.notify(|l| l.values_updated(self));
    }

    pub fn append_datum(&self, datum: Datum) {
        {
            let mut state = self.write();
            state.history.push(datum.clone());
            state.datum = Some(datum.clone());
        }
        self.listeners.notify(|l| l.new_value(self, &datum));
    }

    pub fn set_slots(&self, slots: Option<Record>) {
        self.write().slots = slots;
        self.listeners.notify(|l| l.slots_updated(self));
    }

    /// Static properties declared by any of the item's types (including
    /// inherited ones). On a name clash the first type in the item's type
    /// list wins.
    pub fn static_properties(&self) -> PropertyMap {
        let mut out = PropertyMap::new();
        for tp in self.types() {
            for (name, prop) in tp.all_static_properties() {
                out.entry(name).or_insert(prop);
            }
        }
        out
    }

    pub fn dynamic_properties(&self) -> PropertyMap {
        let mut out = PropertyMap::new();
        for tp in self.types() {
            for (name, prop) in tp.all_dynamic_properties() {
                out.entry(name).or_insert(prop);
            }
        }
        out
    }

    /// Names in the static snapshot that none of the item's types declare.
    pub fn undeclared_properties(&self) -> Vec<String> {
        let Some(properties) = self.properties() else {
            return Vec::new();
        };
        let declared = self.static_properties();
        properties
            .keys()
            .filter(|name| !declared.contains_key(*name))
            .cloned()
            .collect()
    }

    fn warn_undeclared(&self) {
        for name in self.undeclared_properties() {
            tracing::warn!("item `{}` carries undeclared static property `{name}`", self.id);
        }
    }

    /// The item's `name` property when it is a string, otherwise its id.
    pub fn to_display_string(&self) -> String {
        self.read()
            .properties
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map_or_else(|| self.id.clone(), str::to_string)
    }

    pub fn add_listener(&self, listener: Arc<dyn ItemListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    #[test]
    fn display_prefers_name_property() {
        let tp = Arc::new(Type::new("Room", None));
        let named = Item::new(
            "r1",
            vec![tp.clone()],
            Some(record(json!({"name": "Kitchen"}))),
            None,
            None,
        );
        let anonymous = Item::new("r2", vec![tp], Some(record(json!({"name": 3}))), None, None);
        assert_eq!(named.to_display_string(), "Kitchen");
        assert_eq!(anonymous.to_string(), "r2");
    }

    #[test]
    fn datum_reads_epoch_millis() {
        let d: Datum =
            serde_json::from_value(json!({"data": {"temp": 21.5}, "timestamp": 1700000000000i64}))
                .unwrap();
        assert_eq!(d.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(d.data.get("temp"), Some(&json!(21.5)));
    }

    #[test]
    fn initial_datum_is_current_but_not_history() {
        let d = Datum::new(Record::new(), Utc::now());
        let item = Item::new("x", Vec::new(), None, Some(d.clone()), None);
        assert_eq!(item.datum(), Some(d));
        assert_eq!(item.history_len(), 0);
    }

    #[test]
    fn duplicate_types_collapse() {
        let tp = Arc::new(Type::new("Room", None));
        let item = Item::new("r", vec![tp.clone(), tp.clone()], None, None, None);
        assert_eq!(item.types().len(), 1);
        assert_eq!(tp.instances().len(), 1);
    }
}
