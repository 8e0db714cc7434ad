use chrono::TimeZone;
use chrono::Utc;
use coco_taxonomy::CoCo;
use coco_taxonomy::Datum;
use coco_taxonomy::Item;
use coco_taxonomy::ItemListener;
use coco_taxonomy::Record;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn datum(temp: f64, millis: i64) -> Datum {
    Datum::new(
        record(json!({"temp": temp})),
        Utc.timestamp_millis_opt(millis).unwrap(),
    )
}

#[derive(Default)]
struct Events(Mutex<Vec<&'static str>>);

impl ItemListener for Events {
    fn properties_updated(&self, _item: &Item) {
        self.0.lock().unwrap().push("properties");
    }
    fn values_updated(&self, _item: &Item) {
        self.0.lock().unwrap().push("values");
    }
    fn new_value(&self, _item: &Item, _datum: &Datum) {
        self.0.lock().unwrap().push("new_value");
    }
    fn slots_updated(&self, _item: &Item) {
        self.0.lock().unwrap().push("slots");
    }
}

#[test]
fn append_grows_history_regardless_of_order() {
    let item = Item::new("s1", Vec::new(), None, None, None);
    let stamps = [30, 10, 20, 10];
    for (n, millis) in stamps.iter().enumerate() {
        let d = datum(n as f64, *millis);
        item.append_datum(d.clone());
        assert_eq!(item.datum(), Some(d));
        assert_eq!(item.history_len(), n + 1);
    }
    let order: Vec<i64> = item
        .history()
        .iter()
        .map(|d| d.timestamp.timestamp_millis())
        .collect();
    assert_eq!(order, vec![30, 10, 20, 10]);
}

#[test]
fn set_data_replaces_history_only() {
    let current = datum(1.0, 100);
    let item = Item::new("s1", Vec::new(), None, Some(current.clone()), None);
    let events = Arc::new(Events::default());
    item.add_listener(events.clone());

    item.set_data(vec![datum(2.0, 1), datum(3.0, 2)]);
    assert_eq!(item.history_len(), 2);
    assert_eq!(item.datum(), Some(current));

    item.set_properties(None);
    item.set_slots(Some(record(json!({"intent": "check"}))));
    item.append_datum(datum(4.0, 3));
    assert_eq!(
        *events.0.lock().unwrap(),
        vec!["values", "properties", "slots", "new_value"]
    );
    assert_eq!(item.slots().unwrap()["intent"], json!("check"));
}

#[test]
fn property_unions_follow_type_order() {
    let coco = CoCo::new();
    coco.update_coco(json!({
        "msg_type": "coco",
        "types": {
            "Device": {
                "static_properties": {"name": {"type": "string"}, "model": {"type": "string"}},
                "dynamic_properties": {"online": {"type": "bool"}}
            },
            "Thermometer": {
                "parents": ["Device"],
                "static_properties": {"model": {"type": "symbol", "values": ["t1", "t2"]}},
                "dynamic_properties": {"temp": {"type": "float"}}
            },
            "Labelled": {
                "static_properties": {"model": {"type": "int"}}
            }
        },
        "items": {
            "t1": {
                "types": ["Thermometer", "Labelled"],
                "properties": {"name": "Hall", "model": "t1", "colour": "red"}
            }
        }
    }))
    .unwrap();

    let t1 = coco.require_item("t1").unwrap();
    let statics = t1.static_properties();
    assert_eq!(statics.keys().collect::<Vec<_>>(), vec!["model", "name"]);
    assert_eq!(statics["model"].kind(), "symbol");
    assert_eq!(
        t1.dynamic_properties().keys().collect::<Vec<_>>(),
        vec!["online", "temp"]
    );
    assert_eq!(t1.undeclared_properties(), vec!["colour".to_string()]);
    assert_eq!(t1.to_string(), "Hall");
}
