//! Client-side mirror of a CoCo taxonomy: types, items and their property
//! schemas, kept in sync from a stream of JSON update messages.

mod coco;
mod error;
mod item;
mod listeners;
mod property;
mod property_type;
pub mod protocol;
mod types;

/// A JSON object keyed by property name.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use coco::CoCo;
pub use coco::CoCoListener;
pub use error::Result;
pub use error::TaxonomyError;
pub use item::Datum;
pub use item::Item;
pub use item::ItemListener;
pub use listeners::ListenerId;
pub use property::BoolProperty;
pub use property::FloatProperty;
pub use property::IntProperty;
pub use property::ItemProperty;
pub use property::JsonProperty;
pub use property::OneOrMany;
pub use property::Property;
pub use property::StringProperty;
pub use property::SymbolProperty;
pub use property_type::BoolPropertyType;
pub use property_type::FloatPropertyType;
pub use property_type::IntPropertyType;
pub use property_type::ItemPropertyType;
pub use property_type::JsonPropertyType;
pub use property_type::PropertyType;
pub use property_type::PropertyTypes;
pub use property_type::StringPropertyType;
pub use property_type::SymbolPropertyType;
pub use property_type::TaxonomyLookup;
pub use property_type::render_plain;
pub use types::PropertyMap;
pub use types::Type;
pub use types::TypeListener;
