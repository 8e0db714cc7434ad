use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use crate::error::Result;
use crate::error::TaxonomyError;
use crate::item::Item;
use crate::property::BoolProperty;
use crate::property::FlagDescriptor;
use crate::property::FloatProperty;
use crate::property::IntProperty;
use crate::property::ItemDescriptor;
use crate::property::ItemProperty;
use crate::property::JsonDescriptor;
use crate::property::JsonProperty;
use crate::property::OneOrMany;
use crate::property::Property;
use crate::property::RangeDescriptor;
use crate::property::StringProperty;
use crate::property::SymbolDescriptor;
use crate::property::SymbolProperty;
use crate::types::Type;

/// Read access to the registered types and items, handed to decoders that
/// need to resolve names.
pub trait TaxonomyLookup {
    fn get_type(&self, name: &str) -> Option<Arc<Type>>;
    fn get_item(&self, id: &str) -> Option<Arc<Item>>;
}

/// Decoder and renderer for one primitive property kind.
pub trait PropertyType: Send + Sync {
    /// Registry key; matches the `type` field of wire descriptors.
    fn name(&self) -> &str;

    fn make_property(&self, lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property>;

    /// Renders a value of this kind as display text. `null` renders as the
    /// empty string.
    fn to_display(&self, lookup: &dyn TaxonomyLookup, value: &Value) -> Result<String> {
        let _ = lookup;
        Ok(render_plain(value))
    }
}

fn parse_descriptor<D: DeserializeOwned>(kind: &str, descriptor: &Value) -> Result<D> {
    D::deserialize(descriptor).map_err(|e| TaxonomyError::MalformedPropertyDescriptor {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Display text for plain JSON values: strings unquoted, arrays as
/// `[a, b]`, objects as compact JSON.
pub fn render_plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(vs) => {
            let parts: Vec<String> = vs.iter().map(render_plain).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

pub struct BoolPropertyType;

impl PropertyType for BoolPropertyType {
    fn name(&self) -> &str {
        "bool"
    }

    fn make_property(&self, _lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: FlagDescriptor<OneOrMany<bool>> = parse_descriptor(self.name(), descriptor)?;
        Ok(Property::Bool(BoolProperty {
            multiple: d.multiple,
            default: d.default,
        }))
    }
}

pub struct IntPropertyType;

impl PropertyType for IntPropertyType {
    fn name(&self) -> &str {
        "int"
    }

    fn make_property(&self, _lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: RangeDescriptor<i64> = parse_descriptor(self.name(), descriptor)?;
        Ok(Property::Int(IntProperty {
            multiple: d.multiple,
            min: d.min,
            max: d.max,
            default: d.default,
        }))
    }
}

pub struct FloatPropertyType;

impl PropertyType for FloatPropertyType {
    fn name(&self) -> &str {
        "float"
    }

    fn make_property(&self, _lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: RangeDescriptor<f64> = parse_descriptor(self.name(), descriptor)?;
        Ok(Property::Float(FloatProperty {
            multiple: d.multiple,
            min: d.min,
            max: d.max,
            default: d.default,
        }))
    }
}

pub struct StringPropertyType;

impl PropertyType for StringPropertyType {
    fn name(&self) -> &str {
        "string"
    }

    fn make_property(&self, _lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: FlagDescriptor<OneOrMany<String>> = parse_descriptor(self.name(), descriptor)?;
        Ok(Property::String(StringProperty {
            multiple: d.multiple,
            default: d.default,
        }))
    }
}

pub struct SymbolPropertyType;

impl PropertyType for SymbolPropertyType {
    fn name(&self) -> &str {
        "symbol"
    }

    fn make_property(&self, _lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: SymbolDescriptor = parse_descriptor(self.name(), descriptor)?;
        Ok(Property::Symbol(SymbolProperty {
            multiple: d.multiple,
            values: d.values,
            default: d.default,
        }))
    }
}

pub struct ItemPropertyType;

impl PropertyType for ItemPropertyType {
    fn name(&self) -> &str {
        "item"
    }

    fn make_property(&self, lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: ItemDescriptor = parse_descriptor(self.name(), descriptor)?;
        let domain = lookup
            .get_type(&d.domain)
            .ok_or(TaxonomyError::UnknownType(d.domain))?;
        Ok(Property::Item(ItemProperty::new(
            &domain,
            d.multiple,
            d.default,
        )))
    }

    fn to_display(&self, lookup: &dyn TaxonomyLookup, value: &Value) -> Result<String> {
        match value {
            Value::String(id) => lookup
                .get_item(id)
                .map(|item| item.to_display_string())
                .ok_or_else(|| TaxonomyError::DanglingReference(id.clone())),
            Value::Array(ids) => {
                let parts = ids
                    .iter()
                    .map(|id| self.to_display(lookup, id))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("[{}]", parts.join(", ")))
            }
            other => Ok(render_plain(other)),
        }
    }
}

pub struct JsonPropertyType;

impl PropertyType for JsonPropertyType {
    fn name(&self) -> &str {
        "json"
    }

    fn make_property(&self, _lookup: &dyn TaxonomyLookup, descriptor: &Value) -> Result<Property> {
        let d: JsonDescriptor = parse_descriptor(self.name(), descriptor)?;
        Ok(Property::Json(JsonProperty {
            schema: d.schema,
            default: d.default,
        }))
    }

    fn to_display(&self, _lookup: &dyn TaxonomyLookup, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

/// Table of property decoders keyed by kind name.
pub struct PropertyTypes {
    decoders: RwLock<HashMap<String, Arc<dyn PropertyType>>>,
}

impl Default for PropertyTypes {
    /// A registry holding the seven built-in kinds.
    fn default() -> Self {
        let types = Self::empty();
        types.register(Arc::new(BoolPropertyType));
        types.register(Arc::new(IntPropertyType));
        types.register(Arc::new(FloatPropertyType));
        types.register(Arc::new(StringPropertyType));
        types.register(Arc::new(SymbolPropertyType));
        types.register(Arc::new(ItemPropertyType));
        types.register(Arc::new(JsonPropertyType));
        types
    }
}

impl PropertyTypes {
    pub fn empty() -> Self {
        Self {
            decoders: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `decoder` under its name, replacing any previous decoder
    /// with the same name.
    pub fn register(&self, decoder: Arc<dyn PropertyType>) {
        let mut decoders = self.decoders.write().unwrap_or_else(PoisonError::into_inner);
        decoders.insert(decoder.name().to_string(), decoder);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn PropertyType>> {
        self.decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    fn require(&self, kind: &str) -> Result<Arc<dyn PropertyType>> {
        self.get(kind)
            .ok_or_else(|| TaxonomyError::UnknownPropertyKind(kind.to_string()))
    }

    pub fn decode(
        &self,
        lookup: &dyn TaxonomyLookup,
        kind: &str,
        descriptor: &Value,
    ) -> Result<Property> {
        self.require(kind)?.make_property(lookup, descriptor)
    }

    /// Decodes a descriptor whose kind is carried in its `type` field.
    pub fn decode_descriptor(
        &self,
        lookup: &dyn TaxonomyLookup,
        descriptor: &Value,
    ) -> Result<Property> {
        let kind = descriptor.get("type").and_then(Value::as_str).ok_or_else(|| {
            TaxonomyError::MalformedPropertyDescriptor {
                kind: String::new(),
                reason: "missing `type` field".to_string(),
            }
        })?;
        self.decode(lookup, kind, descriptor)
    }

    pub fn render(&self, lookup: &dyn TaxonomyLookup, kind: &str, value: &Value) -> Result<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        self.require(kind)?.to_display(lookup, value)
    }

    /// Best-effort rendering: falls back to the raw value text (for item
    /// references, the raw id) when rendering fails.
    pub fn render_or_raw(&self, lookup: &dyn TaxonomyLookup, kind: &str, value: &Value) -> String {
        match self.render(lookup, kind, value) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("rendering `{kind}` value failed: {e}");
                render_plain(value)
            }
        }
    }
}
