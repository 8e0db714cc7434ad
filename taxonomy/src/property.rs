use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use crate::types::Type;

/// A default that is either a single value or, for properties with the
/// multiplicity flag, a list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<V> {
    One(V),
    Many(Vec<V>),
}

impl<V: fmt::Display> fmt::Display for OneOrMany<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OneOrMany::One(v) => write!(f, "{v}"),
            OneOrMany::Many(vs) => {
                let parts: Vec<String> = vs.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolProperty {
    pub multiple: bool,
    pub default: Option<OneOrMany<bool>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntProperty {
    pub multiple: bool,
    /// `None` means unbounded.
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub default: Option<OneOrMany<i64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatProperty {
    pub multiple: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub default: Option<OneOrMany<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringProperty {
    pub multiple: bool,
    pub default: Option<OneOrMany<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolProperty {
    pub multiple: bool,
    /// Closed set of allowed symbols, if any.
    pub values: Option<Vec<String>>,
    pub default: Option<OneOrMany<String>>,
}

/// A reference to items of the `domain` type. Defaults hold item ids, since
/// type definitions arrive before the items they could point to.
///
/// The domain is held weakly: the registry owns types, and two types may
/// reference each other.
#[derive(Debug, Clone)]
pub struct ItemProperty {
    pub multiple: bool,
    pub default: Option<OneOrMany<String>>,
    domain_name: String,
    domain: Weak<Type>,
}

impl ItemProperty {
    pub fn new(domain: &Arc<Type>, multiple: bool, default: Option<OneOrMany<String>>) -> Self {
        Self {
            multiple,
            default,
            domain_name: domain.name().to_string(),
            domain: Arc::downgrade(domain),
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    /// The domain type, unless it has since been dropped by the registry.
    pub fn domain(&self) -> Option<Arc<Type>> {
        self.domain.upgrade()
    }
}

impl PartialEq for ItemProperty {
    fn eq(&self, other: &Self) -> bool {
        self.multiple == other.multiple
            && self.domain_name == other.domain_name
            && self.default == other.default
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonProperty {
    pub schema: Value,
    pub default: Option<Value>,
}

/// The schema of one named attribute of a [`Type`].
///
/// Properties never change after construction: refining a type replaces its
/// whole property map.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(BoolProperty),
    Int(IntProperty),
    Float(FloatProperty),
    String(StringProperty),
    Symbol(SymbolProperty),
    Item(ItemProperty),
    Json(JsonProperty),
}

impl Property {
    /// Name of the [`PropertyType`](crate::PropertyType) that decodes this
    /// kind of property.
    pub fn kind(&self) -> &'static str {
        match self {
            Property::Bool(_) => "bool",
            Property::Int(_) => "int",
            Property::Float(_) => "float",
            Property::String(_) => "string",
            Property::Symbol(_) => "symbol",
            Property::Item(_) => "item",
            Property::Json(_) => "json",
        }
    }

    pub fn is_multiple(&self) -> bool {
        match self {
            Property::Bool(p) => p.multiple,
            Property::Int(p) => p.multiple,
            Property::Float(p) => p.multiple,
            Property::String(p) => p.multiple,
            Property::Symbol(p) => p.multiple,
            Property::Item(p) => p.multiple,
            Property::Json(_) => false,
        }
    }

    pub fn has_default_value(&self) -> bool {
        match self {
            Property::Bool(p) => p.default.is_some(),
            Property::Int(p) => p.default.is_some(),
            Property::Float(p) => p.default.is_some(),
            Property::String(p) => p.default.is_some(),
            Property::Symbol(p) => p.default.is_some(),
            Property::Item(p) => p.default.is_some(),
            Property::Json(p) => p.default.is_some(),
        }
    }

    /// The default as a JSON value, ready to pre-fill a form.
    pub fn default_value(&self) -> Option<Value> {
        fn to_value<T: Serialize>(v: &Option<T>) -> Option<Value> {
            v.as_ref().and_then(|v| serde_json::to_value(v).ok())
        }
        match self {
            Property::Bool(p) => to_value(&p.default),
            Property::Int(p) => to_value(&p.default),
            Property::Float(p) => to_value(&p.default),
            Property::String(p) => to_value(&p.default),
            Property::Symbol(p) => to_value(&p.default),
            Property::Item(p) => to_value(&p.default),
            Property::Json(p) => p.default.clone(),
        }
    }

    /// The domain type of an `item` property.
    pub fn domain(&self) -> Option<Arc<Type>> {
        match self {
            Property::Item(p) => p.domain(),
            _ => None,
        }
    }

    /// Checks whether `value` is acceptable for this property. With the
    /// multiplicity flag set the value must be an array whose every element
    /// is acceptable.
    pub fn validate(&self, value: &Value) -> bool {
        if self.is_multiple() {
            return value
                .as_array()
                .is_some_and(|vs| vs.iter().all(|v| self.validate_one(v)));
        }
        self.validate_one(value)
    }

    fn validate_one(&self, value: &Value) -> bool {
        match self {
            Property::Bool(_) => value.is_boolean(),
            Property::Int(p) => value.as_i64().is_some_and(|v| {
                p.min.is_none_or(|min| v >= min) && p.max.is_none_or(|max| v <= max)
            }),
            Property::Float(p) => value.as_f64().is_some_and(|v| {
                p.min.is_none_or(|min| v >= min) && p.max.is_none_or(|max| v <= max)
            }),
            Property::String(_) | Property::Item(_) => value.is_string(),
            Property::Symbol(p) => value.as_str().is_some_and(|s| {
                p.values
                    .as_ref()
                    .is_none_or(|values| values.iter().any(|v| v == s))
            }),
            Property::Json(_) => value.is_object(),
        }
    }

    /// Re-encodes the property as a wire descriptor. Decoding the result
    /// with the registry yields an equal property.
    pub fn to_descriptor(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".to_string(), json!(self.kind()));
        if self.is_multiple() {
            obj.insert("multiple".to_string(), Value::Bool(true));
        }
        match self {
            Property::Int(p) => {
                if let Some(min) = p.min {
                    obj.insert("min".to_string(), json!(min));
                }
                if let Some(max) = p.max {
                    obj.insert("max".to_string(), json!(max));
                }
            }
            Property::Float(p) => {
                if let Some(min) = p.min {
                    obj.insert("min".to_string(), json!(min));
                }
                if let Some(max) = p.max {
                    obj.insert("max".to_string(), json!(max));
                }
            }
            Property::Symbol(p) => {
                if let Some(values) = &p.values {
                    obj.insert("values".to_string(), json!(values));
                }
            }
            Property::Item(p) => {
                obj.insert("domain".to_string(), json!(p.domain_name));
            }
            Property::Json(p) => {
                obj.insert("schema".to_string(), p.schema.clone());
            }
            Property::Bool(_) | Property::String(_) => {}
        }
        if let Some(default) = self.default_value() {
            obj.insert("default".to_string(), default);
        }
        Value::Object(obj)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Item(p) => write!(f, "{}", p.domain_name)?,
            other => write!(f, "{}", other.kind())?,
        }
        match self {
            Property::Int(IntProperty { min, max, .. }) if min.is_some() || max.is_some() => {
                write!(f, " [{}, {}]", bound(min), bound(max))?
            }
            Property::Float(FloatProperty { min, max, .. }) if min.is_some() || max.is_some() => {
                write!(f, " [{}, {}]", bound(min), bound(max))?
            }
            Property::Symbol(SymbolProperty {
                values: Some(values),
                ..
            }) => write!(f, " {{{}}}", values.join(", "))?,
            Property::Json(p) => write!(f, " {}", p.schema)?,
            _ => {}
        }
        if self.is_multiple() {
            write!(f, " [multiple]")?;
        }
        let default = match self {
            Property::Bool(p) => p.default.as_ref().map(ToString::to_string),
            Property::Int(p) => p.default.as_ref().map(ToString::to_string),
            Property::Float(p) => p.default.as_ref().map(ToString::to_string),
            Property::String(p) => p.default.as_ref().map(ToString::to_string),
            Property::Symbol(p) => p.default.as_ref().map(ToString::to_string),
            Property::Item(p) => p.default.as_ref().map(ToString::to_string),
            Property::Json(p) => p.default.as_ref().map(ToString::to_string),
        };
        if let Some(default) = default {
            write!(f, " ({default})")?;
        }
        Ok(())
    }
}

fn bound<T: fmt::Display>(b: &Option<T>) -> String {
    b.as_ref().map_or_else(|| "_".to_string(), ToString::to_string)
}

#[derive(Deserialize)]
pub(crate) struct FlagDescriptor<D> {
    #[serde(default)]
    pub multiple: bool,
    pub default: Option<D>,
}

#[derive(Deserialize)]
pub(crate) struct RangeDescriptor<N> {
    #[serde(default)]
    pub multiple: bool,
    pub min: Option<N>,
    pub max: Option<N>,
    pub default: Option<OneOrMany<N>>,
}

#[derive(Deserialize)]
pub(crate) struct SymbolDescriptor {
    #[serde(default)]
    pub multiple: bool,
    pub values: Option<Vec<String>>,
    pub default: Option<OneOrMany<String>>,
}

#[derive(Deserialize)]
pub(crate) struct ItemDescriptor {
    #[serde(default)]
    pub multiple: bool,
    pub domain: String,
    pub default: Option<OneOrMany<String>>,
}

#[derive(Deserialize)]
pub(crate) struct JsonDescriptor {
    pub schema: Value,
    pub default: Option<Value>,
}
