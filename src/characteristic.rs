//! Accessory, service and characteristic data model
//!
//! Mirrors the `application/hap+json` bodies: `GET /accessories` returns a
//! tree of accessories, each with services, each with characteristics.
//! Values are a tagged variant over the formats HAP defines; writes are
//! validated locally against the declared format and range before any
//! network request is issued.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// A characteristic value in one of the HAP formats
#[derive(Debug, Clone, PartialEq)]
pub enum CharacteristicValue {
    /// Boolean (format `bool`)
    Bool(bool),
    /// Integer (formats `uint8`..`uint64`, `int`)
    Int(i64),
    /// Floating point (format `float`)
    Float(f64),
    /// UTF-8 string (format `string`)
    String(String),
    /// Raw bytes (formats `data`, `tlv8`), base64 on the wire
    Binary(Vec<u8>),
}

impl Serialize for CharacteristicValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Binary(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
        }
    }
}

impl<'de> Deserialize<'de> for CharacteristicValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Binary arrives as a base64 string; telling it apart from a real
        // string needs the format field, which the caller applies via
        // `reinterpret_for`. Raw JSON maps onto the closest variant here.
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(serde::de::Error::custom("unrepresentable number"))
                }
            }
            serde_json::Value::String(s) => Ok(Self::String(s)),
            other => Err(serde::de::Error::custom(format!(
                "unsupported characteristic value: {other}"
            ))),
        }
    }
}

impl CharacteristicValue {
    /// Re-tag a decoded value according to the declared format
    ///
    /// JSON alone cannot distinguish `data` from `string` or `bool` from a
    /// 0/1 integer; the characteristic's format disambiguates.
    #[must_use]
    pub fn reinterpret_for(self, format: CharacteristicFormat) -> Self {
        match (format, self) {
            (CharacteristicFormat::Bool, Self::Int(i)) => Self::Bool(i != 0),
            (CharacteristicFormat::Float, Self::Int(i)) => {
                #[allow(clippy::cast_precision_loss)]
                Self::Float(i as f64)
            }
            (CharacteristicFormat::Data | CharacteristicFormat::Tlv8, Self::String(s)) => {
                BASE64.decode(&s).map_or(Self::String(s), Self::Binary)
            }
            (_, value) => value,
        }
    }

    /// Numeric view, if the value is numeric
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// HAP characteristic value formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacteristicFormat {
    /// Boolean
    Bool,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// Signed 32-bit integer
    Int,
    /// IEEE 754 double
    Float,
    /// UTF-8 string
    String,
    /// Opaque TLV8 blob
    Tlv8,
    /// Opaque binary blob
    Data,
}

impl CharacteristicFormat {
    fn is_integer(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 | Self::Int
        )
    }
}

/// Characteristic permissions as carried in the `perms` array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Paired read
    #[serde(rename = "pr")]
    PairedRead,
    /// Paired write
    #[serde(rename = "pw")]
    PairedWrite,
    /// Event notifications
    #[serde(rename = "ev")]
    Events,
    /// Additional authorization data
    #[serde(rename = "aa")]
    AdditionalAuthorization,
    /// Timed write
    #[serde(rename = "tw")]
    TimedWrite,
    /// Hidden from users
    #[serde(rename = "hd")]
    Hidden,
}

/// One characteristic of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Characteristic {
    /// Instance id, unique within the accessory
    pub iid: u64,
    /// Characteristic type UUID (short or long form)
    #[serde(rename = "type")]
    pub characteristic_type: String,
    /// Current value, absent for write-only characteristics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CharacteristicValue>,
    /// Permission set
    #[serde(default)]
    pub perms: Vec<Permission>,
    /// Value format
    pub format: CharacteristicFormat,
    /// Unit of measurement, if declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Minimum value, if declared
    #[serde(rename = "minValue", default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Maximum value, if declared
    #[serde(rename = "maxValue", default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Step granularity, if declared
    #[serde(rename = "minStep", default, skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
}

impl Characteristic {
    /// Whether this characteristic accepts writes
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.perms.contains(&Permission::PairedWrite)
    }

    /// Whether this characteristic can be read
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.perms.contains(&Permission::PairedRead)
    }

    /// Validate a candidate write value against format and range
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value violates the
    /// declared format, range or step. Never touches the network.
    pub fn validate(&self, value: &CharacteristicValue) -> Result<(), String> {
        if !self.is_writable() {
            return Err("characteristic is not writable".to_string());
        }

        match (self.format, value) {
            (CharacteristicFormat::Bool, CharacteristicValue::Bool(_))
            | (CharacteristicFormat::Float, CharacteristicValue::Float(_))
            | (CharacteristicFormat::String, CharacteristicValue::String(_))
            | (
                CharacteristicFormat::Tlv8 | CharacteristicFormat::Data,
                CharacteristicValue::Binary(_),
            ) => {}
            (f, CharacteristicValue::Int(_)) if f.is_integer() => {}
            // Accessories commonly accept ints where floats are declared
            (CharacteristicFormat::Float, CharacteristicValue::Int(_)) => {}
            (format, _) => {
                return Err(format!("value does not match declared format {format:?}"));
            }
        }

        if let Some(v) = value.as_f64() {
            if let Some(min) = self.min_value {
                if v < min {
                    return Err(format!("value {v} below minimum {min}"));
                }
            }
            if let Some(max) = self.max_value {
                if v > max {
                    return Err(format!("value {v} above maximum {max}"));
                }
            }
            if let Some(step) = self.min_step {
                if step > 0.0 {
                    let base = self.min_value.unwrap_or(0.0);
                    let steps = (v - base) / step;
                    if (steps - steps.round()).abs() > 1e-9 {
                        return Err(format!("value {v} not aligned to step {step}"));
                    }
                }
            }
        }

        match (self.format, value) {
            (CharacteristicFormat::UInt8, CharacteristicValue::Int(i))
                if !(0..=255).contains(i) =>
            {
                Err(format!("value {i} out of uint8 range"))
            }
            (CharacteristicFormat::UInt16, CharacteristicValue::Int(i))
                if !(0..=65535).contains(i) =>
            {
                Err(format!("value {i} out of uint16 range"))
            }
            (
                CharacteristicFormat::UInt32 | CharacteristicFormat::UInt64,
                CharacteristicValue::Int(i),
            ) if *i < 0 => Err(format!("value {i} negative for unsigned format")),
            _ => Ok(()),
        }
    }
}

/// One service of an accessory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Instance id of the service itself
    pub iid: u64,
    /// Service type UUID
    #[serde(rename = "type")]
    pub service_type: String,
    /// The characteristics this service exposes
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
}

/// One accessory behind a HAP endpoint (bridges expose several)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accessory {
    /// Accessory id, unique per endpoint; 1 is the bridge/primary
    pub aid: u64,
    /// The accessory's services
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Accessory {
    /// Find a characteristic by instance id
    #[must_use]
    pub fn characteristic(&self, iid: u64) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.iid == iid)
    }
}

/// Body of `GET /accessories`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryDatabase {
    /// All accessories behind this endpoint
    pub accessories: Vec<Accessory>,
}

impl AccessoryDatabase {
    /// Find an accessory by id
    #[must_use]
    pub fn accessory(&self, aid: u64) -> Option<&Accessory> {
        self.accessories.iter().find(|a| a.aid == aid)
    }
}

/// One entry of a `/characteristics` read response or write request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacteristicEntry {
    /// Accessory id
    pub aid: u64,
    /// Characteristic instance id
    pub iid: u64,
    /// Value read or to be written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CharacteristicValue>,
    /// Per-entry HAP status code, 0 on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

/// Body of `GET /characteristics` and `PUT /characteristics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacteristicsBody {
    /// The entries read or written
    pub characteristics: Vec<CharacteristicEntry>,
}

#[cfg(test)]
mod tests;
