//! Capability descriptors and typed operation tables.
//!
//! Each model declares which operations it supports and how their values are
//! labelled. The declaration and the dispatch live together in a
//! [`CapabilityTable`], built once per model: an operation name maps to a
//! typed function pointer, so a presentation layer can list operations from
//! the [`CapabilityDescriptor`] and invoke them by name without reflection.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};

/// How a value should be presented and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScalarType {
    /// A plain number.
    Number,
    /// One of a fixed set of strings.
    Enum,
    /// A point in time.
    Date,
}

/// Presentation metadata for one field of a read result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Key of the field in the [`Reading`].
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Value type.
    pub scalar: ScalarType,
    /// Unit suffix, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    /// Accepted values for enums.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<&'static [&'static str]>,
}

impl FieldDescriptor {
    /// A numeric field.
    pub const fn number(key: &'static str, name: &'static str, unit: Option<&'static str>) -> Self {
        Self {
            key,
            name,
            scalar: ScalarType::Number,
            unit,
            values: None,
        }
    }

    /// An enumerated field.
    pub const fn enumeration(
        key: &'static str,
        name: &'static str,
        values: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            name,
            scalar: ScalarType::Enum,
            unit: None,
            values: Some(values),
        }
    }

    /// A timestamp field.
    pub const fn date(key: &'static str, name: &'static str) -> Self {
        Self {
            key,
            name,
            scalar: ScalarType::Date,
            unit: None,
            values: None,
        }
    }
}

/// A readable operation and the fields it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadDescriptor {
    /// Operation name.
    pub operation: &'static str,
    /// Fields of the result.
    pub fields: Vec<FieldDescriptor>,
}

impl ReadDescriptor {
    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// A writable operation and the value it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteDescriptor {
    /// Operation name.
    pub operation: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Accepted value type.
    pub scalar: ScalarType,
    /// Accepted values for enums.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<&'static [&'static str]>,
}

/// Everything a model can read and write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    /// Readable operations, in declaration order.
    pub read: Vec<ReadDescriptor>,
    /// Writable operations, in declaration order.
    pub write: Vec<WriteDescriptor>,
}

impl CapabilityDescriptor {
    /// Look up a read operation.
    pub fn read_op(&self, operation: &str) -> Option<&ReadDescriptor> {
        self.read.iter().find(|r| r.operation == operation)
    }

    /// Look up a write operation.
    pub fn write_op(&self, operation: &str) -> Option<&WriteDescriptor> {
        self.write.iter().find(|w| w.operation == operation)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A decoded scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A number.
    Number(f64),
    /// An enumerated string.
    Enum(String),
    /// A timestamp.
    Time(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
}

impl Value {
    /// Parse user input for a value of the given type.
    ///
    /// Dates accept `now`, RFC 3339, or Unix seconds. Enums must be one of
    /// `values` when given.
    pub fn parse(scalar: ScalarType, values: Option<&[&str]>, input: &str) -> Result<Self> {
        let input = input.trim();
        match scalar {
            ScalarType::Number => input
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Number)
                .ok_or_else(|| Error::invalid_argument(format!("{input:?} is not a number"))),
            ScalarType::Enum => match values {
                Some(allowed) if !allowed.contains(&input) => Err(Error::invalid_argument(
                    format!("{input:?} is not one of {}", allowed.join(", ")),
                )),
                _ => Ok(Value::Enum(input.to_string())),
            },
            ScalarType::Date => {
                if input.eq_ignore_ascii_case("now") {
                    return Ok(Value::Time(OffsetDateTime::now_utc()));
                }
                if let Ok(secs) = input.parse::<i64>() {
                    return OffsetDateTime::from_unix_timestamp(secs)
                        .map(Value::Time)
                        .map_err(|e| Error::invalid_argument(e.to_string()));
                }
                OffsetDateTime::parse(input, &Rfc3339)
                    .map(Value::Time)
                    .map_err(|e| Error::invalid_argument(format!("invalid date {input:?}: {e}")))
            }
        }
    }

    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Enum(s) => f.write_str(s),
            Value::Time(t) => match t.format(&Rfc3339) {
                Ok(s) => f.write_str(&s),
                Err(_) => write!(f, "{t}"),
            },
        }
    }
}

/// Field key to decoded value.
pub type Reading = BTreeMap<String, Value>;

/// A read operation on model `M`.
pub type ReadFn<M> = for<'a> fn(&'a M) -> BoxFuture<'a, Result<Reading>>;

/// A write operation on model `M`.
pub type WriteFn<M> = for<'a> fn(&'a M, Value) -> BoxFuture<'a, Result<()>>;

/// Descriptor plus dispatch for one model.
pub struct CapabilityTable<M: 'static> {
    descriptor: CapabilityDescriptor,
    reads: Vec<(&'static str, ReadFn<M>)>,
    writes: Vec<(&'static str, WriteFn<M>)>,
}

impl<M: 'static> fmt::Debug for CapabilityTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityTable")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<M: 'static> Default for CapabilityTable<M> {
    fn default() -> Self {
        Self {
            descriptor: CapabilityDescriptor::default(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }
}

impl<M: 'static> CapabilityTable<M> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read operation.
    #[must_use]
    pub fn read(
        mut self,
        operation: &'static str,
        fields: Vec<FieldDescriptor>,
        op: ReadFn<M>,
    ) -> Self {
        self.descriptor.read.push(ReadDescriptor { operation, fields });
        self.reads.push((operation, op));
        self
    }

    /// Register a write operation.
    #[must_use]
    pub fn write(
        mut self,
        operation: &'static str,
        name: &'static str,
        scalar: ScalarType,
        values: Option<&'static [&'static str]>,
        op: WriteFn<M>,
    ) -> Self {
        self.descriptor.write.push(WriteDescriptor {
            operation,
            name,
            scalar,
            values,
        });
        self.writes.push((operation, op));
        self
    }

    /// The static description of this table.
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// Run a read operation by name.
    pub async fn invoke_read(&self, model: &M, operation: &str) -> Result<Reading> {
        let op = self
            .reads
            .iter()
            .find(|(name, _)| *name == operation)
            .map(|(_, op)| *op)
            .ok_or_else(|| Error::invalid_argument(format!("unknown read operation {operation:?}")))?;
        op(model).await
    }

    /// Run a write operation by name.
    pub async fn invoke_write(&self, model: &M, operation: &str, value: Value) -> Result<()> {
        let op = self
            .writes
            .iter()
            .find(|(name, _)| *name == operation)
            .map(|(_, op)| *op)
            .ok_or_else(|| {
                Error::invalid_argument(format!("unknown write operation {operation:?}"))
            })?;
        op(model, value).await
    }
}

/// Build a one-field [`Reading`].
pub(crate) fn reading(key: &str, value: Value) -> Reading {
    let mut out = Reading::new();
    out.insert(key.to_string(), value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u8);

    fn read_count(counter: &Counter) -> BoxFuture<'_, Result<Reading>> {
        Box::pin(async move { Ok(reading("n", Value::Number(f64::from(counter.0)))) })
    }

    fn write_count(_counter: &Counter, value: Value) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match value {
                Value::Number(_) => Ok(()),
                _ => Err(Error::invalid_argument("expected a number")),
            }
        })
    }

    fn table() -> CapabilityTable<Counter> {
        CapabilityTable::new()
            .read(
                "getCount",
                vec![FieldDescriptor::number("n", "Count", None)],
                read_count,
            )
            .write("setCount", "Count", ScalarType::Number, None, write_count)
    }

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let table = table();
        let reading = table.invoke_read(&Counter(7), "getCount").await.unwrap();
        assert_eq!(reading["n"], Value::Number(7.0));

        table
            .invoke_write(&Counter(0), "setCount", Value::Number(1.0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_operation_is_invalid_argument() {
        let table = table();
        let err = table.invoke_read(&Counter(0), "getNothing").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = table
            .invoke_write(&Counter(0), "getCount", Value::Number(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_descriptor_json_shape() {
        let table = table();
        let json: serde_json::Value =
            serde_json::from_str(&table.descriptor().to_json().unwrap()).unwrap();
        assert_eq!(json["read"][0]["operation"], "getCount");
        assert_eq!(json["read"][0]["fields"][0]["scalar"], "Number");
        assert!(json["read"][0]["fields"][0].get("unit").is_none());
        assert_eq!(json["write"][0]["name"], "Count");
    }

    #[test]
    fn test_value_parse_enum() {
        const UNITS: &[&str] = &["C", "F"];
        assert_eq!(
            Value::parse(ScalarType::Enum, Some(UNITS), "F").unwrap(),
            Value::Enum("F".into())
        );
        assert!(matches!(
            Value::parse(ScalarType::Enum, Some(UNITS), "K"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_value_parse_date() {
        let value = Value::parse(ScalarType::Date, None, "1700000000").unwrap();
        assert_eq!(value.to_string(), "2023-11-14T22:13:20Z");

        let value = Value::parse(ScalarType::Date, None, "2024-03-01T12:00:00+02:00").unwrap();
        let Value::Time(t) = value else {
            panic!("expected a time");
        };
        assert_eq!(t.unix_timestamp(), 1_709_287_200);

        assert!(matches!(Value::parse(ScalarType::Date, None, "now"), Ok(Value::Time(_))));
        assert!(Value::parse(ScalarType::Date, None, "yesterday").is_err());
    }

    #[test]
    fn test_value_parse_number() {
        assert_eq!(
            Value::parse(ScalarType::Number, None, " 21.5 ").unwrap(),
            Value::Number(21.5)
        );
        assert!(Value::parse(ScalarType::Number, None, "NaN").is_err());
    }
}
