//! Data model shared by the parser, classifier, store and orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field holding the filtered `showinf` report, one value per line.
pub const IMAGE_INFORMATION: &str = "image_information";

/// Field holding the preview location (or the inline encoded preview).
pub const PREVIEW_IMAGE: &str = "previewImage";

/// The two independently locked sub-operations of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// `showinf` report lines.
    Metadata,
    /// The contrast-stretched first plane.
    Preview,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Preview => "preview",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter schema, identified by namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    /// Unique key of the schema.
    pub namespace: String,
    /// Display name.
    pub name: String,
}

impl Schema {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)
    }
}

/// Semantic type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Numeric,
    Text,
}

/// A persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Numeric(f64),
    Text(String),
}

impl ParameterValue {
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        match self {
            Self::Numeric(_) => ParameterKind::Numeric,
            Self::Text(_) => ParameterKind::Text,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Numeric(_) => None,
        }
    }
}

/// A registered parameter name within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterName {
    pub schema: Schema,
    pub name: String,
    pub kind: ParameterKind,
}

/// A named, typed value as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub value: ParameterValue,
}

/// Opaque handle to a persisted parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSetId(pub u64);

impl fmt::Display for ParameterSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An exact fraction, classified as numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: i64,
    pub denominator: i64,
}

impl Rational {
    #[must_use]
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Decimal value, or `None` for a zero denominator.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> Option<f64> {
        (self.denominator != 0).then(|| self.numerator as f64 / self.denominator as f64)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// A value before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    Rational(Rational),
    /// A multi-line field; always text, one record per surviving line.
    Lines(Vec<String>),
}

/// Collected values for one sub-operation, keyed by field name in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDump {
    entries: Vec<(String, RawValue)>,
}

impl MetadataDump {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, replacing any earlier value under the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: RawValue) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
