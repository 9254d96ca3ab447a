//! Declarative request validation rules.
//!
//! A [`ValidationSchema`] holds one rule map per request section plus
//! optional file-upload constraints and options. The rule vocabulary is
//! intentionally small; applications needing more plug in their own
//! [`SchemaValidator`](crate::http::middleware::validation::SchemaValidator).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name to rule, for one request section.
pub type SectionSchema = BTreeMap<String, FieldRule>;

/// Per-section validation rules for a route or subroute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<SectionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<SectionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<SectionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<SectionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<SectionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_upload: Option<FileUploadRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ValidationOptions>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.body.get_or_insert_with(BTreeMap::new).insert(field.into(), rule);
        self
    }

    pub fn query(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.query.get_or_insert_with(BTreeMap::new).insert(field.into(), rule);
        self
    }

    pub fn param(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.params.get_or_insert_with(BTreeMap::new).insert(field.into(), rule);
        self
    }

    pub fn header(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.headers.get_or_insert_with(BTreeMap::new).insert(field.into(), rule);
        self
    }

    pub fn cookie(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.cookies.get_or_insert_with(BTreeMap::new).insert(field.into(), rule);
        self
    }

    pub fn file_upload(mut self, rule: FileUploadRule) -> Self {
        self.file_upload = Some(rule);
        self
    }

    pub fn options(mut self, options: ValidationOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

/// Constraints on a single field.
///
/// `min`/`max` bound string length, array length, or numeric value
/// depending on the field kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Value>,
}

impl FieldRule {
    pub fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    pub fn number() -> Self {
        Self::of(FieldKind::Number)
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn object() -> Self {
        Self::of(FieldKind::Object)
    }

    pub fn array() -> Self {
        Self::of(FieldKind::Array)
    }

    pub fn any() -> Self {
        Self::of(FieldKind::Any)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.one_of = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Constraints on files parsed by an upstream upload parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileUploadRule {
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_mime_types: Vec<String>,
}

/// Validation behavior switches. Defaults: report every error, reject unknown fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationOptions {
    pub abort_early: bool,
    pub allow_unknown: bool,
}
