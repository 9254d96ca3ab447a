//! Schema validation stage.
//!
//! # Responsibilities
//! - Sanitize a route's [`ValidationSchema`] once, at composition
//! - Validate body, query, params, headers and cookies per request
//! - Short-circuit with a structured error payload on failure
//!
//! # Design Decisions
//! - Empty sections are dropped; no sections left means no stage
//! - Header field names are lower-cased (headers are case-insensitive)
//! - Wire sections (query, params, headers, cookies) carry strings; numeric
//!   and boolean rules parse them
//! - Unknown-field checks apply to body and query only: params include
//!   ancestor captures and headers always carry transport noise

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::http::middleware::{Stage, StageKind};
use crate::http::request::RequestData;
use crate::http::response::{self, forward_error};
use crate::observability::metrics;
use crate::tree::schema::{FieldKind, FieldRule, SectionSchema, ValidationOptions, ValidationSchema};

/// Request section a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Body,
    Query,
    Params,
    Headers,
    Cookies,
    FileUpload,
}

impl Section {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Query => "query",
            Self::Params => "params",
            Self::Headers => "headers",
            Self::Cookies => "cookies",
            Self::FileUpload => "fileUpload",
        }
    }

    /// Sections whose values arrive as strings.
    const fn is_wire(self) -> bool {
        !matches!(self, Self::Body)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub section: Section,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(section: Section, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Schema after sanitization: non-empty sections only, options resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedSchema {
    pub sections: Vec<(Section, SectionSchema)>,
    pub options: ValidationOptions,
}

impl SanitizedSchema {
    /// Drop empty sections and lower-case header names.
    ///
    /// Returns `None` when nothing is left to validate. `fileUpload` is not
    /// part of the result; it runs as its own stage.
    pub fn from_schema(schema: &ValidationSchema) -> Option<Self> {
        let candidates = [
            (Section::Body, &schema.body),
            (Section::Query, &schema.query),
            (Section::Params, &schema.params),
            (Section::Headers, &schema.headers),
            (Section::Cookies, &schema.cookies),
        ];

        let sections: Vec<(Section, SectionSchema)> = candidates
            .into_iter()
            .filter_map(|(section, rules)| {
                let rules = rules.as_ref().filter(|r| !r.is_empty())?;
                let rules = if section == Section::Headers {
                    rules
                        .iter()
                        .map(|(name, rule)| (name.to_ascii_lowercase(), rule.clone()))
                        .collect()
                } else {
                    rules.clone()
                };
                Some((section, rules))
            })
            .collect();

        if sections.is_empty() {
            None
        } else {
            Some(Self {
                sections,
                options: schema.options.unwrap_or_default(),
            })
        }
    }
}

/// Values to validate, borrowed from the request.
pub struct ValidationInput<'a> {
    pub body: &'a Value,
    pub query: &'a Map<String, Value>,
    pub params: &'a Map<String, Value>,
    pub headers: &'a HeaderMap,
    pub cookies: &'a BTreeMap<String, String>,
}

impl<'a> ValidationInput<'a> {
    pub fn new(data: &'a RequestData, headers: &'a HeaderMap) -> Self {
        Self {
            body: &data.body,
            query: &data.query,
            params: &data.params,
            headers,
            cookies: &data.cookies,
        }
    }
}

/// Evaluates a sanitized schema against a request.
pub trait SchemaValidator: Send + Sync + 'static {
    fn validate(&self, schema: &SanitizedSchema, input: &ValidationInput<'_>) -> Vec<FieldError>;
}

/// Renders validation failures into a response.
pub type ValidationErrorHandler = Arc<dyn Fn(&[FieldError]) -> Response + Send + Sync>;

/// Default rendering: `400 { message, errors }`.
pub fn default_error_response(errors: &[FieldError]) -> Response {
    response::json(
        StatusCode::BAD_REQUEST,
        json!({ "message": "Validation failed", "errors": errors }),
    )
}

/// Built-in validator for [`FieldRule`] schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl SchemaValidator for RuleValidator {
    fn validate(&self, schema: &SanitizedSchema, input: &ValidationInput<'_>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let abort_early = schema.options.abort_early;

        for (section, rules) in &schema.sections {
            let fields = section_fields(*section, input);

            if *section == Section::Body && !(input.body.is_object() || input.body.is_null()) {
                errors.push(FieldError::new(Section::Body, "", "\"value\" must be of type object"));
                if abort_early {
                    return errors;
                }
                continue;
            }

            for (field, rule) in rules {
                if let Some(message) = check_field(*section, field, rule, fields.get(field)) {
                    errors.push(FieldError::new(*section, field.clone(), message));
                    if abort_early {
                        return errors;
                    }
                }
            }

            if !schema.options.allow_unknown && matches!(section, Section::Body | Section::Query) {
                for field in fields.keys().filter(|k| !rules.contains_key(*k)) {
                    errors.push(FieldError::new(
                        *section,
                        field.clone(),
                        format!("\"{field}\" is not allowed"),
                    ));
                    if abort_early {
                        return errors;
                    }
                }
            }
        }
        errors
    }
}

fn section_fields(section: Section, input: &ValidationInput<'_>) -> BTreeMap<String, Value> {
    match section {
        Section::Body => input
            .body
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
        Section::Query => input.query.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Section::Params => input.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Section::Headers => input
            .headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_string(), Value::String(value.to_str().ok()?.to_string())))
            })
            .collect(),
        Section::Cookies => input
            .cookies
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
        Section::FileUpload => BTreeMap::new(),
    }
}

fn check_field(section: Section, field: &str, rule: &FieldRule, value: Option<&Value>) -> Option<String> {
    let value = match value {
        None | Some(Value::Null) => {
            return rule.required.then(|| format!("\"{field}\" is required"));
        }
        Some(value) => coerce(section, rule.kind, value),
    };

    let type_error = |expected: &str| Some(format!("\"{field}\" must be {expected}"));
    let measured = match (rule.kind, &value) {
        (FieldKind::String, Value::String(s)) => Some(("length", s.chars().count() as f64)),
        (FieldKind::String, _) => return type_error("a string"),
        (FieldKind::Number, Value::Number(n)) => n.as_f64().map(|n| ("value", n)),
        (FieldKind::Number, _) => return type_error("a number"),
        (FieldKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
            n.as_f64().map(|n| ("value", n))
        }
        (FieldKind::Integer, _) => return type_error("an integer"),
        (FieldKind::Boolean, Value::Bool(_)) => None,
        (FieldKind::Boolean, _) => return type_error("a boolean"),
        (FieldKind::Object, Value::Object(_)) => None,
        (FieldKind::Object, _) => return type_error("of type object"),
        (FieldKind::Array, Value::Array(a)) => Some(("length", a.len() as f64)),
        (FieldKind::Array, _) => return type_error("an array"),
        (FieldKind::Any, _) => None,
    };

    if let Some((measure, amount)) = measured {
        if let Some(min) = rule.min.filter(|min| amount < *min) {
            return Some(match measure {
                "length" => format!("\"{field}\" length must be at least {min} long"),
                _ => format!("\"{field}\" must be greater than or equal to {min}"),
            });
        }
        if let Some(max) = rule.max.filter(|max| amount > *max) {
            return Some(match measure {
                "length" => format!("\"{field}\" length must be less than or equal to {max} long"),
                _ => format!("\"{field}\" must be less than or equal to {max}"),
            });
        }
    }

    if !rule.one_of.is_empty() && !rule.one_of.contains(&value) {
        let allowed: Vec<String> = rule.one_of.iter().map(|v| v.to_string()).collect();
        return Some(format!("\"{field}\" must be one of [{}]", allowed.join(", ")));
    }
    None
}

/// Parse wire strings into the rule's kind; other values pass unchanged.
fn coerce(section: Section, kind: FieldKind, value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    if !section.is_wire() {
        return value.clone();
    }
    let parsed = match kind {
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        FieldKind::Integer => raw.parse::<i64>().ok().map(Value::from),
        FieldKind::Boolean => match raw.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    };
    parsed.unwrap_or_else(|| value.clone())
}

/// Build the validation stage, or `None` if the schema has nothing to check.
pub(crate) fn stage(
    schema: Option<&ValidationSchema>,
    validator: &Arc<dyn SchemaValidator>,
    on_error: &ValidationErrorHandler,
) -> Option<Stage> {
    let schema = Arc::new(SanitizedSchema::from_schema(schema?)?);
    let validator = validator.clone();
    let on_error = on_error.clone();

    Some(Stage::new(StageKind::SchemaValidation, move |req, next| {
        let schema = schema.clone();
        let validator = validator.clone();
        let on_error = on_error.clone();
        async move {
            let (req, data) = match RequestData::load(req).await {
                Ok(loaded) => loaded,
                Err(err) => return forward_error(err),
            };

            let errors = validator.validate(&schema, &ValidationInput::new(&data, req.headers()));
            if errors.is_empty() {
                return next.run(req).await;
            }

            for error in &errors {
                metrics::record_validation_failure(error.section.as_str());
            }
            tracing::debug!(
                path = %req.uri().path(),
                errors = errors.len(),
                "Request failed validation"
            );
            on_error(errors.as_slice())
        }
    }))
}
