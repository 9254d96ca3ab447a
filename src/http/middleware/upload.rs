//! File-upload validation stage.
//!
//! Runs after user middleware so an upload parser registered there has
//! already attached [`UploadedFiles`] to the request.

use std::sync::Arc;

use axum::extract::Request;

use crate::http::middleware::validation::{FieldError, Section, ValidationErrorHandler};
use crate::http::middleware::{Stage, StageKind};
use crate::http::request::{UploadedFile, UploadedFiles};
use crate::observability::metrics;
use crate::tree::schema::FileUploadRule;

/// Check `files` against `rule`, collecting every violation.
pub fn check(rule: &FileUploadRule, files: Option<&UploadedFiles>) -> Vec<FieldError> {
    let files: &[UploadedFile] = files.map(|f| f.0.as_slice()).unwrap_or_default();
    let mut errors = Vec::new();

    if files.is_empty() {
        if rule.required {
            errors.push(FieldError::new(Section::FileUpload, "files", "\"files\" is required"));
        }
        return errors;
    }

    if let Some(max) = rule.max_files.filter(|max| files.len() > *max) {
        errors.push(FieldError::new(
            Section::FileUpload,
            "files",
            format!("\"files\" must contain less than or equal to {max} items"),
        ));
    }

    for file in files {
        if let Some(max) = rule.max_file_size.filter(|max| file.size > *max) {
            errors.push(FieldError::new(
                Section::FileUpload,
                file.field_name.clone(),
                format!("\"{}\" exceeds the maximum size of {max} bytes", file.file_name),
            ));
        }
        if !rule.allowed_mime_types.is_empty()
            && !rule
                .allowed_mime_types
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&file.content_type))
        {
            errors.push(FieldError::new(
                Section::FileUpload,
                file.field_name.clone(),
                format!(
                    "\"{}\" has type {} which is not one of [{}]",
                    file.file_name,
                    file.content_type,
                    rule.allowed_mime_types.join(", ")
                ),
            ));
        }
    }
    errors
}

pub(crate) fn stage(rule: Option<&FileUploadRule>, on_error: &ValidationErrorHandler) -> Option<Stage> {
    let rule = Arc::new(rule?.clone());
    let on_error = on_error.clone();

    Some(Stage::new(StageKind::FileUploadValidation, move |req: Request, next| {
        let rule = rule.clone();
        let on_error = on_error.clone();
        async move {
            let errors = check(&rule, req.extensions().get::<UploadedFiles>());
            if errors.is_empty() {
                return next.run(req).await;
            }
            metrics::record_validation_failure(Section::FileUpload.as_str());
            tracing::debug!(path = %req.uri().path(), errors = errors.len(), "Upload failed validation");
            on_error(errors.as_slice())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str, size: u64) -> UploadedFile {
        UploadedFile {
            field_name: "avatar".into(),
            file_name: name.into(),
            content_type: content_type.into(),
            size,
        }
    }

    #[test]
    fn test_required_without_files() {
        let rule = FileUploadRule {
            required: true,
            ..FileUploadRule::default()
        };
        let errors = check(&rule, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].section, Section::FileUpload);

        assert!(check(&FileUploadRule::default(), None).is_empty());
    }

    #[test]
    fn test_limits_and_mime_types() {
        let rule = FileUploadRule {
            required: true,
            max_files: Some(1),
            max_file_size: Some(1024),
            allowed_mime_types: vec!["image/png".into()],
        };
        let files = UploadedFiles(vec![
            file("a.png", "image/png", 10),
            file("b.gif", "image/gif", 4096),
        ]);

        let errors = check(&rule, Some(&files));
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("less than or equal to 1 items"));
        assert!(errors[1].message.contains("maximum size of 1024"));
        assert!(errors[2].message.contains("image/gif"));
    }

    #[test]
    fn test_mime_type_match_ignores_case() {
        let rule = FileUploadRule {
            allowed_mime_types: vec!["image/PNG".into()],
            ..FileUploadRule::default()
        };
        let files = UploadedFiles(vec![file("a.png", "image/png", 1)]);
        assert!(check(&rule, Some(&files)).is_empty());
    }
}
