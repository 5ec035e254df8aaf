//! Turns `validator` reports into the API's error shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::error::ApiError;

/// One failed constraint, addressed by its JSON path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub code: String,
    pub message: String,
}

fn friendly_message(code: &str) -> Option<&'static str> {
    match code {
        "required" => Some("is required"),
        "length" => Some("has invalid length"),
        "range" => Some("is out of range"),
        "url" => Some("must be a valid URL"),
        _ => None,
    }
}

/// `target_url` -> `targetUrl`, matching the wire names
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for ch in field.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn join_path(prefix: &str, field: &str) -> String {
    let field = camel_case(field);
    if prefix.is_empty() {
        field
    } else {
        format!("{prefix}.{field}")
    }
}

/// Field names in declaration order, nested structs included.
///
/// `validator` reports errors in a map; this restores the order the fields
/// are declared in, so the first reported error is the first invalid field.
pub trait FieldOrder {
    const FIELD_ORDER: &'static [&'static str];
}

fn rank(order: &[&str], field: &str) -> usize {
    order.iter().position(|f| *f == field).unwrap_or(order.len())
}

fn push_errors(out: &mut Vec<FieldError>, prefix: &str, errs: &ValidationErrors, order: &[&str]) {
    let mut fields: Vec<_> = errs.errors().iter().collect();
    fields.sort_by(|a, b| {
        rank(order, a.0)
            .cmp(&rank(order, b.0))
            .then_with(|| a.0.cmp(b.0))
    });

    for (field, kind) in fields {
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let path = join_path(prefix, field);
                for e in field_errors {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .or_else(|| friendly_message(&e.code).map(|m| format!("{path} {m}")))
                        .unwrap_or_else(|| e.code.to_string());
                    out.push(FieldError {
                        path: path.clone(),
                        code: e.code.to_string(),
                        message,
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                push_errors(out, &join_path(prefix, field), nested, order);
            }
            ValidationErrorsKind::List(items) => {
                let base = join_path(prefix, field);
                for (idx, nested) in items {
                    push_errors(out, &format!("{base}[{idx}]"), nested, order);
                }
            }
        }
    }
}

pub fn field_errors(errs: &ValidationErrors, order: &[&str]) -> Vec<FieldError> {
    let mut out = Vec::new();
    push_errors(&mut out, "", errs, order);
    out
}

/// Deserialize and validate a JSON body.
///
/// The first failure becomes the error message; all of them go to `details`.
pub fn validate<T>(data: Value) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate + FieldOrder,
{
    let parsed: T = serde_json::from_value(data).map_err(|e| {
        ApiError::validation(format!("Invalid request body: {e}"))
            .with_details(json!([{ "path": "_schema", "code": "parse", "message": e.to_string() }]))
    })?;

    parsed.validate().map_err(|e| {
        let errors = field_errors(&e, T::FIELD_ORDER);
        let message = errors
            .first()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "Validation failed".to_string());
        ApiError::validation(message).with_details(json!(errors))
    })?;

    Ok(parsed)
}
