//! Request body validation against schema field definitions.

use crate::error::AppError;
use crate::schema::{FieldDef, FieldType, SchemaDefinition, ValidationRule};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Validator contract installed on the host. `partial` validates only the fields present (PATCH).
pub trait Validator: Send + Sync + Debug {
    fn validate(&self, schema: &SchemaDefinition, body: &Map<String, Value>, partial: bool) -> Result<(), AppError>;
}

/// Default validator: required fields, declared types, and per-field rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, schema: &SchemaDefinition, body: &Map<String, Value>, partial: bool) -> Result<(), AppError> {
        for (name, def) in &schema.fields {
            match body.get(name) {
                Some(v) => validate_field(name, v, def)?,
                None if def.required && !partial => return Err(invalid(name, "is required")),
                None => {}
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, problem: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("{} {}", field, problem))
}

fn validate_field(field: &str, v: &Value, def: &FieldDef) -> Result<(), AppError> {
    if v.is_null() {
        return match def.required {
            true => Err(invalid(field, "is required")),
            false => Ok(()),
        };
    }
    if !matches_type(v, def.type_) {
        return Err(invalid(field, format!("must be of type {:?}", def.type_).to_lowercase()));
    }
    match rule_violation(v, &def.rule)? {
        Some(problem) => Err(invalid(field, problem)),
        None => Ok(()),
    }
}

fn matches_type(v: &Value, ty: FieldType) -> bool {
    match ty {
        FieldType::String => v.is_string(),
        FieldType::Number => v.is_number(),
        FieldType::Integer => v.is_i64() || v.is_u64(),
        FieldType::Boolean => v.is_boolean(),
        FieldType::Date => v.as_str().is_some_and(|s| {
            chrono::DateTime::parse_from_rfc3339(s).is_ok() || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        }),
        // Relationship fields hold one id or an array of ids.
        FieldType::Id => v.is_string() || v.as_array().is_some_and(|ids| ids.iter().all(Value::is_string)),
        FieldType::Array => v.is_array(),
        FieldType::Object => v.is_object(),
        FieldType::Mixed => true,
    }
}

/// First rule the value breaks, as the text following the field name.
fn rule_violation(v: &Value, rule: &ValidationRule) -> Result<Option<String>, AppError> {
    let text = v.as_str();
    let number = v.as_f64();

    if let (Some(format), Some(s)) = (rule.format.as_deref(), text) {
        if let Some(expected) = format_violation(s, format) {
            return Ok(Some(format!("must be a valid {}", expected)));
        }
    }
    if let Some(s) = text {
        let len = s.chars().count() as u64;
        match (rule.min_length, rule.max_length) {
            (_, Some(max)) if len > max as u64 => return Ok(Some(format!("must be at most {} characters", max))),
            (Some(min), _) if len < min as u64 => return Ok(Some(format!("must be at least {} characters", min))),
            _ => {}
        }
        // Checked when the schema set is built.
        if let Some(re) = rule.regex().map_err(|e| AppError::BadRequest(format!("unusable pattern: {}", e)))? {
            if !re.is_match(s) {
                return Ok(Some(format!("does not match {}", re.as_str())));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| same_value(v, a)) {
            let listed: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Ok(Some(format!("must be one of {}", listed.join(", "))));
        }
    }
    if let Some(n) = number {
        match (rule.minimum, rule.maximum) {
            (Some(min), _) if n < min => return Ok(Some(format!("must be >= {}", min))),
            (_, Some(max)) if n > max => return Ok(Some(format!("must be <= {}", max))),
            _ => {}
        }
    }
    Ok(None)
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Name of the format `s` fails, if any. Unknown formats pass.
fn format_violation(s: &str, format: &str) -> Option<&'static str> {
    match format.to_ascii_lowercase().as_str() {
        "email" if s.len() < 3 || !s.contains('@') => Some("email"),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => Some("UUID"),
        "uri" | "url" if !s.contains("://") => Some("URI"),
        _ => None,
    }
}
