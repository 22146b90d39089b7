//! Schema set validation: unique names and paths, resolvable relationships, compilable patterns.

use crate::error::SchemaBuildError;
use crate::schema::{SchemaDefinition, SchemaMap};
use std::collections::HashSet;
use std::sync::Arc;

/// Check the definitions for consistency and index them by name.
pub fn validate_schemas(schemas: Vec<SchemaDefinition>) -> Result<SchemaMap, SchemaBuildError> {
    let names: HashSet<&str> = schemas.iter().map(|s| s.name.as_str()).collect();

    let mut path_segments = HashSet::new();
    for s in &schemas {
        if !path_segments.insert(s.path_segment()) {
            return Err(SchemaBuildError::DuplicatePathSegment(s.path_segment()));
        }
        for (field, target) in s.relations() {
            if !names.contains(target) {
                return Err(SchemaBuildError::MissingReference {
                    schema: s.name.clone(),
                    field: field.to_string(),
                    target: target.to_string(),
                });
            }
        }
        for (field, def) in &s.fields {
            if let Err(e) = def.rule.regex() {
                return Err(SchemaBuildError::InvalidPattern {
                    schema: s.name.clone(),
                    field: field.clone(),
                    pattern: def.rule.pattern.clone().unwrap_or_default(),
                    message: e.to_string(),
                });
            }
        }
    }

    let mut map = SchemaMap::new();
    for s in schemas {
        let name = s.name.clone();
        if map.insert(name.clone(), Arc::new(s)).is_some() {
            return Err(SchemaBuildError::DuplicateSchema(name));
        }
    }
    Ok(map)
}
