//! Schema definitions: the declared shape of each model, from which bound models and routes are derived.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Registry contents: schema name -> definition.
pub type SchemaMap = BTreeMap<String, Arc<SchemaDefinition>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    #[serde(alias = "objectid")]
    Id,
    Array,
    Object,
    Mixed,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip)]
    compiled: CompiledPattern,
}

impl ValidationRule {
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.compiled = CompiledPattern::default();
        self
    }

    /// The compiled `pattern`, if any. Compiled on first call and kept for the definition's lifetime.
    pub fn regex(&self) -> Result<Option<&Regex>, &regex::Error> {
        let Some(pattern) = self.pattern.as_deref() else {
            return Ok(None);
        };
        self.compiled.0.get_or_init(|| Regex::new(pattern)).as_ref().map(Some)
    }
}

#[derive(Clone, Debug, Default)]
struct CompiledPattern(OnceLock<Result<Regex, regex::Error>>);

/// Always equal; `pattern` carries the rule's identity.
impl PartialEq for CompiledPattern {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Target schema name for relationship fields. Holds an id (or array of ids) of that schema.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub rule: ValidationRule,
}

impl FieldDef {
    pub fn new(type_: FieldType) -> Self {
        FieldDef {
            type_,
            required: false,
            reference: None,
            rule: ValidationRule::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn reference(mut self, schema: impl Into<String>) -> Self {
        self.reference = Some(schema.into());
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rule = rule;
        self
    }
}

fn default_operations() -> Vec<Operation> {
    Operation::ALL.to_vec()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,
    /// Maintain `createdAt` / `updatedAt` on every document.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Fields never returned in API responses (password hashes, secrets).
    #[serde(default)]
    pub hidden: Vec<String>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        SchemaDefinition {
            name: name.into(),
            collection: None,
            path: None,
            fields: BTreeMap::new(),
            operations: default_operations(),
            timestamps: true,
            hidden: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn operations(mut self, ops: &[Operation]) -> Self {
        self.operations = ops.to_vec();
        self
    }

    pub fn hide(mut self, field: impl Into<String>) -> Self {
        self.hidden.push(field.into());
        self
    }

    /// Storage collection; defaults to the pluralized, lowercased schema name.
    pub fn collection_name(&self) -> String {
        self.collection.clone().unwrap_or_else(|| pluralize(&self.name.to_lowercase()))
    }

    /// Route segment; defaults to the collection name.
    pub fn path_segment(&self) -> String {
        self.path.clone().unwrap_or_else(|| self.collection_name())
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    /// Relationship fields as (field name, target schema).
    pub fn relations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(name, def)| def.reference.as_deref().map(|target| (name.as_str(), target)))
    }
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s') || word.is_empty() {
        return word.to_string();
    }
    let mut chars = word.chars().rev();
    let last = chars.next();
    let before = chars.next();
    if last == Some('y') && before.map(|c| !"aeiou".contains(c)).unwrap_or(false) {
        format!("{}ies", &word[..word.len() - 1])
    } else {
        format!("{}s", word)
    }
}
