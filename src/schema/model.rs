//! Model schema: per-verb input validation and output shaping

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{FieldDef, FieldType};
use crate::core::error::{CoreError, CoreResult, FieldIssue};
use crate::storage::Record;

/// Primary key every model carries
pub const ID_FIELD: &str = "id";

/// Pagination parameters accepted by list
pub const LIMIT_PARAM: &str = "limit";
pub const OFFSET_PARAM: &str = "offset";

/// Bulk payload keys
pub const ROWS_PARAM: &str = "rows";
pub const IDS_PARAM: &str = "ids";

/// Parent resource a model is nested under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    /// Parent REST resource segment, e.g. `tenants`
    pub resource: String,
    /// Field on this model holding the parent id, e.g. `tenant_id`
    pub key: String,
}

/// Schema definition for a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Model name used in RPC methods (`Item.create`)
    pub name: String,

    /// REST resource segment; defaults to the lowercased plural name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Declared fields, excluding the implicit `id`
    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,

    /// Enabled CRUD verbs; all of them when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbs: Option<Vec<String>>,
}

/// How params are checked for a given verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeMode {
    /// New row: no `id`, required fields enforced, defaults applied
    Create,
    /// Partial update of an existing row
    Update,
    /// Full replacement of an existing row
    Replace,
    /// Only addresses a row (read, delete)
    Key,
    /// Equality filters plus pagination (list, clear)
    Filter,
    /// `{"rows": [...]}`, each row checked as create
    BulkCreate,
    /// `{"ids": [...]}`
    BulkDelete,
}

impl ModelSchema {
    /// Schema with no declared fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: None,
            fields: Vec::new(),
            parent: None,
            verbs: None,
        }
    }

    /// Add a field
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Override the REST resource segment
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Nest this model under a parent resource
    pub fn parent(mut self, resource: impl Into<String>, key: impl Into<String>) -> Self {
        self.parent = Some(ParentRef {
            resource: resource.into(),
            key: key.into(),
        });
        self.ensure_parent_field();
        self
    }

    /// Restrict the CRUD verbs bound for this model
    pub fn verbs(mut self, verbs: &[&str]) -> Self {
        self.verbs = Some(verbs.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Declare the parent key as a field if the schema omits it
    pub fn ensure_parent_field(&mut self) {
        if let Some(parent) = &self.parent {
            if self.get_field(&parent.key).is_none() {
                let field = FieldDef::new(parent.key.clone(), FieldType::String);
                self.fields.push(field);
            }
        }
    }

    /// REST resource segment
    pub fn resource_name(&self) -> String {
        self.resource
            .clone()
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()))
    }

    /// Look up a declared field
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields declared unique
    pub fn unique_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Parent key field name, if nested
    pub fn parent_key(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.key.as_str())
    }

    /// Check and normalize call params for the given mode
    pub fn validate(&self, mode: ShapeMode, params: &Record) -> CoreResult<Record> {
        let mut issues = Vec::new();
        let out = match mode {
            ShapeMode::Create => self.check_row(params, RowRules::CREATE, "", &mut issues),
            ShapeMode::Update => self.check_row(params, RowRules::UPDATE, "", &mut issues),
            ShapeMode::Replace => self.check_row(params, RowRules::REPLACE, "", &mut issues),
            ShapeMode::Key => self.check_key(params, &mut issues),
            ShapeMode::Filter => self.check_filter(params, &mut issues),
            ShapeMode::BulkCreate => self.check_bulk_rows(params, &mut issues),
            ShapeMode::BulkDelete => self.check_bulk_ids(params, &mut issues),
        };

        if issues.is_empty() {
            Ok(out)
        } else {
            Err(CoreError::invalid_fields(issues))
        }
    }

    /// Strip write-only fields from a result
    pub fn shape_output(&self, value: Value) -> Value {
        match value {
            Value::Object(mut obj) => {
                for field in self.fields.iter().filter(|f| f.write_only) {
                    obj.remove(&field.name);
                }
                Value::Object(obj)
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.shape_output(v)).collect())
            }
            other => other,
        }
    }

    fn check_row(
        &self,
        input: &Record,
        rules: RowRules,
        prefix: &str,
        issues: &mut Vec<FieldIssue>,
    ) -> Record {
        let mut out = Record::new();

        for (key, value) in input {
            let path = format!("{prefix}{key}");
            if key == ID_FIELD {
                if !rules.needs_id {
                    issues.push(FieldIssue::new(path, "read_only", "field is read-only"));
                } else if let Some(id) = normalize_id(value) {
                    out.insert(key.clone(), id);
                } else {
                    issues.push(FieldIssue::new(path, "type", "expected string or integer"));
                }
                continue;
            }

            let Some(field) = self.get_field(key) else {
                issues.push(FieldIssue::new(path, "unknown", "unknown field"));
                continue;
            };
            if field.read_only {
                issues.push(FieldIssue::new(path, "read_only", "field is read-only"));
                continue;
            }
            if value.is_null() {
                if field.required && rules.enforce_required {
                    issues.push(FieldIssue::new(path, "missing", "field is required"));
                } else {
                    out.insert(key.clone(), Value::Null);
                }
                continue;
            }
            if !field.field_type.validate(value) {
                issues.push(FieldIssue::new(
                    path,
                    "type",
                    format!("expected {}", field.field_type.as_str()),
                ));
                continue;
            }
            out.insert(key.clone(), value.clone());
        }

        if rules.needs_id && !input.contains_key(ID_FIELD) {
            issues.push(FieldIssue::new(
                format!("{prefix}{ID_FIELD}"),
                "missing",
                "field is required",
            ));
        }

        if rules.enforce_required {
            for field in &self.fields {
                if out.contains_key(&field.name) || field.read_only {
                    continue;
                }
                match &field.default {
                    Some(default) => {
                        out.insert(field.name.clone(), default.clone());
                    }
                    None if field.required && !input.contains_key(&field.name) => {
                        issues.push(FieldIssue::new(
                            format!("{prefix}{}", field.name),
                            "missing",
                            "field is required",
                        ));
                    }
                    None => {}
                }
            }
        }

        out
    }

    fn check_key(&self, input: &Record, issues: &mut Vec<FieldIssue>) -> Record {
        let mut out = Record::new();
        match input.get(ID_FIELD).map(normalize_id) {
            Some(Some(id)) => {
                out.insert(ID_FIELD.to_string(), id);
            }
            Some(None) => issues.push(FieldIssue::new(
                ID_FIELD,
                "type",
                "expected string or integer",
            )),
            None => issues.push(FieldIssue::new(ID_FIELD, "missing", "field is required")),
        }

        for (key, value) in input.iter().filter(|(k, _)| k.as_str() != ID_FIELD) {
            match self.get_field(key) {
                Some(field) if field.field_type.validate(value) => {
                    out.insert(key.clone(), value.clone());
                }
                Some(field) => issues.push(FieldIssue::new(
                    key.clone(),
                    "type",
                    format!("expected {}", field.field_type.as_str()),
                )),
                None => issues.push(FieldIssue::new(key.clone(), "unknown", "unknown field")),
            }
        }
        out
    }

    fn check_filter(&self, input: &Record, issues: &mut Vec<FieldIssue>) -> Record {
        let mut out = Record::new();
        for (key, value) in input {
            let coerced = match key.as_str() {
                LIMIT_PARAM | OFFSET_PARAM => FieldType::Integer
                    .coerce(value)
                    .filter(|v| v.as_i64().map_or(false, |n| n >= 0)),
                ID_FIELD => normalize_id(value),
                _ => match self.get_field(key) {
                    Some(field) => field.field_type.coerce(value),
                    None => {
                        issues.push(FieldIssue::new(key.clone(), "unknown", "unknown field"));
                        continue;
                    }
                },
            };
            match coerced {
                Some(v) => {
                    out.insert(key.clone(), v);
                }
                None => issues.push(FieldIssue::new(key.clone(), "type", "invalid filter value")),
            }
        }
        out
    }

    fn check_bulk_rows(&self, input: &Record, issues: &mut Vec<FieldIssue>) -> Record {
        let mut out = Record::new();
        let inherited = self.inherited_parent(input, issues);

        let rows = match input.get(ROWS_PARAM) {
            Some(Value::Array(rows)) => rows,
            Some(_) => {
                issues.push(FieldIssue::new(ROWS_PARAM, "type", "expected array of objects"));
                return out;
            }
            None => {
                issues.push(FieldIssue::new(ROWS_PARAM, "missing", "field is required"));
                return out;
            }
        };

        let mut checked = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let prefix = format!("{ROWS_PARAM}[{i}].");
            let Some(obj) = row.as_object() else {
                issues.push(FieldIssue::new(
                    format!("{ROWS_PARAM}[{i}]"),
                    "type",
                    "expected object",
                ));
                continue;
            };
            let mut obj = obj.clone();
            if let Some((key, value)) = &inherited {
                obj.insert(key.clone(), value.clone());
            }
            checked.push(Value::Object(self.check_row(&obj, RowRules::CREATE, &prefix, issues)));
        }

        out.insert(ROWS_PARAM.to_string(), Value::Array(checked));
        if let Some((key, value)) = inherited {
            out.insert(key, value);
        }
        out
    }

    fn check_bulk_ids(&self, input: &Record, issues: &mut Vec<FieldIssue>) -> Record {
        let mut out = Record::new();
        let inherited = self.inherited_parent(input, issues);

        match input.get(IDS_PARAM) {
            Some(Value::Array(ids)) => {
                let mut normalized = Vec::with_capacity(ids.len());
                for (i, id) in ids.iter().enumerate() {
                    match normalize_id(id) {
                        Some(id) => normalized.push(id),
                        None => issues.push(FieldIssue::new(
                            format!("{IDS_PARAM}[{i}]"),
                            "type",
                            "expected string or integer",
                        )),
                    }
                }
                out.insert(IDS_PARAM.to_string(), Value::Array(normalized));
            }
            Some(_) => issues.push(FieldIssue::new(IDS_PARAM, "type", "expected array")),
            None => issues.push(FieldIssue::new(IDS_PARAM, "missing", "field is required")),
        }

        if let Some((key, value)) = inherited {
            out.insert(key, value);
        }
        out
    }

    /// Parent key passed beside a bulk payload; anything else is unknown
    fn inherited_parent(
        &self,
        input: &Record,
        issues: &mut Vec<FieldIssue>,
    ) -> Option<(String, Value)> {
        let mut inherited = None;
        for (key, value) in input {
            if key == ROWS_PARAM || key == IDS_PARAM {
                continue;
            }
            if Some(key.as_str()) == self.parent_key() {
                inherited = Some((key.clone(), value.clone()));
            } else {
                issues.push(FieldIssue::new(key.clone(), "unknown", "unknown field"));
            }
        }
        inherited
    }
}

#[derive(Debug, Clone, Copy)]
struct RowRules {
    needs_id: bool,
    enforce_required: bool,
}

impl RowRules {
    const CREATE: Self = Self {
        needs_id: false,
        enforce_required: true,
    };
    const UPDATE: Self = Self {
        needs_id: true,
        enforce_required: false,
    };
    const REPLACE: Self = Self {
        needs_id: true,
        enforce_required: true,
    };
}

/// Ids travel as strings; integers from clients are accepted and stringified
fn normalize_id(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if !s.is_empty() => Some(value.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::String(n.to_string())),
        _ => None,
    }
}
