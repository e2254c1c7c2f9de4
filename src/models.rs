// =============================================================================
// models.rs — JOB POSTINGS, TYPED
// =============================================================================
//
// Upstream hands us loosely shaped JSON: a handful of text fields, maybe a
// skills list, maybe some extra columns nobody told us about. We validate
// that once, here, into a Record whose every field is either text or a list
// of text. Nothing downstream ever has to ask "what type is this?" again.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{ImpactError, Result};

/// A single non-identifier field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar text, e.g. a title or a description.
    Text(String),
    /// List of text, e.g. skills.
    List(Vec<String>),
}

impl FieldValue {
    /// Flatten the field into one string; list items are joined by spaces.
    pub fn flatten(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(" "),
        }
    }

    fn from_json(field: &str, value: Value) -> Result<Option<FieldValue>> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(FieldValue::Text(text))),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(text) => list.push(text),
                        other => {
                            return Err(ImpactError::Schema {
                                field: field.to_string(),
                                reason: format!("list items must be strings, found {}", json_kind(&other)),
                            })
                        }
                    }
                }
                Ok(Some(FieldValue::List(list)))
            }
            other => Err(ImpactError::Schema {
                field: field.to_string(),
                reason: format!("expected a string or a list of strings, found {}", json_kind(&other)),
            }),
        }
    }
}

/// A job posting joined with its organization.
///
/// Missing optional fields are empty. The identifier never contributes to
/// the document text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub org_name: String,
    pub org_description: String,
    pub skills: Vec<String>,
    /// Any other text or list fields, kept in lexical key order.
    pub extra: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Build a record from the four core text fields.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        org_name: impl Into<String>,
        org_description: impl Into<String>,
    ) -> Self {
        Record {
            title: title.into(),
            description: description.into(),
            org_name: org_name.into(),
            org_description: org_description.into(),
            ..Record::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Validate a raw JSON object into a record.
    ///
    /// Strings and lists of strings are accepted for every field; `null`
    /// counts as missing. Anything else is a schema error. The identifier
    /// may be a string or a number.
    pub fn from_json(object: Map<String, Value>) -> Result<Self> {
        let mut record = Record::default();

        for (key, value) in object {
            if key == "id" {
                record.id = match value {
                    Value::Null => None,
                    Value::String(id) => Some(id),
                    Value::Number(id) => Some(id.to_string()),
                    other => {
                        return Err(ImpactError::Schema {
                            field: key,
                            reason: format!("identifier must be a string or number, found {}", json_kind(&other)),
                        })
                    }
                };
                continue;
            }

            let Some(field) = FieldValue::from_json(&key, value)? else {
                continue;
            };

            match (key.as_str(), field) {
                ("title", FieldValue::Text(text)) => record.title = text,
                ("description", FieldValue::Text(text)) => record.description = text,
                ("org_name", FieldValue::Text(text)) => record.org_name = text,
                ("org_description", FieldValue::Text(text)) => record.org_description = text,
                ("skills", FieldValue::List(items)) => record.skills = items,
                ("skills", FieldValue::Text(text)) => record.skills = vec![text],
                ("title" | "description" | "org_name" | "org_description", FieldValue::List(_)) => {
                    return Err(ImpactError::Schema {
                        field: key,
                        reason: "expected a string, found a list".to_string(),
                    })
                }
                (_, field) => {
                    record.extra.insert(key, field);
                }
            }
        }

        Ok(record)
    }

    /// Check the fields a training source must always provide.
    pub fn validate_required(&self) -> Result<()> {
        let required = [
            ("title", &self.title),
            ("description", &self.description),
            ("org_name", &self.org_name),
            ("org_description", &self.org_description),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ImpactError::Schema {
                    field: field.to_string(),
                    reason: "required field is empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The flattened document text: every non-empty field in a fixed order
    /// (title, description, org_name, org_description, skills, extras by
    /// key), separated by single spaces.
    pub fn document(&self) -> String {
        let core = [
            self.title.as_str(),
            self.description.as_str(),
            self.org_name.as_str(),
            self.org_description.as_str(),
        ];

        let mut parts: Vec<String> = core
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect();

        if !self.skills.is_empty() {
            parts.push(self.skills.join(" "));
        }

        parts.extend(
            self.extra
                .values()
                .map(FieldValue::flatten)
                .filter(|part| !part.is_empty()),
        );

        parts.join(" ")
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = ImpactError;

    fn try_from(object: Map<String, Value>) -> Result<Self> {
        Record::from_json(object)
    }
}

impl From<Record> for Map<String, Value> {
    fn from(record: Record) -> Self {
        let mut object = Map::new();
        if let Some(id) = record.id {
            object.insert("id".to_string(), Value::String(id));
        }
        object.insert("title".to_string(), Value::String(record.title));
        object.insert("description".to_string(), Value::String(record.description));
        object.insert("org_name".to_string(), Value::String(record.org_name));
        object.insert("org_description".to_string(), Value::String(record.org_description));
        object.insert(
            "skills".to_string(),
            Value::Array(record.skills.into_iter().map(Value::String).collect()),
        );
        for (key, field) in record.extra {
            let value = match field {
                FieldValue::Text(text) => Value::String(text),
                FieldValue::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
            };
            object.insert(key, value);
        }
        object
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Lifecycle of an impact detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Constructed, nothing fitted yet.
    Init,
    /// A training cycle is in progress.
    Training,
    /// A fitted, calibrated pipeline is ready to serve predictions.
    Trained,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Init => write!(f, "init"),
            Status::Training => write!(f, "training"),
            Status::Trained => write!(f, "trained"),
        }
    }
}

/// The ensemble's verdict for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Score at or below the calibrated threshold: an impact job.
    Impact,
    /// Score above the threshold.
    NotImpact,
}

impl Verdict {
    /// The numeric label: `1` for [`Verdict::Impact`], `0` otherwise.
    pub fn label(self) -> u8 {
        match self {
            Verdict::Impact => 1,
            Verdict::NotImpact => 0,
        }
    }

    pub fn is_impact(self) -> bool {
        self == Verdict::Impact
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Impact => write!(f, "impact"),
            Verdict::NotImpact => write!(f, "not impact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_from_json_accepts_text_and_lists() {
        let record = Record::from_json(object(json!({
            "id": 42,
            "title": "Program Officer",
            "description": "Run literacy programs",
            "org_name": "Read More",
            "org_description": "Education nonprofit",
            "skills": ["writing", "grants"],
            "location": "Nairobi",
        })))
        .unwrap();

        assert_eq!(record.id.as_deref(), Some("42"));
        assert_eq!(record.skills, vec!["writing", "grants"]);
        assert_eq!(record.extra.get("location"), Some(&FieldValue::Text("Nairobi".to_string())));
    }

    #[test]
    fn test_missing_and_null_fields_are_empty() {
        let record = Record::from_json(object(json!({
            "description": "sustainability",
            "skills": null,
        })))
        .unwrap();
        assert!(record.title.is_empty());
        assert!(record.skills.is_empty());
        assert_eq!(record.document(), "sustainability");
    }

    #[test]
    fn test_numbers_are_not_coerced() {
        let err = Record::from_json(object(json!({ "title": 7 }))).unwrap_err();
        assert!(matches!(err, ImpactError::Schema { ref field, .. } if field == "title"));

        let err = Record::from_json(object(json!({ "skills": ["rust", 1] }))).unwrap_err();
        assert!(matches!(err, ImpactError::Schema { ref field, .. } if field == "skills"));
    }

    #[test]
    fn test_document_uses_fixed_field_order_and_skips_id() {
        let mut record = Record::new("Title", "Desc", "Org", "About org")
            .with_id("abc")
            .with_skills(["a", "b"]);
        record.extra.insert("zeta".to_string(), FieldValue::Text("z".to_string()));
        record.extra.insert("alpha".to_string(), FieldValue::List(vec!["x".into(), "y".into()]));

        assert_eq!(record.document(), "Title Desc Org About org a b x y z");
    }

    #[test]
    fn test_validate_required() {
        assert!(Record::new("t", "d", "o", "od").validate_required().is_ok());
        let err = Record::new("t", "", "o", "od").validate_required().unwrap_err();
        assert!(matches!(err, ImpactError::Schema { ref field, .. } if field == "description"));
    }

    #[test]
    fn test_serde_round_trip_through_map() {
        let record = Record::new("t", "d", "o", "od").with_id("1").with_skills(["s"]);
        let text = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(Verdict::Impact.label(), 1);
        assert_eq!(Verdict::NotImpact.label(), 0);
        assert!(Verdict::Impact.is_impact());
    }
}
