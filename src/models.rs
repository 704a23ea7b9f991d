use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::errors::CaseError;

/// One interview row as stored in the document store.
///
/// Keys are the English names below; the column names of the original
/// spreadsheet are accepted as aliases so imported sheets load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "事例", deserialize_with = "lenient_required_text")]
    pub case_id: String,
    #[serde(default, alias = "事例名", alias = "group_key", deserialize_with = "lenient_text")]
    pub group_name: Option<String>,
    #[serde(default, alias = "発言者", deserialize_with = "lenient_text")]
    pub speaker: Option<String>,
    #[serde(default, alias = "発言内容", deserialize_with = "lenient_text")]
    pub statement: Option<String>,
    #[serde(default, alias = "整備", deserialize_with = "lenient_text")]
    pub maintenance_type: Option<String>,
    #[serde(default, alias = "目的", deserialize_with = "lenient_text")]
    pub purpose: Option<String>,
    #[serde(default, alias = "発意", deserialize_with = "lenient_text")]
    pub initiative: Option<String>,
    #[serde(default, alias = "実行", deserialize_with = "lenient_text")]
    pub execution: Option<String>,
    #[serde(default, alias = "費用", deserialize_with = "lenient_text")]
    pub cost: Option<String>,
    #[serde(default, alias = "契機", deserialize_with = "lenient_text")]
    pub trigger: Option<String>,
    #[serde(default, alias = "時期", deserialize_with = "lenient_text")]
    pub period: Option<String>,
    #[serde(default, alias = "所有", deserialize_with = "lenient_text")]
    pub ownership: Option<String>,
    #[serde(default, alias = "管理", deserialize_with = "lenient_text")]
    pub management: Option<String>,
    #[serde(default, alias = "利用", deserialize_with = "lenient_text")]
    pub usage: Option<String>,
    #[serde(default, alias = "緯度", deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "経度", deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default, alias = "写真", alias = "photo", deserialize_with = "lenient_text")]
    pub photo_reference: Option<String>,
}

impl RawRecord {
    /// Decodes one stored document. Anything that is not a flat mapping of
    /// scalar values is a data-integrity failure.
    pub fn from_document(document_id: &str, document: Value) -> Result<Self, CaseError> {
        if !document.is_object() {
            return Err(CaseError::DataIntegrity {
                document_id: document_id.to_string(),
                reason: format!("expected an object, found {}", json_kind(&document)),
            });
        }
        serde_json::from_value(document).map_err(|e| CaseError::DataIntegrity {
            document_id: document_id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn get(&self, field: CaseField) -> Option<&str> {
        match field {
            CaseField::CaseId => Some(self.case_id.as_str()),
            CaseField::GroupName => self.group_name.as_deref(),
            CaseField::Speaker => self.speaker.as_deref(),
            CaseField::Statement => self.statement.as_deref(),
            CaseField::MaintenanceType => self.maintenance_type.as_deref(),
            CaseField::Purpose => self.purpose.as_deref(),
            CaseField::Initiative => self.initiative.as_deref(),
            CaseField::Execution => self.execution.as_deref(),
            CaseField::Cost => self.cost.as_deref(),
            CaseField::Trigger => self.trigger.as_deref(),
            CaseField::Period => self.period.as_deref(),
            CaseField::Ownership => self.ownership.as_deref(),
            CaseField::Management => self.management.as_deref(),
            CaseField::Usage => self.usage.as_deref(),
            CaseField::PhotoReference => self.photo_reference.as_deref(),
        }
    }

    /// Both coordinates, only when both are present.
    pub fn coordinate(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar_to_text<E: de::Error>(value: Value) -> Result<Option<String>, E> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) => return Err(E::invalid_type(Unexpected::Seq, &"a scalar value")),
        Value::Object(_) => return Err(E::invalid_type(Unexpected::Map, &"a scalar value")),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_to_text(Value::deserialize(deserializer)?)
}

fn lenient_required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_to_text::<D::Error>(Value::deserialize(deserializer)?)?
        .ok_or_else(|| de::Error::custom("case_id must not be empty"))
}

/// Numbers and numeric strings become coordinates; everything else is absent.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()))
}

/// Addressable fields of a [`RawRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CaseField {
    CaseId,
    GroupName,
    Speaker,
    Statement,
    MaintenanceType,
    Purpose,
    Initiative,
    Execution,
    Cost,
    Trigger,
    Period,
    Ownership,
    Management,
    Usage,
    PhotoReference,
}

impl CaseField {
    pub const ALL: [CaseField; 15] = [
        CaseField::CaseId,
        CaseField::GroupName,
        CaseField::Speaker,
        CaseField::Statement,
        CaseField::MaintenanceType,
        CaseField::Purpose,
        CaseField::Initiative,
        CaseField::Execution,
        CaseField::Cost,
        CaseField::Trigger,
        CaseField::Period,
        CaseField::Ownership,
        CaseField::Management,
        CaseField::Usage,
        CaseField::PhotoReference,
    ];

    /// Fields summarised per group, in display order.
    pub const SUMMARY: [CaseField; 10] = [
        CaseField::MaintenanceType,
        CaseField::Purpose,
        CaseField::Initiative,
        CaseField::Execution,
        CaseField::Cost,
        CaseField::Trigger,
        CaseField::Period,
        CaseField::Ownership,
        CaseField::Management,
        CaseField::Usage,
    ];

    /// Fields charted on the statistics page.
    pub const STATISTICS: [CaseField; 4] = [
        CaseField::MaintenanceType,
        CaseField::Purpose,
        CaseField::Initiative,
        CaseField::Period,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            CaseField::CaseId => "case_id",
            CaseField::GroupName => "group_name",
            CaseField::Speaker => "speaker",
            CaseField::Statement => "statement",
            CaseField::MaintenanceType => "maintenance_type",
            CaseField::Purpose => "purpose",
            CaseField::Initiative => "initiative",
            CaseField::Execution => "execution",
            CaseField::Cost => "cost",
            CaseField::Trigger => "trigger",
            CaseField::Period => "period",
            CaseField::Ownership => "ownership",
            CaseField::Management => "management",
            CaseField::Usage => "usage",
            CaseField::PhotoReference => "photo_reference",
        }
    }

    /// Column name used by the survey spreadsheet and shown in the UI.
    pub fn label(&self) -> &'static str {
        match self {
            CaseField::CaseId => "事例",
            CaseField::GroupName => "事例名",
            CaseField::Speaker => "発言者",
            CaseField::Statement => "発言内容",
            CaseField::MaintenanceType => "整備",
            CaseField::Purpose => "目的",
            CaseField::Initiative => "発意",
            CaseField::Execution => "実行",
            CaseField::Cost => "費用",
            CaseField::Trigger => "契機",
            CaseField::Period => "時期",
            CaseField::Ownership => "所有",
            CaseField::Management => "管理",
            CaseField::Usage => "利用",
            CaseField::PhotoReference => "写真",
        }
    }
}

impl fmt::Display for CaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CaseField {
    type Err = CaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CaseField::ALL
            .iter()
            .copied()
            .find(|f| f.key() == wanted || f.label() == wanted)
            .ok_or_else(|| CaseError::UnknownField(wanted.to_string()))
    }
}

/// Which field clusters records into one displayed case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    CaseId,
    GroupName,
}

impl GroupBy {
    pub fn field(&self) -> CaseField {
        match self {
            GroupBy::CaseId => CaseField::CaseId,
            GroupBy::GroupName => CaseField::GroupName,
        }
    }
}

impl FromStr for GroupBy {
    type Err = CaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<CaseField>()? {
            CaseField::CaseId => Ok(GroupBy::CaseId),
            CaseField::GroupName => Ok(GroupBy::GroupName),
            other => Err(CaseError::UnknownField(format!(
                "{} cannot be used for grouping",
                other.key()
            ))),
        }
    }
}

/// Group key value. Records lacking the grouping field share the `Absent` group,
/// which sorts after every present key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Value(String),
    Absent,
}

impl GroupKey {
    pub fn as_value(&self) -> Option<&str> {
        match self {
            GroupKey::Value(v) => Some(v.as_str()),
            GroupKey::Absent => None,
        }
    }
}

/// One aggregated case as served to the map and card views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSummary {
    pub id: Option<String>,
    pub case_id: String,
    pub name: String,
    pub subtitle: String,
    pub description: String,
    pub summary_attributes_html: String,
    pub statements_html: String,
    pub speakers_list_html: String,
    pub initiative_for_card: Option<String>,
    pub ownership_for_card: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub category: String,
    pub display_category_jp: String,
    pub is_area_wide: bool,
    pub record_count: usize,
}

/// Payload accepted by the add endpoint and the importer.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCase {
    #[serde(default, alias = "事例", deserialize_with = "lenient_text")]
    pub case_id: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl NewCase {
    /// Validates the payload at the write boundary and normalises it into a record.
    pub fn into_record(self) -> Result<RawRecord, CaseError> {
        let case_id = self.case_id.ok_or(CaseError::MissingCaseId)?;
        let mut document = self.fields;
        document.insert("case_id".to_string(), Value::String(case_id.clone()));
        RawRecord::from_document(&case_id, Value::Object(document))
    }
}

/// Payload accepted by the update and delete endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseSelector {
    #[serde(default)]
    pub document_id: Option<uuid::Uuid>,
    #[serde(default, alias = "事例", deserialize_with = "lenient_text")]
    pub case_id: Option<String>,
}
