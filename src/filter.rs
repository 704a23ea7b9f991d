use log::{debug, warn};

use crate::errors::CaseError;
use crate::models::{CaseField, RawRecord};

/// Record-level predicate applied before grouping or tallying.
pub trait RecordPredicate: Send + Sync {
    fn evaluate(&self, record: &RawRecord) -> Result<bool, CaseError>;
}

impl<F> RecordPredicate for F
where
    F: Fn(&RawRecord) -> Result<bool, CaseError> + Send + Sync,
{
    fn evaluate(&self, record: &RawRecord) -> Result<bool, CaseError> {
        self(record)
    }
}

/// Keeps records whose `field` contains any of `needles` as a substring.
/// Records with the field missing do not match.
#[derive(Debug, Clone)]
pub struct FieldContains {
    pub field: CaseField,
    pub needles: Vec<String>,
}

impl FieldContains {
    pub fn new<I, S>(field: CaseField, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldContains {
            field,
            needles: needles.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses `field` plus a comma separated needle list, as passed in query strings.
    pub fn parse(field: &str, needles: &str) -> Result<Self, CaseError> {
        let field = field.parse::<CaseField>()?;
        let needles: Vec<String> = needles
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if needles.is_empty() {
            return Err(CaseError::Filter {
                field: field.key().to_string(),
                reason: "no filter values given".to_string(),
            });
        }
        Ok(FieldContains { field, needles })
    }

    /// `initiative` contains 個人 (individual) or 自治会 (neighbourhood association).
    pub fn community_initiative() -> Self {
        FieldContains::new(CaseField::Initiative, ["個人", "自治会"])
    }
}

impl RecordPredicate for FieldContains {
    fn evaluate(&self, record: &RawRecord) -> Result<bool, CaseError> {
        Ok(record
            .get(self.field)
            .map(|value| self.needles.iter().any(|n| value.contains(n.as_str())))
            .unwrap_or(false))
    }
}

/// Applies `predicate` to every record. A predicate error excludes that record
/// and the pass carries on.
pub fn apply_filter<'a>(
    records: &'a [RawRecord],
    predicate: Option<&dyn RecordPredicate>,
) -> Vec<&'a RawRecord> {
    let Some(predicate) = predicate else {
        return records.iter().collect();
    };

    let kept: Vec<&RawRecord> = records
        .iter()
        .filter(|record| match predicate.evaluate(record) {
            Ok(keep) => keep,
            Err(e) => {
                warn!("Excluding record for case '{}': {}", record.case_id, e);
                false
            }
        })
        .collect();
    debug!("Filter kept {} of {} records", kept.len(), records.len());
    kept
}
