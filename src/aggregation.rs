//! Case aggregation: merges the interview rows of one case into a single
//! display record for the map and card views.
//!
//! Every call recomputes from the records it is handed; nothing derived here
//! outlives the call.

use log::{debug, info};
use std::collections::BTreeMap;

use crate::config::AggregatorConfig;
use crate::filter::{apply_filter, RecordPredicate};
use crate::models::{CaseField, CaseSummary, GroupBy, GroupKey, RawRecord};

const STATEMENTS_HEADING: &str = "<h4>ヒアリング内容:</h4>";
const NO_STATEMENTS: &str = "<p>発言内容がありません。</p>";
const STATEMENT_META_FIELDS: [CaseField; 4] = [
    CaseField::Speaker,
    CaseField::Purpose,
    CaseField::Initiative,
    CaseField::Period,
];

/// Records clustered under one group key, in fetch order.
#[derive(Debug)]
pub struct CaseGroup<'a> {
    pub key: GroupKey,
    pub members: Vec<&'a RawRecord>,
}

/// Resolves the grouping actually used: the secondary name field only when at
/// least one record carries it, otherwise the case identifier.
pub fn effective_group_by(records: &[&RawRecord], requested: GroupBy) -> GroupBy {
    if requested == GroupBy::GroupName && records.iter().all(|r| r.group_name.is_none()) {
        info!("No record carries a group name, grouping by case_id instead");
        return GroupBy::CaseId;
    }
    requested
}

/// Partitions records by `group_by`, ordered by key with the absent-key group last.
pub fn group_records<'a>(records: &[&'a RawRecord], group_by: GroupBy) -> Vec<CaseGroup<'a>> {
    let field = group_by.field();
    let mut groups: BTreeMap<GroupKey, Vec<&'a RawRecord>> = BTreeMap::new();
    for &record in records {
        let key = match record.get(field) {
            Some(value) => GroupKey::Value(value.to_string()),
            None => GroupKey::Absent,
        };
        groups.entry(key).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(key, members)| CaseGroup { key, members })
        .collect()
}

/// Filters, groups and summarises `records`, one [`CaseSummary`] per surviving group key.
pub fn aggregate(
    records: &[RawRecord],
    filter: Option<&dyn RecordPredicate>,
    config: &AggregatorConfig,
) -> Vec<CaseSummary> {
    let kept = apply_filter(records, filter);
    let group_by = effective_group_by(&kept, config.group_by);
    let groups = group_records(&kept, group_by);

    let summaries: Vec<CaseSummary> = groups
        .iter()
        .map(|group| summarize_group(group, group_by, config))
        .collect();

    info!(
        "Aggregated {} records ({} after filtering) into {} case groups by {}",
        records.len(),
        kept.len(),
        summaries.len(),
        group_by.field()
    );
    summaries
}

fn summarize_group(group: &CaseGroup<'_>, group_by: GroupBy, config: &AggregatorConfig) -> CaseSummary {
    // Groups are never empty: every key came from at least one record.
    let first = group.members[0];
    let located = group.members.iter().copied().find(|r| r.coordinate().is_some());
    let representative = located.unwrap_or(first);

    let mut is_area_wide = false;
    let (latitude, longitude, image_url) = match located.and_then(|r| r.coordinate().map(|c| (r, c))) {
        Some((record, (lat, lon))) => (Some(lat), Some(lon), record.photo_reference.clone()),
        None if !config.area_wide_prefix.is_empty()
            && representative.case_id.starts_with(config.area_wide_prefix.as_str()) =>
        {
            is_area_wide = true;
            let (lat, lon) = config.fallback_center;
            (Some(lat), Some(lon), None)
        }
        None => (None, None, None),
    };

    let summary_attributes_html = render_summary_attributes(&group.members);
    let statements_html = render_statements(&group.members, config);

    let mut description = summary_attributes_html.clone();
    description.push_str(STATEMENTS_HEADING);
    if statements_html.is_empty() {
        description.push_str(NO_STATEMENTS);
    } else {
        description.push_str(&statements_html);
    }

    let name = match (group_by, &group.key) {
        (GroupBy::GroupName, _) => match first_value(&group.members, CaseField::GroupName, None) {
            Some(name) => name.to_string(),
            None => format!("{}{}", config.name_prefix, representative.case_id),
        },
        (GroupBy::CaseId, key) => format!(
            "{}{}",
            config.name_prefix,
            key.as_value().unwrap_or(representative.case_id.as_str())
        ),
    };

    let category_code = representative.case_id.chars().next();
    let speakers = distinct_values(&group.members, CaseField::Speaker, Some(config));

    debug!(
        "Group {:?}: {} records, coordinate={:?}, area_wide={}",
        group.key,
        group.members.len(),
        latitude.zip(longitude),
        is_area_wide
    );

    CaseSummary {
        id: group.key.as_value().map(str::to_string),
        case_id: representative.case_id.clone(),
        name,
        subtitle: first
            .statement
            .clone()
            .unwrap_or_else(|| config.no_subtitle.clone()),
        description,
        summary_attributes_html,
        statements_html,
        speakers_list_html: speakers
            .iter()
            .map(|s| escape_html(s))
            .collect::<Vec<_>>()
            .join("、"),
        initiative_for_card: first_value(&group.members, CaseField::Initiative, Some(config))
            .map(str::to_string),
        ownership_for_card: first_value(&group.members, CaseField::Ownership, Some(config))
            .map(str::to_string),
        latitude,
        longitude,
        image_url,
        category: category_code.map(String::from).unwrap_or_default(),
        display_category_jp: config.category_label(category_code).to_string(),
        is_area_wide,
        record_count: group.members.len(),
    }
}

/// Distinct present values of `field` in first-seen order. With a config the
/// unknown sentinel is skipped as well.
fn distinct_values<'a>(
    members: &[&'a RawRecord],
    field: CaseField,
    config: Option<&AggregatorConfig>,
) -> Vec<&'a str> {
    let mut seen: Vec<&'a str> = Vec::new();
    for record in members {
        if let Some(value) = record.get(field) {
            if config.map(|c| c.is_unknown(value)).unwrap_or(false) {
                continue;
            }
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
    }
    seen
}

fn first_value<'a>(
    members: &[&'a RawRecord],
    field: CaseField,
    config: Option<&AggregatorConfig>,
) -> Option<&'a str> {
    members
        .iter()
        .filter_map(|r| r.get(field))
        .find(|v| !config.map(|c| c.is_unknown(v)).unwrap_or(false))
}

/// One `<p><strong>label:</strong> a, b</p>` fragment per summary field that
/// has at least one value in the group.
pub fn render_summary_attributes(members: &[&RawRecord]) -> String {
    CaseField::SUMMARY
        .iter()
        .filter_map(|&field| {
            let values = distinct_values(members, field, None);
            if values.is_empty() {
                return None;
            }
            let joined = values
                .iter()
                .map(|v| escape_html(v))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("<p><strong>{}:</strong> {}</p>", field.label(), joined))
        })
        .collect()
}

/// Statement fragments in fetch order, optionally bucketed by maintenance type.
/// Returns an empty string when no member has a usable statement.
pub fn render_statements(members: &[&RawRecord], config: &AggregatorConfig) -> String {
    let with_statements: Vec<(&RawRecord, &str)> = members
        .iter()
        .filter_map(|r| {
            r.statement
                .as_deref()
                .filter(|s| !config.is_unknown(s))
                .map(|s| (*r, s))
        })
        .collect();
    if with_statements.is_empty() {
        return String::new();
    }

    if !config.subgroup_by_maintenance {
        let body: String = with_statements
            .iter()
            .map(|(record, statement)| render_statement(record, statement, config))
            .collect();
        return format!("<div>{}</div>", body);
    }

    let mut buckets: Vec<(&str, String)> = Vec::new();
    for (record, statement) in &with_statements {
        let maintenance = record
            .maintenance_type
            .as_deref()
            .filter(|m| !config.is_unknown(m))
            .unwrap_or(config.unknown_sentinel.as_str());
        let fragment = render_statement(record, statement, config);
        match buckets.iter_mut().find(|(label, _)| *label == maintenance) {
            Some((_, body)) => body.push_str(&fragment),
            None => buckets.push((maintenance, fragment)),
        }
    }
    buckets
        .into_iter()
        .map(|(label, body)| format!("<h5>{}</h5><div>{}</div>", escape_html(label), body))
        .collect()
}

fn render_statement(record: &RawRecord, statement: &str, config: &AggregatorConfig) -> String {
    let meta: Vec<String> = STATEMENT_META_FIELDS
        .iter()
        .filter_map(|&field| {
            record
                .get(field)
                .filter(|v| !config.is_unknown(v))
                .map(|v| format!("{}: {}", field.label(), escape_html(v)))
        })
        .collect();
    if meta.is_empty() {
        format!("<p>・{}</p>", escape_html(statement))
    } else {
        format!(
            "<p>・{} <span class=\"statement-meta\">（{}）</span></p>",
            escape_html(statement),
            meta.join(" / ")
        )
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(case_id: &str, text: &str) -> RawRecord {
        RawRecord {
            case_id: case_id.to_string(),
            statement: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape_html("道路"), "道路");
    }

    #[test]
    fn unknown_statements_are_not_rendered() {
        let config = AggregatorConfig::default();
        let a = statement("C1", "不明");
        let b = statement("C1", "側溝を直した");
        let html = render_statements(&[&a, &b], &config);
        assert_eq!(html, "<div><p>・側溝を直した</p></div>");
        assert_eq!(render_statements(&[&a], &config), "");
    }

    #[test]
    fn statement_metadata_is_appended() {
        let config = AggregatorConfig::default();
        let record = RawRecord {
            speaker: Some("住民A".to_string()),
            period: Some("不明".to_string()),
            ..statement("C1", "花壇を作った")
        };
        let html = render_statements(&[&record], &config);
        assert_eq!(
            html,
            "<div><p>・花壇を作った <span class=\"statement-meta\">（発言者: 住民A）</span></p></div>"
        );
    }

    #[test]
    fn sub_grouping_buckets_by_first_seen_maintenance_type() {
        let config = AggregatorConfig {
            subgroup_by_maintenance: true,
            ..AggregatorConfig::default()
        };
        let a = RawRecord {
            maintenance_type: Some("舗装".to_string()),
            ..statement("C1", "one")
        };
        let b = RawRecord {
            maintenance_type: Some("側溝".to_string()),
            ..statement("C1", "two")
        };
        let c = RawRecord {
            maintenance_type: Some("舗装".to_string()),
            ..statement("C1", "three")
        };
        let html = render_statements(&[&a, &b, &c], &config);
        assert_eq!(
            html,
            "<h5>舗装</h5><div><p>・one</p><p>・three</p></div><h5>側溝</h5><div><p>・two</p></div>"
        );
    }

    #[test]
    fn summary_attributes_skip_empty_fields_and_dedupe() {
        let a = RawRecord {
            purpose: Some("安全".to_string()),
            cost: Some("自費".to_string()),
            ..statement("C1", "x")
        };
        let b = RawRecord {
            purpose: Some("安全".to_string()),
            ..statement("C1", "y")
        };
        let c = RawRecord {
            purpose: Some("景観".to_string()),
            ..statement("C1", "z")
        };
        let html = render_summary_attributes(&[&a, &b, &c]);
        assert_eq!(
            html,
            "<p><strong>目的:</strong> 安全, 景観</p><p><strong>費用:</strong> 自費</p>"
        );
    }

    #[test]
    fn absent_group_names_share_one_trailing_group() {
        let a = RawRecord {
            group_name: Some("水路".to_string()),
            ..statement("C1", "x")
        };
        let b = statement("C2", "y");
        let c = statement("C3", "z");
        let refs = vec![&a, &b, &c];
        let groups = group_records(&refs, GroupBy::GroupName);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, GroupKey::Value("水路".to_string()));
        assert_eq!(groups[1].key, GroupKey::Absent);
        assert_eq!(groups[1].members.len(), 2);
    }

    #[test]
    fn group_name_falls_back_to_case_id_when_never_set() {
        let a = statement("C1", "x");
        let b = statement("C2", "y");
        assert_eq!(effective_group_by(&[&a, &b], GroupBy::GroupName), GroupBy::CaseId);
    }
}
