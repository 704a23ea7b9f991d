use std::collections::HashSet;

use customization_cases::aggregation::aggregate;
use customization_cases::config::AggregatorConfig;
use customization_cases::errors::CaseError;
use customization_cases::filter::{FieldContains, RecordPredicate};
use customization_cases::models::{CaseField, GroupBy, RawRecord};

fn record(case_id: &str) -> RawRecord {
    RawRecord {
        case_id: case_id.to_string(),
        ..Default::default()
    }
}

fn located(case_id: &str, lat: f64, lon: f64) -> RawRecord {
    RawRecord {
        latitude: Some(lat),
        longitude: Some(lon),
        ..record(case_id)
    }
}

fn mixed_dataset() -> Vec<RawRecord> {
    vec![
        RawRecord {
            statement: Some("道が狭かったので広げた".to_string()),
            speaker: Some("住民A".to_string()),
            initiative: Some("自治会".to_string()),
            maintenance_type: Some("拡幅".to_string()),
            period: Some("昭和40年代".to_string()),
            ..record("R1")
        },
        RawRecord {
            statement: Some("不明".to_string()),
            initiative: Some("行政".to_string()),
            ..record("R1")
        },
        RawRecord {
            statement: Some("ベンチを置いた".to_string()),
            initiative: Some("個人".to_string()),
            ownership: Some("私有地".to_string()),
            photo_reference: Some("bench.jpg".to_string()),
            ..located("C2", 34.21, 132.56)
        },
        RawRecord {
            purpose: Some("安全".to_string()),
            ..record("K3")
        },
        RawRecord {
            statement: Some("避難路".to_string()),
            ..record("D4")
        },
    ]
}

#[test]
fn area_wide_cases_fall_back_to_the_default_center() {
    let records = vec![record("R1"), record("R1"), record("R1")];
    let cases = aggregate(&records, None, &AggregatorConfig::default());

    assert_eq!(cases.len(), 1);
    let case = &cases[0];
    assert_eq!(case.id.as_deref(), Some("R1"));
    assert_eq!(case.latitude, Some(34.240));
    assert_eq!(case.longitude, Some(132.550));
    assert!(case.is_area_wide);
    assert_eq!(case.image_url, None);
    assert_eq!(case.record_count, 3);
}

#[test]
fn other_prefixes_without_coordinates_get_no_pin() {
    let records = vec![record("C9")];
    let cases = aggregate(&records, None, &AggregatorConfig::default());
    assert_eq!(cases[0].latitude, None);
    assert_eq!(cases[0].longitude, None);
    assert!(!cases[0].is_area_wide);
}

#[test]
fn first_record_with_coordinates_wins_over_first_record() {
    let records = vec![
        RawRecord {
            statement: Some("最初の発言".to_string()),
            photo_reference: Some("first.jpg".to_string()),
            ..record("R5")
        },
        RawRecord {
            photo_reference: Some("second.jpg".to_string()),
            ..located("R5", 34.1, 132.5)
        },
        located("R5", 35.0, 133.0),
    ];
    let cases = aggregate(&records, None, &AggregatorConfig::default());

    let case = &cases[0];
    assert_eq!(case.latitude, Some(34.1));
    assert_eq!(case.longitude, Some(132.5));
    assert_eq!(case.image_url.as_deref(), Some("second.jpg"));
    assert!(!case.is_area_wide);
    // Subtitle still follows fetch order.
    assert_eq!(case.subtitle, "最初の発言");
}

#[test]
fn filtered_out_groups_disappear() {
    let records = mixed_dataset();
    let filter = FieldContains::community_initiative();
    let cases = aggregate(
        &records,
        Some(&filter as &dyn RecordPredicate),
        &AggregatorConfig::default(),
    );

    let ids: Vec<&str> = cases.iter().filter_map(|c| c.id.as_deref()).collect();
    assert_eq!(ids, vec!["C2", "R1"]);
    // Only the matching R1 row survives, so its summary lacks the 行政 initiative.
    let r1 = &cases[1];
    assert_eq!(r1.record_count, 1);
    assert!(!r1.summary_attributes_html.contains("行政"));
}

#[test]
fn group_count_matches_distinct_keys() {
    let records = mixed_dataset();
    let cases = aggregate(&records, None, &AggregatorConfig::default());
    let distinct: HashSet<&str> = records.iter().map(|r| r.case_id.as_str()).collect();
    assert_eq!(cases.len(), distinct.len());
}

#[test]
fn aggregation_is_deterministic() {
    let records = mixed_dataset();
    let config = AggregatorConfig::default();
    assert_eq!(aggregate(&records, None, &config), aggregate(&records, None, &config));
}

#[test]
fn summary_fragments_only_cover_present_fields() {
    let records = mixed_dataset();
    let cases = aggregate(&records, None, &AggregatorConfig::default());
    for case in &cases {
        let members: Vec<&RawRecord> = records
            .iter()
            .filter(|r| Some(r.case_id.as_str()) == case.id.as_deref())
            .collect();
        for field in CaseField::SUMMARY {
            let label = format!("<strong>{}:</strong>", field.label());
            let present = members.iter().any(|r| r.get(field).is_some());
            assert_eq!(
                case.summary_attributes_html.contains(&label),
                present,
                "field {} in case {:?}",
                field,
                case.id
            );
        }
    }
}

#[test]
fn categories_come_from_the_case_id_prefix() {
    let records = vec![record("K1"), record("X7"), record("D2")];
    let cases = aggregate(&records, None, &AggregatorConfig::default());
    let categories: Vec<(&str, &str)> = cases
        .iter()
        .map(|c| (c.category.as_str(), c.display_category_jp.as_str()))
        .collect();
    assert_eq!(
        categories,
        vec![("D", "災害"), ("K", "キーパーソン"), ("X", "その他")]
    );
}

#[test]
fn descriptions_fall_back_when_there_are_no_statements() {
    let records = vec![RawRecord {
        purpose: Some("安全".to_string()),
        ..record("K3")
    }];
    let cases = aggregate(&records, None, &AggregatorConfig::default());
    let case = &cases[0];
    assert_eq!(case.name, "事例 K3");
    assert_eq!(case.subtitle, "代表的な発言内容なし");
    assert_eq!(case.statements_html, "");
    assert_eq!(
        case.description,
        "<p><strong>目的:</strong> 安全</p><h4>ヒアリング内容:</h4><p>発言内容がありません。</p>"
    );
}

#[test]
fn grouping_by_name_uses_the_name_and_original_case_id() {
    let records = vec![
        RawRecord {
            group_name: Some("みんなの花壇".to_string()),
            initiative: Some("個人".to_string()),
            speaker: Some("住民A".to_string()),
            ..record("C1")
        },
        RawRecord {
            group_name: Some("みんなの花壇".to_string()),
            speaker: Some("住民B".to_string()),
            ownership: Some("公道".to_string()),
            ..record("R8")
        },
        record("R9"),
    ];
    let config = AggregatorConfig {
        group_by: GroupBy::GroupName,
        ..AggregatorConfig::default()
    };
    let cases = aggregate(&records, None, &config);

    assert_eq!(cases.len(), 2);
    let garden = &cases[0];
    assert_eq!(garden.id.as_deref(), Some("みんなの花壇"));
    assert_eq!(garden.name, "みんなの花壇");
    assert_eq!(garden.case_id, "C1");
    assert_eq!(garden.category, "C");
    assert_eq!(garden.speakers_list_html, "住民A、住民B");
    assert_eq!(garden.initiative_for_card.as_deref(), Some("個人"));
    assert_eq!(garden.ownership_for_card.as_deref(), Some("公道"));

    // Records without a name share the trailing absent-key group.
    let unnamed = &cases[1];
    assert_eq!(unnamed.id, None);
    assert_eq!(unnamed.name, "事例 R9");
    assert!(unnamed.is_area_wide);
}

#[test]
fn customization_view_buckets_statements_by_maintenance_type() {
    let named = |case_id: &str, initiative: &str, maintenance: &str, text: &str| RawRecord {
        group_name: Some("みんなの花壇".to_string()),
        initiative: Some(initiative.to_string()),
        maintenance_type: Some(maintenance.to_string()),
        statement: Some(text.to_string()),
        ..record(case_id)
    };
    let records = vec![
        named("C1", "個人", "舗装", "砂利を敷いた"),
        named("R8", "自治会", "側溝", "溝を掘った"),
        named("C1", "個人", "舗装", "アスファルトにした"),
        RawRecord {
            group_name: Some("中央公園".to_string()),
            initiative: Some("行政".to_string()),
            statement: Some("市が整備した".to_string()),
            ..record("K2")
        },
    ];
    let config = AggregatorConfig::default().customization_view();
    let filter = FieldContains::community_initiative();
    let cases = aggregate(&records, Some(&filter as &dyn RecordPredicate), &config);

    assert_eq!(cases.len(), 1);
    let garden = &cases[0];
    assert_eq!(garden.id.as_deref(), Some("みんなの花壇"));
    assert_eq!(garden.record_count, 3);

    let description = &garden.description;
    assert!(description.contains(&garden.statements_html));
    let paving = description.find("<h5>舗装</h5><div>").unwrap();
    let gutter = description.find("<h5>側溝</h5><div>").unwrap();
    let gravel = description.find("砂利を敷いた").unwrap();
    let asphalt = description.find("アスファルトにした").unwrap();
    let ditch = description.find("溝を掘った").unwrap();
    assert!(paving < gravel && gravel < asphalt && asphalt < gutter);
    assert!(gutter < ditch);
    assert!(!description.contains("市が整備した"));
}

#[test]
fn grouping_by_name_falls_back_to_case_id() {
    let records = vec![record("C1"), record("C1"), record("C2")];
    let config = AggregatorConfig {
        group_by: GroupBy::GroupName,
        ..AggregatorConfig::default()
    };
    let cases = aggregate(&records, None, &config);
    let ids: Vec<Option<&str>> = cases.iter().map(|c| c.id.as_deref()).collect();
    assert_eq!(ids, vec![Some("C1"), Some("C2")]);
}

#[test]
fn failing_predicates_exclude_without_aborting() {
    let records = vec![record("C1"), record("C2")];
    let predicate = |r: &RawRecord| -> Result<bool, CaseError> {
        if r.case_id == "C2" {
            Err(CaseError::Filter {
                field: "case_id".to_string(),
                reason: "unreadable".to_string(),
            })
        } else {
            Ok(true)
        }
    };
    let cases = aggregate(
        &records,
        Some(&predicate as &dyn RecordPredicate),
        &AggregatorConfig::default(),
    );
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].id.as_deref(), Some("C1"));
}

#[test]
fn empty_input_gives_empty_output() {
    assert!(aggregate(&[], None, &AggregatorConfig::default()).is_empty());
}

#[test]
fn free_text_is_escaped_in_fragments() {
    let records = vec![RawRecord {
        statement: Some("<script>alert(1)</script>".to_string()),
        purpose: Some("a&b".to_string()),
        ..record("C1")
    }];
    let cases = aggregate(&records, None, &AggregatorConfig::default());
    assert!(cases[0].statements_html.contains("&lt;script&gt;"));
    assert!(cases[0].summary_attributes_html.contains("a&amp;b"));
}
