use customization_cases::aggregation::aggregate;
use customization_cases::config::AggregatorConfig;
use customization_cases::excel_writer::write_excel_file;
use customization_cases::models::{CaseField, RawRecord};
use customization_cases::statistics::{historical_summary, tally};

#[test]
fn workbook_is_written_for_aggregated_cases() {
    let records = vec![
        RawRecord {
            case_id: "R1".to_string(),
            statement: Some("道を広げた".to_string()),
            maintenance_type: Some("拡幅".to_string()),
            period: Some("昭和40年代".to_string()),
            ..Default::default()
        },
        RawRecord {
            case_id: "C2".to_string(),
            purpose: Some("安全,景観".to_string()),
            latitude: Some(34.2),
            longitude: Some(132.5),
            ..Default::default()
        },
    ];
    let config = AggregatorConfig::default();
    let cases = aggregate(&records, None, &config);
    let stats = tally(&records, &CaseField::STATISTICS, None, &config);
    let history = historical_summary(&records, None, &config);

    let path = std::env::temp_dir().join(format!(
        "customization-cases-export-{}.xlsx",
        std::process::id()
    ));
    tokio_test::block_on(write_excel_file(&path, &cases, &stats, &history)).unwrap();

    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.len() > 0);
    std::fs::remove_file(&path).unwrap();
}
