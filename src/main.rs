use anyhow::Result;
use chrono::Local;
use dialoguer::{theme::ColorfulTheme, Select};
use log::info;
use std::path::PathBuf;

use customization_cases::aggregation;
use customization_cases::case_store;
use customization_cases::config::AggregatorConfig;
use customization_cases::db_connect;
use customization_cases::env_loader;
use customization_cases::excel_writer;
use customization_cases::filter::{FieldContains, RecordPredicate};
use customization_cases::models::CaseField;
use customization_cases::statistics;

/// Aggregation views offered by the exporter.
#[derive(Debug, Clone, Copy)]
enum ExportView {
    Map,
    Customization,
}

impl ExportView {
    fn slug(&self) -> &'static str {
        match self {
            ExportView::Map => "cases",
            ExportView::Customization => "customize",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    info!("Starting interactive case export.");

    let pool = db_connect::connect().await?;
    info!("Database connection pool established.");

    let schema_client = pool.get().await?;
    case_store::ensure_schema(&schema_client).await?;
    drop(schema_client);

    let view = select_view()?;
    let base_config = AggregatorConfig::from_env();

    let records = case_store::fetch_all_records(&pool).await?;
    info!("Exporting {} records using the {:?} view", records.len(), view);

    let community = FieldContains::community_initiative();
    let (config, filter): (AggregatorConfig, Option<&dyn RecordPredicate>) = match view {
        ExportView::Map => (base_config, None),
        ExportView::Customization => (
            base_config.customization_view(),
            Some(&community as &dyn RecordPredicate),
        ),
    };

    let cases = aggregation::aggregate(&records, filter, &config);
    let stats = statistics::tally(&records, &CaseField::STATISTICS, filter, &config);
    let history = statistics::historical_summary(&records, filter, &config);

    let timestamp_suffix = Local::now().format("%Y%m%d%H%M%S").to_string();
    let export_file_path = PathBuf::from(format!("{}_export_{}.xlsx", view.slug(), timestamp_suffix));

    info!("Writing {} cases to Excel file: {:?}", cases.len(), export_file_path);
    excel_writer::write_excel_file(&export_file_path, &cases, &stats, &history).await?;

    println!("\n✅ Exported {} cases to {:?}", cases.len(), export_file_path);
    Ok(())
}

/// Asks which view to export.
fn select_view() -> Result<ExportView> {
    let theme = ColorfulTheme::default();
    let views = [ExportView::Map, ExportView::Customization];
    let options = [
        "Map view (grouped by case id)",
        "Customization view (grouped by case name, community initiatives only)",
    ];

    let selection = Select::with_theme(&theme)
        .with_prompt("Choose the export view")
        .default(0)
        .items(&options)
        .interact()?;

    let view = views[selection];
    println!("✅ Selected view: {:?}", view);
    Ok(view)
}
