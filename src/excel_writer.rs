use anyhow::Result;
use log::info;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;
use std::sync::LazyLock;

use crate::models::CaseSummary;
use crate::statistics::{HistoricalSummary, StatisticsSnapshot};

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static tag pattern"));

/// Reduces an HTML fragment to readable cell text: paragraphs become line
/// breaks, tags are dropped and the common entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = html.replace("</p>", "\n").replace("<br>", "\n");
    TAGS.replace_all(&with_breaks, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Writes aggregated cases, statistics and the historical summary to one workbook.
pub async fn write_excel_file(
    file_path: &Path,
    cases: &[CaseSummary],
    statistics: &StatisticsSnapshot,
    history: &HistoricalSummary,
) -> Result<()> {
    info!("Initializing Excel workbook for file: {:?}", file_path);
    let mut workbook = Workbook::new();

    let cases_sheet = workbook.add_worksheet();
    write_cases_sheet(cases_sheet, cases)?;

    let stats_sheet = workbook.add_worksheet();
    write_statistics_sheet(stats_sheet, statistics)?;

    let history_sheet = workbook.add_worksheet();
    write_history_sheet(history_sheet, history)?;

    info!("Saving Excel workbook...");
    workbook.save(file_path)?;
    info!("Excel file saved successfully to {:?}", file_path);
    Ok(())
}

fn write_cases_sheet(sheet: &mut Worksheet, cases: &[CaseSummary]) -> Result<()> {
    sheet.set_name("Cases")?;
    sheet.set_column_width(1, 24)?;
    sheet.set_column_width(4, 40)?;
    sheet.set_column_width(5, 60)?;

    let headers = [
        "id",
        "name",
        "category",
        "display_category",
        "subtitle",
        "summary",
        "speakers",
        "latitude",
        "longitude",
        "is_area_wide",
        "image",
        "records",
    ];
    let header_format = Format::new().set_bold();
    for (col_num, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col_num as u16, *header, &header_format)?;
    }

    let coordinate_format = Format::new().set_num_format("0.000000");
    for (row_num, case) in cases.iter().enumerate() {
        let row = (row_num + 1) as u32;
        sheet.write_string(row, 0, case.id.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 1, &case.name)?;
        sheet.write_string(row, 2, &case.category)?;
        sheet.write_string(row, 3, &case.display_category_jp)?;
        sheet.write_string(row, 4, &case.subtitle)?;
        sheet.write_string(row, 5, html_to_text(&case.summary_attributes_html))?;
        sheet.write_string(row, 6, html_to_text(&case.speakers_list_html))?;
        if let (Some(lat), Some(lon)) = (case.latitude, case.longitude) {
            sheet.write_number_with_format(row, 7, lat, &coordinate_format)?;
            sheet.write_number_with_format(row, 8, lon, &coordinate_format)?;
        }
        sheet.write_boolean(row, 9, case.is_area_wide)?;
        sheet.write_string(row, 10, case.image_url.as_deref().unwrap_or(""))?;
        sheet.write_number(row, 11, case.record_count as f64)?;
    }
    info!("'Cases' sheet written with {} rows.", cases.len());
    Ok(())
}

fn write_statistics_sheet(sheet: &mut Worksheet, statistics: &StatisticsSnapshot) -> Result<()> {
    sheet.set_name("Statistics")?;
    sheet.set_column_width(0, 12)?;
    sheet.set_column_width(1, 30)?;

    let header_format = Format::new().set_bold();
    for (col_num, header) in ["field", "value", "count", "share %"].iter().enumerate() {
        sheet.write_string_with_format(0, col_num as u16, *header, &header_format)?;
    }

    let percentage_format = Format::new().set_num_format("0.0");
    let mut current_row = 1u32;
    for (field, counts) in statistics {
        let total: u64 = counts.values().sum();
        for (value, count) in counts {
            let share = if total > 0 {
                (*count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            sheet.write_string(current_row, 0, field)?;
            sheet.write_string(current_row, 1, value)?;
            sheet.write_number(current_row, 2, *count as f64)?;
            sheet.write_number_with_format(current_row, 3, share, &percentage_format)?;
            current_row += 1;
        }
    }

    current_row += 1;
    sheet.write_string(current_row, 0, "Generated")?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    sheet.write_string(current_row, 1, &timestamp)?;

    info!("'Statistics' sheet written for {} fields.", statistics.len());
    Ok(())
}

fn write_history_sheet(sheet: &mut Worksheet, history: &HistoricalSummary) -> Result<()> {
    sheet.set_name("History")?;
    sheet.set_column_width(0, 16)?;
    sheet.set_column_width(1, 60)?;

    let header_format = Format::new().set_bold();
    sheet.write_string_with_format(0, 0, "period", &header_format)?;
    sheet.write_string_with_format(0, 1, "maintenance types", &header_format)?;

    for (row_num, (period, types)) in history.iter().enumerate() {
        let row = (row_num + 1) as u32;
        sheet.write_string(row, 0, period)?;
        sheet.write_string(row, 1, types.join(", "))?;
    }
    info!("'History' sheet written with {} periods.", history.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_fragments_become_plain_text() {
        let html = "<p><strong>目的:</strong> 安全, 景観</p><p><strong>費用:</strong> A&amp;B</p>";
        assert_eq!(html_to_text(html), "目的: 安全, 景観\n費用: A&B");
    }
}
