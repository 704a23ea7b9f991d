use log::{info, warn};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::models::GroupBy;

pub const DEFAULT_FALLBACK_LAT: f64 = 34.240;
pub const DEFAULT_FALLBACK_LON: f64 = 132.550;
pub const DEFAULT_AREA_WIDE_PREFIX: &str = "R";
pub const DEFAULT_DELIMITER: char = ',';
pub const DEFAULT_UNKNOWN: &str = "不明";
pub const DEFAULT_NAME_PREFIX: &str = "事例 ";
pub const DEFAULT_NO_SUBTITLE: &str = "代表的な発言内容なし";
pub const DEFAULT_OTHER_CATEGORY: &str = "その他";
pub const DEFAULT_UNKNOWN_PERIOD: &str = "不明な時期";

/// Fixed configuration for one aggregation pass. Nothing in here changes
/// between requests, so the aggregator stays a pure function of its input.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub group_by: GroupBy,
    pub subgroup_by_maintenance: bool,
    /// First character of a case id mapped to its display category.
    pub category_map: HashMap<char, String>,
    pub other_category: String,
    pub fallback_center: (f64, f64),
    pub area_wide_prefix: String,
    pub delimiter: char,
    pub unknown_sentinel: String,
    pub name_prefix: String,
    pub no_subtitle: String,
    pub unknown_period: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let category_map = [
            ('R', "道路整備"),
            ('C', "自治会"),
            ('K', "キーパーソン"),
            ('D', "災害"),
            ('O', "その他"),
        ]
        .into_iter()
        .map(|(code, label)| (code, label.to_string()))
        .collect();

        AggregatorConfig {
            group_by: GroupBy::CaseId,
            subgroup_by_maintenance: false,
            category_map,
            other_category: DEFAULT_OTHER_CATEGORY.to_string(),
            fallback_center: (DEFAULT_FALLBACK_LAT, DEFAULT_FALLBACK_LON),
            area_wide_prefix: DEFAULT_AREA_WIDE_PREFIX.to_string(),
            delimiter: DEFAULT_DELIMITER,
            unknown_sentinel: DEFAULT_UNKNOWN.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            no_subtitle: DEFAULT_NO_SUBTITLE.to_string(),
            unknown_period: DEFAULT_UNKNOWN_PERIOD.to_string(),
        }
    }
}

impl AggregatorConfig {
    /// Builds the configuration from `CASES_*` environment variables, keeping
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = AggregatorConfig::default();

        if let Some(group_by) = parse_env::<GroupBy>("CASES_GROUP_BY") {
            config.group_by = group_by;
        }
        if let Some(flag) = parse_env::<bool>("CASES_SUBGROUP_BY_MAINTENANCE") {
            config.subgroup_by_maintenance = flag;
        }
        let lat = parse_env::<f64>("CASES_FALLBACK_LAT").unwrap_or(config.fallback_center.0);
        let lon = parse_env::<f64>("CASES_FALLBACK_LON").unwrap_or(config.fallback_center.1);
        config.fallback_center = (lat, lon);
        if let Ok(prefix) = env::var("CASES_AREA_WIDE_PREFIX") {
            config.area_wide_prefix = prefix;
        }
        if let Some(delimiter) = parse_env::<char>("CASES_DELIMITER") {
            config.delimiter = delimiter;
        }
        if let Ok(unknown) = env::var("CASES_UNKNOWN") {
            config.unknown_sentinel = unknown;
        }

        info!(
            "Aggregator config: group_by={:?}, subgroup_by_maintenance={}, fallback_center={:?}, area_wide_prefix='{}', delimiter='{}'",
            config.group_by,
            config.subgroup_by_maintenance,
            config.fallback_center,
            config.area_wide_prefix,
            config.delimiter
        );
        config
    }

    /// Preset used by the customisation card view.
    pub fn customization_view(&self) -> Self {
        AggregatorConfig {
            group_by: GroupBy::GroupName,
            subgroup_by_maintenance: true,
            ..self.clone()
        }
    }

    /// True for values that carry no information: blank or the unknown sentinel.
    pub fn is_unknown(&self, value: &str) -> bool {
        let value = value.trim();
        value.is_empty() || value == self.unknown_sentinel
    }

    pub fn category_label(&self, code: Option<char>) -> &str {
        code.and_then(|c| self.category_map.get(&c))
            .map(String::as_str)
            .unwrap_or(&self.other_category)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable value for {}: '{}'", key, raw);
            None
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub image_dir: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        ServerConfig {
            host: env::var("CASES_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env::<u16>("CASES_PORT").unwrap_or(5000),
            image_dir: env::var("CASES_IMAGE_DIR").unwrap_or_else(|_| "static/images".to_string()),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
