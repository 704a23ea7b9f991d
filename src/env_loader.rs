use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first `.env` file found. Variables already present in the
/// process environment win over file values.
pub fn load_env() {
    match ENV_PATHS.iter().find(|p| Path::new(p).exists()) {
        Some(path) => match load_env_from_file(path) {
            Ok(count) => info!("Loaded {} environment variables from {}", count, path),
            Err(e) => warn!("Failed to load environment from {}: {}", path, e),
        },
        None => info!("No .env file found, using environment variables from system"),
    }
}

fn is_secret(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    upper.contains("PASSWORD") || upper.contains("SECRET") || upper.contains("TOKEN")
}

/// Parses one `KEY=value` line; comments and blank lines yield `None`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') || line.is_empty() {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let idx = line.find('=')?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[idx + 1..].trim().trim_matches('"')))
}

fn load_env_from_file(file_path: &str) -> Result<usize> {
    let contents = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read env file {}", file_path))?;

    let mut applied = 0;
    for (key, value) in contents.lines().filter_map(parse_line) {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
            applied += 1;
            debug!(
                "Set env var from file: {} = {}",
                key,
                if is_secret(key) { "[hidden]" } else { value }
            );
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments_and_skips_comments() {
        assert_eq!(parse_line("POSTGRES_HOST=db"), Some(("POSTGRES_HOST", "db")));
        assert_eq!(parse_line("export CASES_PORT = \"8080\""), Some(("CASES_PORT", "8080")));
        assert_eq!(parse_line("# comment"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("=value"), None);
    }

    #[test]
    fn secrets_are_detected() {
        assert!(is_secret("POSTGRES_PASSWORD"));
        assert!(is_secret("api_token"));
        assert!(!is_secret("POSTGRES_HOST"));
    }
}
