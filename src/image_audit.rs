use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of comparing stored photo references with the image directory.
/// Names are compared case-insensitively; every list is sorted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImageAudit {
    /// Referenced by a record but not present on disk.
    pub missing_locally: Vec<String>,
    /// Present on disk but referenced by no record.
    pub unreferenced: Vec<String>,
    /// Same file under different letter case: (reference, file name).
    pub case_mismatches: Vec<(String, String)>,
}

impl ImageAudit {
    pub fn is_clean(&self) -> bool {
        self.missing_locally.is_empty() && self.unreferenced.is_empty() && self.case_mismatches.is_empty()
    }
}

fn by_lowercase<'a, I>(names: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| (n.to_lowercase(), n.to_string()))
        .collect()
}

pub fn audit<'a, R, L>(referenced: R, local: L) -> ImageAudit
where
    R: IntoIterator<Item = &'a str>,
    L: IntoIterator<Item = &'a str>,
{
    let referenced = by_lowercase(referenced);
    let local = by_lowercase(local);

    let missing_locally = referenced
        .iter()
        .filter(|(lower, _)| !local.contains_key(*lower))
        .map(|(_, original)| original.clone())
        .collect();
    let unreferenced = local
        .iter()
        .filter(|(lower, _)| !referenced.contains_key(*lower))
        .map(|(_, original)| original.clone())
        .collect();
    let case_mismatches = referenced
        .iter()
        .filter_map(|(lower, reference)| {
            local
                .get(lower)
                .filter(|file| *file != reference)
                .map(|file| (reference.clone(), file.clone()))
        })
        .collect();

    ImageAudit {
        missing_locally,
        unreferenced,
        case_mismatches,
    }
}

/// Lists regular file names directly inside `dir`.
pub fn list_local_images(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        warn!("Image folder {:?} does not exist or is not a directory", dir);
        anyhow::bail!("image folder {:?} not found", dir);
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let entry = entry.with_context(|| format!("Failed to read entry in {:?}", dir))?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    info!("Found {} image files in {:?}", names.len(), dir);
    Ok(names)
}
