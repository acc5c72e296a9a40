use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::engine;
use crate::model::Setlist;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// `.json` files are JSON; anything else is YAML.
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext == "json" {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

pub fn to_string(setlist: &Setlist, format: Format) -> Result<String> {
    Ok(match format {
        Format::Yaml => serde_yaml::to_string(setlist)?,
        Format::Json => serde_json::to_string_pretty(setlist)?,
    })
}

pub fn from_str(data: &str, format: Format) -> Result<Setlist> {
    Ok(match format {
        Format::Yaml => serde_yaml::from_str(data)?,
        Format::Json => serde_json::from_str(data)?,
    })
}

pub fn save(setlist: &Setlist, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = to_string(setlist, Format::for_path(path))?;
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

pub fn open(path: impl AsRef<Path>) -> Result<Setlist> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    from_str(&data, Format::for_path(path)).with_context(|| format!("parsing {}", path.display()))
}

/// Opens a setlist and applies every slot rule the engine would.
pub fn check(path: impl AsRef<Path>) -> Result<Setlist> {
    let path = path.as_ref();
    let setlist = open(path)?;
    engine::check_setlist(&setlist).with_context(|| format!("checking {}", path.display()))?;
    Ok(setlist)
}
