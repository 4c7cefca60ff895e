//! System font lookup
//!
//! Font entries in the config and on the command line are file paths or
//! family names. Family names go through fontconfig, which always answers
//! with its closest match; an answer for an unrelated family is dropped
//! instead of being slipped into a fallback chain.

use anyhow::{anyhow, Result};
use fontconfig::Fontconfig;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Families tried, in order, when no primary font is configured
const SANS_FAMILIES: [&str; 6] = [
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Open Sans",
    "FreeSans",
    "sans-serif",
];

/// A family name resolved to an installed file
#[derive(Debug, Clone)]
pub struct FontMatch {
    pub path: PathBuf,
    /// Family fontconfig reported for the file
    pub family: String,
}

/// fontconfig handle shared by every lookup of a chain
pub struct FontFinder {
    fc: Fontconfig,
}

impl FontFinder {
    pub fn new() -> Result<Self> {
        let fc = Fontconfig::new()
            .ok_or_else(|| anyhow!("fontconfig is unavailable; only font file paths can be used"))?;
        debug!("fontconfig ready");
        Ok(Self { fc })
    }

    /// Installed face for `family`, `None` when fontconfig only knows an
    /// unrelated family
    pub fn find_font(&self, family: &str) -> Option<FontMatch> {
        let font = self.fc.find(family, None)?;
        if !family_matches(family, &font.name) {
            warn!(
                "Family \"{}\" is not installed (closest: \"{}\"), skipping it",
                family, font.name
            );
            return None;
        }
        debug!("Family \"{}\" is {}", family, font.path.display());
        Some(FontMatch {
            path: font.path,
            family: font.name,
        })
    }

    /// First installed general purpose sans-serif family
    pub fn find_sans(&self) -> Option<FontMatch> {
        let found = SANS_FAMILIES.iter().find_map(|family| self.find_font(family));
        if found.is_none() {
            warn!("None of {:?} is installed", SANS_FAMILIES);
        }
        found
    }

    /// Resolve one font entry: an existing absolute path is used as is,
    /// then the entry is tried as a family name, then as a relative path
    pub fn resolve(&self, specifier: &str) -> Result<PathBuf> {
        if let Some(path) = existing_absolute(specifier) {
            return Ok(path);
        }
        if let Some(found) = self.find_font(specifier) {
            info!(
                "Font \"{}\" resolved to {} ({})",
                specifier,
                found.family,
                found.path.display()
            );
            return Ok(found.path);
        }
        let path = Path::new(specifier);
        if path.exists() {
            info!("Font file (relative): {}", specifier);
            return Ok(path.to_path_buf());
        }
        Err(anyhow!(
            "Font not found: \"{}\" is neither an installed family nor a file",
            specifier
        ))
    }
}

/// Case-insensitive containment either way
fn family_matches(requested: &str, found: &str) -> bool {
    let req = requested.to_ascii_lowercase();
    let got = found.to_ascii_lowercase();
    got.contains(&req) || req.contains(&got)
}

fn existing_absolute(specifier: &str) -> Option<PathBuf> {
    let path = Path::new(specifier);
    (path.is_absolute() && path.exists()).then(|| path.to_path_buf())
}

/// Resolve a single font entry; fontconfig is only consulted for names
pub fn resolve_font(specifier: &str) -> Result<PathBuf> {
    match existing_absolute(specifier) {
        Some(path) => Ok(path),
        None => FontFinder::new()?.resolve(specifier),
    }
}

/// Resolve every entry of a fallback chain in order. One fontconfig
/// handle serves the whole chain and is only created when a name needs it
pub fn resolve_chain<S: AsRef<str>>(specifiers: impl IntoIterator<Item = S>) -> Result<Vec<PathBuf>> {
    let mut finder: Option<FontFinder> = None;
    let mut paths = Vec::new();
    for specifier in specifiers {
        let specifier = specifier.as_ref();
        if let Some(path) = existing_absolute(specifier) {
            paths.push(path);
            continue;
        }
        if finder.is_none() {
            finder = Some(FontFinder::new()?);
        }
        if let Some(finder) = &finder {
            paths.push(finder.resolve(specifier)?);
        }
    }
    Ok(paths)
}

/// Default primary font when none is configured
pub fn find_system_font() -> Result<PathBuf> {
    let found = FontFinder::new()?
        .find_sans()
        .ok_or_else(|| anyhow!("No sans-serif font found via fontconfig"))?;
    info!("System font: {} ({})", found.family, found.path.display());
    Ok(found.path)
}
