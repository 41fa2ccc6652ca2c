use glob::{MatchOptions, Pattern, glob_with};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Raster formats picked up from the input folder.
pub const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "webp"];

/// File stem of the shared back design.
const CARD_BACK: &str = "cardback";

#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    /// Card fronts in path order.
    pub fronts: Vec<PathBuf>,
    pub back: Option<PathBuf>,
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_card_back(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case(CARD_BACK))
        .unwrap_or(false)
}

/// List the card images directly inside `folder` (not recursive).
pub fn discover(folder: &Path) -> Result<Inputs> {
    if !folder.is_dir() {
        return Err(Error::InputDir {
            path: folder.to_path_buf(),
            reason: "not a directory".into(),
        });
    }

    let pattern = format!("{}/*", Pattern::escape(&folder.to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let entries = glob_with(&pattern, options).map_err(|e| Error::InputDir {
        path: folder.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|e| match e {
            Ok(p) => Some(p),
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    images.sort();

    let (backs, fronts): (Vec<PathBuf>, Vec<PathBuf>) =
        images.into_iter().partition(|p| is_card_back(p));
    let mut backs = backs.into_iter();
    let back = backs.next();
    for extra in backs {
        warn!("ignoring extra card back {}", extra.display());
    }

    if fronts.is_empty() {
        return Err(Error::NoInput(folder.to_path_buf()));
    }
    debug!(
        "found {} card(s) in {}{}",
        fronts.len(),
        folder.display(),
        if back.is_some() { " with a card back" } else { "" }
    );
    Ok(Inputs { fronts, back })
}
