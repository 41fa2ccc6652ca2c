//! Run configuration.
//!
//! Built once at startup from, in rising precedence: defaults, the YAML file,
//! the `b{bleed}_m{margin}_{name}` folder name and command-line flags. The
//! finished value is validated and then only ever borrowed.

use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::layout::PageFormat;
use crate::units::{LengthUnit, mm_to_px};

/// Upper bound on cards per sheet; larger grids cannot fit any page.
pub const MAX_GRID_CELLS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub card_width_mm: f64,
    pub card_height_mm: f64,
    pub bleed_mm: f64,
    /// Unprintable border of the sheet; only used to warn about overhang.
    pub margin_mm: f64,
    pub spacing_mm: f64,
    pub grid_cols: u32,
    pub grid_rows: u32,
    pub dpi: u32,
    pub corner_bevel_mm: f64,
    pub corner_line_width_mm: f64,
    pub separator_width_mm: f64,
    pub marker_offset_mm: f64,
    pub marker_size_mm: f64,
    pub page: PageFormat,
    pub icc_profile: Option<PathBuf>,
    /// Embedded images remembered for reuse; 0 disables caching.
    pub cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            card_width_mm: 63.0,
            card_height_mm: 88.0,
            bleed_mm: 1.0,
            margin_mm: 0.0,
            spacing_mm: 0.3,
            grid_cols: 3,
            grid_rows: 3,
            dpi: 600,
            corner_bevel_mm: 2.0,
            corner_line_width_mm: 1.0,
            separator_width_mm: 0.2,
            marker_offset_mm: 3.0,
            marker_size_mm: 2.0,
            page: PageFormat::A4,
            icc_profile: None,
            cache_size: 64,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub card_width_mm: Option<f64>,
    pub card_height_mm: Option<f64>,
    pub bleed_mm: Option<f64>,
    pub margin_mm: Option<f64>,
    pub spacing_mm: Option<f64>,
    pub grid_cols: Option<u32>,
    pub grid_rows: Option<u32>,
    pub dpi: Option<u32>,
    pub page: Option<PageFormat>,
    pub icc_profile: Option<PathBuf>,
    pub cache_size: Option<usize>,
}

/// Settings encoded in a folder name such as `b0.125_m0.25_mydeck`.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderSpec {
    pub bleed_mm: f64,
    pub margin_mm: f64,
    pub name: String,
}

impl FolderSpec {
    pub fn parse(folder_name: &str) -> Option<Self> {
        let mut parts = folder_name.splitn(3, '_');
        let bleed = parts.next()?.strip_prefix('b')?.parse::<f64>().ok()?;
        let margin = parts.next()?.strip_prefix('m')?.parse::<f64>().ok()?;
        let name = parts.next().filter(|n| !n.is_empty())?;
        if !bleed.is_finite() || !margin.is_finite() {
            return None;
        }
        Some(FolderSpec {
            bleed_mm: LengthUnit::infer(bleed).to_mm(bleed),
            margin_mm: LengthUnit::infer(margin).to_mm(margin),
            name: name.to_string(),
        })
    }

    pub fn from_path(folder: &Path) -> Option<Self> {
        let spec = Self::parse(folder.file_name()?.to_str()?);
        if spec.is_none() {
            debug!("folder {} does not follow b<bleed>_m<margin>_<name>", folder.display());
        }
        spec
    }
}

impl Config {
    /// Read a YAML config. A missing file yields the defaults unless the
    /// caller named it explicitly.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            debug!("no config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&text).map_err(|e| match e {
            Error::ConfigFile { reason, .. } => Error::ConfigFile { path: path.to_path_buf(), reason },
            other => other,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // an empty document means "all defaults"
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::ConfigFile {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    pub fn with_folder(mut self, spec: &FolderSpec) -> Self {
        self.bleed_mm = spec.bleed_mm;
        self.margin_mm = spec.margin_mm;
        self
    }

    pub fn with_overrides(mut self, o: &Overrides) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(v) = o.$field.clone() { self.$field = v; })*
            };
        }
        take!(
            card_width_mm,
            card_height_mm,
            bleed_mm,
            margin_mm,
            spacing_mm,
            grid_cols,
            grid_rows,
            dpi,
            page,
            cache_size
        );
        if let Some(icc) = &o.icc_profile {
            self.icc_profile = Some(icc.clone());
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("card width", self.card_width_mm),
            ("card height", self.card_height_mm),
            ("corner bevel", self.corner_bevel_mm),
            ("corner line width", self.corner_line_width_mm),
            ("separator width", self.separator_width_mm),
            ("marker size", self.marker_size_mm),
        ];
        for (what, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::Config(format!("{what} must be positive, got {v}")));
            }
        }
        let non_negative = [
            ("bleed", self.bleed_mm),
            ("margin", self.margin_mm),
            ("spacing", self.spacing_mm),
            ("marker offset", self.marker_offset_mm),
        ];
        for (what, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::Config(format!("{what} must not be negative, got {v}")));
            }
        }
        if self.dpi == 0 {
            return Err(Error::Config("resolution must be positive".into()));
        }
        if self.grid_cols == 0 || self.grid_rows == 0 {
            return Err(Error::Config(format!(
                "grid must be at least 1x1, got {}x{}",
                self.grid_cols, self.grid_rows
            )));
        }
        if u64::from(self.grid_cols) * u64::from(self.grid_rows) > MAX_GRID_CELLS {
            return Err(Error::Config(format!(
                "grid {}x{} exceeds {MAX_GRID_CELLS} cards per sheet",
                self.grid_cols, self.grid_rows
            )));
        }
        if self.bleed_mm > self.card_width_mm.min(self.card_height_mm) {
            return Err(Error::Config(format!(
                "bleed {}mm is larger than the card's shorter side",
                self.bleed_mm
            )));
        }
        let (w, h) = self.card_px();
        if w == 0 || h == 0 {
            return Err(Error::Config(format!(
                "card {}x{}mm is smaller than one pixel at {}dpi",
                self.card_width_mm, self.card_height_mm, self.dpi
            )));
        }
        Ok(())
    }

    /// Card raster size in pixels.
    pub fn card_px(&self) -> (u32, u32) {
        (mm_to_px(self.card_width_mm, self.dpi), mm_to_px(self.card_height_mm, self.dpi))
    }

    pub fn bleed_px(&self) -> u32 {
        mm_to_px(self.bleed_mm, self.dpi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn folder_name_in_inches() {
        let spec = FolderSpec::parse("b0.5_m0.25_mydeck").unwrap();
        assert!(close(spec.bleed_mm, 12.7));
        assert!(close(spec.margin_mm, 6.35));
        assert_eq!(spec.name, "mydeck");
    }

    #[test]
    fn folder_name_in_millimetres() {
        let spec = FolderSpec::parse("b2_m1_mydeck").unwrap();
        assert_eq!(spec.bleed_mm, 2.0);
        assert_eq!(spec.margin_mm, 1.0);
    }

    #[test]
    fn folder_name_keeps_underscores_in_name() {
        let spec = FolderSpec::parse("b3_m3_my_big_deck").unwrap();
        assert_eq!(spec.name, "my_big_deck");
    }

    #[test]
    fn folder_name_mismatch() {
        for name in ["mydeck", "b2_mydeck", "bx_m1_deck", "b2_m1_", "m1_b2_deck", "b2_m1"] {
            assert_eq!(FolderSpec::parse(name), None, "{name}");
        }
    }

    #[test]
    fn folder_from_path_uses_last_component() {
        let spec = FolderSpec::from_path(Path::new("/cards/b1_m2_set")).unwrap();
        assert_eq!(spec.name, "set");
    }

    #[test]
    fn yaml_overrides_defaults_and_ignores_unknown_keys() {
        let cfg = Config::from_yaml("dpi: 300\ngrid_cols: 4\npage: letter\nsomething_else: 1\n").unwrap();
        assert_eq!(cfg.dpi, 300);
        assert_eq!(cfg.grid_cols, 4);
        assert_eq!(cfg.page, PageFormat::Letter);
        assert_eq!(cfg.card_width_mm, 63.0);
    }

    #[test]
    fn example_file_matches_defaults() {
        let cfg = Config::from_yaml(include_str!("../cardsheet.example.yaml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let err = Config::from_yaml("dpi: [").unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
    }

    #[test]
    fn missing_default_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert_eq!(Config::load(&path, false).unwrap(), Config::default());
        assert!(matches!(Config::load(&path, true), Err(Error::ConfigFile { .. })));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        fs::write(&path, "bleed_mm: 3\n").unwrap();
        assert_eq!(Config::load(&path, true).unwrap().bleed_mm, 3.0);
    }

    #[test]
    fn precedence_cli_over_folder_over_file() {
        let file = Config::from_yaml("bleed_mm: 5\nmargin_mm: 5\nspacing_mm: 5\n").unwrap();
        let folder = FolderSpec::parse("b2_m1_deck").unwrap();
        let cli = Overrides { bleed_mm: Some(0.5), ..Default::default() };
        let cfg = file.with_folder(&folder).with_overrides(&cli);
        assert_eq!(cfg.bleed_mm, 0.5);
        assert_eq!(cfg.margin_mm, 1.0);
        assert_eq!(cfg.spacing_mm, 5.0);
    }

    #[test]
    fn validation() {
        assert!(Config::default().validate().is_ok());

        let bad = [
            Config { card_width_mm: 0.0, ..Default::default() },
            Config { card_height_mm: -1.0, ..Default::default() },
            Config { bleed_mm: -0.1, ..Default::default() },
            Config { spacing_mm: -1.0, ..Default::default() },
            Config { margin_mm: f64::NAN, ..Default::default() },
            Config { dpi: 0, ..Default::default() },
            Config { grid_cols: 0, ..Default::default() },
            Config { grid_cols: 65536, grid_rows: 65536, ..Default::default() },
            Config { bleed_mm: 90.0, ..Default::default() },
            Config { card_width_mm: 0.01, dpi: 72, ..Default::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(Error::Config(_))), "{cfg:?}");
        }
        assert!(Config { bleed_mm: 0.0, spacing_mm: 0.0, ..Default::default() }.validate().is_ok());
        assert!(Config { grid_cols: 100, grid_rows: 100, ..Default::default() }.validate().is_ok());
        assert!(Config { cache_size: usize::MAX, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn pixel_sizes() {
        let cfg = Config::default();
        assert_eq!(cfg.card_px(), (1488, 2078));
        assert_eq!(cfg.bleed_px(), 23);
    }
}
