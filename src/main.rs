use chrono::{DateTime, Local};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod bleed;
mod cache;
mod config;
mod discover;
mod error;
mod finalize;
mod layout;
mod sheet;
mod units;

use crate::cache::LruCache;
use crate::config::{Config, FolderSpec, Overrides};
use crate::discover::Inputs;
use crate::error::Result;
use crate::finalize::DocInfo;
use crate::layout::PageFormat;
use crate::sheet::{Embedded, Report, RunInfo, SheetWriter};
use crate::units::mm_to_pt;

const DEFAULT_CONFIG: &str = "cardsheet.yaml";

/// Lay out a folder of card images on print sheets with mirrored bleed
#[derive(Parser, Debug)]
#[command(name = "card_sheet", version, about = "Print-ready card sheets with mirrored bleed")]
struct Args {
    /// Folder containing the card images (and optionally a `cardback` image)
    folder: PathBuf,
    /// YAML config file (default: cardsheet.yaml, if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Card width in mm
    #[arg(long)]
    card_width: Option<f64>,
    /// Card height in mm
    #[arg(long)]
    card_height: Option<f64>,
    /// Bleed added on every side, in mm
    #[arg(long)]
    bleed: Option<f64>,
    /// Unprintable sheet margin, in mm
    #[arg(long)]
    margin: Option<f64>,
    /// Gap between neighbouring cards, in mm
    #[arg(long)]
    spacing: Option<f64>,
    /// Cards per row
    #[arg(long)]
    cols: Option<u32>,
    /// Cards per column
    #[arg(long)]
    rows: Option<u32>,
    /// Raster resolution of the embedded images
    #[arg(long)]
    dpi: Option<u32>,
    /// Sheet size
    #[arg(long, value_enum)]
    page: Option<PageFormat>,
    /// RGB ICC profile to tag the images with
    #[arg(long)]
    icc_profile: Option<PathBuf>,
    /// Output PDF (default: output/<name>_<timestamp>.pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Number of embedded images remembered for reuse
    #[arg(long)]
    cache_size: Option<usize>,
    /// Do not read bleed and margin from a `b<bleed>_m<margin>_<name>` folder name
    #[arg(long, default_value_t = false)]
    no_auto_detect: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            card_width_mm: self.card_width,
            card_height_mm: self.card_height,
            bleed_mm: self.bleed,
            margin_mm: self.margin,
            spacing_mm: self.spacing,
            grid_cols: self.cols,
            grid_rows: self.rows,
            dpi: self.dpi,
            page: self.page,
            icc_profile: self.icc_profile.clone(),
            cache_size: self.cache_size,
        }
    }
}

/// Everything `run` settled on before drawing.
struct Plan {
    config: Config,
    inputs: Inputs,
    name: String,
    output: PathBuf,
}

fn plan(args: &Args, now: DateTime<Local>) -> Result<Plan> {
    let config = match &args.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(Path::new(DEFAULT_CONFIG), false)?,
    };

    let folder_spec = if args.no_auto_detect {
        None
    } else {
        FolderSpec::from_path(&args.folder)
    };
    let config = match &folder_spec {
        Some(spec) => {
            info!("folder name sets bleed {}mm, margin {}mm", spec.bleed_mm, spec.margin_mm);
            config.with_folder(spec)
        }
        None => config,
    };
    let config = config.with_overrides(&args.overrides());
    config.validate()?;

    let inputs = discover::discover(&args.folder)?;

    let name = match folder_spec {
        Some(spec) => spec.name,
        None => args
            .folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cards".to_string()),
    };
    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from("output").join(format!("{name}_{}.pdf", now.format("%Y%m%d_%H%M%S")))
    });
    Ok(Plan { config, inputs, name, output })
}

fn generate(plan: &Plan, now: DateTime<Local>) -> Result<Report> {
    let config = &plan.config;
    let mut cache = LruCache::<Embedded>::new(config.cache_size);
    let run = RunInfo { timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string() };
    let mut writer = SheetWriter::new(config, run, &mut cache);
    if !writer.layout().fits(mm_to_pt(config.margin_mm)) {
        warn!(
            "a {}x{} grid of {}x{}mm cards does not fit inside the {}mm sheet margin",
            config.grid_cols, config.grid_rows, config.card_width_mm, config.card_height_mm, config.margin_mm
        );
    }

    writer.render(&plan.inputs)?;
    let (bytes, report) = writer.finish();
    debug!("{} embedded image(s) still cached", cache.len());

    let info = DocInfo {
        title: plan.name.clone(),
        created: now.format("D:%Y%m%d%H%M%S").to_string(),
    };
    let mut doc = finalize::post_process(&bytes, &info)?;
    drop(bytes);
    finalize::save_atomic(&mut doc, &plan.output)?;
    Ok(report)
}

fn run(args: &Args) -> Result<(Plan, Report)> {
    let now = Local::now();
    let plan = plan(args, now)?;
    let report = generate(&plan, now)?;
    Ok((plan, report))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (plan, report) = match run(&args) {
        Ok(done) => done,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let c = &plan.config;
    println!("\nSuccess! {}", plan.output.display());
    println!(
        "Cards: {} | Pages: {} | Size: {}x{}mm | Grid: {}x{} | DPI: {}",
        report.cards, report.pages, c.card_width_mm, c.card_height_mm, c.grid_cols, c.grid_rows, c.dpi
    );
    if report.double_sided {
        println!("Double-sided: Yes (interleaved backs)");
    }
    if !report.skipped.is_empty() {
        println!("Skipped {} unreadable image(s):", report.skipped.len());
        for path in &report.skipped {
            println!("  {}", path.display());
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("card_sheet").chain(argv.iter().copied())).unwrap()
    }

    fn write_png(dir: &Path, name: &str) {
        RgbImage::from_pixel(4, 6, Rgb([10, 20, 30])).save(dir.join(name)).unwrap();
    }

    #[test]
    fn empty_folder_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cards = dir.path().join("cards");
        fs::create_dir(&cards).unwrap();
        let out = dir.path().join("out.pdf");
        let a = args(&[cards.to_str().unwrap(), "-o", out.to_str().unwrap()]);

        assert!(matches!(run(&a), Err(Error::NoInput(_))));
        assert!(!out.exists());
    }

    #[test]
    fn invalid_config_fails_before_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let a = args(&[dir.path().join("absent").to_str().unwrap(), "--dpi", "0"]);
        assert!(matches!(run(&a), Err(Error::Config(_))));
    }

    #[test]
    fn folder_name_then_cli_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let cards = dir.path().join("b0.125_m2_mydeck");
        fs::create_dir(&cards).unwrap();
        write_png(&cards, "a.png");

        let a = args(&[cards.to_str().unwrap(), "--margin", "5"]);
        let p = plan(&a, Local::now()).unwrap();
        assert!((p.config.bleed_mm - 3.175).abs() < 1e-9);
        assert_eq!(p.config.margin_mm, 5.0);
        assert_eq!(p.name, "mydeck");
        assert!(p.output.starts_with("output"));

        let a = args(&[cards.to_str().unwrap(), "--no-auto-detect"]);
        let p = plan(&a, Local::now()).unwrap();
        assert_eq!(p.config.bleed_mm, Config::default().bleed_mm);
        assert_eq!(p.name, "b0.125_m2_mydeck");
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let missing = dir.path().join("nope.yaml");
        let a = args(&[dir.path().to_str().unwrap(), "--config", missing.to_str().unwrap()]);
        assert!(matches!(run(&a), Err(Error::ConfigFile { .. })));
    }

    #[test]
    fn end_to_end_with_a_corrupt_card() {
        let dir = tempfile::tempdir().unwrap();
        let cards = dir.path().join("deck");
        fs::create_dir(&cards).unwrap();
        for name in ["1.png", "2.png", "3.png", "cardback.png"] {
            write_png(&cards, name);
        }
        fs::write(cards.join("4.png"), b"broken").unwrap();
        let cfg = dir.path().join("cfg.yaml");
        fs::write(&cfg, "card_width_mm: 20\ncard_height_mm: 30\ndpi: 72\ngrid_cols: 2\ngrid_rows: 1\n").unwrap();
        let out = dir.path().join("sheets").join("deck.pdf");

        let a = args(&[
            cards.to_str().unwrap(),
            "--config",
            cfg.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        let (plan, report) = run(&a).unwrap();
        assert_eq!(plan.output, out);
        assert_eq!(report.cards, 4);
        // two fronts per sheet, each followed by a back page
        assert_eq!(report.pages, 4);
        assert_eq!(report.skipped, vec![cards.join("4.png")]);

        let doc = lopdf::Document::load(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
    }
}
