//! Print sheet assembly.
//!
//! Pages are written with pdf-writer: every distinct source image becomes a
//! pair of image XObjects (bleed and trim raster) that any page can draw,
//! framed by cut guides, corner guides and alignment crosshairs.

use image::RgbImage;
use log::{debug, info, warn};
use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect as PdfRect, Ref, Str};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bleed::{self, Target};
use crate::cache::ImageCache;
use crate::config::Config;
use crate::discover::Inputs;
use crate::error::Result;
use crate::layout::{Layout, Line, Point, Rect, Size, corner_guides, crosshair};
use crate::units::mm_to_pt;

const FONT: Name<'static> = Name(b"F1");
const HEADER_SIZE: f32 = 7.0;

const CYAN: [f32; 3] = [0.0, 1.0, 1.0];
const YELLOW: [f32; 3] = [1.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
const MARKER_LINE_WIDTH: f32 = 0.25;
const DEFLATE_LEVEL: u8 = 6;

/// XObjects written for one source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embedded {
    pub bleed: Ref,
    pub card: Ref,
}

/// Per-run values printed on every page.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub timestamp: String,
}

/// Outcome of a finished document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub pages: usize,
    pub cards: usize,
    pub double_sided: bool,
    /// Sources that could not be decoded; their cells were left empty.
    pub skipped: Vec<PathBuf>,
}

fn xobject_name(id: Ref) -> String {
    format!("Im{}", id.get())
}

fn pt(v: f64) -> f32 {
    v as f32
}

/// Load an RGB ICC profile, or nothing if it is unusable.
fn read_icc_profile(path: &Path) -> Option<Vec<u8>> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            warn!("ignoring ICC profile {}: {e}", path.display());
            return None;
        }
    };
    if data.len() < 128 || &data[36..40] != b"acsp" {
        warn!("ignoring ICC profile {}: not an ICC profile", path.display());
        return None;
    }
    if &data[16..20] != b"RGB " {
        warn!("ignoring ICC profile {}: not an RGB profile", path.display());
        return None;
    }
    Some(data)
}

pub struct SheetWriter<'a> {
    config: &'a Config,
    layout: Layout,
    target: Target,
    run: RunInfo,
    cache: &'a mut dyn ImageCache<Embedded>,
    pdf: Pdf,
    alloc: Ref,
    catalog_id: Ref,
    page_tree_id: Ref,
    font_id: Ref,
    icc_id: Option<Ref>,
    page_ids: Vec<Ref>,
    failed: HashSet<PathBuf>,
    report: Report,
}

/// Drawing state of the page being built.
struct PageDraft {
    content: Content,
    images: Vec<Ref>,
}

impl PageDraft {
    fn new() -> Self {
        PageDraft { content: Content::new(), images: Vec::new() }
    }

    fn stroke_lines(&mut self, lines: &[Line]) {
        for l in lines {
            self.content.move_to(pt(l.from.x), pt(l.from.y));
            self.content.line_to(pt(l.to.x), pt(l.to.y));
        }
        self.content.stroke();
    }

    fn draw_image(&mut self, id: Ref, at: Rect) {
        if !self.images.contains(&id) {
            self.images.push(id);
        }
        let name = xobject_name(id);
        self.content.save_state();
        self.content
            .transform([pt(at.width), 0.0, 0.0, pt(at.height), pt(at.x), pt(at.y)]);
        self.content.x_object(Name(name.as_bytes()));
        self.content.restore_state();
    }
}

impl<'a> SheetWriter<'a> {
    pub fn new(config: &'a Config, run: RunInfo, cache: &'a mut dyn ImageCache<Embedded>) -> Self {
        let layout = Layout::compute(
            config.page.size(),
            Size {
                width: mm_to_pt(config.card_width_mm),
                height: mm_to_pt(config.card_height_mm),
            },
            mm_to_pt(config.bleed_mm),
            mm_to_pt(config.spacing_mm),
            config.grid_cols,
            config.grid_rows,
        );
        let (card_w, card_h) = config.card_px();
        let target = Target { card_w, card_h, bleed: config.bleed_px() };

        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let page_tree_id = alloc.bump();
        let font_id = alloc.bump();

        let mut pdf = Pdf::new();
        pdf.type1_font(font_id).base_font(Name(b"Helvetica"));

        let icc = config.icc_profile.as_deref().and_then(read_icc_profile);
        let icc_id = icc.map(|data| {
            let id = alloc.bump();
            pdf.icc_profile(id, &data).n(3).alternate().device_rgb();
            debug!("embedded ICC profile ({} bytes)", data.len());
            id
        });

        SheetWriter {
            config,
            layout,
            target,
            run,
            cache,
            pdf,
            alloc,
            catalog_id,
            page_tree_id,
            font_id,
            icc_id,
            page_ids: Vec::new(),
            failed: HashSet::new(),
            report: Report::default(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Lay out every front, followed on each sheet by its mirrored back page
    /// when a back design is present.
    pub fn render(&mut self, inputs: &Inputs) -> Result<()> {
        let per_page = self.layout.cells_per_page();
        let total = inputs.fronts.len().div_ceil(per_page);
        self.report.cards = inputs.fronts.len();
        self.report.double_sided = inputs.back.is_some();

        for (index, batch) in inputs.fronts.chunks(per_page).enumerate() {
            info!("page {}/{}: {} card(s)", index + 1, total, batch.len());
            let mut page = PageDraft::new();
            self.draw_markers(&mut page);
            for (i, path) in batch.iter().enumerate() {
                let (row, col) = self.layout.cell_at(i);
                if let Some(images) = self.embed(path)? {
                    self.draw_card(&mut page, images, self.layout.cell_origin(row, col));
                }
            }
            self.finish_page(page, index + 1, total);

            if let Some(back) = &inputs.back {
                let mut page = PageDraft::new();
                self.draw_markers(&mut page);
                if let Some(images) = self.embed(back)? {
                    for i in 0..batch.len() {
                        let (row, col) = self.layout.cell_at(i);
                        self.draw_card(&mut page, images, self.layout.back_cell_origin(row, col));
                    }
                }
                self.finish_page(page, index + 1, total);
            }
        }
        Ok(())
    }

    /// XObjects for `path`, embedding them on first use. `None` if the image
    /// cannot be decoded.
    fn embed(&mut self, path: &Path) -> Result<Option<Embedded>> {
        if let Some(hit) = self.cache.get(path) {
            return Ok(Some(hit));
        }
        if self.failed.contains(path) {
            return Ok(None);
        }
        let processed = match bleed::load(path, self.target) {
            Ok(p) => p,
            Err(e) if e.is_recoverable() => {
                warn!("skipping {e}");
                self.failed.insert(path.to_path_buf());
                self.report.skipped.push(path.to_path_buf());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let embedded = Embedded {
            bleed: self.write_raster(&processed.bleed),
            card: self.write_raster(&processed.card),
        };
        debug!("embedded {}", path.display());
        self.cache.insert(path.to_path_buf(), embedded);
        Ok(Some(embedded))
    }

    /// Rasters are deflated as they are written so the document buffer only
    /// ever holds compressed pixels.
    fn write_raster(&mut self, raster: &RgbImage) -> Ref {
        let id = self.alloc.bump();
        let data = compress_to_vec_zlib(raster.as_raw(), DEFLATE_LEVEL);
        let mut image = self.pdf.image_xobject(id, &data);
        image.filter(Filter::FlateDecode);
        image.width(raster.width() as i32);
        image.height(raster.height() as i32);
        match self.icc_id {
            Some(icc) => image.color_space().icc_based(icc),
            None => image.color_space().device_rgb(),
        }
        image.bits_per_component(8);
        image.finish();
        id
    }

    fn draw_card(&self, page: &mut PageDraft, images: Embedded, origin: Point) {
        let placed = self.layout.placed_rect(origin);
        let trim = self.layout.trim_rect(origin);
        page.draw_image(images.bleed, placed);
        page.draw_image(images.card, trim);
        self.draw_corner_guides(page, trim);
    }

    /// Two-tone dashed corners: cyan dashes with yellow in the gaps, so they
    /// read on both light and dark art.
    fn draw_corner_guides(&self, page: &mut PageDraft, trim: Rect) {
        let arm = mm_to_pt(self.config.corner_bevel_mm) / 2.0;
        let width = mm_to_pt(self.config.corner_line_width_mm);
        let lines = corner_guides(trim, arm, width);

        page.content.save_state();
        page.content.set_line_width(pt(width));
        for ([r, g, b], phase) in [(CYAN, 0.0), (YELLOW, 1.0)] {
            page.content.set_dash_pattern([1.0, 1.0], phase);
            page.content.set_stroke_rgb(r, g, b);
            page.stroke_lines(&lines);
        }
        page.content.restore_state();
    }

    /// Crosshairs go down first so cards drawn later cover the ones that
    /// land inside the grid.
    fn draw_markers(&self, page: &mut PageDraft) {
        let size = mm_to_pt(self.config.marker_size_mm);
        let lines: Vec<Line> = self
            .layout
            .alignment_markers(mm_to_pt(self.config.marker_offset_mm))
            .into_iter()
            .flat_map(|p| crosshair(p, size))
            .collect();
        if lines.is_empty() {
            return;
        }
        page.content.save_state();
        page.content.set_line_width(MARKER_LINE_WIDTH);
        page.content.set_stroke_rgb(BLACK[0], BLACK[1], BLACK[2]);
        page.stroke_lines(&lines);
        page.content.restore_state();
    }

    fn draw_cut_guides(&self, page: &mut PageDraft) {
        let lines = self.layout.guide_lines();
        if lines.is_empty() {
            return;
        }
        page.content.save_state();
        page.content.set_line_width(pt(mm_to_pt(self.config.separator_width_mm)));
        page.content.set_stroke_rgb(CYAN[0], CYAN[1], CYAN[2]);
        page.stroke_lines(&lines);
        page.content.restore_state();
    }

    pub fn header_line(&self, page: usize, pages: usize) -> String {
        let c = self.config;
        format!(
            "Page {page}/{pages} | {} | Cards: {} | Size: {}x{}mm | Grid: {}x{} | DPI: {} | Bleed: {}mm | Corner bevel: {}mm",
            self.run.timestamp,
            self.report.cards,
            c.card_width_mm,
            c.card_height_mm,
            c.grid_cols,
            c.grid_rows,
            c.dpi,
            c.bleed_mm,
            c.corner_bevel_mm,
        )
    }

    fn draw_header(&self, page: &mut PageDraft, index: usize, total: usize) {
        let text = self.header_line(index, total);
        let x = 10.0 + mm_to_pt(10.0);
        let y = self.layout.page.height - 6.0 - mm_to_pt(10.0);
        let c = &mut page.content;
        c.save_state();
        c.set_fill_rgb(BLUE[0], BLUE[1], BLUE[2]);
        c.begin_text();
        c.set_font(FONT, HEADER_SIZE);
        c.next_line(pt(x), pt(y));
        c.show(Str(text.as_bytes()));
        c.end_text();
        c.restore_state();
    }

    fn finish_page(&mut self, mut draft: PageDraft, index: usize, total: usize) {
        self.draw_cut_guides(&mut draft);
        self.draw_header(&mut draft, index, total);

        let page_id = self.alloc.bump();
        let content_id = self.alloc.bump();
        let size = self.layout.page;
        let font_id = self.font_id;

        let mut page = self.pdf.page(page_id);
        page.media_box(PdfRect::new(0.0, 0.0, pt(size.width), pt(size.height)));
        page.parent(self.page_tree_id);
        page.contents(content_id);
        let mut res = page.resources();
        {
            let mut x_objects = res.x_objects();
            for id in &draft.images {
                let name = xobject_name(*id);
                x_objects.pair(Name(name.as_bytes()), *id);
            }
        }
        res.fonts().pair(FONT, font_id);
        res.finish();
        page.finish();

        self.pdf.stream(content_id, &draft.content.finish());
        self.page_ids.push(page_id);
    }

    /// Close the page tree and return the raw document.
    pub fn finish(mut self) -> (Vec<u8>, Report) {
        self.pdf.catalog(self.catalog_id).pages(self.page_tree_id);
        self.pdf
            .pages(self.page_tree_id)
            .kids(self.page_ids.iter().copied())
            .count(self.page_ids.len() as i32);
        self.report.pages = self.page_ids.len();
        (self.pdf.finish(), self.report)
    }
}
