use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::units::mm_to_pt;

/// Sheet sizes the printer can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
}

impl PageFormat {
    /// Page size in PDF points.
    pub fn size(self) -> Size {
        match self {
            PageFormat::A4 => Size { width: mm_to_pt(210.0), height: mm_to_pt(297.0) },
            PageFormat::Letter => Size { width: 612.0, height: 792.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub from: Point,
    pub to: Point,
}

impl Line {
    fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Line { from: Point { x: x1, y: y1 }, to: Point { x: x2, y: y2 } }
    }
}

/// Grid placement of cards on one page.
///
/// All lengths share one unit (PDF points in practice). The origin is the
/// bottom-left page corner, so row 0 sits at the largest y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub page: Size,
    pub start_x: f64,
    pub start_y: f64,
    /// Trim size of a card.
    pub card: Size,
    pub bleed: f64,
    /// Card plus bleed on every side.
    pub placed: Size,
    pub spacing: f64,
    pub cols: u32,
    pub rows: u32,
}

impl Layout {
    /// Center a `cols` x `rows` grid of bleed-extended cards on the page.
    /// The grid may overhang the page; the origin then goes negative.
    pub fn compute(page: Size, card: Size, bleed: f64, spacing: f64, cols: u32, rows: u32) -> Self {
        let placed = Size {
            width: card.width + 2.0 * bleed,
            height: card.height + 2.0 * bleed,
        };
        let grid_w = cols as f64 * placed.width + (cols as f64 - 1.0) * spacing;
        let grid_h = rows as f64 * placed.height + (rows as f64 - 1.0) * spacing;

        Layout {
            page,
            start_x: (page.width - grid_w) / 2.0,
            start_y: (page.height - grid_h) / 2.0,
            card,
            bleed,
            placed,
            spacing,
            cols,
            rows,
        }
    }

    pub fn grid_size(&self) -> Size {
        Size {
            width: self.cols as f64 * self.placed.width + (self.cols as f64 - 1.0) * self.spacing,
            height: self.rows as f64 * self.placed.height + (self.rows as f64 - 1.0) * self.spacing,
        }
    }

    pub fn cells_per_page(&self) -> usize {
        (self.cols as usize).saturating_mul(self.rows as usize)
    }

    /// Row-major (row, col) of the `index`-th card on a page.
    pub fn cell_at(&self, index: usize) -> (u32, u32) {
        let cols = self.cols as usize;
        ((index / cols) as u32, (index % cols) as u32)
    }

    /// Bottom-left corner of the placed (bleed) area of a cell.
    pub fn cell_origin(&self, row: u32, col: u32) -> Point {
        Point {
            x: self.start_x + col as f64 * (self.placed.width + self.spacing),
            y: self.start_y + (self.rows - 1 - row) as f64 * (self.placed.height + self.spacing),
        }
    }

    /// Column a back face goes in so it lands behind its front once the
    /// sheet is flipped around its vertical axis.
    pub fn mirrored_col(&self, col: u32) -> u32 {
        self.cols - 1 - col
    }

    pub fn back_cell_origin(&self, row: u32, col: u32) -> Point {
        self.cell_origin(row, self.mirrored_col(col))
    }

    pub fn placed_rect(&self, origin: Point) -> Rect {
        Rect { x: origin.x, y: origin.y, width: self.placed.width, height: self.placed.height }
    }

    /// Trim rectangle inside the placed area starting at `origin`.
    pub fn trim_rect(&self, origin: Point) -> Rect {
        Rect {
            x: origin.x + self.bleed,
            y: origin.y + self.bleed,
            width: self.card.width,
            height: self.card.height,
        }
    }

    /// Cut guides at the internal grid boundaries, each running across the
    /// whole page.
    pub fn guide_lines(&self) -> Vec<Line> {
        let mut lines = Vec::with_capacity((self.cols as usize + self.rows as usize).saturating_sub(2));
        for col in 1..self.cols {
            let x = self.start_x + col as f64 * (self.placed.width + self.spacing);
            lines.push(Line::new(x, 0.0, x, self.page.height));
        }
        for row in 1..self.rows {
            let y = self.start_y + row as f64 * (self.placed.height + self.spacing);
            lines.push(Line::new(0.0, y, self.page.width, y));
        }
        lines
    }

    /// Crosshair centres `offset` outside the left and right edges of every
    /// cell, at the cell's bottom and top. Centres off the page are dropped.
    pub fn alignment_markers(&self, offset: f64) -> Vec<Point> {
        let mut markers = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let cell = self.placed_rect(self.cell_origin(row, col));
                for x in [cell.x - offset, cell.x + cell.width + offset] {
                    for y in [cell.y, cell.y + cell.height] {
                        let p = Point { x, y };
                        if self.contains(p) {
                            markers.push(p);
                        }
                    }
                }
            }
        }
        markers
    }

    pub fn contains(&self, p: Point) -> bool {
        (0.0..=self.page.width).contains(&p.x) && (0.0..=self.page.height).contains(&p.y)
    }

    /// Whether the whole grid stays inside the page inset by `margin`.
    pub fn fits(&self, margin: f64) -> bool {
        let grid = self.grid_size();
        self.start_x >= margin
            && self.start_y >= margin
            && self.start_x + grid.width <= self.page.width - margin
            && self.start_y + grid.height <= self.page.height - margin
    }
}

/// Short L-shaped strokes hugging the four trim corners of `trim`.
///
/// Each arm is `arm` long and sits `line_width / 2` outside the trim line so
/// the stroke never bleeds into the card face.
pub fn corner_guides(trim: Rect, arm: f64, line_width: f64) -> Vec<Line> {
    let Rect { x, y, width: w, height: h } = trim;
    let off = line_width / 2.0;
    vec![
        // bottom left
        Line::new(x, y - off, x + arm, y - off),
        Line::new(x - off, y, x - off, y + arm),
        // bottom right
        Line::new(x + w - arm, y - off, x + w, y - off),
        Line::new(x + w + off, y, x + w + off, y + arm),
        // top left
        Line::new(x, y + h + off, x + arm, y + h + off),
        Line::new(x - off, y + h - arm, x - off, y + h),
        // top right
        Line::new(x + w - arm, y + h + off, x + w, y + h + off),
        Line::new(x + w + off, y + h - arm, x + w + off, y + h),
    ]
}

/// The two strokes of a crosshair of total length `size` centred on `p`.
pub fn crosshair(p: Point, size: f64) -> [Line; 2] {
    let half = size / 2.0;
    [
        Line::new(p.x - half, p.y, p.x + half, p.y),
        Line::new(p.x, p.y - half, p.x, p.y + half),
    ]
}
