//! Length conversions between millimetres, inches, PDF points and raster pixels.

pub const MM_PER_INCH: f64 = 25.4;
pub const POINTS_PER_INCH: f64 = 72.0;

/// Unit a bare number in a folder name is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Inch,
    Mm,
}

impl LengthUnit {
    /// Values below one are taken as inches (0.125" bleed is common),
    /// anything else as millimetres.
    pub fn infer(value: f64) -> Self {
        if value < 1.0 { LengthUnit::Inch } else { LengthUnit::Mm }
    }

    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            LengthUnit::Inch => value * MM_PER_INCH,
            LengthUnit::Mm => value,
        }
    }
}

pub fn mm_to_pt(mm: f64) -> f64 {
    mm / MM_PER_INCH * POINTS_PER_INCH
}

/// Whole pixels covered by `mm` at `dpi`, rounded down.
pub fn mm_to_px(mm: f64, dpi: u32) -> u32 {
    (mm * dpi as f64 / MM_PER_INCH).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_per_inch() {
        assert!((mm_to_pt(25.4) - 72.0).abs() < 1e-9);
        assert!((mm_to_pt(210.0) - 595.275_590_551).abs() < 1e-6);
    }

    #[test]
    fn pixels_round_down() {
        // 63mm at 600dpi = 1488.18px
        assert_eq!(mm_to_px(63.0, 600), 1488);
        assert_eq!(mm_to_px(88.0, 600), 2078);
        assert_eq!(mm_to_px(1.0, 600), 23);
        assert_eq!(mm_to_px(0.0, 600), 0);
    }

    #[test]
    fn unit_inference() {
        assert_eq!(LengthUnit::infer(0.125), LengthUnit::Inch);
        assert_eq!(LengthUnit::infer(1.0), LengthUnit::Mm);
        assert!((LengthUnit::infer(0.5).to_mm(0.5) - 12.7).abs() < 1e-9);
        assert_eq!(LengthUnit::infer(3.0).to_mm(3.0), 3.0);
    }
}
