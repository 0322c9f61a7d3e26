use crate::error::PressError;
use crate::types::{Margins, Pt, Size};

// Hard bounds the corrective deltas may never push past.
const MIN_BODY_FONT_PT: f32 = 8.0;
const MAX_BODY_FONT_PT: f32 = 14.0;
const MIN_MARGIN_IN: f32 = 0.25;
const MAX_MARGIN_IN: f32 = 1.0;
const MIN_LINE_HEIGHT: f32 = 1.1;
const MAX_LINE_HEIGHT: f32 = 1.8;

/// Every tunable the generator scripts used to hardcode, in one place and
/// threaded through each render call.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    pub page_size: Size,
    pub margins: Margins,
    pub body_font: Pt,
    pub code_font: Pt,
    /// Multiplier on the body font size.
    pub line_height: f32,
    /// Serif body text (Times); headings stay sans (Helvetica).
    pub serif_body: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            page_size: Size::trim_6x9(),
            margins: Margins::uniform_inches(0.5),
            body_font: Pt::from_f32(11.0),
            code_font: Pt::from_f32(9.0),
            line_height: 1.45,
            serif_body: true,
        }
    }
}

impl LayoutOptions {
    pub fn body_leading(&self) -> Pt {
        self.body_font * self.line_height
    }

    pub fn content_width(&self) -> Pt {
        self.margins
            .content_rect(self.page_size)
            .width
    }

    pub fn validate(&self) -> Result<(), PressError> {
        let content = self.margins.content_rect(self.page_size);
        if content.width <= Pt::ZERO || content.height <= Pt::ZERO {
            return Err(PressError::InvalidConfiguration(
                "margins leave no content area".to_string(),
            ));
        }
        let body = self.body_font.to_f32();
        if !(MIN_BODY_FONT_PT..=MAX_BODY_FONT_PT).contains(&body) {
            return Err(PressError::InvalidConfiguration(format!(
                "body font {body}pt outside {MIN_BODY_FONT_PT}..{MAX_BODY_FONT_PT}pt"
            )));
        }
        if !(MIN_LINE_HEIGHT..=MAX_LINE_HEIGHT).contains(&self.line_height) {
            return Err(PressError::InvalidConfiguration(format!(
                "line height {} outside {MIN_LINE_HEIGHT}..{MAX_LINE_HEIGHT}",
                self.line_height
            )));
        }
        Ok(())
    }

    /// Applies a corrective delta, clamped so repeated application can never
    /// produce an invalid configuration.
    pub fn apply(&self, delta: LayoutDelta) -> LayoutOptions {
        let mut next = self.clone();
        match delta {
            LayoutDelta::ShrinkBodyFont(step) => {
                let target = (self.body_font - step).to_f32().max(MIN_BODY_FONT_PT);
                next.body_font = Pt::from_f32(target);
                next.code_font = next.code_font.min(next.body_font);
            }
            LayoutDelta::WidenMargins(step) => {
                next.margins = clamp_margins(grow_margins(self.margins, step));
            }
            LayoutDelta::NarrowMargins(step) => {
                next.margins = clamp_margins(grow_margins(self.margins, -step));
            }
            LayoutDelta::TightenLeading(step) => {
                next.line_height = (self.line_height - step).max(MIN_LINE_HEIGHT);
            }
        }
        next
    }
}

fn grow_margins(margins: Margins, step: Pt) -> Margins {
    Margins {
        top: margins.top + step,
        right: margins.right + step,
        bottom: margins.bottom + step,
        left: margins.left + step,
    }
}

fn clamp_margins(margins: Margins) -> Margins {
    let lo = Pt::from_inches(MIN_MARGIN_IN);
    let hi = Pt::from_inches(MAX_MARGIN_IN);
    let clamp = |v: Pt| v.max(lo).min(hi);
    Margins {
        top: clamp(margins.top),
        right: clamp(margins.right),
        bottom: clamp(margins.bottom),
        left: clamp(margins.left),
    }
}

/// A single corrective action the retry harness may take between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutDelta {
    ShrinkBodyFont(Pt),
    WidenMargins(Pt),
    NarrowMargins(Pt),
    TightenLeading(f32),
}

/// Inputs the verifier needs beyond the layout itself. The expected page
/// count is deliberately an explicit input, never inferred from a
/// chapters-times-constant guess.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOptions {
    pub expected_pages: Option<usize>,
    /// Slack on either side of the configured margin, default 0.05in.
    pub margin_tolerance: Pt,
    /// How far past the trim a box must reach before it counts as overflow.
    pub overflow_tolerance: Pt,
    /// Cover + table of contents + at least one body page.
    pub min_pages: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            expected_pages: None,
            margin_tolerance: Pt::from_inches(0.05),
            overflow_tolerance: Pt::from_f32(5.0),
            min_pages: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        LayoutOptions::default().validate().expect("default valid");
    }

    #[test]
    fn shrink_body_font_floors_at_minimum() {
        let mut opts = LayoutOptions::default();
        for _ in 0..20 {
            opts = opts.apply(LayoutDelta::ShrinkBodyFont(Pt::from_f32(0.5)));
        }
        assert_eq!(opts.body_font.to_f32(), MIN_BODY_FONT_PT);
        opts.validate().expect("still valid after repeated deltas");
    }

    #[test]
    fn margin_deltas_clamp_to_band() {
        let mut opts = LayoutOptions::default();
        for _ in 0..40 {
            opts = opts.apply(LayoutDelta::WidenMargins(Pt::from_inches(0.05)));
        }
        assert_eq!(opts.margins.left.to_inches(), MAX_MARGIN_IN);
        for _ in 0..40 {
            opts = opts.apply(LayoutDelta::NarrowMargins(Pt::from_inches(0.05)));
        }
        assert!((opts.margins.left.to_inches() - MIN_MARGIN_IN).abs() < 1e-4);
        opts.validate().expect("still valid");
    }

    #[test]
    fn oversized_margins_fail_validation() {
        let opts = LayoutOptions {
            margins: Margins::uniform_inches(3.5),
            ..LayoutOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn shrinking_body_font_drags_code_font_down() {
        let opts = LayoutOptions {
            body_font: Pt::from_f32(9.0),
            code_font: Pt::from_f32(9.0),
            ..LayoutOptions::default()
        };
        let next = opts.apply(LayoutDelta::ShrinkBodyFont(Pt::from_f32(0.5)));
        assert!(next.code_font <= next.body_font);
    }
}
