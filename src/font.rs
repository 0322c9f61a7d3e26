use crate::types::Pt;

/// The base-14 faces the press draws with. Widths come from the standard
/// AFM tables, so measurement needs no font files at all and every PDF
/// viewer renders without embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    Courier,
    CourierBold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFamily {
    Sans,
    Serif,
    Mono,
}

impl BuiltinFont {
    pub fn select(family: FontFamily, bold: bool, italic: bool) -> Self {
        match (family, bold, italic) {
            (FontFamily::Sans, false, false) => BuiltinFont::Helvetica,
            (FontFamily::Sans, true, _) => BuiltinFont::HelveticaBold,
            (FontFamily::Sans, false, true) => BuiltinFont::HelveticaOblique,
            (FontFamily::Serif, false, false) => BuiltinFont::TimesRoman,
            (FontFamily::Serif, true, _) => BuiltinFont::TimesBold,
            (FontFamily::Serif, false, true) => BuiltinFont::TimesItalic,
            (FontFamily::Mono, true, _) => BuiltinFont::CourierBold,
            (FontFamily::Mono, false, _) => BuiltinFont::Courier,
        }
    }

    /// PostScript BaseFont name as it appears in the PDF font dictionary.
    pub fn base_font_name(&self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::HelveticaBold => "Helvetica-Bold",
            BuiltinFont::HelveticaOblique => "Helvetica-Oblique",
            BuiltinFont::TimesRoman => "Times-Roman",
            BuiltinFont::TimesBold => "Times-Bold",
            BuiltinFont::TimesItalic => "Times-Italic",
            BuiltinFont::Courier => "Courier",
            BuiltinFont::CourierBold => "Courier-Bold",
        }
    }

    pub fn all() -> [BuiltinFont; 8] {
        [
            BuiltinFont::Helvetica,
            BuiltinFont::HelveticaBold,
            BuiltinFont::HelveticaOblique,
            BuiltinFont::TimesRoman,
            BuiltinFont::TimesBold,
            BuiltinFont::TimesItalic,
            BuiltinFont::Courier,
            BuiltinFont::CourierBold,
        ]
    }

    /// Per-mille ascent above the baseline.
    pub fn ascent(&self) -> i64 {
        match self {
            BuiltinFont::Helvetica
            | BuiltinFont::HelveticaBold
            | BuiltinFont::HelveticaOblique => 718,
            BuiltinFont::TimesRoman | BuiltinFont::TimesBold | BuiltinFont::TimesItalic => 683,
            BuiltinFont::Courier | BuiltinFont::CourierBold => 629,
        }
    }

    /// Per-mille descent below the baseline (negative).
    pub fn descent(&self) -> i64 {
        match self {
            BuiltinFont::Helvetica
            | BuiltinFont::HelveticaBold
            | BuiltinFont::HelveticaOblique => -207,
            BuiltinFont::TimesRoman | BuiltinFont::TimesBold | BuiltinFont::TimesItalic => -217,
            BuiltinFont::Courier | BuiltinFont::CourierBold => -157,
        }
    }

    fn widths(&self) -> &'static [u16; 95] {
        match self {
            BuiltinFont::Helvetica | BuiltinFont::HelveticaOblique => &HELVETICA_WIDTHS,
            BuiltinFont::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
            BuiltinFont::TimesRoman => &TIMES_ROMAN_WIDTHS,
            BuiltinFont::TimesBold => &TIMES_BOLD_WIDTHS,
            BuiltinFont::TimesItalic => &TIMES_ITALIC_WIDTHS,
            BuiltinFont::Courier | BuiltinFont::CourierBold => &COURIER_WIDTHS,
        }
    }

    fn default_width(&self) -> u16 {
        match self {
            BuiltinFont::Helvetica
            | BuiltinFont::HelveticaBold
            | BuiltinFont::HelveticaOblique => 556,
            BuiltinFont::TimesRoman | BuiltinFont::TimesBold | BuiltinFont::TimesItalic => 500,
            BuiltinFont::Courier | BuiltinFont::CourierBold => 600,
        }
    }

    /// Advance width of one character in per-mille of the font size.
    /// Characters outside the ASCII table get the face's typical letter
    /// width, which keeps line breaking sane for accented Latin text.
    pub fn char_width_per_mille(&self, ch: char) -> u16 {
        let code = ch as u32;
        if (32..=126).contains(&code) {
            self.widths()[(code - 32) as usize]
        } else if ch == '\u{00a0}' {
            self.widths()[0]
        } else {
            self.default_width()
        }
    }

    pub fn text_width(&self, text: &str, size: Pt) -> Pt {
        let per_mille: i64 = text
            .chars()
            .map(|ch| self.char_width_per_mille(ch) as i64)
            .sum();
        size.mul_per_mille(per_mille)
    }

    pub fn line_ascent(&self, size: Pt) -> Pt {
        size.mul_per_mille(self.ascent())
    }
}

// AFM widths for ASCII 32..=126, per-mille of the em square.

#[rustfmt::skip]
static HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
static HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
static TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
static TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

#[rustfmt::skip]
static TIMES_ITALIC_WIDTHS: [u16; 95] = [
    250, 333, 420, 500, 500, 833, 778, 214, 333, 333, 500, 675, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 675, 675, 675, 500,
    920, 611, 611, 667, 722, 611, 611, 722, 722, 333, 444, 667, 556, 833, 667, 722,
    611, 722, 611, 500, 556, 722, 611, 833, 611, 556, 556, 389, 278, 389, 422, 500,
    333, 500, 500, 444, 500, 444, 278, 500, 500, 278, 278, 444, 278, 722, 500, 500,
    500, 500, 389, 389, 278, 500, 444, 667, 444, 444, 389, 400, 275, 400, 541,
];

#[rustfmt::skip]
static COURIER_WIDTHS: [u16; 95] = [
    600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600,
    600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600,
    600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600,
    600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600,
    600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600,
    600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600, 600,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_hi_measures_per_afm() {
        // H=722, i=222 per mille; at 10pt that is 9.44pt.
        let w = BuiltinFont::Helvetica.text_width("Hi", Pt::from_f32(10.0));
        assert_eq!(w.to_milli_i64(), 9_440);
    }

    #[test]
    fn oblique_shares_upright_widths() {
        let upright = BuiltinFont::Helvetica.text_width("Slant", Pt::from_f32(12.0));
        let oblique = BuiltinFont::HelveticaOblique.text_width("Slant", Pt::from_f32(12.0));
        assert_eq!(upright, oblique);
    }

    #[test]
    fn courier_is_fixed_pitch() {
        let size = Pt::from_f32(9.0);
        let a = BuiltinFont::Courier.text_width("iii", size);
        let b = BuiltinFont::Courier.text_width("WWW", size);
        assert_eq!(a, b);
    }

    #[test]
    fn bold_body_runs_wider_than_regular() {
        let size = Pt::from_f32(11.0);
        let regular = BuiltinFont::TimesRoman.text_width("emphasis", size);
        let bold = BuiltinFont::TimesBold.text_width("emphasis", size);
        assert!(bold > regular);
    }

    #[test]
    fn non_ascii_gets_fallback_width() {
        let w = BuiltinFont::Helvetica.char_width_per_mille('é');
        assert_eq!(w, 556);
        assert_eq!(BuiltinFont::Helvetica.char_width_per_mille('\u{00a0}'), 278);
    }

    #[test]
    fn family_selection_covers_styles() {
        assert_eq!(
            BuiltinFont::select(FontFamily::Serif, false, true),
            BuiltinFont::TimesItalic
        );
        assert_eq!(
            BuiltinFont::select(FontFamily::Sans, true, true),
            BuiltinFont::HelveticaBold
        );
        assert_eq!(
            BuiltinFont::select(FontFamily::Mono, false, false),
            BuiltinFont::Courier
        );
    }
}
