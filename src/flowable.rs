use crate::canvas::{Canvas, META_PARA_TAIL};
use crate::font::BuiltinFont;
use crate::types::{Color, Pt, Rect, Shading, ShadingStop, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakBefore {
    Auto,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakAfter {
    Auto,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakInside {
    Auto,
    Avoid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub break_before: BreakBefore,
    pub break_after: BreakAfter,
    pub break_inside: BreakInside,
    /// Minimum lines kept on the page where a paragraph starts.
    pub orphans: usize,
    /// Minimum lines carried onto the page where a paragraph ends.
    pub widows: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            break_before: BreakBefore::Auto,
            break_after: BreakAfter::Auto,
            break_inside: BreakInside::Auto,
            orphans: 2,
            widows: 2,
        }
    }
}

pub trait Flowable: FlowableClone + Send + Sync {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size;
    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)>;
    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt);

    fn pagination(&self) -> Pagination {
        Pagination::default()
    }

    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait FlowableClone {
    fn clone_box(&self) -> Box<dyn Flowable>;
}

impl<T> FlowableClone for T
where
    T: 'static + Flowable + Clone,
{
    fn clone_box(&self) -> Box<dyn Flowable> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Flowable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
}

/// A styled run of text inside a paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub font: BuiltinFont,
    pub size: Pt,
    pub color: Color,
}

impl Span {
    pub fn new(text: impl Into<String>, font: BuiltinFont, size: Pt, color: Color) -> Self {
        Self {
            text: text.into(),
            font,
            size,
            color,
        }
    }
}

#[derive(Debug, Clone)]
struct Word {
    text: String,
    font: BuiltinFont,
    size: Pt,
    color: Color,
    width: Pt,
}

#[derive(Debug, Clone)]
struct Line {
    words: Vec<Word>,
    width: Pt,
}

/// Block paragraph with greedy line breaking over the built-in font
/// metrics. Splitting honors orphan/widow minimums; the final-line word
/// count is recorded as page metadata so the verifier can run its
/// short-tail heuristic without re-measuring.
#[derive(Debug, Clone)]
pub struct Paragraph {
    spans: Vec<Span>,
    leading: Pt,
    align: TextAlign,
    space_before: Pt,
    space_after: Pt,
    pagination: Pagination,
    record_tail: bool,
}

impl Paragraph {
    pub fn new(spans: Vec<Span>, leading: Pt) -> Self {
        Self {
            spans,
            leading,
            align: TextAlign::Left,
            space_before: Pt::ZERO,
            space_after: Pt::ZERO,
            pagination: Pagination::default(),
            record_tail: false,
        }
    }

    pub fn plain(
        text: impl Into<String>,
        font: BuiltinFont,
        size: Pt,
        color: Color,
        leading: Pt,
    ) -> Self {
        Self::new(vec![Span::new(text, font, size, color)], leading)
    }

    pub fn align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn space_before(mut self, space: Pt) -> Self {
        self.space_before = space;
        self
    }

    pub fn space_after(mut self, space: Pt) -> Self {
        self.space_after = space;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Body paragraphs opt in; headings and furniture stay out of the
    /// orphan statistics.
    pub fn record_tail(mut self) -> Self {
        self.record_tail = true;
        self
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        for (idx, span) in self.spans.iter().enumerate() {
            if idx > 0 && !out.ends_with(' ') {
                out.push(' ');
            }
            out.push_str(&span.text);
        }
        out
    }

    fn words(&self) -> Vec<Word> {
        let mut words = Vec::new();
        for span in &self.spans {
            for token in span.text.split_whitespace() {
                words.push(Word {
                    text: token.to_string(),
                    font: span.font,
                    size: span.size,
                    color: span.color,
                    width: span.font.text_width(token, span.size),
                });
            }
        }
        words
    }

    fn layout_lines(&self, avail_width: Pt) -> Vec<Line> {
        let words = self.words();
        if words.is_empty() {
            return Vec::new();
        }
        let mut lines: Vec<Line> = Vec::new();
        let mut current: Vec<Word> = Vec::new();
        let mut current_width = Pt::ZERO;
        for word in words {
            let space = if current.is_empty() {
                Pt::ZERO
            } else {
                word.font.text_width(" ", word.size)
            };
            let extended = current_width + space + word.width;
            if !current.is_empty() && extended > avail_width {
                lines.push(Line {
                    words: std::mem::take(&mut current),
                    width: current_width,
                });
                current_width = word.width;
                current.push(word);
            } else {
                current_width = extended;
                current.push(word);
            }
        }
        if !current.is_empty() {
            lines.push(Line {
                words: current,
                width: current_width,
            });
        }
        lines
    }

    fn from_lines(&self, lines: &[Line], first_half: bool) -> Paragraph {
        let mut spans: Vec<Span> = Vec::new();
        for line in lines {
            for word in &line.words {
                let matches_last = spans.last().map(|s: &Span| {
                    s.font == word.font && s.size == word.size && s.color == word.color
                });
                match matches_last {
                    Some(true) => {
                        let last = spans.last_mut().expect("span exists");
                        last.text.push(' ');
                        last.text.push_str(&word.text);
                    }
                    _ => spans.push(Span::new(
                        word.text.clone(),
                        word.font,
                        word.size,
                        word.color,
                    )),
                }
            }
        }
        Paragraph {
            spans,
            leading: self.leading,
            align: self.align,
            space_before: if first_half { self.space_before } else { Pt::ZERO },
            space_after: if first_half { Pt::ZERO } else { self.space_after },
            pagination: Pagination {
                break_before: BreakBefore::Auto,
                ..self.pagination
            },
            record_tail: !first_half && self.record_tail,
        }
    }

    fn max_line_width(lines: &[Line]) -> Pt {
        lines
            .iter()
            .map(|line| line.width)
            .fold(Pt::ZERO, |acc, w| acc.max(w))
    }
}

impl Flowable for Paragraph {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let lines = self.layout_lines(avail_width);
        Size {
            width: Self::max_line_width(&lines),
            height: self.space_before + self.leading * lines.len() as i32 + self.space_after,
        }
    }

    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let lines = self.layout_lines(avail_width);
        if lines.len() < 2 {
            return None;
        }
        let usable = avail_height - self.space_before;
        if usable <= Pt::ZERO {
            return None;
        }
        let mut fit = (usable.to_milli_i64() / self.leading.to_milli_i64().max(1)) as usize;
        if fit >= lines.len() {
            fit = lines.len() - 1;
        }
        let orphans = self.pagination.orphans.max(1);
        let widows = self.pagination.widows.max(1);
        if fit < orphans {
            return None;
        }
        if lines.len() - fit < widows {
            if lines.len() <= widows {
                return None;
            }
            fit = lines.len() - widows;
            if fit < orphans {
                return None;
            }
        }
        let first = self.from_lines(&lines[..fit], true);
        let second = self.from_lines(&lines[fit..], false);
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let lines = self.layout_lines(avail_width);
        let mut baseline = y + self.space_before;
        for line in &lines {
            let ascent = line
                .words
                .iter()
                .map(|w| w.font.line_ascent(w.size))
                .fold(Pt::ZERO, |acc, a| acc.max(a));
            let mut cursor = match self.align {
                TextAlign::Left => x,
                TextAlign::Center => x + (avail_width - line.width).max(Pt::ZERO) / 2,
            };
            for (idx, word) in line.words.iter().enumerate() {
                if idx > 0 {
                    cursor += word.font.text_width(" ", word.size);
                }
                canvas.set_font(word.font, word.size);
                canvas.set_fill_color(word.color);
                canvas.draw_string(cursor, baseline + ascent, word.text.clone());
                cursor += word.width;
            }
            baseline += self.leading;
        }
        // A single-line paragraph has no orphaned tail; only multi-line
        // bodies feed the short-tail statistic.
        if self.record_tail && lines.len() > 1 {
            if let Some(last) = lines.last() {
                canvas.meta(META_PARA_TAIL, last.words.len().to_string());
            }
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn debug_name(&self) -> &'static str {
        "Paragraph"
    }
}

/// Raster image placed at natural width, scaled down to the measure when
/// needed, aspect ratio preserved.
#[derive(Debug, Clone)]
pub struct ImageFlowable {
    resource_id: String,
    natural: Size,
    space_after: Pt,
}

impl ImageFlowable {
    pub fn new(resource_id: impl Into<String>, natural: Size) -> Self {
        Self {
            resource_id: resource_id.into(),
            natural,
            space_after: Pt::ZERO,
        }
    }

    pub fn space_after(mut self, space: Pt) -> Self {
        self.space_after = space;
        self
    }

    fn scaled(&self, avail_width: Pt) -> Size {
        if self.natural.width <= avail_width || self.natural.width <= Pt::ZERO {
            return self.natural;
        }
        let ratio = avail_width.to_f32() / self.natural.width.to_f32();
        Size {
            width: avail_width,
            height: self.natural.height * ratio,
        }
    }
}

impl Flowable for ImageFlowable {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let scaled = self.scaled(avail_width);
        Size {
            width: scaled.width,
            height: scaled.height + self.space_after,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let scaled = self.scaled(avail_width);
        let offset = (avail_width - scaled.width).max(Pt::ZERO) / 2;
        canvas.draw_image(x + offset, y, scaled.width, scaled.height, self.resource_id.clone());
    }

    fn pagination(&self) -> Pagination {
        Pagination {
            break_inside: BreakInside::Avoid,
            ..Pagination::default()
        }
    }

    fn debug_name(&self) -> &'static str {
        "ImageFlowable"
    }
}

/// Gradient block standing in for an image the project does not provide
/// (or an SVG the PDF path cannot embed), with the asset name lettered on
/// top.
#[derive(Debug, Clone)]
pub struct PlaceholderFlowable {
    label: String,
    height: Pt,
    shading: Shading,
    label_color: Color,
    space_after: Pt,
}

impl PlaceholderFlowable {
    pub fn new(label: impl Into<String>, height: Pt, from: Color, to: Color) -> Self {
        Self {
            label: label.into(),
            height,
            shading: Shading {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 1.0,
                stops: vec![
                    ShadingStop {
                        offset: 0.0,
                        color: from,
                    },
                    ShadingStop {
                        offset: 1.0,
                        color: to,
                    },
                ],
            },
            label_color: Color::WHITE,
            space_after: Pt::ZERO,
        }
    }

    pub fn space_after(mut self, space: Pt) -> Self {
        self.space_after = space;
        self
    }
}

impl Flowable for PlaceholderFlowable {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.height + self.space_after,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let rect = Rect {
            x,
            y,
            width: avail_width,
            height: self.height,
        };
        canvas.save_state();
        canvas.shade_rect(rect, self.shading.clone());
        let font = BuiltinFont::HelveticaBold;
        let size = Pt::from_f32(10.0);
        let text_width = font.text_width(&self.label, size);
        canvas.set_font(font, size);
        canvas.set_fill_color(self.label_color);
        canvas.draw_string(
            x + (avail_width - text_width).max(Pt::ZERO) / 2,
            y + self.height / 2 + font.line_ascent(size) / 2,
            self.label.clone(),
        );
        canvas.restore_state();
    }

    fn pagination(&self) -> Pagination {
        Pagination {
            break_inside: BreakInside::Avoid,
            ..Pagination::default()
        }
    }

    fn debug_name(&self) -> &'static str {
        "PlaceholderFlowable"
    }
}

#[derive(Debug, Clone)]
pub struct Spacer {
    height: Pt,
}

impl Spacer {
    pub fn new(height: Pt) -> Self {
        Self { height }
    }
}

impl Flowable for Spacer {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: Pt::ZERO,
            height: self.height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}

    fn debug_name(&self) -> &'static str {
        "Spacer"
    }
}

/// Thin horizontal rule, used for thematic breaks and the colophon divider.
#[derive(Debug, Clone)]
pub struct Rule {
    thickness: Pt,
    color: Color,
    space_before: Pt,
    space_after: Pt,
}

impl Rule {
    pub fn new(thickness: Pt, color: Color) -> Self {
        Self {
            thickness,
            color,
            space_before: Pt::ZERO,
            space_after: Pt::ZERO,
        }
    }

    pub fn spaced(mut self, before: Pt, after: Pt) -> Self {
        self.space_before = before;
        self.space_after = after;
        self
    }
}

impl Flowable for Rule {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.space_before + self.thickness + self.space_after,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        canvas.set_fill_color(self.color);
        canvas.fill_rect(x, y + self.space_before, avail_width, self.thickness);
    }

    fn debug_name(&self) -> &'static str {
        "Rule"
    }
}

/// Fenced code rendered as monospace lines on a tinted ground. Splits at
/// line granularity; each fragment repaints its own background.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    lines: Vec<String>,
    font_size: Pt,
    leading: Pt,
    padding: Pt,
    background: Color,
    ink: Color,
    space_after: Pt,
}

impl CodeBlock {
    pub fn new(source: &str, font_size: Pt, background: Color, ink: Color) -> Self {
        Self {
            lines: source.lines().map(|l| l.trim_end().to_string()).collect(),
            font_size,
            leading: font_size * 1.3,
            padding: Pt::from_f32(6.0),
            background,
            ink,
            space_after: Pt::ZERO,
        }
    }

    pub fn space_after(mut self, space: Pt) -> Self {
        self.space_after = space;
        self
    }

    /// Hard-wraps lines that exceed the measure; Courier is fixed pitch so
    /// the budget is a simple division.
    fn wrapped_lines(&self, avail_width: Pt) -> Vec<String> {
        let inner = (avail_width - self.padding * 2).max(Pt::ZERO);
        let char_width = BuiltinFont::Courier.text_width("0", self.font_size);
        let budget = if char_width <= Pt::ZERO {
            80
        } else {
            ((inner.to_milli_i64() / char_width.to_milli_i64().max(1)) as usize).max(8)
        };
        let mut out = Vec::new();
        for line in &self.lines {
            if line.chars().count() <= budget {
                out.push(line.clone());
                continue;
            }
            let mut rest: Vec<char> = line.chars().collect();
            while rest.len() > budget {
                let head: String = rest.drain(..budget).collect();
                out.push(head);
            }
            out.push(rest.into_iter().collect());
        }
        out
    }

    fn fragment(&self, lines: Vec<String>, carries_space_after: bool) -> CodeBlock {
        CodeBlock {
            lines,
            font_size: self.font_size,
            leading: self.leading,
            padding: self.padding,
            background: self.background,
            ink: self.ink,
            space_after: if carries_space_after {
                self.space_after
            } else {
                Pt::ZERO
            },
        }
    }
}

impl Flowable for CodeBlock {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let lines = self.wrapped_lines(avail_width);
        Size {
            width: avail_width,
            height: self.padding * 2 + self.leading * lines.len() as i32 + self.space_after,
        }
    }

    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let lines = self.wrapped_lines(avail_width);
        if lines.len() < 4 {
            return None;
        }
        let usable = avail_height - self.padding * 2;
        if usable <= Pt::ZERO {
            return None;
        }
        let mut fit = (usable.to_milli_i64() / self.leading.to_milli_i64().max(1)) as usize;
        if fit >= lines.len() {
            fit = lines.len() - 2;
        }
        if fit < 2 || lines.len() - fit < 2 {
            return None;
        }
        let first = self.fragment(lines[..fit].to_vec(), false);
        let second = self.fragment(lines[fit..].to_vec(), true);
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let lines = self.wrapped_lines(avail_width);
        let box_height = self.padding * 2 + self.leading * lines.len() as i32;
        canvas.set_fill_color(self.background);
        canvas.fill_rect(x, y, avail_width, box_height);
        canvas.set_font(BuiltinFont::Courier, self.font_size);
        canvas.set_fill_color(self.ink);
        let ascent = BuiltinFont::Courier.line_ascent(self.font_size);
        let mut baseline = y + self.padding + ascent;
        for line in &lines {
            if !line.is_empty() {
                canvas.draw_string(x + self.padding, baseline, line.clone());
            }
            baseline += self.leading;
        }
    }

    fn debug_name(&self) -> &'static str {
        "CodeBlock"
    }
}

/// Note/Warning/Tip box: accent bar plus tinted ground wrapping an inner
/// paragraph. Kept on one page.
#[derive(Debug, Clone)]
pub struct CalloutBox {
    inner: Paragraph,
    accent: Color,
    background: Color,
    padding: Pt,
    space_after: Pt,
}

impl CalloutBox {
    pub fn new(inner: Paragraph, accent: Color, background: Color) -> Self {
        Self {
            inner,
            accent,
            background,
            padding: Pt::from_f32(8.0),
            space_after: Pt::ZERO,
        }
    }

    pub fn space_after(mut self, space: Pt) -> Self {
        self.space_after = space;
        self
    }

    fn inner_width(&self, avail_width: Pt) -> Pt {
        (avail_width - self.padding * 2 - accent_bar_width()).max(Pt::ZERO)
    }
}

fn accent_bar_width() -> Pt {
    Pt::from_f32(3.0)
}

impl Flowable for CalloutBox {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size {
        let inner = self
            .inner
            .wrap(self.inner_width(avail_width), avail_height);
        Size {
            width: avail_width,
            height: inner.height + self.padding * 2 + self.space_after,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt) {
        let inner_width = self.inner_width(avail_width);
        let inner_size = self.inner.wrap(inner_width, avail_height);
        let box_height = inner_size.height + self.padding * 2;
        canvas.set_fill_color(self.background);
        canvas.fill_rect(x, y, avail_width, box_height);
        canvas.set_fill_color(self.accent);
        canvas.fill_rect(x, y, accent_bar_width(), box_height);
        self.inner.draw(
            canvas,
            x + accent_bar_width() + self.padding,
            y + self.padding,
            inner_width,
            avail_height,
        );
    }

    fn pagination(&self) -> Pagination {
        Pagination {
            break_inside: BreakInside::Avoid,
            ..Pagination::default()
        }
    }

    fn debug_name(&self) -> &'static str {
        "CalloutBox"
    }
}
