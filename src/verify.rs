use crate::book::Theme;
use crate::canvas::{
    Command, Document, META_CONTENT_BOX, META_FULL_BLEED, META_PARA_TAIL,
};
use crate::config::{LayoutOptions, VerifyOptions};
use crate::pdfinspect::{PdfInspectError, PdfInspectReport};
use crate::types::{Pt, Rect, Size};
use base64::Engine;
use galleypress_qa_contract::Issue;
use kuchiki::traits::TendrilSink;

// Final lines at or under this word count read as orphans.
const ORPHAN_TAIL_WORDS: usize = 2;
// Minimum brightness separation between text and ground.
const MIN_BRIGHTNESS_GAP: f32 = 0.45;

/// Geometry capability the layout checks run against. Implemented by the
/// laid-out document (via its recorded metadata) and by synthetic fixtures
/// in tests, so the heuristics never need a real renderer.
pub trait LayoutProbe {
    fn page_count(&self) -> usize;
    fn page_size(&self) -> Size;
    /// Bounds of every placed flowable on a page (1-based), page space.
    fn content_boxes(&self, page: usize) -> Vec<Rect>;
    /// Final-line word counts of body paragraphs that ended on this page.
    fn paragraph_tails(&self, page: usize) -> Vec<usize>;
    /// Pages whose background intentionally runs to the trim edge skip
    /// the margin checks.
    fn is_full_bleed(&self, page: usize) -> bool;
}

impl LayoutProbe for Document {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self) -> Size {
        self.page_size
    }

    fn content_boxes(&self, page: usize) -> Vec<Rect> {
        let Some(page) = self.pages.get(page.wrapping_sub(1)) else {
            return Vec::new();
        };
        page.commands
            .iter()
            .filter_map(|command| match command {
                Command::Meta { key, value } if key == META_CONTENT_BOX => parse_box(value),
                _ => None,
            })
            .collect()
    }

    fn paragraph_tails(&self, page: usize) -> Vec<usize> {
        let Some(page) = self.pages.get(page.wrapping_sub(1)) else {
            return Vec::new();
        };
        page.commands
            .iter()
            .filter_map(|command| match command {
                Command::Meta { key, value } if key == META_PARA_TAIL => value.parse().ok(),
                _ => None,
            })
            .collect()
    }

    fn is_full_bleed(&self, page: usize) -> bool {
        let Some(page) = self.pages.get(page.wrapping_sub(1)) else {
            return false;
        };
        page.commands.iter().any(|command| {
            matches!(command, Command::Meta { key, .. } if key == META_FULL_BLEED)
        })
    }
}

fn parse_box(value: &str) -> Option<Rect> {
    let parts: Vec<i64> = value.split(',').filter_map(|p| p.parse().ok()).collect();
    if parts.len() != 4 {
        return None;
    }
    Some(Rect {
        x: Pt::from_milli_i64(parts[0]),
        y: Pt::from_milli_i64(parts[1]),
        width: Pt::from_milli_i64(parts[2]),
        height: Pt::from_milli_i64(parts[3]),
    })
}

/// A hand-built probe for exercising the checks without a layout run.
#[derive(Debug, Clone, Default)]
pub struct SyntheticPage {
    pub content_boxes: Vec<Rect>,
    pub paragraph_tails: Vec<usize>,
    pub full_bleed: bool,
}

#[derive(Debug, Clone)]
pub struct SyntheticProbe {
    pub page_size: Size,
    pub pages: Vec<SyntheticPage>,
}

impl LayoutProbe for SyntheticProbe {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self) -> Size {
        self.page_size
    }

    fn content_boxes(&self, page: usize) -> Vec<Rect> {
        self.pages
            .get(page.wrapping_sub(1))
            .map(|p| p.content_boxes.clone())
            .unwrap_or_default()
    }

    fn paragraph_tails(&self, page: usize) -> Vec<usize> {
        self.pages
            .get(page.wrapping_sub(1))
            .map(|p| p.paragraph_tails.clone())
            .unwrap_or_default()
    }

    fn is_full_bleed(&self, page: usize) -> bool {
        self.pages
            .get(page.wrapping_sub(1))
            .map(|p| p.full_bleed)
            .unwrap_or(false)
    }
}

/// Geometry battery: page counts, margin band, overflow, orphan tails.
pub fn verify_layout(
    probe: &dyn LayoutProbe,
    options: &LayoutOptions,
    verify: &VerifyOptions,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    let page_count = probe.page_count();
    let page = probe.page_size();

    if page_count < verify.min_pages {
        issues.push(Issue::new(
            "gp.layout.page_count_minimum",
            format!("{page_count} pages, need at least {}", verify.min_pages),
        ));
    }
    if let Some(expected) = verify.expected_pages {
        if page_count != expected {
            issues.push(
                Issue::new(
                    "gp.layout.page_count_expected",
                    format!("{page_count} pages, expected {expected}"),
                )
                .with_band(page_count as f64, expected as f64),
            );
        }
    }

    // White-border detection: the first page is the cover and must carry
    // a background that bleeds to the trim edge.
    if page_count >= 1 && !probe.is_full_bleed(1) {
        issues.push(
            Issue::new(
                "gp.layout.cover_bleed",
                "cover page background does not reach the trim edge",
            )
            .on_page(1),
        );
    }

    let tol = verify.margin_tolerance;
    let overflow_tol = verify.overflow_tolerance;
    for page_number in 1..=page_count {
        let boxes = probe.content_boxes(page_number);

        for rect in &boxes {
            let past_right = rect.right() - page.width;
            let past_bottom = rect.bottom() - page.height;
            if past_right > overflow_tol || past_bottom > overflow_tol {
                issues.push(
                    Issue::new(
                        "gp.layout.overflow_none",
                        format!(
                            "box {}x{}pt at ({}, {}) runs {}pt past the trim",
                            rect.width.to_f32(),
                            rect.height.to_f32(),
                            rect.x.to_f32(),
                            rect.y.to_f32(),
                            past_right.max(past_bottom).to_f32()
                        ),
                    )
                    .on_page(page_number),
                );
            }
        }

        if !probe.is_full_bleed(page_number) && !boxes.is_empty() {
            let left = boxes.iter().map(|b| b.x).fold(page.width, Pt::min);
            let top = boxes.iter().map(|b| b.y).fold(page.height, Pt::min);
            let right_edge = boxes.iter().map(|b| b.right()).fold(Pt::ZERO, Pt::max);
            if (left - options.margins.left).abs() > tol {
                issues.push(
                    Issue::new(
                        "gp.layout.margin_band",
                        format!(
                            "left margin {:.2}in outside band around {:.2}in",
                            left.to_inches(),
                            options.margins.left.to_inches()
                        ),
                    )
                    .on_page(page_number)
                    .with_band(left.to_inches() as f64, options.margins.left.to_inches() as f64),
                );
            }
            if (top - options.margins.top).abs() > tol {
                issues.push(
                    Issue::new(
                        "gp.layout.margin_band",
                        format!(
                            "top margin {:.2}in outside band around {:.2}in",
                            top.to_inches(),
                            options.margins.top.to_inches()
                        ),
                    )
                    .on_page(page_number)
                    .with_band(top.to_inches() as f64, options.margins.top.to_inches() as f64),
                );
            }
            let right_limit = page.width - options.margins.right + tol;
            if right_edge > right_limit && right_edge - page.width <= overflow_tol {
                issues.push(
                    Issue::new(
                        "gp.layout.margin_band",
                        format!(
                            "content reaches {:.2}in into the right margin",
                            (right_edge - (page.width - options.margins.right)).to_inches()
                        ),
                    )
                    .on_page(page_number),
                );
            }
        }

        for tail in probe.paragraph_tails(page_number) {
            if tail <= ORPHAN_TAIL_WORDS {
                issues.push(
                    Issue::new(
                        "gp.layout.orphan_tail",
                        format!("paragraph ends in a {tail}-word line"),
                    )
                    .on_page(page_number),
                );
            }
        }
    }

    issues
}

/// DOM battery over the rendered HTML artifact: structure counts, embedded
/// images, title, contrast.
pub fn verify_html(html: &str, expected_chapters: usize, theme: &Theme) -> Vec<Issue> {
    let mut issues = Vec::new();
    let document = kuchiki::parse_html().one(html);

    let count = |selector: &str| -> usize {
        document
            .select(selector)
            .map(|matches| matches.count())
            .unwrap_or(0)
    };

    let covers = count(".cover");
    if covers != 1 {
        issues.push(Issue::new(
            "gp.html.cover_single",
            format!("{covers} cover blocks, expected exactly 1"),
        ));
    }
    let chapters = count(".chapter");
    if chapters != expected_chapters {
        issues.push(Issue::new(
            "gp.html.chapter_count",
            format!("{chapters} chapter blocks, expected {expected_chapters}"),
        ));
    }

    let title_ok = document
        .select_first("title")
        .map(|title| !title.text_contents().trim().is_empty())
        .unwrap_or(false);
    if !title_ok {
        issues.push(Issue::new("gp.html.title_present", "empty document title"));
    }

    let mut image_count = 0usize;
    if let Ok(images) = document.select("img") {
        for image in images {
            image_count += 1;
            let attributes = image.attributes.borrow();
            let source = attributes.get("src").unwrap_or("");
            match decode_data_uri(source) {
                Some((mime, payload)) => {
                    let raster_ok = !mime.starts_with("image/")
                        || mime == "image/svg+xml"
                        || image::load_from_memory(&payload).is_ok();
                    if !raster_ok {
                        issues.push(Issue::new(
                            "gp.html.images_embedded",
                            format!("undecodable {mime} image"),
                        ));
                    }
                }
                None => {
                    issues.push(Issue::new(
                        "gp.html.images_embedded",
                        format!("image source is not an embedded data uri: {source}"),
                    ));
                }
            }
        }
    }
    if image_count == 0 {
        issues.push(Issue::new("gp.html.images_present", "no images loaded"));
    }

    let gap = (theme.text.brightness() - theme.background.brightness()).abs();
    if gap < MIN_BRIGHTNESS_GAP {
        issues.push(Issue::new(
            "gp.html.contrast_minimum",
            format!("text/background brightness gap {gap:.2} under {MIN_BRIGHTNESS_GAP}"),
        ));
    }

    issues
}

fn decode_data_uri(source: &str) -> Option<(String, Vec<u8>)> {
    let rest = source.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()?;
    Some((mime.to_string(), bytes))
}

/// Artifact battery over the written PDF, via independent re-inspection.
pub fn verify_artifact(
    inspection: &Result<PdfInspectReport, PdfInspectError>,
    layout_page_count: usize,
    options: &LayoutOptions,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    let report = match inspection {
        Ok(report) => report,
        Err(err) => {
            issues.push(Issue::new("gp.artifact.pdf_parses", err.to_string()));
            return issues;
        }
    };
    if report.encrypted || report.page_count == 0 || report.file_size_bytes == 0 {
        issues.push(Issue::new(
            "gp.artifact.pdf_parses",
            "artifact is empty or encrypted",
        ));
    }
    if report.page_count != layout_page_count {
        issues.push(Issue::new(
            "gp.artifact.page_count_match",
            format!(
                "pdf has {} pages, layout produced {layout_page_count}",
                report.page_count
            ),
        ));
    }
    match report.media_box_size() {
        Some((width, height)) => {
            let expect_w = options.page_size.width.to_f32();
            let expect_h = options.page_size.height.to_f32();
            if (width - expect_w).abs() > 1.0 || (height - expect_h).abs() > 1.0 {
                issues.push(Issue::new(
                    "gp.artifact.media_box_trim",
                    format!("media box {width}x{height}pt, trim is {expect_w}x{expect_h}pt"),
                ));
            }
        }
        None => {
            issues.push(Issue::new(
                "gp.artifact.media_box_trim",
                "first page has no media box",
            ));
        }
    }
    if report.title.is_none() || report.author.is_none() || report.producer.is_none() {
        issues.push(Issue::new(
            "gp.artifact.metadata_present",
            "info dictionary is missing title, author, or producer",
        ));
    }
    issues
}

/// Standalone battery for a PDF on disk, with no layout run to compare
/// against: parseability, trim size, metadata, and the page-count checks.
pub fn verify_existing_pdf(
    inspection: &Result<PdfInspectReport, PdfInspectError>,
    options: &LayoutOptions,
    verify: &VerifyOptions,
) -> Vec<Issue> {
    let report = match inspection {
        Ok(report) => report,
        Err(err) => {
            return vec![Issue::new("gp.artifact.pdf_parses", err.to_string())];
        }
    };
    let mut issues = verify_artifact(inspection, report.page_count, options);
    if report.page_count < verify.min_pages {
        issues.push(Issue::new(
            "gp.layout.page_count_minimum",
            format!(
                "{} pages, need at least {}",
                report.page_count, verify.min_pages
            ),
        ));
    }
    if let Some(expected) = verify.expected_pages {
        if report.page_count != expected {
            issues.push(
                Issue::new(
                    "gp.layout.page_count_expected",
                    format!("{} pages, expected {expected}", report.page_count),
                )
                .with_band(report.page_count as f64, expected as f64),
            );
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    fn page_size() -> Size {
        Size::trim_6x9()
    }

    fn margin_pt() -> f32 {
        36.0
    }

    fn body_box(y: f32, height: f32) -> Rect {
        Rect {
            x: Pt::from_f32(margin_pt()),
            y: Pt::from_f32(y),
            width: Pt::from_f32(360.0),
            height: Pt::from_f32(height),
        }
    }

    fn good_probe() -> SyntheticProbe {
        let body = SyntheticPage {
            content_boxes: vec![body_box(36.0, 200.0), body_box(240.0, 120.0)],
            paragraph_tails: vec![5, 7],
            full_bleed: false,
        };
        SyntheticProbe {
            page_size: page_size(),
            pages: vec![
                SyntheticPage {
                    content_boxes: vec![],
                    paragraph_tails: vec![],
                    full_bleed: true,
                },
                body.clone(),
                body,
            ],
        }
    }

    #[test]
    fn known_good_fixture_reports_no_issues() {
        let issues = verify_layout(
            &good_probe(),
            &LayoutOptions::default(),
            &VerifyOptions::default(),
        );
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn widened_element_reports_overflow() {
        let mut probe = good_probe();
        // 360pt of content starting mid-page: runs well past the trim.
        probe.pages[1].content_boxes.push(Rect {
            x: Pt::from_f32(200.0),
            y: Pt::from_f32(300.0),
            width: Pt::from_f32(360.0),
            height: Pt::from_f32(20.0),
        });
        let issues = verify_layout(
            &probe,
            &LayoutOptions::default(),
            &VerifyOptions::default(),
        );
        let overflow: Vec<_> = issues
            .iter()
            .filter(|i| i.check_id == "gp.layout.overflow_none")
            .collect();
        assert_eq!(overflow.len(), 1);
        assert_eq!(overflow[0].page, Some(2));
        assert!(overflow[0].detail.contains("past the trim"));
    }

    #[test]
    fn short_final_line_reports_orphan() {
        let mut probe = good_probe();
        probe.pages[2].paragraph_tails.push(1);
        let issues = verify_layout(
            &probe,
            &LayoutOptions::default(),
            &VerifyOptions::default(),
        );
        assert!(issues
            .iter()
            .any(|i| i.check_id == "gp.layout.orphan_tail" && i.page == Some(3)));
    }

    #[test]
    fn narrow_margin_breaks_the_band() {
        let mut probe = good_probe();
        // Content starting 0.25in from the edge against a 0.5in margin.
        probe.pages[1].content_boxes = vec![Rect {
            x: Pt::from_f32(18.0),
            y: Pt::from_f32(36.0),
            width: Pt::from_f32(300.0),
            height: Pt::from_f32(200.0),
        }];
        let issues = verify_layout(
            &probe,
            &LayoutOptions::default(),
            &VerifyOptions::default(),
        );
        assert!(issues.iter().any(|i| i.check_id == "gp.layout.margin_band"));
    }

    #[test]
    fn full_bleed_cover_skips_margin_checks() {
        let mut probe = good_probe();
        probe.pages[0].content_boxes = vec![Rect {
            x: Pt::ZERO,
            y: Pt::ZERO,
            width: Pt::from_f32(432.0),
            height: Pt::from_f32(648.0),
        }];
        let issues = verify_layout(
            &probe,
            &LayoutOptions::default(),
            &VerifyOptions::default(),
        );
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn margin_only_cover_fails_white_border_detection() {
        let mut probe = good_probe();
        // Cover drawn inside the margins instead of bleeding to the trim.
        probe.pages[0].full_bleed = false;
        probe.pages[0].content_boxes = vec![body_box(36.0, 400.0)];
        let issues = verify_layout(
            &probe,
            &LayoutOptions::default(),
            &VerifyOptions::default(),
        );
        assert!(issues
            .iter()
            .any(|i| i.check_id == "gp.layout.cover_bleed" && i.page == Some(1)));
    }

    #[test]
    fn page_count_checks_fire() {
        let probe = SyntheticProbe {
            page_size: page_size(),
            pages: vec![SyntheticPage::default()],
        };
        let mut verify = VerifyOptions::default();
        verify.expected_pages = Some(12);
        let issues = verify_layout(&probe, &LayoutOptions::default(), &verify);
        assert!(issues
            .iter()
            .any(|i| i.check_id == "gp.layout.page_count_minimum"));
        assert!(issues
            .iter()
            .any(|i| i.check_id == "gp.layout.page_count_expected"));
    }

    #[test]
    fn document_probe_reads_recorded_metadata() {
        use crate::canvas::Canvas;
        let mut canvas = Canvas::new(page_size());
        canvas.meta(META_FULL_BLEED, "1");
        canvas.show_page();
        canvas.record_content_bounds(body_box(36.0, 100.0));
        canvas.meta(META_PARA_TAIL, "2");
        let doc = canvas.finish();
        assert_eq!(doc.page_count(), 2);
        assert!(doc.is_full_bleed(1));
        assert!(!doc.is_full_bleed(2));
        assert_eq!(doc.content_boxes(2).len(), 1);
        assert_eq!(doc.paragraph_tails(2), vec![2]);
    }

    mod html {
        use super::*;
        use crate::assets::AssetLibrary;
        use crate::book::{Book, BookMetadata, Chapter};
        use crate::html::render_html;

        fn sample_book() -> Book {
            Book {
                metadata: BookMetadata {
                    title: "Test".to_string(),
                    subtitle: None,
                    author: "A".to_string(),
                    language: "en".to_string(),
                    theme: Theme::default(),
                },
                chapters: vec![Chapter {
                    number: 1,
                    title: "T".to_string(),
                    slug: "chapter-01".to_string(),
                    image: None,
                    body: "# T\n\nWord.".to_string(),
                }],
            }
        }

        #[test]
        fn imageless_book_reports_only_the_advisory_warning() {
            let book = sample_book();
            let html = render_html(
                &book,
                &AssetLibrary::default(),
                &crate::config::LayoutOptions::default(),
            );
            let issues = verify_html(&html, 1, &book.metadata.theme);
            assert_eq!(issues.len(), 1, "issues: {issues:?}");
            assert_eq!(issues[0].check_id, "gp.html.images_present");
            assert_eq!(issues[0].detail, "no images loaded");
        }

        #[test]
        fn external_image_source_is_a_broken_embed() {
            let html = "<html><head><title>t</title></head><body>\
                        <section class=\"cover\"></section>\
                        <section class=\"chapter\"><img src=\"chapter.png\"></section>\
                        </body></html>";
            let issues = verify_html(html, 1, &Theme::default());
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.html.images_embedded"));
        }

        #[test]
        fn corrupt_data_uri_is_a_broken_embed() {
            let html = "<html><head><title>t</title></head><body>\
                        <section class=\"cover\"></section>\
                        <section class=\"chapter\">\
                        <img src=\"data:image/png;base64,AAAA\"></section>\
                        </body></html>";
            let issues = verify_html(html, 1, &Theme::default());
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.html.images_embedded"));
        }

        #[test]
        fn duplicate_cover_and_missing_chapter_are_structural_issues() {
            let html = "<html><head><title>t</title></head><body>\
                        <section class=\"cover\"></section>\
                        <section class=\"cover\"></section>\
                        </body></html>";
            let issues = verify_html(html, 2, &Theme::default());
            assert!(issues.iter().any(|i| i.check_id == "gp.html.cover_single"));
            assert!(issues.iter().any(|i| i.check_id == "gp.html.chapter_count"));
        }

        #[test]
        fn low_contrast_theme_is_flagged() {
            let theme = Theme {
                text: Color::rgb(0.9, 0.9, 0.9),
                background: Color::WHITE,
                ..Theme::default()
            };
            let html = "<html><head><title>t</title></head><body>\
                        <section class=\"cover\"></section>\
                        <section class=\"chapter\"></section>\
                        </body></html>";
            let issues = verify_html(html, 1, &theme);
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.html.contrast_minimum"));
        }
    }

    mod artifact {
        use super::*;
        use crate::pdfinspect::PdfInspectErrorCode;

        fn good_report() -> PdfInspectReport {
            PdfInspectReport {
                pdf_version: "1.7".to_string(),
                page_count: 5,
                encrypted: false,
                file_size_bytes: 10_000,
                media_box: Some([0.0, 0.0, 432.0, 648.0]),
                title: Some("T".to_string()),
                author: Some("A".to_string()),
                producer: Some("galleypress".to_string()),
            }
        }

        #[test]
        fn clean_artifact_passes() {
            let issues = verify_artifact(&Ok(good_report()), 5, &LayoutOptions::default());
            assert!(issues.is_empty(), "issues: {issues:?}");
        }

        #[test]
        fn parse_failure_is_critical() {
            let inspection = Err(PdfInspectError {
                code: PdfInspectErrorCode::PdfParseFailed,
                message: "truncated".to_string(),
            });
            let issues = verify_artifact(&inspection, 5, &LayoutOptions::default());
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].check_id, "gp.artifact.pdf_parses");
        }

        #[test]
        fn page_count_and_media_box_drift_are_flagged() {
            let mut report = good_report();
            report.page_count = 4;
            report.media_box = Some([0.0, 0.0, 612.0, 792.0]);
            let issues = verify_artifact(&Ok(report), 5, &LayoutOptions::default());
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.artifact.page_count_match"));
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.artifact.media_box_trim"));
        }

        #[test]
        fn standalone_check_enforces_page_count_inputs() {
            let report = good_report();
            let mut verify = VerifyOptions::default();
            verify.expected_pages = Some(9);
            let issues = verify_existing_pdf(&Ok(report), &LayoutOptions::default(), &verify);
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.layout.page_count_expected"));
            assert!(!issues
                .iter()
                .any(|i| i.check_id == "gp.artifact.page_count_match"));
        }

        #[test]
        fn missing_info_fields_are_minor() {
            let mut report = good_report();
            report.producer = None;
            let issues = verify_artifact(&Ok(report), 5, &LayoutOptions::default());
            assert!(issues
                .iter()
                .any(|i| i.check_id == "gp.artifact.metadata_present"));
        }
    }
}
