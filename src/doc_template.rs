use crate::canvas::{Canvas, Document, META_PAGE_TEMPLATE};
use crate::debug::DebugLogger;
use crate::error::PressError;
use crate::flowable::{BreakAfter, BreakBefore, Flowable};
use crate::frame::AddResult;
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::page_template::{PageContext, PageTemplate};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Flows a story through a sequence of page templates. Page 1 takes
/// templates[0], page 2 templates[1], and the last template repeats for
/// every page after that.
pub struct DocTemplate {
    page_templates: Vec<PageTemplate>,
    story: Vec<Box<dyn Flowable>>,
    debug: Option<Arc<DebugLogger>>,
}

impl DocTemplate {
    pub fn new(page_templates: Vec<PageTemplate>) -> Self {
        Self {
            page_templates,
            story: Vec::new(),
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Arc<DebugLogger>) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn add_flowable(&mut self, flowable: Box<dyn Flowable>) {
        self.story.push(flowable);
    }

    pub fn build(self) -> Result<Document, PressError> {
        Ok(self.build_with_metrics()?.0)
    }

    pub fn build_with_metrics(self) -> Result<(Document, DocumentMetrics), PressError> {
        if self.page_templates.is_empty() {
            return Err(PressError::MissingPageTemplate);
        }

        let debug = self.debug.clone();
        let log_page_break = |from_page: usize, reason: &str, flowable_name: &str| {
            let Some(logger) = debug.as_deref() else {
                return;
            };
            logger.event(
                "layout.page_break",
                &[
                    ("reason", reason),
                    ("from_page", &from_page.to_string()),
                    ("flowable", flowable_name),
                ],
            );
            logger.increment("layout.page_break", 1);
        };

        fn select_template(templates: &[PageTemplate], page_number: usize) -> &PageTemplate {
            let idx = page_number.saturating_sub(1).min(templates.len() - 1);
            &templates[idx]
        }

        let open_page = |canvas: &mut Canvas, templates: &[PageTemplate], page_number: usize| {
            let template = select_template(templates, page_number);
            if let Some(callback) = template.on_page_callback() {
                callback(canvas, &PageContext::new(page_number, &template.name));
            }
            canvas.meta(META_PAGE_TEMPLATE, template.name.clone());
            template.instantiate_frames()
        };

        let template = select_template(&self.page_templates, 1);
        let mut canvas = Canvas::new(template.page_size);
        let mut page_number = 1usize;
        let mut frames = open_page(&mut canvas, &self.page_templates, page_number);
        let mut frame_index = 0usize;
        let mut placed_on_page = false;
        let mut metrics = DocumentMetrics::default();
        let mut page_start = Instant::now();
        let mut page_flowables = 0usize;

        let finish_page = |canvas: &mut Canvas,
                          page_number: usize,
                          page_flowables: &mut usize,
                          metrics: &mut DocumentMetrics,
                          page_start: &mut Instant| {
            if canvas.is_current_empty() {
                return;
            }
            let elapsed = page_start.elapsed().as_secs_f64() * 1000.0;
            metrics.total_render_ms += elapsed;
            metrics.pages.push(PageMetrics {
                page_number,
                render_ms: elapsed,
                command_count: canvas.current_command_count(),
                flowable_count: *page_flowables,
            });
            canvas.show_page();
            *page_flowables = 0;
            *page_start = Instant::now();
        };

        let mut story: VecDeque<Box<dyn Flowable>> = self.story.into();

        while let Some(flowable) = story.pop_front() {
            let mut current = flowable;
            let mut suppress_break_before = false;
            loop {
                let current_name = current.debug_name();
                let pagination = current.pagination();

                if !suppress_break_before
                    && pagination.break_before == BreakBefore::Page
                    && (placed_on_page || frame_index > 0)
                {
                    log_page_break(page_number, "break_before_page", current_name);
                    finish_page(
                        &mut canvas,
                        page_number,
                        &mut page_flowables,
                        &mut metrics,
                        &mut page_start,
                    );
                    page_number += 1;
                    frames = open_page(&mut canvas, &self.page_templates, page_number);
                    frame_index = 0;
                    placed_on_page = false;
                }

                if frame_index >= frames.len() {
                    log_page_break(page_number, "frame_exhausted", current_name);
                    finish_page(
                        &mut canvas,
                        page_number,
                        &mut page_flowables,
                        &mut metrics,
                        &mut page_start,
                    );
                    page_number += 1;
                    frames = open_page(&mut canvas, &self.page_templates, page_number);
                    frame_index = 0;
                    placed_on_page = false;
                }

                if frames.is_empty() {
                    return Err(PressError::MissingPageTemplate);
                }

                let is_last_frame = frame_index + 1 >= frames.len();
                let frame_rect = frames[frame_index].rect();
                let stuck_details = if !placed_on_page && is_last_frame {
                    let size = current.wrap(frame_rect.width, frame_rect.height);
                    Some(format!(
                        "{} size={}x{}pt frame={}x{}pt",
                        current_name,
                        size.width.to_f32(),
                        size.height.to_f32(),
                        frame_rect.width.to_f32(),
                        frame_rect.height.to_f32(),
                    ))
                } else {
                    None
                };

                let frame = &mut frames[frame_index];
                match frame.add(current, &mut canvas) {
                    AddResult::Placed => {
                        placed_on_page = true;
                        page_flowables += 1;
                        if pagination.break_after == BreakAfter::Page {
                            log_page_break(page_number, "break_after_page", current_name);
                            finish_page(
                                &mut canvas,
                                page_number,
                                &mut page_flowables,
                                &mut metrics,
                                &mut page_start,
                            );
                            page_number += 1;
                            frames = open_page(&mut canvas, &self.page_templates, page_number);
                            frame_index = 0;
                            placed_on_page = false;
                        }
                        break;
                    }
                    AddResult::Split(remaining) => {
                        placed_on_page = true;
                        page_flowables += 1;
                        log_page_break(page_number, "flowable_split", current_name);
                        suppress_break_before = true;
                        current = remaining;
                        frame_index += 1;
                    }
                    AddResult::Overflow(remaining) => {
                        if !placed_on_page && is_last_frame {
                            let details = stuck_details.unwrap_or_else(|| "unknown".to_string());
                            return Err(PressError::UnplaceableFlowable(details));
                        }
                        log_page_break(page_number, "frame_overflow", current_name);
                        current = remaining;
                        frame_index += 1;
                    }
                }
            }
        }

        if !canvas.is_current_empty() || metrics.pages.is_empty() {
            finish_page(
                &mut canvas,
                page_number,
                &mut page_flowables,
                &mut metrics,
                &mut page_start,
            );
        }

        Ok((canvas.finish_without_show(), metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::{Pagination, Paragraph, Spacer};
    use crate::font::BuiltinFont;
    use crate::types::{Color, Margins, Pt, Size};

    fn body_template() -> PageTemplate {
        let page = Size::trim_6x9();
        let content = Margins::uniform_inches(0.5).content_rect(page);
        PageTemplate::new("body", page).with_frame(content)
    }

    fn para(text: &str) -> Paragraph {
        Paragraph::plain(
            text,
            BuiltinFont::TimesRoman,
            Pt::from_f32(11.0),
            Color::BLACK,
            Pt::from_f32(16.0),
        )
    }

    #[test]
    fn short_story_fits_one_page() {
        let mut doc = DocTemplate::new(vec![body_template()]);
        doc.add_flowable(Box::new(para("hello world")));
        let (document, metrics) = doc.build_with_metrics().expect("build");
        assert_eq!(document.pages.len(), 1);
        assert_eq!(metrics.page_count(), 1);
        assert_eq!(metrics.pages[0].flowable_count, 1);
    }

    #[test]
    fn long_story_spills_to_more_pages() {
        let mut doc = DocTemplate::new(vec![body_template()]);
        let text = "pagination exercises every frame boundary ".repeat(40);
        for _ in 0..12 {
            doc.add_flowable(Box::new(para(&text)));
        }
        let document = doc.build().expect("build");
        assert!(document.pages.len() > 1);
    }

    #[test]
    fn break_before_page_opens_a_fresh_page() {
        let mut doc = DocTemplate::new(vec![body_template()]);
        doc.add_flowable(Box::new(para("first page")));
        let opener = para("chapter opener").with_pagination(Pagination {
            break_before: crate::flowable::BreakBefore::Page,
            ..Pagination::default()
        });
        doc.add_flowable(Box::new(opener));
        let document = doc.build().expect("build");
        assert_eq!(document.pages.len(), 2);
    }

    #[test]
    fn break_after_page_is_honored() {
        let mut doc = DocTemplate::new(vec![body_template()]);
        let cover = para("cover").with_pagination(Pagination {
            break_after: crate::flowable::BreakAfter::Page,
            ..Pagination::default()
        });
        doc.add_flowable(Box::new(cover));
        doc.add_flowable(Box::new(para("body")));
        let document = doc.build().expect("build");
        assert_eq!(document.pages.len(), 2);
    }

    #[test]
    fn empty_story_still_emits_one_page() {
        let doc = DocTemplate::new(vec![body_template()]);
        let document = doc.build().expect("build");
        assert_eq!(document.pages.len(), 1);
    }

    #[test]
    fn missing_templates_error() {
        let doc = DocTemplate::new(Vec::new());
        match doc.build() {
            Err(PressError::MissingPageTemplate) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn spacer_story_never_loops_forever() {
        let mut doc = DocTemplate::new(vec![body_template()]);
        for _ in 0..50 {
            doc.add_flowable(Box::new(Spacer::new(Pt::from_f32(200.0))));
        }
        let document = doc.build().expect("build");
        assert!(document.pages.len() >= 17, "50 * 200pt in 576pt frames");
    }
}
