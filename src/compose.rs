use crate::assets::{AssetLibrary, ImageKind};
use crate::book::{Book, Chapter, Theme};
use crate::canvas::META_FULL_BLEED;
use crate::config::LayoutOptions;
use crate::flowable::{
    BreakAfter, BreakBefore, CalloutBox, CodeBlock, Flowable, ImageFlowable, Pagination,
    Paragraph, PlaceholderFlowable, Rule, Spacer, Span, TextAlign,
};
use crate::font::{BuiltinFont, FontFamily};
use crate::markdown::{Block, Inline, parse_markdown};
use crate::page_template::PageTemplate;
use crate::types::{Color, Pt, Rect, Shading, ShadingStop};

pub struct Composition {
    pub templates: Vec<PageTemplate>,
    pub story: Vec<Box<dyn Flowable>>,
}

/// Builds the page templates and the full story for a book: cover page,
/// table of contents, one run of flowables per chapter, colophon.
pub fn compose(book: &Book, assets: &AssetLibrary, options: &LayoutOptions) -> Composition {
    let templates = vec![
        cover_template(book, assets, options),
        body_template(options),
    ];
    let mut story: Vec<Box<dyn Flowable>> = Vec::new();
    push_cover_story(&mut story, book, options);
    push_toc_story(&mut story, book, options);
    for chapter in &book.chapters {
        push_chapter_story(&mut story, chapter, book, assets, options);
    }
    push_colophon_story(&mut story, book, options);
    Composition { templates, story }
}

fn cover_shading(theme: &Theme) -> Shading {
    Shading {
        x0: 0.0,
        y0: 0.0,
        x1: 1.0,
        y1: 1.0,
        stops: vec![
            ShadingStop {
                offset: 0.0,
                color: theme.cover_gradient.0,
            },
            ShadingStop {
                offset: 1.0,
                color: theme.cover_gradient.1,
            },
        ],
    }
}

/// The cover page bleeds to the trim edge: either the cover raster drawn
/// over the full page or the theme gradient when the project ships no
/// usable cover (SVG covers fall back to the gradient in the PDF path).
fn cover_template(book: &Book, assets: &AssetLibrary, options: &LayoutOptions) -> PageTemplate {
    let page = options.page_size;
    let theme = book.metadata.theme.clone();
    let cover_resource = assets
        .cover()
        .filter(|asset| asset.kind != ImageKind::Svg)
        .map(|asset| asset.name.clone());
    let shading = cover_shading(&theme);
    let frame = Rect {
        x: Pt::from_inches(0.5),
        y: Pt::from_inches(0.5),
        width: page.width - Pt::from_inches(1.0),
        height: page.height - Pt::from_inches(1.0),
    };
    PageTemplate::new("cover", page)
        .with_frame(frame)
        .on_page(move |canvas, _ctx| {
            canvas.meta(META_FULL_BLEED, "1");
            match &cover_resource {
                Some(resource) => {
                    canvas.draw_image(Pt::ZERO, Pt::ZERO, page.width, page.height, resource.clone());
                }
                None => {
                    canvas.shade_rect(
                        Rect {
                            x: Pt::ZERO,
                            y: Pt::ZERO,
                            width: page.width,
                            height: page.height,
                        },
                        shading.clone(),
                    );
                }
            }
        })
}

/// Body pages share one frame inside the configured margins and carry a
/// centered folio in the bottom margin.
fn body_template(options: &LayoutOptions) -> PageTemplate {
    let page = options.page_size;
    let content = options.margins.content_rect(page);
    let folio_baseline = page.height - options.margins.bottom / 2;
    PageTemplate::new("body", page)
        .with_frame(content)
        .on_page(move |canvas, ctx| {
            let font = BuiltinFont::Helvetica;
            let size = Pt::from_f32(8.0);
            let folio = ctx.page_number.to_string();
            let width = font.text_width(&folio, size);
            canvas.set_font(font, size);
            canvas.set_fill_color(Color::rgb(0.4, 0.4, 0.4));
            canvas.draw_string(
                content.x + (content.width - width) / 2,
                folio_baseline,
                folio,
            );
        })
}

fn body_font(options: &LayoutOptions) -> FontFamily {
    if options.serif_body {
        FontFamily::Serif
    } else {
        FontFamily::Sans
    }
}

fn push_cover_story(
    story: &mut Vec<Box<dyn Flowable>>,
    book: &Book,
    options: &LayoutOptions,
) {
    let metadata = &book.metadata;
    let page = options.page_size;
    // Drop the title block into the lower third of the cover.
    story.push(Box::new(Spacer::new(page.height * 0.55)));
    story.push(Box::new(
        Paragraph::plain(
            metadata.title.clone(),
            BuiltinFont::HelveticaBold,
            Pt::from_f32(28.0),
            Color::WHITE,
            Pt::from_f32(34.0),
        )
        .align(TextAlign::Center)
        .space_after(Pt::from_f32(10.0)),
    ));
    if let Some(subtitle) = &metadata.subtitle {
        story.push(Box::new(
            Paragraph::plain(
                subtitle.clone(),
                BuiltinFont::Helvetica,
                Pt::from_f32(14.0),
                Color::WHITE,
                Pt::from_f32(20.0),
            )
            .align(TextAlign::Center)
            .space_after(Pt::from_f32(18.0)),
        ));
    }
    story.push(Box::new(
        Paragraph::plain(
            metadata.author.clone(),
            BuiltinFont::Helvetica,
            Pt::from_f32(12.0),
            Color::WHITE,
            Pt::from_f32(16.0),
        )
        .align(TextAlign::Center)
        .with_pagination(Pagination {
            break_after: BreakAfter::Page,
            ..Pagination::default()
        }),
    ));
}

fn push_toc_story(story: &mut Vec<Box<dyn Flowable>>, book: &Book, options: &LayoutOptions) {
    let theme = &book.metadata.theme;
    story.push(Box::new(
        Paragraph::plain(
            "Contents",
            BuiltinFont::HelveticaBold,
            Pt::from_f32(18.0),
            theme.accent,
            Pt::from_f32(24.0),
        )
        .space_after(Pt::from_f32(14.0)),
    ));
    let family = body_font(options);
    for chapter in &book.chapters {
        let spans = vec![
            Span::new(
                format!("{}.", chapter.number),
                BuiltinFont::select(family, true, false),
                options.body_font,
                theme.accent,
            ),
            Span::new(
                chapter.title.clone(),
                BuiltinFont::select(family, false, false),
                options.body_font,
                theme.text,
            ),
        ];
        story.push(Box::new(
            Paragraph::new(spans, options.body_leading()).space_after(Pt::from_f32(4.0)),
        ));
    }
}

fn push_chapter_story(
    story: &mut Vec<Box<dyn Flowable>>,
    chapter: &Chapter,
    book: &Book,
    assets: &AssetLibrary,
    options: &LayoutOptions,
) {
    let theme = &book.metadata.theme;
    story.push(Box::new(
        Paragraph::plain(
            format!("{}. {}", chapter.number, chapter.title),
            BuiltinFont::HelveticaBold,
            Pt::from_f32(18.0),
            theme.accent,
            Pt::from_f32(24.0),
        )
        .space_after(Pt::from_f32(16.0))
        .with_pagination(Pagination {
            break_before: BreakBefore::Page,
            ..Pagination::default()
        }),
    ));

    match assets.for_chapter(chapter.number, chapter.image.as_deref()) {
        Some(asset) if asset.kind != ImageKind::Svg => {
            story.push(Box::new(
                ImageFlowable::new(asset.name.clone(), asset.point_size())
                    .space_after(Pt::from_f32(12.0)),
            ));
        }
        Some(asset) => {
            // SVG art has no raster path into the PDF; stand in with the
            // themed block carrying the asset name.
            story.push(Box::new(
                PlaceholderFlowable::new(
                    asset.name.clone(),
                    Pt::from_inches(1.6),
                    theme.cover_gradient.0,
                    theme.cover_gradient.1,
                )
                .space_after(Pt::from_f32(12.0)),
            ));
        }
        None => {}
    }

    for block in parse_markdown(&chapter.body) {
        push_block(story, &block, theme, options);
    }
}

fn push_block(
    story: &mut Vec<Box<dyn Flowable>>,
    block: &Block,
    theme: &Theme,
    options: &LayoutOptions,
) {
    let family = body_font(options);
    match block {
        Block::Heading { level, inlines } => {
            let size = match level {
                1 => Pt::from_f32(14.0),
                2 => Pt::from_f32(12.5),
                _ => options.body_font * 1.1,
            };
            let text = inlines
                .iter()
                .map(Inline::plain_text)
                .collect::<Vec<_>>()
                .join(" ");
            story.push(Box::new(
                Paragraph::plain(
                    text,
                    BuiltinFont::HelveticaBold,
                    size,
                    theme.text,
                    size * 1.3,
                )
                .space_before(Pt::from_f32(10.0))
                .space_after(Pt::from_f32(6.0)),
            ));
        }
        Block::Paragraph(inlines) => {
            story.push(Box::new(
                Paragraph::new(inline_spans(inlines, theme, options), options.body_leading())
                    .space_after(Pt::from_f32(6.0))
                    .record_tail(),
            ));
        }
        Block::CodeBlock { code, .. } => {
            story.push(Box::new(
                CodeBlock::new(
                    code,
                    options.code_font,
                    Color::rgb(0.956, 0.956, 0.956),
                    theme.text,
                )
                .space_after(Pt::from_f32(8.0)),
            ));
        }
        Block::List { ordered, items } => {
            for (index, item) in items.iter().enumerate() {
                let marker = if *ordered {
                    format!("{}.", index + 1)
                } else {
                    "\u{2022}".to_string()
                };
                let mut spans = vec![Span::new(
                    marker,
                    BuiltinFont::select(family, false, false),
                    options.body_font,
                    theme.accent,
                )];
                spans.extend(inline_spans(item, theme, options));
                story.push(Box::new(
                    Paragraph::new(spans, options.body_leading())
                        .space_after(Pt::from_f32(3.0)),
                ));
            }
            story.push(Box::new(Spacer::new(Pt::from_f32(3.0))));
        }
        Block::Quote(inlines) => {
            let text = inlines
                .iter()
                .map(Inline::plain_text)
                .collect::<Vec<_>>()
                .join(" ");
            story.push(Box::new(
                Paragraph::plain(
                    text,
                    BuiltinFont::select(family, false, true),
                    options.body_font,
                    theme.text,
                    options.body_leading(),
                )
                .space_before(Pt::from_f32(4.0))
                .space_after(Pt::from_f32(8.0)),
            ));
        }
        Block::Callout { label, inlines } => {
            let mut spans = vec![Span::new(
                format!("{label}:"),
                BuiltinFont::select(family, true, false),
                options.body_font,
                theme.accent,
            )];
            spans.extend(inline_spans(inlines, theme, options));
            let inner = Paragraph::new(spans, options.body_leading());
            story.push(Box::new(
                CalloutBox::new(inner, theme.accent, callout_ground(theme))
                    .space_after(Pt::from_f32(8.0)),
            ));
        }
        Block::Rule => {
            story.push(Box::new(
                Rule::new(Pt::from_f32(0.75), Color::rgb(0.8, 0.8, 0.8))
                    .spaced(Pt::from_f32(8.0), Pt::from_f32(8.0)),
            ));
        }
    }
}

fn callout_ground(theme: &Theme) -> Color {
    Color {
        r: 0.92 + theme.accent.r * 0.08,
        g: 0.92 + theme.accent.g * 0.08,
        b: 0.92 + theme.accent.b * 0.08,
    }
}

fn inline_spans(inlines: &[Inline], theme: &Theme, options: &LayoutOptions) -> Vec<Span> {
    let family = body_font(options);
    let size = options.body_font;
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) => Span::new(
                text.clone(),
                BuiltinFont::select(family, false, false),
                size,
                theme.text,
            ),
            Inline::Strong(text) => Span::new(
                text.clone(),
                BuiltinFont::select(family, true, false),
                size,
                theme.text,
            ),
            Inline::Emphasis(text) => Span::new(
                text.clone(),
                BuiltinFont::select(family, false, true),
                size,
                theme.text,
            ),
            Inline::Code(text) => Span::new(
                text.clone(),
                BuiltinFont::Courier,
                options.code_font,
                theme.text,
            ),
            Inline::Link { text, .. } => Span::new(
                text.clone(),
                BuiltinFont::select(family, false, false),
                size,
                theme.accent,
            ),
        })
        .collect()
}

fn push_colophon_story(
    story: &mut Vec<Box<dyn Flowable>>,
    book: &Book,
    options: &LayoutOptions,
) {
    let theme = &book.metadata.theme;
    story.push(Box::new(BreakRule::default()));
    let line = format!("{} \u{2014} {}", book.metadata.title, book.metadata.author);
    story.push(Box::new(
        Paragraph::plain(
            line,
            BuiltinFont::select(body_font(options), false, true),
            Pt::from_f32(9.0),
            theme.text,
            Pt::from_f32(13.0),
        )
        .align(TextAlign::Center)
        .space_after(Pt::from_f32(4.0)),
    ));
    story.push(Box::new(
        Paragraph::plain(
            "Set in 6\u{00d7}9 and produced by galleypress.",
            BuiltinFont::select(body_font(options), false, false),
            Pt::from_f32(8.0),
            Color::rgb(0.4, 0.4, 0.4),
            Pt::from_f32(12.0),
        )
        .align(TextAlign::Center),
    ));
}

/// Thin rule that always opens a fresh page; the colophon divider.
#[derive(Debug, Clone, Default)]
struct BreakRule;

impl Flowable for BreakRule {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> crate::types::Size {
        crate::types::Size {
            width: avail_width,
            height: Pt::from_f32(10.75),
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(
        &self,
        canvas: &mut crate::canvas::Canvas,
        x: Pt,
        y: Pt,
        avail_width: Pt,
        _avail_height: Pt,
    ) {
        canvas.set_fill_color(Color::rgb(0.8, 0.8, 0.8));
        canvas.fill_rect(x, y, avail_width, Pt::from_f32(0.75));
    }

    fn pagination(&self) -> Pagination {
        Pagination {
            break_before: BreakBefore::Page,
            ..Pagination::default()
        }
    }

    fn debug_name(&self) -> &'static str {
        "BreakRule"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ImageAsset, ImageKind};
    use crate::book::BookMetadata;
    use crate::canvas::Command;
    use crate::doc_template::DocTemplate;

    fn sample_book(chapters: Vec<(&str, &str)>) -> Book {
        Book {
            metadata: BookMetadata {
                title: "Proof of Margins".to_string(),
                subtitle: Some("Notes on Trim".to_string()),
                author: "R. Example".to_string(),
                language: "en".to_string(),
                theme: Theme::default(),
            },
            chapters: chapters
                .into_iter()
                .enumerate()
                .map(|(idx, (title, body))| Chapter {
                    number: idx + 1,
                    title: title.to_string(),
                    slug: format!("chapter-{:02}", idx + 1),
                    image: None,
                    body: body.to_string(),
                })
                .collect(),
        }
    }

    fn build(book: &Book, assets: &AssetLibrary) -> crate::canvas::Document {
        let options = LayoutOptions::default();
        let composition = compose(book, assets, &options);
        let mut doc = DocTemplate::new(composition.templates);
        for flowable in composition.story {
            doc.add_flowable(flowable);
        }
        doc.build().expect("layout")
    }

    #[test]
    fn minimal_book_spans_cover_toc_chapter_colophon() {
        let book = sample_book(vec![("T", "# T\n\nWord.")]);
        let document = build(&book, &AssetLibrary::default());
        assert!(document.pages.len() >= 4, "got {}", document.pages.len());
    }

    #[test]
    fn cover_page_is_marked_full_bleed_with_gradient_fallback() {
        let book = sample_book(vec![("T", "Word.")]);
        let document = build(&book, &AssetLibrary::default());
        let first = &document.pages[0];
        assert!(first.commands.iter().any(|cmd| matches!(
            cmd,
            Command::Meta { key, .. } if key == META_FULL_BLEED
        )));
        assert!(first
            .commands
            .iter()
            .any(|cmd| matches!(cmd, Command::ShadeRect { .. })));
    }

    #[test]
    fn raster_cover_draws_image_over_full_page() {
        let mut assets = AssetLibrary::default();
        assets.insert(
            ImageAsset::from_bytes(
                "cover",
                ImageKind::Png,
                crate::assets::tests::png_bytes(6, 9),
            )
            .expect("decode"),
        );
        let book = sample_book(vec![("T", "Word.")]);
        let document = build(&book, &assets);
        let first = &document.pages[0];
        let full_page_image = first.commands.iter().any(|cmd| match cmd {
            Command::DrawImage { width, height, .. } => {
                width.to_milli_i64() == 432_000 && height.to_milli_i64() == 648_000
            }
            _ => false,
        });
        assert!(full_page_image);
    }

    #[test]
    fn body_pages_carry_folios() {
        let book = sample_book(vec![("T", "Word.")]);
        let document = build(&book, &AssetLibrary::default());
        let second = &document.pages[1];
        let has_folio = second.commands.iter().any(|cmd| match cmd {
            Command::DrawString { text, .. } => text == "2",
            _ => false,
        });
        assert!(has_folio, "page 2 folio missing");
    }

    #[test]
    fn svg_chapter_art_degrades_to_placeholder() {
        let mut assets = AssetLibrary::default();
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 100 50\"></svg>";
        assets.insert(
            ImageAsset::from_bytes("chapter-01-diagram", ImageKind::Svg, svg.to_vec())
                .expect("probe"),
        );
        let book = sample_book(vec![("T", "Word.")]);
        let document = build(&book, &assets);
        let placeholder_label = document.pages.iter().flat_map(|p| &p.commands).any(|cmd| {
            matches!(cmd, Command::DrawString { text, .. } if text == "chapter-01-diagram")
        });
        assert!(placeholder_label);
    }

    #[test]
    fn each_chapter_opens_its_own_page() {
        let book = sample_book(vec![("One", "Alpha."), ("Two", "Beta."), ("Three", "Gamma.")]);
        let document = build(&book, &AssetLibrary::default());
        // cover + toc + three chapter pages + colophon
        assert!(document.pages.len() >= 6);
    }
}
