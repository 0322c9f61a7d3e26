use crate::assets::AssetLibrary;
use crate::book::{Book, BookMetadata, Chapter, Theme};
use crate::config::LayoutOptions;
use crate::markdown::{Block, Inline, parse_markdown};

/// Renders the whole book as one flat HTML document: cover, table of
/// contents, chapters, colophon. Page segmentation is left to CSS
/// page-break rules so the artifact prints sensibly from a browser; the
/// press's own pagination never consumes this file. Output is
/// deterministic: identical inputs yield byte-identical HTML.
pub fn render_html(book: &Book, assets: &AssetLibrary, options: &LayoutOptions) -> String {
    let mut out = String::with_capacity(16 * 1024);
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n",
        escape_html(&book.metadata.language),
        escape_html(&book.metadata.title)
    ));
    out.push_str("<style>\n");
    out.push_str(&stylesheet(options, &book.metadata.theme));
    out.push_str("</style>\n</head>\n<body>\n");
    out.push_str(&cover_section(&book.metadata, assets));
    out.push_str(&toc_section(&book.chapters));
    for chapter in &book.chapters {
        out.push_str(&chapter_section(chapter, assets));
    }
    out.push_str(&colophon_section(&book.metadata));
    out.push_str("</body>\n</html>\n");
    out
}

/// One stylesheet derived entirely from the layout options and theme; no
/// magic numbers live in the section templates below.
fn stylesheet(options: &LayoutOptions, theme: &Theme) -> String {
    let page_w = options.page_size.width.to_inches();
    let page_h = options.page_size.height.to_inches();
    let margin = options.margins.top.to_inches();
    let body_pt = options.body_font.to_f32();
    let code_pt = options.code_font.to_f32();
    let body_family = if options.serif_body {
        "Georgia, 'Times New Roman', serif"
    } else {
        "'Helvetica Neue', Arial, sans-serif"
    };
    format!(
        "@page {{ size: {page_w}in {page_h}in; margin: 0; }}\n\
         * {{ box-sizing: border-box; }}\n\
         body {{ margin: 0; color: {text}; background: {background}; \
         font-family: {body_family}; font-size: {body_pt}pt; line-height: {line_height}; }}\n\
         .page {{ width: {page_w}in; min-height: {page_h}in; padding: {margin}in; }}\n\
         .cover {{ width: {page_w}in; height: {page_h}in; padding: 0; position: relative; \
         page-break-after: always; overflow: hidden; }}\n\
         .cover-image {{ width: 100%; height: 100%; object-fit: cover; display: block; }}\n\
         .cover-placeholder {{ width: 100%; height: 100%; \
         background: linear-gradient(135deg, {grad_from}, {grad_to}); }}\n\
         .cover-overlay {{ position: absolute; left: 0; right: 0; bottom: 1in; \
         text-align: center; color: #ffffff; \
         font-family: 'Helvetica Neue', Arial, sans-serif; }}\n\
         .cover-overlay h1 {{ font-size: 28pt; margin: 0 0.5in 0.1in; }}\n\
         .cover-overlay .subtitle {{ font-size: 14pt; margin: 0 0.5in 0.3in; }}\n\
         .cover-overlay .author {{ font-size: 12pt; }}\n\
         .toc {{ page-break-after: always; }}\n\
         .toc h2, .chapter h2 {{ font-family: 'Helvetica Neue', Arial, sans-serif; \
         color: {accent}; }}\n\
         .toc ol {{ list-style: none; padding: 0; }}\n\
         .toc li {{ margin: 0.35em 0; }}\n\
         .toc .num {{ color: {accent}; margin-right: 0.6em; }}\n\
         .chapter {{ page-break-before: always; }}\n\
         .chapter h2 {{ font-size: 18pt; }}\n\
         .chapter img {{ max-width: 100%; }}\n\
         h3, h4 {{ page-break-after: avoid; }}\n\
         p {{ orphans: 2; widows: 2; }}\n\
         .callout {{ border-left: 3pt solid {accent}; background: {callout_bg}; \
         padding: 8pt; page-break-inside: avoid; }}\n\
         .callout .label {{ font-weight: bold; color: {accent}; }}\n\
         pre {{ background: #f4f4f4; padding: 6pt; font-size: {code_pt}pt; \
         white-space: pre-wrap; }}\n\
         code {{ font-family: 'Courier New', monospace; }}\n\
         blockquote {{ margin: 0 1em; font-style: italic; }}\n\
         hr {{ border: 0; border-top: 1pt solid #cccccc; }}\n\
         .colophon {{ page-break-before: always; text-align: center; \
         font-size: 9pt; color: #666666; }}\n",
        text = theme.text.to_hex(),
        background = theme.background.to_hex(),
        accent = theme.accent.to_hex(),
        grad_from = theme.cover_gradient.0.to_hex(),
        grad_to = theme.cover_gradient.1.to_hex(),
        callout_bg = tint(theme.accent),
        line_height = options.line_height,
    )
}

// A light wash of the accent for callout grounds.
fn tint(accent: crate::types::Color) -> String {
    crate::types::Color {
        r: 0.92 + accent.r * 0.08,
        g: 0.92 + accent.g * 0.08,
        b: 0.92 + accent.b * 0.08,
    }
    .to_hex()
}

fn cover_section(metadata: &BookMetadata, assets: &AssetLibrary) -> String {
    let backdrop = match assets.cover() {
        Some(asset) => format!(
            "<img class=\"cover-image\" alt=\"cover\" src=\"{}\">",
            asset.data_uri()
        ),
        None => "<div class=\"cover-placeholder\"></div>".to_string(),
    };
    let subtitle = metadata
        .subtitle
        .as_deref()
        .map(|s| format!("<p class=\"subtitle\">{}</p>", escape_html(s)))
        .unwrap_or_default();
    format!(
        "<section class=\"cover\">{backdrop}<div class=\"cover-overlay\">\
         <h1>{title}</h1>{subtitle}<p class=\"author\">{author}</p></div></section>\n",
        title = escape_html(&metadata.title),
        author = escape_html(&metadata.author),
    )
}

fn toc_section(chapters: &[Chapter]) -> String {
    let mut out = String::from("<section class=\"toc page\"><h2>Contents</h2>\n<ol>\n");
    for chapter in chapters {
        out.push_str(&format!(
            "<li><span class=\"num\">{}</span>{}</li>\n",
            chapter.number,
            escape_html(&chapter.title)
        ));
    }
    out.push_str("</ol>\n</section>\n");
    out
}

fn chapter_section(chapter: &Chapter, assets: &AssetLibrary) -> String {
    let mut out = format!(
        "<section class=\"chapter page\" id=\"{}\">\n<h2>{}. {}</h2>\n",
        escape_html(&chapter.slug),
        chapter.number,
        escape_html(&chapter.title)
    );
    if let Some(asset) = assets.for_chapter(chapter.number, chapter.image.as_deref()) {
        out.push_str(&format!(
            "<img alt=\"{}\" src=\"{}\">\n",
            escape_html(&asset.name),
            asset.data_uri()
        ));
    }
    for block in parse_markdown(&chapter.body) {
        out.push_str(&block_html(&block));
    }
    out.push_str("</section>\n");
    out
}

fn colophon_section(metadata: &BookMetadata) -> String {
    format!(
        "<section class=\"colophon page\"><hr><p>{} &mdash; {}</p>\
         <p>Set in 6&times;9 and produced by galleypress.</p></section>\n",
        escape_html(&metadata.title),
        escape_html(&metadata.author)
    )
}

fn block_html(block: &Block) -> String {
    match block {
        Block::Heading { level, inlines } => {
            // Chapter titles own h2; in-body headings start at h3.
            let tag_level = (*level as usize + 2).min(6);
            format!(
                "<h{tag_level}>{}</h{tag_level}>\n",
                inlines_html(inlines)
            )
        }
        Block::Paragraph(inlines) => format!("<p>{}</p>\n", inlines_html(inlines)),
        Block::CodeBlock { language, code } => {
            let class = language
                .as_deref()
                .map(|lang| format!(" class=\"language-{}\"", escape_html(lang)))
                .unwrap_or_default();
            format!("<pre><code{class}>{}</code></pre>\n", escape_html(code))
        }
        Block::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            let mut out = format!("<{tag}>\n");
            for item in items {
                out.push_str(&format!("<li>{}</li>\n", inlines_html(item)));
            }
            out.push_str(&format!("</{tag}>\n"));
            out
        }
        Block::Quote(inlines) => {
            format!("<blockquote><p>{}</p></blockquote>\n", inlines_html(inlines))
        }
        Block::Callout { label, inlines } => format!(
            "<div class=\"callout\"><span class=\"label\">{}:</span> {}</div>\n",
            escape_html(label),
            inlines_html(inlines)
        ),
        Block::Rule => "<hr>\n".to_string(),
    }
}

fn inlines_html(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(text) => out.push_str(&escape_html(text)),
            Inline::Strong(text) => {
                out.push_str(&format!("<strong>{}</strong>", escape_html(text)))
            }
            Inline::Emphasis(text) => out.push_str(&format!("<em>{}</em>", escape_html(text))),
            Inline::Code(text) => out.push_str(&format!("<code>{}</code>", escape_html(text))),
            Inline::Link { text, href } => out.push_str(&format!(
                "<a href=\"{}\">{}</a>",
                escape_html(href),
                escape_html(text)
            )),
        }
    }
    out
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{BookMetadata, Chapter};

    fn book(chapters: Vec<Chapter>) -> Book {
        Book {
            metadata: BookMetadata {
                title: "Test <Book>".to_string(),
                subtitle: Some("On QA & Layout".to_string()),
                author: "A".to_string(),
                language: "en".to_string(),
                theme: Theme::default(),
            },
            chapters,
        }
    }

    fn chapter(number: usize, body: &str) -> Chapter {
        Chapter {
            number,
            title: format!("Chapter {number}"),
            slug: format!("chapter-{number:02}"),
            image: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn rendering_twice_is_byte_identical() {
        let book = book(vec![chapter(1, "# T\n\nWord.")]);
        let assets = AssetLibrary::default();
        let options = LayoutOptions::default();
        assert_eq!(
            render_html(&book, &assets, &options),
            render_html(&book, &assets, &options)
        );
    }

    #[test]
    fn one_cover_and_one_block_per_chapter() {
        let book = book(vec![chapter(1, "Body one."), chapter(2, "Body two.")]);
        let html = render_html(&book, &AssetLibrary::default(), &LayoutOptions::default());
        assert_eq!(html.matches("class=\"cover\"").count(), 1);
        assert_eq!(html.matches("class=\"chapter page\"").count(), 2);
        assert_eq!(html.matches("class=\"toc page\"").count(), 1);
    }

    #[test]
    fn missing_cover_falls_back_to_gradient_placeholder() {
        let book = book(vec![chapter(1, "Word.")]);
        let html = render_html(&book, &AssetLibrary::default(), &LayoutOptions::default());
        assert!(html.contains("cover-placeholder"));
        assert!(!html.contains("data:image/"));
    }

    #[test]
    fn present_cover_is_embedded_as_data_uri() {
        let mut assets = AssetLibrary::default();
        assets.insert(
            crate::assets::ImageAsset::from_bytes(
                "cover",
                crate::assets::ImageKind::Png,
                crate::assets::tests::png_bytes(4, 6),
            )
            .expect("decode"),
        );
        let book = book(vec![chapter(1, "Word.")]);
        let html = render_html(&book, &assets, &LayoutOptions::default());
        assert!(html.contains("data:image/png;base64,"));
        assert!(!html.contains("cover-placeholder"));
    }

    #[test]
    fn user_text_is_escaped() {
        let book = book(vec![chapter(1, "A <script> & more.")]);
        let html = render_html(&book, &AssetLibrary::default(), &LayoutOptions::default());
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Test &lt;Book&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn callouts_and_code_get_their_wrappers() {
        let body = "> **Note:** check margins\n\n```rust\nlet x = 1;\n```";
        let book = book(vec![chapter(1, body)]);
        let html = render_html(&book, &AssetLibrary::default(), &LayoutOptions::default());
        assert!(html.contains("<div class=\"callout\">"));
        assert!(html.contains("<pre><code class=\"language-rust\">"));
    }

    #[test]
    fn stylesheet_tracks_layout_options() {
        let mut options = LayoutOptions::default();
        let book = book(vec![chapter(1, "Word.")]);
        let before = render_html(&book, &AssetLibrary::default(), &options);
        options.body_font = crate::types::Pt::from_f32(9.5);
        let after = render_html(&book, &AssetLibrary::default(), &options);
        assert!(before.contains("font-size: 11pt"));
        assert!(after.contains("font-size: 9.5pt"));
    }
}
