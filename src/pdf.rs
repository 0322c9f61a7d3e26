use crate::assets::{AssetLibrary, ImageKind};
use crate::canvas::{Command, Document, Page};
use crate::error::PressError;
use crate::font::BuiltinFont;
use crate::types::{Pt, Shading};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::GenericImageView;
use std::collections::BTreeMap;
use std::io::Write;

/// Document information dictionary fields. CreationDate is deliberately
/// absent so identical inputs produce byte-identical files.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub producer: String,
    pub language: String,
}

impl PdfMetadata {
    pub fn for_book(title: impl Into<String>, author: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            producer: format!("galleypress {}", env!("CARGO_PKG_VERSION")),
            language: language.into(),
        }
    }
}

/// Serializes a laid-out document as PDF 1.7. Writer policy, carried over
/// from the viewer-compat patches in the source system: classic xref
/// table, no object streams, an explicit MediaBox on every page. Content
/// streams and PNG image data are Flate-compressed; JPEG data passes
/// through as DCTDecode.
pub fn write_pdf(
    document: &Document,
    assets: &AssetLibrary,
    metadata: &PdfMetadata,
) -> Result<Vec<u8>, PressError> {
    let plan = ResourcePlan::collect(document, assets)?;

    let font_count = plan.fonts.len();
    let image_count = plan.images.len();
    let shading_count = plan.shadings.len();
    let page_count = document.pages.len();

    // Object ids: catalog, pages, resources, fonts, images, shading
    // functions + shadings, then per page a content stream and a page
    // object, and the info dictionary last.
    let catalog_id = 1usize;
    let pages_id = 2usize;
    let resources_id = 3usize;
    let first_font_id = 4usize;
    let first_image_id = first_font_id + font_count;
    let first_shading_id = first_image_id + image_count;
    let first_content_id = first_shading_id + shading_count * 2;
    let info_id = first_content_id + page_count * 2;
    let total_objects = info_id;

    let mut objects: Vec<Vec<u8>> = vec![Vec::new(); total_objects];

    let page_ids: Vec<usize> = (0..page_count)
        .map(|idx| first_content_id + idx * 2 + 1)
        .collect();

    objects[catalog_id - 1] = format!(
        "<< /Type /Catalog /Pages {pages_id} 0 R /Lang ({}) >>",
        escape_pdf_string(&metadata.language)
    )
    .into_bytes();

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects[pages_id - 1] =
        format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>").into_bytes();

    objects[resources_id - 1] = plan.resources_dictionary(first_font_id, first_image_id, first_shading_id);

    for (index, font) in plan.fonts.iter().enumerate() {
        objects[first_font_id + index - 1] = format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
            font.base_font_name()
        )
        .into_bytes();
    }

    for (index, image) in plan.images.iter().enumerate() {
        objects[first_image_id + index - 1] = image.to_object();
    }

    for (index, shading) in plan.shadings.iter().enumerate() {
        let function_id = first_shading_id + index * 2;
        let shading_id = function_id + 1;
        let (function_obj, shading_obj) = shading_objects(shading, function_id);
        objects[function_id - 1] = function_obj;
        objects[shading_id - 1] = shading_obj;
    }

    let page_height = document.page_size.height;
    let media_box = format!(
        "[0 0 {} {}]",
        fmt_pt(document.page_size.width),
        fmt_pt(document.page_size.height)
    );
    for (index, page) in document.pages.iter().enumerate() {
        let content_id = first_content_id + index * 2;
        let page_id = content_id + 1;
        let stream = render_content_stream(page, page_height, &plan)?;
        let compressed = deflate(&stream)?;
        let mut object = format!(
            "<< /Length {} /Filter /FlateDecode >>\nstream\n",
            compressed.len()
        )
        .into_bytes();
        object.extend_from_slice(&compressed);
        object.extend_from_slice(b"\nendstream");
        objects[content_id - 1] = object;
        objects[page_id - 1] = format!(
            "<< /Type /Page /Parent {pages_id} 0 R /MediaBox {media_box} \
             /Resources {resources_id} 0 R /Contents {content_id} 0 R >>"
        )
        .into_bytes();
    }

    objects[info_id - 1] = format!(
        "<< /Title ({}) /Author ({}) /Producer ({}) >>",
        escape_pdf_string(&metadata.title),
        escape_pdf_string(&metadata.author),
        escape_pdf_string(&metadata.producer)
    )
    .into_bytes();

    // Assemble: header, numbered objects, classic xref table, trailer.
    let mut out: Vec<u8> = Vec::with_capacity(64 * 1024);
    out.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");
    let mut offsets = Vec::with_capacity(total_objects);
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root {catalog_id} 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            total_objects + 1
        )
        .as_bytes(),
    );
    Ok(out)
}

/// Everything the resource dictionary needs, gathered in one pass over the
/// document: which fonts are set, which images are drawn, which shadings
/// are painted.
struct ResourcePlan {
    fonts: Vec<BuiltinFont>,
    images: Vec<EmbeddedImage>,
    shadings: Vec<Shading>,
    image_names: BTreeMap<String, usize>,
}

impl ResourcePlan {
    fn collect(document: &Document, assets: &AssetLibrary) -> Result<Self, PressError> {
        let mut fonts: Vec<BuiltinFont> = Vec::new();
        let mut shadings: Vec<Shading> = Vec::new();
        let mut images: Vec<EmbeddedImage> = Vec::new();
        let mut image_names: BTreeMap<String, usize> = BTreeMap::new();
        // Text can be drawn before any SetFont under the canvas defaults.
        fonts.push(BuiltinFont::Helvetica);
        for page in &document.pages {
            for command in &page.commands {
                match command {
                    Command::SetFont { font, .. } => {
                        if !fonts.contains(font) {
                            fonts.push(*font);
                        }
                    }
                    Command::ShadeRect { shading, .. } => {
                        if !shadings.contains(shading) {
                            shadings.push(shading.clone());
                        }
                    }
                    Command::DrawImage { resource_id, .. } => {
                        if image_names.contains_key(resource_id) {
                            continue;
                        }
                        let Some(asset) = assets.get(resource_id) else {
                            return Err(PressError::Asset(format!(
                                "image resource {resource_id} not in library"
                            )));
                        };
                        let embedded = EmbeddedImage::from_asset(asset)?;
                        image_names.insert(resource_id.clone(), images.len());
                        images.push(embedded);
                    }
                    _ => {}
                }
            }
        }
        Ok(Self {
            fonts,
            images,
            shadings,
            image_names,
        })
    }

    fn font_resource(&self, font: BuiltinFont) -> String {
        let index = self
            .fonts
            .iter()
            .position(|f| *f == font)
            .unwrap_or(0);
        format!("F{}", index + 1)
    }

    fn image_resource(&self, resource_id: &str) -> Option<String> {
        self.image_names
            .get(resource_id)
            .map(|index| format!("Im{}", index + 1))
    }

    fn shading_resource(&self, shading: &Shading) -> Option<String> {
        self.shadings
            .iter()
            .position(|s| s == shading)
            .map(|index| format!("Sh{}", index + 1))
    }

    fn resources_dictionary(
        &self,
        first_font_id: usize,
        first_image_id: usize,
        first_shading_id: usize,
    ) -> Vec<u8> {
        let mut out = String::from("<< ");
        out.push_str("/Font << ");
        for (index, _) in self.fonts.iter().enumerate() {
            out.push_str(&format!("/F{} {} 0 R ", index + 1, first_font_id + index));
        }
        out.push_str(">> ");
        if !self.images.is_empty() {
            out.push_str("/XObject << ");
            for (index, _) in self.images.iter().enumerate() {
                out.push_str(&format!("/Im{} {} 0 R ", index + 1, first_image_id + index));
            }
            out.push_str(">> ");
        }
        if !self.shadings.is_empty() {
            out.push_str("/Shading << ");
            for (index, _) in self.shadings.iter().enumerate() {
                out.push_str(&format!(
                    "/Sh{} {} 0 R ",
                    index + 1,
                    first_shading_id + index * 2 + 1
                ));
            }
            out.push_str(">> ");
        }
        out.push_str(">>");
        out.into_bytes()
    }
}

struct EmbeddedImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
}

impl EmbeddedImage {
    fn from_asset(asset: &crate::assets::ImageAsset) -> Result<Self, PressError> {
        match asset.kind {
            ImageKind::Jpeg => {
                let decoded = image::load_from_memory(&asset.data)
                    .map_err(|err| PressError::Asset(err.to_string()))?;
                let (width, height) = decoded.dimensions();
                let color_space = match decoded.color().channel_count() {
                    1 => "/DeviceGray",
                    _ => "/DeviceRGB",
                };
                Ok(Self {
                    width,
                    height,
                    color_space,
                    filter: "/DCTDecode",
                    data: asset.data.clone(),
                })
            }
            ImageKind::Png => {
                let decoded = image::load_from_memory(&asset.data)
                    .map_err(|err| PressError::Asset(err.to_string()))?;
                let rgb = decoded.to_rgb8();
                let (width, height) = rgb.dimensions();
                let data = deflate(rgb.as_raw())?;
                Ok(Self {
                    width,
                    height,
                    color_space: "/DeviceRGB",
                    filter: "/FlateDecode",
                    data,
                })
            }
            ImageKind::Svg => Err(PressError::Asset(format!(
                "svg asset {} cannot be embedded in pdf",
                asset.name
            ))),
        }
    }

    fn to_object(&self) -> Vec<u8> {
        let mut out = format!(
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace {} /BitsPerComponent 8 /Filter {} /Length {} >>\nstream\n",
            self.width,
            self.height,
            self.color_space,
            self.filter,
            self.data.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.data);
        out.extend_from_slice(b"\nendstream");
        out
    }
}

fn shading_objects(shading: &Shading, function_id: usize) -> (Vec<u8>, Vec<u8>) {
    // Two-stop axial gradients cover the press's needs; extra stops fall
    // back to the endpoints.
    let first = shading.stops.first();
    let last = shading.stops.last();
    let (c0, c1) = match (first, last) {
        (Some(a), Some(b)) => (a.color, b.color),
        _ => (crate::types::Color::WHITE, crate::types::Color::WHITE),
    };
    let function = format!(
        "<< /FunctionType 2 /Domain [0 1] /C0 [{} {} {}] /C1 [{} {} {}] /N 1 >>",
        fmt_f32(c0.r),
        fmt_f32(c0.g),
        fmt_f32(c0.b),
        fmt_f32(c1.r),
        fmt_f32(c1.g),
        fmt_f32(c1.b)
    )
    .into_bytes();
    let dict = format!(
        "<< /ShadingType 2 /ColorSpace /DeviceRGB /Coords [{} {} {} {}] \
         /Function {function_id} 0 R /Extend [true true] >>",
        fmt_f32(shading.x0),
        fmt_f32(shading.y0),
        fmt_f32(shading.x1),
        fmt_f32(shading.y1)
    )
    .into_bytes();
    (function, dict)
}

struct TextState {
    font: BuiltinFont,
    size: Pt,
}

fn render_content_stream(
    page: &Page,
    page_height: Pt,
    plan: &ResourcePlan,
) -> Result<Vec<u8>, PressError> {
    let mut out = String::with_capacity(4 * 1024);
    let mut state = TextState {
        font: BuiltinFont::Helvetica,
        size: Pt::from_f32(12.0),
    };
    let flip = |y: Pt| page_height - y;
    for command in &page.commands {
        match command {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::SetFillColor(color) => out.push_str(&format!(
                "{} {} {} rg\n",
                fmt_f32(color.r),
                fmt_f32(color.g),
                fmt_f32(color.b)
            )),
            Command::SetStrokeColor(color) => out.push_str(&format!(
                "{} {} {} RG\n",
                fmt_f32(color.r),
                fmt_f32(color.g),
                fmt_f32(color.b)
            )),
            Command::SetLineWidth(width) => out.push_str(&format!("{} w\n", fmt_pt(*width))),
            Command::SetFont { font, size } => {
                state = TextState {
                    font: *font,
                    size: *size,
                };
            }
            Command::FillRect {
                x,
                y,
                width,
                height,
            } => out.push_str(&format!(
                "{} {} {} {} re f\n",
                fmt_pt(*x),
                fmt_pt(flip(*y) - *height),
                fmt_pt(*width),
                fmt_pt(*height)
            )),
            Command::StrokeRect {
                x,
                y,
                width,
                height,
            } => out.push_str(&format!(
                "{} {} {} {} re S\n",
                fmt_pt(*x),
                fmt_pt(flip(*y) - *height),
                fmt_pt(*width),
                fmt_pt(*height)
            )),
            Command::ShadeRect {
                x,
                y,
                width,
                height,
                shading,
            } => {
                let Some(resource) = plan.shading_resource(shading) else {
                    continue;
                };
                let bottom = flip(*y) - *height;
                out.push_str(&format!(
                    "q\n{} {} {} {} re W n\n{} 0 0 {} {} {} cm\n/{resource} sh\nQ\n",
                    fmt_pt(*x),
                    fmt_pt(bottom),
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(bottom)
                ));
            }
            Command::DrawString { x, y, text } => {
                let resource = plan.font_resource(state.font);
                out.push_str(&format!(
                    "BT\n/{resource} {} Tf\n{} {} Td\n({}) Tj\nET\n",
                    fmt_pt(state.size),
                    fmt_pt(*x),
                    fmt_pt(flip(*y)),
                    encode_winansi(text)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let Some(resource) = plan.image_resource(resource_id) else {
                    continue;
                };
                out.push_str(&format!(
                    "q\n{} 0 0 {} {} {} cm\n/{resource} Do\nQ\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(flip(*y) - *height)
                ));
            }
            Command::Meta { .. } => {}
        }
    }
    Ok(out.into_bytes())
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PressError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn fmt_pt(value: Pt) -> String {
    fmt_f32(value.to_f32())
}

/// Shortest stable decimal: integers print bare, everything else keeps
/// three places with trailing zeros trimmed.
fn fmt_f32(value: f32) -> String {
    if value == value.trunc() && value.abs() < 1.0e7 {
        format!("{}", value as i64)
    } else {
        let mut s = format!("{value:.3}");
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

/// Escapes a metadata string for a PDF literal string.
fn escape_pdf_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in encode_winansi_bytes(raw) {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            0x20..=0x7e => out.push(byte as char),
            other => out.push_str(&format!("\\{other:03o}")),
        }
    }
    out
}

fn encode_winansi(raw: &str) -> String {
    escape_pdf_string(raw)
}

/// Maps text to WinAnsi bytes. ASCII and Latin-1 pass through; the CP1252
/// punctuation block covers the typographic characters the composer emits;
/// anything else degrades to '?'.
fn encode_winansi_bytes(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for ch in raw.chars() {
        let code = ch as u32;
        let byte = match code {
            0x20..=0x7e => code as u8,
            0xa0..=0xff => code as u8,
            0x2022 => 0x95, // bullet
            0x2013 => 0x96, // en dash
            0x2014 => 0x97, // em dash
            0x2018 => 0x91,
            0x2019 => 0x92,
            0x201c => 0x93,
            0x201d => 0x94,
            0x2026 => 0x85, // ellipsis
            0x2122 => 0x99, // trade mark
            0x20ac => 0x80, // euro
            _ => b'?',
        };
        out.push(byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::{Color, Rect, ShadingStop, Size};

    fn metadata() -> PdfMetadata {
        PdfMetadata::for_book("Margins and Meaning", "R. Example", "en")
    }

    fn text_document() -> Document {
        let mut canvas = Canvas::new(Size::trim_6x9());
        canvas.set_font(BuiltinFont::TimesRoman, Pt::from_f32(11.0));
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_string(Pt::from_f32(36.0), Pt::from_f32(48.0), "Hello (world) \\ test");
        canvas.show_page();
        canvas.draw_string(Pt::from_f32(36.0), Pt::from_f32(48.0), "Page two");
        canvas.finish()
    }

    #[test]
    fn written_pdf_parses_with_expected_pages_and_media_box() {
        let bytes =
            write_pdf(&text_document(), &AssetLibrary::default(), &metadata()).expect("write");
        let parsed = lopdf::Document::load_mem(&bytes).expect("lopdf parse");
        let pages = parsed.get_pages();
        assert_eq!(pages.len(), 2);
        let (_, first_page_id) = pages.iter().next().map(|(k, v)| (*k, *v)).expect("page");
        let page = parsed.get_object(first_page_id).and_then(|o| o.as_dict()).expect("dict");
        let media_box = page.get(b"MediaBox").and_then(|o| o.as_array()).expect("media box");
        let values: Vec<f32> = media_box
            .iter()
            .map(|o| match o {
                lopdf::Object::Integer(v) => *v as f32,
                lopdf::Object::Real(v) => *v,
                _ => f32::NAN,
            })
            .collect();
        assert_eq!(values, vec![0.0, 0.0, 432.0, 648.0]);
    }

    #[test]
    fn info_dictionary_carries_title_author_producer() {
        let bytes =
            write_pdf(&text_document(), &AssetLibrary::default(), &metadata()).expect("write");
        let parsed = lopdf::Document::load_mem(&bytes).expect("parse");
        let info_ref = parsed.trailer.get(b"Info").expect("info ref");
        let info = match info_ref {
            lopdf::Object::Reference(id) => {
                parsed.get_object(*id).and_then(|o| o.as_dict()).expect("info dict")
            }
            _ => panic!("info should be a reference"),
        };
        let title = info.get(b"Title").and_then(|o| o.as_str()).expect("title");
        assert_eq!(title, b"Margins and Meaning");
        assert!(info.get(b"Producer").is_ok());
        assert!(info.get(b"Author").is_ok());
    }

    #[test]
    fn writing_twice_is_byte_identical() {
        let doc = text_document();
        let assets = AssetLibrary::default();
        let a = write_pdf(&doc, &assets, &metadata()).expect("first");
        let b = write_pdf(&doc, &assets, &metadata()).expect("second");
        assert_eq!(a, b);
    }

    #[test]
    fn png_images_embed_as_flate_xobjects() {
        let mut assets = AssetLibrary::default();
        assets.insert(
            crate::assets::ImageAsset::from_bytes(
                "cover",
                ImageKind::Png,
                crate::assets::tests::png_bytes(8, 4),
            )
            .expect("decode"),
        );
        let mut canvas = Canvas::new(Size::trim_6x9());
        canvas.draw_image(
            Pt::ZERO,
            Pt::ZERO,
            Pt::from_f32(432.0),
            Pt::from_f32(648.0),
            "cover",
        );
        let doc = canvas.finish();
        let bytes = write_pdf(&doc, &assets, &metadata()).expect("write");
        let parsed = lopdf::Document::load_mem(&bytes).expect("parse");
        assert_eq!(parsed.get_pages().len(), 1);
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("/Subtype /Image"));
        assert!(raw.contains("/Width 8"));
    }

    #[test]
    fn missing_image_resource_is_an_error() {
        let mut canvas = Canvas::new(Size::trim_6x9());
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::from_f32(10.0), Pt::from_f32(10.0), "ghost");
        let doc = canvas.finish();
        match write_pdf(&doc, &AssetLibrary::default(), &metadata()) {
            Err(PressError::Asset(message)) => assert!(message.contains("ghost")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shading_pages_reference_a_shading_resource() {
        let mut canvas = Canvas::new(Size::trim_6x9());
        canvas.shade_rect(
            Rect {
                x: Pt::ZERO,
                y: Pt::ZERO,
                width: Pt::from_f32(432.0),
                height: Pt::from_f32(648.0),
            },
            Shading {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 1.0,
                stops: vec![
                    ShadingStop {
                        offset: 0.0,
                        color: Color::rgb(0.1, 0.2, 0.4),
                    },
                    ShadingStop {
                        offset: 1.0,
                        color: Color::rgb(0.2, 0.4, 0.9),
                    },
                ],
            },
        );
        let doc = canvas.finish();
        let bytes = write_pdf(&doc, &AssetLibrary::default(), &metadata()).expect("write");
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("/ShadingType 2"));
        assert!(raw.contains("/FunctionType 2"));
        lopdf::Document::load_mem(&bytes).expect("parse");
    }

    #[test]
    fn winansi_degrades_unmappable_text() {
        let bytes = encode_winansi_bytes("caf\u{00e9} \u{2014} \u{4e16}\u{754c}");
        assert_eq!(bytes[3], 0xe9);
        assert_eq!(bytes[5], 0x97);
        assert_eq!(&bytes[7..], b"??");
    }

    #[test]
    fn numbers_format_without_noise() {
        assert_eq!(fmt_f32(432.0), "432");
        assert_eq!(fmt_f32(10.5), "10.5");
        assert_eq!(fmt_f32(0.333_333), "0.333");
        assert_eq!(fmt_pt(Pt::from_f32(-3.0)), "-3");
    }
}
