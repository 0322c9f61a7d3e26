use crate::types::{Pt, Size};
use base64::Engine;
use image::GenericImageView;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// Browser convention for raster images authored at screen resolution.
const PX_PER_INCH: f32 = 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Svg,
}

impl ImageKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "svg" => Some(ImageKind::Svg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Svg => "image/svg+xml",
        }
    }
}

/// A named image blob with probed pixel (or viewBox) dimensions.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub name: String,
    pub kind: ImageKind,
    pub data: Vec<u8>,
    pub width_px: f32,
    pub height_px: f32,
}

impl ImageAsset {
    pub fn from_bytes(name: impl Into<String>, kind: ImageKind, data: Vec<u8>) -> Option<Self> {
        let (width_px, height_px) = match kind {
            ImageKind::Png | ImageKind::Jpeg => {
                let decoded = image::load_from_memory(&data).ok()?;
                let (w, h) = decoded.dimensions();
                (w as f32, h as f32)
            }
            ImageKind::Svg => probe_svg_dimensions(&data)?,
        };
        if width_px <= 0.0 || height_px <= 0.0 {
            return None;
        }
        Some(Self {
            name: name.into(),
            kind,
            data,
            width_px,
            height_px,
        })
    }

    pub fn data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime(), encoded)
    }

    pub fn mime(&self) -> &'static str {
        self.kind.mime()
    }

    /// Natural size on the page at 96 px/in.
    pub fn point_size(&self) -> Size {
        Size {
            width: Pt::from_f32(self.width_px * 72.0 / PX_PER_INCH),
            height: Pt::from_f32(self.height_px * 72.0 / PX_PER_INCH),
        }
    }
}

/// Width/height attributes win; a viewBox is the fallback. Units beyond
/// px/pt are not handled, matching what the book projects actually ship.
fn probe_svg_dimensions(data: &[u8]) -> Option<(f32, f32)> {
    let text = std::str::from_utf8(data).ok()?;
    let doc = roxmltree::Document::parse(text).ok()?;
    let root = doc.root_element();
    // Compare the local name; real covers carry the svg namespace.
    if root.tag_name().name() != "svg" {
        return None;
    }
    let parse_len = |raw: &str| -> Option<f32> {
        let trimmed = raw
            .trim()
            .trim_end_matches("px")
            .trim_end_matches("pt")
            .trim();
        trimmed.parse::<f32>().ok().filter(|v| *v > 0.0)
    };
    let width = root.attribute("width").and_then(|w| parse_len(w));
    let height = root.attribute("height").and_then(|h| parse_len(h));
    if let (Some(w), Some(h)) = (width, height) {
        return Some((w, h));
    }
    let viewbox = root.attribute("viewBox")?;
    let parts: Vec<f32> = viewbox
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect();
    if parts.len() == 4 && parts[2] > 0.0 && parts[3] > 0.0 {
        Some((parts[2], parts[3]))
    } else {
        None
    }
}

/// Every image the project ships, keyed by logical name (the file stem).
/// Unreadable or undecodable files are skipped and remembered so the
/// caller can log them; they are never fatal.
#[derive(Debug, Clone, Default)]
pub struct AssetLibrary {
    assets: BTreeMap<String, ImageAsset>,
    skipped: Vec<String>,
}

impl AssetLibrary {
    pub fn load(dir: &Path) -> Self {
        let mut library = AssetLibrary::default();
        let Ok(entries) = fs::read_dir(dir) else {
            return library;
        };
        let mut paths: Vec<std::path::PathBuf> =
            entries.flatten().map(|entry| entry.path()).collect();
        paths.sort();
        for path in paths {
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
                continue;
            };
            let Some(kind) = ImageKind::from_extension(ext) else {
                continue;
            };
            let Some(stem) = path.file_stem().and_then(|v| v.to_str()) else {
                continue;
            };
            let Ok(data) = fs::read(&path) else {
                library.skipped.push(stem.to_string());
                continue;
            };
            match ImageAsset::from_bytes(stem, kind, data) {
                Some(asset) => {
                    library.assets.insert(stem.to_string(), asset);
                }
                None => library.skipped.push(stem.to_string()),
            }
        }
        library
    }

    pub fn insert(&mut self, asset: ImageAsset) {
        self.assets.insert(asset.name.clone(), asset);
    }

    pub fn get(&self, name: &str) -> Option<&ImageAsset> {
        self.assets.get(name)
    }

    pub fn cover(&self) -> Option<&ImageAsset> {
        self.get("cover")
    }

    /// Exact frontmatter name first, then the `chapter-NN*` convention.
    pub fn for_chapter(&self, number: usize, named: Option<&str>) -> Option<&ImageAsset> {
        if let Some(name) = named {
            if let Some(asset) = self.get(name) {
                return Some(asset);
            }
        }
        let prefix = format!("chapter-{number:02}");
        self.assets
            .iter()
            .find(|(name, _)| name.starts_with(&prefix))
            .map(|(_, asset)| asset)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageAsset> {
        self.assets.values()
    }
}
