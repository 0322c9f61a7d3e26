use crate::error::PressError;
use crate::types::Color;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Resolved visual theme. Raw hex strings from the YAML fall back to the
/// house palette when absent or unparseable.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub accent: Color,
    pub background: Color,
    pub text: Color,
    pub cover_gradient: (Color, Color),
}

impl Default for Theme {
    fn default() -> Self {
        let accent = Color::from_hex("#2563eb").expect("palette");
        Self {
            accent,
            background: Color::WHITE,
            text: Color::from_hex("#111111").expect("palette"),
            cover_gradient: (Color::from_hex("#1e3a5f").expect("palette"), accent),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ThemeSpec {
    accent: Option<String>,
    background: Option<String>,
    text: Option<String>,
    cover_gradient: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct MetadataSpec {
    title: String,
    subtitle: Option<String>,
    author: String,
    language: Option<String>,
    theme: Option<ThemeSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookMetadata {
    pub title: String,
    pub subtitle: Option<String>,
    pub author: String,
    pub language: String,
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub number: usize,
    pub title: String,
    pub slug: String,
    /// Logical image name from frontmatter, when the chapter names one.
    pub image: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub metadata: BookMetadata,
    pub chapters: Vec<Chapter>,
}

impl Book {
    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }
}

fn resolve_color(raw: Option<&String>, fallback: Color) -> Color {
    raw.and_then(|s| Color::from_hex(s)).unwrap_or(fallback)
}

fn resolve_theme(spec: Option<ThemeSpec>) -> Theme {
    let defaults = Theme::default();
    let Some(spec) = spec else {
        return defaults;
    };
    let accent = resolve_color(spec.accent.as_ref(), defaults.accent);
    let gradient = match spec.cover_gradient.as_deref() {
        Some([from, to]) => (
            Color::from_hex(from).unwrap_or(defaults.cover_gradient.0),
            Color::from_hex(to).unwrap_or(defaults.cover_gradient.1),
        ),
        _ => (defaults.cover_gradient.0, accent),
    };
    Theme {
        accent,
        background: resolve_color(spec.background.as_ref(), defaults.background),
        text: resolve_color(spec.text.as_ref(), defaults.text),
        cover_gradient: gradient,
    }
}

/// Splits a leading `--- ... ---` YAML frontmatter block off a chapter
/// file. Returns the parsed mapping (possibly absent) and the body.
fn split_frontmatter(input: &str) -> Result<(Option<serde_yaml::Mapping>, &str), String> {
    let stripped = input.strip_prefix('\u{feff}').unwrap_or(input);
    let Some(rest) = stripped.strip_prefix("---") else {
        return Ok((None, stripped));
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return Ok((None, stripped));
    };
    let mut end = None;
    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            end = Some(offset);
            offset += line.len();
            break;
        }
        offset += line.len();
    }
    let Some(end) = end else {
        return Err("unterminated frontmatter block".to_string());
    };
    let yaml = &rest[..end];
    let body = &rest[offset..];
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|err| err.to_string())?;
    match value {
        serde_yaml::Value::Mapping(map) => Ok((Some(map), body)),
        serde_yaml::Value::Null => Ok((None, body)),
        _ => Err("frontmatter is not a mapping".to_string()),
    }
}

fn frontmatter_str(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn chapter_number(stem: &str) -> Option<usize> {
    let rest = stem.strip_prefix("chapter-")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Falls back to the first heading, then the file stem, when frontmatter
/// names no title.
fn derive_title(body: &str, stem: &str) -> String {
    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(text) = trimmed.strip_prefix('#') {
            let text = text.trim_start_matches('#').trim();
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }
    stem.to_string()
}

pub fn load_metadata(path: &Path) -> Result<BookMetadata, PressError> {
    if !path.exists() {
        return Err(PressError::MissingMetadata(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    let spec: MetadataSpec = serde_yaml::from_str(&raw)
        .map_err(|err| PressError::MalformedMetadata(err.to_string()))?;
    if spec.title.trim().is_empty() {
        return Err(PressError::MalformedMetadata("empty title".to_string()));
    }
    Ok(BookMetadata {
        title: spec.title,
        subtitle: spec.subtitle,
        author: spec.author,
        language: spec.language.unwrap_or_else(|| "en".to_string()),
        theme: resolve_theme(spec.theme),
    })
}

pub fn load_chapters(dir: &Path) -> Result<Vec<Chapter>, PressError> {
    let mut files: Vec<std::path::PathBuf> = Vec::new();
    let entries = fs::read_dir(dir).map_err(|_| PressError::EmptyBook)?;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("chapter-") && name.ends_with(".md") {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(PressError::EmptyBook);
    }
    // File sort order is reading order.
    files.sort();

    let mut chapters = Vec::with_capacity(files.len());
    for (index, path) in files.iter().enumerate() {
        let raw = fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("chapter")
            .to_string();
        let (frontmatter, body) =
            split_frontmatter(&raw).map_err(|message| PressError::MalformedFrontmatter {
                chapter: stem.clone(),
                message,
            })?;
        let title = frontmatter
            .as_ref()
            .and_then(|map| frontmatter_str(map, "title"))
            .unwrap_or_else(|| derive_title(body, &stem));
        let image = frontmatter
            .as_ref()
            .and_then(|map| frontmatter_str(map, "image"));
        chapters.push(Chapter {
            number: chapter_number(&stem).unwrap_or(index + 1),
            title,
            slug: stem,
            image,
            body: body.to_string(),
        });
    }
    Ok(chapters)
}

/// Loads a whole project directory: `book.yaml` plus `chapters/`.
pub fn load_book(project_dir: &Path) -> Result<Book, PressError> {
    let metadata = load_metadata(&project_dir.join("book.yaml"))?;
    let chapters = load_chapters(&project_dir.join("chapters"))?;
    Ok(Book { metadata, chapters })
}
