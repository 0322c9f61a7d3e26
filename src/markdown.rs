/// Block-level Markdown model covering the subset book chapters actually
/// use: ATX headings, paragraphs, fenced code, flat lists, block quotes
/// (with `> **Note:** ...` callout promotion), and thematic breaks.
/// Parsing is total: any input is some sequence of blocks.

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, inlines: Vec<Inline> },
    Paragraph(Vec<Inline>),
    CodeBlock { language: Option<String>, code: String },
    List { ordered: bool, items: Vec<Vec<Inline>> },
    Quote(Vec<Inline>),
    Callout { label: String, inlines: Vec<Inline> },
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
    Code(String),
    Link { text: String, href: String },
}

impl Inline {
    pub fn plain_text(&self) -> &str {
        match self {
            Inline::Text(s)
            | Inline::Strong(s)
            | Inline::Emphasis(s)
            | Inline::Code(s) => s,
            Inline::Link { text, .. } => text,
        }
    }
}

/// Labels that promote a block quote into a callout box.
const CALLOUT_LABELS: [&str; 5] = ["note", "warning", "tip", "important", "caution"];

pub fn parse_markdown(input: &str) -> Vec<Block> {
    let lines: Vec<&str> = input.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        // Fenced code block.
        if let Some(rest) = trimmed.strip_prefix("```") {
            let language = match rest.trim() {
                "" => None,
                lang => Some(lang.to_string()),
            };
            let mut code_lines = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].trim().starts_with("```") {
                code_lines.push(lines[i]);
                i += 1;
            }
            if i < lines.len() {
                i += 1; // closing fence
            }
            blocks.push(Block::CodeBlock {
                language,
                code: code_lines.join("\n"),
            });
            continue;
        }

        // ATX heading.
        if trimmed.starts_with('#') {
            let level = trimmed.chars().take_while(|&c| c == '#').count();
            if level <= 6 {
                let text = trimmed[level..].trim_start();
                if !text.is_empty() {
                    blocks.push(Block::Heading {
                        level: level as u8,
                        inlines: parse_inlines(text),
                    });
                    i += 1;
                    continue;
                }
            }
        }

        // Thematic break.
        if is_thematic_break(trimmed) {
            blocks.push(Block::Rule);
            i += 1;
            continue;
        }

        // Block quote, possibly a callout.
        if trimmed.starts_with('>') {
            let mut quote_lines = Vec::new();
            while i < lines.len() {
                let t = lines[i].trim();
                let Some(rest) = t.strip_prefix('>') else {
                    break;
                };
                quote_lines.push(rest.trim_start());
                i += 1;
            }
            let joined = quote_lines.join(" ");
            let inlines = parse_inlines(joined.trim());
            blocks.push(promote_quote(inlines));
            continue;
        }

        // List run. Consecutive items of the same kind form one list.
        if let Some((ordered, _)) = list_item(trimmed) {
            let mut items = Vec::new();
            while i < lines.len() {
                let t = lines[i].trim();
                match list_item(t) {
                    Some((kind, content)) if kind == ordered => {
                        items.push(parse_inlines(content));
                        i += 1;
                    }
                    _ => break,
                }
            }
            blocks.push(Block::List { ordered, items });
            continue;
        }

        // Paragraph: gather until a blank line or another block form.
        let mut para_lines = vec![trimmed];
        i += 1;
        while i < lines.len() {
            let t = lines[i].trim();
            if t.is_empty()
                || t.starts_with('#')
                || t.starts_with("```")
                || t.starts_with('>')
                || is_thematic_break(t)
                || list_item(t).is_some()
            {
                break;
            }
            para_lines.push(t);
            i += 1;
        }
        blocks.push(Block::Paragraph(parse_inlines(&para_lines.join(" "))));
    }

    blocks
}

fn is_thematic_break(line: &str) -> bool {
    let chars: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    chars.len() >= 3
        && (chars.iter().all(|&c| c == '-')
            || chars.iter().all(|&c| c == '*')
            || chars.iter().all(|&c| c == '_'))
}

fn list_item(line: &str) -> Option<(bool, &str)> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some((false, rest.trim_start()));
    }
    let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() {
        if let Some(rest) = line[digits.len()..].strip_prefix(". ") {
            return Some((true, rest.trim_start()));
        }
    }
    None
}

/// `> **Note:** text` becomes a callout; any other quote stays a quote.
fn promote_quote(inlines: Vec<Inline>) -> Block {
    if let Some(Inline::Strong(first)) = inlines.first() {
        let label = first.trim().trim_end_matches(':').trim();
        if CALLOUT_LABELS.contains(&label.to_ascii_lowercase().as_str()) {
            let mut rest: Vec<Inline> = inlines[1..].to_vec();
            if let Some(Inline::Text(text)) = rest.first_mut() {
                let stripped = text.trim_start().trim_start_matches(':').trim_start();
                *text = stripped.to_string();
                if text.is_empty() {
                    rest.remove(0);
                }
            }
            return Block::Callout {
                label: label.to_string(),
                inlines: rest,
            };
        }
    }
    Block::Quote(inlines)
}

pub fn parse_inlines(input: &str) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut plain = String::new();
    let mut i = 0usize;

    let flush = |plain: &mut String, out: &mut Vec<Inline>| {
        if !plain.is_empty() {
            out.push(Inline::Text(std::mem::take(plain)));
        }
    };

    while i < chars.len() {
        // Strong: **text**
        if chars[i] == '*' && i + 1 < chars.len() && chars[i + 1] == '*' {
            if let Some(end) = find_seq(&chars, i + 2, &['*', '*']) {
                flush(&mut plain, &mut out);
                out.push(Inline::Strong(chars[i + 2..end].iter().collect()));
                i = end + 2;
                continue;
            }
        }
        // Emphasis: *text*
        if chars[i] == '*' {
            if let Some(end) = find_char(&chars, i + 1, '*') {
                if end > i + 1 {
                    flush(&mut plain, &mut out);
                    out.push(Inline::Emphasis(chars[i + 1..end].iter().collect()));
                    i = end + 1;
                    continue;
                }
            }
        }
        // Inline code: `text`
        if chars[i] == '`' {
            if let Some(end) = find_char(&chars, i + 1, '`') {
                flush(&mut plain, &mut out);
                out.push(Inline::Code(chars[i + 1..end].iter().collect()));
                i = end + 1;
                continue;
            }
        }
        // Link: [text](href)
        if chars[i] == '[' {
            if let Some(close) = find_char(&chars, i + 1, ']') {
                if close + 1 < chars.len() && chars[close + 1] == '(' {
                    if let Some(paren) = find_char(&chars, close + 2, ')') {
                        flush(&mut plain, &mut out);
                        out.push(Inline::Link {
                            text: chars[i + 1..close].iter().collect(),
                            href: chars[close + 2..paren].iter().collect(),
                        });
                        i = paren + 1;
                        continue;
                    }
                }
            }
        }
        plain.push(chars[i]);
        i += 1;
    }
    flush(&mut plain, &mut out);
    out
}

fn find_char(chars: &[char], from: usize, needle: char) -> Option<usize> {
    (from..chars.len()).find(|&idx| chars[idx] == needle)
}

fn find_seq(chars: &[char], from: usize, needle: &[char]) -> Option<usize> {
    if chars.len() < needle.len() {
        return None;
    }
    (from..=chars.len() - needle.len()).find(|&idx| &chars[idx..idx + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_and_paragraphs() {
        let blocks = parse_markdown("# Title\n\nFirst para\ncontinues here.\n\nSecond.");
        assert_eq!(blocks.len(), 3);
        match &blocks[0] {
            Block::Heading { level, inlines } => {
                assert_eq!(*level, 1);
                assert_eq!(inlines, &[Inline::Text("Title".into())]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &blocks[1] {
            Block::Paragraph(inlines) => {
                assert_eq!(inlines, &[Inline::Text("First para continues here.".into())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fenced_code_keeps_language_and_body() {
        let blocks = parse_markdown("```rust\nfn main() {}\nlet x = 1;\n```\nafter");
        match &blocks[0] {
            Block::CodeBlock { language, code } => {
                assert_eq!(language.as_deref(), Some("rust"));
                assert_eq!(code, "fn main() {}\nlet x = 1;");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&blocks[1], Block::Paragraph(_)));
    }

    #[test]
    fn unterminated_fence_consumes_rest() {
        let blocks = parse_markdown("```\ncode to the end");
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::CodeBlock { code, .. } => assert_eq!(code, "code to the end"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn consecutive_bullets_group_into_one_list() {
        let blocks = parse_markdown("- one\n- two\n* three\n\n1. first\n2. second");
        assert_eq!(blocks.len(), 2);
        match &blocks[0] {
            Block::List { ordered, items } => {
                assert!(!ordered);
                assert_eq!(items.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &blocks[1] {
            Block::List { ordered, items } => {
                assert!(ordered);
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn note_quote_becomes_callout() {
        let blocks = parse_markdown("> **Note:** margins matter\n> on every page.");
        match &blocks[0] {
            Block::Callout { label, inlines } => {
                assert_eq!(label, "Note");
                assert_eq!(
                    inlines,
                    &[Inline::Text("margins matter on every page.".into())]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_quote_stays_a_quote() {
        let blocks = parse_markdown("> just a pull quote");
        assert!(matches!(&blocks[0], Block::Quote(_)));
    }

    #[test]
    fn thematic_break_parses() {
        let blocks = parse_markdown("above\n\n---\n\nbelow");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[1], Block::Rule));
    }

    #[test]
    fn inline_styles_round_trip() {
        let inlines = parse_inlines("mix **bold** and *soft* with `code` and [a link](https://x)");
        assert_eq!(
            inlines,
            vec![
                Inline::Text("mix ".into()),
                Inline::Strong("bold".into()),
                Inline::Text(" and ".into()),
                Inline::Emphasis("soft".into()),
                Inline::Text(" with ".into()),
                Inline::Code("code".into()),
                Inline::Text(" and ".into()),
                Inline::Link {
                    text: "a link".into(),
                    href: "https://x".into()
                },
            ]
        );
    }

    #[test]
    fn unclosed_delimiters_stay_literal() {
        let inlines = parse_inlines("a *dangling star and `tick");
        assert_eq!(
            inlines,
            vec![Inline::Text("a *dangling star and `tick".into())]
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let source = "# H\n\npara **b** *i*\n\n- x\n- y\n\n> **Tip:** t\n";
        assert_eq!(parse_markdown(source), parse_markdown(source));
    }
}
