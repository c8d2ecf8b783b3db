//! Cleanup of raw model text into a one-line caption.
//!
//! Rules run in a fixed order. Markdown symbols go first, so the later
//! bullet and numbering rules only see what survives that pass.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_CAPTION_CHARS: usize = 200;

// ── Lazy static regexes ──────────────────────────────────────────────────────

static MARKDOWN_SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#*\-_`]").unwrap());
static DASH_RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"---+").unwrap());
static EQUALS_RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"===+").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static NUMBERED_H3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"###\s*\d+\.\s*").unwrap());
static H3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"###\s*").unwrap());
static H2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"##\s*").unwrap());
static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*").unwrap());

static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-•]\s*").unwrap());
static NUMBERING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\s*").unwrap());

static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static MULTI_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static LEADING_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s+").unwrap());

/// Section labels and item labels the model tends to emit, rewritten into
/// connective prose. Applied in table order.
pub const PHRASE_REWRITES: &[(&str, &str)] = &[
    ("景物描述", "在景物方面，"),
    ("环境描述", "从环境来看，"),
    ("氛围描述", "整体氛围上，"),
    ("树木：", "画面中的树木"),
    ("树叶：", "而树叶"),
    ("地面：", "地面"),
    ("光影：", "光影效果"),
    ("位置：", "这里"),
    ("植被：", "植被方面，"),
    ("空气：", "空气"),
    ("季节：", "从季节来判断，"),
    ("宁静：", "宁静方面，"),
    ("生机：", "生机勃勃的是，"),
    ("神秘：", "神秘感在于"),
    ("治愈：", "治愈感来源于"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    pub phrase_rewrites: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            phrase_rewrites: true,
        }
    }
}

/// Full pipeline: [`clean_text`] followed by [`finalize_caption`].
pub fn postprocess(raw: &str, opts: &CleanupOptions) -> String {
    finalize_caption(&clean_text(raw, opts))
}

/// Strip markdown, list markers and optional section labels, then tidy
/// whitespace. Keeps line breaks.
pub fn clean_text(raw: &str, opts: &CleanupOptions) -> String {
    let s = strip_markdown(raw);
    let s = strip_list_markers(&s);
    let s = if opts.phrase_rewrites {
        apply_phrase_rewrites(&s)
    } else {
        s
    };
    normalize_whitespace(&s)
}

/// Flatten to one line and cut to [`MAX_CAPTION_CHARS`] characters.
pub fn finalize_caption(cleaned: &str) -> String {
    let flat = cleaned.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() > MAX_CAPTION_CHARS {
        flat.chars().take(MAX_CAPTION_CHARS).collect()
    } else {
        flat.to_string()
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

fn strip_markdown(input: &str) -> String {
    let s = MARKDOWN_SYMBOL_RE.replace_all(input, "");
    let s = DASH_RULE_RE.replace_all(&s, "");
    let s = EQUALS_RULE_RE.replace_all(&s, "");
    let s = BOLD_RE.replace_all(&s, "$1");
    let s = ITALIC_RE.replace_all(&s, "$1");
    let s = NUMBERED_H3_RE.replace_all(&s, "");
    let s = H3_RE.replace_all(&s, "");
    let s = H2_RE.replace_all(&s, "");
    H1_RE.replace_all(&s, "").into_owned()
}

fn strip_list_markers(input: &str) -> String {
    let s = BULLET_RE.replace_all(input, "");
    NUMBERING_RE.replace_all(&s, "").into_owned()
}

fn apply_phrase_rewrites(input: &str) -> String {
    PHRASE_REWRITES
        .iter()
        .fold(input.to_string(), |acc, (from, to)| acc.replace(from, to))
}

fn normalize_whitespace(input: &str) -> String {
    let s = BLANK_LINES_RE.replace_all(input, "\n\n");
    let s = MULTI_NEWLINE_RE.replace_all(&s, "\n\n");
    let s = LEADING_WS_RE.replace_all(&s, "");
    s.trim().to_string()
}
