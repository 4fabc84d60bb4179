//! Output sanitation for generated coach lines
//!
//! Raw model text can carry reasoning blocks, chatty preambles, markdown
//! scaffolding or bracketed placeholders. Clean text passes through;
//! anything else goes through an ordered list of named extraction
//! strategies, and if none yields clean text the caller's templated
//! default line is used.
//!
//! Strategies are pure `&str -> Option<String>` functions, tried in order:
//! 1. `quoted_content`   - first quoted passage
//! 2. `markdown_section` - body of a `# Heading` or `Question:` labelled block
//! 3. `paragraph_split`  - paragraphs that are not preambles or artifacts
//! 4. `sentence_split`   - sentences that are not preambles or artifacts

use regex::Regex;
use std::sync::LazyLock;

pub const PASSTHROUGH: &str = "passthrough";
pub const DEFAULT_LINE: &str = "default";

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think(?:ing)?>.*?</think(?:ing)?>").expect("static pattern")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[[^\]\n]{1,60}\]|\{\{?[^}\n]{1,60}\}?\}|<\s*(?:insert|your|name|company|candidate)[^>\n]*>|\b(?:insert|placeholder)\b|\bXXX\b",
    )
    .expect("static pattern")
});

static REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:as an ai|language model|the user (?:wants|asked|is)|i need to (?:ask|generate|write)|i should (?:ask|generate|write)|let me (?:think|generate|craft|write))\b",
    )
    .expect("static pattern")
});

static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:sure|certainly|of course|okay|ok|alright|absolutely|great)\b[!,.]?\s*)?(?:here(?:'s|’s| is| are)\b|below is\b|the next question is\b|i(?:'ll|’ll| will) (?:ask|now|start)\b)",
    )
    .expect("static pattern")
});

static BARE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:sure|certainly|of course|okay|ok|alright|absolutely)[!.,]?\s*$")
        .expect("static pattern")
});

static POSTAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:let me know|i hope|hope this|feel free|good luck)\b")
        .expect("static pattern")
});

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*[*_#]*\s*(?:question|introduction|intro|feedback|summary|answer|response)\s*(?:\d+\s*)?[*_]*\s*:\s*[*_]*\s*(.*)$",
    )
    .expect("static pattern")
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"\n]{12,})"|“([^”\n]{12,})”"#).expect("static pattern")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("static pattern"));

/// A named extraction step
pub struct ExtractionStrategy {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<String>,
}

pub const STRATEGIES: &[ExtractionStrategy] = &[
    ExtractionStrategy {
        name: "quoted_content",
        extract: quoted_content,
    },
    ExtractionStrategy {
        name: "markdown_section",
        extract: markdown_section,
    },
    ExtractionStrategy {
        name: "paragraph_split",
        extract: paragraph_split,
    },
    ExtractionStrategy {
        name: "sentence_split",
        extract: sentence_split,
    },
];

/// Sanitized text and the step that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub strategy: &'static str,
}

impl Sanitized {
    /// True when every strategy failed and the default line was used
    pub fn is_default(&self) -> bool {
        self.strategy == DEFAULT_LINE
    }
}

pub fn sanitize(raw: &str, default_line: &str) -> Sanitized {
    let stripped = strip_reasoning(raw);
    let tidied = tidy(&stripped);
    if is_clean(&tidied) {
        return Sanitized {
            text: tidied,
            strategy: PASSTHROUGH,
        };
    }

    for strategy in STRATEGIES {
        if let Some(candidate) = (strategy.extract)(&stripped) {
            let candidate = tidy(&candidate);
            if is_clean(&candidate) {
                return Sanitized {
                    text: candidate,
                    strategy: strategy.name,
                };
            }
        }
    }

    Sanitized {
        text: default_line.to_string(),
        strategy: DEFAULT_LINE,
    }
}

/// Drop `<think>` blocks, including a dangling open or close tag
pub fn strip_reasoning(raw: &str) -> String {
    let mut text = THINK_BLOCK.replace_all(raw, "").into_owned();
    if let Some(pos) = text.rfind("</think>") {
        text = text[pos + "</think>".len()..].to_string();
    } else if let Some(pos) = text.find("<think>") {
        text.truncate(pos);
    }
    text.trim().to_string()
}

// ============================================================================
// Classification
// ============================================================================

fn is_preamble(text: &str) -> bool {
    let t = text.trim();
    t.ends_with(':') || PREAMBLE.is_match(t) || BARE_OPENER.is_match(t) || POSTAMBLE.is_match(t)
}

fn is_artifact(text: &str) -> bool {
    PLACEHOLDER.is_match(text) || REASONING.is_match(text) || is_preamble(text)
}

fn has_markup(text: &str) -> bool {
    text.contains("**")
        || text.lines().any(|l| {
            let l = l.trim_start();
            l.starts_with('#') || LABEL.is_match(l)
        })
}

fn is_clean(text: &str) -> bool {
    let t = text.trim();
    if t.split_whitespace().count() < 2
        || PLACEHOLDER.is_match(t)
        || REASONING.is_match(t)
        || has_markup(t)
    {
        return false;
    }
    let paras = paragraphs(t);
    match (paras.first(), paras.last()) {
        (Some(first), Some(last)) => !is_preamble(first) && !is_preamble(last),
        _ => false,
    }
}

fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Trim, drop bold markers and wrapping quotes, capitalize the first letter
fn tidy(text: &str) -> String {
    let mut t = text.replace("**", "").trim().to_string();
    for (open, close) in [('"', '"'), ('“', '”'), ('\'', '\'')] {
        if t.len() > 2 && t.starts_with(open) && t.ends_with(close) {
            t = t[open.len_utf8()..t.len() - close.len_utf8()].trim().to_string();
        }
    }
    let mut chars = t.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        _ => t,
    }
}

// ============================================================================
// Strategies
// ============================================================================

pub fn quoted_content(text: &str) -> Option<String> {
    QUOTED
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim())
        .find(|inner| !is_artifact(inner))
        .map(str::to_string)
}

pub fn markdown_section(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let is_header = |line: &str| {
        let l = line.trim();
        l.starts_with('#') || (l.len() > 4 && l.starts_with("**") && l.ends_with("**"))
    };

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let mut collected: Vec<&str> = Vec::new();

        if let Some(caps) = LABEL.captures(trimmed) {
            let rest = caps.get(1).map_or("", |m| m.as_str()).trim();
            if !rest.is_empty() {
                collected.push(rest);
            }
        } else if !is_header(trimmed) {
            continue;
        }

        for next in &lines[i + 1..] {
            let next = next.trim();
            if next.is_empty() {
                if collected.is_empty() {
                    continue;
                }
                break;
            }
            if is_header(next) || LABEL.is_match(next) {
                break;
            }
            collected.push(next);
        }

        let section = collected.join("\n");
        if !section.trim().is_empty() && !is_artifact(&section) {
            return Some(section);
        }
    }
    None
}

pub fn paragraph_split(text: &str) -> Option<String> {
    let kept: Vec<String> = paragraphs(text)
        .into_iter()
        .map(tidy)
        .filter(|p| !p.is_empty() && !is_artifact(p) && !has_markup(p))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n\n"))
    }
}

pub fn sentence_split(text: &str) -> Option<String> {
    let kept: Vec<String> = sentences(&text.replace("**", ""))
        .into_iter()
        .filter(|s| !is_artifact(s) && !has_markup(s))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(" "))
    }
}

/// Split after `.`, `!`, `?` or `:` followed by whitespace
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
        } else {
            current.push(c);
        }
        let at_boundary = chars.peek().map_or(true, |n| n.is_whitespace());
        if matches!(c, '.' | '!' | '?' | ':') && at_boundary {
            let sentence = current.trim();
            if !sentence.is_empty() {
                out.push(sentence.to_string());
            }
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}
