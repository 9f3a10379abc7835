//! Descriptor parser.
//!
//! Reads a Dockerfile-syntax packaging descriptor into an ordered list of
//! raw nodes, one per logical line. Supports line continuations (`\`) and
//! comments. Nodes are converted into typed [`Instruction`]s one at a time
//! by [`Instruction::from_node`], so a malformed line only fails when the
//! extractor reaches it.

use bunny_core::error::{BunnyError, Result};

/// Dockerfile keywords that parse but carry no meaning for a unikernel package.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "RUN",
    "CMD",
    "ENTRYPOINT",
    "ENV",
    "ARG",
    "WORKDIR",
    "EXPOSE",
    "USER",
    "ADD",
    "VOLUME",
    "SHELL",
    "STOPSIGNAL",
    "HEALTHCHECK",
    "ONBUILD",
    "MAINTAINER",
];

/// One logical line of a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Instruction keyword as written
    pub keyword: String,
    /// Everything after the keyword
    pub rest: String,
    /// 1-based line the instruction starts on
    pub line: usize,
}

/// A single descriptor instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `FROM <image> [AS <alias>]`
    From {
        image: String,
        alias: Option<String>,
    },
    /// `COPY [--flag=<v>...] <src>... <dst>`
    Copy {
        sources: Vec<String>,
        dest: String,
        flags: Vec<String>,
    },
    /// `LABEL <key>=<value> ...`, quotes preserved
    Label { pairs: Vec<(String, String)> },
    /// A known Dockerfile instruction that packaging ignores
    Unsupported { keyword: String },
}

impl Instruction {
    /// Convert a raw node into a typed instruction.
    pub fn from_node(node: &Node) -> Result<Self> {
        let keyword = node.keyword.to_uppercase();
        let rest = node.rest.trim();

        match keyword.as_str() {
            "FROM" => parse_from(rest, node.line),
            "COPY" => parse_copy(rest, node.line),
            "LABEL" => parse_label(rest, node.line),
            k if UNSUPPORTED_KEYWORDS.contains(&k) => Ok(Instruction::Unsupported { keyword }),
            _ => Err(malformed(
                node.line,
                format!("Unknown instruction '{}'", node.keyword),
            )),
        }
    }
}

/// Parsed descriptor: raw nodes in order.
#[derive(Debug, Clone, Default)]
pub struct Dockerfile {
    pub nodes: Vec<Node>,
}

impl Dockerfile {
    /// Split descriptor text into nodes.
    pub fn parse(content: &str) -> Self {
        let nodes = join_continuation_lines(content)
            .into_iter()
            .filter_map(|(line, text)| {
                let trimmed = text.trim();

                // Skip empty lines, comments and parser directives
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return None;
                }

                let (keyword, rest) = split_first_word(trimmed);
                Some(Node {
                    keyword: keyword.to_string(),
                    rest: rest.to_string(),
                    line,
                })
            })
            .collect();

        Dockerfile { nodes }
    }

    /// Parse descriptor bytes as fetched from a build context.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| BunnyError::Parse(format!("descriptor is not valid UTF-8: {}", e)))?;
        Ok(Self::parse(content))
    }

    /// Parse a descriptor from a file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| {
            BunnyError::Parse(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&content)
    }
}

/// Join lines ending with `\` into single logical lines, keeping the
/// line number each one starts on.
fn join_continuation_lines(content: &str) -> Vec<(usize, String)> {
    let mut logical_lines = Vec::new();
    let mut current = String::new();
    let mut start = 0;

    for (idx, line) in content.lines().enumerate() {
        if current.is_empty() {
            start = idx + 1;
        }
        // Comment lines inside a continuation are dropped
        if !current.is_empty() && line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped.trim_end());
            current.push(' ');
        } else {
            current.push_str(line);
            logical_lines.push((start, std::mem::take(&mut current)));
        }
    }

    // Handle trailing continuation without final line
    if !current.is_empty() {
        logical_lines.push((start, current));
    }

    logical_lines
}

/// Split a string into the first word and the rest.
fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

fn malformed(line: usize, message: impl Into<String>) -> BunnyError {
    BunnyError::InstructionParse {
        line,
        message: message.into(),
    }
}

// --- Individual instruction parsers ---

fn parse_from(rest: &str, line_num: usize) -> Result<Instruction> {
    let words: Vec<&str> = rest
        .split_whitespace()
        .skip_while(|w| {
            let is_flag = w.starts_with("--");
            if is_flag {
                tracing::warn!(line = line_num, flag = *w, "Ignoring FROM flag");
            }
            is_flag
        })
        .collect();

    match words.as_slice() {
        [] => Err(malformed(line_num, "FROM requires an image argument")),
        [image] => Ok(Instruction::From {
            image: image.to_string(),
            alias: None,
        }),
        [image, kw, alias] if kw.eq_ignore_ascii_case("AS") => Ok(Instruction::From {
            image: image.to_string(),
            alias: Some(alias.to_string()),
        }),
        _ => Err(malformed(
            line_num,
            format!("FROM expects '<image> [AS <name>]', got '{}'", rest),
        )),
    }
}

fn parse_copy(rest: &str, line_num: usize) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(malformed(line_num, "COPY requires source and destination"));
    }

    // Leading --flag=value options
    let mut flags = Vec::new();
    let mut remaining = rest;
    while remaining.starts_with("--") {
        let (flag, after) = split_first_word(remaining);
        flags.push(flag.to_string());
        remaining = after;
    }

    let parts: Vec<String> = if remaining.starts_with('[') {
        parse_json_array(remaining, line_num)?
    } else {
        remaining.split_whitespace().map(str::to_string).collect()
    };

    match parts.split_last() {
        Some((dest, sources)) if !sources.is_empty() => Ok(Instruction::Copy {
            sources: sources.to_vec(),
            dest: dest.clone(),
            flags,
        }),
        _ => Err(malformed(
            line_num,
            "COPY requires at least one source and a destination",
        )),
    }
}

fn parse_label(rest: &str, line_num: usize) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(malformed(line_num, "LABEL requires key=value"));
    }

    let words = split_words(rest).map_err(|e| malformed(line_num, e))?;

    // LABEL key value (legacy single-pair form)
    if split_assignment(&words[0]).is_none() {
        let (key, value) = split_first_word(rest);
        return Ok(Instruction::Label {
            pairs: vec![(key.to_string(), value.to_string())],
        });
    }

    let mut pairs = Vec::with_capacity(words.len());
    for word in words {
        let (key, value) = split_assignment(&word).ok_or_else(|| {
            malformed(line_num, format!("LABEL expects key=value, got '{}'", word))
        })?;
        if key.is_empty() {
            return Err(malformed(line_num, format!("LABEL has an empty key in '{}'", word)));
        }
        pairs.push((key.to_string(), value.to_string()));
    }

    Ok(Instruction::Label { pairs })
}

// --- Helpers ---

/// Parse a JSON array string like `["a", "b", "c"]` into a Vec<String>.
fn parse_json_array(s: &str, line_num: usize) -> Result<Vec<String>> {
    serde_json::from_str(s)
        .map_err(|e| malformed(line_num, format!("Invalid JSON array '{}': {}", s, e)))
}

/// Split `key=value` on the first `=` outside quotes.
fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in word.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '=') => return Some((&word[..i], &word[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Whitespace split that keeps quoted sections (and their quotes) together.
fn split_words(s: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, _) if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {} quote in '{}'", q, s));
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}
