//! Markdown header splitter.
//!
//! Splits a document at lines that start with one of the configured header
//! markers and tags each section with the chain of headers enclosing it.
//!
//! # Rules
//!
//! - Markers are matched longest first, and a marker only matches when it
//!   is followed by a space or ends the line (`#tag` and `###` are content
//!   when only `#` and `##` are configured).
//! - Lines inside fenced code blocks (```` ``` ```` or `~~~`) are never
//!   headers.
//! - Headers and fences may be indented by up to three spaces. Lines
//!   indented further are indented code and never headers or fences.
//! - A header pops every active header at the same or a deeper level.
//! - With `strip_headers = false` the header line opens its own section.
//!   Sections that are empty once headers are stripped are dropped.
//! - Section text is the exact (trimmed) source slice, so `start` is a byte
//!   offset into the input.

use crate::error::{RagError, Result};

/// Metadata key holding the `" > "`-joined header chain.
pub const HEADER_PATH_KEY: &str = "header_path";

/// A header marker (`#`, `##`, ...) and the metadata key it populates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMarker {
    pub marker: String,
    pub name: String,
}

impl HeaderMarker {
    pub fn new(marker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            name: name.into(),
        }
    }

    fn level(&self) -> usize {
        self.marker.len()
    }
}

/// `#` → `Header 1`, `##` → `Header 2`.
pub fn default_headers() -> Vec<HeaderMarker> {
    vec![
        HeaderMarker::new("#", "Header 1"),
        HeaderMarker::new("##", "Header 2"),
    ]
}

/// One header-delimited section of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub start: usize,
    pub text: &'a str,
    /// Enclosing headers, outermost first, as `(name, title)` pairs.
    pub headers: Vec<(String, String)>,
}

impl Section<'_> {
    /// `"A > B"` for a section under `# A` / `## B`; `None` outside any header.
    pub fn header_path(&self) -> Option<String> {
        if self.headers.is_empty() {
            return None;
        }
        Some(
            self.headers
                .iter()
                .map(|(_, title)| title.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
        )
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownHeaderSplitter {
    headers: Vec<HeaderMarker>,
    strip_headers: bool,
}

struct ActiveHeader {
    level: usize,
    name: String,
    title: String,
}

impl MarkdownHeaderSplitter {
    pub fn new(mut headers: Vec<HeaderMarker>, strip_headers: bool) -> Result<Self> {
        if headers.is_empty() {
            return Err(RagError::split(
                "markdown splitting needs at least one header marker",
            ));
        }
        for h in &headers {
            if h.marker.is_empty() || !h.marker.chars().all(|c| c == '#') {
                return Err(RagError::split(format!(
                    "header marker '{}' must consist only of '#'",
                    h.marker
                )));
            }
            if h.name.trim().is_empty() {
                return Err(RagError::split(format!(
                    "header marker '{}' has an empty name",
                    h.marker
                )));
            }
        }
        headers.sort_by(|a, b| b.level().cmp(&a.level()));
        Ok(Self {
            headers,
            strip_headers,
        })
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<Section<'a>> {
        let mut sections = Vec::new();
        let mut stack: Vec<ActiveHeader> = Vec::new();
        let mut fence: Option<char> = None;
        let mut section_start = 0usize;
        let mut offset = 0usize;

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let Some(content) = unindent(line.trim_end_matches(['\n', '\r'])) else {
                continue;
            };

            if let Some(fc) = fence_char(content) {
                match fence {
                    None => fence = Some(fc),
                    Some(open) if open == fc => fence = None,
                    Some(_) => {}
                }
                continue;
            }
            if fence.is_some() {
                continue;
            }

            let Some((marker, title)) = self.match_header(content) else {
                continue;
            };

            self.push_section(&mut sections, text, section_start, line_start, &stack);
            stack.retain(|h| h.level < marker.level());
            stack.push(ActiveHeader {
                level: marker.level(),
                name: marker.name.clone(),
                title: title.to_string(),
            });
            section_start = if self.strip_headers {
                offset
            } else {
                line_start
            };
        }
        self.push_section(&mut sections, text, section_start, text.len(), &stack);

        sections
    }

    fn match_header<'l>(&self, line: &'l str) -> Option<(&HeaderMarker, &'l str)> {
        self.headers.iter().find_map(|h| {
            let rest = line.strip_prefix(h.marker.as_str())?;
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
                Some((h, rest.trim()))
            } else {
                None
            }
        })
    }

    fn push_section<'a>(
        &self,
        sections: &mut Vec<Section<'a>>,
        text: &'a str,
        from: usize,
        to: usize,
        stack: &[ActiveHeader],
    ) {
        if from >= to {
            return;
        }
        let raw = &text[from..to];
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        let lead = raw.len() - raw.trim_start().len();
        sections.push(Section {
            start: from + lead,
            text: trimmed,
            headers: stack
                .iter()
                .map(|h| (h.name.clone(), h.title.clone()))
                .collect(),
        });
    }
}

/// Drop up to three leading spaces; `None` when the line is indented code.
fn unindent(line: &str) -> Option<&str> {
    let spaces = line.bytes().take(3).take_while(|b| *b == b' ').count();
    let rest = &line[spaces..];
    if rest.starts_with([' ', '\t']) {
        None
    } else {
        Some(rest)
    }
}

fn fence_char(line: &str) -> Option<char> {
    if line.starts_with("```") {
        Some('`')
    } else if line.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}
