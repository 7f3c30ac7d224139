use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static RE_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,3}[ \t]+\S").unwrap());

/// A markdown section. `body` excludes the heading line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub heading: Option<&'a str>,
    pub body: &'a str,
    /// Byte range of `body` within the source text.
    pub range: Range<usize>,
}

impl Section<'_> {
    /// Heading text without the `#` markers, or a placeholder for the lead.
    pub fn title(&self) -> &str {
        match self.heading {
            Some(h) => h.trim().trim_start_matches('#').trim(),
            None => "(intro)",
        }
    }
}

/// Split at `#`, `##` and `###` headings. Text before the first heading is a
/// section of its own when it is not blank.
pub fn split_sections(text: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut heading: Option<&str> = None;
    let mut body_start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if RE_HEADING.is_match(line) {
            push_section(&mut sections, text, heading, body_start..offset);
            heading = Some(line.trim_end());
            body_start = offset + line.len();
        }
        offset += line.len();
    }
    push_section(&mut sections, text, heading, body_start..text.len());

    sections
}

fn push_section<'a>(
    sections: &mut Vec<Section<'a>>,
    text: &'a str,
    heading: Option<&'a str>,
    range: Range<usize>,
) {
    let body = &text[range.clone()];
    if heading.is_none() && body.trim().is_empty() {
        return;
    }
    sections.push(Section {
        heading,
        body,
        range,
    });
}
