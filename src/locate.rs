use crate::directive::{ImageRef, PATH_PREFIX};
use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<div\s+class\s*=\s*["']figure[^"']*["']"#).unwrap());

static BLOCK_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</div\s*>").unwrap());

static ANY_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    let path = regex::escape(PATH_PREFIX);
    Regex::new(&format!(
        r#"!\[[^\]]*\]\({path}|(?i:<img\b[^>]*\bsrc\s*=\s*)["']{path}"#
    ))
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start_line: usize,
    pub end_line: usize,
}

impl SourceSpan {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        debug_assert!(end_line >= start_line);
        Self {
            start_line,
            end_line,
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Plain,
    InlineTag,
    BlockStart,
    BlockEnd,
    Other,
}

pub struct Matcher {
    plain: Regex,
    inline: Regex,
}

impl Matcher {
    pub fn new(image: &ImageRef) -> Result<Self, regex::Error> {
        // Filenames are user supplied, so the whole path is escaped.
        let path = regex::escape(&image.path());
        let plain = Regex::new(&format!(r"!\[[^\]]*\]\({path}\)"))?;
        let inline = Regex::new(&format!(
            r#"(?i:<img\b[^>]*\bsrc\s*=\s*)["']{path}["'][^>]*>"#
        ))?;
        Ok(Self { plain, inline })
    }

    pub fn classify(&self, line: &str) -> LineKind {
        if self.plain.is_match(line) {
            LineKind::Plain
        } else if BLOCK_START.is_match(line) {
            LineKind::BlockStart
        } else if self.inline.is_match(line) {
            LineKind::InlineTag
        } else if BLOCK_END.is_match(line) {
            LineKind::BlockEnd
        } else {
            LineKind::Other
        }
    }

    fn block_references(&self, block: &str) -> bool {
        self.inline.is_match(block) || self.plain.is_match(block)
    }

    pub fn find(&self, lines: &[&str]) -> Option<SourceSpan> {
        let mut idx = 0;
        while idx < lines.len() {
            match self.classify(lines[idx]) {
                LineKind::Plain | LineKind::InlineTag => return Some(SourceSpan::single(idx)),
                LineKind::BlockStart => match block_end(lines, idx) {
                    Some(end) => {
                        if self.block_references(&lines[idx..=end].join("\n")) {
                            return Some(SourceSpan::new(idx, end));
                        }
                        idx = end + 1;
                        continue;
                    }
                    None => {
                        tracing::debug!(line = idx, "skipping unterminated figure block");
                    }
                },
                LineKind::BlockEnd | LineKind::Other => {}
            }
            idx += 1;
        }
        None
    }
}

fn block_end(lines: &[&str], start: usize) -> Option<usize> {
    (start..lines.len()).find(|&j| BLOCK_END.is_match(lines[j]))
}

/// Locate the directive for `image` in `text`. `None` is a normal outcome.
pub fn locate(text: &str, image: &ImageRef) -> Option<SourceSpan> {
    let matcher = match Matcher::new(image) {
        Ok(matcher) => matcher,
        Err(err) => {
            tracing::warn!(image = %image, %err, "could not build directive matcher");
            return None;
        }
    };
    let lines: Vec<&str> = text.split('\n').collect();
    let span = matcher.find(&lines);
    if span.is_none() {
        tracing::debug!(image = %image, "directive not found in source");
    }
    span
}

pub fn looks_like_directive(line: &str) -> bool {
    ANY_DIRECTIVE.is_match(line) || BLOCK_START.is_match(line)
}

#[cfg(test)]
pub fn span_text(text: &str, span: SourceSpan) -> String {
    text.split('\n')
        .skip(span.start_line)
        .take(span.line_count())
        .collect::<Vec<_>>()
        .join("\n")
}
