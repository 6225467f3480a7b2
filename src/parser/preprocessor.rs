/// Name of the unit every session's program is loaded as.
pub const MAIN_UNIT: &str = "<script>";

/// A source unit: an identifier plus its physical lines, used for source
/// excerpts and step labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    name: String,
    lines: Vec<String>,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Text of a 1-based line.
    pub fn line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
    }

    /// Lines `[first, last]` (1-based, inclusive) clipped to the unit.
    pub fn window(&self, line: usize, context: usize) -> Option<(usize, &[String])> {
        if line == 0 || line > self.lines.len() {
            return None;
        }
        let first = line.saturating_sub(context).max(1);
        let last = (line + context).min(self.lines.len());
        Some((first, &self.lines[first - 1..last]))
    }
}

/// Remove the leading whitespace shared by every non-blank line.
pub fn dedent(text: &str) -> String {
    let mut common: Option<&str> = None;
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let indent = &line[..line.len() - line.trim_start().len()];
        common = Some(match common {
            Some(prefix) => shared_prefix(prefix, indent),
            None => indent,
        });
    }
    let common = common.unwrap_or_default();

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(common).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn shared_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or(a.len().min(b.len()), |((at, _), _)| at);
    &a[..end]
}
