/*!
 * Text normalization.
 *
 * Rewrites raw converted text into the canonical form the cue annotator
 * expects: plain spaces, collapsed whitespace with line structure kept,
 * spaced em-dashes and expanded abbreviations.
 */

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::ConfigError;

/// Abbreviation expansions applied in one left-to-right pass.
///
/// Keys are tried longest first and only match at token boundaries, so
/// "e.g." wins over "e." and "Dr." never matches inside "Drive.".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbreviationTable {
    // sorted by descending key length, then by key
    entries: Vec<(String, String)>,
}

impl AbbreviationTable {
    /// Build a table, rejecting it as a whole if any entry is unusable
    pub fn new<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = BTreeMap::new();
        for (key, expansion) in entries {
            if key.trim().is_empty() {
                return Err(ConfigError::MalformedAbbreviations(
                    "abbreviation keys must not be empty or blank".to_string(),
                ));
            }
            if key.contains('\n') || key.contains('\r') {
                return Err(ConfigError::MalformedAbbreviations(format!(
                    "abbreviation key {:?} contains a line break",
                    key
                )));
            }
            if expansion.trim().is_empty() {
                return Err(ConfigError::MalformedAbbreviations(format!(
                    "abbreviation {:?} has an empty expansion",
                    key
                )));
            }
            map.insert(key, expansion);
        }

        let mut entries: Vec<(String, String)> = map.into_iter().collect();
        entries.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(Self { entries })
    }

    /// Parse a JSON object of string expansions
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ConfigError::MalformedAbbreviations(format!("invalid JSON: {}", e)))?;

        let object = value.as_object().ok_or_else(|| {
            ConfigError::MalformedAbbreviations("expected a JSON object of strings".to_string())
        })?;

        let mut entries = Vec::with_capacity(object.len());
        for (key, expansion) in object {
            let expansion = expansion.as_str().ok_or_else(|| {
                ConfigError::MalformedAbbreviations(format!(
                    "expansion for {:?} is not a string",
                    key
                ))
            })?;
            entries.push((key.clone(), expansion.to_string()));
        }

        Self::new(entries)
    }

    /// Load a table from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::MalformedAbbreviations(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Table without any expansion
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expand abbreviations; replacements are never re-scanned
    pub fn apply(&self, text: &str) -> String {
        if self.entries.is_empty() {
            return text.to_string();
        }

        let mut result = String::with_capacity(text.len() + text.len() / 8);
        let mut prev: Option<char> = None;
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let at_boundary = prev.is_none_or(|c| !c.is_alphanumeric());

            let matched = self.entries.iter().find(|(key, _)| {
                rest.starts_with(key.as_str())
                    && starts_on_boundary(key, at_boundary)
                    && ends_on_boundary(key, rest[key.len()..].chars().next())
            });

            match matched {
                Some((key, expansion)) => {
                    result.push_str(expansion);
                    prev = key.chars().last();
                    pos += key.len();
                }
                None => {
                    // rest is non-empty, so there is always a next char
                    let c = rest.chars().next().unwrap_or_default();
                    result.push(c);
                    prev = Some(c);
                    pos += c.len_utf8();
                }
            }
        }

        result
    }
}

fn starts_on_boundary(key: &str, at_boundary: bool) -> bool {
    match key.chars().next() {
        Some(c) if c.is_alphanumeric() => at_boundary,
        _ => true,
    }
}

fn ends_on_boundary(key: &str, next: Option<char>) -> bool {
    match key.chars().last() {
        Some(c) if c.is_alphanumeric() => next.is_none_or(|n| !n.is_alphanumeric()),
        _ => true,
    }
}

/// Expansions used when no abbreviation file is configured
pub const DEFAULT_ABBREVIATIONS: [(&str, &str); 3] =
    [("Mr.", "Mister"), ("Dr.", "Doctor"), ("e.g.", "for example")];

impl Default for AbbreviationTable {
    fn default() -> Self {
        let entries = DEFAULT_ABBREVIATIONS
            .iter()
            .map(|(key, expansion)| (key.to_string(), expansion.to_string()));
        // the built-in entries always validate
        Self::new(entries).unwrap_or_else(|_| Self::empty())
    }
}

/// Text normalizer holding the run's abbreviation table
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    abbreviations: AbbreviationTable,
}

impl Normalizer {
    pub fn new(abbreviations: AbbreviationTable) -> Self {
        Self { abbreviations }
    }

    /// Normalize raw document text
    pub fn normalize(&self, raw: &str) -> String {
        let text = replace_no_break_spaces(raw);
        let text = collapse_whitespace(&text);
        let text = space_dashes(&text);
        self.abbreviations.apply(&text)
    }
}

fn replace_no_break_spaces(text: &str) -> String {
    text.replace(['\u{00A0}', '\u{202F}'], " ")
}

/// Collapse horizontal whitespace per line and keep at most one blank line
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if blank_run > 0 && !lines.is_empty() {
            lines.push(String::new());
        }
        blank_run = 0;
        lines.push(collapsed);
    }

    lines.join("\n")
}

fn is_dash(c: char) -> bool {
    c == '\u{2014}' || c == '\u{2015}'
}

/// `word—word` becomes `word — word`
fn space_dashes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        let between_words = is_dash(c)
            && i > 0
            && chars[i - 1].is_alphanumeric()
            && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());

        if between_words {
            result.push(' ');
            result.push(c);
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}
