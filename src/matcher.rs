use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

/// Corporate-form markers stripped from Korean business names.
///
/// The bare "주" is a locale heuristic: it also removes the syllable from
/// ordinary words, which is accepted as-is.
pub const DEFAULT_CORPORATE_MARKERS: &[&str] = &["주식회사", "(주)", "주"];

/// Fuzzy business-name comparison by shared substrings.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    markers: Option<Regex>,
    min_length: usize,
}

impl NameMatcher {
    pub fn new<S: AsRef<str>>(markers: &[S], min_length: usize) -> Result<Self> {
        let alternation: Vec<String> = markers
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect();
        let markers = if alternation.is_empty() {
            None
        } else {
            Some(
                Regex::new(&alternation.join("|"))
                    .context("Invalid corporate marker list")?,
            )
        };

        Ok(Self {
            markers,
            min_length: min_length.max(1),
        })
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Clean a name and strip corporate markers from it.
    pub fn normalize(&self, name: &str) -> String {
        self.strip_markers(&clean(name))
    }

    /// Remove marker substrings until none remain.
    pub fn strip_markers(&self, name: &str) -> String {
        let Some(re) = &self.markers else {
            return name.to_string();
        };
        let mut current = name.to_string();
        loop {
            let next = re.replace_all(&current, "");
            if next == current {
                return current;
            }
            current = next.into_owned();
        }
    }

    /// True when any `min_length` window of `a` occurs in `b`.
    ///
    /// Windows are always taken from `a`.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        let a = self.normalize(a);
        let b = self.normalize(b);
        debug!("normalized names: '{}' vs '{}'", a, b);

        let chars: Vec<char> = a.chars().collect();
        if chars.len() < self.min_length {
            return false;
        }

        let hit = chars
            .windows(self.min_length)
            .map(|w| w.iter().collect::<String>())
            .find(|window| b.contains(window.as_str()));

        match hit {
            Some(window) => {
                debug!("shared substring '{}'", window);
                true
            }
            None => false,
        }
    }
}

/// Drop whitespace and punctuation, then lower-case.
pub fn clean(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}
