use crate::error::{PromoterError, Result};
use regex::Regex;

/// Allow-list of branches whose builds may be promoted.
///
/// Patterns are globs: `*` matches any run of characters, `?` matches one.
/// Every pattern is anchored at both ends, so `master` does not match
/// `master-old`.
#[derive(Debug, Clone)]
pub struct ReleaseBranchPolicy {
    patterns: Vec<(String, Regex)>,
}

impl ReleaseBranchPolicy {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                compile_glob(p).map(|re| (p.to_string(), re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_release_branch(&self, branch: &str) -> bool {
        self.patterns.iter().any(|(_, re)| re.is_match(branch))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }
}

impl Default for ReleaseBranchPolicy {
    fn default() -> Self {
        Self::new(["master"]).unwrap_or(Self {
            patterns: Vec::new(),
        })
    }
}

/// Translate a glob into an anchored regex.
pub fn compile_glob(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|source| PromoterError::InvalidBranchPattern {
        pattern: pattern.to_string(),
        source,
    })
}
