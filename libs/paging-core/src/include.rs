/// Ordered set of relation paths to eager-load alongside the primary rows.
///
/// Parsed from a comma-separated list such as `"posts, posts.comments"`. Each segment
/// is trimmed; empty segments and repeats are dropped while first-seen order is kept.
/// Path names are not validated here: the entity loader decides what it understands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludePaths(Vec<String>);

impl IncludePaths {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn parse(raw: &str) -> Self {
        let mut paths: Vec<String> = Vec::new();
        for segment in raw.split(',') {
            let path = segment.trim();
            if path.is_empty() || paths.iter().any(|p| p == path) {
                continue;
            }
            paths.push(path.to_owned());
        }
        Self(paths)
    }

    /// Append another comma-separated list, keeping the set semantics.
    pub fn extend_from(&mut self, raw: &str) {
        for path in Self::parse(raw).0 {
            if !self.0.contains(&path) {
                self.0.push(path);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for IncludePaths {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for IncludePaths {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl std::fmt::Display for IncludePaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(","))
    }
}
