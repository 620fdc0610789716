use std::fmt::Write;

/// Ordered `key: value` header of an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    fields: Vec<(String, String)>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: &str, value: impl ToString) {
        self.fields
            .push((key.to_string(), single_line(&value.to_string())));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.fields {
            let _ = writeln!(out, "{key}: {value}");
        }
        out.push_str("---\n");
        out
    }
}

// Values must stay on one line or the block stops parsing.
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads the header of a rendered artifact back into its fields.
///
/// Returns `None` if the text does not open with a closed `---` block.
pub fn parse_front_matter(text: &str) -> Option<FrontMatter> {
    let mut lines = text.lines();
    if lines.next()? != "---" {
        return None;
    }
    let mut fm = FrontMatter::new();
    for line in lines {
        if line == "---" {
            return Some(fm);
        }
        let (key, value) = match line.split_once(": ") {
            Some(pair) => pair,
            None => (line.strip_suffix(':')?, ""),
        };
        fm.fields.push((key.to_string(), value.to_string()));
    }
    None
}
