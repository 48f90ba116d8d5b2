//! Terminal formatting

use std::fmt::{self, Display};

use colored::Colorize;

/// A formatted section title
pub(crate) struct SectionTitle<'a>(pub(crate) &'a str);

impl Display for SectionTitle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\n{}", self.0.bold().underline())
    }
}

/// Format a section header
pub(crate) const fn section_title(title: &str) -> SectionTitle<'_> {
    SectionTitle(title)
}

/// Format a success message
pub(crate) fn success(message: &str) -> String {
    format!("✅ {}", message.green().bold())
}

/// Format a warning message
pub(crate) fn warning(message: &str) -> String {
    format!("⚠️  {}", message.yellow().bold())
}

/// Format a titled list of key-value lines
pub(crate) fn key_value_box(title: &str, items: &[(&str, String)]) -> String {
    let mut result = format!("{}", title.bold().underline());
    for (key, value) in items {
        result.push_str(&format!("\n  {}: {}", key.bold(), value));
    }
    result
}
