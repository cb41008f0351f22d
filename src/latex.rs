// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

pub mod highlight;
pub mod htmlify;
pub mod parser;
pub mod parsing_env;
pub mod tokenizer;
pub mod tree;

/// An error raised while tokenizing or parsing a LaTeX source, pinpointing
/// the offending position as a 1-based `(line, column)` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}({}, {}): {}", file_prefix(.file), .line, .column, .message)]
pub struct ParseError {
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

fn file_prefix(file: &Option<String>) -> String {
    file.as_ref().map(|f| format!("{}@", f)).unwrap_or_default()
}

/// An error raised while turning a parsed tree into HTML.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Cannot provide link for site '{site}' with label '{label}'!")]
    UnresolvedLink { site: String, label: String },

    #[error("Unknown theorem environment name '{0}'!")]
    UnknownTheorem(String),

    #[error("Cannot highlight {lang} code: {message}")]
    Highlight { lang: String, message: String },

    #[error("Cannot interpret distance '{0}'!")]
    Distance(String),

    #[error(transparent)]
    Formula(#[from] crate::formula::FormulaError),
}

impl ParseError {
    pub fn new(file: Option<&str>, (line, column): (usize, usize), message: impl Into<String>) -> Self {
        ParseError {
            file: file.map(str::to_string),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn with_file(mut self, file: Option<&str>) -> Self {
        if self.file.is_none() {
            self.file = file.map(str::to_string);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let error = ParseError::new(Some("post.tex"), (3, 7), "Unknown command 'foo'!");
        assert_eq!(error.to_string(), "post.tex@(3, 7): Unknown command 'foo'!");

        let error = ParseError::new(None, (1, 1), "Unexpected closing curly bracket!");
        assert_eq!(error.to_string(), "(1, 1): Unexpected closing curly bracket!");
    }
}
