// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
    sync::{LazyLock, OnceLock},
};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::RenderError;
use crate::html_flake::escape_html;

/// The wrapper every highlighter puts around its output.
pub static CODERE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="(?:highlight|code|codehilite)"><pre>(.*?)</pre></div>"#).unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HighlighterKind {
    #[default]
    Pygments,
    Plain,
}

impl HighlighterKind {
    pub fn create(self) -> Box<dyn Highlighter> {
        match self {
            HighlighterKind::Pygments => Box::new(Pygments::default()),
            HighlighterKind::Plain => Box::new(Plain),
        }
    }
}

/// Turns source code into HTML wrapped in `<div class="code"><pre>...</pre></div>`.
pub trait Highlighter {
    fn highlight(&self, code: &str, lang: &str, line_numbers: bool) -> Result<String, RenderError>;
}

/// Escapes the code without any highlighting.
pub struct Plain;

impl Highlighter for Plain {
    fn highlight(&self, code: &str, _lang: &str, _line_numbers: bool) -> Result<String, RenderError> {
        Ok(format!(r#"<div class="code"><pre>{}</pre></div>"#, escape_html(code)))
    }
}

/// Pipes code through `pygmentize`, or falls back to [`Plain`] when it is
/// not installed.
#[derive(Default)]
pub struct Pygments {
    program: OnceLock<Option<PathBuf>>,
}

impl Pygments {
    fn program(&self) -> Option<&PathBuf> {
        self.program
            .get_or_init(|| match which::which("pygmentize") {
                Ok(path) => Some(path),
                Err(_) => {
                    color_print::ceprintln!(
                        "<y>Warning: pygmentize not found, code listings are not highlighted.</>"
                    );
                    None
                }
            })
            .as_ref()
    }
}

impl Highlighter for Pygments {
    fn highlight(&self, code: &str, lang: &str, line_numbers: bool) -> Result<String, RenderError> {
        let Some(program) = self.program() else {
            return Plain.highlight(code, lang, line_numbers);
        };
        let error = |message: String| RenderError::Highlight {
            lang: lang.to_string(),
            message,
        };

        let mut input = tempfile::NamedTempFile::new().map_err(|e| error(e.to_string()))?;
        input.write_all(code.as_bytes()).map_err(|e| error(e.to_string()))?;

        let options = match line_numbers {
            true => "cssclass=code,linenos=inline,encoding=utf-8",
            false => "cssclass=code,encoding=utf-8",
        };
        tracing::debug!("Executing \"{} -l {} -f html -O {}\"", program.display(), lang, options);
        let output = Command::new(program)
            .args(["-l", lang, "-f", "html", "-O", options])
            .arg(input.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| error(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(error(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() {
        let html = Plain.highlight("if a < b {}", "rust", true).unwrap();
        assert_eq!(html, r#"<div class="code"><pre>if a &lt; b {}</pre></div>"#);
        let unwrapped = CODERE.replace(&html, r#"<pre class="code literal-block">$1</pre>"#);
        assert_eq!(unwrapped, r#"<pre class="code literal-block">if a &lt; b {}</pre>"#);
    }

    #[test]
    fn test_codere_spans_lines() {
        let html = "<div class=\"highlight\"><pre><span></span>a\nb\n</pre></div>\n";
        let unwrapped = CODERE.replace(html, "<code>$1</code>");
        assert_eq!(unwrapped, "<code><span></span>a\nb\n</code>\n");
    }
}
