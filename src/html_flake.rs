// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::fmt::Write;

use itertools::Itertools;

/// Escapes text content. Control characters become numeric references.
pub fn escape_html(text: &str) -> String {
    escape_html_with(text, false)
}

/// Like [`escape_html`], but spaces become `&nbsp;`.
pub fn escape_html_with(text: &str, escape_spaces: bool) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            ' ' if escape_spaces => result.push_str("&nbsp;"),
            c if (c as u32) < 32 || (127..160).contains(&(c as u32)) => {
                let _ = write!(result, "&#x{:x};", c as u32);
            }
            c => result.push(c),
        }
    }
    result
}

/// Escapes an attribute value; only `[0-9A-Za-z/:.@_-]` and space pass through.
pub fn escape_html_attribute(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            ' ' | '/' | ':' | '.' | '@' | '-' | '_' => result.push(c),
            c if c.is_ascii_alphanumeric() => result.push(c),
            c => {
                let _ = write!(result, "&#x{:x};", c as u32);
            }
        }
    }
    result
}

/// Percent-encodes everything except unreserved characters, `:`, `/` and `#`.
pub fn escape_url(url: &str) -> String {
    let mut result = String::with_capacity(url.len());
    for byte in url.bytes() {
        match byte {
            b':' | b'/' | b'#' | b'_' | b'.' | b'-' | b'~' => result.push(byte as char),
            b if b.is_ascii_alphanumeric() => result.push(b as char),
            b => {
                let _ = write!(result, "%{:02X}", b);
            }
        }
    }
    result
}

/// `class='...'` followed by the remaining attributes in the given order,
/// each with a leading space. Attribute values are escaped.
pub fn html_attributes(class: Option<&str>, attributes: &[(&str, &str)]) -> String {
    let class = class
        .map(|class| format!(" class='{}'", escape_html_attribute(class)))
        .unwrap_or_default();
    let rest = attributes
        .iter()
        .map(|(key, value)| format!(" {}='{}'", key, escape_html_attribute(value)))
        .join("");
    format!("{}{}", class, rest)
}

pub fn html_anchor(name: &str) -> String {
    format!("<a name='{}'></a>", escape_html_attribute(name))
}

pub fn html_link(href: &str, text: &str) -> String {
    format!("<a href='{}'>{}</a>", escape_url(href), text)
}

pub fn html_url_as_text(url: &str) -> String {
    format!(r#"<tt class="url-as-text">{}</tt>"#, escape_html(url))
}

pub fn html_qed() -> &'static str {
    "<div class='qed-block'><span class='qed-sign'></span></div>"
}

/// The `<img>` fragment of a rendered formula image.
pub fn html_formula_image(css_type: &str, width: u32, height: u32, src: &str, alt: &str) -> String {
    format!(
        "<img class='img-{0}-formula img-formula' width='{1}' height='{2}' src='{3}' alt='{4}' title='{4}' />",
        css_type, width, height, src, alt
    )
}
