// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use itertools::Itertools;

use super::{
    highlight::{Highlighter, CODERE},
    tree::{
        Block, BlockKind, Code, FormulaList, IncludeGraphics, Language, Link, ListKind, Node, PictureGroup,
        Reference, SectionLevel, SpecialKind, Tabular, Word, WordPart, Words,
    },
    RenderError,
};
use crate::{
    compiler::plugin::FormulaRenderer,
    context::LatexContext,
    formula::{FormulaContext, FormulaType},
    html_flake::{self, escape_html, escape_html_attribute, escape_url},
};

/// Renders a parsed document.
///
/// With `beautify`, block tags sit on their own lines, indented two spaces
/// per nesting level starting at `outer_indent`. Inline content is always
/// rendered compactly.
pub fn htmlify(
    root: &Block,
    renderer: &dyn FormulaRenderer,
    highlighter: &dyn Highlighter,
    ctx: &mut LatexContext,
    beautify: bool,
    outer_indent: usize,
) -> Result<String, RenderError> {
    let mut html = Htmlify {
        formula_context: renderer.create_context(),
        renderer,
        highlighter,
        ctx,
        beautify,
        item_level: 0,
        enum_level: 0,
    };
    html.block(root, outer_indent)
}

struct Htmlify<'a> {
    renderer: &'a dyn FormulaRenderer,
    highlighter: &'a dyn Highlighter,
    ctx: &'a mut LatexContext,
    formula_context: FormulaContext,
    beautify: bool,
    item_level: usize,
    enum_level: usize,
}

type Rendered = Result<String, RenderError>;

impl Htmlify<'_> {
    fn indent(&self, text: &str, indent: usize) -> String {
        match self.beautify {
            true => format!("{}{}\n", "  ".repeat(indent), text),
            false => text.to_string(),
        }
    }

    fn tag(&self, tag: &str, class: Option<&str>, attributes: &[(&str, &str)], content: &str, indent: usize) -> String {
        let open = format!("<{}{}>", tag, html_flake::html_attributes(class, attributes));
        let close = format!("</{}>", tag);
        format!("{}{}{}", self.indent(&open, indent), content, self.indent(&close, indent))
    }

    fn anchors(&self, labels: &[String], indent: usize) -> String {
        labels.iter().map(|label| self.indent(&html_flake::html_anchor(label), indent)).collect()
    }

    /// Runs `f` with beautification turned off.
    fn compact<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let beautify = std::mem::replace(&mut self.beautify, false);
        let result = f(self);
        self.beautify = beautify;
        result
    }

    fn compact_words(&mut self, words: &Words) -> Rendered {
        self.compact(|html| html.words(words)).map(|text| text.trim().to_string())
    }

    fn node(&mut self, node: &Node, indent: usize) -> Rendered {
        match node {
            Node::WordPart(part) => Ok(word_part(part)),
            Node::Comment(_) => Ok(String::new()),
            Node::Words(words) => self.words(words),
            Node::Formula(body) => self.inline_formula("inline-formula", body, FormulaType::Inline),
            Node::TikzPicture(tikz) => {
                self.inline_formula("tikz-formula", &tikz.body, FormulaType::TikzPicture(tikz.args.clone()))
            }
            Node::PsTricksPicture(pst) => {
                self.inline_formula("pstricks-formula", &pst.body, FormulaType::PsTricks(pst.args.clone()))
            }
            Node::DisplayFormula(body) => self.block_formula("display-formula", body, FormulaType::Display, indent),
            Node::AlignFormula(body) => self.block_formula("align-formula", body, FormulaType::Align, indent),
            Node::Code(code) => self.inline_code(code),
            Node::CodeBlock(code) => self.code_block(code, indent),
            Node::Link(link) => self.link(link),
            Node::Reference(reference) => self.reference(reference),
            Node::IncludeGraphics(gfx) => Ok(include_graphics(gfx, false)?.0),
            Node::Language(language) => self.language(language, indent),
            Node::Tabular(tabular) => self.tabular(tabular, indent),
            Node::PictureGroup(group) => self.picture_group(group, indent),
            Node::FormulaList(list) => self.formula_list(list, indent),
            Node::Block(block) => self.block(block, indent),
        }
    }

    fn word(&mut self, word: &Word) -> Rendered {
        word.parts.iter().map(|part| self.node(part, 0)).collect()
    }

    fn words(&mut self, words: &Words) -> Rendered {
        let text = words.words.iter().map(|word| self.word(word)).collect::<Result<Vec<_>, _>>()?.join(" ");
        Ok(match words.formatting {
            Some(formatting) => format!("<{0}>{1}</{0}>", formatting.html_tag(), text),
            None => text,
        })
    }

    fn formula(&mut self, body: &str, kind: FormulaType) -> Rendered {
        self.renderer.render(body, &self.formula_context, &kind, self.ctx)
    }

    fn inline_formula(&mut self, class: &str, body: &str, kind: FormulaType) -> Rendered {
        Ok(format!(r#"<span class="{}">{}</span>"#, class, self.formula(body, kind)?))
    }

    fn block_formula(&mut self, class: &str, body: &str, kind: FormulaType, indent: usize) -> Rendered {
        let content = self.formula(body, kind)?;
        let content = self.indent(&content, indent + 1);
        Ok(self.tag("div", Some(class), &[], &content, indent))
    }

    fn link(&mut self, link: &Link) -> Rendered {
        let content = match &link.text {
            None => html_flake::html_url_as_text(&link.url),
            Some(text) => self.compact(|html| html.words(text))?,
        };
        Ok(html_flake::html_link(&link.url, &content))
    }

    fn reference(&mut self, reference: &Reference) -> Rendered {
        let (url, text) = self.ctx.provide_link(&reference.target)?;
        let content = match &reference.text {
            None => escape_html(&text),
            Some(text) => self.compact(|html| html.words(text))?,
        };
        Ok(html_flake::html_link(&url, &content))
    }

    fn language(&mut self, language: &Language, indent: usize) -> Rendered {
        let tag = if language.inline { "span" } else { "div" };
        let content = self.words(&language.element)?;
        let content = match language.inline {
            true => content,
            false => self.indent(&content, indent + 1),
        };
        Ok(self.tag(tag, None, &[("lang", language.locale.as_str())], &content, indent))
    }

    fn code_block(&mut self, code: &Code, indent: usize) -> Rendered {
        let highlighted = self.highlighter.highlight(&code.body, &code.lang, true)?;
        let content = CODERE.replace_all(&highlighted, r#"<pre class="code literal-block">$1</pre>"#);
        let html = format!("<div class='code-{}'>{}</div>", escape_html_attribute(&code.lang), content.trim_end());
        Ok(self.indent(&html, indent))
    }

    fn inline_code(&mut self, code: &Code) -> Rendered {
        let highlighted = self.highlighter.highlight(&code.body, &code.lang, false)?;
        let content = CODERE
            .replace_all(&highlighted, r#"<code class="code literal-block">$1</code>"#)
            .replace('\n', "");
        Ok(format!(
            "<span class='code-{} inline-code'>{}</span>",
            escape_html_attribute(&code.lang),
            content
        ))
    }

    fn tabular(&mut self, tabular: &Tabular, indent: usize) -> Rendered {
        let columns = tabular.alignment.len();
        let mut rows = String::new();
        for (r, row) in tabular.rows.iter().enumerate() {
            let mut cells = String::new();
            for (c, align) in tabular.alignment.iter().enumerate() {
                let left = align.left_border || (c > 0 && tabular.alignment[c - 1].right_border);
                let right = c + 1 == columns && align.right_border;
                let top = tabular.lines_at(r).iter().any(|line| line.covers(c));
                let bottom = r + 1 == tabular.rows.len() && tabular.lines_at(r + 1).iter().any(|line| line.covers(c));

                let borders: String = [(left, 'l'), (right, 'r'), (top, 't'), (bottom, 'b')]
                    .iter()
                    .filter_map(|(set, flag)| set.then_some(*flag))
                    .collect();
                let class = match borders.is_empty() {
                    true => String::new(),
                    false => format!(" class='cell-{}'", borders),
                };
                let content = match row.get(c) {
                    Some(cell) => self.compact_words(cell)?,
                    None => String::new(),
                };
                let cell = format!(
                    r#"<td{} style="text-align: {};">{}</td>"#,
                    class,
                    align.align.as_str(),
                    content
                );
                cells.push_str(&self.indent(&cell, indent + 3));
            }
            rows.push_str(&self.tag("tr", None, &[], &cells, indent + 2));
        }
        let table = self.tag("table", None, &[], &rows, indent + 1);
        Ok(self.tag("div", Some("tabular-wrapper"), &[], &table, indent))
    }

    fn picture_group(&mut self, group: &PictureGroup, indent: usize) -> Rendered {
        let mut pictures = String::new();
        for (title, content) in &group.pictures {
            let (content, style) = match singleton(content) {
                Some(Node::IncludeGraphics(gfx)) => {
                    let (image, size) = include_graphics(gfx, true)?;
                    let style = size.iter().map(|(key, value)| format!("{}: {};", key, value)).join(" ");
                    (image, style)
                }
                _ => (self.compact_words(content)?, String::new()),
            };
            let mut attributes = Vec::new();
            if !style.is_empty() {
                attributes.push(("style", style.as_str()));
            }
            let content = self.indent(&content, indent + 3);
            let title = self.compact_words(title)?;
            let title = self.indent(&title, indent + 3);
            let inner = format!(
                "{}{}",
                self.tag("div", Some("content"), &[], &content, indent + 2),
                self.tag("div", Some("title"), &[], &title, indent + 2)
            );
            pictures.push_str(&self.tag("div", Some("picture"), &attributes, &inner, indent + 1));
        }
        Ok(self.tag("div", Some("picture-group"), &[], &pictures, indent))
    }

    fn formula_list(&mut self, list: &FormulaList, indent: usize) -> Rendered {
        let mut formulae = String::new();
        for body in &list.formulae {
            let formula = self.inline_formula("inline-formula", body, FormulaType::Inline)?;
            let formula = self.indent(&formula, indent + 2);
            formulae.push_str(&self.tag("div", Some("formula"), &[], &formula, indent + 1));
        }
        Ok(self.tag("div", Some("formula-list"), &[], &formulae, indent))
    }

    fn block(&mut self, block: &Block, indent: usize) -> Rendered {
        match &block.kind {
            BlockKind::Plain => self.plain_block(block, indent, true, None, "div"),
            BlockKind::Special(SpecialKind::Blockquote) => {
                self.plain_block(block, indent, true, Some("block-quote"), "blockquote")
            }
            BlockKind::Special(SpecialKind::Center) => self.plain_block(block, indent, true, Some("center-block"), "div"),
            BlockKind::Enumeration(kind) => self.enumeration(block, *kind, indent),
            BlockKind::Theorem {
                kind,
                optional_title,
                qed,
            } => self.theorem(block, kind, optional_title.as_ref(), *qed, indent),
            BlockKind::Titled { level, title } => self.titled(block, *level, title, indent),
        }
    }

    /// Renders block children, wrapping bare words in paragraphs.
    fn block_content(&mut self, block: &Block, indent: usize) -> Rendered {
        let mut content = String::new();
        for element in &block.elements {
            match element {
                Node::Words(words) => {
                    let text = self.compact_words(words)?;
                    let paragraph = self.indent(&text, indent + 1);
                    content.push_str(&self.tag("p", None, &[], &paragraph, indent));
                }
                element => content.push_str(&self.node(element, indent)?),
            }
        }
        Ok(content)
    }

    fn plain_block(&mut self, block: &Block, indent: usize, add_labels: bool, class: Option<&str>, container: &str) -> Rendered {
        let anchors = match add_labels {
            true => self.anchors(&block.labels, indent + 1),
            false => String::new(),
        };
        let content = self.block_content(block, indent + 1)?;
        Ok(self.tag(container, class, &[], &format!("{}{}", anchors, content), indent))
    }

    fn titled(&mut self, block: &Block, level: SectionLevel, title: &Words, indent: usize) -> Rendered {
        let title = self.compact_words(title)?;
        let title = self.indent(&title, indent + 2);
        let header = self.tag(level.header_tag(), None, &[], &title, indent + 1);
        let body = self.plain_block(block, indent + 1, true, None, "div")?;
        Ok(self.tag("div", Some(level.css_class()), &[], &format!("{}{}", header, body), indent))
    }

    fn theorem(&mut self, block: &Block, kind: &str, optional_title: Option<&Words>, qed: bool, indent: usize) -> Rendered {
        let mut title = self
            .ctx
            .theorem_names
            .get(kind)
            .cloned()
            .ok_or_else(|| RenderError::UnknownTheorem(kind.to_string()))?;
        if let Some(optional_title) = optional_title {
            title = format!("{} ({})", title, self.compact_words(optional_title)?);
        }
        title.push('.');

        let header_content = format!("{}{}", self.anchors(&block.labels, indent + 2), self.indent(&title, indent + 2));
        let header_class = format!("theorem-header theorem-{}-header", kind);
        let header = self.tag("div", Some(&header_class), &[], &header_content, indent + 1);

        let content_class = format!("theorem-content theorem-{}-content", kind);
        let content = self.plain_block(block, indent + 1, false, Some(&content_class), "div")?;

        let mut class = format!("theorem-environment theorem-{}-environment", kind);
        let qed = match qed {
            true => {
                class.push_str(" qed");
                self.indent(html_flake::html_qed(), indent + 1)
            }
            false => String::new(),
        };
        Ok(self.tag("div", Some(&class), &[], &format!("{}{}{}", header, content, qed), indent))
    }

    fn enumeration(&mut self, block: &Block, kind: ListKind, indent: usize) -> Rendered {
        let class = match kind {
            ListKind::Unordered => {
                self.item_level += 1;
                format!("item-level-{}", self.item_level)
            }
            ListKind::Ordered => {
                self.enum_level += 1;
                format!("enum-level-{}", self.enum_level)
            }
        };
        let items = self.list_items(block, indent);
        match kind {
            ListKind::Unordered => self.item_level -= 1,
            ListKind::Ordered => self.enum_level -= 1,
        }
        let content = format!("{}{}", self.anchors(&block.labels, indent + 1), items?);
        Ok(self.tag(kind.tag(), Some(&class), &[], &content, indent))
    }

    fn list_items(&mut self, block: &Block, indent: usize) -> Rendered {
        let mut items = String::new();
        for element in &block.elements {
            let labels: &[String] = match element {
                Node::Block(item) => &item.labels,
                _ => &[],
            };
            let element = match element {
                Node::Block(item) if item.elements.len() == 1 && matches!(item.elements[0], Node::Words(_) | Node::Formula(_)) => {
                    &item.elements[0]
                }
                element => element,
            };
            let item = match element {
                Node::Block(item) if item.elements.is_empty() => {
                    let anchors = labels.iter().map(|label| html_flake::html_anchor(label)).join("");
                    self.indent(&format!("<li>{}</li>", anchors), indent + 1)
                }
                Node::Words(words) => {
                    let anchors = labels.iter().map(|label| html_flake::html_anchor(label)).join("");
                    let text = self.compact_words(words)?;
                    self.indent(&format!("<li>{}{}</li>", anchors, text), indent + 1)
                }
                element => {
                    let anchors = self.anchors(labels, indent + 2);
                    let content = match element {
                        Node::Block(item) => self.block_content(item, indent + 2)?,
                        Node::Formula(_) => {
                            let formula = self.node(element, indent + 2)?;
                            self.indent(&formula, indent + 2)
                        }
                        element => self.node(element, indent + 2)?,
                    };
                    self.tag("li", None, &[], &format!("{}{}", anchors, content), indent + 1)
                }
            };
            items.push_str(&item);
        }
        Ok(items)
    }
}

fn word_part(part: &WordPart) -> String {
    match part.text.as_str() {
        " " => "&nbsp;".to_string(),
        text => escape_html(text),
    }
}

/// The only non-blank part of `words`, if there is exactly one.
fn singleton(words: &Words) -> Option<&Node> {
    words
        .words
        .iter()
        .flat_map(|word| &word.parts)
        .filter(|part| !part.is_whitespace_and_comments())
        .exactly_one()
        .ok()
}

/// Renders an `<img>`; with `extract_size` the size is returned as
/// `(property, value)` pairs instead of being set on the tag.
fn include_graphics(gfx: &IncludeGraphics, extract_size: bool) -> Result<(String, Vec<(String, String)>), RenderError> {
    let mut size = Vec::new();
    if let Some(height) = gfx.args.get("height") {
        size.push(("height".to_string(), convert_distance(height, false)?));
    }
    if let Some(width) = gfx.args.get("width") {
        size.push(("width".to_string(), convert_distance(width, true)?));
    }
    let attributes = match extract_size {
        true => String::new(),
        false => size.iter().map(|(key, value)| format!(" {}='{}'", key, value)).join(""),
    };
    let alt = gfx.args.get("alt").map(String::as_str).unwrap_or_default();
    let image = format!(
        "<img src='{}' class='include-graphics'{} alt='{}'/>",
        escape_url(&gfx.url),
        attributes,
        escape_html_attribute(alt)
    );
    Ok((image, size))
}

/// Converts a LaTeX distance to CSS: fractions of the text width (height)
/// become percentages, `cm` becomes `em` at 20em per cm, anything else `px`.
pub fn convert_distance(distance: &str, horizontal: bool) -> Result<String, RenderError> {
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| RenderError::Distance(distance.to_string()))
    };
    let relative = match horizontal {
        true => distance.strip_suffix("\\textwidth"),
        false => distance.strip_suffix("\\textheight"),
    };
    if let Some(factor) = relative {
        return match factor.trim().is_empty() {
            true => Ok("100%".to_string()),
            false => Ok(format!("{:.2}%", parse(factor)? * 100.0)),
        };
    }
    if let Some(value) = distance.strip_suffix("cm") {
        return Ok(format!("{}em", parse(value)? * 20.0));
    }
    Ok(format!("{}px", parse(distance)?))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        compiler::plugin::{LatexPlugin, PluginType},
        latex::{highlight::Plain, parser::parse, parsing_env::ParsingEnvironment},
    };

    /// Renders formulae as `[type:body]`.
    struct Echo;

    impl LatexPlugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn plugin_type(&self) -> PluginType {
            PluginType::FormulaRenderer
        }
    }

    impl FormulaRenderer for Echo {
        fn create_context(&self) -> FormulaContext {
            FormulaContext::default()
        }

        fn render(&self, body: &str, _: &FormulaContext, kind: &FormulaType, ctx: &mut LatexContext) -> Rendered {
            ctx.inc_plugin_counter("echo", "count");
            Ok(format!("[{}:{}]", kind, body))
        }
    }

    fn context() -> LatexContext {
        let names = BTreeMap::from([
            ("theorem".to_string(), "Theorem".to_string()),
            ("proof".to_string(), "Proof".to_string()),
        ]);
        LatexContext::new(0, "en", names, None)
    }

    fn render(source: &str, beautify: bool) -> String {
        render_with(source, beautify, &mut context())
    }

    fn render_with(source: &str, beautify: bool, ctx: &mut LatexContext) -> String {
        let root = parse(source, &ParsingEnvironment::default(), None).unwrap();
        htmlify(&root, &Echo, &Plain, ctx, beautify, 0).unwrap()
    }

    #[test]
    fn test_paragraph_with_formula() {
        let mut ctx = context();
        let html = render_with("A simple $x^2$ formula.", false, &mut ctx);
        assert_eq!(html, r#"<div><p>A simple <span class="inline-formula">[inline:x^2]</span> formula.</p></div>"#);
        assert_eq!(ctx.get_plugin_data("echo", "count"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_beautified_paragraphs() {
        let html = render("One \\textbf{two}.\n\nThree~four.", true);
        assert_eq!(
            html,
            "<div>\n  <p>\n    One <strong>two</strong>.\n  </p>\n  <p>\n    Three&nbsp;four.\n  </p>\n</div>\n"
        );
    }

    #[test]
    fn test_escaping() {
        let html = render("a \\& b < c", false);
        assert_eq!(html, "<div><p>a &amp; b &lt; c</p></div>");
    }

    #[test]
    fn test_theorem_and_proof() {
        let html = render(
            "\\begin{theorem}[Pythagoras]\\label{thm:pyth}\n$$a^2+b^2=c^2$$\n\\end{theorem}\n\\begin{proof}\nObvious.\\qed\n\\end{proof}",
            false,
        );
        assert!(html.contains(
            "<div class='theorem-environment theorem-theorem-environment'>\
             <div class='theorem-header theorem-theorem-header'><a name='thm:pyth'></a>Theorem (Pythagoras).</div>\
             <div class='theorem-content theorem-theorem-content'><div class='display-formula'>[display:a^2+b^2=c^2]</div></div></div>"
        ));
        assert!(html.contains("<div class='theorem-environment theorem-proof-environment qed'>"));
        assert!(html.contains(
            "<div class='theorem-header theorem-proof-header'>Proof.</div>\
             <div class='theorem-content theorem-proof-content'><p>Obvious.</p></div>\
             <div class='qed-block'><span class='qed-sign'></span></div></div>"
        ));
    }

    #[test]
    fn test_unknown_theorem_name() {
        let root = parse("\\begin{lemma}x\\end{lemma}", &ParsingEnvironment::default(), None).unwrap();
        let error = htmlify(&root, &Echo, &Plain, &mut context(), false, 0).unwrap_err();
        assert!(matches!(error, RenderError::UnknownTheorem(kind) if kind == "lemma"));
    }

    #[test]
    fn test_nested_lists() {
        let html = render(
            "\\begin{itemize}\\item One\n\\item Two\\begin{enumerate}\\item $a$\\item $b$\\end{enumerate}\n\\item\\end{itemize}",
            false,
        );
        assert_eq!(
            html,
            "<ul class='item-level-1'><li>One</li>\
             <li><p>Two</p><ol class='enum-level-1'>\
             <li><span class=\"inline-formula\">[inline:a]</span></li>\
             <li><span class=\"inline-formula\">[inline:b]</span></li></ol></li>\
             <li></li></ul>"
        );
    }

    #[test]
    fn test_tabular_borders() {
        let html = render(
            "\\begin{tabular}{|l|c|r|}\n\\hline\na & b & c \\\\\n\\cline{2-3}\nd & e & f \\\\\n\\hline\n\\end{tabular}",
            false,
        );
        let expected = concat!(
            "<div class='tabular-wrapper'><table>",
            "<tr>",
            r#"<td class='cell-lt' style="text-align: left;">a</td>"#,
            r#"<td class='cell-lt' style="text-align: center;">b</td>"#,
            r#"<td class='cell-lrt' style="text-align: right;">c</td>"#,
            "</tr><tr>",
            r#"<td class='cell-lb' style="text-align: left;">d</td>"#,
            r#"<td class='cell-ltb' style="text-align: center;">e</td>"#,
            r#"<td class='cell-lrtb' style="text-align: right;">f</td>"#,
            "</tr></table></div>"
        );
        assert!(html.contains(expected), "{}", html);
    }

    #[test]
    fn test_links_and_references() {
        let html = render("\\url{http://a.b/x y} \\href{/p}{the \\emph{page}} \\ref{intro}", false);
        assert_eq!(
            html,
            "<div><p><a href='http://a.b/x%20y'><tt class=\"url-as-text\">http://a.b/x y</tt></a> \
             <a href='/p'>the <em>page</em></a> <a href='#intro'>intro</a></p></div>"
        );
    }

    #[test]
    fn test_unresolved_reference() {
        let root = parse("\\ref{blog::missing}", &ParsingEnvironment::default(), None).unwrap();
        let error = htmlify(&root, &Echo, &Plain, &mut context(), false, 0).unwrap_err();
        assert!(matches!(error, RenderError::UnresolvedLink { .. }));
    }

    #[test]
    fn test_include_graphics() {
        let html = render("\\includegraphics[width=0.5\\textwidth, height=2cm, alt=A b]{img/a b.png}", false);
        assert_eq!(
            html,
            "<div><p><img src='img/a%20b.png' class='include-graphics' height='40em' width='50.00%' alt='A b'/></p></div>"
        );
    }

    #[test]
    fn test_convert_distance() {
        assert_eq!(convert_distance("\\textwidth", true).unwrap(), "100%");
        assert_eq!(convert_distance("0.333\\textheight", false).unwrap(), "33.30%");
        assert_eq!(convert_distance("1.5cm", true).unwrap(), "30em");
        assert_eq!(convert_distance("120", true).unwrap(), "120px");
        assert!(convert_distance("0.5\\textwidth", false).is_err());
    }

    #[test]
    fn test_picture_group() {
        let html = render(
            "\\begin{picturegroup}\\picture{First}{\\includegraphics[width=\\textwidth]{a.png}}\\end{picturegroup}",
            false,
        );
        assert_eq!(
            html,
            "<div><div class='picture-group'><div class='picture' style='width: 100&#x25;&#x3b;'>\
             <div class='content'><img src='a.png' class='include-graphics' alt=''/></div>\
             <div class='title'>First</div></div></div></div>"
        );
    }

    #[test]
    fn test_formula_list_and_language() {
        let html = render(
            "\\begin{formulalist}\\formula{a}\\end{formulalist}\n\n\\foreignlanguage{french}{Bonjour}",
            false,
        );
        assert!(html.contains(
            "<div class='formula-list'><div class='formula'><span class=\"inline-formula\">[inline:a]</span></div></div>"
        ));
        assert!(html.contains("<p><span lang='fr'>Bonjour</span></p>"));
    }

    #[test]
    fn test_code() {
        let html = render("\\code{rust}|a<b|\n\n\\begin{codelisting}{rust}\nx\ny\n\\end{codelisting}", false);
        assert!(html.contains(
            "<span class='code-rust inline-code'><code class=\"code literal-block\">a&lt;b</code></span>"
        ));
        assert!(html.contains("<div class='code-rust'><pre class=\"code literal-block\">x\ny</pre></div>"));
    }

    #[test]
    fn test_sections() {
        let html = render("\\section{Intro}\\label{intro}\nText.", true);
        assert_eq!(
            html,
            "<div class='section-block'>\n  <h2>\n    Intro\n  </h2>\n  <div>\n    <a name='intro'></a>\n    <p>\n      Text.\n    </p>\n  </div>\n</div>\n"
        );
    }
}
