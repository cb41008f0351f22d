// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{collections::BTreeMap, fmt::Write};

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatting {
    Emphasize,
    Strong,
    Italics,
    Teletype,
}

impl Formatting {
    pub fn from_command(name: &str) -> Option<Formatting> {
        match name {
            "emph" => Some(Formatting::Emphasize),
            "textbf" => Some(Formatting::Strong),
            "textit" => Some(Formatting::Italics),
            "texttt" => Some(Formatting::Teletype),
            _ => None,
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            Formatting::Emphasize => "emph",
            Formatting::Strong => "textbf",
            Formatting::Italics => "textit",
            Formatting::Teletype => "texttt",
        }
    }

    pub fn html_tag(&self) -> &'static str {
        match self {
            Formatting::Emphasize => "em",
            Formatting::Strong => "strong",
            Formatting::Italics => "i",
            Formatting::Teletype => "tt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPart {
    pub text: String,
    pub escaped: bool,
}

impl WordPart {
    pub fn new(text: impl Into<String>) -> Self {
        WordPart {
            text: text.into(),
            escaped: false,
        }
    }

    pub fn escaped(text: impl Into<String>) -> Self {
        WordPart {
            text: text.into(),
            escaped: true,
        }
    }
}

/// A sequence of word parts without whitespace between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub parts: Vec<Node>,
}

/// Words separated by single spaces. Empty words mark whitespace boundaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Words {
    pub words: Vec<Word>,
    pub formatting: Option<Formatting>,
}

impl Words {
    /// Words consisting of a single literal text part.
    pub fn text(text: impl Into<String>) -> Self {
        Words {
            words: vec![Word {
                parts: vec![Node::WordPart(WordPart::new(text))],
            }],
            formatting: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub lang: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub url: String,
    pub text: Option<Words>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub target: String,
    pub text: Option<Words>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeGraphics {
    pub url: String,
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    pub element: Words,
    pub right_to_left: bool,
    pub locale: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TikzPicture {
    pub body: String,
    pub args: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsTricksPicture {
    pub body: String,
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    pub fn as_str(&self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularAlign {
    pub align: Align,
    pub left_border: bool,
    pub right_border: bool,
}

/// A horizontal rule at a row boundary; column numbers are 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalLine {
    Full,
    Partial {
        from: Option<usize>,
        to: Option<usize>,
    },
}

impl HorizontalLine {
    /// Whether the line covers the 0-based column `column`.
    pub fn covers(&self, column: usize) -> bool {
        match *self {
            HorizontalLine::Full => true,
            HorizontalLine::Partial { from, to } => {
                from.map_or(true, |from| from <= column + 1) && to.map_or(true, |to| column + 1 <= to)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabular {
    pub alignment: Vec<TabularAlign>,
    pub rows: Vec<Vec<Words>>,
    /// Lines at row boundary `i`, i.e. above row `i`.
    pub lines: Vec<Vec<HorizontalLine>>,
    row_open: bool,
}

impl Tabular {
    pub fn new(alignment: Vec<TabularAlign>) -> Self {
        Tabular {
            alignment,
            ..Default::default()
        }
    }

    pub fn add_cell(&mut self, content: Words) {
        if !self.row_open {
            self.rows.push(Vec::new());
            self.row_open = true;
        }
        if let Some(row) = self.rows.last_mut() {
            row.push(content);
        }
    }

    pub fn next_row(&mut self) {
        self.row_open = false;
    }

    pub fn add_lines(&mut self, lines: Vec<HorizontalLine>) {
        self.lines.push(lines);
    }

    /// Drops a trailing row which is empty or holds a single blank cell.
    pub fn end_of_table_parsing(&mut self) {
        let drop_last = match self.rows.last().map(Vec::as_slice) {
            Some([]) => true,
            Some([cell]) => cell.is_whitespace_and_comments(),
            _ => false,
        };
        if drop_last {
            self.rows.pop();
        }
        self.row_open = false;
    }

    pub fn lines_at(&self, boundary: usize) -> &[HorizontalLine] {
        self.lines.get(boundary).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureGroup {
    /// `(title, content)` pairs.
    pub pictures: Vec<(Words, Words)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaList {
    pub formulae: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionLevel {
    Chapter,
    Section,
    SubSection,
    SubSubSection,
}

impl SectionLevel {
    pub fn from_command(name: &str) -> Option<SectionLevel> {
        match name {
            "chapter" => Some(SectionLevel::Chapter),
            "section" => Some(SectionLevel::Section),
            "subsection" => Some(SectionLevel::SubSection),
            "subsubsection" => Some(SectionLevel::SubSubSection),
            _ => None,
        }
    }

    /// Nesting depth used by the parser; deeper sections have larger values.
    pub fn depth(&self) -> i32 {
        match self {
            SectionLevel::Chapter => 2,
            SectionLevel::Section => 3,
            SectionLevel::SubSection => 4,
            SectionLevel::SubSubSection => 5,
        }
    }

    pub fn header_tag(&self) -> &'static str {
        match self {
            SectionLevel::Chapter => "h1",
            SectionLevel::Section => "h2",
            SectionLevel::SubSection => "h3",
            SectionLevel::SubSubSection => "h4",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            SectionLevel::Chapter => "chapter-block",
            SectionLevel::Section => "section-block",
            SectionLevel::SubSection => "subsection-block",
            SectionLevel::SubSubSection => "subsubsection-block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Blockquote,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ListKind::Unordered => "ul",
            ListKind::Ordered => "ol",
        }
    }
}

pub const THEOREM_ENVIRONMENTS: [&str; 11] = [
    "definition",
    "definitions",
    "lemma",
    "proposition",
    "theorem",
    "corollary",
    "example",
    "examples",
    "remark",
    "remarks",
    "proof",
];

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Plain,
    Special(SpecialKind),
    Enumeration(ListKind),
    Theorem {
        kind: String,
        optional_title: Option<Words>,
        qed: bool,
    },
    Titled {
        level: SectionLevel,
        title: Words,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub elements: Vec<Node>,
    pub labels: Vec<String>,
}

impl Default for Block {
    fn default() -> Self {
        Block::new(BlockKind::Plain)
    }
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Block {
            kind,
            elements: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// A theorem-like environment; proofs start out with a QED sign.
    pub fn theorem(kind: &str, optional_title: Option<Words>) -> Self {
        Block::new(BlockKind::Theorem {
            kind: kind.to_string(),
            optional_title,
            qed: kind == "proof",
        })
    }

    pub fn is_plain(&self) -> bool {
        self.kind == BlockKind::Plain
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    WordPart(WordPart),
    Comment(String),
    Words(Words),
    Formula(String),
    TikzPicture(TikzPicture),
    PsTricksPicture(PsTricksPicture),
    DisplayFormula(String),
    AlignFormula(String),
    Code(Code),
    CodeBlock(Code),
    Link(Link),
    Reference(Reference),
    IncludeGraphics(IncludeGraphics),
    Language(Language),
    Tabular(Tabular),
    PictureGroup(PictureGroup),
    FormulaList(FormulaList),
    Block(Block),
}

impl Node {
    /// Recombines the subtree as LaTeX source text.
    ///
    /// With `reescape`, escaped characters get their backslash back.
    pub fn recombine(&self, reescape: bool) -> String {
        match self {
            Node::WordPart(part) if part.escaped && reescape => format!("\\{}", part.text),
            Node::WordPart(part) => part.text.clone(),
            Node::Comment(text) => format!("%{}", text),
            Node::Words(words) => words.recombine(reescape),
            Node::Formula(body) => format!("${}$", body),
            Node::DisplayFormula(body) => format!("$${}$$", body),
            Node::AlignFormula(body) => format!("\\begin{{align*}}{}\\end{{align*}}", body),
            Node::TikzPicture(tikz) => {
                let args = tikz.args.as_ref().map(|a| format!("[{}]", a)).unwrap_or_default();
                format!("\\begin{{tikzpicture}}{}\n{}\n\\end{{tikzpicture}}", args, tikz.body)
            }
            Node::PsTricksPicture(pst) => {
                let args = pst.args.iter().map(|(k, v)| format!("{}={}", k, v)).join(",");
                format!("\\begin{{pstricks}}{{{}}}\n{}\n\\end{{pstricks}}", args, pst.body)
            }
            Node::Code(code) => format!("\\code{{{}}}{{{}}}", code.lang, code.body),
            Node::CodeBlock(code) => format!(
                "\\begin{{codelisting}}{{{}}}\n{}\n\\end{{codelisting}}",
                code.lang, code.body
            ),
            Node::Link(link) => match &link.text {
                None => format!("\\url{{{}}}", link.url),
                Some(text) => format!("\\href{{{}}}{{{}}}", link.url, text.recombine(reescape)),
            },
            Node::Reference(reference) => {
                let text = reference
                    .text
                    .as_ref()
                    .map(|t| format!("{{{}}}", t.recombine(reescape)))
                    .unwrap_or_default();
                format!("\\ref{{{}}}{}", reference.target, text)
            }
            Node::IncludeGraphics(gfx) => {
                let args = match gfx.args.is_empty() {
                    true => String::new(),
                    false => format!("[{}]", gfx.args.iter().map(|(k, v)| format!("{}={}", k, v)).join(",")),
                };
                format!("\\includegraphics{}{{{}}}", args, gfx.url)
            }
            Node::Language(language) => format!("{{{}}}", language.element.recombine(reescape)),
            Node::Tabular(tabular) => {
                let rows = tabular
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|cell| cell.recombine(reescape)).join(" & "))
                    .join("\\\\\n");
                format!("\\begin{{tabular}}\n{}\n\\end{{tabular}}", rows)
            }
            Node::PictureGroup(_) | Node::FormulaList(_) | Node::Block(_) => String::new(),
        }
    }

    pub fn is_whitespace_and_comments(&self) -> bool {
        match self {
            Node::WordPart(part) => part.text.is_empty(),
            Node::Comment(_) => true,
            Node::Words(words) => words.is_whitespace_and_comments(),
            _ => false,
        }
    }

    fn dump_into(&self, indent: usize, out: &mut String) {
        match self {
            Node::WordPart(part) => dump_line(out, indent, format!("{:?}", part.text)),
            Node::Comment(text) => dump_line(out, indent, format!("Comment({:?})", text)),
            Node::Words(words) => words.dump_into(indent, out),
            Node::Formula(body) => dump_line(out, indent, format!("Formula({:?})", body)),
            Node::TikzPicture(tikz) => {
                dump_line(out, indent, format!("TikzPicture({:?}; {:?})", tikz.args, tikz.body))
            }
            Node::PsTricksPicture(pst) => {
                dump_line(out, indent, format!("PSTricksPicture({:?}; {:?})", pst.args, pst.body))
            }
            Node::DisplayFormula(body) => dump_line(out, indent, format!("DisplayFormula({:?})", body)),
            Node::AlignFormula(body) => dump_line(out, indent, format!("AlignFormula({:?})", body)),
            Node::Code(code) => dump_line(out, indent, format!("Code({:?}, {:?})", code.lang, code.body)),
            Node::CodeBlock(code) => {
                dump_line(out, indent, format!("CodeBlock({:?}, {:?})", code.lang, code.body))
            }
            Node::Link(link) => dump_line(out, indent, format!("Link({:?})", link.url)),
            Node::Reference(reference) => dump_line(out, indent, format!("Reference({:?})", reference.target)),
            Node::IncludeGraphics(gfx) => dump_line(out, indent, format!("Image({:?}; {:?})", gfx.url, gfx.args)),
            Node::Language(language) => {
                let direction = if language.right_to_left { "rtl" } else { "ltr" };
                dump_line(out, indent, format!("Language({}[{}])", language.locale, direction));
                language.element.dump_into(indent + 1, out);
            }
            Node::Tabular(tabular) => {
                let shape = format!("Tabular({} columns, {} rows)", tabular.alignment.len(), tabular.rows.len());
                dump_line(out, indent, shape);
                for cell in tabular.rows.iter().flatten() {
                    cell.dump_into(indent + 1, out);
                }
            }
            Node::PictureGroup(group) => {
                dump_line(out, indent, "PictureGroup");
                for (title, content) in &group.pictures {
                    title.dump_into(indent + 1, out);
                    content.dump_into(indent + 2, out);
                }
            }
            Node::FormulaList(list) => dump_line(out, indent, format!("FormulaList({:?})", list.formulae)),
            Node::Block(block) => block.dump_into(indent, out),
        }
    }
}

fn dump_line(out: &mut String, indent: usize, text: impl std::fmt::Display) {
    let _ = writeln!(out, "{}{}", "  ".repeat(indent), text);
}

impl Word {
    pub fn recombine(&self, reescape: bool) -> String {
        if self.parts.is_empty() {
            return " ".to_string();
        }
        self.parts
            .iter()
            .map(|part| match part {
                Node::Words(words) => format!("{{{}}}", words.recombine(reescape)),
                part => part.recombine(reescape),
            })
            .collect()
    }

    pub fn is_whitespace_and_comments(&self) -> bool {
        self.parts.iter().all(Node::is_whitespace_and_comments)
    }

    fn dump_into(&self, indent: usize, out: &mut String) {
        dump_line(out, indent, "Word");
        for part in &self.parts {
            part.dump_into(indent + 1, out);
        }
    }
}

impl Words {
    pub fn recombine(&self, reescape: bool) -> String {
        let text = self.words.iter().map(|word| word.recombine(reescape)).join(" ");
        match self.formatting {
            Some(formatting) => format!("\\{}{{{}}}", formatting.command(), text),
            None => text,
        }
    }

    pub fn is_whitespace_and_comments(&self) -> bool {
        self.formatting.is_none() && self.words.iter().all(Word::is_whitespace_and_comments)
    }

    fn dump_into(&self, indent: usize, out: &mut String) {
        let formatting = self.formatting.map(|f| format!("<{}>", f.command())).unwrap_or_default();
        dump_line(out, indent, format!("Words{}", formatting));
        for word in &self.words {
            word.dump_into(indent + 1, out);
        }
    }
}

impl Block {
    fn dump_into(&self, indent: usize, out: &mut String) {
        let name = match &self.kind {
            BlockKind::Plain => "Block".to_string(),
            BlockKind::Special(kind) => format!("SpecialBlock({:?})", kind),
            BlockKind::Enumeration(kind) => format!("Enumeration({})", kind.tag()),
            BlockKind::Theorem { kind, qed, .. } => format!("TheoremEnvironment({}, qed={})", kind, qed),
            BlockKind::Titled { level, .. } => format!("{:?}", level),
        };
        let labels = match self.labels.is_empty() {
            true => String::new(),
            false => format!(" labels={:?}", self.labels),
        };
        dump_line(out, indent, format!("{}{}", name, labels));
        match &self.kind {
            BlockKind::Theorem { optional_title: Some(title), .. } | BlockKind::Titled { title, .. } => {
                title.dump_into(indent + 1, out);
            }
            _ => {}
        }
        for element in &self.elements {
            element.dump_into(indent + 1, out);
        }
    }

    /// Human-readable indented rendering of the tree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(0, &mut out);
        out
    }
}

/// Collapses blocks wrapping exactly one block.
///
/// A plain wrapper is replaced by its child, which inherits the wrapper's
/// labels; a plain child is merged into a non-plain wrapper. Enumerations keep
/// their item blocks, since every element of an enumeration is an item.
pub fn flatten(node: Node) -> Node {
    match node {
        Node::Block(block) => Node::Block(flatten_block(block)),
        other => other,
    }
}

pub fn flatten_block(mut block: Block) -> Block {
    loop {
        let is_enumeration = matches!(block.kind, BlockKind::Enumeration(_));
        if block.elements.len() == 1 && !is_enumeration {
            match block.elements.pop() {
                Some(Node::Block(mut child)) => {
                    if block.is_plain() {
                        child.labels.extend(block.labels);
                        block = child;
                    } else if child.is_plain() {
                        block.labels.extend(child.labels);
                        block.elements = child.elements;
                    } else {
                        block.elements.push(Node::Block(flatten_block(child)));
                        break;
                    }
                }
                Some(other) => {
                    block.elements.push(other);
                    break;
                }
                None => break,
            }
        } else {
            block.elements = block.elements.into_iter().map(flatten).collect();
            break;
        }
    }
    block
}
