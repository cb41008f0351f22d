// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{
    collections::BTreeMap,
    mem::discriminant,
    sync::LazyLock,
};

use regex_lite::Regex;

use super::{
    parsing_env::{replacement_for, CommandInfo, ParsingEnvironment},
    tokenizer::{Token, TokenStream},
    tree::{
        flatten_block, Align, Block, BlockKind, Code, Formatting, FormulaList, HorizontalLine,
        IncludeGraphics, Language, Link, ListKind, Node, PictureGroup, PsTricksPicture, Reference,
        SectionLevel, SpecialKind, Tabular, TabularAlign, TikzPicture, Word, WordPart, Words,
        THEOREM_ENVIRONMENTS,
    },
    ParseError,
};

/// Block level of plain text; every sectioning command is shallower.
const TEXT_LEVEL: i32 = 10;
const EVERYTHING_LEVEL: i32 = -1;

static ARGUMENT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").unwrap());

/// Parses `input` into a flattened document tree.
pub fn parse(input: &str, env: &ParsingEnvironment, filename: Option<&str>) -> Result<Block, ParseError> {
    let tokens = TokenStream::new(input).map_err(|e| e.with_file(filename))?;
    let mut parser = Parser { tokens, env, filename };
    let mut root = Block::default();
    let rest = parser.parse_block(&mut root, EVERYTHING_LEVEL, TEXT_LEVEL, false)?;
    parser.expect_no_command(rest)?;
    Ok(flatten_block(root))
}

#[derive(Debug, Clone)]
enum ParsedCommand {
    Known {
        name: String,
        environment: Option<String>,
        /// Positional arguments first, then the `[...]` ones.
        args: Vec<Option<Words>>,
    },
    Unknown {
        name: String,
        environment: Option<String>,
    },
}

impl ParsedCommand {
    fn name(&self) -> &str {
        match self {
            ParsedCommand::Known { name, .. } | ParsedCommand::Unknown { name, .. } => name,
        }
    }

    fn environment(&self) -> Option<&str> {
        match self {
            ParsedCommand::Known { environment, .. } | ParsedCommand::Unknown { environment, .. } => {
                environment.as_deref()
            }
        }
    }

    fn is_command(&self, name: &str) -> bool {
        self.environment().is_none() && self.name() == name
    }

    fn is_end_of(&self, environment: &str) -> bool {
        self.name() == "end" && self.environment() == Some(environment)
    }

    fn display_name(&self) -> String {
        match self.environment() {
            Some(environment) => format!("\\{}{{{}}}", self.name(), environment),
            None => format!("\\{}", self.name()),
        }
    }

    fn into_args(self) -> Vec<Option<Words>> {
        match self {
            ParsedCommand::Known { args, .. } => args,
            ParsedCommand::Unknown { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WordsMode {
    math: bool,
    accept_unknown: bool,
    table: bool,
    url: bool,
}

enum FormulaEnd<'e> {
    Token(Token),
    Command(&'e str),
    Environment(&'e str),
}

/// Pending content of the block being parsed, from the innermost word outwards.
#[derive(Default)]
struct Pending {
    block: Option<Block>,
    words: Option<Words>,
    word: Option<Word>,
}

impl Pending {
    fn flush_word(&mut self) {
        if let Some(word) = self.word.take() {
            self.words.get_or_insert_with(Words::default).words.push(word);
        }
    }

    fn flush_words(&mut self) {
        self.flush_word();
        if let Some(words) = self.words.take() {
            self.block.get_or_insert_with(Block::default).elements.push(Node::Words(words));
        }
    }

    fn flush_block(&mut self, dest: &mut Block) {
        self.flush_words();
        if let Some(block) = self.block.take() {
            dest.elements.push(Node::Block(block));
        }
    }

    fn add_to_word(&mut self, part: Node) {
        self.word.get_or_insert_with(Word::default).parts.push(part);
    }

    fn add_to_block(&mut self, element: Node) {
        self.flush_words();
        self.block.get_or_insert_with(Block::default).elements.push(element);
    }
}

fn postprocess_text(text: &str) -> String {
    [
        ("<<", "\u{00AB}"),
        (">>", "\u{00BB}"),
        ("---", "\u{2014}"),
        ("--", "\u{2013}"),
        ("``", "\u{201C}"),
        ("''", "\u{201D}"),
    ]
    .iter()
    .fold(text.to_string(), |text, (from, to)| text.replace(from, to))
}

fn describe(token: Option<&Token>) -> String {
    token.map_or_else(|| "end of input".to_string(), ToString::to_string)
}

fn formatted(args: Vec<Option<Words>>, formatting: Formatting) -> Node {
    let mut words = args.into_iter().next().flatten().unwrap_or_default();
    words.formatting = Some(formatting);
    Node::Words(words)
}

struct Parser<'a> {
    tokens: TokenStream<'a>,
    env: &'a ParsingEnvironment,
    filename: Option<&'a str>,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> ParseError {
        let position = self.tokens.get_position(self.tokens.current_begin());
        ParseError::new(self.filename, position, message)
    }

    fn skip(&mut self) {
        self.tokens.skip_current(1);
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        let found = self.tokens.current();
        if found.is_some_and(|t| discriminant(t) == discriminant(expected)) {
            self.skip();
            return Ok(());
        }
        Err(self.error(format!("Expected {}, but found {}!", expected, describe(found))))
    }

    fn expect_text(&mut self) -> Result<String, ParseError> {
        match self.tokens.current().cloned() {
            Some(Token::Text(text)) => {
                self.skip();
                Ok(text)
            }
            found => Err(self.error(format!("Expected text, but found {}!", describe(found.as_ref())))),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.tokens.current().is_some_and(Token::is_whitespace_or_comment) {
            self.skip();
        }
    }

    fn skip_comments(&mut self) {
        while matches!(self.tokens.current(), Some(Token::Comment(_))) {
            self.skip();
        }
    }

    fn argument<'c>(&self, args: &'c [Option<Words>], index: usize, command: &str) -> Result<&'c Words, ParseError> {
        args.get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.error(format!("Missing argument {} of \\{}!", index + 1, command)))
    }

    fn expect_no_command(&self, command: Option<ParsedCommand>) -> Result<(), ParseError> {
        match command {
            None => Ok(()),
            Some(command) => Err(self.error(format!("Unexpected {} in block!", command.display_name()))),
        }
    }

    /// Checks that a nested block was closed by `\end{environment}`.
    fn expect_end_of(&self, environment: &str, command: Option<ParsedCommand>) -> Result<(), ParseError> {
        match command {
            None => Err(self.error(format!("Unexpected end of '{}' environment!", environment))),
            Some(command) if command.is_end_of(environment) => Ok(()),
            Some(command) if command.name() == "end" => Err(self.error(format!(
                "\\begin{{{}}} paired with {}!",
                environment,
                command.display_name()
            ))),
            other => self.expect_no_command(other),
        }
    }

    fn parse_command(&mut self, accept_unknown: bool, math_mode: bool) -> Result<ParsedCommand, ParseError> {
        let name = match self.tokens.current() {
            Some(Token::Command(name)) => name.clone(),
            found => return Err(self.error(format!("Expected command, but found {}!", describe(found)))),
        };
        self.skip();
        let registry = self.env;

        if name == "begin" || name == "end" {
            self.skip_whitespace_and_comments();
            self.expect(&Token::CurlyBracketOpen)?;
            let environment = self.expect_text()?;
            self.expect(&Token::CurlyBracketClose)?;
            let Some(info) = registry.environment(&environment) else {
                if accept_unknown {
                    self.skip_whitespace_and_comments();
                    return Ok(ParsedCommand::Unknown {
                        name,
                        environment: Some(environment),
                    });
                }
                return Err(self.error(format!("Unknown environment '{}'!", environment)));
            };
            let info = match name == "end" {
                true => info.closing(),
                false => info.clone(),
            };
            return self.parse_command_impl(name, Some(environment), &info, math_mode);
        }

        let Some(info) = registry.command(&name) else {
            if accept_unknown {
                self.skip_whitespace_and_comments();
                return Ok(ParsedCommand::Unknown { name, environment: None });
            }
            return Err(self.error(format!("Unknown command '{}'!", name)));
        };
        self.parse_command_impl(name, None, info, math_mode)
    }

    fn parse_command_impl(
        &mut self,
        name: String,
        environment: Option<String>,
        info: &CommandInfo,
        math_mode: bool,
    ) -> Result<ParsedCommand, ParseError> {
        let defaults = &info.default_arguments;
        let positional = info.argument_count.saturating_sub(defaults.len());
        let mode = |index: usize| WordsMode {
            math: math_mode,
            accept_unknown: info.accept_unknown_commands,
            table: false,
            url: info.url_mode.contains(&index),
        };

        let mut found = Vec::with_capacity(defaults.len());
        while found.len() < defaults.len() {
            let mut index = 0;
            while self.tokens.peek(index) == Some(&Token::Whitespace) {
                index += 1;
            }
            if self.tokens.peek(index) != Some(&Token::SquareBracketOpen) {
                break;
            }
            self.tokens.skip_current(index);
            self.expect(&Token::SquareBracketOpen)?;
            let (words, _) = self.parse_words(mode(positional + found.len()), Some(&Token::SquareBracketClose))?;
            self.expect(&Token::SquareBracketClose)?;
            found.push(Some(words));
        }
        found.extend(defaults[found.len()..].iter().cloned());

        let mut args = Vec::with_capacity(info.argument_count);
        while args.len() < positional {
            self.skip_whitespace_and_comments();
            self.expect(&Token::CurlyBracketOpen)?;
            let (words, _) = self.parse_words(mode(args.len()), Some(&Token::CurlyBracketClose))?;
            self.expect(&Token::CurlyBracketClose)?;
            args.push(Some(words));
        }

        match info.eat_trailing_whitespace {
            true => self.skip_whitespace_and_comments(),
            false => self.skip_comments(),
        }
        args.extend(found);
        Ok(ParsedCommand::Known { name, environment, args })
    }

    /// Reads words up to `delimiter` (not consumed). In table mode, also stops
    /// before `&` and `\\`, and reports whether `\end{tabular}` was consumed.
    fn parse_words(&mut self, mode: WordsMode, delimiter: Option<&Token>) -> Result<(Words, bool), ParseError> {
        let mut words = Words::default();
        let mut current: Option<Word> = None;
        let mut table_ended = false;
        let push = |current: &mut Option<Word>, part: Node| current.get_or_insert_with(Word::default).parts.push(part);

        while let Some(token) = self.tokens.current().cloned() {
            if delimiter == Some(&token) {
                break;
            }
            match token {
                Token::Whitespace => {
                    words.words.push(current.take().unwrap_or_default());
                    self.skip();
                }
                Token::NonbreakableWhitespace => {
                    push(&mut current, Node::WordPart(WordPart::new(" ")));
                    self.skip();
                }
                Token::Comment(text) => {
                    push(&mut current, Node::Comment(text));
                    self.skip();
                }
                Token::Text(text) => {
                    push(&mut current, Node::WordPart(WordPart::new(postprocess_text(&text))));
                    self.skip();
                }
                Token::EscapedText(text) => {
                    push(&mut current, Node::WordPart(WordPart::escaped(text)));
                    self.skip();
                }
                Token::Command(name) => {
                    if SectionLevel::from_command(&name).is_some() {
                        return Err(self.error("Cannot process level-changing command during words parsing!"));
                    }
                    match name.as_str() {
                        "(" => {
                            self.skip();
                            let formula = self.read_formula(FormulaEnd::Command(")"))?;
                            push(&mut current, Node::Formula(formula));
                        }
                        "[" => return Err(self.error("Display mode math not allowed during word parsing!")),
                        ")" | "]" => return Err(self.error("Unexpected end of math mode!")),
                        _ => {
                            let command = self.parse_command(mode.math || mode.accept_unknown, mode.math)?;
                            if mode.table && command.is_end_of("tabular") {
                                table_ended = true;
                                break;
                            }
                            let part = self.words_command(command, mode.math)?;
                            push(&mut current, part);
                        }
                    }
                }
                Token::InlineFormulaDelimiter => {
                    if mode.math {
                        return Err(self.error("Cannot start another formula inside a formula!"));
                    }
                    self.skip();
                    let formula = self.read_formula(FormulaEnd::Token(Token::InlineFormulaDelimiter))?;
                    push(&mut current, Node::Formula(formula));
                }
                Token::DisplayFormulaDelimiter => {
                    return Err(self.error("Cannot process display-style formulae during words parsing!"));
                }
                Token::CurlyBracketOpen => {
                    self.skip();
                    let nested = WordsMode { table: false, ..mode };
                    let (inner, _) = self.parse_words(nested, Some(&Token::CurlyBracketClose))?;
                    self.expect(&Token::CurlyBracketClose)?;
                    push(&mut current, Node::Words(inner));
                }
                Token::CurlyBracketClose => {
                    return Err(self.error("Unexpected closing curly bracket during words parsing!"));
                }
                Token::SquareBracketOpen => {
                    push(&mut current, Node::WordPart(WordPart::new("[")));
                    self.skip();
                }
                Token::SquareBracketClose => {
                    push(&mut current, Node::WordPart(WordPart::new("]")));
                    self.skip();
                }
                Token::DoubleNewLine => {
                    return Err(self.error("Cannot process paragraph break during words parsing!"));
                }
                Token::ForcedLineBreak | Token::TableColumnDelimiter if mode.table => break,
                Token::ForcedLineBreak | Token::TableColumnDelimiter if mode.math => self.skip(),
                Token::TableColumnDelimiter if mode.url => {
                    push(&mut current, Node::WordPart(WordPart::escaped("&")));
                    self.skip();
                }
                other => return Err(self.error(format!("Cannot handle token {}!", other))),
            }
        }

        match current {
            Some(word) => words.words.push(word),
            None if words.words.last().is_some_and(|w| !w.parts.is_empty()) => words.words.push(Word::default()),
            None => {}
        }
        Ok((words, table_ended))
    }

    /// Turns a command met while reading words into a word part.
    fn words_command(&mut self, command: ParsedCommand, math_mode: bool) -> Result<Node, ParseError> {
        match command {
            ParsedCommand::Unknown { name, environment } => {
                let text = match environment {
                    Some(environment) => format!("\\{}{{{}}} ", name, environment),
                    None => format!("\\{} ", name),
                };
                Ok(Node::WordPart(WordPart::new(text)))
            }
            ParsedCommand::Known {
                name,
                environment: Some(environment),
                args,
            } => match (name.as_str(), environment.as_str()) {
                ("begin", "tikzpicture") => self.tikz_picture(args),
                ("begin", "pstricks") => self.pstricks_picture(args),
                ("end", _) => Err(self.error(format!("Unexpected end of environment '{}'!", environment))),
                _ => Err(self.error(format!("Environment '{}' not allowed during words parsing!", environment))),
            },
            ParsedCommand::Known {
                name,
                environment: None,
                args,
            } => {
                if let Some(formatting) = Formatting::from_command(&name) {
                    return Ok(formatted(args, formatting));
                }
                self.inline_command(&name, args, math_mode)?
                    .ok_or_else(|| self.error(format!("Command '{}' not allowed during words parsing!", name)))
            }
        }
    }

    /// Commands producing inline content, shared by words and blocks.
    fn inline_command(&mut self, name: &str, args: Vec<Option<Words>>, math_mode: bool) -> Result<Option<Node>, ParseError> {
        let node = match name {
            "code" => {
                let lang = self.argument(&args, 0, name)?.recombine(true);
                Node::Code(self.inline_code(lang)?)
            }
            "href" => Node::Link(Link {
                url: self.argument(&args, 0, name)?.recombine(false),
                text: args.get(1).cloned().flatten(),
            }),
            "url" => Node::Link(Link {
                url: self.argument(&args, 0, name)?.recombine(false),
                text: None,
            }),
            "symbol" => {
                let code = self.argument(&args, 0, name)?.recombine(true);
                self.symbol(&code)?
            }
            "ref" => Node::Reference(Reference {
                target: self.argument(&args, 0, name)?.recombine(true),
                text: args.get(1).cloned().flatten(),
            }),
            "includegraphics" => {
                if math_mode {
                    return Err(self.error("\\includegraphics not allowed in math mode!"));
                }
                let url = self.argument(&args, 0, name)?.recombine(true);
                let options = match args.get(1).and_then(Option::as_ref) {
                    Some(options) => self.key_values(&options.recombine(true))?,
                    None => BTreeMap::new(),
                };
                Node::IncludeGraphics(IncludeGraphics { url, args: options })
            }
            "foreignlanguage" => {
                let language = self.argument(&args, 0, name)?.recombine(true);
                let element = self.argument(&args, 1, name)?.clone();
                Node::Language(self.language(element, &language)?)
            }
            other => match replacement_for(other) {
                Some(replacement) => Node::WordPart(WordPart::new(replacement)),
                None => return Ok(None),
            },
        };
        Ok(Some(node))
    }

    fn symbol(&self, code: &str) -> Result<Node, ParseError> {
        code.trim()
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(|c| Node::WordPart(WordPart::new(c.to_string())))
            .ok_or_else(|| self.error(format!("Cannot interpret symbol '{}'!", code)))
    }

    fn language(&self, element: Words, name: &str) -> Result<Language, ParseError> {
        let info = self
            .env
            .language(name)
            .ok_or_else(|| self.error(format!("Unknown language '{}'!", name)))?;
        Ok(Language {
            element,
            right_to_left: info.right_to_left,
            locale: info.locale.to_string(),
            inline: true,
        })
    }

    /// Splits `key=value` pairs separated by commas.
    fn key_values(&self, text: &str) -> Result<BTreeMap<String, String>, ParseError> {
        let mut result = BTreeMap::new();
        for entry in ARGUMENT_SEPARATOR.split(text.trim()) {
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some((key, value)) if !value.contains('=') => {
                    result.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => return Err(self.error(format!("Cannot interpret argument '{}'!", entry))),
            }
        }
        Ok(result)
    }

    /// Reads the verbatim body of `\code`, delimited by braces, brackets or
    /// any character (`(` closes with `)`).
    fn inline_code(&mut self, lang: String) -> Result<Code, ParseError> {
        let (start, end_token, end_char) = match (self.tokens.current(), self.tokens.current_indices()) {
            (Some(Token::CurlyBracketOpen), Some((_, end))) => (end, Some(Token::CurlyBracketClose), None),
            (Some(Token::SquareBracketOpen), Some((_, end))) => (end, Some(Token::SquareBracketClose), None),
            (Some(Token::Text(text)), Some((begin, _))) => {
                let Some(first) = text.chars().next() else {
                    return Err(self.error("Invalid empty delimiter for inline code!"));
                };
                let end_char = if first == '(' { ')' } else { first };
                (begin + first.len_utf8(), None, Some(end_char))
            }
            (found, _) => return Err(self.error(format!("Invalid delimiter {} for inline code!", describe(found)))),
        };

        let mut skip_first = end_char.is_some();
        let mut end = None;
        while let (Some(token), Some((begin, _))) = (self.tokens.current().cloned(), self.tokens.current_indices()) {
            if end_token.as_ref() == Some(&token) {
                end = Some(begin);
                self.skip();
                break;
            }
            if let (Some(c), Token::Text(value) | Token::EscapedText(value)) = (end_char, &token) {
                let from = match skip_first {
                    true => value.chars().next().map_or(0, char::len_utf8),
                    false => 0,
                };
                skip_first = false;
                if let Some(index) = value[from..].find(c).map(|i| i + from) {
                    let escaped = matches!(token, Token::EscapedText(_));
                    end = Some(begin + index + usize::from(escaped));
                    let rest = &value[index + c.len_utf8()..];
                    match rest.is_empty() {
                        true => self.skip(),
                        false => self.tokens.set_value(0, rest.to_string()),
                    }
                    break;
                }
            }
            self.skip();
        }

        let Some(end) = end else {
            return Err(self.error("Unterminated inline code!"));
        };
        Ok(Code {
            lang,
            body: self.tokens.get_substring(start, end).to_string(),
        })
    }

    /// Reads a formula up to its end marker and returns the trimmed source slice.
    fn read_formula(&mut self, end: FormulaEnd<'_>) -> Result<String, ParseError> {
        let start = self.tokens.current_begin();
        while let Some(token) = self.tokens.current().cloned() {
            let stop = self.tokens.current_begin();
            match (&end, &token) {
                (FormulaEnd::Token(delimiter), token) if token == delimiter => {
                    self.skip();
                    return Ok(self.tokens.get_substring(start, stop).trim().to_string());
                }
                (FormulaEnd::Command(name), Token::Command(value)) if value == name => {
                    self.skip();
                    return Ok(self.tokens.get_substring(start, stop).trim().to_string());
                }
                (FormulaEnd::Environment(environment), Token::Command(value)) if value == "end" => {
                    let command = self.parse_command(true, true)?;
                    if command.is_end_of(environment) {
                        return Ok(self.tokens.get_substring(start, stop).trim().to_string());
                    }
                }
                (_, Token::CurlyBracketOpen) => {
                    self.skip();
                    let mode = WordsMode {
                        math: true,
                        ..Default::default()
                    };
                    self.parse_words(mode, Some(&Token::CurlyBracketClose))?;
                    self.expect(&Token::CurlyBracketClose)?;
                }
                (_, Token::CurlyBracketClose) => {
                    return Err(self.error("Unexpected closing curly bracket during formula!"));
                }
                _ => self.skip(),
            }
        }
        Err(self.error(match end {
            FormulaEnd::Token(token) => format!("Unterminated formula, expected {}!", token),
            FormulaEnd::Command(name) => format!("Unterminated formula, expected \\{}!", name),
            FormulaEnd::Environment(environment) => format!("Unexpected end of '{}' environment!", environment),
        }))
    }

    /// Skips to the matching `\end{environment}` and returns the raw text before it.
    fn environment_body(&mut self, environment: &str) -> Result<&'a str, ParseError> {
        let start = self.tokens.current_begin();
        while self.tokens.has_current() {
            let closes = self.tokens.current().is_some_and(|t| t.is_command("end"))
                && self.tokens.peek(1) == Some(&Token::CurlyBracketOpen)
                && self.tokens.peek(2).is_some_and(|t| t.is_text(environment))
                && self.tokens.peek(3) == Some(&Token::CurlyBracketClose);
            if closes {
                let stop = self.tokens.current_begin();
                self.tokens.skip_current(4);
                return Ok(self.tokens.get_substring(start, stop));
            }
            self.skip();
        }
        Err(self.error(format!("Unexpected end of '{}' environment!", environment)))
    }

    fn tikz_picture(&mut self, args: Vec<Option<Words>>) -> Result<Node, ParseError> {
        let body = self.environment_body("tikzpicture")?.trim().to_string();
        let args = args
            .into_iter()
            .next()
            .flatten()
            .map(|options| options.recombine(true).trim().to_string());
        Ok(Node::TikzPicture(TikzPicture { body, args }))
    }

    fn pstricks_picture(&mut self, args: Vec<Option<Words>>) -> Result<Node, ParseError> {
        let options = self.argument(&args, 0, "pstricks")?.recombine(true);
        let body = self.environment_body("pstricks")?.trim().to_string();
        let args = self.key_values(&options)?;
        Ok(Node::PsTricksPicture(PsTricksPicture { body, args }))
    }

    fn picture_group(&mut self) -> Result<PictureGroup, ParseError> {
        let mut group = PictureGroup::default();
        loop {
            match self.tokens.current().cloned() {
                Some(Token::Command(name)) if name == "end" => {
                    let command = self.parse_command(false, false)?;
                    if !command.is_end_of("picturegroup") {
                        return Err(self.error(format!("Unexpected {} in picture group!", command.display_name())));
                    }
                    return Ok(group);
                }
                Some(Token::Command(name)) if name == "picture" => {
                    self.skip();
                    let args = self.parse_command_impl(name, None, &CommandInfo::new(2, true), false)?.into_args();
                    let title = self.argument(&args, 0, "picture")?.clone();
                    let content = self.argument(&args, 1, "picture")?.clone();
                    group.pictures.push((title, content));
                }
                Some(Token::Command(name)) => {
                    return Err(self.error(format!("Unexpected \\{} in picture group!", name)));
                }
                Some(token) if token.is_whitespace_or_comment() => self.skip(),
                Some(token) => return Err(self.error(format!("Unexpected token {} in picture group!", token))),
                None => return Err(self.error("Unexpected end of 'picturegroup' environment!")),
            }
        }
    }

    /// Collects `\formula{...}` bodies verbatim.
    fn formula_list(&mut self) -> Result<FormulaList, ParseError> {
        let mut list = FormulaList::default();
        loop {
            match self.tokens.current().cloned() {
                Some(Token::Command(name)) if name == "end" => {
                    let command = self.parse_command(false, false)?;
                    if !command.is_end_of("formulalist") {
                        return Err(self.error(format!("Unexpected {} in formula list!", command.display_name())));
                    }
                    return Ok(list);
                }
                Some(Token::Command(name)) if name == "formula" => {
                    self.skip();
                    self.skip_whitespace_and_comments();
                    self.expect(&Token::CurlyBracketOpen)?;
                    let start = self.tokens.current_begin();
                    let mode = WordsMode {
                        math: true,
                        ..Default::default()
                    };
                    self.parse_words(mode, Some(&Token::CurlyBracketClose))?;
                    let stop = self.tokens.current_begin();
                    self.expect(&Token::CurlyBracketClose)?;
                    list.formulae.push(self.tokens.get_substring(start, stop).trim().to_string());
                    self.skip_whitespace_and_comments();
                }
                Some(Token::Command(name)) => {
                    return Err(self.error(format!("Unexpected \\{} in formula list!", name)));
                }
                Some(token) if token.is_whitespace_or_comment() => self.skip(),
                Some(token) => return Err(self.error(format!("Unexpected token {} in formula list!", token))),
                None => return Err(self.error("Unexpected end of 'formulalist' environment!")),
            }
        }
    }

    fn tabular_alignment(&self, spec: &str) -> Result<Vec<TabularAlign>, ParseError> {
        let mut result: Vec<TabularAlign> = Vec::new();
        let mut left_border = false;
        for c in spec.chars() {
            let align = match c {
                '|' => {
                    match result.last_mut() {
                        Some(last) => last.right_border = true,
                        None => left_border = true,
                    }
                    continue;
                }
                'l' => Align::Left,
                'c' => Align::Center,
                'r' => Align::Right,
                ' ' => continue,
                other => return Err(self.error(format!("Unknown tabular alignment character '{}'!", other))),
            };
            result.push(TabularAlign {
                align,
                left_border,
                right_border: false,
            });
            left_border = false;
        }
        Ok(result)
    }

    fn tabular_lines(&mut self) -> Result<Vec<HorizontalLine>, ParseError> {
        let mut lines = Vec::new();
        loop {
            match self.tokens.current().cloned() {
                Some(Token::Command(name)) if name == "hline" => {
                    self.skip();
                    lines.push(HorizontalLine::Full);
                }
                Some(Token::Command(name)) if name == "cline" => {
                    let args = self.parse_command(false, false)?.into_args();
                    let range = self.argument(&args, 0, "cline")?.recombine(true);
                    lines.push(self.column_range(&range)?);
                }
                Some(token) if token.is_whitespace_or_comment() => self.skip(),
                _ => return Ok(lines),
            }
        }
    }

    fn column_range(&self, range: &str) -> Result<HorizontalLine, ParseError> {
        let invalid = || self.error(format!("Cannot interpret '{}' as column range!", range));
        let column = |s: &str| match s.trim() {
            "" => Ok(None),
            s => s.parse::<usize>().map(Some).map_err(|_| invalid()),
        };
        match range.split_once('-') {
            Some((from, to)) if !to.contains('-') => Ok(match (column(from)?, column(to)?) {
                (None, None) => HorizontalLine::Full,
                (from, to) => HorizontalLine::Partial { from, to },
            }),
            _ => Err(invalid()),
        }
    }

    fn tabular(&mut self, args: Vec<Option<Words>>) -> Result<Tabular, ParseError> {
        let alignment = self.argument(&args, 0, "tabular")?.recombine(true);
        let mut tabular = Tabular::new(self.tabular_alignment(&alignment)?);
        let lines = self.tabular_lines()?;
        tabular.add_lines(lines);

        let mode = WordsMode {
            table: true,
            ..Default::default()
        };
        loop {
            let (cell, table_ended) = self.parse_words(mode, None)?;
            tabular.add_cell(cell);
            if table_ended {
                break;
            }
            match self.tokens.current() {
                Some(Token::ForcedLineBreak) => {
                    tabular.next_row();
                    self.skip();
                    let lines = self.tabular_lines()?;
                    tabular.add_lines(lines);
                }
                Some(Token::TableColumnDelimiter) => self.skip(),
                None => return Err(self.error("Unexpected end of 'tabular' environment!")),
                Some(token) => return Err(self.error(format!("Unexpected {} in tabular environment!", token))),
            }
        }
        tabular.end_of_table_parsing();
        Ok(tabular)
    }

    /// Parses block content into `dest` until the input ends, a section at
    /// `block_level` or shallower starts, or an `\end` or `\item` is met.
    /// The latter two are handed back to the caller.
    fn parse_block(
        &mut self,
        dest: &mut Block,
        block_level: i32,
        mut current_level: i32,
        inside_env: bool,
    ) -> Result<Option<ParsedCommand>, ParseError> {
        let mut pending = Pending::default();

        while let Some(token) = self.tokens.current().cloned() {
            match token {
                Token::Whitespace => {
                    pending.flush_word();
                    self.skip();
                }
                Token::NonbreakableWhitespace => {
                    pending.add_to_word(Node::WordPart(WordPart::new(" ")));
                    self.skip();
                }
                Token::Comment(text) => {
                    pending.add_to_word(Node::Comment(text));
                    self.skip();
                }
                Token::Text(text) => {
                    pending.add_to_word(Node::WordPart(WordPart::new(postprocess_text(&text))));
                    self.skip();
                }
                Token::EscapedText(text) => {
                    pending.add_to_word(Node::WordPart(WordPart::escaped(text)));
                    self.skip();
                }
                Token::Command(name) => {
                    if let Some(level) = SectionLevel::from_command(&name) {
                        if inside_env {
                            return Err(self.error("Cannot start new block level inside an environment!"));
                        }
                        let depth = level.depth();
                        if depth <= block_level {
                            break;
                        }
                        let (section, rest) = self.section(level)?;
                        if depth > current_level {
                            pending.flush_words();
                            pending.block.get_or_insert_with(Block::default).elements.push(Node::Block(section));
                        } else {
                            pending.flush_block(dest);
                            dest.elements.push(Node::Block(section));
                            current_level = depth;
                        }
                        // A section inside an environment ends with it.
                        if rest.is_some() {
                            pending.flush_block(dest);
                            return Ok(rest);
                        }
                        continue;
                    }
                    match name.as_str() {
                        "(" => {
                            self.skip();
                            let formula = self.read_formula(FormulaEnd::Command(")"))?;
                            pending.add_to_word(Node::Formula(formula));
                        }
                        "[" => {
                            self.skip();
                            let formula = self.read_formula(FormulaEnd::Command("]"))?;
                            pending.add_to_block(Node::DisplayFormula(formula));
                        }
                        ")" | "]" => return Err(self.error("Unexpected end of math mode!")),
                        _ => {
                            let command = self.parse_command(false, false)?;
                            if let Some(command) = self.block_command(command, dest, &mut pending, current_level)? {
                                pending.flush_block(dest);
                                return Ok(Some(command));
                            }
                        }
                    }
                }
                Token::InlineFormulaDelimiter => {
                    self.skip();
                    let formula = self.read_formula(FormulaEnd::Token(Token::InlineFormulaDelimiter))?;
                    pending.add_to_word(Node::Formula(formula));
                }
                Token::DisplayFormulaDelimiter => {
                    self.skip();
                    let formula = self.read_formula(FormulaEnd::Token(Token::DisplayFormulaDelimiter))?;
                    pending.add_to_block(Node::DisplayFormula(formula));
                }
                Token::CurlyBracketOpen => {
                    self.skip();
                    let (words, _) = self.parse_words(WordsMode::default(), Some(&Token::CurlyBracketClose))?;
                    self.expect(&Token::CurlyBracketClose)?;
                    pending.add_to_word(Node::Words(words));
                }
                Token::CurlyBracketClose => return Err(self.error("Unexpected closing curly bracket!")),
                Token::SquareBracketOpen => {
                    pending.add_to_word(Node::WordPart(WordPart::new("[")));
                    self.skip();
                }
                Token::SquareBracketClose => {
                    pending.add_to_word(Node::WordPart(WordPart::new("]")));
                    self.skip();
                }
                Token::DoubleNewLine => {
                    pending.flush_words();
                    self.skip();
                }
                other => return Err(self.error(format!("Cannot handle token {}!", other))),
            }
        }

        pending.flush_block(dest);
        Ok(None)
    }

    /// Parses a section and its body. The command that ended the body, if
    /// any, is handed back.
    fn section(&mut self, level: SectionLevel) -> Result<(Block, Option<ParsedCommand>), ParseError> {
        let args = self.parse_command(false, false)?.into_args();
        let title = self.argument(&args, 0, "section")?.clone();
        let depth = level.depth();
        let mut section = Block::new(BlockKind::Titled { level, title });
        let rest = self.parse_block(&mut section, depth, depth, false)?;
        Ok((section, rest))
    }

    /// Handles a command in block context. Returns the command when it ends
    /// the current block (`\end` or `\item`).
    fn block_command(
        &mut self,
        command: ParsedCommand,
        dest: &mut Block,
        pending: &mut Pending,
        current_level: i32,
    ) -> Result<Option<ParsedCommand>, ParseError> {
        let (name, environment, args) = match command {
            ParsedCommand::Known { name, environment, args } => (name, environment, args),
            unknown => return Err(self.error(format!("Unsupported command {}!", unknown.display_name()))),
        };
        if let Some(formatting) = Formatting::from_command(&name) {
            pending.add_to_word(formatted(args, formatting));
            return Ok(None);
        }

        match environment {
            Some(environment) if name == "end" => Ok(Some(ParsedCommand::Known {
                name,
                environment: Some(environment),
                args,
            })),
            Some(environment) => {
                self.begin_environment(&environment, args, dest, pending, current_level)?;
                Ok(None)
            }
            None => match name.as_str() {
                "newpar" => {
                    pending.flush_words();
                    Ok(None)
                }
                "item" => Ok(Some(ParsedCommand::Known {
                    name,
                    environment: None,
                    args,
                })),
                "noindent" | "setlength" => Ok(None),
                "qed" => {
                    if let BlockKind::Theorem { qed, .. } = &mut dest.kind {
                        *qed = true;
                    }
                    Ok(None)
                }
                "label" => {
                    let label = self.argument(&args, 0, "label")?.recombine(true);
                    dest.labels.push(label);
                    Ok(None)
                }
                _ => match self.inline_command(&name, args, false)? {
                    Some(part) => {
                        pending.add_to_word(part);
                        Ok(None)
                    }
                    None => Err(self.error(format!("Unsupported command '{}'!", name))),
                },
            },
        }
    }

    fn begin_environment(
        &mut self,
        environment: &str,
        args: Vec<Option<Words>>,
        dest: &mut Block,
        pending: &mut Pending,
        current_level: i32,
    ) -> Result<(), ParseError> {
        match environment {
            env if THEOREM_ENVIRONMENTS.contains(&env) => {
                let title = args.into_iter().next().flatten();
                let mut theorem = Block::theorem(env, title);
                let rest = self.parse_block(&mut theorem, current_level, current_level, false)?;
                self.expect_end_of(env, rest)?;
                pending.add_to_block(Node::Block(theorem));
            }
            "blockquote" | "center" => {
                let kind = match environment {
                    "blockquote" => SpecialKind::Blockquote,
                    _ => SpecialKind::Center,
                };
                let mut special = Block::new(BlockKind::Special(kind));
                let rest = self.parse_block(&mut special, current_level, current_level, false)?;
                self.expect_end_of(environment, rest)?;
                pending.add_to_block(Node::Block(special));
            }
            "align" | "align*" => {
                let formula = self.read_formula(FormulaEnd::Environment(environment))?;
                pending.add_to_block(Node::AlignFormula(formula));
            }
            "itemize" | "enumerate" => {
                let kind = match environment {
                    "itemize" => ListKind::Unordered,
                    _ => ListKind::Ordered,
                };
                let list = self.list(environment, kind)?;
                pending.add_to_block(Node::Block(list));
            }
            "codelisting" => {
                pending.flush_block(dest);
                let lang = self.argument(&args, 0, "codelisting")?.recombine(true);
                let body = self.environment_body("codelisting")?;
                let body = body.trim_matches(' ').trim_matches('\n').to_string();
                dest.elements.push(Node::CodeBlock(Code { lang, body }));
            }
            "tikzpicture" => {
                let picture = self.tikz_picture(args)?;
                pending.add_to_word(picture);
            }
            "pstricks" => {
                let picture = self.pstricks_picture(args)?;
                pending.add_to_word(picture);
            }
            "picturegroup" => {
                let group = self.picture_group()?;
                pending.add_to_block(Node::PictureGroup(group));
            }
            "formulalist" => {
                let list = self.formula_list()?;
                pending.add_to_block(Node::FormulaList(list));
            }
            "tabular" => {
                let tabular = self.tabular(args)?;
                pending.add_to_block(Node::Tabular(tabular));
            }
            _ => return Err(self.error(format!("Unknown environment start \\begin{{{}}}!", environment))),
        }
        Ok(())
    }

    fn list(&mut self, environment: &str, kind: ListKind) -> Result<Block, ParseError> {
        let mut list = Block::new(BlockKind::Enumeration(kind));
        let first = self.parse_command(false, false)?;
        if !first.is_command("item") {
            return Err(self.error(format!("Expected \\item, but got {}!", first.display_name())));
        }
        loop {
            let mut item = Block::default();
            let rest = self.parse_block(&mut item, TEXT_LEVEL, TEXT_LEVEL, true)?;
            match (item.elements.len(), item.labels.is_empty()) {
                (1, true) => list.elements.extend(item.elements),
                _ => list.elements.push(Node::Block(item)),
            }
            match rest {
                Some(command) if command.is_command("item") => continue,
                rest => {
                    self.expect_end_of(environment, rest)?;
                    return Ok(list);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(input: &str) -> Block {
        parse(input, &ParsingEnvironment::default(), None).unwrap()
    }

    fn parse_err(input: &str) -> ParseError {
        parse(input, &ParsingEnvironment::default(), None).unwrap_err()
    }

    fn word_texts(words: &Words) -> Vec<String> {
        words.words.iter().map(|w| w.recombine(true)).collect()
    }

    fn as_words(node: &Node) -> &Words {
        match node {
            Node::Words(words) => words,
            other => panic!("expected words, got {:?}", other),
        }
    }

    fn as_block(node: &Node) -> &Block {
        match node {
            Node::Block(block) => block,
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_paragraphs() {
        let root = parse_str("Hello world.\n\nSecond  para.");
        assert!(root.is_plain());
        assert_eq!(root.elements.len(), 2);
        assert_eq!(word_texts(as_words(&root.elements[0])), vec!["Hello", "world."]);
        assert_eq!(word_texts(as_words(&root.elements[1])), vec!["Second", "para."]);
    }

    #[test]
    fn test_typographic_replacements() {
        let root = parse_str("``Hi'' -- there --- <<x>>");
        assert_eq!(
            word_texts(as_words(&root.elements[0])),
            vec!["\u{201C}Hi\u{201D}", "\u{2013}", "there", "\u{2014}", "\u{00AB}x\u{00BB}"]
        );
    }

    #[test]
    fn test_inline_formula_is_verbatim() {
        let root = parse_str("A $\\frac{a}{b}$ and \\(x^2\\).");
        let words = as_words(&root.elements[0]);
        assert_eq!(words.words[1].parts, vec![Node::Formula("\\frac{a}{b}".into())]);
        assert_eq!(
            words.words[3].parts,
            vec![Node::Formula("x^2".into()), Node::WordPart(WordPart::new("."))]
        );
    }

    #[test]
    fn test_display_and_align() {
        let root = parse_str("$$ a+b $$\n\\[ c \\]\n\\begin{align*} x &= 1 \\\\ y &= 2 \\end{align*}");
        assert_eq!(
            root.elements,
            vec![
                Node::DisplayFormula("a+b".into()),
                Node::DisplayFormula("c".into()),
                Node::AlignFormula("x &= 1 \\\\ y &= 2".into()),
            ]
        );
    }

    #[test]
    fn test_unknown_commands_in_math() {
        let root = parse_str("$\\alpha + \\mathbb{R}_{\\beta}$");
        let words = as_words(&root.elements[0]);
        assert_eq!(words.words[0].parts, vec![Node::Formula("\\alpha + \\mathbb{R}_{\\beta}".into())]);
    }

    #[test]
    fn test_sections() {
        let root = parse_str("\\section{A}\nText a\n\\subsection{B}\nText b\n\\section{C}\nText c");
        assert_eq!(root.elements.len(), 2);

        let a = as_block(&root.elements[0]);
        let BlockKind::Titled { level, title } = &a.kind else { panic!("not a section") };
        assert_eq!(*level, SectionLevel::Section);
        assert_eq!(title.recombine(true), "A");
        assert_eq!(a.elements.len(), 2);
        assert_eq!(word_texts(as_words(&a.elements[0])), vec!["Text", "a"]);

        let b = as_block(&a.elements[1]);
        assert!(matches!(b.kind, BlockKind::Titled { level: SectionLevel::SubSection, .. }));
        assert_eq!(word_texts(as_words(&b.elements[0])), vec!["Text", "b"]);

        let c = as_block(&root.elements[1]);
        assert!(matches!(c.kind, BlockKind::Titled { level: SectionLevel::Section, .. }));
    }

    #[test]
    fn test_theorem_and_proof() {
        let root = parse_str(
            "\\begin{theorem}[Pythagoras]\\label{thm:pyth}\nFor a right triangle $a^2+b^2=c^2$.\n\\end{theorem}\n\
             \\begin{lemma}Easy.\\qed\\end{lemma}\n\\begin{proof}\nTrivial.\n\\end{proof}",
        );
        assert_eq!(root.elements.len(), 3);

        let theorem = as_block(&root.elements[0]);
        let BlockKind::Theorem { kind, optional_title, qed } = &theorem.kind else { panic!("not a theorem") };
        assert_eq!(kind, "theorem");
        assert_eq!(optional_title.as_ref().map(|t| t.recombine(true)), Some("Pythagoras".into()));
        assert!(!qed);
        assert_eq!(theorem.labels, vec!["thm:pyth".to_string()]);
        assert_eq!(theorem.elements.len(), 1);

        assert!(matches!(&as_block(&root.elements[1]).kind, BlockKind::Theorem { qed: true, .. }));
        assert!(matches!(&as_block(&root.elements[2]).kind, BlockKind::Theorem { qed: true, optional_title: None, .. }));
    }

    fn find_block<'a>(block: &'a Block, found: &dyn Fn(&BlockKind) -> bool) -> Option<&'a Block> {
        block.elements.iter().find_map(|node| match node {
            Node::Block(inner) if found(&inner.kind) => Some(inner),
            Node::Block(inner) => find_block(inner, found),
            _ => None,
        })
    }

    #[test]
    fn test_subsection_inside_environments() {
        for env in ["theorem", "center"] {
            let source = format!("\\section{{A}}\n\\begin{{{0}}}\n\\subsection{{B}} x\n\\end{{{0}}}\n", env);
            let root = parse_str(&source);
            let section = as_block(&root.elements[0]);
            let environment = find_block(section, &|kind| {
                matches!(kind, BlockKind::Theorem { .. } | BlockKind::Special(SpecialKind::Center))
            });
            let environment = environment.unwrap();
            let subsection = find_block(environment, &|kind| {
                matches!(kind, BlockKind::Titled { level: SectionLevel::SubSection, .. })
            });
            assert_eq!(word_texts(as_words(&subsection.unwrap().elements[0])), vec!["x"]);
        }
    }

    #[test]
    fn test_nested_lists() {
        let root = parse_str(
            "\\begin{itemize}\n\\item One\n\\item Two \\begin{enumerate}\\item $a$ \\item $b$\\end{enumerate}\n\\item Three\n\\end{itemize}",
        );
        let list = &root;
        assert_eq!(list.kind, BlockKind::Enumeration(ListKind::Unordered));
        assert_eq!(list.elements.len(), 3);

        let second = as_block(&list.elements[1]);
        assert_eq!(second.elements.len(), 2);
        let inner = as_block(&second.elements[1]);
        assert_eq!(inner.kind, BlockKind::Enumeration(ListKind::Ordered));
        assert_eq!(inner.elements.len(), 2);
    }

    #[test]
    fn test_tabular() {
        let root = parse_str(
            "\\begin{tabular}{|l|c|r|}\n\\hline\na & b & c \\\\\n\\cline{2-3}\nd & e & f \\\\\n\\hline\n\\end{tabular}",
        );
        let Node::Tabular(tabular) = &root.elements[0] else { panic!("not a tabular") };
        assert_eq!(tabular.alignment.len(), 3);
        assert!(tabular.alignment[0].left_border);
        assert!(tabular.alignment[0].right_border);
        assert!(!tabular.alignment[1].left_border);
        assert_eq!(tabular.alignment[2].align, Align::Right);
        assert_eq!(tabular.rows.len(), 2);
        assert_eq!(tabular.rows[1][1].recombine(true).trim(), "e");
        assert_eq!(
            tabular.lines,
            vec![
                vec![HorizontalLine::Full],
                vec![HorizontalLine::Partial { from: Some(2), to: Some(3) }],
                vec![HorizontalLine::Full],
            ]
        );
    }

    #[test]
    fn test_inline_code() {
        let root = parse_str("Run \\code{python}|x = 1| now and \\code{rust}{let y} or \\code{c}(f(x)");
        let words = as_words(&root.elements[0]);
        let codes: Vec<_> = words
            .words
            .iter()
            .flat_map(|w| &w.parts)
            .filter_map(|p| match p {
                Node::Code(code) => Some((code.lang.as_str(), code.body.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec![("python", "x = 1"), ("rust", "let y"), ("c", "f(x")]);
    }

    #[test]
    fn test_links_and_references() {
        let root = parse_str("See \\href{http://a.b/?x=1&y=2}{the site}, \\url{http://c.d/e%20f} and \\ref[here]{thm:main}.");
        let parts: Vec<_> = as_words(&root.elements[0]).words.iter().flat_map(|w| w.parts.clone()).collect();
        let links: Vec<_> = parts
            .iter()
            .filter_map(|p| match p {
                Node::Link(link) => Some(link.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(links[0].url, "http://a.b/?x=1&y=2");
        assert_eq!(links[0].text.as_ref().map(|t| t.recombine(true)), Some("the site".into()));
        assert_eq!(links[1].url, "http://c.d/e%20f");
        assert_eq!(links[1].text, None);

        let reference = parts.iter().find_map(|p| match p {
            Node::Reference(r) => Some(r.clone()),
            _ => None,
        });
        let reference = reference.unwrap();
        assert_eq!(reference.target, "thm:main");
        assert_eq!(reference.text.map(|t| t.recombine(true)), Some("here".into()));
    }

    #[test]
    fn test_pictures() {
        let root = parse_str(
            "\\begin{tikzpicture}[scale=2]\\draw (0,0) -- (1,1);\\end{tikzpicture} \
             \\begin{pstricks}{left=0, right=2}\\psline(0,0)(1,1)\\end{pstricks}",
        );
        let parts: Vec<_> = as_words(&root.elements[0]).words.iter().flat_map(|w| w.parts.clone()).collect();
        assert_eq!(
            parts[0],
            Node::TikzPicture(TikzPicture {
                body: "\\draw (0,0) -- (1,1);".into(),
                args: Some("scale=2".into()),
            })
        );
        let Node::PsTricksPicture(pst) = &parts[1] else { panic!("not pstricks") };
        assert_eq!(pst.body, "\\psline(0,0)(1,1)");
        assert_eq!(pst.args.get("left").map(String::as_str), Some("0"));
        assert_eq!(pst.args.get("right").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_picture_group_and_formula_list() {
        let root = parse_str(
            "\\begin{picturegroup}\n\\picture{First}{\\includegraphics[width=0.5\\textwidth]{a.png}}\n\\end{picturegroup}\n\
             \\begin{formulalist}\n\\formula{a^{2}}\n\\formula{\\frac{1}{2}}\n\\end{formulalist}",
        );
        let Node::PictureGroup(group) = &root.elements[0] else { panic!("not a picture group") };
        assert_eq!(group.pictures.len(), 1);
        assert_eq!(group.pictures[0].0.recombine(true), "First");
        let Node::IncludeGraphics(gfx) = &group.pictures[0].1.words[0].parts[0] else { panic!("not an image") };
        assert_eq!(gfx.url, "a.png");
        assert_eq!(gfx.args.get("width").map(String::as_str), Some("0.5\\textwidth"));

        let Node::FormulaList(list) = &root.elements[1] else { panic!("not a formula list") };
        assert_eq!(list.formulae, vec!["a^{2}".to_string(), "\\frac{1}{2}".to_string()]);
    }

    #[test]
    fn test_language_and_symbols() {
        let root = parse_str("\\foreignlanguage{german}{Hallo Welt} \\symbol{65}\\ldots");
        let parts: Vec<_> = as_words(&root.elements[0]).words.iter().flat_map(|w| w.parts.clone()).collect();
        let Node::Language(language) = &parts[0] else { panic!("not a language") };
        assert_eq!(language.locale, "de");
        assert!(!language.right_to_left);
        assert_eq!(word_texts(&language.element), vec!["Hallo", "Welt"]);
        assert_eq!(parts[1], Node::WordPart(WordPart::new("A")));
        assert_eq!(parts[2], Node::WordPart(WordPart::new("\u{2026}")));

        let error = parse_err("\\foreignlanguage{klingon}{x}");
        assert!(error.message.contains("Unknown language 'klingon'!"));
    }

    #[test]
    fn test_formatting() {
        let root = parse_str("\\emph{a} \\textit{b}");
        let words = as_words(&root.elements[0]);
        let Node::Words(emph) = &words.words[0].parts[0] else { panic!("not words") };
        assert_eq!(emph.formatting, Some(Formatting::Emphasize));
        let Node::Words(italics) = &words.words[1].parts[0] else { panic!("not words") };
        assert_eq!(italics.formatting, Some(Formatting::Italics));
    }

    #[test]
    fn test_code_listing() {
        let root = parse_str("\\begin{codelisting}{rust}\nfn main() {}\n\\end{codelisting}");
        assert_eq!(
            root.elements,
            vec![Node::CodeBlock(Code {
                lang: "rust".into(),
                body: "fn main() {}".into(),
            })]
        );
    }

    #[test]
    fn test_errors() {
        let error = parse_err("\\foo bar");
        assert_eq!(error.message, "Unknown command 'foo'!");
        assert_eq!((error.line, error.column), (1, 5));

        let error = parse_err("a } b");
        assert_eq!(error.message, "Unexpected closing curly bracket!");
        assert_eq!((error.line, error.column), (1, 3));

        let error = parse_err("\\begin{theorem} x \\end{lemma}");
        assert_eq!(error.message, "\\begin{theorem} paired with \\end{lemma}!");

        let error = parse_err("\\begin{itemize}\n\\item \\section{S}\n\\end{itemize}");
        assert_eq!(error.message, "Cannot start new block level inside an environment!");

        let error = parse_err("$x");
        assert!(error.message.starts_with("Unterminated formula"));

        let error = parse(" \\end{itemize}", &ParsingEnvironment::default(), Some("post.tex")).unwrap_err();
        assert_eq!(error.file.as_deref(), Some("post.tex"));
        assert_eq!(error.message, "Unexpected \\end{itemize} in block!");
    }
}
