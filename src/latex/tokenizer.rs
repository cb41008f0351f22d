// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::fmt;

use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Whitespace,
    NonbreakableWhitespace,
    Text(String),
    EscapedText(String),
    Command(String),
    InlineFormulaDelimiter,
    DisplayFormulaDelimiter,
    CurlyBracketOpen,
    CurlyBracketClose,
    SquareBracketOpen,
    SquareBracketClose,
    DoubleNewLine,
    Comment(String),
    ForcedLineBreak,
    TableColumnDelimiter,
}

impl Token {
    pub fn is_command(&self, name: &str) -> bool {
        matches!(self, Token::Command(value) if value == name)
    }

    pub fn is_text(&self, text: &str) -> bool {
        matches!(self, Token::Text(value) if value == text)
    }

    pub fn is_whitespace_or_comment(&self) -> bool {
        matches!(self, Token::Whitespace | Token::Comment(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Whitespace => write!(f, "whitespace"),
            Token::NonbreakableWhitespace => write!(f, "'~'"),
            Token::Text(text) => write!(f, "text {:?}", text),
            Token::EscapedText(text) => write!(f, "escaped text {:?}", text),
            Token::Command(name) => write!(f, "command \\{}", name),
            Token::InlineFormulaDelimiter => write!(f, "'$'"),
            Token::DisplayFormulaDelimiter => write!(f, "'$$'"),
            Token::CurlyBracketOpen => write!(f, "'{{'"),
            Token::CurlyBracketClose => write!(f, "'}}'"),
            Token::SquareBracketOpen => write!(f, "'['"),
            Token::SquareBracketClose => write!(f, "']'"),
            Token::DoubleNewLine => write!(f, "paragraph break"),
            Token::Comment(_) => write!(f, "comment"),
            Token::ForcedLineBreak => write!(f, "'\\\\'"),
            Token::TableColumnDelimiter => write!(f, "'&'"),
        }
    }
}

/// A token together with the half-open byte range `[begin, end)` it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub begin: usize,
    pub end: usize,
}

fn is_whitespace(c: char) -> bool {
    (c as u32) <= 32
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

fn is_command_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '@'
}

fn is_structural(c: char) -> bool {
    matches!(c, '~' | '{' | '}' | '$' | '[' | ']' | '\\' | '&')
}

/// Converts a byte index into a 1-based `(line, column)` pair.
///
/// The pairs `\r\n` and `\n\r` count as a single line break.
pub fn compute_position(input: &str, index: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    let mut eol: Option<char> = None;
    let end = index.min(input.len());
    for c in input[..end].chars() {
        if is_line_break(c) {
            if eol.is_none() || eol == Some(c) {
                eol = Some(c);
                line += 1;
                column = 1;
            } else {
                eol = None;
            }
        } else {
            column += 1;
        }
    }
    (line, column)
}

pub struct Tokenizer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer { input, position: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self, c: char) {
        self.position += c.len_utf8();
    }

    /// Skips whitespace and returns the number of contained line breaks.
    fn eat_whitespace(&mut self) -> usize {
        let mut line_breaks = 0;
        let mut last_line_break: Option<char> = None;
        while let Some(c) = self.peek_char() {
            if !is_whitespace(c) {
                break;
            }
            if is_line_break(c) {
                if last_line_break.is_none() || last_line_break == Some(c) {
                    line_breaks += 1;
                }
                last_line_break = Some(c);
            } else {
                last_line_break = None;
            }
            self.advance(c);
        }
        line_breaks
    }

    fn eat_comment(&mut self) -> &'a str {
        let start = self.position;
        let mut last_line_break: Option<char> = None;
        let mut had_line_break = false;
        while let Some(c) = self.peek_char() {
            if had_line_break && !is_whitespace(c) {
                break;
            }
            if is_line_break(c) {
                if (last_line_break.is_none() || last_line_break == Some(c)) && had_line_break {
                    break;
                }
                last_line_break = Some(c);
                had_line_break = true;
            } else {
                last_line_break = None;
            }
            self.advance(c);
        }
        &self.input[start..self.position]
    }

    fn read_text(&mut self, strict: bool) -> &'a str {
        let start = self.position;
        while let Some(c) = self.peek_char() {
            if is_whitespace(c) || is_structural(c) || (strict && !is_command_char(c)) {
                break;
            }
            self.advance(c);
        }
        &self.input[start..self.position]
    }

    fn next_token(&mut self, c: char) -> Result<Token, ParseError> {
        let single = |tokenizer: &mut Self, token: Token| {
            tokenizer.advance(c);
            Ok(token)
        };
        match c {
            c if is_whitespace(c) => match self.eat_whitespace() {
                n if n > 1 => Ok(Token::DoubleNewLine),
                _ => Ok(Token::Whitespace),
            },
            '~' => single(self, Token::NonbreakableWhitespace),
            '&' => single(self, Token::TableColumnDelimiter),
            '{' => single(self, Token::CurlyBracketOpen),
            '}' => single(self, Token::CurlyBracketClose),
            '[' => single(self, Token::SquareBracketOpen),
            ']' => single(self, Token::SquareBracketClose),
            '$' => {
                self.advance(c);
                if self.peek_char() == Some('$') {
                    self.advance('$');
                    return Ok(Token::DisplayFormulaDelimiter);
                }
                Ok(Token::InlineFormulaDelimiter)
            }
            '\\' => {
                let backslash = self.position;
                self.advance(c);
                let name = self.read_text(true);
                if !name.is_empty() {
                    return Ok(Token::Command(name.to_string()));
                }
                let Some(next) = self.peek_char() else {
                    return Err(ParseError::new(
                        None,
                        compute_position(self.input, backslash),
                        "Reached end of text after '\\'!",
                    ));
                };
                self.advance(next);
                Ok(match next {
                    '(' | ')' | '[' | ']' => Token::Command(next.to_string()),
                    '\\' => Token::ForcedLineBreak,
                    _ => Token::EscapedText(next.to_string()),
                })
            }
            '%' => {
                self.advance(c);
                Ok(Token::Comment(self.eat_comment().to_string()))
            }
            _ => Ok(Token::Text(self.read_text(false).to_string())),
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<SpannedToken, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let c = self.peek_char()?;
        let begin = self.position;
        Some(self.next_token(c).map(|token| SpannedToken {
            token,
            begin,
            end: self.position,
        }))
    }
}

/// Lookahead wrapper over the token sequence of one source string.
///
/// Peeking past the end yields `None`.
pub struct TokenStream<'a> {
    input: &'a str,
    tokens: Vec<SpannedToken>,
    cursor: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(input: &'a str) -> Result<Self, ParseError> {
        let tokens = Tokenizer::new(input).collect::<Result<Vec<_>, _>>()?;
        Ok(TokenStream {
            input,
            tokens,
            cursor: 0,
        })
    }

    pub fn current(&self) -> Option<&Token> {
        self.peek(0)
    }

    pub fn current_indices(&self) -> Option<(usize, usize)> {
        self.peek_indices(0)
    }

    pub fn has_current(&self) -> bool {
        self.can_peek(0)
    }

    pub fn peek(&self, k: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + k).map(|t| &t.token)
    }

    pub fn peek_indices(&self, k: usize) -> Option<(usize, usize)> {
        self.tokens.get(self.cursor + k).map(|t| (t.begin, t.end))
    }

    pub fn can_peek(&self, k: usize) -> bool {
        self.cursor + k < self.tokens.len()
    }

    pub fn skip_current(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.tokens.len());
    }

    /// Rewrites the payload of the token `k` positions ahead.
    ///
    /// The begin index moves so that the token still spans exactly its new
    /// value, which keeps verbatim slicing consistent after partial consumption.
    pub fn set_value(&mut self, k: usize, value: String) {
        if let Some(spanned) = self.tokens.get_mut(self.cursor + k) {
            if let Token::Text(old) | Token::EscapedText(old) | Token::Command(old) | Token::Comment(old) =
                &mut spanned.token
            {
                if value.len() <= spanned.end - spanned.begin {
                    spanned.begin = spanned.end - value.len();
                }
                *old = value;
            }
        }
    }

    /// Begin index of the current token, or the input length at the end.
    pub fn current_begin(&self) -> usize {
        self.current_indices().map_or(self.input.len(), |(begin, _)| begin)
    }

    pub fn get_substring(&self, begin: usize, end: usize) -> &'a str {
        let end = end.min(self.input.len());
        let begin = begin.min(end);
        &self.input[begin..end]
    }

    pub fn get_position(&self, index: usize) -> (usize, usize) {
        compute_position(self.input, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Tokenizer::new(input)
            .map(|t| t.map(|t| t.token))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_slices_recompose_input() {
        let input = "Some $x^2$ and $$y$$ {\\bf a}~b\\\\ c & d % note\n  e\n\n\\(z\\) \\%";
        let spanned: Vec<_> = Tokenizer::new(input).collect::<Result<_, _>>().unwrap();
        let recomposed: String = spanned.iter().map(|t| &input[t.begin..t.end]).collect();
        assert_eq!(recomposed, input);

        for t in &spanned {
            let again = tokens(&input[t.begin..t.end]);
            assert_eq!(again, vec![t.token.clone()]);
        }
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(
            tokens("a\n\nb"),
            vec![Token::Text("a".into()), Token::DoubleNewLine, Token::Text("b".into())]
        );
        assert_eq!(
            tokens("a\r\nb"),
            vec![Token::Text("a".into()), Token::Whitespace, Token::Text("b".into())]
        );
        assert_eq!(tokens("a\r\n\r\nb")[1], Token::DoubleNewLine);
        assert_eq!(tokens("a\r\rb")[1], Token::DoubleNewLine);
        assert_eq!(tokens("a\n \t \nb")[1], Token::DoubleNewLine);
        assert_eq!(tokens("a \t b")[1], Token::Whitespace);
    }

    #[test]
    fn test_commands_and_escapes() {
        assert_eq!(
            tokens("\\emph\\\\\\(\\]\\%\\@x"),
            vec![
                Token::Command("emph".into()),
                Token::ForcedLineBreak,
                Token::Command("(".into()),
                Token::Command("]".into()),
                Token::EscapedText("%".into()),
                Token::Command("@x".into()),
            ]
        );
        assert_eq!(
            tokens("$a$ $$b$$~&"),
            vec![
                Token::InlineFormulaDelimiter,
                Token::Text("a".into()),
                Token::InlineFormulaDelimiter,
                Token::Whitespace,
                Token::DisplayFormulaDelimiter,
                Token::Text("b".into()),
                Token::DisplayFormulaDelimiter,
                Token::NonbreakableWhitespace,
                Token::TableColumnDelimiter,
            ]
        );
    }

    #[test]
    fn test_comment() {
        assert_eq!(
            tokens("a % note\n  b"),
            vec![
                Token::Text("a".into()),
                Token::Whitespace,
                Token::Comment(" note\n  ".into()),
                Token::Text("b".into()),
            ]
        );
        assert_eq!(
            tokens("%x\n\nb"),
            vec![Token::Comment("x\n".into()), Token::Whitespace, Token::Text("b".into())]
        );
        assert_eq!(tokens("50%"), vec![Token::Text("50%".into())]);
        assert_eq!(tokens("x %y"), vec![Token::Text("x".into()), Token::Whitespace, Token::Comment("y".into())]);
    }

    #[test]
    fn test_trailing_backslash() {
        let error = TokenStream::new("ab\ncd\\").err().unwrap();
        assert_eq!((error.line, error.column), (2, 3));
    }

    #[test]
    fn test_position() {
        assert_eq!(compute_position("ab\ncd", 4), (2, 2));
        assert_eq!(compute_position("a\r\nb", 3), (2, 1));
        assert_eq!(compute_position("a\n\nb", 3), (3, 1));
        assert_eq!(compute_position("äb", 2), (1, 2));
    }

    #[test]
    fn test_stream() {
        let mut stream = TokenStream::new("ab cd").unwrap();
        assert_eq!(stream.current(), Some(&Token::Text("ab".into())));
        assert_eq!(stream.peek(2), Some(&Token::Text("cd".into())));
        assert!(!stream.can_peek(3));
        assert_eq!(stream.peek(3), None);

        stream.skip_current(2);
        stream.set_value(0, "d".into());
        assert_eq!(stream.current(), Some(&Token::Text("d".into())));
        assert_eq!(stream.current_indices(), Some((4, 5)));
        assert_eq!(stream.get_substring(0, 2), "ab");

        stream.skip_current(1);
        assert!(!stream.has_current());
        assert_eq!(stream.current_begin(), 5);
    }
}
