// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pull tokenizer for the tagged document format.

use super::MarkupError;

/// One lexical token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Token {
    /// Character data between tags, entities already decoded.
    Text(String),
    /// `<name attr="value" ...>` or `<name ... />`.
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    /// `</name>`.
    EndTag { name: String },
}

/// Tokenizer state: a cursor over the input plus line/column accounting for
/// error reporting.
pub(super) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Position of the next token, for error attribution by the parser.
    pub(super) fn position(&self) -> (usize, usize, usize) {
        (self.pos, self.line, self.column)
    }

    pub(super) fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError::new(message, self.pos, self.line, self.column)
    }

    /// The next token, or `None` at end of input.
    pub(super) fn next_token(&mut self) -> Result<Option<Token>, MarkupError> {
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        if self.rest().starts_with('<') {
            self.lex_tag().map(Some)
        } else {
            self.lex_text().map(Some)
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn bump(&mut self, ch: char) {
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.bump(ch);
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.eat();
        }
    }

    fn lex_text(&mut self) -> Result<Token, MarkupError> {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                '<' => break,
                '>' => return Err(self.error("unescaped '>' in text")),
                '&' => text.push(self.lex_entity()?),
                _ => {
                    text.push(ch);
                    self.bump(ch);
                }
            }
        }
        Ok(Token::Text(text))
    }

    fn lex_entity(&mut self) -> Result<char, MarkupError> {
        let start = self.position();
        self.eat(); // '&'
        let mut name = String::new();
        loop {
            match self.eat() {
                Some(';') => break,
                Some(ch) if ch.is_ascii_alphanumeric() || ch == '#' => name.push(ch),
                _ => {
                    return Err(MarkupError::new(
                        "malformed entity reference",
                        start.0,
                        start.1,
                        start.2,
                    ))
                }
            }
            if name.len() > 8 {
                return Err(MarkupError::new(
                    "malformed entity reference",
                    start.0,
                    start.1,
                    start.2,
                ));
            }
        }
        decode_entity(&name)
            .ok_or_else(|| MarkupError::new(format!("unknown entity '&{name};'"), start.0, start.1, start.2))
    }

    fn lex_tag(&mut self) -> Result<Token, MarkupError> {
        self.eat(); // '<'
        let closing = if self.peek() == Some('/') {
            self.eat();
            true
        } else {
            false
        };

        let name = self.lex_name()?;
        if closing {
            self.skip_whitespace();
            if self.eat() != Some('>') {
                return Err(self.error(format!("expected '>' to close '</{name}'")));
            }
            return Ok(Token::EndTag { name });
        }

        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('>') => {
                    self.eat();
                    break;
                }
                Some('/') => {
                    self.eat();
                    if self.eat() != Some('>') {
                        return Err(self.error("expected '>' after '/'"));
                    }
                    self_closing = true;
                    break;
                }
                Some(_) => {
                    let attr_name = self.lex_name()?;
                    self.skip_whitespace();
                    if self.eat() != Some('=') {
                        return Err(self.error(format!("expected '=' after attribute '{attr_name}'")));
                    }
                    self.skip_whitespace();
                    let value = self.lex_attr_value()?;
                    attrs.push((attr_name, value));
                }
                None => return Err(self.error(format!("unterminated '<{name}' tag"))),
            }
        }
        Ok(Token::StartTag {
            name,
            attrs,
            self_closing,
        })
    }

    fn lex_name(&mut self) -> Result<String, MarkupError> {
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                name.push(ch);
                self.bump(ch);
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error("expected a name"));
        }
        Ok(name)
    }

    fn lex_attr_value(&mut self) -> Result<String, MarkupError> {
        if self.eat() != Some('"') {
            return Err(self.error("expected '\"' to open attribute value"));
        }
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.eat();
                    return Ok(value);
                }
                Some('&') => value.push(self.lex_entity()?),
                Some('<') => return Err(self.error("unescaped '<' in attribute value")),
                Some(ch) => {
                    value.push(ch);
                    self.bump(ch);
                }
                None => return Err(self.error("unterminated attribute value")),
            }
        }
    }
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = if let Some(hex) = digits.strip_prefix('x') {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                digits.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Escape character data for element content.
pub(super) fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

/// Escape an attribute value for a double-quoted attribute.
pub(super) fn escape_attr(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
