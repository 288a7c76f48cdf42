//! Minimal CSS scanner and text patcher
//!
//! Understands plain CSS only: rules, declarations, comments, strings and
//! `@media` blocks. Other block at-rules (`@font-face`, `@keyframes`, ...)
//! are skipped; `@supports` and `@layer` are transparent. Offsets are byte
//! offsets into the scanned text.

use bridge_core::event::{normalize_whitespace, split_important};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at byte {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

/// A scanned stylesheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Whitespace-normalized selector text
    pub selector: String,
    /// Innermost enclosing `@media` condition
    pub media: Option<String>,
    /// Bytes between `{` and `}`
    pub body: Range<usize>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Lower-cased property name
    pub property: String,
    /// Value without `!important`
    pub value: String,
    pub important: bool,
    /// From the property name to the end of the value
    pub span: Range<usize>,
    /// The value text, including any `!important`
    pub value_span: Range<usize>,
    /// Whether a `;` directly terminates the declaration
    pub terminated: bool,
}

impl Rule {
    /// Check if this rule is addressed by `selector`
    ///
    /// Matches the whole selector list or any single selector in it.
    pub fn matches(&self, selector: &str) -> bool {
        self.selector == selector
            || self
                .selector
                .split(',')
                .any(|part| normalize_whitespace(part) == selector)
    }
}

/// Scan a stylesheet
pub fn parse(text: &str) -> Result<Stylesheet, ParseError> {
    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        rules: Vec::new(),
    };
    parser.block_list(None, false)?;
    Ok(Stylesheet {
        rules: parser.rules,
    })
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    rules: Vec<Rule>,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            offset: self.pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => self.skip_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        match self.text[self.pos + 2..].find("*/") {
            Some(end) => {
                self.pos += 2 + end + 2;
                Ok(())
            }
            None => Err(ParseError {
                message: "unterminated comment".into(),
                offset: start,
            }),
        }
    }

    fn skip_string(&mut self, quote: u8) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.peek() {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => break,
                _ if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(ParseError {
            message: "unterminated string".into(),
            offset: start,
        })
    }

    /// Advance to the first of `stops` outside strings, comments and parens
    fn scan_until(&mut self, stops: &[u8]) -> Result<Option<u8>, ParseError> {
        let mut parens = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'"' | b'\'' => self.skip_string(b)?,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => self.skip_comment()?,
                b'(' => {
                    parens += 1;
                    self.pos += 1;
                }
                b')' => {
                    parens = parens.saturating_sub(1);
                    self.pos += 1;
                }
                _ if parens == 0 && stops.contains(&b) => return Ok(Some(b)),
                _ => self.pos += 1,
            }
        }
        Ok(None)
    }

    /// Skip a block whose `{` was just consumed
    fn skip_block(&mut self) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.scan_until(b"{}")? {
                Some(b'{') => depth += 1,
                Some(_) => depth -= 1,
                None => return Err(self.error("unclosed block")),
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn block_list(&mut self, media: Option<&str>, nested: bool) -> Result<(), ParseError> {
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None if nested => return Err(self.error("unclosed block")),
                None => return Ok(()),
                Some(b'}') if nested => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'}') => return Err(self.error("unexpected '}'")),
                Some(b'@') => self.at_rule(media)?,
                Some(_) => self.rule(media)?,
            }
        }
    }

    fn at_rule(&mut self, media: Option<&str>) -> Result<(), ParseError> {
        let start = self.pos;
        match self.scan_until(b"{;}")? {
            Some(b';') => {
                self.pos += 1;
                Ok(())
            }
            Some(b'{') => {
                let prelude = &self.text[start + 1..self.pos];
                self.pos += 1;
                let (name, condition) = prelude
                    .trim()
                    .split_once(char::is_whitespace)
                    .unwrap_or((prelude.trim(), ""));
                match name.to_ascii_lowercase().as_str() {
                    "media" => {
                        let condition = normalize_whitespace(condition);
                        self.block_list(Some(&condition), true)
                    }
                    "supports" | "layer" | "container" | "document" => {
                        self.block_list(media, true)
                    }
                    _ => self.skip_block(),
                }
            }
            _ => Err(self.error("expected '{' or ';' after at-rule")),
        }
    }

    fn rule(&mut self, media: Option<&str>) -> Result<(), ParseError> {
        let start = self.pos;
        if self.scan_until(b"{;}")? != Some(b'{') {
            return Err(self.error("expected '{' after selector"));
        }
        let selector = normalize_whitespace(&self.text[start..self.pos]);
        self.pos += 1;
        let body_start = self.pos;
        let declarations = self.declarations()?;
        // declarations() stops on the closing brace
        let body = body_start..self.pos;
        self.pos += 1;

        self.rules.push(Rule {
            selector,
            media: media.map(str::to_string),
            body,
            declarations,
        });
        Ok(())
    }

    fn declarations(&mut self) -> Result<Vec<Declaration>, ParseError> {
        let mut declarations = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => return Err(self.error("unclosed rule")),
                Some(b'}') => return Ok(declarations),
                Some(b';') => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let start = self.pos;
            match self.scan_until(b":;{}")? {
                Some(b':') => {}
                Some(b'{') => {
                    // Nested rule; not addressed by plain CSS edits
                    self.pos += 1;
                    self.skip_block()?;
                    continue;
                }
                Some(_) => continue,
                None => return Err(self.error("unclosed rule")),
            }
            let property = self.text[start..self.pos].trim().to_ascii_lowercase();
            self.pos += 1;
            while matches!(self.peek(), Some(b' ' | b'\t')) {
                self.pos += 1;
            }

            let value_start = self.pos;
            let stop = self.scan_until(b";}")?;
            if stop.is_none() {
                return Err(self.error("unclosed rule"));
            }
            let raw = &self.text[value_start..self.pos];
            let value_end = value_start + raw.trim_end().len();
            let (value, important) = split_important(&self.text[value_start..value_end]);
            let terminated = stop == Some(b';');
            if terminated {
                self.pos += 1;
            }

            declarations.push(Declaration {
                property,
                value: value.to_string(),
                important,
                span: start..value_end,
                value_span: value_start..value_end,
                terminated,
            });
        }
    }
}

/// Replace a declaration's value
pub fn replace_value(text: &str, declaration: &Declaration, value: &str, important: bool) -> String {
    let mut new_value = value.to_string();
    if important {
        new_value.push_str(" !important");
    }
    splice(text, declaration.value_span.clone(), &new_value)
}

/// Remove a declaration, and its line when nothing else is on it
pub fn remove_declaration(text: &str, declaration: &Declaration) -> String {
    let bytes = text.as_bytes();
    let mut start = declaration.span.start;
    let mut end = declaration.span.end;
    if declaration.terminated {
        end += 1;
    }
    while matches!(bytes.get(end), Some(b' ' | b'\t')) {
        end += 1;
    }

    let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let alone_before = text[line_start..start].trim().is_empty();
    let alone_after = matches!(bytes.get(end), Some(b'\n') | None);
    if alone_before && alone_after {
        start = line_start;
        if end < bytes.len() {
            end += 1;
        }
    }

    splice(text, start..end, "")
}

/// Append a declaration at the end of a rule body
pub fn insert_declaration(text: &str, rule: &Rule, declaration: &str) -> String {
    let body = &text[rule.body.clone()];
    let mut out = String::with_capacity(text.len() + declaration.len() + 8);

    // Terminate the previous last declaration if needed
    let head_end = rule.body.start + body.trim_end().len();
    let needs_semicolon = rule.declarations.last().is_some_and(|d| !d.terminated);

    if body.contains('\n') {
        let indent = rule
            .declarations
            .first()
            .map(|d| line_indent(text, d.span.start))
            .unwrap_or("  ");
        out.push_str(&text[..head_end]);
        if needs_semicolon {
            out.push(';');
        }
        out.push('\n');
        out.push_str(indent);
        out.push_str(declaration);
        out.push(';');
        out.push_str(&text[head_end..]);
    } else {
        out.push_str(&text[..head_end]);
        if needs_semicolon {
            out.push(';');
        }
        out.push(' ');
        out.push_str(declaration);
        out.push(';');
        if head_end == rule.body.end {
            out.push(' ');
        }
        out.push_str(&text[head_end..]);
    }
    out
}

/// Append a new rule (wrapped in `@media` when given) at the end of the text
pub fn append_rule(text: &str, selector: &str, media: Option<&str>, declaration: &str) -> String {
    let mut out = text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    match media {
        Some(media) => {
            out.push_str(&format!(
                "@media {} {{\n  {} {{\n    {};\n  }}\n}}\n",
                media, selector, declaration
            ));
        }
        None => out.push_str(&format!("{} {{\n  {};\n}}\n", selector, declaration)),
    }
    out
}

fn line_indent(text: &str, offset: usize) -> &str {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &text[line_start..offset];
    let indent_len = line.len() - line.trim_start().len();
    &text[line_start..line_start + indent_len]
}

fn splice(text: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.start]);
    out.push_str(replacement);
    out.push_str(&text[range.end..]);
    out
}
