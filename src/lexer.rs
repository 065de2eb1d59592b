//! Tokenizer for the rule mini-language.
//!
//! Two pieces:
//! - [`parse_call`] matches `name(args)` and hands back the raw argument text.
//! - [`split_args`] splits that text on top-level commas. A comma inside a
//!   quoted segment (`'...'` or `"..."`) or inside a parenthesised group does
//!   not split. There are no escape sequences: a quote character always
//!   toggles the quote state it opened.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ReactiveError, Result};

lazy_static! {
    /// Bare identifier, optional whitespace, then a parenthesised body that
    /// runs to the last `)` of the text.
    static ref CALL_RE: Regex =
        Regex::new(r"^\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(([\s\S]*)\)\s*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub raw_args: String,
}

pub fn parse_call(text: &str) -> Result<Call> {
    let caps = CALL_RE
        .captures(text)
        .ok_or_else(|| ReactiveError::MalformedCall {
            text: text.to_string(),
        })?;
    Ok(Call {
        name: caps[1].to_string(),
        raw_args: caps[2].to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    Outside,
    Single,
    Double,
}

/// Left-to-right argument scanner. Feed characters with [`ArgScanner::push`]
/// and collect with [`ArgScanner::finish`].
#[derive(Debug)]
pub struct ArgScanner {
    quote: QuoteState,
    depth: usize,
    current: String,
    args: Vec<String>,
}

impl Default for ArgScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgScanner {
    pub fn new() -> Self {
        Self {
            quote: QuoteState::Outside,
            depth: 0,
            current: String::new(),
            args: Vec::new(),
        }
    }

    pub fn quote(&self) -> QuoteState {
        self.quote
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when a comma at this point would end the current argument.
    pub fn at_top_level(&self) -> bool {
        self.quote == QuoteState::Outside && self.depth == 0
    }

    pub fn push(&mut self, c: char) {
        match (self.quote, c) {
            (QuoteState::Single, '\'') | (QuoteState::Double, '"') => {
                self.quote = QuoteState::Outside;
            }
            (QuoteState::Single, _) | (QuoteState::Double, _) => {}
            (QuoteState::Outside, '\'') => self.quote = QuoteState::Single,
            (QuoteState::Outside, '"') => self.quote = QuoteState::Double,
            (QuoteState::Outside, '(') => self.depth += 1,
            (QuoteState::Outside, ')') => self.depth = self.depth.saturating_sub(1),
            (QuoteState::Outside, ',') if self.depth == 0 => {
                let arg = self.current.trim().to_string();
                self.args.push(arg);
                self.current.clear();
                return;
            }
            _ => {}
        }
        self.current.push(c);
    }

    pub fn finish(mut self) -> Vec<String> {
        let tail = self.current.trim();
        if !tail.is_empty() {
            self.args.push(tail.to_string());
        }
        self.args
    }
}

/// Split a raw argument list into trimmed arguments.
pub fn split_args(raw: &str) -> Vec<String> {
    let mut scanner = ArgScanner::new();
    for c in raw.chars() {
        scanner.push(c);
    }
    scanner.finish()
}
