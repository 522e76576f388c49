//! CSS selector subset shared by capture-time uniqueness probing and the
//! in-memory page host: compound selectors with `#id`, `.class` and
//! attribute tests, descendant and child combinators, comma-separated
//! alternatives. Anything outside the subset is a parse error; replay
//! treats that the same as a selector that matches nothing.

use thiserror::Error;

use crate::view::{DocumentView, NodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected `{ch}` at position {pos}")]
    Unexpected { ch: char, pos: usize },
    #[error("unsupported selector feature `{0}`")]
    Unsupported(String),
    #[error("unterminated attribute or string")]
    Unterminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    alternatives: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    /// Compounds right to left with the combinator on each one's left side;
    /// the leftmost combinator is ignored.
    sequence: Vec<(Combinator, CompoundSelector)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CompoundSelector {
    /// `None` matches any tag (explicit `*` or no tag written).
    tag: Option<String>,
    parts: Vec<SimpleSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SimpleSelector {
    Id(String),
    Class(String),
    Attr {
        name: String,
        test: Option<(AttrOp, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Prefix,
    Suffix,
    Substring,
    Includes,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<SelectorList, SelectorError> {
        Parser::new(input).parse_list()
    }

    pub fn matches(&self, view: &dyn DocumentView, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| matches_sequence(view, node, &complex.sequence))
    }
}

/// Parses and runs a selector over the whole document, document order.
pub fn query_all(view: &dyn DocumentView, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
    let parsed = SelectorList::parse(selector)?;
    Ok(view
        .nodes()
        .into_iter()
        .filter(|&node| parsed.matches(view, node))
        .collect())
}

/// `[name="value"]` with backslash and quote escaping, the form the
/// synthesizer emits for attribute-backed locators.
pub fn attr_equals(name: &str, value: &str) -> String {
    format!(
        "[{}=\"{}\"]",
        name,
        value.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Escapes a class or id for use inside a selector: anything outside the
/// identifier alphabet gets a backslash.
pub fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for ch in ident.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

fn matches_sequence(
    view: &dyn DocumentView,
    node: NodeId,
    sequence: &[(Combinator, CompoundSelector)],
) -> bool {
    let ((combinator, compound), rest) = match sequence.split_last() {
        Some(split) => split,
        None => return false,
    };
    if !matches_compound(view, node, compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Combinator::Child => match view.parent(node) {
            Some(parent) => matches_sequence(view, parent, rest),
            None => false,
        },
        Combinator::Descendant => {
            let mut current = view.parent(node);
            while let Some(ancestor) = current {
                if matches_sequence(view, ancestor, rest) {
                    return true;
                }
                current = view.parent(ancestor);
            }
            false
        }
    }
}

fn matches_compound(view: &dyn DocumentView, node: NodeId, compound: &CompoundSelector) -> bool {
    if let Some(tag) = &compound.tag {
        match view.tag_name(node) {
            Some(actual) => {
                if !actual.eq_ignore_ascii_case(tag) {
                    return false;
                }
            }
            None => return false,
        }
    }
    compound.parts.iter().all(|part| match part {
        SimpleSelector::Id(id) => view.attribute(node, "id").as_deref() == Some(id.as_str()),
        SimpleSelector::Class(class) => view.classes(node).iter().any(|c| c == class),
        SimpleSelector::Attr { name, test } => {
            let actual = view.attribute(node, name);
            match (actual, test) {
                (Some(_), None) => true,
                (Some(actual), Some((op, expected))) => attr_test(*op, &actual, expected),
                (None, _) => false,
            }
        }
    })
}

fn attr_test(op: AttrOp, actual: &str, expected: &str) -> bool {
    match op {
        AttrOp::Equals => actual == expected,
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
        AttrOp::Includes => {
            !expected.is_empty()
                && !expected.contains(char::is_whitespace)
                && actual.split_whitespace().any(|word| word == expected)
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Parser {
        Parser {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse_list(mut self) -> Result<SelectorList, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.pos += 1;
                }
                Some(ch) => return Err(SelectorError::Unexpected { ch, pos: self.pos }),
            }
        }
        Ok(SelectorList { alternatives })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let mut sequence = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let ws = self.skip_ws();
            let combinator = match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some(ch) if ws > 0 && ch != ',' => Combinator::Descendant,
                _ => break,
            };
            sequence.push((combinator, self.parse_compound()?));
        }
        Ok(ComplexSelector { sequence })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, SelectorError> {
        let mut compound = CompoundSelector::default();
        let mut saw_universal = false;

        if self.peek() == Some('*') {
            self.pos += 1;
            saw_universal = true;
        } else if self.peek().map(is_ident_start).unwrap_or(false) {
            compound.tag = Some(self.parse_ident()?.to_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.parts.push(SimpleSelector::Id(self.parse_ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    compound
                        .parts
                        .push(SimpleSelector::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.parts.push(self.parse_attr()?);
                }
                Some(':') => {
                    return Err(SelectorError::Unsupported("pseudo-class".to_string()))
                }
                _ => break,
            }
        }

        if compound.tag.is_none() && compound.parts.is_empty() && !saw_universal {
            match self.peek() {
                Some(ch) => return Err(SelectorError::Unexpected { ch, pos: self.pos }),
                None => return Err(SelectorError::Empty),
            }
        }
        Ok(compound)
    }

    fn parse_attr(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.skip_ws();
        let name = self.parse_ident()?;
        self.skip_ws();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(SimpleSelector::Attr { name, test: None });
            }
            None => return Err(SelectorError::Unterminated),
            _ => {}
        }
        let op = self.parse_attr_op()?;
        self.skip_ws();
        let value = match self.peek() {
            Some('"') | Some('\'') => self.parse_quoted()?,
            Some(ch) if is_ident_start(ch) => self.parse_ident()?,
            Some(ch) => return Err(SelectorError::Unexpected { ch, pos: self.pos }),
            None => return Err(SelectorError::Unterminated),
        };
        self.skip_ws();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(SimpleSelector::Attr {
                    name,
                    test: Some((op, value)),
                })
            }
            Some(ch) => Err(SelectorError::Unexpected { ch, pos: self.pos }),
            None => Err(SelectorError::Unterminated),
        }
    }

    fn parse_attr_op(&mut self) -> Result<AttrOp, SelectorError> {
        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                return Ok(AttrOp::Equals);
            }
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Substring,
            Some('~') => AttrOp::Includes,
            Some(ch) => return Err(SelectorError::Unexpected { ch, pos: self.pos }),
            None => return Err(SelectorError::Unterminated),
        };
        self.pos += 1;
        match self.peek() {
            Some('=') => {
                self.pos += 1;
                Ok(op)
            }
            Some(ch) => Err(SelectorError::Unexpected { ch, pos: self.pos }),
            None => Err(SelectorError::Unterminated),
        }
    }

    fn parse_quoted(&mut self) -> Result<String, SelectorError> {
        let quote = match self.peek() {
            Some(q) => q,
            None => return Err(SelectorError::Unterminated),
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.next_char() {
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => match self.next_char() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(SelectorError::Unterminated),
                },
                Some(ch) => out.push(ch),
                None => return Err(SelectorError::Unterminated),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.pos += 1;
                    match self.next_char() {
                        Some(escaped) => out.push(escaped),
                        None => return Err(SelectorError::Unterminated),
                    }
                }
                Some(ch) if is_ident_char(ch) => {
                    self.pos += 1;
                    out.push(ch);
                }
                _ => break,
            }
        }
        if out.is_empty() {
            match self.peek() {
                Some(ch) => Err(SelectorError::Unexpected { ch, pos: self.pos }),
                None => Err(SelectorError::Empty),
            }
        } else {
            Ok(out)
        }
    }

    fn skip_ws(&mut self) -> usize {
        let start = self.pos;
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '-' || ch == '\\' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}
