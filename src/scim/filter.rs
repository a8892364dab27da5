//! SCIM filter expressions (RFC 7644 3.4.2.2), restricted to `eq` and `co`
//! comparisons joined by `and`.

use crate::db::{Op, Predicate};
use crate::error::{ConsoleError, ConsoleResult};

/// SCIM attribute name to column, per resource.
pub type AttributeMap = &'static [(&'static str, &'static str)];

/// Look up the column for `attribute`. Attribute names are case-insensitive.
pub fn column_for(attributes: AttributeMap, attribute: &str) -> Option<&'static str> {
    attributes
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
        .map(|(_, column)| *column)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn quoted(&mut self) -> ConsoleResult<Token> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(Token::Quoted(value)),
                Some('\\') => match self.chars.next() {
                    Some(c) => value.push(c),
                    None => break,
                },
                Some(c) => value.push(c),
                None => break,
            }
        }
        Err(ConsoleError::InvalidFilter("unterminated string".into()))
    }
}

impl Iterator for Lexer<'_> {
    type Item = ConsoleResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
        match self.chars.peek()? {
            '"' => {
                self.chars.next();
                Some(self.quoted())
            }
            '(' | ')' => Some(Err(ConsoleError::InvalidFilter(
                "grouping is not supported".into(),
            ))),
            _ => {
                let mut word = String::new();
                while let Some(c) = self.chars.next_if(|c| !c.is_whitespace() && *c != '"') {
                    word.push(c);
                }
                Some(Ok(Token::Word(word)))
            }
        }
    }
}

fn operator(word: &str) -> ConsoleResult<Op> {
    match word.to_ascii_lowercase().as_str() {
        "eq" => Ok(Op::Eq),
        "co" => Ok(Op::Contains),
        "ne" | "sw" | "ew" | "pr" | "gt" | "ge" | "lt" | "le" => Err(
            ConsoleError::InvalidFilter(format!("operator '{word}' is not supported")),
        ),
        _ => Err(ConsoleError::InvalidFilter(format!(
            "unknown operator '{word}'"
        ))),
    }
}

/// Parse `filter` into predicates over the columns of `attributes`.
pub fn parse(filter: &str, attributes: AttributeMap) -> ConsoleResult<Vec<Predicate>> {
    let mut tokens = Lexer::new(filter);
    let mut predicates = Vec::new();

    loop {
        let attribute = match tokens.next().transpose()? {
            Some(Token::Word(word)) => word,
            Some(Token::Quoted(_)) | None => {
                return Err(ConsoleError::InvalidFilter(
                    "expected an attribute name".into(),
                ));
            }
        };
        let column = column_for(attributes, &attribute).ok_or_else(|| {
            ConsoleError::InvalidFilter(format!("attribute '{attribute}' cannot be filtered"))
        })?;

        let op = match tokens.next().transpose()? {
            Some(Token::Word(word)) => operator(&word)?,
            _ => {
                return Err(ConsoleError::InvalidFilter(format!(
                    "expected an operator after '{attribute}'"
                )));
            }
        };

        let value = match tokens.next().transpose()? {
            Some(Token::Quoted(value)) => value,
            Some(Token::Word(word)) if !word.eq_ignore_ascii_case("and") => word,
            _ => {
                return Err(ConsoleError::InvalidFilter(format!(
                    "expected a value after '{attribute}'"
                )));
            }
        };
        predicates.push(Predicate { column, op, value });

        match tokens.next().transpose()? {
            None => return Ok(predicates),
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("and") => continue,
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("or") => {
                return Err(ConsoleError::InvalidFilter(
                    "'or' is not supported".into(),
                ));
            }
            Some(_) => {
                return Err(ConsoleError::InvalidFilter(
                    "expected 'and' between comparisons".into(),
                ));
            }
        }
    }
}
