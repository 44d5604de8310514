// SPDX-License-Identifier: MIT

//! Tokenizer for condition expressions

use crate::runtime::ConditionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    /// Identifiers and keywords (`and`, `true`, `None`, ...)
    Ident(String),
    Dot,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

/// A token plus the byte offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, ConditionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::Lte, 2),
            ('>', Some('=')) => (Token::Gte, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('!', _) => (Token::Bang, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('.', Some(d)) if d.is_ascii_digit() => lex_number(&chars[i..], position)?,
            ('.', _) => (Token::Dot, 1),
            ('\'', _) | ('"', _) => lex_string(&chars[i..], position)?,
            (d, _) if d.is_ascii_digit() => lex_number(&chars[i..], position)?,
            (a, _) if a.is_alphabetic() || a == '_' => {
                let width = chars[i..]
                    .iter()
                    .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
                    .count();
                let word: String = chars[i..i + width].iter().map(|(_, c)| *c).collect();
                (Token::Ident(word), width)
            }
            ('=', _) => {
                return Err(ConditionError::parse(
                    position,
                    "unexpected '=' (use '==' for comparison)",
                ))
            }
            (other, _) => {
                return Err(ConditionError::parse(
                    position,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        tokens.push(Spanned { token, position });
        i += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        position: input.len(),
    });
    Ok(tokens)
}

fn lex_number(chars: &[(usize, char)], position: usize) -> Result<(Token, usize), ConditionError> {
    let mut width = 0;
    let mut seen_dot = false;
    while let Some((_, c)) = chars.get(width) {
        if c.is_ascii_digit() {
            width += 1;
        } else if *c == '.'
            && !seen_dot
            && chars
                .get(width + 1)
                .is_some_and(|(_, d)| d.is_ascii_digit())
        {
            seen_dot = true;
            width += 1;
        } else {
            break;
        }
    }

    let text: String = chars[..width].iter().map(|(_, c)| *c).collect();
    text.parse::<f64>()
        .map(|n| (Token::Number(n), width))
        .map_err(|_| ConditionError::parse(position, format!("invalid number '{}'", text)))
}

fn lex_string(chars: &[(usize, char)], position: usize) -> Result<(Token, usize), ConditionError> {
    let quote = chars[0].1;
    let mut value = String::new();
    let mut i = 1;

    while let Some((_, c)) = chars.get(i) {
        match *c {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| ConditionError::parse(position, "unterminated string"))?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((Token::Str(value), i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }

    Err(ConditionError::parse(position, "unterminated string"))
}
