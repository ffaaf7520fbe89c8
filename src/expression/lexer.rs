use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Punct(p) => format!("'{p}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) offset: usize,
}

// Longest first so `===` wins over `==` and `=`.
const PUNCTUATION: [&str; 35] = [
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=", "++", "--",
    "+", "-", "*", "/", "%", "<", ">", "!", "?", ":", ".", ",", ";", "(", ")", "[", "]", "{",
    "}", "=",
];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_ascii_digit() {
            let mut end = offset;
            let mut seen_dot = false;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_ascii_digit() || (d == '.' && !seen_dot) {
                    seen_dot |= d == '.';
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let literal = &source[offset..end];
            let value = literal.parse::<f64>().map_err(|_| ExprError::InvalidNumber {
                literal: literal.to_owned(),
            })?;
            tokens.push(Spanned {
                token: Token::Number(value),
                offset,
            });
            continue;
        }

        if c == '\'' || c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, d)) = chars.next() {
                match d {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, other)) => text.push(other),
                        None => break,
                    },
                    d if d == c => {
                        closed = true;
                        break;
                    }
                    d => text.push(d),
                }
            }
            if !closed {
                return Err(ExprError::UnterminatedString { offset });
            }
            tokens.push(Spanned {
                token: Token::Str(text),
                offset,
            });
            continue;
        }

        if is_ident_start(c) {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if is_ident_continue(d) {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Spanned {
                token: Token::Ident(source[offset..end].to_owned()),
                offset,
            });
            continue;
        }

        let rest = &source[offset..];
        let Some(punct) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) else {
            return Err(ExprError::UnexpectedChar { ch: c, offset });
        };
        for _ in 0..punct.len() {
            chars.next();
        }
        tokens.push(Spanned {
            token: Token::Punct(*punct),
            offset,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn tokenizes_operators_longest_first() {
        assert_eq!(
            kinds("a === b != c"),
            vec![
                Token::Ident("a".into()),
                Token::Punct("==="),
                Token::Ident("b".into()),
                Token::Punct("!="),
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn tokenizes_literals() {
        assert_eq!(
            kinds(r#"3.5 'it\'s' "x" $index 0.5"#),
            vec![
                Token::Number(3.5),
                Token::Str("it's".into()),
                Token::Str("x".into()),
                Token::Ident("$index".into()),
                Token::Number(0.5),
            ]
        );
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            tokenize("'open"),
            Err(ExprError::UnterminatedString { offset: 0 })
        );
        assert_eq!(
            tokenize("a # b"),
            Err(ExprError::UnexpectedChar { ch: '#', offset: 2 })
        );
    }
}
