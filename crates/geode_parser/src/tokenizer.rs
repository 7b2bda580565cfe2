//! Tokenizer for Geode source code
//!
//! Produces a flat token stream with byte spans. Whitespace and
//! comments are emitted as tokens so tooling can reconstruct the
//! source; [`tokenize_significant`] filters them out for the parser.

use std::ops::Range;

/// Represents a token in the Geode language
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind
    pub kind: TokenKind,
    /// The source span (byte range)
    pub span: Range<usize>,
    /// The actual text of the token
    pub text: String,
}

/// Token kinds in the Geode language
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Is,
    Include,
    Link,
    Func,
    Class,
    Return,
    If,
    Else,
    While,
    For,
    New,
    Nomangle,
    Extern,
    True,
    False,

    // Identifiers
    Ident(String),

    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Char(u8),

    // Operators
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Eq,        // =
    EqEq,      // ==
    NotEq,     // !=
    Lt,        // <
    Gt,        // >
    LtEq,      // <=
    GtEq,      // >=
    AndAnd,    // &&
    OrOr,      // ||
    Not,       // !
    Amp,       // &

    // Punctuation
    Semicolon,    // ;
    Comma,        // ,
    Dot,          // .
    DotDotDot,    // ...
    Colon,        // :
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }

    // Comments and whitespace (filtered before parsing)
    LineComment(String),
    BlockComment(String),
    Whitespace,

    // Other
    Unknown,
    Eof,
}

fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "is" => Some(TokenKind::Is),
        "include" => Some(TokenKind::Include),
        "link" => Some(TokenKind::Link),
        "func" => Some(TokenKind::Func),
        "class" => Some(TokenKind::Class),
        "return" => Some(TokenKind::Return),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "for" => Some(TokenKind::For),
        "new" => Some(TokenKind::New),
        "nomangle" => Some(TokenKind::Nomangle),
        "extern" => Some(TokenKind::Extern),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

fn unescape(c: char) -> u8 {
    match c {
        'n' => b'\n',
        't' => b'\t',
        'r' => b'\r',
        '0' => 0,
        '\\' => b'\\',
        '\'' => b'\'',
        '"' => b'"',
        other => other as u8,
    }
}

/// Tokenize a source string into a vector of tokens
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let pos = start;

        match ch {
            // Whitespace
            ' ' | '\t' | '\r' | '\n' => {
                let mut end = pos + ch.len_utf8();
                while let Some((next_pos, next_ch)) = chars.peek().copied() {
                    if matches!(next_ch, ' ' | '\t' | '\r' | '\n') {
                        chars.next();
                        end = next_pos + next_ch.len_utf8();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Whitespace,
                    span: pos..end,
                    text: source[pos..end].to_string(),
                });
            }

            // Line comment `# ...` or block comment `#- ... -#`
            '#' => {
                if matches!(chars.peek(), Some((_, '-'))) {
                    chars.next();
                    let mut end = pos + 2;
                    let mut prev = '\0';
                    for (next_pos, next_ch) in chars.by_ref() {
                        end = next_pos + next_ch.len_utf8();
                        if prev == '-' && next_ch == '#' {
                            break;
                        }
                        prev = next_ch;
                    }
                    tokens.push(Token {
                        kind: TokenKind::BlockComment(source[pos..end].to_string()),
                        span: pos..end,
                        text: source[pos..end].to_string(),
                    });
                } else {
                    let mut end = pos + 1;
                    while let Some((next_pos, next_ch)) = chars.peek().copied() {
                        if next_ch == '\n' {
                            break;
                        }
                        chars.next();
                        end = next_pos + next_ch.len_utf8();
                    }
                    tokens.push(Token {
                        kind: TokenKind::LineComment(source[pos..end].to_string()),
                        span: pos..end,
                        text: source[pos..end].to_string(),
                    });
                }
            }

            // String literal
            '"' => {
                let mut value = String::new();
                let mut end = pos + 1;
                loop {
                    match chars.next() {
                        Some((next_pos, '"')) => {
                            end = next_pos + 1;
                            break;
                        }
                        Some((next_pos, '\\')) => {
                            if let Some((esc_pos, esc)) = chars.next() {
                                value.push(unescape(esc) as char);
                                end = esc_pos + esc.len_utf8();
                            } else {
                                end = next_pos + 1;
                                break;
                            }
                        }
                        Some((next_pos, c)) => {
                            value.push(c);
                            end = next_pos + c.len_utf8();
                        }
                        None => break,
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    span: pos..end,
                    text: source[pos..end].to_string(),
                });
            }

            // Char literal
            '\'' => {
                let mut value = 0u8;
                let mut end = pos + 1;
                match chars.next() {
                    Some((_, '\\')) => {
                        if let Some((_, esc)) = chars.next() {
                            value = unescape(esc);
                        }
                    }
                    Some((_, c)) => value = c as u8,
                    None => {}
                }
                if let Some((close_pos, '\'')) = chars.peek().copied() {
                    chars.next();
                    end = close_pos + 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Char(value),
                    span: pos..end,
                    text: source[pos..end].to_string(),
                });
            }

            // Numbers
            '0'..='9' => {
                let mut end = pos + 1;
                let mut is_float = false;
                while let Some((next_pos, next_ch)) = chars.peek().copied() {
                    if next_ch.is_ascii_digit() {
                        chars.next();
                        end = next_pos + 1;
                    } else if next_ch == '.' && !is_float {
                        // Only consume the dot when a digit follows, so
                        // `1.max` style member access stays intact.
                        let mut ahead = chars.clone();
                        ahead.next();
                        if matches!(ahead.peek(), Some((_, d)) if d.is_ascii_digit()) {
                            is_float = true;
                            chars.next();
                            end = next_pos + 1;
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                let text = &source[pos..end];
                let kind = if is_float {
                    TokenKind::Float(text.parse().unwrap_or(0.0))
                } else {
                    TokenKind::Int(text.parse().unwrap_or(0))
                };
                tokens.push(Token {
                    kind,
                    span: pos..end,
                    text: text.to_string(),
                });
            }

            // Identifiers and keywords
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = pos + 1;
                while let Some((next_pos, next_ch)) = chars.peek().copied() {
                    if next_ch.is_ascii_alphanumeric() || next_ch == '_' {
                        chars.next();
                        end = next_pos + 1;
                    } else {
                        break;
                    }
                }
                let text = &source[pos..end];
                let kind = keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
                tokens.push(Token {
                    kind,
                    span: pos..end,
                    text: text.to_string(),
                });
            }

            // Operators and punctuation
            _ => {
                let next = chars.peek().map(|&(_, c)| c);
                let (kind, len) = match ch {
                    '+' => (TokenKind::Plus, 1),
                    '-' => (TokenKind::Minus, 1),
                    '*' => (TokenKind::Star, 1),
                    '/' => (TokenKind::Slash, 1),
                    '%' => (TokenKind::Percent, 1),
                    '=' if next == Some('=') => (TokenKind::EqEq, 2),
                    '=' => (TokenKind::Eq, 1),
                    '!' if next == Some('=') => (TokenKind::NotEq, 2),
                    '!' => (TokenKind::Not, 1),
                    '<' if next == Some('=') => (TokenKind::LtEq, 2),
                    '<' => (TokenKind::Lt, 1),
                    '>' if next == Some('=') => (TokenKind::GtEq, 2),
                    '>' => (TokenKind::Gt, 1),
                    '&' if next == Some('&') => (TokenKind::AndAnd, 2),
                    '&' => (TokenKind::Amp, 1),
                    '|' if next == Some('|') => (TokenKind::OrOr, 2),
                    ';' => (TokenKind::Semicolon, 1),
                    ',' => (TokenKind::Comma, 1),
                    '.' => {
                        // `...` for variadic parameter lists
                        let mut ahead = chars.clone();
                        if matches!(ahead.next(), Some((_, '.')))
                            && matches!(ahead.next(), Some((_, '.')))
                        {
                            (TokenKind::DotDotDot, 3)
                        } else {
                            (TokenKind::Dot, 1)
                        }
                    }
                    ':' => (TokenKind::Colon, 1),
                    '(' => (TokenKind::LeftParen, 1),
                    ')' => (TokenKind::RightParen, 1),
                    '{' => (TokenKind::LeftBrace, 1),
                    '}' => (TokenKind::RightBrace, 1),
                    _ => (TokenKind::Unknown, 1),
                };
                for _ in 1..len {
                    chars.next();
                }
                let end = pos + len;
                tokens.push(Token {
                    kind,
                    span: pos..end,
                    text: source[pos..end].to_string(),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: source.len()..source.len(),
        text: String::new(),
    });

    tokens
}

/// Tokenize and drop whitespace/comment tokens.
pub fn tokenize_significant(source: &str) -> Vec<Token> {
    tokenize(source)
        .into_iter()
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Whitespace
                    | TokenKind::LineComment(_)
                    | TokenKind::BlockComment(_)
            )
        })
        .collect()
}
