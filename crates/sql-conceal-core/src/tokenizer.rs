//! Lossless SQL tokenizer
//!
//! Lexing is done by `sqlparser`; each token's span is mapped back onto the
//! input so that every byte belongs to exactly one token and concatenating
//! the token texts reproduces the input. Masking relies on that to leave
//! whitespace, comments and punctuation untouched.

use crate::keywords;
use sqlparser::dialect::Dialect;
use sqlparser::tokenizer::{
    Location, Token as SqlToken, TokenWithSpan, Tokenizer, TokenizerError, Whitespace,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    LineComment,
    BlockComment,
    /// `'...'` or `"..."`, quotes included in the token text.
    StringLiteral { quote: char },
    /// `` `...` `` or `[...]`.
    QuotedIdentifier { open: char, close: char },
    Identifier,
    Number,
    Dot,
    Comma,
    LeftParen,
    RightParen,
    Semicolon,
    /// Operators, placeholders, subscripts and prefixed literals such as `N'x'`.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    pub fn is_word(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier | TokenKind::QuotedIdentifier { .. }
        )
    }

    /// Bare identifier equal to `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Bare identifier that is a reserved word or a built-in function.
    pub fn is_reserved(&self) -> bool {
        self.kind == TokenKind::Identifier && keywords::is_reserved_or_builtin(self.text)
    }

    /// Identifier name without its delimiters. Doubled closing delimiters
    /// are kept as written so the name can be put back verbatim.
    pub fn name(&self) -> &'a str {
        match self.kind {
            TokenKind::QuotedIdentifier { open, close } => {
                &self.text[open.len_utf8()..self.text.len() - close.len_utf8()]
            }
            _ => self.text,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),

    #[error("unterminated quoted identifier starting at byte {0}")]
    UnterminatedIdentifier(usize),

    #[error("unterminated block comment starting at byte {0}")]
    UnterminatedComment(usize),

    #[error("cannot tokenize input at byte {0}: {1}")]
    Unexpected(usize, String),
}

impl TokenizeError {
    pub fn offset(&self) -> usize {
        match self {
            TokenizeError::UnterminatedString(offset)
            | TokenizeError::UnterminatedIdentifier(offset)
            | TokenizeError::UnterminatedComment(offset)
            | TokenizeError::Unexpected(offset, _) => *offset,
        }
    }

    // The failing token starts where the last good one ended.
    fn classify(input: &str, offset: usize, error: TokenizerError) -> Self {
        let rest = &input[offset..];
        match rest.chars().next() {
            Some('\'' | '"') => TokenizeError::UnterminatedString(offset),
            Some('`' | '[') => TokenizeError::UnterminatedIdentifier(offset),
            _ if rest.starts_with("/*") => TokenizeError::UnterminatedComment(offset),
            _ => TokenizeError::Unexpected(offset, error.message),
        }
    }
}

/// Generic SQL with MySQL backticks, T-SQL brackets, backslash escapes and
/// double-quoted strings.
#[derive(Debug, Default)]
struct MaskingDialect;

impl Dialect for MaskingDialect {
    fn is_identifier_start(&self, ch: char) -> bool {
        ch.is_alphabetic() || ch == '_'
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '$'
    }

    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '`' || ch == '['
    }

    fn supports_string_literal_backslash_escape(&self) -> bool {
        true
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, TokenizeError> {
    let dialect = MaskingDialect;
    let mut spans: Vec<TokenWithSpan> = Vec::new();
    let result = Tokenizer::new(&dialect, input)
        .with_unescape(false)
        .tokenize_with_location_into_buf(&mut spans);

    let mut cursor = Cursor::new(input);
    let mut starts = Vec::with_capacity(spans.len() + 1);
    for token in &spans {
        starts.push(cursor.seek(token.span.start));
    }
    let end = match spans.last() {
        Some(last) => cursor.seek(last.span.end),
        None => 0,
    };
    starts.push(end);

    if let Err(error) = result {
        return Err(TokenizeError::classify(input, end, error));
    }

    let mut tokens: Vec<Token<'_>> = Vec::with_capacity(spans.len());
    for (i, spanned) in spans.iter().enumerate() {
        let (start, stop) = (starts[i], starts[i + 1]);
        let text = &input[start..stop];
        let kind = kind_of(&spanned.token, text);

        // sqlparser emits one token per whitespace character
        if let Some(previous) = tokens.last_mut() {
            if kind == TokenKind::Whitespace && previous.kind == TokenKind::Whitespace {
                previous.text = &input[previous.offset..stop];
                continue;
            }
        }
        tokens.push(Token {
            kind,
            text,
            offset: start,
        });
    }
    Ok(tokens)
}

fn kind_of(token: &SqlToken, text: &str) -> TokenKind {
    match token {
        SqlToken::Whitespace(Whitespace::SingleLineComment { .. }) => TokenKind::LineComment,
        SqlToken::Whitespace(Whitespace::MultiLineComment(_)) => TokenKind::BlockComment,
        SqlToken::Whitespace(_) => TokenKind::Whitespace,
        SqlToken::SingleQuotedString(_) => TokenKind::StringLiteral { quote: '\'' },
        SqlToken::DoubleQuotedString(_) => TokenKind::StringLiteral { quote: '"' },
        SqlToken::Word(word) => match word.quote_style {
            None => TokenKind::Identifier,
            Some('`') => TokenKind::QuotedIdentifier { open: '`', close: '`' },
            // `arr[1]` is a subscript, `[order id]` a name
            Some('[') if starts_like_name(&text[1..]) => {
                TokenKind::QuotedIdentifier { open: '[', close: ']' }
            }
            Some(_) => TokenKind::Other,
        },
        SqlToken::Number(..) | SqlToken::HexStringLiteral(_) => TokenKind::Number,
        SqlToken::Period => TokenKind::Dot,
        SqlToken::Comma => TokenKind::Comma,
        SqlToken::LParen => TokenKind::LeftParen,
        SqlToken::RParen => TokenKind::RightParen,
        SqlToken::SemiColon => TokenKind::Semicolon,
        _ => TokenKind::Other,
    }
}

fn starts_like_name(text: &str) -> bool {
    text.chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
}

/// Converts sqlparser's 1-based line/column locations into byte offsets.
/// Locations must be visited in increasing order.
struct Cursor<'a> {
    src: &'a str,
    byte: usize,
    line: u64,
    column: u64,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            byte: 0,
            line: 1,
            column: 1,
        }
    }

    fn seek(&mut self, target: Location) -> usize {
        while (self.line, self.column) < (target.line, target.column) {
            let Some(c) = self.src[self.byte..].chars().next() else {
                break;
            };
            self.byte += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.byte
    }
}

/// Splits a quoted literal into its quote character and raw inner content.
pub fn unquote_literal(literal: &str) -> Option<(char, &str)> {
    let quote = literal.chars().next()?;
    if !matches!(quote, '\'' | '"') || literal.len() < 2 || !literal.ends_with(quote) {
        return None;
    }
    Some((quote, &literal[1..literal.len() - 1]))
}

pub fn requote(quote: char, content: &str) -> String {
    format!("{}{}{}", quote, content, quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.kind)
            .collect()
    }

    fn texts(sql: &str) -> Vec<&str> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_tokens_reconstruct_input() {
        let sql = "SELECT a.id, 'it''s' -- note\n/* block */ FROM `my tbl` WHERE x >= 1.5e-3;";
        let tokens = tokenize(sql).unwrap();
        let rebuilt: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, sql);
    }

    #[test]
    fn test_basic_select() {
        assert_eq!(
            texts("SELECT id, email FROM customers"),
            vec!["SELECT", "id", ",", "email", "FROM", "customers"]
        );
        assert_eq!(
            kinds("f(x.y);"),
            vec![
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::RightParen,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(
            texts(r"WHERE a = 'it\'s' AND b = 'x'"),
            vec!["WHERE", "a", "=", r"'it\'s'", "AND", "b", "=", "'x'"]
        );
        assert_eq!(texts("'a''b'"), vec!["'a''b'"]);
        assert_eq!(texts("''"), vec!["''"]);
        assert_eq!(
            kinds(r#""quoted \" text""#),
            vec![TokenKind::StringLiteral { quote: '"' }]
        );
    }

    #[test]
    fn test_unterminated_constructs_fail() {
        assert_eq!(
            tokenize("SELECT 'oops FROM t").unwrap_err(),
            TokenizeError::UnterminatedString(7)
        );
        assert_eq!(
            tokenize("SELECT /* never closed").unwrap_err(),
            TokenizeError::UnterminatedComment(7)
        );
        assert!(matches!(
            tokenize("SELECT `bad").unwrap_err(),
            TokenizeError::UnterminatedIdentifier(_)
        ));
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = tokenize("SELECT [order id], `weird``name` FROM t").unwrap();
        let words: Vec<_> = tokens.iter().filter(|t| t.is_word() && !t.is_reserved()).collect();
        assert_eq!(words[0].name(), "order id");
        assert_eq!(words[1].name(), "weird``name");
        assert_eq!(words[2].name(), "t");
        assert_eq!(words[1].text, "`weird``name`");
    }

    #[test]
    fn test_array_subscript_is_not_identifier() {
        assert_eq!(kinds("arr[1]"), vec![TokenKind::Identifier, TokenKind::Other]);
    }

    #[test]
    fn test_offsets_across_lines_and_multibyte_text() {
        let sql = "SELECT a\n  FROM città\r\nWHERE b = 'x' -- fin\n";
        let tokens = tokenize(sql).unwrap();
        for token in &tokens {
            assert_eq!(&sql[token.offset..token.offset + token.text.len()], token.text);
        }
        let literal = tokens.iter().find(|t| t.text == "'x'").unwrap();
        assert_eq!(literal.offset, sql.find("'x'").unwrap());
        assert_eq!(tokens[1].text, " ");
        assert_eq!(tokens[3].text, "\n  ");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(texts("1.5e-3 0x1F 42"), vec!["1.5e-3", "0x1F", "42"]);
        assert_eq!(kinds("1.5"), vec![TokenKind::Number]);
    }

    #[test]
    fn test_keyword_helpers() {
        let tokens = tokenize("select COUNT").unwrap();
        assert!(tokens[0].is_keyword("SELECT"));
        assert!(tokens[0].is_reserved());
        assert!(tokens[2].is_reserved());
        assert!(!tokens[2].is_keyword("select"));
    }

    #[test]
    fn test_unicode_identifiers() {
        assert_eq!(
            texts("SELECT città FROM négoce"),
            vec!["SELECT", "città", "FROM", "négoce"]
        );
    }

    #[test]
    fn test_unquote_literal() {
        assert_eq!(unquote_literal("'abc'"), Some(('\'', "abc")));
        assert_eq!(unquote_literal("\"abc\""), Some(('"', "abc")));
        assert_eq!(unquote_literal("'abc\""), None);
        assert_eq!(unquote_literal("abc"), None);
        assert_eq!(unquote_literal("'"), None);
        assert_eq!(requote('"', "x"), "\"x\"");
    }
}
