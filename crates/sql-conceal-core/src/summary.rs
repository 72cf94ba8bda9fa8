//! Query summaries and parse diagnostics

use crate::extractor::SqlAnalyzer;
use crate::tokenizer::{tokenize, Token, TokenKind, TokenizeError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    CteQuery,
    Subqueries,
    Union,
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryType::CteQuery => "Complex CTE Query",
            QueryType::Subqueries => "Query with Subqueries",
            QueryType::Union => "Union Query",
            QueryType::Select => "Select Query",
            QueryType::Insert => "Insert Query",
            QueryType::Update => "Update Query",
            QueryType::Delete => "Delete Query",
            QueryType::Ddl => "Schema Change",
            QueryType::Other => "Complex Query",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlSummary {
    pub query_type: QueryType,
    pub tables: Vec<String>,
    pub cte_count: usize,
    pub lines: usize,
}

/// A non-fatal problem found in the SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    UnterminatedString { offset: usize },
    UnterminatedIdentifier { offset: usize },
    UnterminatedComment { offset: usize },
    UnexpectedCloseParen { offset: usize },
    UnclosedParens { count: usize },
    MissingSemicolon { offset: usize, keyword: String },
    InvalidToken { offset: usize, message: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnterminatedString { offset } => {
                write!(f, "unterminated string literal at byte {}", offset)
            }
            ParseWarning::UnterminatedIdentifier { offset } => {
                write!(f, "unterminated quoted identifier at byte {}", offset)
            }
            ParseWarning::UnterminatedComment { offset } => {
                write!(f, "unterminated block comment at byte {}", offset)
            }
            ParseWarning::UnexpectedCloseParen { offset } => {
                write!(f, "unmatched ')' at byte {}", offset)
            }
            ParseWarning::UnclosedParens { count } => {
                write!(f, "{} unclosed '('", count)
            }
            ParseWarning::MissingSemicolon { offset, keyword } => write!(
                f,
                "{} at byte {} starts a new statement without a preceding ';'",
                keyword, offset
            ),
            ParseWarning::InvalidToken { offset, message } => {
                write!(f, "cannot tokenize input at byte {}: {}", offset, message)
            }
        }
    }
}

impl From<&TokenizeError> for ParseWarning {
    fn from(e: &TokenizeError) -> Self {
        match *e {
            TokenizeError::UnterminatedString(offset) => {
                ParseWarning::UnterminatedString { offset }
            }
            TokenizeError::UnterminatedIdentifier(offset) => {
                ParseWarning::UnterminatedIdentifier { offset }
            }
            TokenizeError::UnterminatedComment(offset) => {
                ParseWarning::UnterminatedComment { offset }
            }
            TokenizeError::Unexpected(offset, ref message) => ParseWarning::InvalidToken {
                offset,
                message: message.clone(),
            },
        }
    }
}

const STATEMENT_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "create", "alter", "drop", "truncate",
];

/// Tokens of `sql` without trivia. If the tokenizer stops early the tokens
/// before the failure are returned together with the error.
fn significant_tokens(sql: &str) -> (Vec<Token<'_>>, Option<TokenizeError>) {
    let (tokens, error) = match tokenize(sql) {
        Ok(tokens) => (tokens, None),
        Err(e) => (tokenize(&sql[..e.offset()]).unwrap_or_default(), Some(e)),
    };
    let tokens = tokens.into_iter().filter(|t| !t.is_trivia()).collect();
    (tokens, error)
}

pub fn summarize(sql: &str) -> SqlSummary {
    let (tokens, _) = significant_tokens(sql);
    let count = |keyword: &str| tokens.iter().filter(|t| t.is_keyword(keyword)).count();

    let first = tokens
        .iter()
        .find(|t| t.kind == TokenKind::Identifier)
        .map(|t| t.text.to_ascii_lowercase())
        .unwrap_or_default();

    let query_type = if count("with") > 0 && count("select") > 0 {
        QueryType::CteQuery
    } else if count("select") > 1 {
        QueryType::Subqueries
    } else if count("union") > 0 {
        QueryType::Union
    } else {
        match first.as_str() {
            "select" => QueryType::Select,
            "insert" => QueryType::Insert,
            "update" => QueryType::Update,
            "delete" => QueryType::Delete,
            "create" | "alter" | "drop" | "truncate" => QueryType::Ddl,
            _ => QueryType::Other,
        }
    };

    SqlSummary {
        query_type,
        tables: SqlAnalyzer::default().analyze(sql).entities.tables,
        cte_count: count_ctes(&tokens),
        lines: sql.lines().count(),
    }
}

// `WITH a AS (...), b AS (...)`: a name followed by AS ( after WITH,
// RECURSIVE or a comma at the top level.
fn count_ctes(tokens: &[Token<'_>]) -> usize {
    let mut depth = 0usize;
    let mut in_with = false;
    let mut count = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth = depth.saturating_sub(1),
            _ if token.is_keyword("with") => in_with = true,
            _ if depth == 0 && token.is_keyword("select") => in_with = false,
            _ if in_with && depth == 0 && token.is_word() => {
                let opens_definition = tokens.get(i + 1).is_some_and(|t| t.is_keyword("as"))
                    && tokens
                        .get(i + 2)
                        .is_some_and(|t| t.kind == TokenKind::LeftParen);
                let after_separator = i > 0
                    && (tokens[i - 1].kind == TokenKind::Comma
                        || tokens[i - 1].is_keyword("with")
                        || tokens[i - 1].is_keyword("recursive"));
                if opens_definition && after_separator {
                    count += 1;
                }
            }
            _ => {}
        }
    }

    count
}

/// Reports unterminated constructs, unbalanced parentheses and statements
/// that run together without a separating semicolon.
pub fn diagnose(sql: &str) -> Vec<ParseWarning> {
    let (tokens, error) = significant_tokens(sql);
    let mut warnings = Vec::new();
    if let Some(e) = &error {
        warnings.push(ParseWarning::from(e));
    }

    let mut depth = 0usize;
    let mut statement_head: Option<String> = None;
    let mut previous: Option<&Token<'_>> = None;

    for token in &tokens {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                if depth == 0 {
                    warnings.push(ParseWarning::UnexpectedCloseParen {
                        offset: token.offset,
                    });
                } else {
                    depth -= 1;
                }
            }
            TokenKind::Semicolon => {
                statement_head = None;
                previous = None;
                continue;
            }
            TokenKind::Identifier => {
                let keyword = token.text.to_ascii_lowercase();
                if depth == 0 && STATEMENT_KEYWORDS.contains(&keyword.as_str()) {
                    let runs_on = match (statement_head.as_deref(), previous) {
                        // ALTER TABLE ... DROP/ADD is one statement
                        (Some("alter"), _) => false,
                        (Some(head), Some(prev)) => ends_statement(prev, head),
                        _ => false,
                    };
                    if runs_on {
                        warnings.push(ParseWarning::MissingSemicolon {
                            offset: token.offset,
                            keyword: token.text.to_ascii_uppercase(),
                        });
                        statement_head = Some(keyword);
                    }
                }
            }
            _ => {}
        }

        if statement_head.is_none() && token.kind == TokenKind::Identifier {
            statement_head = Some(token.text.to_ascii_lowercase());
        }
        previous = Some(token);
    }

    if depth > 0 && error.is_none() {
        warnings.push(ParseWarning::UnclosedParens { count: depth });
    }

    warnings
}

// Whether `prev` can be the last token of a complete statement.
fn ends_statement(prev: &Token<'_>, head: &str) -> bool {
    match prev.kind {
        // trigger events: `AFTER INSERT`, `BEFORE UPDATE`
        TokenKind::Identifier if prev.is_keyword("after") || prev.is_keyword("before") => false,
        TokenKind::Identifier => !prev.is_reserved() || prev.is_keyword("null"),
        TokenKind::QuotedIdentifier { .. }
        | TokenKind::Number
        | TokenKind::StringLiteral { .. } => true,
        // `WITH x AS (...) INSERT` continues the same statement
        TokenKind::RightParen => head != "with",
        _ => false,
    }
}
