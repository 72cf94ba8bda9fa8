//! SQL entity extraction over the token stream, with a regex fallback

use crate::config::ExtractionConfig;
use crate::detection::RegexDetectionEngine;
use crate::entity::{Category, Entities};
use crate::keywords;
use crate::summary::{diagnose, ParseWarning};
use crate::tokenizer::{tokenize, unquote_literal, Token, TokenKind, TokenizeError};
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::{debug, warn};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n)?(.*?)```").unwrap()
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}_][\p{L}\p{N}_$]*").unwrap());

/// Anything that can pull entities out of SQL text.
pub trait EntityExtractor {
    fn extract(&self, sql: &str) -> Result<Entities, TokenizeError>;
}

/// Byte range of the body of the first fenced code block, if any.
pub fn split_code_fence(text: &str) -> Option<Range<usize>> {
    CODE_FENCE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.range())
}

pub fn unwrap_sql_block(text: &str) -> &str {
    split_code_fence(text).map_or(text, |range| &text[range])
}

/// Lowercased words of `text`, comments and literal contents included.
pub fn vocabulary(text: &str) -> BTreeSet<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Short purely alphabetic names are table aliases (`c`, `ord`) and are left alone.
pub(crate) fn is_table_alias(name: &str, max_len: usize) -> bool {
    name.chars().count() <= max_len && name.chars().all(char::is_alphabetic)
}

pub(crate) fn is_too_short(name: &str, min_len: usize) -> bool {
    name.chars().count() < min_len && name.chars().all(char::is_alphabetic)
}

/// Result of [`SqlAnalyzer::analyze`].
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub entities: Entities,
    pub warnings: Vec<ParseWarning>,
    /// The tokenizer gave up and the regex engine produced `entities`.
    pub degraded: bool,
}

/// Tokenizer-driven extraction with the regex engine as a safety net.
pub struct SqlAnalyzer {
    extractor: TokenExtractor,
    fallback: RegexDetectionEngine,
    strip_code_fences: bool,
}

impl SqlAnalyzer {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            extractor: TokenExtractor::new(config),
            fallback: RegexDetectionEngine::new(config),
            strip_code_fences: config.strip_code_fences,
        }
    }

    pub fn analyze(&self, text: &str) -> Analysis {
        let sql = if self.strip_code_fences {
            unwrap_sql_block(text)
        } else {
            text
        };
        let warnings = diagnose(sql);

        let (mut entities, degraded) = match self.extractor.extract(sql) {
            Ok(entities) => (entities, false),
            Err(e) => {
                warn!("Tokenizer failed ({}), falling back to regex extraction", e);
                (self.fallback.extract(sql).unwrap_or_default(), true)
            }
        };
        // prose around a fenced block can contain placeholder-like words too
        entities.vocabulary = vocabulary(text);

        Analysis {
            entities,
            warnings,
            degraded,
        }
    }
}

impl Default for SqlAnalyzer {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

/// Extracts entities by walking the token stream with a small clause tracker.
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    max_string_literal_len: usize,
    table_alias_max_len: usize,
    min_column_len: usize,
}

impl TokenExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            max_string_literal_len: config.max_string_literal_len,
            table_alias_max_len: config.table_alias_max_len,
            min_column_len: config.min_column_len,
        }
    }
}

impl EntityExtractor for TokenExtractor {
    fn extract(&self, sql: &str) -> Result<Entities, TokenizeError> {
        let tokens: Vec<Token<'_>> = tokenize(sql)?
            .into_iter()
            .filter(|t| !t.is_trivia())
            .collect();

        let mut entities = Walker::new(self, &tokens).run();
        entities.vocabulary = vocabulary(sql);

        debug!(
            "Extracted {} tables, {} columns, {} strings, {} functions, {} aliases",
            entities.tables.len(),
            entities.columns.len(),
            entities.strings.len(),
            entities.functions.len(),
            entities.aliases.len()
        );
        Ok(entities)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    None,
    Select,
    From,
    Where,
    Grouping,
    Having,
    On,
    Set,
    Values,
    Columns,
    Other,
}

impl Clause {
    fn collects_columns(self) -> bool {
        matches!(
            self,
            Clause::Select
                | Clause::Where
                | Clause::Grouping
                | Clause::Having
                | Clause::On
                | Clause::Set
                | Clause::Columns
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableContext {
    From,
    Into,
    Update,
    Ddl,
    References,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    clause: Clause,
    in_call: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            clause: Clause::None,
            in_call: false,
        }
    }
}

// Words that may sit between a table-introducing keyword and the name.
const TABLE_PREFIX_WORDS: &[&str] = &[
    "table", "view", "if", "not", "exists", "only", "lateral", "ignore", "or", "replace",
    "temporary", "temp", "materialized", "unique",
];

struct Walker<'t, 'a> {
    config: &'t TokenExtractor,
    tokens: &'t [Token<'a>],
    pos: usize,
    frame: Frame,
    stack: Vec<Frame>,
    expect_table: Option<TableContext>,
    after_table: bool,
    column_list_pending: bool,
    ddl_pending: bool,
    alter_pending: bool,
    index_pending: bool,
    entities: Entities,
}

impl<'t, 'a> Walker<'t, 'a> {
    fn new(config: &'t TokenExtractor, tokens: &'t [Token<'a>]) -> Self {
        Self {
            config,
            tokens,
            pos: 0,
            frame: Frame::default(),
            stack: Vec::new(),
            expect_table: None,
            after_table: false,
            column_list_pending: false,
            ddl_pending: false,
            alter_pending: false,
            index_pending: false,
            entities: Entities::default(),
        }
    }

    fn run(mut self) -> Entities {
        while let Some(&token) = self.tokens.get(self.pos) {
            let after_table = std::mem::take(&mut self.after_table);
            match token.kind {
                TokenKind::StringLiteral { .. } => self.string_literal(token),
                TokenKind::LeftParen => self.open_paren(),
                TokenKind::RightParen => self.close_paren(),
                TokenKind::Comma => {
                    if self.frame.clause == Clause::From && !self.frame.in_call {
                        self.expect_table = Some(TableContext::From);
                    }
                }
                TokenKind::Semicolon => self.reset(),
                TokenKind::Identifier if token.is_reserved() => self.keyword(token),
                TokenKind::Identifier | TokenKind::QuotedIdentifier { .. } => {
                    self.word(after_table);
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.entities
    }

    fn peek(&self, ahead: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + ahead)
    }

    fn previous(&self) -> Option<&Token<'a>> {
        self.pos.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    fn reset(&mut self) {
        self.frame = Frame::default();
        self.stack.clear();
        self.expect_table = None;
        self.column_list_pending = false;
        self.ddl_pending = false;
        self.alter_pending = false;
        self.index_pending = false;
    }

    fn string_literal(&mut self, token: Token<'a>) {
        let Some((_, content)) = unquote_literal(token.text) else {
            return;
        };
        if content.chars().count() <= self.config.max_string_literal_len {
            self.entities.add(Category::StringLiteral, token.text);
        } else {
            debug!("Skipping string literal of {} chars", content.chars().count());
        }
    }

    fn open_paren(&mut self) {
        let in_call = self.previous().is_some_and(opens_call);
        self.expect_table = None;

        let clause = if std::mem::take(&mut self.column_list_pending) {
            Clause::Columns
        } else if self.frame.clause == Clause::From {
            Clause::Other
        } else {
            self.frame.clause
        };

        self.stack.push(self.frame);
        self.frame = Frame { clause, in_call };
    }

    fn close_paren(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.frame = frame;
        }
        self.expect_table = None;
        self.column_list_pending = false;
        // `FROM (...) alias`
        if self.frame.clause == Clause::From {
            self.after_table = true;
        }
    }

    fn keyword(&mut self, token: Token<'a>) {
        let keyword = token.text.to_ascii_lowercase();

        if self.expect_table.is_some() {
            if TABLE_PREFIX_WORDS.contains(&keyword.as_str()) {
                return;
            }
            self.expect_table = None;
        }

        match keyword.as_str() {
            "select" | "returning" => self.frame.clause = Clause::Select,
            "from" if !self.frame.in_call => {
                self.frame.clause = Clause::From;
                self.expect_table = Some(TableContext::From);
            }
            "join" => {
                self.frame.clause = Clause::From;
                self.expect_table = Some(TableContext::From);
            }
            "where" | "qualify" => self.frame.clause = Clause::Where,
            "group" | "order" | "partition" if self.peek(1).is_some_and(|t| t.is_keyword("by")) => {
                self.frame.clause = Clause::Grouping;
            }
            "having" => self.frame.clause = Clause::Having,
            "on" if self.index_pending => {
                self.index_pending = false;
                self.expect_table = Some(TableContext::Ddl);
            }
            "on" | "using" => self.frame.clause = Clause::On,
            "set" => self.frame.clause = Clause::Set,
            "values" => self.frame.clause = Clause::Values,
            "into" => {
                self.frame.clause = Clause::Other;
                self.expect_table = Some(TableContext::Into);
            }
            "update" => {
                self.frame.clause = Clause::Other;
                self.expect_table = Some(TableContext::Update);
            }
            "references" => self.expect_table = Some(TableContext::References),
            "create" | "alter" | "drop" => {
                self.frame.clause = Clause::None;
                self.ddl_pending = true;
                self.alter_pending = keyword == "alter";
            }
            "truncate" => {
                self.frame.clause = Clause::None;
                self.expect_table = Some(TableContext::Ddl);
            }
            "table" | "view" if self.ddl_pending => {
                self.ddl_pending = false;
                self.expect_table = Some(TableContext::Ddl);
            }
            "index" if self.ddl_pending => {
                self.ddl_pending = false;
                self.index_pending = true;
            }
            "union" | "intersect" | "except" | "minus" | "with" => self.frame.clause = Clause::None,
            "limit" | "offset" | "fetch" | "window" => self.frame.clause = Clause::Other,
            "as" => self.explicit_alias(),
            _ => {}
        }
    }

    fn explicit_alias(&mut self) {
        let Some(next) = self.peek(1).copied() else {
            return;
        };
        if !next.is_word() || next.is_reserved() {
            return;
        }
        // CAST(x AS type) names a type, not an alias
        if !self.frame.in_call {
            self.add_alias(&next.name());
        }
        self.pos += 1;
    }

    /// Reads `word(.word)*` starting at the current position. Returns the
    /// segments and the index just past the chain; a trailing `.*` is consumed.
    fn read_chain(&self) -> (Vec<Token<'a>>, usize) {
        let mut segments = vec![self.tokens[self.pos]];
        let mut end = self.pos + 1;

        while self.tokens.get(end).is_some_and(|t| t.kind == TokenKind::Dot) {
            match self.tokens.get(end + 1) {
                Some(next) if next.is_word() => {
                    segments.push(*next);
                    end += 2;
                }
                Some(next) if next.text == "*" => {
                    end += 2;
                    break;
                }
                _ => break,
            }
        }

        (segments, end)
    }

    fn word(&mut self, after_table: bool) {
        if let Some(context) = self.expect_table.take() {
            self.table_reference(context);
            return;
        }

        let token = self.tokens[self.pos];
        if after_table {
            self.add_alias(&token.name());
            self.pos += 1;
            return;
        }

        let (segments, end) = self.read_chain();
        let calls = self
            .tokens
            .get(end)
            .is_some_and(|t| t.kind == TokenKind::LeftParen);
        let starred = self.tokens[end - 1].text == "*";

        if calls {
            if let Some(last) = segments.last().filter(|t| !t.is_reserved()) {
                self.entities.add(Category::Function, last.name());
            }
        } else if self.frame.clause.collects_columns() && !starred {
            if segments.len() == 1 && self.is_implicit_select_alias() {
                self.add_alias(&token.name());
            } else if let Some(last) = segments.last() {
                self.add_column(&last.name());
            }
        }

        self.pos = end;
    }

    fn table_reference(&mut self, context: TableContext) {
        let (segments, end) = self.read_chain();
        let followed_by_paren = self
            .tokens
            .get(end)
            .is_some_and(|t| t.kind == TokenKind::LeftParen);
        self.pos = end;

        // Table-valued function in FROM
        if context == TableContext::From && followed_by_paren {
            if let Some(last) = segments.last().filter(|t| !t.is_reserved()) {
                self.entities.add(Category::Function, last.name());
            }
            return;
        }

        let name = segments
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(".");
        debug!("Table reference: {}", name);
        self.entities.add(Category::Table, name);

        match context {
            TableContext::From | TableContext::Update => self.after_table = true,
            TableContext::Into | TableContext::Ddl | TableContext::References => {
                if followed_by_paren {
                    self.column_list_pending = true;
                } else if context == TableContext::Ddl && self.alter_pending {
                    self.alter_pending = false;
                    self.frame.clause = Clause::Columns;
                }
            }
        }
    }

    /// `SELECT amount total`: a lone word directly after a complete expression.
    fn is_implicit_select_alias(&self) -> bool {
        if self.frame.clause != Clause::Select || self.frame.in_call {
            return false;
        }
        let Some(previous) = self.previous() else {
            return false;
        };
        match previous.kind {
            TokenKind::Identifier => !previous.is_reserved() || previous.is_keyword("end"),
            TokenKind::QuotedIdentifier { .. }
            | TokenKind::RightParen
            | TokenKind::StringLiteral { .. } => true,
            // `SELECT TOP 10 name`
            TokenKind::Number => !self
                .pos
                .checked_sub(2)
                .and_then(|i| self.tokens.get(i))
                .is_some_and(|t| t.is_keyword("top")),
            _ => false,
        }
    }

    fn add_column(&mut self, name: &str) {
        if name == "*"
            || keywords::is_reserved_or_builtin(name)
            || is_too_short(name, self.config.min_column_len)
        {
            return;
        }
        self.entities.add(Category::Column, name);
    }

    fn add_alias(&mut self, name: &str) {
        if keywords::is_reserved_or_builtin(name)
            || is_table_alias(name, self.config.table_alias_max_len)
        {
            return;
        }
        self.entities.add(Category::Alias, name);
    }
}

fn opens_call(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::Identifier => {
            !keywords::is_keyword(token.text) || keywords::is_builtin_function(token.text)
        }
        TokenKind::QuotedIdentifier { .. } => true,
        _ => false,
    }
}
