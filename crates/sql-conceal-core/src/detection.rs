//! Regex-based entity detection and substitution
//!
//! This is the degraded path: it runs when the tokenizer rejects the input
//! (unterminated quotes or comments) and it backs the single-pass
//! substitution used by masking fallback and unmasking.

use crate::config::ExtractionConfig;
use crate::entity::{Category, Entities, QualifiedName};
use crate::error::Result;
use crate::extractor::{is_table_alias, is_too_short, vocabulary, EntityExtractor};
use crate::keywords;
use crate::tokenizer::{unquote_literal, TokenizeError};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

const IDENT: &str = r"[\p{L}_][\p{L}\p{N}_$]*";

static TABLES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:from|join|update|into|table)\s+({IDENT}(?:\.{IDENT}){{0,2}})"
    ))
    .unwrap()
});

static SELECT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bselect\s+(.*?)(?:\bfrom\b|;|$)").unwrap());

static FILTER_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)\b(?:where|having|on)\b(.*?)",
        r"(?:\b(?:group|order|limit|having|union|join)\b|;|$)"
    ))
        .unwrap()
});

static GROUPING_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\b(?:group|order)\s+by\b(.*?)(?:\b(?:having|limit|offset|union)\b|;|$)")
        .unwrap()
});

static STRINGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^'\\]|\\.|'')*'|"(?:[^"\\]|\\.|"")*""#).unwrap()
});

static FUNCTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b({IDENT})\s*\(")).unwrap());

static ALIASES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\bAS\s+({IDENT})")).unwrap());

static IDENTIFIERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b{IDENT}(?:\.{IDENT})*")).unwrap());

#[derive(Debug, Clone)]
pub struct RegexDetectionEngine {
    max_string_literal_len: usize,
    table_alias_max_len: usize,
    min_column_len: usize,
}

impl RegexDetectionEngine {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            max_string_literal_len: config.max_string_literal_len,
            table_alias_max_len: config.table_alias_max_len,
            min_column_len: config.min_column_len,
        }
    }

    fn collect_columns(&self, body: &str, aliases: &HashSet<String>, entities: &mut Entities) {
        for found in IDENTIFIERS.find_iter(body) {
            let rest = body[found.end()..].trim_start();
            if rest.starts_with('(') || rest.starts_with('.') {
                continue;
            }
            if follows_as(&body[..found.start()]) {
                continue;
            }

            let text = found.as_str();
            let column = text.rsplit('.').next().unwrap_or(text);
            if keywords::is_reserved_or_builtin(column)
                || is_too_short(column, self.min_column_len)
                || aliases.contains(column)
            {
                continue;
            }
            entities.add(Category::Column, column);
        }
    }
}

impl EntityExtractor for RegexDetectionEngine {
    fn extract(&self, sql: &str) -> std::result::Result<Entities, TokenizeError> {
        let mut entities = Entities::default();

        for captures in TABLES.captures_iter(sql) {
            let name = &captures[1];
            let reserved = QualifiedName::parse(name)
                .map_or(true, |q| q.parts().iter().any(|p| keywords::is_reserved_or_builtin(p)));
            if !reserved {
                entities.add(Category::Table, name);
            }
        }

        for found in STRINGS.find_iter(sql) {
            if let Some((_, content)) = unquote_literal(found.as_str()) {
                if content.chars().count() <= self.max_string_literal_len {
                    entities.add(Category::StringLiteral, found.as_str());
                }
            }
        }

        // Identifiers inside literals must not leak into the other categories.
        let blanked = STRINGS.replace_all(sql, " ");

        let mut alias_names = HashSet::new();
        for captures in ALIASES.captures_iter(&blanked) {
            let alias = &captures[1];
            if keywords::is_reserved_or_builtin(alias) {
                continue;
            }
            alias_names.insert(alias.to_string());
            if !is_table_alias(alias, self.table_alias_max_len) {
                entities.add(Category::Alias, alias);
            }
        }

        let bodies = [&*SELECT_LIST, &*FILTER_BODY, &*GROUPING_BODY];
        for pattern in bodies {
            for captures in pattern.captures_iter(&blanked) {
                self.collect_columns(&captures[1], &alias_names, &mut entities);
            }
        }

        let table_names: HashSet<&str> = entities.tables.iter().map(String::as_str).collect();
        let mut functions = Vec::new();
        for captures in FUNCTIONS.captures_iter(&blanked) {
            let name = &captures[1];
            if !keywords::is_reserved_or_builtin(name) && !table_names.contains(name) {
                functions.push(name.to_string());
            }
        }
        for function in functions {
            entities.add(Category::Function, function);
        }

        entities.vocabulary = vocabulary(sql);
        debug!(
            "Regex extraction found {} entities in {} bytes",
            entities.total(),
            sql.len()
        );
        Ok(entities)
    }
}

fn follows_as(before: &str) -> bool {
    before
        .trim_end()
        .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("as"))
}

/// Replaces every occurrence of the given originals in one left-to-right pass.
///
/// `literals` match anywhere; `words` match only on word boundaries. At any
/// position literals win over words and longer alternatives win over shorter
/// ones. When the same key appears twice the first pair wins, so callers pass
/// pairs in precedence order. Replaced text is never rescanned.
pub fn substitute(
    text: &str,
    literals: &[(String, String)],
    words: &[(String, String)],
    case_insensitive: bool,
) -> Result<String> {
    let key = |s: &str| {
        if case_insensitive {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    };

    let mut lookup: HashMap<String, String> = HashMap::new();
    let mut alternatives = |pairs: &[(String, String)]| {
        let mut alts: Vec<&str> = Vec::new();
        for (from, to) in pairs {
            if from.is_empty() {
                continue;
            }
            if !lookup.contains_key(&key(from)) {
                lookup.insert(key(from), to.clone());
                alts.push(from.as_str());
            }
        }
        alts.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        alts.into_iter().map(regex::escape).collect::<Vec<_>>()
    };
    let literal_alts = alternatives(literals);
    let word_alts = alternatives(words);

    if literal_alts.is_empty() && word_alts.is_empty() {
        return Ok(text.to_string());
    }

    let mut branches = Vec::new();
    if !literal_alts.is_empty() {
        branches.push(format!("(?:{})", literal_alts.join("|")));
    }
    if !word_alts.is_empty() {
        branches.push(format!(r"\b(?:{})\b", word_alts.join("|")));
    }
    let flags = if case_insensitive { "(?i)" } else { "" };
    let pattern = Regex::new(&format!("{}{}", flags, branches.join("|")))?;

    let replaced = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
        let found = &caps[0];
        lookup
            .get(&key(found))
            .cloned()
            .unwrap_or_else(|| found.to_string())
    });
    Ok(replaced.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_engine() -> RegexDetectionEngine {
        RegexDetectionEngine::new(&ExtractionConfig::default())
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_basic_extraction() {
        let engine = create_test_engine();
        let entities = engine
            .extract("SELECT id, email FROM customers WHERE email = 'a@b.com'")
            .unwrap();

        assert_eq!(entities.tables, vec!["customers"]);
        assert_eq!(entities.columns, vec!["id", "email"]);
        assert_eq!(entities.strings, vec!["'a@b.com'"]);
    }

    #[test]
    fn test_extraction_survives_unterminated_literal() {
        let engine = create_test_engine();
        let entities = engine
            .extract("SELECT order_id FROM sales.orders WHERE note = 'oops")
            .unwrap();

        assert_eq!(entities.tables, vec!["sales.orders"]);
        assert!(entities.columns.contains(&"order_id".to_string()));
        assert!(entities.strings.is_empty());
    }

    #[test]
    fn test_functions_and_aliases() {
        let engine = create_test_engine();
        let entities = engine
            .extract("SELECT calc_margin(price) AS margin_pct, SUM(cost) AS c FROM products")
            .unwrap();

        assert_eq!(entities.functions, vec!["calc_margin"]);
        assert_eq!(entities.aliases, vec!["margin_pct"]);
        assert!(!entities.columns.contains(&"margin_pct".to_string()));
        assert!(!entities.columns.contains(&"c".to_string()));
        assert!(entities.columns.contains(&"price".to_string()));
    }

    #[test]
    fn test_substitute_single_pass() {
        let result = substitute("a_x b_x", &[], &pairs(&[("a_x", "b_x"), ("b_x", "c_x")]), false)
            .unwrap();
        assert_eq!(result, "b_x c_x");
    }

    #[test]
    fn test_substitute_respects_word_boundaries() {
        let words = pairs(&[("col_1", "id")]);
        let result = substitute("col_1, col_10, xcol_1", &[], &words, false).unwrap();
        assert_eq!(result, "id, col_10, xcol_1");
    }

    #[test]
    fn test_substitute_literals_first_and_unbounded() {
        let literals = pairs(&[("'email'", "'string1'")]);
        let words = pairs(&[("email", "col_1")]);
        let result = substitute("email = 'email'", &literals, &words, false).unwrap();
        assert_eq!(result, "col_1 = 'string1'");
    }

    #[test]
    fn test_substitute_case_insensitive_and_first_pair_wins() {
        let words = pairs(&[("orders", "table_1"), ("ORDERS", "col_9")]);
        let result = substitute("FROM Orders", &[], &words, true).unwrap();
        assert_eq!(result, "FROM table_1");
    }

    #[test]
    fn test_substitute_prefers_longer_alternatives() {
        let words = pairs(&[("order", "t1"), ("order total", "c1")]);
        let result = substitute("order total and order", &[], &words, false).unwrap();
        assert_eq!(result, "c1 and t1");
    }

    #[test]
    fn test_substitute_without_pairs() {
        let text = "SELECT 1";
        assert_eq!(substitute(text, &[], &[], true).unwrap(), text);
    }
}
