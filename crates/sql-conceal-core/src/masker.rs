//! Token-level masking

use crate::detection::substitute;
use crate::entity::Category;
use crate::error::Result;
use crate::extractor::split_code_fence;
use crate::mapping::MappingTable;
use crate::tokenizer::{requote, tokenize, unquote_literal, Token, TokenKind};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Replaces originals with placeholders, leaving every other byte untouched.
#[derive(Debug, Clone)]
pub struct Masker {
    strip_code_fences: bool,
}

impl Default for Masker {
    fn default() -> Self {
        Self {
            strip_code_fences: true,
        }
    }
}

impl Masker {
    pub fn new(strip_code_fences: bool) -> Self {
        Self { strip_code_fences }
    }

    /// Masks `text`. When it contains a fenced code block only the block body
    /// is rewritten and the surrounding prose and fences are kept.
    pub fn mask(&self, text: &str, table: &MappingTable) -> Result<String> {
        if self.strip_code_fences {
            if let Some(body) = split_code_fence(text) {
                let masked = mask_sql(&text[body.clone()], table)?;
                return Ok(format!("{}{}{}", &text[..body.start], masked, &text[body.end..]));
            }
        }
        mask_sql(text, table)
    }
}

fn mask_sql(sql: &str, table: &MappingTable) -> Result<String> {
    let index = MaskIndex::new(table);
    match tokenize(sql) {
        Ok(tokens) => Ok(index.mask_tokens(&tokens, sql.len())),
        Err(e) => {
            warn!("Tokenizer failed ({}), masking with regex fallback", e);
            index.mask_with_regex(sql)
        }
    }
}

/// Lookup tables derived from the enabled entries of one mapping table.
struct MaskIndex<'t> {
    identifiers: HashMap<&'t str, &'t str>,
    exact_strings: HashMap<&'t str, &'t str>,
    disabled_strings: HashSet<&'t str>,
    string_contents: HashMap<&'t str, &'t str>,
    literal_pairs: Vec<(String, String)>,
    word_pairs: Vec<(String, String)>,
}

impl<'t> MaskIndex<'t> {
    fn new(table: &'t MappingTable) -> Self {
        let mut identifiers = HashMap::new();
        let mut word_pairs = Vec::new();
        for category in Category::MASK_ORDER {
            for entry in table.entries(category).filter(|e| e.enabled) {
                if crate::keywords::is_reserved_or_builtin(&entry.original) {
                    continue;
                }
                identifiers
                    .entry(entry.original.as_str())
                    .or_insert(entry.placeholder.as_str());
                word_pairs.push((entry.original.clone(), entry.placeholder.clone()));
            }
        }

        // a disabled literal stays as written even if its twin in the other
        // quote style is enabled
        let disabled_strings: HashSet<&str> = table
            .entries(Category::StringLiteral)
            .filter(|e| !e.enabled)
            .map(|e| e.original.as_str())
            .collect();

        let mut exact_strings = HashMap::new();
        let mut string_contents = HashMap::new();
        let mut literal_pairs = Vec::new();
        for entry in table.entries(Category::StringLiteral).filter(|e| e.enabled) {
            exact_strings.insert(entry.original.as_str(), entry.placeholder.as_str());
            literal_pairs.push((entry.original.clone(), entry.placeholder.clone()));

            if let Some((quote, content)) = unquote_literal(&entry.original) {
                let replacement = unquote_literal(&entry.placeholder)
                    .map_or(entry.placeholder.as_str(), |(_, inner)| inner);
                string_contents.entry(content).or_insert(replacement);

                let other = if quote == '\'' { '"' } else { '\'' };
                let twin = requote(other, content);
                if !disabled_strings.contains(twin.as_str()) {
                    literal_pairs.push((twin, requote(other, replacement)));
                }
            }
        }

        debug!(
            "Mask index: {} identifiers, {} string literals",
            identifiers.len(),
            exact_strings.len()
        );

        Self {
            identifiers,
            exact_strings,
            disabled_strings,
            string_contents,
            literal_pairs,
            word_pairs,
        }
    }

    fn mask_tokens(&self, tokens: &[Token<'_>], capacity: usize) -> String {
        let mut out = String::with_capacity(capacity);

        for token in tokens {
            match token.kind {
                TokenKind::StringLiteral { quote } => match self.string(token.text, quote) {
                    Some(placeholder) => out.push_str(&placeholder),
                    None => out.push_str(token.text),
                },
                TokenKind::Identifier if !token.is_reserved() => {
                    out.push_str(self.identifiers.get(token.text).copied().unwrap_or(token.text));
                }
                TokenKind::QuotedIdentifier { open, close } => {
                    match self.identifiers.get(token.name()) {
                        Some(placeholder) => {
                            out.push(open);
                            out.push_str(placeholder);
                            out.push(close);
                        }
                        None => out.push_str(token.text),
                    }
                }
                _ => out.push_str(token.text),
            }
        }

        out
    }

    /// Exact quoted match first, then a content match re-quoted in the
    /// token's own style. Disabled literals never match.
    fn string(&self, text: &str, quote: char) -> Option<String> {
        if self.disabled_strings.contains(text) {
            return None;
        }
        if let Some(placeholder) = self.exact_strings.get(text) {
            return Some(placeholder.to_string());
        }
        let (_, content) = unquote_literal(text)?;
        self.string_contents
            .get(content)
            .map(|replacement| requote(quote, replacement))
    }

    fn mask_with_regex(&self, sql: &str) -> Result<String> {
        substitute(sql, &self.literal_pairs, &self.word_pairs, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingEntry;
    use crate::naming::NamingMode;

    fn create_test_table(entries: &[(Category, &str, &str)]) -> MappingTable {
        let mut table = MappingTable::new(NamingMode::Generic);
        for (category, original, placeholder) in entries {
            table
                .insert(
                    *category,
                    MappingEntry {
                        original: original.to_string(),
                        placeholder: placeholder.to_string(),
                        enabled: true,
                    },
                )
                .unwrap();
        }
        table
    }

    fn mask(sql: &str, table: &MappingTable) -> String {
        Masker::default().mask(sql, table).unwrap()
    }

    #[test]
    fn test_masks_identifiers_and_strings() {
        let table = create_test_table(&[
            (Category::Table, "customers", "table_1"),
            (Category::Column, "id", "col_1"),
            (Category::Column, "email", "col_2"),
            (Category::StringLiteral, "'a@b.com'", "'string1'"),
        ]);

        assert_eq!(
            mask("SELECT id, email FROM customers WHERE email = 'a@b.com'", &table),
            "SELECT col_1, col_2 FROM table_1 WHERE col_2 = 'string1'"
        );
    }

    #[test]
    fn test_preserves_layout_comments_and_keywords() {
        let table = create_test_table(&[(Category::Column, "status", "col_1")]);
        let sql =
            "select\n  status -- status flag\n/* status */ FROM t\tWHERE  status IS NOT NULL;";

        assert_eq!(
            mask(sql, &table),
            "select\n  col_1 -- status flag\n/* status */ FROM t\tWHERE  col_1 IS NOT NULL;"
        );
    }

    #[test]
    fn test_reserved_words_never_substituted() {
        let table = create_test_table(&[(Category::Column, "count", "col_9")]);
        assert_eq!(mask("SELECT COUNT(*) FROM t", &table), "SELECT COUNT(*) FROM t");
    }

    #[test]
    fn test_qualified_segments_masked_independently() {
        let table = create_test_table(&[
            (Category::Catalog, "analytics", "catalog_1"),
            (Category::Schema, "sales", "schema_1"),
            (Category::Table, "orders", "table_1"),
        ]);

        assert_eq!(
            mask("SELECT * FROM analytics.sales.orders", &table),
            "SELECT * FROM catalog_1.schema_1.table_1"
        );
    }

    #[test]
    fn test_quoted_identifiers_keep_delimiters() {
        let table = create_test_table(&[
            (Category::Table, "sales data", "table_1"),
            (Category::Column, "order total", "col_1"),
        ]);

        assert_eq!(
            mask("SELECT [order total] FROM `sales data`", &table),
            "SELECT [col_1] FROM `table_1`"
        );
    }

    #[test]
    fn test_quoted_identifier_with_doubled_delimiter() {
        let table = create_test_table(&[(Category::Table, "weird``name", "table_1")]);
        assert_eq!(
            mask("SELECT id FROM `weird``name`", &table),
            "SELECT id FROM `table_1`"
        );
    }

    #[test]
    fn test_string_content_match_uses_token_quote() {
        let table = create_test_table(&[(Category::StringLiteral, "'abc'", "'string1'")]);
        assert_eq!(mask("WHERE x = \"abc\"", &table), "WHERE x = \"string1\"");
    }

    #[test]
    fn test_disabled_entries_pass_through() {
        let mut table = create_test_table(&[
            (Category::Column, "id", "col_1"),
            (Category::Table, "customers", "table_1"),
        ]);
        table.toggle(Category::Column, "id", false).unwrap();

        assert_eq!(mask("SELECT id FROM customers", &table), "SELECT id FROM table_1");
    }

    #[test]
    fn test_disabled_literal_not_masked_through_other_quote() {
        let mut table = create_test_table(&[
            (Category::StringLiteral, "'xyz'", "'string1'"),
            (Category::StringLiteral, "\"xyz\"", "\"string2\""),
        ]);
        table.toggle(Category::StringLiteral, "'xyz'", false).unwrap();

        assert_eq!(
            mask("WHERE a = 'xyz' AND b = \"xyz\"", &table),
            "WHERE a = 'xyz' AND b = \"string2\""
        );
        // same result on the regex path
        assert_eq!(
            mask("WHERE a = 'xyz' AND b = \"xyz\" AND c = 'open", &table),
            "WHERE a = 'xyz' AND b = \"string2\" AND c = 'open"
        );
    }

    #[test]
    fn test_first_category_in_precedence_wins() {
        let mut table = MappingTable::new(NamingMode::Generic);
        table
            .insert(
                Category::Alias,
                MappingEntry {
                    original: "total".to_string(),
                    placeholder: "alias_1".to_string(),
                    enabled: true,
                },
            )
            .unwrap();
        table
            .insert(
                Category::Column,
                MappingEntry {
                    original: "total".to_string(),
                    placeholder: "col_1".to_string(),
                    enabled: true,
                },
            )
            .unwrap();

        assert_eq!(mask("SELECT total", &table), "SELECT col_1");
    }

    #[test]
    fn test_code_fence_body_only() {
        let table = create_test_table(&[(Category::Table, "orders", "table_1")]);
        let text = "Check this orders query:\n```sql\nSELECT * FROM orders\n```\nDone.";

        assert_eq!(
            mask(text, &table),
            "Check this orders query:\n```sql\nSELECT * FROM table_1\n```\nDone."
        );
    }

    #[test]
    fn test_regex_fallback_on_unterminated_literal() {
        let table = create_test_table(&[
            (Category::Table, "customers", "table_1"),
            (Category::Column, "name", "col_1"),
        ]);

        assert_eq!(
            mask("SELECT Name FROM customers WHERE x = 'oops", &table),
            "SELECT col_1 FROM table_1 WHERE x = 'oops"
        );
    }

    #[test]
    fn test_unknown_identifiers_unchanged() {
        let table = create_test_table(&[(Category::Table, "orders", "table_1")]);
        assert_eq!(mask("SELECT Orders FROM orders", &table), "SELECT Orders FROM table_1");
    }
}
