//! Placeholder name generation for masked SQL entities

use crate::config::NamingConfig;
use crate::entity::Category;
use crate::keywords;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::{Word, Words};
use fake::Fake;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// `table_1`, `col_1`, `'string1'`
    #[default]
    #[serde(alias = "simple")]
    #[value(alias = "simple")]
    Generic,
    /// Business-flavoured names drawn from themed pools.
    Realistic,
}

impl fmt::Display for NamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingMode::Generic => f.write_str("generic"),
            NamingMode::Realistic => f.write_str("realistic"),
        }
    }
}

impl FromStr for NamingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "simple" => Ok(NamingMode::Generic),
            "realistic" => Ok(NamingMode::Realistic),
            other => Err(format!("unknown naming mode '{}'", other)),
        }
    }
}

// (keywords matched against name segments, replacement pool)
const TABLE_THEMES: &[(&[&str], &[&str])] = &[
    (
        &["order", "purchase", "cart", "basket", "sale"],
        &["sales_orders", "purchase_requests", "order_headers", "order_lines", "checkout_records"],
    ),
    (
        &["customer", "client", "user", "member", "subscriber", "account"],
        &[
            "client_profiles", "member_accounts", "party_registry", "contact_directory",
            "patron_records",
        ],
    ),
    (
        &["product", "item", "sku", "inventory", "catalog", "stock"],
        &["catalog_items", "stock_units", "merchandise", "article_master", "goods_register"],
    ),
    (
        &["payment", "invoice", "billing", "transaction", "ledger", "price"],
        &["ledger_entries", "billing_cycles", "settlement_records", "remittances", "charge_events"],
    ),
    (
        &["employee", "staff", "department", "payroll", "position", "hr"],
        &[
            "workforce_roster", "personnel_files", "team_assignments", "org_units",
            "compensation_runs",
        ],
    ),
    (
        &["shipment", "delivery", "warehouse", "tracking", "carrier", "route"],
        &["consignments", "dispatch_manifests", "depot_stock", "route_legs", "transit_scans"],
    ),
    (
        &["network", "call", "mobile", "phone", "telecom", "sim", "cdr"],
        &["usage_sessions", "line_services", "cell_sites", "traffic_records", "device_links"],
    ),
    (
        &["event", "log", "audit", "session", "click", "activity"],
        &[
            "activity_stream", "journal_entries", "trace_records", "signal_history",
            "interaction_log",
        ],
    ),
];

// (predicate on the lowercased original, replacement pool)
type ColumnRule = (fn(&str) -> bool, &'static [&'static str]);

const COLUMN_RULES: &[ColumnRule] = &[
    (
        |c: &str| c == "id" || c.ends_with("_id"),
        &["ref_id", "key_id", "link_id", "entity_id", "record_id", "source_id"],
    ),
    (
        |c: &str| c.starts_with("is_") || c.starts_with("has_"),
        &["is_flagged", "is_enabled", "has_marker", "is_verified", "has_priority"],
    ),
    (
        |c: &str| {
            c.contains("date") || c.contains("time") || c.ends_with("_at") || c.ends_with("_on")
        },
        &["event_date", "recorded_at", "effective_on", "logged_at", "valid_from"],
    ),
    (
        |c: &str| {
            ["amount", "price", "cost", "total", "balance", "fee", "salary", "revenue"]
                .iter()
                .any(|w| c.contains(w))
        },
        &["gross_value", "net_figure", "unit_rate", "line_value", "charge_amount"],
    ),
    (
        |c: &str| c.contains("name"),
        &["label_text", "display_label", "given_label", "title_text", "short_label"],
    ),
    (
        |c: &str| {
            ["email", "phone", "address", "city", "zip", "postal"]
                .iter()
                .any(|w| c.contains(w))
        },
        &["contact_handle", "reach_point", "locator_text", "channel_ref", "mail_point"],
    ),
    (
        |c: &str| {
            ["count", "qty", "quantity"].iter().any(|w| c.contains(w)) || c.starts_with("num")
        },
        &["item_count", "unit_qty", "tally_value", "volume_units"],
    ),
    (
        |c: &str| ["status", "state", "type", "category", "kind"].iter().any(|w| c.contains(w)),
        &["state_code", "class_code", "lifecycle_flag", "kind_code", "stage_label"],
    ),
];

const TABLE_PREFIXES: &[&str] = &["tbl", "data", "info", "ref", "dim", "fact"];
const TABLE_SUFFIXES: &[&str] = &["", "_data", "_info", "_master", "_detail"];
const COLUMN_SUFFIXES: &[&str] = &["_code", "_value", "_flag", "_ref", "_label"];
const FUNCTION_PREFIXES: &[&str] = &["fn", "proc", "func"];
const FUNCTION_ACTIONS: &[&str] = &["get", "calc", "compute", "resolve", "derive", "apply"];

const BUSINESS_WORDS: &[&str] = &[
    "account", "order", "customer", "product", "service", "item", "transaction", "payment",
    "invoice", "report", "record", "entry", "detail", "summary", "status", "category",
];

const ADJECTIVES: &[&str] = &[
    "primary", "secondary", "main", "staging", "final", "active", "archived", "historical",
    "master", "lookup",
];

const SCHEMA_POOL: &[&str] = &[
    "core", "staging_area", "reporting", "warehouse_zone", "ops", "archive_area", "mart", "landing",
];

const CATALOG_POOL: &[&str] = &[
    "enterprise_hub", "central_store", "data_lake", "main_catalog", "corp_vault",
];

const ALIAS_POOL: &[&str] = &[
    "metric_value", "derived_total", "result_value", "computed_score", "summary_figure",
    "output_value",
];

/// Produces collision-free placeholders for one mapping session.
///
/// All state lives on the instance: counters, used names and the source
/// vocabulary. A placeholder never equals a reserved word, an earlier
/// placeholder, or any word already present in the source.
pub struct NameGenerator {
    rng: StdRng,
    mode: NamingMode,
    counters: [usize; 7],
    used: HashSet<String>,
    vocabulary: HashSet<String>,
}

impl NameGenerator {
    pub fn new(config: &NamingConfig) -> Self {
        Self::with_mode(config.mode, config.seed)
    }

    pub fn with_mode(mode: NamingMode, seed: Option<u64>) -> Self {
        let rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };

        Self {
            rng,
            mode,
            counters: [0; 7],
            used: HashSet::new(),
            vocabulary: HashSet::new(),
        }
    }

    pub fn mode(&self) -> NamingMode {
        self.mode
    }

    /// Words the generated placeholders must avoid.
    pub fn reserve_vocabulary<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.vocabulary
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
    }

    /// Records a placeholder issued elsewhere so it is never handed out again.
    pub fn mark_used(&mut self, placeholder: &str) {
        self.used.insert(bare(placeholder).to_lowercase());
    }

    /// Forgets issued placeholders, counters and the source vocabulary.
    pub fn reset(&mut self) {
        self.counters = [0; 7];
        self.used.clear();
        self.vocabulary.clear();
    }

    pub fn generate(&mut self, category: Category, original: &str) -> String {
        let placeholder = match category {
            Category::StringLiteral => self.string_placeholder(original),
            _ => match self.mode {
                NamingMode::Generic => self.generic_identifier(category),
                NamingMode::Realistic => {
                    let candidate = self.realistic_identifier(category, original);
                    self.disambiguate(candidate)
                }
            },
        };

        self.used.insert(bare(&placeholder).to_lowercase());
        debug!(
            "Generated {} placeholder '{}' for '{}'",
            category, placeholder, original
        );
        placeholder
    }

    fn is_taken(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        keywords::is_reserved_or_builtin(name)
            || self.used.contains(&lowered)
            || self.vocabulary.contains(&lowered)
    }

    fn next_count(&mut self, category: Category) -> usize {
        let counter = &mut self.counters[category.index()];
        *counter += 1;
        *counter
    }

    fn generic_identifier(&mut self, category: Category) -> String {
        let prefix = match category {
            Category::Catalog => "catalog",
            Category::Schema => "schema",
            Category::Table => "table",
            Category::Column => "col",
            Category::Function => "func",
            Category::Alias => "alias",
            Category::StringLiteral => "string",
        };

        loop {
            let candidate = format!("{}_{}", prefix, self.next_count(category));
            if !self.is_taken(&candidate) {
                return candidate;
            }
        }
    }

    /// Appends `_2`, `_3`, ... until the name is free.
    fn disambiguate(&self, candidate: String) -> String {
        if !self.is_taken(&candidate) {
            return candidate;
        }
        (2..)
            .map(|n| format!("{}_{}", candidate, n))
            .find(|name| !self.is_taken(name))
            .unwrap_or(candidate)
    }

    fn pick_free(&mut self, pool: &[&str]) -> Option<String> {
        let free: Vec<&str> = pool
            .iter()
            .copied()
            .filter(|name| !self.is_taken(name))
            .collect();
        free.choose(&mut self.rng).map(|name| name.to_string())
    }

    fn pick(&mut self, pool: &[&'static str]) -> &'static str {
        pool.choose(&mut self.rng).copied().unwrap_or("item")
    }

    fn realistic_identifier(&mut self, category: Category, original: &str) -> String {
        let lowered = original.to_lowercase();
        match category {
            Category::Table => self.realistic_table(&lowered),
            Category::Column => self.realistic_column(&lowered),
            Category::Schema => self
                .pick_free(SCHEMA_POOL)
                .unwrap_or_else(|| format!("{}_zone", self.pick(BUSINESS_WORDS))),
            Category::Catalog => self
                .pick_free(CATALOG_POOL)
                .unwrap_or_else(|| format!("{}_catalog", self.pick(BUSINESS_WORDS))),
            Category::Function => {
                let prefix = self.pick(FUNCTION_PREFIXES);
                let action = self.pick(FUNCTION_ACTIONS);
                let word = self.pick(BUSINESS_WORDS);
                format!("{}_{}_{}", prefix, action, word)
            }
            Category::Alias => self.pick_free(ALIAS_POOL).unwrap_or_else(|| {
                let adjective = self.pick(ADJECTIVES);
                let word = self.pick(BUSINESS_WORDS);
                format!("{}_{}_value", adjective, word)
            }),
            Category::StringLiteral => self.realistic_content(original),
        }
    }

    fn realistic_table(&mut self, lowered: &str) -> String {
        let segments: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .collect();

        let theme = TABLE_THEMES.iter().find(|(keywords, _)| {
            segments
                .iter()
                .any(|segment| keywords.iter().any(|k| segment.starts_with(k)))
        });

        if let Some(name) = theme.and_then(|(_, pool)| self.pick_free(pool)) {
            return name;
        }

        let prefix = self.pick(TABLE_PREFIXES);
        let word = self.pick(BUSINESS_WORDS);
        let suffix = self.pick(TABLE_SUFFIXES);
        format!("{}_{}{}", prefix, word, suffix)
    }

    fn realistic_column(&mut self, lowered: &str) -> String {
        let rule = COLUMN_RULES.iter().find(|(matches, _)| matches(lowered));
        if let Some(name) = rule.and_then(|(_, pool)| self.pick_free(pool)) {
            return name;
        }

        let adjective = self.pick(ADJECTIVES);
        let word = self.pick(BUSINESS_WORDS);
        let suffix = self.pick(COLUMN_SUFFIXES);
        format!("{}_{}{}", adjective, word, suffix)
    }

    fn string_placeholder(&mut self, original: &str) -> String {
        let quote = match original.chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => '\'',
        };

        let content = match self.mode {
            NamingMode::Generic => loop {
                let candidate = format!("string{}", self.next_count(Category::StringLiteral));
                if !self.literal_taken(&candidate) {
                    break candidate;
                }
            },
            NamingMode::Realistic => {
                let candidate = self.realistic_content(original);
                if self.literal_taken(&candidate) {
                    (2..)
                        .map(|n| format!("{}_{}", candidate, n))
                        .find(|c| !self.literal_taken(c))
                        .unwrap_or(candidate)
                } else {
                    candidate
                }
            }
        };

        format!("{}{}{}", quote, content, quote)
    }

    fn literal_taken(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.used.contains(&lowered) || self.vocabulary.contains(&lowered)
    }

    /// Fake value with the same shape as the original literal's content.
    fn realistic_content(&mut self, original: &str) -> String {
        let content = bare(original);

        let value: String = if content.contains('@') && content.contains('.') {
            SafeEmail().fake_with_rng(&mut self.rng)
        } else if !content.is_empty() && content.chars().all(|c| c.is_ascii_digit()) {
            self.random_digits(content.len())
        } else if is_iso_date(content) {
            format!(
                "20{:02}-{:02}-{:02}",
                self.rng.gen_range(0..30),
                self.rng.gen_range(1..=12),
                self.rng.gen_range(1..=28)
            )
        } else if is_code(content) {
            self.scramble(content)
        } else if content.contains(char::is_whitespace) {
            let words: Vec<String> = Words(2..4).fake_with_rng(&mut self.rng);
            words.join(" ")
        } else {
            Word().fake_with_rng(&mut self.rng)
        };

        value
            .chars()
            .filter(|c| !matches!(c, '\'' | '"' | '\\'))
            .collect()
    }

    fn random_digits(&mut self, len: usize) -> String {
        (0..len)
            .map(|i| {
                let low = if i == 0 && len > 1 { 1 } else { 0 };
                char::from(b'0' + self.rng.gen_range(low..10u8))
            })
            .collect()
    }

    fn scramble(&mut self, content: &str) -> String {
        content
            .chars()
            .map(|c| {
                if c.is_ascii_digit() {
                    char::from(b'0' + self.rng.gen_range(0..10u8))
                } else if c.is_ascii_uppercase() {
                    char::from(b'A' + self.rng.gen_range(0..26u8))
                } else if c.is_ascii_lowercase() {
                    char::from(b'a' + self.rng.gen_range(0..26u8))
                } else {
                    c
                }
            })
            .collect()
    }
}

/// Strips matching surrounding quotes, if any.
fn bare(text: &str) -> &str {
    crate::tokenizer::unquote_literal(text).map_or(text, |(_, content)| content)
}

fn is_iso_date(content: &str) -> bool {
    let bytes = content.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

// Identifiers like `AB-1234` or `sku_77x`: letters and digits, no spaces.
fn is_code(content: &str) -> bool {
    !content.is_empty()
        && content
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && content.chars().any(|c| c.is_ascii_digit())
        && content.chars().any(|c| c.is_ascii_alphabetic())
}
