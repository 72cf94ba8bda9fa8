pub mod config;
pub mod detection;
pub mod entity;
pub mod error;
pub mod extractor;
pub mod keywords;
pub mod mapping;
pub mod masker;
pub mod naming;
pub mod session;
pub mod summary;
pub mod tokenizer;
pub mod unmasker;


pub use config::{Config, ExtractionConfig, MappingConfig, NamingConfig};
pub use detection::RegexDetectionEngine;
pub use entity::{Category, Entities, Entity, QualifiedName};
pub use error::{ConcealError, Result};
pub use extractor::{Analysis, EntityExtractor, SqlAnalyzer, TokenExtractor};
pub use mapping::{
    LoadedMapping, MappingDocument, MappingEntry, MappingStatistics, MappingTable,
    NamingModeMismatch,
};
pub use masker::Masker;
pub use naming::{NameGenerator, NamingMode};
pub use session::MaskingSession;
pub use summary::{diagnose, summarize, ParseWarning, QueryType, SqlSummary};
pub use tokenizer::TokenizeError;

use serde_json::Value;

/// Extracts every maskable entity from `sql` with default settings.
pub fn analyze(sql: &str) -> Entities {
    SqlAnalyzer::default().analyze(sql).entities
}

/// Builds a fresh mapping table for `entities`.
pub fn generate_mappings(entities: &Entities, mode: NamingMode) -> MappingTable {
    let mut generator = NameGenerator::with_mode(mode, None);
    MappingTable::build(entities, &mut generator)
}

pub fn mask(sql: &str, table: &MappingTable) -> Result<String> {
    Masker::default().mask(sql, table)
}

pub fn unmask(text: &str, table: &MappingTable) -> Result<String> {
    unmasker::unmask(text, table)
}

pub fn serialize_mapping(table: &MappingTable) -> Result<Value> {
    table.serialize().to_value()
}

pub fn deserialize_mapping(document: &Value) -> Result<MappingTable> {
    MappingTable::deserialize(document)
}
