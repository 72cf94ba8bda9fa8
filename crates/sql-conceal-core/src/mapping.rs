//! Category-partitioned mapping table
//!
//! The table is the single source of truth for both directions: masking looks
//! originals up, unmasking looks placeholders up. It serializes to a JSON
//! document so a mapping can be reused across queries and sessions.

use crate::entity::{Category, Entities, QualifiedName};
use crate::error::{ConcealError, Result};
use crate::keywords;
use crate::naming::{NameGenerator, NamingMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub original: String,
    pub placeholder: String,
    pub enabled: bool,
}

/// Seven maps keyed by original text, one per [`Category`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    maps: [BTreeMap<String, MappingEntry>; 7],
    created_at: u64,
    naming_mode: NamingMode,
    session_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingMetadata {
    pub created_at: u64,
    pub naming_mode: NamingMode,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDocument {
    pub placeholder: String,
    pub enabled: bool,
}

/// Serialized form: `{metadata, mappings: {section: {original: entry}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub metadata: MappingMetadata,
    pub mappings: BTreeMap<String, BTreeMap<String, EntryDocument>>,
}

impl MappingDocument {
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingStatistics {
    pub total_mappings: usize,
    pub enabled_mappings: usize,
    pub mappings_by_category: BTreeMap<Category, usize>,
    pub created_at: u64,
}

/// A loaded document was produced under a different naming mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingModeMismatch {
    pub document: NamingMode,
    pub active: NamingMode,
}

impl fmt::Display for NamingModeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mapping was generated in {} mode but {} mode is active; \
             keeping the document's placeholders",
            self.document, self.active
        )
    }
}

#[derive(Debug, Clone)]
pub struct LoadedMapping {
    pub table: MappingTable,
    pub advisory: Option<NamingModeMismatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    created_at: Option<u64>,
    naming_mode: Option<String>,
    session_id: Option<String>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl MappingTable {
    pub fn new(naming_mode: NamingMode) -> Self {
        Self {
            maps: Default::default(),
            created_at: now_secs(),
            naming_mode,
            session_id: Uuid::new_v4(),
        }
    }

    /// Builds a fresh table for `entities`, drawing names from `generator`.
    pub fn build(entities: &Entities, generator: &mut NameGenerator) -> Self {
        let mut table = Self::new(generator.mode());
        table.populate(entities, generator);
        table
    }

    /// Discards every entry and repopulates from `entities`.
    pub fn rebuild(&mut self, entities: &Entities, generator: &mut NameGenerator) {
        self.clear();
        generator.reset();
        self.created_at = now_secs();
        self.naming_mode = generator.mode();
        self.session_id = Uuid::new_v4();
        self.populate(entities, generator);
    }

    pub fn clear(&mut self) {
        for map in &mut self.maps {
            map.clear();
        }
    }

    fn populate(&mut self, entities: &Entities, generator: &mut NameGenerator) {
        generator.reserve_vocabulary(&entities.vocabulary);

        for table in &entities.tables {
            let Some(name) = QualifiedName::parse(table) else {
                continue;
            };
            if let Some(catalog) = &name.catalog {
                self.register(Category::Catalog, catalog, generator);
            }
            if let Some(schema) = &name.schema {
                self.register(Category::Schema, schema, generator);
            }
            self.register(Category::Table, &name.table, generator);
        }

        for category in [
            Category::Column,
            Category::StringLiteral,
            Category::Function,
            Category::Alias,
        ] {
            for original in entities.list(category) {
                self.register(category, original, generator);
            }
        }

        info!(
            "Built mapping table with {} entries ({} mode)",
            self.len(),
            self.naming_mode
        );
    }

    fn register(&mut self, category: Category, original: &str, generator: &mut NameGenerator) {
        if original.is_empty() {
            return;
        }

        if category.is_identifier() {
            if keywords::is_reserved_or_builtin(original) {
                debug!("Not mapping reserved word '{}'", original);
                return;
            }
            if let Some(existing) = self.identifier_category(original) {
                debug!(
                    "'{}' already mapped as {}, skipping {} entry",
                    original, existing, category
                );
                return;
            }
        } else if self.maps[category.index()].contains_key(original) {
            return;
        }

        let placeholder = generator.generate(category, original);
        self.maps[category.index()].insert(
            original.to_string(),
            MappingEntry {
                original: original.to_string(),
                placeholder,
                enabled: true,
            },
        );
    }

    fn identifier_category(&self, original: &str) -> Option<Category> {
        Category::MASK_ORDER
            .into_iter()
            .find(|c| self.maps[c.index()].contains_key(original))
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn naming_mode(&self) -> NamingMode {
        self.naming_mode
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn len(&self) -> usize {
        self.maps.iter().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(BTreeMap::is_empty)
    }

    pub fn get(&self, category: Category, original: &str) -> Option<&MappingEntry> {
        self.maps[category.index()].get(original)
    }

    pub fn entries(&self, category: Category) -> impl Iterator<Item = &MappingEntry> {
        self.maps[category.index()].values()
    }

    /// Inserts an entry read from elsewhere, keeping placeholders unique.
    pub fn insert(&mut self, category: Category, entry: MappingEntry) -> Result<()> {
        let clash = Category::ALL.into_iter().find(|c| {
            self.maps[c.index()].values().any(|e| {
                e.placeholder == entry.placeholder
                    && !(*c == category && e.original == entry.original)
            })
        });
        if clash.is_some() {
            return Err(ConcealError::DuplicatePlaceholder {
                section: category.section().to_string(),
                key: entry.original,
                placeholder: entry.placeholder,
            });
        }
        self.maps[category.index()].insert(entry.original.clone(), entry);
        Ok(())
    }

    pub fn toggle(&mut self, category: Category, original: &str, enabled: bool) -> Result<()> {
        let entry = self.maps[category.index()]
            .get_mut(original)
            .ok_or_else(|| ConcealError::UnknownEntry {
                category,
                original: original.to_string(),
            })?;
        entry.enabled = enabled;
        debug!(
            "{} {} mapping '{}' -> '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            category,
            entry.original,
            entry.placeholder
        );
        Ok(())
    }

    pub fn statistics(&self) -> MappingStatistics {
        let mut mappings_by_category = BTreeMap::new();
        let mut enabled_mappings = 0;

        for category in Category::ALL {
            let map = &self.maps[category.index()];
            mappings_by_category.insert(category, map.len());
            enabled_mappings += map.values().filter(|e| e.enabled).count();
        }

        MappingStatistics {
            total_mappings: self.len(),
            enabled_mappings,
            mappings_by_category,
            created_at: self.created_at,
        }
    }

    pub fn serialize(&self) -> MappingDocument {
        let mappings = Category::ALL
            .into_iter()
            .map(|category| {
                let section = self.maps[category.index()]
                    .values()
                    .map(|e| {
                        (
                            e.original.clone(),
                            EntryDocument {
                                placeholder: e.placeholder.clone(),
                                enabled: e.enabled,
                            },
                        )
                    })
                    .collect();
                (category.section().to_string(), section)
            })
            .collect();

        MappingDocument {
            metadata: MappingMetadata {
                created_at: self.created_at,
                naming_mode: self.naming_mode,
                session_id: self.session_id,
            },
            mappings,
        }
    }

    /// Validates and loads a serialized mapping.
    ///
    /// Accepts the current `{metadata, mappings}` layout and the legacy flat
    /// `{"tables": {"orders": "table_1"}}` layout, where every entry is
    /// enabled. The first invalid entry aborts the load.
    pub fn deserialize(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| ConcealError::InvalidDocument("expected a JSON object".to_string()))?;

        let (metadata, sections) = match root.get("mappings") {
            Some(mappings) => {
                let sections = mappings.as_object().ok_or_else(|| {
                    ConcealError::InvalidDocument("'mappings' must be an object".to_string())
                })?;
                (root.get("metadata"), sections)
            }
            None => (None, root),
        };

        let mut table = Self::from_metadata(metadata)?;
        let mut seen: HashMap<String, (Category, String)> = HashMap::new();

        for (section, entries) in sections {
            let Some(category) = Category::from_section(section) else {
                warn!("Ignoring unknown mapping section '{}'", section);
                continue;
            };
            let entries = entries.as_object().ok_or_else(|| {
                ConcealError::InvalidDocument(format!("section '{}' must be an object", section))
            })?;

            for (key, raw) in entries {
                let entry = parse_entry(category, key, raw)?;
                if let Some((other_category, other_key)) = seen.get(&entry.placeholder) {
                    debug!(
                        "Placeholder '{}' already used by {}.{}",
                        entry.placeholder,
                        other_category.section(),
                        other_key
                    );
                    return Err(ConcealError::DuplicatePlaceholder {
                        section: section.clone(),
                        key: key.clone(),
                        placeholder: entry.placeholder,
                    });
                }
                seen.insert(entry.placeholder.clone(), (category, key.clone()));
                table.maps[category.index()].insert(key.clone(), entry);
            }
        }

        debug!("Deserialized mapping table with {} entries", table.len());
        Ok(table)
    }

    /// Like [`MappingTable::deserialize`], reporting a naming-mode mismatch
    /// instead of coercing the document.
    pub fn load(value: &Value, active_mode: NamingMode) -> Result<LoadedMapping> {
        let table = Self::deserialize(value)?;
        let advisory = (table.naming_mode != active_mode).then_some(NamingModeMismatch {
            document: table.naming_mode,
            active: active_mode,
        });
        if let Some(mismatch) = &advisory {
            warn!("{}", mismatch);
        }
        Ok(LoadedMapping { table, advisory })
    }

    fn from_metadata(metadata: Option<&Value>) -> Result<Self> {
        let raw: RawMetadata = match metadata {
            Some(value) => serde_json::from_value(value.clone())?,
            None => RawMetadata::default(),
        };

        let naming_mode = match raw.naming_mode.as_deref() {
            Some(mode) => mode.parse().unwrap_or_else(|e| {
                warn!("{}, treating mapping as generic", e);
                NamingMode::Generic
            }),
            None => NamingMode::Generic,
        };

        let session_id = match raw.session_id.as_deref() {
            Some(id) => Uuid::parse_str(id).unwrap_or_else(|e| {
                warn!("Invalid session id '{}' ({}), assigning a new one", id, e);
                Uuid::new_v4()
            }),
            None => Uuid::new_v4(),
        };

        Ok(Self {
            maps: Default::default(),
            created_at: raw.created_at.unwrap_or_else(now_secs),
            naming_mode,
            session_id,
        })
    }
}

fn parse_entry(category: Category, key: &str, raw: &Value) -> Result<MappingEntry> {
    let invalid = |reason: &str| ConcealError::InvalidEntry {
        section: category.section().to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("original text is empty"));
    }

    let (placeholder, enabled) = match raw {
        Value::String(placeholder) => (placeholder.clone(), true),
        Value::Object(fields) => {
            let placeholder = match fields.get("placeholder") {
                Some(Value::String(p)) => p.clone(),
                Some(_) => return Err(invalid("'placeholder' must be a string")),
                None => return Err(invalid("missing 'placeholder'")),
            };
            let enabled = match fields.get("enabled") {
                Some(Value::Bool(b)) => *b,
                Some(_) => return Err(invalid("'enabled' must be a boolean")),
                None => true,
            };
            (placeholder, enabled)
        }
        _ => return Err(invalid("expected a placeholder string or an entry object")),
    };

    if placeholder.is_empty() {
        return Err(invalid("placeholder is empty"));
    }
    if category.is_identifier() && keywords::is_reserved_or_builtin(&placeholder) {
        return Err(invalid("placeholder is a reserved word"));
    }

    Ok(MappingEntry {
        original: key.to_string(),
        placeholder,
        enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{EntityExtractor, TokenExtractor};
    use crate::config::ExtractionConfig;
    use serde_json::json;

    fn create_test_entities(sql: &str) -> Entities {
        TokenExtractor::new(&ExtractionConfig::default())
            .extract(sql)
            .unwrap()
    }

    fn create_test_table(sql: &str) -> MappingTable {
        let mut generator = NameGenerator::with_mode(NamingMode::Generic, Some(42));
        MappingTable::build(&create_test_entities(sql), &mut generator)
    }

    fn placeholder(table: &MappingTable, category: Category, original: &str) -> String {
        table.get(category, original).unwrap().placeholder.clone()
    }

    #[test]
    fn test_build_generic_mapping() {
        let table = create_test_table("SELECT id, email FROM customers WHERE email = 'a@b.com'");

        assert_eq!(placeholder(&table, Category::Table, "customers"), "table_1");
        assert_eq!(placeholder(&table, Category::Column, "id"), "col_1");
        assert_eq!(placeholder(&table, Category::Column, "email"), "col_2");
        assert_eq!(placeholder(&table, Category::StringLiteral, "'a@b.com'"), "'string1'");
        assert_eq!(table.len(), 4);
        assert_eq!(table.naming_mode(), NamingMode::Generic);
    }

    #[test]
    fn test_qualified_table_yields_three_entries() {
        let table = create_test_table("SELECT total FROM analytics.sales.orders");

        let catalog = placeholder(&table, Category::Catalog, "analytics");
        let schema = placeholder(&table, Category::Schema, "sales");
        let name = placeholder(&table, Category::Table, "orders");
        assert_eq!(
            (catalog.as_str(), schema.as_str(), name.as_str()),
            ("catalog_1", "schema_1", "table_1")
        );
    }

    #[test]
    fn test_original_registered_once_across_identifier_categories() {
        let mut entities = Entities::default();
        entities.add(Category::Column, "total_due");
        entities.add(Category::Alias, "total_due");
        entities.add(Category::Function, "select");

        let mut generator = NameGenerator::with_mode(NamingMode::Generic, None);
        let table = MappingTable::build(&entities, &mut generator);

        assert!(table.get(Category::Column, "total_due").is_some());
        assert!(table.get(Category::Alias, "total_due").is_none());
        assert!(table.get(Category::Function, "select").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_placeholders_unique_across_categories() {
        let table = create_test_table(
            "SELECT a.order_id, calc_tax(amount) AS tax_amount FROM sales.orders a \
             JOIN crm.customers c ON a.cust_id = c.cust_id WHERE note = 'x' OR note = 'y'",
        );
        let mut seen = std::collections::HashSet::new();
        for category in Category::ALL {
            for entry in table.entries(category) {
                assert!(seen.insert(entry.placeholder.clone()), "duplicate {}", entry.placeholder);
            }
        }
    }

    #[test]
    fn test_toggle() {
        let mut table = create_test_table("SELECT id FROM customers");

        table.toggle(Category::Column, "id", false).unwrap();
        assert!(!table.get(Category::Column, "id").unwrap().enabled);
        assert_eq!(table.statistics().enabled_mappings, 1);

        let err = table.toggle(Category::Column, "missing", true).unwrap_err();
        assert!(matches!(err, ConcealError::UnknownEntry { category: Category::Column, .. }));
    }

    #[test]
    fn test_rebuild_resets_everything() {
        let mut generator = NameGenerator::with_mode(NamingMode::Generic, Some(1));
        let entities = create_test_entities("SELECT id FROM customers");
        let mut table = MappingTable::build(&entities, &mut generator);
        let first_session = table.session_id();

        table.rebuild(&create_test_entities("SELECT sku FROM products"), &mut generator);
        assert!(table.get(Category::Table, "customers").is_none());
        assert_eq!(placeholder(&table, Category::Table, "products"), "table_1");
        assert_eq!(placeholder(&table, Category::Column, "sku"), "col_1");
        assert_ne!(table.session_id(), first_session);
    }

    #[test]
    fn test_serialization_round_trip_is_idempotent() {
        let mut table =
            create_test_table("SELECT id, email FROM crm.customers WHERE email = 'a@b.com'");
        table.toggle(Category::Column, "email", false).unwrap();

        let document = table.serialize();
        let value = document.to_value().unwrap();
        assert_eq!(value["metadata"]["namingMode"], "generic");
        assert_eq!(value["mappings"]["columns"]["email"]["enabled"], false);
        assert_eq!(value["mappings"]["schemas"]["crm"]["placeholder"], "schema_1");

        let restored = MappingTable::deserialize(&value).unwrap();
        assert_eq!(restored, table);
        assert_eq!(restored.serialize(), document);
    }

    #[test]
    fn test_legacy_flat_document() {
        let value = json!({
            "tables": {"orders": "table_1"},
            "columns": {"amount": "col_1"}
        });

        let table = MappingTable::deserialize(&value).unwrap();
        let entry = table.get(Category::Table, "orders").unwrap();
        assert_eq!(entry.placeholder, "table_1");
        assert!(entry.enabled);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_invalid_entry_names_section_and_key() {
        let value = json!({
            "mappings": {
                "tables": {"orders": {"placeholder": "table_1", "enabled": true}},
                "columns": {"amount": {"placeholder": 5}}
            }
        });

        match MappingTable::deserialize(&value).unwrap_err() {
            ConcealError::InvalidEntry { section, key, .. } => {
                assert_eq!(section, "columns");
                assert_eq!(key, "amount");
            }
            other => panic!("unexpected error: {}", other),
        }

        let reserved = json!({"columns": {"amount": "select"}});
        assert!(matches!(
            MappingTable::deserialize(&reserved).unwrap_err(),
            ConcealError::InvalidEntry { .. }
        ));

        assert!(matches!(
            MappingTable::deserialize(&json!([1, 2])).unwrap_err(),
            ConcealError::InvalidDocument(_)
        ));
    }

    #[test]
    fn test_duplicate_placeholders_rejected() {
        let value = json!({
            "mappings": {
                "tables": {"orders": "x_1"},
                "columns": {"amount": "x_1"}
            }
        });

        assert!(matches!(
            MappingTable::deserialize(&value).unwrap_err(),
            ConcealError::DuplicatePlaceholder { .. }
        ));
    }

    #[test]
    fn test_insert_rejects_duplicate_placeholder() {
        let mut table = MappingTable::new(NamingMode::Generic);
        let entry = |original: &str| MappingEntry {
            original: original.to_string(),
            placeholder: "table_1".to_string(),
            enabled: true,
        };

        table.insert(Category::Table, entry("orders")).unwrap();
        table.insert(Category::Table, entry("orders")).unwrap();
        assert!(table.insert(Category::Column, entry("orders")).is_err());
    }

    #[test]
    fn test_load_reports_mode_mismatch() {
        let value = json!({
            "metadata": {
                "createdAt": 1700000000u64,
                "namingMode": "realistic",
                "sessionId": Uuid::new_v4().to_string()
            },
            "mappings": {"tables": {"orders": {"placeholder": "sales_orders", "enabled": true}}}
        });

        let loaded = MappingTable::load(&value, NamingMode::Generic).unwrap();
        let advisory = loaded.advisory.unwrap();
        assert_eq!(advisory.document, NamingMode::Realistic);
        assert_eq!(advisory.active, NamingMode::Generic);
        assert_eq!(loaded.table.created_at(), 1700000000);

        let same = MappingTable::load(&value, NamingMode::Realistic).unwrap();
        assert!(same.advisory.is_none());
    }

    #[test]
    fn test_statistics() {
        let table = create_test_table("SELECT id, email FROM customers WHERE email = 'a@b.com'");
        let stats = table.statistics();

        assert_eq!(stats.total_mappings, 4);
        assert_eq!(stats.enabled_mappings, 4);
        assert_eq!(stats.mappings_by_category[&Category::Column], 2);
        assert_eq!(stats.mappings_by_category[&Category::Catalog], 0);
    }
}
