//! Masking session: one analyzer, one generator and one mapping table

use crate::config::Config;
use crate::entity::Category;
use crate::error::Result;
use crate::extractor::{Analysis, SqlAnalyzer};
use crate::mapping::{MappingDocument, MappingStatistics, MappingTable, NamingModeMismatch};
use crate::masker::Masker;
use crate::naming::{NameGenerator, NamingMode};
use crate::unmasker;
use serde_json::Value;
use tracing::{info, warn};

/// Holds the state that has to survive between masking a query and
/// unmasking the reply to it.
pub struct MaskingSession {
    config: Config,
    analyzer: SqlAnalyzer,
    masker: Masker,
    generator: NameGenerator,
    table: Option<MappingTable>,
}

impl MaskingSession {
    pub fn new(config: Config) -> Self {
        let analyzer = SqlAnalyzer::new(&config.extraction);
        let masker = Masker::new(config.extraction.strip_code_fences);
        let generator = NameGenerator::new(&config.naming);

        info!("Starting masking session ({} mode)", generator.mode());
        Self {
            config,
            analyzer,
            masker,
            generator,
            table: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn naming_mode(&self) -> NamingMode {
        self.generator.mode()
    }

    /// Switches the naming mode for mappings built from now on. A mapping
    /// that already exists keeps its placeholders.
    pub fn set_naming_mode(&mut self, mode: NamingMode) {
        if mode != self.generator.mode() {
            self.config.naming.mode = mode;
            self.generator = NameGenerator::new(&self.config.naming);
        }
    }

    /// Analyzes `sql` and replaces the current mapping with one built from it.
    pub fn analyze(&mut self, sql: &str) -> Analysis {
        let analysis = self.analyzer.analyze(sql);
        for warning in &analysis.warnings {
            warn!("{}", warning);
        }

        match &mut self.table {
            Some(table) => table.rebuild(&analysis.entities, &mut self.generator),
            None => {
                self.generator.reset();
                self.table = Some(MappingTable::build(&analysis.entities, &mut self.generator));
            }
        }

        info!(
            "Analyzed query: {} entities, {} warnings{}",
            analysis.entities.total(),
            analysis.warnings.len(),
            if analysis.degraded { " (regex fallback)" } else { "" }
        );
        analysis
    }

    /// Masks `sql` with the current mapping, building one first if the
    /// session has none.
    pub fn mask(&mut self, sql: &str) -> Result<String> {
        if self.table.is_none() {
            self.analyze(sql);
        }
        match &self.table {
            Some(table) => self.masker.mask(sql, table),
            None => Ok(sql.to_string()),
        }
    }

    /// Restores originals in `text`. Without a mapping the text is returned
    /// as is.
    pub fn unmask(&self, text: &str) -> Result<String> {
        match &self.table {
            Some(table) => unmasker::unmask(text, table),
            None => {
                warn!("No mapping loaded, returning text unchanged");
                Ok(text.to_string())
            }
        }
    }

    /// Replaces the current mapping with a serialized one. Returns the
    /// naming-mode mismatch, if any, so callers can surface it.
    pub fn load_mapping(&mut self, document: &Value) -> Result<Option<NamingModeMismatch>> {
        let loaded = MappingTable::load(document, self.generator.mode())?;

        self.generator.reset();
        for category in Category::ALL {
            for entry in loaded.table.entries(category) {
                self.generator.mark_used(&entry.placeholder);
            }
        }

        info!(
            "Loaded mapping {} with {} entries",
            loaded.table.session_id(),
            loaded.table.len()
        );
        self.table = Some(loaded.table);
        Ok(loaded.advisory)
    }

    pub fn mapping(&self) -> Option<&MappingTable> {
        self.table.as_ref()
    }

    pub fn serialize_mapping(&self) -> Option<MappingDocument> {
        self.table.as_ref().map(MappingTable::serialize)
    }

    pub fn toggle(&mut self, category: Category, original: &str, enabled: bool) -> Result<()> {
        match &mut self.table {
            Some(table) => table.toggle(category, original, enabled),
            None => Err(crate::error::ConcealError::UnknownEntry {
                category,
                original: original.to_string(),
            }),
        }
    }

    pub fn statistics(&self) -> Option<MappingStatistics> {
        self.table.as_ref().map(MappingTable::statistics)
    }

    pub fn clear(&mut self) {
        self.table = None;
        self.generator.reset();
        info!("Cleared session mapping");
    }
}

impl Default for MaskingSession {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
