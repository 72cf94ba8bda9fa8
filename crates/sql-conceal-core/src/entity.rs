//! Entity model shared by the extractor, the name generator and the mapping table

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The kind of anonymizable unit an original belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Catalog,
    Schema,
    Table,
    Column,
    StringLiteral,
    Function,
    Alias,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Catalog,
        Category::Schema,
        Category::Table,
        Category::Column,
        Category::StringLiteral,
        Category::Function,
        Category::Alias,
    ];

    /// Lookup order for identifiers while masking: most structural first.
    pub const MASK_ORDER: [Category; 6] = [
        Category::Catalog,
        Category::Schema,
        Category::Table,
        Category::Column,
        Category::Function,
        Category::Alias,
    ];

    /// Replacement order for identifier placeholders while unmasking.
    pub const UNMASK_ORDER: [Category; 6] = [
        Category::Alias,
        Category::Function,
        Category::Column,
        Category::Table,
        Category::Schema,
        Category::Catalog,
    ];

    /// Section name used in serialized mapping documents.
    pub fn section(&self) -> &'static str {
        match self {
            Category::Catalog => "catalogs",
            Category::Schema => "schemas",
            Category::Table => "tables",
            Category::Column => "columns",
            Category::StringLiteral => "strings",
            Category::Function => "functions",
            Category::Alias => "aliases",
        }
    }

    pub fn from_section(section: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.section() == section)
    }

    pub fn is_identifier(&self) -> bool {
        !matches!(self, Category::StringLiteral)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Catalog => "catalog",
            Category::Schema => "schema",
            Category::Table => "table",
            Category::Column => "column",
            Category::StringLiteral => "string",
            Category::Function => "function",
            Category::Alias => "alias",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.to_string() == lowered || c.section() == lowered)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// A single anonymizable unit as found in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub original_text: String,
    pub category: Category,
    pub qualified_parts: Vec<String>,
}

/// A table reference split into its optional qualifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl QualifiedName {
    /// Splits `catalog.schema.table`, `schema.table` or `table`.
    ///
    /// Names with more than three segments keep only the last three.
    pub fn parse(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').filter(|p| !p.is_empty()).collect();
        let (table, rest) = parts.split_last()?;
        let schema = rest.last().map(|s| s.to_string());
        let catalog = if rest.len() >= 2 {
            Some(rest[rest.len() - 2].to_string())
        } else {
            None
        };

        Some(Self {
            catalog,
            schema,
            table: table.to_string(),
        })
    }

    pub fn parts(&self) -> Vec<String> {
        self.catalog
            .iter()
            .chain(self.schema.iter())
            .cloned()
            .chain(std::iter::once(self.table.clone()))
            .collect()
    }
}

/// Everything the extractor found, de-duplicated in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub tables: Vec<String>,
    pub columns: Vec<String>,
    pub strings: Vec<String>,
    pub functions: Vec<String>,
    pub aliases: Vec<String>,
    /// Lowercased words present anywhere in the source, including comments
    /// and literal contents. Placeholders must never coincide with them.
    #[serde(default, skip_serializing)]
    pub vocabulary: BTreeSet<String>,
}

impl Entities {
    /// Appends `value` to the list for `category` unless already present.
    ///
    /// Catalog and schema names are derived from qualified tables and have no
    /// list of their own; adding them is a no-op.
    pub fn add(&mut self, category: Category, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        if let Some(list) = self.list_mut(category) {
            if !list.contains(&value) {
                list.push(value);
            }
        }
    }

    pub fn list(&self, category: Category) -> &[String] {
        match category {
            Category::Table => &self.tables,
            Category::Column => &self.columns,
            Category::StringLiteral => &self.strings,
            Category::Function => &self.functions,
            Category::Alias => &self.aliases,
            Category::Catalog | Category::Schema => &[],
        }
    }

    fn list_mut(&mut self, category: Category) -> Option<&mut Vec<String>> {
        match category {
            Category::Table => Some(&mut self.tables),
            Category::Column => Some(&mut self.columns),
            Category::StringLiteral => Some(&mut self.strings),
            Category::Function => Some(&mut self.functions),
            Category::Alias => Some(&mut self.aliases),
            Category::Catalog | Category::Schema => None,
        }
    }

    pub fn total(&self) -> usize {
        self.tables.len()
            + self.columns.len()
            + self.strings.len()
            + self.functions.len()
            + self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Flattens the lists into [`Entity`] values; tables carry their segments.
    pub fn to_entities(&self) -> Vec<Entity> {
        let mut entities = Vec::with_capacity(self.total());

        for table in &self.tables {
            let qualified_parts = QualifiedName::parse(table)
                .map(|q| q.parts())
                .unwrap_or_default();
            entities.push(Entity {
                original_text: table.clone(),
                category: Category::Table,
                qualified_parts,
            });
        }

        for category in [
            Category::Column,
            Category::StringLiteral,
            Category::Function,
            Category::Alias,
        ] {
            for value in self.list(category) {
                entities.push(Entity {
                    original_text: value.clone(),
                    category,
                    qualified_parts: Vec::new(),
                });
            }
        }

        entities
    }
}
