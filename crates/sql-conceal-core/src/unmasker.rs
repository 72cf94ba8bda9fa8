//! Reverse substitution of placeholders

use crate::detection::substitute;
use crate::entity::Category;
use crate::error::Result;
use crate::mapping::MappingTable;
use crate::tokenizer::{requote, unquote_literal};
use tracing::debug;

/// Restores originals in `text`, which may have been edited or reordered.
///
/// String placeholders match anywhere and in either quote style. Identifier
/// placeholders match whole words only, in alias, function, column, table,
/// schema, catalog order. Everything runs in one left-to-right pass, so an
/// original that was just restored is never rewritten again. Text that is
/// not a known placeholder passes through.
pub fn unmask(text: &str, table: &MappingTable) -> Result<String> {
    let mut literals = Vec::new();
    for entry in table.entries(Category::StringLiteral).filter(|e| e.enabled) {
        literals.push((entry.placeholder.clone(), entry.original.clone()));

        let quoted = unquote_literal(&entry.placeholder).zip(unquote_literal(&entry.original));
        if let Some(((quote, placeholder), (_, original))) = quoted {
            let other = if quote == '\'' { '"' } else { '\'' };
            literals.push((requote(other, placeholder), requote(other, original)));
        }
    }

    let mut words = Vec::new();
    for category in Category::UNMASK_ORDER {
        for entry in table.entries(category).filter(|e| e.enabled) {
            words.push((entry.placeholder.clone(), entry.original.clone()));
        }
    }

    debug!(
        "Unmasking with {} literal and {} identifier placeholders",
        literals.len(),
        words.len()
    );
    substitute(text, &literals, &words, false)
}
