//! Opaque enum symbol tables
//!
//! Enum values travel on the wire as short opaque symbols so that renaming a
//! variant internally never breaks wire compatibility. Each enum owns exactly
//! one bidirectional table, checked for uniqueness in both directions when a
//! type using it is registered.

use super::error::RegistryError;
use std::collections::HashSet;

/// Bidirectional mapping between local variant names and wire symbols
#[derive(Debug)]
pub struct SymbolTable {
    name: &'static str,
    entries: &'static [(&'static str, &'static str)],
}

impl SymbolTable {
    /// Entries are `(local_name, symbol)` pairs.
    pub const fn new(name: &'static str, entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { name, entries }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn symbol_for(&self, local: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(l, _)| *l == local)
            .map(|(_, s)| *s)
    }

    pub fn local_for(&self, symbol: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, s)| *s == symbol)
            .map(|(l, _)| *l)
    }

    pub fn locals(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(l, _)| *l)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(_, s)| *s)
    }

    /// Verify the table is a bijection
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut locals = HashSet::new();
        let mut symbols = HashSet::new();
        for (local, symbol) in self.entries {
            if !locals.insert(*local) {
                return Err(RegistryError::DuplicateLocalName {
                    table: self.name,
                    local: local.to_string(),
                });
            }
            if !symbols.insert(*symbol) {
                return Err(RegistryError::DuplicateSymbol {
                    table: self.name,
                    symbol: symbol.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Implemented by every enum carried on the wire.
///
/// The serde representation of the enum is its local name; the codec maps it
/// through [`GtEnum::TABLE`] on the way in and out.
pub trait GtEnum: Sized + Copy + 'static {
    const TABLE: &'static SymbolTable;

    fn as_local(&self) -> &'static str;

    fn from_local(local: &str) -> Option<Self>;

    fn symbol(&self) -> &'static str;

    fn from_symbol(symbol: &str) -> Option<Self> {
        Self::TABLE.local_for(symbol).and_then(Self::from_local)
    }
}
