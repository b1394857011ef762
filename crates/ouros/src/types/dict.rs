//! User-visible `dict` type.
//!
//! A thin wrapper over the CORE [`Table`](crate::table::Table) -- the same
//! quadratic-probe table backs dicts, globals, and attribute maps
//! (`spec.md` §3). Keeping `Dict` a near-transparent wrapper is deliberate:
//! it is the table that is the CORE subsystem, not this wrapper.

use crate::table::Table;

#[derive(Debug, Default)]
pub(crate) struct Dict {
    table: Table,
}

impl Dict {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn table(&self) -> &Table {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }
}
