//! A `Function`: the DFG, the Layout, and the side tables that together
//! describe one compilation unit.

use super::dfg::DataFlowGraph;
use super::layout::Layout;
use super::sidetables::{SideTables, Signature};

/// One function: its own-entity arenas plus its signature and a name for
/// diagnostics. A `Function` is the unit of construction and analysis —
/// nothing here is shared across functions (see the crate's single-threaded
/// ownership model).
#[derive(Clone, Debug, Default)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub side_tables: SideTables,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            side_tables: SideTables::new(),
        }
    }

    pub fn with_name_and_signature(name: impl Into<String>, signature: Signature) -> Self {
        Self::new(name, signature)
    }

    /// Reset to an empty function, keeping the name and signature. Used to
    /// recycle a `Function` allocation across compilations.
    pub fn clear(&mut self) {
        self.dfg.clear();
        self.layout.clear();
        self.side_tables = SideTables::new();
    }
}
