//! Peripheral per-entity tables that ride alongside the DFG and Layout:
//! debug tags, source locations, dynamic vector types, and imported/exported
//! function metadata. None of these carry structural invariants beyond
//! handle validity — they're plain sidecar maps.

use std::collections::HashMap;
use std::rc::Rc;

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::types::Type;

use super::entities::{DynamicType, FuncRef, GlobalValue, Inst, SigRef, StackSlot};

/// A single debug tag attached to an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum DebugTag {
    User(u32),
    StackSlot(StackSlot),
}

/// Per-instruction debug tags, stored as a shared, immutable slice so that
/// copying an instruction's tags to another instruction (`clone_tags`) is a
/// reference-count bump rather than a list copy.
#[derive(Clone, Debug, Default)]
pub struct DebugTags {
    tags: SecondaryMap<Inst, Option<Rc<[DebugTag]>>>,
}

impl DebugTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, inst: Inst, tags: Vec<DebugTag>) {
        self.tags[inst] = if tags.is_empty() {
            None
        } else {
            Some(tags.into())
        };
    }

    pub fn get(&self, inst: Inst) -> &[DebugTag] {
        self.tags[inst].as_deref().unwrap_or(&[])
    }

    /// Attach `from`'s tags to `to` in O(1), sharing the backing slice.
    pub fn clone_tags(&mut self, from: Inst, to: Inst) {
        self.tags[to] = self.tags[from].clone();
    }
}

/// An opaque reference to an interned source file name.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FileId(u32);
entity_impl!(FileId, "file");

/// Deduplicated storage for source file names, so a `SourceLoc` can carry a
/// cheap handle instead of repeating the same path string at every callsite.
#[derive(Clone, Debug, Default)]
pub struct FileTable {
    names: Vec<String>,
    by_name: HashMap<String, FileId>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> FileId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = FileId::from_u32(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: FileId) -> &str {
        &self.names[id.as_u32() as usize]
    }
}

/// A source position: an interned file plus a 1-based line and column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SourceLoc {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

/// Per-instruction source positions. Most instructions (those synthesized by
/// passes rather than traced back to source) have none.
#[derive(Clone, Debug, Default)]
pub struct SourceLocs {
    locs: SecondaryMap<Inst, Option<SourceLoc>>,
}

impl SourceLocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, inst: Inst, loc: SourceLoc) {
        self.locs[inst] = Some(loc);
    }

    pub fn get(&self, inst: Inst) -> Option<SourceLoc> {
        self.locs[inst]
    }
}

/// A fixed-width vector type scaled at runtime by a [`GlobalValue`] — the
/// target of a [`DynamicType`] handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DynamicTypeData {
    pub base_vector_type: Type,
    pub scale_global_value: GlobalValue,
}

/// The argument and return types of a function, referenced by [`SigRef`] and
/// by every [`FuncData`] entry's `sig_ref` field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Signature {
    pub params: Vec<Type>,
    pub returns: Vec<Type>,
}

/// Where a [`FuncRef`] resolves at link time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Linkage {
    Import,
    Export,
    Local,
}

/// Metadata for a callable external function.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FuncData {
    pub external_name: String,
    pub sig_ref: SigRef,
    pub linkage: Linkage,
}

/// The side tables owned by a [`Function`](super::function::Function):
/// debug tags, source locations, dynamic vector types, signatures, and
/// imported/exported function metadata.
#[derive(Clone, Debug, Default)]
pub struct SideTables {
    pub debug_tags: DebugTags,
    pub source_locs: SourceLocs,
    pub dynamic_types: PrimaryMap<DynamicType, DynamicTypeData>,
    pub signatures: PrimaryMap<SigRef, Signature>,
    pub func_refs: PrimaryMap<FuncRef, FuncData>,
}

impl SideTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_signature(&mut self, signature: Signature) -> SigRef {
        self.signatures.push(signature)
    }

    pub fn import_function(&mut self, data: FuncData) -> FuncRef {
        self.func_refs.push(data)
    }

    pub fn make_dynamic_type(&mut self, data: DynamicTypeData) -> DynamicType {
        self.dynamic_types.push(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::entities::Inst;

    #[test]
    fn debug_tags_clone_is_o1_and_shares_storage() {
        let mut tags = DebugTags::new();
        let a = Inst::from_u32(0);
        let b = Inst::from_u32(1);
        tags.set(a, vec![DebugTag::User(7), DebugTag::StackSlot(StackSlot::from_u32(0))]);
        tags.clone_tags(a, b);
        assert_eq!(tags.get(a), tags.get(b));
    }

    #[test]
    fn file_table_deduplicates_by_name() {
        let mut files = FileTable::new();
        let a = files.intern("a.rs");
        let b = files.intern("b.rs");
        let a2 = files.intern("a.rs");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(files.name(a), "a.rs");
    }

    #[test]
    fn signature_and_func_ref_allocation() {
        let mut tables = SideTables::new();
        let sig = tables.make_signature(Signature {
            params: vec![Type::I32],
            returns: vec![Type::I32],
        });
        let f = tables.import_function(FuncData {
            external_name: "memcpy".to_string(),
            sig_ref: sig,
            linkage: Linkage::Import,
        });
        assert_eq!(tables.func_refs[f].external_name, "memcpy");
    }
}
