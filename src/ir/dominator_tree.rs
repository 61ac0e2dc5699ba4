//! Immediate dominators via Lengauer–Tarjan, computed over the blocks
//! reachable from `entry`.
//!
//! DFS numbering, semidominators via a link/eval structure, and immediate
//! dominators are each computed in one pass, matching the textbook
//! three-step algorithm. Unreachable blocks get no entry in the tree:
//! [`DominatorTree::idom`] returns `None` and [`DominatorTree::is_reachable`]
//! returns `false` for them.

use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::SecondaryMap;
use smallvec::SmallVec;

use super::cfg::ControlFlowGraph;
use super::entities::Block;
use super::function::Function;

const NONE: usize = usize::MAX;

/// Path-compressing union-find used to answer "which ancestor of `v` has
/// the smallest semidominator" queries in amortized-near-linear time.
struct LinkEval {
    ancestor: Vec<usize>,
    label: Vec<usize>,
}

impl LinkEval {
    fn new(n: usize) -> Self {
        Self {
            ancestor: vec![NONE; n],
            label: (0..n).collect(),
        }
    }

    fn link(&mut self, parent: usize, child: usize) {
        self.ancestor[child] = parent;
    }

    fn eval(&mut self, semi: &[usize], v: usize) -> usize {
        if self.ancestor[v] == NONE {
            return v;
        }
        self.compress(semi, v);
        self.label[v]
    }

    fn compress(&mut self, semi: &[usize], v: usize) {
        let mut chain = Vec::new();
        let mut x = v;
        while self.ancestor[x] != NONE && self.ancestor[self.ancestor[x]] != NONE {
            chain.push(x);
            x = self.ancestor[x];
        }
        for &node in chain.iter().rev() {
            let anc = self.ancestor[node];
            if semi[self.label[anc]] < semi[self.label[node]] {
                self.label[node] = self.label[anc];
            }
            self.ancestor[node] = self.ancestor[anc];
        }
    }
}

/// The immediate-dominator tree of a [`Function`]'s [`ControlFlowGraph`].
#[derive(Clone, Debug, Default)]
pub struct DominatorTree {
    idom: SecondaryMap<Block, PackedOption<Block>>,
    children: SecondaryMap<Block, SmallVec<[Block; 4]>>,
    reachable: SecondaryMap<Block, bool>,
}

impl DominatorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.idom.clear();
        self.children.clear();
        self.reachable.clear();
    }

    /// Recompute from `cfg`, discarding any previous tree.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        self.clear();
        let Some(entry) = func.layout.entry_block() else {
            return;
        };

        // Step 1: DFS from entry, numbering in preorder.
        let mut dfnum: SecondaryMap<Block, Option<usize>> = SecondaryMap::new();
        let mut vertex: Vec<Block> = Vec::new();
        let mut parent: Vec<usize> = Vec::new();

        dfnum[entry] = Some(0);
        vertex.push(entry);
        parent.push(NONE);
        let mut stack = vec![entry];
        while let Some(b) = stack.pop() {
            let bn = dfnum[b].expect("block pushed onto DFS stack is always numbered");
            for &succ in cfg.successors(b) {
                if dfnum[succ].is_none() {
                    let num = vertex.len();
                    dfnum[succ] = Some(num);
                    vertex.push(succ);
                    parent.push(bn);
                    stack.push(succ);
                }
            }
        }

        let n = vertex.len();
        let mut semi: Vec<usize> = (0..n).collect();
        let mut idom: Vec<usize> = vec![NONE; n];
        let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut le = LinkEval::new(n);

        // Step 2: semidominators, processed in reverse preorder.
        for i in (1..n).rev() {
            let w = vertex[i];
            for pred in cfg.pred_blocks(w) {
                let Some(v) = dfnum[pred] else { continue };
                let u = le.eval(&semi, v);
                if semi[u] < semi[i] {
                    semi[i] = semi[u];
                }
            }
            bucket[semi[i]].push(i);
            le.link(parent[i], i);

            let p = parent[i];
            for v in std::mem::take(&mut bucket[p]) {
                let u = le.eval(&semi, v);
                idom[v] = if semi[u] < semi[v] { u } else { p };
            }
        }

        // Step 3: immediate dominators, processed in preorder.
        for i in 1..n {
            if idom[i] != semi[i] {
                idom[i] = idom[idom[i]];
            }
        }

        for &block in &vertex {
            self.reachable[block] = true;
        }
        for i in 1..n {
            let block = vertex[i];
            let idom_block = vertex[idom[i]];
            self.idom[block] = idom_block.into();
            self.children[idom_block].push(block);
        }
    }

    /// `None` iff `block` is the entry block or unreachable.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom[block].expand()
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.reachable[block]
    }

    pub fn children(&self, block: Block) -> &[Block] {
        &self.children[block]
    }

    /// `true` iff `a == b` or `a` appears on `b`'s `idom` chain.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(idom) = self.idom(cur) {
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }
}
