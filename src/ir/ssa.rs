//! On-demand SSA construction (Braun, Buchwald, Hack, Leißa, Mallon, Zwinkau,
//! "Simple and Efficient Construction of Static Single Assignment Form").
//!
//! A front end walks its source program once, in program order, declaring
//! block predecessors as it wires up branches and calling [`use_var`]/
//! [`def_var`] instead of threading SSA values through by hand. Blocks that
//! aren't [`seal_block`]-ed yet (their predecessor set isn't known in full —
//! typically a loop header visited before its back edge) get a sentinel
//! block parameter that's patched with real arguments once sealing reveals
//! every predecessor.
//!
//! [`use_var`] is specified recursively in the source paper: a read that
//! misses the current block walks up into its predecessors, and a read that
//! lands on a diamond join recurses into two predecessors at once. Both
//! shapes are driven here by an explicit frame stack rather than native
//! recursion, so construction depth is bounded by heap, not by the call
//! stack, however deep a generated function's predecessor chains run.
//!
//! [`use_var`]: SsaBuilder::use_var
//! [`def_var`]: SsaBuilder::def_var

use std::collections::HashMap;

use cranelift_entity::entity_impl;
use log::trace;

use crate::types::Type;

use super::entities::{Block, Inst, Value};
use super::function::Function;
use super::instructions::{InstructionData, Opcode};

/// A front-end-local variable name, scoped to one [`SsaBuilder`]. Distinct
/// from [`Value`]: a `Variable` can have many `Value`s over a function's
/// lifetime (one per definition site); SSA construction is exactly the
/// process of picking which `Value` answers a read at a given program point.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(u32);
entity_impl!(Variable, "var");

#[derive(Default)]
struct BlockSsaState {
    sealed: bool,
    predecessors: Vec<Inst>,
    /// Sentinel parameters inserted for reads that outran sealing, queued to
    /// be patched with real predecessor arguments once sealed.
    incomplete_phis: Vec<(Variable, Value)>,
}

/// One step of the explicit work stack driving [`SsaBuilder::use_var`].
enum Frame {
    /// Resolve `var` as seen at the end of `block`.
    Enter { var: Variable, ty: Type, block: Block },
    /// `block` had exactly one predecessor; the value just computed for it
    /// is `var`'s value in `block` too — memoize and relay it upward.
    Relay { var: Variable, block: Block },
    /// Gather `var`'s value along each of `block`'s (now fully known)
    /// predecessors into `phi`'s argument list, `collected.len()`
    /// predecessors already visited.
    FinishPhi {
        var: Variable,
        block: Block,
        phi: Value,
        preds: Vec<(Block, Inst)>,
        collected: Vec<Value>,
    },
}

/// Drives on-demand SSA construction over one [`Function`] being built.
pub struct SsaBuilder<'f> {
    /// The function under construction. Public so a caller can interleave
    /// [`FunctionBuilder`](super::builder::FunctionBuilder) calls (wrapping
    /// this same reference) with `def_var`/`use_var` calls as it walks a
    /// source program.
    pub func: &'f mut Function,
    blocks: HashMap<Block, BlockSsaState>,
    defs: HashMap<(Block, Variable), Value>,
    /// For each value that is itself a phi (block parameter installed by
    /// this builder), the operands it was finalized with — lets eliminating
    /// one trivial phi trigger a re-check of every phi that used it.
    phi_operands: HashMap<Value, Vec<Value>>,
}

impl<'f> SsaBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            func,
            blocks: HashMap::new(),
            defs: HashMap::new(),
            phi_operands: HashMap::new(),
        }
    }

    fn state(&mut self, block: Block) -> &mut BlockSsaState {
        self.blocks.entry(block).or_default()
    }

    fn is_sealed(&self, block: Block) -> bool {
        self.blocks.get(&block).is_some_and(|s| s.sealed)
    }

    /// Record that `pred_inst`, laid out in `pred_block`, branches to
    /// `block`. Must be called for every predecessor before `block` is
    /// sealed.
    pub fn declare_block_predecessor(&mut self, block: Block, pred_block: Block, pred_inst: Inst) {
        assert!(
            !self.is_sealed(block),
            "{block} is already sealed; its predecessor set is fixed"
        );
        debug_assert_eq!(
            self.func.layout.inst_block(pred_inst),
            Some(pred_block),
            "{pred_inst} is not laid out in {pred_block}"
        );
        self.state(block).predecessors.push(pred_inst);
    }

    /// Bind `var` to `value` as of the end of `block`.
    pub fn def_var(&mut self, var: Variable, block: Block, value: Value) {
        self.defs.insert((block, var), value);
    }

    /// Seal `block`: every predecessor has now been declared. Any sentinel
    /// phi created for a read that reached `block` before this point is
    /// patched with one argument per predecessor and, if all of them agree,
    /// eliminated in favor of the common value.
    pub fn seal_block(&mut self, block: Block) {
        let incomplete = std::mem::take(&mut self.state(block).incomplete_phis);
        self.state(block).sealed = true;
        for (var, phi) in incomplete {
            self.fill_phi_operands(var, block, phi);
        }
    }

    /// Read `var`'s value as of the end of `block`, of type `ty` if a phi
    /// has to be materialized for the read.
    pub fn use_var(&mut self, var: Variable, block: Block, ty: Type) -> Value {
        if let Some(&v) = self.defs.get(&(block, var)) {
            return v;
        }

        let mut work = vec![Frame::Enter { var, ty, block }];
        let mut results: Vec<Value> = Vec::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter { var, ty, block } => {
                    if let Some(&v) = self.defs.get(&(block, var)) {
                        results.push(v);
                        continue;
                    }
                    if !self.is_sealed(block) {
                        let phi = self.func.dfg.append_block_param(block, ty);
                        trace!("{phi} = sentinel phi for {var:?} in {block} (unsealed)");
                        self.def_var(var, block, phi);
                        self.state(block).incomplete_phis.push((var, phi));
                        results.push(phi);
                        continue;
                    }
                    let preds = self.state(block).predecessors.clone();
                    match preds.len() {
                        0 => {
                            // No path reaches `block` with `var` defined (an
                            // unreachable block, or the function's own entry
                            // read before any `def_var`). Per the algorithm,
                            // this is a valid read, not a bug: synthesize an
                            // undefined-value constant rather than failing.
                            trace!("{var:?} has no predecessors in {block}; synthesizing undef");
                            let inst = self.func.dfg.make_inst(InstructionData::Nullary { opcode: Opcode::Undef });
                            self.func.layout.append_inst(inst, block);
                            let undef = self.func.dfg.append_inst_result(inst, ty);
                            self.def_var(var, block, undef);
                            results.push(undef);
                        }
                        1 => {
                            let pred_inst = preds[0];
                            let pred_block = self.func.layout.inst_block(pred_inst).expect(
                                "a declared predecessor instruction is always laid out in a block",
                            );
                            work.push(Frame::Relay { var, block });
                            work.push(Frame::Enter { var, ty, block: pred_block });
                        }
                        _ => {
                            let phi = self.func.dfg.append_block_param(block, ty);
                            trace!("{phi} = sentinel phi for {var:?} in {block} ({} preds)", preds.len());
                            self.def_var(var, block, phi);
                            let preds_with_blocks: Vec<(Block, Inst)> = preds
                                .iter()
                                .map(|&inst| {
                                    let b = self.func.layout.inst_block(inst).expect(
                                        "a declared predecessor instruction is always laid out in a block",
                                    );
                                    (b, inst)
                                })
                                .collect();
                            let first_pred_block = preds_with_blocks[0].0;
                            work.push(Frame::FinishPhi {
                                var,
                                block,
                                phi,
                                preds: preds_with_blocks,
                                collected: Vec::new(),
                            });
                            work.push(Frame::Enter { var, ty, block: first_pred_block });
                        }
                    }
                }
                Frame::Relay { var, block } => {
                    let v = *results.last().expect("Relay always follows a completed Enter");
                    self.def_var(var, block, v);
                }
                Frame::FinishPhi { var, block, phi, preds, mut collected } => {
                    collected.push(results.pop().expect("FinishPhi always follows a completed Enter"));
                    if collected.len() < preds.len() {
                        let next_block = preds[collected.len()].0;
                        work.push(Frame::FinishPhi { var, block, phi, preds, collected });
                        work.push(Frame::Enter { var, ty, block: next_block });
                    } else {
                        for (&(_, pred_inst), &val) in preds.iter().zip(collected.iter()) {
                            self.func.dfg.append_branch_arg(pred_inst, block, val);
                        }
                        self.phi_operands.insert(phi, collected.clone());
                        let resolved = self.try_remove_trivial_phi(var, block, phi);
                        results.push(resolved);
                    }
                }
            }
        }

        results.pop().expect("the top-level Enter always leaves exactly one result")
    }

    /// Called once `phi`'s operand list is known in full (either because it
    /// was sealed immediately, or because [`seal_block`](Self::seal_block)
    /// just filled it in). If every operand besides `phi` itself resolves
    /// to the same value, replace `phi` with that value everywhere and
    /// re-check any phi that used it as an operand.
    fn fill_phi_operands(&mut self, var: Variable, block: Block, phi: Value) {
        let preds = self.state(block).predecessors.clone();
        let mut collected = Vec::with_capacity(preds.len());
        for &pred_inst in &preds {
            let pred_block = self
                .func
                .layout
                .inst_block(pred_inst)
                .expect("a declared predecessor instruction is always laid out in a block");
            collected.push(self.use_var(var, pred_block, self.value_type(phi)));
        }
        for (&pred_inst, &val) in preds.iter().zip(collected.iter()) {
            self.func.dfg.append_branch_arg(pred_inst, block, val);
        }
        trace!("{phi} operands filled in from {} now-sealed preds", preds.len());
        self.phi_operands.insert(phi, collected);
        self.try_remove_trivial_phi(var, block, phi);
    }

    fn value_type(&self, v: Value) -> Type {
        self.func
            .dfg
            .value_type(v)
            .expect("a phi's own value always carries a type before elimination")
    }

    /// Collapse `phi` into the single value its operands agree on, if they
    /// agree. Removes `phi` as a block parameter, aliases it to the survivor,
    /// and fixes up every predecessor's branch-argument list to match the
    /// new (shorter) parameter list. Eliminating `phi` can make a phi that
    /// used it as an operand trivial too, so the cascade is driven by an
    /// explicit queue rather than recursing into each user in turn. Returns
    /// the value `phi` itself (the first item processed) was replaced by, or
    /// `phi` unchanged if it wasn't trivial.
    fn try_remove_trivial_phi(&mut self, var: Variable, block: Block, phi: Value) -> Value {
        let mut queue = vec![(block, phi)];
        let mut first_result = phi;
        let mut first = true;

        while let Some((blk, candidate)) = queue.pop() {
            if !self.func.dfg.value_is_valid(candidate) {
                continue; // already eliminated by an earlier queue entry
            }
            let Some(operands) = self.phi_operands.get(&candidate).cloned() else {
                continue;
            };

            let mut same: Option<Value> = None;
            let mut trivial = true;
            for op in operands {
                let resolved = self.func.dfg.resolve_aliases(op);
                if resolved == candidate || Some(resolved) == same {
                    continue;
                }
                if same.is_some() {
                    trivial = false;
                    break;
                }
                same = Some(resolved);
            }

            let result = if !trivial {
                candidate
            } else {
                match same {
                    // Every operand is the phi itself: an unreachable block
                    // reading its own loop-carried value. No better answer.
                    None => candidate,
                    Some(same) => {
                        let num = match self.func.dfg.value_def(candidate) {
                            super::dfg::ValueDef::Param(_, num) => num,
                            _ => unreachable!(
                                "try_remove_trivial_phi only ever queues freshly-made block params"
                            ),
                        };
                        let preds = self.state(blk).predecessors.clone();
                        for &pred_inst in &preds {
                            self.func.dfg.remove_branch_arg(pred_inst, blk, num);
                        }
                        self.func.dfg.remove_block_param(candidate);
                        self.func.dfg.change_to_alias(candidate, same);
                        trace!("{candidate} is a trivial phi; aliased to {same}");
                        self.def_var(var, blk, same);

                        for (&user, ops) in self.phi_operands.iter_mut() {
                            if user != candidate {
                                for op in ops.iter_mut() {
                                    if *op == candidate {
                                        *op = same;
                                    }
                                }
                            }
                        }
                        let users: Vec<Value> = self
                            .phi_operands
                            .iter()
                            .filter(|&(&user, ops)| user != candidate && ops.contains(&same))
                            .map(|(&user, _)| user)
                            .collect();
                        for user in users {
                            if let super::dfg::ValueDef::Param(user_block, _) = self.func.dfg.value_def(user) {
                                queue.push((user_block, user));
                            }
                        }
                        same
                    }
                }
            };

            if first {
                first_result = result;
                first = false;
            }
        }

        first_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::sidetables::Signature;

    fn last_inst(func: &Function, block: Block) -> Inst {
        func.layout.last_inst(block).unwrap()
    }

    /// `b0: x = 1; jump b1`, `b1: return x` — a single-predecessor chain
    /// never needs a phi.
    #[test]
    fn single_predecessor_chain_skips_phi() {
        let mut func = Function::new("f", Signature::default());
        let (b0, b1) = {
            let mut fb = FunctionBuilder::new(&mut func);
            let b0 = fb.create_block();
            let b1 = fb.create_block();
            fb.append_block(b0);
            fb.append_block(b1);
            (b0, b1)
        };

        let mut ssa = SsaBuilder::new(&mut func);
        let x = Variable::from_u32(0);

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b0);
        let imm = fb.make_imm(1);
        let one = fb.iconst(Type::I32, imm).unwrap();
        drop(fb);
        ssa.def_var(x, b0, one);
        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b0);
        fb.jump(b1, &[]).unwrap();
        drop(fb);
        let jump_inst = last_inst(ssa.func, b0);
        ssa.declare_block_predecessor(b1, b0, jump_inst);
        ssa.seal_block(b0);
        ssa.seal_block(b1);

        let read = ssa.use_var(x, b1, Type::I32);

        assert_eq!(read, one);
        assert_eq!(func.dfg.num_block_params(b1), 0);
    }

    /// `b0: x = 1; brif c, b1, b2`, `b1: jump b3`, `b2: jump b3`,
    /// `b3: return x` — both arms define the same `x`, so the join's phi is
    /// trivial and disappears.
    #[test]
    fn diamond_join_eliminates_trivial_phi() {
        let mut func = Function::new("f", Signature::default());
        let (b0, b1, b2, b3) = {
            let mut fb = FunctionBuilder::new(&mut func);
            let b0 = fb.create_block();
            let b1 = fb.create_block();
            let b2 = fb.create_block();
            let b3 = fb.create_block();
            for b in [b0, b1, b2, b3] {
                fb.append_block(b);
            }
            (b0, b1, b2, b3)
        };

        let x = Variable::from_u32(0);
        let mut ssa = SsaBuilder::new(&mut func);

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b0);
        let one_imm = fb.make_imm(1);
        let one = fb.iconst(Type::I32, one_imm).unwrap();
        drop(fb);
        ssa.def_var(x, b0, one);
        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b0);
        let cond_imm = fb.make_imm(1);
        let cond = fb.iconst(Type::I1, cond_imm).unwrap();
        fb.brif(cond, b1, &[], b2, &[]).unwrap();
        let brif_inst = last_inst(ssa.func, b0);
        ssa.declare_block_predecessor(b1, b0, brif_inst);
        ssa.declare_block_predecessor(b2, b0, brif_inst);
        ssa.seal_block(b0);
        ssa.seal_block(b1);
        ssa.seal_block(b2);

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b1);
        fb.jump(b3, &[]).unwrap();
        let b1_jump = last_inst(ssa.func, b1);
        ssa.declare_block_predecessor(b3, b1, b1_jump);

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b2);
        fb.jump(b3, &[]).unwrap();
        let b2_jump = last_inst(ssa.func, b2);
        ssa.declare_block_predecessor(b3, b2, b2_jump);

        ssa.seal_block(b3);

        let read = ssa.use_var(x, b3, Type::I32);
        assert_eq!(func.dfg.resolve_aliases(read), one);
        assert_eq!(func.dfg.num_block_params(b3), 0);
    }

    /// `b0: x = 1; jump b1`, `b1` (loop header, sealed only after the back
    /// edge is known): `brif c, b2, b3`, `b2: jump b1`, `b3: return x` — `x`
    /// is loop-invariant, so the header's sentinel phi resolves trivially
    /// once `b1` is sealed.
    #[test]
    fn loop_header_phi_is_trivial_when_sealed_late() {
        let mut func = Function::new("f", Signature::default());
        let (b0, b1, b2, b3) = {
            let mut fb = FunctionBuilder::new(&mut func);
            let b0 = fb.create_block();
            let b1 = fb.create_block();
            let b2 = fb.create_block();
            let b3 = fb.create_block();
            for b in [b0, b1, b2, b3] {
                fb.append_block(b);
            }
            (b0, b1, b2, b3)
        };

        let x = Variable::from_u32(0);
        let mut ssa = SsaBuilder::new(&mut func);

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b0);
        let one_imm = fb.make_imm(1);
        let one = fb.iconst(Type::I32, one_imm).unwrap();
        drop(fb);
        ssa.def_var(x, b0, one);
        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b0);
        fb.jump(b1, &[]).unwrap();
        drop(fb);
        let entry_jump = last_inst(ssa.func, b0);
        ssa.declare_block_predecessor(b1, b0, entry_jump);
        ssa.seal_block(b0);
        // `b1` is NOT sealed yet: its back edge from `b2` isn't known.

        let header_read = ssa.use_var(x, b1, Type::I32);
        assert_ne!(header_read, one, "an unsealed read gets a fresh sentinel phi");

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b1);
        let cond_imm = fb.make_imm(1);
        let cond = fb.iconst(Type::I1, cond_imm).unwrap();
        fb.brif(cond, b2, &[], b3, &[]).unwrap();
        let header_brif = last_inst(ssa.func, b1);
        ssa.declare_block_predecessor(b2, b1, header_brif);
        ssa.declare_block_predecessor(b3, b1, header_brif);
        ssa.seal_block(b2);

        let mut fb = FunctionBuilder::new(ssa.func);
        fb.switch_to_block(b2);
        fb.jump(b1, &[]).unwrap();
        let back_edge = last_inst(ssa.func, b2);
        ssa.declare_block_predecessor(b1, b2, back_edge);

        ssa.seal_block(b1);
        ssa.seal_block(b3);

        assert_eq!(func.dfg.resolve_aliases(header_read), one);
        assert_eq!(func.dfg.num_block_params(b1), 0);
    }

    /// A sealed block with no declared predecessors at all (e.g. an entry
    /// block read before anything defines `x`) gets an undef constant
    /// rather than a panic.
    #[test]
    fn use_var_on_block_with_no_predecessors_synthesizes_undef() {
        let mut func = Function::new("f", Signature::default());
        let b0 = {
            let mut fb = FunctionBuilder::new(&mut func);
            fb.create_block()
        };
        {
            let mut fb = FunctionBuilder::new(&mut func);
            fb.append_block(b0);
        }

        let mut ssa = SsaBuilder::new(&mut func);
        let x = Variable::from_u32(0);
        ssa.seal_block(b0);

        let undef = ssa.use_var(x, b0, Type::I32);
        assert_eq!(ssa.func.dfg.value_type(undef), Some(Type::I32));
        assert_eq!(ssa.func.dfg.value_def(undef).inst(), Some(ssa.func.layout.last_inst(b0).unwrap()));
        // Reading again returns the same recorded definition, not a second undef.
        assert_eq!(ssa.use_var(x, b0, Type::I32), undef);
    }
}
