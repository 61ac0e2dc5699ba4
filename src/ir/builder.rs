//! A thin facade over a [`Function`]'s DFG and Layout, giving a front-end one
//! call per instruction shape instead of having to hand-assemble
//! [`InstructionData`] and splice it into the layout itself.

use log::trace;

use crate::atomic::AtomicRmwOp;
use crate::condcodes::{FloatCC, IntCC};
use crate::error::IrError;
use crate::types::Type;

use super::entities::{Block, BlockArg, FuncRef, Immediate, Value, ValueList};
use super::function::Function;
use super::instructions::{CallData, InstructionData, Opcode};

/// Builds one function's body. Every method that inserts an instruction
/// fails with [`IrError::NoCurrentBlock`] until [`switch_to_block`](Self::switch_to_block)
/// has been called at least once.
pub struct FunctionBuilder<'f> {
    pub func: &'f mut Function,
    current_block: Option<Block>,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            func,
            current_block: None,
        }
    }

    /// Allocate a block in the DFG without placing it in the layout yet.
    pub fn create_block(&mut self) -> Block {
        self.func.dfg.make_block()
    }

    /// Place a previously created block at the end of the layout.
    pub fn append_block(&mut self, block: Block) {
        trace!("appending {block} to layout");
        self.func.layout.append_block(block);
    }

    pub fn switch_to_block(&mut self, block: Block) {
        trace!("switching to {block}");
        self.current_block = Some(block);
    }

    pub fn current_block(&self) -> Option<Block> {
        self.current_block
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        self.func.dfg.append_block_param(block, ty)
    }

    fn current(&self) -> Result<Block, IrError> {
        self.current_block.ok_or(IrError::NoCurrentBlock)
    }

    fn emit(&mut self, data: InstructionData) -> Result<super::entities::Inst, IrError> {
        let block = self.current()?;
        let inst = self.func.dfg.make_inst(data);
        self.func.layout.append_inst(inst, block);
        Ok(inst)
    }

    pub fn make_imm(&mut self, bits: i64) -> Immediate {
        self.func.dfg.make_imm(bits)
    }

    pub fn iconst(&mut self, ty: Type, imm: Immediate) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm,
        })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn fconst(&mut self, ty: Type, value: f64) -> Result<Value, IrError> {
        let imm = self.make_imm(value.to_bits() as i64);
        let inst = self.emit(InstructionData::UnaryImm {
            opcode: Opcode::Fconst,
            imm,
        })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn binary(&mut self, opcode: Opcode, ty: Type, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::Binary {
            opcode,
            args: [lhs, rhs],
        })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn icmp(&mut self, cond: IntCC, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::IntCompare { cond, args: [lhs, rhs] })?;
        Ok(self.func.dfg.append_inst_result(inst, Type::I1))
    }

    pub fn fcmp(&mut self, cond: FloatCC, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::FloatCompare { cond, args: [lhs, rhs] })?;
        Ok(self.func.dfg.append_inst_result(inst, Type::I1))
    }

    pub fn select(&mut self, ty: Type, cond: Value, if_true: Value, if_false: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::Select {
            cond,
            args: [if_true, if_false],
        })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn load(&mut self, ty: Type, addr: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::Load { arg: addr })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn store(&mut self, addr: Value, val: Value) -> Result<(), IrError> {
        self.emit(InstructionData::Store { args: [addr, val] })?;
        Ok(())
    }

    pub fn atomic_rmw(&mut self, ty: Type, op: AtomicRmwOp, addr: Value, val: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::AtomicRmw {
            op,
            args: [addr, val],
        })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn atomic_cas(&mut self, ty: Type, addr: Value, expected: Value, replacement: Value) -> Result<Value, IrError> {
        let inst = self.emit(InstructionData::AtomicCas {
            args: [addr, expected, replacement],
        })?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn call(&mut self, func_ref: FuncRef, args: &[Value], result_types: &[Type]) -> Result<Vec<Value>, IrError> {
        let mut list = ValueList::new();
        list.extend(args.iter().copied(), &mut self.func.dfg.value_lists);
        let inst = self.emit(InstructionData::Call {
            data: CallData { func_ref, args: list },
        })?;
        Ok(result_types
            .iter()
            .map(|&ty| self.func.dfg.append_inst_result(inst, ty))
            .collect())
    }

    pub fn jump(&mut self, dest: Block, args: &[BlockArg]) -> Result<(), IrError> {
        let call = self.func.dfg.block_call(dest, args);
        self.emit(InstructionData::Jump { dest: call })?;
        Ok(())
    }

    pub fn brif(
        &mut self,
        cond: Value,
        then_block: Block,
        then_args: &[BlockArg],
        else_block: Block,
        else_args: &[BlockArg],
    ) -> Result<(), IrError> {
        let then_call = self.func.dfg.block_call(then_block, then_args);
        let else_call = self.func.dfg.block_call(else_block, else_args);
        self.emit(InstructionData::Brif {
            arg: cond,
            blocks: [then_call, else_call],
        })?;
        Ok(())
    }

    /// Emit a `br_table` over `targets`, falling back to `default` for an
    /// out-of-range index. Interns `targets` as a fresh jump table; callers
    /// never handle a `JumpTable` handle directly, so there's nothing for
    /// them to pass in unpopulated or stale.
    pub fn br_table(&mut self, index: Value, default: Block, targets: &[Block]) -> Result<(), IrError> {
        let table = self.func.dfg.make_jump_table(targets.to_vec());
        trace!("br_table over {} targets, default {default}", targets.len());
        let default_call = self.func.dfg.block_call(default, &[]);
        self.emit(InstructionData::BrTable {
            arg: index,
            default: default_call,
            table,
        })?;
        Ok(())
    }

    pub fn return_(&mut self, args: &[Value]) -> Result<(), IrError> {
        let mut list = ValueList::new();
        list.extend(args.iter().copied(), &mut self.func.dfg.value_lists);
        self.emit(InstructionData::Return { args: list })?;
        Ok(())
    }

    pub fn trap(&mut self) -> Result<(), IrError> {
        self.emit(InstructionData::Trap)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::sidetables::Signature;

    #[test]
    fn builder_fails_before_switch_to_block() {
        let mut func = Function::new("f", Signature::default());
        let mut builder = FunctionBuilder::new(&mut func);
        assert_eq!(builder.trap(), Err(IrError::NoCurrentBlock));
    }

    #[test]
    fn builder_assembles_linear_function() {
        let mut func = Function::new("f", Signature::default());
        let mut builder = FunctionBuilder::new(&mut func);
        let b0 = builder.create_block();
        let b1 = builder.create_block();
        builder.append_block(b0);
        builder.append_block(b1);

        builder.switch_to_block(b0);
        builder.jump(b1, &[]).unwrap();

        builder.switch_to_block(b1);
        builder.return_(&[]).unwrap();

        assert_eq!(func.layout.blocks().count(), 2);
        assert_eq!(func.dfg.num_insts(), 2);
    }

    #[test]
    fn iconst_and_binary_produce_typed_values() {
        let mut func = Function::new("f", Signature::default());
        let mut builder = FunctionBuilder::new(&mut func);
        let b0 = builder.create_block();
        builder.append_block(b0);
        builder.switch_to_block(b0);

        let seven = builder.make_imm(7);
        let a = builder.iconst(Type::I32, seven).unwrap();
        let nine = builder.make_imm(9);
        let b = builder.iconst(Type::I32, nine).unwrap();
        let sum = builder.binary(Opcode::Iadd, Type::I32, a, b).unwrap();

        assert_eq!(func.dfg.value_type(sum), Some(Type::I32));
    }
}
