//! IR Dump Utility
//!
//! Pretty-prints IR in a human-readable format similar to LLVM IR.
//! Used by the vectorizer's trace logging and by test failure messages.

use super::{
    AccessFlags, AccessMetadata, BinaryOp, CastOp, CompareOp, GepIndex, InstId, IrBlockId,
    IrFunction, IrInstruction, IrModule, IrPhiNode, IrTerminator, LaneIndex, MemoryEffects,
};
use std::fmt::{self, Write};

/// Dump an entire module to a string.
pub fn dump_module(module: &IrModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; Module: {}", module.name);
    let _ = writeln!(out, "; Functions: {}", module.functions.len());
    let _ = writeln!(out);

    for func_id in module.function_ids() {
        if let Some(func) = module.get_function(func_id) {
            let _ = writeln!(out, "{}", dump_function(func));
        }
    }

    out
}

/// Dump a single function to a string.
pub fn dump_function(func: &IrFunction) -> String {
    let mut out = String::new();
    let _ = write_function(&mut out, func);
    out
}

fn write_function(out: &mut String, func: &IrFunction) -> fmt::Result {
    let params: Vec<String> = func
        .signature
        .parameters
        .iter()
        .map(|p| {
            let noalias = if p.noalias { "noalias " } else { "" };
            format!("{}{}: {}", noalias, p.reg, p.ty)
        })
        .collect();

    let attrs = if func.attributes.no_implicit_float {
        " #no_implicit_float"
    } else {
        ""
    };
    writeln!(
        out,
        "fn @{}({}) -> {}{} {{",
        func.name,
        params.join(", "),
        func.signature.return_type,
        attrs
    )?;

    // Sort blocks by ID for consistent output
    let mut block_ids: Vec<_> = func.cfg.blocks.keys().copied().collect();
    block_ids.sort();
    for block_id in block_ids {
        write_block(out, func, block_id)?;
    }

    writeln!(out, "}}")
}

/// Dump a basic block to a string.
pub fn dump_block(func: &IrFunction, block: IrBlockId) -> String {
    let mut out = String::new();
    let _ = write_block(&mut out, func, block);
    out
}

fn write_block(out: &mut String, func: &IrFunction, block_id: IrBlockId) -> fmt::Result {
    let Some(block) = func.cfg.get_block(block_id) else {
        return Ok(());
    };

    let label = block
        .label
        .as_ref()
        .map(|l| format!(" ; {}", l))
        .unwrap_or_default();
    writeln!(out, "  {}:{}", block.id, label)?;

    for phi in &block.phi_nodes {
        writeln!(out, "    {}", dump_phi(phi))?;
    }

    for &id in &block.instructions {
        writeln!(out, "    {}", dump_inst(func, id))?;
    }

    writeln!(out, "    {}", dump_terminator(&block.terminator))?;
    writeln!(out)
}

/// Dump an arena instruction, tagged with its handle.
pub fn dump_inst(func: &IrFunction, id: InstId) -> String {
    match func.inst(id) {
        Some(inst) => format!("{:<6}{}", id.to_string(), dump_instruction(inst)),
        None => format!("{:<6}<erased>", id.to_string()),
    }
}

/// Dump a phi node to a string.
pub fn dump_phi(phi: &IrPhiNode) -> String {
    let incoming: Vec<String> = phi
        .incoming
        .iter()
        .map(|(block, val)| format!("[{}: {}]", block, val))
        .collect();

    format!("{} = phi {} {}", phi.dest, phi.ty, incoming.join(", "))
}

fn dump_access_suffix(align: u32, flags: &AccessFlags, metadata: &AccessMetadata) -> String {
    let mut out = String::new();
    if align != 0 {
        let _ = write!(out, ", align {}", align);
    }
    if flags.volatile {
        out.push_str(" volatile");
    }
    if flags.atomic {
        out.push_str(" atomic");
    }
    if let Some(tag) = metadata.alias_tag {
        let _ = write!(out, " !tbaa {}", tag);
    }
    if metadata.nontemporal {
        out.push_str(" !nontemporal");
    }
    if metadata.invariant {
        out.push_str(" !invariant");
    }
    out
}

/// Dump an instruction to a string.
pub fn dump_instruction(inst: &IrInstruction) -> String {
    match inst {
        IrInstruction::Const { dest, value, ty } => {
            format!("{} = const {} {}", dest, ty, value)
        }
        IrInstruction::Alloca { dest, ty, align } => {
            format!("{} = alloca {}, align {}", dest, ty, align)
        }
        IrInstruction::Load {
            dest,
            ptr,
            ty,
            align,
            flags,
            metadata,
        } => {
            format!(
                "{} = load {}, {}{}",
                dest,
                ty,
                ptr,
                dump_access_suffix(*align, flags, metadata)
            )
        }
        IrInstruction::Store {
            ptr,
            value,
            ty,
            align,
            flags,
            metadata,
        } => {
            format!(
                "store {} {}, {}{}",
                ty,
                value,
                ptr,
                dump_access_suffix(*align, flags, metadata)
            )
        }
        IrInstruction::GetElementPtr {
            dest,
            ptr,
            source_ty,
            indices,
            inbounds,
        } => {
            let idx: Vec<String> = indices
                .iter()
                .map(|i| match i {
                    GepIndex::Const(c) => c.to_string(),
                    GepIndex::Value(v) => v.to_string(),
                })
                .collect();
            format!(
                "{} = gep{} {}, {}, [{}]",
                dest,
                if *inbounds { " inbounds" } else { "" },
                source_ty,
                ptr,
                idx.join(", ")
            )
        }
        IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
            wrap,
        } => {
            let mut flags = String::new();
            if wrap.nuw {
                flags.push_str(" nuw");
            }
            if wrap.nsw {
                flags.push_str(" nsw");
            }
            format!("{} = {}{} {}, {}", dest, dump_binop(op), flags, left, right)
        }
        IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        } => {
            format!("{} = cmp {} {}, {}", dest, dump_cmpop(op), left, right)
        }
        IrInstruction::Cast { dest, op, src, ty } => {
            format!("{} = {} {} to {}", dest, dump_castop(op), src, ty)
        }
        IrInstruction::ExtractElement {
            dest,
            vector,
            index,
        } => {
            format!("{} = extractelement {}, {}", dest, vector, dump_lane(index))
        }
        IrInstruction::InsertElement {
            dest,
            vector,
            scalar,
            index,
        } => {
            format!(
                "{} = insertelement {}, {}, {}",
                dest,
                vector,
                scalar,
                dump_lane(index)
            )
        }
        IrInstruction::Call {
            dest,
            callee,
            args,
            ret_ty,
            effects,
        } => {
            let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            let effects = match effects {
                MemoryEffects::None => " readnone",
                MemoryEffects::ReadOnly => " readonly",
                MemoryEffects::ReadWrite => "",
            };
            match dest {
                Some(d) => format!(
                    "{} = call {} @{}({}){}",
                    d,
                    ret_ty,
                    callee,
                    args.join(", "),
                    effects
                ),
                None => format!("call void @{}({}){}", callee, args.join(", "), effects),
            }
        }
    }
}

fn dump_lane(index: &LaneIndex) -> String {
    match index {
        LaneIndex::Const(c) => c.to_string(),
        LaneIndex::Value(v) => v.to_string(),
    }
}

/// Dump a terminator to a string.
pub fn dump_terminator(term: &IrTerminator) -> String {
    match term {
        IrTerminator::Branch { target } => {
            format!("br {}", target)
        }
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => {
            format!("br_if {}, {}, {}", condition, true_target, false_target)
        }
        IrTerminator::Return { value } => {
            if let Some(v) = value {
                format!("ret {}", v)
            } else {
                "ret void".to_string()
            }
        }
        IrTerminator::Unreachable => "unreachable".to_string(),
    }
}

pub fn dump_binop(op: &BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::LShr => "lshr",
        BinaryOp::AShr => "ashr",
        BinaryOp::FAdd => "fadd",
        BinaryOp::FSub => "fsub",
        BinaryOp::FMul => "fmul",
    }
}

pub fn dump_cmpop(op: &CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "slt",
        CompareOp::Le => "sle",
        CompareOp::Gt => "sgt",
        CompareOp::Ge => "sge",
        CompareOp::ULt => "ult",
        CompareOp::UGt => "ugt",
    }
}

pub fn dump_castop(op: &CastOp) -> &'static str {
    match op {
        CastOp::ZExt => "zext",
        CastOp::SExt => "sext",
        CastOp::Trunc => "trunc",
        CastOp::BitCast => "bitcast",
        CastOp::PtrToInt => "ptrtoint",
        CastOp::IntToPtr => "inttoptr",
    }
}

/// Dump a specific function by name from a module.
pub fn dump_function_by_name(module: &IrModule, name: &str) -> Option<String> {
    module.get_function_by_name(name).map(dump_function)
}
