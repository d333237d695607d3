//! MIR Dump Utility
//!
//! Pretty-prints MIR in a human-readable format similar to LLVM IR.
//! Output is deterministic (functions in definition order, blocks by ID),
//! which the pass logs and the tests rely on.

use super::{
    BinaryOp, CompareOp, IrBasicBlock, IrControlFlowGraph, IrFunction, IrInstruction, IrModule,
    IrPhiNode, IrTerminator,
};

/// Dump an entire module to a string.
pub fn dump_module(module: &IrModule) -> String {
    let mut out = format!(
        "; Module: {}\n; Functions: {}\n\n",
        module.name,
        module.functions.len()
    );

    for ext in module.extern_functions.values() {
        let params: Vec<String> = ext
            .signature
            .parameters
            .iter()
            .map(|p| p.ty.to_string())
            .collect();
        out.push_str(&format!(
            "declare @{}({}) -> {} ; {}\n",
            ext.name,
            params.join(", "),
            ext.signature.return_type,
            ext.id
        ));
    }
    if !module.extern_functions.is_empty() {
        out.push('\n');
    }

    let mut global_ids: Vec<_> = module.globals.keys().copied().collect();
    global_ids.sort();
    for id in global_ids {
        let global = &module.globals[&id];
        out.push_str(&format!("{} = global @{}: {}\n", id, global.name, global.ty));
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }

    for func in module.functions.values() {
        out.push_str(&dump_function(func));
        out.push('\n');
    }

    out
}

/// Dump a single function to a string.
pub fn dump_function(func: &IrFunction) -> String {
    let params: Vec<String> = func
        .signature
        .parameters
        .iter()
        .map(|p| format!("{} {}: {}", p.name, p.reg, p.ty))
        .collect();

    format!(
        "fn @{}({}) -> {} {{ ; {}\n{}}}\n",
        func.name,
        params.join(", "),
        func.signature.return_type,
        func.id,
        dump_cfg(&func.cfg)
    )
}

/// Dump a CFG to a string.
pub fn dump_cfg(cfg: &IrControlFlowGraph) -> String {
    cfg.block_ids()
        .into_iter()
        .map(|id| dump_block(&cfg.blocks[&id]))
        .collect()
}

/// Dump a basic block to a string.
pub fn dump_block(block: &IrBasicBlock) -> String {
    let label = block
        .label
        .as_ref()
        .map(|l| format!(" ; {}", l))
        .unwrap_or_default();
    let mut out = format!("  {}:{}\n", block.id, label);

    if !block.predecessors.is_empty() {
        let preds: Vec<String> = block.predecessors.iter().map(|p| p.to_string()).collect();
        out.push_str(&format!("    ; preds: {}\n", preds.join(", ")));
    }

    for phi in &block.phi_nodes {
        out.push_str(&format!("    {}\n", dump_phi(phi)));
    }

    for inst in &block.instructions {
        out.push_str(&format!("    {}\n", dump_instruction(inst)));
    }

    out.push_str(&format!("    {}\n\n", dump_terminator(&block.terminator)));
    out
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

/// Dump an instruction to a string.
pub fn dump_instruction(inst: &IrInstruction) -> String {
    match inst {
        IrInstruction::Const { dest, value } => format!("{} = const {}", dest, value),
        IrInstruction::Copy { dest, src } => format!("{} = copy {}", dest, src),
        IrInstruction::Load { dest, ptr, ty } => format!("{} = load {} {}", dest, ty, ptr),
        IrInstruction::Store { ptr, value } => format!("store {}, {}", value, ptr),
        IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        } => format!("{} = {} {}, {}", dest, dump_binop(op), left, right),
        IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        } => format!("{} = cmp {} {}, {}", dest, dump_cmpop(op), left, right),
        IrInstruction::CallDirect {
            dest,
            func_id,
            args,
        } => {
            let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            match dest {
                Some(dest) => format!("{} = call {}({})", dest, func_id, args.join(", ")),
                None => format!("call {}({})", func_id, args.join(", ")),
            }
        }
        IrInstruction::Alloc { dest, ty, count } => match count {
            Some(count) => format!("{} = alloc {}, {}", dest, ty, count),
            None => format!("{} = alloc {}", dest, ty),
        },
        IrInstruction::GlobalAddr { dest, global_id } => {
            format!("{} = addr {}", dest, global_id)
        }
        IrInstruction::GetElementPtr {
            dest,
            ptr,
            indices,
            ty,
        } => {
            let indices: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
            format!("{} = gep {} {}, [{}]", dest, ty, ptr, indices.join(", "))
        }
        IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty,
        } => format!("{} = cast {} {} to {}", dest, from_ty, src, to_ty),
    }
}

/// Dump a terminator to a string.
pub fn dump_terminator(term: &IrTerminator) -> String {
    match term {
        IrTerminator::Branch { target } => format!("br {}", target),
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => format!("br {}, {}, {}", condition, true_target, false_target),
        IrTerminator::Return { value: Some(value) } => format!("ret {}", value),
        IrTerminator::Return { value: None } => "ret void".to_string(),
        IrTerminator::Unreachable => "unreachable".to_string(),
    }
}

pub fn dump_binop(op: &BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Rem => "rem",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => "shr",
    }
}

pub fn dump_cmpop(op: &CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
    }
}

/// Dump a function by name from a module.
pub fn dump_function_by_name(module: &IrModule, name: &str) -> Option<String> {
    module.function_by_name(name).map(dump_function)
}
