//! Bytecode interpreter of computer cells.
//!
//! A program is a sequence of three-byte instructions `[op, a, b]`. The low
//! nibble of `op` selects the operation, bits 4..6 the addressing of `a` and
//! bits 6..8 the addressing of `b`. Programs only touch token and cell
//! memory; no energy ever moves.

use super::{ExecutionContext, ProcessingResult};
use crate::entities::{CellFunction, Cluster, Token};
use crate::token_memory::{self as mem, computer::*};

pub const INSTRUCTION_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Mov,
    Add,
    Sub,
    Mul,
    Div,
    Xor,
    Or,
    And,
    IfG,
    IfGe,
    IfE,
    IfNe,
    IfLe,
    IfL,
    Else,
    EndIf,
}

impl OpCode {
    pub fn from_byte(op: u8) -> Self {
        match op & 0x0f {
            0 => OpCode::Mov,
            1 => OpCode::Add,
            2 => OpCode::Sub,
            3 => OpCode::Mul,
            4 => OpCode::Div,
            5 => OpCode::Xor,
            6 => OpCode::Or,
            7 => OpCode::And,
            8 => OpCode::IfG,
            9 => OpCode::IfGe,
            10 => OpCode::IfE,
            11 => OpCode::IfNe,
            12 => OpCode::IfLe,
            13 => OpCode::IfL,
            14 => OpCode::Else,
            _ => OpCode::EndIf,
        }
    }
}

/// Where an operand lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    TokenMemory(usize),
    CellMemory(usize),
    Constant(u8),
}

use Operand::{CellMemory, Constant, TokenMemory};

/// Builds the first byte of an instruction. Addressing modes: 0 token memory,
/// 1 token memory indirect, 2 cell memory, 3 constant (operand `b` only).
pub fn encode_op(op: OpCode, a_mode: u8, b_mode: u8) -> u8 {
    (op as u8) | ((a_mode & 3) << 4) | ((b_mode & 3) << 6)
}

fn resolve(mode: u8, raw: u8, token_memory: &[u8], cell_memory_len: usize) -> Operand {
    match mode {
        1 => TokenMemory(token_memory[raw as usize % token_memory.len()] as usize % token_memory.len()),
        2 if cell_memory_len > 0 => CellMemory(raw as usize % cell_memory_len),
        3 => Constant(raw),
        _ => TokenMemory(raw as usize % token_memory.len()),
    }
}

fn read(operand: Operand, token_memory: &[u8], cell_memory: &[u8]) -> u8 {
    match operand {
        TokenMemory(i) => token_memory[i],
        CellMemory(i) => cell_memory[i],
        Constant(c) => c,
    }
}

fn write(operand: Operand, value: u8, token_memory: &mut [u8], cell_memory: &mut [u8]) {
    match operand {
        TokenMemory(i) => token_memory[i] = value,
        CellMemory(i) => cell_memory[i] = value,
        Constant(_) => {}
    }
}

/// Runs the cell's program once against the token's memory.
pub fn process(ctx: &ExecutionContext, token: &mut Token, cell: usize, cluster: &mut Cluster) -> ProcessingResult {
    let CellFunction::Computer { code, memory } = &mut cluster.cells[cell].function else {
        return ProcessingResult::default();
    };

    let max_len = ctx.params.computer_max_instructions * INSTRUCTION_SIZE;
    if code.len() % INSTRUCTION_SIZE != 0 || code.len() > max_len {
        token.memory[mem::OUT] = ERROR_INVALID_PROGRAM;
        return ProcessingResult::default();
    }

    token.memory[mem::OUT] = SUCCESS;
    run(code, &mut token.memory, memory);
    ProcessingResult::default()
}

/// Executes `code` in order. Conditionals push onto a stack; instructions
/// take effect only while every entry on it is true.
pub fn run(code: &[u8], token_memory: &mut [u8], cell_memory: &mut [u8]) {
    if token_memory.is_empty() {
        return;
    }
    let mut conditions: Vec<bool> = Vec::new();

    for instruction in code.chunks_exact(INSTRUCTION_SIZE) {
        let op = OpCode::from_byte(instruction[0]);
        let a_mode = (instruction[0] >> 4) & 3;
        let b_mode = (instruction[0] >> 6) & 3;
        let active = conditions.iter().all(|&c| c);

        match op {
            OpCode::Else => {
                if let Some(top) = conditions.last_mut() {
                    *top = !*top;
                }
                continue;
            }
            OpCode::EndIf => {
                conditions.pop();
                continue;
            }
            _ => {}
        }

        // operand a never takes the constant mode
        let a = resolve(if a_mode == 3 { 0 } else { a_mode }, instruction[1], token_memory, cell_memory.len());
        let b = resolve(b_mode, instruction[2], token_memory, cell_memory.len());
        let va = read(a, token_memory, cell_memory);
        let vb = read(b, token_memory, cell_memory);

        let condition = match op {
            OpCode::IfG => Some(va > vb),
            OpCode::IfGe => Some(va >= vb),
            OpCode::IfE => Some(va == vb),
            OpCode::IfNe => Some(va != vb),
            OpCode::IfLe => Some(va <= vb),
            OpCode::IfL => Some(va < vb),
            _ => None,
        };
        if let Some(c) = condition {
            conditions.push(c);
            continue;
        }
        if !active {
            continue;
        }

        let value = match op {
            OpCode::Mov => vb,
            OpCode::Add => va.wrapping_add(vb),
            OpCode::Sub => va.wrapping_sub(vb),
            OpCode::Mul => va.wrapping_mul(vb),
            OpCode::Div => va.checked_div(vb).unwrap_or(0),
            OpCode::Xor => va ^ vb,
            OpCode::Or => va | vb,
            OpCode::And => va & vb,
            _ => continue,
        };
        write(a, value, token_memory, cell_memory);
    }
}
