//! Decoder driver: walks a byte stream through the opcode tables and
//! collects the emitted IR until the block can no longer continue.

use crate::ir::Stmt;
use crate::ops::Site;
use crate::tables::{
    BlockEnd, IndexSlot, OpcodeEntry, OperandKind, OPCODE_TABLE, OPCODE_TABLE_CB,
    OPCODE_TABLE_DD, OPCODE_TABLE_DDCB, OPCODE_TABLE_ED, OPCODE_TABLE_FD, OPCODE_TABLE_FDCB,
};
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Non-fatal decode faults. Either way the block decoded so far is returned
/// to the caller, who may fall back to an interpreter for the faulting
/// address.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum DecodeFault {
    #[error("undecodable opcode {bytes:02X?} at {pc:#06X}")]
    UndecodableOpcode { pc: u16, bytes: Vec<u8> },
    #[error("operand truncated at {pc:#06X}: need {need} byte(s), have {have}")]
    TruncatedOperand { pc: u16, need: usize, have: usize },
}

/// Why the block stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Terminator {
    Ret,
    Jp,
    Halt,
    Fault(DecodeFault),
}

impl Terminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminator::Ret => "ret",
            Terminator::Jp => "jp",
            Terminator::Halt => "halt",
            Terminator::Fault(DecodeFault::UndecodableOpcode { .. }) => "undecodable",
            Terminator::Fault(DecodeFault::TruncatedOperand { .. }) => "truncated",
        }
    }
}

/// One decoded instruction with its emitted IR.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedInstr {
    pub pc: u16,
    pub name: String,
    pub ir: Vec<Stmt>,
}

/// Result of decoding one straight-line region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub instructions: Vec<DecodedInstr>,
    pub terminator: Terminator,
    /// Address just past the last fully decoded instruction.
    pub end_pc: u16,
}

impl Block {
    pub fn fault(&self) -> Option<&DecodeFault> {
        match &self.terminator {
            Terminator::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Cursor over the ROM slice, tracking the virtual address of `rom[0]`.
struct Reader<'a> {
    rom: &'a [u8],
    base: u16,
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(rom: &'a [u8], base: u16) -> Self {
        Self {
            rom,
            base,
            offset: 0,
        }
    }

    fn pc(&self) -> u16 {
        self.base.wrapping_add(self.offset as u16)
    }

    fn remaining(&self) -> usize {
        self.rom.len().saturating_sub(self.offset)
    }

    fn peek(&self) -> Option<u8> {
        self.rom.get(self.offset).copied()
    }

    fn take(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.offset += 1;
        Some(byte)
    }

    fn span_from(&self, start_offset: usize) -> Vec<u8> {
        self.rom[start_offset..self.offset].to_vec()
    }
}

struct Resolved<'a> {
    entry: &'a OpcodeEntry,
    /// Raw displacement byte for `DDCB`/`FDCB` entries, already consumed.
    bits_disp: Option<u8>,
}

fn trace_enabled() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| {
        std::env::var("SMSLIFT_TRACE")
            .map(|v| v != "0")
            .unwrap_or(false)
    })
}

/// Decode a straight-line block starting at `start_pc`, which addresses
/// `rom[0]`. The ROM is borrowed read-only; the returned IR owns all of its
/// nodes.
pub fn decode_block(rom: &[u8], start_pc: u16) -> Block {
    let mut r = Reader::new(rom, start_pc);
    let mut instructions = Vec::new();
    let mut end_pc = start_pc;

    let terminator = loop {
        let instr_pc = r.pc();
        let instr_offset = r.offset;

        let Some(op) = r.take() else {
            break Terminator::Fault(DecodeFault::UndecodableOpcode {
                pc: instr_pc,
                bytes: Vec::new(),
            });
        };

        let resolved = match op {
            0xCB | 0xED => {
                let table = if op == 0xCB {
                    &*OPCODE_TABLE_CB
                } else {
                    &*OPCODE_TABLE_ED
                };
                match r.take() {
                    Some(sub) => Resolved {
                        entry: &table[sub],
                        bits_disp: None,
                    },
                    None => {
                        break Terminator::Fault(DecodeFault::UndecodableOpcode {
                            pc: instr_pc,
                            bytes: vec![op],
                        })
                    }
                }
            }
            0xDD | 0xFD => {
                // A run of index prefixes costs a byte each; only the last
                // one selects the table.
                let mut family = op;
                while let Some(next @ (0xDD | 0xFD)) = r.peek() {
                    family = next;
                    r.take();
                }
                let (index_table, bits_table) = if family == 0xDD {
                    (&*OPCODE_TABLE_DD, &*OPCODE_TABLE_DDCB)
                } else {
                    (&*OPCODE_TABLE_FD, &*OPCODE_TABLE_FDCB)
                };
                let Some(sub) = r.take() else {
                    break Terminator::Fault(DecodeFault::UndecodableOpcode {
                        pc: instr_pc,
                        bytes: r.span_from(instr_offset),
                    });
                };
                match index_table.slot(sub) {
                    IndexSlot::Op(e) => Resolved {
                        entry: e,
                        bits_disp: None,
                    },
                    // Prefix is a no-op here; the byte decodes through the
                    // main table.
                    IndexSlot::Vacant => Resolved {
                        entry: &OPCODE_TABLE[sub],
                        bits_disp: None,
                    },
                    IndexSlot::BitOps => {
                        let have = r.remaining();
                        let (Some(disp), Some(bits_op)) = (r.take(), r.take()) else {
                            break Terminator::Fault(DecodeFault::TruncatedOperand {
                                pc: instr_pc,
                                need: 2,
                                have,
                            });
                        };
                        Resolved {
                            entry: &bits_table[bits_op],
                            bits_disp: Some(disp),
                        }
                    }
                }
            }
            _ => Resolved {
                entry: &OPCODE_TABLE[op],
                bits_disp: None,
            },
        };

        let entry = resolved.entry;
        let opcode_end = r.pc();

        let Some(emitter) = &entry.ast else {
            break Terminator::Fault(DecodeFault::UndecodableOpcode {
                pc: instr_pc,
                bytes: r.span_from(instr_offset),
            });
        };

        let (value, target) = if let Some(disp) = resolved.bits_disp {
            (i32::from(disp), 0)
        } else {
            match entry.operand {
                None => (0, 0),
                Some(OperandKind::Uint8) => {
                    let have = r.remaining();
                    let Some(byte) = r.take() else {
                        break Terminator::Fault(DecodeFault::TruncatedOperand {
                            pc: instr_pc,
                            need: 1,
                            have,
                        });
                    };
                    (i32::from(byte), 0)
                }
                Some(OperandKind::Int8) => {
                    let have = r.remaining();
                    let Some(byte) = r.take() else {
                        break Terminator::Fault(DecodeFault::TruncatedOperand {
                            pc: instr_pc,
                            need: 1,
                            have,
                        });
                    };
                    // Absolute destination, folded once at decode time.
                    let disp = i32::from(byte as i8);
                    let target = (i32::from(r.pc()) + disp) & 0xFFFF;
                    (i32::from(byte), target)
                }
                Some(OperandKind::Uint16) => {
                    let have = r.remaining();
                    let (Some(lo), Some(hi)) = (r.take(), r.take()) else {
                        break Terminator::Fault(DecodeFault::TruncatedOperand {
                            pc: instr_pc,
                            need: 2,
                            have,
                        });
                    };
                    let word = i32::from(lo) | (i32::from(hi) << 8);
                    (word, word)
                }
            }
        };

        let site = Site {
            value,
            target,
            pc: i32::from(opcode_end),
        };
        let ir = emitter(site);

        if trace_enabled() {
            eprintln!(
                "[decode] pc={instr_pc:#06X} {name} value={value:#X} target={target:#X}",
                name = entry.name,
            );
        }

        instructions.push(DecodedInstr {
            pc: instr_pc,
            name: entry.name.to_string(),
            ir,
        });
        end_pc = r.pc();

        if let Some(end) = entry.ends_block {
            break match end {
                BlockEnd::Ret => Terminator::Ret,
                BlockEnd::Jump => Terminator::Jp,
                BlockEnd::Halt => Terminator::Halt,
            };
        }
    };

    Block {
        instructions,
        terminator,
        end_pc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AssignOp, Expr};

    #[test]
    fn lone_nop_then_buffer_end() {
        let block = decode_block(&[0x00], 0);
        assert_eq!(block.instructions.len(), 1);
        assert_eq!(block.instructions[0].pc, 0);
        assert_eq!(block.instructions[0].name, "NOP");
        assert!(block.instructions[0].ir.is_empty());
        assert_eq!(block.terminator.as_str(), "undecodable");
        assert_eq!(block.end_pc, 1);
    }

    #[test]
    fn ld_bc_immediate_word() {
        let block = decode_block(&[0x01, 0x34, 0x12], 0);
        let instr = &block.instructions[0];
        assert_eq!(instr.name, "LD BC,nn");
        assert_eq!(
            instr.ir,
            vec![Stmt::expr(Expr::call1("setBC", Expr::lit(0x1234)))]
        );
    }

    #[test]
    fn relative_jump_back_onto_itself() {
        let block = decode_block(&[0x18, 0xFE], 0x100);
        let instr = &block.instructions[0];
        match &instr.ir[0] {
            Stmt::If { test, then, .. } => {
                assert_eq!(*test, Expr::lit(1));
                assert_eq!(
                    then[0],
                    Stmt::expr(Expr::assign(
                        AssignOp::Set,
                        Expr::ident("pc"),
                        Expr::lit(0x100)
                    ))
                );
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn absolute_jump_terminates_block() {
        let block = decode_block(&[0xC3, 0x00, 0x20], 0);
        let instr = &block.instructions[0];
        assert_eq!(
            instr.ir,
            vec![
                Stmt::expr(Expr::assign(
                    AssignOp::Set,
                    Expr::ident("pc"),
                    Expr::lit(0x2000)
                )),
                Stmt::ret(),
            ]
        );
        assert_eq!(block.terminator, Terminator::Jp);
        assert_eq!(block.end_pc, 3);
    }

    #[test]
    fn index_prefixed_word_load() {
        let block = decode_block(&[0xDD, 0x21, 0xCD, 0xAB], 0);
        let instr = &block.instructions[0];
        assert_eq!(instr.name, "LD IX,nn");
        assert_eq!(
            instr.ir,
            vec![Stmt::expr(Expr::call1("setIX", Expr::lit(0xABCD)))]
        );
        assert_eq!(block.end_pc, 4);
    }

    #[test]
    fn xor_a_inlines_flag_table_value() {
        let block = decode_block(&[0xAF], 0);
        let ir = &block.instructions[0].ir;
        assert_eq!(ir.len(), 2);
        assert_eq!(
            ir[0],
            Stmt::expr(Expr::assign(AssignOp::Set, Expr::reg("a"), Expr::lit(0)))
        );
        assert_eq!(
            ir[1],
            Stmt::expr(Expr::assign(
                AssignOp::Set,
                Expr::reg("f"),
                Expr::lit(i32::from(crate::SZP_TABLE[0]))
            ))
        );
    }

    #[test]
    fn halt_stops_with_halt_terminator() {
        let block = decode_block(&[0x00, 0x76, 0x00], 0);
        assert_eq!(block.instructions.len(), 2);
        assert_eq!(block.terminator, Terminator::Halt);
        assert_eq!(block.end_pc, 2);
    }

    #[test]
    fn ret_terminates_after_decoding() {
        let block = decode_block(&[0x3E, 0x01, 0xC9, 0x00], 0);
        assert_eq!(block.instructions.len(), 2);
        assert_eq!(block.terminator, Terminator::Ret);
        assert_eq!(block.end_pc, 3);
    }

    #[test]
    fn prefix_run_applies_last_prefix_only() {
        // DD FD 21 nn nn resolves as LD IY,nn; both prefix bytes consume.
        let block = decode_block(&[0xDD, 0xFD, 0x21, 0x10, 0x20], 0);
        let instr = &block.instructions[0];
        assert_eq!(instr.name, "LD IY,nn");
        assert_eq!(block.end_pc, 5);
    }

    #[test]
    fn vacant_index_slot_falls_through_to_main_table() {
        // DD 04 is INC B with a wasted prefix byte.
        let block = decode_block(&[0xDD, 0x04, 0xC9], 0);
        assert_eq!(block.instructions[0].name, "INC B");
        assert_eq!(block.instructions[1].name, "RET");
        assert_eq!(block.instructions[1].pc, 2);
    }

    #[test]
    fn indexed_bit_ops_read_displacement_before_sub_opcode() {
        // DD CB d 46 -> BIT 0,(IX+d)
        let block = decode_block(&[0xDD, 0xCB, 0x05, 0x46], 0);
        let instr = &block.instructions[0];
        assert_eq!(instr.name, "BIT 0,(IX+d)");
        match &instr.ir[0] {
            Stmt::Expr {
                expr: Expr::Call { callee, args },
            } => {
                assert_eq!(callee, "bit8");
                match &args[1] {
                    Expr::Call { args: inner, .. } => match &inner[0] {
                        Expr::Binary { right, .. } => assert_eq!(**right, Expr::lit(5)),
                        other => panic!("unexpected address: {other:?}"),
                    },
                    other => panic!("unexpected operand: {other:?}"),
                }
            }
            other => panic!("unexpected statement: {other:?}"),
        }
        assert_eq!(block.end_pc, 4);
    }

    #[test]
    fn truncated_word_operand_is_reported() {
        let block = decode_block(&[0x00, 0x01, 0x34], 0);
        assert_eq!(block.instructions.len(), 1);
        assert_eq!(
            block.fault(),
            Some(&DecodeFault::TruncatedOperand {
                pc: 1,
                need: 2,
                have: 1
            })
        );
        assert_eq!(block.end_pc, 1);
    }

    #[test]
    fn named_stub_terminates_with_bytes() {
        // ED B0 is LDIR, named but not compiled.
        let block = decode_block(&[0x00, 0xED, 0xB0], 0);
        assert_eq!(block.instructions.len(), 1);
        assert_eq!(
            block.fault(),
            Some(&DecodeFault::UndecodableOpcode {
                pc: 1,
                bytes: vec![0xED, 0xB0]
            })
        );
    }

    #[test]
    fn undefined_ed_sub_opcode_decodes_as_nop() {
        let block = decode_block(&[0xED, 0x00, 0xC9], 0);
        assert_eq!(block.instructions[0].name, "NOP*");
        assert!(block.instructions[0].ir.is_empty());
        assert_eq!(block.terminator, Terminator::Ret);
    }

    #[test]
    fn decoding_is_deterministic() {
        let rom = [0x3E, 0x10, 0x06, 0x05, 0x80, 0x28, 0x02, 0x18, 0xFB, 0xC9];
        let a = decode_block(&rom, 0x4000);
        let b = decode_block(&rom, 0x4000);
        assert_eq!(a, b);
    }

    #[test]
    fn conditional_jump_does_not_terminate() {
        let block = decode_block(&[0xC2, 0x00, 0x30, 0xC9], 0);
        assert_eq!(block.instructions.len(), 2);
        assert_eq!(block.terminator, Terminator::Ret);
    }

    #[test]
    fn call_falls_through_to_next_instruction() {
        let block = decode_block(&[0xCD, 0x00, 0x20, 0xC9], 0);
        assert_eq!(block.instructions.len(), 2);
        // The pushed return address is the byte after the immediate.
        match &block.instructions[0].ir[0] {
            Stmt::Expr {
                expr: Expr::Call { args, .. },
            } => assert_eq!(args[0], Expr::lit(3)),
            other => panic!("unexpected statement: {other:?}"),
        }
    }
}
