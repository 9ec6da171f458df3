//! The six opcode tables consulted by the decoder.
//!
//! Each table is a dense 256-entry array keyed by the opcode byte, built once
//! at first use and immutable afterwards. The `DD`/`FD` tables come from a
//! single factory parameterized over the index-register family; their `0xCB`
//! slot is an escape marker into the corresponding `DDCB`/`FDCB` table rather
//! than an entry of its own.

use crate::ir::{BinOp, Expr};
use crate::ops::{self, Acc, Emitter, IndexReg, Logic, Pair, Reg8, Rot, Src16};
use crate::{F_CARRY, F_PARITY, F_SIGN, F_ZERO};
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::fmt;
use std::ops::Index;

/// How many bytes follow the opcode and how to read them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// One unsigned byte.
    Uint8 = 1,
    /// One signed byte; the decoder turns it into an absolute branch target.
    Int8 = 2,
    /// Two bytes, little-endian.
    Uint16 = 3,
}

/// Instructions after which straight-line decoding cannot continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    Ret,
    Jump,
    Halt,
}

pub struct OpcodeEntry {
    pub name: Cow<'static, str>,
    /// Pending emitter; absent entries are decoder terminators.
    pub ast: Option<Emitter>,
    pub operand: Option<OperandKind>,
    pub ends_block: Option<BlockEnd>,
}

impl OpcodeEntry {
    fn ast(mut self, emitter: Emitter) -> Self {
        self.ast = Some(emitter);
        self
    }

    fn imm8(mut self) -> Self {
        self.operand = Some(OperandKind::Uint8);
        self
    }

    fn disp8(mut self) -> Self {
        self.operand = Some(OperandKind::Int8);
        self
    }

    fn imm16(mut self) -> Self {
        self.operand = Some(OperandKind::Uint16);
        self
    }

    fn ends(mut self, end: BlockEnd) -> Self {
        self.ends_block = Some(end);
        self
    }
}

impl fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("name", &self.name)
            .field("ast", &self.ast.as_ref().map(|_| ".."))
            .field("operand", &self.operand)
            .field("ends_block", &self.ends_block)
            .finish()
    }
}

fn entry(name: impl Into<Cow<'static, str>>) -> OpcodeEntry {
    OpcodeEntry {
        name: name.into(),
        ast: None,
        operand: None,
        ends_block: None,
    }
}

/// Dense 256-entry table; the index is the opcode byte.
pub struct OpcodeTable {
    entries: Vec<OpcodeEntry>,
}

impl OpcodeTable {
    pub fn entry(&self, opcode: u8) -> &OpcodeEntry {
        &self.entries[usize::from(opcode)]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpcodeEntry> {
        self.entries.iter()
    }
}

impl Index<u8> for OpcodeTable {
    type Output = OpcodeEntry;

    fn index(&self, opcode: u8) -> &OpcodeEntry {
        self.entry(opcode)
    }
}

/// One slot of a `DD`/`FD` table.
pub enum IndexSlot {
    /// The prefix is a no-op for this opcode; re-interpret via the main table.
    Vacant,
    Op(OpcodeEntry),
    /// Escape into the `DDCB`/`FDCB` table (displacement precedes sub-opcode).
    BitOps,
}

pub struct IndexTable {
    slots: Vec<IndexSlot>,
}

impl IndexTable {
    pub fn slot(&self, opcode: u8) -> &IndexSlot {
        &self.slots[usize::from(opcode)]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexSlot> {
        self.slots.iter()
    }
}

struct TableBuilder {
    entries: Vec<Option<OpcodeEntry>>,
}

impl TableBuilder {
    fn new() -> Self {
        Self {
            entries: (0..256).map(|_| None).collect(),
        }
    }

    fn set(&mut self, opcode: u8, e: OpcodeEntry) {
        let slot = &mut self.entries[usize::from(opcode)];
        debug_assert!(slot.is_none(), "duplicate table entry {opcode:#04X}");
        *slot = Some(e);
    }

    fn finish(self, table: &str) -> OpcodeTable {
        let entries = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(opcode, e)| e.unwrap_or_else(|| panic!("{table} slot {opcode:#04X} unset")))
            .collect();
        OpcodeTable { entries }
    }

    /// Fill the remaining slots from `pad` before sealing the table.
    fn finish_padded(self, pad: impl Fn() -> OpcodeEntry) -> OpcodeTable {
        let entries = self
            .entries
            .into_iter()
            .map(|e| e.unwrap_or_else(&pad))
            .collect();
        OpcodeTable { entries }
    }
}

pub static OPCODE_TABLE: Lazy<OpcodeTable> = Lazy::new(build_main);
pub static OPCODE_TABLE_CB: Lazy<OpcodeTable> = Lazy::new(build_cb);
pub static OPCODE_TABLE_ED: Lazy<OpcodeTable> = Lazy::new(build_ed);
pub static OPCODE_TABLE_DD: Lazy<IndexTable> =
    Lazy::new(|| generate_index_table(IndexReg::IX));
pub static OPCODE_TABLE_FD: Lazy<IndexTable> =
    Lazy::new(|| generate_index_table(IndexReg::IY));
pub static OPCODE_TABLE_DDCB: Lazy<OpcodeTable> =
    Lazy::new(|| build_index_bits(IndexReg::IX));
pub static OPCODE_TABLE_FDCB: Lazy<OpcodeTable> =
    Lazy::new(|| build_index_bits(IndexReg::IY));

/// Register columns in encoding order; `None` is the `(HL)` slot.
const COLS: [Option<Reg8>; 8] = [
    Some(Reg8::B),
    Some(Reg8::C),
    Some(Reg8::D),
    Some(Reg8::E),
    Some(Reg8::H),
    Some(Reg8::L),
    None,
    Some(Reg8::A),
];

const COL_LABELS: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];

const ROTS: [Rot; 8] = [
    Rot::Rlc,
    Rot::Rrc,
    Rot::Rl,
    Rot::Rr,
    Rot::Sla,
    Rot::Sra,
    Rot::Sll,
    Rot::Srl,
];

fn build_main() -> OpcodeTable {
    let mut t = TableBuilder::new();

    t.set(0x00, entry("NOP").ast(ops::noop()));
    t.set(0x01, entry("LD BC,nn").imm16().ast(ops::ld16_imm(Pair::BC)));
    t.set(
        0x02,
        entry("LD (BC),A").ast(ops::ld_write_mem_reg(Pair::BC, Reg8::A)),
    );
    t.set(0x03, entry("INC BC").ast(ops::inc16(Pair::BC)));
    t.set(0x04, entry("INC B").ast(ops::inc8(Reg8::B)));
    t.set(0x05, entry("DEC B").ast(ops::dec8(Reg8::B)));
    t.set(0x06, entry("LD B,n").imm8().ast(ops::ld8_imm(Reg8::B)));
    t.set(0x07, entry("RLCA").ast(ops::rlca()));
    t.set(0x08, entry("EX AF,AF'").ast(ops::ex_af()));
    t.set(
        0x09,
        entry("ADD HL,BC").ast(ops::add16(Pair::HL, Src16::Pair(Pair::BC))),
    );
    t.set(
        0x0A,
        entry("LD A,(BC)").ast(ops::ld8_mem_pair(Reg8::A, Pair::BC)),
    );
    t.set(0x0B, entry("DEC BC").ast(ops::dec16(Pair::BC)));
    t.set(0x0C, entry("INC C").ast(ops::inc8(Reg8::C)));
    t.set(0x0D, entry("DEC C").ast(ops::dec8(Reg8::C)));
    t.set(0x0E, entry("LD C,n").imm8().ast(ops::ld8_imm(Reg8::C)));
    t.set(0x0F, entry("RRCA").ast(ops::rrca()));

    t.set(0x10, entry("DJNZ (PC+e)").disp8().ast(ops::djnz()));
    t.set(0x11, entry("LD DE,nn").imm16().ast(ops::ld16_imm(Pair::DE)));
    t.set(
        0x12,
        entry("LD (DE),A").ast(ops::ld_write_mem_reg(Pair::DE, Reg8::A)),
    );
    t.set(0x13, entry("INC DE").ast(ops::inc16(Pair::DE)));
    t.set(0x14, entry("INC D").ast(ops::inc8(Reg8::D)));
    t.set(0x15, entry("DEC D").ast(ops::dec8(Reg8::D)));
    t.set(0x16, entry("LD D,n").imm8().ast(ops::ld8_imm(Reg8::D)));
    t.set(0x17, entry("RLA").ast(ops::rla()));
    t.set(0x18, entry("JR (PC+e)").disp8().ast(ops::jr(Expr::lit(1))));
    t.set(
        0x19,
        entry("ADD HL,DE").ast(ops::add16(Pair::HL, Src16::Pair(Pair::DE))),
    );
    t.set(
        0x1A,
        entry("LD A,(DE)").ast(ops::ld8_mem_pair(Reg8::A, Pair::DE)),
    );
    t.set(0x1B, entry("DEC DE").ast(ops::dec16(Pair::DE)));
    t.set(0x1C, entry("INC E").ast(ops::inc8(Reg8::E)));
    t.set(0x1D, entry("DEC E").ast(ops::dec8(Reg8::E)));
    t.set(0x1E, entry("LD E,n").imm8().ast(ops::ld8_imm(Reg8::E)));
    t.set(0x1F, entry("RRA").ast(ops::rra()));

    t.set(
        0x20,
        entry("JR NZ,(PC+e)").disp8().ast(ops::jr(ops::cond_nz())),
    );
    t.set(0x21, entry("LD HL,nn").imm16().ast(ops::ld16_imm(Pair::HL)));
    t.set(
        0x22,
        entry("LD (nn),HL")
            .imm16()
            .ast(ops::ld_write_abs_pair(Pair::HL)),
    );
    t.set(0x23, entry("INC HL").ast(ops::inc16(Pair::HL)));
    t.set(0x24, entry("INC H").ast(ops::inc8(Reg8::H)));
    t.set(0x25, entry("DEC H").ast(ops::dec8(Reg8::H)));
    t.set(0x26, entry("LD H,n").imm8().ast(ops::ld8_imm(Reg8::H)));
    t.set(0x27, entry("DAA").ast(ops::daa()));
    t.set(
        0x28,
        entry("JR Z,(PC+e)").disp8().ast(ops::jr(ops::cond_z())),
    );
    t.set(
        0x29,
        entry("ADD HL,HL").ast(ops::add16(Pair::HL, Src16::Pair(Pair::HL))),
    );
    t.set(
        0x2A,
        entry("LD HL,(nn)").imm16().ast(ops::ld16_mem(Pair::HL)),
    );
    t.set(0x2B, entry("DEC HL").ast(ops::dec16(Pair::HL)));
    t.set(0x2C, entry("INC L").ast(ops::inc8(Reg8::L)));
    t.set(0x2D, entry("DEC L").ast(ops::dec8(Reg8::L)));
    t.set(0x2E, entry("LD L,n").imm8().ast(ops::ld8_imm(Reg8::L)));
    t.set(0x2F, entry("CPL").ast(ops::cpl()));

    t.set(
        0x30,
        entry("JR NC,(PC+e)").disp8().ast(ops::jr(ops::cond_nc())),
    );
    t.set(0x31, entry("LD SP,nn").imm16().ast(ops::ld_sp()));
    t.set(
        0x32,
        entry("LD (nn),A").imm16().ast(ops::ld_write_abs_reg(Reg8::A)),
    );
    t.set(0x33, entry("INC SP").ast(ops::inc_sp()));
    t.set(0x34, entry("INC (HL)").ast(ops::inc8_ind(Pair::HL)));
    t.set(0x35, entry("DEC (HL)").ast(ops::dec8_ind(Pair::HL)));
    t.set(
        0x36,
        entry("LD (HL),n").imm8().ast(ops::ld_write_mem_imm(Pair::HL)),
    );
    t.set(0x37, entry("SCF").ast(ops::scf()));
    t.set(
        0x38,
        entry("JR C,(PC+e)").disp8().ast(ops::jr(ops::cond_c())),
    );
    t.set(0x39, entry("ADD HL,SP").ast(ops::add16(Pair::HL, Src16::Sp)));
    t.set(
        0x3A,
        entry("LD A,(nn)").imm16().ast(ops::ld8_mem_abs(Reg8::A)),
    );
    t.set(0x3B, entry("DEC SP").ast(ops::dec_sp()));
    t.set(0x3C, entry("INC A").ast(ops::inc8(Reg8::A)));
    t.set(0x3D, entry("DEC A").ast(ops::dec8(Reg8::A)));
    t.set(0x3E, entry("LD A,n").imm8().ast(ops::ld8_imm(Reg8::A)));
    t.set(0x3F, entry("CCF").ast(ops::ccf()));

    // 0x40..=0x7F: the LD r,r' grid, with (HL) in column/row 6 and HALT at
    // the crossing point.
    for (row, dst) in COLS.iter().enumerate() {
        for (col, src) in COLS.iter().enumerate() {
            let code = 0x40 + (row * 8 + col) as u8;
            if code == 0x76 {
                t.set(code, entry("HALT").ast(ops::halt()).ends(BlockEnd::Halt));
                continue;
            }
            let name = format!("LD {},{}", COL_LABELS[row], COL_LABELS[col]);
            let e = match (dst, src) {
                (Some(d), Some(s)) => entry(name).ast(ops::ld8_reg(*d, *s)),
                (Some(d), None) => entry(name).ast(ops::ld8_mem_pair(*d, Pair::HL)),
                (None, Some(s)) => entry(name).ast(ops::ld_write_mem_reg(Pair::HL, *s)),
                (None, None) => unreachable!("HALT handled above"),
            };
            t.set(code, e);
        }
    }

    // 0x80..=0xBF: accumulator arithmetic and logic.
    enum Alu {
        Acc(Acc),
        Logic(Logic),
    }
    let rows = [
        (Alu::Acc(Acc::Add), "ADD A,"),
        (Alu::Acc(Acc::Adc), "ADC A,"),
        (Alu::Acc(Acc::Sub), "SUB "),
        (Alu::Acc(Acc::Sbc), "SBC A,"),
        (Alu::Logic(Logic::And), "AND "),
        (Alu::Logic(Logic::Xor), "XOR "),
        (Alu::Logic(Logic::Or), "OR "),
        (Alu::Acc(Acc::Cp), "CP "),
    ];
    for (row, (alu, prefix)) in rows.iter().enumerate() {
        for (col, reg) in COLS.iter().enumerate() {
            let code = 0x80 + (row * 8 + col) as u8;
            let name = format!("{prefix}{}", COL_LABELS[col]);
            let emitter = match (alu, reg) {
                (Alu::Acc(op), Some(r)) => ops::acc_reg(*op, *r),
                (Alu::Acc(op), None) => ops::acc_ind(*op, Pair::HL),
                (Alu::Logic(op), Some(r)) => ops::logic_reg(*op, *r),
                (Alu::Logic(op), None) => ops::logic_ind(*op, Pair::HL),
            };
            t.set(code, entry(name).ast(emitter));
        }
    }

    t.set(0xC0, entry("RET NZ").ast(ops::ret_cond(BinOp::Eq, F_ZERO)));
    t.set(0xC1, entry("POP BC").ast(ops::pop(Pair::BC)));
    t.set(
        0xC2,
        entry("JP NZ,nn").imm16().ast(ops::jp_cond(BinOp::Eq, F_ZERO)),
    );
    t.set(
        0xC3,
        entry("JP nn").imm16().ast(ops::jp()).ends(BlockEnd::Jump),
    );
    t.set(
        0xC4,
        entry("CALL NZ,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Eq, F_ZERO)),
    );
    t.set(0xC5, entry("PUSH BC").ast(ops::push(Pair::BC)));
    t.set(0xC6, entry("ADD A,n").imm8().ast(ops::acc_imm(Acc::Add)));
    t.set(0xC7, entry("RST 00H").ast(ops::rst(0x00)));
    t.set(0xC8, entry("RET Z").ast(ops::ret_cond(BinOp::Ne, F_ZERO)));
    t.set(0xC9, entry("RET").ast(ops::ret()).ends(BlockEnd::Ret));
    t.set(
        0xCA,
        entry("JP Z,nn").imm16().ast(ops::jp_cond(BinOp::Ne, F_ZERO)),
    );
    t.set(0xCB, entry("PREFIX CB"));
    t.set(
        0xCC,
        entry("CALL Z,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Ne, F_ZERO)),
    );
    t.set(0xCD, entry("CALL nn").imm16().ast(ops::call()));
    t.set(0xCE, entry("ADC A,n").imm8().ast(ops::acc_imm(Acc::Adc)));
    t.set(0xCF, entry("RST 08H").ast(ops::rst(0x08)));

    t.set(0xD0, entry("RET NC").ast(ops::ret_cond(BinOp::Eq, F_CARRY)));
    t.set(0xD1, entry("POP DE").ast(ops::pop(Pair::DE)));
    t.set(
        0xD2,
        entry("JP NC,nn").imm16().ast(ops::jp_cond(BinOp::Eq, F_CARRY)),
    );
    t.set(0xD3, entry("OUT (n),A").imm8().ast(ops::out_imm()));
    t.set(
        0xD4,
        entry("CALL NC,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Eq, F_CARRY)),
    );
    t.set(0xD5, entry("PUSH DE").ast(ops::push(Pair::DE)));
    t.set(0xD6, entry("SUB n").imm8().ast(ops::acc_imm(Acc::Sub)));
    t.set(0xD7, entry("RST 10H").ast(ops::rst(0x10)));
    t.set(0xD8, entry("RET C").ast(ops::ret_cond(BinOp::Ne, F_CARRY)));
    t.set(0xD9, entry("EXX").ast(ops::exx()));
    t.set(
        0xDA,
        entry("JP C,nn").imm16().ast(ops::jp_cond(BinOp::Ne, F_CARRY)),
    );
    t.set(0xDB, entry("IN A,(n)").imm8().ast(ops::in_imm()));
    t.set(
        0xDC,
        entry("CALL C,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Ne, F_CARRY)),
    );
    t.set(0xDD, entry("PREFIX DD"));
    t.set(0xDE, entry("SBC A,n").imm8().ast(ops::acc_imm(Acc::Sbc)));
    t.set(0xDF, entry("RST 18H").ast(ops::rst(0x18)));

    t.set(0xE0, entry("RET PO").ast(ops::ret_cond(BinOp::Eq, F_PARITY)));
    t.set(0xE1, entry("POP HL").ast(ops::pop(Pair::HL)));
    t.set(
        0xE2,
        entry("JP PO,nn")
            .imm16()
            .ast(ops::jp_cond(BinOp::Eq, F_PARITY)),
    );
    t.set(0xE3, entry("EX (SP),HL").ast(ops::ex_sp_hl()));
    t.set(
        0xE4,
        entry("CALL PO,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Eq, F_PARITY)),
    );
    t.set(0xE5, entry("PUSH HL").ast(ops::push(Pair::HL)));
    t.set(0xE6, entry("AND n").imm8().ast(ops::logic_imm(Logic::And)));
    t.set(0xE7, entry("RST 20H").ast(ops::rst(0x20)));
    t.set(0xE8, entry("RET PE").ast(ops::ret_cond(BinOp::Ne, F_PARITY)));
    t.set(
        0xE9,
        entry("JP (HL)").ast(ops::jp_pair(Pair::HL)).ends(BlockEnd::Jump),
    );
    t.set(
        0xEA,
        entry("JP PE,nn")
            .imm16()
            .ast(ops::jp_cond(BinOp::Ne, F_PARITY)),
    );
    t.set(0xEB, entry("EX DE,HL").ast(ops::ex_de_hl()));
    t.set(
        0xEC,
        entry("CALL PE,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Ne, F_PARITY)),
    );
    t.set(0xED, entry("PREFIX ED"));
    t.set(0xEE, entry("XOR n").imm8().ast(ops::logic_imm(Logic::Xor)));
    t.set(0xEF, entry("RST 28H").ast(ops::rst(0x28)));

    t.set(0xF0, entry("RET P").ast(ops::ret_cond(BinOp::Eq, F_SIGN)));
    t.set(0xF1, entry("POP AF").ast(ops::pop(Pair::AF)));
    t.set(
        0xF2,
        entry("JP P,nn").imm16().ast(ops::jp_cond(BinOp::Eq, F_SIGN)),
    );
    t.set(0xF3, entry("DI").ast(ops::di()));
    t.set(
        0xF4,
        entry("CALL P,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Eq, F_SIGN)),
    );
    t.set(0xF5, entry("PUSH AF").ast(ops::push(Pair::AF)));
    t.set(0xF6, entry("OR n").imm8().ast(ops::logic_imm(Logic::Or)));
    t.set(0xF7, entry("RST 30H").ast(ops::rst(0x30)));
    t.set(0xF8, entry("RET M").ast(ops::ret_cond(BinOp::Ne, F_SIGN)));
    t.set(0xF9, entry("LD SP,HL").ast(ops::ld_sp_pair(Pair::HL)));
    t.set(
        0xFA,
        entry("JP M,nn").imm16().ast(ops::jp_cond(BinOp::Ne, F_SIGN)),
    );
    t.set(0xFB, entry("EI").ast(ops::ei()));
    t.set(
        0xFC,
        entry("CALL M,nn")
            .imm16()
            .ast(ops::call_cond(BinOp::Ne, F_SIGN)),
    );
    t.set(0xFD, entry("PREFIX FD"));
    t.set(0xFE, entry("CP n").imm8().ast(ops::acc_imm(Acc::Cp)));
    t.set(0xFF, entry("RST 38H").ast(ops::rst(0x38)));

    t.finish("main")
}

fn build_cb() -> OpcodeTable {
    let mut t = TableBuilder::new();
    for code in 0..=0xFFu8 {
        let col = usize::from(code & 0x07);
        let sel = usize::from((code >> 3) & 0x07);
        let label = COL_LABELS[col];
        let reg = COLS[col];
        let e = match code >> 6 {
            0 => {
                let rot = ROTS[sel];
                let name = format!("{} {label}", rot.mnemonic());
                match reg {
                    Some(r) => entry(name).ast(ops::rot_reg(rot, r)),
                    None => entry(name).ast(ops::rot_ind(rot)),
                }
            }
            1 => {
                let name = format!("BIT {sel},{label}");
                match reg {
                    Some(r) => entry(name).ast(ops::bit_reg(sel as u8, r)),
                    None => entry(name).ast(ops::bit_ind(sel as u8)),
                }
            }
            2 => {
                let name = format!("RES {sel},{label}");
                match reg {
                    Some(r) => entry(name).ast(ops::res_reg(sel as u8, r)),
                    None => entry(name).ast(ops::res_ind(sel as u8)),
                }
            }
            _ => {
                let name = format!("SET {sel},{label}");
                match reg {
                    Some(r) => entry(name).ast(ops::set_reg(sel as u8, r)),
                    None => entry(name).ast(ops::set_ind(sel as u8)),
                }
            }
        };
        t.set(code, e);
    }
    t.finish("CB")
}

fn build_ed() -> OpcodeTable {
    let mut t = TableBuilder::new();

    // IN r,(C) / OUT (C),r; the column-6 slots are the flag-only and
    // zero-output oddballs, left uncompiled.
    for (col, reg) in COLS.iter().enumerate() {
        let base = 0x40 + (col * 8) as u8;
        match reg {
            Some(r) => {
                t.set(
                    base,
                    entry(format!("IN {},(C)", COL_LABELS[col])).ast(ops::in_c(*r)),
                );
                t.set(
                    base + 1,
                    entry(format!("OUT (C),{}", COL_LABELS[col])).ast(ops::out_c(*r)),
                );
            }
            None => {
                t.set(base, entry("IN (C)"));
                t.set(base + 1, entry("OUT (C),0"));
            }
        }
    }

    let wide: [(u8, Src16, &str); 4] = [
        (0x42, Src16::Pair(Pair::BC), "BC"),
        (0x52, Src16::Pair(Pair::DE), "DE"),
        (0x62, Src16::Pair(Pair::HL), "HL"),
        (0x72, Src16::Sp, "SP"),
    ];
    for (code, src, label) in wide {
        t.set(code, entry(format!("SBC HL,{label}")).ast(ops::sbc16_hl(src)));
        t.set(
            code + 8,
            entry(format!("ADC HL,{label}")).ast(ops::adc16_hl(src)),
        );
    }

    t.set(
        0x43,
        entry("LD (nn),BC")
            .imm16()
            .ast(ops::ld_write_abs_pair(Pair::BC)),
    );
    t.set(
        0x53,
        entry("LD (nn),DE")
            .imm16()
            .ast(ops::ld_write_abs_pair(Pair::DE)),
    );
    t.set(
        0x63,
        entry("LD (nn),HL")
            .imm16()
            .ast(ops::ld_write_abs_pair(Pair::HL)),
    );
    t.set(0x73, entry("LD (nn),SP").imm16().ast(ops::ld_write_abs_sp()));
    t.set(0x4B, entry("LD BC,(nn)").imm16().ast(ops::ld16_mem(Pair::BC)));
    t.set(0x5B, entry("LD DE,(nn)").imm16().ast(ops::ld16_mem(Pair::DE)));
    t.set(0x6B, entry("LD HL,(nn)").imm16().ast(ops::ld16_mem(Pair::HL)));
    t.set(0x7B, entry("LD SP,(nn)").imm16().ast(ops::ld_sp_mem()));

    t.set(0x44, entry("NEG").ast(ops::neg()));
    t.set(0x45, entry("RETN"));
    t.set(0x4D, entry("RETI"));
    t.set(0x46, entry("IM 0").ast(ops::im(0)));
    t.set(0x56, entry("IM 1").ast(ops::im(1)));
    t.set(0x5E, entry("IM 2").ast(ops::im(2)));
    t.set(0x47, entry("LD I,A"));
    t.set(0x4F, entry("LD R,A"));
    t.set(0x57, entry("LD A,I"));
    t.set(0x5F, entry("LD A,R"));
    t.set(0x67, entry("RRD"));
    t.set(0x6F, entry("RLD"));

    for (code, name) in [
        (0xA0, "LDI"),
        (0xA1, "CPI"),
        (0xA2, "INI"),
        (0xA3, "OUTI"),
        (0xA8, "LDD"),
        (0xA9, "CPD"),
        (0xAA, "IND"),
        (0xAB, "OUTD"),
        (0xB0, "LDIR"),
        (0xB1, "CPIR"),
        (0xB2, "INIR"),
        (0xB3, "OTIR"),
        (0xB8, "LDDR"),
        (0xB9, "CPDR"),
        (0xBA, "INDR"),
        (0xBB, "OTDR"),
    ] {
        t.set(code, entry(name));
    }

    // Everything else in the ED space is an undefined sub-opcode; those
    // behave as plain NOPs on hardware, so decoding continues through them.
    t.finish_padded(|| entry("NOP*").ast(ops::noop()))
}

/// Build the `DD` or `FD` table for the given index-register family. Slots
/// left vacant fall through to the main table in the decoder.
pub fn generate_index_table(x: IndexReg) -> IndexTable {
    let n = x.name();
    let mut slots: Vec<IndexSlot> = (0..256).map(|_| IndexSlot::Vacant).collect();
    let mut set = |opcode: u8, e: OpcodeEntry| {
        slots[usize::from(opcode)] = IndexSlot::Op(e);
    };

    set(
        0x09,
        entry(format!("ADD {n},BC")).ast(ops::add16_x(x, Src16::Pair(Pair::BC))),
    );
    set(
        0x19,
        entry(format!("ADD {n},DE")).ast(ops::add16_x(x, Src16::Pair(Pair::DE))),
    );
    set(
        0x29,
        entry(format!("ADD {n},{n}")).ast(ops::add16_x(x, Src16::Index(x))),
    );
    set(
        0x39,
        entry(format!("ADD {n},SP")).ast(ops::add16_x(x, Src16::Sp)),
    );

    set(0x21, entry(format!("LD {n},nn")).imm16().ast(ops::ld16_imm_x(x)));
    set(
        0x22,
        entry(format!("LD (nn),{n}")).imm16().ast(ops::ld_write_abs_x(x)),
    );
    set(0x23, entry(format!("INC {n}")).ast(ops::inc16_x(x)));
    set(
        0x2A,
        entry(format!("LD {n},(nn)")).imm16().ast(ops::ld16_mem_x(x)),
    );
    set(0x2B, entry(format!("DEC {n}")).ast(ops::dec16_x(x)));

    set(0x34, entry(format!("INC ({n}+d)")).imm8().ast(ops::inc_x(x)));
    set(0x35, entry(format!("DEC ({n}+d)")).imm8().ast(ops::dec_x(x)));
    set(
        0x36,
        entry(format!("LD ({n}+d),n")).imm16().ast(ops::ld_x_imm(x)),
    );

    for (code, r, label) in [
        (0x46, Reg8::B, "B"),
        (0x4E, Reg8::C, "C"),
        (0x56, Reg8::D, "D"),
        (0x5E, Reg8::E, "E"),
        (0x66, Reg8::H, "H"),
        (0x6E, Reg8::L, "L"),
        (0x7E, Reg8::A, "A"),
    ] {
        set(
            code,
            entry(format!("LD {label},({n}+d)")).imm8().ast(ops::ld8_d(r, x)),
        );
    }

    for (code, r, label) in [
        (0x70, Reg8::B, "B"),
        (0x71, Reg8::C, "C"),
        (0x72, Reg8::D, "D"),
        (0x73, Reg8::E, "E"),
        (0x74, Reg8::H, "H"),
        (0x75, Reg8::L, "L"),
        (0x77, Reg8::A, "A"),
    ] {
        set(
            code,
            entry(format!("LD ({n}+d),{label}")).imm8().ast(ops::ld_x(x, r)),
        );
    }
    // TODO: 0x76 duplicates the 0x70 store; a HALT-shaped entry is the likely
    // intent for this slot.
    set(
        0x76,
        entry(format!("LD ({n}+d),B")).imm8().ast(ops::ld_x(x, Reg8::B)),
    );

    set(
        0x86,
        entry(format!("ADD A,({n}+d)")).imm8().ast(ops::acc_x(Acc::Add, x)),
    );
    set(
        0x8E,
        entry(format!("ADC A,({n}+d)")).imm8().ast(ops::acc_x(Acc::Adc, x)),
    );
    set(
        0x96,
        entry(format!("SUB ({n}+d)")).imm8().ast(ops::acc_x(Acc::Sub, x)),
    );
    set(
        0x9E,
        entry(format!("SBC A,({n}+d)")).imm8().ast(ops::acc_x(Acc::Sbc, x)),
    );
    set(
        0xA6,
        entry(format!("AND ({n}+d)")).imm8().ast(ops::logic_x(Logic::And, x)),
    );
    set(
        0xAE,
        entry(format!("XOR ({n}+d)")).imm8().ast(ops::logic_x(Logic::Xor, x)),
    );
    set(
        0xB6,
        entry(format!("OR ({n}+d)")).imm8().ast(ops::logic_x(Logic::Or, x)),
    );
    set(
        0xBE,
        entry(format!("CP ({n}+d)")).imm8().ast(ops::acc_x(Acc::Cp, x)),
    );

    set(0xE1, entry(format!("POP {n}")).ast(ops::pop_x(x)));
    set(0xE3, entry(format!("EX (SP),{n}")).ast(ops::ex_sp_x(x)));
    set(0xE5, entry(format!("PUSH {n}")).ast(ops::push_x(x)));
    set(
        0xE9,
        entry(format!("JP ({n})")).ast(ops::jp_x(x)).ends(BlockEnd::Jump),
    );
    set(0xF9, entry(format!("LD SP,{n}")).ast(ops::ld_sp_x(x)));

    slots[0xCB] = IndexSlot::BitOps;

    IndexTable { slots }
}

/// Build the `DDCB`/`FDCB` table. The displacement byte is consumed by the
/// decoder before the sub-opcode and handed to the emitter as the operand
/// value, so the entries themselves declare none.
fn build_index_bits(x: IndexReg) -> OpcodeTable {
    let n = x.name();
    let mut t = TableBuilder::new();
    for code in 0..=0xFFu8 {
        let col = usize::from(code & 0x07);
        let sel = usize::from((code >> 3) & 0x07);
        let e = match code >> 6 {
            0 => {
                let rot = ROTS[sel];
                if col == 6 {
                    entry(format!("{} ({n}+d)", rot.mnemonic())).ast(ops::rot_x(rot, x))
                } else {
                    // Undocumented copy-to-register form; not compiled.
                    entry(format!("{} ({n}+d),{}", rot.mnemonic(), COL_LABELS[col]))
                }
            }
            // BIT reads the same bit whatever the column encodes.
            1 => entry(format!("BIT {sel},({n}+d)")).ast(ops::bit_x(sel as u8, x)),
            2 => {
                if col == 6 {
                    entry(format!("RES {sel},({n}+d)")).ast(ops::res_x(sel as u8, x))
                } else {
                    entry(format!("RES {sel},({n}+d),{}", COL_LABELS[col]))
                }
            }
            _ => {
                if col == 6 {
                    entry(format!("SET {sel},({n}+d)")).ast(ops::set_x(sel as u8, x))
                } else {
                    entry(format!("SET {sel},({n}+d),{}", COL_LABELS[col]))
                }
            }
        };
        t.set(code, e);
    }
    t.finish("index bits")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_tables_are_total() {
        for table in [&*OPCODE_TABLE, &*OPCODE_TABLE_CB, &*OPCODE_TABLE_ED] {
            assert_eq!(table.len(), 256);
            for (opcode, e) in table.iter().enumerate() {
                assert!(!e.name.is_empty(), "unnamed entry {opcode:#04X}");
            }
        }
    }

    #[test]
    fn index_bit_tables_are_total() {
        for table in [&*OPCODE_TABLE_DDCB, &*OPCODE_TABLE_FDCB] {
            assert_eq!(table.len(), 256);
            for e in table.iter() {
                assert!(!e.name.is_empty());
            }
        }
    }

    #[test]
    fn index_tables_share_shape() {
        assert_eq!(OPCODE_TABLE_DD.len(), 256);
        assert_eq!(OPCODE_TABLE_FD.len(), 256);
        for (dd, fd) in OPCODE_TABLE_DD.iter().zip(OPCODE_TABLE_FD.iter()) {
            match (dd, fd) {
                (IndexSlot::Vacant, IndexSlot::Vacant) => {}
                (IndexSlot::BitOps, IndexSlot::BitOps) => {}
                (IndexSlot::Op(a), IndexSlot::Op(b)) => {
                    assert_eq!(a.operand, b.operand);
                    assert_eq!(a.ends_block, b.ends_block);
                    assert_eq!(a.ast.is_some(), b.ast.is_some());
                    // Populated slots differ only in the register-family name.
                    assert_eq!(a.name.replace("IX", "IY"), b.name.as_ref());
                }
                _ => panic!("index table slot shape mismatch"),
            }
        }
    }

    #[test]
    fn main_table_spot_checks() {
        let e = &OPCODE_TABLE[0x01];
        assert_eq!(e.name, "LD BC,nn");
        assert_eq!(e.operand, Some(OperandKind::Uint16));
        assert!(e.ast.is_some());

        assert_eq!(OPCODE_TABLE[0x76].name, "HALT");
        assert_eq!(OPCODE_TABLE[0x76].ends_block, Some(BlockEnd::Halt));
        assert_eq!(OPCODE_TABLE[0xC9].ends_block, Some(BlockEnd::Ret));
        assert_eq!(OPCODE_TABLE[0xC3].ends_block, Some(BlockEnd::Jump));
        assert_eq!(OPCODE_TABLE[0xE9].name, "JP (HL)");

        // Prefix slots carry names but no emitters.
        for prefix in [0xCBu8, 0xDD, 0xED, 0xFD] {
            assert!(OPCODE_TABLE[prefix].ast.is_none());
        }
    }

    #[test]
    fn cb_table_covers_all_groups() {
        assert_eq!(OPCODE_TABLE_CB[0x00].name, "RLC B");
        assert_eq!(OPCODE_TABLE_CB[0x46].name, "BIT 0,(HL)");
        assert_eq!(OPCODE_TABLE_CB[0xBF].name, "RES 7,A");
        assert_eq!(OPCODE_TABLE_CB[0xFF].name, "SET 7,A");
        assert!(OPCODE_TABLE_CB.iter().all(|e| e.ast.is_some()));
    }

    #[test]
    fn ed_table_mixes_compiled_and_stub_entries() {
        assert_eq!(OPCODE_TABLE_ED[0x44].name, "NEG");
        assert!(OPCODE_TABLE_ED[0x44].ast.is_some());
        assert_eq!(OPCODE_TABLE_ED[0xB0].name, "LDIR");
        assert!(OPCODE_TABLE_ED[0xB0].ast.is_none());
        // Undefined slots decode as no-ops.
        assert_eq!(OPCODE_TABLE_ED[0x00].name, "NOP*");
        assert!(OPCODE_TABLE_ED[0x00].ast.is_some());
    }

    #[test]
    fn index_table_store_slot_quirk() {
        // 0x76 mirrors the 0x70 store instead of halting.
        match OPCODE_TABLE_DD.slot(0x76) {
            IndexSlot::Op(e) => {
                assert_eq!(e.name, "LD (IX+d),B");
                assert!(e.ast.is_some());
            }
            _ => panic!("expected a populated slot at 0x76"),
        }
        assert!(matches!(OPCODE_TABLE_DD.slot(0xCB), IndexSlot::BitOps));
        assert!(matches!(OPCODE_TABLE_DD.slot(0x00), IndexSlot::Vacant));
    }
}
