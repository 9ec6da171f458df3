//! Opcode combinators: parameterized builders that produce pending emitters.
//!
//! A pending emitter is a closure over the register parameters of one opcode
//! family. The decoder calls it with the concrete instruction site (decoded
//! operand, branch target, fall-through address) and receives the IR
//! statements describing the instruction's observable effect. Helper calls
//! like `inc8` or `add_a` carry their flag side-effects host-side.

use crate::ir::{AssignOp, BinOp, Expr, Stmt};
use crate::{F_CARRY, F_HALFCARRY, F_ZERO, SZP_TABLE};
use std::sync::Arc;

/// Concrete facts about one instruction site, filled in by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    /// Decoded immediate operand (unsigned byte, packed pair, or 16-bit word).
    pub value: i32,
    /// Absolute branch destination for PC-relative and absolute jumps.
    pub target: i32,
    /// Address of the byte following the opcode byte.
    pub pc: i32,
}

/// A pending emitter: instruction site in, IR statements out.
pub type Emitter = Arc<dyn Fn(Site) -> Vec<Stmt> + Send + Sync>;

fn emit(f: impl Fn(Site) -> Vec<Stmt> + Send + Sync + 'static) -> Emitter {
    Arc::new(f)
}

/// 8-bit main registers addressable in emitted IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    F,
}

impl Reg8 {
    pub fn name(self) -> &'static str {
        match self {
            Reg8::A => "a",
            Reg8::B => "b",
            Reg8::C => "c",
            Reg8::D => "d",
            Reg8::E => "e",
            Reg8::H => "h",
            Reg8::L => "l",
            Reg8::F => "f",
        }
    }

    fn expr(self) -> Expr {
        Expr::reg(self.name())
    }
}

/// 16-bit register pairs, accessed through host getter/setter calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pair {
    BC,
    DE,
    HL,
    AF,
}

impl Pair {
    pub fn name(self) -> &'static str {
        match self {
            Pair::BC => "BC",
            Pair::DE => "DE",
            Pair::HL => "HL",
            Pair::AF => "AF",
        }
    }

    pub fn hi(self) -> Reg8 {
        match self {
            Pair::BC => Reg8::B,
            Pair::DE => Reg8::D,
            Pair::HL => Reg8::H,
            Pair::AF => Reg8::A,
        }
    }

    pub fn lo(self) -> Reg8 {
        match self {
            Pair::BC => Reg8::C,
            Pair::DE => Reg8::E,
            Pair::HL => Reg8::L,
            Pair::AF => Reg8::F,
        }
    }
}

/// Index register family; the `DD`/`FD` tables differ only in this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexReg {
    IX,
    IY,
}

impl IndexReg {
    pub fn name(self) -> &'static str {
        match self {
            IndexReg::IX => "IX",
            IndexReg::IY => "IY",
        }
    }
}

/// 16-bit source operand for the wide adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Src16 {
    Pair(Pair),
    Sp,
    Index(IndexReg),
}

impl Src16 {
    fn expr(self) -> Expr {
        match self {
            Src16::Pair(pair) => get_pair(pair),
            Src16::Sp => Expr::ident("sp"),
            Src16::Index(x) => get_index(x),
        }
    }
}

/// Accumulator arithmetic routed through a host helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acc {
    Add,
    Adc,
    Sub,
    Sbc,
    Cp,
}

impl Acc {
    fn helper(self) -> &'static str {
        match self {
            Acc::Add => "add_a",
            Acc::Adc => "adc_a",
            Acc::Sub => "sub_a",
            Acc::Sbc => "sbc_a",
            Acc::Cp => "cp_a",
        }
    }
}

/// Accumulator logic emitted inline with an SZP flag lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
    Xor,
}

impl Logic {
    fn assign_op(self) -> AssignOp {
        match self {
            Logic::And => AssignOp::And,
            Logic::Or => AssignOp::Or,
            Logic::Xor => AssignOp::Xor,
        }
    }

    fn flag_update(self) -> Stmt {
        let lookup = szp_lookup(Reg8::A.expr());
        let value = match self {
            // AND additionally sets half-carry.
            Logic::And => Expr::bin(BinOp::Or, lookup, Expr::lit(i32::from(F_HALFCARRY))),
            Logic::Or | Logic::Xor => lookup,
        };
        set_stmt(Reg8::F.expr(), value)
    }
}

/// CB-table rotate/shift group; the helper returns the rotated value and
/// owns the flag effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rot {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
}

impl Rot {
    fn helper(self) -> &'static str {
        match self {
            Rot::Rlc => "rlc8",
            Rot::Rrc => "rrc8",
            Rot::Rl => "rl8",
            Rot::Rr => "rr8",
            Rot::Sla => "sla8",
            Rot::Sra => "sra8",
            Rot::Sll => "sll8",
            Rot::Srl => "srl8",
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Rot::Rlc => "RLC",
            Rot::Rrc => "RRC",
            Rot::Rl => "RL",
            Rot::Rr => "RR",
            Rot::Sla => "SLA",
            Rot::Sra => "SRA",
            Rot::Sll => "SLL",
            Rot::Srl => "SRL",
        }
    }
}

// Shared IR fragments.

fn read_mem8(addr: Expr) -> Expr {
    Expr::call1("readMem", addr)
}

fn read_mem16(addr: Expr) -> Expr {
    Expr::call1("readMemWord", addr)
}

fn write_mem(addr: Expr, value: Expr) -> Stmt {
    Stmt::expr(Expr::call("writeMem", vec![addr, value]))
}

fn get_pair(pair: Pair) -> Expr {
    Expr::call0(format!("get{}", pair.name()))
}

fn set_pair(pair: Pair, value: Expr) -> Stmt {
    Stmt::expr(Expr::call1(format!("set{}", pair.name()), value))
}

fn get_index(x: IndexReg) -> Expr {
    Expr::call0(format!("get{}", x.name()))
}

fn set_index(x: IndexReg, value: Expr) -> Stmt {
    Stmt::expr(Expr::call1(format!("set{}", x.name()), value))
}

fn set_stmt(left: Expr, right: Expr) -> Stmt {
    Stmt::expr(Expr::assign(AssignOp::Set, left, right))
}

fn compound(op: AssignOp, left: Expr, right: Expr) -> Stmt {
    Stmt::expr(Expr::assign(op, left, right))
}

fn sp() -> Expr {
    Expr::ident("sp")
}

fn pc() -> Expr {
    Expr::ident("pc")
}

fn szp_lookup(value: Expr) -> Expr {
    Expr::index(Expr::ident("SZP_TABLE"), value)
}

fn sign8(value: i32) -> i32 {
    ((value & 0xFF) ^ 0x80) - 0x80
}

/// `getIXY() + d` with the displacement folded to a signed literal.
fn index_addr(x: IndexReg, raw_disp: i32) -> Expr {
    Expr::bin(BinOp::Add, get_index(x), Expr::lit(sign8(raw_disp)))
}

/// `(f & mask) op 0`
pub fn flag_test(op: BinOp, mask: u8) -> Expr {
    Expr::bin(
        op,
        Expr::bin(BinOp::And, Reg8::F.expr(), Expr::lit(i32::from(mask))),
        Expr::lit(0),
    )
}

fn sp_add(amount: i32) -> Stmt {
    compound(AssignOp::Add, sp(), Expr::lit(amount))
}

fn take_branch(target: i32, penalty: i32) -> Vec<Stmt> {
    vec![
        set_stmt(pc(), Expr::lit(target)),
        compound(AssignOp::Sub, Expr::ident("tstates"), Expr::lit(penalty)),
    ]
}

// Loads and exchanges.

pub fn noop() -> Emitter {
    emit(|_| Vec::new())
}

pub fn ld8_imm(dst: Reg8) -> Emitter {
    emit(move |site| vec![set_stmt(dst.expr(), Expr::lit(site.value))])
}

pub fn ld8_reg(dst: Reg8, src: Reg8) -> Emitter {
    emit(move |_| vec![set_stmt(dst.expr(), src.expr())])
}

pub fn ld8_mem_abs(dst: Reg8) -> Emitter {
    emit(move |site| vec![set_stmt(dst.expr(), read_mem8(Expr::lit(site.value)))])
}

pub fn ld8_mem_pair(dst: Reg8, pair: Pair) -> Emitter {
    emit(move |_| vec![set_stmt(dst.expr(), read_mem8(get_pair(pair)))])
}

pub fn ld16_imm(pair: Pair) -> Emitter {
    emit(move |site| vec![set_pair(pair, Expr::lit(site.value))])
}

pub fn ld16_mem(pair: Pair) -> Emitter {
    emit(move |site| vec![set_pair(pair, read_mem16(Expr::lit(site.value)))])
}

pub fn ld_write_mem_imm(pair: Pair) -> Emitter {
    emit(move |site| vec![write_mem(get_pair(pair), Expr::lit(site.value))])
}

pub fn ld_write_mem_reg(pair: Pair, src: Reg8) -> Emitter {
    emit(move |_| vec![write_mem(get_pair(pair), src.expr())])
}

pub fn ld_write_abs_reg(src: Reg8) -> Emitter {
    emit(move |site| vec![write_mem(Expr::lit(site.value), src.expr())])
}

/// `LD (nn),rr`: low byte at nn, high byte at nn+1.
pub fn ld_write_abs_pair(pair: Pair) -> Emitter {
    emit(move |site| {
        vec![
            write_mem(Expr::lit(site.value), pair.lo().expr()),
            write_mem(Expr::lit((site.value + 1) & 0xFFFF), pair.hi().expr()),
        ]
    })
}

pub fn ld_sp() -> Emitter {
    emit(|site| vec![set_stmt(sp(), Expr::lit(site.value))])
}

pub fn ld_sp_pair(pair: Pair) -> Emitter {
    emit(move |_| vec![set_stmt(sp(), get_pair(pair))])
}

pub fn ld_sp_mem() -> Emitter {
    emit(|site| vec![set_stmt(sp(), read_mem16(Expr::lit(site.value)))])
}

pub fn ld_write_abs_sp() -> Emitter {
    emit(|site| {
        vec![
            write_mem(
                Expr::lit(site.value),
                Expr::bin(BinOp::And, sp(), Expr::lit(0xFF)),
            ),
            write_mem(
                Expr::lit((site.value + 1) & 0xFFFF),
                Expr::bin(BinOp::Shr, sp(), Expr::lit(8)),
            ),
        ]
    })
}

pub fn ex_af() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("exAF"))])
}

pub fn exx() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("exx"))])
}

pub fn ex_de_hl() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("exDEHL"))])
}

pub fn ex_sp_hl() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("exSPHL"))])
}

// Increments, decrements, 16-bit arithmetic.

pub fn inc8(r: Reg8) -> Emitter {
    emit(move |_| vec![set_stmt(r.expr(), Expr::call1("inc8", r.expr()))])
}

pub fn dec8(r: Reg8) -> Emitter {
    emit(move |_| vec![set_stmt(r.expr(), Expr::call1("dec8", r.expr()))])
}

pub fn inc8_ind(pair: Pair) -> Emitter {
    emit(move |_| {
        vec![write_mem(
            get_pair(pair),
            Expr::call1("inc8", read_mem8(get_pair(pair))),
        )]
    })
}

pub fn dec8_ind(pair: Pair) -> Emitter {
    emit(move |_| {
        vec![write_mem(
            get_pair(pair),
            Expr::call1("dec8", read_mem8(get_pair(pair))),
        )]
    })
}

pub fn inc16(pair: Pair) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call0(format!("inc{}", pair.name())))])
}

pub fn dec16(pair: Pair) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call0(format!("dec{}", pair.name())))])
}

pub fn inc_sp() -> Emitter {
    emit(|_| {
        vec![set_stmt(
            sp(),
            Expr::bin(
                BinOp::And,
                Expr::bin(BinOp::Add, sp(), Expr::lit(1)),
                Expr::lit(0xFFFF),
            ),
        )]
    })
}

pub fn dec_sp() -> Emitter {
    emit(|_| {
        vec![set_stmt(
            sp(),
            Expr::bin(
                BinOp::And,
                Expr::bin(BinOp::Sub, sp(), Expr::lit(1)),
                Expr::lit(0xFFFF),
            ),
        )]
    })
}

pub fn add16(dst: Pair, src: Src16) -> Emitter {
    emit(move |_| {
        vec![set_pair(
            dst,
            Expr::call("add16", vec![get_pair(dst), src.expr()]),
        )]
    })
}

pub fn adc16_hl(src: Src16) -> Emitter {
    emit(move |_| {
        vec![set_pair(
            Pair::HL,
            Expr::call("adc16", vec![get_pair(Pair::HL), src.expr()]),
        )]
    })
}

pub fn sbc16_hl(src: Src16) -> Emitter {
    emit(move |_| {
        vec![set_pair(
            Pair::HL,
            Expr::call("sbc16", vec![get_pair(Pair::HL), src.expr()]),
        )]
    })
}

// Accumulator arithmetic and logic.

pub fn acc_reg(op: Acc, r: Reg8) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call1(op.helper(), r.expr()))])
}

pub fn acc_imm(op: Acc) -> Emitter {
    emit(move |site| vec![Stmt::expr(Expr::call1(op.helper(), Expr::lit(site.value)))])
}

pub fn acc_ind(op: Acc, pair: Pair) -> Emitter {
    emit(move |_| {
        vec![Stmt::expr(Expr::call1(
            op.helper(),
            read_mem8(get_pair(pair)),
        ))]
    })
}

pub fn logic_reg(op: Logic, r: Reg8) -> Emitter {
    if r == Reg8::A {
        // Self-application collapses: AND/OR keep A, XOR clears it. The
        // XOR A flag byte is folded to the table literal.
        return match op {
            Logic::Xor => emit(|_| {
                vec![
                    set_stmt(Reg8::A.expr(), Expr::lit(0)),
                    set_stmt(Reg8::F.expr(), Expr::lit(i32::from(SZP_TABLE[0]))),
                ]
            }),
            _ => emit(move |_| vec![op.flag_update()]),
        };
    }
    emit(move |_| {
        vec![
            compound(op.assign_op(), Reg8::A.expr(), r.expr()),
            op.flag_update(),
        ]
    })
}

pub fn logic_imm(op: Logic) -> Emitter {
    emit(move |site| {
        vec![
            compound(op.assign_op(), Reg8::A.expr(), Expr::lit(site.value)),
            op.flag_update(),
        ]
    })
}

pub fn logic_ind(op: Logic, pair: Pair) -> Emitter {
    emit(move |_| {
        vec![
            compound(op.assign_op(), Reg8::A.expr(), read_mem8(get_pair(pair))),
            op.flag_update(),
        ]
    })
}

// Accumulator one-shots.

pub fn rlca() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("rlca_a"))])
}

pub fn rrca() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("rrca_a"))])
}

pub fn rla() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("rla_a"))])
}

pub fn rra() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("rra_a"))])
}

pub fn daa() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("daa"))])
}

pub fn cpl() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("cpl_a"))])
}

pub fn neg() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("neg_a"))])
}

pub fn scf() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("scf"))])
}

pub fn ccf() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("ccf"))])
}

pub fn di() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("di"))])
}

pub fn ei() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("ei"))])
}

pub fn im(mode: u8) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call1("im", Expr::lit(i32::from(mode))))])
}

pub fn halt() -> Emitter {
    emit(|_| vec![Stmt::expr(Expr::call0("halt")), Stmt::ret()])
}

// Branches, calls, stack.

/// Relative jump; the branch-taken path costs 5 extra T-states.
pub fn jr(test: Expr) -> Emitter {
    emit(move |site| vec![Stmt::if_then(test.clone(), take_branch(site.target, 5))])
}

pub fn djnz() -> Emitter {
    emit(|site| {
        vec![
            set_stmt(
                Reg8::B.expr(),
                Expr::bin(
                    BinOp::And,
                    Expr::bin(BinOp::Sub, Reg8::B.expr(), Expr::lit(1)),
                    Expr::lit(0xFF),
                ),
            ),
            Stmt::if_then(
                Expr::bin(BinOp::Ne, Reg8::B.expr(), Expr::lit(0)),
                take_branch(site.target, 5),
            ),
        ]
    })
}

pub fn ret() -> Emitter {
    emit(|_| {
        vec![
            set_stmt(pc(), read_mem16(sp())),
            sp_add(2),
            Stmt::ret(),
        ]
    })
}

/// Conditional return folds to a single host call.
pub fn ret_cond(op: BinOp, mask: u8) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call1("ret", flag_test(op, mask)))])
}

pub fn jp() -> Emitter {
    emit(|site| vec![set_stmt(pc(), Expr::lit(site.target)), Stmt::ret()])
}

pub fn jp_cond(op: BinOp, mask: u8) -> Emitter {
    emit(move |site| {
        vec![Stmt::if_then(
            flag_test(op, mask),
            vec![set_stmt(pc(), Expr::lit(site.target)), Stmt::ret()],
        )]
    })
}

pub fn jp_pair(pair: Pair) -> Emitter {
    emit(move |_| vec![set_stmt(pc(), get_pair(pair)), Stmt::ret()])
}

pub fn call() -> Emitter {
    emit(|site| {
        vec![
            Stmt::expr(Expr::call1("push1", Expr::lit(site.pc + 2))),
            set_stmt(pc(), Expr::lit(site.target)),
            Stmt::ret(),
        ]
    })
}

/// Conditional call pays the 7 T-state push penalty on the taken path.
pub fn call_cond(op: BinOp, mask: u8) -> Emitter {
    emit(move |site| {
        vec![Stmt::if_then(
            flag_test(op, mask),
            vec![
                Stmt::expr(Expr::call1("push1", Expr::lit(site.pc + 2))),
                set_stmt(pc(), Expr::lit(site.target)),
                compound(AssignOp::Sub, Expr::ident("tstates"), Expr::lit(7)),
                Stmt::ret(),
            ],
        )]
    })
}

pub fn rst(addr: u16) -> Emitter {
    emit(move |site| {
        vec![
            Stmt::expr(Expr::call1("push1", Expr::lit(site.pc))),
            set_stmt(pc(), Expr::lit(i32::from(addr))),
            Stmt::ret(),
        ]
    })
}

pub fn pop(pair: Pair) -> Emitter {
    emit(move |_| vec![set_pair(pair, read_mem16(sp())), sp_add(2)])
}

pub fn push(pair: Pair) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call1("push1", get_pair(pair)))])
}

// Port I/O.

pub fn out_imm() -> Emitter {
    emit(|site| {
        vec![Stmt::expr(Expr::call(
            "writePort",
            vec![Expr::lit(site.value), Reg8::A.expr()],
        ))]
    })
}

pub fn in_imm() -> Emitter {
    emit(|site| {
        vec![set_stmt(
            Reg8::A.expr(),
            Expr::call1("readPort", Expr::lit(site.value)),
        )]
    })
}

pub fn out_c(src: Reg8) -> Emitter {
    emit(move |_| {
        vec![Stmt::expr(Expr::call(
            "writePort",
            vec![Reg8::C.expr(), src.expr()],
        ))]
    })
}

pub fn in_c(dst: Reg8) -> Emitter {
    emit(move |_| {
        vec![set_stmt(
            dst.expr(),
            Expr::call1("readPort", Reg8::C.expr()),
        )]
    })
}

// CB group: rotates, shifts, bit tests.

pub fn rot_reg(op: Rot, r: Reg8) -> Emitter {
    emit(move |_| vec![set_stmt(r.expr(), Expr::call1(op.helper(), r.expr()))])
}

pub fn rot_ind(op: Rot) -> Emitter {
    emit(move |_| {
        vec![write_mem(
            get_pair(Pair::HL),
            Expr::call1(op.helper(), read_mem8(get_pair(Pair::HL))),
        )]
    })
}

pub fn bit_reg(bit: u8, r: Reg8) -> Emitter {
    emit(move |_| {
        vec![Stmt::expr(Expr::call(
            "bit8",
            vec![Expr::lit(1 << bit), r.expr()],
        ))]
    })
}

pub fn bit_ind(bit: u8) -> Emitter {
    emit(move |_| {
        vec![Stmt::expr(Expr::call(
            "bit8",
            vec![Expr::lit(1 << bit), read_mem8(get_pair(Pair::HL))],
        ))]
    })
}

pub fn res_reg(bit: u8, r: Reg8) -> Emitter {
    emit(move |_| {
        vec![compound(
            AssignOp::And,
            r.expr(),
            Expr::lit(0xFF ^ (1 << bit)),
        )]
    })
}

pub fn res_ind(bit: u8) -> Emitter {
    emit(move |_| {
        vec![write_mem(
            get_pair(Pair::HL),
            Expr::bin(
                BinOp::And,
                read_mem8(get_pair(Pair::HL)),
                Expr::lit(0xFF ^ (1 << bit)),
            ),
        )]
    })
}

pub fn set_reg(bit: u8, r: Reg8) -> Emitter {
    emit(move |_| vec![compound(AssignOp::Or, r.expr(), Expr::lit(1 << bit))])
}

pub fn set_ind(bit: u8) -> Emitter {
    emit(move |_| {
        vec![write_mem(
            get_pair(Pair::HL),
            Expr::bin(
                BinOp::Or,
                read_mem8(get_pair(Pair::HL)),
                Expr::lit(1 << bit),
            ),
        )]
    })
}

// Indexed (IX/IY) variants. Displacements arrive as the raw unsigned byte
// in `site.value` and are folded to signed literals here.

pub fn ld16_imm_x(x: IndexReg) -> Emitter {
    emit(move |site| vec![set_index(x, Expr::lit(site.value))])
}

pub fn ld16_mem_x(x: IndexReg) -> Emitter {
    emit(move |site| vec![set_index(x, read_mem16(Expr::lit(site.value)))])
}

pub fn ld_write_abs_x(x: IndexReg) -> Emitter {
    emit(move |site| {
        vec![
            write_mem(
                Expr::lit(site.value),
                Expr::bin(BinOp::And, get_index(x), Expr::lit(0xFF)),
            ),
            write_mem(
                Expr::lit((site.value + 1) & 0xFFFF),
                Expr::bin(BinOp::Shr, get_index(x), Expr::lit(8)),
            ),
        ]
    })
}

pub fn inc16_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call0(format!("inc{}", x.name())))])
}

pub fn dec16_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call0(format!("dec{}", x.name())))])
}

pub fn add16_x(x: IndexReg, src: Src16) -> Emitter {
    emit(move |_| {
        vec![set_index(
            x,
            Expr::call("add16", vec![get_index(x), src.expr()]),
        )]
    })
}

pub fn ld8_d(dst: Reg8, x: IndexReg) -> Emitter {
    emit(move |site| vec![set_stmt(dst.expr(), read_mem8(index_addr(x, site.value)))])
}

pub fn ld_x(x: IndexReg, src: Reg8) -> Emitter {
    emit(move |site| vec![write_mem(index_addr(x, site.value), src.expr())])
}

/// `LD (IXY+d),n`: displacement in the low operand byte, immediate in the high.
pub fn ld_x_imm(x: IndexReg) -> Emitter {
    emit(move |site| {
        vec![write_mem(
            index_addr(x, site.value & 0xFF),
            Expr::lit((site.value >> 8) & 0xFF),
        )]
    })
}

pub fn inc_x(x: IndexReg) -> Emitter {
    emit(move |site| {
        let addr = index_addr(x, site.value);
        vec![write_mem(
            addr.clone(),
            Expr::call1("inc8", read_mem8(addr)),
        )]
    })
}

pub fn dec_x(x: IndexReg) -> Emitter {
    emit(move |site| {
        let addr = index_addr(x, site.value);
        vec![write_mem(
            addr.clone(),
            Expr::call1("dec8", read_mem8(addr)),
        )]
    })
}

pub fn acc_x(op: Acc, x: IndexReg) -> Emitter {
    emit(move |site| {
        vec![Stmt::expr(Expr::call1(
            op.helper(),
            read_mem8(index_addr(x, site.value)),
        ))]
    })
}

pub fn logic_x(op: Logic, x: IndexReg) -> Emitter {
    emit(move |site| {
        vec![
            compound(
                op.assign_op(),
                Reg8::A.expr(),
                read_mem8(index_addr(x, site.value)),
            ),
            op.flag_update(),
        ]
    })
}

pub fn pop_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![set_index(x, read_mem16(sp())), sp_add(2)])
}

pub fn push_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call1("push1", get_index(x)))])
}

pub fn ex_sp_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![Stmt::expr(Expr::call0(format!("exSP{}", x.name())))])
}

pub fn jp_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![set_stmt(pc(), get_index(x)), Stmt::ret()])
}

pub fn ld_sp_x(x: IndexReg) -> Emitter {
    emit(move |_| vec![set_stmt(sp(), get_index(x))])
}

pub fn rot_x(op: Rot, x: IndexReg) -> Emitter {
    emit(move |site| {
        let addr = index_addr(x, site.value);
        vec![write_mem(
            addr.clone(),
            Expr::call1(op.helper(), read_mem8(addr)),
        )]
    })
}

pub fn bit_x(bit: u8, x: IndexReg) -> Emitter {
    emit(move |site| {
        vec![Stmt::expr(Expr::call(
            "bit8",
            vec![
                Expr::lit(1 << bit),
                read_mem8(index_addr(x, site.value)),
            ],
        ))]
    })
}

pub fn res_x(bit: u8, x: IndexReg) -> Emitter {
    emit(move |site| {
        let addr = index_addr(x, site.value);
        vec![write_mem(
            addr.clone(),
            Expr::bin(BinOp::And, read_mem8(addr), Expr::lit(0xFF ^ (1 << bit))),
        )]
    })
}

pub fn set_x(bit: u8, x: IndexReg) -> Emitter {
    emit(move |site| {
        let addr = index_addr(x, site.value);
        vec![write_mem(
            addr.clone(),
            Expr::bin(BinOp::Or, read_mem8(addr), Expr::lit(1 << bit)),
        )]
    })
}

// Condition helpers used by the table builders.

pub fn cond_nz() -> Expr {
    flag_test(BinOp::Eq, F_ZERO)
}

pub fn cond_z() -> Expr {
    flag_test(BinOp::Ne, F_ZERO)
}

pub fn cond_nc() -> Expr {
    flag_test(BinOp::Eq, F_CARRY)
}

pub fn cond_c() -> Expr {
    flag_test(BinOp::Ne, F_CARRY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(value: i32, target: i32, pc: i32) -> Site {
        Site { value, target, pc }
    }

    #[test]
    fn xor_a_collapses_to_two_literal_assignments() {
        let ir = logic_reg(Logic::Xor, Reg8::A)(site(0, 0, 0));
        assert_eq!(ir.len(), 2);
        assert_eq!(
            ir[0],
            Stmt::expr(Expr::assign(AssignOp::Set, Expr::reg("a"), Expr::lit(0)))
        );
        // The flag byte is the folded table constant, not a member access.
        assert_eq!(
            ir[1],
            Stmt::expr(Expr::assign(
                AssignOp::Set,
                Expr::reg("f"),
                Expr::lit(i32::from(crate::SZP_TABLE[0])),
            ))
        );
    }

    #[test]
    fn and_a_is_flag_only() {
        let ir = logic_reg(Logic::And, Reg8::A)(site(0, 0, 0));
        assert_eq!(ir.len(), 1);
        match &ir[0] {
            Stmt::Expr {
                expr: Expr::Assign { left, right, .. },
            } => {
                assert_eq!(**left, Expr::reg("f"));
                assert!(matches!(**right, Expr::Binary { op: BinOp::Or, .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn or_register_updates_accumulator_then_flags() {
        let ir = logic_reg(Logic::Or, Reg8::B)(site(0, 0, 0));
        assert_eq!(ir.len(), 2);
        assert_eq!(
            ir[0],
            Stmt::expr(Expr::assign(AssignOp::Or, Expr::reg("a"), Expr::reg("b")))
        );
    }

    #[test]
    fn jr_emits_taken_branch_with_cycle_penalty() {
        let ir = jr(Expr::lit(1))(site(0xFE, 0x100, 0x101));
        assert_eq!(ir.len(), 1);
        match &ir[0] {
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                assert_eq!(*test, Expr::lit(1));
                assert!(otherwise.is_empty());
                assert_eq!(
                    then[0],
                    Stmt::expr(Expr::assign(
                        AssignOp::Set,
                        Expr::ident("pc"),
                        Expr::lit(0x100)
                    ))
                );
                assert_eq!(
                    then[1],
                    Stmt::expr(Expr::assign(
                        AssignOp::Sub,
                        Expr::ident("tstates"),
                        Expr::lit(5)
                    ))
                );
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn call_pushes_fall_through_past_immediate() {
        let ir = call()(site(0x2000, 0x2000, 0x0001));
        assert_eq!(
            ir[0],
            Stmt::expr(Expr::call1("push1", Expr::lit(0x0003)))
        );
        assert_eq!(ir.last(), Some(&Stmt::ret()));
    }

    #[test]
    fn rst_pushes_own_fall_through() {
        let ir = rst(0x38)(site(0, 0, 0x0101));
        assert_eq!(
            ir[0],
            Stmt::expr(Expr::call1("push1", Expr::lit(0x0101)))
        );
        assert_eq!(
            ir[1],
            Stmt::expr(Expr::assign(
                AssignOp::Set,
                Expr::ident("pc"),
                Expr::lit(0x38)
            ))
        );
    }

    #[test]
    fn indexed_displacement_is_sign_extended() {
        let ir = ld8_d(Reg8::B, IndexReg::IX)(site(0xFE, 0, 0));
        match &ir[0] {
            Stmt::Expr {
                expr: Expr::Assign { right, .. },
            } => match &**right {
                Expr::Call { args, .. } => match &args[0] {
                    Expr::Binary { right, .. } => assert_eq!(**right, Expr::lit(-2)),
                    other => panic!("unexpected address: {other:?}"),
                },
                other => panic!("unexpected source: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn ld_x_imm_unpacks_displacement_and_immediate() {
        // d = 0x01, n = 0xAB packed little-endian.
        let ir = ld_x_imm(IndexReg::IY)(site(0xAB01, 0, 0));
        match &ir[0] {
            Stmt::Expr {
                expr: Expr::Call { callee, args },
            } => {
                assert_eq!(callee, "writeMem");
                assert_eq!(args[1], Expr::lit(0xAB));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn emitters_are_pure() {
        let em = djnz();
        let s = site(0x10, 0x95, 0x81);
        assert_eq!(em(s), em(s));
        let other = djnz();
        assert_eq!(em(s), other(s));
    }
}
