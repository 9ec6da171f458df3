//! Z80 decoder and dynamic-recompiler front-end for a Sega Master System /
//! Game Gear emulator.
//!
//! Machine code goes in, structured IR comes out: the opcode tables map each
//! byte (and the `CB`/`DD`/`ED`/`FD` prefix escapes) to a pending emitter
//! built by the combinator library, and the decoder driver walks a ROM
//! region collecting the emitted statements until the block terminates. The
//! host-side code generator and execution engine live elsewhere and consume
//! the IR as-is.

pub mod decode;
pub mod ir;
pub mod ops;
pub mod tables;

use once_cell::sync::Lazy;

pub use decode::{decode_block, Block, DecodeFault, DecodedInstr, Terminator};
pub use ir::{AssignOp, BinOp, Expr, Stmt};
pub use ops::{Emitter, IndexReg, Pair, Reg8, Site};
pub use tables::{
    generate_index_table, BlockEnd, IndexSlot, IndexTable, OpcodeEntry, OpcodeTable, OperandKind,
    OPCODE_TABLE, OPCODE_TABLE_CB, OPCODE_TABLE_DD, OPCODE_TABLE_DDCB, OPCODE_TABLE_ED,
    OPCODE_TABLE_FD, OPCODE_TABLE_FDCB,
};

// F register bit masks, shared with the CPU state the generated code runs
// against.
pub const F_CARRY: u8 = 0x01;
pub const F_NEGATIVE: u8 = 0x02;
pub const F_PARITY: u8 = 0x04;
pub const F_BIT3: u8 = 0x08;
pub const F_HALFCARRY: u8 = 0x10;
pub const F_BIT5: u8 = 0x20;
pub const F_ZERO: u8 = 0x40;
pub const F_SIGN: u8 = 0x80;

/// Sign/zero/parity flag byte for every 8-bit result, with the bit-3/bit-5
/// copies the real F register carries. Emitted IR references this table by
/// name except where a constant result lets the lookup fold away.
pub static SZP_TABLE: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (value, slot) in table.iter_mut().enumerate() {
        let value = value as u8;
        let mut flags = value & (F_BIT3 | F_BIT5);
        if value == 0 {
            flags |= F_ZERO;
        }
        if value & 0x80 != 0 {
            flags |= F_SIGN;
        }
        if value.count_ones() % 2 == 0 {
            flags |= F_PARITY;
        }
        *slot = flags;
    }
    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_masks_are_distinct_bits() {
        let masks = [
            F_CARRY,
            F_NEGATIVE,
            F_PARITY,
            F_BIT3,
            F_HALFCARRY,
            F_BIT5,
            F_ZERO,
            F_SIGN,
        ];
        let mut seen = 0u8;
        for mask in masks {
            assert_eq!(mask.count_ones(), 1);
            assert_eq!(seen & mask, 0);
            seen |= mask;
        }
        assert_eq!(seen, 0xFF);
    }

    #[test]
    fn szp_table_known_values() {
        // Zero result: zero flag plus even parity.
        assert_eq!(SZP_TABLE[0x00], F_ZERO | F_PARITY);
        // 0xFF: negative, even parity, both copy bits.
        assert_eq!(SZP_TABLE[0xFF], F_SIGN | F_PARITY | F_BIT3 | F_BIT5);
        // 0x01: one bit set, odd parity, no flags beyond that.
        assert_eq!(SZP_TABLE[0x01], 0);
        assert_eq!(SZP_TABLE[0x03], F_PARITY);
    }
}
