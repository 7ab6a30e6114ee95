//! The 256-entry opcode table: addressing mode, instruction class, and
//! operation tag for every opcode byte. Slots not populated with a
//! documented 6502 instruction default to `Op::Illegal`.

use super::state::{AddrMode, InstClass};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Lda,
    Ldx,
    Ldy,
    And,
    Ora,
    Eor,
    Adc,
    Sbc,
    Cmp,
    Cpx,
    Cpy,
    Bit,
    NopRead,

    Sta,
    Stx,
    Sty,

    Asl,
    Lsr,
    Rol,
    Ror,
    Inc,
    Dec,

    Inx,
    Iny,
    Dex,
    Dey,
    Tax,
    Tay,
    Txa,
    Tya,
    Tsx,
    Txs,
    Clc,
    Sec,
    Cli,
    Sei,
    Cld,
    Sed,
    Clv,
    NopImplied,

    Bcc,
    Bcs,
    Beq,
    Bne,
    Bmi,
    Bpl,
    Bvs,
    Bvc,

    Pha,
    Php,
    Pla,
    Plp,

    JmpAbs,
    JmpInd,
    Jsr,
    Rts,
    Rti,
    Brk,

    Illegal,
}

#[derive(Copy, Clone, Debug)]
pub struct OpEntry {
    pub mode: AddrMode,
    pub class: InstClass,
    pub op: Op,
}

impl OpEntry {
    const fn new(mode: AddrMode, class: InstClass, op: Op) -> Self {
        Self { mode, class, op }
    }

    const fn illegal() -> Self {
        Self::new(AddrMode::Implied, InstClass::Read, Op::Illegal)
    }
}

macro_rules! entry {
    ($t:ident, $opcode:expr, $mode:ident, $class:ident, $op:ident) => {
        $t[$opcode] = OpEntry::new(AddrMode::$mode, InstClass::$class, Op::$op);
    };
}

pub static OPCODES: [OpEntry; 256] = {
    let mut t = [OpEntry::illegal(); 256];

    // --- ORA / ASL / PHP / BPL / CLC block ---
    entry!(t, 0x00, Implied, Control, Brk);
    entry!(t, 0x01, IndirectX, Read, Ora);
    entry!(t, 0x05, ZeroPage, Read, Ora);
    entry!(t, 0x06, ZeroPage, ReadModifyWrite, Asl);
    entry!(t, 0x08, Implied, Stack, Php);
    entry!(t, 0x09, Immediate, Read, Ora);
    entry!(t, 0x0A, Accumulator, ReadModifyWrite, Asl);
    entry!(t, 0x0D, Absolute, Read, Ora);
    entry!(t, 0x0E, Absolute, ReadModifyWrite, Asl);

    entry!(t, 0x10, Relative, Branch, Bpl);
    entry!(t, 0x11, IndirectY, Read, Ora);
    entry!(t, 0x15, ZeroPageX, Read, Ora);
    entry!(t, 0x16, ZeroPageX, ReadModifyWrite, Asl);
    entry!(t, 0x18, Implied, Read, Clc);
    entry!(t, 0x19, AbsoluteY, Read, Ora);
    entry!(t, 0x1D, AbsoluteX, Read, Ora);
    entry!(t, 0x1E, AbsoluteX, ReadModifyWrite, Asl);

    // --- AND / ROL / BIT / JSR / PLP / BMI / SEC ---
    entry!(t, 0x20, Absolute, Control, Jsr);
    entry!(t, 0x21, IndirectX, Read, And);
    entry!(t, 0x24, ZeroPage, Read, Bit);
    entry!(t, 0x25, ZeroPage, Read, And);
    entry!(t, 0x26, ZeroPage, ReadModifyWrite, Rol);
    entry!(t, 0x28, Implied, Stack, Plp);
    entry!(t, 0x29, Immediate, Read, And);
    entry!(t, 0x2A, Accumulator, ReadModifyWrite, Rol);
    entry!(t, 0x2C, Absolute, Read, Bit);
    entry!(t, 0x2D, Absolute, Read, And);
    entry!(t, 0x2E, Absolute, ReadModifyWrite, Rol);

    entry!(t, 0x30, Relative, Branch, Bmi);
    entry!(t, 0x31, IndirectY, Read, And);
    entry!(t, 0x35, ZeroPageX, Read, And);
    entry!(t, 0x36, ZeroPageX, ReadModifyWrite, Rol);
    entry!(t, 0x38, Implied, Read, Sec);
    entry!(t, 0x39, AbsoluteY, Read, And);
    entry!(t, 0x3D, AbsoluteX, Read, And);
    entry!(t, 0x3E, AbsoluteX, ReadModifyWrite, Rol);

    // --- EOR / LSR / PHA / JMP / BVC / CLI ---
    entry!(t, 0x40, Implied, Control, Rti);
    entry!(t, 0x41, IndirectX, Read, Eor);
    entry!(t, 0x45, ZeroPage, Read, Eor);
    entry!(t, 0x46, ZeroPage, ReadModifyWrite, Lsr);
    entry!(t, 0x48, Implied, Stack, Pha);
    entry!(t, 0x49, Immediate, Read, Eor);
    entry!(t, 0x4A, Accumulator, ReadModifyWrite, Lsr);
    entry!(t, 0x4C, Absolute, Control, JmpAbs);
    entry!(t, 0x4D, Absolute, Read, Eor);
    entry!(t, 0x4E, Absolute, ReadModifyWrite, Lsr);

    entry!(t, 0x50, Relative, Branch, Bvc);
    entry!(t, 0x51, IndirectY, Read, Eor);
    entry!(t, 0x55, ZeroPageX, Read, Eor);
    entry!(t, 0x56, ZeroPageX, ReadModifyWrite, Lsr);
    entry!(t, 0x58, Implied, Read, Cli);
    entry!(t, 0x59, AbsoluteY, Read, Eor);
    entry!(t, 0x5D, AbsoluteX, Read, Eor);
    entry!(t, 0x5E, AbsoluteX, ReadModifyWrite, Lsr);

    // --- ADC / ROR / PLA / JMP ind / BVS / SEI ---
    entry!(t, 0x60, Implied, Control, Rts);
    entry!(t, 0x61, IndirectX, Read, Adc);
    entry!(t, 0x65, ZeroPage, Read, Adc);
    entry!(t, 0x66, ZeroPage, ReadModifyWrite, Ror);
    entry!(t, 0x68, Implied, Stack, Pla);
    entry!(t, 0x69, Immediate, Read, Adc);
    entry!(t, 0x6A, Accumulator, ReadModifyWrite, Ror);
    entry!(t, 0x6C, Indirect, Control, JmpInd);
    entry!(t, 0x6D, Absolute, Read, Adc);
    entry!(t, 0x6E, Absolute, ReadModifyWrite, Ror);

    entry!(t, 0x70, Relative, Branch, Bvs);
    entry!(t, 0x71, IndirectY, Read, Adc);
    entry!(t, 0x75, ZeroPageX, Read, Adc);
    entry!(t, 0x76, ZeroPageX, ReadModifyWrite, Ror);
    entry!(t, 0x78, Implied, Read, Sei);
    entry!(t, 0x79, AbsoluteY, Read, Adc);
    entry!(t, 0x7D, AbsoluteX, Read, Adc);
    entry!(t, 0x7E, AbsoluteX, ReadModifyWrite, Ror);

    // --- STA/STX/STY / DEY / TXA / BCC / TYA / TXS ---
    entry!(t, 0x81, IndirectX, Write, Sta);
    entry!(t, 0x84, ZeroPage, Write, Sty);
    entry!(t, 0x85, ZeroPage, Write, Sta);
    entry!(t, 0x86, ZeroPage, Write, Stx);
    entry!(t, 0x88, Implied, Read, Dey);
    entry!(t, 0x8A, Implied, Read, Txa);
    entry!(t, 0x8C, Absolute, Write, Sty);
    entry!(t, 0x8D, Absolute, Write, Sta);
    entry!(t, 0x8E, Absolute, Write, Stx);

    entry!(t, 0x90, Relative, Branch, Bcc);
    entry!(t, 0x91, IndirectY, Write, Sta);
    entry!(t, 0x94, ZeroPageX, Write, Sty);
    entry!(t, 0x95, ZeroPageX, Write, Sta);
    entry!(t, 0x96, ZeroPageY, Write, Stx);
    entry!(t, 0x98, Implied, Read, Tya);
    entry!(t, 0x99, AbsoluteY, Write, Sta);
    entry!(t, 0x9A, Implied, Read, Txs);
    entry!(t, 0x9D, AbsoluteX, Write, Sta);

    // --- LDY/LDA/LDX / TAY / TAX / BCS / CLV / TSX ---
    entry!(t, 0xA0, Immediate, Read, Ldy);
    entry!(t, 0xA1, IndirectX, Read, Lda);
    entry!(t, 0xA2, Immediate, Read, Ldx);
    entry!(t, 0xA4, ZeroPage, Read, Ldy);
    entry!(t, 0xA5, ZeroPage, Read, Lda);
    entry!(t, 0xA6, ZeroPage, Read, Ldx);
    entry!(t, 0xA8, Implied, Read, Tay);
    entry!(t, 0xA9, Immediate, Read, Lda);
    entry!(t, 0xAA, Implied, Read, Tax);
    entry!(t, 0xAC, Absolute, Read, Ldy);
    entry!(t, 0xAD, Absolute, Read, Lda);
    entry!(t, 0xAE, Absolute, Read, Ldx);

    entry!(t, 0xB0, Relative, Branch, Bcs);
    entry!(t, 0xB1, IndirectY, Read, Lda);
    entry!(t, 0xB4, ZeroPageX, Read, Ldy);
    entry!(t, 0xB5, ZeroPageX, Read, Lda);
    entry!(t, 0xB6, ZeroPageY, Read, Ldx);
    entry!(t, 0xB8, Implied, Read, Clv);
    entry!(t, 0xB9, AbsoluteY, Read, Lda);
    entry!(t, 0xBA, Implied, Read, Tsx);
    entry!(t, 0xBC, AbsoluteX, Read, Ldy);
    entry!(t, 0xBD, AbsoluteX, Read, Lda);
    entry!(t, 0xBE, AbsoluteY, Read, Ldx);

    // --- CPY/CMP/DEC / INY / DEX / BNE / CLD ---
    entry!(t, 0xC0, Immediate, Read, Cpy);
    entry!(t, 0xC1, IndirectX, Read, Cmp);
    entry!(t, 0xC4, ZeroPage, Read, Cpy);
    entry!(t, 0xC5, ZeroPage, Read, Cmp);
    entry!(t, 0xC6, ZeroPage, ReadModifyWrite, Dec);
    entry!(t, 0xC8, Implied, Read, Iny);
    entry!(t, 0xC9, Immediate, Read, Cmp);
    entry!(t, 0xCA, Implied, Read, Dex);
    entry!(t, 0xCC, Absolute, Read, Cpy);
    entry!(t, 0xCD, Absolute, Read, Cmp);
    entry!(t, 0xCE, Absolute, ReadModifyWrite, Dec);

    entry!(t, 0xD0, Relative, Branch, Bne);
    entry!(t, 0xD1, IndirectY, Read, Cmp);
    entry!(t, 0xD5, ZeroPageX, Read, Cmp);
    entry!(t, 0xD6, ZeroPageX, ReadModifyWrite, Dec);
    entry!(t, 0xD8, Implied, Read, Cld);
    entry!(t, 0xD9, AbsoluteY, Read, Cmp);
    entry!(t, 0xDD, AbsoluteX, Read, Cmp);
    entry!(t, 0xDE, AbsoluteX, ReadModifyWrite, Dec);

    // --- CPX/SBC/INC / INX / NOP / BEQ / SED ---
    entry!(t, 0xE0, Immediate, Read, Cpx);
    entry!(t, 0xE1, IndirectX, Read, Sbc);
    entry!(t, 0xE4, ZeroPage, Read, Cpx);
    entry!(t, 0xE5, ZeroPage, Read, Sbc);
    entry!(t, 0xE6, ZeroPage, ReadModifyWrite, Inc);
    entry!(t, 0xE8, Implied, Read, Inx);
    entry!(t, 0xE9, Immediate, Read, Sbc);
    entry!(t, 0xEA, Implied, Read, NopImplied);
    entry!(t, 0xEC, Absolute, Read, Cpx);
    entry!(t, 0xED, Absolute, Read, Sbc);
    entry!(t, 0xEE, Absolute, ReadModifyWrite, Inc);

    entry!(t, 0xF0, Relative, Branch, Beq);
    entry!(t, 0xF1, IndirectY, Read, Sbc);
    entry!(t, 0xF5, ZeroPageX, Read, Sbc);
    entry!(t, 0xF6, ZeroPageX, ReadModifyWrite, Inc);
    entry!(t, 0xF8, Implied, Read, Sed);
    entry!(t, 0xF9, AbsoluteY, Read, Sbc);
    entry!(t, 0xFD, AbsoluteX, Read, Sbc);
    entry!(t, 0xFE, AbsoluteX, ReadModifyWrite, Inc);

    t
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_opcode_count_is_151() {
        let count = OPCODES.iter().filter(|e| e.op != Op::Illegal).count();
        assert_eq!(count, 151);
    }

    #[test]
    fn lda_immediate_mode() {
        let e = OPCODES[0xA9];
        assert_eq!(e.op, Op::Lda);
        assert!(matches!(e.mode, AddrMode::Immediate));
    }

    #[test]
    fn jmp_indirect_uses_indirect_mode() {
        let e = OPCODES[0x6C];
        assert_eq!(e.op, Op::JmpInd);
        assert!(matches!(e.mode, AddrMode::Indirect));
    }
}
