//! Register file and per-cycle scratch state for the 6502 interpreter.
//!
//! `CpuState` bundles the architectural register file (A, X, Y, SP, PC, P)
//! with the "current-operation record": the scratch fields the per-cycle
//! engine threads through addressing-mode resolution and opcode execution.

use bitflags::bitflags;

bitflags! {
    /// Processor status register (P). `Unused` always reads back 1.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY         = 0x01;
        const ZERO          = 0x02;
        const IRQ_DISABLE    = 0x04;
        const DECIMAL        = 0x08;
        const BREAK          = 0x10;
        const UNUSED         = 0x20;
        const OVERFLOW       = 0x40;
        const NEGATIVE       = 0x80;
    }
}

bitflags! {
    /// Cycle-level handshake tokens between the addressing-mode stage and
    /// the operation stage of a single opcode.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct OpStatusFlags: u16 {
        const MODIFY                 = 0x001;
        const WRITE                  = 0x002;
        const WRITE_UNMODIFIED       = 0x004;
        const WRITE_MODIFIED         = 0x008;
        const IRQ_PENDING            = 0x010;
        const NMI_PENDING            = 0x020;
        const RESET_PENDING          = 0x040;
        const IN_INTERRUPT_PROLOGUE  = 0x080;
        const OAM_DMA_ACTIVE         = 0x100;
        const DONE                   = 0x200;
    }
}

/// Addressing-mode tag, one per §4.2 micro-sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddrMode {
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Accumulator,
    Immediate,
    Implied,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
}

/// Instruction class tag, one per §4.3 token correspondence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstClass {
    Read,
    Write,
    ReadModifyWrite,
    Branch,
    Stack,
    Control,
}

/// Register file plus the interpreter's per-cycle scratch ("current-operation record").
#[derive(Debug, Clone)]
pub struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: StatusFlags,
    pub cycles: u64,

    pub pc_at_fetch: u16,
    pub opcode: u8,
    pub operand_lo: u8,
    pub operand_hi: u8,
    pub value: u8,
    pub target_addr: u16,
    pub addr_mode: AddrMode,
    pub inst_class: InstClass,
    pub cycle_idx: u8,
    pub op_flags: OpStatusFlags,

    /// Latched pointer (zero-page base or absolute base) used mid-sequence
    /// by indexed/indirect addressing modes.
    pub ptr: u8,

    /// True once the interpreter has committed to branch-taken / page-cross
    /// fixup bookkeeping for the current instruction.
    pub branch_taken: bool,
    pub page_crossed: bool,

    pub interrupt_vector: u16,
    pub brk_push_break: bool,
    pub servicing_reset: bool,
    pub servicing_nmi: bool,
    pub from_brk: bool,
    /// Scratch slot for the mutated value of a read-modify-write op, held
    /// between the "unmodified" dummy write cycle and the real write-back.
    pub rmw_result: u8,

    /// Test-harness convention: BRK (and unknown-but-fatal conditions, never
    /// used by this implementation) may halt execution when requested.
    pub halted: bool,
    pub halt_on_brk: bool,

    /// Suppress the "unimplemented illegal opcode" log line (§7).
    pub mute_illegal: bool,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuState {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            status: StatusFlags::UNUSED | StatusFlags::IRQ_DISABLE,
            cycles: 0,
            pc_at_fetch: 0,
            opcode: 0,
            operand_lo: 0,
            operand_hi: 0,
            value: 0,
            target_addr: 0,
            addr_mode: AddrMode::Implied,
            inst_class: InstClass::Read,
            cycle_idx: 0,
            op_flags: OpStatusFlags::DONE,
            ptr: 0,
            branch_taken: false,
            page_crossed: false,
            interrupt_vector: 0,
            brk_push_break: false,
            servicing_reset: false,
            servicing_nmi: false,
            from_brk: false,
            rmw_result: 0,
            halted: false,
            halt_on_brk: false,
            mute_illegal: false,
        }
    }

    #[inline]
    pub fn is_flag_set(&self, flag: StatusFlags) -> bool {
        self.status.contains(flag)
    }

    #[inline]
    pub fn assign_flag(&mut self, flag: StatusFlags, on: bool) {
        self.status.set(flag, on);
    }

    #[inline]
    pub fn update_zn(&mut self, v: u8) {
        self.assign_flag(StatusFlags::ZERO, v == 0);
        self.assign_flag(StatusFlags::NEGATIVE, (v & 0x80) != 0);
    }

    /// Status byte as it should be pushed to the stack (BRK/PHP force Break=1;
    /// hardware-initiated IRQ/NMI push Break=0). `Unused` is always 1.
    pub fn compose_status_for_push(&self, set_break: bool) -> u8 {
        let mut bits = self.status;
        bits.set(StatusFlags::BREAK, set_break);
        bits.insert(StatusFlags::UNUSED);
        bits.bits()
    }

    /// Assign status from a pulled byte, forcing Break and Unused to the
    /// in-register convention (PLP/RTI never actually latch Break).
    pub fn assign_status_from_pull(&mut self, byte: u8) {
        let mut bits = StatusFlags::from_bits_truncate(byte);
        bits.remove(StatusFlags::BREAK);
        bits.insert(StatusFlags::UNUSED);
        self.status = bits;
    }

    /// Clear the per-instruction scratch record while preserving latched
    /// interrupt tokens (invariant ii/iii in spec §3).
    pub fn clear_scratch_preserving_interrupts(&mut self) {
        let preserved = self.op_flags
            & (OpStatusFlags::IRQ_PENDING
                | OpStatusFlags::NMI_PENDING
                | OpStatusFlags::RESET_PENDING
                | OpStatusFlags::OAM_DMA_ACTIVE);
        self.operand_lo = 0;
        self.operand_hi = 0;
        self.value = 0;
        self.target_addr = 0;
        self.ptr = 0;
        self.branch_taken = false;
        self.page_crossed = false;
        self.cycle_idx = 0;
        self.op_flags = preserved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_power_up() {
        let s = CpuState::new();
        assert_eq!(s.sp, 0xFD);
        assert!(s.is_flag_set(StatusFlags::IRQ_DISABLE));
        assert!(s.is_flag_set(StatusFlags::UNUSED));
    }

    #[test]
    fn update_zn_behavior() {
        let mut s = CpuState::new();
        s.update_zn(0);
        assert!(s.is_flag_set(StatusFlags::ZERO));
        assert!(!s.is_flag_set(StatusFlags::NEGATIVE));
        s.update_zn(0x80);
        assert!(!s.is_flag_set(StatusFlags::ZERO));
        assert!(s.is_flag_set(StatusFlags::NEGATIVE));
    }

    #[test]
    fn compose_status_break_flag_behavior() {
        let s = CpuState::new();
        let pushed = s.compose_status_for_push(true);
        assert_ne!(pushed & StatusFlags::BREAK.bits(), 0);
        let pushed_irq = s.compose_status_for_push(false);
        assert_eq!(pushed_irq & StatusFlags::BREAK.bits(), 0);
        assert_ne!(pushed_irq & StatusFlags::UNUSED.bits(), 0);
    }

    #[test]
    fn assign_status_from_pull_forces_unused_clears_break() {
        let mut s = CpuState::new();
        s.assign_status_from_pull(0xFF);
        assert!(!s.is_flag_set(StatusFlags::BREAK));
        assert!(s.is_flag_set(StatusFlags::UNUSED));
    }
}
