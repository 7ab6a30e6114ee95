//! Per-cycle 6502 interpreter (§4 of the design).
//!
//! `Cpu::step` advances exactly one host cycle. Dispatch is split across
//! five files:
//!
//! - `state.rs` - register file + the "current-operation record" scratch.
//! - `opcodes.rs` - the 256-entry addressing-mode/instruction-class/op table.
//! - `alu.rs` - flag-bearing arithmetic, factored out for unit testing.
//! - `micro.rs` - Read/Write/ReadModifyWrite addressing-mode sequences.
//! - `special.rs` - Branch/Stack/Control sequences and interrupt prologues.

pub mod alu;
pub mod micro;
pub mod opcodes;
pub mod special;
pub mod state;

use crate::bus::Bus;
use opcodes::{Op, OPCODES};
use state::{AddrMode, CpuState, InstClass, OpStatusFlags};

/// Public façade wrapping the register file and per-cycle scratch state.
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    pub state: CpuState,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            state: CpuState::new(),
        }
    }

    pub fn a(&self) -> u8 {
        self.state.a
    }
    pub fn x(&self) -> u8 {
        self.state.x
    }
    pub fn y(&self) -> u8 {
        self.state.y
    }
    pub fn sp(&self) -> u8 {
        self.state.sp
    }
    pub fn pc(&self) -> u16 {
        self.state.pc
    }
    pub fn status(&self) -> u8 {
        self.state.status.bits()
    }
    pub fn cycles(&self) -> u64 {
        self.state.cycles
    }

    pub fn set_mute_illegal(&mut self, mute: bool) {
        self.state.mute_illegal = mute;
    }

    pub fn set_halt_on_brk(&mut self, halt: bool) {
        self.state.halt_on_brk = halt;
    }

    pub fn halted(&self) -> bool {
        self.state.halted
    }

    /// Schedules the reset prologue for the next `step()` call, rather than
    /// jumping PC directly: reset is, per §4.5, one of the three 7-cycle
    /// interrupt prologues sharing the same microcode as IRQ/NMI.
    pub fn reset(&mut self) {
        let mute = self.state.mute_illegal;
        let halt_on_brk = self.state.halt_on_brk;
        self.state = CpuState::new();
        self.state.mute_illegal = mute;
        self.state.halt_on_brk = halt_on_brk;
        self.state.op_flags = OpStatusFlags::DONE | OpStatusFlags::RESET_PENDING;
    }

    fn poll_interrupts(&mut self, bus: &mut Bus) {
        let reset_pending = self.state.op_flags.contains(OpStatusFlags::RESET_PENDING);
        let nmi_pending =
            self.state.op_flags.contains(OpStatusFlags::NMI_PENDING) || bus.nmi_pending;
        let irq_pending = bus.irq_line && !self.state.is_flag_set(state::StatusFlags::IRQ_DISABLE);

        if !(reset_pending || nmi_pending || irq_pending) {
            return;
        }

        self.state.op_flags.insert(OpStatusFlags::IN_INTERRUPT_PROLOGUE);
        self.state.from_brk = false;
        if reset_pending {
            self.state.servicing_reset = true;
            self.state.servicing_nmi = false;
            self.state.interrupt_vector = 0xFFFC;
        } else if nmi_pending {
            self.state.servicing_reset = false;
            self.state.servicing_nmi = true;
            self.state.interrupt_vector = 0xFFFA;
            bus.nmi_pending = false;
        } else {
            self.state.servicing_reset = false;
            self.state.servicing_nmi = false;
            self.state.interrupt_vector = 0xFFFE;
            self.state.brk_push_break = false;
        }
    }

    /// Advances the CPU by exactly one host cycle.
    pub fn step(&mut self, bus: &mut Bus) {
        if bus.dma_is_active() {
            bus.tick(1);
            self.state.cycles += 1;
            return;
        }

        let at_boundary =
            self.state.op_flags.contains(OpStatusFlags::DONE) || self.state.cycles == 0;
        if at_boundary {
            // Clear the previous instruction's scratch state first: it only
            // retains the pending-interrupt bits poll_interrupts reads, so
            // polling after it doesn't clobber the IN_INTERRUPT_PROLOGUE bit
            // poll_interrupts is about to set.
            self.state.clear_scratch_preserving_interrupts();
            self.poll_interrupts(bus);
            if !self.state.op_flags.contains(OpStatusFlags::IN_INTERRUPT_PROLOGUE) {
                self.state.pc_at_fetch = self.state.pc;
                self.state.opcode = bus.read(self.state.pc);
                let entry = OPCODES[self.state.opcode as usize];
                self.state.addr_mode = entry.mode;
                self.state.inst_class = entry.class;
            }
        }

        if self.state.op_flags.contains(OpStatusFlags::IN_INTERRUPT_PROLOGUE) {
            special::step_interrupt_prologue(&mut self.state, bus);
        } else {
            let entry = OPCODES[self.state.opcode as usize];
            if entry.op == Op::Illegal {
                step_illegal(&mut self.state, bus);
            } else {
                match entry.class {
                    InstClass::Branch => special::step_branch(&mut self.state, bus, entry),
                    InstClass::Stack => special::step_stack(&mut self.state, bus, entry),
                    InstClass::Control => special::step_control(&mut self.state, bus, entry),
                    InstClass::Read | InstClass::Write | InstClass::ReadModifyWrite => {
                        match entry.mode {
                            AddrMode::Implied => micro::step_implied(&mut self.state, entry),
                            AddrMode::Accumulator => {
                                micro::step_accumulator(&mut self.state, entry)
                            }
                            AddrMode::Immediate => {
                                micro::step_immediate(&mut self.state, bus, entry)
                            }
                            AddrMode::ZeroPage => {
                                micro::step_zeropage(&mut self.state, bus, entry, None)
                            }
                            AddrMode::ZeroPageX => micro::step_zeropage(
                                &mut self.state,
                                bus,
                                entry,
                                Some(micro::Index::X),
                            ),
                            AddrMode::ZeroPageY => micro::step_zeropage(
                                &mut self.state,
                                bus,
                                entry,
                                Some(micro::Index::Y),
                            ),
                            AddrMode::Absolute => {
                                micro::step_absolute(&mut self.state, bus, entry, None)
                            }
                            AddrMode::AbsoluteX => micro::step_absolute(
                                &mut self.state,
                                bus,
                                entry,
                                Some(micro::Index::X),
                            ),
                            AddrMode::AbsoluteY => micro::step_absolute(
                                &mut self.state,
                                bus,
                                entry,
                                Some(micro::Index::Y),
                            ),
                            AddrMode::IndirectX => {
                                micro::step_indirect_x(&mut self.state, bus, entry)
                            }
                            AddrMode::IndirectY => {
                                micro::step_indirect_y(&mut self.state, bus, entry)
                            }
                            AddrMode::Indirect | AddrMode::Relative => unreachable!(
                                "Indirect/Relative addressing is only used by Control/Branch ops"
                            ),
                        }
                    }
                }
            }
        }

        self.state.cycle_idx += 1;
        self.state.cycles += 1;
    }

    /// Runs `step()` until the current instruction completes (`Done` is
    /// set). Convenience wrapper for tests and the interactive CLI REPL.
    pub fn step_instruction(&mut self, bus: &mut Bus) {
        loop {
            self.step(bus);
            if self.state.op_flags.contains(OpStatusFlags::DONE) {
                return;
            }
        }
    }
}

fn step_illegal(cpu: &mut CpuState, bus: &mut Bus) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            let _ = bus.read(cpu.pc);
            if !cpu.mute_illegal {
                log::warn!(
                    "unimplemented illegal opcode ${:02X} at ${:04X}",
                    cpu.opcode,
                    cpu.pc_at_fetch
                );
            }
            cpu.op_flags.insert(OpStatusFlags::DONE);
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_nrom_with_prg_reset_only;

    fn cpu_with_program(bytes: &[u8]) -> (Cpu, Bus) {
        let ines = build_nrom_with_prg_reset_only(bytes, 1, 1, None);
        let cart = crate::Cartridge::from_ines_bytes(&ines).expect("valid test rom");
        let mut bus = Bus::new();
        bus.attach_cartridge(cart);
        let mut cpu = Cpu::new();
        cpu.reset();
        for _ in 0..7 {
            cpu.step(&mut bus);
        }
        (cpu, bus)
    }

    #[test]
    fn lda_immediate_takes_two_cycles() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xA9, 0x42, 0x00]);
        let start = cpu.cycles();
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.cycles() - start, 2);
        assert_eq!(cpu.a(), 0x42);
    }

    #[test]
    fn cycle_monotonicity() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xA9, 0x01, 0x00]);
        let before = cpu.cycles();
        cpu.step(&mut bus);
        assert_eq!(cpu.cycles(), before + 1);
    }

    #[test]
    fn branch_not_taken_is_two_cycles() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xE0, 0x00, 0xD0, 0x02, 0x00]);
        cpu.step_instruction(&mut bus); // CPX #0 -> Z=1
        let start = cpu.cycles();
        cpu.step_instruction(&mut bus); // BNE, not taken
        assert_eq!(cpu.cycles() - start, 2);
    }

    #[test]
    fn branch_taken_no_cross_is_three_cycles() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xA2, 0x05, 0xCA, 0xD0, 0xFD, 0x00]);
        cpu.step_instruction(&mut bus); // LDX #5
        cpu.step_instruction(&mut bus); // DEX
        let start = cpu.cycles();
        cpu.step_instruction(&mut bus); // BNE taken, same page
        assert_eq!(cpu.cycles() - start, 3);
    }

    #[test]
    fn dex_bne_loop_ends_with_x_zero() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xA2, 0x05, 0xCA, 0xD0, 0xFD, 0x00]);
        for _ in 0..20 {
            cpu.step_instruction(&mut bus);
            if cpu.x() == 0 {
                break;
            }
        }
        assert_eq!(cpu.x(), 0);
    }

    #[test]
    fn adc_overflow_scenario() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xA9, 0x50, 0x69, 0x50, 0x00]);
        cpu.step_instruction(&mut bus);
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.a(), 0xA0);
        assert!(!cpu.state.is_flag_set(state::StatusFlags::CARRY));
        assert!(cpu.state.is_flag_set(state::StatusFlags::OVERFLOW));
        assert!(cpu.state.is_flag_set(state::StatusFlags::NEGATIVE));
    }

    #[test]
    fn jsr_pushes_return_address_and_rts_restores_pc() {
        let (mut cpu, mut bus) =
            cpu_with_program(&[0x20, 0x05, 0x80, 0x00, 0x00, 0xA9, 0x42, 0x60]);
        let sp_before = cpu.sp();
        cpu.step_instruction(&mut bus); // JSR $8005
        assert_eq!(cpu.sp(), sp_before.wrapping_sub(2));
        assert_eq!(cpu.pc(), 0x8005);
        cpu.step_instruction(&mut bus); // LDA #$42
        assert_eq!(cpu.a(), 0x42);
        cpu.step_instruction(&mut bus); // RTS
        assert_eq!(cpu.pc(), 0x8003);
        assert_eq!(cpu.sp(), sp_before);
    }

    #[test]
    fn indirect_jmp_page_wrap_bug() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x6C, 0xFF, 0x02]);
        bus.write(0x02FF, 0x00);
        bus.write(0x0200, 0x80);
        bus.write(0x0300, 0x40);
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.pc(), 0x8000);
    }

    #[test]
    fn reset_prologue_fetches_from_reset_vector_not_raw_pc() {
        // Reset vector points well away from PC=0; if poll_interrupts ran
        // before the scratch clear wiped IN_INTERRUPT_PROLOGUE, the first
        // fetch-decode would read whatever sits at PC=0 (0x00 = BRK here)
        // instead of running the reset prologue.
        let ines = build_nrom_with_prg_reset_only(&[0xA9, 0x42, 0x00], 1, 1, Some(0x9000));
        let cart = crate::Cartridge::from_ines_bytes(&ines).expect("valid test rom");
        let mut bus = Bus::new();
        bus.attach_cartridge(cart);
        let mut cpu = Cpu::new();
        cpu.reset();
        for _ in 0..7 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.pc(), 0x9000);
        assert!(!cpu.state.from_brk);
    }

    #[test]
    fn brk_sets_break_and_loads_irq_vector() {
        // build_nrom_with_prg_reset_only defaults NMI/IRQ vectors to $8000
        // too (ROM space, so they can't be poked via bus.write afterward).
        let (mut cpu, mut bus) = cpu_with_program(&[0x00]);
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.pc(), 0x8000);
        assert!(cpu.state.is_flag_set(state::StatusFlags::IRQ_DISABLE));
        assert!(cpu.state.from_brk);
    }

    #[test]
    fn brk_pushes_pc_plus_one_as_return_address() {
        // BRK sits at $8000; the pushed return address must be $8001 (the
        // address of the padding byte following the opcode), not $8002.
        let (mut cpu, mut bus) = cpu_with_program(&[0x00]);
        cpu.step_instruction(&mut bus);
        let sp = cpu.sp() as u16;
        let pushed_lo = bus.read(0x100 | (sp.wrapping_add(2) & 0xFF));
        let pushed_hi = bus.read(0x100 | (sp.wrapping_add(3) & 0xFF));
        let pushed_pc = (pushed_hi as u16) << 8 | pushed_lo as u16;
        assert_eq!(pushed_pc, 0x8001);
    }
}

