//! Relative (branch), Stack, and Control class micro-sequences, plus the
//! three interrupt prologues (§4.2 Relative, §4.3, §4.5). These classes
//! fall outside the generic Read/Write/ReadModifyWrite engine in
//! `micro.rs` because each has its own irregular cycle count.

use super::opcodes::{Op, OpEntry};
use super::state::{CpuState, OpStatusFlags, StatusFlags};
use crate::bus::Bus;

pub fn apply_implied(cpu: &mut CpuState, op: Op) {
    match op {
        Op::Inx => {
            cpu.x = cpu.x.wrapping_add(1);
            cpu.update_zn(cpu.x);
        }
        Op::Iny => {
            cpu.y = cpu.y.wrapping_add(1);
            cpu.update_zn(cpu.y);
        }
        Op::Dex => {
            cpu.x = cpu.x.wrapping_sub(1);
            cpu.update_zn(cpu.x);
        }
        Op::Dey => {
            cpu.y = cpu.y.wrapping_sub(1);
            cpu.update_zn(cpu.y);
        }
        Op::Tax => {
            cpu.x = cpu.a;
            cpu.update_zn(cpu.x);
        }
        Op::Tay => {
            cpu.y = cpu.a;
            cpu.update_zn(cpu.y);
        }
        Op::Txa => {
            cpu.a = cpu.x;
            cpu.update_zn(cpu.a);
        }
        Op::Tya => {
            cpu.a = cpu.y;
            cpu.update_zn(cpu.a);
        }
        Op::Tsx => {
            cpu.x = cpu.sp;
            cpu.update_zn(cpu.x);
        }
        Op::Txs => cpu.sp = cpu.x,
        Op::Clc => cpu.assign_flag(StatusFlags::CARRY, false),
        Op::Sec => cpu.assign_flag(StatusFlags::CARRY, true),
        Op::Cli => cpu.assign_flag(StatusFlags::IRQ_DISABLE, false),
        Op::Sei => cpu.assign_flag(StatusFlags::IRQ_DISABLE, true),
        Op::Cld => cpu.assign_flag(StatusFlags::DECIMAL, false),
        Op::Sed => cpu.assign_flag(StatusFlags::DECIMAL, true),
        Op::Clv => cpu.assign_flag(StatusFlags::OVERFLOW, false),
        Op::NopImplied => {}
        other => unreachable!("{other:?} is not an Implied-class register/flag op"),
    }
}

fn branch_taken(cpu: &CpuState, op: Op) -> bool {
    match op {
        Op::Bcc => !cpu.is_flag_set(StatusFlags::CARRY),
        Op::Bcs => cpu.is_flag_set(StatusFlags::CARRY),
        Op::Beq => cpu.is_flag_set(StatusFlags::ZERO),
        Op::Bne => !cpu.is_flag_set(StatusFlags::ZERO),
        Op::Bmi => cpu.is_flag_set(StatusFlags::NEGATIVE),
        Op::Bpl => !cpu.is_flag_set(StatusFlags::NEGATIVE),
        Op::Bvs => cpu.is_flag_set(StatusFlags::OVERFLOW),
        Op::Bvc => !cpu.is_flag_set(StatusFlags::OVERFLOW),
        other => unreachable!("{other:?} is not a branch op"),
    }
}

pub fn step_branch(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            cpu.operand_lo = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
            cpu.branch_taken = branch_taken(cpu, entry.op);
            if !cpu.branch_taken {
                cpu.op_flags.insert(OpStatusFlags::DONE);
                return;
            }
            let disp = cpu.operand_lo as i8 as i16;
            let speculative =
                (cpu.pc & 0xFF00) | (cpu.pc.wrapping_add(disp as u16) & 0x00FF);
            let fixed = cpu.pc.wrapping_add_signed(disp);
            cpu.pc = speculative;
            cpu.target_addr = fixed;
            cpu.page_crossed = speculative != fixed;
        }
        2 => {
            let _ = bus.read(cpu.pc);
            if cpu.page_crossed {
                cpu.pc = cpu.target_addr;
            } else {
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
        }
        3 => {
            let _ = bus.read(cpu.pc);
            cpu.op_flags.insert(OpStatusFlags::DONE);
        }
        _ => unreachable!(),
    }
}

fn push(cpu: &mut CpuState, bus: &mut Bus, value: u8) {
    bus.write(0x0100 | cpu.sp as u16, value);
    cpu.sp = cpu.sp.wrapping_sub(1);
}

fn pull(cpu: &mut CpuState, bus: &mut Bus) -> u8 {
    cpu.sp = cpu.sp.wrapping_add(1);
    bus.read(0x0100 | cpu.sp as u16)
}

pub fn step_stack(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry) {
    match entry.op {
        Op::Pha | Op::Php => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                let _ = bus.read(cpu.pc);
            }
            2 => {
                let v = match entry.op {
                    Op::Pha => cpu.a,
                    Op::Php => cpu.compose_status_for_push(true),
                    _ => unreachable!(),
                };
                push(cpu, bus, v);
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        Op::Pla | Op::Plp => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                let _ = bus.read(cpu.pc);
            }
            2 => {
                cpu.value = pull(cpu, bus);
            }
            3 => {
                match entry.op {
                    Op::Pla => {
                        cpu.a = cpu.value;
                        cpu.update_zn(cpu.a);
                    }
                    Op::Plp => cpu.assign_status_from_pull(cpu.value),
                    _ => unreachable!(),
                }
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        other => unreachable!("{other:?} is not a Stack-class op"),
    }
}

pub fn step_control(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry) {
    match entry.op {
        Op::JmpAbs => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                cpu.operand_lo = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
            }
            2 => {
                cpu.operand_hi = bus.read(cpu.pc);
                cpu.pc = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        Op::JmpInd => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                cpu.operand_lo = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
            }
            2 => {
                cpu.operand_hi = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
                cpu.target_addr = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
            }
            3 => {
                cpu.value = bus.read(cpu.target_addr);
            }
            4 => {
                let ptr = cpu.target_addr;
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr);
                cpu.pc = (hi as u16) << 8 | cpu.value as u16;
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        Op::Jsr => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                cpu.operand_lo = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
            }
            2 => {
                let _ = bus.read(0x0100 | cpu.sp as u16);
            }
            3 => {
                let hi = (cpu.pc >> 8) as u8;
                push(cpu, bus, hi);
            }
            4 => {
                let lo = (cpu.pc & 0xFF) as u8;
                push(cpu, bus, lo);
            }
            5 => {
                cpu.operand_hi = bus.read(cpu.pc);
                cpu.pc = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        Op::Rts => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                let _ = bus.read(cpu.pc);
            }
            2 => {
                let _ = bus.read(0x0100 | cpu.sp as u16);
            }
            3 => {
                cpu.operand_lo = pull(cpu, bus);
            }
            4 => {
                cpu.operand_hi = pull(cpu, bus);
            }
            5 => {
                let target = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
                cpu.pc = target.wrapping_add(1);
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        Op::Rti => match cpu.cycle_idx {
            0 => cpu.pc = cpu.pc.wrapping_add(1),
            1 => {
                let _ = bus.read(cpu.pc);
            }
            2 => {
                let _ = bus.read(0x0100 | cpu.sp as u16);
            }
            3 => {
                let p = pull(cpu, bus);
                cpu.assign_status_from_pull(p);
            }
            4 => {
                cpu.operand_lo = pull(cpu, bus);
            }
            5 => {
                cpu.operand_hi = pull(cpu, bus);
                cpu.pc = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
                cpu.op_flags.insert(OpStatusFlags::DONE);
            }
            _ => unreachable!(),
        },
        Op::Brk => {
            if cpu.cycle_idx == 0 {
                cpu.from_brk = true;
                cpu.servicing_reset = false;
                cpu.servicing_nmi = false;
                cpu.interrupt_vector = 0xFFFE;
                cpu.brk_push_break = true;
                cpu.op_flags.insert(OpStatusFlags::IN_INTERRUPT_PROLOGUE);
            }
            step_interrupt_prologue(cpu, bus);
        }
        other => unreachable!("{other:?} is not a Control-class op"),
    }
}

/// Unified 7-cycle sequence for Reset / NMI / IRQ / BRK (§4.5). Callers
/// set `servicing_reset` / `servicing_nmi` / `from_brk` and
/// `interrupt_vector` before cycle 0 runs.
pub fn step_interrupt_prologue(cpu: &mut CpuState, bus: &mut Bus) {
    match cpu.cycle_idx {
        0 => {
            // Cycle 0 only forces opcode=0; the PC++ for BRK belongs solely
            // to cycle 1 (§4.5's cycle table).
        }
        1 => {
            if cpu.from_brk {
                cpu.pc = cpu.pc.wrapping_add(1);
            }
        }
        2 => {
            if cpu.servicing_reset {
                cpu.sp = cpu.sp.wrapping_sub(1);
            } else {
                let hi = (cpu.pc >> 8) as u8;
                push(cpu, bus, hi);
            }
        }
        3 => {
            if cpu.servicing_reset {
                cpu.sp = cpu.sp.wrapping_sub(1);
            } else {
                let lo = (cpu.pc & 0xFF) as u8;
                push(cpu, bus, lo);
            }
        }
        4 => {
            if cpu.servicing_reset {
                cpu.sp = cpu.sp.wrapping_sub(1);
            } else {
                let p = cpu.compose_status_for_push(cpu.brk_push_break);
                push(cpu, bus, p);
            }
        }
        5 => {
            cpu.operand_lo = bus.read(cpu.interrupt_vector);
            cpu.assign_flag(StatusFlags::IRQ_DISABLE, true);
        }
        6 => {
            cpu.operand_hi = bus.read(cpu.interrupt_vector.wrapping_add(1));
            cpu.pc = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
            cpu.op_flags.remove(
                OpStatusFlags::IRQ_PENDING
                    | OpStatusFlags::NMI_PENDING
                    | OpStatusFlags::RESET_PENDING
                    | OpStatusFlags::IN_INTERRUPT_PROLOGUE,
            );
            if cpu.from_brk && cpu.halt_on_brk {
                cpu.halted = true;
            }
            cpu.op_flags.insert(OpStatusFlags::DONE);
        }
        _ => unreachable!(),
    }
}
