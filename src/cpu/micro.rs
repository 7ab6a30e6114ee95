//! Addressing-mode micro-sequences for the Read / Write / ReadModifyWrite
//! instruction classes (§4.2, §4.3). Each function advances exactly one
//! `cycle_idx` worth of state; the caller (`Cpu::step`) invokes the right
//! one based on the fetched opcode's `addr_mode`.

use super::alu;
use super::opcodes::{Op, OpEntry};
use super::state::{CpuState, InstClass, OpStatusFlags};
use crate::bus::Bus;

#[derive(Copy, Clone)]
pub enum Index {
    X,
    Y,
}

impl Index {
    fn value(self, cpu: &CpuState) -> u8 {
        match self {
            Index::X => cpu.x,
            Index::Y => cpu.y,
        }
    }
}

fn apply_read(cpu: &mut CpuState, op: Op, value: u8) {
    match op {
        Op::Lda => {
            cpu.a = value;
            cpu.update_zn(value);
        }
        Op::Ldx => {
            cpu.x = value;
            cpu.update_zn(value);
        }
        Op::Ldy => {
            cpu.y = value;
            cpu.update_zn(value);
        }
        Op::And => {
            cpu.a &= value;
            cpu.update_zn(cpu.a);
        }
        Op::Ora => {
            cpu.a |= value;
            cpu.update_zn(cpu.a);
        }
        Op::Eor => {
            cpu.a ^= value;
            cpu.update_zn(cpu.a);
        }
        Op::Adc => alu::adc(cpu, value),
        Op::Sbc => alu::sbc(cpu, value),
        Op::Cmp => alu::cmp(cpu, cpu.a, value),
        Op::Cpx => alu::cmp(cpu, cpu.x, value),
        Op::Cpy => alu::cmp(cpu, cpu.y, value),
        Op::Bit => alu::bit(cpu, value),
        Op::NopRead => {}
        other => unreachable!("{other:?} is not a Read-class op"),
    }
}

fn write_value(cpu: &CpuState, op: Op) -> u8 {
    match op {
        Op::Sta => cpu.a,
        Op::Stx => cpu.x,
        Op::Sty => cpu.y,
        other => unreachable!("{other:?} is not a Write-class op"),
    }
}

fn apply_rmw(cpu: &mut CpuState, op: Op, value: u8) -> u8 {
    match op {
        Op::Asl => alu::asl(cpu, value),
        Op::Lsr => alu::lsr(cpu, value),
        Op::Rol => alu::rol(cpu, value),
        Op::Ror => alu::ror(cpu, value),
        Op::Inc => {
            let r = value.wrapping_add(1);
            cpu.update_zn(r);
            r
        }
        Op::Dec => {
            let r = value.wrapping_sub(1);
            cpu.update_zn(r);
            r
        }
        other => unreachable!("{other:?} is not a ReadModifyWrite-class op"),
    }
}

fn page_crossed(base_low: u8, index: u8) -> bool {
    base_low as u16 + index as u16 > 0xFF
}

pub fn step_implied(cpu: &mut CpuState, entry: OpEntry) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            super::special::apply_implied(cpu, entry.op);
            cpu.op_flags.insert(OpStatusFlags::DONE);
        }
        _ => unreachable!(),
    }
}

pub fn step_accumulator(cpu: &mut CpuState, entry: OpEntry) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            let v = cpu.a;
            cpu.a = apply_rmw(cpu, entry.op, v);
            cpu.op_flags.insert(OpStatusFlags::MODIFY | OpStatusFlags::DONE);
        }
        _ => unreachable!(),
    }
}

pub fn step_immediate(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            let v = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
            cpu.value = v;
            apply_read(cpu, entry.op, v);
            cpu.op_flags.insert(OpStatusFlags::MODIFY | OpStatusFlags::DONE);
        }
        _ => unreachable!(),
    }
}

fn finish_at(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry, addr: u16, ready: u8) {
    let c = cpu.cycle_idx;
    match entry.class {
        InstClass::Read => {
            if c == ready {
                let v = bus.read(addr);
                cpu.value = v;
                apply_read(cpu, entry.op, v);
                cpu.op_flags.insert(OpStatusFlags::MODIFY | OpStatusFlags::DONE);
            }
        }
        InstClass::Write => {
            if c == ready {
                let v = write_value(cpu, entry.op);
                bus.write(addr, v);
                cpu.op_flags.insert(OpStatusFlags::WRITE | OpStatusFlags::DONE);
            }
        }
        InstClass::ReadModifyWrite => {
            if c == ready {
                cpu.value = bus.read(addr);
                cpu.op_flags.insert(OpStatusFlags::WRITE_UNMODIFIED);
            } else if c == ready + 1 {
                bus.write(addr, cpu.value);
                cpu.rmw_result = apply_rmw(cpu, entry.op, cpu.value);
            } else if c == ready + 2 {
                bus.write(addr, cpu.rmw_result);
                cpu.op_flags.insert(OpStatusFlags::WRITE_MODIFIED | OpStatusFlags::DONE);
            }
        }
        other => unreachable!("{other:?} does not use finish_at"),
    }
}

pub fn step_zeropage(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry, index: Option<Index>) {
    let c = cpu.cycle_idx;
    match (index, c) {
        (_, 0) => cpu.pc = cpu.pc.wrapping_add(1),
        (_, 1) => {
            cpu.operand_lo = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
            if index.is_none() {
                cpu.target_addr = cpu.operand_lo as u16;
            }
        }
        (Some(idx), 2) => {
            let _ = bus.read(cpu.operand_lo as u16);
            cpu.target_addr = cpu.operand_lo.wrapping_add(idx.value(cpu)) as u16;
        }
        _ => {
            let ready = if index.is_some() { 3 } else { 2 };
            let addr = cpu.target_addr;
            finish_at(cpu, bus, entry, addr, ready);
        }
    }
}

pub fn step_absolute(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry, index: Option<Index>) {
    let c = cpu.cycle_idx;
    match c {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            cpu.operand_lo = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
        }
        2 => {
            cpu.operand_hi = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
            match index {
                None => {
                    cpu.target_addr = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
                }
                Some(idx) => {
                    let base = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
                    let iv = idx.value(cpu);
                    cpu.page_crossed = page_crossed(cpu.operand_lo, iv);
                    cpu.target_addr = base.wrapping_add(iv as u16);
                }
            }
        }
        3 => match index {
            None => finish_at(cpu, bus, entry, cpu.target_addr, 3),
            Some(idx) => {
                let iv = idx.value(cpu);
                let spec_addr =
                    (cpu.operand_hi as u16) << 8 | cpu.operand_lo.wrapping_add(iv) as u16;
                if entry.class == InstClass::Read {
                    let v = bus.read(spec_addr);
                    if !cpu.page_crossed {
                        cpu.value = v;
                        apply_read(cpu, entry.op, v);
                        cpu.op_flags.insert(OpStatusFlags::MODIFY | OpStatusFlags::DONE);
                    }
                } else {
                    let _ = bus.read(spec_addr);
                }
            }
        },
        _ => {
            let addr = cpu.target_addr;
            finish_at(cpu, bus, entry, addr, 4);
        }
    }
}

pub fn step_indirect_x(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            cpu.ptr = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
        }
        2 => {
            let _ = bus.read(cpu.ptr as u16);
        }
        3 => {
            let addr = cpu.ptr.wrapping_add(cpu.x) as u16;
            cpu.operand_lo = bus.read(addr);
        }
        4 => {
            let addr = cpu.ptr.wrapping_add(cpu.x).wrapping_add(1) as u16;
            cpu.operand_hi = bus.read(addr);
            cpu.target_addr = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
        }
        _ => {
            let addr = cpu.target_addr;
            finish_at(cpu, bus, entry, addr, 5);
        }
    }
}

pub fn step_indirect_y(cpu: &mut CpuState, bus: &mut Bus, entry: OpEntry) {
    match cpu.cycle_idx {
        0 => cpu.pc = cpu.pc.wrapping_add(1),
        1 => {
            cpu.ptr = bus.read(cpu.pc);
            cpu.pc = cpu.pc.wrapping_add(1);
        }
        2 => {
            cpu.operand_lo = bus.read(cpu.ptr as u16);
        }
        3 => {
            let hi_addr = cpu.ptr.wrapping_add(1) as u16;
            cpu.operand_hi = bus.read(hi_addr);
            cpu.page_crossed = page_crossed(cpu.operand_lo, cpu.y);
            let base = (cpu.operand_hi as u16) << 8 | cpu.operand_lo as u16;
            cpu.target_addr = base.wrapping_add(cpu.y as u16);
        }
        4 => {
            let spec_addr =
                (cpu.operand_hi as u16) << 8 | cpu.operand_lo.wrapping_add(cpu.y) as u16;
            if entry.class == InstClass::Read {
                let v = bus.read(spec_addr);
                if !cpu.page_crossed {
                    cpu.value = v;
                    apply_read(cpu, entry.op, v);
                    cpu.op_flags.insert(OpStatusFlags::MODIFY | OpStatusFlags::DONE);
                }
            } else {
                let _ = bus.read(spec_addr);
            }
        }
        _ => {
            let addr = cpu.target_addr;
            finish_at(cpu, bus, entry, addr, 5);
        }
    }
}
