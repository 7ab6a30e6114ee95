#![doc = r#"
Rustendo library crate.

This crate exposes the emulator core modules for use by binaries and tests.

Modules:
- apu: APU register stub and basic frame IRQ behavior
- bus: Bus facade coordinating CPU/PPU/APU/Controllers and timing
- cartridge: iNES v1 loader and cartridge metadata; constructs a Mapper
- controller: NES controller abstraction
- cpu: per-cycle 6502 CPU core with cycle-accurate timing for documented opcodes
- mapper: Mapper trait and NROM (mapper 0) implementation
- ppu: PPU register interface, OAM handling, per-dot timing and NMI latch
- ppu_bus: narrow read-only view of PPU address space the PPU's fetch
  pipeline borrows from `Bus`

Shared iNES builders live in `crate::test_utils`; besides backing the unit
tests, `golden` reuses them to wrap CLI byte-listing programs in a minimal
NROM image so they can run through the same `Bus`/`Cartridge` path as a
real ROM.
"#]

// Core emulator modules
pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod golden;
pub mod mapper;
pub mod ppu;
pub mod ppu_bus;

// Re-export commonly used types at the crate root for convenience.
pub use bus::Bus;
pub use cartridge::Cartridge;
pub use cpu::Cpu;

// iNES builders, used by tests throughout the crate and by the CLI's
// byte-listing loader (see `golden::load_byte_listing`).
pub mod test_utils;
