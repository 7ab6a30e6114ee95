//! Narrow read-only view of PPU address space ($0000-$3FFF: pattern
//! tables, nametables, palette RAM) that the PPU's per-dot fetch pipeline
//! needs but does not own: CHR comes from the cartridge mapper, and
//! nametable mirroring depends on cartridge header/mapper state, both of
//! which live on `Bus` alongside the `Ppu` itself.

pub trait PpuBus {
    fn ppu_read(&self, addr: u16) -> u8;
}
