//! Fixed memory images: the bootstrap region that sits below the program base,
//! and a tiny boot program that runs when no other program has been loaded.

/// Number of bytes in one hex digit glyph. `Fx29` relies on this stride.
pub const FONT_GLYPH_BYTES: usize = 5;

/// The 16 hex digit glyphs, stored from address 0x000 of the bootstrap region.
#[rustfmt::skip]
pub const FONT_SET: [u8; 16 * FONT_GLYPH_BYTES] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// Copy the bootstrap image into `region`, which covers `[0, base)`.
/// Anything past the font set is zeroed.
pub fn write_bootstrap(region: &mut [u8]) {
    for b in region.iter_mut() {
        *b = 0;
    }
    let len = FONT_SET.len().min(region.len());
    region[..len].copy_from_slice(&FONT_SET[..len]);
}

/// Boot program: clears the screen, draws "C8" near the middle and spins.
#[rustfmt::skip]
pub const BOOT: [u8; 22] = [
    0x00, 0xE0, // 200: CLS
    0x60, 0x18, // 202: LD V0, 0x18
    0x61, 0x0D, // 204: LD V1, 0x0D
    0x62, 0x0C, // 206: LD V2, 0x0C
    0xF2, 0x29, // 208: LD F, V2
    0xD0, 0x15, // 20A: DRW V0, V1, 5
    0x70, 0x08, // 20C: ADD V0, 0x08
    0x62, 0x08, // 20E: LD V2, 0x08
    0xF2, 0x29, // 210: LD F, V2
    0xD0, 0x15, // 212: DRW V0, V1, 5
    0x12, 0x14, // 214: JP 0x214
];
