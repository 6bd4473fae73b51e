//! Shared scaffolding for the demo programs: a scene runner and a text
//! terminal, plus ITM logging on the target.

#![cfg_attr(not(test), no_std)]

pub mod scene;
pub mod terminal;

#[cfg(target_os = "none")]
pub mod logger;

/// Some colors, in the `0bBB_GG_RR` pixel format.
pub mod color {
    use softvga::Pixel;

    pub const WHITE: Pixel = 0b11_11_11;
    pub const LT_GRAY: Pixel = 0b10_10_10;
    pub const DK_GRAY: Pixel = 0b01_01_01;
    pub const BLACK: Pixel = 0b00_00_00;

    pub const RED: Pixel = 0b00_00_11;
    pub const GREEN: Pixel = 0b00_11_00;
    pub const BLUE: Pixel = 0b11_00_00;
}
