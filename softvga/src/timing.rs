//! Definition of display timing and modes.
//!
//! A `Timing` is a plain value: it can be inspected, validated and turned into
//! timer compare values on the host. Only the driver (target builds) actually
//! applies one to hardware.

use core::fmt;

/// Minimum number of CPU/AHB cycles per pixel.
///
/// This is a fundamental hardware limitation. (Though if you can prove
/// otherwise, please write me.)
pub const MIN_CYCLES_PER_PIXEL: usize = 4;

/// A representation of the clock config parameters for the STM32F4 RCC when
/// using the High Speed External option with the PLL.
///
/// Divisors are stored as plain numbers rather than register encodings; see
/// the `*_bits` methods for the latter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ClockConfig {
    pub crystal_hz: u32,
    /// PLLM.
    pub crystal_divisor: u8,
    /// PLLN.
    pub vco_multiplier: u16,
    /// PLLP. Must be 2, 4, 6 or 8.
    pub general_divisor: u8,
    /// PLLQ.
    pub pll48_divisor: u8,

    /// Must be 1, 2, 4, 8, 16, 64, 128, 256 or 512.
    pub ahb_divisor: u16,
    /// Must be 1, 2, 4, 8 or 16.
    pub apb1_divisor: u8,
    /// Must be 1, 2, 4, 8 or 16.
    pub apb2_divisor: u8,

    /// Flash wait states.
    pub flash_latency: u8,
}

impl ClockConfig {
    /// Frequency of the PLL's VCO output.
    pub const fn vco_hz(&self) -> u32 {
        self.crystal_hz / self.crystal_divisor as u32
            * self.vco_multiplier as u32
    }

    /// Resulting CPU (SYSCLK) frequency.
    pub const fn cpu_hz(&self) -> u32 {
        self.vco_hz() / self.general_divisor as u32
    }

    pub const fn ahb_hz(&self) -> u32 {
        self.cpu_hz() / self.ahb_divisor as u32
    }

    pub const fn apb1_hz(&self) -> u32 {
        self.ahb_hz() / self.apb1_divisor as u32
    }

    pub const fn apb2_hz(&self) -> u32 {
        self.ahb_hz() / self.apb2_divisor as u32
    }

    /// Encoding of `ahb_divisor` for RCC_CFGR.HPRE, or `None` if the divisor
    /// can't be produced by the hardware.
    pub const fn hpre_bits(&self) -> Option<u8> {
        match self.ahb_divisor {
            1 => Some(0b0000),
            2 => Some(0b1000),
            4 => Some(0b1001),
            8 => Some(0b1010),
            16 => Some(0b1011),
            64 => Some(0b1100),
            128 => Some(0b1101),
            256 => Some(0b1110),
            512 => Some(0b1111),
            _ => None,
        }
    }

    /// Encoding of `apb1_divisor` for RCC_CFGR.PPRE1.
    pub const fn ppre1_bits(&self) -> Option<u8> {
        ppre_bits(self.apb1_divisor)
    }

    /// Encoding of `apb2_divisor` for RCC_CFGR.PPRE2.
    pub const fn ppre2_bits(&self) -> Option<u8> {
        ppre_bits(self.apb2_divisor)
    }

    /// Encoding of `general_divisor` for RCC_PLLCFGR.PLLP.
    pub const fn pllp_bits(&self) -> Option<u8> {
        match self.general_divisor {
            2 => Some(0b00),
            4 => Some(0b01),
            6 => Some(0b10),
            8 => Some(0b11),
            _ => None,
        }
    }

    /// Checks the electrical limits of the PLL and buses.
    pub const fn validate(&self) -> Result<(), TimingError> {
        if self.crystal_divisor < 2
            || self.crystal_divisor > 63
            || self.crystal_hz == 0
            || self.vco_multiplier < 50
            || self.vco_multiplier > 432
        {
            return Err(TimingError::Clock);
        }
        let pll_in = self.crystal_hz / self.crystal_divisor as u32;
        if pll_in < 1_000_000 || pll_in > 2_000_000 {
            return Err(TimingError::Clock);
        }
        let vco = self.vco_hz();
        if vco < 100_000_000 || vco > 432_000_000 {
            return Err(TimingError::Clock);
        }
        if self.pll48_divisor < 2 || self.pll48_divisor > 15 {
            return Err(TimingError::Clock);
        }
        if self.pllp_bits().is_none()
            || self.hpre_bits().is_none()
            || self.ppre1_bits().is_none()
            || self.ppre2_bits().is_none()
        {
            return Err(TimingError::Clock);
        }
        if self.cpu_hz() > 168_000_000
            || self.apb1_hz() > 42_000_000
            || self.apb2_hz() > 84_000_000
        {
            return Err(TimingError::Clock);
        }
        if self.flash_latency > 7 {
            return Err(TimingError::Clock);
        }
        Ok(())
    }
}

const fn ppre_bits(divisor: u8) -> Option<u8> {
    match divisor {
        1 => Some(0b000),
        2 => Some(0b100),
        4 => Some(0b101),
        8 => Some(0b110),
        16 => Some(0b111),
        _ => None,
    }
}

/// Defines the timing parameters for a video mode.
///
/// The horizontal and vertical timing information are each expressed
/// differently, so that each can be consumed efficiently by the implementation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    /// Configuration for the system clocks and PLL to achieve this timing.
    pub clock_config: ClockConfig,

    /// Number of additional AHB cycles per pixel clock cycle. This is added to
    /// the hardware minimum of 4 cycles per pixel (see
    /// [`MIN_CYCLES_PER_PIXEL`]). Values greater than zero reduce both the
    /// resolution and the compute/bandwidth requirements.
    ///
    /// [`MIN_CYCLES_PER_PIXEL`]: constant.MIN_CYCLES_PER_PIXEL.html
    pub add_cycles_per_pixel: usize,

    /// Total horizontal pixels per line, including blanking.
    pub line_pixels: usize,
    /// Length of horizontal sync pulse, in pixels.
    pub sync_pixels: usize,
    /// Number of pixels between end of sync and start of video (the "back
    /// porch").
    pub back_porch_pixels: usize,
    /// Moves the start-of-video interrupt backwards in time, to compensate for
    /// interrupt latency and code execution time. Measured in units of pixel
    /// clocks.
    pub video_lead: usize,
    /// Maximum visible pixels per line. This controls the timing of the
    /// end-of-active interrupt.
    pub video_pixels: usize,
    /// Polarity of horizontal sync pulse.
    pub hsync_polarity: Polarity,

    /// Scanline number of onset of vertical sync pulse, numbered from the top
    /// of the vertical blanking interval.
    pub vsync_start_line: usize,
    /// Scanline number of end of vertical sync pulse, numbered from the top of
    /// the vertical blanking interval.
    pub vsync_end_line: usize,
    /// Scanline number of start of active video, numbered from the top of the
    /// vertical blanking interval.
    pub video_start_line: usize,
    /// Scanline number of end of active video, numbered from the top of the
    /// vertical blanking interval. This is also the total number of lines per
    /// frame, including the VBI.
    pub video_end_line: usize,
    /// Polarity of the vertical sync pulse.
    pub vsync_polarity: Polarity,
}

/// Polarity of a sync pulse, and, by implication, the idle state of the sync
/// signal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    Positive = 0, // note: value assignments for cheaper timer configuration
    Negative = 1,
}

/// Reasons a `Timing` can be rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimingError {
    /// The clock tree is out of spec for the part.
    Clock,
    /// Horizontal phases overlap or overflow the line.
    Horizontal,
    /// Vertical phase boundaries are not strictly increasing, or are too
    /// close together for the line state machine to tell them apart.
    Vertical,
    /// The pixel clock can't be derived from the APB1 timer clock.
    PixelClock,
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimingError::Clock => f.write_str("clock configuration out of range"),
            TimingError::Horizontal => f.write_str("bad horizontal timing"),
            TimingError::Vertical => f.write_str("bad vertical timing"),
            TimingError::PixelClock => {
                f.write_str("pixel clock not reachable from APB1")
            }
        }
    }
}

/// Values to load into a horizontal timer (TIM3 or TIM4) so that it counts in
/// pixels and fires at the interesting points of each line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HTimerConfig {
    /// Prescaler: APB timer clocks per pixel, minus one.
    pub psc: u16,
    /// Auto-reload: pixels per line, minus one.
    pub arr: u32,
    /// Compare 1: end of horizontal sync.
    pub ccr1: u32,
    /// Compare 2: start of active video, less the video lead.
    pub ccr2: u32,
    /// Compare 3: end of active video.
    pub ccr3: u32,
}

impl Timing {
    /// Compute total AHB cycles per pixel in this timing mode.
    pub const fn cycles_per_pixel(&self) -> usize {
        self.add_cycles_per_pixel + MIN_CYCLES_PER_PIXEL
    }

    /// Number of lines of active video per frame.
    pub const fn active_lines(&self) -> usize {
        self.video_end_line - self.video_start_line
    }

    pub const fn pixel_clock_hz(&self) -> u32 {
        self.clock_config.ahb_hz() / self.cycles_per_pixel() as u32
    }

    /// Number of APB1 timer clocks per pixel. APB timers get their clocks
    /// doubled whenever the APB divisor is above 1.
    const fn apb_cycles_per_pixel(&self) -> Option<usize> {
        let apb1_divisor = self.clock_config.apb1_divisor as usize;
        if apb1_divisor > 1 {
            let doubled = self.cycles_per_pixel() * 2;
            if doubled % apb1_divisor != 0 {
                None
            } else {
                Some(doubled / apb1_divisor)
            }
        } else {
            Some(self.cycles_per_pixel())
        }
    }

    /// Checks that this timing can actually be produced, and that its phases
    /// are ordered the way the line state machine expects.
    pub const fn validate(&self) -> Result<(), TimingError> {
        if let Err(e) = self.clock_config.validate() {
            return Err(e);
        }

        if self.line_pixels == 0
            || self.sync_pixels == 0
            || self.video_pixels == 0
            || self.video_pixels > crate::MAX_PIXELS_PER_LINE
            || self.video_lead >= self.back_porch_pixels
            || self.sync_pixels + self.back_porch_pixels + self.video_pixels
                > self.line_pixels
        {
            return Err(TimingError::Horizontal);
        }

        // The line state machine recognizes one event per line, so each phase
        // boundary needs a line to itself, including the line *before* the
        // start and end of video.
        if self.vsync_start_line == 0
            || self.vsync_end_line <= self.vsync_start_line
            || self.video_start_line <= self.vsync_end_line + 1
            || self.video_end_line <= self.video_start_line + 1
        {
            return Err(TimingError::Vertical);
        }

        match self.apb_cycles_per_pixel() {
            Some(n) if n >= 1 && n <= 0x1_0000 => Ok(()),
            _ => Err(TimingError::PixelClock),
        }
    }

    pub const fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    /// Computes the horizontal timer configuration for this timing.
    pub fn h_timer_config(&self) -> Result<HTimerConfig, TimingError> {
        self.validate()?;
        let apb_cycles_per_pixel =
            self.apb_cycles_per_pixel().ok_or(TimingError::PixelClock)?;
        Ok(HTimerConfig {
            psc: (apb_cycles_per_pixel - 1) as u16,
            arr: self.line_pixels as u32 - 1,
            ccr1: self.sync_pixels as u32,
            ccr2: (self.sync_pixels + self.back_porch_pixels - self.video_lead)
                as u32,
            ccr3: (self.sync_pixels
                + self.back_porch_pixels
                + self.video_pixels) as u32,
        })
    }
}

/// Industry standard 800x600 60Hz timing.
///
/// This produces a 160MHz CPU clock speed for a 40MHz pixel clock.
pub static SVGA_800_600: Timing = {
    let t = Timing {
        clock_config: ClockConfig {
            crystal_hz: 8_000_000, // external crystal Hz
            crystal_divisor: 4,    // divide down to 2Mhz
            vco_multiplier: 160,   // multiply up to 320MHz VCO
            general_divisor: 2,    // divide by 2 for 160MHz CPU clock
            pll48_divisor: 7,      // divide by 7 for 48MHz-ish SDIO clock
            ahb_divisor: 1,        // 160MHz AHB clock
            apb1_divisor: 4,       // 40MHz APB1 clock
            apb2_divisor: 2,       // 80MHz APB2 clock

            // 5 wait states for 160MHz at 3.3V.
            flash_latency: 5,
        },

        add_cycles_per_pixel: 0,

        line_pixels: 1056,
        sync_pixels: 128,
        back_porch_pixels: 88,
        video_lead: 20,
        video_pixels: 800,
        hsync_polarity: Polarity::Positive,

        vsync_start_line: 1,
        vsync_end_line: 1 + 4,
        video_start_line: 1 + 4 + 23,
        video_end_line: 1 + 4 + 23 + 600,
        vsync_polarity: Polarity::Positive,
    };
    assert!(t.is_valid(), "SVGA_800_600");
    t
};

/// Industry standard 800x600 56Hz timing.
///
/// This produces a 144MHz CPU clock speed for a 36MHz pixel clock, which
/// leaves less time per pixel but runs the part cooler.
pub static SVGA_800_600_56: Timing = {
    let t = Timing {
        clock_config: ClockConfig {
            crystal_hz: 8_000_000,
            crystal_divisor: 4,  // 2MHz
            vco_multiplier: 144, // 288MHz VCO
            general_divisor: 2,  // 144MHz CPU
            pll48_divisor: 6,    // 48MHz
            ahb_divisor: 1,
            apb1_divisor: 4, // 36MHz
            apb2_divisor: 2, // 72MHz

            flash_latency: 4,
        },

        add_cycles_per_pixel: 0,

        line_pixels: 1024,
        sync_pixels: 72,
        back_porch_pixels: 128,
        video_lead: 20,
        video_pixels: 800,
        hsync_polarity: Polarity::Positive,

        vsync_start_line: 1,
        vsync_end_line: 1 + 2,
        video_start_line: 1 + 2 + 22,
        video_end_line: 1 + 2 + 22 + 600,
        vsync_polarity: Polarity::Positive,
    };
    assert!(t.is_valid(), "SVGA_800_600_56");
    t
};

/// Industry standard 640x480 60Hz timing.
///
/// The nominal pixel clock is 25.175MHz; we get 25.125MHz out of a 100.5MHz
/// CPU clock, which every monitor we've tried is happy with.
pub static VGA_640_480: Timing = {
    let t = Timing {
        clock_config: ClockConfig {
            crystal_hz: 8_000_000,
            crystal_divisor: 8,  // 1MHz
            vco_multiplier: 201, // 201MHz VCO
            general_divisor: 2,  // 100.5MHz CPU
            pll48_divisor: 4,    // 50.25MHz, SDIO unused
            ahb_divisor: 1,
            apb1_divisor: 4, // 25.125MHz
            apb2_divisor: 2, // 50.25MHz

            flash_latency: 3,
        },

        add_cycles_per_pixel: 0,

        line_pixels: 800,
        sync_pixels: 96,
        back_porch_pixels: 48,
        video_lead: 20,
        video_pixels: 640,
        hsync_polarity: Polarity::Negative,

        vsync_start_line: 10,
        vsync_end_line: 10 + 2,
        video_start_line: 10 + 2 + 33,
        video_end_line: 10 + 2 + 33 + 480,
        vsync_polarity: Polarity::Negative,
    };
    assert!(t.is_valid(), "VGA_640_480");
    t
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svga_clocks() {
        let c = &SVGA_800_600.clock_config;
        assert_eq!(c.cpu_hz(), 160_000_000);
        assert_eq!(c.apb1_hz(), 40_000_000);
        assert_eq!(c.apb2_hz(), 80_000_000);
        assert_eq!(SVGA_800_600.pixel_clock_hz(), 40_000_000);
        assert_eq!(SVGA_800_600.active_lines(), 600);
    }

    #[test]
    fn svga_h_timer() {
        let h = SVGA_800_600.h_timer_config().unwrap();
        // 4 CPU cycles per pixel, APB1 at /4 with the timer clock doubled.
        assert_eq!(h.psc, 1);
        assert_eq!(h.arr, 1055);
        assert_eq!(h.ccr1, 128);
        assert_eq!(h.ccr2, 128 + 88 - 20);
        assert_eq!(h.ccr3, 128 + 88 + 800);
    }

    #[test]
    fn all_tables_valid() {
        for t in &[&SVGA_800_600, &SVGA_800_600_56, &VGA_640_480] {
            assert_eq!(t.validate(), Ok(()));
            assert!(t.h_timer_config().is_ok());
        }
        assert_eq!(VGA_640_480.active_lines(), 480);
        assert_eq!(SVGA_800_600_56.pixel_clock_hz(), 36_000_000);
    }

    #[test]
    fn register_encodings() {
        let mut c = SVGA_800_600.clock_config;
        assert_eq!(c.hpre_bits(), Some(0));
        assert_eq!(c.ppre1_bits(), Some(0b101));
        assert_eq!(c.ppre2_bits(), Some(0b100));
        assert_eq!(c.pllp_bits(), Some(0));

        c.ahb_divisor = 32;
        assert_eq!(c.hpre_bits(), None);
        c.ahb_divisor = 512;
        assert_eq!(c.hpre_bits(), Some(0b1111));
        c.general_divisor = 3;
        assert_eq!(c.pllp_bits(), None);
        assert_eq!(c.validate(), Err(TimingError::Clock));
    }

    #[test]
    fn rejects_overclock() {
        let mut t = SVGA_800_600;
        t.clock_config.vco_multiplier = 200; // 200MHz CPU
        assert_eq!(t.validate(), Err(TimingError::Clock));
    }

    #[test]
    fn rejects_overlapping_horizontal() {
        let mut t = SVGA_800_600;
        t.line_pixels = 1000;
        assert_eq!(t.validate(), Err(TimingError::Horizontal));

        let mut t = SVGA_800_600;
        t.video_lead = t.back_porch_pixels;
        assert_eq!(t.validate(), Err(TimingError::Horizontal));
    }

    #[test]
    fn rejects_crowded_vertical() {
        let mut t = SVGA_800_600;
        t.video_start_line = t.vsync_end_line + 1;
        assert_eq!(t.validate(), Err(TimingError::Vertical));

        let mut t = SVGA_800_600;
        t.vsync_end_line = t.vsync_start_line;
        assert_eq!(t.validate(), Err(TimingError::Vertical));
    }

    #[test]
    fn rejects_unreachable_pixel_clock() {
        let mut t = SVGA_800_600;
        // 5 cycles per pixel * 2 doesn't divide evenly by an APB1 /4.
        t.add_cycles_per_pixel = 1;
        assert_eq!(t.validate(), Err(TimingError::PixelClock));
        // Nor by /8.
        t.clock_config.apb1_divisor = 8;
        assert_eq!(t.validate(), Err(TimingError::PixelClock));
        // A /1 APB1 clock would work for any pixel clock, but is out of spec
        // at this CPU speed.
        t.clock_config.apb1_divisor = 1;
        assert_eq!(t.validate(), Err(TimingError::Clock));
    }
}
