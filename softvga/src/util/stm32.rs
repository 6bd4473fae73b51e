//! Augmented STM32 operations.
//!
//! This is a set of extensions and workarounds for the `stm32f4` crate, whose
//! register API models some fields only partially (or not at all).

use stm32f4::stm32f407 as device;

use crate::timing::ClockConfig;

macro_rules! block_while {
    ($condition:expr) => {
        while $condition {}
    };
}

macro_rules! block_until {
    ($condition:expr) => {
        block_while!(!$condition)
    };
}

/// Applies the settings described in `cfg` to the `rcc` and `flash`. (The flash
/// controller gets involved because we have to adjust wait states.)
///
/// The algorithm used can transition from any valid clock config to any other,
/// by switching to the internal high-speed oscillator in between modes.
///
/// # Panics
///
/// If `cfg` has divisors the hardware can't produce. `ClockConfig::validate`
/// rules those out.
#[allow(unused_unsafe)]
pub fn configure_clocks(
    rcc: &device::RCC,
    flash: &device::FLASH,
    cfg: &ClockConfig,
) {
    let (hpre, ppre1, ppre2, pllp) = match (
        cfg.hpre_bits(),
        cfg.ppre1_bits(),
        cfg.ppre2_bits(),
        cfg.pllp_bits(),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => panic!("unencodable clock divisors"),
    };

    // Switch to the internal 16MHz oscillator while messing with the PLL.
    rcc.cr.modify(|_, w| w.hsion().set_bit());
    block_until! { rcc.cr.read().hsirdy().bit() }
    rcc.cfgr.modify(|_, w| unsafe { w.sw().bits(0b00) });
    block_until! { rcc.cfgr.read().sws().bits() == 0b00 }

    // Turn off the PLL.
    rcc.cr.modify(|_, w| w.pllon().clear_bit());
    block_while! { rcc.cr.read().pllrdy().bit() }

    // Apply divisors before boosting frequency.
    rcc.cfgr.modify(|_, w| unsafe {
        w.hpre().bits(hpre).ppre1().bits(ppre1).ppre2().bits(ppre2)
    });

    flash
        .acr
        .modify(|_, w| unsafe { w.latency().bits(cfg.flash_latency) });

    // Switch on the crystal oscillator.
    rcc.cr.modify(|_, w| w.hseon().set_bit());
    block_until! { rcc.cr.read().hserdy().bit() }

    // Configure the PLL.
    rcc.pllcfgr.modify(|_, w| unsafe {
        w.pllm()
            .bits(cfg.crystal_divisor)
            .plln()
            .bits(cfg.vco_multiplier)
            .pllq()
            .bits(cfg.pll48_divisor)
            .pllp()
            .bits(pllp)
            .pllsrc()
            .set_bit() // HSE
    });

    // Turn it on.
    rcc.cr.modify(|_, w| w.pllon().set_bit());
    block_until! { rcc.cr.read().pllrdy().bit() }

    // Select PLL as clock source.
    rcc.cfgr.modify(|_, w| unsafe { w.sw().bits(0b10) });
    block_until! { rcc.cfgr.read().sws().bits() == 0b10 }
}

/// Slap a copy operation onto types that aren't Copy for some reason.
///
/// This trait is `unsafe` because you had better know what you're doing if you
/// implement it for a foreign type.
pub unsafe trait CopyHack: Sized {
    fn copy_hack(&self) -> Self {
        unsafe { core::ptr::read(self) }
    }
}

unsafe impl CopyHack for device::Interrupt {}

/// Trait for welding variant support onto an un-modeled register field.
pub trait VariantExt<V> {
    type W;
    fn variant(self, variant: V) -> Self::W;
}

/// Trait for welding arbitrary write support onto an un-modeled register field.
pub trait AllWriteExt<T> {
    type W;
    fn bits_ext(self, value: T) -> Self::W;
}

pub mod tim1 {
    pub mod arr {
        use stm32f4::stm32f407::tim1::arr as device;

        impl<'a> crate::util::stm32::AllWriteExt<u16> for device::_ARRW<'a> {
            type W = &'a mut device::W;
            fn bits_ext(self, value: u16) -> Self::W {
                unsafe { self.bits(value) }
            }
        }
    }
    pub mod cnt {
        use stm32f4::stm32f407::tim1::cnt as device;

        impl<'a> crate::util::stm32::AllWriteExt<u16> for device::_CNTW<'a> {
            type W = &'a mut device::W;
            fn bits_ext(self, value: u16) -> Self::W {
                unsafe { self.bits(value) }
            }
        }
    }
}

pub mod tim3 {
    pub mod smcr {
        use stm32f4::stm32f407::tim3::smcr as device;

        /// Trigger selection.
        #[derive(Copy, Clone, Debug)]
        pub enum TSW {
            /// Internal trigger 2: TIM3's TRGO, as seen by TIM4.
            ITR2 = 0b010,
        }

        impl<'a> crate::util::stm32::VariantExt<TSW> for device::_TSW<'a> {
            type W = &'a mut device::W;
            fn variant(self, variant: TSW) -> Self::W {
                unsafe { self.bits(variant as u8) }
            }
        }

        /// Slave mode selection.
        #[derive(Copy, Clone, Debug)]
        pub enum SMSW {
            /// The counter starts at a rising edge of the trigger.
            Trigger = 0b110,
        }

        impl<'a> crate::util::stm32::VariantExt<SMSW> for device::_SMSW<'a> {
            type W = &'a mut device::W;
            fn variant(self, variant: SMSW) -> Self::W {
                unsafe { self.bits(variant as u8) }
            }
        }
    }
    pub mod psc {
        use stm32f4::stm32f407::tim3::psc as device;

        impl<'a> crate::util::stm32::AllWriteExt<u16> for device::_PSCW<'a> {
            type W = &'a mut device::W;
            fn bits_ext(self, value: u16) -> Self::W {
                unsafe { self.bits(value) }
            }
        }
    }
    pub mod ccmr1_output {
        use stm32f4::stm32f407::tim3::ccmr1_output as device;

        /// Output compare 1 mode.
        #[derive(Copy, Clone, Debug)]
        pub enum OC1MW {
            /// Active while the counter is below CCR1.
            Pwm1 = 0b110,
        }

        impl<'a> crate::util::stm32::VariantExt<OC1MW> for device::_OC1MW<'a> {
            type W = &'a mut device::W;
            fn variant(self, variant: OC1MW) -> Self::W {
                unsafe { self.bits(variant as u8) }
            }
        }

        /// Capture/compare 1 direction.
        #[derive(Copy, Clone, Debug)]
        pub enum CC1SW {
            Output = 0b00,
        }

        impl<'a> crate::util::stm32::VariantExt<CC1SW> for device::_CC1SW<'a> {
            type W = &'a mut device::W;
            fn variant(self, variant: CC1SW) -> Self::W {
                unsafe { self.bits(variant as u8) }
            }
        }
    }
}

pub mod gpiob {
    pub mod bsrr {
        use stm32f4::stm32f407::gpiob::bsrr as device;
        impl<'a> crate::util::stm32::AllWriteExt<u32> for &'a mut device::W {
            type W = &'a mut device::W;
            fn bits_ext(self, value: u32) -> Self::W {
                unsafe { self.bits(value) }
            }
        }
    }
}
