//! Early startup, before `main` and before `.data` and `.bss` exist.
//!
//! The driver keeps its hot code and buffers outside the regions
//! `cortex-m-rt` initializes: `.ramcode` in SRAM (copied from Flash),
//! `.local_ram` in CCM and `.scanout_ram` in the 16 KiB SRAM. `memory.x`
//! places them; this sets them up.

use cortex_m::asm;
use cortex_m_rt::pre_init;
use stm32f4::stm32f407 as device;

extern "C" {
    static __vector_table_in_flash: u8;
    static mut _ramcode_start: u32;
    static mut _ramcode_end: u32;
    static _ramcode_init: u32;
    static mut _local_ram_start: u32;
    static mut _local_ram_end: u32;
    static mut _scanout_ram_start: u32;
    static mut _scanout_ram_end: u32;
}

#[pre_init]
unsafe fn pre_init() {
    // Nothing above the next marker may touch a `static`.

    let scb = &*cortex_m::peripheral::SCB::ptr();

    // Usage, bus and memory faults get their own handlers and useful
    // status, rather than all escalating to HardFault.
    scb.shcrs.write(scb.shcrs.read() | (0b111 << 16));

    // Address zero currently aliases Flash. We're about to point it at SRAM,
    // so move the vector table base to Flash's real address first.
    scb.vtor.write(&__vector_table_in_flash as *const _ as u32);

    let rcc = &*device::RCC::ptr();
    rcc.apb2enr.modify(|_, w| w.syscfgen().enabled());
    asm::dmb();

    // Remap SRAM112 to address 0.
    (*device::SYSCFG::ptr())
        .memrm
        .write(|w| w.mem_mode().bits(0b11));
    asm::dsb();
    asm::isb();

    rcc.apb2enr.modify(|_, w| w.syscfgen().disabled());

    // ----------- statics in our regions are now usable ------------

    r0::init_data(&mut _ramcode_start, &mut _ramcode_end, &_ramcode_init);
    r0::zero_bss(&mut _local_ram_start, &mut _local_ram_end);
    r0::zero_bss(&mut _scanout_ram_start, &mut _scanout_ram_end);
    asm::dsb();
    asm::isb();

    // Rasterizers may use floating point in interrupt context. Enable
    // automatic FP context stacking, but lazily, so that the timing ISR
    // (which doesn't touch the FPU) pays nothing for it.
    let fpccr_val = (1 << 31)  // automatic
                  | (1 << 30); // lazy
    (*cortex_m::peripheral::FPU::ptr()).fpccr.write(fpccr_val);
}
