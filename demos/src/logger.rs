//! `log` output over ITM stimulus port 0.
//!
//! Read it on the host with something like:
//!
//! ```text
//! monitor tpiu config internal itm.out uart off 160000000
//! monitor itm port 0 on
//! ```
//!
//! and then `itmdump -F -f itm.out`.

use cortex_m::iprintln;
use cortex_m::peripheral::{itm, ITM};
use log::{LevelFilter, Metadata, Record};

struct ItmLogger;

static LOGGER: ItmLogger = ItmLogger;

impl log::Log for ItmLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        // Safety: the driver's interrupts never log, so only thread mode
        // writes to this port (and the panic handler, which doesn't return).
        let itm = unsafe { &mut *(ITM::ptr() as *mut itm::RegisterBlock) };
        iprintln!(
            &mut itm.stim[0],
            "{:<5} {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Installs the ITM logger, passing records at `level` and above.
///
/// Calls after the first have no effect.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level)
    }
}
