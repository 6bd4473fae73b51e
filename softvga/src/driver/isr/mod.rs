//! The driver's three interrupt handlers. Applications wire these up to
//! `TIM4`, `TIM3` and `PendSV`.

pub mod hstate;
pub mod rast;
pub mod shock;
