//! Linux input event codes (`linux/input-event-codes.h`).
//!
//! Only the codes the forwarder inspects are listed. Everything else passes
//! through as a plain `u16`.

// Event types
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

// Synchronization
pub const SYN_REPORT: u16 = 0;
pub const SYN_DROPPED: u16 = 3;

// Relative axes
pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const REL_HWHEEL: u16 = 0x06;
pub const REL_WHEEL: u16 = 0x08;

// Absolute axes
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;

// Keys and buttons
pub const KEY_F1: u16 = 59;
pub const BTN_MOUSE: u16 = 0x110;
pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;
pub const BTN_SIDE: u16 = 0x113;
pub const BTN_TL: u16 = 0x136;
pub const BTN_TR: u16 = 0x137;
pub const BTN_TOUCH: u16 = 0x14a;

/// `BUS_VIRTUAL` from `linux/input.h`, reported by uinput devices.
pub const BUS_VIRTUAL: u16 = 0x06;
