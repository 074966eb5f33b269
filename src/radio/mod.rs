pub mod bus;
pub mod driver;
pub mod frequency;
pub mod hal;
pub mod registers;

pub use bus::RegisterBus;
pub use driver::{RadioEvent, RadioStats, ReceiveFailure, ReceivedPacket, Sx127xDriver};
pub use registers::{IrqFlags, OperatingMode};
