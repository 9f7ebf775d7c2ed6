pub mod args;
pub mod op;
pub mod ops;

pub use ops::{
    AddDevice, Cancel, Connect, CopyText, Devices, History, Init, Register, Reset, Status,
};
