pub mod add_device;
pub mod cancel;
pub mod connect;
pub mod copy;
pub mod devices;
pub mod history;
pub mod init;
pub mod register;
pub mod reset;
pub mod status;

pub use add_device::AddDevice;
pub use cancel::Cancel;
pub use connect::Connect;
pub use copy::CopyText;
pub use devices::Devices;
pub use history::History;
pub use init::Init;
pub use register::Register;
pub use reset::Reset;
pub use status::Status;
