pub mod client;
pub mod command;
pub mod id;
pub mod inspection;
pub mod protocol;
pub mod record;
pub mod time;

pub use client::*;
pub use command::*;
pub use id::*;
pub use inspection::*;
pub use protocol::*;
pub use record::*;
pub use time::*;
