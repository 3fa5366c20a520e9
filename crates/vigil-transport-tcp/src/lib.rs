//! Length-prefixed framed TCP links between the controller and edge peers.

mod config;
mod factory;
mod listener;
mod transport;

pub use config::TcpConfig;
pub use factory::TcpTransportFactory;
pub use listener::TcpListener;
pub use transport::TcpTransport;
