pub mod message;
pub mod transport;

pub use message::Codec;
pub use transport::{FramedTransport, Listener, TransportFactory};
