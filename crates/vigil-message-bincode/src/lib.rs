//! bincode wire codec and a typed channel over any framed transport.

mod channel;

pub use channel::{ChannelError, MessageChannel};

use serde::Serialize;
use serde::de::DeserializeOwned;
use vigil_core::error::CodecError;
use vigil_core::traits::Codec;

/// Encodes protocol messages with bincode's default (fixed-int) settings.
///
/// An optional size limit is checked before encoding and before decoding so
/// an oversized message is reported as `MessageTooLarge` rather than as a
/// transport failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec {
    limit: Option<usize>,
}

impl BincodeCodec {
    #[must_use]
    pub const fn new() -> Self {
        Self { limit: None }
    }

    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    fn check(&self, size: usize) -> Result<(), CodecError> {
        match self.limit {
            Some(limit) if size > limit => Err(CodecError::MessageTooLarge { size, limit }),
            _ => Ok(()),
        }
    }
}

impl<M> Codec<M> for BincodeCodec
where
    M: Serialize + DeserializeOwned,
{
    fn encode(&self, msg: &M) -> Result<Vec<u8>, CodecError> {
        if self.limit.is_some() {
            let size = bincode::serialized_size(msg)
                .map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
            self.check(usize::try_from(size).unwrap_or(usize::MAX))?;
        }
        bincode::serialize(msg).map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<M, CodecError> {
        self.check(data.len())?;
        bincode::deserialize(data).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
