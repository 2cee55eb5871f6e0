use tracing::trace;

use crate::{
    config::EncodingMode,
    envelope::{Request, encode_json},
    error::Result,
    identity::UserIdentity,
    protocol::{PixelFrameCodec, PixelUpdate},
    socket::Message,
};

/// Turns generator output into wire messages for one session's identity.
#[derive(Debug, Clone)]
pub struct PayloadEncoder {
    identity: UserIdentity,
    mode: EncodingMode,
    codec: PixelFrameCodec,
}

impl PayloadEncoder {
    pub fn new(identity: UserIdentity, mode: EncodingMode, codec: PixelFrameCodec) -> Self {
        Self {
            identity,
            mode,
            codec,
        }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn pixel(&self, update: &PixelUpdate) -> Result<Message> {
        match self.mode {
            EncodingMode::Json => {
                // Same range contract as the binary path.
                self.codec.bounds().check(update)?;
                let text = encode_json(&Request::post_tile(self.identity.clone(), update));
                trace!("postTile {}", text);
                Ok(Message::text(text))
            }
            EncodingMode::Binary => {
                let frame = self.codec.encode(&self.identity, update)?;
                trace!("Binary pixel frame, {} bytes", frame.len());
                Ok(Message::binary(frame))
            }
        }
    }

    pub fn canvas_query(&self) -> Message {
        Message::text(encode_json(&Request::GetCanvas {
            user_id: self.identity.clone(),
        }))
    }
}
