use crate::{
    constants::{DEFAULT_EDGE, DEFAULT_IDENTITY_LEN, MAX_COLOR_ID, POST_TILE_TAG, reply_tags},
    error::{ClientError, Result},
    identity::UserIdentity,
};

/// Three little-endian i16 values follow the identity.
const COORDS_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelUpdate {
    pub x: i16,
    pub y: i16,
    pub color_id: i16,
}

/// Range contract for outbound pixel values. `edge` itself is accepted so
/// callers can exercise how the server handles the one-past-the-end row/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub edge: i16,
}

impl Default for PixelBounds {
    fn default() -> Self {
        Self { edge: DEFAULT_EDGE }
    }
}

impl PixelBounds {
    pub fn check(&self, update: &PixelUpdate) -> Result<()> {
        check_field("x", update.x, self.edge)?;
        check_field("y", update.y, self.edge)?;
        check_field("colorID", update.color_id, MAX_COLOR_ID)
    }
}

fn check_field(field: &'static str, value: i16, max: i16) -> Result<()> {
    if (0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ClientError::InvalidField {
            field,
            value: value.into(),
            min: 0,
            max: max.into(),
        })
    }
}

/// A decoded binary pixel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    pub identity: UserIdentity,
    pub update: PixelUpdate,
}

/// Encoder/decoder for `[tag][identity][x][y][colorID]` frames.
///
/// The frame carries no length field, so both ends must agree on the
/// identity width out of band. Shorter identities are NUL padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFrameCodec {
    identity_len: usize,
    bounds: PixelBounds,
}

impl Default for PixelFrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_LEN, PixelBounds::default())
    }
}

impl PixelFrameCodec {
    pub fn new(identity_len: usize, bounds: PixelBounds) -> Self {
        Self {
            identity_len,
            bounds,
        }
    }

    pub fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    pub fn frame_len(&self) -> usize {
        1 + self.identity_len + COORDS_LEN
    }

    pub fn encode(&self, identity: &UserIdentity, update: &PixelUpdate) -> Result<Vec<u8>> {
        self.bounds.check(update)?;

        let id = identity.as_bytes();
        if id.len() > self.identity_len {
            return Err(ClientError::InvalidField {
                field: "identity length",
                value: id.len() as i64,
                min: 1,
                max: self.identity_len as i64,
            });
        }

        let mut buf = Vec::with_capacity(self.frame_len());
        buf.push(POST_TILE_TAG);
        buf.extend_from_slice(id);
        buf.resize(1 + self.identity_len, 0);
        buf.extend_from_slice(&update.x.to_le_bytes());
        buf.extend_from_slice(&update.y.to_le_bytes());
        buf.extend_from_slice(&update.color_id.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(&self, data: &[u8]) -> Result<PixelFrame> {
        if data.len() != self.frame_len() {
            return Err(ClientError::MalformedMessage(format!(
                "pixel frame is {} bytes, expected {}",
                data.len(),
                self.frame_len()
            )));
        }
        if data[0] != POST_TILE_TAG {
            return Err(ClientError::MalformedMessage(format!(
                "unexpected frame tag {}",
                data[0]
            )));
        }

        let id_end = 1 + self.identity_len;
        let raw_id = &data[1..id_end];
        let trimmed = match raw_id.iter().position(|b| *b == 0) {
            Some(nul) => &raw_id[..nul],
            None => raw_id,
        };
        let identity = std::str::from_utf8(trimmed)
            .map_err(|e| ClientError::MalformedMessage(format!("identity is not UTF-8: {e}")))?;

        let read_i16 = |at: usize| i16::from_le_bytes([data[at], data[at + 1]]);

        Ok(PixelFrame {
            identity: UserIdentity::new(identity)?,
            update: PixelUpdate {
                x: read_i16(id_end),
                y: read_i16(id_end + 2),
                color_id: read_i16(id_end + 4),
            },
        })
    }
}

/// Names an inbound binary frame by its leading tag, for logging.
pub fn classify_binary_reply(data: &[u8]) -> Option<&'static str> {
    data.first().map(|tag| reply_tags::name(*tag))
}
