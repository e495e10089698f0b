//! MessagePack style codec

use featuredb_core::Style;

use super::traits::{CodecError, StyleCodec};

/// Identity written to `styles.coding`
pub const MSGPACK_CODEC_ID: &str = "msgpack";

/// Styles serialized with `rmp-serde`
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackStyleCodec;

impl StyleCodec for MsgPackStyleCodec {
    fn encode(&self, style: &Style) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(style).map_err(|e| CodecError::encode(e.to_string(), MSGPACK_CODEC_ID))
    }

    fn decode(&self, data: &[u8]) -> Result<Style, CodecError> {
        rmp_serde::from_slice(data)
            .map_err(|e| CodecError::decode(e.to_string(), MSGPACK_CODEC_ID, data.len()))
    }

    fn codec_id(&self) -> &str {
        MSGPACK_CODEC_ID
    }
}

/// Resolve the codec named by a stored `coding` value
pub fn style_codec(codec_id: &str) -> Result<&'static dyn StyleCodec, CodecError> {
    static MSGPACK: MsgPackStyleCodec = MsgPackStyleCodec;
    match codec_id {
        MSGPACK_CODEC_ID => Ok(&MSGPACK),
        other => Err(CodecError::UnknownCodec(other.to_string())),
    }
}
