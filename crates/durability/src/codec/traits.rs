//! Codec trait and error definitions.

use featuredb_core::{FeatureDbError, Style};

/// Serializer for feature styles.
///
/// Every stored style row carries the identity of the codec that wrote it
/// in its `coding` column, so rows written by another codec are reported
/// instead of misread.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync`; the store shares one instance across
/// threads.
pub trait StyleCodec: Send + Sync {
    /// Encode a style into its stored bytes.
    fn encode(&self, style: &Style) -> Result<Vec<u8>, CodecError>;

    /// Decode stored bytes back into a style.
    fn decode(&self, data: &[u8]) -> Result<Style, CodecError>;

    /// Unique codec identifier, stored with every row.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Decoding failed (truncated buffer, bad tag, invalid UTF-8).
    ///
    /// Carries the codec identity and data length so callers can
    /// distinguish a wrong-codec error from data corruption.
    #[error("Decode error (codec={codec_id}, data_len={data_len}): {detail}")]
    DecodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the decode
        codec_id: String,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Encoding failed.
    #[error("Encode error (codec={codec_id}): {detail}")]
    EncodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the encode
        codec_id: String,
    },

    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// Attribute schema id with no registry entry.
    #[error("Unknown attribute schema id: {0}")]
    UnknownSchemaId(i32),

    /// Attribute key encoded before being registered.
    #[error("Attribute {key:?} (type {type_code}) has no schema id")]
    UnregisteredKey {
        /// Attribute key
        key: String,
        /// Wire type code
        type_code: i32,
    },
}

impl CodecError {
    /// Create a decode error with full diagnostic context.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        CodecError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }

    /// Create an encode error.
    pub fn encode(detail: impl Into<String>, codec_id: impl Into<String>) -> Self {
        CodecError::EncodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
        }
    }
}

impl From<CodecError> for FeatureDbError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::EncodeError { .. } | CodecError::UnregisteredKey { .. } => {
                FeatureDbError::storage(err.to_string())
            }
            _ => FeatureDbError::decode(err.to_string()),
        }
    }
}
