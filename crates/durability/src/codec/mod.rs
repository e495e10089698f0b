//! Blob codecs for the persistent backend
//!
//! - [`attributes`]: versioned big-endian attribute-set encoding resolved
//!   through an [`AttributeSchema`]
//! - [`wkb`]: geometry as Well-Known Binary
//! - [`style`]: MessagePack style rows behind the [`StyleCodec`] seam

pub mod attributes;
pub mod style;
mod traits;
pub mod wkb;

pub use attributes::{AttributeSchema, SchemaEntry};
pub use style::{style_codec, MsgPackStyleCodec};
pub use traits::{CodecError, StyleCodec};
