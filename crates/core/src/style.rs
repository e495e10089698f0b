//! Feature styles
//!
//! Styles are opaque to the query engine; they only need to round-trip
//! through every backend unchanged. The persistent backend serializes them
//! with MessagePack.

use serde::{Deserialize, Serialize};

/// ARGB packed color
pub type Color = u32;

/// Visual style attached to a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Style {
    /// Point symbol, optionally rendered with an icon
    Point {
        /// Symbol color
        color: Color,
        /// Symbol size in pixels
        size: f32,
        /// Optional icon URI
        icon: Option<String>,
    },
    /// Line stroke
    Stroke {
        /// Stroke color
        color: Color,
        /// Stroke width in pixels
        width: f32,
    },
    /// Polygon fill
    Fill {
        /// Fill color
        color: Color,
    },
    /// Text label
    Label {
        /// Label text
        text: String,
        /// Text color
        color: Color,
        /// Font size in points
        size: f32,
    },
    /// Several styles applied in order
    Composite(Vec<Style>),
}
