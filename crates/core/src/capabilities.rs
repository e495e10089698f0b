//! Modification and visibility capability bitmasks
//!
//! Each store instance advertises which mutations it accepts. Write paths
//! check the relevant bits before touching any state and fail with
//! `UnsupportedOperation` when a bit is missing.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitmask of permitted content modifications
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModificationFlags(u32);

impl ModificationFlags {
    /// No modification permitted
    pub const NONE: Self = Self(0);
    /// Feature sets may be inserted
    pub const FEATURESET_INSERT: Self = Self(0x0001);
    /// Feature sets may be updated
    pub const FEATURESET_UPDATE: Self = Self(0x0002);
    /// Feature sets may be deleted
    pub const FEATURESET_DELETE: Self = Self(0x0004);
    /// Bulk modification sessions are supported
    pub const BULK_MODIFICATIONS: Self = Self(0x0008);
    /// Features may be inserted into sets
    pub const FEATURESET_FEATURE_INSERT: Self = Self(0x0010);
    /// Features within sets may be updated
    pub const FEATURESET_FEATURE_UPDATE: Self = Self(0x0020);
    /// Features may be deleted from sets
    pub const FEATURESET_FEATURE_DELETE: Self = Self(0x0040);
    /// Feature set names may change
    pub const FEATURESET_NAME: Self = Self(0x0080);
    /// Feature set resolution thresholds may change
    pub const FEATURESET_DISPLAY_THRESHOLDS: Self = Self(0x0100);
    /// Feature names may change
    pub const FEATURE_NAME: Self = Self(0x0200);
    /// Feature geometry may change
    pub const FEATURE_GEOMETRY: Self = Self(0x0400);
    /// Feature styles may change
    pub const FEATURE_STYLE: Self = Self(0x0800);
    /// Feature attributes may change
    pub const FEATURE_ATTRIBUTES: Self = Self(0x1000);

    /// Every modification
    pub const ALL: Self = Self(0x1FFF);

    /// Build from raw bits, dropping unknown bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check that every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check that no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ModificationFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ModificationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ModificationFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for ModificationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModificationFlags({:#06x})", self.0)
    }
}

/// Bitmask of permitted visibility settings
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VisibilityFlags(u32);

impl VisibilityFlags {
    /// Visibility is fixed
    pub const NONE: Self = Self(0);
    /// Individual feature visibility may be toggled
    pub const FEATURE: Self = Self(0x1);
    /// Whole feature set visibility may be toggled
    pub const FEATURESET: Self = Self(0x2);
    /// Both feature and feature set visibility
    pub const ALL: Self = Self(0x3);

    /// Build from raw bits, dropping unknown bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check that every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VisibilityFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for VisibilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VisibilityFlags({:#x})", self.0)
    }
}
