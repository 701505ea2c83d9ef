use std::ops::{Deref, DerefMut};

use glam::U8Vec4;

/// The ID of a region painted into a [`RegionGrid`](crate::RegionGrid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RegionId(pub u32);

impl Deref for RegionId {
    type Target = u32;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RegionId {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u32> for RegionId {
    fn from(value: u32) -> Self {
        RegionId(value)
    }
}

impl RegionId {
    /// Cells that do not belong to any region. Also what off-grid coordinates read as.
    pub const NONE: Self = Self(0);

    /// Returns `true` if this is [`RegionId::NONE`].
    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Returns `true` if this is an actual region.
    #[inline]
    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

/// Metadata of a region. Which cells belong to it is stored in the grid, not here.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionInfo {
    /// Display name
    pub name: String,
    /// Display color as RGBA
    pub color: U8Vec4,
    /// The ID of the region in the game's configuration tables
    pub config_id: u32,
    /// Path of the prefab instantiated for this region by the game, if any
    pub prefab_path: Option<String>,
}

impl RegionInfo {
    /// Creates region metadata without a prefab.
    pub fn new(name: impl Into<String>, color: U8Vec4, config_id: u32) -> Self {
        Self {
            name: name.into(),
            color,
            config_id,
            prefab_path: None,
        }
    }
}
