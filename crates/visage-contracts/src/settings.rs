use serde::{Deserialize, Serialize};

use crate::images::ImageRef;
use crate::models::ModelTier;

pub const MAX_BATCH_QUANTITY: u32 = 4;

/// Output aspect ratio. Closed set matching what the backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Widescreen => "16:9",
            Self::Vertical => "9:16",
            Self::Standard => "4:3",
            Self::Portrait => "3:4",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1:1" => Some(Self::Square),
            "16:9" => Some(Self::Widescreen),
            "9:16" => Some(Self::Vertical),
            "4:3" => Some(Self::Standard),
            "3:4" => Some(Self::Portrait),
            _ => None,
        }
    }

    /// Pixel dimensions used when an image has to be rendered locally.
    pub fn render_dims(self) -> (u32, u32) {
        match self {
            Self::Square => (512, 512),
            Self::Widescreen => (768, 432),
            Self::Vertical => (432, 768),
            Self::Standard => (640, 480),
            Self::Portrait => (480, 640),
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::Square
    }
}

/// Inputs for one blend batch. Built once per submission; a fresh value is
/// required for every new batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendSettings {
    pub person1: ImageRef,
    pub person2: ImageRef,
    pub blend_ratio: u8,
    pub model: ModelTier,
    pub aspect_ratio: AspectRatio,
    pub quantity: u32,
}

impl BlendSettings {
    pub fn new(
        person1: ImageRef,
        person2: ImageRef,
        blend_ratio: u8,
        model: ModelTier,
        aspect_ratio: AspectRatio,
        quantity: u32,
    ) -> Self {
        Self {
            person1,
            person2,
            blend_ratio: blend_ratio.min(100),
            model,
            aspect_ratio,
            quantity: quantity.clamp(1, MAX_BATCH_QUANTITY),
        }
    }
}

/// Inputs for one final-composition batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalSettings {
    pub pose: ImageRef,
    pub clothing: ImageRef,
    pub model: ModelTier,
    pub aspect_ratio: AspectRatio,
    pub quantity: u32,
}

impl FinalSettings {
    pub fn new(
        pose: ImageRef,
        clothing: ImageRef,
        model: ModelTier,
        aspect_ratio: AspectRatio,
        quantity: u32,
    ) -> Self {
        Self {
            pose,
            clothing,
            model,
            aspect_ratio,
            quantity: quantity.clamp(1, MAX_BATCH_QUANTITY),
        }
    }
}
