use serde::{Deserialize, Serialize};

/// Backend model tier. A closed enum so a typo in configuration can never
/// silently fall back to a default model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Flash,
    Pro,
}

impl ModelTier {
    /// Backend model identifier this tier maps to.
    pub fn model_name(self) -> &'static str {
        match self {
            Self::Flash => "gemini-2.5-flash-image",
            Self::Pro => "gemini-3-pro-image-preview",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Pro => "pro",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flash" => Some(Self::Flash),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

impl Default for ModelTier {
    fn default() -> Self {
        Self::Flash
    }
}
