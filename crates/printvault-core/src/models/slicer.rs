use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a detected slicer installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlicerId(pub Uuid);

impl SlicerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for SlicerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SlicerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported slicer families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlicerType {
    PrusaSlicer,
    OrcaSlicer,
    Cura,
    BambuStudio,
}

impl std::fmt::Display for SlicerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlicerType::PrusaSlicer => write!(f, "prusaslicer"),
            SlicerType::OrcaSlicer => write!(f, "orcaslicer"),
            SlicerType::Cura => write!(f, "cura"),
            SlicerType::BambuStudio => write!(f, "bambustudio"),
        }
    }
}

impl std::str::FromStr for SlicerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prusaslicer" | "prusa-slicer" => Ok(SlicerType::PrusaSlicer),
            "orcaslicer" | "orca-slicer" => Ok(SlicerType::OrcaSlicer),
            "cura" => Ok(SlicerType::Cura),
            "bambustudio" | "bambu-studio" => Ok(SlicerType::BambuStudio),
            _ => Err(format!("unknown slicer type: {s}")),
        }
    }
}

/// One detected slicer installation. Unreachable installations are marked
/// unavailable, never removed, so configuration survives transient outages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerConfig {
    pub id: SlicerId,
    pub slicer_type: SlicerType,
    pub executable: PathBuf,
    pub version: Option<String>,
    pub is_available: bool,
    pub last_checked: DateTime<Utc>,
}

impl SlicerConfig {
    pub fn new(slicer_type: SlicerType, executable: PathBuf) -> Self {
        Self {
            id: SlicerId::new(),
            slicer_type,
            executable,
            version: None,
            is_available: false,
            last_checked: Utc::now(),
        }
    }
}

/// Unique identifier for an imported profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a preset configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Print,
    Filament,
    Printer,
    Bundle,
}

impl std::fmt::Display for ProfileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileType::Print => write!(f, "print"),
            ProfileType::Filament => write!(f, "filament"),
            ProfileType::Printer => write!(f, "printer"),
            ProfileType::Bundle => write!(f, "bundle"),
        }
    }
}

impl std::str::FromStr for ProfileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "print" => Ok(ProfileType::Print),
            "filament" => Ok(ProfileType::Filament),
            "printer" => Ok(ProfileType::Printer),
            "bundle" => Ok(ProfileType::Bundle),
            _ => Err(format!("unknown profile type: {s}")),
        }
    }
}

/// An imported preset belonging to a slicer installation. Unique per
/// (slicer, name, type); at most one default per (slicer, type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerProfile {
    pub id: ProfileId,
    pub slicer_id: SlicerId,
    pub name: String,
    pub profile_type: ProfileType,
    /// Normalized key/value settings from the native preset file.
    pub settings: serde_json::Value,
    pub is_default: bool,
    pub imported_at: DateTime<Utc>,
}

impl SlicerProfile {
    pub fn new(
        slicer_id: SlicerId,
        name: String,
        profile_type: ProfileType,
        settings: serde_json::Value,
    ) -> Self {
        Self {
            id: ProfileId::new(),
            slicer_id,
            name,
            profile_type,
            settings,
            is_default: false,
            imported_at: Utc::now(),
        }
    }
}
