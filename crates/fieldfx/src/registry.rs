use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Every overlay kind the field layer can spawn. Adding a kind means adding a
/// registry entry and extending the exhaustive matches below; there is no
/// string-keyed fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    #[serde(alias = "grass")]
    TallGrass,
    #[serde(alias = "long")]
    LongGrass,
    #[serde(alias = "sand")]
    SandFootprints,
    #[serde(alias = "deep_sand")]
    DeepSandFootprints,
    #[serde(alias = "bike_tracks")]
    BikeTireTracks,
    #[serde(alias = "puddle_splash")]
    Splash,
    #[serde(alias = "water_ripple")]
    Ripple,
    Ash,
    AshPuff,
    AshLaunch,
    GroundImpactDust,
    SmallSparkle,
}

impl EffectKind {
    pub const ALL: [Self; 12] = [
        Self::TallGrass,
        Self::LongGrass,
        Self::SandFootprints,
        Self::DeepSandFootprints,
        Self::BikeTireTracks,
        Self::Splash,
        Self::Ripple,
        Self::Ash,
        Self::AshPuff,
        Self::AshLaunch,
        Self::GroundImpactDust,
        Self::SmallSparkle,
    ];

    /// Footprint/tire-track family: no frame animation, tick-window expiry.
    pub fn is_track(self) -> bool {
        matches!(
            self,
            Self::SandFootprints | Self::DeepSandFootprints | Self::BikeTireTracks
        )
    }

    pub fn is_grass(self) -> bool {
        matches!(self, Self::TallGrass | Self::LongGrass)
    }

    pub fn is_ash_family(self) -> bool {
        matches!(self, Self::Ash | Self::AshPuff | Self::AshLaunch)
    }

    pub fn is_water(self) -> bool {
        matches!(self, Self::Splash | Self::Ripple)
    }

    /// Downward draw bias so water/dust overlays sit at the owner's feet.
    pub fn draw_y_offset_px(self) -> i32 {
        match self {
            Self::Ripple => 6,
            Self::Splash => 4,
            Self::GroundImpactDust => 4,
            _ => 0,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::TallGrass => "tall_grass",
            Self::LongGrass => "long_grass",
            Self::SandFootprints => "sand_footprints",
            Self::DeepSandFootprints => "deep_sand_footprints",
            Self::BikeTireTracks => "bike_tire_tracks",
            Self::Splash => "splash",
            Self::Ripple => "ripple",
            Self::Ash => "ash",
            Self::AshPuff => "ash_puff",
            Self::AshLaunch => "ash_launch",
            Self::GroundImpactDust => "ground_impact_dust",
            Self::SmallSparkle => "small_sparkle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AnimationStep {
    pub frame: u16,
    pub duration_ticks: u16,
    #[serde(default)]
    pub h_flip: bool,
    #[serde(default)]
    pub v_flip: bool,
}

impl AnimationStep {
    const fn plain(frame: u16, duration_ticks: u16) -> Self {
        Self {
            frame,
            duration_ticks,
            h_flip: false,
            v_flip: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EffectMetadata {
    pub width_px: u32,
    pub height_px: u32,
    pub animation: Vec<AnimationStep>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read effect registry '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse effect registry json: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("registry entry '{}' has an empty animation sequence", .0.as_token())]
    EmptyAnimation(EffectKind),
}

/// Read-only map from effect kind to sprite metadata. Built once at startup
/// and shared into the lifecycle engine; never reloaded in-core.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRegistry {
    by_kind: HashMap<EffectKind, EffectMetadata>,
}

impl EffectRegistry {
    /// The reference animation tables. Frame/duration pairs are carried over
    /// digit-for-digit from the hardware data; retiming them shifts every
    /// visual in the field layer.
    pub fn builtin() -> Self {
        let mut by_kind = HashMap::new();

        by_kind.insert(
            EffectKind::TallGrass,
            metadata(
                16,
                16,
                &[(1, 10), (2, 10), (3, 10), (4, 10), (0, 10)],
            ),
        );
        by_kind.insert(
            EffectKind::LongGrass,
            metadata(
                16,
                16,
                &[(1, 3), (2, 3), (0, 4), (3, 4), (0, 4), (3, 4), (0, 4)],
            ),
        );
        by_kind.insert(EffectKind::Splash, metadata(16, 8, &[(0, 4), (1, 4)]));
        by_kind.insert(
            EffectKind::Ripple,
            metadata(
                16,
                16,
                &[
                    (0, 12),
                    (1, 9),
                    (2, 9),
                    (3, 9),
                    (0, 9),
                    (1, 9),
                    (2, 11),
                    (4, 11),
                ],
            ),
        );
        by_kind.insert(
            EffectKind::Ash,
            metadata(16, 16, &[(0, 12), (1, 12), (2, 8), (3, 12), (4, 12)]),
        );
        by_kind.insert(
            EffectKind::AshPuff,
            metadata(16, 16, &[(0, 6), (1, 6), (2, 6), (3, 6), (4, 6)]),
        );
        by_kind.insert(
            EffectKind::AshLaunch,
            metadata(16, 16, &[(0, 6), (1, 6), (2, 6), (3, 6), (4, 6)]),
        );
        by_kind.insert(
            EffectKind::GroundImpactDust,
            metadata(16, 8, &[(0, 8), (1, 8), (2, 8)]),
        );
        by_kind.insert(
            EffectKind::SmallSparkle,
            metadata(16, 16, &[(0, 3), (1, 5), (0, 5)]),
        );

        // Track kinds never walk their animation list; the single step only
        // records the sprite sheet shape.
        by_kind.insert(EffectKind::SandFootprints, metadata(16, 16, &[(0, 1)]));
        by_kind.insert(EffectKind::DeepSandFootprints, metadata(16, 16, &[(0, 1)]));
        by_kind.insert(EffectKind::BikeTireTracks, metadata(16, 16, &[(2, 1)]));

        Self { by_kind }
    }

    /// Overlay entries parsed from json onto the builtin tables, so a data
    /// file only needs to carry the kinds it retunes.
    pub fn from_json_str(raw: &str) -> Result<Self, RegistryError> {
        let overrides: HashMap<EffectKind, EffectMetadata> =
            serde_json::from_str(raw).map_err(RegistryError::Parse)?;

        let mut registry = Self::builtin();
        for (kind, entry) in overrides {
            if entry.animation.is_empty() {
                return Err(RegistryError::EmptyAnimation(kind));
            }
            registry.by_kind.insert(kind, entry);
        }
        Ok(registry)
    }

    /// Build a registry from explicit entries, for embedders that curate
    /// their own kind set instead of starting from the builtin tables.
    pub fn from_entries<I>(entries: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (EffectKind, EffectMetadata)>,
    {
        let mut by_kind = HashMap::new();
        for (kind, entry) in entries {
            if entry.animation.is_empty() {
                return Err(RegistryError::EmptyAnimation(kind));
            }
            by_kind.insert(kind, entry);
        }
        Ok(Self { by_kind })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path).map_err(|source| RegistryError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn metadata(&self, kind: EffectKind) -> Option<&EffectMetadata> {
        self.by_kind.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

fn metadata(width_px: u32, height_px: u32, steps: &[(u16, u16)]) -> EffectMetadata {
    EffectMetadata {
        width_px,
        height_px,
        animation: steps
            .iter()
            .map(|&(frame, duration_ticks)| AnimationStep::plain(frame, duration_ticks))
            .collect(),
    }
}
