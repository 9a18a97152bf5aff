//! Tick-driven field-effect layer for a 2D tile overworld.
//!
//! The crate owns three things and nothing else: the lifecycle of short-lived
//! animated overlays (grass rustle, footprints, ripples, ash), the canonical
//! sort-key/layer rules that both effects and character sprites obey, and the
//! scripted warp sequencers that couple those effects to camera shake and
//! sprite offsets. Asset loading, map streaming, input, and actual drawing
//! live with the embedder; this crate consumes owner snapshots plus camera
//! and fade handles, and produces ordered draw primitives.

pub mod batch;
pub mod coords;
pub mod effect;
pub mod layer;
pub mod registry;
pub mod warp;

pub use batch::{
    build_sprite_batch, DrawKind, DrawSprite, NpcView, PlayerView, RenderLayer, SpriteBatch,
};
pub use coords::{
    ticks_from_millis, Direction, TilePos, Vec2, METATILE_SIZE, MS_PER_TICK,
};
pub use effect::{
    EffectCounts, EffectId, FieldEffectEngine, NpcId, OwnerId, OwnerSnapshot, OwnerSnapshots,
    RenderableEffect,
};
pub use layer::{
    layer_of, sort_key, Layer, SortKey, EFFECT_BEHIND_SUBPRIORITY, EFFECT_FRONT_SUBPRIORITY,
    SPRITE_SUBPRIORITY,
};
pub use registry::{AnimationStep, EffectKind, EffectMetadata, EffectRegistry, RegistryError};
pub use warp::{
    AshStage, AshWarpSequencer, CameraRig, FadeDirection, FadeOracle, FallArrivalSequencer,
    FallCallbacks, FallStage, SpriteFrameInfo, WarpActor,
};
