use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coords::{ticks_from_millis, Direction, TilePos};
use crate::registry::{EffectKind, EffectMetadata, EffectRegistry};

/// Ticks a track stays fully visible before it starts to flicker.
const TRACK_SOLID_TICKS: f64 = 40.0;
/// Ticks after which a track expires outright.
const TRACK_EXPIRE_TICKS: f64 = 56.0;
/// The closed/idle frame a grass overlay settles into.
const GRASS_RESTING_FRAME: u16 = 0;
/// Tall grass at its opening frame gets a small subpriority penalty so the
/// first burst draws under the owner's sprite.
const TALL_GRASS_OPENING_FRAME: u16 = 1;
const TALL_GRASS_OPENING_BIAS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NpcId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerId {
    Player,
    Npc(NpcId),
}

/// Per-tick view of an owner's movement state. Supplied by the caller on
/// every reap; the engine never retains one across ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwnerSnapshot {
    pub tile: TilePos,
    pub destination_tile: TilePos,
    pub previous_tile: TilePos,
    pub facing: Direction,
    pub is_moving: bool,
    pub is_jumping: bool,
}

impl OwnerSnapshot {
    pub fn at_rest(tile: TilePos, facing: Direction) -> Self {
        Self {
            tile,
            destination_tile: tile,
            previous_tile: tile,
            facing,
            is_moving: false,
            is_jumping: false,
        }
    }

    pub fn with_destination(mut self, destination_tile: TilePos) -> Self {
        self.destination_tile = destination_tile;
        self
    }

    pub fn with_previous(mut self, previous_tile: TilePos) -> Self {
        self.previous_tile = previous_tile;
        self
    }

    pub fn with_moving(mut self, is_moving: bool) -> Self {
        self.is_moving = is_moving;
        self
    }

    pub fn with_jumping(mut self, is_jumping: bool) -> Self {
        self.is_jumping = is_jumping;
        self
    }
}

pub type OwnerSnapshots = HashMap<OwnerId, OwnerSnapshot>;

/// Read-only projection of one live effect, consumed by the batcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderableEffect {
    pub id: EffectId,
    pub kind: EffectKind,
    pub owner: OwnerId,
    pub world_x: f32,
    pub world_y: f32,
    pub frame: u16,
    pub visible: bool,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub render_behind_owner: bool,
    pub subpriority_bias: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectCounts {
    pub total: u32,
    pub grass: u32,
    pub tracks: u32,
    pub water: u32,
    pub ash: u32,
    pub other: u32,
}

impl EffectCounts {
    fn record(&mut self, kind: EffectKind) {
        self.total = self.total.saturating_add(1);
        if kind.is_grass() {
            self.grass = self.grass.saturating_add(1);
        } else if kind.is_track() {
            self.tracks = self.tracks.saturating_add(1);
        } else if kind.is_water() {
            self.water = self.water.saturating_add(1);
        } else if kind.is_ash_family() {
            self.ash = self.ash.saturating_add(1);
        } else {
            self.other = self.other.saturating_add(1);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct EffectInstance {
    id: EffectId,
    tile: TilePos,
    kind: EffectKind,
    owner: OwnerId,
    direction: Option<Direction>,
    sequence_index: usize,
    frame_ticks: f64,
    current_frame: u16,
    flip_horizontal: bool,
    flip_vertical: bool,
    skip_animation: bool,
    completed: bool,
    visible: bool,
    render_behind_owner: bool,
}

/// Owns every live field-effect instance: creation, fixed-tick advancement,
/// and reaping against per-owner movement snapshots.
pub struct FieldEffectEngine {
    registry: Arc<EffectRegistry>,
    effects: BTreeMap<EffectId, EffectInstance>,
    next_effect_id: u64,
}

impl FieldEffectEngine {
    pub fn new(registry: Arc<EffectRegistry>) -> Self {
        Self {
            registry,
            effects: BTreeMap::new(),
            next_effect_id: 0,
        }
    }

    /// Spawn a new effect at `tile`. Returns `None` (and logs) when the kind
    /// has no registry metadata; the caller proceeds without the visual.
    pub fn create(
        &mut self,
        tile: TilePos,
        kind: EffectKind,
        skip_animation: bool,
        owner: OwnerId,
        direction: Option<Direction>,
    ) -> Option<EffectId> {
        let Some(metadata) = self.registry.metadata(kind) else {
            warn!(kind = kind.as_token(), "effect_kind_unregistered");
            return None;
        };

        let id = EffectId(self.next_effect_id);
        self.next_effect_id = self.next_effect_id.saturating_add(1);

        let mut instance = EffectInstance {
            id,
            tile,
            kind,
            owner,
            direction,
            sequence_index: 0,
            frame_ticks: 0.0,
            current_frame: 0,
            flip_horizontal: false,
            flip_vertical: false,
            skip_animation,
            completed: false,
            visible: true,
            render_behind_owner: false,
        };

        if kind.is_track() {
            let facing = direction.unwrap_or(Direction::Down);
            let (frame, flip_horizontal, flip_vertical) = if kind == EffectKind::BikeTireTracks {
                tire_track_pose(facing)
            } else {
                footprint_pose(facing)
            };
            instance.current_frame = frame;
            instance.flip_horizontal = flip_horizontal;
            instance.flip_vertical = flip_vertical;
            // Skip-spawned tracks expire on the next reap instead of running
            // the tick window.
            instance.completed = skip_animation;
        } else if skip_animation {
            // Spawn-on-tile case: rest at the closed frame immediately.
            instance.current_frame = GRASS_RESTING_FRAME;
            instance.completed = true;
        } else if let Some(step) = metadata.animation.first() {
            instance.current_frame = step.frame;
            instance.flip_horizontal = step.h_flip;
            instance.flip_vertical = step.v_flip;
        } else {
            instance.current_frame = GRASS_RESTING_FRAME;
            instance.completed = true;
        }

        debug!(
            id = id.0,
            kind = kind.as_token(),
            tile_x = tile.x,
            tile_y = tile.y,
            skip_animation,
            "effect_created"
        );
        self.effects.insert(id, instance);
        Some(id)
    }

    pub fn advance_millis(&mut self, delta_ms: f64) {
        self.advance_ticks(ticks_from_millis(delta_ms));
    }

    /// Advance every live instance by `delta_ticks`. Deltas larger than one
    /// frame duration consume every crossed frame, so batched calls land in
    /// the same state as per-tick calls.
    pub fn advance_ticks(&mut self, delta_ticks: f64) {
        if delta_ticks <= 0.0 {
            return;
        }
        for instance in self.effects.values_mut() {
            if instance.completed || instance.skip_animation {
                continue;
            }
            let Some(metadata) = self.registry.metadata(instance.kind) else {
                continue;
            };
            advance_instance(instance, metadata, delta_ticks);
        }
    }

    /// Remove expired instances and refresh grass layering flags.
    ///
    /// Grass resting at its closed frame survives until its owner is off the
    /// tile and no longer reports it as the previous tile, so the grass
    /// closes behind the owner rather than vanishing underfoot. A jumping
    /// owner that already left the tile clears it immediately.
    pub fn reap(&mut self, owners: &OwnerSnapshots) {
        let mut reaped = Vec::new();

        for (id, instance) in &mut self.effects {
            let owner = owners.get(&instance.owner);

            if instance.kind.is_grass() {
                if let Some(owner) = owner {
                    let on_tile = owner.tile == instance.tile;
                    let moving_away_down = owner.is_moving
                        && owner.facing == Direction::Down
                        && owner.destination_tile != instance.tile;
                    if on_tile && moving_away_down {
                        instance.render_behind_owner = true;
                    } else if !on_tile && !owner.is_moving {
                        instance.render_behind_owner = false;
                    }
                }
            }

            if !instance.completed {
                continue;
            }

            if instance.kind.is_grass() && instance.current_frame == GRASS_RESTING_FRAME {
                let Some(owner) = owner else {
                    reaped.push(*id);
                    continue;
                };
                let on_tile = owner.tile == instance.tile;
                let was_on_tile = owner.previous_tile == instance.tile;
                if owner.is_jumping && was_on_tile && !on_tile {
                    // Mid-jump the sprite is already clear of the tile; a
                    // lingering resting frame would trail under the arc.
                    reaped.push(*id);
                    continue;
                }
                if on_tile {
                    continue;
                }
                if !was_on_tile {
                    reaped.push(*id);
                }
            } else {
                reaped.push(*id);
            }
        }

        if !reaped.is_empty() {
            debug!(count = reaped.len(), "effects_reaped");
        }
        for id in reaped {
            self.effects.remove(&id);
        }
    }

    /// Pure projection for the batcher; no mutation.
    pub fn for_rendering(&self) -> Vec<RenderableEffect> {
        self.effects
            .values()
            .map(|instance| {
                let center = instance.tile.world_center();
                let subpriority_bias = if instance.kind == EffectKind::TallGrass
                    && instance.current_frame == TALL_GRASS_OPENING_FRAME
                {
                    TALL_GRASS_OPENING_BIAS
                } else {
                    0
                };
                RenderableEffect {
                    id: instance.id,
                    kind: instance.kind,
                    owner: instance.owner,
                    world_x: center.x,
                    world_y: center.y,
                    frame: instance.current_frame,
                    visible: instance.visible,
                    flip_horizontal: instance.flip_horizontal,
                    flip_vertical: instance.flip_vertical,
                    render_behind_owner: instance.render_behind_owner,
                    subpriority_bias,
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn counts(&self) -> EffectCounts {
        let mut counts = EffectCounts::default();
        for instance in self.effects.values() {
            counts.record(instance.kind);
        }
        counts
    }
}

fn advance_instance(instance: &mut EffectInstance, metadata: &EffectMetadata, delta_ticks: f64) {
    instance.frame_ticks += delta_ticks;

    if instance.kind.is_track() {
        if instance.frame_ticks > TRACK_EXPIRE_TICKS {
            instance.completed = true;
        } else if instance.frame_ticks > TRACK_SOLID_TICKS {
            instance.visible = (instance.frame_ticks.floor() as i64) % 2 == 0;
        }
        return;
    }

    loop {
        let Some(step) = metadata.animation.get(instance.sequence_index) else {
            instance.completed = true;
            return;
        };
        let duration = f64::from(step.duration_ticks);
        if instance.frame_ticks < duration {
            return;
        }
        instance.frame_ticks -= duration;

        if instance.sequence_index + 1 < metadata.animation.len() {
            instance.sequence_index += 1;
            let next = metadata.animation[instance.sequence_index];
            instance.current_frame = next.frame;
            instance.flip_horizontal = next.h_flip;
            instance.flip_vertical = next.v_flip;
        } else {
            instance.completed = true;
            return;
        }
    }
}

/// Footprints keep one sprite per axis: frame 0 faces north, frame 1 faces
/// west; the opposite directions reuse them flipped.
fn footprint_pose(facing: Direction) -> (u16, bool, bool) {
    match facing {
        Direction::Up => (0, false, false),
        Direction::Down => (0, false, true),
        Direction::Left => (1, false, false),
        Direction::Right => (1, true, false),
    }
}

fn tire_track_pose(facing: Direction) -> (u16, bool, bool) {
    match facing {
        Direction::Up => (2, false, false),
        Direction::Down => (2, false, true),
        Direction::Left => (3, false, false),
        Direction::Right => (3, true, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FieldEffectEngine {
        FieldEffectEngine::new(Arc::new(EffectRegistry::builtin()))
    }

    fn player_at(tile: TilePos) -> OwnerSnapshots {
        let mut owners = OwnerSnapshots::new();
        owners.insert(
            OwnerId::Player,
            OwnerSnapshot::at_rest(tile, Direction::Down),
        );
        owners
    }

    fn frame_of(engine: &FieldEffectEngine, id: EffectId) -> u16 {
        engine
            .for_rendering()
            .iter()
            .find(|effect| effect.id == id)
            .expect("live effect")
            .frame
    }

    fn renderable(engine: &FieldEffectEngine, id: EffectId) -> RenderableEffect {
        *engine
            .for_rendering()
            .iter()
            .find(|effect| effect.id == id)
            .expect("live effect")
    }

    #[test]
    fn create_seeds_animated_kinds_from_the_first_step() {
        let mut engine = engine();
        let id = engine
            .create(
                TilePos::new(2, 3),
                EffectKind::TallGrass,
                false,
                OwnerId::Player,
                None,
            )
            .expect("created");
        assert_eq!(frame_of(&engine, id), 1);
    }

    #[test]
    fn skip_animation_rests_at_the_closed_frame() {
        let mut engine = engine();
        let id = engine
            .create(
                TilePos::new(2, 3),
                EffectKind::TallGrass,
                true,
                OwnerId::Player,
                None,
            )
            .expect("created");
        assert_eq!(frame_of(&engine, id), 0);
        // Resting grass stays alive while the owner is on the tile.
        engine.reap(&player_at(TilePos::new(2, 3)));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn batched_advancement_matches_per_tick_advancement() {
        let mut stepped = engine();
        let mut batched = engine();
        let tile = TilePos::new(0, 0);
        let a = stepped
            .create(tile, EffectKind::Ripple, false, OwnerId::Player, None)
            .expect("created");
        let b = batched
            .create(tile, EffectKind::Ripple, false, OwnerId::Player, None)
            .expect("created");

        for _ in 0..79 {
            stepped.advance_ticks(1.0);
        }
        batched.advance_ticks(79.0);
        assert_eq!(frame_of(&stepped, a), frame_of(&batched, b));

        // Both must now be complete and reapable.
        stepped.reap(&OwnerSnapshots::new());
        batched.reap(&OwnerSnapshots::new());
        assert!(stepped.is_empty());
        assert!(batched.is_empty());
    }

    #[test]
    fn track_schedule_is_solid_then_flicker_then_expired() {
        let mut engine = engine();
        let id = engine
            .create(
                TilePos::new(5, 5),
                EffectKind::SandFootprints,
                false,
                OwnerId::Player,
                Some(Direction::Up),
            )
            .expect("created");

        engine.advance_ticks(40.0);
        assert!(renderable(&engine, id).visible);

        engine.advance_ticks(2.0);
        let flickering = renderable(&engine, id);
        assert_eq!(flickering.visible, (42f64.floor() as i64) % 2 == 0);

        engine.advance_ticks(15.0);
        engine.reap(&OwnerSnapshots::new());
        assert!(engine.is_empty());
    }

    #[test]
    fn track_schedule_is_batching_independent() {
        let mut stepped = engine();
        let mut batched = engine();
        let tile = TilePos::new(1, 1);
        let a = stepped
            .create(
                tile,
                EffectKind::BikeTireTracks,
                false,
                OwnerId::Player,
                Some(Direction::Left),
            )
            .expect("created");
        let b = batched
            .create(
                tile,
                EffectKind::BikeTireTracks,
                false,
                OwnerId::Player,
                Some(Direction::Left),
            )
            .expect("created");

        for _ in 0..45 {
            stepped.advance_ticks(1.0);
        }
        batched.advance_ticks(45.0);
        assert_eq!(
            renderable(&stepped, a).visible,
            renderable(&batched, b).visible
        );

        stepped.advance_ticks(12.0);
        batched.advance_ticks(12.0);
        stepped.reap(&OwnerSnapshots::new());
        batched.reap(&OwnerSnapshots::new());
        assert!(stepped.is_empty());
        assert!(batched.is_empty());
    }

    #[test]
    fn footprints_derive_frame_and_flip_from_direction() {
        let mut engine = engine();
        let tile = TilePos::new(0, 0);
        let north = engine
            .create(
                tile,
                EffectKind::SandFootprints,
                false,
                OwnerId::Player,
                Some(Direction::Up),
            )
            .expect("created");
        let south = engine
            .create(
                tile,
                EffectKind::SandFootprints,
                false,
                OwnerId::Player,
                Some(Direction::Down),
            )
            .expect("created");
        let east = engine
            .create(
                tile,
                EffectKind::SandFootprints,
                false,
                OwnerId::Player,
                Some(Direction::Right),
            )
            .expect("created");

        let north = renderable(&engine, north);
        assert_eq!((north.frame, north.flip_horizontal, north.flip_vertical), (0, false, false));
        let south = renderable(&engine, south);
        assert_eq!((south.frame, south.flip_horizontal, south.flip_vertical), (0, false, true));
        let east = renderable(&engine, east);
        assert_eq!((east.frame, east.flip_horizontal, east.flip_vertical), (1, true, false));
    }

    #[test]
    fn grass_persists_until_owner_leaves_tile_and_previous_tile() {
        let mut engine = engine();
        let grass_tile = TilePos::new(4, 4);
        let id = engine
            .create(grass_tile, EffectKind::TallGrass, false, OwnerId::Player, None)
            .expect("created");
        engine.advance_ticks(50.0);

        // Owner still on the tile: keep.
        engine.reap(&player_at(grass_tile));
        assert_eq!(engine.len(), 1);

        // Owner one tile south but grass is still the previous tile: keep.
        let mut owners = OwnerSnapshots::new();
        owners.insert(
            OwnerId::Player,
            OwnerSnapshot::at_rest(TilePos::new(4, 5), Direction::Down)
                .with_previous(grass_tile),
        );
        engine.reap(&owners);
        assert_eq!(engine.len(), 1);

        // Fully departed: reaped.
        engine.reap(&player_at(TilePos::new(4, 6)));
        assert!(engine.is_empty());
        let _ = id;
    }

    #[test]
    fn jumping_owner_clears_resting_grass_immediately() {
        let mut engine = engine();
        let grass_tile = TilePos::new(7, 7);
        engine
            .create(grass_tile, EffectKind::TallGrass, true, OwnerId::Player, None)
            .expect("created");

        let mut owners = OwnerSnapshots::new();
        owners.insert(
            OwnerId::Player,
            OwnerSnapshot::at_rest(TilePos::new(7, 9), Direction::Down)
                .with_previous(grass_tile)
                .with_jumping(true),
        );
        engine.reap(&owners);
        assert!(engine.is_empty());
    }

    #[test]
    fn grass_renders_behind_owner_while_moving_down_off_the_tile() {
        let mut engine = engine();
        let grass_tile = TilePos::new(3, 3);
        let id = engine
            .create(grass_tile, EffectKind::TallGrass, false, OwnerId::Player, None)
            .expect("created");

        let mut owners = OwnerSnapshots::new();
        owners.insert(
            OwnerId::Player,
            OwnerSnapshot::at_rest(grass_tile, Direction::Down)
                .with_destination(TilePos::new(3, 4))
                .with_moving(true),
        );
        engine.reap(&owners);
        assert!(renderable(&engine, id).render_behind_owner);

        // Stopped off the tile: flag resets.
        engine.reap(&player_at(TilePos::new(3, 5)));
        let live: Vec<_> = engine.for_rendering();
        if let Some(effect) = live.iter().find(|effect| effect.id == id) {
            assert!(!effect.render_behind_owner);
        }
    }

    #[test]
    fn completed_non_grass_effects_are_reaped_unconditionally() {
        let mut engine = engine();
        engine
            .create(
                TilePos::new(0, 0),
                EffectKind::Splash,
                false,
                OwnerId::Player,
                None,
            )
            .expect("created");
        engine.advance_ticks(8.0);
        engine.reap(&player_at(TilePos::new(0, 0)));
        assert!(engine.is_empty());
    }

    #[test]
    fn unregistered_kind_soft_fails_without_creating() {
        let sparse = EffectRegistry::from_entries([(
            EffectKind::Splash,
            EffectMetadata {
                width_px: 16,
                height_px: 8,
                animation: vec![crate::registry::AnimationStep {
                    frame: 0,
                    duration_ticks: 4,
                    h_flip: false,
                    v_flip: false,
                }],
            },
        )])
        .expect("registry");
        let mut engine = FieldEffectEngine::new(Arc::new(sparse));

        let missing = engine.create(
            TilePos::new(0, 0),
            EffectKind::TallGrass,
            false,
            OwnerId::Player,
            None,
        );
        assert!(missing.is_none());
        assert!(engine.is_empty());

        let present = engine.create(
            TilePos::new(0, 0),
            EffectKind::Splash,
            false,
            OwnerId::Player,
            None,
        );
        assert!(present.is_some());
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn counts_bucket_effects_by_family() {
        let mut engine = engine();
        let tile = TilePos::new(0, 0);
        engine
            .create(tile, EffectKind::TallGrass, false, OwnerId::Player, None)
            .expect("created");
        engine
            .create(
                tile,
                EffectKind::SandFootprints,
                false,
                OwnerId::Player,
                Some(Direction::Up),
            )
            .expect("created");
        engine
            .create(tile, EffectKind::AshPuff, false, OwnerId::Player, None)
            .expect("created");

        let counts = engine.counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.grass, 1);
        assert_eq!(counts.tracks, 1);
        assert_eq!(counts.ash, 1);
    }

    #[test]
    fn clear_removes_everything() {
        let mut engine = engine();
        engine
            .create(
                TilePos::new(0, 0),
                EffectKind::Ripple,
                false,
                OwnerId::Player,
                None,
            )
            .expect("created");
        engine.clear();
        assert!(engine.is_empty());
        assert!(engine.for_rendering().is_empty());
    }

    #[test]
    fn npc_owned_effects_reap_against_their_own_snapshot() {
        let mut engine = engine();
        let npc = OwnerId::Npc(NpcId(7));
        let grass_tile = TilePos::new(9, 9);
        engine
            .create(grass_tile, EffectKind::TallGrass, true, npc, None)
            .expect("created");

        // Player snapshot alone says nothing about the NPC: the grass only
        // falls back to removal when its owner is missing from the set.
        engine.reap(&player_at(TilePos::new(0, 0)));
        assert!(engine.is_empty());

        let id = engine
            .create(grass_tile, EffectKind::TallGrass, true, npc, None)
            .expect("created");
        let mut owners = player_at(TilePos::new(0, 0));
        owners.insert(npc, OwnerSnapshot::at_rest(grass_tile, Direction::Up));
        engine.reap(&owners);
        assert_eq!(engine.len(), 1);
        let _ = id;
    }
}
