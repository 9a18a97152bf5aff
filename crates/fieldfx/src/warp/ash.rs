use tracing::debug;

use crate::coords::{Direction, TilePos};
use crate::effect::{FieldEffectEngine, OwnerId};
use crate::registry::EffectKind;
use crate::warp::{clamp01, shake_sign, CameraRig, WarpActor};

const B1F_PRE_SHAKE_DURATION_MS: f64 = 180.0;
const B1F_PRE_RISE_DURATION_MS: f64 = 420.0;
const ONE_F_PRE_SHUFFLE_DURATION_MS: f64 = 360.0;
const B1F_POST_RISE_DURATION_MS: f64 = 420.0;
/// Watchdog on the forced arrival step so input can never stay locked.
const B1F_POST_JUMP_TIMEOUT_MS: f64 = 700.0;
const SHAKE_INTENSITY_PX: f32 = 2.0;
const PRE_SHAKE_PERIOD_MS: f64 = 45.0;
const PRE_RISE_PERIOD_MS: f64 = 50.0;
const SHUFFLE_PERIOD_MS: f64 = 50.0;
const POST_RISE_PERIOD_MS: f64 = 55.0;
/// Progress threshold where the ground-floor shuffle kicks up its ash puff.
const SHUFFLE_EFFECT_PROGRESS: f64 = 0.55;
/// Basement departure launches the sprite this far upward before the fade.
const RISE_LAUNCH_HEIGHT_PX: f32 = 20.0;
/// Arrival pops the sprite up out of the ash tile from this depth.
const POST_RISE_POP_HEIGHT_PX: f32 = 16.0;
const POST_JUMP_DIRECTION: Direction = Direction::Right;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AshStage {
    Idle,
    B1fPreShake,
    B1fPreRise,
    OneFPreShuffle,
    B1fPostRise,
    B1fPostJump,
}

/// Gym ash warp choreography. One state container serves both departure
/// entry points (basement pop-out, ground-floor shuffle) and the basement
/// arrival; the caller performs the actual map transition when
/// `on_execute_warp` fires.
pub struct AshWarpSequencer {
    stage: AshStage,
    stage_start_ms: f64,
    stage_duration_ms: f64,
    tile: TilePos,
    behavior: u16,
    effect_spawned: bool,
    jump_started: bool,
}

impl Default for AshWarpSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl AshWarpSequencer {
    pub fn new() -> Self {
        Self {
            stage: AshStage::Idle,
            stage_start_ms: 0.0,
            stage_duration_ms: 0.0,
            tile: TilePos::new(0, 0),
            behavior: 0,
            effect_spawned: false,
            jump_started: false,
        }
    }

    /// Basement departure: shake, launch upward on an ash burst, then warp.
    pub fn start_b1f_warp_out(&mut self, tile: TilePos, behavior: u16, now_ms: f64) {
        self.arm(AshStage::B1fPreShake, B1F_PRE_SHAKE_DURATION_MS, tile, behavior, now_ms);
    }

    /// Ground-floor departure: sideways shuffle into the ash pile, then warp.
    pub fn start_1f_warp_out(&mut self, tile: TilePos, behavior: u16, now_ms: f64) {
        self.arm(
            AshStage::OneFPreShuffle,
            ONE_F_PRE_SHUFFLE_DURATION_MS,
            tile,
            behavior,
            now_ms,
        );
    }

    /// Basement arrival: rise out of the ash tile, then hop clear.
    pub fn start_b1f_arrival(&mut self, tile: TilePos, behavior: u16, now_ms: f64) {
        self.arm(AshStage::B1fPostRise, B1F_POST_RISE_DURATION_MS, tile, behavior, now_ms);
    }

    fn arm(&mut self, stage: AshStage, duration_ms: f64, tile: TilePos, behavior: u16, now_ms: f64) {
        // Starting while active is a hard restart; a single authoritative
        // caller drives this machine and must never deadlock the scene.
        *self = Self::new();
        self.stage = stage;
        self.stage_start_ms = now_ms;
        self.stage_duration_ms = duration_ms;
        self.tile = tile;
        self.behavior = behavior;
        debug!(stage = ?stage, tile_x = tile.x, tile_y = tile.y, "ash_warp_started");
    }

    pub fn stage(&self) -> AshStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != AshStage::Idle
    }

    pub fn target_tile(&self) -> TilePos {
        self.tile
    }

    /// Metatile behavior code the triggering tile carried, echoed back to
    /// arrival callers.
    pub fn behavior(&self) -> u16 {
        self.behavior
    }

    /// Abort from any stage, zeroing every visible side effect.
    pub fn reset(&mut self, actor: &mut dyn WarpActor, camera: &mut dyn CameraRig) {
        actor.set_sprite_y_offset(0.0);
        camera.reset_panning();
        *self = Self::new();
    }

    pub fn update(
        &mut self,
        now_ms: f64,
        actor: &mut dyn WarpActor,
        camera: &mut dyn CameraRig,
        effects: &mut FieldEffectEngine,
        on_execute_warp: &mut dyn FnMut(),
    ) {
        if self.stage == AshStage::Idle {
            return;
        }

        let elapsed_ms = now_ms - self.stage_start_ms;
        let progress = clamp01(elapsed_ms / self.stage_duration_ms);

        match self.stage {
            AshStage::Idle => {}
            AshStage::B1fPreShake => {
                camera.set_panning(0.0, shake_sign(elapsed_ms, PRE_SHAKE_PERIOD_MS) * SHAKE_INTENSITY_PX);
                actor.set_sprite_y_offset(0.0);

                if progress >= 1.0 {
                    if !self.effect_spawned {
                        effects.create(self.tile, EffectKind::AshLaunch, false, OwnerId::Player, None);
                        self.effect_spawned = true;
                    }
                    self.stage = AshStage::B1fPreRise;
                    self.stage_start_ms = now_ms;
                    self.stage_duration_ms = B1F_PRE_RISE_DURATION_MS;
                    debug!(stage = "b1f_pre_rise", "ash_warp_stage");
                }
            }
            AshStage::B1fPreRise => {
                let intensity = (1.0 - progress).max(0.0) as f32;
                camera.set_panning(
                    0.0,
                    shake_sign(elapsed_ms, PRE_RISE_PERIOD_MS) * SHAKE_INTENSITY_PX * intensity,
                );
                actor.set_sprite_y_offset(-(progress as f32 * RISE_LAUNCH_HEIGHT_PX));

                if progress >= 1.0 {
                    camera.reset_panning();
                    actor.set_sprite_y_offset(0.0);
                    *self = Self::new();
                    on_execute_warp();
                }
            }
            AshStage::OneFPreShuffle => {
                camera.set_panning(shake_sign(elapsed_ms, SHUFFLE_PERIOD_MS), 0.0);
                actor.set_sprite_y_offset(0.0);

                if !self.effect_spawned && progress >= SHUFFLE_EFFECT_PROGRESS {
                    effects.create(self.tile, EffectKind::AshPuff, false, OwnerId::Player, None);
                    self.effect_spawned = true;
                }

                if progress >= 1.0 {
                    camera.reset_panning();
                    *self = Self::new();
                    on_execute_warp();
                }
            }
            AshStage::B1fPostRise => {
                let intensity = (1.0 - progress).max(0.0) as f32;
                camera.set_panning(
                    0.0,
                    shake_sign(elapsed_ms, POST_RISE_PERIOD_MS) * SHAKE_INTENSITY_PX * intensity,
                );

                if !self.effect_spawned {
                    effects.create(self.tile, EffectKind::AshPuff, false, OwnerId::Player, None);
                    self.effect_spawned = true;
                }

                actor.set_sprite_y_offset(POST_RISE_POP_HEIGHT_PX - progress as f32 * POST_RISE_POP_HEIGHT_PX);

                if progress >= 1.0 {
                    camera.reset_panning();
                    actor.set_sprite_y_offset(0.0);
                    self.stage = AshStage::B1fPostJump;
                    self.stage_start_ms = now_ms;
                    self.stage_duration_ms = B1F_POST_JUMP_TIMEOUT_MS;
                    debug!(stage = "b1f_post_jump", "ash_warp_stage");
                }
            }
            AshStage::B1fPostJump => {
                if !self.jump_started {
                    self.jump_started = true;
                    actor.force_step(POST_JUMP_DIRECTION);
                }

                let timed_out = elapsed_ms >= self.stage_duration_ms;
                if !actor.is_moving() || timed_out {
                    actor.set_sprite_y_offset(0.0);
                    *self = Self::new();
                    actor.unlock_input();
                    debug!(timed_out, "ash_warp_arrival_complete");
                }
            }
        }
    }
}
