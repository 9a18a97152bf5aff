use tracing::debug;

use crate::coords::MS_PER_TICK;
use crate::effect::{FieldEffectEngine, OwnerId, OwnerSnapshots};
use crate::registry::EffectKind;
use crate::warp::{CameraRig, FadeDirection, FadeOracle, WarpActor};

/// Starting per-tick fall speed in pixels.
const INITIAL_FALL_OFFSET: i32 = 1;
/// The fall speed doubles while the accumulated fall has low bits set,
/// capping at 8 px per tick.
const MAX_FALL_OFFSET: i32 = 8;
const FALL_DOUBLING_MASK: i32 = 0xf;
/// One-shot "about to land" trigger fires inside the final 16 px.
const ABOUT_TO_LAND_OFFSET: f32 = -16.0;
/// Starting vertical shake magnitude after touchdown.
const INITIAL_VERT_SHAKE: i32 = 4;
/// Effect-engine deltas are clamped so a stalled frame cannot dump a huge
/// batch of ticks into the animation cursors.
const MAX_EFFECT_DELTA_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallStage {
    Idle,
    WaitFadeIn,
    StartFall,
    Fall,
    CameraShake,
}

/// Completion hooks for callers that need side effects at stage boundaries.
/// Tests and pull-style callers can poll `stage()` instead.
#[derive(Default)]
pub struct FallCallbacks {
    pub on_start_fall: Option<Box<dyn FnMut()>>,
    pub on_land: Option<Box<dyn FnMut()>>,
    pub on_complete: Option<Box<dyn FnMut()>>,
}

/// Drop-in arrival choreography: the owner's sprite starts above the
/// viewport, accelerates downward, lands with an impact-dust effect, and the
/// camera shakes itself back to rest.
pub struct FallArrivalSequencer {
    stage: FallStage,
    fall_offset: i32,
    total_fall: i32,
    about_to_land: bool,
    vert_shake: i32,
    shake_count: u32,
    last_update_ms: Option<f64>,
    tick_carry: f64,
    callbacks: FallCallbacks,
}

impl Default for FallArrivalSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl FallArrivalSequencer {
    pub fn new() -> Self {
        Self {
            stage: FallStage::Idle,
            fall_offset: INITIAL_FALL_OFFSET,
            total_fall: 0,
            about_to_land: false,
            vert_shake: INITIAL_VERT_SHAKE,
            shake_count: 0,
            last_update_ms: None,
            tick_carry: 0.0,
            callbacks: FallCallbacks::default(),
        }
    }

    /// Arm the sequencer. Starting while active is a hard restart; the old
    /// state is discarded so a scene can never deadlock on a stale run.
    pub fn start(&mut self, callbacks: FallCallbacks) {
        *self = Self::new();
        self.stage = FallStage::WaitFadeIn;
        self.callbacks = callbacks;
        debug!(stage = "wait_fade_in", "fall_warp_started");
    }

    pub fn stage(&self) -> FallStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != FallStage::Idle
    }

    /// True once the sprite has entered the final 16 px of the drop.
    pub fn about_to_land(&self) -> bool {
        self.about_to_land
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
        fade: &dyn FadeOracle,
    ) {
        if self.stage == FallStage::Idle {
            return;
        }

        let elapsed_ticks = self.drive_effects(now_ms, actor, effects);

        match self.stage {
            FallStage::Idle => {}
            FallStage::WaitFadeIn => {
                if fade.direction() == Some(FadeDirection::In) && fade.is_complete(now_ms) {
                    self.stage = FallStage::StartFall;
                }
            }
            FallStage::StartFall => {
                let camera_pos = camera.position();
                let frame = actor.frame_info();
                let screen_top = frame.top_world_y - camera_pos.y;
                // Park the sprite fully above the viewport before the drop.
                actor.set_sprite_y_offset(-(screen_top + frame.height_px));
                self.fall_offset = INITIAL_FALL_OFFSET;
                self.total_fall = 0;
                self.about_to_land = false;
                if let Some(callback) = self.callbacks.on_start_fall.as_mut() {
                    callback();
                }
                self.stage = FallStage::Fall;
                debug!(stage = "fall", "fall_warp_stage");
            }
            FallStage::Fall => {
                for _ in 0..elapsed_ticks {
                    self.step_fall(actor, camera, effects);
                    if self.stage != FallStage::Fall {
                        break;
                    }
                }
            }
            FallStage::CameraShake => {
                for _ in 0..elapsed_ticks {
                    self.step_shake(actor, camera);
                    if self.stage != FallStage::CameraShake {
                        break;
                    }
                }
            }
        }
    }

    /// Advance/reap the effect engine with the wall-clock delta and bank
    /// whole logical ticks for the motion stages.
    fn drive_effects(
        &mut self,
        now_ms: f64,
        actor: &dyn WarpActor,
        effects: &mut FieldEffectEngine,
    ) -> u32 {
        let previous = self.last_update_ms.replace(now_ms);
        let Some(previous) = previous else {
            return 0;
        };

        let delta_ms = (now_ms - previous).clamp(0.0, MAX_EFFECT_DELTA_MS);
        if delta_ms > 0.0 {
            effects.advance_millis(delta_ms);
        }

        let mut owners = OwnerSnapshots::new();
        owners.insert(OwnerId::Player, actor.owner_snapshot());
        effects.reap(&owners);

        self.tick_carry += delta_ms / MS_PER_TICK;
        let whole = self.tick_carry.floor();
        self.tick_carry -= whole;
        whole as u32
    }

    fn step_fall(
        &mut self,
        actor: &mut dyn WarpActor,
        camera: &mut dyn CameraRig,
        effects: &mut FieldEffectEngine,
    ) {
        let mut offset = actor.sprite_y_offset();
        offset += self.fall_offset as f32;

        if self.fall_offset < MAX_FALL_OFFSET {
            self.total_fall += self.fall_offset;
            if self.total_fall & FALL_DOUBLING_MASK != 0 {
                self.fall_offset <<= 1;
            }
        }

        if !self.about_to_land && offset >= ABOUT_TO_LAND_OFFSET {
            self.about_to_land = true;
        }

        if offset >= 0.0 {
            actor.set_sprite_y_offset(0.0);
            effects.create(
                actor.tile(),
                EffectKind::GroundImpactDust,
                false,
                OwnerId::Player,
                None,
            );
            if let Some(callback) = self.callbacks.on_land.as_mut() {
                callback();
            }
            self.vert_shake = INITIAL_VERT_SHAKE;
            self.shake_count = 0;
            camera.set_panning(0.0, 0.0);
            self.stage = FallStage::CameraShake;
            debug!(stage = "camera_shake", "fall_warp_stage");
        } else {
            actor.set_sprite_y_offset(offset);
        }
    }

    fn step_shake(&mut self, actor: &mut dyn WarpActor, camera: &mut dyn CameraRig) {
        camera.set_panning(0.0, self.vert_shake as f32);
        self.vert_shake = -self.vert_shake;
        self.shake_count = self.shake_count.saturating_add(1);

        if self.shake_count % 4 == 0 {
            // Arithmetic shift so the magnitude converges to zero from
            // either sign.
            self.vert_shake >>= 1;
        }

        if self.vert_shake == 0 {
            camera.reset_panning();
            actor.set_sprite_y_offset(0.0);
            if let Some(callback) = self.callbacks.on_complete.as_mut() {
                callback();
            }
            *self = Self::new();
            debug!("fall_warp_complete");
        }
    }
}
