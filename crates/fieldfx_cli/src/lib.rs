//! Headless scenario driver for the field-effect core.
//!
//! Feeds a scripted scenario (player walk, effect spawns, warp triggers)
//! through the engine at the fixed logical tick and reports the ordered draw
//! list per sampled tick, so effect timing and depth sorting can be eyeballed
//! or diffed without a renderer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fieldfx::{
    build_sprite_batch, AshWarpSequencer, CameraRig, Direction, EffectKind, EffectRegistry,
    FadeDirection, FadeOracle, FallArrivalSequencer, FallCallbacks, FieldEffectEngine, Layer,
    NpcId, NpcView, OwnerId, OwnerSnapshot, OwnerSnapshots, PlayerView, RenderLayer,
    SpriteFrameInfo, TilePos, Vec2, WarpActor, METATILE_SIZE, MS_PER_TICK,
};

/// Walking pace: one tile per sixteen ticks.
const MOVE_DURATION_TICKS: u32 = 16;
const PLAYER_SPRITE_HEIGHT_PX: f32 = 32.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    pub player_tile: TilePos,
    #[serde(default)]
    pub npcs: Vec<ScenarioNpc>,
    pub ticks: u64,
    #[serde(default = "default_sample_every")]
    pub sample_every: u64,
    /// When the scripted fade-in finishes, in ms from scenario start.
    #[serde(default)]
    pub fade_in_complete_ms: f64,
    /// Tiles that sprout tall grass when the player arrives on them.
    #[serde(default)]
    pub grass_tiles: Vec<TilePos>,
    /// Tiles that leave sand footprints when the player steps off them.
    #[serde(default)]
    pub sand_tiles: Vec<TilePos>,
    #[serde(default)]
    pub commands: Vec<ScenarioCommand>,
}

fn default_sample_every() -> u64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScenarioNpc {
    pub id: u32,
    pub tile: TilePos,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioCommand {
    pub at_tick: u64,
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioAction {
    SpawnEffect {
        tile: TilePos,
        kind: EffectKind,
        #[serde(default)]
        skip_animation: bool,
        #[serde(default)]
        npc_owner: Option<u32>,
        #[serde(default)]
        direction: Option<Direction>,
    },
    MovePlayer {
        direction: Direction,
    },
    StartFallWarp,
    StartAshWarpOut {
        basement: bool,
    },
    StartAshArrival,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawEntry {
    pub kind: String,
    pub sort_key: i64,
    pub world_x: f32,
    pub world_y: f32,
    pub frame: u16,
    pub layer: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSample {
    pub tick: u64,
    pub live_effects: u32,
    pub camera_pan: (f32, f32),
    pub player_sprite_y_offset: f32,
    pub draws: Vec<DrawEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks_run: u64,
    pub effects_spawned_peak: u32,
    pub warp_executions: u32,
}

struct HarnessPlayer {
    tile: TilePos,
    previous_tile: TilePos,
    destination_tile: TilePos,
    facing: Direction,
    move_ticks_left: u32,
    sprite_y_offset: f32,
    input_locked: bool,
    hidden: bool,
}

impl HarnessPlayer {
    fn new(tile: TilePos) -> Self {
        Self {
            tile,
            previous_tile: tile,
            destination_tile: tile,
            facing: Direction::Down,
            move_ticks_left: 0,
            sprite_y_offset: 0.0,
            input_locked: false,
            hidden: false,
        }
    }

    fn begin_step(&mut self, direction: Direction) {
        if self.move_ticks_left > 0 {
            return;
        }
        self.facing = direction;
        self.destination_tile = direction.step_from(self.tile);
        self.move_ticks_left = MOVE_DURATION_TICKS;
    }

    /// Advance one tick of movement; returns the departed tile when a step
    /// completes this tick.
    fn advance_movement(&mut self) -> Option<TilePos> {
        if self.move_ticks_left == 0 {
            return None;
        }
        self.move_ticks_left -= 1;
        if self.move_ticks_left > 0 {
            return None;
        }
        let departed = self.tile;
        self.previous_tile = self.tile;
        self.tile = self.destination_tile;
        Some(departed)
    }

    fn feet_world_y(&self) -> f32 {
        ((self.tile.y + 1) * METATILE_SIZE) as f32
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            world_x: self.tile.world_center().x,
            feet_world_y: self.feet_world_y(),
            center_world_y: self.feet_world_y() - 8.0,
            hidden: self.hidden,
            show_shadow: false,
        }
    }
}

impl WarpActor for HarnessPlayer {
    fn tile(&self) -> TilePos {
        self.tile
    }

    fn frame_info(&self) -> SpriteFrameInfo {
        SpriteFrameInfo {
            top_world_y: self.feet_world_y() - PLAYER_SPRITE_HEIGHT_PX,
            height_px: PLAYER_SPRITE_HEIGHT_PX,
        }
    }

    fn sprite_y_offset(&self) -> f32 {
        self.sprite_y_offset
    }

    fn set_sprite_y_offset(&mut self, offset_px: f32) {
        self.sprite_y_offset = offset_px;
    }

    fn force_step(&mut self, direction: Direction) {
        self.hidden = false;
        self.input_locked = true;
        self.begin_step(direction);
    }

    fn is_moving(&self) -> bool {
        self.move_ticks_left > 0
    }

    fn unlock_input(&mut self) {
        self.input_locked = false;
    }

    fn owner_snapshot(&self) -> OwnerSnapshot {
        OwnerSnapshot::at_rest(self.tile, self.facing)
            .with_destination(self.destination_tile)
            .with_previous(self.previous_tile)
            .with_moving(self.move_ticks_left > 0)
    }
}

#[derive(Default)]
struct PanningCamera {
    pan: (f32, f32),
}

impl CameraRig for PanningCamera {
    fn position(&self) -> Vec2 {
        Vec2 { x: 0.0, y: 0.0 }
    }

    fn set_panning(&mut self, dx: f32, dy: f32) {
        self.pan = (dx, dy);
    }

    fn reset_panning(&mut self) {
        self.pan = (0.0, 0.0);
    }
}

struct TimedFade {
    complete_at_ms: f64,
}

impl FadeOracle for TimedFade {
    fn direction(&self) -> Option<FadeDirection> {
        Some(FadeDirection::In)
    }

    fn is_complete(&self, now_ms: f64) -> bool {
        now_ms >= self.complete_at_ms
    }
}

pub struct ScenarioRun {
    pub samples: Vec<TickSample>,
    pub summary: RunSummary,
}

pub fn run_scenario(scenario: &Scenario) -> ScenarioRun {
    let registry = Arc::new(EffectRegistry::builtin());
    let mut engine = FieldEffectEngine::new(registry);
    let mut player = HarnessPlayer::new(scenario.player_tile);
    let mut camera = PanningCamera::default();
    let fade = TimedFade {
        complete_at_ms: scenario.fade_in_complete_ms,
    };
    let mut fall = FallArrivalSequencer::new();
    let mut ash = AshWarpSequencer::new();

    let mut samples = Vec::new();
    let mut summary = RunSummary::default();

    for tick in 0..scenario.ticks {
        let now_ms = tick as f64 * MS_PER_TICK;

        for command in scenario
            .commands
            .iter()
            .filter(|command| command.at_tick == tick)
        {
            apply_action(
                &command.action,
                now_ms,
                &mut engine,
                &mut player,
                &mut fall,
                &mut ash,
            );
        }

        if let Some(departed) = player.advance_movement() {
            trigger_ground_effects(scenario, departed, &player, &mut engine);
        }

        // The fall sequencer drives the engine itself while active; the host
        // only ticks it the rest of the time.
        if !fall.is_active() {
            engine.advance_ticks(1.0);
            let mut owners = OwnerSnapshots::new();
            owners.insert(OwnerId::Player, player.owner_snapshot());
            engine.reap(&owners);
        }

        fall.update(now_ms, &mut player, &mut camera, &mut engine, &fade);

        let mut executed = 0u32;
        ash.update(now_ms, &mut player, &mut camera, &mut engine, &mut || {
            executed += 1;
        });
        summary.warp_executions += executed;

        summary.effects_spawned_peak = summary.effects_spawned_peak.max(engine.len() as u32);

        if tick % scenario.sample_every == 0 {
            samples.push(sample_tick(tick, &scenario.npcs, &engine, &player, &camera));
        }
    }

    summary.ticks_run = scenario.ticks;
    info!(
        ticks = summary.ticks_run,
        peak_effects = summary.effects_spawned_peak,
        warp_executions = summary.warp_executions,
        "scenario_complete"
    );

    ScenarioRun { samples, summary }
}

fn apply_action(
    action: &ScenarioAction,
    now_ms: f64,
    engine: &mut FieldEffectEngine,
    player: &mut HarnessPlayer,
    fall: &mut FallArrivalSequencer,
    ash: &mut AshWarpSequencer,
) {
    match action {
        ScenarioAction::SpawnEffect {
            tile,
            kind,
            skip_animation,
            npc_owner,
            direction,
        } => {
            let owner = npc_owner
                .map(|id| OwnerId::Npc(NpcId(id)))
                .unwrap_or(OwnerId::Player);
            engine.create(*tile, *kind, *skip_animation, owner, *direction);
        }
        ScenarioAction::MovePlayer { direction } => {
            if !player.input_locked {
                player.begin_step(*direction);
            }
        }
        ScenarioAction::StartFallWarp => {
            debug!("scenario_start_fall_warp");
            fall.start(FallCallbacks::default());
        }
        ScenarioAction::StartAshWarpOut { basement } => {
            if *basement {
                ash.start_b1f_warp_out(player.tile, 0, now_ms);
            } else {
                ash.start_1f_warp_out(player.tile, 0, now_ms);
            }
        }
        ScenarioAction::StartAshArrival => {
            player.input_locked = true;
            ash.start_b1f_arrival(player.tile, 0, now_ms);
        }
    }
}

fn trigger_ground_effects(
    scenario: &Scenario,
    departed: TilePos,
    player: &HarnessPlayer,
    engine: &mut FieldEffectEngine,
) {
    if scenario.grass_tiles.contains(&player.tile) {
        engine.create(
            player.tile,
            EffectKind::TallGrass,
            false,
            OwnerId::Player,
            None,
        );
    }
    if scenario.sand_tiles.contains(&departed) {
        engine.create(
            departed,
            EffectKind::SandFootprints,
            false,
            OwnerId::Player,
            Some(player.facing),
        );
    }
}

fn sample_tick(
    tick: u64,
    npcs: &[ScenarioNpc],
    engine: &FieldEffectEngine,
    player: &HarnessPlayer,
    camera: &PanningCamera,
) -> TickSample {
    let npc_views: Vec<NpcView> = npcs
        .iter()
        .map(|npc| NpcView {
            id: NpcId(npc.id),
            world_x: npc.tile.world_center().x,
            feet_world_y: ((npc.tile.y + 1) * METATILE_SIZE) as f32,
            visible: true,
            render_layer: RenderLayer::YSorted,
        })
        .collect();

    let renderables = engine.for_rendering();
    let player_view = player.view();
    let batch = build_sprite_batch(Some(&player_view), &npc_views, &renderables);

    let mut draws = Vec::new();
    for sprite in batch
        .low_priority
        .iter()
        .chain(batch.y_sorted.iter())
        .chain(batch.high_priority.iter())
    {
        let kind = match sprite.kind {
            fieldfx::DrawKind::Player => "player".to_string(),
            fieldfx::DrawKind::PlayerShadow => "player_shadow".to_string(),
            fieldfx::DrawKind::Npc(id) => format!("npc:{}", id.0),
            fieldfx::DrawKind::Effect(id) => {
                let token = renderables
                    .iter()
                    .find(|effect| effect.id == id)
                    .map(|effect| effect.kind.as_token())
                    .unwrap_or("unknown");
                format!("effect:{token}")
            }
        };
        draws.push(DrawEntry {
            kind,
            sort_key: sprite.sort_key.0,
            world_x: sprite.world_x,
            world_y: sprite.world_y,
            frame: sprite.frame,
            layer: sprite.effect_layer.map(|layer| match layer {
                Layer::Front => "front",
                Layer::Behind => "behind",
            }),
        });
    }

    TickSample {
        tick,
        live_effects: engine.len() as u32,
        camera_pan: camera.pan,
        player_sprite_y_offset: player.sprite_y_offset,
        draws,
    }
}

/// Parse a scenario, reporting the json path of whatever field failed.
pub fn parse_scenario(raw: &str) -> Result<Scenario, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer) {
        Ok(scenario) => Ok(scenario),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("scenario parse error: {source}"))
            } else {
                Err(format!("scenario parse error at {path}: {source}"))
            }
        }
    }
}
