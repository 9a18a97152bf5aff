use std::collections::HashMap;

use crate::effect::{EffectId, NpcId, OwnerId, RenderableEffect};
use crate::layer::{
    layer_of, sort_key, Layer, SortKey, EFFECT_BEHIND_SUBPRIORITY, EFFECT_FRONT_SUBPRIORITY,
    SPRITE_SUBPRIORITY,
};

/// Player state the batcher needs; the movement/animation code owns the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerView {
    pub world_x: f32,
    /// World Y of the feet line, used for depth sorting.
    pub feet_world_y: f32,
    /// World Y of the sprite center, used for front/behind layering.
    pub center_world_y: f32,
    pub hidden: bool,
    pub show_shadow: bool,
}

/// Render grouping assigned by the caller's elevation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderLayer {
    /// Draws before the Y-sorted group (e.g. under bridge tiles).
    BehindBridge,
    YSorted,
    /// Draws after the Y-sorted group, above every background layer.
    AboveAll,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpcView {
    pub id: NpcId,
    pub world_x: f32,
    pub feet_world_y: f32,
    pub visible: bool,
    pub render_layer: RenderLayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Player,
    PlayerShadow,
    Npc(NpcId),
    Effect(EffectId),
}

/// One positioned, orderable draw primitive. The renderer draws each group
/// in ascending `sort_key` order and never re-derives depth itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawSprite {
    pub kind: DrawKind,
    pub sort_key: SortKey,
    pub world_x: f32,
    pub world_y: f32,
    pub frame: u16,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Set for effects only: which side of the owner this resolved to.
    pub effect_layer: Option<Layer>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpriteBatch {
    pub low_priority: Vec<DrawSprite>,
    pub y_sorted: Vec<DrawSprite>,
    pub high_priority: Vec<DrawSprite>,
    pub player_sort_key: Option<SortKey>,
}

impl SpriteBatch {
    /// Split the Y-sorted group around the player for renderers that draw
    /// in two passes.
    pub fn split_around_player(&self) -> (&[DrawSprite], Option<&DrawSprite>, &[DrawSprite]) {
        let Some(index) = self
            .y_sorted
            .iter()
            .position(|sprite| sprite.kind == DrawKind::Player)
        else {
            return (&self.y_sorted, None, &[]);
        };
        (
            &self.y_sorted[..index],
            Some(&self.y_sorted[index]),
            &self.y_sorted[index + 1..],
        )
    }

    pub fn effects_for_layer(&self, layer: Layer) -> Vec<&DrawSprite> {
        self.y_sorted
            .iter()
            .filter(|sprite| sprite.effect_layer == Some(layer))
            .collect()
    }
}

/// Build the ordered draw list for one frame from owner views and the effect
/// engine's renderables.
pub fn build_sprite_batch(
    player: Option<&PlayerView>,
    npcs: &[NpcView],
    effects: &[RenderableEffect],
) -> SpriteBatch {
    let mut batch = SpriteBatch::default();

    if let Some(player) = player {
        if !player.hidden {
            let key = sort_key(player.feet_world_y, SPRITE_SUBPRIORITY);
            batch.player_sort_key = Some(key);
            batch.y_sorted.push(DrawSprite {
                kind: DrawKind::Player,
                sort_key: key,
                world_x: player.world_x,
                world_y: player.feet_world_y,
                frame: 0,
                flip_horizontal: false,
                flip_vertical: false,
                effect_layer: None,
            });
            if player.show_shadow {
                batch.y_sorted.push(DrawSprite {
                    kind: DrawKind::PlayerShadow,
                    sort_key: key,
                    world_x: player.world_x,
                    world_y: player.feet_world_y,
                    frame: 0,
                    flip_horizontal: false,
                    flip_vertical: false,
                    effect_layer: None,
                });
            }
        }
    }

    let mut npc_feet_by_id = HashMap::new();
    for npc in npcs {
        if !npc.visible {
            continue;
        }
        npc_feet_by_id.insert(npc.id, npc.feet_world_y);

        let sprite = DrawSprite {
            kind: DrawKind::Npc(npc.id),
            sort_key: sort_key(npc.feet_world_y, SPRITE_SUBPRIORITY),
            world_x: npc.world_x,
            world_y: npc.feet_world_y,
            frame: 0,
            flip_horizontal: false,
            flip_vertical: false,
            effect_layer: None,
        };
        match npc.render_layer {
            RenderLayer::BehindBridge => batch.low_priority.push(sprite),
            RenderLayer::YSorted => batch.y_sorted.push(sprite),
            RenderLayer::AboveAll => batch.high_priority.push(sprite),
        }
    }

    for effect in effects {
        if !effect.visible {
            continue;
        }

        // Effects anchored to an NPC sort against that NPC; foot-level kinds
        // fall through to the player-relative rules like everything else.
        let npc_owner_feet = match effect.owner {
            OwnerId::Npc(id) if !effect.kind.is_track() && !effect.kind.is_water() => {
                npc_feet_by_id.get(&id).copied()
            }
            _ => None,
        };

        let (layer, anchor_y, base_subpriority) = if let Some(owner_feet) = npc_owner_feet {
            if effect.render_behind_owner {
                (Layer::Behind, effect.world_y, EFFECT_BEHIND_SUBPRIORITY)
            } else {
                (Layer::Front, owner_feet, EFFECT_FRONT_SUBPRIORITY)
            }
        } else {
            let owner_center_y = player
                .map(|player| player.center_world_y)
                .unwrap_or(effect.world_y);
            match layer_of(effect, owner_center_y) {
                Layer::Front => (
                    Layer::Front,
                    player
                        .map(|player| player.feet_world_y)
                        .unwrap_or(effect.world_y),
                    EFFECT_FRONT_SUBPRIORITY,
                ),
                Layer::Behind => (Layer::Behind, effect.world_y, EFFECT_BEHIND_SUBPRIORITY),
            }
        };

        // A positive bias means "draw earlier within the same layer".
        let subpriority = base_subpriority.saturating_sub(effect.subpriority_bias);

        batch.y_sorted.push(DrawSprite {
            kind: DrawKind::Effect(effect.id),
            sort_key: sort_key(anchor_y, subpriority),
            world_x: effect.world_x,
            world_y: effect.world_y + effect.kind.draw_y_offset_px() as f32,
            frame: effect.frame,
            flip_horizontal: effect.flip_horizontal,
            flip_vertical: effect.flip_vertical,
            effect_layer: Some(layer),
        });
    }

    batch.y_sorted.sort_by_key(|sprite| sprite.sort_key);
    batch
}
