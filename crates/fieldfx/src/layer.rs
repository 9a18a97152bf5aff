use crate::effect::RenderableEffect;

/// Fixed subpriority for player and NPC sprites. Effects bracket this value
/// so same-row ties always resolve the same way.
pub const SPRITE_SUBPRIORITY: u8 = 128;
/// Subpriority for effects layered in front of their owner.
pub const EFFECT_FRONT_SUBPRIORITY: u8 = 192;
/// Subpriority for effects layered behind their owner.
pub const EFFECT_BEHIND_SUBPRIORITY: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Front,
    Behind,
}

/// Decide whether an effect draws in front of or behind its owner sprite.
/// The rules apply in order; the first match wins:
///
/// 1. tracks, splashes, and ripples sit at foot level and always go behind;
/// 2. an explicit behind-owner override goes behind;
/// 3. the ash family pops out of the ground and always goes in front;
/// 4. everything else Y-sorts against the owner.
pub fn layer_of(effect: &RenderableEffect, owner_world_y: f32) -> Layer {
    if effect.kind.is_track() || effect.kind.is_water() {
        return Layer::Behind;
    }
    if effect.render_behind_owner {
        return Layer::Behind;
    }
    if effect.kind.is_ash_family() {
        return Layer::Front;
    }
    if effect.world_y >= owner_world_y {
        Layer::Front
    } else {
        Layer::Behind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey(pub i64);

/// The one total order every drawable obeys: coarse world-Y bucket in the
/// high bits, subpriority tie-breaker in the low byte. Both the effect
/// engine and owner-sprite code must call this rather than comparing Y
/// values directly, or ordering diverges between effect kinds.
pub fn sort_key(world_y: f32, subpriority: u8) -> SortKey {
    SortKey(((world_y.floor() as i64) << 8) | i64::from(subpriority))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectId, OwnerId};
    use crate::registry::EffectKind;

    fn effect(kind: EffectKind, world_y: f32, render_behind_owner: bool) -> RenderableEffect {
        RenderableEffect {
            id: EffectId(0),
            kind,
            owner: OwnerId::Player,
            world_x: 8.0,
            world_y,
            frame: 0,
            visible: true,
            flip_horizontal: false,
            flip_vertical: false,
            render_behind_owner,
            subpriority_bias: 0,
        }
    }

    #[test]
    fn tracks_and_water_are_always_behind() {
        for kind in [
            EffectKind::SandFootprints,
            EffectKind::DeepSandFootprints,
            EffectKind::BikeTireTracks,
            EffectKind::Splash,
            EffectKind::Ripple,
        ] {
            assert_eq!(layer_of(&effect(kind, 500.0, false), 0.0), Layer::Behind);
            assert_eq!(layer_of(&effect(kind, -500.0, false), 0.0), Layer::Behind);
        }
    }

    #[test]
    fn behind_owner_override_beats_y_comparison() {
        let grass = effect(EffectKind::TallGrass, 100.0, true);
        assert_eq!(layer_of(&grass, 0.0), Layer::Behind);
    }

    #[test]
    fn ash_family_is_always_in_front() {
        for kind in [EffectKind::Ash, EffectKind::AshPuff, EffectKind::AshLaunch] {
            assert_eq!(layer_of(&effect(kind, -500.0, false), 0.0), Layer::Front);
        }
    }

    #[test]
    fn generic_effects_y_sort_against_the_owner() {
        let grass = effect(EffectKind::TallGrass, 40.0, false);
        assert_eq!(layer_of(&grass, 40.0), Layer::Front);
        assert_eq!(layer_of(&grass, 39.0), Layer::Front);
        assert_eq!(layer_of(&grass, 41.0), Layer::Behind);
    }

    #[test]
    fn greater_world_y_always_sorts_later() {
        assert!(sort_key(17.0, 255) < sort_key(18.0, 0));
        assert!(sort_key(-2.0, 255) < sort_key(-1.0, 0));
    }

    #[test]
    fn equal_world_y_orders_by_subpriority() {
        assert!(sort_key(24.0, EFFECT_BEHIND_SUBPRIORITY) < sort_key(24.0, SPRITE_SUBPRIORITY));
        assert!(sort_key(24.0, SPRITE_SUBPRIORITY) < sort_key(24.0, EFFECT_FRONT_SUBPRIORITY));
    }

    #[test]
    fn negative_world_y_still_orders_correctly() {
        assert!(sort_key(-40.0, 200) < sort_key(-39.0, 0));
        assert!(sort_key(-40.0, 10) < sort_key(-40.0, 11));
    }
}
