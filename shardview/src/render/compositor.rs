//! Frame composition planning.
//!
//! `plan_frame` decides, from world state and the tick's profile snapshot,
//! which passes the frame contains and how each is configured. The plan is a
//! plain value so every sequencing rule — the death-screen short circuit, the
//! light-pass skip conditions, the blend-mode select, overlay ordering — is
//! testable without a GPU device.

use crate::math::Rect;
use crate::profile::ProfileSnapshot;
use crate::world::{World, LIGHT_LEVEL_NIGHT};

/// How long the death overlay owns the frame after the player dies.
pub const DEATH_SCREEN_MS: u64 = 3000;

/// Extra darkening applied to the ambient clear when dark nights are on.
const DARK_NIGHTS_FACTOR: f32 = 0.6;

/// Where the world pass renders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorldTarget {
    /// Straight into the frame's scene target at 1:1.
    Direct,
    /// Into an off-screen target that is upscale-filtered by `scale` during
    /// the final composite.
    Upscaled { scale: f32 },
}

/// Blend used when the light map is laid over the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightBlend {
    /// Default: world * lightmap, darkness multiplies the scene.
    Multiply,
    /// Alternate-lights mode: destination-color additive lamps.
    Alternate,
}

/// Configuration of the frame's light pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightPass {
    /// Gray level the light map is cleared to before lights accumulate;
    /// 0.0 in alternate mode, the ambient brightness otherwise.
    pub clear_level: f32,
    pub blend: LightBlend,
}

/// The centered death message pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeathOverlay {
    pub text: &'static str,
}

/// One frame's pass sequence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramePlan {
    /// When set, the frame is only this overlay; every other field is unset.
    pub death_overlay: Option<DeathOverlay>,
    pub world: Option<WorldTarget>,
    pub lights: Option<LightPass>,
    /// Overhead text and name/health bars.
    pub overlays: bool,
    /// Active drag-select rectangle, drawn after everything else.
    pub selection: Option<Rect>,
}

impl FramePlan {
    /// A frame that draws nothing (world not ready).
    pub const IDLE: FramePlan = FramePlan {
        death_overlay: None,
        world: None,
        lights: None,
        overlays: false,
        selection: None,
    };
}

/// Plans the current frame.
///
/// `death_started_at` is the tick time the player's death was observed, if
/// any; `selection` is the live drag-select rectangle.
pub fn plan_frame(
    world: &World,
    profile: &ProfileSnapshot,
    selection: Option<Rect>,
    death_started_at: Option<u64>,
    now: u64,
) -> FramePlan {
    if !world.in_game {
        return FramePlan::IDLE;
    }

    let player_dead = world
        .player_object()
        .and_then(|p| p.mobile())
        .map(|m| m.dead)
        .unwrap_or(false);

    if player_dead && profile.enable_death_screen {
        if let Some(started) = death_started_at {
            if now < started + DEATH_SCREEN_MS {
                return FramePlan {
                    death_overlay: Some(DeathOverlay {
                        text: "You are dead.",
                    }),
                    ..FramePlan::IDLE
                };
            }
        }
    }

    let world_target = if profile.scale != 1.0 {
        WorldTarget::Upscaled {
            scale: profile.scale,
        }
    } else {
        WorldTarget::Direct
    };

    FramePlan {
        death_overlay: None,
        world: Some(world_target),
        lights: plan_lights(world, profile, player_dead),
        overlays: true,
        selection,
    }
}

fn plan_lights(world: &World, profile: &ProfileSnapshot, player_dead: bool) -> Option<LightPass> {
    if !profile.lights_enabled {
        return None;
    }
    // A dead player's world is already desaturated; lighting on top of the
    // black/white effect reads as noise.
    if player_dead && profile.black_white_death_effect {
        return None;
    }

    if profile.alternate_lights {
        return Some(LightPass {
            clear_level: 0.0,
            blend: LightBlend::Alternate,
        });
    }

    // Full daylight needs no darkness pass at all.
    if world.light_level == 0 && !profile.dark_nights {
        return None;
    }

    let mut brightness = 1.0 - world.light_level as f32 / LIGHT_LEVEL_NIGHT as f32;
    if profile.dark_nights {
        brightness *= DARK_NIGHTS_FACTOR;
    }
    Some(LightPass {
        clear_level: brightness.clamp(0.0, 1.0),
        blend: LightBlend::Multiply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::TilePos;
    use crate::world::{GameObject, MobileData, ObjKind};

    fn in_game_world(dead: bool) -> World {
        let mut world = World::new();
        let mut mobile = MobileData::default();
        mobile.dead = dead;
        let player = world.insert(GameObject::new(
            0x0190,
            TilePos::new(10, 10, 0),
            ObjKind::Mobile(mobile),
        ));
        world.set_player(player);
        world.in_game = true;
        world
    }

    #[test]
    fn idle_plan_out_of_game() {
        let world = World::new();
        let plan = plan_frame(&world, &ProfileSnapshot::default(), None, None, 0);
        assert_eq!(plan, FramePlan::IDLE);
    }

    #[test]
    fn fresh_death_short_circuits_to_the_overlay() {
        let world = in_game_world(true);
        let plan = plan_frame(&world, &ProfileSnapshot::default(), None, Some(1000), 1500);
        assert!(plan.death_overlay.is_some());
        assert!(plan.world.is_none());
        assert!(plan.lights.is_none());
        assert!(!plan.overlays);
    }

    #[test]
    fn elapsed_death_timer_resumes_normal_frames() {
        let world = in_game_world(true);
        let plan = plan_frame(
            &world,
            &ProfileSnapshot::default(),
            None,
            Some(1000),
            1000 + DEATH_SCREEN_MS,
        );
        assert!(plan.death_overlay.is_none());
        assert!(plan.world.is_some());
        // Dead + black/white effect still suppresses lighting.
        assert!(plan.lights.is_none());
    }

    #[test]
    fn daylight_skips_the_light_pass() {
        let world = in_game_world(false);
        let plan = plan_frame(&world, &ProfileSnapshot::default(), None, None, 0);
        assert!(plan.lights.is_none());
    }

    #[test]
    fn night_plans_a_multiply_pass_with_ambient_clear() {
        let mut world = in_game_world(false);
        world.light_level = 15;
        let plan = plan_frame(&world, &ProfileSnapshot::default(), None, None, 0);
        let lights = plan.lights.unwrap();
        assert_eq!(lights.blend, LightBlend::Multiply);
        assert!((lights.clear_level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn dark_nights_darken_the_clear_further() {
        let mut world = in_game_world(false);
        world.light_level = 15;
        let mut profile = ProfileSnapshot::default();
        profile.dark_nights = true;
        let plan = plan_frame(&world, &profile, None, None, 0);
        assert!(plan.lights.unwrap().clear_level < 0.5);
    }

    #[test]
    fn alternate_mode_clears_black_and_blends_alternate() {
        let world = in_game_world(false);
        let mut profile = ProfileSnapshot::default();
        profile.alternate_lights = true;
        let plan = plan_frame(&world, &profile, None, None, 0);
        let lights = plan.lights.unwrap();
        assert_eq!(lights.blend, LightBlend::Alternate);
        assert_eq!(lights.clear_level, 0.0);
    }

    #[test]
    fn scale_selects_the_upscaled_target() {
        let world = in_game_world(false);
        let mut profile = ProfileSnapshot::default();
        profile.scale = 1.5;
        let plan = plan_frame(&world, &profile, None, None, 0);
        assert_eq!(plan.world, Some(WorldTarget::Upscaled { scale: 1.5 }));
    }

    #[test]
    fn selection_rect_rides_the_plan() {
        let world = in_game_world(false);
        let rect = Rect::new(10.0, 10.0, 50.0, 30.0);
        let plan = plan_frame(&world, &ProfileSnapshot::default(), Some(rect), None, 0);
        assert_eq!(plan.selection, Some(rect));
    }
}
