//! The game scene: one Update and one Draw per external driver tick.
//!
//! Update drains device events and runs the interaction machines; Draw runs
//! culler, render-list builder, and frame planning, then hands the plan to
//! the GPU backend. Nothing here blocks mid-frame; device callbacks only
//! enqueue events consumed at the top of Update.

use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::action::{ActionQueue, ClientAction};
use crate::audio::SoundPlayer;
use crate::input::drag::{
    apply_drag_select, can_anchor_drag, modifier_satisfied, resolve_drop, DragSelect,
    HealthBarManager, ItemHold,
};
use crate::input::gamepad::GamepadState;
use crate::input::macros::{MacroAction, MacroEngine, MacroInput, Modifiers};
use crate::input::movement::{poll_movement, tick_follow, FollowState};
use crate::input::targeting::{TargetEvent, Targeting};
use crate::input::{pick_object, ClickKind, ClickTracker, InputQueue, InputState};
use crate::math::{Direction, Rect};
use crate::pathfind::Pathfinder;
use crate::profile::{Profile, ProfileSnapshot};
use crate::render::{
    plan_frame, ArtDimensions, FramePlan, LightBuffer, RenderCategory, RenderListBuilder,
    RenderLists,
};
use crate::session::{DisconnectBehavior, Session};
use crate::viewport::{compute_tile_window, Camera};
use crate::world::{ObjHandle, ObjKind, World};

/// Per-frame diagnostics exposed to the surrounding client.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    pub tiles_visited: usize,
    pub objects_rendered: usize,
    pub lights_drawn: usize,
}

/// The scene core: world, per-frame pipeline state, and the interaction
/// machines.
pub struct GameScene {
    pub world: World,
    pub profile: Profile,
    pub camera: Camera,
    pub targeting: Targeting,
    pub macros: MacroEngine,
    pub follow: FollowState,
    pub item_hold: ItemHold,
    pub bars: HealthBarManager,
    pub actions: ActionQueue,
    pub session: Session,
    /// True while the chat line owns the keyboard; gates macro dispatch.
    pub chat_focused: bool,

    input_queue: InputQueue,
    input: InputState,
    gamepad: GamepadState,
    clicks: ClickTracker,
    drag_select: DragSelect,
    builder: RenderListBuilder,
    lists: RenderLists,
    lights: LightBuffer,
    hovered: Option<ObjHandle>,
    pressed_on: Option<ObjHandle>,
    death_started_at: Option<u64>,
    stats: FrameStats,
}

impl GameScene {
    pub fn new(profile: Profile) -> Self {
        Self {
            world: World::new(),
            profile,
            camera: Camera::new(Rect::new(0.0, 0.0, 1280.0, 720.0)),
            targeting: Targeting::new(),
            macros: MacroEngine::new(),
            follow: FollowState::default(),
            item_hold: ItemHold::default(),
            bars: HealthBarManager::new(),
            actions: ActionQueue::new(),
            session: Session::new(),
            chat_focused: false,
            input_queue: InputQueue::new(),
            input: InputState::new(),
            gamepad: GamepadState::new(),
            clicks: ClickTracker::new(),
            drag_select: DragSelect::default(),
            builder: RenderListBuilder::new(),
            lists: RenderLists::new(),
            lights: LightBuffer::new(),
            hovered: None,
            pressed_on: None,
            death_started_at: None,
            stats: FrameStats::default(),
        }
    }

    /// Event channel handle for the windowing layer.
    pub fn input_sender(&self) -> crossbeam_channel::Sender<crate::input::InputEvent> {
        self.input_queue.sender()
    }

    /// Currently hovered world object, if any.
    pub fn hovered(&self) -> Option<ObjHandle> {
        self.hovered
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn lights(&self) -> &LightBuffer {
        &self.lights
    }

    pub fn lists(&self) -> &RenderLists {
        &self.lists
    }

    /// The live drag-select rectangle, if a gesture is in progress.
    pub fn selection_rect(&self) -> Option<Rect> {
        self.drag_select.rect()
    }

    /// The Update tick: drain input, run the interaction machines, advance
    /// session state. Returns a disconnect notice when one is pending.
    pub fn update(
        &mut self,
        art: &dyn ArtDimensions,
        pathfinder: &mut dyn Pathfinder,
        sounds: &mut dyn SoundPlayer,
        now: u64,
    ) -> Option<DisconnectBehavior> {
        let snapshot = self.profile.snapshot();

        self.input.begin_frame();
        self.input_queue.drain_into(&mut self.input);
        self.gamepad.poll();

        self.track_death(now);
        self.world.expire_overhead(now);

        // Hover resolves against the previous frame's lists; on an idle
        // first frame there is simply nothing to hover.
        self.hovered = pick_object(&self.lists, art, self.input.mouse_position());

        if self.input.is_key_pressed(KeyCode::Escape) {
            self.targeting.cancel(&mut self.actions);
        }

        self.dispatch_macros();
        self.handle_left_button(&snapshot, art, sounds, pathfinder, now);
        self.handle_movement(&snapshot, pathfinder);
        tick_follow(&mut self.follow, &self.world, &snapshot, pathfinder);
        self.look_at_mouse();

        let hover_tile = self.hover_tile();
        self.targeting.update_ghost(&self.world, hover_tile);

        self.session.tick(now, &mut self.actions);
        self.session.take_disconnect(snapshot.auto_reconnect)
    }

    /// The CPU half of the Draw tick: cull, build lists, accumulate lights,
    /// and plan the frame's passes. GPU execution consumes the plan
    /// separately; afterwards call [`GameScene::finish_draw`].
    pub fn draw(&mut self, now: u64) -> FramePlan {
        let snapshot = self.profile.snapshot();
        let window = compute_tile_window(&self.camera, &self.world);
        let build = self.builder.build(
            &mut self.world,
            &self.camera,
            &window,
            &snapshot,
            &mut self.lists,
            &mut self.lights,
            now,
        );
        self.stats = FrameStats {
            tiles_visited: build.tiles_visited,
            objects_rendered: self.lists.total(),
            lights_drawn: self.lights.len(),
        };
        plan_frame(
            &self.world,
            &snapshot,
            self.drag_select.rect(),
            self.death_started_at,
            now,
        )
    }

    /// Queue the planned frame onto the GPU backend.
    ///
    /// World categories go in order — opaque statics, animated, effects,
    /// then the transparent list against the depth buffer — followed by the
    /// placement ghost, lights, bars, and the selection rectangle on top.
    pub fn render(
        &mut self,
        renderer: &mut crate::render::Renderer<'_>,
        frame: &mut crate::render::Frame,
        plan: &FramePlan,
    ) {
        if plan.world.is_some() {
            for category in RenderCategory::ALL {
                let transparent = category == RenderCategory::Transparent;
                for entry in self.lists.draw_order(category) {
                    renderer.queue_world(
                        frame,
                        entry.graphic,
                        entry.screen,
                        entry.depth,
                        entry.alpha,
                        transparent,
                    );
                }
            }
            if let Some(ghost) = self.targeting.ghost() {
                if let Some(player) = self.world.player_pos() {
                    let screen = self.camera.world_to_screen(player, ghost.pos);
                    renderer.queue_world(frame, ghost.model, screen, i32::MAX, 0x80, true);
                }
            }
            for light in self.lights.entries() {
                renderer.queue_light(frame, light);
            }
        }

        if plan.overlays {
            for bar in self.bars.bars() {
                let hp = self
                    .world
                    .by_serial(bar.serial)
                    .and_then(|h| self.world.get(h))
                    .and_then(|o| o.mobile())
                    .map(|m| m.hp_percent as f32 / 100.0)
                    .unwrap_or(0.0);
                renderer.queue_overlay_rect(frame, bar.rect, [0.1, 0.1, 0.1, 0.8]);
                let fill = Rect::new(
                    bar.rect.x + 2.0,
                    bar.rect.y + 2.0,
                    (bar.rect.width - 4.0) * hp,
                    bar.rect.height - 4.0,
                );
                renderer.queue_overlay_rect(frame, fill, [0.2, 0.8, 0.2, 0.9]);
                renderer.queue_overlay_border(frame, bar.rect, [0.0, 0.0, 0.0, 1.0]);
            }
        }

        // The selection rectangle is queued last so it composites on top of
        // every overlay.
        if let Some(rect) = plan.selection {
            renderer.queue_overlay_rect(frame, rect, [0.2, 0.4, 0.9, 0.25]);
            renderer.queue_overlay_border(frame, rect, [0.2, 0.4, 0.9, 1.0]);
        }
    }

    /// Queue the frame's text: the centered death message on a death frame,
    /// otherwise overhead lines above their owning entities.
    pub fn render_text(
        &mut self,
        renderer: &mut crate::render::Renderer<'_>,
        frame: &mut crate::render::Frame,
        text: &mut crate::render::TextRenderer,
        font: crate::render::FontHandle,
        plan: &FramePlan,
    ) -> anyhow::Result<()> {
        if let Some(overlay) = plan.death_overlay {
            let size = 30.0;
            let width = text.measure(font, overlay.text, size);
            let center = self.camera.bounds.center();
            let origin = crate::math::Vec2::new(center.x - width * 0.5, center.y);
            let quads = text.layout_line(font, overlay.text, size, origin, |rgba, w, h| {
                renderer.load_texture_from_rgba(rgba, w, h)
            })?;
            for quad in quads {
                renderer.queue_overlay_texture(
                    frame,
                    quad.texture,
                    Rect::new(quad.position.x, quad.position.y, quad.size.x, quad.size.y),
                    [0.9, 0.1, 0.1, 1.0],
                );
            }
            return Ok(());
        }

        if !plan.overlays {
            return Ok(());
        }
        let size = 16.0;
        let mut queued: Vec<Vec<crate::render::GlyphQuad>> = Vec::new();
        let entries: Vec<(crate::world::Serial, crate::math::Vec2)> = self
            .lists
            .entries(RenderCategory::Animated)
            .iter()
            .filter_map(|entry| {
                self.world
                    .get(entry.handle)
                    .and_then(|obj| obj.serial)
                    .map(|serial| (serial, entry.screen))
            })
            .collect();
        for (serial, screen) in entries {
            for (i, line) in self.world.overhead_lines(serial).to_vec().iter().enumerate() {
                let width = text.measure(font, &line.text, size);
                let origin = crate::math::Vec2::new(
                    screen.x - width * 0.5,
                    screen.y - 8.0 - i as f32 * (size + 2.0),
                );
                let quads = text.layout_line(font, &line.text, size, origin, |rgba, w, h| {
                    renderer.load_texture_from_rgba(rgba, w, h)
                })?;
                queued.push(quads);
            }
        }
        for quads in queued {
            for quad in quads {
                renderer.queue_overlay_texture(
                    frame,
                    quad.texture,
                    Rect::new(quad.position.x, quad.position.y, quad.size.x, quad.size.y),
                    [1.0, 1.0, 1.0, 1.0],
                );
            }
        }
        Ok(())
    }

    /// End-of-draw bookkeeping: the light buffer resets only after the
    /// compositor has consumed the frame's lights.
    pub fn finish_draw(&mut self) {
        self.lights.clear();
    }

    fn track_death(&mut self, now: u64) {
        let dead = self
            .world
            .player_object()
            .and_then(|p| p.mobile())
            .map(|m| m.dead)
            .unwrap_or(false);
        match (dead, self.death_started_at) {
            (true, None) => self.death_started_at = Some(now),
            (false, Some(_)) => self.death_started_at = None,
            _ => {}
        }
    }

    fn hover_tile(&self) -> (i32, i32) {
        match self.world.player_pos() {
            Some(player) => self
                .camera
                .screen_to_tile(player, self.input.mouse_position()),
            None => (0, 0),
        }
    }

    fn modifiers(&self) -> Modifiers {
        Modifiers {
            alt: self.input.alt(),
            ctrl: self.input.ctrl(),
            shift: self.input.shift(),
        }
    }

    fn dispatch_macros(&mut self) {
        let mods = self.modifiers();
        let chat = self.chat_focused;

        let pressed_keys: Vec<KeyCode> = KEY_CANDIDATES
            .iter()
            .copied()
            .filter(|&key| self.input.is_key_pressed(key))
            .collect();
        for key in pressed_keys {
            self.macros
                .on_input_down(MacroInput::Key(key), mods, chat);
        }
        let released_keys: Vec<KeyCode> = KEY_CANDIDATES
            .iter()
            .copied()
            .filter(|&key| self.input.is_key_released(key))
            .collect();
        for key in released_keys {
            self.macros.on_input_up(MacroInput::Key(key));
        }

        for button in [
            MouseButton::Middle,
            MouseButton::Back,
            MouseButton::Forward,
        ] {
            if self.input.is_mouse_pressed(button) {
                self.macros
                    .on_input_down(MacroInput::Mouse(button), mods, chat);
            }
            if self.input.is_mouse_released(button) {
                self.macros.on_input_up(MacroInput::Mouse(button));
            }
        }

        let wheel = self.input.wheel_delta();
        if wheel > 0.0 {
            self.macros.on_input_down(MacroInput::WheelUp, mods, chat);
        } else if wheel < 0.0 {
            self.macros.on_input_down(MacroInput::WheelDown, mods, chat);
        }

        let controller_pressed: Vec<gilrs::Button> =
            self.gamepad.pressed_buttons().to_vec();
        for button in controller_pressed {
            self.macros
                .on_input_down(MacroInput::Controller(button), mods, chat);
        }

        if let Some(action) = self.macros.take_pending() {
            self.execute_macro(action);
        }
    }

    fn execute_macro(&mut self, action: MacroAction) {
        match action {
            MacroAction::ToggleWarMode => {
                if let Some(player) = self.world.player() {
                    if let Some(mobile) =
                        self.world.get_mut(player).and_then(|o| o.mobile_mut())
                    {
                        mobile.war_mode = !mobile.war_mode;
                    }
                }
                self.actions.push(ClientAction::ToggleWarMode);
            }
            MacroAction::Execute(id) => {
                log::debug!("macro {} queued for external engine", id);
            }
            // Hold-style actions never reach the pending slot.
            MacroAction::Walk(_) | MacroAction::LookAtMouse => {}
        }
    }

    fn handle_left_button(
        &mut self,
        snapshot: &ProfileSnapshot,
        art: &dyn ArtDimensions,
        sounds: &mut dyn SoundPlayer,
        pathfinder: &mut dyn Pathfinder,
        now: u64,
    ) {
        let cursor = self.input.mouse_position();

        if self.input.is_mouse_pressed(MouseButton::Left) {
            self.pressed_on = self.hovered;
            let item_drag = self.item_hold.enabled && !self.item_hold.fixed;
            if !item_drag
                && !self.targeting.is_targeting()
                && snapshot.drag_select_enabled
                && modifier_satisfied(snapshot, &self.input)
                && self
                    .hovered
                    .map(|h| can_anchor_drag(&self.world, h))
                    .unwrap_or(false)
            {
                self.drag_select.begin(cursor);
            }
        }

        if self.drag_select.is_active() {
            self.drag_select.update(cursor);
        }

        if self.input.is_mouse_released(MouseButton::Left) {
            if let Some(rect) = self.drag_select.finish() {
                apply_drag_select(
                    rect,
                    &self.world,
                    &self.camera,
                    art,
                    snapshot,
                    &mut self.bars,
                );
            } else if self.targeting.is_targeting() {
                if let Some(event) =
                    self.targeting
                        .resolve(&self.world, self.hovered, &mut self.actions)
                {
                    self.on_target_event(event);
                }
            } else if self.item_hold.enabled && !self.item_hold.fixed {
                let before = self.actions.len();
                resolve_drop(
                    &self.world,
                    &self.item_hold,
                    self.hovered,
                    self.input.ctrl(),
                    snapshot,
                    &mut self.actions,
                    sounds,
                );
                // A rejected drop keeps the item on the cursor.
                if self.actions.len() > before {
                    self.item_hold.enabled = false;
                }
            } else {
                match self.clicks.on_left_release(now, self.hovered) {
                    ClickKind::Double => self.dispatch_double_click(),
                    ClickKind::ArmedSingle => {}
                }
            }
        }

        if let Some(target) = self.clicks.take_expired_single(now) {
            self.dispatch_single_click(snapshot, target, pathfinder);
        }
    }

    fn on_target_event(&mut self, event: TargetEvent) {
        // Client-side target outcomes are surfaced to the UI layer; the
        // server-bound ones already queued their actions.
        log::debug!("target resolved: {:?}", event);
    }

    fn dispatch_double_click(&mut self) {
        let handle = match self.pressed_on.or(self.hovered) {
            Some(handle) => handle,
            None => return,
        };
        let obj = match self.world.get(handle) {
            Some(obj) => obj,
            None => return,
        };
        let serial = match obj.serial {
            Some(serial) => serial,
            None => return,
        };
        match &obj.kind {
            ObjKind::Item { is_corpse, .. } => {
                if *is_corpse {
                    self.actions.push(ClientAction::OpenCorpse { serial });
                } else {
                    self.actions.push(ClientAction::DoubleClick { serial });
                }
            }
            ObjKind::Mobile(_) => {
                let war_mode = self
                    .world
                    .player_object()
                    .and_then(|p| p.mobile())
                    .map(|m| m.war_mode)
                    .unwrap_or(false);
                let is_self = self.world.player() == Some(handle);
                if war_mode && !is_self {
                    self.actions.push(ClientAction::Attack { serial });
                } else {
                    self.actions.push(ClientAction::DoubleClick { serial });
                }
            }
            _ => {}
        }
    }

    fn dispatch_single_click(
        &mut self,
        snapshot: &ProfileSnapshot,
        target: Option<ObjHandle>,
        pathfinder: &mut dyn Pathfinder,
    ) {
        let handle = match target {
            Some(handle) => handle,
            None => return,
        };
        let obj = match self.world.get(handle) {
            Some(obj) => obj,
            None => return,
        };
        if snapshot.pathfind_on_single_click && obj.kind.is_ground() {
            let pos = obj.pos;
            pathfinder.walk_to(pos.x, pos.y, pos.z, 0);
            return;
        }
        if let Some(serial) = obj.serial {
            self.actions.push(ClientAction::SingleClick { serial });
        }
    }

    fn handle_movement(&mut self, snapshot: &ProfileSnapshot, pathfinder: &mut dyn Pathfinder) {
        let request = poll_movement(
            &self.input,
            &self.macros,
            self.gamepad.stick(),
            self.camera.bounds,
            snapshot,
            pathfinder,
        );
        if let Some(request) = request {
            if let Some(player) = self.world.player() {
                if let Some(mobile) = self.world.get_mut(player).and_then(|o| o.mobile_mut()) {
                    mobile.facing = request.direction;
                }
            }
            self.actions.push(ClientAction::Walk {
                direction: request.direction,
                run: request.run,
            });
        }
    }

    fn look_at_mouse(&mut self) {
        if !self.macros.look_at_mouse() {
            return;
        }
        let center = self.camera.bounds.center();
        let v = self.input.mouse_position() - center;
        if v.length_squared() < 1.0 {
            return;
        }
        let direction = Direction::from_screen_vector(v);
        if let Some(player) = self.world.player() {
            if let Some(mobile) = self.world.get_mut(player).and_then(|o| o.mobile_mut()) {
                mobile.facing = direction;
            }
        }
    }
}

/// Keys eligible for macro bindings; scanning a fixed candidate set keeps the
/// dispatcher free of winit key-enumeration details.
const KEY_CANDIDATES: &[KeyCode] = &[
    KeyCode::KeyA,
    KeyCode::KeyB,
    KeyCode::KeyC,
    KeyCode::KeyD,
    KeyCode::KeyE,
    KeyCode::KeyF,
    KeyCode::KeyG,
    KeyCode::KeyH,
    KeyCode::KeyI,
    KeyCode::KeyJ,
    KeyCode::KeyK,
    KeyCode::KeyL,
    KeyCode::KeyM,
    KeyCode::KeyN,
    KeyCode::KeyO,
    KeyCode::KeyP,
    KeyCode::KeyQ,
    KeyCode::KeyR,
    KeyCode::KeyS,
    KeyCode::KeyT,
    KeyCode::KeyU,
    KeyCode::KeyV,
    KeyCode::KeyW,
    KeyCode::KeyX,
    KeyCode::KeyY,
    KeyCode::KeyZ,
    KeyCode::Digit0,
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
    KeyCode::F1,
    KeyCode::F2,
    KeyCode::F3,
    KeyCode::F4,
    KeyCode::F5,
    KeyCode::F6,
    KeyCode::F7,
    KeyCode::F8,
    KeyCode::F9,
    KeyCode::F10,
    KeyCode::F11,
    KeyCode::F12,
    KeyCode::Numpad1,
    KeyCode::Numpad2,
    KeyCode::Numpad3,
    KeyCode::Numpad4,
    KeyCode::Numpad6,
    KeyCode::Numpad7,
    KeyCode::Numpad8,
    KeyCode::Numpad9,
    KeyCode::Tab,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{RecordingSoundPlayer, SoundCue};
    use crate::input::targeting::TargetKind;
    use crate::input::InputEvent;
    use crate::math::TilePos;
    use crate::pathfind::NoPathfinder;
    use crate::world::{GameObject, MobileData, Serial};

    struct FixedArt;

    impl ArtDimensions for FixedArt {
        fn size_of(&self, _graphic: u16) -> (u32, u32) {
            (44, 44)
        }
    }

    fn scene_with_player() -> GameScene {
        let mut scene = GameScene::new(Profile::default());
        let player = scene.world.insert(GameObject::new(
            0x0190,
            TilePos::new(100, 100, 0),
            ObjKind::Mobile(MobileData::default()),
        ));
        scene.world.set_player(player);
        scene.world.in_game = true;
        scene
    }

    fn run_update(scene: &mut GameScene, now: u64) {
        let mut pathfinder = NoPathfinder;
        let mut sounds = RecordingSoundPlayer::default();
        scene.update(&FixedArt, &mut pathfinder, &mut sounds, now);
    }

    fn click_at(scene: &mut GameScene, x: f32, y: f32) {
        let sender = scene.input_sender();
        sender.send(InputEvent::MouseMove { x, y }).unwrap();
        sender
            .send(InputEvent::MouseDown {
                button: MouseButton::Left,
            })
            .unwrap();
        sender
            .send(InputEvent::MouseUp {
                button: MouseButton::Left,
            })
            .unwrap();
    }

    #[test]
    fn war_mode_double_click_attacks() {
        let mut scene = scene_with_player();
        if let Some(player) = scene.world.player() {
            scene
                .world
                .get_mut(player)
                .unwrap()
                .mobile_mut()
                .unwrap()
                .war_mode = true;
        }
        let enemy_serial = Serial(0x600);
        scene.world.insert(
            GameObject::new(
                0x0191,
                TilePos::new(101, 100, 0),
                ObjKind::Mobile(MobileData::default()),
            )
            .with_serial(enemy_serial),
        );

        // Build lists so hover picking can see the enemy.
        scene.draw(0);
        let screen = scene
            .camera
            .world_to_screen(TilePos::new(100, 100, 0), TilePos::new(101, 100, 0));

        click_at(&mut scene, screen.x, screen.y + 20.0);
        run_update(&mut scene, 10);
        click_at(&mut scene, screen.x, screen.y + 20.0);
        run_update(&mut scene, 60);

        assert!(scene
            .actions
            .as_slice()
            .contains(&ClientAction::Attack {
                serial: enemy_serial,
            }));
    }

    #[test]
    fn delayed_single_click_fires_after_the_window() {
        let mut scene = scene_with_player();
        let serial = Serial(0x700);
        scene.world.insert(
            GameObject::new(
                0x0E75,
                TilePos::new(101, 101, 0),
                ObjKind::Item {
                    amount: 1,
                    container: None,
                    is_corpse: false,
                },
            )
            .with_serial(serial),
        );
        scene.draw(0);
        let screen = scene
            .camera
            .world_to_screen(TilePos::new(100, 100, 0), TilePos::new(101, 101, 0));

        click_at(&mut scene, screen.x, screen.y + 20.0);
        run_update(&mut scene, 0);
        assert!(scene.actions.is_empty(), "single click is delayed");

        run_update(&mut scene, crate::input::DOUBLE_CLICK_MS + 1);
        assert_eq!(
            scene.actions.as_slice(),
            &[ClientAction::SingleClick { serial }]
        );
    }

    #[test]
    fn escape_cancels_an_active_target() {
        let mut scene = scene_with_player();
        scene.targeting.request(TargetKind::Object, None);
        let sender = scene.input_sender();
        sender
            .send(InputEvent::KeyDown {
                key: KeyCode::Escape,
            })
            .unwrap();
        run_update(&mut scene, 0);
        assert!(!scene.targeting.is_targeting());
        assert_eq!(scene.actions.as_slice(), &[ClientAction::CancelTarget]);
    }

    #[test]
    fn targeting_consumes_the_release_instead_of_clicking() {
        let mut scene = scene_with_player();
        let serial = Serial(0x800);
        scene.world.insert(
            GameObject::new(
                0x0E75,
                TilePos::new(101, 101, 0),
                ObjKind::Item {
                    amount: 1,
                    container: None,
                    is_corpse: false,
                },
            )
            .with_serial(serial),
        );
        scene.draw(0);
        scene.targeting.request(TargetKind::Object, None);
        let screen = scene
            .camera
            .world_to_screen(TilePos::new(100, 100, 0), TilePos::new(101, 101, 0));
        click_at(&mut scene, screen.x, screen.y + 20.0);
        run_update(&mut scene, 0);

        assert_eq!(
            scene.actions.as_slice(),
            &[ClientAction::TargetObject {
                serial,
                graphic: 0x0E75,
                x: 101,
                y: 101,
                z: 0,
            }]
        );
        // No single click follows a consumed target.
        run_update(&mut scene, crate::input::DOUBLE_CLICK_MS + 1);
        assert_eq!(scene.actions.len(), 1);
    }

    #[test]
    fn rejected_drop_keeps_the_item_held() {
        let mut scene = scene_with_player();
        scene.item_hold = ItemHold {
            enabled: true,
            fixed: false,
            serial: Serial(0x900),
            graphic: 0x0E75,
            amount: 1,
        };
        scene.draw(0);
        // Release over empty space: no target resolves.
        click_at(&mut scene, 10.0, 10.0);
        let mut pathfinder = NoPathfinder;
        let mut sounds = RecordingSoundPlayer::default();
        scene.update(&FixedArt, &mut pathfinder, &mut sounds, 0);

        assert!(scene.actions.is_empty());
        assert_eq!(sounds.played, vec![SoundCue::DropFailed]);
        assert!(scene.item_hold.enabled, "item stays on the cursor");
    }

    #[test]
    fn movement_request_walks_and_faces_the_player() {
        let mut scene = scene_with_player();
        let sender = scene.input_sender();
        sender
            .send(InputEvent::KeyDown {
                key: KeyCode::ArrowRight,
            })
            .unwrap();
        run_update(&mut scene, 0);
        assert_eq!(
            scene.actions.as_slice(),
            &[ClientAction::Walk {
                direction: Direction::East,
                run: false,
            }]
        );
        let facing = scene
            .world
            .player_object()
            .unwrap()
            .mobile()
            .unwrap()
            .facing;
        assert_eq!(facing, Direction::East);
    }

    #[test]
    fn death_short_circuits_the_frame_plan() {
        let mut scene = scene_with_player();
        if let Some(player) = scene.world.player() {
            scene
                .world
                .get_mut(player)
                .unwrap()
                .mobile_mut()
                .unwrap()
                .dead = true;
        }
        run_update(&mut scene, 1000);
        let plan = scene.draw(1500);
        assert!(plan.death_overlay.is_some());
        assert!(plan.world.is_none());
    }

    #[test]
    fn lights_reset_only_at_finish_draw() {
        let mut scene = scene_with_player();
        scene.world.tiledata.insert(
            0x0F6B,
            crate::world::TileData {
                caps: crate::world::Capabilities {
                    drawable: true,
                    light_source: true,
                    ..Default::default()
                },
                light_index: 6,
                ..Default::default()
            },
        );
        scene.world.insert(GameObject::new(
            0x0F6B,
            TilePos::new(101, 101, 0),
            ObjKind::Item {
                amount: 1,
                container: None,
                is_corpse: false,
            },
        ));
        scene.draw(0);
        assert_eq!(scene.lights().len(), 1);
        assert_eq!(scene.stats().lights_drawn, 1);
        scene.finish_draw();
        assert!(scene.lights().is_empty());
    }
}
