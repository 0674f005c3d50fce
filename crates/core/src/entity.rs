//! Plain data for the things that live on the field: players, orbs, the
//! direction a player is steering toward, and the client-only tracker used to
//! visualize reconciliation.

use glam::Vec2;

use crate::constants::{
    BASE_VELOCITY, EAT_VALUE_OFFSET, MAX_RADIUS, START_RADIUS, VELOCITY_SLOW_FACTOR,
    VIEW_GROWTH_RATE,
};

/// A player's desired direction, expressed as a vector from the player toward
/// their pointer. Magnitude (not just direction) matters: a short vector means
/// "ease off".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Inputs {
    pub x: f32,
    pub y: f32,
}

impl Inputs {
    pub const ZERO: Inputs = Inputs { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f32 {
        self.as_vec2().length()
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// A circular avatar. `id > 0` is a human player, `id < 0` is a bot, `id == 0`
/// is unassigned.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color_idx: u8,
    pub scale: f32,
    pub inputs: Inputs,
}

impl Player {
    pub fn new(id: i64, name: String, x: f32, y: f32, color_idx: u8) -> Self {
        Self {
            id,
            name,
            x,
            y,
            radius: START_RADIUS,
            color_idx,
            scale: 1.0,
            inputs: Inputs::ZERO,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.id < 0
    }

    pub fn find_distance(&self, x: f32, y: f32) -> f32 {
        Vec2::new(self.x, self.y).distance(Vec2::new(x, y))
    }

    pub fn aabb(&self) -> (f32, f32, f32, f32) {
        (
            self.x - self.radius,
            self.y - self.radius,
            self.x + self.radius,
            self.y + self.radius,
        )
    }

    /// Grows this player by consuming something of `other_radius`, following
    /// the eat law: `r' = sqrt(r^2 + (r_other - EAT_VALUE_OFFSET)^2)`, clamped
    /// to `MAX_RADIUS`. Recomputes view scale.
    pub fn eat(&mut self, other_radius: f32) {
        let adjusted = (other_radius - EAT_VALUE_OFFSET).max(0.0);
        let grown = (self.radius.powi(2) + adjusted.powi(2)).sqrt();
        self.radius = grown.min(MAX_RADIUS);
        self.recompute_scale();
    }

    pub fn recompute_scale(&mut self) {
        self.scale = (self.radius / START_RADIUS).powf(VIEW_GROWTH_RATE);
    }

    /// Resets a player to a fresh spawn, keeping its name (and, for humans,
    /// its network identity is reassigned by the caller, not here).
    pub fn reset_to_spawn(&mut self, x: f32, y: f32, color_idx: u8) {
        self.x = x;
        self.y = y;
        self.radius = START_RADIUS;
        self.color_idx = color_idx;
        self.scale = 1.0;
        self.inputs = Inputs::ZERO;
    }

    /// Advances position by `dt` seconds following the move law: normalize
    /// inputs, scale by a radius-dependent top speed, dampen when the pointer
    /// is close to the player (so small movements don't overshoot), otherwise
    /// suppress tiny residual stutter. Clamps to `[0, field - 1]`.
    pub fn apply_move(&mut self, dt: f32, field_width: f32, field_height: f32) {
        let input_vec = self.inputs.as_vec2();
        let mag = input_vec.length();
        let mut velocity = if mag > f32::EPSILON {
            input_vec / mag
        } else {
            Vec2::ZERO
        };

        let top_speed = BASE_VELOCITY * (START_RADIUS / self.radius).powf(VELOCITY_SLOW_FACTOR);
        velocity *= top_speed;

        let scaled_radius = self.radius / self.scale.max(f32::EPSILON);
        if mag < scaled_radius {
            velocity *= mag / scaled_radius.max(f32::EPSILON);
        } else {
            if velocity.x.abs() < 30.0 {
                velocity.x = 0.0;
            }
            if velocity.y.abs() < 30.0 {
                velocity.y = 0.0;
            }
        }

        let moved = Vec2::new(self.x, self.y) + velocity * dt;
        self.x = moved.x.clamp(0.0, (field_width - 1.0).max(0.0));
        self.y = moved.y.clamp(0.0, (field_height - 1.0).max(0.0));
    }
}

/// A passive, stationary consumable.
#[derive(Debug, Clone, Copy)]
pub struct Orb {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color_idx: u8,
}

impl Orb {
    pub fn new(id: u32, x: f32, y: f32, radius: f32, color_idx: u8) -> Self {
        Self {
            id,
            x,
            y,
            radius,
            color_idx,
        }
    }

    pub fn aabb(&self) -> (f32, f32, f32, f32) {
        (
            self.x - self.radius,
            self.y - self.radius,
            self.x + self.radius,
            self.y + self.radius,
        )
    }
}

/// Client-only labeled marker: mirrors either the server-authoritative
/// position or the delayed past-player position of the local player, so the
/// reconciliation gap can be visualized.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tracker {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub visible: bool,
}

impl Tracker {
    pub fn update(&mut self, x: f32, y: f32, radius: f32) {
        self.x = x;
        self.y = y;
        self.radius = radius;
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.radius = 0.0;
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eat_grows_and_clamps() {
        let mut p = Player::new(1, "a".into(), 0.0, 0.0, 0);
        p.eat(50.0);
        let expected = (START_RADIUS.powi(2) + (50.0 - EAT_VALUE_OFFSET).powi(2)).sqrt();
        assert!((p.radius - expected).abs() < 1e-4);

        p.radius = MAX_RADIUS - 1.0;
        p.eat(10_000.0);
        assert_eq!(p.radius, MAX_RADIUS);
    }

    #[test]
    fn move_clamps_to_field() {
        let mut p = Player::new(1, "a".into(), 0.0, 0.0, 0);
        p.inputs = Inputs::new(-100.0, -100.0);
        p.apply_move(1.0, 1000.0, 1000.0);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn move_dampens_near_pointer() {
        let mut p = Player::new(1, "a".into(), 500.0, 500.0, 0);
        p.inputs = Inputs::new(1.0, 0.0);
        let before = p.x;
        p.apply_move(0.01, 2560.0, 1440.0);
        assert!(p.x > before);
        assert!(p.x - before < BASE_VELOCITY * 0.01);
    }
}
