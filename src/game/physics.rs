//! Circle collision resolution and kinematic helpers

/// Distances below this are treated as coincident and left unresolved
const MIN_SEPARATION: f32 = 1e-4;

/// A moving circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub radius: f32,
    pub mass: f32,
}

impl Body {
    pub fn new(x: f32, y: f32, radius: f32, mass: f32) -> Self {
        Self {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            radius,
            mass,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vel_x * self.vel_x + self.vel_y * self.vel_y).sqrt()
    }

    /// Scale velocity down to `max_speed` if it exceeds it
    pub fn clamp_speed(&mut self, max_speed: f32) {
        let (vx, vy) = PhysicsSystem::clamp_speed(self.vel_x, self.vel_y, max_speed);
        self.vel_x = vx;
        self.vel_y = vy;
    }

    pub fn integrate(&mut self) {
        self.x += self.vel_x;
        self.y += self.vel_y;
    }

    pub fn stop(&mut self) {
        self.vel_x = 0.0;
        self.vel_y = 0.0;
    }
}

/// Which side of a pair absorbs the positional correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separation {
    /// Only the second body is pushed out (player vs ball)
    PushSecond,
    /// Both bodies move half the overlap
    Symmetric,
}

/// Stateless collision routines
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Clamp a velocity vector to a maximum magnitude
    pub fn clamp_speed(vel_x: f32, vel_y: f32, max_speed: f32) -> (f32, f32) {
        let speed = (vel_x * vel_x + vel_y * vel_y).sqrt();
        if speed > max_speed && speed > 0.0 {
            let scale = max_speed / speed;
            (vel_x * scale, vel_y * scale)
        } else {
            (vel_x, vel_y)
        }
    }

    /// Separate two overlapping circles and exchange an elastic impulse
    /// along the contact normal, damped by `restitution`.
    ///
    /// Returns whether the pair was in contact. Coincident centres have no
    /// usable normal and are skipped.
    pub fn resolve_circle_collision(
        a: &mut Body,
        b: &mut Body,
        separation: Separation,
        restitution: f32,
    ) -> bool {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let dist = (dx * dx + dy * dy).sqrt();
        let min_dist = a.radius + b.radius;

        if dist >= min_dist || dist < MIN_SEPARATION {
            return false;
        }

        let nx = dx / dist;
        let ny = dy / dist;
        let overlap = min_dist - dist;

        match separation {
            Separation::PushSecond => {
                b.x += nx * overlap;
                b.y += ny * overlap;
            }
            Separation::Symmetric => {
                let half = overlap * 0.5;
                a.x -= nx * half;
                a.y -= ny * half;
                b.x += nx * half;
                b.y += ny * half;
            }
        }

        // Only exchange momentum while approaching
        let dvn = (a.vel_x - b.vel_x) * nx + (a.vel_y - b.vel_y) * ny;
        if dvn > 0.0 {
            let j = 2.0 * dvn / (a.mass + b.mass);
            a.vel_x -= j * b.mass * nx * restitution;
            a.vel_y -= j * b.mass * ny * restitution;
            b.vel_x += j * a.mass * nx * restitution;
            b.vel_y += j * a.mass * ny * restitution;
        }

        true
    }

    /// Bounce a circle off a fixed point obstacle (goal post).
    pub fn resolve_post_collision(
        body: &mut Body,
        post_x: f32,
        post_y: f32,
        post_radius: f32,
        restitution: f32,
    ) -> bool {
        let dx = body.x - post_x;
        let dy = body.y - post_y;
        let dist = (dx * dx + dy * dy).sqrt();
        let min_dist = body.radius + post_radius;

        if dist >= min_dist || dist < MIN_SEPARATION {
            return false;
        }

        let nx = dx / dist;
        let ny = dy / dist;
        let overlap = min_dist - dist;
        body.x += nx * overlap;
        body.y += ny * overlap;

        let dot = body.vel_x * nx + body.vel_y * ny;
        if dot < 0.0 {
            body.vel_x -= 2.0 * dot * nx * restitution;
            body.vel_y -= 2.0 * dot * ny * restitution;
        }

        true
    }
}
