//! Arena tuning constants

/// Arena width in world units
pub const ARENA_WIDTH: f32 = 1300.0;
/// Arena height in world units
pub const ARENA_HEIGHT: f32 = 650.0;

/// Players per room
pub const MAX_PLAYERS_PER_ROOM: usize = 2;

/// Player physics and combat constants
pub const PLAYER_MAX_HP: i32 = 10;
pub const PLAYER_WIDTH: f32 = 50.0;
pub const PLAYER_HEIGHT: f32 = 50.0;
pub const PLAYER_MAX_VELOCITY: f32 = 400.0;
pub const PLAYER_ACCELERATION: f32 = 1000.0;
/// Per-frame velocity retention at 60 fps when no input is held
pub const PLAYER_FRICTION: f32 = 0.95;
/// Velocity components below this snap to zero while decaying
pub const VELOCITY_SNAP: f32 = 0.1;
/// Seconds between shots
pub const PLAYER_SHOOT_COOLDOWN: f32 = 2.0;

/// Bullet constants
pub const BULLET_RADIUS: f32 = 5.0;
pub const BULLET_SPEED: f32 = 1000.0;
pub const BULLET_DAMAGE: i32 = 2;
/// A bullet is removed once its bounce count exceeds this
pub const BULLET_MAX_BOUNCES: u32 = 5;
/// Bounces needed before a bullet can deal damage
pub const BULLET_ARMING_BOUNCES: u32 = 1;

/// Cosmetic palette for player colors
pub const PLAYER_COLORS: [&str; 6] = ["blue", "red", "yellow", "purple", "orange", "cyan"];
