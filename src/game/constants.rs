/// Arena geometry. Origin top-left, y grows downward.
pub mod arena {
    /// Arena width in virtual pixels
    pub const WIDTH: f32 = 1500.0;
    /// Arena height in virtual pixels
    pub const HEIGHT: f32 = 900.0;
    /// Tanks are kept this far inside the arena edge
    pub const TANK_MARGIN: f32 = 10.0;
}

/// Tick loop timing
pub mod tick {
    /// Simulation rate in Hz
    pub const RATE: u32 = 60;
    /// Fixed step in milliseconds
    pub const STEP_MS: f64 = 1000.0 / RATE as f64;
    /// Maximum catch-up steps per wake before dropping time
    pub const MAX_CATCHUP_STEPS: u32 = 5;
    /// AI controllers run every Nth step
    pub const AI_FRAME_SKIP: u64 = 3;
    /// Delta snapshot cadence in milliseconds
    pub const BROADCAST_INTERVAL_MS: u64 = 100;
}

/// Tank geometry and motion
pub mod tank {
    /// Broad-phase AABB width
    pub const WIDTH: f32 = 40.0;
    /// Broad-phase AABB height
    pub const HEIGHT: f32 = 30.0;
    /// Radius used for the tree bounce circle test
    pub const BODY_RADIUS: f32 = 20.0;
    /// Velocity lerp factor toward the target each step
    pub const VELOCITY_LERP: f32 = 0.12;
    /// Velocity multiplier per step when there is no movement intent
    pub const IDLE_FRICTION: f32 = 0.7;
    /// Below this speed an idle tank snaps to rest
    pub const REST_SPEED: f32 = 0.1;
    /// Movement intents shorter than this are treated as none
    pub const INTENT_EPSILON: f32 = 0.01;
    /// Turn rate scale: radians per second = rotation attribute * this
    pub const TURN_RATE_SCALE: f32 = 0.06;
    /// Heading differences below this are not corrected
    pub const TURN_DEADZONE: f32 = 0.005;
    /// Restitution of the inward velocity component on tree contact
    pub const TREE_RESTITUTION: f32 = 0.8;
    /// Velocity retained after tree contact friction
    pub const TREE_FRICTION: f32 = 0.95;
    /// Recoil animation length in milliseconds
    pub const RECOIL_DURATION_MS: f64 = 1000.0;
    /// Peak body recoil offset in pixels
    pub const RECOIL_BODY_OFFSET: f32 = 4.0;
    /// Peak turret recoil offset in pixels
    pub const RECOIL_TURRET_OFFSET: f32 = 7.0;
    /// Turret pendulum swing amplitude in radians
    pub const RECOIL_SWING: f32 = 0.06;
}

/// Shell flight and firing
pub mod shell {
    /// Muzzle offset along the facing direction
    pub const MUZZLE_OFFSET: f32 = 20.0;
    /// Shell AABB edge length
    pub const SIZE: f32 = 6.0;
    /// Window after a shot during which the shooter cannot be hit
    pub const FIRING_IMMUNITY_MS: f64 = 200.0;
    /// Candidate search radius for shell-tank tests
    pub const TANK_SEARCH_RADIUS: f32 = 25.0;
    /// Candidate search radius for shell-tree tests
    pub const TREE_SEARCH_RADIUS: f32 = 15.0;
    /// Shells faster than this also get the proximity fallback test
    pub const FAST_SPEED: f32 = 10.0;
    /// Center distance that counts as a hit for fast shells
    pub const FAST_HIT_DISTANCE: f32 = 20.0;
}

/// Tree trunk geometry and swing response
pub mod tree {
    /// Trunk circle radius = size / this
    pub const TRUNK_RADIUS_DIVISOR: f32 = 16.0;
    /// Trunk AABB edge length for the spatial index
    pub const TRUNK_BOUNDS: f32 = 12.0;
    /// Pendulum gravity coefficient
    pub const SWING_GRAVITY: f32 = 2.0;
    /// Pendulum damping coefficient
    pub const SWING_DAMPING: f32 = 0.3;
    /// Swing angle clamp in radians
    pub const SWING_MAX: f32 = 1.0;
    /// Foliage spring stiffness
    pub const FOLIAGE_STIFFNESS: f32 = 0.2;
    /// Foliage spring damping
    pub const FOLIAGE_DAMPING: f32 = 0.2;
    /// Foliage offset clamp in pixels
    pub const FOLIAGE_MAX_OFFSET: f32 = 5.0;
    /// Active integration window after an impact, in milliseconds
    pub const ACTIVE_WINDOW_MS: f64 = 5000.0;
    /// Velocity decay per step once the impact has aged out
    pub const SETTLE_VELOCITY_DECAY: f32 = 0.95;
    /// Displacement decay per step once the impact has aged out
    pub const SETTLE_OFFSET_DECAY: f32 = 0.98;
    /// Below these magnitudes the swing snaps to rest
    pub const REST_EPSILON: f32 = 0.001;
    /// Impact force divisor before clamping
    pub const IMPULSE_FORCE_DIVISOR: f32 = 10.0;
    /// Impulse scale clamp
    pub const IMPULSE_MAX: f32 = 5.0;
    /// Swing impulse coefficient
    pub const SWING_IMPULSE: f32 = 0.02;
    /// Frequency boost applied when a tank drives into the trunk
    pub const BOUNCE_BOOST_FACTOR: f32 = 1.8;
    /// Frequency boost duration in milliseconds
    pub const BOUNCE_BOOST_MS: f64 = 1200.0;
}

/// Upgrade pickups
pub mod upgrade {
    /// Pickup circle radius
    pub const RADIUS: f32 = 16.0;
    /// AABB edge length
    pub const SIZE: f32 = 32.0;
    /// Extra reach on the narrow pickup test
    pub const PICKUP_SLACK: f32 = 5.0;
    /// Minimum clearance from obstacles when respawning
    pub const SPAWN_CLEARANCE: f32 = 50.0;
    /// Placement attempts before the clearance rule is waived
    pub const SPAWN_ATTEMPTS: u32 = 100;
}

/// Spatial index tuning
pub mod spatial {
    /// Uniform grid cell edge in pixels
    pub const CELL_SIZE: f32 = 50.0;
    /// Above this entity count the index switches to a quadtree
    pub const QUADTREE_THRESHOLD: usize = 100;
    /// Objects per quadtree node before splitting
    pub const QUADTREE_NODE_CAP: usize = 8;
    /// Maximum quadtree depth
    pub const QUADTREE_MAX_DEPTH: u32 = 6;
}

/// AI behavior thresholds shared by all difficulty levels
pub mod ai {
    /// Attribute ratio under which an upgrade becomes critical
    pub const CRITICAL_RATIO: f32 = 0.25;
    /// Urgency multiplier for critical upgrade needs
    pub const CRITICAL_URGENCY: f32 = 3.0;
    /// Absolute gasoline level that triggers a fuel run
    pub const LOW_GASOLINE: f32 = 30.0;
    /// Ammo count that triggers an ammunition run
    pub const LOW_AMMO: f32 = 5.0;
    /// Ammo count needed before hunting enemies
    pub const COMBAT_AMMO: f32 = 3.0;
    /// Distance under which the AI strafes instead of closing
    pub const STRAFE_DISTANCE: f32 = 150.0;
    /// Upgrades count as reached inside this distance
    pub const UPGRADE_REACH: f32 = 25.0;
    /// Minimum firing distance
    pub const MIN_FIRE_DISTANCE: f32 = 30.0;
    /// Maximum firing distance
    pub const MAX_FIRE_DISTANCE: f32 = 400.0;
    /// Refuse to fire below this distance (barrel overlap)
    pub const POINT_BLANK: f32 = 25.0;
    /// Perpendicular target speed above which the shot is skipped
    pub const MAX_CROSSING_SPEED: f32 = 8.0;
    /// Angle gate for slow targets
    pub const LENIENT_ANGLE: f32 = 1.2;
    /// Angle gate for moving targets
    pub const STRICT_ANGLE: f32 = 0.8;
    /// Trees repel inside this radius
    pub const AVOID_RADIUS: f32 = 80.0;
    /// Avoidance blend strength against the goal direction
    pub const AVOID_BLEND: f32 = 0.5;
    /// Avoidance turns off inside this distance to the goal
    pub const AVOID_GOAL_CUTOFF: f32 = 50.0;
    /// Movement below this distance over the stuck window counts as stuck
    pub const STUCK_DISTANCE: f32 = 20.0;
    /// Stuck detection window in milliseconds
    pub const STUCK_WINDOW_MS: f64 = 3000.0;
    /// Speed factor of the emergency unstick move
    pub const UNSTICK_SPEED: f32 = 0.8;
    /// Speed factor while wandering
    pub const WANDER_SPEED: f32 = 0.4;
    /// Speed factor of the cautious approach
    pub const SLOW_APPROACH_SPEED: f32 = 0.6;
    /// Visibility cache lifetime in milliseconds
    pub const CACHE_TTL_MS: f64 = 500.0;
}
