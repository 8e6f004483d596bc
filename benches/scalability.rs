//! Scalability benchmarks for the arena server.
//!
//! Exercises the per-tick systems at growing tank counts to keep the
//! full step comfortably inside the 16.7 ms budget.
//!
//! Run with: cargo bench --bench scalability

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use uuid::Uuid;

use tank_arena_server::config::GameSettings;
use tank_arena_server::game::constants::{arena, tick};
use tank_arena_server::game::spatial::{SpatialEntry, SpatialId, SpatialIndex};
use tank_arena_server::game::state::{GameState, Shell, Tank, Tree};
use tank_arena_server::game::systems::{collision, movement, shells};
use tank_arena_server::util::bounds::Aabb;
use tank_arena_server::util::pool::Pool;
use tank_arena_server::util::vec2::Vec2;

/// Game state with randomly placed tanks, trees and shells in flight.
fn create_state(tank_count: usize) -> GameState {
    let settings = GameSettings::default();
    let mut state = GameState::new();
    let mut rng = rand::thread_rng();

    for _ in 0..tank_count {
        let id = Uuid::new_v4();
        let position = Vec2::new(
            rng.gen_range(50.0..arena::WIDTH - 50.0),
            rng.gen_range(50.0..arena::HEIGHT - 50.0),
        );
        let mut tank = Tank::new(id, position, true, &settings.attribute_limits);
        tank.angle = rng.gen_range(0.0..std::f32::consts::TAU);
        tank.velocity = Vec2::from_angle(tank.angle) * rng.gen_range(0.0..50.0);
        tank.target_velocity = tank.velocity;
        state.tanks.insert(id, tank);
    }

    for i in 0..30u32 {
        let position = Vec2::new(
            rng.gen_range(100.0..arena::WIDTH - 100.0),
            rng.gen_range(100.0..arena::HEIGHT - 100.0),
        );
        state
            .trees
            .push(Tree::new(i, position, rng.gen_range(32.0..64.0), 0, 0.0));
    }

    // Shells for a tenth of the tanks
    let shooters: Vec<Uuid> = state.tanks.keys().copied().take(tank_count / 10).collect();
    for shooter in shooters {
        let id = state.next_shell_id();
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let position = Vec2::new(
            rng.gen_range(100.0..arena::WIDTH - 100.0),
            rng.gen_range(100.0..arena::HEIGHT - 100.0),
        );
        let mut shell = Shell::default();
        shell.reset(id, shooter, position, Vec2::from_angle(angle) * 400.0, 0.0, 0.0);
        state.shells.push(shell);
    }

    state
}

fn bench_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement");
    group.sample_size(50);
    let settings = GameSettings::default();

    for count in [10, 50, 100, 250] {
        let mut state = create_state(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("tanks", count), &count, |b, _| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                movement::update(&mut state, &settings, black_box(tick::STEP_MS), &mut rng);
            })
        });
    }
    group.finish();
}

fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");
    group.sample_size(50);
    let settings = GameSettings::default();

    for count in [10, 50, 100, 250] {
        let mut state = create_state(count);
        let mut pool = Pool::with_capacity(256);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("resolve", count), &count, |b, _| {
            b.iter(|| {
                black_box(collision::resolve(&mut state, &settings, &mut pool));
            })
        });
    }
    group.finish();
}

fn bench_spatial_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_index");
    group.sample_size(50);

    for count in [50, 100, 500, 1000] {
        let mut rng = rand::thread_rng();
        let entries: Vec<SpatialEntry> = (0..count)
            .map(|i| SpatialEntry {
                id: SpatialId::Tree(i as u32),
                bounds: Aabb::from_center(
                    Vec2::new(
                        rng.gen_range(0.0..arena::WIDTH),
                        rng.gen_range(0.0..arena::HEIGHT),
                    ),
                    40.0,
                    30.0,
                ),
            })
            .collect();
        let world = Aabb::new(0.0, 0.0, arena::WIDTH, arena::HEIGHT);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("build_and_query", count), &count, |b, _| {
            b.iter(|| {
                let index = SpatialIndex::build(world, entries.iter().copied());
                let probe = Aabb::from_center(Vec2::new(750.0, 450.0), 40.0, 30.0);
                black_box(index.query(&probe, 25.0, None))
            })
        });
    }
    group.finish();
}

fn bench_full_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_step");
    group.sample_size(30);
    let settings = GameSettings::default();

    for count in [10, 50, 100] {
        let mut state = create_state(count);
        let mut pool = Pool::with_capacity(256);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("systems", count), &count, |b, _| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                state.game_time_ms += tick::STEP_MS;
                movement::update(&mut state, &settings, tick::STEP_MS, &mut rng);
                shells::integrate(&mut state, tick::STEP_MS);
                black_box(collision::resolve(&mut state, &settings, &mut pool));
                shells::cull_outside(&mut state, &mut pool);
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_movement,
    bench_collision,
    bench_spatial_index,
    bench_full_step,
);

criterion_main!(benches);
