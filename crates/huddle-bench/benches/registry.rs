//! Registry benchmarks for Huddle.
//!
//! These benchmarks measure the cost of the mutations the hub event loop
//! applies under its write lock.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use huddle_bench::{identity, populated_registry, BENCH_ROOM};
use huddle_core::{ConnectionHandle, Registry, Room};

/// Benchmark register followed by unregister of one connection.
fn bench_register_unregister(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_unregister");

    for existing in [0usize, 1000, 10_000] {
        let (mut registry, _handles) = populated_registry(existing, 1);
        let mut n = existing;

        group.bench_with_input(BenchmarkId::from_parameter(existing), &existing, |b, _| {
            b.iter(|| {
                n += 1;
                let (handle, _rx) = ConnectionHandle::open(identity(n), 1);
                let id = handle.id;
                registry.register(handle);
                black_box(registry.unregister(id))
            })
        });
    }

    group.finish();
}

/// Benchmark join followed by leave of a busy room.
fn bench_join_leave(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_leave");

    for members in [10usize, 1000] {
        let (mut registry, _handles) = populated_registry(members, 1);
        let (guest, _rx) = ConnectionHandle::open(identity(members + 1), 1);
        let user = guest.identity.user_id.clone();
        let device = guest.identity.device_id.clone();
        registry.register(guest);

        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, _| {
            b.iter(|| {
                registry.join_room(&user, &device, BENCH_ROOM).unwrap();
                black_box(registry.leave_room(&user, &device, BENCH_ROOM).unwrap())
            })
        });
    }

    group.finish();
}

/// Benchmark unregistering a connection that is the last member of many rooms.
fn bench_unregister_many_rooms(c: &mut Criterion) {
    c.bench_function("unregister_100_rooms", |b| {
        b.iter_batched(
            || {
                let mut registry = Registry::new();
                let (handle, rx) = ConnectionHandle::open(identity(0), 1);
                let id = handle.id;
                registry.register(handle);
                for r in 0..100 {
                    let room_id = format!("room-{r}");
                    registry.create_room(Room::new(room_id.clone(), "r", "", "user-0", "User 0"));
                    registry.join_room("user-0", "device-0", &room_id).unwrap();
                }
                (registry, id, rx)
            },
            |(mut registry, id, _rx)| black_box(registry.unregister(id)),
            criterion::BatchSize::SmallInput,
        )
    });
}

/// Benchmark read-side snapshots.
fn bench_snapshots(c: &mut Criterion) {
    let (registry, _handles) = populated_registry(1000, 1);

    c.bench_function("room_detail_1000", |b| {
        b.iter(|| black_box(registry.room_detail(BENCH_ROOM)))
    });
    c.bench_function("users_1000", |b| b.iter(|| black_box(registry.users())));
}

criterion_group!(
    benches,
    bench_register_unregister,
    bench_join_leave,
    bench_unregister_many_rooms,
    bench_snapshots
);
criterion_main!(benches);
