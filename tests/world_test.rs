// Visibility scenarios for the world service, driven without sockets

use std::sync::Arc;

use rusty_realm::config::AoiConfig;
use rusty_realm::core::{Connection, Message, SendPolicy};
use rusty_realm::protocol::{
    decode_body, Broadcast, SyncPid, MSG_BROADCAST, MSG_VANISH, TP_APPEAR, TP_CHAT, TP_MOVE,
};
use rusty_realm::world::{ActorId, Position, World};
use tempfile::TempDir;

// 3x3 grid of 10x10 cells
fn small_world() -> (World, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let aoi = AoiConfig {
        min_x: 0.0,
        max_x: 30.0,
        cnts_x: 3,
        min_z: 0.0,
        max_z: 30.0,
        cnts_z: 3,
    };
    (World::new(aoi, dir.path()).unwrap(), dir)
}

fn connection(id: u32) -> Arc<Connection> {
    Arc::new(Connection::new(id, "127.0.0.1:1".parse().unwrap(), 256, SendPolicy::Reject))
}

// Center of cell (col, row)
fn cell(col: u32, row: u32) -> Position {
    Position::new(col as f32 * 10.0 + 5.0, 0.0, row as f32 * 10.0 + 5.0, 0.0)
}

fn drain(conn: &Connection) -> Vec<Message> {
    std::iter::from_fn(|| conn.outbound().try_pop()).collect()
}

fn broadcasts(messages: &[Message], tp: u32, pid: ActorId) -> usize {
    messages
        .iter()
        .filter(|m| m.tag == MSG_BROADCAST)
        .map(|m| decode_body::<Broadcast>(&m.payload).unwrap())
        .filter(|b| b.tp == tp && b.pid == pid)
        .count()
}

fn vanishes(messages: &[Message], pid: ActorId) -> usize {
    messages
        .iter()
        .filter(|m| m.tag == MSG_VANISH)
        .map(|m| decode_body::<SyncPid>(&m.payload).unwrap())
        .filter(|v| v.pid == pid)
        .count()
}

#[tokio::test]
async fn test_neighbor_enters_then_moves_out_of_view() {
    let (world, _dir) = small_world();
    let (ca, cb) = (connection(1), connection(2));

    let a = world.spawn_at(&ca, cell(0, 0)).await.unwrap();
    let b = world.spawn_at(&cb, cell(2, 2)).await.unwrap();
    world.enter(&a).await.unwrap();
    world.enter(&b).await.unwrap();
    // (2,2) is outside the 3x3 block around (0,0)
    assert_eq!(broadcasts(&drain(&ca), TP_APPEAR, b.id), 0);
    drain(&cb);

    world.move_actor(b.id, cell(1, 0)).await.unwrap();
    let seen_by_a = drain(&ca);
    let seen_by_b = drain(&cb);
    assert_eq!(broadcasts(&seen_by_a, TP_APPEAR, b.id), 1);
    assert_eq!(broadcasts(&seen_by_b, TP_APPEAR, a.id), 1);
    assert_eq!(broadcasts(&seen_by_a, TP_MOVE, b.id), 1);
    assert_eq!(vanishes(&seen_by_a, b.id), 0);

    world.move_actor(b.id, cell(2, 2)).await.unwrap();
    let seen_by_a = drain(&ca);
    let seen_by_b = drain(&cb);
    assert_eq!(vanishes(&seen_by_a, b.id), 1);
    assert_eq!(vanishes(&seen_by_b, a.id), 1);
    assert_eq!(broadcasts(&seen_by_a, TP_APPEAR, b.id), 0);
    assert_eq!(broadcasts(&seen_by_a, TP_MOVE, b.id), 0);
}

#[tokio::test]
async fn test_toggling_between_cells_alternates_visibility() {
    let (world, _dir) = small_world();
    let (ca, cb) = (connection(1), connection(2));

    let a = world.spawn_at(&ca, cell(0, 0)).await.unwrap();
    let b = world.spawn_at(&cb, cell(1, 0)).await.unwrap();
    world.enter(&a).await.unwrap();
    world.enter(&b).await.unwrap();
    drain(&ca);
    drain(&cb);

    for _ in 0..5 {
        // (2,0) is out of view of (0,0), (1,0) is in view
        world.move_actor(b.id, cell(2, 0)).await.unwrap();
        let seen = drain(&ca);
        assert_eq!(vanishes(&seen, b.id), 1);
        assert_eq!(broadcasts(&seen, TP_APPEAR, b.id), 0);

        world.move_actor(b.id, cell(1, 0)).await.unwrap();
        let seen = drain(&ca);
        assert_eq!(vanishes(&seen, b.id), 0);
        assert_eq!(broadcasts(&seen, TP_APPEAR, b.id), 1);
    }
}

#[tokio::test]
async fn test_vanish_precedes_appear_precedes_move() {
    let (world, _dir) = small_world();
    let (ca, cb, cc) = (connection(1), connection(2), connection(3));

    // a watches the left column, c the right one
    let a = world.spawn_at(&ca, cell(0, 1)).await.unwrap();
    let b = world.spawn_at(&cb, cell(0, 1)).await.unwrap();
    let c = world.spawn_at(&cc, cell(2, 1)).await.unwrap();
    for actor in [&a, &b, &c] {
        world.enter(actor).await.unwrap();
    }
    drain(&cb);

    // b jumps from the left column to the right one
    world.move_actor(b.id, cell(2, 1)).await.unwrap();
    let tags: Vec<u32> = drain(&cb).iter().map(|m| m.tag).collect();
    let first_appear = tags.iter().position(|&t| t == MSG_BROADCAST).unwrap();
    let last_vanish = tags.iter().rposition(|&t| t == MSG_VANISH).unwrap();
    assert!(last_vanish < first_appear);
}

#[tokio::test]
async fn test_talk_reaches_everyone_including_speaker() {
    let (world, _dir) = small_world();
    let (ca, cb) = (connection(1), connection(2));
    let a = world.spawn_at(&ca, cell(0, 0)).await.unwrap();
    let b = world.spawn_at(&cb, cell(2, 2)).await.unwrap();
    world.enter(&a).await.unwrap();
    world.enter(&b).await.unwrap();
    drain(&ca);
    drain(&cb);

    world.talk(a.id, "hello").await.unwrap();
    for conn in [&ca, &cb] {
        let seen = drain(conn);
        assert_eq!(broadcasts(&seen, TP_CHAT, a.id), 1);
    }
}

#[tokio::test]
async fn test_leave_notifies_neighbors_and_clears_state() {
    let (world, _dir) = small_world();
    let (ca, cb) = (connection(1), connection(2));
    let a = world.spawn_at(&ca, cell(1, 1)).await.unwrap();
    let b = world.spawn_at(&cb, cell(1, 2)).await.unwrap();
    world.enter(&a).await.unwrap();
    world.enter(&b).await.unwrap();
    drain(&ca);

    world.leave(b.id).await.unwrap();
    assert_eq!(vanishes(&drain(&ca), b.id), 1);
    assert!(world.registry().get(b.id).is_none());
    for id in 0..world.grid().cell_count() {
        assert!(!world.grid().occupants(id).contains(&b.id));
    }
    assert_eq!(world.registry().count(), 1);
}

#[tokio::test]
async fn test_actor_state_survives_leave_and_reload() {
    let (world, dir) = small_world();
    let conn = connection(1);
    let a = world.spawn_at(&conn, cell(0, 0)).await.unwrap();
    world.enter(&a).await.unwrap();
    a.modules().await.bag_mut().add_item(1001, 3);
    world.leave(a.id).await.unwrap();

    let saved = dir.path().join(a.id.to_string()).join("bag.json");
    let raw = std::fs::read_to_string(saved).unwrap();
    assert!(raw.contains("1001"));
}
