//! Exercises the server world and a client session together as a loopback
//! scenario: no sockets, just the same message bodies that would cross the
//! wire, fed straight from one side to the other.

use std::collections::HashMap;
use std::net::SocketAddr;

use gloop::{ClientSession, Inputs, OutgoingMessage, ServerWorld, WorldConfig};

fn addr() -> SocketAddr {
    "127.0.0.1:4000".parse().unwrap()
}

fn small_world() -> ServerWorld {
    ServerWorld::new(WorldConfig {
        target_orb_count: 4,
        bot_count: 0,
        player_limit: 4,
        ..Default::default()
    })
}

#[test]
fn client_converges_on_server_position_after_handshake_and_a_few_ticks() {
    let mut world = small_world();
    let id = world.add_human_player("alice".into(), addr(), 0.0).unwrap();

    let spawn = world.player(id).unwrap().clone();
    let mut session = ClientSession::new(id, spawn.clone(), 0.0);

    let mut players = HashMap::new();
    players.insert(id, spawn);
    let mut orbs = HashMap::new();

    let mut now = 0.0;
    let dt = 0.1;

    // Steer toward a far corner and run a few server ticks, feeding each
    // resulting player list to the session exactly as UPD_PLAYERS would.
    world.apply_inputs(id, Inputs::new(10_000.0, 0.0));

    for tick in 0..5 {
        now += dt;
        world.tick(dt, now);

        let server_player = world.player(id).expect("player survives a few ticks of open field");
        session.ingest_player_update(now, 0.02, now, Vec::new(), vec![server_player.clone()]);
        let _ = session.sync(now, dt, &mut players, &mut orbs, None);

        if tick == 0 {
            assert!(session.is_synced(), "session should sync on its first update");
        }
    }

    let server_x = world.player(id).unwrap().x;
    let local_x = players[&id].x;
    // Gravity correction nudges proportionally rather than snapping, so the
    // local copy trails the server but keeps closing the gap.
    assert!(local_x > 0.0, "local player should have moved off spawn");
    assert!(
        (local_x - server_x).abs() < server_x.max(1.0),
        "local position ({local_x}) should be converging toward server position ({server_x})"
    );
}

#[test]
fn orb_diff_from_compute_view_applies_cleanly_on_the_client() {
    let mut world = small_world();
    let id = world.add_human_player("bob".into(), addr(), 0.0).unwrap();

    let (_, diff) = world.compute_view(id).expect("connected player has a view");
    assert!(!diff.is_empty(), "a fresh player should see the orbs spawned around it or not, but the view call must succeed");

    let additions: Vec<_> = diff
        .additions
        .iter()
        .filter_map(|oid| world.orb(*oid).copied())
        .collect();

    let spawn = world.player(id).unwrap().clone();
    let mut session = ClientSession::new(id, spawn.clone(), 0.0);
    let mut players = HashMap::new();
    players.insert(id, spawn);
    let mut orbs = HashMap::new();

    session.ingest_player_update(0.0, 0.0, 1.0, Vec::new(), vec![world.player(id).unwrap().clone()]);
    session.sync(0.0, 0.0, &mut players, &mut orbs, None);

    session.ingest_orb_update(0.0, 1, additions.clone(), Vec::new());
    let outgoing = session.sync(0.0, 0.0, &mut players, &mut orbs, None);

    for orb in &additions {
        assert!(orbs.contains_key(&orb.id));
    }
    assert!(outgoing.iter().any(|m| matches!(m, OutgoingMessage::Ack(1))));

    // A retransmit of the same reliable packet must be a no-op, not a second
    // application of the diff.
    session.ingest_orb_update(0.0, 1, additions, Vec::new());
    let outgoing = session.sync(0.0, 0.0, &mut players, &mut orbs, None);
    assert!(outgoing.iter().any(|m| matches!(m, OutgoingMessage::Ack(1))));
}

#[test]
fn steering_toward_an_orb_lets_a_player_eat_it_and_grow() {
    let mut world = small_world();
    let id = world.add_human_player("chaser".into(), addr(), 0.0).unwrap();

    // Orb ids are assigned sequentially from 1 during initial replenishment.
    let target_id: u32 = 1;
    let target = world.orb(target_id).expect("orb 1 exists after replenishment").clone();

    let start_radius = world.player(id).unwrap().radius;

    let mut now = 0.0;
    for _ in 0..600 {
        let Some(player) = world.player(id) else { break };
        if world.orb(target_id).is_none() {
            break; // eaten
        }
        let dx = target.x - player.x;
        let dy = target.y - player.y;
        world.apply_inputs(id, Inputs::new(dx, dy));
        now += 0.05;
        world.tick(0.05, now);
    }

    assert!(world.orb(target_id).is_none(), "chaser should reach and eat the orb within 600 ticks");
    let grown_radius = world.player(id).unwrap().radius;
    assert!(grown_radius > start_radius);
}
