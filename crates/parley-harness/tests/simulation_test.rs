//! Simulation scenarios: determinism, liveness and fault injection.

use std::time::Duration;

use parley_client::{ClientAction, ClientConfig, HistoryEntry, RoomPhase, TransportState};
use parley_harness::{Operation, Scenario, SimWorld, SmallMessage};
use parley_server::DriverConfig;
use proptest::prelude::*;

const SWEEP: Duration = Duration::from_secs(30);

fn joined_pair(seed: u64) -> SimWorld {
    let mut world = SimWorld::new(2, seed);
    world.join(0, "lobby", "ann", "swordfish").unwrap();
    world.join(1, "lobby", "bob", "swordfish").unwrap();
    assert_eq!(world.client(0).unwrap().phase("lobby"), Some(RoomPhase::Joined));
    assert_eq!(world.client(1).unwrap().phase("lobby"), Some(RoomPhase::Joined));
    world.take_surfaced(0);
    world.take_surfaced(1);
    world
}

fn system_notices(actions: &[ClientAction]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Deliver { entry: HistoryEntry::System { text, .. }, .. } => {
                Some(text.clone())
            },
            _ => None,
        })
        .collect()
}

#[test]
fn responsive_clients_survive_sweeps() {
    let mut world = joined_pair(1);

    for _ in 0..10 {
        world.tick(SWEEP);
    }

    assert_eq!(world.driver().session_count(), 2);
    assert_eq!(world.client(1).unwrap().transport(), TransportState::Open);
    assert!(world.faults().is_empty());
}

#[test]
fn silent_client_is_evicted_after_two_sweeps() {
    let mut world = joined_pair(2);
    world.set_responsive(1, false);

    world.tick(SWEEP);
    assert_eq!(world.driver().session_count(), 2, "one missed probe is not enough");

    world.tick(SWEEP);
    assert_eq!(world.driver().session_count(), 1);
    assert_eq!(world.session_of(1), None);

    let bob = world.client(1).unwrap();
    assert_eq!(bob.transport(), TransportState::Disconnected);
    assert_eq!(bob.phase("lobby"), Some(RoomPhase::Unjoined));

    let seen = world.take_surfaced(0);
    assert_eq!(system_notices(&seen), vec!["User disconnected".to_string()]);
    assert!(seen.iter().any(|a| matches!(a, ClientAction::PresenceChanged { count: 1, .. })));
    assert!(world.faults().is_empty());
}

#[test]
fn evicted_client_can_rejoin() {
    let mut world = joined_pair(3);
    world.set_responsive(1, false);
    world.tick(SWEEP);
    world.tick(SWEEP);

    world.set_responsive(1, true);
    world.apply(1, parley_client::ClientEvent::SelectRoom { room: "lobby".into() }).unwrap();

    assert_eq!(world.client(1).unwrap().phase("lobby"), Some(RoomPhase::Joined));
    assert_eq!(world.driver().session_count(), 2);
    assert_eq!(system_notices(&world.take_surfaced(0)), vec![
        "User disconnected".to_string(),
        "User joined".to_string()
    ]);
}

#[test]
fn dropped_connection_is_announced_as_disconnect() {
    let mut world = joined_pair(4);
    world.drop_connection(1);

    assert_eq!(system_notices(&world.take_surfaced(0)), vec!["User disconnected".to_string()]);
    assert_eq!(world.driver().registry().peers("lobby", None).len(), 1);
}

#[test]
fn clean_disconnect_is_announced_as_leave() {
    let mut world = joined_pair(5);
    world.apply(1, parley_client::ClientEvent::Disconnect).unwrap();

    assert_eq!(system_notices(&world.take_surfaced(0)), vec!["User left".to_string()]);
    assert_eq!(world.driver().session_count(), 1);
}

#[test]
fn connection_limit_refuses_extra_clients() {
    let config = DriverConfig { max_connections: 1, ..Default::default() };
    let mut world = SimWorld::with_config(2, 6, config, ClientConfig::default());

    world.join(0, "lobby", "ann", "swordfish").unwrap();
    world.join(1, "lobby", "bob", "swordfish").unwrap();

    assert_eq!(world.client(0).unwrap().phase("lobby"), Some(RoomPhase::Joined));
    let bob = world.client(1).unwrap();
    assert_eq!(bob.transport(), TransportState::Disconnected);
    assert_eq!(bob.phase("lobby"), Some(RoomPhase::Unjoined));
    assert_eq!(world.driver().session_count(), 1);
    assert!(world.faults().is_empty());
}

#[test]
fn relay_logs_never_contain_plaintext() {
    let content = SmallMessage { seed: 3, size_class: 2 };
    let text = content.to_text();

    let (world, _) = Scenario::new(2)
        .with_seed(9)
        .op(Operation::Join { client_id: 0, room_id: 0, password: 0 })
        .op(Operation::Join { client_id: 1, room_id: 0, password: 0 })
        .op(Operation::SendMessage { client_id: 0, content })
        .run()
        .unwrap();

    assert_eq!(world.observable_state().clients[1].received, 1);
    for (_, line) in world.server_logs() {
        assert!(!line.contains(&text), "plaintext leaked into relay log: {line}");
        assert!(!line.contains("swordfish"));
    }
}

#[test]
fn scenario_oracles_see_the_final_world() {
    let result = Scenario::new(2)
        .ops([
            Operation::Join { client_id: 0, room_id: 1, password: 0 },
            Operation::Join { client_id: 1, room_id: 1, password: 1 },
        ])
        .oracle(Box::new(|world| {
            let members = world.driver().registry().peers("room-1", None).len();
            if members == 1 { Ok(()) } else { Err(format!("expected 1 member, found {members}")) }
        }))
        .oracle(Box::new(|world| {
            match world.client(1).and_then(|c| c.phase("room-1")) {
                Some(RoomPhase::Rejected) => Ok(()),
                other => Err(format!("expected rejection, got {other:?}")),
            }
        }))
        .run();

    assert!(result.is_ok(), "{:?}", result.err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Same seed and inputs give the same world, down to the relay's logs.
    #[test]
    fn prop_simulation_is_deterministic(
        seed in any::<u64>(),
        ticks in 0usize..4,
        messages in 0usize..4,
    ) {
        let run = || {
            let mut world = joined_pair(seed);
            for i in 0..messages {
                world.apply_operation(&Operation::SendMessage {
                    client_id: u8::try_from(i % 2).unwrap(),
                    content: SmallMessage { seed: 1, size_class: 1 },
                });
            }
            for _ in 0..ticks {
                world.tick(SWEEP);
            }
            (world.observable_state(), world.server_logs().to_vec(), world.session_of(0))
        };

        prop_assert_eq!(run(), run());
    }
}
