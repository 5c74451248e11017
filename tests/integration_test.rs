use poker_room::config::ServerConfig;
use poker_room::protocol::{ClientMessage, ServerMessage};
use poker_room::state::AppState;
use poker_room::types::{VisibleBallot, VoteSignal, VoteValue, VotingPhase};
use poker_room::ws::{handlers::handle_message, ClientConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

fn connection(id: &str) -> (ClientConnection, UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ClientConnection {
            id: id.to_string(),
            sender: tx,
        },
        rx,
    )
}

fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        events.push(msg);
    }
    events
}

async fn associate(
    state: &Arc<AppState>,
    conn: &ClientConnection,
    room_code: &str,
    participant_id: &str,
) {
    let response = handle_message(
        ClientMessage::JoinRoom {
            room_code: room_code.to_string(),
            participant_id: participant_id.to_string(),
        },
        conn,
        state,
    )
    .await;
    assert!(response.is_none(), "association failed: {:?}", response);
}

/// End-to-end flow of a single estimation round
#[tokio::test]
async fn test_full_estimation_round() {
    let state = Arc::new(AppState::default());

    // 1. Create a room and seat two participants
    let code = state.create_room("Platform Team").await.unwrap();
    let (ann, _) = state.join_room(&code, "Ann", false).await.unwrap();
    let (ben, _) = state.join_room(&code, "Ben", false).await.unwrap();

    let (ann_conn, mut ann_rx) = connection("conn-ann");
    let (ben_conn, mut ben_rx) = connection("conn-ben");
    associate(&state, &ann_conn, &code, &ann.id).await;
    associate(&state, &ben_conn, &code, &ben.id).await;
    drain(&mut ann_rx);
    drain(&mut ben_rx);

    // 2. Ann votes; Ben only learns that she voted
    state
        .cast_vote(&code, &ann.id, VoteSignal::Cast(VoteValue::Points(5)))
        .await
        .unwrap();

    match ben_rx.try_recv() {
        Ok(ServerMessage::VoteCast {
            participant,
            vote,
            room,
        }) => {
            assert_eq!(participant.id, ann.id);
            assert_eq!(vote, Some(VisibleBallot::Hidden));
            assert_eq!(room.votes[&ann.id], VisibleBallot::Hidden);
        }
        other => panic!("Expected VoteCast for Ben, got {:?}", other),
    }
    match ann_rx.try_recv() {
        Ok(ServerMessage::VoteCast { vote, .. }) => {
            assert_eq!(vote, Some(VisibleBallot::Value(VoteValue::Points(5))));
        }
        other => panic!("Expected VoteCast for Ann, got {:?}", other),
    }

    // 3. Ben is unsure
    state
        .cast_vote(&code, &ben.id, VoteSignal::Cast(VoteValue::Unknown))
        .await
        .unwrap();
    drain(&mut ann_rx);
    drain(&mut ben_rx);

    // 4. Reveal: everyone sees every ballot and the same stats
    let stats = state.reveal_votes(&code).await.unwrap();
    assert_eq!(stats.total_votes, 2);
    assert_eq!(stats.average, 5.0);
    assert_eq!(stats.agreement, 0.5);

    for rx in [&mut ann_rx, &mut ben_rx] {
        match rx.try_recv() {
            Ok(ServerMessage::VotesRevealed { room, stats }) => {
                assert_eq!(room.phase, VotingPhase::Revealed);
                assert_eq!(
                    room.votes[&ann.id],
                    VisibleBallot::Value(VoteValue::Points(5))
                );
                assert_eq!(room.votes[&ben.id], VisibleBallot::Value(VoteValue::Unknown));
                assert_eq!(stats.total_votes, 2);
            }
            other => panic!("Expected VotesRevealed, got {:?}", other),
        }
    }

    // 5. Reset starts a fresh round
    state.reset_votes(&code).await.unwrap();
    for rx in [&mut ann_rx, &mut ben_rx] {
        match rx.try_recv() {
            Ok(ServerMessage::VotingReset { room }) => {
                assert_eq!(room.phase, VotingPhase::Collecting);
                assert!(room.votes.is_empty());
            }
            other => panic!("Expected VotingReset, got {:?}", other),
        }
    }
}

/// Voting after reveal keeps the room revealed and shows the new value
#[tokio::test]
async fn test_vote_change_after_reveal_is_visible() {
    let state = Arc::new(AppState::default());
    let code = state.create_room("Team").await.unwrap();
    let (ann, _) = state.join_room(&code, "Ann", false).await.unwrap();
    let (ben, _) = state.join_room(&code, "Ben", false).await.unwrap();

    state
        .cast_vote(&code, &ann.id, VoteSignal::Cast(VoteValue::Points(3)))
        .await
        .unwrap();
    state.reveal_votes(&code).await.unwrap();
    state
        .cast_vote(&code, &ann.id, VoteSignal::Cast(VoteValue::Points(8)))
        .await
        .unwrap();

    let view = state.room_snapshot(&code, Some(ben.id.as_str())).await.unwrap();
    assert_eq!(view.phase, VotingPhase::Revealed);
    assert_eq!(
        view.votes[&ann.id],
        VisibleBallot::Value(VoteValue::Points(8))
    );
}

/// A full room frees a seat only once a participant is removed for good
#[tokio::test(start_paused = true)]
async fn test_capacity_frees_after_grace_period() {
    let config = ServerConfig {
        grace_period: Duration::from_secs(10),
        ..ServerConfig::default()
    };
    let state = Arc::new(AppState::new(config));
    let code = state.create_room("Team").await.unwrap();

    let mut seated = Vec::new();
    for i in 0..10 {
        let (p, _) = state
            .join_room(&code, &format!("Dev {}", i), false)
            .await
            .unwrap();
        seated.push(p);
    }
    assert!(state.join_room(&code, "Late", false).await.is_err());

    // The first participant's only connection drops
    let (conn, _rx) = connection("conn-0");
    associate(&state, &conn, &code, &seated[0].id).await;
    state.disconnect_connection(&conn.id).await;

    // Still seated during the grace period
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(state.join_room(&code, "Late", false).await.is_err());

    tokio::time::sleep(Duration::from_secs(6)).await;
    let (late, view) = state.join_room(&code, "Late", false).await.unwrap();
    assert_eq!(view.participants.len(), 10);
    assert!(view.participants.iter().any(|p| p.id == late.id));
    assert!(!view.participants.iter().any(|p| p.id == seated[0].id));
}

/// Ballots never outlive their owners
#[tokio::test(start_paused = true)]
async fn test_departed_participant_ballot_is_dropped() {
    let state = Arc::new(AppState::default());
    let code = state.create_room("Team").await.unwrap();
    let (ann, _) = state.join_room(&code, "Ann", false).await.unwrap();
    let (ben, _) = state.join_room(&code, "Ben", false).await.unwrap();

    state
        .cast_vote(&code, &ann.id, VoteSignal::Cast(VoteValue::Points(13)))
        .await
        .unwrap();

    let (ann_conn, _ann_rx) = connection("conn-ann");
    let (ben_conn, mut ben_rx) = connection("conn-ben");
    associate(&state, &ann_conn, &code, &ann.id).await;
    associate(&state, &ben_conn, &code, &ben.id).await;
    drain(&mut ben_rx);

    state.disconnect_connection(&ann_conn.id).await;
    tokio::time::sleep(state.config.grace_period + Duration::from_secs(1)).await;

    let view = state.room_snapshot(&code, Some(ben.id.as_str())).await.unwrap();
    assert!(view.votes.is_empty());
    for id in view.votes.keys() {
        assert!(view.participants.iter().any(|p| &p.id == id));
    }

    let events = drain(&mut ben_rx);
    assert!(matches!(
        events.first(),
        Some(ServerMessage::ParticipantDisconnected { .. })
    ));
    assert!(matches!(
        events.last(),
        Some(ServerMessage::ParticipantLeft { participant, .. }) if participant.id == ann.id
    ));

    let stats = state.reveal_votes(&code).await.unwrap();
    assert_eq!(stats.total_votes, 0);
    assert_eq!(stats.average, 0.0);
}

/// Rooms are isolated from each other
#[tokio::test]
async fn test_events_stay_in_their_room() {
    let state = Arc::new(AppState::default());
    let first = state.create_room("First").await.unwrap();
    let second = state.create_room("Second").await.unwrap();
    assert_ne!(first, second);

    let (ann, _) = state.join_room(&first, "Ann", false).await.unwrap();
    let (zed, _) = state.join_room(&second, "Zed", false).await.unwrap();

    let (zed_conn, mut zed_rx) = connection("conn-zed");
    associate(&state, &zed_conn, &second, &zed.id).await;
    drain(&mut zed_rx);

    state
        .cast_vote(&first, &ann.id, VoteSignal::Cast(VoteValue::Points(1)))
        .await
        .unwrap();
    state.reveal_votes(&first).await.unwrap();

    assert!(drain(&mut zed_rx).is_empty());
    let view = state.room_snapshot(&second, None).await.unwrap();
    assert_eq!(view.phase, VotingPhase::Collecting);
}

/// Event kind, phase and ballot owners as one receiver saw them
fn summarize(msg: &ServerMessage) -> (&'static str, VotingPhase, Vec<String>) {
    let (kind, room) = match msg {
        ServerMessage::ParticipantJoined { room, .. } => ("participant_joined", room),
        ServerMessage::VoteCast { room, .. } => ("vote_cast", room),
        ServerMessage::VotesRevealed { room, .. } => ("votes_revealed", room),
        ServerMessage::VotingReset { room } => ("voting_reset", room),
        other => panic!("Unexpected event {:?}", other),
    };
    let mut owners: Vec<String> = room.votes.keys().cloned().collect();
    owners.sort();
    (kind, room.phase, owners)
}

/// Concurrent mutations on one room apply one at a time and every
/// connection observes them in the same order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_are_serialized_per_room() {
    let state = Arc::new(AppState::default());
    let code = state.create_room("Busy").await.unwrap();
    let other = state.create_room("Quiet").await.unwrap();

    let (ann, _) = state.join_room(&code, "Ann", false).await.unwrap();
    let (ben, _) = state.join_room(&code, "Ben", false).await.unwrap();
    let (zed, _) = state.join_room(&other, "Zed", false).await.unwrap();

    let (ann_conn, mut ann_rx) = connection("conn-ann");
    let (ben_conn, mut ben_rx) = connection("conn-ben");
    let (zed_conn, mut zed_rx) = connection("conn-zed");
    associate(&state, &ann_conn, &code, &ann.id).await;
    associate(&state, &ben_conn, &code, &ben.id).await;
    associate(&state, &zed_conn, &other, &zed.id).await;
    drain(&mut ann_rx);
    drain(&mut ben_rx);
    drain(&mut zed_rx);

    let mut tasks = Vec::new();
    for i in 0..200usize {
        let state = state.clone();
        let code = code.clone();
        let other = other.clone();
        let voter = if i % 2 == 0 { ann.id.clone() } else { ben.id.clone() };
        let zed_id = zed.id.clone();
        tasks.push(tokio::spawn(async move {
            match i % 10 {
                0 => {
                    state.reset_votes(&code).await.unwrap();
                }
                5 => {
                    state.reveal_votes(&code).await.unwrap();
                }
                7 if i < 50 => {
                    state
                        .join_room(&code, &format!("Guest {}", i), false)
                        .await
                        .unwrap();
                }
                3 => {
                    state
                        .cast_vote(&other, &zed_id, VoteSignal::Cast(VoteValue::Points(21)))
                        .await
                        .unwrap();
                }
                _ => {
                    let signal = if i % 9 == 0 {
                        VoteSignal::Withdraw
                    } else {
                        VoteSignal::Cast(VoteValue::Points(8))
                    };
                    state.cast_vote(&code, &voter, signal).await.unwrap();
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Every ballot belongs to a current participant
    let busy = state.get_room(&code).await.unwrap();
    let busy = busy.lock().await;
    for owner in busy.ballots.keys() {
        assert!(busy.participant(owner).is_some());
    }

    // Both receivers saw the same sequence, ending in the committed state
    let ann_events: Vec<_> = drain(&mut ann_rx).iter().map(summarize).collect();
    let ben_events: Vec<_> = drain(&mut ben_rx).iter().map(summarize).collect();
    assert_eq!(ann_events.len(), 180);
    assert_eq!(ann_events, ben_events);

    for (kind, phase, owners) in &ann_events {
        match *kind {
            "voting_reset" => {
                assert_eq!(*phase, VotingPhase::Collecting);
                assert!(owners.is_empty());
            }
            "votes_revealed" => assert_eq!(*phase, VotingPhase::Revealed),
            _ => {}
        }
    }
    let mut committed: Vec<String> = busy.ballots.keys().cloned().collect();
    committed.sort();
    let (_, last_phase, last_owners) = ann_events.last().unwrap();
    assert_eq!(*last_phase, busy.phase);
    assert_eq!(*last_owners, committed);

    // The quiet room only heard its own votes
    let zed_events = drain(&mut zed_rx);
    assert_eq!(zed_events.len(), 20);
    assert!(zed_events.iter().all(|msg| matches!(
        msg,
        ServerMessage::VoteCast { room, .. } if room.code == other
    )));
}
