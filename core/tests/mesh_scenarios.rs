use bluechat_core::{MemoryStorage, Mesh, MeshClient, MeshConfig, MeshError, User};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{timeout, Instant};

fn join(mesh: &Mesh, id: &str, name: &str) -> MeshClient {
    mesh.initialize_node(User::with_id(id, name))
}

fn assert_star(mesh: &Mesh, room_id: &str) {
    let members = mesh.registry().room_members(room_id);
    let host = members.iter().find(|n| n.is_host).expect("room has a host");
    for member in members.iter().filter(|n| !n.is_host) {
        assert!(host.connected_peers.contains(&member.id));
        assert_eq!(member.connected_peers.len(), 1);
        assert!(member.connected_peers.contains(&host.id));
    }
    assert_eq!(host.connected_peers.len(), members.len() - 1);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_a_create_room() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");

    let room = alex.create_room("Coffee").unwrap();

    assert_eq!(room.member_count, 1);
    assert!(room.is_active);
    assert_eq!(room.name, "Coffee");
    assert_eq!(room.max_members, 25);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_b_join_links_both_nodes() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = alex.create_room("Coffee").unwrap();

    let joined = sarah.join_room(&room.id).unwrap();

    assert_eq!(joined.member_count, 2);
    assert!(alex.node().unwrap().connected_peers.contains("user-b"));
    assert!(sarah.node().unwrap().connected_peers.contains("user-a"));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_message_reaches_peer() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = alex.create_room("Coffee").unwrap();
    sarah.join_room(&room.id).unwrap();
    let mut inbox = sarah.subscribe(&room.id).unwrap();

    let started = Instant::now();
    let sent = alex.send_message(&room.id, "hi").await.unwrap();
    let elapsed = started.elapsed();

    let received = timeout(Duration::from_secs(1), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.content, "hi");
    assert_eq!(received.user_id, "user-a");
    assert_eq!(received, sent);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed <= Duration::from_millis(300));

    assert_eq!(sarah.room_messages(&room.id), vec![sent.clone()]);
    assert_eq!(alex.room_messages(&room.id), vec![sent]);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_d_leave_wipes_history() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = alex.create_room("Coffee").unwrap();
    sarah.join_room(&room.id).unwrap();
    alex.send_message(&room.id, "hi").await.unwrap();

    alex.leave_room(&room.id).unwrap();

    assert!(alex.room_messages(&room.id).is_empty());
    assert_eq!(mesh.room(&room.id).unwrap().member_count, 1);
    assert_eq!(sarah.room_messages(&room.id).len(), 1);
    let left = alex.node().unwrap();
    assert!(!left.is_host);
    assert!(left.connected_peers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_e_unknown_room() {
    let mesh = Mesh::in_memory();
    let mike = join(&mesh, "user-c", "mike");

    assert_eq!(
        mike.join_room("nonexistent-room"),
        Err(MeshError::RoomNotFound("nonexistent-room".to_string()))
    );
    assert!(!mike.node().unwrap().is_affiliated());
}

#[tokio::test(start_paused = true)]
async fn test_member_count_tracks_registry() {
    let mesh = Mesh::in_memory();
    let host = join(&mesh, "host", "host");
    let room = host.create_room("Coffee").unwrap();
    let guests: Vec<_> = (0..5)
        .map(|i| join(&mesh, &format!("guest-{i}"), &format!("guest{i}")))
        .collect();

    for (i, guest) in guests.iter().enumerate() {
        let joined = guest.join_room(&room.id).unwrap();
        assert_eq!(joined.member_count, i + 2);
        assert_star(&mesh, &room.id);
    }
    guests[1].leave_room(&room.id).unwrap();
    guests[3].leave_room(&room.id).unwrap();

    let listed = &mesh.list_available_rooms()[0];
    assert_eq!(listed.member_count, mesh.registry().room_members(&room.id).len());
    assert_eq!(listed.member_count, 4);
    assert_star(&mesh, &room.id);
}

#[tokio::test(start_paused = true)]
async fn test_room_full_rejects_join() {
    let mesh = Mesh::in_memory();
    let host = join(&mesh, "host", "host");
    let room = host.create_room("Coffee").unwrap();
    for i in 0..24 {
        join(&mesh, &format!("g-{i}"), &format!("g{i}"))
            .join_room(&room.id)
            .unwrap();
    }
    let late = join(&mesh, "late", "late");

    assert_eq!(
        late.join_room(&room.id),
        Err(MeshError::RoomFull {
            room_id: room.id.clone(),
            max_members: 25
        })
    );
    assert_eq!(mesh.room(&room.id).unwrap().member_count, 25);
}

#[tokio::test(start_paused = true)]
async fn test_send_without_registered_sender() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let room = alex.create_room("Coffee").unwrap();

    let result = mesh.send_message(&room.id, "ghost", "boo").await;

    assert_eq!(result, Err(MeshError::SenderNotRegistered("ghost".to_string())));
    assert!(alex.room_messages(&room.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_outside_room_rejected() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = alex.create_room("Coffee").unwrap();

    assert_eq!(
        sarah.send_message(&room.id, "let me in").await,
        Err(MeshError::NotInRoom(room.id.clone()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_every_peer_receives_exactly_once() {
    let mesh = Mesh::in_memory();
    let host = join(&mesh, "host", "host");
    let room = host.create_room("Coffee").unwrap();
    let mut inboxes = Vec::new();
    for i in 0..4 {
        let guest = join(&mesh, &format!("g-{i}"), &format!("g{i}"));
        guest.join_room(&room.id).unwrap();
        inboxes.push((guest.subscribe(&room.id).unwrap(), guest));
    }
    let mut own = host.subscribe(&room.id).unwrap();

    host.send_message(&room.id, "welcome").await.unwrap();

    for (inbox, guest) in inboxes.iter_mut() {
        assert_eq!(inbox.try_recv().unwrap().content, "welcome");
        assert!(inbox.try_recv().is_none());
        assert_eq!(guest.room_messages(&room.id).len(), 1);
    }
    assert!(own.try_recv().is_none());
    assert_eq!(host.room_messages(&room.id).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_history_keeps_send_order() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = alex.create_room("Coffee").unwrap();
    sarah.join_room(&room.id).unwrap();

    for text in ["one", "two", "three"] {
        alex.send_message(&room.id, text).await.unwrap();
    }

    let contents: Vec<_> = sarah
        .room_messages(&room.id)
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, ["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_sends_reach_every_peer() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let mike = join(&mesh, "user-c", "mike");
    let room = alex.create_room("Coffee").unwrap();
    sarah.join_room(&room.id).unwrap();
    mike.join_room(&room.id).unwrap();
    let mut inboxes: Vec<_> = [&alex, &sarah, &mike]
        .iter()
        .map(|c| (c.id().to_string(), c.subscribe(&room.id).unwrap()))
        .collect();

    let (a, s, m) = tokio::join!(
        alex.send_message(&room.id, "from alex"),
        sarah.send_message(&room.id, "from sarah"),
        mike.send_message(&room.id, "from mike"),
    );
    a.unwrap();
    s.unwrap();
    m.unwrap();

    for client in [&alex, &sarah, &mike] {
        assert_eq!(client.room_messages(&room.id).len(), 3);
    }
    for (id, inbox) in inboxes.iter_mut() {
        let mut senders = Vec::new();
        while let Some(message) = inbox.try_recv() {
            senders.push(message.user_id);
        }
        senders.sort();
        let mut expected: Vec<String> = ["user-a", "user-b", "user-c"]
            .into_iter()
            .filter(|other| *other != id.as_str())
            .map(String::from)
            .collect();
        expected.sort();
        assert_eq!(senders, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_senders_lose_no_history() {
    const SENDERS: usize = 8;
    const PER_SENDER: usize = 25;

    let config = MeshConfig {
        broadcast_latency_ms: 0..1,
        ..MeshConfig::default()
    };
    let mesh = Mesh::new(config, Arc::new(MemoryStorage::new())).unwrap();
    let host = join(&mesh, "host", "host");
    let room = host.create_room("Coffee").unwrap();
    let reader = join(&mesh, "reader", "reader");
    reader.join_room(&room.id).unwrap();
    let mut inbox = reader.subscribe(&room.id).unwrap();

    let mut senders = vec![host];
    for i in 1..SENDERS {
        let guest = join(&mesh, &format!("g-{i}"), &format!("g{i}"));
        guest.join_room(&room.id).unwrap();
        senders.push(guest);
    }

    let tasks: Vec<_> = senders
        .iter()
        .cloned()
        .map(|sender| {
            let room_id = room.id.clone();
            tokio::spawn(async move {
                for n in 0..PER_SENDER {
                    let text = format!("{} #{n}", sender.id());
                    sender.send_message(&room_id, &text).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let total = SENDERS * PER_SENDER;
    let history: Vec<String> = reader
        .room_messages(&room.id)
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(history.len(), total);
    for sender in &senders {
        assert_eq!(sender.room_messages(&room.id).len(), total);
    }

    let mut heard = Vec::new();
    while let Some(message) = inbox.try_recv() {
        heard.push(message.id);
    }
    assert_eq!(heard, history);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_listener_stops_receiving() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = alex.create_room("Coffee").unwrap();
    sarah.join_room(&room.id).unwrap();
    let first = sarah.subscribe(&room.id).unwrap();
    let mut second = sarah.subscribe(&room.id).unwrap();

    first.unsubscribe();
    alex.send_message(&room.id, "still listening?").await.unwrap();

    assert_eq!(second.try_recv().unwrap().content, "still listening?");
}

#[tokio::test(start_paused = true)]
async fn test_discovery_start_is_idempotent() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    join(&mesh, "user-b", "sarah");
    let reports = Arc::new(Mutex::new(Vec::new()));

    let sink = reports.clone();
    assert!(alex.start_discovery(move |r| sink.lock().unwrap().push(r)));
    let sink = reports.clone();
    assert!(!alex.start_discovery(move |r| sink.lock().unwrap().push(r)));

    // Periods are 3-5s, so 10s holds between two and three ticks
    tokio::time::sleep(Duration::from_secs(10)).await;
    alex.stop_discovery();
    let seen = reports.lock().unwrap().clone();

    assert!((2..=3).contains(&seen.len()), "got {} reports", seen.len());
    assert!(seen.iter().all(|r| r.user_id == "user-b"));
    assert!(seen.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(reports.lock().unwrap().len(), seen.len());
}

#[tokio::test(start_paused = true)]
async fn test_discovery_reports_room_of_peer() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let room = sarah.create_room("Coffee").unwrap();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();

    alex.start_discovery(move |r| sink.lock().unwrap().push(r));
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    mesh.cleanup();

    let seen = reports.lock().unwrap();
    assert_eq!(seen[0].room_id.as_deref(), Some(room.id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_listing_uses_announced_names() {
    let mesh = Mesh::in_memory();
    let alex = join(&mesh, "user-a", "alex");
    let sarah = join(&mesh, "user-b", "sarah");
    let viewer = join(&mesh, "user-c", "mike");
    alex.create_room("Coffee").unwrap();
    sarah.create_room("Library").unwrap();

    let names: Vec<_> = viewer
        .list_available_rooms()
        .into_iter()
        .map(|r| r.name)
        .collect();

    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Coffee".to_string()));
    assert!(names.contains(&"Library".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_cancels_simulation() {
    let mesh = Mesh::in_memory();
    let me = join(&mesh, "me", "me_here");
    mesh.start_simulation();
    me.start_discovery(|_| {});

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(mesh.nodes().iter().any(|n| n.is_affiliated()));

    mesh.cleanup();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(mesh.nodes().is_empty());
    assert_eq!(mesh.scheduler().pending(), 0);
}
