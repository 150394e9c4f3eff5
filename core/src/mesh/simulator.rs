//! Activity simulator: keeps a demo mesh busy
//!
//! A fixed roster of demo peers is put on the mesh. Every activity tick one
//! idle demo peer either joins a hosted room or opens a new one; hosts post
//! a few scripted icebreakers and joiners say hello.

use crate::mesh::{Mesh, WeakMesh};
use crate::types::User;
use rand::seq::SliceRandom;
use rand::Rng;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, info};

const ACTIVITY_TIMER: &str = "simulator:activity";

pub const DEMO_ROSTER: [(&str, &str); 6] = [
    ("demo-1", "Alex"),
    ("demo-2", "Sarah"),
    ("demo-3", "Mike"),
    ("demo-4", "Emma"),
    ("demo-5", "David"),
    ("demo-6", "Lisa"),
];

pub const DEMO_ROOM_NAMES: [&str; 6] = [
    "Coffee Shop Chat",
    "Library Study Group",
    "Park Meetup",
    "Mall Hangout",
    "Campus Lounge",
    "Downtown Spot",
];

fn icebreakers(host: &str) -> [String; 4] {
    [
        format!("Hey everyone! I'm {host} 👋"),
        "Anyone else around here?".to_string(),
        "This proximity chat is pretty cool!".to_string(),
        "How far away are you all?".to_string(),
    ]
}

fn greeting<R: Rng + ?Sized>(name: &str, rng: &mut R) -> String {
    match rng.gen_range(0..4) {
        0 => format!("Hi everyone! {name} here 👋"),
        1 => format!("Hey! {name} joining the chat"),
        2 => format!("Hello from {name}!"),
        _ => format!("{name} checking in"),
    }
}

/// What one simulator step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Created { node_id: String, room_id: String },
    Joined { node_id: String, room_id: String },
    /// Every demo peer is already in a room
    Idle,
}

pub struct ActivitySimulator {
    mesh: WeakMesh,
}

impl ActivitySimulator {
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            mesh: mesh.downgrade(),
        }
    }

    /// Put every demo peer on the mesh, online and unaffiliated
    pub fn populate(&self) {
        let Some(mesh) = self.mesh.upgrade() else {
            return;
        };
        for (id, name) in DEMO_ROSTER {
            mesh.initialize_node(User::with_id(id, name));
        }
        info!("Simulated mesh populated with {} demo nodes", DEMO_ROSTER.len());
    }

    /// One activity tick. `None` once the mesh is gone.
    pub fn step<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Activity> {
        let mesh = self.mesh.upgrade()?;

        let idle: Vec<_> = DEMO_ROSTER
            .iter()
            .filter_map(|(id, _)| mesh.node(id))
            .filter(|n| n.is_online && !n.is_affiliated())
            .collect();
        let Some(node) = idle.choose(rng) else {
            return Some(Activity::Idle);
        };

        let open_rooms: Vec<_> = mesh
            .list_available_rooms()
            .into_iter()
            .filter(|room| !room.is_full())
            .collect();

        if !open_rooms.is_empty() && rng.gen_bool(mesh.config().join_preference) {
            let room = open_rooms.choose(rng)?;
            match mesh.join_room(&room.id, &node.id) {
                Ok(_) => {
                    info!("{} joined room {}", node.username, room.name);
                    let delay = Duration::from_millis(mesh.config().greeting_delay_ms);
                    self.post_later(&mesh, delay, &room.id, &node.id, greeting(&node.username, rng));
                    return Some(Activity::Joined {
                        node_id: node.id.clone(),
                        room_id: room.id.clone(),
                    });
                }
                Err(e) => {
                    debug!("{} could not join {}: {}", node.username, room.id, e);
                    return Some(Activity::Idle);
                }
            }
        }

        let name = DEMO_ROOM_NAMES.choose(rng).copied().unwrap_or(DEMO_ROOM_NAMES[0]);
        match mesh.create_room(name, &node.id) {
            Ok(room) => {
                info!("{} created room: {}", node.username, name);
                let config = mesh.config();
                for (i, line) in icebreakers(&node.username).into_iter().enumerate() {
                    let delay = Duration::from_millis(
                        config.icebreaker_initial_delay_ms + i as u64 * config.icebreaker_spacing_ms,
                    );
                    self.post_later(&mesh, delay, &room.id, &node.id, line);
                }
                Some(Activity::Created {
                    node_id: node.id.clone(),
                    room_id: room.id,
                })
            }
            Err(e) => {
                debug!("{} could not create a room: {}", node.username, e);
                Some(Activity::Idle)
            }
        }
    }

    fn post_later(&self, mesh: &Mesh, delay: Duration, room_id: &str, node_id: &str, content: String) {
        let weak = self.mesh.clone();
        let room_id = room_id.to_string();
        let node_id = node_id.to_string();
        mesh.scheduler().after(delay, async move {
            let Some(mesh) = weak.upgrade() else {
                return;
            };
            if let Err(e) = mesh.send_message(&room_id, &node_id, &content).await {
                debug!("Scripted message from {} dropped: {}", node_id, e);
            }
        });
    }
}

impl Mesh {
    /// Populate the demo roster and start the activity timer.
    ///
    /// Returns false, changing nothing, if the simulation is already running.
    pub fn start_simulation(&self) -> bool {
        if self.scheduler().is_scheduled(ACTIVITY_TIMER) {
            return false;
        }

        let simulator = ActivitySimulator::new(self);
        simulator.populate();

        let period = self.config().activity_period();
        self.scheduler().every(
            ACTIVITY_TIMER,
            move || period,
            move || match simulator.step(&mut rand::thread_rng()) {
                Some(activity) => {
                    debug!("Simulator step: {:?}", activity);
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            },
        )
    }

    /// Stop the activity timer; scripted messages already scheduled still fire
    pub fn stop_simulation(&self) {
        if self.scheduler().cancel(ACTIVITY_TIMER) {
            info!("Activity simulation stopped");
        }
    }
}
