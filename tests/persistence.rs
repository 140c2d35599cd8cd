use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use eframe::egui::vec2;
use treeforce::graph::{Dataset, NodeRecord};
use treeforce::positions::{JsonFileBackend, PositionBackend, SaveQueue};
use treeforce::{Edge, LayoutController, NodeKind, Position, PositionMap, TreeforceConfig};

fn config() -> TreeforceConfig {
    let mut config = TreeforceConfig::default();
    config.placement.seed = Some(5);
    config.persistence.debounce_ms = 10;
    config
}

fn dataset() -> Dataset {
    let record = |id: &str, kind| NodeRecord {
        id: id.to_owned(),
        kind,
        label: String::new(),
        shape: Default::default(),
        size: 1.0,
        x: None,
        y: None,
    };
    Dataset {
        tree_id: "persisted".to_owned(),
        nodes: vec![
            record("root", NodeKind::Root),
            record("a", NodeKind::Question),
            record("b", NodeKind::Question),
        ],
        edges: vec![Edge::hierarchy("root", "a"), Edge::hierarchy("root", "b")],
    }
}

fn run_to_rest(controller: &mut LayoutController) {
    let mut frames = 0;
    while controller.frame(Duration::from_millis(16)).is_some() {
        frames += 1;
        assert!(frames < 2_000, "layout never settled");
    }
}

#[test]
fn converged_positions_survive_a_new_session() {
    let directory = tempfile::tempdir().unwrap();
    let backend: Arc<dyn PositionBackend> = Arc::new(JsonFileBackend::new(directory.path()));

    let mut first =
        LayoutController::from_dataset(dataset(), config()).with_persistence(
            Arc::clone(&backend),
            "persisted",
            "user-1",
        );
    first.wait_for_positions();
    run_to_rest(&mut first);
    first.flush_positions();

    let stored = first.stored_positions().unwrap();
    assert_eq!(stored.len(), 3);
    for node in first.graph().nodes() {
        let position = node.position.unwrap();
        assert_eq!(stored[&node.id], Position::from(position));
    }
    drop(first);

    let mut second = LayoutController::from_dataset(dataset(), config()).with_persistence(
        Arc::clone(&backend),
        "persisted",
        "user-1",
    );
    second.wait_for_positions();
    for node in second.graph().nodes() {
        assert_eq!(
            node.position.map(Position::from),
            Some(stored[&node.id]),
            "{} was not restored",
            node.id
        );
    }

    let other_user = backend.load_positions("persisted", "user-2").unwrap();
    assert!(other_user.is_none());
}

struct BrokenBackend;

impl PositionBackend for BrokenBackend {
    fn load_positions(&self, _tree_id: &str, _user_id: &str) -> Result<Option<PositionMap>> {
        bail!("store unavailable")
    }

    fn save_positions(&self, _tree_id: &str, _user_id: &str, _positions: &PositionMap) -> Result<()> {
        bail!("store unavailable")
    }
}

#[test]
fn broken_store_does_not_stop_the_layout() {
    let mut controller = LayoutController::from_dataset(dataset(), config()).with_persistence(
        Arc::new(BrokenBackend),
        "persisted",
        "user-1",
    );
    controller.wait_for_positions();
    run_to_rest(&mut controller);
    controller.flush_positions();
    assert!(controller.graph().nodes().iter().all(|node| node.position.is_some()));
    assert!(controller.stored_positions().is_none());
}

/// Holds every load until the test opens the gate.
struct GatedBackend {
    open: AtomicBool,
    stored: PositionMap,
}

impl PositionBackend for GatedBackend {
    fn load_positions(&self, _tree_id: &str, _user_id: &str) -> Result<Option<PositionMap>> {
        while !self.open.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(2));
        }
        Ok(Some(self.stored.clone()))
    }

    fn save_positions(&self, _tree_id: &str, _user_id: &str, _positions: &PositionMap) -> Result<()> {
        Ok(())
    }
}

#[test]
fn frames_wait_for_the_position_load() {
    let stored = PositionMap::from([
        ("root".to_owned(), Position { x: 0.0, y: 0.0 }),
        ("a".to_owned(), Position { x: 150.0, y: 40.0 }),
        ("b".to_owned(), Position { x: -150.0, y: 40.0 }),
    ]);
    let backend = Arc::new(GatedBackend {
        open: AtomicBool::new(false),
        stored: stored.clone(),
    });
    let config = config();
    let max_speed = config.simulation.max_speed;
    let mut controller = LayoutController::from_dataset(dataset(), config).with_persistence(
        Arc::clone(&backend) as Arc<dyn PositionBackend>,
        "persisted",
        "user-1",
    );

    for _ in 0..5 {
        assert!(controller.frame(Duration::from_millis(16)).is_none());
        thread::sleep(Duration::from_millis(5));
    }
    assert!(controller.is_active());
    assert!(controller.graph().nodes().iter().all(|node| node.position.is_none()));

    backend.open.store(true, Ordering::SeqCst);
    let mut first = None;
    for _ in 0..500 {
        first = controller.frame(Duration::from_millis(16));
        if first.is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    let first = first.expect("load never settled");
    assert_eq!(first.tick, 1);
    for node in &first.nodes {
        let loaded = stored[&node.id];
        let moved = node.position - vec2(loaded.x, loaded.y);
        assert!(
            moved.length() <= max_speed + 1e-3,
            "{} did not start from its stored position",
            node.id
        );
    }
}

#[derive(Default)]
struct SlowBackend {
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    saves: Mutex<Vec<f32>>,
}

impl PositionBackend for SlowBackend {
    fn load_positions(&self, _tree_id: &str, _user_id: &str) -> Result<Option<PositionMap>> {
        Ok(None)
    }

    fn save_positions(&self, _tree_id: &str, _user_id: &str, positions: &PositionMap) -> Result<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(25));
        let marker = positions.get("marker").map(|position| position.x);
        if let Some(marker) = marker {
            self.saves.lock().unwrap().push(marker);
        }
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn saves_never_overlap_and_land_in_request_order() {
    let backend = Arc::new(SlowBackend::default());
    let queue = SaveQueue::spawn(
        Arc::clone(&backend) as Arc<dyn PositionBackend>,
        "tree".to_owned(),
        "user".to_owned(),
        Duration::from_millis(5),
    );

    for step in 0..4 {
        let positions = PositionMap::from([(
            "marker".to_owned(),
            Position {
                x: step as f32,
                y: 0.0,
            },
        )]);
        queue.schedule(positions);
        thread::sleep(Duration::from_millis(15));
    }
    queue.flush();

    let saves = backend.saves.lock().unwrap().clone();
    assert_eq!(backend.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(saves.last(), Some(&3.0));
    assert!(saves.windows(2).all(|pair| pair[0] < pair[1]));
}
