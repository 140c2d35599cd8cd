use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use eframe::egui::{self, Context, Vec2};
use tracing::info;
use treeforce::graph::{Dataset, EdgeKind};
use treeforce::positions::JsonFileBackend;
use treeforce::{LayoutController, Notification, TreeforceConfig};

use crate::Args;

mod interaction;
mod panels;
mod render_utils;
mod view;

pub struct TreeforceApp {
    args: Args,
    state: AppState,
}

enum AppState {
    Loading { rx: Receiver<Result<Loaded, String>> },
    Ready(Box<ViewModel>),
    Error(String),
}

struct Loaded {
    dataset: Dataset,
    config: TreeforceConfig,
}

struct ViewModel {
    controller: LayoutController,
    tree_id: String,
    pan: Vec2,
    zoom: f32,
    search: String,
    selected: Option<String>,
    dragging: Option<String>,
    new_label: String,
    link_kind: EdgeKind,
    link_target: String,
    status: Option<String>,
    next_id: u64,
}

impl TreeforceApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, args: Args) -> Self {
        let state = Self::start_load(&args);
        Self { args, state }
    }

    fn spawn_load(args: &Args) -> Receiver<Result<Loaded, String>> {
        let (tx, rx) = mpsc::channel();
        let graph_path = args.graph.clone();
        let config_path = args.config.clone();

        thread::spawn(move || {
            let result = (|| -> anyhow::Result<Loaded> {
                let config = match &config_path {
                    Some(path) => TreeforceConfig::from_path(path)?,
                    None => TreeforceConfig::default(),
                };
                let dataset = Dataset::from_path(&graph_path)
                    .with_context(|| format!("cannot open graph {}", graph_path.display()))?;
                Ok(Loaded { dataset, config })
            })()
            .map_err(|error| format!("{error:#}"));
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(args: &Args) -> AppState {
        AppState::Loading {
            rx: Self::spawn_load(args),
        }
    }
}

impl ViewModel {
    fn new(loaded: Loaded, args: &Args) -> Self {
        let Loaded { dataset, config } = loaded;
        let tree_id = args
            .tree_id
            .clone()
            .unwrap_or_else(|| dataset.tree_id.clone());
        let positions_dir = args
            .positions_dir
            .clone()
            .or_else(|| config.persistence.directory.clone());

        let mut controller = LayoutController::from_dataset(dataset, config);
        if let Some(directory) = positions_dir {
            info!(directory = %directory.display(), "persisting node positions");
            controller = controller.with_persistence(
                Arc::new(JsonFileBackend::new(directory)),
                tree_id.clone(),
                args.user_id.clone(),
            );
        }

        Self {
            controller,
            tree_id,
            pan: Vec2::ZERO,
            zoom: 0.8,
            search: String::new(),
            selected: None,
            dragging: None,
            new_label: String::new(),
            link_kind: EdgeKind::Connection,
            link_target: String::new(),
            status: None,
            next_id: 1,
        }
    }

    /// Advances the layout by one frame and keeps repainting while it moves.
    fn step(&mut self, ctx: &Context) {
        let dt = ctx.input(|input| input.stable_dt).clamp(1.0 / 240.0, 1.0 / 20.0);
        self.controller.frame(Duration::from_secs_f32(dt));

        for notification in self.controller.take_notifications() {
            self.status = Some(match notification {
                Notification::Converged { ticks } => format!("settled after {ticks} ticks"),
                Notification::AnimationFinished => "tree layout ready".to_owned(),
                Notification::Rejected(error) => format!("rejected: {error}"),
            });
        }

        if self.dragging.is_some() {
            ctx.request_repaint();
        } else if self.controller.is_active() {
            ctx.request_repaint_after(self.controller.config().animation.frame_interval());
        } else if self.controller.active_notice(std::time::Instant::now()).is_some() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        loop {
            let id = format!("{prefix}-{}", self.next_id);
            self.next_id += 1;
            if !self.controller.graph().contains(&id) {
                return id;
            }
        }
    }
}

impl eframe::App for TreeforceApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(Ok(loaded)) => {
                        transition = Some(AppState::Ready(Box::new(ViewModel::new(
                            loaded, &self.args,
                        ))));
                    }
                    Ok(Err(error)) => transition = Some(AppState::Error(error)),
                    Err(TryRecvError::Empty) => ctx.request_repaint_after(Duration::from_millis(50)),
                    Err(TryRecvError::Disconnected) => {
                        transition = Some(AppState::Error(
                            "Background load worker disconnected".to_owned(),
                        ));
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading graph...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load graph");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start_load(&self.args));
                    }
                });
            }
            AppState::Ready(model) => {
                model.step(ctx);
                model.show(ctx);
            }
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}
