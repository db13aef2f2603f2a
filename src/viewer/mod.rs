/*
 * Viewer Module
 *
 * nannou window around either side of the replication boundary.
 *
 * As a primary the viewer owns the Simulation, steps it on a fixed timestep,
 * publishes each snapshot into a local slot (and to TCP replicas) and mirrors
 * that slot for drawing. As a replica it only mirrors what a remote primary
 * sends. Either way the renderer reads nothing but the Mirror.
 */

pub mod camera;
pub mod input;
pub mod renderer;
pub mod ui;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nannou::prelude::*;
use nannou_egui::Egui;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::boid::Bounds;
use crate::config::{Role, SimConfig};
use crate::error::Result;
use crate::net::{SnapshotClient, SnapshotServer};
use crate::params::SimulationParams;
use crate::replication::{Mirror, SnapshotSink, SnapshotSlot, SnapshotSource};
use crate::simulation::Simulation;
use crate::snapshot::SharedSnapshot;
use camera::Camera;
use ui::{Status, ViewSettings};

// Most simulation steps run in one frame before the rest is dropped
const MAX_STEPS_PER_FRAME: u32 = 4;

pub enum Source {
    Primary {
        sim: Simulation,
        slot: SnapshotSlot,
        _server: SnapshotServer,
    },
    Replica {
        client: SnapshotClient,
    },
}

impl SnapshotSource for Source {
    fn fetch(&self) -> Option<Arc<SharedSnapshot>> {
        match self {
            Source::Primary { slot, .. } => slot.fetch(),
            Source::Replica { client } => client.fetch(),
        }
    }
}

// Everything the window needs, built before nannou takes over
struct Launch {
    source: Source,
    mirror: Mirror,
    bounds: Bounds,
    step_size: Duration,
}

// nannou's model function cannot capture, so the launch state waits here
static LAUNCH: Mutex<Option<Launch>> = Mutex::new(None);

pub struct Model {
    pub egui: Egui,
    pub camera: Camera,
    pub mouse_position: ::glam::Vec2,
    pub source: Source,
    pub mirror: Mirror,
    pub bounds: Bounds,
    pub params: SimulationParams,
    pub settings: ViewSettings,
    pub step_size: Duration,
    pub accumulator: Duration,
    pub last_update_time: Instant,
    reset_pending: bool,
}

impl Model {
    // Only a primary can reset; replicas follow whatever it publishes
    pub fn request_reset(&mut self) {
        if matches!(self.source, Source::Primary { .. }) {
            self.reset_pending = true;
        }
    }
}

// Set up the chosen role, then hand control to the nannou event loop
pub fn run(config: &SimConfig) -> Result<()> {
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
        None => ChaCha8Rng::from_entropy(),
    };
    let source = match config.role {
        Role::Primary => {
            let slot = SnapshotSlot::new();
            let server = SnapshotServer::bind(config.listen, slot.clone())?;
            Source::Primary {
                sim: Simulation::new(config)?,
                slot,
                _server: server,
            }
        }
        Role::Replica => Source::Replica {
            client: SnapshotClient::connect(config.connect)?,
        },
    };
    let launch = Launch {
        source,
        mirror: Mirror::new(config.agent_count, &config.bounds(), &mut rng),
        bounds: config.bounds(),
        step_size: config.tick_period()?,
    };

    if let Ok(mut slot) = LAUNCH.lock() {
        *slot = Some(launch);
    }
    tracing::info!(role = %config.role, "opening viewer");
    nannou::app(model).update(update).run();
    Ok(())
}

fn model(app: &App) -> Model {
    let launch = LAUNCH
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
        .expect("viewer::run stores the launch state before starting nannou");

    let window_id = app
        .new_window()
        .title("Mirrored Flock")
        .size(1280, 800)
        .view(renderer::view)
        .mouse_moved(input::mouse_moved)
        .mouse_pressed(input::mouse_pressed)
        .mouse_released(input::mouse_released)
        .mouse_wheel(input::mouse_wheel)
        .key_pressed(input::key_pressed)
        .raw_event(input::raw_window_event)
        .build()
        .expect("failed to open window");
    let window = app.window(window_id).expect("window was just created");
    let egui = Egui::from_window(&window);

    let params = match &launch.source {
        Source::Primary { sim, .. } => sim.params,
        Source::Replica { .. } => SimulationParams::default(),
    };

    Model {
        egui,
        camera: Camera::new(),
        mouse_position: ::glam::Vec2::ZERO,
        source: launch.source,
        mirror: launch.mirror,
        bounds: launch.bounds,
        params,
        settings: ViewSettings::default(),
        step_size: launch.step_size,
        accumulator: Duration::ZERO,
        last_update_time: Instant::now(),
        reset_pending: false,
    }
}

fn update(app: &App, model: &mut Model, update: Update) {
    model.egui.set_elapsed_time(update.since_start);

    let status = Status {
        fps: app.fps(),
        tick: model.mirror.last_tick(),
        agents: model.mirror.flock().len(),
        editable: matches!(model.source, Source::Primary { .. }),
    };
    let response = ui::update_ui(&mut model.egui, &mut model.params, &mut model.settings, &status);
    if response.reset_requested {
        model.request_reset();
    }
    if response.reset_camera {
        model.camera.reset();
    }

    let now = Instant::now();
    model.accumulator += now.duration_since(model.last_update_time);
    model.last_update_time = now;

    if let Source::Primary { sim, slot, .. } = &mut model.source {
        if response.params_changed {
            sim.set_params(model.params);
        }
        if std::mem::take(&mut model.reset_pending) {
            sim.request_reset();
        }

        // Fixed timestep, the mirror shows the latest completed tick
        let dt = model.step_size.as_secs_f32();
        let mut steps = 0;
        while model.accumulator >= model.step_size && steps < MAX_STEPS_PER_FRAME {
            slot.publish(sim.step(dt));
            model.accumulator -= model.step_size;
            steps += 1;
        }
        if steps == MAX_STEPS_PER_FRAME {
            model.accumulator = Duration::ZERO;
        }
    } else {
        model.accumulator = Duration::ZERO;
    }

    model.mirror.sync(&model.source);
}
