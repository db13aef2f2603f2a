/*
 * UI Module
 *
 * Parameter panel drawn with nannou_egui. On a primary the sliders edit the
 * live SimulationParams, which the simulation freezes at the start of each
 * tick. On a replica the panel only shows what the primary publishes.
 */

use nannou_egui::{egui, Egui};

use crate::params::SimulationParams;
use crate::species::Species;

// Viewer-only toggles that never reach the simulation
#[derive(Clone, Copy, Debug)]
pub struct ViewSettings {
    pub show_neighbors: bool,
    pub show_headings: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            show_neighbors: false,
            show_headings: true,
        }
    }
}

// Read-only numbers for the status section
pub struct Status {
    pub fps: f32,
    pub tick: Option<u64>,
    pub agents: usize,
    pub editable: bool,
}

#[derive(Default)]
pub struct UiResponse {
    pub reset_requested: bool,
    pub reset_camera: bool,
    pub params_changed: bool,
}

pub fn update_ui(
    egui: &mut Egui,
    params: &mut SimulationParams,
    settings: &mut ViewSettings,
    status: &Status,
) -> UiResponse {
    let mut response = UiResponse::default();
    let before = *params;

    let ctx = egui.begin_frame();

    egui::Window::new("Simulation Controls")
        .default_pos([10.0, 10.0])
        .show(&ctx, |ui| {
            ui.collapsing("Flock", |ui| {
                ui.set_enabled(status.editable);
                ui.add(
                    egui::Slider::new(&mut params.time_step, SimulationParams::get_time_step_range())
                        .text("Time Step"),
                );
                ui.add(
                    egui::Slider::new(&mut params.point_size, SimulationParams::get_point_size_range())
                        .text("Point Size"),
                );
                ui.checkbox(&mut params.boundary_handling, "Boundary Handling");
                if ui.button("Reset Boids").clicked() {
                    response.reset_requested = true;
                }
            });

            for species in Species::ALL {
                ui.collapsing(species.name(), |ui| {
                    ui.set_enabled(status.editable);
                    let bundle = params.species_mut(species);
                    ui.add(
                        egui::Slider::new(
                            &mut bundle.vision_radius,
                            SimulationParams::get_vision_radius_range(),
                        )
                        .text("Vision Radius"),
                    );
                    ui.add(
                        egui::Slider::new(&mut bundle.cohesion, SimulationParams::get_weight_range())
                            .text("Cohesion"),
                    );
                    ui.add(
                        egui::Slider::new(&mut bundle.separation, SimulationParams::get_weight_range())
                            .text("Separation"),
                    );
                    ui.add(
                        egui::Slider::new(&mut bundle.alignment, SimulationParams::get_weight_range())
                            .text("Alignment"),
                    );
                    ui.add(
                        egui::Slider::new(&mut bundle.turn_rate, SimulationParams::get_turn_rate_range())
                            .text("Turn Rate"),
                    );
                });
            }

            ui.collapsing("Camera Controls", |ui| {
                ui.label("Zoom: mouse wheel");
                ui.label("Pan: click and drag");
                ui.label("Reset flock: R");
                if ui.button("Reset Camera").clicked() {
                    response.reset_camera = true;
                }
            });

            ui.separator();
            ui.checkbox(&mut settings.show_headings, "Show Headings");
            ui.checkbox(&mut settings.show_neighbors, "Show Neighbor Links");
            ui.label(format!("FPS: {:.1}", status.fps));
            ui.label(format!("Boids: {}", status.agents));
            match status.tick {
                Some(tick) => ui.label(format!("Tick: {}", tick)),
                None => ui.label("Waiting for primary"),
            };
        });

    if *params != before {
        *params = params.clamped();
        response.params_changed = true;
    }
    response
}
