/*
 * Input Module
 *
 * Mouse and keyboard handlers for the viewer window.
 *
 * Features:
 * - Camera panning with mouse drag
 * - Camera zooming with mouse wheel
 * - R fires the flock reset trigger on a primary
 * - Events over the egui panel stay with egui
 */

use nannou::prelude::*;
use nannou::winit::event::{MouseButton, MouseScrollDelta, TouchPhase};

use super::Model;

pub fn mouse_moved(_app: &App, model: &mut Model, pos: Point2) {
    let pos = ::glam::Vec2::new(pos.x, pos.y);
    model.camera.drag(pos);
    model.mouse_position = pos;
}

pub fn mouse_pressed(_app: &App, model: &mut Model, button: MouseButton) {
    if button == MouseButton::Left && !model.egui.ctx().is_pointer_over_area() {
        model.camera.start_drag(model.mouse_position);
    }
}

pub fn mouse_released(_app: &App, model: &mut Model, button: MouseButton) {
    if button == MouseButton::Left {
        model.camera.end_drag();
    }
}

pub fn mouse_wheel(_app: &App, model: &mut Model, delta: MouseScrollDelta, _phase: TouchPhase) {
    if model.egui.ctx().is_pointer_over_area() {
        return;
    }
    match delta {
        MouseScrollDelta::LineDelta(_, y) => model.camera.zoom(y),
        MouseScrollDelta::PixelDelta(pos) => model.camera.zoom(pos.y as f32 * 0.01),
    }
}

pub fn key_pressed(_app: &App, model: &mut Model, key: Key) {
    if key == Key::R && !model.egui.ctx().wants_keyboard_input() {
        model.request_reset();
    }
}

pub fn raw_window_event(_app: &App, model: &mut Model, event: &nannou::winit::event::WindowEvent) {
    model.egui.handle_raw_event(event);
}
