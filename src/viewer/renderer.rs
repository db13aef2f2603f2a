/*
 * Renderer Module
 *
 * Draws the mirrored flock: the cube outline, one disc per boid colored by
 * species, optional heading ticks and neighbor links, then the egui panel.
 * Everything comes from the Mirror, so a primary and a replica render the
 * same data in the same way.
 *
 * Boids are drawn far to near so closer discs cover farther ones.
 */

use nannou::prelude::*;

use super::camera::{Camera, Projected};
use super::Model;
use crate::boid::Pose;

// Length of the heading tick in world units
const HEADING_LENGTH: f32 = 0.6;

// Smallest disc radius in pixels
const MIN_RADIUS: f32 = 1.0;

pub fn view(app: &App, model: &Model, frame: Frame) {
    let draw = app.draw();
    draw.background().color(BLACK);

    let window_rect = app.window_rect();
    let focal = window_rect.h();
    let viewer = model.mirror.viewer();
    let camera = &model.camera;
    let project = |p: ::glam::Vec3| camera.project(&viewer, p, focal);

    draw_cube(&draw, camera, &viewer, focal, model.bounds);

    let flock = model.mirror.flock();
    let projected: Vec<Option<Projected>> = flock
        .render_items()
        .map(|(pose, _)| project(pose.position))
        .collect();

    if model.settings.show_neighbors {
        for (i, j) in flock.neighbor_pairs() {
            if let (Some(a), Some(b)) = (projected[i], projected[j]) {
                draw.line()
                    .start(pt2(a.screen.x, a.screen.y))
                    .end(pt2(b.screen.x, b.screen.y))
                    .weight(1.0)
                    .color(rgba(0.4, 0.4, 0.9, 0.25));
            }
        }
    }

    let mut order: Vec<usize> = (0..projected.len())
        .filter(|&i| projected[i].is_some())
        .collect();
    order.sort_by(|&a, &b| {
        let da = projected[a].map_or(0.0, |p| p.depth);
        let db = projected[b].map_or(0.0, |p| p.depth);
        db.total_cmp(&da)
    });

    let point_size = model.mirror.point_size();
    for i in order {
        let (Some(p), Some(boid)) = (projected[i], flock.get(i)) else {
            continue;
        };
        let [r, g, b] = boid.species.color();
        let color = rgb8(r, g, b);

        if model.settings.show_headings {
            if let Some(tip) = project(boid.pose.position + boid.pose.forward() * HEADING_LENGTH) {
                draw.line()
                    .start(pt2(p.screen.x, p.screen.y))
                    .end(pt2(tip.screen.x, tip.screen.y))
                    .weight(1.0)
                    .color(color);
            }
        }

        draw.ellipse()
            .x_y(p.screen.x, p.screen.y)
            .radius((point_size * 0.5 * p.scale).max(MIN_RADIUS))
            .color(color);
    }

    if let Err(e) = draw.to_frame(app, &frame) {
        tracing::warn!(error = ?e, "failed to draw frame");
    }
    if let Err(e) = model.egui.draw_to_frame(&frame) {
        tracing::warn!(error = ?e, "failed to draw ui");
    }
}

fn draw_cube(draw: &Draw, camera: &Camera, viewer: &Pose, focal: f32, bounds: crate::boid::Bounds) {
    let h = bounds.half_extent;
    let corner = |i: usize| {
        bounds.center
            + ::glam::Vec3::new(
                if i & 1 == 0 { -h } else { h },
                if i & 2 == 0 { -h } else { h },
                if i & 4 == 0 { -h } else { h },
            )
    };

    // Edges join corners that differ in exactly one axis bit
    for a in 0..8usize {
        for bit in [1, 2, 4] {
            let b = a | bit;
            if b == a {
                continue;
            }
            let (Some(pa), Some(pb)) = (
                camera.project(viewer, corner(a), focal),
                camera.project(viewer, corner(b), focal),
            ) else {
                continue;
            };
            draw.line()
                .start(pt2(pa.screen.x, pa.screen.y))
                .end(pt2(pb.screen.x, pb.screen.y))
                .weight(1.0)
                .color(rgba(0.3, 0.3, 0.3, 1.0));
        }
    }
}
