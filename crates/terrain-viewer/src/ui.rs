//! egui overlays: read-only HUD and the terrain material panel.

use geoclipmap::{FenceOutcome, FrameStats};

/// Read-only numbers drawn in the top-left corner.
pub struct HudInfo<'a> {
    pub dataset: &'a str,
    pub distance_to_center: f32,
    /// Absolute terrain height under the orbit target, if any.
    pub ground_elevation: Option<f64>,
    pub frame_ms: f32,
    pub stats: Option<&'a FrameStats>,
}

pub fn draw_hud(ctx: &egui::Context, info: &HudInfo<'_>) {
    egui::Area::new(egui::Id::new("terrain_hud"))
        .anchor(egui::Align2::LEFT_TOP, egui::vec2(10.0, 10.0))
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.label(info.dataset);
                ui.label(format!("Distance: {:.0} m", info.distance_to_center));
                match info.ground_elevation {
                    Some(h) => ui.label(format!("Ground: {:.1} m", h)),
                    None => ui.label("Ground: no data"),
                };
                ui.label(format!("Frame: {:.1} ms", info.frame_ms));

                let Some(stats) = info.stats else {
                    return;
                };
                ui.separator();
                ui.label(format!("Collapsed level: {}", stats.footprints.collapsed_level));
                ui.label(format!(
                    "Levels moved: {} ({} cached)",
                    stats.footprints.recomputed.len(),
                    stats.footprints.cache_hits
                ));
                let counts: Vec<String> = stats
                    .draws
                    .iter()
                    .map(|(kind, n)| format!("{} {}", kind.label(), n))
                    .collect();
                ui.label(counts.join(" / "));
                ui.label(format!("Fence: {}", fence_label(&stats.fence)));
            });
        });
}

fn fence_label(outcome: &FenceOutcome) -> String {
    match outcome {
        FenceOutcome::Idle => "idle".to_owned(),
        FenceOutcome::Signaled { retries: 0 } => "signaled".to_owned(),
        FenceOutcome::Signaled { retries } => format!("signaled after {} retries", retries),
        FenceOutcome::WaitFailed => "wait failed".to_owned(),
        FenceOutcome::GaveUp { retries } => format!("gave up after {} retries", retries),
    }
}

/// Material controls. Values are written back only when a slider moved.
pub struct TerrainPanel {
    pub vertical_exaggeration: f32,
    pub alpha: f32,
    pub follow_ground: bool,
}

impl TerrainPanel {
    /// Returns true when anything changed.
    pub fn draw(&mut self, ctx: &egui::Context) -> bool {
        let mut changed = false;
        egui::Window::new("Terrain")
            .default_pos(egui::pos2(10.0, 220.0))
            .resizable(false)
            .show(ctx, |ui| {
                changed |= ui
                    .add(
                        egui::Slider::new(&mut self.vertical_exaggeration, 0.0..=10.0)
                            .text("Exaggeration"),
                    )
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.alpha, 0.0..=1.0).text("Alpha"))
                    .changed();
                changed |= ui
                    .checkbox(&mut self.follow_ground, "Follow ground")
                    .changed();
            });
        changed
    }
}
