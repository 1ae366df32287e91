mod common;

use common::{dem, image, Recorder, NO_DATA};
use geoclipmap::{
    BackendError, CameraView, ClipmapConfig, ClipmapLayout, FootprintEngine, InstanceKind, Terrain,
    TerrainError, WorldOrigin,
};
use glam::{DVec3, Vec2, Vec3};

fn looking_down_at(center: Vec2, distance: f32) -> CameraView {
    CameraView {
        position: center.extend(distance),
        forward: Vec3::NEG_Z,
        distance_to_center: distance,
    }
}

#[test]
fn shared_offset_and_elevation_lookup() {
    let dem = dem(100, 100, (0.0, 1000.0), 10.0, |c, r| {
        if (c, r) == (50, 50) {
            123.4
        } else {
            0.0
        }
    });
    let image = image(100, 100, (0.0, 1000.0), 10.0);

    let mut origin = WorldOrigin::new();
    let offset = origin.establish_from(&dem, &image, 1000.0);
    assert!((offset - DVec3::new(500.0, 500.0, 1000.0)).length() < 1e-9);

    let mut gpu = Recorder::default();
    let terrain = Terrain::new(&dem, &image, &origin, ClipmapConfig::new(4, 3), &mut gpu).unwrap();

    // Absolute (500, 500) is local (0, 0), pixel (50, 50).
    let local = origin.to_local_xy(glam::DVec2::new(500.0, 500.0)).unwrap();
    assert_eq!(local, Vec2::ZERO);
    assert_eq!(terrain.elevation_grid().world_to_pixel(local), glam::IVec2::new(50, 50));

    let z = terrain.elevation_at(local).unwrap();
    assert!((z - (-876.6)).abs() < 1e-3, "z = {z}");
    assert!((gpu.elevations[50 * 100 + 50] - (-876.6)).abs() < 1e-3);

    // Adding the origin back recovers the source height.
    let absolute = terrain.absolute_elevation_at(local).unwrap();
    assert!((absolute - 123.4).abs() < 1e-3, "absolute = {absolute}");
    assert_eq!(terrain.absolute_elevation_at(Vec2::splat(f32::NAN)), None);
}

#[test]
fn world_origin_is_computed_once_per_session() {
    let a = dem(100, 100, (0.0, 1000.0), 10.0, |_, _| 0.0);
    let b = dem(10, 10, (5000.0, 9000.0), 1.0, |_, _| 0.0);
    let img = image(100, 100, (0.0, 1000.0), 10.0);

    let mut origin = WorldOrigin::new();
    let first = origin.establish_from(&a, &img, 1000.0);
    let second = origin.establish_from(&b, &b, 0.0);
    assert_eq!(first, second);

    let mut gpu = Recorder::default();
    let t1 = Terrain::new(&a, &img, &origin, ClipmapConfig::new(4, 3), &mut gpu).unwrap();
    let t2 = Terrain::new(&b, &img, &origin, ClipmapConfig::new(4, 3), &mut gpu).unwrap();
    assert_eq!(t1.world_offset(), first);
    assert_eq!(t2.world_offset(), first);
}

#[test]
fn missing_world_origin_creates_nothing() {
    let dem = dem(8, 8, (0.0, 8.0), 1.0, |_, _| 0.0);
    let image = image(8, 8, (0.0, 8.0), 1.0);
    let mut gpu = Recorder::default();

    let result = Terrain::new(&dem, &image, &WorldOrigin::new(), ClipmapConfig::default(), &mut gpu);
    assert!(matches!(result, Err(TerrainError::MissingWorldOrigin)));
    assert!(gpu.calls.is_empty());
}

#[test]
fn image_without_three_bands_is_rejected() {
    let dem = dem(8, 8, (0.0, 8.0), 1.0, |_, _| 0.0);
    let grey = common::dem(8, 8, (0.0, 8.0), 1.0, |_, _| 0.3);
    let mut origin = WorldOrigin::new();
    origin.establish_from(&dem, &grey, 0.0);

    let mut gpu = Recorder::default();
    let result = Terrain::new(&dem, &grey, &origin, ClipmapConfig::default(), &mut gpu);
    assert!(matches!(
        result,
        Err(TerrainError::MissingBands {
            which: "image",
            count: 1,
            need: 3
        })
    ));
}

#[test]
fn rasters_too_large_for_the_device_abort_construction() {
    let dem = dem(8, 8, (0.0, 8.0), 1.0, |_, _| 0.0);
    let image = image(8, 8, (0.0, 8.0), 1.0);
    let mut origin = WorldOrigin::new();
    origin.establish_from(&dem, &image, 0.0);

    let mut gpu = Recorder {
        buffer_limit: Some(128),
        ..Recorder::default()
    };
    let result = Terrain::new(&dem, &image, &origin, ClipmapConfig::new(4, 3), &mut gpu);
    assert!(matches!(
        result,
        Err(TerrainError::Backend(BackendError::BufferTooLarge {
            what: "elevations",
            size: 256,
            limit: 128
        }))
    ));
    assert!(gpu.calls.is_empty());

    // Exactly at the limit is accepted.
    gpu.buffer_limit = Some(256);
    assert!(Terrain::new(&dem, &image, &origin, ClipmapConfig::new(4, 3), &mut gpu).is_ok());
}

#[test]
fn elevation_round_trips_through_pixel_centres() {
    let height = |c: u32, r: u32| {
        if (c + r) % 17 == 0 {
            NO_DATA
        } else {
            250.0 + c as f32 * 0.5 - r as f32 * 0.25
        }
    };
    let dem = dem(40, 30, (300_000.0, 5_000_000.0), 2.0, height);
    let image = image(40, 30, (300_000.0, 5_000_000.0), 2.0);
    let mut origin = WorldOrigin::new();
    let offset = origin.establish_from(&dem, &image, 100.0);

    let mut gpu = Recorder::default();
    let terrain = Terrain::new(&dem, &image, &origin, ClipmapConfig::new(4, 3), &mut gpu).unwrap();
    let grid = terrain.elevation_grid();

    for row in 0..30 {
        for col in 0..40 {
            let world = grid.pixel_to_world(col, row);
            let expected = height(col, row);
            match terrain.elevation_at(world) {
                Some(z) => {
                    assert_ne!(expected, NO_DATA);
                    assert!((z - (expected - offset.z as f32)).abs() < 1e-3);
                }
                None => assert_eq!(expected, NO_DATA, "({col}, {row})"),
            }
        }
    }

    let outside = [
        grid.pixel_to_world(0, 0) - Vec2::new(2.0, 0.0),
        grid.pixel_to_world(39, 0) + Vec2::new(2.0, 0.0),
        grid.pixel_to_world(0, 0) + Vec2::new(0.0, 2.0),
        grid.pixel_to_world(0, 29) - Vec2::new(0.0, 2.0),
    ];
    for world in outside {
        assert_eq!(terrain.elevation_at(world), None, "{world:?}");
    }
}

#[test]
fn near_camera_keeps_every_ring_level() {
    // Finest level width = (40 / 6) * (7 - 1) = 40.
    let layout = ClipmapLayout {
        levels: 4,
        n: 7,
        m: 2,
        dem_pixel_scale: Vec2::splat(40.0 / 6.0),
        dem_grid_offset: Vec2::ZERO,
    };
    let mut engine = FootprintEngine::new(layout);

    let report = engine.update(&looking_down_at(Vec2::new(3.0, -7.0), 50.0));
    assert_eq!(report.collapsed_level, 3);
    assert_eq!(report.recomputed, vec![0, 1, 2]);
    assert_eq!(engine.buffer(InstanceKind::RingBlock).render_count(), 36);
    for l in 0..3 {
        assert!(engine.snapped_center(l).is_some());
    }

    // Level 2 is 80 wide and collapses past 200.
    let report = engine.update(&looking_down_at(Vec2::new(3.0, -7.0), 250.0));
    assert_eq!(report.collapsed_level, 2);
    assert_eq!(engine.buffer(InstanceKind::RingBlock).render_count(), 24);
    assert_eq!(engine.buffer(InstanceKind::RingFixUp).render_count(), 8);
    assert_eq!(engine.buffer(InstanceKind::InteriorTrim).render_count(), 4);
}
