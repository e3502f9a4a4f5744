mod support;

use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::RgbaImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use wallswitch::slideshow::{Slideshow, run_slideshow};
use wallswitch::{Decoders, Rgba, SessionController, WallpaperRequest};

use support::{MockCompositor, output};

const RED: Rgba = Rgba::opaque(255, 0, 0);
const BLUE: Rgba = Rgba::opaque(0, 0, 255);

fn write_png(path: &Path, color: Rgba) {
    RgbaImage::from_pixel(2, 2, image::Rgba(color.to_array()))
        .save(path)
        .unwrap();
}

#[test]
fn broken_file_is_skipped_and_rotation_continues() {
    let dir = tempfile::tempdir().unwrap();
    let red = dir.path().join("a_red.png");
    let broken = dir.path().join("b_broken.png");
    let blue = dir.path().join("c_blue.png");
    write_png(&red, RED);
    std::fs::write(&broken, b"not a png").unwrap();
    write_png(&blue, BLUE);

    let mock = MockCompositor::new(vec![output(1, "DP-1", 4, 4)]);
    let running = Rc::new(AtomicBool::new(true));
    mock.state().stop_after = Some((2, Rc::clone(&running)));
    let mut session = SessionController::initialize(mock.clone(), Decoders::default()).unwrap();

    let mut show = Slideshow::new(
        vec![red.clone(), broken, blue],
        Duration::from_millis(10),
        false,
        StdRng::seed_from_u64(0),
    )
    .unwrap();
    run_slideshow(
        &mut session,
        &mut show,
        &WallpaperRequest::file(&red),
        &running,
    )
    .unwrap();

    assert!(!running.load(Ordering::Relaxed));
    let state = mock.state();
    let pixels: Vec<_> = state.presents.iter().map(|p| p.first_pixel).collect();
    assert_eq!(pixels, [RED.to_array(), BLUE.to_array()]);
    drop(state);
    assert!(session.last_error().is_none());
}

#[test]
fn stops_before_switching_when_already_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let red = dir.path().join("red.png");
    let blue = dir.path().join("blue.png");
    write_png(&red, RED);
    write_png(&blue, BLUE);

    let mock = MockCompositor::new(vec![output(1, "DP-1", 4, 4)]);
    let mut session = SessionController::initialize(mock.clone(), Decoders::default()).unwrap();
    let mut show = Slideshow::new(
        vec![red.clone(), blue],
        Duration::from_millis(10),
        false,
        StdRng::seed_from_u64(0),
    )
    .unwrap();

    let running = AtomicBool::new(false);
    run_slideshow(&mut session, &mut show, &WallpaperRequest::file(&red), &running).unwrap();

    let state = mock.state();
    assert_eq!(state.presents.len(), 1);
    assert_eq!(state.presents[0].first_pixel, RED.to_array());
}
