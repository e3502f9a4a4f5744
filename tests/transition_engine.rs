use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use wallswitch::transition::kernels::{self, KernelParams};
use wallswitch::{Raster, Rgba, TransitionKind, TransitionSession};

fn solid(width: u32, height: u32, color: Rgba) -> Raster {
    Raster::filled(width, height, color).unwrap()
}

fn gradient(width: u32, height: u32, seed: u8) -> Raster {
    Raster::from_fn(width, height, |x, y| {
        [
            (x as u8).wrapping_mul(7).wrapping_add(seed),
            (y as u8).wrapping_mul(13),
            seed,
            255,
        ]
    })
    .unwrap()
}

#[test]
fn fade_across_a_full_output() {
    let old = solid(200, 100, Rgba::BLACK);
    let new = solid(200, 100, Rgba::WHITE);
    let mut session = TransitionSession::new(TransitionKind::Fade, 1.0, 200, 100).unwrap();
    session
        .start(&old, &new, &mut StdRng::seed_from_u64(0))
        .unwrap();

    let step = session.update(0.0);
    assert!(step.active);
    assert_eq!(step.frame.unwrap().pixel(0, 0), [0, 0, 0, 255]);

    // Eased progress is exactly one half at the midpoint.
    let step = session.update(0.5);
    assert!(step.active);
    let frame = step.frame.unwrap();
    assert_eq!(frame.pixel(0, 0), [127, 127, 127, 255]);
    assert_eq!(frame.pixel(199, 99), [127, 127, 127, 255]);
    assert_eq!(session.progress(), 0.5);

    let step = session.update(0.5);
    assert!(!step.active);
    assert_eq!(step.frame.unwrap().pixels(), new.pixels());
    assert!(session.update(0.1).frame.is_none());
}

#[test]
fn none_finishes_on_first_update() {
    let old = solid(8, 8, Rgba::BLACK);
    let new = solid(8, 8, Rgba::WHITE);
    let mut session = TransitionSession::new(TransitionKind::None, 1.0, 8, 8).unwrap();
    session
        .start(&old, &new, &mut StdRng::seed_from_u64(0))
        .unwrap();

    let step = session.update(0.0);
    assert!(!step.active);
    assert_eq!(step.frame.unwrap().pixels(), new.pixels());
}

#[test]
fn restart_reuses_the_session() {
    let a = solid(16, 16, Rgba::BLACK);
    let b = solid(16, 16, Rgba::WHITE);
    let mut session = TransitionSession::new(TransitionKind::WipeLeft, 0.25, 16, 16).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    session.start(&a, &b, &mut rng).unwrap();
    while session.update(0.1).active {}
    assert_eq!(session.output().pixels(), b.pixels());

    session.start(&b, &a, &mut rng).unwrap();
    assert!(session.is_active());
    assert_eq!(session.progress(), 0.0);
    assert_eq!(session.output().pixels(), b.pixels());
}

#[test]
fn circle_centers_follow_the_seed() {
    let old = gradient(64, 48, 1);
    let new = gradient(64, 48, 200);
    let center_for = |seed| {
        let mut session =
            TransitionSession::new(TransitionKind::CircleOpen, 1.0, 64, 48).unwrap();
        session
            .start(&old, &new, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        session.center()
    };

    assert_eq!(center_for(9), center_for(9));
    let (cx, cy) = center_for(9);
    assert!((0..64).contains(&cx) && (0..48).contains(&cy));
}

#[test]
fn rejects_mismatched_rasters() {
    let mut session = TransitionSession::new(TransitionKind::Fade, 1.0, 10, 10).unwrap();
    let err = session
        .start(
            &solid(10, 10, Rgba::BLACK),
            &solid(12, 10, Rgba::WHITE),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap_err();
    assert!(err.to_string().contains("12x10"));
    assert!(!session.is_active());
}

fn any_kind() -> impl Strategy<Value = TransitionKind> {
    prop::sample::select(TransitionKind::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_kind_starts_on_old(
        kind in any_kind().prop_filter("none jumps straight to new", |k| *k != TransitionKind::None),
        width in 1u32..40,
        height in 1u32..40,
        cx in 0i32..40,
        cy in 0i32..40,
    ) {
        let old = gradient(width, height, 11);
        let new = gradient(width, height, 170);
        let mut out = Raster::new(width, height).unwrap();
        let params = KernelParams { center: (cx % width as i32, cy % height as i32) };

        kernels::render(kind, &old, &new, 0.0, &params, &mut out);
        prop_assert_eq!(out.pixels(), old.pixels());
    }

    #[test]
    fn every_kind_ends_on_new_with_monotonic_progress(
        kind in any_kind(),
        width in 1u32..32,
        height in 1u32..32,
        deltas in prop::collection::vec(0.0f32..0.2, 1..40),
        seed in any::<u64>(),
    ) {
        let old = gradient(width, height, 3);
        let new = gradient(width, height, 90);
        let mut session = TransitionSession::new(kind, 0.5, width, height).unwrap();
        session.start(&old, &new, &mut StdRng::seed_from_u64(seed)).unwrap();

        let mut last = session.progress();
        for delta in deltas {
            let step = session.update(delta);
            prop_assert!(step.frame.is_some());
            if !step.active {
                break;
            }
            let progress = session.progress();
            prop_assert!(progress >= last);
            prop_assert!(progress < 1.0);
            last = progress;
        }

        // Whatever remains, one large step lands on the new raster.
        let step = session.update(1.0);
        if let Some(frame) = step.frame {
            prop_assert_eq!(frame.pixels(), new.pixels());
        }
        prop_assert!(!session.is_active());
        prop_assert_eq!(session.output().pixels(), new.pixels());
    }

    #[test]
    fn fade_stays_between_endpoints(t in 0.0f32..=1.0, a in any::<u8>(), b in any::<u8>()) {
        let old = solid(3, 2, Rgba::opaque(a, a, a));
        let new = solid(3, 2, Rgba::opaque(b, b, b));
        let mut out = Raster::new(3, 2).unwrap();
        kernels::fade(&old, &new, t, &mut out);

        let value = out.pixel(1, 1)[0];
        prop_assert!(value >= a.min(b) && value <= a.max(b));
    }
}
