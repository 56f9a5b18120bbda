use std::time::{Duration, Instant};

use image::Rgba;
use rasterview::raster::{DisplayFormat, JobSpec, PixelFormat, SyntheticRasterizer};
use rasterview::settings::Settings;
use rasterview::test_utils::test_helpers::pump_until_idle;
use rasterview::view::{DualViewCoordinator, ViewEvent, ViewRole};

fn run_with(format: DisplayFormat) -> (DualViewCoordinator, Vec<ViewEvent>) {
    let page = (1.0, 1.0);
    let mut coordinator = DualViewCoordinator::new(
        &JobSpec::new("synthetic"),
        Box::new(SyntheticRasterizer::new(2, page).with_format(format)),
        Box::new(SyntheticRasterizer::new(2, page).with_format(format)),
        &Settings::default(),
    )
    .unwrap();
    coordinator.start().unwrap();
    let mut events = pump_until_idle(&mut coordinator);

    // Sync notices trail the page they belong to.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !events.iter().any(is_detail_sync) && Instant::now() < deadline {
        events.extend(coordinator.wait_events(Duration::from_millis(20)));
    }
    (coordinator, events)
}

fn is_detail_sync(event: &ViewEvent) -> bool {
    matches!(
        event,
        ViewEvent::Synced {
            view: ViewRole::Detail
        }
    )
}

#[test]
fn producer_layouts_decode_to_same_picture() {
    let (reference, events) = run_with(DisplayFormat::top_first(PixelFormat::Rgb24));
    let (flipped, _) = run_with(DisplayFormat {
        pixel: PixelFormat::Bgrx32,
        bottom_first: true,
    });

    for role in [ViewRole::Overview, ViewRole::Detail] {
        let expected = reference.frame(role).unwrap().image.to_rgba_image().unwrap();
        let actual = flipped.frame(role).unwrap().image.to_rgba_image().unwrap();
        assert_eq!(expected.dimensions(), actual.dimensions());
        assert!(expected == actual, "{role:?} differs");
    }

    let overview = reference
        .frame(ViewRole::Overview)
        .unwrap()
        .image
        .to_rgba_image()
        .unwrap();
    // Page bar sits near the top edge.
    assert_eq!(*overview.get_pixel(5, 20), Rgba([0, 0, 0, 255]));
    assert_eq!(*overview.get_pixel(5, 5), Rgba([255, 255, 255, 255]));

    assert!(events.iter().any(|e| matches!(
        e,
        ViewEvent::Damaged {
            view: ViewRole::Overview,
            ..
        }
    )));
    assert!(events.iter().any(is_detail_sync));
    assert!(events.iter().any(|e| matches!(e, ViewEvent::OverlayChanged(_))));
}

#[test]
fn gray_pages_render() {
    let (coordinator, _) = run_with(DisplayFormat::top_first(PixelFormat::Gray8));
    let image = coordinator.frame(ViewRole::Overview).unwrap().image;
    assert_eq!(image.format, PixelFormat::Gray8);
    assert_eq!((image.width, image.height), (72, 72));
    assert_eq!(image.row_stride, 72);
}
