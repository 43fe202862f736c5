use image::{Rgba, RgbaImage};

use overlay_client::inference::{parse_response, BoxPx, Detection};
use overlay_client::overlay::{OverlayRenderer, OverlayStyle, LABEL_HEIGHT};

fn det(label: &str, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
    Detection {
        label: label.to_string(),
        confidence,
        bbox: BoxPx::new(x, y, w, h),
    }
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

#[test]
fn identical_inputs_render_identical_pixels() {
    let renderer = OverlayRenderer::new(OverlayStyle::default());
    let frame = gradient(640, 480);
    let detections = vec![
        det("cup", 0.87, 100.0, 50.0, 80.0, 60.0),
        det("person", 0.5, 0.0, 0.0, 200.0, 300.0),
    ];

    let mut first = RgbaImage::new(640, 480);
    let plan_a = renderer.render(&mut first, &frame, &detections);

    let mut second = RgbaImage::from_pixel(640, 480, Rgba([255, 255, 255, 255]));
    renderer.render(&mut second, &frame, &[det("stale", 0.9, 10.0, 10.0, 50.0, 50.0)]);
    let plan_b = renderer.render(&mut second, &frame, &detections);

    assert_eq!(first.as_raw(), second.as_raw());
    assert_eq!(plan_a, plan_b);
}

#[test]
fn chip_for_box_at_top_edge_stays_on_surface() {
    let renderer = OverlayRenderer::new(OverlayStyle::default());
    let mut surface = RgbaImage::new(320, 240);
    let plan = renderer.render(
        &mut surface,
        &gradient(320, 240),
        &[det("cup", 0.87, 40.0, 0.0, 80.0, 60.0)],
    );

    let chip = &plan.boxes[0].chip;
    assert!(chip.y >= 0);
    assert_eq!(chip.y, 0);
    assert!(!chip.above_box);
    let style = renderer.style();
    assert_eq!(*surface.get_pixel(45, 5), style.chip_color);
}

#[test]
fn chip_sits_above_box_when_there_is_room() {
    let renderer = OverlayRenderer::new(OverlayStyle::default());
    let mut surface = RgbaImage::new(320, 240);
    let box_y = LABEL_HEIGHT as f32 + 15.0;
    let plan = renderer.render(
        &mut surface,
        &gradient(320, 240),
        &[det("bottle", 0.423, 40.0, box_y, 50.0, 50.0)],
    );

    let chip = &plan.boxes[0].chip;
    assert!(chip.above_box);
    assert_eq!(chip.y, 15);
    assert_eq!(chip.y + chip.height as i32, box_y as i32);
    assert_eq!(chip.text, "bottle 42%");
}

#[test]
fn detections_are_drawn_in_backend_order() {
    let renderer = OverlayRenderer::new(OverlayStyle::default());
    let mut surface = RgbaImage::new(320, 240);
    let plan = renderer.render(
        &mut surface,
        &gradient(320, 240),
        &[
            det("b", 0.2, 10.0, 100.0, 20.0, 20.0),
            det("a", 0.9, 200.0, 100.0, 20.0, 20.0),
        ],
    );
    let labels: Vec<_> = plan.boxes.iter().map(|b| b.chip.text.clone()).collect();
    assert_eq!(labels, vec!["b 20%", "a 90%"]);
    assert!(!plan.text_rasterized);
}

#[test]
fn missing_font_file_is_an_error() {
    let err = OverlayRenderer::load_font(std::path::Path::new("/nonexistent/font.ttf"));
    assert!(err.is_err());
}

#[test]
fn backend_boxes_far_off_the_surface_render_without_panicking() {
    let renderer = OverlayRenderer::new(OverlayStyle::default());
    let frame = gradient(320, 240);
    for bbox in ["[10,-3000000000,20,20]", "[3000000000,10,20,20]"] {
        let body = format!(
            r#"{{"status":"success","latency_ms":5,"detections":[{{"label":"cup","conf":0.9,"box":{}}}]}}"#,
            bbox
        );
        let result = parse_response(body.as_bytes()).expect("valid response");
        let mut surface = RgbaImage::new(320, 240);
        let plan = renderer.render(&mut surface, &frame, &result.detections);
        assert_eq!(plan.boxes.len(), 1);
        assert!(plan.boxes[0].chip.y >= 0);
    }
}
