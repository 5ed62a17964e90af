use crate::annotations::detection::{Detection, ImageSpace, ModelSpace};
use crate::annotations::rectangle::Rectangle;
use crate::image_utils::preprocess::TransformRecord;

/// Converts a model-space detection into original-image pixels.
///
/// Undoes the preprocessing transform (`image = (model - offset) / scale`) and clamps the box
/// to the image bounds. A box lying wholly in the letterbox padding collapses to zero extent
/// on the nearest image edge.
pub fn to_image_space(
    detection: &Detection<ModelSpace>,
    transform: &TransformRecord,
) -> Detection<ImageSpace> {
    let rect = detection.rect();
    let image_width = transform.source_width as f32;
    let image_height = transform.source_height as f32;

    let unmap_x = |x: f32| ((x - transform.offset_x) / transform.scale_x).clamp(0.0, image_width);
    let unmap_y = |y: f32| ((y - transform.offset_y) / transform.scale_y).clamp(0.0, image_height);
    let left = unmap_x(rect.left());
    let right = unmap_x(rect.right());
    let top = unmap_y(rect.top());
    let bottom = unmap_y(rect.bottom());

    // Clamping keeps left <= right and top <= bottom, so this cannot fail for finite input.
    let mapped = Rectangle::from_corners(left, top, right, bottom)
        .unwrap_or_else(|_| Rectangle::new(left, top, 0.0, 0.0).unwrap_or(*rect));
    Detection::new(mapped, detection.confidence(), detection.class_id())
}

/// Maps a batch of detections, keeping order.
pub fn all_to_image_space(
    detections: &[Detection<ModelSpace>],
    transform: &TransformRecord,
) -> Vec<Detection<ImageSpace>> {
    detections
        .iter()
        .map(|detection| to_image_space(detection, transform))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::preprocess::ResizePolicy;

    fn assert_close(a: &Rectangle, b: &Rectangle, tolerance: f32) {
        let pairs = [
            (a.x(), b.x()),
            (a.y(), b.y()),
            (a.width(), b.width()),
            (a.height(), b.height()),
        ];
        for (lhs, rhs) in pairs {
            assert!((lhs - rhs).abs() <= tolerance, "{} vs {}", a, b);
        }
    }

    fn round_trip(policy: ResizePolicy, source: (u32, u32), target: (u32, u32), rect: Rectangle) {
        let (transform, _) =
            TransformRecord::for_sizes(policy, source.0, source.1, target.0, target.1).unwrap();
        let in_model = Detection::in_model_space(transform.apply(&rect).unwrap(), 0.7, 3);
        let back = to_image_space(&in_model, &transform);
        assert_close(back.rect(), &rect, 0.01);
        assert_eq!(back.class_id(), 3);
        assert_eq!(back.confidence(), 0.7);
    }

    #[test]
    fn letterbox_round_trip() {
        let rect = Rectangle::new(120.0, 75.5, 300.0, 210.25).unwrap();
        round_trip(ResizePolicy::Letterbox, (1920, 1080), (640, 640), rect);
        round_trip(ResizePolicy::Letterbox, (1080, 1920), (640, 640), rect);
        round_trip(ResizePolicy::Letterbox, (333, 777), (640, 480), Rectangle::new(1.0, 2.0, 3.0, 4.0).unwrap());
    }

    #[test]
    fn stretch_round_trip() {
        let rect = Rectangle::new(10.0, 20.0, 400.0, 100.0).unwrap();
        round_trip(ResizePolicy::Stretch, (1280, 720), (640, 640), rect);
    }

    #[test]
    fn clamps_to_image_bounds() {
        let (transform, _) =
            TransformRecord::for_sizes(ResizePolicy::Letterbox, 200, 100, 640, 640).unwrap();
        // Model box spilling into the top padding band and past the right edge.
        let model = Detection::in_model_space(Rectangle::new(600.0, 100.0, 100.0, 200.0).unwrap(), 0.5, 0);
        let mapped = to_image_space(&model, &transform);
        let r = mapped.rect();
        assert!(r.left() >= 0.0 && r.top() >= 0.0);
        assert!(r.right() <= 200.0 && r.bottom() <= 100.0);
        assert_eq!(r.right(), 200.0);
        assert_eq!(r.top(), 0.0);
    }

    #[test]
    fn box_inside_padding_collapses() {
        let (transform, _) =
            TransformRecord::for_sizes(ResizePolicy::Letterbox, 200, 100, 640, 640).unwrap();
        let model = Detection::in_model_space(Rectangle::new(10.0, 10.0, 20.0, 20.0).unwrap(), 0.5, 0);
        let mapped = to_image_space(&model, &transform);
        assert_eq!(mapped.rect().height(), 0.0);
    }
}
