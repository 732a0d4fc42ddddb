use crate::types::{Rect, Resolution};

/// How an image is fitted into its destination rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSizing {
    AutoSize,
    Clip,
    FitProportional,
    #[default]
    Fit,
}

/// Pixel size and recorded resolution of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
    pub resolution: Resolution,
}

/// Where to draw an image, and the clip to apply while drawing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Device-pixel rectangle the whole image is mapped onto.
    pub dest: Rect,
    /// Additional clip intersected with the current clip for this draw.
    pub clip: Option<Rect>,
    /// True when the image is drawn 1:1 with its source pixels.
    pub unscaled: bool,
}

/// Computes the image's destination for `sizing`. `dest` is the
/// padding-adjusted content rectangle in device pixels.
pub fn place_image(
    sizing: ImageSizing,
    image: ImageMetrics,
    dest: Rect,
    device: Resolution,
) -> Placement {
    match sizing {
        ImageSizing::AutoSize => auto_size(image, dest, device),
        ImageSizing::Clip => Placement {
            clip: Some(dest),
            ..auto_size(image, dest, device)
        },
        ImageSizing::FitProportional => Placement {
            dest: fit_proportional(image, dest),
            clip: None,
            unscaled: false,
        },
        ImageSizing::Fit => Placement {
            dest,
            clip: None,
            unscaled: false,
        },
    }
}

fn auto_size(image: ImageMetrics, dest: Rect, device: Resolution) -> Placement {
    let left = dest.x.round();
    let top = dest.y.round();
    if image.resolution == device {
        return Placement {
            dest: Rect::new(left, top, image.width as f32, image.height as f32),
            clip: None,
            unscaled: true,
        };
    }
    Placement {
        dest: Rect::new(left, top, dest.width.round(), dest.height.round()),
        clip: None,
        unscaled: false,
    }
}

/// Largest rectangle anchored at `dest`'s top-left that keeps the image's
/// aspect ratio and stays inside `dest`.
pub fn fit_proportional(image: ImageMetrics, dest: Rect) -> Rect {
    if image.width == 0 || image.height == 0 || !dest.is_drawable() {
        return Rect::new(dest.x, dest.y, dest.width.max(0.0), dest.height.max(0.0));
    }
    let image_ratio = image.height as f32 / image.width as f32;
    let dest_ratio = dest.height / dest.width;
    let mut width = dest.width;
    let mut height = dest.height;
    if image_ratio > dest_ratio {
        width = height / image_ratio;
    } else if image_ratio < dest_ratio {
        height = width * image_ratio;
    }
    Rect::new(dest.x, dest.y, width.min(dest.width), height.min(dest.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(width: u32, height: u32, dpi: f32) -> ImageMetrics {
        ImageMetrics {
            width,
            height,
            resolution: Resolution::uniform(dpi),
        }
    }

    #[test]
    fn autosize_matching_resolution_draws_native_pixels() {
        let dest = Rect::new(10.4, 20.6, 300.0, 300.0);
        let placed = place_image(
            ImageSizing::AutoSize,
            metrics(64, 32, 200.0),
            dest,
            Resolution::uniform(200.0),
        );
        assert!(placed.unscaled);
        assert_eq!(placed.dest, Rect::new(10.0, 21.0, 64.0, 32.0));
        assert_eq!(placed.clip, None);
    }

    #[test]
    fn autosize_other_resolution_stretches_like_fit() {
        let dest = Rect::new(0.0, 0.0, 120.0, 80.0);
        let placed = place_image(
            ImageSizing::AutoSize,
            metrics(64, 32, 96.0),
            dest,
            Resolution::uniform(200.0),
        );
        assert!(!placed.unscaled);
        assert_eq!(placed.dest, dest);
    }

    #[test]
    fn clip_restricts_to_destination() {
        let dest = Rect::new(5.0, 5.0, 20.0, 20.0);
        let placed = place_image(
            ImageSizing::Clip,
            metrics(64, 64, 200.0),
            dest,
            Resolution::uniform(200.0),
        );
        assert_eq!(placed.clip, Some(dest));
        assert_eq!(placed.dest.width, 64.0);
    }

    #[test]
    fn fit_stretches_to_destination() {
        let dest = Rect::new(1.0, 2.0, 30.0, 400.0);
        let placed = place_image(
            ImageSizing::Fit,
            metrics(10, 10, 72.0),
            dest,
            Resolution::uniform(200.0),
        );
        assert_eq!(placed.dest, dest);
    }

    #[test]
    fn fit_proportional_tall_image_shrinks_width() {
        let dest = Rect::new(0.0, 0.0, 100.0, 100.0);
        let rect = fit_proportional(metrics(50, 100, 96.0), dest);
        assert_eq!(rect, Rect::new(0.0, 0.0, 50.0, 100.0));
    }

    #[test]
    fn fit_proportional_wide_image_shrinks_height() {
        let dest = Rect::new(10.0, 10.0, 200.0, 100.0);
        let rect = fit_proportional(metrics(400, 100, 96.0), dest);
        assert_eq!(rect, Rect::new(10.0, 10.0, 200.0, 50.0));
    }

    #[test]
    fn fit_proportional_stays_inside_and_keeps_ratio() {
        let dests = [
            Rect::new(3.0, 7.0, 97.0, 13.0),
            Rect::new(0.0, 0.0, 1.0, 500.0),
            Rect::new(12.5, 8.25, 333.3, 211.1),
        ];
        let images = [metrics(1, 1, 96.0), metrics(640, 480, 96.0), metrics(17, 911, 96.0)];
        for dest in dests {
            for image in images {
                let rect = fit_proportional(image, dest);
                assert!(dest.contains_rect(&rect), "{rect:?} escapes {dest:?}");
                assert_eq!((rect.x, rect.y), (dest.x, dest.y));
                let want = image.height as f32 / image.width as f32;
                let got = rect.height / rect.width;
                assert!((want - got).abs() / want < 1e-3, "ratio {got} != {want}");
            }
        }
    }
}
