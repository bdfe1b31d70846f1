//! Pixel access: crop a rectangle of the source image and encode it as JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{CellFailure, RasterError, SliceError};
use crate::geometry::PixelRect;
use crate::slice::{SliceFile, SlicePlan};

/// Anything that can hand out JPEG-encoded crops of one fixed image.
pub trait RasterSource: Send + Sync {
    fn dimensions(&self) -> (u32, u32);

    fn crop(&self, rect: PixelRect) -> Result<Vec<u8>, RasterError>;
}

/// Decoded image, flattened onto white so transparent regions encode the way
/// a browser shows them over a blank page.
#[derive(Debug, Clone)]
pub struct ImageRaster {
    pixels: RgbImage,
    quality: u8,
}

impl ImageRaster {
    pub fn new(image: &DynamicImage, quality: u8) -> Self {
        Self::from_rgba(&image.to_rgba8(), quality)
    }

    pub fn from_rgba(image: &RgbaImage, quality: u8) -> Self {
        Self {
            pixels: flatten_on_white(image),
            quality: quality.clamp(1, 100),
        }
    }
}

pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = f64::from(a) / 255.0;
        let mix = |c: u8| (f64::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([mix(r), mix(g), mix(b)])
    })
}

impl RasterSource for ImageRaster {
    fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn crop(&self, rect: PixelRect) -> Result<Vec<u8>, RasterError> {
        let (width, height) = self.dimensions();
        let fits = rect.width > 0
            && rect.height > 0
            && rect.x.checked_add(rect.width).is_some_and(|r| r <= width)
            && rect.y.checked_add(rect.height).is_some_and(|b| b <= height);
        if !fits {
            return Err(RasterError::OutOfBounds {
                rect,
                width,
                height,
            });
        }

        let view = imageops::crop_imm(&self.pixels, rect.x, rect.y, rect.width, rect.height).to_image();
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
        encoder.encode_image(&view)?;
        Ok(bytes)
    }
}

/// Encode every image cell of `plan` in parallel. Results come back in file
/// order; the call returns only after every cell has finished.
pub fn rasterize(plan: &SlicePlan<'_>, raster: &dyn RasterSource) -> Result<Vec<SliceFile>, SliceError> {
    let jobs: Vec<(String, PixelRect)> = plan
        .image_cells()
        .map(|(name, rect)| (name.to_string(), rect))
        .collect();
    let total = jobs.len();
    debug!("encoding {total} cell(s)");

    let results: Vec<Result<SliceFile, CellFailure>> = jobs
        .into_par_iter()
        .map(|(name, rect)| match raster.crop(rect) {
            Ok(bytes) => Ok(SliceFile { name, rect, bytes }),
            Err(error) => Err(CellFailure {
                file_name: name,
                rect,
                error,
            }),
        })
        .collect();

    let mut files = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(file) => files.push(file),
            Err(failure) => {
                warn!("{} ({}): {}", failure.file_name, failure.rect, failure.error);
                failures.push(failure);
            }
        }
    }
    if !failures.is_empty() {
        return Err(SliceError::Encode { total, failures });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::grid::OccupantPrecedence;
    use crate::selection::{SelectionContent, SelectionStore};
    use image::Rgba;

    /// Fails any crop that touches the given column.
    struct FailingColumn {
        width: u32,
        height: u32,
        bad_x: u32,
    }

    impl RasterSource for FailingColumn {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn crop(&self, rect: PixelRect) -> Result<Vec<u8>, RasterError> {
            if rect.x <= self.bad_x && self.bad_x < rect.x + rect.width {
                return Err(RasterError::Other("disk full".into()));
            }
            Ok(vec![rect.x as u8])
        }
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_on_white(&img);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn crop_produces_decodable_jpeg_of_the_right_size() {
        let raster = ImageRaster::from_rgba(&RgbaImage::from_pixel(40, 30, Rgba([200, 10, 10, 255])), 90);
        let bytes = raster
            .crop(PixelRect {
                x: 5,
                y: 5,
                width: 20,
                height: 10,
            })
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[test]
    fn crop_outside_the_image_is_rejected() {
        let raster = ImageRaster::from_rgba(&RgbaImage::new(10, 10), 90);
        let err = raster
            .crop(PixelRect {
                x: 5,
                y: 0,
                width: 6,
                height: 10,
            })
            .unwrap_err();
        assert!(matches!(err, RasterError::OutOfBounds { .. }));
    }

    #[test]
    fn results_keep_file_order() {
        let mut store = SelectionStore::new();
        for x in [10, 30, 50, 70] {
            store
                .add(Rect::new(x, 0, 10, 10), SelectionContent::Link { url: "u".into() })
                .unwrap();
        }
        let sels = store.snapshot();
        let plan = SlicePlan::build(100, 10, &sels, OccupantPrecedence::FirstCreated, "o").unwrap();
        let raster = ImageRaster::from_rgba(&RgbaImage::new(100, 10), 50);
        let files = rasterize(&plan, &raster).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, plan.file_names());
        let xs: Vec<u32> = files.iter().map(|f| f.rect.x).collect();
        let mut sorted = xs.clone();
        sorted.sort_unstable();
        assert_eq!(xs, sorted);
    }

    #[test]
    fn failures_are_collected_not_dropped() {
        let mut store = SelectionStore::new();
        store
            .add(Rect::new(40, 0, 20, 10), SelectionContent::empty_link())
            .unwrap();
        let sels = store.snapshot();
        let plan = SlicePlan::build(100, 10, &sels, OccupantPrecedence::FirstCreated, "f").unwrap();
        let raster = FailingColumn {
            width: 100,
            height: 10,
            bad_x: 45,
        };
        match rasterize(&plan, &raster).unwrap_err() {
            SliceError::Encode { total, failures } => {
                assert_eq!(total, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].file_name, "f_2.jpeg");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
