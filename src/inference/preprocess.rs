use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;

use super::InferenceError;

/// Side length of the square model input
pub const INPUT_SIZE: u32 = 224;

/// Model input: RGB pixels in row-major HWC order, scaled to [0, 1]
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Shape with the batch dimension the model expects
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }
}

/// Decode an image file and prepare it for the model
pub fn preprocess(path: &Path) -> Result<ImageTensor, InferenceError> {
    let img = image::open(path)?;
    Ok(preprocess_image(&img))
}

/// Resize (bilinear) to `INPUT_SIZE`², drop alpha, scale to [0, 1]
pub fn preprocess_image(img: &DynamicImage) -> ImageTensor {
    let resized = img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();
    let data = resized.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();

    ImageTensor {
        width: INPUT_SIZE,
        height: INPUT_SIZE,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_range() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(10, 40, image::Rgba([255, 0, 51, 255])));
        let tensor = preprocess_image(&img);

        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.data.len(), 224 * 224 * 3);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((tensor.data[0] - 1.0).abs() < 0.01);
        assert!(tensor.data[1].abs() < 0.01);
        assert!((tensor.data[2] - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(preprocess(&path), Err(InferenceError::Image(_))));
    }
}
