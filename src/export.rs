use std::path::{Path, PathBuf};

use log::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::preprocessing;

/// Values per row written by `write_rows`.
pub const ROW_WIDTH: usize = 5;

const MANIFEST_HEADER: [&str; 6] = ["image", "xmin", "ymin", "xmax", "ymax", "label"];

/// Writes `values` as CSV, `ROW_WIDTH` values per row. The last row may be shorter.
pub fn write_rows<S: AsRef<str>>(path: &Path, values: &[S]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    for chunk in values.chunks(ROW_WIDTH) {
        writer.write_record(chunk.iter().map(|value| value.as_ref()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a CSV listing every image directly inside `dir` with a box covering
/// the whole image and an empty label. Files that are not images are skipped.
///
/// Returns the number of images listed.
pub fn write_size_manifest(dir: &Path, out_path: &Path) -> Result<usize> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()?;
    entries.sort();

    let mut writer = csv::Writer::from_path(out_path)?;
    writer.write_record(MANIFEST_HEADER)?;

    let mut count = 0;
    for path in entries.iter().filter(|p| p.is_file() && p.as_path() != out_path) {
        let size = match imagesize::size(path) {
            Ok(size) => size,
            Err(e) => {
                debug!("Not listing {:?}: {:?}", path, e);
                continue;
            }
        };
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        writer.write_record([
            name,
            "0".to_string(),
            "0".to_string(),
            size.width.to_string(),
            size.height.to_string(),
            String::new(),
        ])?;
        count += 1;
    }
    writer.flush()?;

    Ok(count)
}

/// Crops `[xmin, ymin, xmax, ymax]` out of the image and saves it as a JPEG
/// with a random file name in `folder`. Bounds past the image edge are clamped.
pub fn crop_image(image_path: &Path, bounds: [u32; 4], folder: &Path) -> Result<PathBuf> {
    let [xmin, ymin, xmax, ymax] = bounds;
    if xmin >= xmax || ymin >= ymax {
        return Err(Error::MalformedBox {
            xmin: xmin as f32,
            ymin: ymin as f32,
            xmax: xmax as f32,
            ymax: ymax as f32,
        });
    }

    let image = preprocessing::open_image(image_path)?.to_rgb8();
    let cropped = image::imageops::crop_imm(&image, xmin, ymin, xmax - xmin, ymax - ymin).to_image();

    let output_path = folder.join(format!("{}.jpg", Uuid::new_v4()));
    cropped.save_with_format(&output_path, image::ImageFormat::Jpeg)?;

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, Rgb, RgbImage};

    use super::*;

    #[test]
    fn test_write_rows_chunks_by_five() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let values: Vec<String> = (1..=12).map(|i| i.to_string()).collect();

        write_rows(&path, &values).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1,2,3,4,5\n6,7,8,9,10\n11,12\n");
    }

    #[test]
    fn test_write_rows_quotes_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        write_rows(&path, &["NIKE", "a,b"]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "NIKE,\"a,b\"\n");
    }

    #[test]
    fn test_size_manifest_lists_images_only() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(7, 3).save(dir.path().join("b.png")).unwrap();
        RgbImage::new(2, 9).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        let out = dir.path().join("sizes.csv");

        let count = write_size_manifest(dir.path(), &out).unwrap();

        assert_eq!(count, 2);
        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "image,xmin,ymin,xmax,ymax,label\na.png,0,0,2,9,\nb.png,0,0,7,3,\n");
    }

    #[test]
    fn test_crop_image_saves_region() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        RgbImage::from_pixel(40, 30, Rgb([0, 200, 0])).save(&source).unwrap();
        let folder = dir.path().join("crops");
        std::fs::create_dir(&folder).unwrap();

        let first = crop_image(&source, [5, 5, 25, 15], &folder).unwrap();
        let second = crop_image(&source, [5, 5, 25, 15], &folder).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.extension().unwrap(), "jpg");
        let cropped = image::open(&first).unwrap();
        assert_eq!(cropped.dimensions(), (20, 10));
    }

    #[test]
    fn test_crop_image_rejects_empty_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let result = crop_image(&dir.path().join("source.png"), [10, 0, 10, 5], dir.path());
        assert!(matches!(result, Err(Error::MalformedBox { .. })));
    }
}
