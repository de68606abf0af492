//! On-disk cache for feature matrices.
//!
//! A cache file is a bincode-encoded header followed by exactly three named
//! sections: `features`, `brand_map` and `input_shape`. Features are quantized
//! to half precision and zstd-compressed; they come back as f32 with the
//! quantization error baked in, which is fine for similarity search but means
//! values never round trip exactly. Values beyond the f16 range (about 65504)
//! saturate to infinity.
//!
//! Files are written in place. A crash in the middle of a save leaves a
//! corrupt file, which the next load reports as `Error::CacheIo`. Concurrent
//! writers to the same path are not supported.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use half::f16;
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{BrandId, FeatureMatrix, FeatureStore, InputShape};

const MAGIC: [u8; 4] = *b"BSFC";
const FORMAT_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

pub const FEATURES_SECTION: &str = "features";
pub const BRAND_MAP_SECTION: &str = "brand_map";
pub const INPUT_SHAPE_SECTION: &str = "input_shape";
const SECTION_COUNT: usize = 3;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    magic: [u8; 4],
    version: u32,
    sections: Vec<Section>,
}

#[derive(Serialize, Deserialize)]
struct Section {
    name: String,
    data: SectionData,
}

#[derive(Serialize, Deserialize)]
enum SectionData {
    /// Row-major little-endian f16 values, zstd-compressed.
    Features { rows: u64, cols: u64, compressed: Vec<u8> },
    BrandMap(Vec<BrandId>),
    InputShape(Vec<u32>),
}

/// Writes `features`, `brand_map` and `input_shape` to `path`, replacing any existing file.
pub fn save_features(
    path: &Path,
    features: &FeatureMatrix,
    brand_map: &[BrandId],
    input_shape: InputShape,
) -> Result<()> {
    if features.nrows() != brand_map.len() {
        return Err(Error::Configuration(format!(
            "Brand map has {} entries but there are {} feature rows",
            brand_map.len(),
            features.nrows()
        )));
    }

    info!("Saving {:?} features into {:?}", features.dim(), path);
    let now = Instant::now();

    // iter() walks in logical row-major order whatever the memory layout.
    let half_bytes: Vec<u8> = features
        .iter()
        .flat_map(|v| f16::from_f32(*v).to_le_bytes())
        .collect();
    let compressed = zstd::encode_all(&half_bytes[..], ZSTD_LEVEL).map_err(|e| Error::cache(path, e))?;

    let cache_file = CacheFile {
        magic: MAGIC,
        version: FORMAT_VERSION,
        sections: vec![
            Section {
                name: FEATURES_SECTION.to_string(),
                data: SectionData::Features {
                    rows: features.nrows() as u64,
                    cols: features.ncols() as u64,
                    compressed,
                },
            },
            Section {
                name: BRAND_MAP_SECTION.to_string(),
                data: SectionData::BrandMap(brand_map.to_vec()),
            },
            Section {
                name: INPUT_SHAPE_SECTION.to_string(),
                data: SectionData::InputShape(input_shape.to_array().to_vec()),
            },
        ],
    };

    write_cache_file(path, &cache_file)?;
    info!("Saved features to {:?} in {:?}", path, now.elapsed());

    Ok(())
}

/// Reads a cache written by `save_features`. Features are promoted back to f32.
pub fn load_features(path: &Path) -> Result<(FeatureMatrix, Vec<BrandId>, InputShape)> {
    let now = Instant::now();

    let file = File::open(path).map_err(|e| Error::cache(path, e))?;
    let cache_file: CacheFile =
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| Error::cache(path, e))?;

    if cache_file.magic != MAGIC {
        return Err(Error::cache(path, "not a feature cache file"));
    }
    if cache_file.version != FORMAT_VERSION {
        return Err(Error::cache(path, format!("unsupported format version {}", cache_file.version)));
    }
    if cache_file.sections.len() != SECTION_COUNT {
        return Err(Error::cache(
            path,
            format!("expected {} sections, found {}", SECTION_COUNT, cache_file.sections.len()),
        ));
    }

    let mut features = None;
    let mut brand_map = None;
    let mut input_shape = None;
    for section in cache_file.sections {
        match (section.name.as_str(), section.data) {
            (FEATURES_SECTION, SectionData::Features { rows, cols, compressed }) => {
                features = Some(decode_features(path, rows, cols, &compressed)?);
            }
            (BRAND_MAP_SECTION, SectionData::BrandMap(brands)) => brand_map = Some(brands),
            (INPUT_SHAPE_SECTION, SectionData::InputShape(values)) => {
                let shape = InputShape::try_from(values.as_slice()).map_err(|e| Error::cache(path, e))?;
                input_shape = Some(shape);
            }
            (name, _) => return Err(Error::cache(path, format!("unexpected section {:?}", name))),
        }
    }

    let features = features.ok_or_else(|| Error::cache(path, "missing features section"))?;
    let brand_map = brand_map.ok_or_else(|| Error::cache(path, "missing brand_map section"))?;
    let input_shape = input_shape.ok_or_else(|| Error::cache(path, "missing input_shape section"))?;

    if brand_map.len() != features.nrows() {
        return Err(Error::cache(
            path,
            format!("{} brand ids for {} feature rows", brand_map.len(), features.nrows()),
        ));
    }

    info!("Loaded {:?} features from {:?} in {:?}", features.dim(), path, now.elapsed());

    Ok((features, brand_map, input_shape))
}

fn write_cache_file(path: &Path, cache_file: &CacheFile) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::cache(path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, cache_file).map_err(|e| Error::cache(path, e))?;
    writer.flush().map_err(|e| Error::cache(path, e))?;
    Ok(())
}

fn decode_features(path: &Path, rows: u64, cols: u64, compressed: &[u8]) -> Result<FeatureMatrix> {
    let rows = rows as usize;
    let cols = cols as usize;
    let half_bytes = zstd::decode_all(compressed).map_err(|e| Error::cache(path, e))?;

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(2))
        .ok_or_else(|| Error::cache(path, "feature dimensions overflow"))?;
    if half_bytes.len() != expected {
        return Err(Error::cache(
            path,
            format!("features section holds {} bytes, expected {}", half_bytes.len(), expected),
        ));
    }

    let values: Vec<f32> = half_bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]).to_f32())
        .collect();

    Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::cache(path, e))
}

impl FeatureStore {
    pub fn save(&self, path: &Path) -> Result<()> {
        save_features(path, &self.features, &self.brand_map, self.input_shape)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (features, brand_map, input_shape) = load_features(path)?;
        Ok(FeatureStore { features, brand_map, input_shape })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn sample_features(rows: usize, cols: usize) -> FeatureMatrix {
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            let magnitude = 1.5 + ((r * cols + c) as f32 * 0.37).sin();
            if (r + c) % 2 == 0 { magnitude } else { -magnitude }
        })
    }

    #[test]
    fn test_round_trip_within_half_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");

        let features = sample_features(5, 128);
        let brands: Vec<BrandId> = ["adidas", "nike", "puma", "reebok", "fila"]
            .iter()
            .map(|b| BrandId::from(*b))
            .collect();
        let input_shape = InputShape::new(224, 224, 3);

        save_features(&path, &features, &brands, input_shape).unwrap();
        let (loaded, loaded_brands, loaded_shape) = load_features(&path).unwrap();

        assert_eq!(loaded_brands, brands);
        assert_eq!(loaded_shape, input_shape);
        assert_eq!(loaded.dim(), (5, 128));
        for (original, restored) in features.iter().zip(loaded.iter()) {
            assert_relative_eq!(*original, *restored, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_quantization_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        let features = sample_features(3, 16);
        let brands: Vec<BrandId> = vec![BrandId::Index(1), BrandId::Index(2), BrandId::Index(3)];

        save_features(&path, &features, &brands, InputShape::new(64, 64, 3)).unwrap();
        let (first, _, _) = load_features(&path).unwrap();
        save_features(&path, &first, &brands, InputShape::new(64, 64, 3)).unwrap();
        let (second, second_brands, _) = load_features(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(second_brands, brands);
    }

    #[test]
    fn test_feature_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let store = FeatureStore::new(
            sample_features(2, 8),
            vec!["a".into(), BrandId::Index(7)],
            InputShape::new(200, 200, 3),
        )
        .unwrap();

        store.save(&path).unwrap();
        let loaded = FeatureStore::load(&path).unwrap();
        assert_eq!(loaded.brand_map, store.brand_map);
        assert_eq!(loaded.input_shape, store.input_shape);
        assert_eq!(loaded.feature_length(), 8);
    }

    #[test]
    fn test_mismatched_brand_map_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        let result = save_features(&path, &sample_features(3, 4), &[BrandId::from("only")], InputShape::new(1, 1, 3));
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_a_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_features(&dir.path().join("absent.bin"));
        assert!(matches!(result, Err(Error::CacheIo { .. })));
    }

    #[test]
    fn test_corrupt_file_is_a_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        std::fs::write(&path, b"this is not a cache").unwrap();
        assert!(matches!(load_features(&path), Err(Error::CacheIo { .. })));
    }

    #[test]
    fn test_wrong_section_count_is_a_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        let cache_file = CacheFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            sections: vec![Section {
                name: BRAND_MAP_SECTION.to_string(),
                data: SectionData::BrandMap(vec![]),
            }],
        };
        write_cache_file(&path, &cache_file).unwrap();

        match load_features(&path) {
            Err(Error::CacheIo { reason, .. }) => assert!(reason.contains("expected 3 sections")),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_features_section_is_a_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        let compressed = zstd::encode_all(&[0u8; 6][..], ZSTD_LEVEL).unwrap();
        let cache_file = CacheFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            sections: vec![
                Section {
                    name: FEATURES_SECTION.to_string(),
                    data: SectionData::Features { rows: 2, cols: 2, compressed },
                },
                Section {
                    name: BRAND_MAP_SECTION.to_string(),
                    data: SectionData::BrandMap(vec!["a".into(), "b".into()]),
                },
                Section {
                    name: INPUT_SHAPE_SECTION.to_string(),
                    data: SectionData::InputShape(vec![8, 8, 3]),
                },
            ],
        };
        write_cache_file(&path, &cache_file).unwrap();

        assert!(matches!(load_features(&path), Err(Error::CacheIo { .. })));
    }
}
