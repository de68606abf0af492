//! Exact cosine similarity search over a cached feature store.

use ndarray::{Array1, ArrayView1, Axis};

use crate::error::{Error, Result};
use crate::models::{BrandId, FeatureMatrix, FeatureStore};

/// L2-normalizes every row in place. All-zero rows are left as they are.
pub fn normalize_rows(features: &mut FeatureMatrix)
{
    features.axis_iter_mut(Axis(0)).for_each(|mut row| {
        let norm = row.dot(&row).sqrt();
        if norm == 0.0 {
            return;
        }
        row /= norm;
    });
}

/// Cosine similarity between `query` and every row of `store`.
/// Zero vectors have similarity 0 with everything.
pub fn cosine_similarities(query: ArrayView1<f32>, store: &FeatureStore) -> Result<Array1<f32>>
{
    if query.len() != store.feature_length() && !store.is_empty() {
        return Err(Error::Configuration(format!(
            "Query has {} features but the store holds vectors of length {}",
            query.len(),
            store.feature_length()
        )));
    }

    let query_norm = query.dot(&query).sqrt();
    let similarities = store.features.outer_iter().map(|row| {
        let denominator = query_norm * row.dot(&row).sqrt();
        if denominator == 0.0 {
            0.0
        } else {
            row.dot(&query) / denominator
        }
    }).collect::<Array1<f32>>();

    Ok(similarities)
}

/// Returns up to `k` brands most similar to `query`, best first, keeping only
/// those with similarity of at least `min_similarity`.
pub fn top_matches(query: ArrayView1<f32>, store: &FeatureStore, k: usize, min_similarity: f32) -> Result<Vec<(BrandId, f32)>>
{
    let similarities = cosine_similarities(query, store)?;

    let mut ranked: Vec<(usize, f32)> = similarities
        .iter()
        .enumerate()
        .filter(|(_, similarity)| **similarity >= min_similarity)
        .map(|(index, similarity)| (index, *similarity))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);

    Ok(ranked
        .into_iter()
        .map(|(index, similarity)| (store.brand_map[index].clone(), similarity))
        .collect())
}
