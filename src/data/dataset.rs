use burn::data::dataset::Dataset;

use crate::domain::feature::EncodedFeature;

/// Encoded features of one split, served to Burn's DataLoader.
pub struct FeatureDataset {
    features: Vec<EncodedFeature>,
}

impl FeatureDataset {
    pub fn new(features: Vec<EncodedFeature>) -> Self { Self { features } }
}

impl Dataset<EncodedFeature> for FeatureDataset {
    fn get(&self, index: usize) -> Option<EncodedFeature> {
        self.features.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}
