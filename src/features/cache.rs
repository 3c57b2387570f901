use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::features::processor::FeatureProcessor;

/// Memoizes processed samples for the duration of a run.
pub struct FeatureCache<'a> {
    processor: &'a dyn FeatureProcessor,
    cache: HashMap<String, Vec<f64>>,
    width: Option<usize>,
}

impl<'a> FeatureCache<'a> {
    pub fn new(processor: &'a dyn FeatureProcessor) -> Self {
        FeatureCache { processor, cache: HashMap::new(), width: None }
    }

    pub fn get(&mut self, sample_id: &str) -> Result<&[f64]> {
        if !self.cache.contains_key(sample_id) {
            let features = self.processor.process(sample_id)?;
            match self.width {
                Some(w) if w != features.len() => {
                    return Err(Error::feature(format!(
                        "sample '{sample_id}' produced {} features, expected {w}",
                        features.len()
                    )));
                }
                _ => self.width = Some(features.len()),
            }
            self.cache.insert(sample_id.to_string(), features);
        }
        Ok(self.cache.get(sample_id).map(Vec::as_slice).unwrap_or_default())
    }

    /// Feature vectors for `ids`, in order.
    pub fn inputs(&mut self, ids: &[String]) -> Result<Vec<Vec<f64>>> {
        ids.iter().map(|id| self.get(id).map(<[f64]>::to_vec)).collect()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
