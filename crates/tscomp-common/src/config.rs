//! Planner configuration
//!
//! Feature toggles gate which candidates are emitted; they never change
//! the results of a plan that is produced.

use serde::{Deserialize, Serialize};

/// Cost constants for decompression candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Charge for producing one decompressed tuple
    pub decompress_cpu_tuple_cost: f64,
    /// Estimated number of rows per compressed batch
    pub batch_size: f64,
    /// Quadratic penalty per (batch count)^2 for the heap merge
    pub heap_merge_cpu_tuple_cost: f64,
    pub cpu_tuple_cost: f64,
    pub cpu_operator_cost: f64,
    pub seq_page_cost: f64,
    pub random_page_cost: f64,
    /// Memory available to a sort before it spills, in kilobytes
    pub work_mem_kb: f64,
    pub block_size: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            decompress_cpu_tuple_cost: 0.01,
            batch_size: 1000.0,
            heap_merge_cpu_tuple_cost: 0.09,
            cpu_tuple_cost: 0.01,
            cpu_operator_cost: 0.0025,
            seq_page_cost: 1.0,
            random_page_cost: 4.0,
            work_mem_kb: 4096.0,
            block_size: 8192.0,
        }
    }
}

/// Planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Consider the heap merge of compressed batches for ordered queries
    pub enable_decompression_sorted_merge: bool,

    /// Decompress whole batches at once instead of row by row
    pub enable_bulk_decompression: bool,

    /// Keep index scans on the compressed relation as sub-scans
    pub enable_compression_indexscan: bool,

    pub cost: CostConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enable_decompression_sorted_merge: true,
            enable_bulk_decompression: true,
            enable_compression_indexscan: true,
            cost: CostConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::TscompError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, crate::TscompError> {
        let config: Self =
            toml::from_str(content).map_err(|e| crate::TscompError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), crate::TscompError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), crate::TscompError> {
        if self.cost.batch_size <= 0.0 {
            return Err(crate::TscompError::Config(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.cost.work_mem_kb <= 0.0 || self.cost.block_size <= 0.0 {
            return Err(crate::TscompError::Config(
                "work_mem_kb and block_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("planner.toml");

        let mut config = PlannerConfig::default();
        config.enable_decompression_sorted_merge = false;
        config.cost.batch_size = 500.0;
        config.save_to_file(&path).unwrap();

        let loaded = PlannerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = PlannerConfig::from_toml("enable_bulk_decompression = false\n").unwrap();
        assert!(!config.enable_bulk_decompression);
        assert!(config.enable_decompression_sorted_merge);
        assert_eq!(config.cost.batch_size, 1000.0);
    }

    #[test]
    fn test_invalid_batch_size_rejected() {
        let result = PlannerConfig::from_toml("[cost]\nbatch_size = 0.0\n");
        assert!(matches!(result, Err(crate::TscompError::Config(_))));
    }
}
