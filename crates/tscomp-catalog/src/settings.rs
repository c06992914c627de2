//! Per-hypertable compression settings
//!
//! Every column of a compressed hypertable carries one role:
//! - segment keys are stored uncompressed, one value per batch
//! - order keys define the physical row order inside a batch
//! - plain columns are only compressed payload

use serde::{Deserialize, Serialize};
use tscomp_common::{Result, TscompError};

/// Role of a logical column in the compressed layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRole {
    SegmentKey,
    OrderKey {
        /// 1-based position in the batch ordering
        position: u16,
        ascending: bool,
        nulls_first: bool,
    },
    Plain,
}

/// Order-key attributes of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKeyInfo {
    pub position: u16,
    pub ascending: bool,
    pub nulls_first: bool,
}

/// Compression information of a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCompressionInfo {
    pub name: String,
    pub role: ColumnRole,
}

impl ColumnCompressionInfo {
    pub fn segment_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::SegmentKey,
        }
    }

    pub fn order_key(name: impl Into<String>, position: u16, ascending: bool, nulls_first: bool) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::OrderKey {
                position,
                ascending,
                nulls_first,
            },
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::Plain,
        }
    }

    pub fn is_segment_key(&self) -> bool {
        matches!(self.role, ColumnRole::SegmentKey)
    }

    pub fn order_key_info(&self) -> Option<OrderKeyInfo> {
        match self.role {
            ColumnRole::OrderKey {
                position,
                ascending,
                nulls_first,
            } => Some(OrderKeyInfo {
                position,
                ascending,
                nulls_first,
            }),
            _ => None,
        }
    }

    /// Order-key position, `0` for columns that are not order keys
    pub fn order_key_position(&self) -> u16 {
        self.order_key_info().map(|o| o.position).unwrap_or(0)
    }
}

/// Compression settings of a hypertable, shared by all of its chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub hypertable_id: i32,
    pub columns: Vec<ColumnCompressionInfo>,
}

impl CompressionSettings {
    /// Build settings, rejecting order keys whose positions are not `1..=N`.
    pub fn try_new(hypertable_id: i32, columns: Vec<ColumnCompressionInfo>) -> Result<Self> {
        let settings = Self {
            hypertable_id,
            columns,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let mut positions: Vec<u16> = self
            .columns
            .iter()
            .filter_map(|c| c.order_key_info().map(|o| o.position))
            .collect();
        positions.sort_unstable();
        for (idx, position) in positions.iter().enumerate() {
            if usize::from(*position) != idx + 1 {
                return Err(TscompError::InvalidOrderingRequest(format!(
                    "order key positions of hypertable {} are not dense: {:?}",
                    self.hypertable_id, positions
                )));
            }
        }
        Ok(())
    }

    pub fn find(&self, column_name: &str) -> Option<&ColumnCompressionInfo> {
        self.columns.iter().find(|c| c.name == column_name)
    }

    /// Like `find`, but a missing column is a configuration error.
    pub fn column(&self, column_name: &str) -> Result<&ColumnCompressionInfo> {
        self.find(column_name)
            .ok_or_else(|| TscompError::missing_metadata(column_name))
    }

    pub fn segment_keys(&self) -> impl Iterator<Item = &ColumnCompressionInfo> {
        self.columns.iter().filter(|c| c.is_segment_key())
    }

    /// Order keys sorted by position
    pub fn order_keys(&self) -> Vec<&ColumnCompressionInfo> {
        let mut keys: Vec<_> = self
            .columns
            .iter()
            .filter(|c| c.order_key_info().is_some())
            .collect();
        keys.sort_by_key(|c| c.order_key_position());
        keys
    }

    pub fn num_segment_keys(&self) -> usize {
        self.segment_keys().count()
    }

    pub fn num_order_keys(&self) -> usize {
        self.order_keys().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_settings() -> CompressionSettings {
        CompressionSettings::try_new(
            1,
            vec![
                ColumnCompressionInfo::order_key("time", 1, true, false),
                ColumnCompressionInfo::segment_key("device_id"),
                ColumnCompressionInfo::plain("value"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let settings = metrics_settings();
        assert!(settings.column("device_id").unwrap().is_segment_key());
        assert_eq!(settings.column("time").unwrap().order_key_position(), 1);
        assert!(matches!(
            settings.column("missing"),
            Err(TscompError::MissingCompressionMetadata { .. })
        ));
    }

    #[test]
    fn test_order_keys_sorted_by_position() {
        let settings = CompressionSettings::try_new(
            2,
            vec![
                ColumnCompressionInfo::order_key("b", 2, false, true),
                ColumnCompressionInfo::order_key("a", 1, true, false),
            ],
        )
        .unwrap();
        let names: Vec<_> = settings.order_keys().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(settings.num_segment_keys(), 0);
    }

    #[test]
    fn test_sparse_positions_rejected() {
        let result = CompressionSettings::try_new(
            3,
            vec![
                ColumnCompressionInfo::order_key("a", 1, true, false),
                ColumnCompressionInfo::order_key("b", 3, true, false),
            ],
        );
        assert!(matches!(result, Err(TscompError::InvalidOrderingRequest(_))));

        let duplicate = CompressionSettings::try_new(
            3,
            vec![
                ColumnCompressionInfo::order_key("a", 1, true, false),
                ColumnCompressionInfo::order_key("b", 1, true, false),
            ],
        );
        assert!(duplicate.is_err());
    }
}
