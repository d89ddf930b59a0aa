use crate::config::PipelineConfig;
use crate::utils::has_column;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one completed run, written next to the analytics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Rows in the analytics table.
    pub rows_out: usize,

    /// Orders without a usable `created_at`. None if the column is absent.
    pub missing_created_at: Option<usize>,

    /// Share of orders that found a user with a known country.
    /// None if the column is absent or the table is empty.
    pub country_match_rate: Option<f64>,

    /// Run configuration, every value rendered as a string.
    pub config: BTreeMap<String, String>,
}

impl RunMetadata {
    pub fn from_analytics(analytics: &DataFrame, config: &PipelineConfig) -> PolarsResult<Self> {
        let rows_out = analytics.height();

        let missing_created_at = if has_column(analytics, "created_at") {
            Some(analytics.column("created_at")?.null_count())
        } else {
            None
        };

        let country_match_rate = if has_column(analytics, "country") && rows_out > 0 {
            let missing = analytics.column("country")?.null_count();
            Some(1.0 - missing as f64 / rows_out as f64)
        } else {
            None
        };

        Ok(Self {
            rows_out,
            missing_created_at,
            country_match_rate,
            config: config.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_analytics() {
        let analytics = df![
            "order_id" => ["A1", "A2", "A3", "A4", "A5"],
            "created_at" => [Some(1i64), None, Some(3), Some(4), Some(5)],
            "country" => [Some("SA"), Some("AE"), None, Some("SA"), Some("EG")],
        ]
        .unwrap();
        let config = PipelineConfig::default();

        let meta = RunMetadata::from_analytics(&analytics, &config).unwrap();
        assert_eq!(meta.rows_out, 5);
        assert_eq!(meta.missing_created_at, Some(1));
        assert_eq!(meta.country_match_rate, Some(0.8));
        assert_eq!(meta.config, config.snapshot());
    }

    #[test]
    fn test_absent_columns_give_none() {
        let analytics = df!["order_id" => ["A1"]].unwrap();
        let meta = RunMetadata::from_analytics(&analytics, &PipelineConfig::default()).unwrap();
        assert_eq!(meta.missing_created_at, None);
        assert_eq!(meta.country_match_rate, None);
    }

    #[test]
    fn test_json_shape() {
        let analytics = df!["order_id" => ["A1"], "country" => [None::<&str>]].unwrap();
        let meta = RunMetadata::from_analytics(&analytics, &PipelineConfig::default()).unwrap();
        let json: serde_json::Value = serde_json::to_value(&meta).unwrap();

        assert_eq!(json["rows_out"], 1);
        assert!(json["missing_created_at"].is_null());
        assert_eq!(json["country_match_rate"], 0.0);
        assert_eq!(json["config"]["iqr_k"], "1.5");
    }
}
