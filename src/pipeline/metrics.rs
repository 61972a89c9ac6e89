//! Per-stage run metrics.

use serde::{Serialize, Serializer};
use std::time::Duration;

/// What one stage did during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMetrics {
    pub name: String,
    /// Bytes of document text before the stage.
    pub input_size: usize,
    /// Bytes after the stage, or after rollback when it failed.
    pub output_size: usize,
    #[serde(rename = "durationMs", serialize_with = "as_millis")]
    pub duration: Duration,
    pub fields_touched: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_micros() as f64 / 1000.0)
}

/// Metrics for every stage that ran, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PipelineReport {
    pub stages: Vec<StageMetrics>,
}

impl PipelineReport {
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageMetrics> {
        self.stages.iter().filter(|s| !s.success)
    }

    pub fn get(&self, name: &str) -> Option<&StageMetrics> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(name: &str, success: bool, ms: u64) -> StageMetrics {
        StageMetrics {
            name: name.to_string(),
            input_size: 10,
            output_size: 12,
            duration: Duration::from_millis(ms),
            fields_touched: 1,
            success,
            error: (!success).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn test_report_queries() {
        let report = PipelineReport {
            stages: vec![metrics("imports", true, 3), metrics("template", false, 4)],
        };
        assert_eq!(report.total_duration(), Duration::from_millis(7));
        assert_eq!(report.failed().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["template"]);
        assert!(report.get("imports").unwrap().success);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(metrics("headers", true, 2)).unwrap();
        assert_eq!(json["name"], "headers");
        assert_eq!(json["inputSize"], 10);
        assert_eq!(json["durationMs"], 2.0);
        assert!(json.get("error").is_none());
    }
}
