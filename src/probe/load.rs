// Load average from /proc/loadavg

use super::{MetricSource, ProbeError, parse_decimal, read_file};
use crate::models::{LoadAverage, MetricKind};

pub struct LoadAvgSource {
    path: String,
}

impl Default for LoadAvgSource {
    fn default() -> Self {
        Self::new("/proc/loadavg")
    }
}

impl LoadAvgSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricSource for LoadAvgSource {
    type Sample = LoadAverage;

    fn kind(&self) -> MetricKind {
        MetricKind::LoadAverage
    }

    async fn probe(&mut self) -> Result<LoadAverage, ProbeError> {
        let content = read_file(&self.path).await?;
        parse_loadavg(&content)
    }
}

/// Parses the first three fields of `/proc/loadavg` ("0.52 0.58 0.59 1/389 12345").
pub fn parse_loadavg(content: &str) -> Result<LoadAverage, ProbeError> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(ProbeError::malformed(
            "loadavg",
            format!("expected 3 fields, got {}", fields.len()),
        ));
    }
    Ok(LoadAverage {
        one: parse_decimal(fields[0], "loadavg")?,
        five: parse_decimal(fields[1], "loadavg")?,
        fifteen: parse_decimal(fields[2], "loadavg")?,
    })
}
