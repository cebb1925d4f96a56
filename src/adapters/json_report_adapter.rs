//! JSON backtest report adapter.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuantxError;
use crate::domain::strategy::StrategyDefinition;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct Report<'a> {
    strategy: &'a StrategyDefinition,
    result: &'a BacktestResult,
}

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        result: &BacktestResult,
        strategy: &StrategyDefinition,
    ) -> Result<String, QuantxError> {
        Ok(serde_json::to_string_pretty(&Report { strategy, result })?)
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &StrategyDefinition,
        output_path: &Path,
    ) -> Result<(), QuantxError> {
        let json = Self::render(result, strategy)?;
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output_path, json)?;
        info!(path = %output_path.display(), id = %result.id, "wrote backtest report");
        Ok(())
    }
}
