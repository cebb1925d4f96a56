//! Report generation port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuantxError;
use crate::domain::strategy::StrategyDefinition;
use std::path::Path;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &StrategyDefinition,
        output_path: &Path,
    ) -> Result<(), QuantxError>;
}
