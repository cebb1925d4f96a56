//! Strategy definition storage port.

use crate::domain::error::QuantxError;
use crate::domain::strategy::StrategyDefinition;

pub trait StrategyStore: Send + Sync {
    fn list(&self) -> Result<Vec<String>, QuantxError>;
    fn get(&self, name: &str) -> Result<Option<StrategyDefinition>, QuantxError>;
    /// Insert or replace by name. The definition is validated first.
    fn save(&self, strategy: &StrategyDefinition) -> Result<(), QuantxError>;
    /// Returns whether a definition was removed.
    fn delete(&self, name: &str) -> Result<bool, QuantxError>;
}
