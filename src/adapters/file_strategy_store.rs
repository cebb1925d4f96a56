//! Strategy definitions stored as INI files, one per strategy.
//!
//! ```ini
//! [strategy]
//! name = Mean Reversion Call
//! mode = BACKTEST
//! conditions = pcr_oi < 0.7
//! filters =
//! actions = BUY 1 ATM_CALL
//! exits = take_profit 0.3; stop_loss 0.15
//! multi_leg = false
//! ```

use crate::domain::error::QuantxError;
use crate::domain::rule_parser::{parse_actions, parse_conditions, parse_exits, parse_filters};
use crate::domain::strategy::{StrategyDefinition, StrategyMode};
use crate::ports::strategy_store::StrategyStore;
use configparser::ini::Ini;
use parking_lot::Mutex;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SECTION: &str = "strategy";

pub struct FileStrategyStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStrategyStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.ini", file_stem(name)))
    }

    fn ini_files(&self) -> Result<Vec<PathBuf>, QuantxError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ini") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// `Mean Reversion Call` -> `mean_reversion_call`
fn file_stem(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn to_ini(strategy: &StrategyDefinition) -> String {
    format!(
        "[{SECTION}]\nname = {}\nmode = {}\nconditions = {}\nfilters = {}\nactions = {}\nexits = {}\nmulti_leg = {}\n",
        strategy.name,
        strategy.mode,
        join(&strategy.conditions),
        join(&strategy.filters),
        join(&strategy.actions),
        join(&strategy.exits),
        strategy.multi_leg,
    )
}

pub fn from_ini(content: &str) -> Result<StrategyDefinition, QuantxError> {
    let mut ini = Ini::new();
    // rule lists are `;`-separated
    ini.set_comment_symbols(&['#']);
    ini.read(content.to_string())
        .map_err(|reason| QuantxError::ConfigParse {
            file: "strategy".to_string(),
            reason,
        })?;

    let name = match ini.get(SECTION, "name") {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => {
            return Err(QuantxError::ConfigMissing {
                section: SECTION.to_string(),
                key: "name".to_string(),
            });
        }
    };
    let field = |key: &str| ini.get(SECTION, key).unwrap_or_default();
    let invalid = |key: &str, reason: String| QuantxError::StrategyInvalid {
        name: name.clone(),
        reason: format!("{key}: {reason}"),
    };

    let mode = match ini.get(SECTION, "mode") {
        Some(m) if !m.trim().is_empty() => m
            .parse::<StrategyMode>()
            .map_err(|e| invalid("mode", e))?,
        _ => StrategyMode::Backtest,
    };
    let multi_leg = match field("multi_leg").trim().to_lowercase().as_str() {
        "" | "false" | "no" | "0" => false,
        "true" | "yes" | "1" => true,
        other => return Err(invalid("multi_leg", format!("expected a boolean, got '{other}'"))),
    };

    let conditions_raw = field("conditions");
    let filters_raw = field("filters");
    let actions_raw = field("actions");
    let exits_raw = field("exits");

    let strategy = StrategyDefinition {
        conditions: parse_conditions(&conditions_raw)
            .map_err(|e| invalid("conditions", e.display_with_context(&conditions_raw)))?,
        filters: parse_filters(&filters_raw)
            .map_err(|e| invalid("filters", e.display_with_context(&filters_raw)))?,
        actions: parse_actions(&actions_raw)
            .map_err(|e| invalid("actions", e.display_with_context(&actions_raw)))?,
        exits: parse_exits(&exits_raw)
            .map_err(|e| invalid("exits", e.display_with_context(&exits_raw)))?,
        name,
        mode,
        multi_leg,
    };
    strategy.validate()?;
    Ok(strategy)
}

pub fn load_strategy_file(path: &Path) -> Result<StrategyDefinition, QuantxError> {
    let content = fs::read_to_string(path).map_err(|e| QuantxError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    from_ini(&content)
}

impl StrategyStore for FileStrategyStore {
    fn list(&self) -> Result<Vec<String>, QuantxError> {
        let mut names = Vec::new();
        for path in self.ini_files()? {
            match load_strategy_file(&path) {
                Ok(strategy) => names.push(strategy.name),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable strategy file"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str) -> Result<Option<StrategyDefinition>, QuantxError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let strategy = load_strategy_file(&path)?;
        Ok((strategy.name == name).then_some(strategy))
    }

    fn save(&self, strategy: &StrategyDefinition) -> Result<(), QuantxError> {
        strategy.validate()?;
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&strategy.name);
        fs::write(&path, to_ini(strategy))?;
        info!(strategy = %strategy.name, path = %path.display(), "saved strategy");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, QuantxError> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!(strategy = name, "deleted strategy");
        Ok(true)
    }
}
