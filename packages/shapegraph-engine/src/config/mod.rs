//! Engine configuration.
//!
//! One flat options struct consumed by the joiner and the fixpoint driver.
//! Options load from JSON or from a compact `name=value,...` string, the
//! form command-line frontends pass through verbatim.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// Order in which the block scheduler yields pending blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedOrder {
    Dfs,
    Bfs,
}

/// What the driver does with a path once an error is diagnosed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRecovery {
    /// Abort the whole analysis at the first diagnosed error.
    StopOnFirst,
    /// Drop the offending path, keep analyzing the rest.
    StopPathOnError,
    /// Diagnose and keep executing the path anyway.
    KeepExploring,
}

/// Tie-break for the binding offset of a may-exist wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MayExistHeuristic {
    /// Prefer the candidate field whose target has the most incoming
    /// pointers.
    MostSharedTarget,
    /// Prefer the candidate field at the lowest byte offset.
    LowestOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Permit joins that generalize beyond either input.
    pub allow_three_way_join: bool,
    /// Block scheduling order for the fixpoint loop.
    pub scheduler_order: SchedOrder,
    /// Never summarize into singly-linked segments.
    pub disable_sls: bool,
    /// Never summarize into doubly-linked segments.
    pub disable_dls: bool,
    /// Reuse the destination of an already-joined value pair within a call.
    pub join_pair_cache: bool,
    /// Path policy after a diagnosed error.
    pub error_recovery: ErrorRecovery,
    /// Cap on segment minimum-length bookkeeping.
    pub max_seg_min_len: u32,
    /// Shortest uniform concrete chain worth summarizing.
    pub chain_threshold: u32,
    /// Magnitude beyond which concrete integers fold to ranges.
    pub int_arithmetic_limit: i64,
    /// Join-insert only on loop-closing edges; plain-insert elsewhere.
    pub join_on_loop_edges_only: bool,
    /// Keep prototype minimum-length bounds across summarization.
    pub preserve_proto_min_len: bool,
    /// Binding-offset tie-break for may-exist wrapping.
    pub may_exist_heuristic: MayExistHeuristic,
    /// Run extra invariant scans after every join.
    pub self_check: bool,
}

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            allow_three_way_join: true,
            scheduler_order: SchedOrder::Dfs,
            disable_sls: false,
            disable_dls: false,
            join_pair_cache: true,
            error_recovery: ErrorRecovery::StopPathOnError,
            max_seg_min_len: 64,
            chain_threshold: 2,
            int_arithmetic_limit: 10,
            join_on_loop_edges_only: false,
            preserve_proto_min_len: true,
            may_exist_heuristic: MayExistHeuristic::MostSharedTarget,
            self_check: false,
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(EngineError::config(format!(
            "option '{name}' expects a boolean, got '{value}'"
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        EngineError::config(format!("option '{name}' expects a number, got '{value}'"))
    })
}

impl EngineOptions {
    /// Apply a compact `name=value,name=value` override string.
    pub fn apply_str(&mut self, spec: &str) -> Result<()> {
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                EngineError::config(format!("expected name=value, got '{part}'"))
            })?;
            self.apply_one(name.trim(), value.trim())?;
        }
        Ok(())
    }

    fn apply_one(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "allow_three_way_join" => self.allow_three_way_join = parse_flag(name, value)?,
            "scheduler_order" => {
                self.scheduler_order = match value {
                    "dfs" => SchedOrder::Dfs,
                    "bfs" => SchedOrder::Bfs,
                    _ => {
                        return Err(EngineError::config(format!(
                            "option '{name}' expects dfs or bfs, got '{value}'"
                        )))
                    }
                }
            }
            "disable_sls" => self.disable_sls = parse_flag(name, value)?,
            "disable_dls" => self.disable_dls = parse_flag(name, value)?,
            "join_pair_cache" => self.join_pair_cache = parse_flag(name, value)?,
            "error_recovery" => {
                self.error_recovery = match value {
                    "stop_on_first" => ErrorRecovery::StopOnFirst,
                    "stop_path_on_error" => ErrorRecovery::StopPathOnError,
                    "keep_exploring" => ErrorRecovery::KeepExploring,
                    _ => {
                        return Err(EngineError::config(format!(
                            "option '{name}' got unknown mode '{value}'"
                        )))
                    }
                }
            }
            "max_seg_min_len" => self.max_seg_min_len = parse_num(name, value)?,
            "chain_threshold" => self.chain_threshold = parse_num(name, value)?,
            "int_arithmetic_limit" => self.int_arithmetic_limit = parse_num(name, value)?,
            "join_on_loop_edges_only" => {
                self.join_on_loop_edges_only = parse_flag(name, value)?
            }
            "preserve_proto_min_len" => {
                self.preserve_proto_min_len = parse_flag(name, value)?
            }
            "may_exist_heuristic" => {
                self.may_exist_heuristic = match value {
                    "most_shared_target" => MayExistHeuristic::MostSharedTarget,
                    "lowest_offset" => MayExistHeuristic::LowestOffset,
                    _ => {
                        return Err(EngineError::config(format!(
                            "option '{name}' got unknown heuristic '{value}'"
                        )))
                    }
                }
            }
            "self_check" => self.self_check = parse_flag(name, value)?,
            _ => return Err(EngineError::config(format!("unknown option '{name}'"))),
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<EngineOptions> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let opts = EngineOptions::default();
        assert!(opts.allow_three_way_join);
        assert!(opts.join_pair_cache);
        assert!(!opts.disable_sls && !opts.disable_dls);
        assert_eq!(opts.chain_threshold, 2);
        assert_eq!(opts.scheduler_order, SchedOrder::Dfs);
    }

    #[test]
    fn override_string_applies_in_order() {
        let mut opts = EngineOptions::default();
        opts.apply_str("disable_dls=1, scheduler_order=bfs, max_seg_min_len=8")
            .unwrap();
        assert!(opts.disable_dls);
        assert_eq!(opts.scheduler_order, SchedOrder::Bfs);
        assert_eq!(opts.max_seg_min_len, 8);

        opts.apply_str("disable_dls=off").unwrap();
        assert!(!opts.disable_dls);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut opts = EngineOptions::default();
        assert!(opts.apply_str("no_such_option=1").is_err());
        assert!(opts.apply_str("disable_sls=maybe").is_err());
        assert!(opts.apply_str("chain_threshold=lots").is_err());
        assert!(opts.apply_str("chain_threshold").is_err());
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let mut opts = EngineOptions::default();
        opts.apply_str("error_recovery=keep_exploring,may_exist_heuristic=lowest_offset")
            .unwrap();
        let text = serde_json::to_string(&opts).unwrap();
        let back: EngineOptions = serde_json::from_str(&text).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let back: EngineOptions = serde_json::from_str(r#"{"disable_sls": true}"#).unwrap();
        assert!(back.disable_sls);
        assert_eq!(back.max_seg_min_len, EngineOptions::default().max_seg_min_len);
    }
}
