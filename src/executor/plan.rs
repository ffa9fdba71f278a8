// file: src/executor/plan.rs
// description: selects one execution strategy per stage once, before the run starts
// reference: capability probe feeds strategy selection

use crate::error::{PipelineError, Result};
use crate::executor::Strategy;
use crate::executor::probe::CapabilityReport;
use crate::models::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Real if every stage can run natively, otherwise mock for the whole run.
    Auto,
    Real,
    Mock,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => f.write_str("auto"),
            Mode::Real => f.write_str("real"),
            Mode::Mock => f.write_str("mock"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Mode::Auto),
            "real" => Ok(Mode::Real),
            "mock" => Ok(Mode::Mock),
            other => Err(format!("unknown mode '{}' (expected auto, real or mock)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub mode: Mode,
    pub strategies: BTreeMap<Stage, Strategy>,
    /// Stages switched to mock because the probe found them unavailable.
    pub fallbacks: Vec<Stage>,
    /// Stages whose strategy the caller set explicitly.
    pub overridden: Vec<Stage>,
}

impl ExecutionPlan {
    pub fn uniform(strategy: Strategy, from: Stage) -> Self {
        let mode = match strategy {
            Strategy::Real => Mode::Real,
            Strategy::Mock => Mode::Mock,
        };
        Self {
            mode,
            strategies: stages_from(from).map(|s| (s, strategy)).collect(),
            fallbacks: Vec::new(),
            overridden: Vec::new(),
        }
    }

    /// Decides the strategy of every stage from `from` onwards. `capabilities` is
    /// only consulted where a real strategy is wanted.
    pub fn select(
        mode: Mode,
        capabilities: &CapabilityReport,
        overrides: &BTreeMap<Stage, Strategy>,
        allow_mock_fallback: bool,
        from: Stage,
    ) -> Result<Self> {
        let available = |stage: Stage| {
            capabilities
                .get(stage)
                .map(|c| c.available)
                .unwrap_or(false)
        };

        let base = match mode {
            Mode::Mock => Strategy::Mock,
            Mode::Real => Strategy::Real,
            Mode::Auto => {
                let unavailable: Vec<Stage> =
                    stages_from(from).filter(|s| !available(*s)).collect();
                if unavailable.is_empty() {
                    info!("All stages can run natively, selecting real strategy");
                    Strategy::Real
                } else {
                    warn!(
                        "Native execution unavailable for {}, selecting mock strategy",
                        join(&unavailable)
                    );
                    Strategy::Mock
                }
            }
        };

        let mut plan = Self::uniform(base, from);
        plan.mode = mode;

        for (stage, strategy) in overrides {
            if let Some(slot) = plan.strategies.get_mut(stage) {
                *slot = *strategy;
                plan.overridden.push(*stage);
            }
        }

        let wanted_real: Vec<Stage> = plan
            .strategies
            .iter()
            .filter(|(_, strategy)| **strategy == Strategy::Real)
            .map(|(stage, _)| *stage)
            .collect();

        for stage in wanted_real {
            if available(stage) {
                continue;
            }
            let reason = capabilities
                .get(stage)
                .and_then(|c| c.reason())
                .unwrap_or_else(|| "not probed".to_string());

            if allow_mock_fallback {
                warn!("{} cannot run natively ({}), falling back to mock", stage, reason);
                plan.strategies.insert(stage, Strategy::Mock);
                plan.fallbacks.push(stage);
            } else {
                return Err(PipelineError::PlatformUnsupported {
                    stage: stage.name().to_string(),
                    reason,
                });
            }
        }

        Ok(plan)
    }

    pub fn strategy(&self, stage: Stage) -> Option<Strategy> {
        self.strategies.get(&stage).copied()
    }

    pub fn is_uniform(&self) -> bool {
        let mut values = self.strategies.values();
        match values.next() {
            Some(first) => values.all(|s| s == first),
            None => true,
        }
    }

    pub fn uses(&self, strategy: Strategy) -> bool {
        self.strategies.values().any(|s| *s == strategy)
    }

    pub fn describe(&self) -> String {
        self.strategies
            .iter()
            .map(|(stage, strategy)| {
                let mut entry = format!("{}={}", stage.slug(), strategy);
                if self.fallbacks.contains(stage) {
                    entry.push_str(" (fallback)");
                } else if self.overridden.contains(stage) {
                    entry.push_str(" (override)");
                }
                entry
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn stages_from(from: Stage) -> impl Iterator<Item = Stage> {
    Stage::ALL.into_iter().filter(move |s| *s >= from)
}

fn join(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::probe::StageCapability;
    use std::path::PathBuf;

    fn capabilities(unavailable: &[Stage]) -> CapabilityReport {
        CapabilityReport {
            stages: Stage::ALL
                .iter()
                .map(|stage| {
                    let ok = !unavailable.contains(stage);
                    StageCapability {
                        stage: *stage,
                        available: ok,
                        script: PathBuf::from(stage.descriptor().script),
                        script_present: true,
                        missing_tools: if ok { vec![] } else { vec!["tool".to_string()] },
                        os_supported: true,
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_mock_mode_ignores_probe() {
        let plan = ExecutionPlan::select(
            Mode::Mock,
            &capabilities(&Stage::ALL),
            &BTreeMap::new(),
            false,
            Stage::Harvester,
        )
        .unwrap();
        assert!(plan.is_uniform());
        assert_eq!(plan.strategies.len(), 7);
        assert!(!plan.uses(Strategy::Real));
    }

    #[test]
    fn test_real_mode_fails_on_unavailable_stage() {
        let err = ExecutionPlan::select(
            Mode::Real,
            &capabilities(&[Stage::Annotator]),
            &BTreeMap::new(),
            false,
            Stage::Harvester,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::PlatformUnsupported { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_real_mode_with_permitted_fallback() {
        let plan = ExecutionPlan::select(
            Mode::Real,
            &capabilities(&[Stage::Annotator]),
            &BTreeMap::new(),
            true,
            Stage::Harvester,
        )
        .unwrap();
        assert_eq!(plan.strategy(Stage::Annotator), Some(Strategy::Mock));
        assert_eq!(plan.strategy(Stage::Harvester), Some(Strategy::Real));
        assert_eq!(plan.fallbacks, vec![Stage::Annotator]);
        assert!(plan.describe().contains("annotator=mock (fallback)"));
    }

    #[test]
    fn test_auto_mode_is_all_or_nothing() {
        let all_real = ExecutionPlan::select(
            Mode::Auto,
            &capabilities(&[]),
            &BTreeMap::new(),
            false,
            Stage::Harvester,
        )
        .unwrap();
        assert!(all_real.is_uniform());
        assert_eq!(all_real.strategy(Stage::Reporter), Some(Strategy::Real));

        let all_mock = ExecutionPlan::select(
            Mode::Auto,
            &capabilities(&[Stage::Aligner]),
            &BTreeMap::new(),
            false,
            Stage::Harvester,
        )
        .unwrap();
        assert!(all_mock.is_uniform());
        assert_eq!(all_mock.strategy(Stage::Harvester), Some(Strategy::Mock));
    }

    #[test]
    fn test_overrides_and_start_stage() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Stage::Extractor, Strategy::Mock);
        overrides.insert(Stage::Harvester, Strategy::Real);

        let plan = ExecutionPlan::select(
            Mode::Real,
            &capabilities(&[Stage::Extractor]),
            &overrides,
            false,
            Stage::Annotator,
        )
        .unwrap();
        assert_eq!(plan.strategy(Stage::Harvester), None);
        assert_eq!(plan.strategy(Stage::Extractor), Some(Strategy::Mock));
        assert_eq!(plan.overridden, vec![Stage::Extractor]);
        assert!(!plan.is_uniform());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("AUTO".parse::<Mode>(), Ok(Mode::Auto));
        assert!("fast".parse::<Mode>().is_err());
    }
}
