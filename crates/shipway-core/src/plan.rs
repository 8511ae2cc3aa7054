//! Release planning: a pure function from (channel, modules, options) to an
//! ordered execution plan.
//!
//! The plan is a data structure, not runtime branching: every step the
//! engine knows about appears in it, with inapplicable steps recorded as
//! explicitly skipped. Re-planning with identical inputs yields an
//! identical plan, so a dry run's plan is provably the plan the real run
//! would execute.

use serde::{Deserialize, Serialize};

use crate::domain::{ModuleDescriptor, ReleaseChannel, ReleaseError, Result};

/// Kinds of steps a release plan can contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Verify,
    Sign,
    Publish,
    OpenStaging,
    CloseStaging,
    Promote,
    PostRelease,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Verify => "verify",
            StepKind::Sign => "sign",
            StepKind::Publish => "publish",
            StepKind::OpenStaging => "open_staging",
            StepKind::CloseStaging => "close_staging",
            StepKind::Promote => "promote",
            StepKind::PostRelease => "post_release",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a step applies to: one module, or the whole staging area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    Global,
    /// `group:module` coordinates.
    Module(String),
}

impl StepScope {
    pub fn module(&self) -> Option<&str> {
        match self {
            StepScope::Global => None,
            StepScope::Module(coordinates) => Some(coordinates),
        }
    }
}

/// One entry of a release plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub scope: StepScope,

    /// Whether this step runs for this channel/options combination.
    /// Inapplicable steps stay in the plan so operators can audit why a
    /// step did not run.
    pub applicable: bool,

    /// Why an inapplicable step was skipped.
    pub skip_reason: Option<String>,
}

impl Step {
    fn applicable(kind: StepKind, scope: StepScope) -> Self {
        Self {
            kind,
            scope,
            applicable: true,
            skip_reason: None,
        }
    }

    fn skipped(kind: StepKind, scope: StepScope, reason: &str) -> Self {
        Self {
            kind,
            scope,
            applicable: false,
            skip_reason: Some(reason.to_string()),
        }
    }
}

/// Options supplied at run start. Immutable once a run begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Run verification and signing without mutating remote state.
    pub validate_only: bool,

    /// Produce and report the plan without executing any step.
    pub dry_run: bool,

    /// Whether a signing key is configured. When `false`, Sign steps are
    /// planned as not applicable rather than attempted-and-skipped.
    pub signing_enabled: bool,

    /// Whether a staging-capable target repository is configured.
    pub staging_configured: bool,

    /// Target repository for snapshot publishes.
    pub snapshot_repository: Option<String>,

    /// Upper bound on concurrent module publications.
    pub max_parallel: usize,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            validate_only: false,
            dry_run: false,
            signing_enabled: false,
            staging_configured: true,
            snapshot_repository: None,
            max_parallel: 4,
        }
    }
}

/// Ordered, partially-parallel execution plan for one release run.
///
/// Invariants (checked by tests, relied on by the coordinator):
/// - `OpenStaging` precedes every module's `Publish` step that targets the
///   staging repository;
/// - `CloseStaging` follows every such `Publish` step;
/// - `Promote` follows `CloseStaging` and is never applicable for the
///   candidate channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleasePlan {
    pub channel: ReleaseChannel,
    pub steps: Vec<Step>,
}

impl ReleasePlan {
    /// Whether any step of `kind` is applicable.
    pub fn is_applicable(&self, kind: StepKind) -> bool {
        self.steps.iter().any(|s| s.kind == kind && s.applicable)
    }

    /// Whether the given module's step of `kind` is applicable.
    pub fn module_step_applicable(&self, kind: StepKind, coordinates: &str) -> bool {
        self.steps
            .iter()
            .any(|s| s.kind == kind && s.applicable && s.scope.module() == Some(coordinates))
    }

    /// Coordinates of modules with an applicable Publish step, in plan
    /// order.
    pub fn publish_modules(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Publish && s.applicable)
            .filter_map(|s| s.scope.module())
            .collect()
    }

    /// Position of the first step of `kind`, applicable or not.
    pub fn position(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == kind)
    }
}

/// Produces a [`ReleasePlan`] from a release request. Pure: no side
/// effects, no I/O.
pub struct ReleasePlanner;

impl ReleasePlanner {
    /// Plan a release run.
    ///
    /// Fails with [`ReleaseError::Planning`] if a module declares a
    /// final-channel release without a resolvable version, or if staging
    /// publishes are requested but no staging-capable repository is
    /// configured.
    pub fn plan(
        channel: ReleaseChannel,
        modules: &[ModuleDescriptor],
        options: &ReleaseOptions,
    ) -> Result<ReleasePlan> {
        if channel == ReleaseChannel::Final {
            for module in modules {
                if module.version.as_deref().map_or(true, str::is_empty) {
                    return Err(ReleaseError::Planning(format!(
                        "module {} declares a final release without a resolvable version",
                        module.coordinates()
                    )));
                }
            }
        }

        let mutating = !options.validate_only && !options.dry_run;
        let any_staged_publish =
            channel.uses_staging() && mutating && modules.iter().any(|m| m.has_publications());

        if channel.uses_staging() && mutating && !options.staging_configured {
            return Err(ReleaseError::Planning(
                "staging publish requested but no staging-capable repository is configured"
                    .to_string(),
            ));
        }
        if channel == ReleaseChannel::Snapshot
            && mutating
            && modules.iter().any(|m| m.has_publications())
            && options.snapshot_repository.is_none()
        {
            return Err(ReleaseError::Planning(
                "snapshot publish requested but no snapshot repository is configured".to_string(),
            ));
        }

        // Stable module order: plans and reports are keyed by coordinates.
        let mut ordered: Vec<&ModuleDescriptor> = modules.iter().collect();
        ordered.sort_by_key(|m| m.coordinates());

        let mut steps = Vec::new();

        steps.push(Self::staging_step(
            StepKind::OpenStaging,
            channel,
            options,
            any_staged_publish,
        ));

        for module in &ordered {
            let coordinates = module.coordinates();

            steps.push(if options.dry_run {
                Step::skipped(
                    StepKind::Verify,
                    StepScope::Module(coordinates.clone()),
                    "dry run",
                )
            } else {
                Step::applicable(StepKind::Verify, StepScope::Module(coordinates.clone()))
            });

            steps.push(if options.dry_run {
                Step::skipped(
                    StepKind::Sign,
                    StepScope::Module(coordinates.clone()),
                    "dry run",
                )
            } else if !options.signing_enabled {
                Step::skipped(
                    StepKind::Sign,
                    StepScope::Module(coordinates.clone()),
                    "signing not configured",
                )
            } else {
                Step::applicable(StepKind::Sign, StepScope::Module(coordinates.clone()))
            });

            steps.push(if options.dry_run {
                Step::skipped(StepKind::Publish, StepScope::Module(coordinates), "dry run")
            } else if options.validate_only {
                Step::skipped(
                    StepKind::Publish,
                    StepScope::Module(coordinates),
                    "validate only",
                )
            } else if !module.has_publications() {
                Step::skipped(
                    StepKind::Publish,
                    StepScope::Module(coordinates),
                    "module declares no publications",
                )
            } else {
                Step::applicable(StepKind::Publish, StepScope::Module(coordinates))
            });
        }

        steps.push(Self::staging_step(
            StepKind::CloseStaging,
            channel,
            options,
            any_staged_publish,
        ));

        steps.push(if options.dry_run {
            Step::skipped(StepKind::Promote, StepScope::Global, "dry run")
        } else if options.validate_only {
            Step::skipped(StepKind::Promote, StepScope::Global, "validate only")
        } else if !channel.promotes() {
            Step::skipped(
                StepKind::Promote,
                StepScope::Global,
                "channel does not promote",
            )
        } else if !any_staged_publish {
            Step::skipped(
                StepKind::Promote,
                StepScope::Global,
                "no staged publications",
            )
        } else {
            Step::applicable(StepKind::Promote, StepScope::Global)
        });

        steps.push(if options.dry_run {
            Step::skipped(StepKind::PostRelease, StepScope::Global, "dry run")
        } else {
            Step::applicable(StepKind::PostRelease, StepScope::Global)
        });

        Ok(ReleasePlan { channel, steps })
    }

    fn staging_step(
        kind: StepKind,
        channel: ReleaseChannel,
        options: &ReleaseOptions,
        any_staged_publish: bool,
    ) -> Step {
        if options.dry_run {
            Step::skipped(kind, StepScope::Global, "dry run")
        } else if options.validate_only {
            Step::skipped(kind, StepScope::Global, "validate only")
        } else if !channel.uses_staging() {
            Step::skipped(kind, StepScope::Global, "channel does not stage")
        } else if !any_staged_publish {
            Step::skipped(kind, StepScope::Global, "no staged publications")
        } else {
            Step::applicable(kind, StepScope::Global)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtifactSpec;

    fn library(name: &str) -> ModuleDescriptor {
        ModuleDescriptor::new("com.acme", name)
            .with_version("1.0.0")
            .with_artifact(ArtifactSpec::new("jar"))
    }

    fn plan(
        channel: ReleaseChannel,
        modules: &[ModuleDescriptor],
        options: &ReleaseOptions,
    ) -> ReleasePlan {
        ReleasePlanner::plan(channel, modules, options).unwrap()
    }

    #[test]
    fn test_planning_is_deterministic() {
        let modules = vec![library("b-lib"), library("a-lib")];
        let options = ReleaseOptions {
            signing_enabled: true,
            ..Default::default()
        };
        let first = plan(ReleaseChannel::Final, &modules, &options);
        let second = plan(ReleaseChannel::Final, &modules, &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_precedes_publishes_and_close_follows() {
        let modules = vec![library("a-lib"), library("b-lib")];
        let p = plan(ReleaseChannel::Final, &modules, &ReleaseOptions::default());

        let open = p.position(StepKind::OpenStaging).unwrap();
        let close = p.position(StepKind::CloseStaging).unwrap();
        let promote = p.position(StepKind::Promote).unwrap();
        for (i, step) in p.steps.iter().enumerate() {
            if step.kind == StepKind::Publish {
                assert!(open < i && i < close);
            }
        }
        assert!(close < promote);
    }

    #[test]
    fn test_snapshot_channel_has_no_staging_lifecycle() {
        let modules = vec![library("a-lib")];
        let options = ReleaseOptions {
            snapshot_repository: Some("snapshots".into()),
            staging_configured: false,
            ..Default::default()
        };
        let p = plan(ReleaseChannel::Snapshot, &modules, &options);

        assert!(!p.is_applicable(StepKind::OpenStaging));
        assert!(!p.is_applicable(StepKind::CloseStaging));
        assert!(!p.is_applicable(StepKind::Promote));
        assert!(p.is_applicable(StepKind::Publish));
        // Skipped, not omitted.
        assert!(p.position(StepKind::OpenStaging).is_some());
        assert!(p.position(StepKind::Promote).is_some());
    }

    #[test]
    fn test_candidate_channel_never_promotes() {
        let modules = vec![library("a-lib")];
        let p = plan(
            ReleaseChannel::Candidate,
            &modules,
            &ReleaseOptions::default(),
        );
        assert!(p.is_applicable(StepKind::OpenStaging));
        assert!(p.is_applicable(StepKind::CloseStaging));
        assert!(!p.is_applicable(StepKind::Promote));
    }

    #[test]
    fn test_validate_only_keeps_verify_and_sign() {
        let modules = vec![library("a-lib")];
        let options = ReleaseOptions {
            validate_only: true,
            signing_enabled: true,
            ..Default::default()
        };
        let p = plan(ReleaseChannel::Final, &modules, &options);

        assert!(p.is_applicable(StepKind::Verify));
        assert!(p.is_applicable(StepKind::Sign));
        assert!(!p.is_applicable(StepKind::Publish));
        assert!(!p.is_applicable(StepKind::OpenStaging));
        assert!(!p.is_applicable(StepKind::CloseStaging));
        assert!(!p.is_applicable(StepKind::Promote));
    }

    #[test]
    fn test_dry_run_marks_everything_skipped() {
        let modules = vec![library("a-lib")];
        let options = ReleaseOptions {
            dry_run: true,
            signing_enabled: true,
            staging_configured: false,
            ..Default::default()
        };
        let p = plan(ReleaseChannel::Final, &modules, &options);
        assert!(p.steps.iter().all(|s| !s.applicable));
        assert!(p
            .steps
            .iter()
            .all(|s| s.skip_reason.as_deref() == Some("dry run")));
    }

    #[test]
    fn test_sign_skipped_when_no_key_configured() {
        let modules = vec![library("a-lib")];
        let p = plan(ReleaseChannel::Final, &modules, &ReleaseOptions::default());
        assert!(!p.is_applicable(StepKind::Sign));
        let sign = p
            .steps
            .iter()
            .find(|s| s.kind == StepKind::Sign)
            .unwrap();
        assert_eq!(sign.skip_reason.as_deref(), Some("signing not configured"));
    }

    #[test]
    fn test_marker_only_module_still_gets_publish_step() {
        let module = ModuleDescriptor::new("com.acme", "acme-plugin")
            .with_version("1.0.0")
            .with_plugin_marker("com.acme.example");
        let p = plan(
            ReleaseChannel::Final,
            &[module],
            &ReleaseOptions::default(),
        );
        assert!(p.module_step_applicable(StepKind::Publish, "com.acme:acme-plugin"));
    }

    #[test]
    fn test_final_without_version_fails_planning() {
        let module = ModuleDescriptor::new("com.acme", "lib").with_artifact(ArtifactSpec::new("jar"));
        let err = ReleasePlanner::plan(
            ReleaseChannel::Final,
            &[module],
            &ReleaseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReleaseError::Planning(_)));
        assert!(err.to_string().contains("com.acme:lib"));
    }

    #[test]
    fn test_staging_without_configured_repository_fails_planning() {
        let options = ReleaseOptions {
            staging_configured: false,
            ..Default::default()
        };
        let err =
            ReleasePlanner::plan(ReleaseChannel::Candidate, &[library("a-lib")], &options)
                .unwrap_err();
        assert!(matches!(err, ReleaseError::Planning(_)));
    }

    #[test]
    fn test_modules_ordered_by_coordinates() {
        let modules = vec![library("z-lib"), library("a-lib")];
        let p = plan(ReleaseChannel::Final, &modules, &ReleaseOptions::default());
        assert_eq!(
            p.publish_modules(),
            vec!["com.acme:a-lib", "com.acme:z-lib"]
        );
    }
}
