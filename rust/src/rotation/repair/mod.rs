//! Bounded validate-and-repair loop.
//!
//! Each rule detects one family of violations and attempts a single local
//! correction per violation. Rules run in a fixed order every pass, then
//! the full validator decides whether another pass is needed. Advisory
//! violations get passes only while rules still make progress on them.

pub mod breaks;
pub mod moves;
pub mod spread;
pub mod stations;

use std::fmt;

use crate::config::RotationConfig;
use crate::grid::AssignmentGrid;
use crate::params::ScheduleParameters;
use crate::{log_changes, log_checks, log_debug, log_error};

use super::balance::{aggressive_balance, RotationBalanceRule};
use super::validate::{validate, ValidationScope, Violation};

pub use breaks::{ConsecutiveBreakRule, MinStationsRule};
pub use spread::BreakSpreadRule;
pub use stations::RepeatedStationRule;

/// Read-only inputs shared by every rule.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub params: &'a ScheduleParameters,
    pub config: &'a RotationConfig,
    pub scope: &'a ValidationScope,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        params: &'a ScheduleParameters,
        config: &'a RotationConfig,
        scope: &'a ValidationScope,
    ) -> Self {
        Self {
            params,
            config,
            scope,
        }
    }

    pub fn validate(&self, grid: &AssignmentGrid) -> Vec<Violation> {
        validate(grid, self.params, self.config, self.scope)
    }
}

/// One repair rule: a violation predicate plus a single-step fixer.
pub trait RepairRule {
    fn name(&self) -> &'static str;

    /// Whether this rule is responsible for `violation`.
    fn handles(&self, violation: &Violation) -> bool;

    /// Attempt one correction. Returns true if the grid changed.
    fn fix(&self, grid: &mut AssignmentGrid, ctx: &RuleContext, violation: &Violation) -> bool;

    fn detect(&self, grid: &AssignmentGrid, ctx: &RuleContext) -> Vec<Violation> {
        ctx.validate(grid)
            .into_iter()
            .filter(|v| self.handles(v))
            .collect()
    }
}

/// Attempts and successes for one rule across the whole loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTally {
    pub rule: &'static str,
    pub detected: usize,
    pub fixed: usize,
}

/// Outcome of a repair run.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub iterations: usize,
    pub converged: bool,
    pub aggressive_used: bool,
    pub aggressive_swaps: usize,
    pub tallies: Vec<RuleTally>,
    /// Blocking violations left after the final validation.
    pub residual: Vec<Violation>,
    /// Advisory violations left after the final validation.
    pub advisories: Vec<Violation>,
}

impl RepairReport {
    pub fn is_valid(&self) -> bool {
        self.residual.is_empty()
    }

    pub fn fixes(&self) -> usize {
        self.tallies.iter().map(|t| t.fixed).sum()
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iteration(s), {} fix(es), {} residual violation(s), {} advisory{}",
            self.iterations,
            self.fixes(),
            self.residual.len(),
            self.advisories.len(),
            if self.aggressive_used {
                ", aggressive balancing used"
            } else {
                ""
            }
        )
    }
}

/// The rule set in pass order.
pub fn default_rules() -> Vec<Box<dyn RepairRule>> {
    vec![
        Box::new(ConsecutiveBreakRule),
        Box::new(MinStationsRule),
        Box::new(RepeatedStationRule),
        Box::new(RotationBalanceRule),
        Box::new(BreakSpreadRule),
    ]
}

/// Run one rule over everything it currently detects.
pub fn run_rule(
    rule: &dyn RepairRule,
    grid: &mut AssignmentGrid,
    ctx: &RuleContext,
    tally: &mut RuleTally,
) -> usize {
    let verbosity = ctx.config.verbosity;
    let detected = rule.detect(grid, ctx);
    tally.detected += detected.len();

    let mut fixed = 0;
    for violation in &detected {
        if rule.fix(grid, ctx, violation) {
            fixed += 1;
            log_debug!(verbosity, "    [{}] fixed {}", rule.name(), violation);
        } else {
            log_checks!(verbosity, "    [{}] unresolved {}", rule.name(), violation);
        }
    }
    tally.fixed += fixed;
    fixed
}

/// Repair `grid` in place with the default rule set.
pub fn repair(grid: &mut AssignmentGrid, ctx: &RuleContext) -> RepairReport {
    repair_with(grid, ctx, &default_rules())
}

pub fn repair_with(
    grid: &mut AssignmentGrid,
    ctx: &RuleContext,
    rules: &[Box<dyn RepairRule>],
) -> RepairReport {
    let verbosity = ctx.config.verbosity;
    let mut report = RepairReport {
        tallies: rules
            .iter()
            .map(|r| RuleTally {
                rule: r.name(),
                ..RuleTally::default()
            })
            .collect(),
        ..RepairReport::default()
    };

    let mut violations = ctx.validate(grid);
    if violations.is_empty() {
        report.converged = true;
        return report;
    }

    for iteration in 0..ctx.config.max_repair_iterations {
        report.iterations = iteration as usize + 1;
        log_checks!(
            verbosity,
            "Repair pass {}: {} violation(s)",
            report.iterations,
            violations.len()
        );

        let mut fixed = 0;
        for (rule, tally) in rules.iter().zip(report.tallies.iter_mut()) {
            fixed += run_rule(rule.as_ref(), grid, ctx, tally);
        }

        // Rules read counts straight from the grid, so re-validating is the
        // authoritative recount.
        violations = ctx.validate(grid);
        if !has_blocking(&violations) && (violations.is_empty() || fixed == 0) {
            break;
        }
    }
    report.converged = !has_blocking(&violations);

    if !report.converged {
        report.aggressive_used = true;
        report.aggressive_swaps = aggressive_balance(grid, ctx);
        violations = ctx.validate(grid);
        log_changes!(
            verbosity,
            "Aggressive balancing made {} swap(s)",
            report.aggressive_swaps
        );
    }

    let (advisories, residual): (Vec<Violation>, Vec<Violation>) =
        violations.into_iter().partition(Violation::is_advisory);
    if !residual.is_empty() {
        log_error!(
            "Repair finished with {} unresolved violation(s)",
            residual.len()
        );
        for violation in &residual {
            log_error!("  {}", violation.describe(grid));
        }
    }
    for violation in &advisories {
        log_checks!(verbosity, "  Advisory: {}", violation.describe(grid));
    }
    report.residual = residual;
    report.advisories = advisories;
    report
}

fn has_blocking(violations: &[Violation]) -> bool {
    violations.iter().any(|v| !v.is_advisory())
}
