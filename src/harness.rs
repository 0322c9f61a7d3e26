use crate::config::{LayoutDelta, LayoutOptions};
use crate::error::PressError;
use crate::types::Pt;
use galleypress_qa_contract::{Issue, QaProfile, QaReport};

pub const MAX_ATTEMPT_CEILING: usize = 30;

/// Where an attempt landed. The distinction that matters is retryable vs
/// terminal: bad input never consumes the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Rendering,
    Verifying,
    Passed,
    FailedRetryable,
    FailedTerminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Full regenerate-and-verify attempts before giving up.
    pub max_attempts: usize,
    /// Consecutive passing verifications required before success is
    /// declared; a debounce against flaky measurement.
    pub required_passes: usize,
    pub profile: QaProfile,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            required_passes: 2,
            profile: QaProfile::Lenient,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), PressError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPT_CEILING {
            return Err(PressError::InvalidConfiguration(format!(
                "max attempts {} outside 1..={MAX_ATTEMPT_CEILING}",
                self.max_attempts
            )));
        }
        if self.required_passes == 0 || self.required_passes > self.max_attempts {
            return Err(PressError::InvalidConfiguration(format!(
                "required passes {} outside 1..={}",
                self.required_passes, self.max_attempts
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub state: HarnessState,
    pub delta: Option<LayoutDelta>,
}

#[derive(Debug)]
pub struct HarnessOutcome {
    pub passed: bool,
    pub attempts: usize,
    pub final_report: Option<QaReport>,
    pub final_options: LayoutOptions,
    pub trail: Vec<AttemptRecord>,
}

/// Maps the dominant verifier issue to the configuration move that
/// addresses it. Issues with no productive move mean a plain retry.
pub fn corrective_delta(issues: &[Issue]) -> Option<LayoutDelta> {
    if issues
        .iter()
        .any(|i| i.check_id == "gp.layout.overflow_none")
    {
        return Some(LayoutDelta::ShrinkBodyFont(Pt::from_f32(0.5)));
    }
    if let Some(issue) = issues
        .iter()
        .find(|i| i.check_id == "gp.layout.margin_band")
    {
        return match (issue.measured, issue.expected) {
            (Some(measured), Some(expected)) if measured < expected => {
                Some(LayoutDelta::WidenMargins(Pt::from_inches(0.05)))
            }
            (Some(_), Some(_)) => Some(LayoutDelta::NarrowMargins(Pt::from_inches(0.05))),
            // Content creeping into the right margin: tighter type.
            _ => Some(LayoutDelta::ShrinkBodyFont(Pt::from_f32(0.25))),
        };
    }
    if let Some(issue) = issues
        .iter()
        .find(|i| i.check_id == "gp.layout.page_count_expected")
    {
        return match (issue.measured, issue.expected) {
            (Some(measured), Some(expected)) if measured > expected => {
                Some(LayoutDelta::TightenLeading(0.05))
            }
            (Some(_), Some(_)) => Some(LayoutDelta::WidenMargins(Pt::from_inches(0.05))),
            _ => None,
        };
    }
    None
}

fn is_terminal(error: &PressError) -> bool {
    matches!(
        error,
        PressError::MissingMetadata(_)
            | PressError::MalformedMetadata(_)
            | PressError::MalformedFrontmatter { .. }
            | PressError::EmptyBook
            | PressError::InvalidConfiguration(_)
            | PressError::MissingPageTemplate
    )
}

/// Runs the generate-then-verify loop. The attempt closure regenerates
/// everything from scratch under the options it is handed and returns the
/// verification report for that artifact.
pub fn run_with_retry<F>(
    options: LayoutOptions,
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Result<HarnessOutcome, PressError>
where
    F: FnMut(usize, &LayoutOptions) -> Result<QaReport, PressError>,
{
    policy.validate()?;
    options.validate()?;

    let mut current = options;
    let mut trail: Vec<AttemptRecord> = Vec::new();
    let mut pass_streak = 0usize;
    let mut last_report: Option<QaReport> = None;
    let mut last_error: Option<PressError> = None;

    for attempt in 1..=policy.max_attempts {
        match attempt_fn(attempt, &current) {
            Err(error) if is_terminal(&error) => {
                trail.push(AttemptRecord {
                    attempt,
                    state: HarnessState::FailedTerminal,
                    delta: None,
                });
                return Err(error);
            }
            Err(error) => {
                // Render/write failure: counts against the budget, retried
                // under the same configuration.
                pass_streak = 0;
                last_error = Some(error);
                trail.push(AttemptRecord {
                    attempt,
                    state: HarnessState::FailedRetryable,
                    delta: None,
                });
            }
            Ok(report) => {
                last_error = None;
                if report.passed {
                    pass_streak += 1;
                    let done = pass_streak >= policy.required_passes;
                    trail.push(AttemptRecord {
                        attempt,
                        state: if done {
                            HarnessState::Passed
                        } else {
                            HarnessState::Verifying
                        },
                        delta: None,
                    });
                    last_report = Some(report);
                    if done {
                        return Ok(HarnessOutcome {
                            passed: true,
                            attempts: attempt,
                            final_report: last_report,
                            final_options: current,
                            trail,
                        });
                    }
                } else {
                    pass_streak = 0;
                    let delta = corrective_delta(&report.issues);
                    trail.push(AttemptRecord {
                        attempt,
                        state: HarnessState::FailedRetryable,
                        delta,
                    });
                    last_report = Some(report);
                    if let Some(delta) = delta {
                        current = current.apply(delta);
                    }
                }
            }
        }
    }

    if let Some(error) = last_error {
        return Err(error);
    }
    Ok(HarnessOutcome {
        passed: false,
        attempts: policy.max_attempts,
        final_report: last_report,
        final_options: current,
        trail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleypress_qa_contract::QaProfile;

    fn failing_report(attempt: usize, check_id: &str) -> QaReport {
        QaReport::from_issues(
            QaProfile::Strict,
            attempt,
            vec![Issue::new(check_id, "stubbed failure")],
        )
    }

    fn passing_report(attempt: usize) -> QaReport {
        QaReport::from_issues(QaProfile::Strict, attempt, Vec::new())
    }

    #[test]
    fn always_failing_verifier_stops_at_the_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 5,
            required_passes: 2,
            profile: QaProfile::Strict,
        };
        let mut calls = 0usize;
        let outcome = run_with_retry(LayoutOptions::default(), &policy, |attempt, _| {
            calls += 1;
            Ok(failing_report(attempt, "gp.html.title_present"))
        })
        .expect("bounded failure is not an error");
        assert_eq!(calls, 5, "exactly the configured ceiling");
        assert!(!outcome.passed);
        assert_eq!(outcome.attempts, 5);
        assert!(outcome.final_report.is_some());
    }

    #[test]
    fn fail_once_then_pass_twice_succeeds_on_the_third_attempt() {
        let policy = RetryPolicy::default();
        let outcome = run_with_retry(LayoutOptions::default(), &policy, |attempt, _| {
            if attempt == 1 {
                Ok(failing_report(attempt, "gp.html.title_present"))
            } else {
                Ok(passing_report(attempt))
            }
        })
        .expect("run");
        assert!(outcome.passed);
        assert_eq!(outcome.attempts, 3);
        let states: Vec<HarnessState> = outcome.trail.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                HarnessState::FailedRetryable,
                HarnessState::Verifying,
                HarnessState::Passed
            ]
        );
    }

    #[test]
    fn a_failure_resets_the_pass_streak() {
        let policy = RetryPolicy {
            max_attempts: 4,
            required_passes: 2,
            profile: QaProfile::Strict,
        };
        // pass, fail, pass, fail: never two in a row.
        let outcome = run_with_retry(LayoutOptions::default(), &policy, |attempt, _| {
            if attempt % 2 == 1 {
                Ok(passing_report(attempt))
            } else {
                Ok(failing_report(attempt, "gp.html.title_present"))
            }
        })
        .expect("run");
        assert!(!outcome.passed);
        assert_eq!(outcome.attempts, 4);
    }

    #[test]
    fn overflow_issue_shrinks_the_body_font_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            required_passes: 1,
            profile: QaProfile::Strict,
        };
        let mut seen_fonts: Vec<f32> = Vec::new();
        let outcome = run_with_retry(LayoutOptions::default(), &policy, |attempt, options| {
            seen_fonts.push(options.body_font.to_f32());
            if attempt < 3 {
                Ok(failing_report(attempt, "gp.layout.overflow_none"))
            } else {
                Ok(passing_report(attempt))
            }
        })
        .expect("run");
        assert!(outcome.passed);
        assert_eq!(seen_fonts, vec![11.0, 10.5, 10.0]);
        assert_eq!(
            outcome.trail[0].delta,
            Some(LayoutDelta::ShrinkBodyFont(Pt::from_f32(0.5)))
        );
    }

    #[test]
    fn margin_band_direction_follows_the_measurement() {
        let narrow = vec![
            Issue::new("gp.layout.margin_band", "left margin 0.30in").with_band(0.30, 0.5),
        ];
        assert_eq!(
            corrective_delta(&narrow),
            Some(LayoutDelta::WidenMargins(Pt::from_inches(0.05)))
        );
        let wide = vec![
            Issue::new("gp.layout.margin_band", "left margin 0.80in").with_band(0.80, 0.5),
        ];
        assert_eq!(
            corrective_delta(&wide),
            Some(LayoutDelta::NarrowMargins(Pt::from_inches(0.05)))
        );
        let encroachment = vec![Issue::new(
            "gp.layout.margin_band",
            "content reaches into the right margin",
        )];
        assert_eq!(
            corrective_delta(&encroachment),
            Some(LayoutDelta::ShrinkBodyFont(Pt::from_f32(0.25)))
        );
    }

    #[test]
    fn page_count_deltas_move_both_directions() {
        let too_many = vec![
            Issue::new("gp.layout.page_count_expected", "40 pages, expected 32")
                .with_band(40.0, 32.0),
        ];
        assert_eq!(
            corrective_delta(&too_many),
            Some(LayoutDelta::TightenLeading(0.05))
        );
        let too_few = vec![
            Issue::new("gp.layout.page_count_expected", "20 pages, expected 32")
                .with_band(20.0, 32.0),
        ];
        assert_eq!(
            corrective_delta(&too_few),
            Some(LayoutDelta::WidenMargins(Pt::from_inches(0.05)))
        );
    }

    #[test]
    fn advisory_issues_mean_plain_retry() {
        let issues = vec![Issue::new("gp.layout.orphan_tail", "2-word line")];
        assert_eq!(corrective_delta(&issues), None);
    }

    #[test]
    fn terminal_errors_propagate_without_consuming_retries() {
        let policy = RetryPolicy::default();
        let mut calls = 0usize;
        let result = run_with_retry(LayoutOptions::default(), &policy, |_, _| {
            calls += 1;
            Err(PressError::EmptyBook)
        });
        assert!(matches!(result, Err(PressError::EmptyBook)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn persistent_render_errors_become_fatal_after_the_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 3,
            required_passes: 1,
            profile: QaProfile::Strict,
        };
        let mut calls = 0usize;
        let result = run_with_retry(LayoutOptions::default(), &policy, |_, _| {
            calls += 1;
            Err(PressError::PdfWrite("disk on fire".to_string()))
        });
        assert_eq!(calls, 3);
        assert!(matches!(result, Err(PressError::PdfWrite(_))));
    }

    #[test]
    fn policy_bounds_are_validated() {
        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(zero.validate().is_err());
        let huge = RetryPolicy {
            max_attempts: MAX_ATTEMPT_CEILING + 1,
            ..RetryPolicy::default()
        };
        assert!(huge.validate().is_err());
        let inverted = RetryPolicy {
            max_attempts: 2,
            required_passes: 3,
            profile: QaProfile::Strict,
        };
        assert!(inverted.validate().is_err());
    }
}
