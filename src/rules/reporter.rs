use tracing::debug;

use crate::events::Finding;
use crate::state::MonitorState;

/// Gates a recurring condition so that an unhealthy state alerts at most
/// once per cooldown window. A healthy observation clears the window.
#[derive(Debug, Clone)]
pub struct RateLimitedReporter {
    key: String,
    cooldown_secs: u64,
}

impl RateLimitedReporter {
    pub fn new(key: impl Into<String>, cooldown_secs: u64) -> Self {
        Self {
            key: key.into(),
            cooldown_secs,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `finding` is only consulted when the condition is unhealthy; it is
    /// built before the window is claimed so a failed build leaves the state
    /// untouched.
    pub fn observe<E>(
        &self,
        state: &MonitorState,
        now: u64,
        healthy: bool,
        finding: impl FnOnce() -> Result<Finding, E>,
    ) -> Result<Option<Finding>, E> {
        if healthy {
            state.clear_report(&self.key);
            return Ok(None);
        }

        let finding = finding()?;
        if state.try_claim_report(&self.key, now, self.cooldown_secs) {
            Ok(Some(finding))
        } else {
            debug!(monitor = %self.key, now, "Alert suppressed (cooldown)");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FindingType, Severity};

    const FOUR_HOURS: u64 = 4 * 60 * 60;
    const T0: u64 = 1_700_000_000;

    fn low() -> Result<Finding, String> {
        Ok(Finding::new("Low", "low", "LOW", Severity::High, FindingType::Suspicious))
    }

    #[test]
    fn repeated_unhealthy_checks_report_once() {
        let state = MonitorState::new();
        let reporter = RateLimitedReporter::new("executor", FOUR_HOURS);

        let first = reporter.observe(&state, T0, false, low).unwrap();
        let second = reporter.observe(&state, T0 + 1, false, low).unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn healthy_check_resets_window() {
        let state = MonitorState::new();
        let reporter = RateLimitedReporter::new("executor", FOUR_HOURS);

        let findings: Vec<_> = [(T0, false), (T0 + 10, true), (T0 + 20, false)]
            .into_iter()
            .filter_map(|(now, healthy)| reporter.observe(&state, now, healthy, low).unwrap())
            .collect();

        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn reports_again_once_window_elapses() {
        let state = MonitorState::new();
        let reporter = RateLimitedReporter::new("executor", FOUR_HOURS);

        assert!(reporter.observe(&state, T0, false, low).unwrap().is_some());
        assert!(reporter.observe(&state, T0 + FOUR_HOURS - 1, false, low).unwrap().is_none());
        assert!(reporter.observe(&state, T0 + FOUR_HOURS, false, low).unwrap().is_some());
    }

    #[test]
    fn failed_build_leaves_state_untouched() {
        let state = MonitorState::new();
        let reporter = RateLimitedReporter::new("executor", FOUR_HOURS);

        let failed = reporter.observe(&state, T0, false, || Err::<Finding, _>("bad".to_string()));
        assert!(failed.is_err());
        assert_eq!(state.last_reported("executor"), None);
        assert!(reporter.observe(&state, T0 + 1, false, low).unwrap().is_some());
    }

    #[test]
    fn healthy_check_never_builds_a_finding() {
        let state = MonitorState::new();
        let reporter = RateLimitedReporter::new("executor", FOUR_HOURS);

        let result = reporter.observe(&state, T0, true, || -> Result<Finding, String> {
            panic!("finding built for a healthy check")
        });
        assert_eq!(result, Ok(None));
    }
}
