use std::time::Duration;

use backon::ConstantBuilder;

use crate::error::ErrorKind;

/// Retries allowed per error kind. Kinds not listed are never retried:
/// auth and validation failures need caller intervention.
const RETRY_TABLE: &[(ErrorKind, usize)] = &[
    (ErrorKind::RateLimited, 1),
    (ErrorKind::UpstreamServerError, 1),
];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
    table: &'static [(ErrorKind, usize)],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_backoff(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn with_backoff(delay: Duration) -> Self {
        Self {
            delay,
            table: RETRY_TABLE,
        }
    }

    pub fn retries_for(&self, kind: ErrorKind) -> usize {
        self.table
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retries_for(kind) > 0
    }

    /// Per-request counter that enforces each kind's own retry allowance.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            table: self.table,
            used: Vec::new(),
        }
    }

    /// Fixed-delay backoff capped at the most generous entry in the table.
    /// [`RetryBudget`] narrows that cap per error kind.
    pub fn backoff(&self) -> ConstantBuilder {
        let max_times = self.table.iter().map(|(_, n)| *n).max().unwrap_or(0);
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(max_times)
    }
}

pub struct RetryBudget {
    table: &'static [(ErrorKind, usize)],
    used: Vec<(ErrorKind, usize)>,
}

impl RetryBudget {
    /// Spend one retry for `kind` if any remain.
    pub fn allow(&mut self, kind: ErrorKind) -> bool {
        let limit = self
            .table
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        let slot = match self.used.iter().position(|(k, _)| *k == kind) {
            Some(i) => i,
            None => {
                self.used.push((kind, 0));
                self.used.len() - 1
            }
        };
        let used = &mut self.used[slot].1;
        if *used >= limit {
            return false;
        }
        *used += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_and_server_errors_retry_once() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries_for(ErrorKind::RateLimited), 1);
        assert_eq!(policy.retries_for(ErrorKind::UpstreamServerError), 1);
        for kind in [
            ErrorKind::AuthError,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
            ErrorKind::ValidationError,
            ErrorKind::NetworkUnreachable,
            ErrorKind::MissingCredential,
        ] {
            assert!(!policy.is_retryable(kind), "{kind} should not retry");
        }
    }

    #[test]
    fn budget_enforces_each_kind_separately() {
        const TABLE: &[(ErrorKind, usize)] = &[
            (ErrorKind::RateLimited, 2),
            (ErrorKind::UpstreamServerError, 1),
        ];
        let policy = RetryPolicy {
            delay: Duration::ZERO,
            table: TABLE,
        };
        let mut budget = policy.budget();
        assert!(budget.allow(ErrorKind::UpstreamServerError));
        assert!(!budget.allow(ErrorKind::UpstreamServerError));
        assert!(budget.allow(ErrorKind::RateLimited));
        assert!(budget.allow(ErrorKind::RateLimited));
        assert!(!budget.allow(ErrorKind::RateLimited));
        assert!(!budget.allow(ErrorKind::NotFound));
    }

    #[test]
    fn backoff_uses_configured_delay() {
        let policy = RetryPolicy::with_backoff(Duration::from_millis(250));
        assert_eq!(policy.delay, Duration::from_millis(250));
        let _builder = policy.backoff();
    }
}
