//! Process exit codes.

use site_tester::RunReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every channel passed or was untested.
    Success,
    /// At least one channel failed.
    ChecksFailed,
    /// Bad arguments, unreadable descriptors, or a startup failure.
    ConfigError,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::ChecksFailed => 1,
            ExitCode::ConfigError => 2,
        }
    }

    pub fn from_report(report: &RunReport) -> Self {
        if report.has_failures() {
            ExitCode::ChecksFailed
        } else {
            ExitCode::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use site_tester::{ChannelResult, CheckResult};

    fn report(results: Vec<CheckResult>) -> RunReport {
        RunReport {
            run_id: "r".into(),
            started_at: Utc::now(),
            duration_ms: 0,
            results,
        }
    }

    #[test]
    fn test_exit_code_follows_digest() {
        let mut failed = CheckResult::new("B");
        failed.site = Some(ChannelResult::failed("evaluating: predicate returned false", 3));
        assert_eq!(ExitCode::from_report(&report(vec![failed])).as_i32(), 1);

        let mut untested = CheckResult::new("A");
        untested.api = Some(ChannelResult::untested(1));
        let r = report(vec![untested, CheckResult::skipped("C")]);
        assert!(r.digest().is_empty());
        assert_eq!(ExitCode::from_report(&r), ExitCode::Success);
        assert_eq!(ExitCode::from_report(&report(vec![])).as_i32(), 0);
    }
}
