//! Per-test results and the aggregate summary.

use serde::Serialize;
use std::fmt;

/// Verdict for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    /// What the validator observed, for display only.
    pub detail: Vec<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>, detail: Vec<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail,
        }
    }

    pub fn fail(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: vec![reason.into()],
        }
    }
}

/// Results of a whole run, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub results: Vec<TestResult>,
}

impl Summary {
    pub fn new(results: Vec<TestResult>) -> Self {
        Self { results }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    /// Process exit code: 0 on a full pass, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.all_passed() { 0 } else { 1 }
    }

    /// Machine-readable form used by `--json`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "passed": self.passed(),
            "total": self.total(),
            "results": self.results,
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Test Summary ===")?;
        for result in &self.results {
            let status = if result.passed { "✓ PASS" } else { "✗ FAIL" };
            writeln!(f, "  {status}: {}", result.name)?;
        }
        writeln!(f)?;
        writeln!(f, "Total: {}/{} tests passed", self.passed(), self.total())?;
        writeln!(f)?;
        if self.all_passed() {
            write!(f, "All tests passed!")
        } else {
            write!(f, "{} test(s) failed", self.failed())
        }
    }
}
