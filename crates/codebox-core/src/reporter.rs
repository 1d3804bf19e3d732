//! Outcome classification
//!
//! The runner describes what happened in engine terms (`RawOutcome`);
//! `classify` turns that into the one result type callers see. This is the
//! only place that decides between "the program failed" and "the platform
//! failed".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What the sandbox runner observed, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    Exited {
        exit_code: i64,
        stdout: String,
        stderr: String,
        /// stdout and stderr interleaved in the order the engine reported them
        combined: String,
    },
    TimedOut {
        limit: Duration,
    },
    EngineFault {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success {
        stdout: String,
    },
    RuntimeFailure {
        stderr: String,
        exit_code: i64,
        #[serde(default)]
        stdout: String,
    },
    Timeout {
        limit_seconds: u64,
    },
    InfrastructureError {
        message: String,
    },
}

pub fn classify(raw: RawOutcome) -> ExecutionResult {
    match raw {
        RawOutcome::Exited {
            exit_code: 0,
            combined,
            ..
        } => ExecutionResult::Success { stdout: combined },
        RawOutcome::Exited {
            exit_code,
            stdout,
            stderr,
            ..
        } => ExecutionResult::RuntimeFailure {
            stderr,
            exit_code,
            stdout,
        },
        RawOutcome::TimedOut { limit } => ExecutionResult::Timeout {
            limit_seconds: limit.as_secs(),
        },
        RawOutcome::EngineFault { message } => ExecutionResult::InfrastructureError { message },
    }
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// The submitted program is at fault (crashed or ran too long).
    pub fn is_user_fault(&self) -> bool {
        matches!(
            self,
            ExecutionResult::RuntimeFailure { .. } | ExecutionResult::Timeout { .. }
        )
    }

    /// The execution platform is at fault.
    pub fn is_platform_fault(&self) -> bool {
        matches!(self, ExecutionResult::InfrastructureError { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionResult::Success { .. } => "success",
            ExecutionResult::RuntimeFailure { .. } => "runtime_failure",
            ExecutionResult::Timeout { .. } => "timeout",
            ExecutionResult::InfrastructureError { .. } => "infrastructure_error",
        }
    }

    /// One-line title for display.
    pub fn headline(&self) -> String {
        match self {
            ExecutionResult::Success { .. } => "Output:".to_string(),
            ExecutionResult::RuntimeFailure { exit_code, .. } => {
                format!("Error during code execution (exit code {}):", exit_code)
            }
            ExecutionResult::Timeout { limit_seconds } => format!(
                "Execution timed out after {}s and was stopped.",
                limit_seconds
            ),
            ExecutionResult::InfrastructureError { .. } => {
                "Execution platform error (your code was not at fault):".to_string()
            }
        }
    }

    /// Text shown under the headline.
    pub fn body(&self) -> &str {
        match self {
            ExecutionResult::Success { stdout } => stdout,
            ExecutionResult::RuntimeFailure { stderr, .. } => stderr,
            ExecutionResult::Timeout { .. } => "",
            ExecutionResult::InfrastructureError { message } => message,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.body();
        if body.is_empty() {
            write!(f, "{}", self.headline())
        } else {
            write!(f, "{}\n{}", self.headline(), body.trim_end_matches('\n'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(exit_code: i64, stdout: &str, stderr: &str) -> RawOutcome {
        RawOutcome::Exited {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            combined: format!("{}{}", stdout, stderr),
        }
    }

    #[test]
    fn test_zero_exit_is_success_with_combined_output() {
        let result = classify(exited(0, "hello\n", "warning\n"));
        assert_eq!(
            result,
            ExecutionResult::Success {
                stdout: "hello\nwarning\n".to_string()
            }
        );
        assert!(result.is_success());
        assert!(!result.is_user_fault());
    }

    #[test]
    fn test_nonzero_exit_is_runtime_failure() {
        let result = classify(exited(
            1,
            "before\n",
            "Traceback (most recent call last):\nValueError: boom\n",
        ));
        match &result {
            ExecutionResult::RuntimeFailure {
                stderr,
                exit_code,
                stdout,
            } => {
                assert!(stderr.contains("ValueError: boom"));
                assert_eq!(*exit_code, 1);
                assert_eq!(stdout, "before\n");
            }
            other => panic!("expected runtime failure, got {:?}", other),
        }
        assert!(result.is_user_fault());
        assert!(!result.is_platform_fault());
    }

    #[test]
    fn test_timeout_and_engine_fault() {
        let timeout = classify(RawOutcome::TimedOut {
            limit: Duration::from_secs(3),
        });
        assert_eq!(timeout, ExecutionResult::Timeout { limit_seconds: 3 });
        assert!(timeout.is_user_fault());

        let fault = classify(RawOutcome::EngineFault {
            message: "Container engine is unreachable".to_string(),
        });
        assert!(fault.is_platform_fault());
        assert!(!fault.is_user_fault());
    }

    #[test]
    fn test_every_kind_renders_distinctly() {
        let results = [
            ExecutionResult::Success {
                stdout: "x".to_string(),
            },
            ExecutionResult::RuntimeFailure {
                stderr: "x".to_string(),
                exit_code: 2,
                stdout: String::new(),
            },
            ExecutionResult::Timeout { limit_seconds: 1 },
            ExecutionResult::InfrastructureError {
                message: "x".to_string(),
            },
        ];
        let headlines: std::collections::HashSet<_> =
            results.iter().map(|r| r.headline()).collect();
        assert_eq!(headlines.len(), results.len());
        assert!(results[3].to_string().contains("not at fault"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(ExecutionResult::RuntimeFailure {
            stderr: "err".to_string(),
            exit_code: 3,
            stdout: String::new(),
        })
        .unwrap();
        assert_eq!(json["status"], "runtime_failure");
        assert_eq!(json["exit_code"], 3);

        let json = serde_json::to_value(ExecutionResult::Timeout { limit_seconds: 5 }).unwrap();
        assert_eq!(json["status"], "timeout");
        assert_eq!(json["limit_seconds"], 5);
    }
}
