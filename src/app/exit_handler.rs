//! Exit code logic for the mediabatch process.

use std::process::ExitCode;

use mediabatch_core::RunReport;
use mediabatch_core::shutdown::INTERRUPTED_EXIT_CODE;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every item produced an output.
    Success,
    /// The run could not start.
    Failure,
    /// The run finished but at least one item failed.
    Partial,
    /// The run was interrupted.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Maps a finished run to the process exit outcome.
pub(crate) fn determine_exit_outcome(report: &RunReport) -> ProcessExit {
    if report.cancelled {
        ProcessExit::Interrupted
    } else if report.summary.is_complete_success() {
        ProcessExit::Success
    } else {
        ProcessExit::Partial
    }
}
