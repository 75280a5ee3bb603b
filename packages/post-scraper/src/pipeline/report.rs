//! Stages 10 and 11: output handoff and the error summary.

use crate::error::{JobError, JobResult};
use crate::pipeline::runner::{StageFlow, StageRunner};
use crate::traits::notifier::Escalation;
use crate::types::state::Stage;

impl StageRunner {
    /// Stage 10: hand the finished state to the output writer.
    pub(crate) fn write_output(&mut self) -> JobResult<StageFlow> {
        self.status.progress("Writing output");
        self.output
            .write(&self.state, &self.paths.output)
            .map_err(|e| JobError::resumable(Stage::WriteOutput, e.to_string()))?;
        Ok(StageFlow::Done)
    }

    /// Stage 11: escalate accumulated non-fatal errors, if there were any.
    pub(crate) async fn notify_errors(&mut self) -> StageFlow {
        let errors = self.status.read_errors();
        if errors.trim().is_empty() {
            return StageFlow::Done;
        }
        let escalation = Escalation::non_fatal_summary(
            &self.state.job_id,
            Stage::ErrorSummaryNotification,
            &errors,
            self.state.settings.redacted_summary(),
        );
        self.notifier.notify(&escalation).await;
        StageFlow::Done
    }
}
