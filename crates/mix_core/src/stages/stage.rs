//! The uniform stage contract.
//!
//! Every pipeline stage implements this trait. The stage runner drives the
//! two operations in a fixed sandwich:
//!
//! 1. `analyse` - measure, producing the pre record
//! 2. `process` - mutate audio/metadata per the stage's declared kind
//! 3. `analyse` again - measure, producing the post record for the diff

use crate::analysis::AnalysisRecord;
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::orchestrator::errors::StageResult;

/// A unit of the pipeline: measures the context and, optionally, mutates it.
///
/// Stages are values registered once at process start; they hold no per-job
/// state and must not retain references to the context after returning.
/// What a stage may touch in `process` is declared by its contract's kind:
/// analysis-only stages keep the default no-op, stems-DSP stages rewrite
/// stem buffers, mixdown-DSP stages rewrite the mixdown, and structural
/// stages may replace stems or change the session sample rate.
///
/// Long-running stages should poll [`JobContext::is_cancelled`] at natural
/// checkpoints (typically between stems) and return
/// [`StageError::Cancelled`](crate::orchestrator::errors::StageError::Cancelled).
pub trait Stage: Send + Sync {
    /// Measure the context. Must not mutate audio buffers, metadata or
    /// artifacts; the runner calls this twice per stage.
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord>;

    /// Apply the stage's processing, guided by the pre-analysis record.
    ///
    /// The default implementation is a no-op for analysis-only stages.
    fn process(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let _ = (ctx, contract, pre);
        Ok(())
    }
}
