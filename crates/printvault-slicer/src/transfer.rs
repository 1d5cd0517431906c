use std::path::Path;

/// Hand-off seam to the external printer integration. The scheduler calls
/// this after a job completes when `auto_upload` is set; failures here are
/// reported as events and never revert the job's completed status.
pub trait PrinterTransfer: Send + Sync {
    /// Upload a sliced artifact to the named printer.
    fn upload(&self, printer_id: &str, artifact: &Path) -> anyhow::Result<()>;

    /// Ask the printer to start printing the previously uploaded artifact.
    fn start_print(&self, printer_id: &str, artifact: &Path) -> anyhow::Result<()>;
}

/// Default collaborator when no printer integration is wired up. Logs the
/// request and succeeds, so auto-upload jobs still complete.
pub struct NoopTransfer;

impl PrinterTransfer for NoopTransfer {
    fn upload(&self, printer_id: &str, artifact: &Path) -> anyhow::Result<()> {
        tracing::info!(
            printer = printer_id,
            artifact = %artifact.display(),
            "no printer integration configured, skipping upload"
        );
        Ok(())
    }

    fn start_print(&self, printer_id: &str, artifact: &Path) -> anyhow::Result<()> {
        tracing::info!(
            printer = printer_id,
            artifact = %artifact.display(),
            "no printer integration configured, skipping print start"
        );
        Ok(())
    }
}
