pub mod slurm;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::JobId;
use crate::descriptor::JobDescriptor;

/// A job accepted by the batch scheduler: its unique identifier and the log
/// targets with the identifier already filled in.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub id: JobId,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// External batch scheduler boundary. The real implementation shells out to
/// `sbatch`; tests substitute a stub that assigns identifiers locally.
pub trait Scheduler {
    fn submit(
        &mut self,
        descriptor: &JobDescriptor,
    ) -> Pin<Box<dyn Future<Output = crate::Result<SubmittedJob>>>>;
}
