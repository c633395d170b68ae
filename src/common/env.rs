macro_rules! create_switchq_env {
    ($name: literal) => {
        concat!("SWITCHQ_", $name)
    };
}

/// Known environment variables passed to the solver process
pub const SWITCHQ_JOB_ID: &str = create_switchq_env!("JOB_ID");
pub const SWITCHQ_JOB_NAME: &str = create_switchq_env!("JOB_NAME");
pub const SWITCHQ_SUBMIT_DIR: &str = create_switchq_env!("SUBMIT_DIR");
/// Marker set while a provisioned environment is active. Its absence after a
/// run is the observable sign that teardown has happened.
pub const SWITCHQ_ENV_ACTIVE: &str = create_switchq_env!("ENV_ACTIVE");

/// Job id variable exported by SLURM inside an allocation.
pub const SLURM_JOB_ID: &str = "SLURM_JOB_ID";
