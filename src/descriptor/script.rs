use std::fmt::Write;
use std::path::Path;

use crate::common::placeholders::to_sbatch_pattern;
use crate::common::timeutils::format_walltime;
use crate::descriptor::JobDescriptor;

/// Renders the descriptor into a submit script: one `#SBATCH` directive per
/// line, followed by a body that re-enters this binary as the in-allocation
/// launcher.
pub fn build_submit_script(
    descriptor: &JobDescriptor,
    submit_dir: &Path,
    launcher_cmd: &str,
) -> String {
    let resources = &descriptor.resources;
    let mut script = format!(
        r##"#!/bin/bash
#SBATCH --job-name={name}
#SBATCH --account={account}
#SBATCH --partition={partition}
#SBATCH --time={walltime}
#SBATCH --nodes={nodes}
#SBATCH --ntasks-per-node={tasks}
#SBATCH --cpus-per-task={cpus}
#SBATCH --mem-per-cpu={mem}
#SBATCH --output={stdout}
#SBATCH --error={stderr}
"##,
        name = resources.job_name,
        account = resources.account,
        partition = resources.partition,
        walltime = format_walltime(&resources.timelimit),
        nodes = resources.nodes,
        tasks = resources.tasks_per_node,
        cpus = resources.cpus_per_task,
        mem = resources.mem_per_cpu,
        stdout = to_sbatch_pattern(&descriptor.logs.stdout, submit_dir),
        stderr = to_sbatch_pattern(&descriptor.logs.stderr, submit_dir),
    );

    let notifications = &descriptor.notifications;
    if !notifications.events.is_empty() {
        let events: Vec<&str> = notifications
            .events
            .iter()
            .map(|event| event.as_directive())
            .collect();
        writeln!(script, "#SBATCH --mail-type={}", events.join(",")).unwrap();
    }
    if let Some(mailto) = &notifications.mailto {
        writeln!(script, "#SBATCH --mail-user={mailto}").unwrap();
    }
    writeln!(
        script,
        "#SBATCH --export={}",
        if descriptor.export_env { "ALL" } else { "NONE" }
    )
    .unwrap();

    if let Some(workdir) = &descriptor.workdir {
        write!(script, "\ncd {}\n{launcher_cmd}", workdir.display()).unwrap();
    } else {
        write!(script, "\n{launcher_cmd}").unwrap();
    }
    script
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::build_submit_script;
    use crate::descriptor::JobDescriptor;

    fn descriptor() -> JobDescriptor {
        toml::from_str(
            r#"
            [resources]
            job_name = "switch-base"
            account = "def-energy"
            partition = "cpubase_bycore_b4"
            timelimit = "10:00:00"
            nodes = 1
            tasks_per_node = 1
            cpus_per_task = 12
            mem_per_cpu = "20G"

            [notifications]
            events = ["begin", "end", "fail"]
            mailto = "operator@example.org"

            [solver]
            backend = "cplexamp"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_submit_script() {
        let script = build_submit_script(
            &descriptor(),
            Path::new("/scratch/runs"),
            "/opt/switchq run --job-file /scratch/runs/job.toml",
        );
        assert_eq!(
            script,
            r##"#!/bin/bash
#SBATCH --job-name=switch-base
#SBATCH --account=def-energy
#SBATCH --partition=cpubase_bycore_b4
#SBATCH --time=10:00:00
#SBATCH --nodes=1
#SBATCH --ntasks-per-node=1
#SBATCH --cpus-per-task=12
#SBATCH --mem-per-cpu=20G
#SBATCH --output=%x-%j.out
#SBATCH --error=%x-%j.err
#SBATCH --mail-type=BEGIN,END,FAIL
#SBATCH --mail-user=operator@example.org
#SBATCH --export=ALL

/opt/switchq run --job-file /scratch/runs/job.toml"##
        );
    }

    #[test]
    fn test_workdir_and_no_notifications() {
        let mut descriptor = descriptor();
        descriptor.notifications.events.clear();
        descriptor.notifications.mailto = None;
        descriptor.workdir = Some(PathBuf::from("/scratch/model"));
        let script = build_submit_script(&descriptor, Path::new("/scratch/runs"), "launch");
        assert!(!script.contains("--mail-type"));
        assert!(!script.contains("--mail-user"));
        assert!(script.ends_with("\ncd /scratch/model\nlaunch"));
    }
}
