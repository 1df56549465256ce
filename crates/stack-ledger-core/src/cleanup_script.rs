//! Standalone teardown script generation
//!
//! The script is the escape hatch for when this tool itself can't run:
//! one line per resource, in static cleanup order, each allowed to fail.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use stack_ledger_common::ResourceStatus;
use stack_ledger_common::tags::format_created_at;
use tracing::info;

use crate::command::shell_quote;
use crate::registry::ResourceRegistry;
use crate::state::write_atomically;

/// Render the cleanup script for everything in `registry`
pub fn render(registry: &ResourceRegistry) -> String {
    let doc = registry.store().document();
    let mut script = String::new();

    // writing to a String cannot fail
    let _ = writeln!(script, "#!/bin/sh");
    let _ = writeln!(
        script,
        "# Teardown for stack '{}' in {}",
        comment_safe(&doc.stack_name),
        comment_safe(&doc.region)
    );
    let _ = writeln!(script, "# Generated {}", format_created_at(Utc::now()));
    let _ = writeln!(script, "# Every step may fail without stopping the rest.");
    let _ = writeln!(script);
    let _ = writeln!(script, "set -u");

    for resource_type in registry.types_in_cleanup_order() {
        let _ = writeln!(script);
        let _ = writeln!(script, "# {}", comment_safe(resource_type));

        for resource in registry.resources_of_type(resource_type) {
            let id = &resource.id;
            if resource.status == ResourceStatus::Deleted {
                let _ = writeln!(script, "# {}: already deleted", comment_safe(id));
                continue;
            }
            match &resource.cleanup_command {
                Some(command) => {
                    let notice = format!("{resource_type} {id} already gone or failed, continuing");
                    let _ = writeln!(
                        script,
                        "{} || echo {}",
                        command.quoted(),
                        shell_quote(&notice)
                    );
                }
                None => {
                    let _ = writeln!(
                        script,
                        "# {}: no cleanup command recorded",
                        comment_safe(id)
                    );
                }
            }
        }
    }

    script
}

/// Keep text on its comment line; control characters become `?`
fn comment_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { '?' } else { c })
        .collect()
}

/// Write the script atomically, executable on unix
pub fn write(registry: &ResourceRegistry, path: &Path) -> Result<()> {
    let script = render(registry);
    write_atomically(path, script.as_bytes())
        .with_context(|| format!("Failed to write cleanup script: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }

    info!(path = %path.display(), resources = registry.len(), "Wrote cleanup script");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CleanupCommand;
    use crate::registry::Registration;

    fn registry() -> ResourceRegistry {
        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        reg.register(
            Registration::new("vpc", "vpc-1").cleanup_command(CleanupCommand::new(
                "aws",
                ["ec2", "delete-vpc", "--vpc-id", "vpc-1"],
            )),
        )
        .unwrap();
        reg.register(
            Registration::new("instance", "i-1")
                .cleanup_command(CleanupCommand::shell("aws ec2 terminate-instances --instance-ids i-1")),
        )
        .unwrap();
        reg.register(Registration::new("volume", "v-1")).unwrap();
        reg
    }

    #[test]
    fn test_render_orders_and_guards_lines() {
        let script = render(&registry());
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/sh");
        let instance = lines
            .iter()
            .position(|l| l.starts_with("sh -c 'aws ec2 terminate-instances"))
            .unwrap();
        let vpc = lines
            .iter()
            .position(|l| l.starts_with("aws ec2 delete-vpc"))
            .unwrap();
        assert!(instance < vpc);

        assert_eq!(
            lines[vpc],
            "aws ec2 delete-vpc --vpc-id vpc-1 || echo 'vpc vpc-1 already gone or failed, continuing'"
        );
        assert_eq!(
            lines[instance],
            "sh -c 'aws ec2 terminate-instances --instance-ids i-1' \
             || echo 'instance i-1 already gone or failed, continuing'"
        );
        assert!(script.contains("# v-1: no cleanup command recorded"));
    }

    #[test]
    fn test_control_characters_stay_in_comments() {
        let mut reg = ResourceRegistry::in_memory("demo\nrm -rf /", "us-east-1");
        reg.register(Registration::new("volume\nreboot", "v-1\ntouch /tmp/x"))
            .unwrap();

        let script = render(&reg);
        assert!(script.contains("# volume?reboot"));
        assert!(script.contains("# v-1?touch /tmp/x: no cleanup command recorded"));
        assert!(script.lines().all(|l| !l.starts_with("touch") && !l.starts_with("reboot")));
        assert!(script.lines().all(|l| !l.starts_with("rm")));
    }

    #[test]
    fn test_deleted_resources_are_commented() {
        let mut reg = registry();
        reg.update_status("i-1", ResourceStatus::Failed, None).unwrap();
        reg.update_status("i-1", ResourceStatus::Deleting, None).unwrap();
        reg.update_status("i-1", ResourceStatus::Deleted, None).unwrap();

        let script = render(&reg);
        assert!(script.contains("# i-1: already deleted"));
        assert!(!script.contains("terminate-instances"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cleanup.sh");
        write(&registry(), &path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("#!/bin/sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_runs_every_step() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("last-step-ran");
        let injected = dir.path().join("injected");

        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        reg.register(
            Registration::new("instance", "i-1").cleanup_command(CleanupCommand::shell("exit 3")),
        )
        .unwrap();
        reg.register(
            Registration::new("instance", "i-2")
                .cleanup_command(CleanupCommand::shell("echo \"$UNSET_VAR\" # trailing")),
        )
        .unwrap();
        reg.register(Registration::new(
            "instance",
            format!("i-3\ntouch {}", shell_quote(&injected.to_string_lossy())),
        ))
        .unwrap();
        reg.register(Registration::new("instance", "i-4").cleanup_command(CleanupCommand::shell(
            format!("touch {}", shell_quote(&marker.to_string_lossy())),
        )))
        .unwrap();

        let path = dir.path().join("cleanup.sh");
        write(&reg, &path).unwrap();
        let status = std::process::Command::new("sh").arg(&path).status().unwrap();

        assert!(status.success());
        assert!(marker.exists());
        assert!(!injected.exists());
    }
}
