// Per-mount space and inode usage from `df`

use tokio::process::Command;

use super::{MetricSource, ProbeError, parse_decimal};
use crate::models::{FilesystemStat, MetricKind};

const DF_PROGRAM: &str = "df";
const DF_ARGS: [&str; 2] = ["-BM", "--output=source,used,pcent,iused,ipcent,target"];

/// Parses `df -BM --output=source,used,pcent,iused,ipcent,target`.
///
/// Rows whose numeric columns are `-` (pseudo filesystems without inode accounting)
/// are skipped. Mount points may contain spaces; everything after the fifth column
/// is the target.
pub fn parse_df(output: &str) -> Result<Vec<FilesystemStat>, ProbeError> {
    let mut stats = Vec::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 6 {
            return Err(ProbeError::malformed(
                "df output",
                format!("expected 6 columns, got {}: {line:?}", fields.len()),
            ));
        }
        if fields[1..5].contains(&"-") {
            continue;
        }
        stats.push(FilesystemStat {
            filesystem: fields[0].to_string(),
            mountpoint: fields[5..].join(" "),
            used_mb: parse_decimal(fields[1].trim_end_matches('M'), "df used")?,
            used_percent: parse_decimal(fields[2].trim_end_matches('%'), "df pcent")?,
            inodes_used: parse_decimal(fields[3], "df iused")?,
            inodes_percent: parse_decimal(fields[4].trim_end_matches('%'), "df ipcent")?,
        });
    }
    if stats.is_empty() {
        return Err(ProbeError::Empty("filesystem"));
    }
    Ok(stats)
}

#[derive(Default)]
pub struct FilesystemSource;

impl MetricSource for FilesystemSource {
    type Sample = Vec<FilesystemStat>;

    fn kind(&self) -> MetricKind {
        MetricKind::Filesystem
    }

    async fn probe(&mut self) -> Result<Vec<FilesystemStat>, ProbeError> {
        let output = Command::new(DF_PROGRAM)
            .args(DF_ARGS)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Io {
                path: DF_PROGRAM.to_string(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return parse_df(&stdout);
        }
        // df exits non-zero when a single mount is unreadable but still reports the rest.
        match parse_df(&stdout) {
            Ok(stats) => {
                tracing::debug!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "df reported partial failure"
                );
                Ok(stats)
            }
            Err(_) => Err(ProbeError::Command {
                program: DF_PROGRAM.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
