//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use decomp_core::DEFAULT_LOG_CAPACITY;
use decomp_engine::{EngineConfig, ToolCommand};
use log::LevelFilter;

use crate::logging::LogDestination;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Downloads artifacts and decompiles them as background jobs")]
pub struct Args {
    /// Address the HTTP server listens on
    #[arg(long, env = "DECOMP_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Directory holding one sub-directory per job [default: <temp>/decomp_jobs]
    #[arg(long, env = "DECOMP_ROOT")]
    pub root: Option<PathBuf>,

    /// Number of jobs processed at the same time
    #[arg(long, env = "DECOMP_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Log lines kept in memory per job
    #[arg(long, env = "DECOMP_LOG_CAPACITY", default_value_t = DEFAULT_LOG_CAPACITY)]
    pub log_capacity: usize,

    /// Decompiler executable
    #[arg(long, env = "DECOMP_TOOL", default_value = "jadx")]
    pub tool: String,

    /// Decompiler argument, repeatable. `{input}` and `{output_dir}` are
    /// substituted per job. Defaults to jadx's arguments.
    #[arg(long = "tool-arg", allow_hyphen_values = true)]
    pub tool_args: Vec<String>,

    /// Seconds before a running decompiler is killed
    #[arg(long, env = "DECOMP_TOOL_TIMEOUT_SECS", default_value_t = 3600)]
    pub tool_timeout_secs: u64,

    /// File name of the downloaded artifact inside the job output directory
    #[arg(long, env = "DECOMP_ARTIFACT_NAME", default_value = "app.apk")]
    pub artifact_name: String,

    /// Also write the process log to this file
    #[arg(long, env = "DECOMP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, env = "DECOMP_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Args {
    pub fn job_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("decomp_jobs"))
    }

    pub fn tool_command(&self) -> ToolCommand {
        if self.tool_args.is_empty() {
            ToolCommand {
                program: self.tool.clone(),
                ..ToolCommand::jadx()
            }
        } else {
            ToolCommand::new(self.tool.clone(), self.tool_args.iter().cloned())
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default_with_root(self.job_root());
        config.workers = self.workers;
        config.log_capacity = self.log_capacity;
        config.tool = self.tool_command();
        config.tool_timeout = Duration::from_secs(self.tool_timeout_secs);
        config.artifact_name = self.artifact_name.clone();
        config
    }

    pub fn log_destination(&self) -> LogDestination {
        match &self.log_file {
            Some(path) => LogDestination::Both(path.clone()),
            None => LogDestination::Terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decomp_engine::{INPUT_PLACEHOLDER, OUTPUT_DIR_PLACEHOLDER};

    #[test]
    fn defaults_run_jadx() {
        let args = Args::try_parse_from(["decomp-server", "--root", "/srv/jobs"]).unwrap();
        let config = args.engine_config();
        assert_eq!(config.root, PathBuf::from("/srv/jobs"));
        assert_eq!(config.workers, 1);
        assert_eq!(config.log_capacity, 2000);
        assert_eq!(config.tool, ToolCommand::jadx());
        assert_eq!(config.tool_timeout, Duration::from_secs(3600));
        assert_eq!(config.artifact_name, "app.apk");
        assert_eq!(args.log_level, LevelFilter::Info);
        assert_eq!(args.log_destination(), LogDestination::Terminal);
    }

    #[test]
    fn custom_tool_arguments_replace_jadx_ones() {
        let args = Args::try_parse_from([
            "decomp-server",
            "--tool",
            "apktool",
            "--tool-arg",
            "d",
            "--tool-arg",
            "-o",
            "--tool-arg",
            OUTPUT_DIR_PLACEHOLDER,
            "--tool-arg",
            INPUT_PLACEHOLDER,
        ])
        .unwrap();
        assert_eq!(
            args.tool_command(),
            ToolCommand::new("apktool", ["d", "-o", OUTPUT_DIR_PLACEHOLDER, INPUT_PLACEHOLDER])
        );
    }

    #[test]
    fn other_program_keeps_default_arguments() {
        let args =
            Args::try_parse_from(["decomp-server", "--tool", "/opt/jadx/bin/jadx"]).unwrap();
        let tool = args.tool_command();
        assert_eq!(tool.program, "/opt/jadx/bin/jadx");
        assert_eq!(tool.args, ToolCommand::jadx().args);
    }

    #[test]
    fn log_file_enables_file_logging() {
        let args =
            Args::try_parse_from(["decomp-server", "--log-file", "server.log", "--log-level", "debug"])
                .unwrap();
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert_eq!(
            args.log_destination(),
            LogDestination::Both(PathBuf::from("server.log"))
        );
    }
}
