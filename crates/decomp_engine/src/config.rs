use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use decomp_core::DEFAULT_LOG_CAPACITY;
use thiserror::Error;

use crate::fetch::FetchSettings;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// Command line of the external processing tool.
///
/// Arguments may contain `{input}` (downloaded artifact) and `{output_dir}`
/// (job output directory); both are substituted per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `jadx` limited to one thread to keep memory use predictable.
    pub fn jadx() -> Self {
        Self::new(
            "jadx",
            ["--threads-count", "1", "-d", OUTPUT_DIR_PLACEHOLDER, INPUT_PLACEHOLDER],
        )
    }

    pub fn render_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output_dir = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_DIR_PLACEHOLDER, &output_dir)
            })
            .collect()
    }
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self::jadx()
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding one sub-directory per job.
    pub root: PathBuf,
    /// Number of jobs executed concurrently.
    pub workers: usize,
    /// Lines kept per job in the in-memory log ring.
    pub log_capacity: usize,
    pub tool: ToolCommand,
    pub tool_timeout: Duration,
    /// File name the downloaded artifact is stored under inside `output_dir`.
    pub artifact_name: String,
    pub fetch: FetchSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("artifact name {0:?} must be a plain file name")]
    ArtifactName(String),
    #[error("tool program must not be empty")]
    EmptyTool,
}

impl EngineConfig {
    pub fn default_with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workers: 1,
            log_capacity: DEFAULT_LOG_CAPACITY,
            tool: ToolCommand::jadx(),
            tool_timeout: Duration::from_secs(3600),
            artifact_name: "app.apk".to_string(),
            fetch: FetchSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.tool.program.trim().is_empty() {
            return Err(ConfigError::EmptyTool);
        }
        let mut components = Path::new(&self.artifact_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(ConfigError::ArtifactName(self.artifact_name.clone())),
        }
    }
}
