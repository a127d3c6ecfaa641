use mcsm_protocol::management::instance::{ServerSettings, DEFAULT_XMS, DEFAULT_XMX};
use mcsm_protocol::utils::{Encoding, MemorySize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::error::StartError;

/// Everything needed to launch one server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Path to, or `PATH`-resolvable name of, the Java executable.
    pub runtime: String,
    pub heap_min: String,
    pub heap_max: String,
    pub artifact: PathBuf,
    pub args: Vec<String>,
    pub input_encoding: Encoding,
    pub output_encoding: Encoding,
}

/// A command that passed validation; ready to spawn.
#[derive(Debug, Clone)]
pub struct ResolvedLaunch {
    pub runtime: PathBuf,
    pub heap_min: MemorySize,
    pub heap_max: MemorySize,
    pub working_dir: PathBuf,
}

impl LaunchCommand {
    pub fn new(runtime: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            heap_min: DEFAULT_XMS.to_owned(),
            heap_max: DEFAULT_XMX.to_owned(),
            artifact: artifact.into(),
            args: vec![],
            input_encoding: Encoding::default(),
            output_encoding: Encoding::default(),
        }
    }

    pub fn from_settings(artifact: impl Into<PathBuf>, settings: &ServerSettings) -> Self {
        Self {
            runtime: settings.java_path.clone(),
            heap_min: settings.xms.clone(),
            heap_max: settings.xmx.clone(),
            artifact: artifact.into(),
            args: settings.arguments.clone(),
            input_encoding: settings.input_encoding,
            output_encoding: settings.output_encoding,
        }
    }

    pub fn with_heap(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.heap_min = min.into();
        self.heap_max = max.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// The artifact's parent directory, made absolute.
    pub fn working_dir(&self) -> PathBuf {
        let artifact = std::path::absolute(&self.artifact).unwrap_or_else(|_| self.artifact.clone());
        artifact
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Checks heap values, then the artifact, then the runtime.
    pub fn validate(&self) -> Result<ResolvedLaunch, StartError> {
        let heap_min = MemorySize::parse(&self.heap_min)?;
        let heap_max = MemorySize::parse(&self.heap_max)?;
        if heap_max.to_mb() < heap_min.to_mb() {
            return Err(StartError::InvalidConfig(format!(
                "maximum heap {} is smaller than minimum heap {}",
                heap_max, heap_min
            )));
        }

        if !self.artifact.is_file() {
            return Err(StartError::MissingExecutable(self.artifact.clone()));
        }

        let runtime = resolve_runtime(&self.runtime)
            .ok_or_else(|| StartError::RuntimeNotFound(self.runtime.clone()))?;

        Ok(ResolvedLaunch {
            runtime,
            heap_min,
            heap_max,
            working_dir: self.working_dir(),
        })
    }
}

impl ResolvedLaunch {
    /// `-Xmx<MAX> -Xms<MIN> [args] -jar <artifact> nogui`
    pub fn arguments(&self, command: &LaunchCommand) -> Vec<String> {
        let mut args = vec![
            format!("-Xmx{}", self.heap_max),
            format!("-Xms{}", self.heap_min),
        ];
        args.extend(command.args.iter().filter(|a| !a.trim().is_empty()).cloned());
        args.push("-jar".into());
        let artifact = command
            .artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| command.artifact.to_string_lossy().into_owned());
        args.push(artifact);
        args.push("nogui".into());
        args
    }

    /// `PATH` with the runtime's directory in front.
    pub fn search_path(&self) -> Option<OsString> {
        let runtime_dir = self.runtime.parent().filter(|p| !p.as_os_str().is_empty())?;
        let mut paths = vec![runtime_dir.to_path_buf()];
        if let Some(current) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&current));
        }
        std::env::join_paths(paths).ok()
    }
}

/// A runtime given as a path must be a file; a bare name is looked up on `PATH`.
pub fn resolve_runtime(runtime: &str) -> Option<PathBuf> {
    let runtime = runtime.trim();
    if runtime.is_empty() {
        return None;
    }
    let candidate = Path::new(runtime);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let names: Vec<String> = if cfg!(windows) && candidate.extension().is_none() {
        vec![format!("{}.exe", runtime), runtime.to_owned()]
    } else {
        vec![runtime.to_owned()]
    };
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}
