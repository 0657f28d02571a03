//! Engine server settings, read from `CONWAY_ENGINE_*` environment variables.
//!
//!   CONWAY_ENGINE_HOST             bind address        (0.0.0.0)
//!   CONWAY_ENGINE_PORT             listen port         (5000)
//!   CONWAY_ENGINE_PROGRAM          program to run      (mpirun)
//!   CONWAY_ENGINE_ARGS             leading arguments   (-np 4 ./engine-mpi)
//!   CONWAY_ENGINE_WORKERS          concurrent runs     (4)
//!   CONWAY_ENGINE_TIMEOUT          seconds per run     (600)
//!   CONWAY_ENGINE_WORKDIR          run directory       (inherited)
//!   CONWAY_ENGINE_MAX_FRAME_BYTES  request size cap    (1024)
//!
//! `powmin` and `powmax` are appended to the arguments of every run.

use std::path::PathBuf;
use std::time::Duration;

use crate::process::ProcessSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub program: String,
    pub args: Vec<String>,
    pub max_workers: usize,
    pub timeout_secs: u64,
    /// Directory the program runs in; `None` inherits the server's.
    pub work_dir: Option<PathBuf>,
    pub max_frame_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            program: "mpirun".to_string(),
            args: vec!["-np".into(), "4".into(), "./engine-mpi".into()],
            max_workers: 4,
            timeout_secs: 600,
            work_dir: None,
            max_frame_bytes: 1024,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("CONWAY_ENGINE_HOST") {
            config.host = v;
        }
        parse_into(&lookup, "CONWAY_ENGINE_PORT", &mut config.port);
        if let Some(v) = lookup("CONWAY_ENGINE_PROGRAM") {
            config.program = v;
        }
        if let Some(v) = lookup("CONWAY_ENGINE_ARGS") {
            config.args = v.split_whitespace().map(str::to_string).collect();
        }
        parse_into(&lookup, "CONWAY_ENGINE_WORKERS", &mut config.max_workers);
        parse_into(&lookup, "CONWAY_ENGINE_TIMEOUT", &mut config.timeout_secs);
        if let Some(v) = lookup("CONWAY_ENGINE_WORKDIR").filter(|v| !v.trim().is_empty()) {
            config.work_dir = Some(PathBuf::from(v));
        }
        parse_into(&lookup, "CONWAY_ENGINE_MAX_FRAME_BYTES", &mut config.max_frame_bytes);
        config
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn process_spec(&self) -> ProcessSpec {
        let spec = ProcessSpec::new(
            self.program.clone(),
            self.args.clone(),
            Duration::from_secs(self.timeout_secs),
        );
        match &self.work_dir {
            Some(dir) => spec.in_dir(dir),
            None => spec,
        }
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
        }
    }
}
