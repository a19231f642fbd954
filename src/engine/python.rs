use super::{Auditor, types::*};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Long-lived Python process holding one model; one JSON line per request and reply.
pub struct PythonAuditor {
    script: PathBuf,
    python_exe: PathBuf,
    model_path: String,
    session: Mutex<Session>,
}

struct Session {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr_thread: Option<JoinHandle<()>>,
}

impl PythonAuditor {
    /// Fails unless the spawned engine answers a `doctor` request with `ok: true`.
    pub fn new(cfg: &Config) -> Result<Self> {
        let engine = Self::start(cfg)?;
        let diag = engine
            .doctor()
            .with_context(|| format!("engine readiness check: {}", engine.script.display()))?;
        if !diag.ok {
            return Err(anyhow!(
                "engine not ready ({}): {}",
                engine.script.display(),
                diag.error.as_deref().unwrap_or("no error message")
            ));
        }
        debug!("engine ready device={:?}", diag.device);
        Ok(engine)
    }

    /// Spawns the engine without the readiness check; `doctor` uses this to
    /// report on an engine that failed to load.
    pub fn start(cfg: &Config) -> Result<Self> {
        let script = PathBuf::from(&cfg.paths.scripts_dir).join(&cfg.engine.script);
        if !script.exists() {
            return Err(anyhow!("missing script: {}", script.display()));
        }
        if cfg.engine.model_path.trim().is_empty() {
            return Err(anyhow!("engine.model_path is not set"));
        }
        let python_exe = resolve_python_exe(&cfg.engine.python_exe);
        let session = spawn(cfg, &python_exe, &script)?;
        Ok(Self {
            script,
            python_exe,
            model_path: cfg.engine.model_path.clone(),
            session: Mutex::new(session),
        })
    }

    fn call<I: serde::Serialize, O: for<'de> serde::Deserialize<'de>>(&self, input: &I) -> Result<O> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("engine session poisoned"))?;

        let mut line = serde_json::to_string(input)?;
        line.push('\n');
        {
            let stdin = session
                .stdin
                .as_mut()
                .ok_or_else(|| anyhow!("engine stdin closed"))?;
            stdin
                .write_all(line.as_bytes())
                .with_context(|| "writing engine request")?;
            stdin.flush().with_context(|| "flushing engine request")?;
        }

        let mut reply = String::new();
        let n = session
            .stdout
            .read_line(&mut reply)
            .with_context(|| "reading engine response")?;
        if n == 0 {
            let status = session.child.try_wait().ok().flatten();
            return Err(anyhow!(
                "engine exited before responding ({}): {}",
                status.map(|s| s.to_string()).unwrap_or_else(|| "running".into()),
                self.script.display()
            ));
        }

        let out: O = serde_json::from_str(reply.trim_end())
            .with_context(|| format!("parsing engine JSON output: {}", self.script.display()))?;
        Ok(out)
    }
}

fn spawn(cfg: &Config, python_exe: &Path, script: &Path) -> Result<Session> {
    debug!(
        "spawning engine {} {} model={}",
        python_exe.display(),
        script.display(),
        cfg.engine.model_path
    );
    let mut cmd = Command::new(python_exe);
    cmd.arg(script)
        .arg("--model-path")
        .arg(&cfg.engine.model_path)
        .arg("--device-map")
        .arg(&cfg.engine.device_map);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    for (k, v) in &cfg.engine.env {
        cmd.env(k, v);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning python: {}", script.display()))?;

    let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
    let stderr = child.stderr.take();

    // Drain stderr continuously so verbose model loading can't block the child
    // on a full pipe.
    let keep = cfg.debug.keep_engine_stderr;
    let stderr_thread = std::thread::spawn(move || {
        let Some(stderr) = stderr else { return };
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(l) if keep && !l.trim().is_empty() => debug!("engine stderr: {}", l.trim()),
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    Ok(Session {
        child,
        stdin: Some(stdin),
        stdout: BufReader::new(stdout),
        stderr_thread: Some(stderr_thread),
    })
}

impl Drop for Session {
    fn drop(&mut self) {
        // Closing stdin is the shutdown signal for the script's read loop.
        drop(self.stdin.take());
        match self.child.wait() {
            Ok(status) if !status.success() => warn!("engine exited with {status}"),
            Ok(_) => {}
            Err(err) => warn!("waiting for engine: {err}"),
        }
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("EDIT_AUDIT_PYTHON") {
            let p = crate::paths::expand_tilde(Path::new(&env_val));
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    crate::paths::expand_tilde(Path::new(raw))
}

impl Auditor for PythonAuditor {
    fn doctor(&self) -> Result<EngineDiag> {
        let mut diag: EngineDiag = self.call(&serde_json::json!({"cmd": "doctor"}))?;
        if diag.python_exe.is_empty() {
            diag.python_exe = self.python_exe.display().to_string();
        }
        if diag.model_path.is_empty() {
            diag.model_path = self.model_path.clone();
        }
        Ok(diag)
    }

    fn audit(&self, req: &AuditIn) -> Result<AuditOut> {
        let out: AuditOut = self.call(&serde_json::json!({"cmd": "audit", "req": req}))?;
        if !out.ok {
            warn!(
                "engine audit returned ok=false for {}: {}",
                req.edited,
                out.error.as_deref().unwrap_or("no error message")
            );
        }
        Ok(out)
    }
}
