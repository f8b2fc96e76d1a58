use std::process::Stdio;

use super::command::Invocation;

/// Captured result of one ExifTool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `true` when the process exited with status 0.
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Number reported on the `N image files updated` summary line, if any.
    pub fn files_updated(&self) -> Option<usize> {
        self.stdout.lines().find_map(|line| {
            line.trim()
                .strip_suffix("image files updated")
                .and_then(|n| n.trim().parse().ok())
        })
    }

    /// `true` when the output names at least one updated file.
    pub fn reports_update(&self) -> bool {
        self.files_updated().is_some_and(|n| n > 0)
    }

    /// Stderr trimmed, falling back to stdout when stderr is empty.
    pub fn message(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }
}

/// Runs a built [`Invocation`] against the external tool.
///
/// Implement this to substitute the tool, e.g. in tests. The library ships
/// [`ExifToolRunner`], which spawns a child process per call.
#[async_trait::async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput>;
}

/// Spawns the ExifTool executable for each invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifToolRunner;

#[async_trait::async_trait]
impl ToolRunner for ExifToolRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        log::debug!("exec: {}", invocation.display());

        let output = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runner that answers from a closure, for unit tests.
#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Script = dyn Fn(&[String]) -> std::io::Result<ToolOutput> + Send + Sync;

    pub(crate) struct ScriptedRunner {
        script: Box<Script>,
        delay: Duration,
        calls: Mutex<Vec<Vec<String>>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedRunner {
        pub(crate) fn new(
            script: impl Fn(&[String]) -> std::io::Result<ToolOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        /// Highest number of invocations observed running at once.
        pub(crate) fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
            let args: Vec<String> = invocation
                .args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.calls.lock().unwrap().push(args.clone());

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let result = (self.script)(&args);
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    pub(crate) fn ok(stdout: &str) -> std::io::Result<ToolOutput> {
        Ok(ToolOutput {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    /// Exit 1 with the summary lines ExifTool prints for a file it could not write.
    pub(crate) fn rejected(stderr: &str) -> std::io::Result<ToolOutput> {
        Ok(ToolOutput {
            success: false,
            code: Some(1),
            stdout: "    0 image files updated\n    1 files weren't updated due to errors\n"
                .to_string(),
            stderr: stderr.to_string(),
        })
    }

    pub(crate) fn fail(stderr: &str) -> std::io::Result<ToolOutput> {
        Ok(ToolOutput {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}
