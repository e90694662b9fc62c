use std::sync::Mutex;

use crate::config::Project;
use crate::engine::{RunToken, RunTokens};
use crate::reload::LiveReload;
use crate::tools::{LintCache, Toolchain};

/// A 32-byte BLAKE3 hash used for change detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// The mode in which the pipeline is running.
///
/// This replaces a process-wide "is watching" switch: the mode is decided once,
/// before any task runs, and every task reads it from its [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A one-time build.
    Build,
    /// A continuous watch mode for development, with live reload.
    Watch,
}

/// Long running things started by tasks, kept alive after a run completes.
pub(crate) enum Service {
    #[cfg(feature = "server")]
    Http(std::thread::JoinHandle<anyhow::Result<()>>),
    #[cfg(feature = "live")]
    Watch(crate::engine::Watcher),
}

/// Global configuration and state available to all tasks.
///
/// One `Environment` lives for the whole process. It is shared by the initial
/// run and by every run triggered later by the file watcher.
pub struct Environment {
    /// The name of the generator.
    pub generator: &'static str,
    /// The current mode (Build or Watch).
    pub mode: Mode,
    /// The resolved project layout and settings.
    pub project: Project,
    /// External commands used by pipelines and linters.
    pub tools: Toolchain,
    pub(crate) tokens: RunTokens,
    pub(crate) reload: LiveReload,
    pub(crate) lints: LintCache,
    pub(crate) services: Mutex<Vec<Service>>,
}

impl Environment {
    pub fn new(project: Project, mode: Mode) -> std::io::Result<Self> {
        let reload = match mode {
            Mode::Build => LiveReload::disabled(),
            Mode::Watch => LiveReload::bind(project.config.server.reload_port)?,
        };

        Ok(Self {
            generator: "tsumiki",
            mode,
            tools: Toolchain::from_config(&project.config.tools),
            project,
            tokens: RunTokens::default(),
            reload,
            lints: LintCache::default(),
            services: Mutex::new(Vec::new()),
        })
    }

    /// Port of the live-reload server, only known in `Watch` mode.
    pub fn reload_port(&self) -> Option<u16> {
        self.reload.port()
    }

    /// Returns a JavaScript snippet that reloads the page on a live-reload
    /// notification, or `None` outside of watch mode.
    pub fn get_refresh_script(&self) -> Option<String> {
        self.reload_port().map(|port| {
            format!(
                r#"<script>
const socket = new WebSocket("ws://localhost:{port}");
socket.addEventListener("message", event => {{
    window.location.reload();
}});
</script>"#
            )
        })
    }

    /// Notify connected browsers that `path` changed. No-op unless the watch
    /// task has started the reload server.
    pub fn notify_changed(&self, path: &str) {
        if self.mode == Mode::Watch {
            self.reload.changed(path);
        }
    }

    pub(crate) fn add_service(&self, service: Service) {
        self.services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(service);
    }

    pub(crate) fn take_services(&self) -> Vec<Service> {
        std::mem::take(
            &mut *self
                .services
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("generator", &self.generator)
            .field("mode", &self.mode)
            .field("project", &self.project)
            .field("reload_port", &self.reload_port())
            .finish()
    }
}

/// The context passed to every task execution.
pub struct TaskContext<'a> {
    /// Access to global configuration and state.
    pub env: &'a Environment,
    /// Name of the running task.
    pub name: &'a str,
    /// Token identifying this run of the task.
    pub token: RunToken,
    /// Tracing span assigned to this task.
    pub(crate) span: tracing::Span,
}

impl TaskContext<'_> {
    pub fn project(&self) -> &Project {
        &self.env.project
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}
