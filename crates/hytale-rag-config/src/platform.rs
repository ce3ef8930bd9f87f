//! Platform detection: OS family, elevation status and external command lookup.
//!
//! The probe runs once per invocation and the resulting [`Platform`] value is
//! passed to every component that has OS-dependent behavior. Tests construct
//! a [`Platform`] directly to exercise other operating systems.

use std::collections::BTreeSet;
use std::fmt;
use std::process::{Command, Stdio};

/// Commands whose presence is recorded by [`Platform::detect`].
pub const PROBED_COMMANDS: &[&str] = &[
    "node",
    "npm",
    "npx",
    "ollama",
    "curl",
    "brew",
    "winget",
    "powershell",
    "bash",
];

/// Supported operating system families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsFamily {
    /// Linux and other POSIX systems following the XDG layout.
    Linux,
    /// macOS.
    MacOS,
    /// Windows.
    Windows,
}

impl OsFamily {
    /// All families, in display order.
    pub const ALL: [OsFamily; 3] = [OsFamily::Linux, OsFamily::MacOS, OsFamily::Windows];

    /// Detect the family of the running host.
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            OsFamily::MacOS
        }

        #[cfg(target_os = "windows")]
        {
            OsFamily::Windows
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            OsFamily::Linux
        }
    }

    /// Get the display name for this family.
    pub fn name(&self) -> &'static str {
        match self {
            OsFamily::Linux => "Linux",
            OsFamily::MacOS => "macOS",
            OsFamily::Windows => "Windows",
        }
    }

    /// Whether this is Windows.
    pub fn is_windows(&self) -> bool {
        matches!(self, OsFamily::Windows)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Snapshot of the host environment.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Operating system family.
    pub os: OsFamily,
    /// Whether the process runs with administrator/root privileges.
    pub elevated: bool,
    available: BTreeSet<String>,
}

impl Platform {
    /// Create a platform value without probing anything.
    pub fn new(os: OsFamily, elevated: bool) -> Self {
        Self {
            os,
            elevated,
            available: BTreeSet::new(),
        }
    }

    /// Record commands as present on `PATH`.
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Probe the running host.
    pub fn detect() -> Self {
        let os = OsFamily::current();
        let elevated = detect_elevation(os);
        let available: BTreeSet<String> = PROBED_COMMANDS
            .iter()
            .filter(|cmd| command_exists(os, cmd))
            .map(|cmd| cmd.to_string())
            .collect();

        tracing::debug!(%os, elevated, commands = ?available, "probed platform");

        Self {
            os,
            elevated,
            available,
        }
    }

    /// Whether `command` was found during the probe.
    pub fn has_command(&self, command: &str) -> bool {
        self.available.contains(command)
    }

    /// Return the subset of `commands` that were not found.
    pub fn missing<'a>(&self, commands: &[&'a str]) -> Vec<&'a str> {
        commands
            .iter()
            .copied()
            .filter(|cmd| !self.has_command(cmd))
            .collect()
    }
}

/// Check whether `program` resolves on `PATH` right now.
///
/// Uses `which` on POSIX systems and `where` on Windows.
pub fn command_exists(os: OsFamily, program: &str) -> bool {
    let locator = if os.is_windows() { "where" } else { "which" };
    Command::new(locator)
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn detect_elevation(os: OsFamily) -> bool {
    match os {
        // `net session` only succeeds from an elevated prompt.
        OsFamily::Windows => Command::new("net")
            .arg("session")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false),
        OsFamily::Linux | OsFamily::MacOS => Command::new("id")
            .arg("-u")
            .output()
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "0")
            .unwrap_or(false),
    }
}
