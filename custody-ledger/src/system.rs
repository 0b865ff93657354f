//! Host snapshot recorded at session open

use serde::{Deserialize, Serialize};

/// Collection host details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemInfo {
    /// Host name
    pub hostname: String,

    /// Operating system ("linux", "windows", "macos")
    pub os: String,

    /// OS family ("unix", "windows")
    pub os_family: String,

    /// CPU architecture
    pub arch: String,

    /// Collector process id
    pub pid: u32,
}

impl SystemInfo {
    /// Capture details of the current host
    pub fn capture() -> Self {
        Self {
            hostname: hostname(),
            os: std::env::consts::OS.to_string(),
            os_family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            pid: std::process::id(),
        }
    }
}

/// Host name as reported by the OS
pub fn hostname() -> String {
    ::hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Name of the user running this process, from the login environment
pub fn current_operator() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_fills_fields() {
        let info = SystemInfo::capture();
        assert!(!info.hostname.is_empty());
        assert_eq!(info.hostname, hostname());
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn test_hostname_ignores_environment() {
        std::env::set_var("HOSTNAME", "spoofed-by-env");
        let name = hostname();
        std::env::remove_var("HOSTNAME");

        let os_name = ::hostname::get().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, os_name);
    }

    #[test]
    fn test_operator_never_empty() {
        assert!(!current_operator().is_empty());
    }
}
