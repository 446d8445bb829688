//! Platform, privilege and tooling checks shared by every lab operation.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::LabError;

/// What the lab needs to know about the machine it runs on.
pub trait Host: Send + Sync {
    /// Operating system name, as in [`std::env::consts::OS`].
    fn os(&self) -> &str;

    fn is_root(&self) -> bool;

    /// Resolve `program` the way a shell would.
    fn find_program(&self, program: &str) -> Option<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn os(&self) -> &str {
        env::consts::OS
    }

    fn is_root(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    fn find_program(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }

        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Refuse to run `operation` unless the host is Linux, we are root, and every
/// program in `programs` is installed.
pub fn preflight(
    host: &dyn Host,
    operation: &'static str,
    programs: &[&str],
) -> Result<(), LabError> {
    if host.os() != "linux" {
        return Err(LabError::UnsupportedPlatform {
            operation,
            os: host.os().to_owned(),
        });
    }
    if !host.is_root() {
        return Err(LabError::NotRoot { operation });
    }
    for program in programs {
        if host.find_program(program).is_none() {
            return Err(LabError::MissingProgram {
                program: (*program).to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHost;

    #[test]
    fn test_preflight_rejects_other_platforms() {
        let host = FakeHost {
            os: "macos".into(),
            ..FakeHost::default()
        };
        let err = preflight(&host, "create", &["ip"]).unwrap_err();
        assert!(err.to_string().contains("only on linux"));
        assert!(err.to_string().contains("macos"));
    }

    #[test]
    fn test_preflight_requires_root() {
        let host = FakeHost {
            root: false,
            ..FakeHost::default()
        };
        let err = preflight(&host, "show", &["ip"]).unwrap_err();
        assert_eq!(err.to_string(), "lab show requires root privileges");
    }

    #[test]
    fn test_preflight_reports_missing_program() {
        let host = FakeHost::default().without_program("tc");
        let err = preflight(&host, "apply", &["ip", "tc"]).unwrap_err();
        assert_eq!(err.to_string(), r#"required command "tc" not found"#);
    }

    #[test]
    fn test_system_host_finds_sh() {
        assert!(SystemHost.find_program("sh").is_some());
        assert!(SystemHost.find_program("rtcemu-definitely-not-installed").is_none());
    }
}
