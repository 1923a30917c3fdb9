//! Sandbox boundary guard
//!
//! Keeps file tools inside the session's working directory and away from
//! credential files, and screens shell commands for the same targets.

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::path::Path;

use super::bash_command;
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths;

/// Locations outside the project that tools may still touch
const ALLOWED_OUTSIDE: &[&str] = &["/tmp", "/var/tmp", "/dev/null"];

/// Denies file access outside the project or to credential files
#[derive(Debug, Default, Clone, Copy)]
pub struct SandboxBoundaryGuard;

/// Whether the file name marks a credential store.
#[must_use]
pub fn is_credential_file(path: &Path) -> bool {
    static RE_CREDENTIAL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
        r"^(?:\.env(?:\..+)?|.+\.pem|.+\.key|.+\.p12|.+\.pfx|\.npmrc|\.pypirc|\.netrc|\.htpasswd|\.git-credentials|credentials\.(?:json|ya?ml)|service-account.*\.json)$"
    );
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| RE_CREDENTIAL.is_match(name))
}

fn check_file(event: &Event, raw: &str) -> HookResult {
    if paths::is_home_relative(raw) {
        return HookResult::Block {
            reason: format!(
                "Access to {raw} is blocked: home directory paths are outside the project directory {}.",
                event.working_dir.display()
            ),
        };
    }

    let path = paths::resolve(&event.working_dir, raw);

    if is_credential_file(&path) {
        return HookResult::Block {
            reason: format!(
                "Access to {raw} is blocked: it looks like a credentials or secrets file."
            ),
        };
    }

    let inside = paths::is_within(&path, &event.working_dir)
        || ALLOWED_OUTSIDE
            .iter()
            .any(|root| paths::is_within(&path, Path::new(root)));
    if inside {
        HookResult::Continue
    } else {
        HookResult::Block {
            reason: format!(
                "Access to {} is blocked: it is outside the project directory {}.",
                path.display(),
                event.working_dir.display()
            ),
        }
    }
}

fn check_command(command: &str) -> HookResult {
    static RE_HOME_DOTFILE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
        r"(?:~|\$HOME|\$\{HOME\})/\.(?:ssh|gnupg|config|bashrc|bash_profile|zshrc|profile|aws|kube|docker)\b"
    );
    static RE_SYSTEM_FILE: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"/etc/(?:passwd|shadow|hosts|sudoers)\b");
    static RE_SECRET_FILE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
        r"(?:^|[\s/'\x22=])(?:\.env\b|[\w.-]*\.(?:pem|key|p12|pfx)\b|\.npmrc\b|\.pypirc\b|\.netrc\b|\.htpasswd\b|\.git-credentials\b|credentials\.(?:json|ya?ml)\b|service-account)"
    );
    static RE_WIPE_ROOT: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"\brm\s+(?:-[a-zA-Z]*\s+)*-[a-zA-Z]*[rR][a-zA-Z]*\s+(?:-[a-zA-Z]+\s+)*/(?:\s|\*|$)");

    let reason = if RE_WIPE_ROOT.is_match(command) {
        "the command would recursively delete the filesystem root"
    } else if RE_HOME_DOTFILE.is_match(command) {
        "the command touches private configuration in the home directory"
    } else if RE_SYSTEM_FILE.is_match(command) {
        "the command touches system account or host files"
    } else if RE_SECRET_FILE.is_match(command) {
        "the command references a credentials or secrets file"
    } else {
        return HookResult::Continue;
    };

    HookResult::Block {
        reason: format!("Command blocked: {reason}."),
    }
}

#[async_trait]
impl Hook for SandboxBoundaryGuard {
    fn name(&self) -> &'static str {
        "sandbox_boundary_guard"
    }

    async fn handle(&self, event: &Event, _context: &HookContext) -> Result<HookResult, HookError> {
        if event.tool_name.as_deref() == Some("Bash") {
            return Ok(check_command(bash_command(event).unwrap_or("")));
        }

        Ok(event
            .file_path()
            .map_or(HookResult::Continue, |raw| check_file(event, raw)))
    }
}
