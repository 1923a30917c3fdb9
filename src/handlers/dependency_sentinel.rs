//! Dependency sentinel
//!
//! Screens package installs (pip, npm, yarn, pnpm) issued through the shell
//! against a deny list of typosquatted and known-malicious package names.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::warn;

use super::{bash_command, shell_segments};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};

/// Deny list compiled into the binary
pub const BUILTIN_DENY_LIST: &str = include_str!("../../config/deny_list.txt");

static DENY_LIST: lazy_regex::Lazy<DenyList> =
    lazy_regex::Lazy::new(|| DenyList::parse(BUILTIN_DENY_LIST));

/// Package registry an install targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ecosystem {
    /// PyPI via pip
    Pip,
    /// npm registry via npm, yarn or pnpm
    Npm,
}

impl Ecosystem {
    /// Deny-list prefix and display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pip => "pip",
            Self::Npm => "npm",
        }
    }

    /// Canonical form of a package name in this ecosystem.
    #[must_use]
    pub fn normalize(self, name: &str) -> String {
        let name = name.trim().to_lowercase();
        match self {
            Self::Pip => name.replace(['_', '.'], "-"),
            Self::Npm => name,
        }
    }
}

/// Denied package names per ecosystem
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DenyList {
    entries: BTreeSet<(Ecosystem, String)>,
}

impl DenyList {
    /// Parse the line format: `#` comments, `pip:`/`npm:` scoped or bare
    /// names.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeSet::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (scopes, name): (&[Ecosystem], &str) = if let Some(name) = line.strip_prefix("pip:") {
                (&[Ecosystem::Pip][..], name)
            } else if let Some(name) = line.strip_prefix("npm:") {
                (&[Ecosystem::Npm][..], name)
            } else {
                (&[Ecosystem::Pip, Ecosystem::Npm][..], line)
            };
            for ecosystem in scopes {
                entries.insert((*ecosystem, ecosystem.normalize(name)));
            }
        }
        Self { entries }
    }

    /// Whether `name` is denied in `ecosystem`.
    #[must_use]
    pub fn denies(&self, ecosystem: Ecosystem, name: &str) -> bool {
        self.entries
            .contains(&(ecosystem, ecosystem.normalize(name)))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Options whose value is the next word, not a package.
const VALUE_OPTIONS: &[&str] = &[
    "-r",
    "--requirement",
    "-c",
    "--constraint",
    "-i",
    "--index-url",
    "--extra-index-url",
    "-t",
    "--target",
    "--prefix",
    "--registry",
    "--cache",
];

/// Package name from a pip requirement (`requests>=2.0`, `pkg[extra]`).
fn pip_name(spec: &str) -> &str {
    spec.split(['=', '<', '>', '!', '~', ';', '[', '@', ' '])
        .next()
        .unwrap_or(spec)
}

/// Package name from an npm spec (`lodash@4`, `@scope/pkg@1.0`).
fn npm_name(spec: &str) -> &str {
    let search_from = usize::from(spec.starts_with('@'));
    spec[search_from..]
        .find('@')
        .map_or(spec, |at| &spec[..search_from + at])
}

/// Packages a simple command installs, with their ecosystem.
fn installs(words: &[String]) -> Vec<(Ecosystem, String)> {
    let words: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .skip_while(|w| *w == "sudo")
        .collect();

    let (ecosystem, rest) = match words.as_slice() {
        ["pip" | "pip3", "install", rest @ ..]
        | ["python" | "python3", "-m", "pip" | "pip3", "install", rest @ ..] => {
            (Ecosystem::Pip, rest)
        }
        ["npm", "install" | "i" | "add", rest @ ..]
        | ["yarn", "add", rest @ ..]
        | ["pnpm", "add" | "install" | "i", rest @ ..] => (Ecosystem::Npm, rest),
        _ => return Vec::new(),
    };

    let mut packages = Vec::new();
    let mut iter = rest.iter();
    while let Some(word) = iter.next() {
        if VALUE_OPTIONS.contains(word) {
            iter.next();
            continue;
        }
        if word.starts_with('-') || (word.contains('/') && !word.starts_with('@')) {
            continue;
        }
        let name = match ecosystem {
            Ecosystem::Pip => pip_name(word),
            Ecosystem::Npm => npm_name(word),
        };
        if !name.is_empty() {
            packages.push((ecosystem, name.to_string()));
        }
    }
    packages
}

/// Denied packages installed anywhere in a command line.
#[must_use]
pub fn denied_installs(command: &str, deny_list: &DenyList) -> Vec<(Ecosystem, String)> {
    shell_segments(command)
        .iter()
        .flat_map(|words| installs(words))
        .filter(|(ecosystem, name)| deny_list.denies(*ecosystem, name))
        .collect()
}

/// Blocks installs of deny-listed packages
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencySentinel;

#[async_trait]
impl Hook for DependencySentinel {
    fn name(&self) -> &'static str {
        "dependency_sentinel"
    }

    async fn handle(&self, event: &Event, _context: &HookContext) -> Result<HookResult, HookError> {
        let Some(command) = bash_command(event) else {
            return Ok(HookResult::Continue);
        };

        let denied = denied_installs(command, &DENY_LIST);
        if denied.is_empty() {
            return Ok(HookResult::Continue);
        }

        let listed: Vec<String> = denied
            .iter()
            .map(|(ecosystem, name)| format!("{name} ({})", ecosystem.as_str()))
            .collect();
        warn!(packages = ?listed, "Blocked install of deny-listed packages");
        Ok(HookResult::Block {
            reason: format!(
                "Dependency Sentinel: {} on the deny list of typosquatted or malicious packages. Check the spelling against the official registry.",
                listed.join(", ")
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{bash_event, context, tool_event};
    use crate::hooks::EventType;
    use std::path::Path;

    async fn run(command: &str) -> HookResult {
        let root = Path::new("/repo");
        let (ctx, _) = context(root);
        DependencySentinel
            .handle(&bash_event(command, root), &ctx)
            .await
            .expect("handled")
    }

    #[test]
    fn test_builtin_deny_list_parses() {
        assert!(DENY_LIST.len() > 30);
        assert!(DENY_LIST.denies(Ecosystem::Pip, "Colourama"));
        assert!(!DENY_LIST.denies(Ecosystem::Npm, "colourama"));
        assert!(DENY_LIST.denies(Ecosystem::Npm, "cross-env.js"));
    }

    #[test]
    fn test_bare_names_apply_to_both_ecosystems() {
        let list = DenyList::parse("# comment\n\nevil_pkg\npip:only-pip\n");
        assert!(list.denies(Ecosystem::Pip, "evil-pkg"));
        assert!(list.denies(Ecosystem::Npm, "evil_pkg"));
        assert!(list.denies(Ecosystem::Pip, "Only_Pip"));
        assert!(!list.denies(Ecosystem::Npm, "only-pip"));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_package_names_drop_versions() {
        assert_eq!(pip_name("requests>=2.28.0"), "requests");
        assert_eq!(pip_name("uvicorn[standard]"), "uvicorn");
        assert_eq!(npm_name("lodash@4.17.21"), "lodash");
        assert_eq!(npm_name("@types/node@20"), "@types/node");
        assert_eq!(npm_name("@babel/core"), "@babel/core");
    }

    #[tokio::test]
    async fn test_safe_installs_pass() {
        for command in [
            "pip install requests",
            "pip install requests flask pytest",
            "pip install requests>=2.28.0",
            "pip3 install numpy",
            "python -m pip install pandas",
            "python3 -m pip install django",
            "pip install -r requirements.txt",
            "npm install express",
            "npm install react react-dom",
            "npm i lodash",
            "yarn add lodash",
            "pip list",
            "pip freeze",
            "npm test",
            "ls -la",
            "python3 app.py",
        ] {
            assert_eq!(run(command).await, HookResult::Continue, "{command}");
        }
    }

    #[tokio::test]
    async fn test_typosquats_are_blocked_by_name() {
        for (command, package) in [
            ("pip install colourama", "colourama"),
            ("pip install requsts", "requsts"),
            ("pip3 install numby", "numby"),
            ("python3 -m pip install djnago==4.2", "djnago"),
            ("pip install ctx", "ctx"),
            ("pip install distutils-precedence", "distutils-precedence"),
            ("pip install setup", "setup"),
            ("npm install crossenv", "crossenv"),
            ("npm i lodahs@4", "lodahs"),
            ("npm install kernel", "kernel"),
            ("yarn add crossenv", "crossenv"),
            ("pnpm add babelcli", "babelcli"),
        ] {
            let HookResult::Block { reason } = run(command).await else {
                panic!("expected block for {command}");
            };
            assert!(reason.contains(package), "{command}: {reason}");
            assert!(reason.starts_with("Dependency Sentinel"));
        }
    }

    #[tokio::test]
    async fn test_denied_package_in_mixed_or_chained_install() {
        let HookResult::Block { reason } = run("pip install requests colourama flask").await else {
            panic!("expected block");
        };
        assert!(reason.contains("colourama"));
        assert!(!reason.contains("requests"));

        assert!(matches!(
            run("cd app && npm ci && npm install expresss").await,
            HookResult::Block { .. }
        ));
    }

    #[tokio::test]
    async fn test_non_bash_tools_pass() {
        let root = Path::new("/repo");
        let (ctx, _) = context(root);
        let event = tool_event(EventType::BeforeTool, "Write", "setup.py", root);
        let result = DependencySentinel.handle(&event, &ctx).await.expect("handled");
        assert_eq!(result, HookResult::Continue);
    }
}
