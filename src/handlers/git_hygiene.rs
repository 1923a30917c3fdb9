//! Git hygiene enforcer
//!
//! Gates `git` in shell commands: no pushes to protected branches, no
//! force pushes, no commits whose staged changes carry secrets. Commit
//! messages outside the Conventional Commits format draw a warning.

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::path::Path;
use tracing::{debug, warn};

use super::pii_redactor::detect_secrets;
use super::{bash_command, shell_segments};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};

/// Branches nobody pushes to directly
const PROTECTED_BRANCHES: &[&str] = &["main", "master"];

/// Gates git pushes and commits issued through the shell
#[derive(Debug, Default, Clone, Copy)]
pub struct GitHygieneEnforcer;

/// A `git` invocation reduced to its subcommand and arguments.
#[derive(Debug, PartialEq, Eq)]
struct GitCall<'a> {
    subcommand: &'a str,
    args: &'a [String],
}

fn git_call(words: &[String]) -> Option<GitCall<'_>> {
    let start = words.iter().position(|w| w == "git")?;
    // Only `git` in command position: plain, after env assignments or sudo.
    if !words[..start]
        .iter()
        .all(|w| w == "sudo" || (w.contains('=') && !w.starts_with('-')))
    {
        return None;
    }

    let mut i = start + 1;
    while let Some(word) = words.get(i) {
        match word.as_str() {
            "-C" | "-c" | "--git-dir" | "--work-tree" => i += 2,
            w if w.starts_with('-') => i += 1,
            subcommand => {
                return Some(GitCall {
                    subcommand,
                    args: &words[i + 1..],
                })
            }
        }
    }
    None
}

fn is_force_flag(arg: &str) -> bool {
    arg == "--force"
        || arg == "-f"
        || arg.starts_with("--force-with-lease")
        || arg.starts_with("--force-if-includes")
        || (arg.starts_with('-') && !arg.starts_with("--") && arg.contains('f'))
}

/// Protected branch named by a push refspec (`main`, `HEAD:main`,
/// `+feature:refs/heads/master`).
fn protected_target(refspec: &str) -> Option<&'static str> {
    let target = refspec.rsplit(':').next().unwrap_or(refspec);
    let target = target.trim_start_matches('+');
    let target = target.strip_prefix("refs/heads/").unwrap_or(target);
    PROTECTED_BRANCHES.iter().copied().find(|b| *b == target)
}

fn check_push(args: &[String]) -> Option<String> {
    if args.iter().any(|a| is_force_flag(a))
        || args.iter().any(|a| a.starts_with('+') && a.len() > 1)
    {
        return Some(
            "Force push is blocked: it rewrites shared history. Push a new commit or open a pull request instead."
                .to_string(),
        );
    }

    // First positional is the remote; every later one is a refspec.
    let branch = args
        .iter()
        .filter(|a| !a.starts_with('-'))
        .skip(1)
        .find_map(|refspec| protected_target(refspec))?;
    Some(format!(
        "Direct push to protected branch '{branch}' is blocked. Push a feature branch and open a pull request."
    ))
}

/// Message passed with `-m`/`--message`, first one only.
fn commit_message(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-m" || arg == "--message" {
            return iter.next().map(String::as_str);
        }
        if let Some(message) = arg.strip_prefix("--message=") {
            return Some(message);
        }
        if let Some(message) = arg.strip_prefix("-m").filter(|m| !m.is_empty()) {
            return Some(message);
        }
    }
    None
}

/// Whether the subject line follows Conventional Commits (`type(scope)!: subject`).
#[must_use]
pub fn is_conventional(message: &str) -> bool {
    static RE_CONVENTIONAL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
        r"^(?:feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(?:\([^)\s]+\))?!?: \S"
    );
    let subject = message.lines().next().unwrap_or("");
    RE_CONVENTIONAL.is_match(subject) || subject.starts_with("Merge ")
}

/// Kinds of secrets on lines added by a unified diff.
#[must_use]
pub fn staged_secrets(diff: &str) -> Vec<&'static str> {
    let added: String = diff
        .lines()
        .filter(|line| !line.starts_with("+++"))
        .filter_map(|line| line.strip_prefix('+'))
        .collect::<Vec<_>>()
        .join("\n");
    detect_secrets(&added)
}

async fn staged_diff(working_dir: &Path) -> String {
    let output = tokio::process::Command::new("git")
        .args(["diff", "--cached", "--no-color"])
        .current_dir(working_dir)
        .kill_on_drop(true)
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout).into_owned(),
        Ok(output) => {
            debug!(status = %output.status, "git diff --cached failed; skipping secret scan");
            String::new()
        }
        Err(err) => {
            debug!(error = %err, "git unavailable; skipping secret scan");
            String::new()
        }
    }
}

#[async_trait]
impl Hook for GitHygieneEnforcer {
    fn name(&self) -> &'static str {
        "git_hygiene_enforcer"
    }

    async fn handle(&self, event: &Event, _context: &HookContext) -> Result<HookResult, HookError> {
        let Some(command) = bash_command(event) else {
            return Ok(HookResult::Continue);
        };

        let segments = shell_segments(command);
        let mut denials = Vec::new();
        let mut warnings = Vec::new();
        let mut commits = false;

        for words in &segments {
            let Some(call) = git_call(words) else {
                continue;
            };
            match call.subcommand {
                "push" => denials.extend(check_push(call.args)),
                "commit" => {
                    commits = true;
                    if let Some(message) = commit_message(call.args) {
                        if !is_conventional(message) {
                            warnings.push(format!(
                                "Commit message \"{}\" does not follow the conventional commit format (type(scope): subject, e.g. \"fix(auth): handle expired tokens\").",
                                message.lines().next().unwrap_or("")
                            ));
                        }
                    }
                }
                _ => {}
            }
        }

        if commits {
            let found = staged_secrets(&staged_diff(&event.working_dir).await);
            if !found.is_empty() {
                warn!(kinds = ?found, "Staged changes contain secrets");
                denials.push(format!(
                    "Commit blocked: staged changes contain secret material ({}). Remove it and rotate the credential.",
                    found.join(", ")
                ));
            }
        }

        if !denials.is_empty() {
            return Ok(HookResult::Block {
                reason: denials.join("\n"),
            });
        }
        if warnings.is_empty() {
            Ok(HookResult::Continue)
        } else {
            Ok(HookResult::Allow {
                reason: Some(warnings.join("\n")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{bash_event, context, tool_event};
    use crate::hooks::EventType;

    async fn run_in(command: &str, root: &Path) -> HookResult {
        let (ctx, _) = context(root);
        GitHygieneEnforcer
            .handle(&bash_event(command, root), &ctx)
            .await
            .expect("handled")
    }

    async fn run(command: &str) -> HookResult {
        let dir = tempfile::tempdir().expect("tempdir");
        run_in(command, dir.path()).await
    }

    fn block_reason(result: HookResult) -> String {
        match result {
            HookResult::Block { reason } => reason,
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_to_protected_branch_is_blocked() {
        for (command, branch) in [
            ("git push origin main", "main"),
            ("git push origin master", "master"),
            ("git push origin HEAD:main", "main"),
            ("git push -u origin feature:refs/heads/master", "master"),
        ] {
            let reason = block_reason(run(command).await);
            assert!(reason.contains(branch), "{command}: {reason}");
        }
    }

    #[tokio::test]
    async fn test_force_push_is_blocked() {
        for command in [
            "git push --force origin feature",
            "git push -f origin feature",
            "git push --force-with-lease origin feature",
            "git push origin +feature",
        ] {
            let reason = block_reason(run(command).await);
            assert!(reason.to_lowercase().contains("force"), "{command}");
        }
    }

    #[tokio::test]
    async fn test_ordinary_git_and_other_commands_pass() {
        for command in [
            "git push origin feature/auth",
            "git push origin develop",
            "git push",
            "git status",
            "git log --oneline -5",
            "git branch -a",
            "git diff HEAD",
            "git pull origin main",
            "ls -la",
            "echo 'git push origin main'",
        ] {
            assert_eq!(run(command).await, HookResult::Continue, "{command}");
        }
    }

    #[tokio::test]
    async fn test_chained_and_piped_commands_are_checked() {
        for command in [
            "git add . && git push origin main",
            "cargo test; git push --force origin x",
            "echo done | git push origin master",
            "cd repo && sudo git push origin main",
        ] {
            assert!(matches!(run(command).await, HookResult::Block { .. }), "{command}");
        }
    }

    #[tokio::test]
    async fn test_non_conventional_commit_warns_without_blocking() {
        let result = run(r#"git commit -m "updated stuff""#).await;
        let HookResult::Allow { reason: Some(reason) } = result else {
            panic!("expected advisory allow, got {result:?}");
        };
        assert!(reason.contains("conventional"));
        assert!(reason.contains("updated stuff"));

        for command in [
            r#"git commit -m "feat: add login""#,
            r#"git commit -m "fix(auth): handle expired tokens""#,
            r#"git commit -m "feat(api)!: drop v1 endpoints""#,
            "git commit --message='docs: update readme'",
            "git commit --amend --no-edit",
        ] {
            assert_eq!(run(command).await, HookResult::Continue, "{command}");
        }
    }

    #[tokio::test]
    async fn test_non_bash_tools_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (ctx, _) = context(dir.path());
        let event = tool_event(EventType::BeforeTool, "Write", "README.md", dir.path());
        let result = GitHygieneEnforcer.handle(&event, &ctx).await.expect("handled");
        assert_eq!(result, HookResult::Continue);
    }

    #[test]
    fn test_staged_secrets_only_count_added_lines() {
        let diff = "diff --git a/config.py b/config.py\n\
                    --- a/config.py\n\
                    +++ b/config.py\n\
                    -OLD_KEY = 'AKIA0000000000000000'\n\
                    +API_KEY = 'AKIA1234567890ABCDEF'\n\
                    +name = 'demo'\n";
        assert_eq!(staged_secrets(diff), vec!["AWS access key"]);
        assert!(staged_secrets("-AKIA1234567890ABCDEF\n+clean\n").is_empty());
    }

    #[tokio::test]
    async fn test_commit_with_staged_secret_is_blocked() {
        let git_available = std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if !git_available {
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let git = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .expect("run git")
        };
        git(&["init", "-q"]);
        std::fs::write(
            dir.path().join("config.py"),
            "AWS_KEY = 'AKIA1234567890ABCDEF'\n",
        )
        .expect("write fixture");
        git(&["add", "config.py"]);

        let reason = block_reason(run_in(r#"git commit -m "feat: add config""#, dir.path()).await);
        assert!(reason.contains("secret"));
        assert!(reason.contains("AWS access key"));
    }

    #[tokio::test]
    async fn test_commit_outside_a_repository_is_not_blocked() {
        assert_eq!(
            run(r#"git commit -m "chore: bump deps""#).await,
            HookResult::Continue
        );
    }
}
