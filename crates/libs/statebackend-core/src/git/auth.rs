//! Authentication discovery for outbound Git operations (component C3).
//!
//! Mirrors the original implementation's approach of reading credentials
//! straight out of the process environment at clone/fetch/push time rather
//! than threading them through request parameters: the backend is trusted
//! with one set of repository credentials for its whole lifetime.

use git2::{Cred, RemoteCallbacks};
use std::env;

const ENV_GIT_USERNAME: &str = "GIT_USERNAME";
const ENV_GIT_TOKEN: &str = "GIT_TOKEN";
const ENV_GIT_PASSWORD: &str = "GIT_PASSWORD";
const ENV_SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";
const ENV_SSH_PRIVATE_KEY: &str = "SSH_PRIVATE_KEY";
const ENV_SSH_PRIVATE_KEY_PASSPHRASE: &str = "SSH_PRIVATE_KEY_PASSPHRASE";
const ENV_STRICT_HOST_KEY_CHECKING: &str = "GIT_STRICT_HOST_KEY_CHECKING";
const DEFAULT_SSH_KEY_NAME: &str = "id_rsa";

/// Resolved credential strategy for one remote.
#[derive(Debug, Clone)]
pub enum GitAuth {
    /// HTTP(S) basic auth: username plus a token or password.
    HttpBasic { username: String, password: String },
    /// SSH key pair loaded from disk.
    SshKey {
        path: std::path::PathBuf,
        passphrase: Option<String>,
    },
    /// Let `libssh2` negotiate against `ssh-agent`.
    SshAgent,
    /// No credentials configured; only works against anonymous remotes.
    Anonymous,
}

/// Picks a credential strategy for `repository_url` from the process
/// environment. HTTP(S) remotes prefer `GIT_USERNAME`/`GIT_TOKEN` (falling
/// back to `GIT_PASSWORD`); everything else is assumed to be SSH and prefers
/// an available agent, then an explicit key path, then `~/.ssh/id_rsa`.
pub fn discover_auth(repository_url: &str) -> GitAuth {
    if repository_url.starts_with("http://") || repository_url.starts_with("https://") {
        if let Ok(username) = env::var(ENV_GIT_USERNAME) {
            if let Ok(password) = env::var(ENV_GIT_TOKEN).or_else(|_| env::var(ENV_GIT_PASSWORD)) {
                return GitAuth::HttpBasic { username, password };
            }
        }
        return GitAuth::Anonymous;
    }

    // If an agent socket is configured, nothing else needs to be discovered.
    if env::var(ENV_SSH_AUTH_SOCK).is_ok() {
        return GitAuth::SshAgent;
    }

    let passphrase = env::var(ENV_SSH_PRIVATE_KEY_PASSPHRASE).ok();
    if let Ok(path) = env::var(ENV_SSH_PRIVATE_KEY) {
        return GitAuth::SshKey {
            path: path.into(),
            passphrase,
        };
    }

    if let Some(mut home) = home_dir() {
        home.push(".ssh");
        home.push(DEFAULT_SSH_KEY_NAME);
        return GitAuth::SshKey {
            path: home,
            passphrase,
        };
    }

    GitAuth::SshAgent
}

fn home_dir() -> Option<std::path::PathBuf> {
    env::var_os("HOME").map(std::path::PathBuf::from)
}

/// Whether host-key verification should be skipped for this process.
///
/// Preserved quirk from the original: setting the opt-out variable to the
/// literal string `"no"` disables checking. Any other value, including
/// unset, keeps checking enabled.
pub fn strict_host_key_checking_disabled() -> bool {
    env::var(ENV_STRICT_HOST_KEY_CHECKING)
        .map(|v| v.eq_ignore_ascii_case("no"))
        .unwrap_or(false)
}

/// Builds the `git2` callback set used for every remote operation
/// (clone/fetch/push) against one session's remote.
pub fn build_callbacks(auth: GitAuth) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();

    callbacks.credentials(move |_url, username_from_url, allowed| {
        match &auth {
            GitAuth::HttpBasic { username, password } => {
                Cred::userpass_plaintext(username, password)
            }
            GitAuth::SshKey { path, passphrase } => {
                let username = username_from_url.unwrap_or("git");
                Cred::ssh_key(username, None, path, passphrase.as_deref())
            }
            GitAuth::SshAgent => {
                let username = username_from_url.unwrap_or("git");
                Cred::ssh_key_from_agent(username)
            }
            GitAuth::Anonymous => {
                if allowed.is_username() {
                    Cred::username(username_from_url.unwrap_or("git"))
                } else {
                    Cred::default()
                }
            }
        }
    });

    if strict_host_key_checking_disabled() {
        callbacks.certificate_check(|_cert, _host| Ok(git2::CertificateCheckStatus::CertificateOk));
    }

    callbacks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_without_credentials_is_anonymous() {
        // SAFETY: test-only env mutation, single-threaded per test harness process.
        unsafe {
            std::env::remove_var(ENV_GIT_USERNAME);
        }
        match discover_auth("https://example.com/repo.git") {
            GitAuth::Anonymous => {}
            other => panic!("expected anonymous, got {other:?}"),
        }
    }

    #[test]
    fn ssh_agent_socket_is_preferred_over_key_path() {
        // SAFETY: test-only env mutation, single-threaded per test harness process.
        unsafe {
            std::env::set_var(ENV_SSH_AUTH_SOCK, "/tmp/agent.sock");
            std::env::set_var(ENV_SSH_PRIVATE_KEY, "/some/key");
        }
        let result = discover_auth("git@example.com:org/repo.git");
        unsafe {
            std::env::remove_var(ENV_SSH_AUTH_SOCK);
            std::env::remove_var(ENV_SSH_PRIVATE_KEY);
        }
        match result {
            GitAuth::SshAgent => {}
            other => panic!("expected ssh agent, got {other:?}"),
        }
    }

    #[test]
    fn ssh_without_agent_or_key_path_falls_back_to_default_key() {
        // SAFETY: test-only env mutation, single-threaded per test harness process.
        unsafe {
            std::env::remove_var(ENV_SSH_AUTH_SOCK);
            std::env::remove_var(ENV_SSH_PRIVATE_KEY);
            std::env::set_var("HOME", "/home/tester");
        }
        match discover_auth("git@example.com:org/repo.git") {
            GitAuth::SshKey { path, .. } => {
                assert_eq!(path, std::path::PathBuf::from("/home/tester/.ssh/id_rsa"));
            }
            other => panic!("expected default ssh key path, got {other:?}"),
        }
    }
}
