//! Rendered SSH client configuration
//!
//! One config file per session, binding the ephemeral private key to the
//! jump pod's observed address. The `jumper` host entry tunnels through the
//! local port-forward via ProxyCommand; every other destination rides it as
//! a ProxyJump hop. The ProxyCommand line is the one place a string-form
//! command is unavoidable, because the SSH config format requires one.

use std::io;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "jumper.config";

/// Values bound into the rendered configuration.
#[derive(Debug, Clone)]
pub struct ConfigValues {
    /// Ephemeral private key path
    pub identity_file: PathBuf,
    /// Jump pod's assigned address
    pub host_name: String,
    /// Local port the relay listens on
    pub relay_port: u16,
    /// Username for the final target host
    pub login_user: String,
    /// SSH port on the final target host
    pub target_port: u16,
}

/// Render the client configuration text.
pub fn render(v: &ConfigValues) -> String {
    let identity = v.identity_file.display();
    format!(
        "# Generated by kjump for a single session. Not meant for reuse.\n\
         Host jumper\n\
         \tHostName {host}\n\
         \tUser root\n\
         \tPort 22\n\
         \tIdentityFile {identity}\n\
         \tStrictHostKeyChecking no\n\
         \tUserKnownHostsFile /dev/null\n\
         \tProxyCommand ssh -q -W %h:%p -p {relay} -i {identity} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null root@127.0.0.1\n\
         \n\
         Host !jumper *\n\
         \tUser {user}\n\
         \tPort {port}\n\
         \tProxyJump jumper\n\
         \tStrictHostKeyChecking no\n\
         \tUserKnownHostsFile /dev/null\n",
        host = v.host_name,
        identity = identity,
        relay = v.relay_port,
        user = v.login_user,
        port = v.target_port,
    )
}

/// Render and write `jumper.config` into the session directory.
pub fn write(dir: &Path, values: &ConfigValues) -> io::Result<PathBuf> {
    let path = dir.join(CONFIG_FILE);
    std::fs::write(&path, render(values))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> ConfigValues {
        ConfigValues {
            identity_file: PathBuf::from("/tmp/kjump/id_rsa"),
            host_name: "10.42.0.17".to_string(),
            relay_port: 2222,
            login_user: "admin".to_string(),
            target_port: 22,
        }
    }

    #[test]
    fn binds_identity_and_address() {
        let cfg = render(&values());
        assert!(cfg.contains("HostName 10.42.0.17"));
        assert!(cfg.contains("IdentityFile /tmp/kjump/id_rsa"));
        assert!(cfg.contains("-p 2222"));
        assert!(cfg.contains("User admin"));
    }

    #[test]
    fn targets_hop_through_the_jumper_entry() {
        let cfg = render(&values());
        assert!(cfg.contains("Host !jumper *"));
        assert!(cfg.contains("ProxyJump jumper"));
        assert!(cfg.contains("ProxyCommand ssh -q -W %h:%p"));
    }

    #[test]
    fn writes_into_session_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), &values()).unwrap();
        assert!(path.ends_with("jumper.config"));
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("10.42.0.17"));
    }
}
