use lambdahouse_core::{ConfigTree, LambdahouseError, Result};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Used when no users file is configured: one passwordless `default` user
/// reachable from anywhere.
pub const MINIMAL_USERS_CONFIG: &str = r#"<clickhouse>
    <profiles>
        <default></default>
    </profiles>
    <users>
        <default>
            <password></password>
            <networks>
                <ip>::/0</ip>
            </networks>
            <profile>default</profile>
            <quota>default</quota>
        </default>
    </users>
    <quotas>
        <default></default>
    </quotas>
</clickhouse>
"#;

#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub allow_no_password: bool,
    pub allow_plaintext_password: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            allow_no_password: true,
            allow_plaintext_password: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    password: String,
    pub networks: Vec<String>,
    pub profile: String,
}

impl User {
    pub fn auth_type(&self) -> &'static str {
        if self.password.is_empty() {
            "no_password"
        } else {
            "plaintext_password"
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: BTreeMap<String, User>,
    profiles: BTreeMap<String, Vec<(String, String)>>,
}

impl UserDirectory {
    /// Users file named by the configuration, or the built-in minimal set.
    pub fn load(config: &ConfigTree, policy: PasswordPolicy) -> Result<Self> {
        match users_file(config) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading users");
                Self::from_tree(&ConfigTree::load(&path)?, policy)
            }
            None => Self::from_tree(&ConfigTree::parse_xml(MINIMAL_USERS_CONFIG)?, policy),
        }
    }

    pub fn from_tree(tree: &ConfigTree, policy: PasswordPolicy) -> Result<Self> {
        let mut profiles = BTreeMap::new();
        for profile in tree.children("profiles") {
            let prefix = format!("profiles.{profile}");
            let settings: Vec<(String, String)> = tree
                .children(&prefix)
                .into_iter()
                .filter_map(|name| {
                    tree.get(&format!("{prefix}.{name}"))
                        .map(|value| (name.clone(), value.to_string()))
                })
                .collect();
            profiles.insert(profile, settings);
        }

        let mut users = BTreeMap::new();
        for name in tree.children("users") {
            let prefix = format!("users.{name}");
            for unsupported in ["password_sha256_hex", "password_double_sha1_hex", "ldap", "kerberos"] {
                if tree.has(&format!("{prefix}.{unsupported}")) {
                    return Err(LambdahouseError::NotImplemented(format!(
                        "Authentication type {unsupported} of user {name} is not supported"
                    )));
                }
            }
            let password = tree.get_string(&format!("{prefix}.password"), "");
            if password.is_empty() && !policy.allow_no_password {
                return Err(LambdahouseError::Authentication(
                    "Authentication type no_password is disabled in server configuration".to_string(),
                ));
            }
            if !password.is_empty() && !policy.allow_plaintext_password {
                return Err(LambdahouseError::Authentication(
                    "Authentication type plaintext_password is disabled in server configuration"
                        .to_string(),
                ));
            }
            let profile = tree.get_string(&format!("{prefix}.profile"), "default");
            if !profiles.contains_key(&profile) {
                return Err(LambdahouseError::CannotLoadConfig(format!(
                    "Profile {profile} of user {name} is not defined"
                )));
            }
            let user = User {
                name: name.clone(),
                password,
                networks: tree.repeated(&format!("{prefix}.networks"), "ip"),
                profile,
            };
            users.insert(name, user);
        }

        Ok(Self { users, profiles })
    }

    pub fn login(&self, name: &str, password: &str, address: IpAddr) -> Result<&User> {
        let denied = || {
            LambdahouseError::Authentication(format!(
                "{name}: Authentication failed: password is incorrect, or there is no user with such name."
            ))
        };
        let user = self.users.get(name).ok_or_else(denied)?;
        if user.password != password {
            return Err(denied());
        }
        if !user.networks.iter().any(|net| network_contains(net, address)) {
            return Err(LambdahouseError::Authentication(format!(
                "{name}: Authentication failed: connections from {address} are not allowed"
            )));
        }
        Ok(user)
    }

    pub fn profile_settings(&self, profile: &str) -> &[(String, String)] {
        self.profiles.get(profile).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}

fn users_file(config: &ConfigTree) -> Option<PathBuf> {
    // Only a loaded configuration file may point at a users file.
    let source = config.source()?;
    let name = config
        .get("users_config")
        .or_else(|| config.get("user_directories.users_xml.path"))
        .filter(|p| !p.is_empty())?;
    let path = Path::new(name);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    Some(source.parent().unwrap_or(Path::new(".")).join(path))
}

/// Matches an address against `addr` or `addr/prefix`. Loopback addresses of
/// either family match each other.
pub fn network_contains(network: &str, address: IpAddr) -> bool {
    let (base, prefix) = match network.split_once('/') {
        Some((base, prefix)) => match prefix.trim().parse::<u32>() {
            Ok(prefix) => (base.trim(), Some(prefix)),
            Err(_) => return false,
        },
        None => (network.trim(), None),
    };
    let Ok(base) = base.parse::<IpAddr>() else {
        return false;
    };
    if prefix == Some(0) {
        return true;
    }
    if prefix.is_none() && base.is_loopback() && address.is_loopback() {
        return true;
    }

    let widen = |ip: IpAddr| match ip {
        IpAddr::V4(v4) => (u128::from(v4.to_ipv6_mapped()), 96),
        IpAddr::V6(v6) => (u128::from(v6), 0),
    };
    let (net_bits, offset) = widen(base);
    let (addr_bits, _) = widen(address);
    let prefix = (prefix.unwrap_or(128 - offset) + offset).min(128);
    let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
    net_bits & mask == addr_bits & mask
}
