//! Permission values and their implication rules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Properties every sandboxed application may read.
const SANDBOX_READABLE_PROPERTIES: &[&str] = &[
    "java.version",
    "java.vendor",
    "java.vendor.url",
    "java.class.version",
    "java.specification.version",
    "java.specification.vendor",
    "java.specification.name",
    "java.vm.*",
    "os.name",
    "os.version",
    "os.arch",
    "file.separator",
    "path.separator",
    "line.separator",
    "javaws.*",
    "jnlp.*",
    "javax.jnlp.*",
];

/// Extra runtime capabilities of the J2EE application-client level.
const J2EE_RUNTIME: &[&str] = &["accessClipboard", "queuePrintJob", "showWindowWithoutWarningBanner"];

/// A single grant. Names and hosts may carry wildcards: `*` alone matches
/// anything, `prefix.*` matches below a property prefix, `*.domain` matches
/// subdomains. Paths accept `<<ALL FILES>>`, `dir/-` (recursive) and
/// `dir/*` (direct children).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Permission {
    All,
    SocketConnect { host: String },
    PropertyRead { name: String },
    PropertyWrite { name: String },
    FileRead { path: String },
    FileWrite { path: String },
    Runtime { name: String },
}

impl Permission {
    pub fn connect(host: &str) -> Self {
        Self::SocketConnect {
            host: host.to_ascii_lowercase(),
        }
    }

    pub fn read_property(name: &str) -> Self {
        Self::PropertyRead {
            name: name.to_string(),
        }
    }

    pub fn read_file(path: &str) -> Self {
        Self::FileRead {
            path: path.to_string(),
        }
    }

    /// True when holding `self` grants `other`.
    pub fn implies(&self, other: &Permission) -> bool {
        use Permission::*;
        match (self, other) {
            (All, _) => true,
            (SocketConnect { host: g }, SocketConnect { host: r }) => host_matches(g, r),
            (PropertyRead { name: g }, PropertyRead { name: r })
            | (PropertyWrite { name: g }, PropertyWrite { name: r })
            | (Runtime { name: g }, Runtime { name: r }) => name_matches(g, r),
            (FileRead { path: g }, FileRead { path: r })
            | (FileWrite { path: g }, FileWrite { path: r })
            | (FileWrite { path: g }, FileRead { path: r }) => path_matches(g, r),
            _ => false,
        }
    }
}

fn name_matches(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }
    match granted.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => requested.starts_with(prefix),
        _ => false,
    }
}

fn host_matches(granted: &str, requested: &str) -> bool {
    let requested = requested.to_ascii_lowercase();
    if granted == "*" || granted == requested {
        return true;
    }
    match granted.strip_prefix("*.") {
        Some(domain) => requested.ends_with(&format!(".{}", domain)),
        None => false,
    }
}

fn path_matches(granted: &str, requested: &str) -> bool {
    if granted == "<<ALL FILES>>" || granted == requested {
        return true;
    }
    if let Some(dir) = granted.strip_suffix('-') {
        return dir.ends_with('/') && requested.starts_with(dir);
    }
    if let Some(dir) = granted.strip_suffix('*') {
        return dir.ends_with('/')
            && requested
                .strip_prefix(dir)
                .map_or(false, |rest| !rest.is_empty() && !rest.contains('/'));
    }
    false
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all permissions"),
            Self::SocketConnect { host } => write!(f, "connect to {}", host),
            Self::PropertyRead { name } => write!(f, "read property {}", name),
            Self::PropertyWrite { name } => write!(f, "write property {}", name),
            Self::FileRead { path } => write!(f, "read {}", path),
            Self::FileWrite { path } => write!(f, "write {}", path),
            Self::Runtime { name } => write!(f, "runtime {}", name),
        }
    }
}

/// An ordered collection of grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    perms: Vec<Permission>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed sandbox baseline: connect back to `origin_host` and read a
    /// short list of harmless properties. No file access.
    pub fn sandbox(origin_host: Option<&str>) -> Self {
        let mut set = Self::new();
        if let Some(host) = origin_host {
            set.push(Permission::connect(host));
        }
        for name in SANDBOX_READABLE_PROPERTIES {
            set.push(Permission::read_property(name));
        }
        set
    }

    /// Sandbox plus the J2EE application-client capabilities.
    pub fn j2ee(origin_host: Option<&str>) -> Self {
        let mut set = Self::sandbox(origin_host);
        for name in J2EE_RUNTIME {
            set.push(Permission::Runtime {
                name: name.to_string(),
            });
        }
        set
    }

    pub fn all() -> Self {
        Self {
            perms: vec![Permission::All],
        }
    }

    pub fn push(&mut self, perm: Permission) {
        if !self.perms.contains(&perm) {
            self.perms.push(perm);
        }
    }

    pub fn implies(&self, perm: &Permission) -> bool {
        self.perms.iter().any(|p| p.implies(perm))
    }

    pub fn is_all(&self) -> bool {
        self.perms.contains(&Permission::All)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.perms.iter()
    }

    pub fn len(&self) -> usize {
        self.perms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perms.is_empty()
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<T: IntoIterator<Item = Permission>>(&mut self, iter: T) {
        for p in iter {
            self.push(p);
        }
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_connects_only_to_origin() {
        let set = PermissionSet::sandbox(Some("apps.example.com"));
        assert!(set.implies(&Permission::connect("APPS.example.com")));
        assert!(!set.implies(&Permission::connect("evil.example.net")));
        assert!(set.implies(&Permission::read_property("java.vm.name")));
        assert!(!set.implies(&Permission::read_property("user.home")));
        assert!(!set.implies(&Permission::read_file("/etc/passwd")));
        assert!(!set.is_all());
    }

    #[test]
    fn wildcards() {
        assert!(Permission::connect("*.example.com").implies(&Permission::connect("a.example.com")));
        assert!(!Permission::connect("*.example.com").implies(&Permission::connect("example.com")));
        let tree = Permission::read_file("/opt/app/-");
        assert!(tree.implies(&Permission::read_file("/opt/app/lib/x.jar")));
        let dir = Permission::read_file("/opt/app/*");
        assert!(dir.implies(&Permission::read_file("/opt/app/x.jar")));
        assert!(!dir.implies(&Permission::read_file("/opt/app/lib/x.jar")));
        let write = Permission::FileWrite { path: "/tmp/-".into() };
        assert!(write.implies(&Permission::read_file("/tmp/a")));
        assert!(Permission::All.implies(&Permission::read_file("/etc/passwd")));
    }

    #[test]
    fn j2ee_extends_sandbox() {
        let set = PermissionSet::j2ee(None);
        assert!(set.implies(&Permission::Runtime { name: "accessClipboard".into() }));
        assert!(set.implies(&Permission::read_property("os.name")));
        assert!(!set.implies(&Permission::Runtime { name: "exitVM".into() }));
    }
}
