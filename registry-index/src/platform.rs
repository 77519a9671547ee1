//! Architecture / operating-system tags for pushes and queries.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

pub const DEFAULT_ARCH: &str = "amd64";
pub const DEFAULT_OS: &str = "linux";

/// The `(architecture, operating system)` pair a push or query targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTag {
    pub arch: String,
    pub os: String,
}

impl Default for PlatformTag {
    fn default() -> Self {
        Self {
            arch: DEFAULT_ARCH.to_string(),
            os: DEFAULT_OS.to_string(),
        }
    }
}

impl PlatformTag {
    pub fn new(arch: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            os: os.into(),
        }
    }

    /// Derive the platform from a client identity string.
    ///
    /// Docker hosts announce themselves as a list of `token/version` pairs,
    /// e.g. `docker/1.3.0 go/go1.3.3 kernel/3.16 os/linux arch/arm`. The `arch`
    /// and `os` tokens override the defaults; when a key repeats, the last
    /// occurrence wins.
    ///
    /// ```
    /// # use registry_index::platform::PlatformTag;
    /// let tag = PlatformTag::from_user_agent("docker/1.3.0 os/linux arch/arm");
    /// assert_eq!(tag, PlatformTag::new("arm", "linux"));
    /// assert_eq!(PlatformTag::from_user_agent(""), PlatformTag::default());
    /// ```
    pub fn from_user_agent(user_agent: &str) -> Self {
        static UA_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = UA_REGEX.get_or_init(|| {
            Regex::new(r"([^\s/]+)/([^\s/]+)").unwrap_or_else(|e| {
                panic!("Failed to compile user agent regex: {}", e)
            })
        });

        let tokens: HashMap<&str, &str> = re
            .captures_iter(user_agent)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .collect();

        let mut tag = Self::default();
        if let Some(arch) = tokens.get("arch") {
            tag.arch = arch.to_string();
        }
        if let Some(os) = tokens.get("os") {
            tag.os = os.to_string();
        }
        tag
    }

    /// Read the platform declared by an image manifest (`architecture`, `os`).
    ///
    /// Returns `None` when the document is not JSON or lacks either field.
    pub fn from_manifest(manifest: &[u8]) -> Option<Self> {
        let doc: Value = serde_json::from_slice(manifest).ok()?;
        let arch = doc.get("architecture")?.as_str()?;
        let os = doc.get("os")?.as_str()?;
        Some(Self::new(arch, os))
    }

    /// Client identity string announcing this platform to an upstream index.
    pub fn user_agent(&self) -> String {
        format!(
            "index-server/{} arch/{} os/{}",
            env!("CARGO_PKG_VERSION"),
            self.arch,
            self.os
        )
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
