use std::fmt;

const LOCAL_PREFIXES: [&str; 4] = ["./", "../", ".\\", "..\\"];

/// Where a module call loads its module from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Normalized slash-separated path relative to the calling module.
    Local(String),
    /// Anything else, kept verbatim. Resolved through the module manifest.
    Remote(String),
}

impl ModuleSource {
    pub fn parse(raw: &str) -> Self {
        if !LOCAL_PREFIXES.iter().any(|prefix| raw.starts_with(prefix)) {
            return ModuleSource::Remote(raw.to_string());
        }
        let clean = clean_path(&raw.replace('\\', "/"));
        if clean.starts_with("../") || clean == ".." {
            ModuleSource::Local(clean)
        } else {
            ModuleSource::Local(format!("./{clean}"))
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ModuleSource::Local(_))
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Local(s) | ModuleSource::Remote(s) => f.write_str(s),
        }
    }
}

/// Lexical path cleaning: collapses `.`, `..` and repeated slashes.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
