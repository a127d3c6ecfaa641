use std::io;
use std::path::Path;

pub const PROPERTIES_FILE: &str = "server.properties";
pub const DEFAULT_LEVEL_NAME: &str = "world";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

/// `server.properties` contents. Comments, blank lines and key order survive
/// a load/save cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProperties {
    lines: Vec<Line>,
}

impl ServerProperties {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| {
                let trimmed = raw.trim_start();
                if trimmed.starts_with('#') || trimmed.starts_with('!') {
                    return Line::Other(raw.to_owned());
                }
                match raw.split_once('=') {
                    Some((key, value)) => Line::Entry {
                        key: key.trim().to_owned(),
                        value: value.trim().to_owned(),
                    },
                    None => Line::Other(raw.to_owned()),
                }
            })
            .collect();
        Self { lines }
    }

    /// A missing file reads as empty.
    pub fn load(path: &Path) -> io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub fn load_from_server(server_dir: &Path) -> io::Result<Self> {
        Self::load(&server_dir.join(PROPERTIES_FILE))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.render())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Other(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Updates the value in place, or appends the key when it is new.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for line in self.lines.iter_mut().rev() {
            if let Line::Entry { key: k, value: v } = line {
                if k == key {
                    *v = value;
                    return;
                }
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_owned(),
            value,
        });
    }

    /// `level-name`, or `world` when unset or blank.
    pub fn level_name(&self) -> String {
        self.get("level-name")
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_LEVEL_NAME)
            .to_owned()
    }
}
