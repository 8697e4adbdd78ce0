//! File-level operations behind the `rbmarshal` subcommands
//!
//! Each command reads one marshal file into a fresh registry with
//! autodefine enabled, so streams naming classes this process has never
//! seen still load as plain classes and modules.

use marshal_codec::MarshalConfig;
use marshal_core::{InspectConfig, Registry, Value, inspect};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Options shared by `inspect` and `check`
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    pub config: Option<std::path::PathBuf>,
    pub max_depth: Option<usize>,
    pub freeze: bool,
}

/// Outcome of re-dumping a loaded file
#[derive(Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Identical { len: usize },
    /// First offset where the re-dumped bytes disagree with the input
    Differs {
        offset: usize,
        original_len: usize,
        redumped_len: usize,
    },
}

/// Resolve the effective config: file first, then command-line overrides
pub fn resolve_config(options: &LoadOptions) -> Result<MarshalConfig, String> {
    let mut config = match &options.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .map_err(|e| format!("Error reading config {}: {}", path.display(), e))?;
            MarshalConfig::from_toml(&content)?
        }
        None => MarshalConfig::default(),
    };
    if let Some(depth) = options.max_depth {
        config.max_depth = depth;
    }
    if options.freeze {
        config.freeze = true;
    }
    Ok(config)
}

pub struct Loaded {
    pub registry: Registry,
    pub value: Value,
    pub bytes: Vec<u8>,
}

pub fn load_file(path: &Path, config: &MarshalConfig) -> Result<Loaded, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
    let registry = Registry::new();
    registry.set_autodefine(true);
    let value = marshal_codec::load(&registry, &bytes, config)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "loaded");
    Ok(Loaded {
        registry,
        value,
        bytes,
    })
}

pub fn inspect_file(path: &Path, options: &LoadOptions, pretty: bool) -> Result<String, String> {
    let config = resolve_config(options)?;
    let loaded = load_file(path, &config)?;
    let style = if pretty {
        InspectConfig::pretty()
    } else {
        InspectConfig::compact()
    };
    Ok(inspect(&loaded.value, &style))
}

pub fn check_file(path: &Path, options: &LoadOptions) -> Result<CheckOutcome, String> {
    let config = resolve_config(options)?;
    let loaded = load_file(path, &config)?;
    let redumped = marshal_codec::dump(&loaded.registry, &loaded.value, &config)
        .map_err(|e| format!("{}: re-dump failed: {}", path.display(), e))?;
    let outcome = compare(&loaded.bytes, &redumped);
    info!(path = %path.display(), ?outcome, "checked");
    Ok(outcome)
}

pub fn compare(original: &[u8], redumped: &[u8]) -> CheckOutcome {
    match first_difference(original, redumped) {
        None => CheckOutcome::Identical {
            len: original.len(),
        },
        Some(offset) => CheckOutcome::Differs {
            offset,
            original_len: original.len(),
            redumped_len: redumped.len(),
        },
    }
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    match a.iter().zip(b).position(|(x, y)| x != y) {
        Some(i) => Some(i),
        None if a.len() != b.len() => Some(a.len().min(b.len())),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marshal_core::Symbol;
    use tempfile::tempdir;

    fn write_marshal(dir: &Path, name: &str, body: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut bytes = vec![4, 8];
        bytes.extend_from_slice(body);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"ab", b"abc"), Some(2));
        assert_eq!(first_difference(b"", b""), None);
    }

    #[test]
    fn test_config_file_and_overrides() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("marshal.toml");
        fs::write(&path, "max_depth = 16\n").unwrap();

        let mut options = LoadOptions {
            config: Some(path),
            ..Default::default()
        };
        let config = resolve_config(&options).unwrap();
        assert_eq!(config.max_depth, 16);
        assert!(!config.freeze);

        options.max_depth = Some(4);
        options.freeze = true;
        let config = resolve_config(&options).unwrap();
        assert_eq!(config.max_depth, 4);
        assert!(config.freeze);
    }

    #[test]
    fn test_bad_config_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("marshal.toml");
        fs::write(&path, "max_depth = \"deep\"\n").unwrap();
        let options = LoadOptions {
            config: Some(path),
            ..Default::default()
        };
        assert!(resolve_config(&options).is_err());

        let missing = LoadOptions {
            config: Some(temp.path().join("nope.toml")),
            ..Default::default()
        };
        assert!(resolve_config(&missing).unwrap_err().contains("nope.toml"));
    }

    #[test]
    fn test_inspect_autodefines_classes() {
        let temp = tempdir().unwrap();
        let path = write_marshal(temp.path(), "obj.bin", b"o:\x0aPoint\x06:\x07@xi\x06");
        let text = inspect_file(&path, &LoadOptions::default(), false).unwrap();
        assert_eq!(text, "#<Point @x=1>");
    }

    #[test]
    fn test_inspect_pretty() {
        let temp = tempdir().unwrap();
        let path = write_marshal(temp.path(), "list.bin", b"[\x07i\x06i\x07");
        let text = inspect_file(&path, &LoadOptions::default(), true).unwrap();
        assert_eq!(text, "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_check_identical() {
        let temp = tempdir().unwrap();
        let reg = Registry::new();
        let value = reg.array(vec![reg.str("x"), reg.symbol("y"), Value::Float(1.5)]);
        value.set_attribute(Symbol::intern("@tag"), Value::Integer(3));
        let bytes = marshal_codec::dump(&reg, &value, &MarshalConfig::default()).unwrap();
        let path = temp.path().join("graph.bin");
        fs::write(&path, &bytes).unwrap();

        let outcome = check_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(outcome, CheckOutcome::Identical { len: bytes.len() });
    }

    #[test]
    fn test_check_reports_difference() {
        let temp = tempdir().unwrap();
        // Non-canonical: 1 written with a one-byte long form
        let path = write_marshal(temp.path(), "wide.bin", b"i\x01\x01");
        let outcome = check_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::Differs {
                offset: 3,
                original_len: 5,
                redumped_len: 4,
            }
        );
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let temp = tempdir().unwrap();
        let path = write_marshal(temp.path(), "bad.bin", b"Z");
        let err = inspect_file(&path, &LoadOptions::default(), false).unwrap_err();
        assert!(err.contains("bad.bin"));
        assert!(err.contains("dump format error(0x5a)"));

        let options = LoadOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        let nested = write_marshal(temp.path(), "deep.bin", b"[\x06[\x00");
        assert!(check_file(&nested, &options).unwrap_err().contains("exceed depth limit"));
    }
}
