//! Named volume discovery from a compose declaration.
//!
//! Only the parts of the compose format that decide which volumes exist are
//! modelled; everything else in the file is ignored.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::utils::errors::{BackupError, Result};

/// The subset of a compose file relevant to volume discovery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: Option<BTreeMap<String, Option<ServiceSpec>>>,

    /// Top-level named volume declarations
    #[serde(default)]
    pub volumes: Option<BTreeMap<String, Option<VolumeDeclaration>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub volumes: Option<Vec<MountEntry>>,
}

/// One entry of `services.<name>.volumes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MountEntry {
    /// `source:target[:options]`
    Short(String),
    /// `{ type, source, target, ... }`
    Long(LongMount),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LongMount {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeDeclaration {
    /// Explicit runtime name overriding the key
    #[serde(default)]
    pub name: Option<String>,
}

impl ComposeFile {
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| BackupError::Configuration(e.to_string()))
    }
}

impl MountEntry {
    /// Source of the mount, if it names one.
    pub fn source(&self) -> Option<&str> {
        match self {
            MountEntry::Short(spec) => spec.split_once(':').map(|(source, _)| source),
            MountEntry::Long(mount) => match mount.kind.as_deref() {
                None | Some("volume") => mount.source.as_deref(),
                Some(_) => None,
            },
        }
    }

    /// Volume key this mount refers to, or `None` for bind mounts and anonymous volumes.
    pub fn named_volume(&self) -> Option<&str> {
        self.source().filter(|source| is_named_volume(source))
    }
}

/// A mount source is a named volume unless it looks like a host path.
pub fn is_named_volume(source: &str) -> bool {
    !source.is_empty()
        && !source.contains('/')
        && !source.contains('\\')
        && !source.starts_with('.')
        && !source.starts_with('~')
}

/// Compose's rule for volume keys: `[a-zA-Z0-9._-]+`.
///
/// Keys may be a single character; compose prefixes them with the project
/// name before they reach docker.
pub fn is_valid_volume_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Docker's rule for an explicit volume `name:`: `[a-zA-Z0-9][a-zA-Z0-9_.-]+`.
pub fn is_valid_volume_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    let rest = chars.as_str();
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Keys referenced by service mounts plus every top-level key.
fn volume_keys(compose: &ComposeFile) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for service in compose.services.iter().flat_map(|s| s.values()).flatten() {
        for entry in service.volumes.iter().flatten() {
            if let Some(key) = entry.named_volume() {
                keys.insert(key.to_string());
            }
        }
    }
    keys.extend(compose.volumes.iter().flat_map(|v| v.keys().cloned()));
    keys
}

/// Names of every named volume the declaration uses or declares, sorted and deduplicated.
pub fn discover_volumes(compose: &ComposeFile) -> Result<Vec<String>> {
    let declared = compose.volumes.clone().unwrap_or_default();

    let mut names = BTreeSet::new();
    for key in volume_keys(compose) {
        let explicit = declared
            .get(&key)
            .and_then(|decl| decl.as_ref())
            .and_then(|decl| decl.name.clone());

        match explicit {
            Some(name) if !is_valid_volume_name(&name) => {
                return Err(BackupError::Configuration(format!(
                    "invalid name {:?} for volume {:?}",
                    name, key
                )));
            }
            Some(name) => {
                names.insert(name);
            }
            None if !is_valid_volume_key(&key) => {
                return Err(BackupError::Configuration(format!(
                    "invalid volume key: {:?}",
                    key
                )));
            }
            None => {
                names.insert(key);
            }
        }
    }

    Ok(names.into_iter().collect())
}

/// Volume keys used without an explicit `name:`.
///
/// Compose creates these as `<project>_<key>`, so exporting them by key only
/// works when the volume was created externally under that exact name.
pub fn unnamed_volume_keys(compose: &ComposeFile) -> Vec<String> {
    let declared = compose.volumes.clone().unwrap_or_default();
    volume_keys(compose)
        .into_iter()
        .filter(|key| {
            declared
                .get(key)
                .and_then(|decl| decl.as_ref())
                .and_then(|decl| decl.name.as_ref())
                .is_none()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discover(yaml: &str) -> Vec<String> {
        discover_volumes(&ComposeFile::parse(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_bind_mounts_excluded() {
        let volumes = discover(
            r#"
services:
  app:
    image: nginx
    volumes:
      - ./html:/usr/share/nginx/html
      - /etc/localtime:/etc/localtime:ro
      - ../shared:/shared
      - ~/certs:/certs
      - .env:/app/.env
      - site-data:/data
"#,
        );
        assert_eq!(volumes, vec!["site-data"]);
    }

    #[test]
    fn test_union_of_services_and_top_level_deduplicated() {
        let volumes = discover(
            r#"
services:
  db:
    image: postgres
    volumes:
      - pgdata:/var/lib/postgresql/data
  backup:
    image: alpine
    volumes:
      - pgdata:/source:ro
      - cache:/cache
volumes:
  pgdata:
  unused:
"#,
        );
        assert_eq!(volumes, vec!["cache", "pgdata", "unused"]);
    }

    #[test]
    fn test_long_syntax() {
        let volumes = discover(
            r#"
services:
  app:
    image: app
    volumes:
      - type: volume
        source: uploads
        target: /uploads
      - type: bind
        source: config
        target: /config
      - type: tmpfs
        target: /tmp
      - source: logs
        target: /logs
"#,
        );
        assert_eq!(volumes, vec!["logs", "uploads"]);
    }

    #[test]
    fn test_anonymous_volumes_skipped() {
        let volumes = discover(
            r#"
services:
  app:
    image: app
    volumes:
      - /var/cache
      - type: volume
        target: /scratch
"#,
        );
        assert!(volumes.is_empty());
    }

    #[test]
    fn test_explicit_name_overrides_key() {
        let volumes = discover(
            r#"
services:
  db:
    image: mariadb
    volumes:
      - db:/var/lib/mysql
volumes:
  db:
    name: wiki_database
  media:
    name: wiki_media
"#,
        );
        assert_eq!(volumes, vec!["wiki_database", "wiki_media"]);
    }

    #[test]
    fn test_no_volumes_is_not_an_error() {
        assert!(discover("services:\n  web:\n    image: nginx\n").is_empty());
        assert!(discover("services:\n  web:\n").is_empty());
        assert!(discover("").is_empty());
    }

    #[test]
    fn test_discovery_is_idempotent() {
        let compose = ComposeFile::parse(
            "services:\n  a:\n    volumes: [\"x:/x\", \"y:/y\"]\nvolumes:\n  z: {}\n",
        )
        .unwrap();
        let first = discover_volumes(&compose).unwrap();
        let second = discover_volumes(&compose).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_unparsable_is_configuration_error() {
        let err = ComposeFile::parse("services:\n  - just\n  - a list\n").unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
    }

    #[test]
    fn test_invalid_volume_name_rejected() {
        let compose = ComposeFile::parse("volumes:\n  data:\n    name: \"-bad\"\n").unwrap();
        let err = discover_volumes(&compose).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));

        let compose = ComposeFile::parse("volumes:\n  \"has space\":\n").unwrap();
        let err = discover_volumes(&compose).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
    }

    #[test]
    fn test_single_character_keys_accepted() {
        let compose = ComposeFile::parse(
            "services:\n  app:\n    volumes:\n      - a:/data\nvolumes:\n  a:\n  b:\n  c:\n",
        )
        .unwrap();
        assert_eq!(discover_volumes(&compose).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unnamed_keys_listed() {
        let compose = ComposeFile::parse(
            "services:\n  app:\n    volumes:\n      - db:/var/lib/db\n      - media:/media\nvolumes:\n  db:\n    name: wiki_db\n  media:\n",
        )
        .unwrap();
        assert_eq!(unnamed_volume_keys(&compose), vec!["media"]);
        assert_eq!(discover_volumes(&compose).unwrap(), vec!["media", "wiki_db"]);
    }

    #[test]
    fn test_source_classification() {
        for source in ["/abs", "./rel", "../up", "~/home", "a/b", "c\\d", ".hidden", ""] {
            assert!(!is_named_volume(source), "{source} should be a path");
        }
        for source in ["data", "db_data", "my-vol.1"] {
            assert!(is_named_volume(source), "{source} should be named");
        }
    }

    #[test]
    fn test_volume_name_rule() {
        assert!(is_valid_volume_name("pgdata"));
        assert!(is_valid_volume_name("wiki_media.v2-old"));
        assert!(!is_valid_volume_name("x"));
        assert!(!is_valid_volume_name("_leading"));
        assert!(!is_valid_volume_name("has space"));
    }

    #[test]
    fn test_volume_key_rule() {
        assert!(is_valid_volume_key("a"));
        assert!(is_valid_volume_key("_cache"));
        assert!(is_valid_volume_key("db-data.v2"));
        assert!(!is_valid_volume_key(""));
        assert!(!is_valid_volume_key("has space"));
    }
}
