//! Migration settings from flags and an optional YAML file.
//!
//! The file uses the flag names in camelCase:
//!
//! ```yaml
//! from: old.example.com/v1
//! to: new.example.com/v1
//! resources: [widgets, gadgets]
//! namespaceMappings: ["legacy:apps"]
//! labelMappings: ["old.example.com:new.example.com"]
//! annotationMappings: ["old.example.com:new.example.com"]
//! updateOwnerRefs: ["gadgets:widgets"]
//! kubeconfig: /home/me/.kube/config
//! context: staging
//! qps: 20
//! burst: 40
//! interval: 2
//! ```
//!
//! Scalar flags override file values. List flags are appended to the file's
//! lists, so file entries come first when order matters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crd_migrate::{
    parse_mappings, GroupVersion, MigratorConfig, DEFAULT_BURST, DEFAULT_QPS, MIN_QPS,
};

use crate::{Cli, Error, Result};

/// Contents of a `--config` file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub from: Option<String>,
    pub to: Option<String>,
    pub resources: Option<Vec<String>>,
    #[serde(default)]
    pub namespace_mappings: Vec<String>,
    #[serde(default)]
    pub label_mappings: Vec<String>,
    #[serde(default)]
    pub annotation_mappings: Vec<String>,
    #[serde(default)]
    pub update_owner_refs: Vec<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub qps: Option<f32>,
    pub burst: Option<u32>,
    pub interval: Option<u64>,
}

/// Load a `--config` file
pub fn load_file(path: &Path) -> Result<FileConfig> {
    let data = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Fully resolved settings for a migration run
#[derive(Debug, Clone)]
pub struct Settings {
    pub migrator: MigratorConfig,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub qps: f32,
    pub burst: u32,
    /// Pause between passes; `None` runs a single pass
    pub interval: Option<Duration>,
}

impl Settings {
    /// Resolve settings from parsed flags, reading `--config` if given
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    /// Merge flags over file values and validate the result
    pub fn merge(cli: &Cli, file: FileConfig) -> Result<Self> {
        let source = required_group_version("from", cli.from.as_ref().or(file.from.as_ref()))?;
        let target = required_group_version("to", cli.to.as_ref().or(file.to.as_ref()))?;
        if source == target {
            return Err(Error::validation(format!(
                "--from and --to are both {}",
                source
            )));
        }

        let namespace_mappings = parse_mappings(
            "namespace",
            &appended(file.namespace_mappings, &cli.namespace_mappings),
        )?;
        let label_mappings =
            parse_mappings("label", &appended(file.label_mappings, &cli.label_mappings))?;
        let annotation_mappings = parse_mappings(
            "annotation",
            &appended(file.annotation_mappings, &cli.annotation_mappings),
        )?;
        let owner_mappings = parse_mappings(
            "owner",
            &appended(file.update_owner_refs, &cli.update_owner_refs),
        )?;

        let mut migrator = MigratorConfig::new(source, target)
            .with_namespace_mappings(namespace_mappings)
            .with_label_mappings(label_mappings)
            .with_annotation_mappings(annotation_mappings)
            .with_owner_mappings(owner_mappings);

        if file.resources.is_some() || !cli.resources.is_empty() {
            let resources = appended(file.resources.unwrap_or_default(), &cli.resources);
            migrator = migrator.with_resources(resources);
        }

        let interval = match cli.interval.or(file.interval) {
            Some(0) => return Err(Error::validation("--interval must be at least 1 second")),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        // 0 turns throttling off
        let qps = cli.qps.or(file.qps).unwrap_or(DEFAULT_QPS);
        if !qps.is_finite() || qps < 0.0 || (qps > 0.0 && qps < MIN_QPS) {
            return Err(Error::validation(format!(
                "--qps must be 0 or a finite value of at least {}, got {}",
                MIN_QPS, qps
            )));
        }

        Ok(Self {
            migrator,
            kubeconfig: cli.kubeconfig.clone().or(file.kubeconfig),
            context: cli.context.clone().or(file.context),
            qps,
            burst: cli.burst.or(file.burst).unwrap_or(DEFAULT_BURST),
            interval,
        })
    }
}

fn required_group_version(flag: &str, value: Option<&String>) -> Result<GroupVersion> {
    let value = value.ok_or_else(|| {
        Error::validation(format!("--{} is required (flag or config file)", flag))
    })?;
    Ok(value.parse::<GroupVersion>()?)
}

fn appended(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
    base.extend(extra.iter().cloned());
    base
}
