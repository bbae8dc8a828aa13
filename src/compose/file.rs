// ABOUTME: Typed model of the two-service Nightscout Compose file
// ABOUTME: Rendered to YAML with serde_yaml so the output is always well-formed

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposeFile {
    pub services: BTreeMap<String, Service>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Option<serde_yaml::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Service {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_file: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Knobs for the generated file
#[derive(Debug, Clone)]
pub struct ComposeTemplate {
    pub nightscout_image: String,
    pub mongo_image: String,
    pub app_port: u16,
    /// Publish MongoDB on localhost so host-side tools can reach it
    pub mongo_port: Option<u16>,
    pub env_file: String,
}

impl Default for ComposeTemplate {
    fn default() -> Self {
        Self {
            nightscout_image: "nightscout/cgm-remote-monitor:latest".to_string(),
            mongo_image: "mongo:6.0".to_string(),
            app_port: 1337,
            mongo_port: Some(27017),
            env_file: ".env".to_string(),
        }
    }
}

pub const APP_SERVICE: &str = "nightscout";
pub const DB_SERVICE: &str = "mongo";

impl ComposeFile {
    pub fn from_template(t: &ComposeTemplate) -> Self {
        let mut services = BTreeMap::new();

        let mut mongo_env = BTreeMap::new();
        mongo_env.insert(
            "MONGO_INITDB_ROOT_USERNAME".to_string(),
            "${MONGO_INITDB_ROOT_USERNAME}".to_string(),
        );
        mongo_env.insert(
            "MONGO_INITDB_ROOT_PASSWORD".to_string(),
            "${MONGO_INITDB_ROOT_PASSWORD}".to_string(),
        );

        services.insert(
            DB_SERVICE.to_string(),
            Service {
                image: t.mongo_image.clone(),
                container_name: Some("nightscout-mongo".to_string()),
                restart: Some("unless-stopped".to_string()),
                ports: t
                    .mongo_port
                    .map(|p| vec![format!("127.0.0.1:{}:27017", p)])
                    .unwrap_or_default(),
                volumes: vec!["mongo-data:/data/db".to_string()],
                environment: mongo_env,
                ..Default::default()
            },
        );

        let mut app_env = BTreeMap::new();
        app_env.insert("NODE_ENV".to_string(), "production".to_string());
        app_env.insert(
            "MONGO_CONNECTION".to_string(),
            "${MONGO_CONNECTION}".to_string(),
        );

        services.insert(
            APP_SERVICE.to_string(),
            Service {
                image: t.nightscout_image.clone(),
                container_name: Some("nightscout".to_string()),
                restart: Some("unless-stopped".to_string()),
                ports: vec![format!("{}:1337", t.app_port)],
                env_file: vec![t.env_file.clone()],
                environment: app_env,
                depends_on: vec![DB_SERVICE.to_string()],
                ..Default::default()
            },
        );

        let mut volumes = BTreeMap::new();
        volumes.insert("mongo-data".to_string(), None);

        Self { services, volumes }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize compose file")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("✓ Wrote {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_template_declares_two_services() {
        let file = ComposeFile::from_template(&ComposeTemplate::default());
        assert_eq!(file.services.len(), 2);

        let app = &file.services[APP_SERVICE];
        assert_eq!(app.ports, vec!["1337:1337"]);
        assert_eq!(app.env_file, vec![".env"]);
        assert_eq!(app.depends_on, vec![DB_SERVICE]);

        let db = &file.services[DB_SERVICE];
        assert_eq!(db.ports, vec!["127.0.0.1:27017:27017"]);
        assert_eq!(db.volumes, vec!["mongo-data:/data/db"]);
        assert!(file.volumes.contains_key("mongo-data"));
    }

    #[test]
    fn test_unpublished_mongo() {
        let template = ComposeTemplate {
            mongo_port: None,
            ..Default::default()
        };
        let file = ComposeFile::from_template(&template);
        assert!(file.services[DB_SERVICE].ports.is_empty());
        assert!(!file.to_yaml().unwrap().contains("27017:27017"));
    }

    #[test]
    fn test_yaml_keeps_compose_substitutions() {
        let yaml = ComposeFile::from_template(&ComposeTemplate::default())
            .to_yaml()
            .unwrap();
        assert!(yaml.contains("${MONGO_CONNECTION}"));
        assert!(yaml.contains("image: nightscout/cgm-remote-monitor:latest"));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        let file = ComposeFile::from_template(&ComposeTemplate::default());
        file.write(&path).unwrap();
        assert_eq!(ComposeFile::load(&path).unwrap(), file);
    }
}
