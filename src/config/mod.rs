pub mod catalog;

use crate::object::{ApiSurface, ObjectDefinition, WriteDisposition};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Complete pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Objects to extract, in run order
    #[serde(default = "catalog::default_objects")]
    pub objects: Vec<ObjectDefinition>,
}

/// Pipeline identity and destination settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    /// Warehouse dataset the object tables belong to
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// SQLite database file backing the dataset
    #[serde(default = "default_warehouse_path")]
    pub warehouse_path: String,
}

fn default_pipeline_name() -> String {
    "salesforce_marketing_cloud_pipeline".to_string()
}

fn default_dataset() -> String {
    "salesforce_marketing_cloud".to_string()
}

fn default_warehouse_path() -> String {
    "salesforce_marketing_cloud.db".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            dataset: default_dataset(),
            warehouse_path: default_warehouse_path(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            objects: catalog::default_objects(),
        }
    }
}

impl PipelineConfig {
    /// Structural checks. Whether an object actually supports its date filter
    /// is left to the API.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.dataset.trim().is_empty() {
            bail!("pipeline.dataset must not be empty");
        }
        if self.objects.is_empty() {
            bail!("at least one object must be configured");
        }

        let mut tables = HashSet::new();
        for object in &self.objects {
            if object.name.trim().is_empty() {
                bail!("object name must not be empty");
            }
            let table = object.table_name();
            if table.starts_with('_') {
                bail!("object {}: table name {} is reserved", object.name, table);
            }
            if !tables.insert(table.clone()) {
                bail!("object {}: duplicate table name {}", object.name, table);
            }
            if object.disposition() == WriteDisposition::Merge && object.primary_key.is_none() {
                bail!("object {}: merge requires a primary_key", object.name);
            }

            match object.surface {
                ApiSurface::Soap => {
                    if object.properties.is_empty() {
                        bail!("object {}: SOAP objects need at least one property", object.name);
                    }
                }
                ApiSurface::Rest => {
                    let endpoint = object.endpoint.as_ref().with_context(|| {
                        format!("object {}: REST objects need an endpoint", object.name)
                    })?;
                    if endpoint.path.trim().is_empty() {
                        bail!("object {}: endpoint path must not be empty", object.name);
                    }
                    if endpoint.page_size == 0 {
                        bail!("object {}: page_size must be greater than zero", object.name);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: PipelineConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load and validate configuration, falling back to the built-in catalog when
/// the file does not exist.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let config = if path.exists() {
        load_config(path)?
    } else {
        info!(path = %path.display(), "No config file, using built-in object catalog");
        PipelineConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::RestEndpoint;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.pipeline.name, "salesforce_marketing_cloud_pipeline");
        assert_eq!(config.pipeline.dataset, "salesforce_marketing_cloud");
        assert_eq!(config.objects.len(), 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [pipeline]
            name = "test_pipeline"
            dataset = "sfmc_test"
            warehouse_path = "/tmp/sfmc_test.db"

            [[objects]]
            name = "SentEvent"
            surface = "soap"
            properties = ["SendID", "SubscriberKey", "EventDate"]
            filter_field = "EventDate"
            days_back = 2
            primary_key = "id"

            [[objects]]
            name = "campaigns"
            surface = "rest"
            endpoint = { path = "hub/v1/campaigns", page_size = 25 }
        "#;

        let config: PipelineConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pipeline.dataset, "sfmc_test");
        assert_eq!(config.objects.len(), 2);
        assert_eq!(config.objects[0].days_back, 2);
        assert_eq!(config.objects[0].disposition(), WriteDisposition::Merge);

        let endpoint = config.objects[1].endpoint.as_ref().unwrap();
        assert_eq!(endpoint.page_size, 25);
        assert_eq!(endpoint.data_selector, "items");
        assert_eq!(endpoint.total_selector.as_deref(), Some("count"));
    }

    #[test]
    fn test_partial_config() {
        // Missing [[objects]] falls back to the catalog
        let toml = r#"
            [pipeline]
            dataset = "other"
        "#;

        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pipeline.dataset, "other");
        assert_eq!(config.pipeline.warehouse_path, "salesforce_marketing_cloud.db");
        assert_eq!(config.objects.len(), catalog::default_objects().len());
    }

    #[test]
    fn test_rejects_soap_object_without_properties() {
        let mut config = PipelineConfig::default();
        config.objects = vec![ObjectDefinition::soap("Send", &[], Some("CreatedDate"))];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one property"));
    }

    #[test]
    fn test_rejects_rest_object_without_endpoint() {
        let mut object = ObjectDefinition::rest("assets", RestEndpoint::new("asset/v1/content/assets"));
        object.endpoint = None;
        let config = PipelineConfig {
            pipeline: PipelineSettings::default(),
            objects: vec![object],
        };
        assert!(config.validate().unwrap_err().to_string().contains("endpoint"));
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut endpoint = RestEndpoint::new("hub/v1/campaigns");
        endpoint.page_size = 0;
        let config = PipelineConfig {
            pipeline: PipelineSettings::default(),
            objects: vec![ObjectDefinition::rest("campaigns", endpoint)],
        };
        assert!(config.validate().unwrap_err().to_string().contains("page_size"));
    }

    #[test]
    fn test_rejects_duplicate_tables() {
        let object = ObjectDefinition::soap("OpenEvent", &["SendID"], Some("EventDate"));
        let config = PipelineConfig {
            pipeline: PipelineSettings::default(),
            objects: vec![object.clone(), object],
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("duplicate table name openevents"));
    }

    #[test]
    fn test_rejects_blank_object_name() {
        let object = ObjectDefinition::soap("  ", &["ID"], None);
        let config = PipelineConfig {
            pipeline: PipelineSettings::default(),
            objects: vec![object],
        };
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "object name must not be empty"
        );
    }

    #[test]
    fn test_rejects_merge_without_primary_key() {
        let mut object = ObjectDefinition::soap("Send", &["ID"], Some("CreatedDate"));
        object.primary_key = None;
        object.write_disposition = Some(WriteDisposition::Merge);
        let config = PipelineConfig {
            pipeline: PipelineSettings::default(),
            objects: vec![object],
        };
        assert!(config.validate().unwrap_err().to_string().contains("primary_key"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.objects.len(), catalog::default_objects().len());
    }

    #[test]
    fn test_load_or_default_reads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[objects]]
            name = "Subscriber"
            surface = "soap"
            properties = []
            full_load = true
            primary_key = "subscriberkey"
            "#
        )
        .unwrap();

        let err = load_or_default(file.path()).unwrap_err();
        assert!(err.to_string().contains("Subscriber"));
    }
}
