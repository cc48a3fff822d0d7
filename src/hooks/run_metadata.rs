// Pre-evaluation hook recording what the run was started with
// Author: kelexine (https://github.com/kelexine)

use crate::adapter::{Hook, HookContext};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_file_name() -> String {
    "run_metadata.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunMetadataConfig {
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

impl Default for RunMetadataConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
        }
    }
}

/// Contents of the metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub adapter_version: String,
    pub started_at: String,
    pub components: Vec<String>,
}

pub struct RunMetadataHook {
    config: RunMetadataConfig,
}

impl RunMetadataHook {
    pub fn new(config: RunMetadataConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Hook for RunMetadataHook {
    fn name(&self) -> &str {
        "run_metadata"
    }

    async fn run(&self, ctx: &HookContext) -> Result<()> {
        let metadata = RunMetadata {
            run_id: uuid::Uuid::new_v4().to_string(),
            adapter_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            components: ctx.components.clone(),
        };

        tokio::fs::create_dir_all(&ctx.output_dir).await?;
        let path = ctx.output_dir.join(&self.config.file_name);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&metadata)?).await?;

        info!("Run {} metadata written to {}", metadata.run_id, path.display());
        Ok(())
    }
}
