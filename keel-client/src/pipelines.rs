//! Snapshot endpoints

use crate::SnapshotClient;
use crate::error::{ClientError, Result};
use keel_core::domain::pipeline::Pipeline;

impl SnapshotClient {
    /// List all pipelines with their current stage statuses, sorted by id
    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let url = format!("{}/pipelines", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get one pipeline
    ///
    /// # Example
    /// ```no_run
    /// # use keel_client::SnapshotClient;
    /// # async fn example() -> keel_client::Result<()> {
    /// let client = SnapshotClient::new("http://localhost:8081");
    /// let pipeline = client.get_pipeline("p1").await?;
    /// println!("{}: {} stages", pipeline.name, pipeline.stages.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_pipeline(&self, pipeline_id: &str) -> Result<Pipeline> {
        let url = format!("{}/pipelines/{}", self.base_url, pipeline_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Check that the server answers its health endpoint
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), "health check failed"));
        }
        Ok(())
    }
}
