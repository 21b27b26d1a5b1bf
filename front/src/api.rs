use std::time::Duration;

use eyre::Context;
use tally_api::v1::{CreateTodo, DbInfo, Deleted, Health, Todo, UpdateTodo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build http client")?;

        Ok(Self { http, base_url })
    }

    pub async fn get_todos(&self) -> eyre::Result<Vec<Todo>> {
        let response = self
            .http
            .get(format!("{}/todos", self.base_url))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn create_todo(&self, body: &CreateTodo) -> eyre::Result<Todo> {
        let response = self
            .http
            .post(format!("{}/todos", self.base_url))
            .json(body)
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn update_todo(&self, id: &str, body: &UpdateTodo) -> eyre::Result<Todo> {
        let response = self
            .http
            .put(format!("{}/todos/{}", self.base_url, id))
            .json(body)
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn toggle_todo(&self, id: &str) -> eyre::Result<Todo> {
        let response = self
            .http
            .patch(format!("{}/todos/{}/toggle", self.base_url, id))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn delete_todo(&self, id: &str) -> eyre::Result<Deleted> {
        let response = self
            .http
            .delete(format!("{}/todos/{}", self.base_url, id))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn health(&self) -> eyre::Result<Health> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn db_info(&self) -> eyre::Result<DbInfo> {
        let response = self
            .http
            .get(format!("{}/db-info", self.base_url))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }
}
