//! MLflow tracking server backend (REST API 2.0)

use crate::error::{DiamondError, Result};
use chrono::Utc;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::tracker::{RunStatus, Tracker};

#[derive(Debug, Clone)]
struct RunHandle {
    artifact_uri: String,
    /// Relative artifact paths already uploaded
    artifacts: Vec<String>,
}

/// Tracker talking to an MLflow server
#[derive(Debug)]
pub struct HttpTracker {
    base: String,
    client: Client,
    runs: HashMap<String, RunHandle>,
}

#[derive(Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    run: RunBody,
}

#[derive(Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
    artifact_uri: String,
}

#[derive(Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersionInfo,
}

#[derive(Deserialize)]
struct ModelVersionInfo {
    version: String,
}

#[derive(Deserialize)]
struct ApiError {
    error_code: Option<String>,
    message: Option<String>,
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> DiamondError {
    DiamondError::TrackerUnavailable(format!("{}: {}", context, err))
}

impl HttpTracker {
    pub fn new(base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| unavailable("Failed to create HTTP client", e))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
            runs: HashMap::new(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base, endpoint)
    }

    /// Map `mlflow-artifacts:/<path>` to the server's artifact proxy URL
    fn artifact_url(&self, artifact_uri: &str, relative: &str) -> Result<String> {
        let path = artifact_uri
            .strip_prefix("mlflow-artifacts:")
            .map(|p| p.trim_start_matches('/'))
            .ok_or_else(|| {
                DiamondError::TrackerUnavailable(format!(
                    "artifact store '{}' is not served through the tracking server",
                    artifact_uri
                ))
            })?;
        Ok(format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}",
            self.base, path, relative
        ))
    }

    fn check(&self, endpoint: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let detail = serde_json::from_str::<ApiError>(&body)
            .ok()
            .map(|e| {
                format!(
                    "{} {}",
                    e.error_code.unwrap_or_default(),
                    e.message.unwrap_or_default()
                )
            })
            .unwrap_or(body);
        Err(DiamondError::TrackerUnavailable(format!(
            "{} returned {}: {}",
            endpoint,
            status,
            detail.trim()
        )))
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(self.api_url(endpoint))
            .json(body)
            .send()
            .map_err(|e| unavailable(endpoint, e))?;
        self.check(endpoint, response)?
            .json()
            .map_err(|e| unavailable(endpoint, e))
    }

    fn post_unit<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        let _: serde_json::Value = self.post(endpoint, body)?;
        Ok(())
    }

    fn experiment_id(&self, name: &str) -> Result<String> {
        let endpoint = "experiments/get-by-name";
        let response = self
            .client
            .get(self.api_url(endpoint))
            .query(&[("experiment_name", name)])
            .send()
            .map_err(|e| unavailable(endpoint, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            let created: CreateExperimentResponse =
                self.post("experiments/create", &json!({ "name": name }))?;
            debug!(experiment = name, experiment_id = %created.experiment_id, "Created experiment");
            return Ok(created.experiment_id);
        }

        let found: ExperimentResponse = self
            .check(endpoint, response)?
            .json()
            .map_err(|e| unavailable(endpoint, e))?;
        Ok(found.experiment.experiment_id)
    }

    fn handle(&self, run_id: &str) -> Result<&RunHandle> {
        self.runs
            .get(run_id)
            .ok_or_else(|| DiamondError::ValidationError(format!("run {} was not started by this tracker", run_id)))
    }
}

impl Tracker for HttpTracker {
    fn start_run(&mut self, experiment: &str, run_name: Option<&str>) -> Result<String> {
        let experiment_id = self.experiment_id(experiment)?;
        let mut body = json!({
            "experiment_id": experiment_id,
            "start_time": Utc::now().timestamp_millis(),
        });
        if let Some(name) = run_name {
            body["run_name"] = json!(name);
        }
        let created: CreateRunResponse = self.post("runs/create", &body)?;
        let run_id = created.run.info.run_id;
        self.runs.insert(
            run_id.clone(),
            RunHandle {
                artifact_uri: created.run.info.artifact_uri,
                artifacts: Vec::new(),
            },
        );
        Ok(run_id)
    }

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post_unit(
            "runs/log-parameter",
            &json!({ "run_id": run_id, "key": key, "value": value }),
        )
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.post_unit(
            "runs/log-metric",
            &json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": Utc::now().timestamp_millis(),
                "step": 0,
            }),
        )
    }

    fn log_artifact(&mut self, run_id: &str, path: &Path, artifact_dir: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| DiamondError::ValidationError(format!("{} is not a file", path.display())))?
            .to_string_lossy()
            .into_owned();
        let relative = if artifact_dir.is_empty() {
            file_name
        } else {
            format!("{}/{}", artifact_dir.trim_matches('/'), file_name)
        };

        let handle = self.handle(run_id)?;
        if handle.artifacts.contains(&relative) {
            return Ok(());
        }
        let url = self.artifact_url(&handle.artifact_uri, &relative)?;
        let bytes = std::fs::read(path)?;

        let endpoint = "mlflow-artifacts/artifacts";
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .map_err(|e| unavailable(endpoint, e))?;
        self.check(endpoint, response)?;

        if let Some(handle) = self.runs.get_mut(run_id) {
            handle.artifacts.push(relative);
        }
        Ok(())
    }

    fn register_model(
        &mut self,
        run_id: &str,
        _artifact_path: &Path,
        name: &str,
        alias: Option<&str>,
    ) -> Result<u32> {
        let handle = self.handle(run_id)?;
        let source = match handle.artifacts.first() {
            Some(first) => {
                let dir = first.rsplit_once('/').map_or("", |(d, _)| d);
                format!("{}/{}", handle.artifact_uri, dir)
            }
            None => handle.artifact_uri.clone(),
        };

        if let Err(e) = self.post_unit("registered-models/create", &json!({ "name": name })) {
            // An existing model is fine, the version create below still works
            if !e.to_string().contains("RESOURCE_ALREADY_EXISTS") {
                return Err(e);
            }
        }

        let created: ModelVersionResponse = self.post(
            "model-versions/create",
            &json!({ "name": name, "source": source, "run_id": run_id }),
        )?;
        let version: u32 = created.model_version.version.parse().map_err(|_| {
            DiamondError::TrackerUnavailable(format!(
                "server returned non-numeric model version '{}'",
                created.model_version.version
            ))
        })?;

        if let Some(alias) = alias {
            self.post_unit(
                "registered-models/alias",
                &json!({ "name": name, "alias": alias, "version": version.to_string() }),
            )?;
        }
        Ok(version)
    }

    fn end_run(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        let result = self.post_unit(
            "runs/update",
            &json!({
                "run_id": run_id,
                "status": status.as_str(),
                "end_time": Utc::now().timestamp_millis(),
            }),
        );
        if result.is_ok() {
            self.runs.remove(run_id);
        } else {
            warn!(run_id, "Failed to close run on tracking server");
        }
        result
    }

    fn uri(&self) -> String {
        self.base.clone()
    }
}
