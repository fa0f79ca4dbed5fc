//! Best-effort client of the monitoring (Dragonfly) service. Agent install
//! failures are recorded on the VM but never change the MCIS status.

use crate::config::RuntimeSettings;
use crate::driver::errors::DriverError;
use crate::driver::TimeoutClass;
use crate::utilities::get_header_with_basic_auth;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentInstallReq {
    pub ns_id: String,
    pub mcis_id: String,
    pub vm_id: String,
    #[serde(rename = "publicIp")]
    pub public_ip: String,
    pub ssh_port: String,
    pub user_name: String,
    pub ssh_key: String,
}

pub trait MonitoringService: Send + Sync {
    fn install_agent(&self, req: &AgentInstallReq) -> Result<(), DriverError>;
}

pub struct DragonflyClient {
    http: Client,
    settings: Arc<RuntimeSettings>,
    auth_user: String,
    auth_password: String,
}

impl DragonflyClient {
    pub fn new(settings: Arc<RuntimeSettings>, auth_user: String, auth_password: String) -> Result<Self, DriverError> {
        let http = Client::builder().build().map_err(|e| DriverError::Unavailable {
            raw_error_message: format!("cannot build HTTP client: {e}"),
        })?;

        Ok(DragonflyClient {
            http,
            settings,
            auth_user,
            auth_password,
        })
    }
}

impl MonitoringService for DragonflyClient {
    fn install_agent(&self, req: &AgentInstallReq) -> Result<(), DriverError> {
        let base = self.settings.dragonfly_rest_url();
        let url = format!("{}/agent/install", base.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .headers(get_header_with_basic_auth(&self.auth_user, &self.auth_password))
            .timeout(TimeoutClass::Medium.deadline())
            .json(req)
            .send()
            .map_err(|e| DriverError::Unavailable {
                raw_error_message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(DriverError::Other {
            status: status.as_u16(),
            raw_error_message: response.text().unwrap_or_default(),
        })
    }
}

/// No-op used when the embedder runs without a monitoring backend.
pub struct NoopMonitoring;

impl MonitoringService for NoopMonitoring {
    fn install_agent(&self, _req: &AgentInstallReq) -> Result<(), DriverError> {
        Ok(())
    }
}
