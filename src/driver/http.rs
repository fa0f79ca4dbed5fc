//! Blocking reqwest implementation of the [`Driver`] trait against the
//! Spider REST API.

use crate::config::RuntimeSettings;
use crate::driver::errors::DriverError;
use crate::driver::io::*;
use crate::driver::{Driver, TimeoutClass, VmControlVerb};
use crate::utilities::get_header_with_basic_auth;
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use retry::delay::Exponential;
use retry::OperationResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Body sent with driver DELETE calls: the connection triple only.
#[derive(Serialize, Clone, Debug)]
struct ConnectionBody {
    #[serde(rename = "ConnectionName")]
    connection_name: String,
}

pub struct SpiderClient {
    http: Client,
    settings: Arc<RuntimeSettings>,
    auth_user: String,
    auth_password: String,
}

impl SpiderClient {
    /// The driver base URL is read from the settings mirror on every call,
    /// so config updates apply to the next request without a rebuild.
    pub fn new(settings: Arc<RuntimeSettings>, auth_user: String, auth_password: String) -> Result<Self, DriverError> {
        let http = Client::builder()
            .build()
            .map_err(|e| DriverError::Unavailable {
                raw_error_message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(SpiderClient {
            http,
            settings,
            auth_user,
            auth_password,
        })
    }

    fn execute_http_request<B: Serialize, O: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        timeout_class: TimeoutClass,
        resource_name: &str,
    ) -> Result<O, DriverError> {
        let url = join_url(&self.settings.spider_rest_url(), path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(get_header_with_basic_auth(&self.auth_user, &self.auth_password))
            .timeout(timeout_class.deadline());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                DriverError::Timeout {
                    timeout_class,
                    raw_error_message: e.to_string(),
                }
            } else {
                DriverError::Unavailable {
                    raw_error_message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<O>().map_err(|e| DriverError::Decode {
                raw_error_message: format!("{method} {url}: {e}"),
            });
        }

        let raw_error_message = response.text().unwrap_or_default();
        warn!("driver call {method} {url} failed with HTTP {status}: {raw_error_message}");
        Err(map_error_status(status, resource_name, raw_error_message))
    }

    /// Idempotent GETs may retry on `Unavailable`/`Timeout`; everything else
    /// surfaces immediately. Mutations never retry.
    fn get_with_retry<O: DeserializeOwned>(
        &self,
        path: &str,
        resource_name: &str,
        timeout_class: TimeoutClass,
    ) -> Result<O, DriverError> {
        let attempts = retry::retry(Exponential::from_millis_with_factor(200, 2.0).take(3), || {
            match self.execute_http_request::<serde_json::Value, O>(
                Method::GET,
                path,
                &[],
                None,
                timeout_class,
                resource_name,
            ) {
                Ok(out) => OperationResult::Ok(out),
                Err(err) if err.is_retryable() => OperationResult::Retry(err),
                Err(err) => OperationResult::Err(err),
            }
        });

        match attempts {
            Ok(out) => Ok(out),
            Err(retry::Error { error, .. }) => Err(error),
        }
    }

    fn force_query(force: bool) -> Vec<(&'static str, String)> {
        vec![("force", force.to_string())]
    }

    fn delete_returning_bool(
        &self,
        path: &str,
        connection: &str,
        resource_name: &str,
        force: bool,
        timeout_class: TimeoutClass,
    ) -> Result<bool, DriverError> {
        let body = ConnectionBody {
            connection_name: connection.to_string(),
        };
        let result: BooleanInfo = self.execute_http_request(
            Method::DELETE,
            path,
            &Self::force_query(force),
            Some(&body),
            timeout_class,
            resource_name,
        )?;
        Ok(result.is_true())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn map_error_status(status: StatusCode, resource_name: &str, raw_error_message: String) -> DriverError {
    match status {
        StatusCode::BAD_REQUEST => DriverError::BadRequest {
            resource_name: resource_name.to_string(),
            raw_error_message,
        },
        StatusCode::NOT_FOUND => DriverError::NotFound {
            resource_name: resource_name.to_string(),
            raw_error_message,
        },
        StatusCode::CONFLICT => DriverError::Conflict {
            resource_name: resource_name.to_string(),
            raw_error_message,
        },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            DriverError::Unavailable { raw_error_message }
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => DriverError::Timeout {
            timeout_class: TimeoutClass::Short,
            raw_error_message,
        },
        other => DriverError::Other {
            status: other.as_u16(),
            raw_error_message,
        },
    }
}

impl Driver for SpiderClient {
    fn create_vpc(&self, connection: &str, req: &VpcReqInfo) -> Result<VpcInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(Method::POST, "vpc", &[], Some(&body), TimeoutClass::Medium, &req.name)
    }

    fn register_vpc(&self, connection: &str, req: &RegisterVpcReqInfo) -> Result<VpcInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(Method::POST, "regvpc", &[], Some(&body), TimeoutClass::Medium, &req.name)
    }

    fn get_vpc(&self, _connection: &str, name: &str) -> Result<VpcInfo, DriverError> {
        self.get_with_retry(&format!("vpc/{name}"), name, TimeoutClass::Short)
    }

    fn delete_vpc(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError> {
        self.delete_returning_bool(&format!("vpc/{name}"), connection, name, force, TimeoutClass::Medium)
    }

    fn add_subnet(&self, connection: &str, vpc_name: &str, req: &SubnetReqInfo) -> Result<VpcInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(
            Method::POST,
            &format!("vpc/{vpc_name}/subnet"),
            &[],
            Some(&body),
            TimeoutClass::Medium,
            &req.name,
        )
    }

    fn delete_subnet(
        &self,
        connection: &str,
        vpc_name: &str,
        subnet_name: &str,
        force: bool,
    ) -> Result<bool, DriverError> {
        self.delete_returning_bool(
            &format!("vpc/{vpc_name}/subnet/{subnet_name}"),
            connection,
            subnet_name,
            force,
            TimeoutClass::Medium,
        )
    }

    fn create_security_group(
        &self,
        connection: &str,
        req: &SecurityGroupReqInfo,
    ) -> Result<SecurityGroupInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(
            Method::POST,
            "securitygroup",
            &[],
            Some(&body),
            TimeoutClass::Medium,
            &req.name,
        )
    }

    fn delete_security_group(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError> {
        self.delete_returning_bool(
            &format!("securitygroup/{name}"),
            connection,
            name,
            force,
            TimeoutClass::Medium,
        )
    }

    fn create_key_pair(&self, connection: &str, req: &KeyPairReqInfo) -> Result<KeyPairInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(Method::POST, "keypair", &[], Some(&body), TimeoutClass::Medium, &req.name)
    }

    fn delete_key_pair(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError> {
        self.delete_returning_bool(&format!("keypair/{name}"), connection, name, force, TimeoutClass::Medium)
    }

    fn get_image(&self, _connection: &str, name: &str) -> Result<ImageInfo, DriverError> {
        self.get_with_retry(&format!("vmimage/{name}"), name, TimeoutClass::Short)
    }

    fn get_vm_spec(&self, _connection: &str, name: &str) -> Result<VmSpecInfo, DriverError> {
        self.get_with_retry(&format!("vmspec/{name}"), name, TimeoutClass::Short)
    }

    fn create_disk(&self, connection: &str, req: &DiskReqInfo) -> Result<DiskInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(Method::POST, "disk", &[], Some(&body), TimeoutClass::Medium, &req.name)
    }

    fn delete_disk(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError> {
        self.delete_returning_bool(&format!("disk/{name}"), connection, name, force, TimeoutClass::Medium)
    }

    fn attach_disk(&self, connection: &str, vm_name: &str, disk_name: &str) -> Result<DiskInfo, DriverError> {
        let query = vec![
            ("ConnectionName", connection.to_string()),
            ("action", "attachDataDisk".to_string()),
            ("diskName", disk_name.to_string()),
        ];
        self.execute_http_request::<serde_json::Value, DiskInfo>(
            Method::GET,
            &format!("controlvm/{vm_name}"),
            &query,
            None,
            TimeoutClass::Medium,
            disk_name,
        )
    }

    fn detach_disk(&self, connection: &str, vm_name: &str, disk_name: &str) -> Result<bool, DriverError> {
        let query = vec![
            ("ConnectionName", connection.to_string()),
            ("action", "detachDataDisk".to_string()),
            ("diskName", disk_name.to_string()),
        ];
        let result: BooleanInfo = self.execute_http_request::<serde_json::Value, BooleanInfo>(
            Method::GET,
            &format!("controlvm/{vm_name}"),
            &query,
            None,
            TimeoutClass::Medium,
            disk_name,
        )?;
        Ok(result.is_true())
    }

    fn start_vm(&self, connection: &str, req: &VmReqInfo) -> Result<VmInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(Method::POST, "vm", &[], Some(&body), TimeoutClass::Long, &req.name)
    }

    fn get_vm(&self, _connection: &str, name: &str) -> Result<VmInfo, DriverError> {
        self.get_with_retry(&format!("vm/{name}"), name, TimeoutClass::Short)
    }

    fn get_vm_status(&self, _connection: &str, name: &str) -> Result<VmStatusInfo, DriverError> {
        self.get_with_retry(&format!("vmstatus/{name}"), name, TimeoutClass::Short)
    }

    fn control_vm(&self, connection: &str, name: &str, verb: VmControlVerb) -> Result<VmStatusInfo, DriverError> {
        let query = vec![
            ("ConnectionName", connection.to_string()),
            ("action", verb.to_string()),
        ];
        self.execute_http_request::<serde_json::Value, VmStatusInfo>(
            Method::GET,
            &format!("controlvm/{name}"),
            &query,
            None,
            TimeoutClass::Medium,
            name,
        )
    }

    fn terminate_vm(&self, connection: &str, name: &str) -> Result<VmStatusInfo, DriverError> {
        let body = ConnectionBody {
            connection_name: connection.to_string(),
        };
        self.execute_http_request(
            Method::DELETE,
            &format!("vm/{name}"),
            &[],
            Some(&body),
            TimeoutClass::Long,
            name,
        )
    }

    fn create_cluster(&self, connection: &str, req: &ClusterReqInfo) -> Result<ClusterInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(Method::POST, "cluster", &[], Some(&body), TimeoutClass::VeryLong, &req.name)
    }

    fn get_cluster(&self, _connection: &str, name: &str) -> Result<ClusterInfo, DriverError> {
        self.get_with_retry(&format!("cluster/{name}"), name, TimeoutClass::Short)
    }

    fn delete_cluster(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError> {
        self.delete_returning_bool(
            &format!("cluster/{name}"),
            connection,
            name,
            force,
            TimeoutClass::VeryLong,
        )
    }

    fn add_node_group(
        &self,
        connection: &str,
        cluster_name: &str,
        req: &NodeGroupReqInfo,
    ) -> Result<NodeGroupInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: req.clone(),
        };
        self.execute_http_request(
            Method::POST,
            &format!("cluster/{cluster_name}/nodegroup"),
            &[],
            Some(&body),
            TimeoutClass::VeryLong,
            &req.name,
        )
    }

    fn remove_node_group(
        &self,
        connection: &str,
        cluster_name: &str,
        node_group_name: &str,
        force: bool,
    ) -> Result<bool, DriverError> {
        self.delete_returning_bool(
            &format!("cluster/{cluster_name}/nodegroup/{node_group_name}"),
            connection,
            node_group_name,
            force,
            TimeoutClass::Long,
        )
    }

    fn set_node_group_autoscaling(
        &self,
        connection: &str,
        cluster_name: &str,
        node_group_name: &str,
        on: bool,
    ) -> Result<bool, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: OnAutoScalingReqInfo { on_auto_scaling: on },
        };
        let result: BooleanInfo = self.execute_http_request(
            Method::PUT,
            &format!("cluster/{cluster_name}/nodegroup/{node_group_name}/onautoscaling"),
            &[],
            Some(&body),
            TimeoutClass::Medium,
            node_group_name,
        )?;
        Ok(result.is_true())
    }

    fn change_node_group_scaling(
        &self,
        connection: &str,
        cluster_name: &str,
        node_group_name: &str,
        desired: u32,
        min: u32,
        max: u32,
    ) -> Result<NodeGroupInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: ScaleSizeReqInfo {
                desired_node_size: desired,
                min_node_size: min,
                max_node_size: max,
            },
        };
        self.execute_http_request(
            Method::PUT,
            &format!("cluster/{cluster_name}/nodegroup/{node_group_name}/autoscalesize"),
            &[],
            Some(&body),
            TimeoutClass::Long,
            node_group_name,
        )
    }

    fn upgrade_cluster(&self, connection: &str, name: &str, version: &str) -> Result<ClusterInfo, DriverError> {
        let body = DriverRequest {
            connection_name: connection.to_string(),
            req_info: UpgradeReqInfo {
                version: version.to_string(),
            },
        };
        self.execute_http_request(
            Method::PUT,
            &format!("cluster/{name}/upgrade"),
            &[],
            Some(&body),
            TimeoutClass::VeryLong,
            name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        // setup:
        let test_cases = vec![
            ("http://localhost:1024/spider", "vpc", "http://localhost:1024/spider/vpc"),
            ("http://localhost:1024/spider/", "vpc", "http://localhost:1024/spider/vpc"),
            ("http://x:1", "/vm/name", "http://x:1/vm/name"),
        ];

        for (base, path, expected) in test_cases {
            // execute & verify:
            assert_eq!(expected, join_url(base, path));
        }
    }

    #[test]
    fn test_map_error_status_covers_the_taxonomy() {
        // setup:
        let test_cases = vec![
            (StatusCode::BAD_REQUEST, "BadRequest"),
            (StatusCode::NOT_FOUND, "NotFound"),
            (StatusCode::CONFLICT, "Conflict"),
            (StatusCode::SERVICE_UNAVAILABLE, "Unavailable"),
            (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
            (StatusCode::INTERNAL_SERVER_ERROR, "Other"),
        ];

        for (status, expected) in test_cases {
            // execute:
            let err = map_error_status(status, "r1", "boom".to_string());

            // verify:
            let label = match err {
                DriverError::BadRequest { .. } => "BadRequest",
                DriverError::NotFound { .. } => "NotFound",
                DriverError::Conflict { .. } => "Conflict",
                DriverError::Unavailable { .. } => "Unavailable",
                DriverError::Timeout { .. } => "Timeout",
                DriverError::Decode { .. } => "Decode",
                DriverError::Other { .. } => "Other",
            };
            assert_eq!(expected, label, "{status}");
        }
    }
}
