//! MCIS and VM records plus their state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Observed state of a single VM.
///
/// `Creating -> Running <-> Suspended` (suspend/resume),
/// `Running|Suspended -> Rebooting -> Running`,
/// `any -> Terminating -> Terminated`, plus `Failed`.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum VmStatus {
    Creating,
    Running,
    Suspended,
    Rebooting,
    Terminating,
    Terminated,
    Failed,
    Undefined,
}

impl VmStatus {
    /// True while a transition is pending and the status may still move on
    /// its own.
    pub fn is_pending(&self) -> bool {
        matches!(self, VmStatus::Creating | VmStatus::Rebooting | VmStatus::Terminating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VmStatus::Running | VmStatus::Suspended | VmStatus::Terminated | VmStatus::Failed
        )
    }

    /// Maps a driver-reported status string into the engine enum. Driver
    /// transitional states the engine does not track collapse into the
    /// nearest engine state; unknown strings become `Undefined`.
    pub fn from_driver_status(raw: &str) -> VmStatus {
        match raw.trim().to_lowercase().as_str() {
            "creating" | "booting" => VmStatus::Creating,
            "running" => VmStatus::Running,
            "suspending" | "suspended" => VmStatus::Suspended,
            "resuming" | "rebooting" => VmStatus::Rebooting,
            "terminating" => VmStatus::Terminating,
            "terminated" | "notexist" | "not-exist" => VmStatus::Terminated,
            "failed" => VmStatus::Failed,
            _ => VmStatus::Undefined,
        }
    }
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VmStatus::Creating => "Creating",
            VmStatus::Running => "Running",
            VmStatus::Suspended => "Suspended",
            VmStatus::Rebooting => "Rebooting",
            VmStatus::Terminating => "Terminating",
            VmStatus::Terminated => "Terminated",
            VmStatus::Failed => "Failed",
            VmStatus::Undefined => "Undefined",
        })
    }
}

/// Control verbs accepted by the MCIS engine, at MCIS or VM granularity.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    None,
    Create,
    Suspend,
    Resume,
    Reboot,
    Terminate,
    Refine,
    Continue,
}

impl ControlAction {
    /// The state a VM is expected to reach once the action settles.
    pub fn target_status(&self) -> VmStatus {
        match self {
            ControlAction::Create | ControlAction::Resume | ControlAction::Reboot => VmStatus::Running,
            ControlAction::Suspend => VmStatus::Suspended,
            ControlAction::Terminate => VmStatus::Terminated,
            ControlAction::None | ControlAction::Refine | ControlAction::Continue => VmStatus::Undefined,
        }
    }

    /// The transitional state written while the driver call is in flight.
    pub fn transitional_status(&self) -> VmStatus {
        match self {
            ControlAction::Create => VmStatus::Creating,
            ControlAction::Reboot => VmStatus::Rebooting,
            ControlAction::Terminate => VmStatus::Terminating,
            // suspend/resume settle in one driver call, no intermediate state
            ControlAction::Suspend => VmStatus::Suspended,
            ControlAction::Resume => VmStatus::Running,
            ControlAction::None | ControlAction::Refine | ControlAction::Continue => VmStatus::Undefined,
        }
    }

    /// Gate of the per-VM state machine: can `self` be applied to a VM
    /// currently observed in `current`?
    pub fn allowed_from(&self, current: VmStatus) -> bool {
        match self {
            ControlAction::Suspend => current == VmStatus::Running,
            ControlAction::Resume => current == VmStatus::Suspended,
            ControlAction::Reboot => matches!(current, VmStatus::Running | VmStatus::Suspended),
            ControlAction::Terminate => !matches!(current, VmStatus::Terminating | VmStatus::Terminated),
            ControlAction::Create | ControlAction::None | ControlAction::Refine | ControlAction::Continue => true,
        }
    }
}

impl Display for ControlAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ControlAction::None => "none",
            ControlAction::Create => "create",
            ControlAction::Suspend => "suspend",
            ControlAction::Resume => "resume",
            ControlAction::Reboot => "reboot",
            ControlAction::Terminate => "terminate",
            ControlAction::Refine => "refine",
            ControlAction::Continue => "continue",
        })
    }
}

impl std::str::FromStr for ControlAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ControlAction::None),
            "create" => Ok(ControlAction::Create),
            "suspend" => Ok(ControlAction::Suspend),
            "resume" => Ok(ControlAction::Resume),
            "reboot" => Ok(ControlAction::Reboot),
            "terminate" => Ok(ControlAction::Terminate),
            "refine" => Ok(ControlAction::Refine),
            "continue" => Ok(ControlAction::Continue),
            _ => Err(()),
        }
    }
}

/// Aggregate status of an MCIS, derived from its VM statuses and never
/// written by external callers.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum McisStatus {
    Running,
    Suspended,
    Terminated,
    Failed,
    #[serde(rename = "Creating-InProgress")]
    CreatingInProgress,
    #[serde(rename = "Rebooting-InProgress")]
    RebootingInProgress,
    #[serde(rename = "Terminating-InProgress")]
    TerminatingInProgress,
    #[serde(rename = "Partial-Running")]
    PartialRunning,
    #[serde(rename = "Partial-Suspended")]
    PartialSuspended,
    #[serde(rename = "Partial-Terminated")]
    PartialTerminated,
    #[serde(rename = "Partial-Failed")]
    PartialFailed,
    Undefined,
}

impl McisStatus {
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            McisStatus::CreatingInProgress | McisStatus::RebootingInProgress | McisStatus::TerminatingInProgress
        )
    }
}

impl Display for McisStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            McisStatus::Running => "Running",
            McisStatus::Suspended => "Suspended",
            McisStatus::Terminated => "Terminated",
            McisStatus::Failed => "Failed",
            McisStatus::CreatingInProgress => "Creating-InProgress",
            McisStatus::RebootingInProgress => "Rebooting-InProgress",
            McisStatus::TerminatingInProgress => "Terminating-InProgress",
            McisStatus::PartialRunning => "Partial-Running",
            McisStatus::PartialSuspended => "Partial-Suspended",
            McisStatus::PartialTerminated => "Partial-Terminated",
            McisStatus::PartialFailed => "Partial-Failed",
            McisStatus::Undefined => "Undefined",
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegionZone {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
}

/// A member VM of an MCIS, persisted under
/// `/ns/{nsId}/mcis/{mcisId}/vm/{vmId}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    pub id: String,
    pub uuid: String,
    #[serde(default)]
    pub sub_group_id: String,
    pub connection_name: String,
    pub spec_id: String,
    pub image_id: String,
    pub v_net_id: String,
    pub subnet_id: String,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub ssh_key_id: String,
    #[serde(default)]
    pub data_disk_ids: Vec<String>,
    pub status: VmStatus,
    #[serde(default = "default_vm_status")]
    pub target_status: VmStatus,
    #[serde(default = "default_control_action")]
    pub target_action: ControlAction,
    #[serde(rename = "publicIP", default)]
    pub public_ip: String,
    #[serde(rename = "privateIP", default)]
    pub private_ip: String,
    #[serde(default)]
    pub ssh_port: String,
    #[serde(default)]
    pub region: RegionZone,
    #[serde(default)]
    pub csp_resource_id: String,
    #[serde(default)]
    pub csp_resource_name: String,
    #[serde(default)]
    pub root_disk_type: String,
    #[serde(default)]
    pub root_disk_size: String,
    #[serde(default)]
    pub vm_user_account: String,
    #[serde(default)]
    pub description: String,
    /// Operator-facing note, e.g. the driver failure that made the VM `Failed`.
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub key_value_list: Vec<super::KeyValue>,
}

fn default_vm_status() -> VmStatus {
    VmStatus::Undefined
}

fn default_control_action() -> ControlAction {
    ControlAction::None
}

/// An MCIS record, persisted under `/ns/{nsId}/mcis/{mcisId}`. The `vm`
/// list is cleared before the write; VM records are children in the KV tree
/// and re-attached on read.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mcis {
    pub id: String,
    pub uuid: String,
    #[serde(default)]
    pub description: String,
    pub status: McisStatus,
    #[serde(default = "default_mcis_status")]
    pub target_status: McisStatus,
    #[serde(default = "default_control_action")]
    pub target_action: ControlAction,
    #[serde(default)]
    pub install_mon_agent: bool,
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    #[serde(default)]
    pub system_label: String,
    #[serde(default)]
    pub vm: Vec<Vm>,
}

fn default_mcis_status() -> McisStatus {
    McisStatus::Undefined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_state_machine_gate() {
        // setup:
        let test_cases = vec![
            (VmStatus::Running, ControlAction::Suspend, true),
            (VmStatus::Suspended, ControlAction::Suspend, false),
            (VmStatus::Suspended, ControlAction::Resume, true),
            (VmStatus::Running, ControlAction::Resume, false),
            (VmStatus::Running, ControlAction::Reboot, true),
            (VmStatus::Suspended, ControlAction::Reboot, true),
            (VmStatus::Creating, ControlAction::Reboot, false),
            (VmStatus::Failed, ControlAction::Terminate, true),
            (VmStatus::Terminated, ControlAction::Terminate, false),
            (VmStatus::Terminating, ControlAction::Terminate, false),
        ];

        for (current, action, expected) in test_cases {
            // execute:
            let allowed = action.allowed_from(current);

            // verify:
            assert_eq!(expected, allowed, "{action} from {current}");
        }
    }

    #[test]
    fn test_driver_status_mapping() {
        // setup:
        let test_cases = vec![
            ("Running", VmStatus::Running),
            ("running", VmStatus::Running),
            ("Suspending", VmStatus::Suspended),
            ("Resuming", VmStatus::Rebooting),
            ("NotExist", VmStatus::Terminated),
            ("whatever", VmStatus::Undefined),
        ];

        for (raw, expected) in test_cases {
            // execute & verify:
            assert_eq!(expected, VmStatus::from_driver_status(raw));
        }
    }

    #[test]
    fn test_mcis_status_serializes_with_dashed_labels() {
        // execute:
        let partial = serde_json::to_string(&McisStatus::PartialFailed).unwrap();
        let pending = serde_json::to_string(&McisStatus::CreatingInProgress).unwrap();

        // verify:
        assert_eq!(r#""Partial-Failed""#, partial);
        assert_eq!(r#""Creating-InProgress""#, pending);
    }
}
