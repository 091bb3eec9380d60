//! Static and slow-changing records served alongside telemetry.

use serde::{Deserialize, Serialize};

/// Identifier of a monitored machine as assigned by the remote service.
pub type EntityId = u64;

/// Static attributes of a monitored machine.
///
/// Source: `GET /systems/{id}` (detail) and `GET /systems` (overview).
///
/// Only the attributes the live views show are modeled; the service sends
/// many more and they are ignored on decode.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct EntityRecord {
    pub id: EntityId,

    pub hostname: String,

    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub os_info: Option<String>,

    #[serde(default)]
    pub cpu_name: Option<String>,

    #[serde(default)]
    pub cpu_cores: Option<u32>,

    /// Installed memory as reported by the agent (GB).
    #[serde(default)]
    pub total_memory_gb: Option<f64>,

    /// Primary disk capacity as reported by the agent (GB).
    #[serde(default)]
    pub total_disk_gb: Option<f64>,

    #[serde(default)]
    pub network_adapter: Option<String>,

    #[serde(default)]
    pub agent_version: Option<String>,

    /// Operator-assigned label, shown instead of the hostname when set.
    #[serde(default)]
    pub user_label: Option<String>,

    /// Whether the agent has reported recently.
    #[serde(default)]
    pub is_active: bool,

    /// Last time the agent reported, raw from the service (may lack a zone).
    #[serde(default)]
    pub last_seen: Option<String>,
}

impl EntityRecord {
    /// Name to show for this machine.
    pub fn display_name(&self) -> &str {
        self.user_label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.hostname)
    }
}

/// Support ticket attached to a machine.
///
/// Source: `GET /tickets?system_id={id}`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Ticket {
    pub id: u64,
    pub message: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Threshold alert raised by the remote service.
///
/// Source: `GET /alerts?is_resolved=false`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Alert {
    pub id: u64,
    pub system_id: EntityId,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    #[serde(default)]
    pub is_resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_record_ignores_unknown_fields() {
        let json = r#"{
            "id": 7,
            "hostname": "lab-pc-07",
            "cpu_cores": 8,
            "bios_version": "F.42",
            "drivers": [{"name": "nvme"}],
            "is_active": true
        }"#;
        let rec: EntityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.id, 7);
        assert_eq!(rec.cpu_cores, Some(8));
        assert!(rec.is_active);
        assert!(rec.ip_address.is_none());
    }

    #[test]
    fn display_name_prefers_label() {
        let mut rec = EntityRecord {
            hostname: "lab-pc-07".into(),
            ..Default::default()
        };
        assert_eq!(rec.display_name(), "lab-pc-07");
        rec.user_label = Some(String::new());
        assert_eq!(rec.display_name(), "lab-pc-07");
        rec.user_label = Some("Front desk".into());
        assert_eq!(rec.display_name(), "Front desk");
    }
}
