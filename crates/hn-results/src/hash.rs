//! Content fingerprint of a run's inputs.

use hn_project::{NetworkRecords, ScenarioOptions};
use sha2::{Digest, Sha256};

/// SHA-256 over the id-sorted network records and the scenario options.
pub fn fingerprint(network: &NetworkRecords, scenario: &ScenarioOptions) -> String {
    let mut hasher = Sha256::new();

    let network_json = serde_json::to_string(&network.clone().sorted()).unwrap_or_default();
    hasher.update(network_json.as_bytes());

    let scenario_json = serde_json::to_string(scenario).unwrap_or_default();
    hasher.update(scenario_json.as_bytes());

    format!("{:x}", hasher.finalize())
}
