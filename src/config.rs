//! Configuration for the engine and the processor routing table.

use crate::application::router::ProcessorRouter;
use crate::application::rules::{RoutingRule, RuleCondition};
use crate::error::{PaymentError, Result};
use crate::infrastructure::simulated::{SettlementMode, SimulatedGateway};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings for `PaymentEngine`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for a single repository or processor call, in milliseconds.
    pub io_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// A simulated gateway to register with the router.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayConfig {
    pub id: String,
    #[serde(default)]
    pub settlement: SettlementMode,
    #[serde(default)]
    pub decline_above: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub priority: i32,
    pub when: RuleCondition,
}

/// Everything the binary needs to assemble an engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_processor: String,
    pub engine: EngineConfig,
    pub gateways: Vec<GatewayConfig>,
    pub rules: Vec<RuleConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_processor: "gateway-a".to_string(),
            engine: EngineConfig::default(),
            gateways: vec![
                GatewayConfig {
                    id: "gateway-a".to_string(),
                    settlement: SettlementMode::Immediate,
                    decline_above: None,
                },
                GatewayConfig {
                    id: "gateway-b".to_string(),
                    settlement: SettlementMode::Deferred,
                    decline_above: None,
                },
            ],
            rules: vec![RuleConfig {
                name: "capture-later".to_string(),
                target: "gateway-b".to_string(),
                priority: 10,
                when: RuleCondition::MetadataEquals {
                    key: "capture_later".to_string(),
                    value: "true".to_string(),
                },
            }],
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections take their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PaymentError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PaymentError::Config(e.to_string()))
    }

    /// Registers every gateway and rule with a fresh router.
    pub async fn build_router(&self) -> Result<ProcessorRouter> {
        let router = ProcessorRouter::new(self.default_processor.clone());

        for gateway in &self.gateways {
            let mut processor = SimulatedGateway::new(gateway.id.clone(), gateway.settlement);
            if let Some(limit) = gateway.decline_above {
                processor = processor.with_decline_above(limit);
            }
            router
                .register_processor(&gateway.id, Arc::new(processor))
                .await
                .map_err(|e| PaymentError::Config(e.to_string()))?;
        }

        for rule in &self.rules {
            router
                .add_routing_rule(RoutingRule::from_condition(
                    rule.name.clone(),
                    rule.target.clone(),
                    rule.priority,
                    rule.when.clone(),
                ))
                .await
                .map_err(|e| PaymentError::Config(format!("rule {:?}: {}", rule.name, e)))?;
        }

        info!(
            processors = self.gateways.len(),
            rules = self.rules.len(),
            default = %self.default_processor,
            "router configured"
        );
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.default_processor, "gateway-a");
        assert_eq!(config.gateways.len(), 2);
        assert_eq!(config.engine.io_timeout(), None);
    }

    #[test]
    fn test_engine_timeout() {
        let config = EngineConfig::default().with_io_timeout(Duration::from_secs(2));
        assert_eq!(config.io_timeout_ms, Some(2000));
        assert_eq!(config.io_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_engine_timeout_saturates() {
        let config = EngineConfig::default().with_io_timeout(Duration::MAX);
        assert_eq!(config.io_timeout_ms, Some(u64::MAX));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "engine": { "io_timeout_ms": 250 } }"#).unwrap();
        assert_eq!(config.engine.io_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.default_processor, "gateway-a");
        assert_eq!(config.rules.len(), 1);
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        assert!(matches!(
            AppConfig::from_json("{ not json"),
            Err(PaymentError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_build_router_from_json() {
        let config = AppConfig::from_json(
            r#"{
                "default_processor": "primary",
                "gateways": [
                    { "id": "primary" },
                    { "id": "high-value", "settlement": "deferred", "decline_above": 1000000 }
                ],
                "rules": [
                    {
                        "name": "big-tickets",
                        "target": "high-value",
                        "priority": 5,
                        "when": { "kind": "min_amount", "amount": 100000 }
                    }
                ]
            }"#,
        )
        .unwrap();

        let router = config.build_router().await.unwrap();
        assert_eq!(router.processor_ids().await, vec!["high-value", "primary"]);
        assert_eq!(
            router.evaluation_order().await,
            vec![("big-tickets".to_string(), 5), ("fallback".to_string(), i32::MIN)]
        );
    }

    #[tokio::test]
    async fn test_rule_with_unknown_target_is_rejected() {
        let mut config = AppConfig::default();
        config.rules[0].target = "nowhere".to_string();
        assert!(matches!(
            config.build_router().await,
            Err(PaymentError::Config(_))
        ));
    }
}
