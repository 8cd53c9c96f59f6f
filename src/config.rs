use crate::types::Config;
use anyhow::{bail, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the decision loop cannot run with. Dimension
    /// inconsistencies surface here instead of as a shape error every tick.
    pub fn validate(&self) -> Result<()> {
        let feature_dim = self.sensors.feature_dim();
        if feature_dim == 0 {
            bail!("no sensor channel enabled");
        }
        if feature_dim != self.model.input_dim {
            bail!(
                "enabled sensor channels produce {} features but model.input_dim is {}",
                feature_dim,
                self.model.input_dim
            );
        }
        if self.anomaly.history_len == 0 {
            bail!("anomaly.history_len must be at least 1");
        }
        if self.anomaly.streak_ticks == 0 {
            bail!("anomaly.streak_ticks must be at least 1");
        }
        if self.arbiter.severe_tier >= self.arbiter.severity_tiers {
            bail!(
                "arbiter.severe_tier {} is outside the {} configured tiers",
                self.arbiter.severe_tier,
                self.arbiter.severity_tiers
            );
        }
        if self.runtime.tick_hz == 0 {
            bail!("runtime.tick_hz must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.control.steer_decay) {
            bail!("control.steer_decay must lie in [0, 1]");
        }
        Ok(())
    }
}
