//! Config validation logic.
//! Range checks on the numeric knobs plus a trial parse of the copy tool spec.

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::copy::CopyTool;

use super::types::Config;
use super::{SAMPLE_INTERVAL_MS_MIN, THREADS_MAX};

impl Config {
    /// Reject values no workflow could run with.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.threads > THREADS_MAX {
            bail!("threads must be between 1 and {THREADS_MAX}, got {}", self.threads);
        }
        if self.large_file_threshold_mb == 0 {
            bail!("large_file_threshold_mb must be at least 1");
        }
        if self.sample_interval_ms < SAMPLE_INTERVAL_MS_MIN {
            bail!(
                "sample_interval_ms must be at least {SAMPLE_INTERVAL_MS_MIN}, got {}",
                self.sample_interval_ms
            );
        }
        CopyTool::parse(&self.copy_tool)
            .with_context(|| format!("invalid copy_tool '{}'", self.copy_tool))?;
        if let Some(tool) = &self.handle_tool
            && tool.as_os_str().is_empty()
        {
            bail!("handle_tool must not be empty when set");
        }

        debug!(
            threads = self.threads,
            sample_interval_ms = self.sample_interval_ms,
            copy_tool = %self.copy_tool,
            "Config validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut c = Config::default();
        c.threads = 0;
        assert!(c.validate().is_err());
        c.threads = 129;
        assert!(c.validate().unwrap_err().to_string().contains("between 1 and 128"));

        let mut c = Config::default();
        c.sample_interval_ms = 50;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.copy_tool = "cp -a".into();
        assert!(c.validate().is_err());
    }
}
