// CLI Configuration - Map command line arguments onto the harness config

use super::{Cli, DevnetCmd};
use fire_e2e::config::{ConfigError, HarnessConfig};

/// Config file (if any), `FIRE_*` variables, then the global flags
pub fn harness_config(cli: &Cli) -> Result<HarnessConfig, ConfigError> {
    let config = HarnessConfig::resolve(cli.config.as_deref())?;
    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    Ok(config.with_log_level(level))
}

/// Devnet flags override everything else
pub fn apply_devnet(mut config: HarnessConfig, cmd: &DevnetCmd) -> Result<HarnessConfig, ConfigError> {
    if let Some(binary) = &cmd.binary {
        config = config.with_binary(binary.clone());
    }
    if let Some(chain) = &cmd.chain {
        config = config.with_chain(chain);
    }
    if let Some(offset) = cmd.port_offset {
        config = config.with_port_offset(offset);
    }
    if cmd.print_logs {
        config = config.with_print_logs(true);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_devnet_overrides() {
        let cmd = DevnetCmd {
            roles: "alice".to_string(),
            print_logs: true,
            binary: Some(PathBuf::from("/opt/firechain-node")),
            chain: Some("local".to_string()),
            port_offset: Some(60),
        };
        let config = apply_devnet(HarnessConfig::default(), &cmd).unwrap();
        assert_eq!(config.node.binary, PathBuf::from("/opt/firechain-node"));
        assert_eq!(config.node.chain, "local");
        assert_eq!(config.node.ports.offset, 60);
        assert!(config.node.print_logs);
    }

    #[test]
    fn test_devnet_invalid_offset() {
        let cmd = DevnetCmd {
            roles: "alice".to_string(),
            print_logs: false,
            binary: None,
            chain: None,
            port_offset: Some(u16::MAX),
        };
        assert!(apply_devnet(HarnessConfig::default(), &cmd).is_err());
    }
}
