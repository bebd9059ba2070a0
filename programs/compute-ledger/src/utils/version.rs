//! Version checking utilities for protocol upgrades

use crate::errors::LedgerError;
use crate::state::{ProtocolConfig, CURRENT_PROTOCOL_VERSION, MIN_SUPPORTED_VERSION};
use anchor_lang::prelude::*;

/// Check that the protocol config is readable by this program build.
///
/// The config must satisfy `MIN_SUPPORTED_VERSION <= min_supported_version
/// <= protocol_version <= CURRENT_PROTOCOL_VERSION`; anything else fails
/// with `VersionMismatchProtocol`.
pub fn check_version_compatible(config: &ProtocolConfig) -> Result<()> {
    if !config.is_version_compatible() {
        msg!(
            "Config version {} (min supported {}) outside program range {}-{}",
            config.protocol_version,
            config.min_supported_version,
            MIN_SUPPORTED_VERSION,
            CURRENT_PROTOCOL_VERSION
        );
        return Err(LedgerError::VersionMismatchProtocol.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rejected(config: &ProtocolConfig) {
        match check_version_compatible(config) {
            Err(anchor_lang::error::Error::AnchorError(e)) => assert_eq!(
                e.error_code_number,
                LedgerError::VersionMismatchProtocol as u32
                    + anchor_lang::error::ERROR_CODE_OFFSET
            ),
            other => panic!("expected VersionMismatchProtocol, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config_is_accepted() {
        assert!(check_version_compatible(&ProtocolConfig::default()).is_ok());
    }

    #[test]
    fn test_newer_config_rejected() {
        let config = ProtocolConfig {
            protocol_version: CURRENT_PROTOCOL_VERSION + 1,
            ..Default::default()
        };
        assert_rejected(&config);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let config = ProtocolConfig {
            protocol_version: CURRENT_PROTOCOL_VERSION,
            min_supported_version: CURRENT_PROTOCOL_VERSION + 1,
            ..Default::default()
        };
        assert_rejected(&config);
    }

    #[test]
    fn test_zero_min_supported_rejected() {
        let config = ProtocolConfig {
            min_supported_version: 0,
            ..Default::default()
        };
        assert_rejected(&config);
    }
}
