//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Directive applied on top of `RUST_LOG`
pub const DEFAULT_DIRECTIVE: &str = "bigacademy_core=info";

/// Install a fmt subscriber filtered by `RUST_LOG` plus `directive`.
///
/// Returns `false` if a global subscriber was already installed, so repeated
/// calls from tests or embedding binaries are harmless.
pub fn init_tracing(directive: &str) -> anyhow::Result<bool> {
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok())
}

/// [`init_tracing`] with [`DEFAULT_DIRECTIVE`]
pub fn init_default_tracing() -> anyhow::Result<bool> {
    init_tracing(DEFAULT_DIRECTIVE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        assert!(init_default_tracing().is_ok());
        assert!(!init_tracing("bigacademy_core=debug").unwrap());
    }

    #[test]
    fn test_bad_directive() {
        assert!(init_tracing("bigacademy_core=loudest").is_err());
    }
}
