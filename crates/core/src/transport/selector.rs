//! Chooses the transport for a run before any network activity.

use tracing::info;

use crate::config::TransportSettings;
use crate::errors::ConfigError;
use crate::models::IssueRecord;

use super::{Backend, BackendKind, DirectApiClient, ManagedSessionClient, TransportMode};

/// Decide which transport a batch needs.
///
/// Explicit modes win. In `auto` mode the direct transport is chosen as soon
/// as any record asks for a template, since only it can apply one.
pub fn select_kind(records: &[IssueRecord], mode: TransportMode) -> BackendKind {
    match mode {
        TransportMode::Managed => BackendKind::Managed,
        TransportMode::Direct => BackendKind::Direct,
        TransportMode::Auto => {
            if records.iter().any(|r| r.template_name().is_some()) {
                BackendKind::Direct
            } else {
                BackendKind::Managed
            }
        }
    }
}

/// Per-transport settings, resolved lazily so only the chosen transport's
/// credentials have to exist.
pub trait SettingsSource {
    fn settings_for(&self, kind: BackendKind) -> Result<TransportSettings, ConfigError>;
}

/// Pick and build the transport for `records`. Credentials and endpoint are
/// validated here, up front, rather than mid-batch.
pub fn select<S: SettingsSource + ?Sized>(
    records: &[IssueRecord],
    mode: TransportMode,
    settings: &S,
) -> Result<Backend, ConfigError> {
    let kind = select_kind(records, mode);
    info!(%mode, transport = %kind, "selected transport");
    let resolved = settings.settings_for(kind)?;
    resolved.validate()?;
    Ok(match kind {
        BackendKind::Managed => Backend::Managed(ManagedSessionClient::new(resolved)),
        BackendKind::Direct => Backend::Direct(DirectApiClient::new(resolved)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolNames;

    fn record(position: usize, template: Option<&str>) -> IssueRecord {
        IssueRecord {
            position,
            team: "TeamX".into(),
            project: "ProjA".into(),
            title: format!("T{}", position),
            body: "B".into(),
            template: template.map(String::from),
        }
    }

    struct FixedSettings;

    impl SettingsSource for FixedSettings {
        fn settings_for(&self, kind: BackendKind) -> Result<TransportSettings, ConfigError> {
            let endpoint = match kind {
                BackendKind::Managed => "https://mcp.example.com/mcp",
                BackendKind::Direct => "https://api.example.com/graphql",
            };
            Ok(TransportSettings {
                endpoint: endpoint.into(),
                token: "lin_api_test".into(),
                timeout_secs: 5,
                tools: ToolNames::default(),
            })
        }
    }

    struct NoCredentials;

    impl SettingsSource for NoCredentials {
        fn settings_for(&self, kind: BackendKind) -> Result<TransportSettings, ConfigError> {
            Err(ConfigError::MissingCredentials {
                transport: kind.to_string(),
                env_var: "LINEAR_ACCESS_TOKEN".into(),
            })
        }
    }

    #[test]
    fn test_auto_without_templates_is_managed() {
        let records = vec![record(1, None), record(2, Some("")), record(3, Some("  "))];
        assert_eq!(select_kind(&records, TransportMode::Auto), BackendKind::Managed);
    }

    #[test]
    fn test_auto_with_any_template_is_direct() {
        let records = vec![record(1, None), record(2, Some("Bug Template"))];
        assert_eq!(select_kind(&records, TransportMode::Auto), BackendKind::Direct);
    }

    #[test]
    fn test_explicit_mode_wins() {
        let records = vec![record(1, Some("Bug Template"))];
        assert_eq!(select_kind(&records, TransportMode::Managed), BackendKind::Managed);
        assert_eq!(select_kind(&[], TransportMode::Direct), BackendKind::Direct);
    }

    #[test]
    fn test_select_builds_chosen_backend() {
        let records = vec![record(1, Some("Bug Template"))];
        let backend = select(&records, TransportMode::Auto, &FixedSettings).unwrap();
        assert_eq!(backend.kind(), BackendKind::Direct);

        let backend = select(&[record(1, None)], TransportMode::Auto, &FixedSettings).unwrap();
        assert_eq!(backend.kind(), BackendKind::Managed);
    }

    #[test]
    fn test_select_fails_fast_without_credentials() {
        let result = select(&[record(1, None)], TransportMode::Auto, &NoCredentials);
        assert!(matches!(
            result,
            Err(ConfigError::MissingCredentials { ref transport, .. }) if transport == "managed"
        ));
    }
}
