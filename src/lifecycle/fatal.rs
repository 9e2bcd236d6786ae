//! Process-level handling of uncaught failures.
//!
//! A panic anywhere in the process (a handler task, a connection task, a
//! stage) is logged with kind `uncaught-fatal`. Whether the process then
//! exits is a policy decision, made once at startup.

use std::panic::{self, PanicHookInfo};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// What to do after logging an uncaught failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncaughtPolicy {
    /// Exit immediately with code 1, skipping the graceful drain.
    Exit,
    /// Log and keep serving.
    Continue,
}

impl UncaughtPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        if config.exits_on_uncaught() {
            UncaughtPolicy::Exit
        } else {
            UncaughtPolicy::Continue
        }
    }
}

/// Install a panic hook applying `policy`.
///
/// Panics inside spawned tasks are still caught by tokio and surface as join
/// errors when the policy is `Continue`.
pub fn install_panic_hook(policy: UncaughtPolicy) {
    panic::set_hook(Box::new(move |info| {
        report(info, policy);
        if policy == UncaughtPolicy::Exit {
            std::process::exit(1);
        }
    }));
}

fn report(info: &PanicHookInfo<'_>, policy: UncaughtPolicy) {
    let location = info
        .location()
        .map(|l| format!("{}:{}", l.file(), l.line()));
    let error = uncaught_error(&panic_message(info), location.as_deref());

    tracing::error!(
        kind = error.kind().as_str(),
        %error,
        ?policy,
        "Uncaught failure"
    );
}

/// The gateway error describing a panic at `location`.
pub fn uncaught_error(message: &str, location: Option<&str>) -> GatewayError {
    match location {
        Some(location) => GatewayError::Uncaught(format!("{message} at {location}")),
        None => GatewayError::Uncaught(message.to_string()),
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn policy_follows_environment() {
        let mut config = GatewayConfig::default();
        assert_eq!(UncaughtPolicy::from_config(&config), UncaughtPolicy::Continue);

        config.environment = "production".into();
        assert_eq!(UncaughtPolicy::from_config(&config), UncaughtPolicy::Exit);

        config.exit_on_uncaught = Some(false);
        assert_eq!(UncaughtPolicy::from_config(&config), UncaughtPolicy::Continue);
    }

    #[test]
    fn panics_become_uncaught_errors() {
        let error = uncaught_error("index out of bounds", Some("src/lib.rs:10"));
        assert_eq!(error.kind(), ErrorKind::UncaughtFatal);
        assert_eq!(error.to_string(), "uncaught failure: index out of bounds at src/lib.rs:10");

        let bare = uncaught_error("boom", None);
        assert_eq!(bare.to_string(), "uncaught failure: boom");
    }
}
