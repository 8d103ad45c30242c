//! SMS dispatch seam. The real deployment fronts an external SMS provider;
//! the daemon only needs a fire-and-forget call, so the gateway is a trait
//! injected into AppState and the default implementation logs the dispatch.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsKind {
    Welcome,
    Bulk,
}

impl SmsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsKind::Welcome => "welcome",
            SmsKind::Bulk => "bulk",
        }
    }
}

pub trait SmsGateway {
    fn send(&mut self, to: &str, message: &str, kind: SmsKind) -> anyhow::Result<()>;
}

/// Default gateway: logs the dispatch and reports success.
pub struct LogSmsGateway;

impl SmsGateway for LogSmsGateway {
    fn send(&mut self, to: &str, message: &str, kind: SmsKind) -> anyhow::Result<()> {
        log::info!("sending {} SMS to {}: {}", kind.as_str(), to, message);
        Ok(())
    }
}

pub fn welcome_message(parent_name: &str) -> String {
    format!(
        "Welcome to our school, {}! Thank you for onboarding. \
         We're excited to have your family as part of our school community.",
        parent_name
    )
}
