/// One-time code delivery
use crate::error::AppResult;
use async_trait::async_trait;

/// Why a code was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Registration,
    Login,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Registration => "registration",
            OtpPurpose::Login => "login",
        }
    }
}

/// Channel that gets a code to the phone's owner
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, phone: &str, code: &str, purpose: OtpPurpose) -> AppResult<()>;
}

/// Writes the code to the log instead of sending it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, phone: &str, code: &str, purpose: OtpPurpose) -> AppResult<()> {
        tracing::info!(phone, code, purpose = purpose.as_str(), "one-time code issued");
        Ok(())
    }
}
