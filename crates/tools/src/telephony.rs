//! A Twilio-compatible REST `TelephonyControl` adapter: both operations are
//! just authenticated `POST`s against the `Calls(:Sid)` resource, so no
//! client library is pulled in for two form fields.

use crate::executor::TelephonyControl;
use crate::ToolError;

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub api_base: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            api_base: "https://api.twilio.com/2010-04-01".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TwilioTelephony {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioTelephony {
    pub fn new(config: TwilioConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    fn call_url(&self, call_id: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{call_id}.json",
            self.config.api_base, self.config.account_sid
        )
    }
}

#[async_trait::async_trait]
impl TelephonyControl for TwilioTelephony {
    async fn mark_completed(&self, call_id: &str) -> Result<(), ToolError> {
        let response = self
            .http
            .post(self.call_url(call_id))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await
            .map_err(|e| ToolError::Telephony(format!("mark_completed request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Telephony(format!(
                "mark_completed returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn dial_transfer(&self, call_id: &str, number: &str) -> Result<(), ToolError> {
        let twiml = format!("<Response><Dial>{number}</Dial></Response>");
        let response = self
            .http
            .post(self.call_url(call_id))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Twiml", twiml.as_str())])
            .send()
            .await
            .map_err(|e| ToolError::Telephony(format!("dial_transfer request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Telephony(format!(
                "dial_transfer returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
