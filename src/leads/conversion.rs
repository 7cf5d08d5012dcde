use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{CustomerRef, Lead, LeadSource};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    #[error("customer service unavailable: {0}")]
    Unavailable(String),
    #[error("customer service rejected the lead: {0}")]
    Rejected(String),
    #[error("customer service timed out after {0:?}")]
    Timeout(Duration),
}

/// Payload handed to the customer module when a lead converts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub lead_id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub expected_value: BigDecimal,
    pub source: LeadSource,
}

impl ConversionRequest {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id,
            hub_id: lead.hub_id,
            name: lead.customer_display_name().to_string(),
            contact_name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            company: lead.company.clone(),
            expected_value: lead.value.clone(),
            source: lead.source,
        }
    }
}

/// Outbound contract to the customer module.
///
/// Implementations should treat repeated calls for the same `lead_id` as
/// the same request; the state machine itself only calls once per lead.
#[async_trait]
pub trait CustomerConversionPort: Send + Sync {
    async fn convert(&self, request: &ConversionRequest) -> Result<CustomerRef, ConversionError>;
}

pub async fn convert_with_timeout(
    port: &dyn CustomerConversionPort,
    request: &ConversionRequest,
    timeout: Duration,
) -> Result<CustomerRef, ConversionError> {
    match tokio::time::timeout(timeout, port.convert(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "Customer conversion for lead {} timed out after {:?}",
                request.lead_id, timeout
            );
            Err(ConversionError::Timeout(timeout))
        }
    }
}

/// Used when the customer module is not installed: every call fails, so
/// won leads stay unconverted and a note records why.
pub struct DisabledConversion;

#[async_trait]
impl CustomerConversionPort for DisabledConversion {
    async fn convert(&self, _request: &ConversionRequest) -> Result<CustomerRef, ConversionError> {
        Err(ConversionError::Unavailable(
            "customer module is not configured".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedCustomer {
    id: String,
}

/// Talks to the customer module's REST API.
pub struct HttpCustomerConversion {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpCustomerConversion {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }
}

#[async_trait]
impl CustomerConversionPort for HttpCustomerConversion {
    async fn convert(&self, request: &ConversionRequest) -> Result<CustomerRef, ConversionError> {
        let url = format!("{}/api/customers", self.base_url);
        debug!("Creating customer for lead {} at {url}", request.lead_id);

        let mut builder = self
            .client
            .post(&url)
            .header("Idempotency-Key", request.lead_id.to_string())
            .json(request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConversionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::Rejected(format!("{status}: {body}")));
        }

        let created: CreatedCustomer = response
            .json()
            .await
            .map_err(|e| ConversionError::Rejected(format!("unreadable response: {e}")))?;
        if created.id.trim().is_empty() {
            return Err(ConversionError::Rejected("empty customer id".to_string()));
        }
        Ok(CustomerRef(created.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::types::{LeadPriority, LeadStatus};
    use chrono::Utc;

    fn sample_lead() -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            hub_id: Uuid::new_v4(),
            name: "Grace Hopper".to_string(),
            email: Some("grace@example.com".to_string()),
            phone: None,
            company: Some("Navy".to_string()),
            value: BigDecimal::from(1500),
            expected_close_date: None,
            pipeline_id: Uuid::new_v4(),
            stage_id: Uuid::new_v4(),
            assigned_to: None,
            customer_ref: None,
            converted: false,
            source: LeadSource::Referral,
            priority: LeadPriority::High,
            notes: None,
            status: LeadStatus::Won,
            won_date: Some(now),
            lost_date: None,
            loss_reason_id: None,
            stage_changed_at: now,
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    struct SlowPort;

    #[async_trait]
    impl CustomerConversionPort for SlowPort {
        async fn convert(
            &self,
            _request: &ConversionRequest,
        ) -> Result<CustomerRef, ConversionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CustomerRef("late".to_string()))
        }
    }

    #[test]
    fn test_request_prefers_company_name() {
        let lead = sample_lead();
        let request = ConversionRequest::from_lead(&lead);
        assert_eq!(request.name, "Navy");
        assert_eq!(request.contact_name, "Grace Hopper");
        assert_eq!(request.source, LeadSource::Referral);

        let mut no_company = lead;
        no_company.company = Some("  ".to_string());
        assert_eq!(ConversionRequest::from_lead(&no_company).name, "Grace Hopper");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let request = ConversionRequest::from_lead(&sample_lead());
        let err = convert_with_timeout(&SlowPort, &request, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_disabled_conversion_fails() {
        let request = ConversionRequest::from_lead(&sample_lead());
        let err = DisabledConversion.convert(&request).await.unwrap_err();
        assert!(matches!(err, ConversionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_http_conversion_returns_customer_id() {
        let mut server = mockito::Server::new_async().await;
        let lead = sample_lead();
        let mock = server
            .mock("POST", "/api/customers")
            .match_header("idempotency-key", lead.id.to_string().as_str())
            .match_header("authorization", "Bearer secret")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "cust-42", "name": "Navy"}"#)
            .create_async()
            .await;

        let port = HttpCustomerConversion::new(format!("{}/", server.url()), Some("secret".into()));
        let customer = port
            .convert(&ConversionRequest::from_lead(&lead))
            .await
            .unwrap();

        assert_eq!(customer, CustomerRef("cust-42".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_conversion_maps_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/customers")
            .with_status(422)
            .with_body("missing email")
            .create_async()
            .await;

        let port = HttpCustomerConversion::new(server.url(), None);
        let err = port
            .convert(&ConversionRequest::from_lead(&sample_lead()))
            .await
            .unwrap_err();

        match err {
            ConversionError::Rejected(msg) => assert!(msg.contains("missing email")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
