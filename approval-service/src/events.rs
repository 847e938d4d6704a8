use async_trait::async_trait;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client as SnsClient;
use log::{debug, error, info};

use approval_shared::models::events::ApprovalEvent;

use crate::error::{Result, WorkflowError};

/// Sink for events emitted after a transition has been written
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &ApprovalEvent) -> Result<()>;
}

/// Publishes and logs failures instead of returning them; the transition
/// already happened.
pub async fn publish_or_log(publisher: &dyn EventPublisher, event: ApprovalEvent) {
    if let Err(err) = publisher.publish(&event).await {
        error!(
            "Failed to publish {} event for invitation {}: {}",
            event.event_type, event.invitation_id, err
        );
    }
}

pub struct SnsEventPublisher {
    client: SnsClient,
    topic_arn: String,
}

impl SnsEventPublisher {
    pub async fn new(topic_arn: &str) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::with_client(SnsClient::new(&config), topic_arn)
    }

    pub fn with_client(client: SnsClient, topic_arn: &str) -> Self {
        Self {
            client,
            topic_arn: topic_arn.to_string(),
        }
    }
}

fn publish_failure<E: std::fmt::Display>(step: &str, err: E) -> WorkflowError {
    WorkflowError::RemoteFailure(format!("SNS {} error: {}", step, err))
}

#[async_trait]
impl EventPublisher for SnsEventPublisher {
    async fn publish(&self, event: &ApprovalEvent) -> Result<()> {
        let message =
            serde_json::to_string(event).map_err(|e| publish_failure("serialize", e))?;

        let event_type = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(&event.event_type)
            .build()
            .map_err(|e| publish_failure("message_attribute", e))?;

        debug!("Publishing {} to {}", event.event_type, self.topic_arn);
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .subject("Invitation approval")
            .message_attributes("eventType", event_type)
            .send()
            .await
            .map_err(|e| publish_failure("publish", e))?;

        info!(
            "Published {} event for invitation {}",
            event.event_type, event.invitation_id
        );
        Ok(())
    }
}

/// Used when no topic is configured
#[derive(Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, event: &ApprovalEvent) -> Result<()> {
        debug!(
            "No topic configured, dropping {} event for {}",
            event.event_type, event.invitation_id
        );
        Ok(())
    }
}
