use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, ReturnValue};
use aws_sdk_dynamodb::Client;
use log::{debug, warn};
use serde_dynamo::{from_item, to_item};
use std::collections::HashMap;
use std::env;

use super::{page_newest_first, ApprovalRequestStore, InvitationStore};
use crate::error::{map_dynamo_error, map_update_dynamo_error, Result, StoreError};
use crate::models::{
    latest_request, now_str, ApprovalRequest, Invitation, NewApprovalRequest, NoticeKind,
    RequestStatus, ReviewPatch,
};

// Invitation Store Constants
const INVITATION_TABLE_NAME: &str = "invitation-table";
const GSI_SLUG: &str = "slug-index";
const GSI_OWNER_ID: &str = "ownerId-index";

// Approval Request Store Constants
const APPROVAL_REQUEST_TABLE_NAME: &str = "approval-request-table";
const GSI_INVITATION_ID: &str = "invitationId-index";
const GSI_REQUESTER_USER_ID: &str = "requesterUserId-index";

// BatchGetItem accepts at most 100 keys per call
const BATCH_GET_LIMIT: usize = 100;

// Passes over the keys BatchGetItem leaves unprocessed before giving up
const BATCH_GET_MAX_PASSES: usize = 5;

type Item = HashMap<String, AttributeValue>;

/// Keys of `table_name` still to fetch after a BatchGetItem pass.
///
/// A missing key would otherwise read as a deleted invitation, so running
/// out of passes is an error rather than a short result.
pub(crate) fn unprocessed_keys_for(
    unprocessed: Option<&HashMap<String, KeysAndAttributes>>,
    table_name: &str,
    pass: usize,
) -> Result<Option<KeysAndAttributes>> {
    let Some(remaining) = unprocessed
        .and_then(|tables| tables.get(table_name))
        .filter(|keys| !keys.keys().is_empty())
    else {
        return Ok(None);
    };

    if pass >= BATCH_GET_MAX_PASSES {
        return Err(StoreError::InternalError(format!(
            "BatchGetItem left {} key(s) unprocessed after {} passes",
            remaining.keys().len(),
            pass
        )));
    }
    warn!(
        "BatchGetItem left {} key(s) unprocessed, fetching them again",
        remaining.keys().len()
    );
    Ok(Some(remaining.clone()))
}

fn id_key(id: &str) -> Item {
    HashMap::from([("id".to_string(), AttributeValue::S(id.to_string()))])
}

/// Runs a query against a single-attribute GSI and returns every page of items.
async fn query_index(
    client: &Client,
    table_name: &str,
    index_name: &str,
    attribute: &str,
    value: &str,
) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let response = client
            .query()
            .table_name(table_name)
            .index_name(index_name)
            .key_condition_expression("#attr = :value")
            .expression_attribute_names("#attr", attribute)
            .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
            .set_exclusive_start_key(start_key.take())
            .send()
            .await
            .map_err(|e| map_dynamo_error("query", e))?;

        items.extend(response.items().iter().cloned());

        match response.last_evaluated_key() {
            Some(key) => start_key = Some(key.clone()),
            None => break,
        }
    }

    Ok(items)
}

async fn scan_table(client: &Client, table_name: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let response = client
            .scan()
            .table_name(table_name)
            .set_exclusive_start_key(start_key.take())
            .send()
            .await
            .map_err(|e| map_dynamo_error("scan", e))?;

        items.extend(response.items().iter().cloned());

        match response.last_evaluated_key() {
            Some(key) => start_key = Some(key.clone()),
            None => break,
        }
    }

    Ok(items)
}

// DynamoInvitationStore

pub struct DynamoInvitationStore {
    client: Client,
    table_name: String,
}

impl DynamoInvitationStore {
    pub async fn new() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = Client::new(&config);

        let table_name = env::var("DYNAMODB_INVITATION_TABLE")
            .unwrap_or_else(|_| INVITATION_TABLE_NAME.to_string());

        Self { client, table_name }
    }

    /// Creates a new DynamoDB store with the specified client and table name.
    /// This is mainly useful for testing with a local DynamoDB instance.
    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    async fn put(&self, invitation: &Invitation) -> Result<()> {
        let item = to_item(invitation)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| map_dynamo_error("put_item", e))?;

        Ok(())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Invitation>> {
        let items = query_index(&self.client, &self.table_name, GSI_SLUG, "slug", slug).await?;

        match items.into_iter().next() {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl InvitationStore for DynamoInvitationStore {
    async fn get_by_id(&self, id: &str) -> Result<Invitation> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(id_key(id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_dynamo_error("get_item", e))?;

        let item = response
            .item()
            .ok_or_else(|| StoreError::NotFound(format!("Invitation with id {} not found", id)))?;

        Ok(from_item(item.clone())?)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Invitation> {
        self.find_by_slug(slug).await?.ok_or_else(|| {
            StoreError::NotFound(format!("Invitation with slug {} not found", slug))
        })
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invitation>> {
        let items =
            query_index(&self.client, &self.table_name, GSI_OWNER_ID, "ownerId", owner_id).await?;

        let mut invitations = Vec::with_capacity(items.len());
        for item in items {
            let invitation: Invitation = from_item(item)?;
            invitations.push(invitation);
        }
        invitations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(invitations)
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Invitation>> {
        let mut found: HashMap<String, Invitation> = HashMap::new();

        for chunk in ids.chunks(BATCH_GET_LIMIT) {
            let keys: Vec<Item> = chunk.iter().map(|id| id_key(id)).collect();
            let mut request = Some(
                KeysAndAttributes::builder()
                    .set_keys(Some(keys))
                    .build()
                    .map_err(|e| map_dynamo_error("batch_get_item", e))?,
            );
            let mut pass = 0;

            while let Some(keys_and_attributes) = request.take() {
                pass += 1;
                let response = self
                    .client
                    .batch_get_item()
                    .request_items(self.table_name.clone(), keys_and_attributes)
                    .send()
                    .await
                    .map_err(|e| map_dynamo_error("batch_get_item", e))?;

                let items = response
                    .responses()
                    .and_then(|tables| tables.get(&self.table_name))
                    .cloned()
                    .unwrap_or_default();
                for item in items {
                    let invitation: Invitation = from_item(item)?;
                    found.insert(invitation.id.clone(), invitation);
                }

                request = unprocessed_keys_for(response.unprocessed_keys(), &self.table_name, pass)?;
            }
        }

        // Keep the caller's order
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn save(
        &self,
        slug: &str,
        content: serde_json::Value,
        owner_id: &str,
    ) -> Result<Invitation> {
        let invitation = match self.find_by_slug(slug).await? {
            Some(existing) if existing.owner_id != owner_id => {
                return Err(StoreError::AuthError(format!(
                    "Invitation {} belongs to another user",
                    slug
                )));
            }
            Some(existing) => Invitation {
                content,
                updated_at: now_str(),
                ..existing
            },
            None => Invitation::new_draft(slug, content, owner_id),
        };

        self.put(&invitation).await?;
        debug!("Saved invitation {} (slug {})", invitation.id, slug);

        Ok(invitation)
    }

    async fn update_review(&self, id: &str, patch: ReviewPatch) -> Result<Invitation> {
        if patch.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut assignments = vec!["#updatedAt = :updatedAt".to_string()];
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(id_key(id)))
            .condition_expression("attribute_exists(id)")
            .expression_attribute_names("#updatedAt", "updatedAt")
            .expression_attribute_values(":updatedAt", AttributeValue::S(now_str()))
            .return_values(ReturnValue::AllNew);

        if let Some(status) = patch.status {
            assignments.push("#status = :status".to_string());
            request = request
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":status", AttributeValue::S(status.as_str().into()));
        }
        if let Some(flag) = patch.has_new_approval {
            let attribute = NoticeKind::Approval.flag_attribute();
            assignments.push(format!("#{0} = :{0}", attribute));
            request = request
                .expression_attribute_names(format!("#{}", attribute), attribute)
                .expression_attribute_values(format!(":{}", attribute), AttributeValue::Bool(flag));
        }
        if let Some(flag) = patch.has_new_rejection {
            let attribute = NoticeKind::Rejection.flag_attribute();
            assignments.push(format!("#{0} = :{0}", attribute));
            request = request
                .expression_attribute_names(format!("#{}", attribute), attribute)
                .expression_attribute_values(format!(":{}", attribute), AttributeValue::Bool(flag));
        }

        let response = request
            .update_expression(format!("SET {}", assignments.join(", ")))
            .send()
            .await
            .map_err(|e| map_update_dynamo_error(e, id))?;

        let item = response.attributes().ok_or_else(|| {
            StoreError::InternalError(format!("update_item returned no attributes for {}", id))
        })?;

        Ok(from_item(item.clone())?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        // Verify invitation exists first
        self.get_by_id(id).await?;

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(id_key(id)))
            .send()
            .await
            .map_err(|e| map_dynamo_error("delete_item", e))?;

        Ok(())
    }

    async fn mark_notification_read(&self, id: &str, kind: NoticeKind) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(id_key(id)))
            .condition_expression("attribute_exists(id)")
            .update_expression("SET #flag = :cleared")
            .expression_attribute_names("#flag", kind.flag_attribute())
            .expression_attribute_values(":cleared", AttributeValue::Bool(false))
            .send()
            .await
            .map_err(|e| map_update_dynamo_error(e, id))?;

        Ok(())
    }
}

// DynamoApprovalRequestStore

pub struct DynamoApprovalRequestStore {
    client: Client,
    table_name: String,
}

impl DynamoApprovalRequestStore {
    pub async fn new() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = Client::new(&config);

        let table_name = env::var("DYNAMODB_APPROVAL_REQUEST_TABLE")
            .unwrap_or_else(|_| APPROVAL_REQUEST_TABLE_NAME.to_string());

        Self { client, table_name }
    }

    /// Creates a new DynamoDB store with the specified client and table name.
    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    async fn put(&self, request: &ApprovalRequest) -> Result<()> {
        let item = to_item(request)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| map_dynamo_error("put_item", e))?;

        Ok(())
    }

    async fn for_invitation(&self, invitation_id: &str) -> Result<Vec<ApprovalRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            GSI_INVITATION_ID,
            "invitationId",
            invitation_id,
        )
        .await?;

        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let request: ApprovalRequest = from_item(item)?;
            requests.push(request);
        }
        Ok(requests)
    }

    async fn latest_or_not_found(&self, invitation_id: &str) -> Result<ApprovalRequest> {
        let requests = self.for_invitation(invitation_id).await?;

        latest_request(&requests).cloned().ok_or_else(|| {
            StoreError::NotFound(format!(
                "No approval request for invitation: {}",
                invitation_id
            ))
        })
    }
}

#[async_trait]
impl ApprovalRequestStore for DynamoApprovalRequestStore {
    async fn create(&self, request: NewApprovalRequest) -> Result<ApprovalRequest> {
        // Not atomic with the put below; the engine's lock covers one client
        let existing = self.for_invitation(&request.invitation_id).await?;
        if existing.iter().any(|r| r.status == RequestStatus::Pending) {
            return Err(StoreError::Conflict(format!(
                "Invitation {} already has a pending approval request",
                request.invitation_id
            )));
        }

        let created = ApprovalRequest::from_new(request);
        self.put(&created).await?;
        Ok(created)
    }

    async fn cancel(&self, invitation_id: &str) -> Result<()> {
        let pending = self
            .for_invitation(invitation_id)
            .await?
            .into_iter()
            .find(|r| r.status == RequestStatus::Pending)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "No pending approval request for invitation: {}",
                    invitation_id
                ))
            })?;

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(id_key(&pending.id)))
            .send()
            .await
            .map_err(|e| map_dynamo_error("delete_item", e))?;

        Ok(())
    }

    async fn approve(&self, invitation_id: &str) -> Result<ApprovalRequest> {
        let mut request = self.latest_or_not_found(invitation_id).await?;

        if request.approve()? {
            self.put(&request).await?;
        }
        Ok(request)
    }

    async fn reject(&self, invitation_id: &str, reason: &str) -> Result<ApprovalRequest> {
        let mut request = self.latest_or_not_found(invitation_id).await?;

        request.reject(reason)?;
        self.put(&request).await?;
        Ok(request)
    }

    async fn latest_for_invitation(&self, invitation_id: &str) -> Result<Option<ApprovalRequest>> {
        let requests = self.for_invitation(invitation_id).await?;
        Ok(latest_request(&requests).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApprovalRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            GSI_REQUESTER_USER_ID,
            "requesterUserId",
            owner_id,
        )
        .await?;

        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let request: ApprovalRequest = from_item(item)?;
            requests.push(request);
        }
        Ok(requests)
    }

    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<ApprovalRequest>> {
        // A table scan; the moderation queue is small enough not to need a
        // time-ordered index yet
        let items = scan_table(&self.client, &self.table_name).await?;

        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let request: ApprovalRequest = from_item(item)?;
            requests.push(request);
        }

        Ok(page_newest_first(requests, limit, offset))
    }
}
