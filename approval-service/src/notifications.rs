use std::sync::Arc;

use log::{debug, error, info};
use serde::Serialize;

use approval_shared::models::{Invitation, NoticeKind};
use approval_shared::store::InvitationStore;

/// The single notification an owner sees on a page load
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub invitation_id: String,
    pub slug: String,
    pub title: String,
    pub kind: NoticeKind,
}

impl Notice {
    fn from_invitation(invitation: &Invitation, kind: NoticeKind) -> Self {
        Self {
            invitation_id: invitation.id.clone(),
            slug: invitation.slug.clone(),
            title: invitation.title(),
            kind,
        }
    }

    pub fn text(&self) -> String {
        match self.kind {
            NoticeKind::Rejection => format!(
                "\"{}\" was not approved. Check the reason and edit your invitation.",
                self.title
            ),
            NoticeKind::Approval => format!("\"{}\" has been approved and is now live.", self.title),
        }
    }
}

#[derive(Clone)]
pub struct NotificationDeduper {
    invitations: Arc<dyn InvitationStore>,
}

impl NotificationDeduper {
    pub fn new(invitations: Arc<dyn InvitationStore>) -> Self {
        Self { invitations }
    }

    /// Picks at most one notice. Any unread rejection beats any unread
    /// approval; ties go to the first invitation in list order.
    pub fn select(invitations: &[Invitation]) -> Option<Notice> {
        [NoticeKind::Rejection, NoticeKind::Approval]
            .into_iter()
            .find_map(|kind| {
                invitations
                    .iter()
                    .find(|invitation| kind.is_raised_on(invitation))
                    .map(|invitation| Notice::from_invitation(invitation, kind))
            })
    }

    /// Clears the `kind` flag on `invitation_id`, and only that flag.
    /// Failures are logged; the flag stays set and the notice shows again on
    /// the next load.
    pub async fn acknowledge(&self, invitation_id: &str, kind: NoticeKind) -> bool {
        debug!("Acknowledging {:?} notice for {}", kind, invitation_id);
        match self
            .invitations
            .mark_notification_read(invitation_id, kind)
            .await
        {
            Ok(()) => {
                info!(
                    "Cleared {} on invitation {}",
                    kind.flag_attribute(),
                    invitation_id
                );
                true
            }
            Err(err) => {
                error!(
                    "Failed to clear {} on invitation {}: {}",
                    kind.flag_attribute(),
                    invitation_id,
                    err
                );
                false
            }
        }
    }
}
