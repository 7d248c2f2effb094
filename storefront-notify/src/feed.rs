use std::sync::Arc;
use storefront_core::NotificationRepository;
use storefront_shared::{canonical_recipient, NotificationEvent};
use uuid::Uuid;

use crate::NotifyError;

/// Read side of the notification store, scoped to one recipient per call.
/// Recipients match case-insensitively, the same way events store them.
pub struct NotificationFeed {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationFeed {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Newest first.
    pub async fn list_for(&self, recipient: &str) -> Result<Vec<NotificationEvent>, NotifyError> {
        Ok(self.notifications.list_for(&canonical_recipient(recipient)).await?)
    }

    pub async fn unread_count_for(&self, recipient: &str) -> Result<u64, NotifyError> {
        Ok(self.notifications.unread_count_for(&canonical_recipient(recipient)).await?)
    }

    /// Marking an already-read notification is a no-op. Notifications that
    /// belong to someone else are reported as missing.
    pub async fn mark_read(&self, recipient: &str, id: Uuid) -> Result<(), NotifyError> {
        match self.notifications.find(id).await? {
            Some(event) if event.recipient == canonical_recipient(recipient) => {
                self.notifications.mark_read(id).await?;
                Ok(())
            }
            _ => Err(NotifyError::NotFound(id)),
        }
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, recipient: &str) -> Result<u64, NotifyError> {
        Ok(self.notifications.mark_all_read(&canonical_recipient(recipient)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::InMemoryNotificationRepository;

    async fn seeded() -> (NotificationFeed, NotificationEvent, NotificationEvent) {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let mine = NotificationEvent::order_created(1, "a@example.com");
        let theirs = NotificationEvent::order_created(2, "b@example.com");
        repo.insert_if_absent(&mine).await.unwrap();
        repo.insert_if_absent(&theirs).await.unwrap();
        (NotificationFeed::new(repo), mine, theirs)
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_recipient() {
        let (feed, mine, theirs) = seeded().await;

        assert!(matches!(
            feed.mark_read("a@example.com", theirs.id).await,
            Err(NotifyError::NotFound(_))
        ));
        assert!(matches!(
            feed.mark_read("a@example.com", Uuid::new_v4()).await,
            Err(NotifyError::NotFound(_))
        ));
        assert_eq!(feed.unread_count_for("b@example.com").await.unwrap(), 1);

        feed.mark_read("a@example.com", mine.id).await.unwrap();
        feed.mark_read("a@example.com", mine.id).await.unwrap();
        assert_eq!(feed.unread_count_for("a@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_all_read_leaves_other_recipients() {
        let (feed, _, _) = seeded().await;
        assert_eq!(feed.mark_all_read("a@example.com").await.unwrap(), 1);
        assert_eq!(feed.mark_all_read("a@example.com").await.unwrap(), 0);
        assert_eq!(feed.unread_count_for("b@example.com").await.unwrap(), 1);

        let listed = feed.list_for("a@example.com").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].read);
    }

    #[tokio::test]
    async fn recipient_case_does_not_split_the_feed() {
        let (feed, mine, _) = seeded().await;

        assert_eq!(feed.list_for("A@Example.com").await.unwrap().len(), 1);
        assert_eq!(feed.unread_count_for(" a@EXAMPLE.com").await.unwrap(), 1);
        feed.mark_read("A@example.COM", mine.id).await.unwrap();
        assert_eq!(feed.unread_count_for("a@example.com").await.unwrap(), 0);
        assert_eq!(feed.mark_all_read("B@EXAMPLE.COM").await.unwrap(), 1);
    }
}
