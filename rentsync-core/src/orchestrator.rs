//! Sync orchestration: manual and webhook-triggered passes.
//!
//! Ties the ledger, cursor store, reconciler and the provider client
//! together. Passes for one (account, calendar) are serialized through a
//! keyed async mutex so two triggers cannot read the same token, fetch
//! overlapping pages and write divergent continuation tokens; different
//! calendars run in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::CalendarAccount;
use crate::error::{SyncError, SyncResult};
use crate::event::CalendarProvider;
use crate::feed;
use crate::provider::{CalendarApi, CalendarInfo, ProviderError, SyncCursor};
use crate::reconcile::{EventLinkStore, ReconcileOutcome, Reconciler};
use crate::store::{AccountStore, BookingStore, CustomerStore, PropertyStore};
use crate::subscription::{CalendarSubscription, SubscriptionStore};
use crate::sync_state::SyncStateStore;
use crate::webhook::{PushNotification, WebhookLedger};

/// What one sync pass did.
#[derive(Debug, Default)]
pub struct SyncPassSummary {
    pub received: usize,
    pub outcome: ReconcileOutcome,
    /// Whether the service handed back a fresh continuation token.
    pub cursor_advanced: bool,
}

pub struct SyncOrchestrator<C: CalendarApi> {
    api: C,
    pub bookings: Arc<BookingStore>,
    pub properties: Arc<PropertyStore>,
    pub customers: Arc<CustomerStore>,
    pub accounts: Arc<AccountStore>,
    pub links: Arc<EventLinkStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub sync_states: Arc<SyncStateStore>,
    reconciler: Reconciler,
    ledger: WebhookLedger,
    webhook_secret: String,
    callback_url: String,
    in_flight: AsyncMutex<HashMap<(u64, String), Arc<AsyncMutex<()>>>>,
}

impl<C: CalendarApi> SyncOrchestrator<C> {
    pub fn new(api: C, webhook_secret: &str, callback_url: &str) -> Self {
        let bookings = Arc::new(BookingStore::new());
        let properties = Arc::new(PropertyStore::new());
        let customers = Arc::new(CustomerStore::new());
        let links = Arc::new(EventLinkStore::new());
        let reconciler = Reconciler::new(
            Arc::clone(&bookings),
            Arc::clone(&properties),
            Arc::clone(&customers),
            Arc::clone(&links),
        );
        SyncOrchestrator {
            api,
            bookings,
            properties,
            customers,
            accounts: Arc::new(AccountStore::new()),
            links,
            subscriptions: Arc::new(SubscriptionStore::new()),
            sync_states: Arc::new(SyncStateStore::new()),
            reconciler,
            ledger: WebhookLedger::new(),
            webhook_secret: webhook_secret.to_string(),
            callback_url: callback_url.to_string(),
            in_flight: AsyncMutex::new(HashMap::new()),
        }
    }

    /// One sync pass for a calendar: delta fetch when a token is stored,
    /// otherwise a forward-looking full fetch. An expired token clears the
    /// cursor and retries the pass as a full fetch.
    pub async fn run_sync_pass(
        &self,
        account_id: u64,
        calendar_id: &str,
    ) -> SyncResult<SyncPassSummary> {
        let gate = self.pass_gate(account_id, calendar_id).await;
        let _serialized = gate.lock().await;

        let account = self.valid_account(account_id).await?;
        let state = self.sync_states.get_or_create(account_id, calendar_id);
        let cursor = match state.sync_token {
            Some(token) => SyncCursor::Token(token),
            None => SyncCursor::TimeMin(Utc::now()),
        };

        match self.fetch_and_reconcile(&account, calendar_id, &cursor).await {
            Ok(summary) => Ok(summary),
            Err(ProviderError::ExpiredSyncToken) => {
                warn!(calendar_id, "sync token expired, falling back to full fetch");
                self.sync_states.clear_token(account_id, calendar_id);
                let full = SyncCursor::TimeMin(Utc::now());
                self.fetch_and_reconcile(&account, calendar_id, &full)
                    .await
                    .map_err(SyncError::from)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_and_reconcile(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        cursor: &SyncCursor,
    ) -> Result<SyncPassSummary, ProviderError> {
        let mut summary = SyncPassSummary::default();
        let mut page_token: Option<String> = None;
        let mut new_sync_token: Option<String> = None;

        loop {
            let page = self
                .api
                .list_events(account, calendar_id, cursor, page_token.as_deref())
                .await?;
            summary.received += page.events.len();
            // Every page goes through the reconciler before the cursor moves
            summary
                .outcome
                .add(&self.reconciler.reconcile(calendar_id, &page.events));
            if let Some(token) = page.next_sync_token {
                new_sync_token = Some(token);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(token) = &new_sync_token {
            self.sync_states.complete_pass(account.id, calendar_id, token);
            summary.cursor_advanced = true;
        }
        info!(
            calendar_id,
            received = summary.received,
            "sync pass finished"
        );
        Ok(summary)
    }

    /// Webhook entry point. Returns whether this delivery was accepted for
    /// processing (`false` means an already-processed duplicate). Sync
    /// failures behind an accepted notification are absorbed here: the
    /// cursor stays put and the next trigger retries naturally.
    pub async fn handle_notification(&self, notification: &PushNotification) -> SyncResult<bool> {
        if notification.channel_token != self.webhook_secret {
            return Err(SyncError::Forbidden);
        }

        let key = notification.idempotency_key(CalendarProvider::Google.as_str());
        if !self.ledger.record(&key) {
            debug!(key, "duplicate webhook delivery, ignoring");
            return Ok(false);
        }

        match self
            .subscriptions
            .find_active_by_resource_id(&notification.resource_id)
        {
            Some(subscription) => {
                if let Err(err) = self
                    .run_sync_pass(subscription.account_id, &subscription.calendar_id)
                    .await
                {
                    warn!(
                        %err,
                        calendar_id = %subscription.calendar_id,
                        "webhook-triggered sync failed"
                    );
                }
            }
            None => {
                warn!(
                    resource_id = %notification.resource_id,
                    "notification for unknown channel"
                );
            }
        }
        Ok(true)
    }

    /// Calendars visible to a linked account, for the owner to pick a
    /// property mapping from.
    pub async fn list_calendars(&self, account_id: u64) -> SyncResult<Vec<CalendarInfo>> {
        let account = self.valid_account(account_id).await?;
        Ok(self.api.list_calendars(&account).await?)
    }

    /// Register a push channel for a calendar.
    pub async fn start_watch(
        &self,
        account_id: u64,
        calendar_id: &str,
    ) -> SyncResult<CalendarSubscription> {
        let account = self.valid_account(account_id).await?;
        let channel_id = Uuid::new_v4().to_string();
        let registration = self
            .api
            .watch(
                &account,
                calendar_id,
                &channel_id,
                &self.callback_url,
                &self.webhook_secret,
            )
            .await?;
        Ok(self.subscriptions.insert(
            account_id,
            calendar_id,
            &registration.channel_id,
            &registration.resource_id,
            &self.webhook_secret,
            registration.expiration,
        ))
    }

    /// Stop a push channel. The local subscription is deactivated even when
    /// the service call fails; an expired channel on their side should not
    /// keep a dead row active on ours.
    pub async fn stop_watch(&self, channel_id: &str, resource_id: &str) -> SyncResult<()> {
        let subscription = self
            .subscriptions
            .find_by_channel_id(channel_id)
            .ok_or_else(|| SyncError::SubscriptionNotFound(channel_id.to_string()))?;
        let account = self.valid_account(subscription.account_id).await?;

        let result = self.api.stop(&account, channel_id, resource_id).await;
        self.subscriptions.deactivate(channel_id, resource_id);
        if let Err(err) = result {
            warn!(channel_id, %err, "stop channel call failed, deactivated locally");
        }
        Ok(())
    }

    /// One-way feed reconciliation for a property.
    pub fn import_feed(&self, property_id: u64, feed_content: &str) -> SyncResult<ReconcileOutcome> {
        let property = self
            .properties
            .get(property_id)
            .ok_or(SyncError::PropertyNotFound(property_id))?;
        let events = feed::parse_feed(feed_content)?;
        Ok(self.reconciler.reconcile_into(&property, &events))
    }

    /// Account with a usable access token, refreshing through the provider
    /// when the stored one expired.
    async fn valid_account(&self, account_id: u64) -> SyncResult<CalendarAccount> {
        let account = self
            .accounts
            .get(account_id)
            .ok_or(SyncError::AccountNotFound(account_id))?;
        if !account.needs_refresh() {
            return Ok(account);
        }
        debug!(account_id, "access token expired, refreshing");
        let tokens = self.api.refresh_tokens(&account).await?;
        Ok(self.accounts.update_tokens(account_id, &tokens)?)
    }

    async fn pass_gate(&self, account_id: u64, calendar_id: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = self.in_flight.lock().await;
        Arc::clone(
            gates
                .entry((account_id, calendar_id.to_string()))
                .or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::TokenSet;
    use crate::event::{EventDate, EventUid, ExternalEvent, ExternalEventStatus};
    use crate::provider::{EventsPage, WatchRegistration};
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn page_event(uid: &str, check_in: NaiveDate, check_out: NaiveDate) -> ExternalEvent {
        ExternalEvent {
            uid: EventUid::new(CalendarProvider::Google, uid),
            provider: CalendarProvider::Google,
            status: ExternalEventStatus::Confirmed,
            start: Some(EventDate::Date(check_in)),
            end: Some(EventDate::Date(check_out)),
            attendee_emails: vec![],
            creator_email: None,
            organizer_email: None,
        }
    }

    #[derive(Default)]
    struct MockApi {
        cursors: StdMutex<Vec<SyncCursor>>,
        pages: StdMutex<VecDeque<Result<EventsPage, ProviderError>>>,
        stop_fails: bool,
    }

    impl MockApi {
        fn queue(&self, page: Result<EventsPage, ProviderError>) {
            self.pages.lock().unwrap().push_back(page);
        }

        fn recorded_cursors(&self) -> Vec<SyncCursor> {
            self.cursors.lock().unwrap().clone()
        }

        fn list_calls(&self) -> usize {
            self.cursors.lock().unwrap().len()
        }
    }

    impl CalendarApi for MockApi {
        async fn list_calendars(
            &self,
            _account: &CalendarAccount,
        ) -> Result<Vec<CalendarInfo>, ProviderError> {
            Ok(vec![
                CalendarInfo {
                    id: "owner@example.com".to_string(),
                    summary: "Owner".to_string(),
                    primary: true,
                },
                CalendarInfo {
                    id: "cal-1".to_string(),
                    summary: "Seaside flat".to_string(),
                    primary: false,
                },
            ])
        }

        async fn list_events(
            &self,
            _account: &CalendarAccount,
            _calendar_id: &str,
            cursor: &SyncCursor,
            _page_token: Option<&str>,
        ) -> Result<EventsPage, ProviderError> {
            self.cursors.lock().unwrap().push(cursor.clone());
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(EventsPage::default()))
        }

        async fn watch(
            &self,
            _account: &CalendarAccount,
            _calendar_id: &str,
            channel_id: &str,
            _callback_url: &str,
            _verification_token: &str,
        ) -> Result<WatchRegistration, ProviderError> {
            Ok(WatchRegistration {
                channel_id: channel_id.to_string(),
                resource_id: "res-mock".to_string(),
                expiration: None,
            })
        }

        async fn stop(
            &self,
            _account: &CalendarAccount,
            _channel_id: &str,
            _resource_id: &str,
        ) -> Result<(), ProviderError> {
            if self.stop_fails {
                Err(ProviderError::Transient("boom".into()))
            } else {
                Ok(())
            }
        }

        async fn refresh_tokens(
            &self,
            _account: &CalendarAccount,
        ) -> Result<TokenSet, ProviderError> {
            Ok(TokenSet {
                access_token: "fresh".to_string(),
                refresh_token: None,
                expires_at: None,
            })
        }
    }

    fn orchestrator_with(api: MockApi) -> SyncOrchestrator<MockApi> {
        let orchestrator = SyncOrchestrator::new(api, "secret", "https://crm.example/webhook");
        orchestrator.accounts.link(
            "owner",
            CalendarProvider::Google,
            "owner@example.com",
            "at",
            "rt",
            None,
        );
        orchestrator
    }

    #[tokio::test]
    async fn test_first_pass_uses_time_min_not_delta() {
        let api = MockApi::default();
        api.queue(Ok(EventsPage {
            events: vec![],
            next_page_token: None,
            next_sync_token: Some("tok-1".into()),
        }));
        let orchestrator = orchestrator_with(api);

        orchestrator.run_sync_pass(1, "cal-1").await.unwrap();
        assert!(matches!(
            orchestrator.api.recorded_cursors()[0],
            SyncCursor::TimeMin(_)
        ));

        // Second pass replays the persisted token as a delta request
        orchestrator.api.queue(Ok(EventsPage::default()));
        orchestrator.run_sync_pass(1, "cal-1").await.unwrap();
        match &orchestrator.api.recorded_cursors()[1] {
            SyncCursor::Token(token) => assert_eq!(token, "tok-1"),
            other => panic!("expected delta cursor, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pages_reconcile_before_cursor_advances() {
        let api = MockApi::default();
        api.queue(Ok(EventsPage {
            events: vec![page_event("e1", date(2025, 5, 1), date(2025, 5, 4))],
            next_page_token: Some("page-2".into()),
            next_sync_token: None,
        }));
        api.queue(Ok(EventsPage {
            events: vec![page_event("e2", date(2025, 5, 10), date(2025, 5, 12))],
            next_page_token: None,
            next_sync_token: Some("tok-1".into()),
        }));
        let orchestrator = orchestrator_with(api);
        let property = orchestrator.properties.create("Flat", Some("cal-1".into()));

        let summary = orchestrator.run_sync_pass(1, "cal-1").await.unwrap();
        assert_eq!(summary.received, 2);
        assert_eq!(summary.outcome.created, 2);
        assert!(summary.cursor_advanced);
        assert_eq!(orchestrator.bookings.list_for_property(property.id).len(), 2);
        assert_eq!(
            orchestrator
                .sync_states
                .get_or_create(1, "cal-1")
                .sync_token
                .as_deref(),
            Some("tok-1")
        );
    }

    #[tokio::test]
    async fn test_expired_token_resets_cursor_and_refetches() {
        let api = MockApi::default();
        api.queue(Ok(EventsPage {
            events: vec![],
            next_page_token: None,
            next_sync_token: Some("stale".into()),
        }));
        let orchestrator = orchestrator_with(api);
        orchestrator.run_sync_pass(1, "cal-1").await.unwrap();

        orchestrator.api.queue(Err(ProviderError::ExpiredSyncToken));
        orchestrator.api.queue(Ok(EventsPage {
            events: vec![],
            next_page_token: None,
            next_sync_token: Some("fresh".into()),
        }));
        let summary = orchestrator.run_sync_pass(1, "cal-1").await.unwrap();
        assert!(summary.cursor_advanced);

        let cursors = orchestrator.api.recorded_cursors();
        assert!(matches!(cursors[1], SyncCursor::Token(_)));
        assert!(matches!(cursors[2], SyncCursor::TimeMin(_)));
        assert_eq!(
            orchestrator
                .sync_states
                .get_or_create(1, "cal-1")
                .sync_token
                .as_deref(),
            Some("fresh")
        );
    }

    #[tokio::test]
    async fn test_expired_access_token_is_refreshed_and_persisted() {
        let orchestrator =
            SyncOrchestrator::new(MockApi::default(), "secret", "https://crm.example/webhook");
        let account = orchestrator.accounts.link(
            "owner",
            CalendarProvider::Google,
            "owner@example.com",
            "stale",
            "rt",
            Some(Utc::now() - chrono::Duration::hours(1)),
        );

        orchestrator.run_sync_pass(account.id, "cal-1").await.unwrap();
        let refreshed = orchestrator.accounts.get(account.id).unwrap();
        assert_eq!(refreshed.access_token, "fresh");
    }

    #[tokio::test]
    async fn test_transient_failure_leaves_cursor_unchanged() {
        let api = MockApi::default();
        api.queue(Err(ProviderError::Transient("503".into())));
        let orchestrator = orchestrator_with(api);

        let err = orchestrator.run_sync_pass(1, "cal-1").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Provider(ProviderError::Transient(_))
        ));
        let state = orchestrator.sync_states.get_or_create(1, "cal-1");
        assert!(state.sync_token.is_none());
        assert!(state.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_webhook_replay_processes_once() {
        let api = MockApi::default();
        api.queue(Ok(EventsPage {
            events: vec![],
            next_page_token: None,
            next_sync_token: Some("tok".into()),
        }));
        let orchestrator = orchestrator_with(api);
        orchestrator
            .subscriptions
            .insert(1, "cal-1", "chan-1", "res-1", "secret", None);

        let notification = PushNotification {
            channel_id: "chan-1".into(),
            channel_token: "secret".into(),
            resource_id: "res-1".into(),
            message_number: "7".into(),
        };

        assert!(orchestrator.handle_notification(&notification).await.unwrap());
        assert!(!orchestrator.handle_notification(&notification).await.unwrap());
        assert_eq!(orchestrator.api.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_webhook_token_mismatch_is_forbidden() {
        let orchestrator = orchestrator_with(MockApi::default());
        let notification = PushNotification {
            channel_id: "chan-1".into(),
            channel_token: "wrong".into(),
            resource_id: "res-1".into(),
            message_number: "7".into(),
        };
        let err = orchestrator
            .handle_notification(&notification)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Forbidden));
        // Rejected deliveries never reach the ledger: the same message with
        // the right token still processes
        let ok = PushNotification {
            channel_token: "secret".into(),
            ..notification
        };
        assert!(orchestrator.handle_notification(&ok).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_watch_deactivates_even_when_call_fails() {
        let api = MockApi {
            stop_fails: true,
            ..MockApi::default()
        };
        let orchestrator = orchestrator_with(api);
        let subscription = orchestrator.start_watch(1, "cal-1").await.unwrap();

        orchestrator
            .stop_watch(&subscription.channel_id, &subscription.resource_id)
            .await
            .unwrap();
        assert!(
            orchestrator
                .subscriptions
                .find_active_by_resource_id(&subscription.resource_id)
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_list_calendars_requires_linked_account() {
        let orchestrator = orchestrator_with(MockApi::default());

        let calendars = orchestrator.list_calendars(1).await.unwrap();
        assert_eq!(calendars.len(), 2);
        assert!(calendars[0].primary);
        assert_eq!(calendars[1].id, "cal-1");

        let err = orchestrator.list_calendars(99).await.unwrap_err();
        assert!(matches!(err, SyncError::AccountNotFound(99)));
    }

    #[tokio::test]
    async fn test_import_feed_reconciles_into_property() {
        let orchestrator = orchestrator_with(MockApi::default());
        let property = orchestrator.properties.create("Flat", None);

        let feed = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:stay-1@channel.example\r\n\
DTSTART;VALUE=DATE:20250601\r\n\
DTEND;VALUE=DATE:20250605\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let outcome = orchestrator.import_feed(property.id, feed).unwrap();
        assert_eq!(outcome.created, 1);

        // Re-import converges instead of duplicating
        let outcome = orchestrator.import_feed(property.id, feed).unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(orchestrator.bookings.list_for_property(property.id).len(), 1);
    }
}
