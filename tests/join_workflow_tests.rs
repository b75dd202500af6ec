//! Integration tests for the join workflow.
//!
//! A scripted provider stands in for the messaging platform: each test sets the
//! replies it needs and then checks the outcome, the recorded join log, and the
//! exact provider calls that were made.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use linkjoin::config::{AppConfig, JoinSettings, StorageSettings};
use linkjoin::coordinator::{CoordinatorError, JoinCoordinator, JoinService};
use linkjoin::error::ErrorKind;
use linkjoin::joinlog::{
    FileJoinLogStore, JoinAttempt, JoinLogError, JoinLogResult, JoinLogStore, JoinLogUpdate,
    JoinState, MemoryJoinLogStore, NewJoinAttempt,
};
use linkjoin::provider::{
    AccountIdentity, ChatEntity, InviteCheck, InviteImport, ProviderClient, ProviderConnection,
    ProviderConnector, ProviderCredentials, ProviderError, ProviderResult,
};

// ============================================================================
// Scripted provider
// ============================================================================

struct ScriptedClient {
    resolve: HashMap<String, Result<ChatEntity, String>>,
    join_error: Option<String>,
    import: Result<InviteImport, String>,
    check: Result<InviteCheck, String>,
    send_error: Option<String>,
    me: Result<AccountIdentity, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self {
            resolve: HashMap::new(),
            join_error: None,
            import: Err("INVITE_HASH_INVALID".to_string()),
            check: Err("INVITE_HASH_INVALID".to_string()),
            send_error: None,
            me: Ok(AccountIdentity {
                username: Some("joiner".to_string()),
                ..Default::default()
            }),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedClient {
    fn resolving(mut self, reference: &str, reply: Result<ChatEntity, &str>) -> Self {
        self.resolve
            .insert(reference.to_string(), reply.map_err(str::to_string));
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    async fn resolve_entity(&self, reference: &str) -> ProviderResult<ChatEntity> {
        self.record(format!("resolve_entity:{}", reference));
        self.pause().await;
        match self.resolve.get(reference) {
            Some(Ok(entity)) => Ok(entity.clone()),
            Some(Err(e)) => Err(ProviderError::new(e.clone())),
            None => Err(ProviderError::new("400: USERNAME_NOT_OCCUPIED")),
        }
    }

    async fn join_by_username(&self, entity: &ChatEntity) -> ProviderResult<()> {
        self.record(format!("join_by_username:{}", entity.id));
        self.pause().await;
        match &self.join_error {
            Some(e) => Err(ProviderError::new(e.clone())),
            None => Ok(()),
        }
    }

    async fn import_invite(&self, hash: &str) -> ProviderResult<InviteImport> {
        self.record(format!("import_invite:{}", hash));
        self.import.clone().map_err(ProviderError::new)
    }

    async fn check_invite(&self, hash: &str) -> ProviderResult<InviteCheck> {
        self.record(format!("check_invite:{}", hash));
        self.check.clone().map_err(ProviderError::new)
    }

    async fn send_message(&self, entity: &ChatEntity, text: &str) -> ProviderResult<()> {
        self.record(format!("send_message:{}:{}", entity.id, text));
        match &self.send_error {
            Some(e) => Err(ProviderError::new(e.clone())),
            None => Ok(()),
        }
    }

    async fn get_self(&self) -> ProviderResult<AccountIdentity> {
        self.record("get_self");
        self.me.clone().map_err(ProviderError::new)
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        self.record("disconnect");
        Ok(())
    }
}

struct ScriptedConnector {
    client: Arc<ScriptedClient>,
}

#[async_trait]
impl ProviderConnector for ScriptedConnector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(
        &self,
        _credentials: &ProviderCredentials,
    ) -> ProviderResult<Arc<dyn ProviderClient>> {
        let client: Arc<dyn ProviderClient> = self.client.clone();
        Ok(client)
    }
}

fn credentials() -> ProviderCredentials {
    ProviderCredentials::new(12345, "api-hash", "saved-session")
}

async fn connected(client: ScriptedClient) -> (Arc<ScriptedClient>, Arc<ProviderConnection>) {
    let client = Arc::new(client);
    let connection = Arc::new(ProviderConnection::new(Arc::new(ScriptedConnector {
        client: client.clone(),
    })));
    connection
        .connect(&credentials())
        .await
        .expect("scripted connection should open");
    (client, connection)
}

async fn join_service(client: ScriptedClient) -> (Arc<ScriptedClient>, JoinService) {
    let (client, connection) = connected(client).await;
    let store: Arc<dyn JoinLogStore> = Arc::new(MemoryJoinLogStore::new());
    (client, JoinService::new(connection, store))
}

async fn stored(service: &JoinService, id: &str) -> JoinAttempt {
    service
        .coordinator()
        .store()
        .get(id)
        .await
        .expect("store read should succeed")
        .expect("attempt should be recorded")
}

fn chat(id: i64) -> ChatEntity {
    ChatEntity::new(id).with_title("Test Group")
}

fn already_participant() -> String {
    "400: USER_ALREADY_PARTICIPANT (caused by messages.ImportChatInvite)".to_string()
}

// ============================================================================
// Public groups
// ============================================================================

#[tokio::test]
async fn test_username_link_full_success() {
    let (client, service) =
        join_service(ScriptedClient::default().resolving("somegroup", Ok(chat(10)))).await;

    let outcome = service
        .submit("https://t.me/somegroup?x=1", Some("listing-1"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.state, JoinState::MessageSent);
    assert_eq!(outcome.identity.as_deref(), Some("joiner"));
    assert_eq!(
        outcome.message,
        "Successfully joined group, verified membership, and sent confirmation message 'A'"
    );
    assert!(outcome.error.is_none());

    assert_eq!(
        client.calls(),
        vec![
            "resolve_entity:somegroup",
            "join_by_username:10",
            "send_message:10:A",
            "get_self",
        ]
    );

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert_eq!(attempt.state, JoinState::MessageSent);
    assert_eq!(attempt.group_ref.as_deref(), Some("listing-1"));
    let joined = attempt.joined_at.expect("joined_at set");
    let verified = attempt.verified_at.expect("verified_at set");
    let sent = attempt.message_sent_at.expect("message_sent_at set");
    assert!(attempt.created_at <= joined && joined <= verified && verified <= sent);
    assert!(attempt.error_detail.is_none());
}

#[tokio::test]
async fn test_username_already_member_still_confirms() {
    let client = ScriptedClient {
        join_error: Some(already_participant()),
        ..Default::default()
    }
    .resolving("somegroup", Ok(chat(11)));
    let (client, service) = join_service(client).await;

    let outcome = service
        .submit("https://t.me/somegroup", None)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.state, JoinState::MessageSent);
    assert!(client.calls().contains(&"send_message:11:A".to_string()));

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert!(attempt.verified_at.is_some());
    assert!(attempt.message_sent_at.is_some());
}

#[tokio::test]
async fn test_unresolvable_username_fails_without_join() {
    let (client, service) = join_service(ScriptedClient::default()).await;

    let outcome = service.submit("https://t.me/nobody_here", None).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.state, JoinState::Failed);
    let detail = outcome.error.expect("failure detail");
    assert_eq!(detail.kind, ErrorKind::Invalid);
    assert_eq!(client.calls(), vec!["resolve_entity:nobody_here"]);

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert_eq!(attempt.state, JoinState::Failed);
    assert!(attempt.joined_at.is_none());
    assert_eq!(attempt.error_detail.map(|d| d.kind), Some(ErrorKind::Invalid));
}

#[tokio::test]
async fn test_already_member_from_resolve_is_terminal() {
    let client =
        ScriptedClient::default().resolving("somegroup", Err("USER_ALREADY_PARTICIPANT"));
    let (client, service) = join_service(client).await;

    let outcome = service.submit("t.me/somegroup", None).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.map(|d| d.kind),
        Some(ErrorKind::AlreadyMember)
    );
    assert_eq!(client.calls(), vec!["resolve_entity:somegroup"]);
}

#[tokio::test]
async fn test_join_too_many_channels() {
    let client = ScriptedClient {
        join_error: Some("400: CHANNELS_TOO_MUCH".to_string()),
        ..Default::default()
    }
    .resolving("busy", Ok(chat(12)));
    let (client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/busy", None).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(
        outcome.message,
        "Too many channels joined. Leave some channels first."
    );
    assert!(!client.calls().iter().any(|c| c.starts_with("send_message")));
}

// ============================================================================
// Invalid links
// ============================================================================

#[tokio::test]
async fn test_invalid_link_makes_no_provider_calls() {
    let (client, service) = join_service(ScriptedClient::default()).await;

    let outcome = service.submit("not a link", Some("listing-2")).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.message.contains("Invalid"));
    assert_eq!(outcome.state, JoinState::Failed);
    assert!(client.calls().is_empty());

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert_eq!(attempt.state, JoinState::Failed);
    assert_eq!(attempt.raw_link, "not a link");
    assert_eq!(attempt.error_detail.map(|d| d.kind), Some(ErrorKind::Invalid));
}

// ============================================================================
// Private invites
// ============================================================================

#[tokio::test]
async fn test_invite_link_success_uses_first_chat() {
    let client = ScriptedClient {
        import: Ok(InviteImport {
            chats: vec![chat(20), chat(21)],
        }),
        ..Default::default()
    };
    let (client, service) = join_service(client).await;

    let outcome = service
        .submit("https://t.me/+AbC123", None)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(
        client.calls(),
        vec!["import_invite:AbC123", "send_message:20:A", "get_self"]
    );
}

#[tokio::test]
async fn test_invite_import_without_chats_fails() {
    let client = ScriptedClient {
        import: Ok(InviteImport::default()),
        ..Default::default()
    };
    let (client, service) = join_service(client).await;

    let outcome = service
        .submit("https://t.me/joinchat/AbC123", None)
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(
        outcome.message,
        "Failed to get chat information from invite link"
    );
    assert_eq!(outcome.error.map(|d| d.kind), Some(ErrorKind::Unknown));
    assert_eq!(client.calls(), vec!["import_invite:AbC123"]);
}

#[tokio::test]
async fn test_invite_already_member_recovers_via_check() {
    let client = ScriptedClient {
        import: Err(already_participant()),
        check: Ok(InviteCheck {
            chat: Some(chat(30)),
        }),
        ..Default::default()
    };
    let (client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/+hash30", None).await.unwrap();

    assert!(outcome.success);
    assert_eq!(
        client.calls(),
        vec![
            "import_invite:hash30",
            "check_invite:hash30",
            "send_message:30:A",
            "get_self",
        ]
    );
}

#[tokio::test]
async fn test_invite_already_member_falls_back_to_resolve() {
    let client = ScriptedClient {
        import: Err(already_participant()),
        check: Ok(InviteCheck::default()),
        ..Default::default()
    }
    .resolving("hash31", Ok(chat(31)));
    let (client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/+hash31", None).await.unwrap();

    assert!(outcome.success);
    assert_eq!(
        client.calls(),
        vec![
            "import_invite:hash31",
            "check_invite:hash31",
            "resolve_entity:hash31",
            "send_message:31:A",
            "get_self",
        ]
    );
}

#[tokio::test]
async fn test_invite_already_member_recovery_exhausted() {
    let client = ScriptedClient {
        import: Err(already_participant()),
        check: Err("CHANNEL_PRIVATE".to_string()),
        ..Default::default()
    };
    let (_client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/+hash32", None).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome
        .message
        .starts_with("Already a member but failed to get chat information"));

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert_eq!(attempt.state, JoinState::Failed);
    assert!(attempt.joined_at.is_none());
}

#[tokio::test]
async fn test_invite_rate_limited() {
    let client = ScriptedClient {
        import: Err("420: FLOOD_WAIT_30 (caused by messages.ImportChatInvite)".to_string()),
        ..Default::default()
    };
    let (client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/+slow", None).await.unwrap();

    assert!(!outcome.success);
    let detail = outcome.error.expect("failure detail");
    assert_eq!(detail.kind, ErrorKind::RateLimited);
    assert_eq!(detail.retry_after_secs, Some(30));
    assert!(outcome.message.contains("30 seconds"));
    // Surfaced, never retried
    assert_eq!(client.calls(), vec!["import_invite:slow"]);
}

#[tokio::test]
async fn test_invite_terminal_classifications() {
    let cases = [
        ("INVITE_HASH_EXPIRED", ErrorKind::Expired),
        ("INVITE_HASH_INVALID", ErrorKind::Invalid),
        ("INVITE_REQUEST_SENT", ErrorKind::PendingApproval),
        ("CHANNEL_PRIVATE", ErrorKind::PrivateRestricted),
        ("RPC_CALL_FAIL", ErrorKind::ProviderUnavailable),
        ("SOMETHING_NEW_HAPPENED", ErrorKind::Unknown),
    ];

    for (raw, expected) in cases {
        let client = ScriptedClient {
            import: Err(raw.to_string()),
            ..Default::default()
        };
        let (_client, service) = join_service(client).await;

        let outcome = service.submit("https://t.me/+abc", None).await.unwrap();
        assert!(!outcome.success, "{}", raw);
        assert_eq!(outcome.error.map(|d| d.kind), Some(expected), "{}", raw);
    }
}

// ============================================================================
// Confirmation and identity
// ============================================================================

#[tokio::test]
async fn test_send_failure_keeps_earlier_stages() {
    let client = ScriptedClient {
        send_error: Some("403: CHAT_WRITE_FORBIDDEN".to_string()),
        ..Default::default()
    }
    .resolving("readonly", Ok(chat(40)));
    let (client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/readonly", None).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.map(|d| d.kind),
        Some(ErrorKind::PrivateRestricted)
    );
    assert!(!client.calls().contains(&"get_self".to_string()));

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert_eq!(attempt.state, JoinState::Failed);
    assert!(attempt.joined_at.is_some());
    assert!(attempt.verified_at.is_some());
    assert!(attempt.message_sent_at.is_none());
}

#[tokio::test]
async fn test_identity_falls_back_to_unknown() {
    let client = ScriptedClient {
        me: Err("RPC_CALL_FAIL".to_string()),
        ..Default::default()
    }
    .resolving("somegroup", Ok(chat(50)));
    let (_client, service) = join_service(client).await;

    let outcome = service.submit("https://t.me/somegroup", None).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.identity.as_deref(), Some("Unknown"));
}

#[tokio::test]
async fn test_custom_confirmation_text() {
    let (client, connection) =
        connected(ScriptedClient::default().resolving("somegroup", Ok(chat(60)))).await;
    let coordinator = JoinCoordinator::new(connection, Arc::new(MemoryJoinLogStore::new()))
        .with_confirmation_text("hello");
    let service = JoinService::from_coordinator(coordinator);

    let outcome = service.submit("https://t.me/somegroup", None).await.unwrap();

    assert!(outcome.success);
    assert!(outcome.message.ends_with("'hello'"));
    assert!(client.calls().contains(&"send_message:60:hello".to_string()));
}

// ============================================================================
// Misuse
// ============================================================================

#[tokio::test]
async fn test_execute_twice_is_rejected() {
    let (client, connection) =
        connected(ScriptedClient::default().resolving("somegroup", Ok(chat(70)))).await;
    let coordinator = JoinCoordinator::new(connection, Arc::new(MemoryJoinLogStore::new()));

    let id = coordinator
        .begin("https://t.me/somegroup", None)
        .await
        .unwrap();
    coordinator.execute(&id).await.unwrap();
    let calls_after_first = client.calls().len();

    let again = coordinator.execute(&id).await;
    assert!(matches!(
        again,
        Err(CoordinatorError::AlreadyExecuted {
            state: JoinState::MessageSent,
            ..
        })
    ));
    assert_eq!(client.calls().len(), calls_after_first);
}

#[tokio::test]
async fn test_submit_without_connection_records_nothing() {
    let client = Arc::new(ScriptedClient::default());
    let connection = Arc::new(ProviderConnection::new(Arc::new(ScriptedConnector {
        client: client.clone(),
    })));
    let service = JoinService::new(connection, Arc::new(MemoryJoinLogStore::new()));

    assert!(!service.is_connected().await);
    let result = service.submit("https://t.me/somegroup", None).await;
    assert!(matches!(result, Err(CoordinatorError::NotConnected)));
    assert!(service.query_status(None).await.unwrap().is_empty());
    assert!(client.calls().is_empty());
    assert!(matches!(
        service.current_account().await,
        Err(CoordinatorError::NotConnected)
    ));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_attempts_are_independent() {
    let client = ScriptedClient {
        delay: Some(Duration::from_millis(20)),
        ..Default::default()
    }
    .resolving("alpha", Ok(chat(81)))
    .resolving("beta", Err("CHANNEL_PRIVATE"));
    let (client, connection) = connected(client).await;
    let coordinator = JoinCoordinator::new(connection, Arc::new(MemoryJoinLogStore::new()));

    let a = coordinator
        .begin("https://t.me/alpha", Some("a".to_string()))
        .await
        .unwrap();
    let b = coordinator
        .begin("https://t.me/beta", Some("b".to_string()))
        .await
        .unwrap();

    let (first, second) = tokio::join!(coordinator.execute(&a), coordinator.execute(&b));
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(first.success);
    assert_eq!(first.attempt_id, a);
    assert!(!second.success);
    assert_eq!(second.attempt_id, b);

    let a_record = coordinator.store().get(&a).await.unwrap().unwrap();
    let b_record = coordinator.store().get(&b).await.unwrap().unwrap();
    assert_eq!(a_record.state, JoinState::MessageSent);
    assert_eq!(b_record.state, JoinState::Failed);
    assert_eq!(
        b_record.error_detail.map(|d| d.kind),
        Some(ErrorKind::PrivateRestricted)
    );
    assert!(client.calls().contains(&"send_message:81:A".to_string()));
}

// ============================================================================
// Lifecycle ordering
// ============================================================================

/// Store wrapper that remembers every state written.
struct RecordingStore {
    inner: MemoryJoinLogStore,
    states: Mutex<Vec<(String, JoinState)>>,
}

#[async_trait]
impl JoinLogStore for RecordingStore {
    async fn create(&self, request: NewJoinAttempt) -> JoinLogResult<String> {
        let id = self.inner.create(request).await?;
        self.states
            .lock()
            .unwrap()
            .push((id.clone(), JoinState::Joining));
        Ok(id)
    }

    async fn update(&self, id: &str, update: JoinLogUpdate) -> JoinLogResult<()> {
        let state = update.state;
        self.inner.update(id, update).await?;
        if let Some(state) = state {
            self.states.lock().unwrap().push((id.to_string(), state));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> JoinLogResult<Option<JoinAttempt>> {
        self.inner.get(id).await
    }

    async fn list(&self, group_ref: Option<&str>) -> JoinLogResult<Vec<JoinAttempt>> {
        self.inner.list(group_ref).await
    }
}

#[tokio::test]
async fn test_state_walk_is_forward_only() {
    let client = ScriptedClient {
        send_error: Some("CHAT_WRITE_FORBIDDEN".to_string()),
        ..Default::default()
    }
    .resolving("quiet", Ok(chat(90)));
    let (_client, connection) = connected(client).await;
    let store = Arc::new(RecordingStore {
        inner: MemoryJoinLogStore::new(),
        states: Mutex::new(Vec::new()),
    });
    let service = JoinService::new(connection, store.clone());

    let outcome = service.submit("https://t.me/quiet", None).await.unwrap();

    let walk: Vec<JoinState> = store
        .states
        .lock()
        .unwrap()
        .iter()
        .filter(|(id, _)| *id == outcome.attempt_id)
        .map(|(_, state)| *state)
        .collect();
    assert_eq!(
        walk,
        vec![
            JoinState::Joining,
            JoinState::Joined,
            JoinState::Verified,
            JoinState::Failed,
        ]
    );
    for pair in walk.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
    }
}

// ============================================================================
// Join log write faults
// ============================================================================

/// Store whose next `updates_to_fail` updates fail with an I/O error.
struct FlakyStore {
    inner: MemoryJoinLogStore,
    updates_to_fail: Mutex<usize>,
}

impl FlakyStore {
    fn failing(updates: usize) -> Self {
        Self {
            inner: MemoryJoinLogStore::new(),
            updates_to_fail: Mutex::new(updates),
        }
    }
}

#[async_trait]
impl JoinLogStore for FlakyStore {
    async fn create(&self, request: NewJoinAttempt) -> JoinLogResult<String> {
        self.inner.create(request).await
    }

    async fn update(&self, id: &str, update: JoinLogUpdate) -> JoinLogResult<()> {
        {
            let mut remaining = self.updates_to_fail.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(JoinLogError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "disk hiccup",
                )));
            }
        }
        self.inner.update(id, update).await
    }

    async fn get(&self, id: &str) -> JoinLogResult<Option<JoinAttempt>> {
        self.inner.get(id).await
    }

    async fn list(&self, group_ref: Option<&str>) -> JoinLogResult<Vec<JoinAttempt>> {
        self.inner.list(group_ref).await
    }
}

#[tokio::test]
async fn test_failure_write_is_retried_with_classified_detail() {
    let client = ScriptedClient {
        import: Err("INVITE_HASH_EXPIRED".to_string()),
        ..Default::default()
    };
    let (_client, connection) = connected(client).await;
    let service = JoinService::new(connection, Arc::new(FlakyStore::failing(1)));

    let outcome = service.submit("https://t.me/+abc", None).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.state, JoinState::Failed);
    assert_eq!(outcome.error.expect("failure detail").kind, ErrorKind::Expired);

    let attempt = stored(&service, &outcome.attempt_id).await;
    assert_eq!(attempt.state, JoinState::Failed);
    let detail = attempt.error_detail.expect("recorded detail");
    assert_eq!(detail.kind, ErrorKind::Expired);
    assert_eq!(detail.message, "Invite link has expired");
}

#[tokio::test]
async fn test_unrecorded_failure_still_reports_classified_detail() {
    let client = ScriptedClient {
        import: Err("420: FLOOD_WAIT_45".to_string()),
        ..Default::default()
    };
    let (_client, connection) = connected(client).await;
    let service = JoinService::new(connection, Arc::new(FlakyStore::failing(2)));

    let result = service.submit("https://t.me/+abc", Some("listing-3")).await;

    let id = match result {
        Err(CoordinatorError::FailureNotRecorded { id, detail, source }) => {
            assert_eq!(detail.kind, ErrorKind::RateLimited);
            assert_eq!(detail.retry_after_secs, Some(45));
            assert!(source.to_string().contains("disk hiccup"));
            id
        }
        other => panic!("expected unrecorded failure, got {:?}", other),
    };

    // The fallback write still leaves the attempt terminal
    let attempt = stored(&service, &id).await;
    assert_eq!(attempt.state, JoinState::Failed);
    assert_eq!(attempt.group_ref.as_deref(), Some("listing-3"));
}

// ============================================================================
// Status and account queries
// ============================================================================

#[tokio::test]
async fn test_query_status_most_recent_first() {
    let (_client, service) =
        join_service(ScriptedClient::default().resolving("somegroup", Ok(chat(100)))).await;

    let first = service
        .submit("https://t.me/somegroup", Some("g1"))
        .await
        .unwrap();
    let second = service.submit("garbage", Some("g2")).await.unwrap();
    let third = service
        .submit("https://t.me/missing", Some("g1"))
        .await
        .unwrap();

    let all = service.query_status(None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            third.attempt_id.as_str(),
            second.attempt_id.as_str(),
            first.attempt_id.as_str(),
        ]
    );

    let g1 = service.query_status(Some("g1")).await.unwrap();
    assert_eq!(g1.len(), 2);
    assert_eq!(g1[0].state, JoinState::Failed);
    assert!(g1[0].error.is_some());
    assert_eq!(g1[1].state, JoinState::MessageSent);
    assert!(g1[1].error.is_none());
}

#[tokio::test]
async fn test_current_account() {
    let client = ScriptedClient {
        me: Ok(AccountIdentity {
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let (_client, service) = join_service(client).await;

    let account = service.current_account().await.unwrap();
    assert_eq!(account.username, "Ada Lovelace");
    assert_eq!(account.phone, "Not available");

    let client = ScriptedClient {
        me: Ok(AccountIdentity {
            username: Some("joiner".to_string()),
            phone: Some("15550100".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let (_client, service) = join_service(client).await;
    let account = service.current_account().await.unwrap();
    assert_eq!(account.username, "joiner");
    assert_eq!(account.phone, "15550100");
}

#[tokio::test]
async fn test_disconnect_then_submit_is_rejected() {
    let (client, connection) = connected(ScriptedClient::default()).await;
    let service = JoinService::new(connection.clone(), Arc::new(MemoryJoinLogStore::new()));

    connection.disconnect().await.unwrap();
    assert!(!service.is_connected().await);
    assert!(matches!(
        service.submit("https://t.me/somegroup", None).await,
        Err(CoordinatorError::NotConnected)
    ));
    assert_eq!(client.calls(), vec!["disconnect"]);
}

// ============================================================================
// File-backed log
// ============================================================================

#[tokio::test]
async fn test_file_store_keeps_outcomes_across_restarts() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let (_client, connection) =
        connected(ScriptedClient::default().resolving("somegroup", Ok(chat(110)))).await;

    let attempt_id = {
        let store = FileJoinLogStore::open(temp_dir.path()).expect("Failed to open join log");
        let service = JoinService::new(connection, Arc::new(store));
        service
            .submit("https://t.me/somegroup", Some("listing-7"))
            .await
            .unwrap()
            .attempt_id
    };

    let attempts = FileJoinLogStore::read_existing(temp_dir.path(), None)
        .expect("Failed to read join log")
        .expect("join log should exist");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, attempt_id);
    assert_eq!(attempts[0].state, JoinState::MessageSent);
    assert_eq!(attempts[0].group_ref.as_deref(), Some("listing-7"));
}

#[tokio::test]
async fn test_service_from_config_uses_configured_settings() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let client = Arc::new(ScriptedClient::default().resolving("somegroup", Ok(chat(120))));
    let config = AppConfig {
        provider: credentials(),
        join: JoinSettings {
            confirmation_text: "hello".to_string(),
        },
        storage: StorageSettings {
            dir: temp_dir.path().to_path_buf(),
        },
    };

    let service = JoinService::from_config(
        &config,
        Arc::new(ScriptedConnector {
            client: client.clone(),
        }),
    )
    .await
    .expect("service should start from config");

    assert!(service.is_connected().await);
    assert_eq!(service.coordinator().confirmation_text(), "hello");

    let outcome = service
        .submit("https://t.me/somegroup", Some("listing-9"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(client
        .calls()
        .contains(&"send_message:120:hello".to_string()));

    let attempts = FileJoinLogStore::read_existing(temp_dir.path(), Some("listing-9"))
        .expect("Failed to read join log")
        .expect("join log should exist");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, outcome.attempt_id);
    assert_eq!(attempts[0].state, JoinState::MessageSent);
}

#[tokio::test]
async fn test_service_from_config_requires_session() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = AppConfig {
        storage: StorageSettings {
            dir: temp_dir.path().to_path_buf(),
        },
        ..Default::default()
    };

    let result = JoinService::from_config(
        &config,
        Arc::new(ScriptedConnector {
            client: Arc::new(ScriptedClient::default()),
        }),
    )
    .await;

    assert!(matches!(result, Err(CoordinatorError::Connection(_))));
}
