//! Coordination of user mutations across queue, local mirror and remote.
//!
//! Every operation writes its intent to the durable queue before touching
//! the local mirror: if the process dies in between, the remote action is
//! replayed from the queue on restart while the mirror catches up through
//! the next sync. The reverse order would risk a mirror that shows a
//! change the server never hears about.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::ports::{EventSinkPort, RemoteMutationExecutor};
use crate::label::{ConversationId, LabelId};
use crate::mutation::LocalConversationMutator;
use crate::queue::{MutationIntent, MutationQueuePort};
use crate::session::SessionContext;
use crate::undo::{UndoActionType, UndoCapability, UndoToken, UndoTokenRegistry};
use crate::{Error, Result};

/// The public mutation surface exposed to the UI layer.
///
/// Results reflect the local apply outcome; the remote roundtrip proceeds
/// asynchronously. The exceptions are [`label`](Self::label) and
/// [`unlabel`](Self::unlabel), which join the remote call synchronously to
/// harvest undo tokens.
pub struct ConversationService {
    session: SessionContext,
    mutator: LocalConversationMutator,
    queue: Arc<dyn MutationQueuePort>,
    remote: Arc<dyn RemoteMutationExecutor>,
    undo_registry: Arc<UndoTokenRegistry>,
    events: Arc<dyn EventSinkPort>,
}

impl ConversationService {
    /// Assemble the service from its injected collaborators.
    #[must_use]
    pub fn new(
        session: SessionContext,
        mutator: LocalConversationMutator,
        queue: Arc<dyn MutationQueuePort>,
        remote: Arc<dyn RemoteMutationExecutor>,
        undo_registry: Arc<UndoTokenRegistry>,
        events: Arc<dyn EventSinkPort>,
    ) -> Self {
        Self {
            session,
            mutator,
            queue,
            remote,
            undo_registry,
            events,
        }
    }

    /// Mark conversations read under a label.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyConversationIds`] before any side effect
    /// when `conversation_ids` is empty, or with a store error if the
    /// local apply fails.
    pub async fn mark_as_read(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<()> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Read {
            conversation_ids: conversation_ids.to_vec(),
            label_id: label_id.clone(),
        };
        self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator.mark(conversation_ids, label_id, false).await?;
        self.events.conversations_changed(conversation_ids);
        Ok(())
    }

    /// Mark conversations unread under a label.
    ///
    /// # Errors
    ///
    /// Same contract as [`mark_as_read`](Self::mark_as_read).
    pub async fn mark_as_unread(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<()> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Unread {
            conversation_ids: conversation_ids.to_vec(),
            label_id: label_id.clone(),
        };
        self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator.mark(conversation_ids, label_id, true).await?;
        self.events.conversations_changed(conversation_ids);
        Ok(())
    }

    /// Apply a tag label, joining the remote call for undo tokens.
    ///
    /// Tokens from succeeded chunks are registered and returned even when
    /// a sibling chunk fails; the first chunk error is reported as the
    /// operation result in that case. Local state stays applied either
    /// way. A fully confirmed intent is dropped from the queue; a failed
    /// one stays queued for a later replay.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyConversationIds`] on empty input, a store error if
    /// the local apply fails, or [`Error::Remote`] when any remote chunk
    /// fails.
    pub async fn label(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<Vec<UndoToken>> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Label {
            conversation_ids: conversation_ids.to_vec(),
            label_id: label_id.clone(),
        };
        let queue_id = self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator.apply_label(conversation_ids, label_id).await?;
        self.events.conversations_changed(conversation_ids);

        self.join_remote(queue_id, &intent, label_id).await
    }

    /// Remove a tag label, joining the remote call for undo tokens.
    ///
    /// # Errors
    ///
    /// Same contract as [`label`](Self::label).
    pub async fn unlabel(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<Vec<UndoToken>> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Unlabel {
            conversation_ids: conversation_ids.to_vec(),
            label_id: label_id.clone(),
        };
        let queue_id = self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator
            .remove_label(conversation_ids, label_id)
            .await?;
        self.events.conversations_changed(conversation_ids);

        self.join_remote(queue_id, &intent, label_id).await
    }

    /// Reassign conversations from one folder to another.
    ///
    /// Duplicate IDs are collapsed and empty IDs dropped before anything
    /// happens. Moving a folder onto itself is a guaranteed no-op success:
    /// no intent is queued and nothing is mutated.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyLabel`] when the destination is empty,
    /// [`Error::EmptyConversationIds`] when no usable ID survives
    /// filtering, or a store error from the local apply.
    pub async fn move_to(
        &self,
        conversation_ids: &[ConversationId],
        from_label: &LabelId,
        to_label: &LabelId,
    ) -> Result<()> {
        require_ids(conversation_ids)?;
        if to_label.is_empty() {
            return Err(Error::EmptyLabel);
        }
        if from_label == to_label {
            return Ok(());
        }

        let mut seen = HashSet::new();
        let filtered: Vec<ConversationId> = conversation_ids
            .iter()
            .filter(|id| !id.is_empty() && seen.insert((*id).clone()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            tracing::warn!(from = %from_label, to = %to_label, "move request carried no usable conversation IDs");
            return Err(Error::EmptyConversationIds);
        }

        let intent = MutationIntent::Folder {
            conversation_ids: filtered.clone(),
            from_label: from_label.clone(),
            to_label: to_label.clone(),
        };
        self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator
            .move_to_folder(&filtered, from_label, to_label)
            .await?;
        self.events.conversations_changed(&filtered);
        Ok(())
    }

    /// Permanently delete conversations from the label they were viewed
    /// under.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyConversationIds`] on empty input, or a store error
    /// from the local apply.
    pub async fn delete(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<()> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Delete {
            conversation_ids: conversation_ids.to_vec(),
            label_id: label_id.clone(),
        };
        self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator.delete(conversation_ids, label_id).await?;
        self.events.conversations_changed(conversation_ids);
        Ok(())
    }

    /// Hide conversations until the given instant.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyConversationIds`] on empty input, or a store error
    /// from the local apply.
    pub async fn snooze(
        &self,
        conversation_ids: &[ConversationId],
        until: DateTime<Utc>,
    ) -> Result<()> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Snooze {
            conversation_ids: conversation_ids.to_vec(),
            until,
        };
        self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator.snooze(conversation_ids, until).await?;
        self.events.conversations_changed(conversation_ids);
        Ok(())
    }

    /// Bring snoozed conversations back to the inbox.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyConversationIds`] on empty input, or a store error
    /// from the local apply.
    pub async fn unsnooze(&self, conversation_ids: &[ConversationId]) -> Result<()> {
        require_ids(conversation_ids)?;

        let intent = MutationIntent::Unsnooze {
            conversation_ids: conversation_ids.to_vec(),
        };
        self.queue.enqueue(&self.session.user_id, &intent).await?;
        self.mutator.unsnooze(conversation_ids).await?;
        self.events.conversations_changed(conversation_ids);
        Ok(())
    }

    /// The most recent live undo opportunity, if any.
    #[must_use]
    pub fn undoable(&self) -> Option<UndoCapability> {
        self.undo_registry.current()
    }

    /// Reverse a completed remote mutation with its undo capability.
    ///
    /// Undo is a compensating remote call, not a rollback: the local
    /// mirror converges through the next sync.
    ///
    /// # Errors
    ///
    /// [`Error::Remote`] when the remote side rejects a token.
    pub async fn undo(&self, capability: &UndoCapability) -> Result<()> {
        for token in &capability.tokens {
            self.remote.undo(token).await?;
        }
        self.undo_registry.consume(capability);
        tracing::info!(tokens = capability.tokens.len(), "undo dispatched");
        Ok(())
    }

    /// Re-dispatch intents that were queued but never confirmed, e.g.
    /// after a crash or offline period.
    ///
    /// Successfully replayed intents are dropped from the queue; failed
    /// ones stay queued for a later attempt. Label replays register their
    /// undo tokens exactly as the live path does.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue itself cannot be read or updated;
    /// individual replay failures are logged, not returned.
    pub async fn replay_pending(&self) -> Result<()> {
        let pending = self.queue.pending(&self.session.user_id).await?;

        for queued in pending {
            let outcomes = self.remote.execute(&queued.intent).await;

            let first_error = match &queued.intent {
                MutationIntent::Label { label_id, .. }
                | MutationIntent::Unlabel { label_id, .. } => self
                    .undo_registry
                    .absorb(outcomes, UndoActionType::from_label(label_id))
                    .err(),
                _ => outcomes.into_iter().find_map(|outcome| outcome.err()),
            };

            match first_error {
                Some(error) => {
                    tracing::warn!(
                        intent = queued.intent.kind(),
                        %error,
                        "replay failed; intent stays queued"
                    );
                }
                None => {
                    self.queue.complete(queued.id).await?;
                    tracing::info!(intent = queued.intent.kind(), "replayed queued intent");
                }
            }
        }

        Ok(())
    }

    async fn join_remote(
        &self,
        queue_id: i64,
        intent: &MutationIntent,
        label_id: &LabelId,
    ) -> Result<Vec<UndoToken>> {
        let outcomes = self.remote.execute(intent).await;
        match self
            .undo_registry
            .absorb(outcomes, UndoActionType::from_label(label_id))
        {
            Ok(tokens) => {
                self.queue.complete(queue_id).await?;
                Ok(tokens)
            }
            Err(error) => {
                tracing::warn!(
                    intent = intent.kind(),
                    %error,
                    "remote chunk failed; intent stays queued"
                );
                Err(error.into())
            }
        }
    }
}

fn require_ids(conversation_ids: &[ConversationId]) -> Result<()> {
    if conversation_ids.is_empty() {
        return Err(Error::EmptyConversationIds);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::entity::EntityStore;
    use crate::label::{Location, UserId};
    use crate::queue::{QueuedIntent, SqliteMutationQueue};
    use crate::service::ports::{ChunkOutcome, NoopNotifications, RemoteError};

    #[derive(Default)]
    struct RecordingQueue {
        intents: Mutex<Vec<MutationIntent>>,
        completed: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl MutationQueuePort for RecordingQueue {
        async fn enqueue(&self, _user_id: &UserId, intent: &MutationIntent) -> Result<i64> {
            let mut intents = self.intents.lock();
            intents.push(intent.clone());
            Ok(intents.len() as i64)
        }

        async fn pending(&self, _user_id: &UserId) -> Result<Vec<QueuedIntent>> {
            Ok(Vec::new())
        }

        async fn complete(&self, id: i64) -> Result<()> {
            self.completed.lock().push(id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedRemote {
        scripted: Mutex<VecDeque<Vec<ChunkOutcome>>>,
        executed: Mutex<Vec<MutationIntent>>,
        undone: Mutex<Vec<UndoToken>>,
    }

    impl ScriptedRemote {
        fn script(&self, outcomes: Vec<ChunkOutcome>) {
            self.scripted.lock().push_back(outcomes);
        }
    }

    #[async_trait]
    impl RemoteMutationExecutor for ScriptedRemote {
        async fn execute(&self, intent: &MutationIntent) -> Vec<ChunkOutcome> {
            self.executed.lock().push(intent.clone());
            self.scripted
                .lock()
                .pop_front()
                .unwrap_or_else(|| vec![Ok(None)])
        }

        async fn undo(&self, token: &UndoToken) -> std::result::Result<(), RemoteError> {
            self.undone.lock().push(token.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        refreshed: Mutex<Vec<Vec<ConversationId>>>,
    }

    impl EventSinkPort for RecordingSink {
        fn conversations_changed(&self, conversation_ids: &[ConversationId]) {
            self.refreshed.lock().push(conversation_ids.to_vec());
        }
    }

    struct Harness {
        store: EntityStore,
        service: ConversationService,
        queue: Arc<RecordingQueue>,
        remote: Arc<ScriptedRemote>,
        sink: Arc<RecordingSink>,
    }

    async fn harness() -> Harness {
        let store = EntityStore::in_memory().await.unwrap();
        let session = SessionContext::new(UserId::new("u1"));
        let queue = Arc::new(RecordingQueue::default());
        let remote = Arc::new(ScriptedRemote::default());
        let sink = Arc::new(RecordingSink::default());
        let mutator = LocalConversationMutator::new(
            store.clone(),
            &session,
            Arc::new(NoopNotifications),
        );
        let service = ConversationService::new(
            session,
            mutator,
            Arc::clone(&queue) as Arc<dyn MutationQueuePort>,
            Arc::clone(&remote) as Arc<dyn RemoteMutationExecutor>,
            Arc::new(UndoTokenRegistry::new(chrono::Duration::seconds(30))),
            Arc::clone(&sink) as Arc<dyn EventSinkPort>,
        );
        Harness {
            store,
            service,
            queue,
            remote,
            sink,
        }
    }

    async fn seed_labelled_conversation(store: &EntityStore, id: &str) {
        store
            .insert_conversation(&crate::entity::Conversation {
                conversation_id: ConversationId::new(id),
                user_id: UserId::new("u1"),
                subject: "Seeded".to_string(),
                num_messages: 1,
                display_order: 0,
                is_soft_deleted: false,
            })
            .await
            .unwrap();
        store
            .upsert_context_label(&crate::entity::ContextLabel {
                conversation_id: ConversationId::new(id),
                label_id: Location::AllMail.label_id(),
                user_id: UserId::new("u1"),
                unread_count: 1,
                message_count: 1,
                time: Utc::now(),
                display_order: 0,
                snooze_time: None,
            })
            .await
            .unwrap();
    }

    // Empty input fails before any side effect; the queue double sees
    // nothing.
    #[tokio::test]
    async fn empty_ids_fail_without_queueing_an_intent() {
        let harness = harness().await;

        let error = harness
            .service
            .label(&[], &LabelId::new("project"))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::EmptyConversationIds));
        assert!(harness.queue.intents.lock().is_empty());
        assert!(harness.sink.refreshed.lock().is_empty());
    }

    #[tokio::test]
    async fn move_onto_itself_is_a_silent_success() {
        let harness = harness().await;

        harness
            .service
            .move_to(
                &[ConversationId::new("c1")],
                &Location::Inbox.label_id(),
                &Location::Inbox.label_id(),
            )
            .await
            .unwrap();

        assert!(harness.queue.intents.lock().is_empty());
        assert!(harness.sink.refreshed.lock().is_empty());
    }

    #[tokio::test]
    async fn move_without_destination_fails() {
        let harness = harness().await;

        let error = harness
            .service
            .move_to(
                &[ConversationId::new("c1")],
                &Location::Inbox.label_id(),
                &LabelId::new(""),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, Error::EmptyLabel));
        assert!(harness.queue.intents.lock().is_empty());
    }

    #[tokio::test]
    async fn move_collapses_duplicates_and_drops_empty_ids() {
        let harness = harness().await;

        harness
            .service
            .move_to(
                &[
                    ConversationId::new("c1"),
                    ConversationId::new("c1"),
                    ConversationId::new(""),
                ],
                &Location::Inbox.label_id(),
                &Location::Archive.label_id(),
            )
            .await
            .unwrap();

        let intents = harness.queue.intents.lock();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].conversation_ids(), &[ConversationId::new("c1")]);
    }

    #[tokio::test]
    async fn label_joins_remote_and_returns_tokens() {
        let harness = harness().await;
        seed_labelled_conversation(&harness.store, "c1").await;
        harness.remote.script(vec![
            Ok(Some(UndoToken::new("t1"))),
            Ok(None),
            Ok(Some(UndoToken::new("t2"))),
        ]);

        let tag = LabelId::new("project");
        let tokens = harness
            .service
            .label(&[ConversationId::new("c1")], &tag)
            .await
            .unwrap();

        assert_eq!(tokens, vec![UndoToken::new("t1"), UndoToken::new("t2")]);
        assert_eq!(harness.queue.intents.lock().len(), 1);
        assert_eq!(harness.queue.completed.lock().len(), 1);
        assert_eq!(harness.sink.refreshed.lock().len(), 1);
        assert!(harness.service.undoable().is_some());

        // Optimistic apply landed locally.
        assert!(harness
            .store
            .context_label(&ConversationId::new("c1"), &tag)
            .await
            .unwrap()
            .is_some());
    }

    // A failed chunk fails the operation but must not discard the tokens
    // of chunks that succeeded, and must not roll back local state.
    #[tokio::test]
    async fn partial_remote_failure_keeps_tokens_and_local_state() {
        let harness = harness().await;
        seed_labelled_conversation(&harness.store, "c1").await;
        harness.remote.script(vec![
            Ok(Some(UndoToken::new("t1"))),
            Err(RemoteError::new("chunk rejected")),
        ]);

        let tag = LabelId::new("project");
        let error = harness
            .service
            .label(&[ConversationId::new("c1")], &tag)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Remote(_)));
        assert!(harness.queue.completed.lock().is_empty());
        let capability = harness.service.undoable().unwrap();
        assert_eq!(capability.tokens, vec![UndoToken::new("t1")]);
        assert!(harness
            .store
            .context_label(&ConversationId::new("c1"), &tag)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn undo_dispatches_every_token_and_consumes_the_capability() {
        let harness = harness().await;
        seed_labelled_conversation(&harness.store, "c1").await;
        harness
            .remote
            .script(vec![Ok(Some(UndoToken::new("t1"))), Ok(Some(UndoToken::new("t2")))]);

        harness
            .service
            .label(&[ConversationId::new("c1")], &LabelId::new("project"))
            .await
            .unwrap();

        let capability = harness.service.undoable().unwrap();
        harness.service.undo(&capability).await.unwrap();

        assert_eq!(
            &*harness.remote.undone.lock(),
            &[UndoToken::new("t1"), UndoToken::new("t2")]
        );
        assert!(harness.service.undoable().is_none());
    }

    async fn durable_harness() -> (ConversationService, Arc<SqliteMutationQueue>, Arc<ScriptedRemote>)
    {
        let store = EntityStore::in_memory().await.unwrap();
        let session = SessionContext::new(UserId::new("u1"));
        let queue = Arc::new(SqliteMutationQueue::in_memory().await.unwrap());
        let remote = Arc::new(ScriptedRemote::default());
        let mutator = LocalConversationMutator::new(
            store.clone(),
            &session,
            Arc::new(NoopNotifications),
        );
        let service = ConversationService::new(
            session,
            mutator,
            Arc::clone(&queue) as Arc<dyn MutationQueuePort>,
            Arc::clone(&remote) as Arc<dyn RemoteMutationExecutor>,
            Arc::new(UndoTokenRegistry::new(chrono::Duration::seconds(30))),
            Arc::new(RecordingSink::default()) as Arc<dyn EventSinkPort>,
        );
        (service, queue, remote)
    }

    #[tokio::test]
    async fn replay_drains_confirmed_intents() {
        let (service, queue, remote) = durable_harness().await;
        let user = UserId::new("u1");

        service
            .mark_as_read(&[ConversationId::new("c1")], &Location::Inbox.label_id())
            .await
            .unwrap();
        assert_eq!(queue.pending(&user).await.unwrap().len(), 1);

        service.replay_pending().await.unwrap();

        assert!(queue.pending(&user).await.unwrap().is_empty());
        assert_eq!(remote.executed.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_replay_keeps_the_intent_queued() {
        let (service, queue, remote) = durable_harness().await;
        let user = UserId::new("u1");

        service
            .mark_as_read(&[ConversationId::new("c1")], &Location::Inbox.label_id())
            .await
            .unwrap();
        remote.script(vec![Err(RemoteError::new("offline"))]);

        service.replay_pending().await.unwrap();

        assert_eq!(queue.pending(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_label_drops_its_queued_intent() {
        let (service, queue, remote) = durable_harness().await;
        let user = UserId::new("u1");
        remote.script(vec![Ok(Some(UndoToken::new("t1")))]);

        service
            .label(&[ConversationId::new("c1")], &LabelId::new("project"))
            .await
            .unwrap();

        // The join confirmed the intent; nothing is left to replay.
        assert!(queue.pending(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn label_replay_registers_undo_tokens() {
        let (service, queue, remote) = durable_harness().await;
        let user = UserId::new("u1");

        // A label whose live remote join failed entirely stays queued.
        remote.script(vec![Err(RemoteError::new("offline"))]);
        let error = service
            .label(&[ConversationId::new("c1")], &LabelId::new("project"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Remote(_)));
        assert_eq!(queue.pending(&user).await.unwrap().len(), 1);

        // The replay succeeds and its token becomes undoable.
        remote.script(vec![Ok(Some(UndoToken::new("t-replayed")))]);
        service.replay_pending().await.unwrap();

        assert!(queue.pending(&user).await.unwrap().is_empty());
        let capability = service.undoable().unwrap();
        assert_eq!(capability.tokens, vec![UndoToken::new("t-replayed")]);
    }
}
