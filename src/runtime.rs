//! Runtime for live sessions
//!
//! The [`SessionRegistry`] maps session ids to live [`Session`]s, loading them
//! from the store on demand, and wires each one to its persistence writer,
//! the shared event fanout and the turn generator.

pub mod orchestrator;
pub mod traits;
mod writer;

#[cfg(test)]
pub mod testing;

pub use traits::*;
pub use writer::{PersistOp, PersistWriter, RetryPolicy};

use crate::cost::CostModel;
use crate::fanout::{Fanout, Subscription, SubscriptionHandle};
use crate::llm::find_model;
use crate::session::{
    CreateSession, ParticipantSlot, Session, SessionError, SessionRecord, SessionSummary,
    SessionView,
};
use crate::state_machine::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Tunables shared by every session
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    /// Pause between consecutive turns
    pub turn_delay: Duration,
    /// Upper bound on a single turn generator call
    pub generation_timeout: Duration,
    pub retry: RetryPolicy,
    pub cost_model: CostModel,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            turn_delay: Duration::from_secs(1),
            generation_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            cost_model: CostModel::default(),
        }
    }
}

/// Manager for all live sessions
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn TurnGenerator>,
    fanout: Arc<Fanout>,
    settings: RuntimeSettings,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: Arc<dyn TurnGenerator>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            store,
            generator,
            fanout: Arc::new(Fanout::default()),
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    /// Crash recovery: nothing is generating at startup, so every stored
    /// `active` session becomes `paused`.
    pub async fn recover(&self) -> Result<usize, SessionError> {
        let count = self
            .store
            .pause_all_active()
            .await
            .map_err(SessionError::PersistenceFailure)?;
        if count > 0 {
            tracing::info!(count, "Paused sessions left active by previous run");
        }
        Ok(count)
    }

    /// Create an idle session. Fails with `Conflict` if the id is taken.
    pub async fn create(&self, request: CreateSession) -> Result<Arc<Session>, SessionError> {
        let record = build_record(request)?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&record.id) || self.load_record(&record.id).await?.is_some() {
            return Err(SessionError::Conflict(format!(
                "session {} already exists",
                record.id
            )));
        }
        Ok(self.insert_new(&mut sessions, record))
    }

    /// Create (or reuse) the session and start it with `initial_message`.
    ///
    /// Concurrent calls for the same id resolve to the same session, so
    /// exactly one of them wins the `Idle → Active` transition. Reusing an
    /// idle session requires the same participants; its stored title is kept.
    pub async fn start_conversation(
        &self,
        request: CreateSession,
        initial_message: &str,
    ) -> Result<Arc<Session>, SessionError> {
        if initial_message.trim().is_empty() {
            return Err(SessionError::InvalidRequest(
                "initial message must not be empty".to_string(),
            ));
        }
        let record = build_record(request)?;
        let participants = record.participants.clone();
        let session = {
            let mut sessions = self.sessions.write().await;
            if let Some(existing) = sessions.get(&record.id) {
                Arc::clone(existing)
            } else if let Some(stored) = self.load_record(&record.id).await? {
                let session = self.hydrate(stored);
                sessions.insert(session.id().to_string(), Arc::clone(&session));
                session
            } else {
                self.insert_new(&mut sessions, record)
            }
        };

        if session.state() == SessionState::Idle && session.participants() != participants {
            return Err(SessionError::Conflict(format!(
                "session {} exists with different participants",
                session.id()
            )));
        }
        session.start(initial_message)?;
        Ok(session)
    }

    /// Live session by id, loading it from the store if needed.
    ///
    /// A terminated entry is a tombstone for a delete still in progress and
    /// reads as `NotFound` without consulting the store.
    pub async fn get(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return live(session);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(session_id) {
            return live(session);
        }

        let record = self
            .load_record(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let session = self.hydrate(record);
        sessions.insert(session_id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Summaries of every session, newest first. Live sessions report their
    /// in-memory figures, which may be ahead of the store. If the store is
    /// unreachable only live sessions are listed.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let stored = self.store.list_summaries().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Store unavailable, listing live sessions only");
            Vec::new()
        });

        let mut live: HashMap<String, SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| (s.id().to_string(), s.summary()))
            .collect();

        let mut summaries: Vec<SessionSummary> = stored
            .into_iter()
            .map(|summary| live.remove(&summary.id).unwrap_or(summary))
            .collect();
        summaries.extend(live.into_values());
        summaries.retain(|summary| !summary.state.is_terminal());
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Terminate the session and notify its subscribers, remove the stored
    /// record, then forget it. The terminated entry stays in the map until
    /// the store confirms, so the record cannot be loaded back meanwhile.
    pub async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        let session = self.get(session_id).await?;
        session.delete()?;

        session
            .writer()
            .delete()
            .await
            .map_err(SessionError::PersistenceFailure)?;
        self.sessions.write().await.remove(session_id);
        tracing::info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// Subscribe to a session's events along with a snapshot taken at the
    /// moment of subscription
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(Subscription, SessionView), SessionError> {
        let session = self.get(session_id).await?;
        Ok(session.subscribe())
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.fanout.unsubscribe(handle);
    }

    async fn load_record(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        self.store
            .load(session_id)
            .await
            .map_err(SessionError::PersistenceFailure)
    }

    fn insert_new(
        &self,
        sessions: &mut HashMap<String, Arc<Session>>,
        record: SessionRecord,
    ) -> Arc<Session> {
        let writer = PersistWriter::spawn(&record.id, Arc::clone(&self.store), self.settings.retry);
        writer.enqueue(PersistOp::Create(Box::new(record.clone())));
        tracing::info!(session_id = %record.id, "Session created");

        let session = self.build_session(record, writer);
        sessions.insert(session.id().to_string(), Arc::clone(&session));
        session
    }

    /// Wrap a stored record. Loading never resumes generation.
    fn hydrate(&self, mut record: SessionRecord) -> Arc<Session> {
        record.state = SessionState::on_load(Some(record.state));
        let writer = PersistWriter::spawn(&record.id, Arc::clone(&self.store), self.settings.retry);
        tracing::info!(
            session_id = %record.id,
            state = %record.state,
            messages = record.transcript.len(),
            "Session loaded"
        );
        self.build_session(record, writer)
    }

    fn build_session(&self, record: SessionRecord, writer: PersistWriter) -> Arc<Session> {
        Session::new(
            record,
            Arc::clone(&self.fanout),
            writer,
            Arc::clone(&self.generator),
            self.settings,
        )
    }
}

fn live(session: &Arc<Session>) -> Result<Arc<Session>, SessionError> {
    if session.state().is_terminal() {
        return Err(SessionError::NotFound(session.id().to_string()));
    }
    Ok(Arc::clone(session))
}

/// Validate a creation request and turn it into an idle record
fn build_record(request: CreateSession) -> Result<SessionRecord, SessionError> {
    let participants = [
        request.participant1.normalized(ParticipantSlot::One),
        request.participant2.normalized(ParticipantSlot::Two),
    ];
    for participant in &participants {
        if find_model(&participant.model).is_none() {
            return Err(SessionError::InvalidRequest(format!(
                "model {:?} is not allowed",
                participant.model
            )));
        }
    }

    let id = request
        .conversation_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(SessionRecord::new(id, request.title, participants))
}
