use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use checkers_domain::{MinorUnits, RoomId, Session, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no wallet adapter registered for operator {0}")]
    OperatorNotRegistered(String),
    #[error("{0}")]
    Rejected(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Outbound port to an operator wallet. Amounts are integer minor units;
/// `round_id` is the idempotency key, so re-issuing a call for the same
/// round must not move money twice.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    async fn post_bet(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError>;

    async fn post_win(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError>;
}

/// Static operator-name → adapter map. Adding an operator means
/// registering an implementation here at bootstrap.
#[derive(Default, Clone)]
pub struct OperatorRegistry {
    adapters: HashMap<String, Arc<dyn WalletAdapter>>,
}

impl OperatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operator_name: impl Into<String>, adapter: Arc<dyn WalletAdapter>) {
        self.adapters.insert(operator_name.into(), adapter);
    }

    pub fn get(&self, operator_name: &str) -> Result<Arc<dyn WalletAdapter>, WalletError> {
        self.adapters
            .get(operator_name)
            .cloned()
            .ok_or_else(|| WalletError::OperatorNotRegistered(operator_name.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct WalletCallBody<'a> {
    token: &'a str,
    session_id: &'a str,
    amount: MinorUnits,
    currency: &'a str,
    round_id: String,
}

#[derive(Debug, Deserialize)]
struct WalletCallResponse {
    balance: Option<MinorUnits>,
    error: Option<String>,
}

/// Generic HTTP wallet: `POST {session.operator_base_url}/bet` and `/win`.
/// The operator's error text is surfaced verbatim to the player.
#[derive(Debug, Clone)]
pub struct HttpWalletAdapter {
    client: reqwest::Client,
}

impl Default for HttpWalletAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWalletAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn call(
        &self,
        path: &str,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError> {
        let url = format!("{}/{path}", session.operator_base_url.trim_end_matches('/'));
        let body = WalletCallBody {
            token: &session.token,
            session_id: session.id.as_str(),
            amount,
            currency: &session.currency,
            round_id: round_id.to_string(),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Http(e.to_string()))?;
        let payload: WalletCallResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Http(e.to_string()))?;
        if let Some(reason) = payload.error {
            return Err(WalletError::Rejected(reason));
        }
        payload
            .balance
            .ok_or_else(|| WalletError::Parse("wallet response missing balance".to_string()))
    }
}

#[async_trait]
impl WalletAdapter for HttpWalletAdapter {
    async fn post_bet(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError> {
        self.call("bet", session, amount, round_id).await
    }

    async fn post_win(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError> {
        self.call("win", session, amount, round_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MovementKind {
    Debit,
    Credit,
}

/// In-memory wallet for tests: per-session balances, idempotency by
/// `(session, round, kind)`, and failure injection per session.
#[derive(Default)]
pub struct MockWalletAdapter {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    balances: HashMap<SessionId, MinorUnits>,
    applied: HashMap<(SessionId, RoomId, MovementKind), MinorUnits>,
    failing_debits: HashMap<SessionId, String>,
    failing_credits: HashMap<SessionId, String>,
    debit_attempts: Vec<(SessionId, RoomId)>,
    credit_attempts: Vec<(SessionId, RoomId)>,
}

impl MockWalletAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, session_id: SessionId, balance: MinorUnits) {
        self.state
            .lock()
            .expect("mock state lock")
            .balances
            .insert(session_id, balance);
    }

    #[must_use]
    pub fn balance(&self, session_id: &SessionId) -> MinorUnits {
        self.state
            .lock()
            .expect("mock state lock")
            .balances
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_debits_for(&self, session_id: SessionId, reason: impl Into<String>) {
        self.state
            .lock()
            .expect("mock state lock")
            .failing_debits
            .insert(session_id, reason.into());
    }

    pub fn fail_credits_for(&self, session_id: SessionId, reason: impl Into<String>) {
        self.state
            .lock()
            .expect("mock state lock")
            .failing_credits
            .insert(session_id, reason.into());
    }

    pub fn clear_credit_failures(&self) {
        self.state
            .lock()
            .expect("mock state lock")
            .failing_credits
            .clear();
    }

    #[must_use]
    pub fn debit_attempts(&self, session_id: &SessionId) -> usize {
        self.state
            .lock()
            .expect("mock state lock")
            .debit_attempts
            .iter()
            .filter(|(id, _)| id == session_id)
            .count()
    }

    #[must_use]
    pub fn credit_attempts(&self, session_id: &SessionId) -> usize {
        self.state
            .lock()
            .expect("mock state lock")
            .credit_attempts
            .iter()
            .filter(|(id, _)| id == session_id)
            .count()
    }

    fn apply(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
        kind: MovementKind,
    ) -> Result<MinorUnits, WalletError> {
        let mut state = self.state.lock().expect("mock state lock");
        match kind {
            MovementKind::Debit => state
                .debit_attempts
                .push((session.id.clone(), round_id)),
            MovementKind::Credit => state
                .credit_attempts
                .push((session.id.clone(), round_id)),
        }

        let failure = match kind {
            MovementKind::Debit => state.failing_debits.get(&session.id),
            MovementKind::Credit => state.failing_credits.get(&session.id),
        };
        if let Some(reason) = failure {
            return Err(WalletError::Rejected(reason.clone()));
        }

        let key = (session.id.clone(), round_id, kind);
        if let Some(balance) = state.applied.get(&key) {
            // Replay of an already-settled round: report the recorded
            // balance, move no money.
            return Ok(*balance);
        }

        let balance = state
            .balances
            .entry(session.id.clone())
            .or_insert(session.balance);
        match kind {
            MovementKind::Debit => {
                if *balance < amount {
                    return Err(WalletError::Rejected("insufficient funds".to_string()));
                }
                *balance -= amount;
            }
            MovementKind::Credit => *balance += amount,
        }
        let balance = *balance;
        state.applied.insert(key, balance);
        Ok(balance)
    }
}

#[async_trait]
impl WalletAdapter for MockWalletAdapter {
    async fn post_bet(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError> {
        self.apply(session, amount, round_id, MovementKind::Debit)
    }

    async fn post_win(
        &self,
        session: &Session,
        amount: MinorUnits,
        round_id: RoomId,
    ) -> Result<MinorUnits, WalletError> {
        self.apply(session, amount, round_id, MovementKind::Credit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkers_domain::OperatorIdentifier;

    fn session(id: &str, balance: MinorUnits) -> Session {
        Session {
            id: SessionId::from(id),
            token: "tok".to_string(),
            player_name: "Alice".to_string(),
            balance,
            currency: "EUR".to_string(),
            operator_base_url: "http://wallet.test".to_string(),
            created_at: chrono::Utc::now(),
            operator_identifier: OperatorIdentifier::default(),
        }
    }

    #[tokio::test]
    async fn debit_and_credit_move_minor_units() {
        let wallet = MockWalletAdapter::new();
        let s = session("s1", 1_000);
        let round = RoomId::new();

        let after_bet = wallet.post_bet(&s, 500, round).await.expect("bet");
        assert_eq!(after_bet, 500);
        let after_win = wallet.post_win(&s, 900, round).await.expect("win");
        assert_eq!(after_win, 1_400);
    }

    #[tokio::test]
    async fn replayed_round_debits_at_most_once() {
        let wallet = MockWalletAdapter::new();
        let s = session("s1", 1_000);
        let round = RoomId::new();

        let first = wallet.post_bet(&s, 500, round).await.expect("bet");
        let second = wallet.post_bet(&s, 500, round).await.expect("replay");
        assert_eq!(first, 500);
        assert_eq!(second, 500);
        assert_eq!(wallet.balance(&s.id), 500);

        // A different round is a fresh debit.
        let third = wallet.post_bet(&s, 500, RoomId::new()).await.expect("bet");
        assert_eq!(third, 0);
    }

    #[tokio::test]
    async fn insufficient_funds_surface_as_rejection() {
        let wallet = MockWalletAdapter::new();
        let s = session("s1", 100);
        let err = wallet
            .post_bet(&s, 500, RoomId::new())
            .await
            .expect_err("rejected");
        assert!(matches!(err, WalletError::Rejected(reason) if reason == "insufficient funds"));
    }

    #[tokio::test]
    async fn injected_failure_keeps_the_balance() {
        let wallet = MockWalletAdapter::new();
        let s = session("s1", 1_000);
        wallet.fail_debits_for(s.id.clone(), "operator down");

        let err = wallet
            .post_bet(&s, 500, RoomId::new())
            .await
            .expect_err("rejected");
        assert!(matches!(err, WalletError::Rejected(reason) if reason == "operator down"));
        assert_eq!(wallet.balance(&s.id), 1_000);
        assert_eq!(wallet.debit_attempts(&s.id), 1);
    }

    #[test]
    fn registry_resolves_by_operator_name() {
        let mut registry = OperatorRegistry::new();
        registry.register("acme", Arc::new(MockWalletAdapter::new()));
        assert!(registry.get("acme").is_ok());
        assert!(matches!(
            registry.get("ghost"),
            Err(WalletError::OperatorNotRegistered(name)) if name == "ghost"
        ));
    }

    #[test]
    fn wallet_response_decodes_error_and_balance_shapes() {
        let ok: WalletCallResponse =
            serde_json::from_str(r#"{"balance": 1500}"#).expect("decode");
        assert_eq!(ok.balance, Some(1_500));
        assert!(ok.error.is_none());

        let rejected: WalletCallResponse =
            serde_json::from_str(r#"{"error": "session expired"}"#).expect("decode");
        assert_eq!(rejected.error.as_deref(), Some("session expired"));
    }
}
