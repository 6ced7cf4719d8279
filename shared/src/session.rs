use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::backend::{AuthBackend, RecordStore};
use crate::error::AuthError;
use crate::routes::{Navigator, Route};
use crate::types::{Identity, NewProfile, Profile, ProfileUpdate, SessionChange};

const MIN_PASSWORD_LEN: usize = 6;

/// Identity state shared with every view that depends on it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the initial session check has completed
    pub is_loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            is_loading: true,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Releases the session-change listener. Dropping it has the same effect as `dispose`.
#[must_use = "dropping the subscription stops the session listener"]
pub struct Subscription {
    listener: Option<JoinHandle<()>>,
}

impl Subscription {
    fn inert() -> Self {
        Self { listener: None }
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            tracing::debug!("Session listener released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the current identity and profile and keeps them in step with the auth service.
///
/// Construct one per app instance and pass it to the components that need it.
pub struct SessionManager {
    auth: Arc<dyn AuthBackend>,
    records: Arc<dyn RecordStore>,
    navigator: Arc<dyn Navigator>,
    state: Arc<watch::Sender<SessionState>>,
    initialized: AtomicBool,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        records: Arc<dyn RecordStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            auth,
            records,
            navigator,
            state: Arc::new(state),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver notified on every identity or profile change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Load any existing session and start following auth changes.
    pub async fn initialize(&self) -> Subscription {
        if self.initialized.swap(true, Ordering::SeqCst) {
            tracing::warn!("Session manager already initialized; ignoring repeat call");
            return Subscription::inert();
        }

        self.state.send_modify(|state| state.is_loading = true);

        // Subscribe before the session check so no change slips between the two
        let changes = self.auth.on_session_change();

        let identity = match self.auth.current_session().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!("Failed to read current session: {}", e);
                None
            }
        };
        apply_identity(&self.state, self.records.as_ref(), identity).await;

        let listener = tokio::spawn(follow_changes(
            changes,
            Arc::clone(&self.state),
            Arc::clone(&self.records),
        ));

        self.state.send_modify(|state| state.is_loading = false);
        tracing::info!(
            "Session initialized (authenticated: {})",
            self.is_authenticated()
        );

        Subscription {
            listener: Some(listener),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        tracing::info!("Signing in user: {}", email);

        let identity = match self.auth.authenticate(email, password).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!("Error signing in: {}", e);
                return Err(AuthError::InvalidCredentials);
            }
        };

        apply_identity(&self.state, self.records.as_ref(), Some(identity)).await;
        self.navigator.navigate(Route::Dashboard);
        Ok(())
    }

    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), AuthError> {
        validate_sign_up(email, password)?;

        tracing::info!("Signing up user: {}", email);

        let identity = self.auth.create_account(email, password).await.map_err(|e| {
            tracing::error!("Error creating account: {}", e);
            AuthError::Backend(e)
        })?;

        // The account is not removed if this fails; the user can still sign in
        let profile = self
            .records
            .create_profile(NewProfile {
                id: identity.id.clone(),
                name: name.to_string(),
                email: email.to_string(),
            })
            .await
            .map_err(|e| {
                tracing::error!("Error creating profile for {}: {}", identity.id, e);
                AuthError::Backend(e)
            })?;

        self.state.send_modify(|state| {
            state.identity = Some(identity);
            state.profile = Some(profile);
        });
        self.navigator.navigate(Route::Dashboard);
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.auth.end_session().await;

        apply_identity(&self.state, self.records.as_ref(), None).await;
        self.navigator.navigate(Route::Home);

        result.map_err(|e| {
            tracing::error!("Error signing out: {}", e);
            AuthError::Backend(e)
        })
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, AuthError> {
        let identity = self.identity().ok_or(AuthError::Unauthorized)?;

        let profile = self
            .records
            .update_profile(&identity.id, update)
            .await
            .map_err(|e| {
                tracing::error!("Error updating profile for {}: {}", identity.id, e);
                AuthError::Backend(e)
            })?;

        self.state
            .send_modify(|state| state.profile = Some(profile.clone()));
        Ok(profile)
    }
}

fn validate_sign_up(email: &str, password: &str) -> Result<(), AuthError> {
    if !email.contains('@') {
        return Err(AuthError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn apply_identity(
    state: &watch::Sender<SessionState>,
    records: &dyn RecordStore,
    identity: Option<Identity>,
) {
    let profile = match &identity {
        Some(identity) => load_profile(records, &identity.id).await,
        None => None,
    };
    state.send_modify(|state| {
        state.identity = identity;
        state.profile = profile;
    });
}

async fn load_profile(records: &dyn RecordStore, id: &str) -> Option<Profile> {
    match records.get_profile(id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("Failed to load profile for {}: {}", id, e);
            None
        }
    }
}

async fn follow_changes(
    mut changes: broadcast::Receiver<SessionChange>,
    state: Arc<watch::Sender<SessionState>>,
    records: Arc<dyn RecordStore>,
) {
    loop {
        let identity = match changes.recv().await {
            Ok(SessionChange::SignedIn(identity)) => Some(identity),
            Ok(SessionChange::SignedOut) => None,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Session listener skipped {} changes", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let profile = match &identity {
            Some(identity) => load_profile(records.as_ref(), &identity.id).await,
            None => None,
        };
        state.send_modify(|state| {
            state.profile = merge_profile(state, identity.as_ref(), profile);
            state.identity = identity;
        });
    }
}

/// Profile to keep after a change event. A read that found nothing keeps the
/// profile already held for the same identity.
fn merge_profile(
    current: &mut SessionState,
    identity: Option<&Identity>,
    loaded: Option<Profile>,
) -> Option<Profile> {
    if loaded.is_some() {
        return loaded;
    }
    let identity = identity?;
    current
        .profile
        .take()
        .filter(|profile| profile.id == identity.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::fake::{FakeAuth, FakeRecords};
    use crate::routes::History;
    use std::time::Duration;

    struct Harness {
        auth: Arc<FakeAuth>,
        records: Arc<FakeRecords>,
        history: Arc<History>,
        session: SessionManager,
    }

    fn harness(auth: FakeAuth, records: FakeRecords) -> Harness {
        let auth = Arc::new(auth);
        let records = Arc::new(records);
        let history = Arc::new(History::default());
        let session = SessionManager::new(auth.clone(), records.clone(), history.clone());
        Harness {
            auth,
            records,
            history,
            session,
        }
    }

    fn citizen() -> Identity {
        Identity {
            id: "U1".to_string(),
            email: "citizen@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_loading_until_initialized() {
        let h = harness(FakeAuth::default(), FakeRecords::default());
        assert!(h.session.state().is_loading);

        let subscription = h.session.initialize().await;

        let state = h.session.state();
        assert!(!state.is_loading);
        assert!(!state.is_authenticated());
        subscription.dispose();
    }

    #[tokio::test]
    async fn test_initialize_restores_session_and_profile() {
        let h = harness(
            FakeAuth::default().with_session(citizen()),
            FakeRecords::default(),
        );
        h.records
            .create_profile(NewProfile {
                id: "U1".to_string(),
                name: "Asha".to_string(),
                email: "citizen@example.com".to_string(),
            })
            .await
            .unwrap();

        let _subscription = h.session.initialize().await;

        let state = h.session.state();
        assert_eq!(state.identity, Some(citizen()));
        assert_eq!(state.profile.unwrap().name.as_deref(), Some("Asha"));
    }

    #[tokio::test]
    async fn test_second_initialize_is_inert() {
        let h = harness(FakeAuth::default(), FakeRecords::default());

        let first = h.session.initialize().await;
        let second = h.session.initialize().await;

        assert!(first.is_active());
        assert!(!second.is_active());
    }

    #[tokio::test]
    async fn test_sign_up_creates_identity_and_profile_with_same_id() {
        let h = harness(FakeAuth::default(), FakeRecords::default());
        let _subscription = h.session.initialize().await;

        h.session
            .sign_up("new@example.com", "secret1", "Ravi")
            .await
            .unwrap();

        let identity = h.auth.account("new@example.com").unwrap();
        let profiles = h.records.profiles.lock().unwrap().clone();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[&identity.id].id, identity.id);
        assert_eq!(profiles[&identity.id].name.as_deref(), Some("Ravi"));
        assert_eq!(h.session.identity(), Some(identity));
        assert_eq!(h.history.current(), Some(Route::Dashboard));
    }

    #[tokio::test]
    async fn test_short_password_rejected_before_network() {
        let h = harness(FakeAuth::default(), FakeRecords::default());

        let err = h
            .session
            .sign_up("new@example.com", "12345", "Ravi")
            .await
            .unwrap_err();

        assert_eq!(
            err.user_message(),
            "Password must be at least 6 characters long"
        );
        assert_eq!(h.auth.call_count(), 0);
        assert_eq!(h.records.call_count(), 0);
    }

    #[tokio::test]
    async fn test_profile_failure_keeps_created_account() {
        let records = FakeRecords {
            fail_profiles: true,
            ..FakeRecords::default()
        };
        let h = harness(FakeAuth::default(), records);

        let err = h
            .session
            .sign_up("new@example.com", "secret1", "Ravi")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Backend(_)));
        // No compensating delete: the account outlives the failed profile write
        assert!(h.auth.account("new@example.com").is_some());
        assert!(h.records.profiles.lock().unwrap().is_empty());
        assert_eq!(h.history.current(), None);
    }

    #[tokio::test]
    async fn test_sign_in_navigates_to_dashboard() {
        let h = harness(
            FakeAuth::default().with_account("U1", "citizen@example.com", "secret1"),
            FakeRecords::default(),
        );
        let _subscription = h.session.initialize().await;

        h.session
            .sign_in("citizen@example.com", "secret1")
            .await
            .unwrap();

        assert_eq!(h.session.identity(), Some(citizen()));
        assert_eq!(h.history.current(), Some(Route::Dashboard));
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_state_unchanged() {
        let h = harness(
            FakeAuth::default().with_account("U1", "citizen@example.com", "secret1"),
            FakeRecords::default(),
        );
        let _subscription = h.session.initialize().await;
        let before = h.session.state();

        let err = h
            .session
            .sign_in("citizen@example.com", "wrong-password")
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(err.user_message(), "Invalid email or password");
        assert_eq!(h.session.state(), before);
        assert!(h.history.entries().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_reads_as_invalid_credentials() {
        let h = harness(FakeAuth::default(), FakeRecords::default());

        let err = h
            .session
            .sign_in("nobody@example.com", "secret1")
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_and_goes_home() {
        let h = harness(
            FakeAuth::default().with_session(citizen()),
            FakeRecords::default(),
        );
        let _subscription = h.session.initialize().await;
        assert!(h.session.is_authenticated());

        h.session.sign_out().await.unwrap();

        let state = h.session.state();
        assert!(state.identity.is_none());
        assert!(state.profile.is_none());
        assert_eq!(h.history.current(), Some(Route::Home));
    }

    #[tokio::test]
    async fn test_sign_out_failure_still_clears_state() {
        let h = harness(
            FakeAuth::default().with_session(citizen()).failing_sign_out(),
            FakeRecords::default(),
        );
        let _subscription = h.session.initialize().await;

        let err = h.session.sign_out().await.unwrap_err();

        assert!(matches!(err, AuthError::Backend(BackendError::Service { .. })));
        let state = h.session.state();
        assert!(state.identity.is_none());
        assert!(state.profile.is_none());
        assert_eq!(h.history.current(), Some(Route::Home));
    }

    #[tokio::test]
    async fn test_slow_listener_read_keeps_profile_saved_by_sign_up() {
        let records = FakeRecords {
            profile_read_delay: Some(Duration::from_millis(30)),
            profile_write_delay: Some(Duration::from_millis(10)),
            ..FakeRecords::default()
        };
        let h = harness(FakeAuth::default(), records);
        let _subscription = h.session.initialize().await;

        h.session
            .sign_up("new@example.com", "secret1", "Ravi")
            .await
            .unwrap();
        // let the listener's stale profile read land
        tokio::time::sleep(Duration::from_millis(60)).await;

        let state = h.session.state();
        assert!(state.is_authenticated());
        assert_eq!(
            state.profile.and_then(|profile| profile.name).as_deref(),
            Some("Ravi")
        );
    }

    #[test]
    fn test_merge_profile_drops_profile_of_other_identity() {
        let mut state = SessionState {
            identity: Some(citizen()),
            profile: Some(Profile {
                id: "U1".to_string(),
                name: Some("Asha".to_string()),
                email: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            }),
            is_loading: false,
        };
        let other = Identity {
            id: "U2".to_string(),
            email: "other@example.com".to_string(),
        };

        assert!(merge_profile(&mut state.clone(), Some(&other), None).is_none());
        assert!(merge_profile(&mut state.clone(), None, None).is_none());
        assert_eq!(
            merge_profile(&mut state, Some(&citizen()), None).map(|p| p.id),
            Some("U1".to_string())
        );
    }

    #[tokio::test]
    async fn test_external_sign_in_updates_state() {
        let h = harness(FakeAuth::default(), FakeRecords::default());
        let _subscription = h.session.initialize().await;
        let mut rx = h.session.subscribe();

        h.auth.emit(SessionChange::SignedIn(citizen()));

        let state = rx
            .wait_for(|state| state.is_authenticated())
            .await
            .unwrap()
            .clone();
        assert_eq!(state.identity, Some(citizen()));
    }

    #[tokio::test]
    async fn test_disposed_listener_ignores_changes() {
        let h = harness(FakeAuth::default(), FakeRecords::default());
        let subscription = h.session.initialize().await;

        subscription.dispose();
        h.auth.emit(SessionChange::SignedIn(citizen()));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_update_profile_requires_identity() {
        let h = harness(FakeAuth::default(), FakeRecords::default());

        let err = h
            .session
            .update_profile(ProfileUpdate {
                name: Some("Ravi K".to_string()),
                email: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_update_profile_refreshes_cached_profile() {
        let h = harness(FakeAuth::default(), FakeRecords::default());
        h.session
            .sign_up("new@example.com", "secret1", "Ravi")
            .await
            .unwrap();

        h.session
            .update_profile(ProfileUpdate {
                name: Some("Ravi K".to_string()),
                email: None,
            })
            .await
            .unwrap();

        let profile = h.session.state().profile.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ravi K"));
        assert_eq!(profile.email.as_deref(), Some("new@example.com"));
    }
}
