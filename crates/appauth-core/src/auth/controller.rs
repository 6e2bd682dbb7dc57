//! Login flow orchestration.
//!
//! Network-bound steps run on spawned tokio tasks. Their results travel back
//! over a completion queue and are applied to the session, and reported to the
//! view, only by the task that owns the controller. A worker that needs a
//! committed result before its next step waits for an acknowledgement.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AuthError, AuthSessionState, ClientRegistration, IllegalStateError, OidcProtocol,
    RedirectRequest, ServerConfig, TokenSet,
};

/// Presentation collaborator notified of flow progress.
///
/// Every callback runs on the task that drives the controller.
pub trait LoginView {
    fn on_registration_complete(&mut self);
    fn on_redirect_ready(&mut self, request: &RedirectRequest);
    fn on_authenticated(&mut self);
    fn on_error(&mut self, error: &AuthError);
    fn clear_error(&mut self) {}
}

enum Completion {
    Configured {
        configuration: ServerConfig,
        committed: oneshot::Sender<()>,
    },
    /// `None` when the session was already registered.
    Registered(Option<ClientRegistration>),
    Authenticated(TokenSet),
    Failed(AuthError),
}

/// Drives the session from empty through registration and login.
pub struct LoginFlowController<P, V> {
    session: AuthSessionState,
    protocol: Arc<P>,
    view: V,
    issuer: Url,
    registered: bool,
    pending_request: Option<RedirectRequest>,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<P, V> LoginFlowController<P, V>
where
    P: OidcProtocol,
    V: LoginView,
{
    pub fn new(session: AuthSessionState, protocol: Arc<P>, view: V, issuer: Url) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            session,
            protocol,
            view,
            issuer,
            registered: false,
            pending_request: None,
            in_flight: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn session(&self) -> &AuthSessionState {
        &self.session
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn into_session(self) -> AuthSessionState {
        self.session
    }

    /// True once `ensure_registered` has fully succeeded.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Whether a flow step is still waiting to be applied.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Fetch configuration and register the client, skipping whichever is
    /// already present. Returns immediately; progress is applied by
    /// [`Self::run_until_idle`].
    pub fn ensure_registered(&mut self) {
        if self.session.is_registered() {
            debug!("session already registered");
            self.in_flight += 1;
            let _ = self.completions_tx.send(Completion::Registered(None));
            return;
        }

        let known = self.session.server_configuration().ok().cloned();
        let protocol = Arc::clone(&self.protocol);
        let issuer = self.issuer.clone();
        let tx = self.completions_tx.clone();
        self.spawn_step(async move {
            match register(protocol.as_ref(), &issuer, known, &tx).await {
                Ok(registration) => Completion::Registered(Some(registration)),
                Err(err) => Completion::Failed(err),
            }
        });
    }

    /// Build the authorization redirect and hand it to the view.
    pub fn start_login(&mut self) -> Result<(), IllegalStateError> {
        self.view.clear_error();
        let configuration = self.session.server_configuration()?;
        let registration = self.session.registration()?;

        match self
            .protocol
            .build_authorization_redirect(configuration, registration)
        {
            Ok(request) => {
                debug!(client_id = %request.client_id, "authorization redirect ready");
                self.view.on_redirect_ready(&request);
                self.pending_request = Some(request);
            }
            Err(err) => self.report(err),
        }
        Ok(())
    }

    /// Validate the redirect callback and, if it carries a code, start the
    /// token exchange.
    pub fn end_login(&mut self, callback: &str) -> Result<(), IllegalStateError> {
        let request = self
            .pending_request
            .take()
            .ok_or(IllegalStateError::AuthorizationNotStarted)?;
        let registration = self.session.registration()?.clone();

        let authorization = match self
            .protocol
            .parse_authorization_callback(callback, &request)
        {
            Ok(authorization) => authorization,
            Err(err) => {
                self.report(err);
                return Ok(());
            }
        };

        let protocol = Arc::clone(&self.protocol);
        self.spawn_step(async move {
            match protocol
                .exchange_code_for_tokens(&authorization, &registration)
                .await
            {
                Ok(tokens) => Completion::Authenticated(tokens),
                Err(err) => Completion::Failed(err),
            }
        });
        Ok(())
    }

    /// Apply completions until no flow step remains in flight.
    pub async fn run_until_idle(&mut self) -> Result<(), IllegalStateError> {
        while self.in_flight > 0 {
            let Some(completion) = self.completions_rx.recv().await else {
                break;
            };
            self.apply(completion)?;
        }
        Ok(())
    }

    /// Run `step` on a worker task. A worker that panics or is aborted still
    /// yields a completion, so `in_flight` always drains.
    fn spawn_step<F>(&mut self, step: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.completions_tx.clone();
        let worker = tokio::spawn(step);
        tokio::spawn(async move {
            let completion = match worker.await {
                Ok(completion) => completion,
                Err(err) => Completion::Failed(AuthError::WorkerFailed(err.to_string())),
            };
            let _ = tx.send(completion);
        });
    }

    fn apply(&mut self, completion: Completion) -> Result<(), IllegalStateError> {
        match completion {
            Completion::Configured {
                configuration,
                committed,
            } => {
                self.session.set_server_configuration(configuration);
                let _ = committed.send(());
            }
            Completion::Registered(registration) => {
                self.in_flight -= 1;
                if let Some(registration) = registration {
                    self.session.set_registration(registration)?;
                }
                info!("client registration complete");
                self.registered = true;
                self.view.on_registration_complete();
            }
            Completion::Authenticated(tokens) => {
                self.in_flight -= 1;
                self.session.set_tokens(Some(tokens))?;
                info!("authenticated");
                self.view.on_authenticated();
            }
            Completion::Failed(err) => {
                self.in_flight -= 1;
                self.report(err);
            }
        }
        Ok(())
    }

    fn report(&mut self, err: AuthError) {
        warn!(kind = ?err.kind(), error = %err, "login flow step failed");
        self.view.on_error(&err);
    }
}

async fn register<P: OidcProtocol>(
    protocol: &P,
    issuer: &Url,
    known: Option<ServerConfig>,
    tx: &mpsc::UnboundedSender<Completion>,
) -> Result<ClientRegistration, AuthError> {
    let configuration = match known {
        Some(configuration) => configuration,
        None => {
            let configuration = protocol.fetch_metadata(issuer).await?;
            let (committed_tx, committed_rx) = oneshot::channel();
            tx.send(Completion::Configured {
                configuration: configuration.clone(),
                committed: committed_tx,
            })
            .map_err(|_| AuthError::Cancelled)?;
            committed_rx.await.map_err(|_| AuthError::Cancelled)?;
            configuration
        }
    };
    protocol.register_client(&configuration).await
}
