use appauth_core::auth::{launch_browser, AuthError, LoginView, RedirectRequest};

/// Terminal presentation of the login flow.
#[derive(Debug, Default)]
pub struct ConsoleView {
    open_browser: bool,
    redirect_ready: bool,
    authenticated: bool,
    last_error: Option<String>,
}

impl ConsoleView {
    pub fn new(open_browser: bool) -> Self {
        Self {
            open_browser,
            ..Self::default()
        }
    }

    pub fn redirect_ready(&self) -> bool {
        self.redirect_ready
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl LoginView for ConsoleView {
    fn on_registration_complete(&mut self) {
        tracing::debug!("registration complete");
    }

    fn on_redirect_ready(&mut self, request: &RedirectRequest) {
        self.redirect_ready = true;
        println!(
            "\nAuthorize the application by visiting:\n  {}\n",
            request.authorization_url
        );
        if self.open_browser {
            if let Err(err) = launch_browser(&request.authorization_url) {
                eprintln!("{err}; open the URL above manually.");
            }
        }
    }

    fn on_authenticated(&mut self) {
        self.authenticated = true;
    }

    fn on_error(&mut self, error: &AuthError) {
        self.last_error = Some(error.to_string());
    }

    fn clear_error(&mut self) {
        self.last_error = None;
    }
}
