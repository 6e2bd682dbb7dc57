use std::{env, fmt, str::FromStr};

use url::Url;

use super::AuthError;

const FLOW_VAR: &str = "APPAUTH_AUTH_FLOW";
const NO_BROWSER_VAR: &str = "APPAUTH_NO_BROWSER";

/// How the authorization redirect gets back to the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    /// Open the system browser and receive the redirect on the loopback listener.
    Browser,
    /// Print the authorization URL and read the redirect back from stdin.
    Manual,
}

impl AuthFlow {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthFlow::Browser => "browser",
            AuthFlow::Manual => "manual",
        }
    }
}

impl fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthFlow {
    type Err = InvalidFlow;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if ["browser", "loopback"]
            .iter()
            .any(|name| value.eq_ignore_ascii_case(name))
        {
            Ok(AuthFlow::Browser)
        } else if ["manual", "paste"]
            .iter()
            .any(|name| value.eq_ignore_ascii_case(name))
        {
            Ok(AuthFlow::Manual)
        } else {
            Err(InvalidFlow {
                value: value.to_owned(),
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown login flow `{value}` (expected `browser` or `manual`)")]
pub struct InvalidFlow {
    pub value: String,
}

/// Login flow chosen from the process environment.
///
/// `APPAUTH_AUTH_FLOW` forces a flow. Otherwise a browser is assumed when a
/// graphical session is visible and the user has not set `APPAUTH_NO_BROWSER`.
#[derive(Debug, Clone, Copy)]
pub struct FlowPreference {
    flow: AuthFlow,
    open_browser: bool,
}

impl FlowPreference {
    pub fn detect() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let forced = lookup(FLOW_VAR).and_then(|raw| match raw.parse::<AuthFlow>() {
            Ok(flow) => Some(flow),
            Err(err) => {
                tracing::warn!(%err, "ignoring {FLOW_VAR}");
                None
            }
        });

        let open_browser = match forced {
            Some(flow) => flow == AuthFlow::Browser,
            None => has_graphical_session(&lookup),
        };
        let flow = forced.unwrap_or(if open_browser {
            AuthFlow::Browser
        } else {
            AuthFlow::Manual
        });

        Self { flow, open_browser }
    }

    pub fn preferred(&self) -> AuthFlow {
        self.flow
    }

    pub fn browser_available(&self) -> bool {
        self.open_browser
    }
}

fn has_graphical_session(lookup: &impl Fn(&str) -> Option<String>) -> bool {
    let set = |key: &str| lookup(key).is_some_and(|value| !value.is_empty());

    if set(NO_BROWSER_VAR) {
        return false;
    }
    let display = set("DISPLAY") || set("WAYLAND_DISPLAY");
    if display {
        return true;
    }
    // Remote shells without a forwarded display cannot reach a local browser.
    if set("SSH_CONNECTION") || set("SSH_TTY") {
        return false;
    }
    cfg!(any(target_os = "macos", target_os = "windows"))
}

/// Open `url` in the system browser.
pub fn launch_browser(url: &Url) -> Result<(), AuthError> {
    open::that(url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preference(vars: &[(&str, &str)]) -> FlowPreference {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        FlowPreference::from_lookup(move |key| {
            vars.iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        })
    }

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("Loopback".parse::<AuthFlow>().unwrap(), AuthFlow::Browser);
        assert_eq!(" MANUAL ".parse::<AuthFlow>().unwrap(), AuthFlow::Manual);
        assert_eq!("paste".parse::<AuthFlow>().unwrap(), AuthFlow::Manual);
        assert_eq!(AuthFlow::Browser.to_string(), "browser");
    }

    #[test]
    fn rejects_unknown_flow() {
        let err = "device-code".parse::<AuthFlow>().unwrap_err();
        assert_eq!(err.value, "device-code");
    }

    #[test]
    fn forced_flow_overrides_display() {
        let pref = preference(&[(FLOW_VAR, "manual"), ("DISPLAY", ":0")]);
        assert_eq!(pref.preferred(), AuthFlow::Manual);
        assert!(!pref.browser_available());
    }

    #[test]
    fn invalid_forced_flow_falls_back_to_detection() {
        let pref = preference(&[(FLOW_VAR, "carrier-pigeon"), ("WAYLAND_DISPLAY", "wayland-0")]);
        assert_eq!(pref.preferred(), AuthFlow::Browser);
    }

    #[test]
    fn remote_shell_prefers_manual() {
        let pref = preference(&[("SSH_CONNECTION", "10.0.0.1 22 10.0.0.2 50000")]);
        assert_eq!(pref.preferred(), AuthFlow::Manual);
        assert!(!pref.browser_available());
    }

    #[test]
    fn opt_out_wins_over_display() {
        let pref = preference(&[(NO_BROWSER_VAR, "1"), ("DISPLAY", ":0")]);
        assert_eq!(pref.preferred(), AuthFlow::Manual);
    }

    #[test]
    fn forwarded_display_keeps_browser() {
        let pref = preference(&[("SSH_CONNECTION", "x"), ("DISPLAY", "localhost:10.0")]);
        assert_eq!(pref.preferred(), AuthFlow::Browser);
        assert!(pref.browser_available());
    }
}
