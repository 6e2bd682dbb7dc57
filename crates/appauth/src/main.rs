use std::sync::Arc;

mod view;

use anyhow::{bail, Context, Result};
use appauth_core::auth::{
    AuthFlow, AuthPhase, AuthSessionState, CallbackListener, FileSessionStore, FlowPreference,
    HttpOidcClient, LoginFlowController, SessionStore,
};
use appauth_core::config::ClientConfig;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::task;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::view::ConsoleView;

const DEFAULT_PROFILE: &str = "default";

#[derive(Parser, Debug)]
#[command(author, version, about = "OpenID Connect login for native clients")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover the issuer and register this client dynamically
    Register(ProfileArgs),
    /// Log in with the authorization code flow
    Login(LoginArgs),
    /// Forget tokens but keep the client registration
    Logout(ProfileArgs),
    /// Redeem the stored refresh token
    Refresh(ProfileArgs),
    /// Show the stored session
    Status(StatusArgs),
    /// Delete the stored session, including the client registration
    Reset(ProfileArgs),
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Profile name for the stored session
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Profile name for the stored session
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
    /// Paste the redirect URL instead of listening for it on the loopback interface
    #[arg(long)]
    manual: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Profile name for the stored session
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Register(args) => register(args).await?,
        Commands::Login(args) => login(args).await?,
        Commands::Logout(args) => logout(args)?,
        Commands::Refresh(args) => refresh(args).await?,
        Commands::Status(args) => status(args)?,
        Commands::Reset(args) => reset(args)?,
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("appauth=info,appauth_core=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn register(args: ProfileArgs) -> Result<()> {
    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let store = open_store()?;
    let session = load_session(&store, &args.profile, &config)?;
    let mut controller = build_controller(session, &config, ConsoleView::new(false))?;

    controller.ensure_registered();
    controller.run_until_idle().await?;
    save_session(&store, &args.profile, controller.session())?;
    if let Some(err) = controller.view().last_error() {
        bail!("registration failed: {err}");
    }

    let registration = controller.session().registration()?;
    println!(
        "Registered client '{}' with {} for profile '{}'.",
        registration.client_id, config.issuer, args.profile
    );
    Ok(())
}

async fn login(args: LoginArgs) -> Result<()> {
    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let store = open_store()?;
    let session = load_session(&store, &args.profile, &config)?;

    let preference = FlowPreference::detect();
    let flow = if args.manual {
        AuthFlow::Manual
    } else {
        preference.preferred()
    };
    let listener = match flow {
        AuthFlow::Browser => match CallbackListener::bind(&config.redirect_uri).await {
            Ok(listener) => Some(listener),
            Err(err) => {
                eprintln!(
                    "Unable to listen on {} ({err}); falling back to manual copy/paste flow.",
                    config.redirect_uri
                );
                None
            }
        },
        AuthFlow::Manual => None,
    };

    let view = ConsoleView::new(listener.is_some() && preference.browser_available());
    let mut controller = build_controller(session, &config, view)?;

    controller.ensure_registered();
    controller.run_until_idle().await?;
    save_session(&store, &args.profile, controller.session())?;
    if let Some(err) = controller.view().last_error() {
        bail!("registration failed: {err}");
    }

    controller.start_login()?;
    if !controller.view().redirect_ready() {
        let reason = controller.view().last_error().unwrap_or("no redirect produced");
        bail!("unable to build authorization request: {reason}");
    }

    let callback = match listener {
        Some(listener) => listener
            .accept()
            .await
            .context("failed to receive authorization redirect")?,
        None => prompt_for_callback().await?,
    };

    controller.end_login(&callback)?;
    controller.run_until_idle().await?;
    save_session(&store, &args.profile, controller.session())?;
    if let Some(err) = controller.view().last_error() {
        bail!("login failed: {err}");
    }
    if !controller.view().authenticated() {
        bail!("login did not complete");
    }

    println!(
        "Login succeeded. Session stored for profile '{}'.",
        args.profile
    );
    if let Some(expiry) = controller
        .session()
        .tokens()
        .and_then(|tokens| tokens.expires_at)
    {
        println!("Access token expires at {} (UTC).", expiry);
    }
    Ok(())
}

fn logout(args: ProfileArgs) -> Result<()> {
    let store = open_store()?;
    let Some(persisted) = store
        .load(&args.profile)
        .context("failed to read stored session")?
    else {
        println!("No session stored for profile '{}'.", args.profile);
        return Ok(());
    };

    let mut session = AuthSessionState::restore(persisted);
    session.set_tokens(None)?;
    save_session(&store, &args.profile, &session)?;
    println!(
        "Logged out of profile '{}'; client registration kept.",
        args.profile
    );
    Ok(())
}

async fn refresh(args: ProfileArgs) -> Result<()> {
    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let store = open_store()?;
    let mut session = load_session(&store, &args.profile, &config)?;

    let Some(tokens) = session.tokens().cloned() else {
        bail!(
            "profile '{}' is not logged in; run `appauth login`",
            args.profile
        );
    };
    let client = HttpOidcClient::new(config).context("failed to build OIDC client")?;
    let refreshed = client
        .refresh_tokens(session.server_configuration()?, session.registration()?, &tokens)
        .await
        .context("token refresh failed")?;
    session.set_tokens(Some(refreshed))?;
    save_session(&store, &args.profile, &session)?;

    println!("Tokens refreshed for profile '{}'.", args.profile);
    if let Some(expiry) = session.tokens().and_then(|tokens| tokens.expires_at) {
        println!("Access token expires at {} (UTC).", expiry);
    }
    Ok(())
}

fn status(args: StatusArgs) -> Result<()> {
    let store = open_store()?;
    let session = store
        .load(&args.profile)
        .context("failed to read stored session")?
        .map(AuthSessionState::restore)
        .unwrap_or_default();

    let issuer = session
        .server_configuration()
        .ok()
        .map(|config| config.issuer.clone());
    let client_id = session
        .registration()
        .ok()
        .map(|registration| registration.client_id.clone());
    let tokens = session.tokens();

    if args.json {
        let summary = json!({
            "profile": args.profile,
            "phase": session.phase().to_string(),
            "issuer": issuer,
            "client_id": client_id,
            "expires_at": tokens.and_then(|t| t.expires_at),
            "expired": tokens.map(|t| t.is_expired()),
            "scope": tokens.map(|t| t.scope.clone()),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Profile   : {}", args.profile);
    println!("State     : {}", session.phase());
    if let Some(issuer) = issuer {
        println!("Issuer    : {}", issuer);
    }
    if let Some(client_id) = client_id {
        println!("Client ID : {}", client_id);
    }
    if let Some(tokens) = tokens {
        match tokens.expires_at {
            Some(expiry) if tokens.is_expired() => println!("Expired   : {}", expiry),
            Some(expiry) => println!("Expires   : {}", expiry),
            None => println!("Expires   : -"),
        }
        if !tokens.scope.is_empty() {
            println!("Scope     : {}", tokens.scope.join(" "));
        }
    }
    Ok(())
}

fn reset(args: ProfileArgs) -> Result<()> {
    let store = open_store()?;
    store
        .delete(&args.profile)
        .context("failed to remove stored session")?;
    println!("Deleted session for profile '{}'.", args.profile);
    Ok(())
}

fn open_store() -> Result<FileSessionStore> {
    FileSessionStore::with_default_locator().context("unable to initialise session store")
}

/// Load the stored session, discarding it if it was issued by a different issuer.
fn load_session(
    store: &FileSessionStore,
    profile: &str,
    config: &ClientConfig,
) -> Result<AuthSessionState> {
    let session = store
        .load(profile)
        .context("failed to read stored session")?
        .map(AuthSessionState::restore)
        .unwrap_or_default();

    if session.phase() == AuthPhase::Empty {
        return Ok(session);
    }

    let expected = config.issuer.as_str().trim_end_matches('/');
    let stored = session.server_configuration()?.issuer.trim_end_matches('/');
    if stored != expected {
        tracing::warn!(stored, expected, "issuer changed; starting a fresh session");
        return Ok(AuthSessionState::new());
    }
    Ok(session)
}

fn save_session(store: &FileSessionStore, profile: &str, session: &AuthSessionState) -> Result<()> {
    store
        .save(profile, &session.snapshot())
        .context("failed to persist session")
}

fn build_controller(
    session: AuthSessionState,
    config: &ClientConfig,
    view: ConsoleView,
) -> Result<LoginFlowController<HttpOidcClient, ConsoleView>> {
    let protocol = HttpOidcClient::new(config.clone()).context("failed to build OIDC client")?;
    Ok(LoginFlowController::new(
        session,
        Arc::new(protocol),
        view,
        config.issuer.clone(),
    ))
}

async fn prompt_for_callback() -> Result<String> {
    task::spawn_blocking(|| {
        use std::io::{self, Write};
        print!("Paste the full redirect URL from the browser: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_owned())
    })
    .await
    .context("input prompt was interrupted")?
}
