use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sentinel_api_client::{ApiClient, ApiClientConfig};
use sentinel_client_core::{
    FileTokenStore, IdentityResolution, LoginOutcome, LoginRequest, RouteDecision, SessionManager,
    SessionPhase, View,
};
use sentinel_dashboard::{DashboardView, HttpMetricsSource, MetricsSource, SyntheticMetricsSource};
use tracing::{info, warn};

use crate::Commands;
use crate::config::{CliConfig, MetricsSourceKind};
use crate::render;

const TICK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a command left the session, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    /// The requested view needs a credential the session does not hold.
    NeedsLogin,
    Failed,
}

/// The console shell: one session, one API client, and the views they gate.
pub struct ConsoleApp {
    config: CliConfig,
    client: ApiClient,
    session: SessionManager<FileTokenStore, ApiClient>,
    json_output: bool,
}

impl ConsoleApp {
    pub fn new(config: CliConfig) -> Result<Self> {
        let mut client_config = ApiClientConfig::new(config.api_base_url.clone());
        client_config.timeout_ms = config.http_timeout_ms;
        let client = ApiClient::new(client_config).context("build api client")?;
        let store = FileTokenStore::in_dir(&config.state_dir);
        let session = SessionManager::new(store, client.clone());
        Ok(Self {
            config,
            client,
            session,
            json_output: false,
        })
    }

    /// Emits dashboard snapshots as one JSON document per line.
    #[must_use]
    pub fn with_json_output(mut self, json_output: bool) -> Self {
        self.json_output = json_output;
        self
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager<FileTokenStore, ApiClient> {
        &self.session
    }

    /// Runs one subcommand. Logout only reads the stored slot; every other
    /// command resolves the stored token before rendering anything.
    pub async fn execute(
        &mut self,
        command: Commands,
        out: &mut impl Write,
    ) -> Result<CommandStatus> {
        if matches!(command, Commands::Logout) {
            self.session.restore().context("read stored session")?;
        } else {
            self.boot().await?;
        }

        match command {
            Commands::Login { username, password } => {
                self.login(&username, &password, out).await
            }
            Commands::Logout => self.logout(out),
            Commands::Whoami => self.whoami(out),
            Commands::Open { path, ticks } => self.open(&path, ticks, out).await,
            Commands::Dashboard { ticks, .. } => self.open("/dashboard", ticks, out).await,
        }
    }

    /// Restores any stored token and resolves its identity.
    pub async fn boot(&mut self) -> Result<SessionPhase> {
        let phase = self.session.boot().await.context("restore session")?;
        info!(phase = %phase, "session booted");
        Ok(phase)
    }

    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        out: &mut impl Write,
    ) -> Result<CommandStatus> {
        if self.session.has_credential() {
            writeln!(out, "already signed in; run `sentinel logout` first")?;
            return Ok(CommandStatus::Failed);
        }
        let request = match LoginRequest::new(username, password) {
            Ok(request) => request,
            Err(error) => {
                write!(out, "{}", render::login_prompt(Some(&error.to_string())))?;
                return Ok(CommandStatus::Failed);
            }
        };

        match self.session.login(&request).await? {
            LoginOutcome::Success => {}
            LoginOutcome::Failure { reason } => {
                write!(out, "{}", render::login_prompt(Some(&reason)))?;
                return Ok(CommandStatus::Failed);
            }
        }

        match self.session.resolve_identity().await? {
            IdentityResolution::Resolved | IdentityResolution::NotPending => {
                let name = self
                    .session
                    .current_identity()
                    .map_or("User", |identity| identity.display_name());
                writeln!(out, "signed in as {name}")?;
                Ok(CommandStatus::Ok)
            }
            IdentityResolution::Rejected { error } => {
                warn!(reason = %error, "new token was rejected by identity lookup");
                write!(out, "{}", render::login_prompt(Some(&error.failure_reason())))?;
                Ok(CommandStatus::Failed)
            }
        }
    }

    pub fn logout(&mut self, out: &mut impl Write) -> Result<CommandStatus> {
        let was_signed_in = self.session.has_credential();
        if let Err(error) = self.session.logout() {
            writeln!(out, "sign-out failed: {error}")?;
            return Ok(CommandStatus::Failed);
        }
        if was_signed_in {
            writeln!(out, "signed out")?;
        } else {
            writeln!(out, "not signed in")?;
        }
        Ok(CommandStatus::Ok)
    }

    pub fn whoami(&self, out: &mut impl Write) -> Result<CommandStatus> {
        match self.session.current_identity() {
            Some(identity) => {
                writeln!(out, "{}", identity.display_name())?;
                Ok(CommandStatus::Ok)
            }
            None => {
                writeln!(out, "not signed in")?;
                Ok(CommandStatus::NeedsLogin)
            }
        }
    }

    /// Renders whatever the route gate puts on screen for `path`.
    pub async fn open(
        &mut self,
        path: &str,
        ticks: Option<u64>,
        out: &mut impl Write,
    ) -> Result<CommandStatus> {
        let decision = self.session.route(path);
        if let RouteDecision::Redirect(target) = decision {
            info!(requested = path, target = target.to_path(), "route redirected");
            writeln!(out, "-> {}", target.to_path())?;
        }
        match decision.view() {
            View::Landing => {
                write!(out, "{}", render::landing())?;
                Ok(CommandStatus::Ok)
            }
            View::Login => {
                write!(out, "{}", render::login_prompt(None))?;
                Ok(if decision == RouteDecision::Render(View::Login) {
                    CommandStatus::Ok
                } else {
                    CommandStatus::NeedsLogin
                })
            }
            View::Dashboard => self.run_dashboard(ticks, out).await,
        }
    }

    /// Mounts the dashboard, renders the initial snapshot, then re-renders
    /// after each refresh until `ticks` refreshes have been shown or ctrl-c.
    pub async fn run_dashboard(
        &mut self,
        ticks: Option<u64>,
        out: &mut impl Write,
    ) -> Result<CommandStatus> {
        let mut view = DashboardView::new(self.metrics_source(), self.config.refresh_period);
        view.set_identity(self.session.current_identity());
        view.mount().await;

        if !self.json_output {
            write!(out, "{}", render::header(view.header()))?;
        }
        self.render_snapshot(&view, out)?;

        let mut shown = 0_u64;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        while ticks.is_none_or(|limit| shown < limit) {
            let seen = view.stats().ticks;
            tokio::select! {
                () = wait_for_tick(&view, seen) => {}
                _ = &mut shutdown => {
                    info!("interrupted; leaving dashboard");
                    break;
                }
            }
            shown += 1;
            self.render_snapshot(&view, out)?;
        }

        view.unmount();
        Ok(CommandStatus::Ok)
    }

    fn render_snapshot(&self, view: &DashboardView, out: &mut impl Write) -> Result<()> {
        let snapshot = view.snapshot();
        if self.json_output {
            serde_json::to_writer(&mut *out, &snapshot).context("encode snapshot")?;
            writeln!(out)?;
        } else {
            write!(out, "{}", render::snapshot(&snapshot, &view.stats()))?;
        }
        out.flush()?;
        Ok(())
    }

    fn metrics_source(&self) -> Arc<dyn MetricsSource> {
        match (self.config.metrics_source, self.session.token()) {
            (MetricsSourceKind::Http, Some(token)) => Arc::new(HttpMetricsSource::new(
                self.client.clone(),
                self.config.metrics_path.clone(),
                token,
            )),
            (MetricsSourceKind::Http, None) => {
                warn!("http metrics source needs a token; falling back to synthetic metrics");
                Arc::new(SyntheticMetricsSource::new())
            }
            (MetricsSourceKind::Synthetic, _) => Arc::new(SyntheticMetricsSource::new()),
        }
    }
}

async fn wait_for_tick(view: &DashboardView, seen: u64) {
    tokio::time::sleep(view.period()).await;
    while view.stats().ticks <= seen {
        tokio::time::sleep(TICK_POLL_INTERVAL).await;
    }
}
