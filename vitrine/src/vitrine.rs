use std::future::Future;
use std::mem;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;
use vitrine_contrib_content::ContentBackend;
use vitrine_contrib_content::ContentStore;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_contrib_settings::SettingsStore;

use crate::auth::TokenAuthMiddleware;
use crate::config::VitrineConfig;
use crate::error::VitrineError;
use crate::router::router;
use crate::state::AppState;
use crate::tracing::init_tracing;
use crate::uploads::UploadStorage;

/// Entry point for starting a vitrine server
///
/// ```no_run
/// # async fn run() -> Result<(), vitrine::error::VitrineError> {
/// use vitrine::Vitrine;
/// use vitrine::config::VitrineConfig;
/// use vitrine::contrib::content::MemoryContentBackend;
/// use vitrine::contrib::settings::MemorySettingsBackend;
///
/// Vitrine::new(VitrineConfig::from_env()?)?
///     .init_stores(MemorySettingsBackend::new(), MemoryContentBackend::new())
///     .await?
///     .start()
///     .await
/// # }
/// ```
pub struct Vitrine {
    config: VitrineConfig,
}

impl Vitrine {
    /// Installs the global tracing subscriber
    pub fn new(config: VitrineConfig) -> Result<Self, VitrineError> {
        init_tracing(config.log_format, &config.service_name)?;
        Ok(Self { config })
    }

    /// Loads both stores from their backends
    pub async fn init_stores<S: SettingsBackend, C: ContentBackend>(
        self,
        settings: S,
        content: C,
    ) -> Result<RouterBuilder<S, C>, VitrineError> {
        let auth = TokenAuthMiddleware::from_config(
            &self.config.admin_tokens,
            &self.config.client_tokens,
        )?;
        let uploads = UploadStorage::new(
            &self.config.upload_dir,
            &self.config.uploads_prefix,
            self.config.max_upload_size,
        );

        let settings = SettingsStore::load(settings).await?;
        let content = ContentStore::load(content).await?;
        info!(
            settings.revision = settings.snapshot().revision,
            content.rows = content.snapshot().rows.len(),
            "Loaded stores"
        );

        Ok(RouterBuilder {
            config: self.config,
            state: AppState::new(settings, content, uploads),
            auth,
            routes: Router::new(),
        })
    }
}

/// Second stage of [`Vitrine`] after the stores have been loaded
pub struct RouterBuilder<S, C> {
    config: VitrineConfig,
    state: AppState<S, C>,
    auth: TokenAuthMiddleware,
    routes: Router,
}

impl<S: SettingsBackend, C: ContentBackend> RouterBuilder<S, C> {
    /// The loaded stores
    ///
    /// Use this to watch the stores or to seed defaults before serving.
    pub fn state(&self) -> &AppState<S, C> {
        &self.state
    }

    /// Adds a router next to vitrine's own routes
    pub fn add_routes(&mut self, router: Router) -> &mut Self {
        let this = mem::take(&mut self.routes);
        self.routes = this.merge(router);
        self
    }

    /// Constructs the final router without serving it
    pub fn build(&mut self) -> Router {
        router(self.state.clone(), self.auth.clone()).merge(mem::take(&mut self.routes))
    }

    /// Starts the webserver on the configured address
    ///
    /// With the `graceful-shutdown` feature it stops on `SIGINT` or `SIGTERM`
    /// after finishing the requests in flight.
    pub async fn start(&mut self) -> Result<(), VitrineError> {
        let socket = TcpListener::bind(self.config.listen_address).await?;
        self.serve(socket, shutdown_signal()?).await
    }

    /// Serves on an already bound listener until `shutdown` completes
    pub async fn serve(
        &mut self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), VitrineError> {
        let router = self.build();

        info!("Starting to serve webserver on http://{}", listener.local_addr()?);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Webserver stopped");
        Ok(())
    }
}

#[cfg(feature = "graceful-shutdown")]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static, VitrineError> {
    use futures_lite::StreamExt;
    use signal_hook::consts::SIGINT;
    use signal_hook::consts::SIGTERM;
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    Ok(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "Received termination signal, shutting down");
        }
    })
}

#[cfg(not(feature = "graceful-shutdown"))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static, VitrineError> {
    Ok(std::future::pending())
}
