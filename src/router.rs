use crate::{
    config::Config,
    error::AppError,
    notify::Notifier,
    routes::{admin, invitation},
    util::asset_loader::AssetLoader,
};
use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, get_service},
};
use minijinja::Environment;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tower_http::{services::ServeDir, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub templates: Arc<Environment<'static>>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> anyhow::Result<Self> {
        let templates = setup_templates(&config);
        let notifier = Notifier::from_config(&config.email)?;
        Ok(Self {
            db,
            config: Arc::new(config),
            templates: Arc::new(templates),
            notifier: Arc::new(notifier),
        })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<Html<String>, AppError> {
        let tmpl = self.templates.get_template(name)?;
        Ok(Html(tmpl.render(ctx)?))
    }
}

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/", get(index))
        .merge(invitation::routes())
        .merge(admin::routes(state.clone()))
        .with_state(state)
        .nest_service("/static", get_service(ServeDir::new(static_dir)))
        .layer(TraceLayer::new_for_http())
}

pub fn setup_templates(config: &Config) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(minijinja::path_loader(config.templates_dir.clone()));
    let asset_loader = AssetLoader::new(&config.static_dir);
    asset_loader.register(&mut env);
    env
}

async fn index(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.render(
        "index.html",
        minijinja::context! {
            couple_name => state.config.couple_name,
            website_url => state.config.info_url,
            wedding_date => state.config.wedding_date,
            wedding_location => state.config.wedding_location,
        },
    )
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{config::tests::test_config, database::tests::test_db};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub async fn test_state() -> AppState {
        AppState::new(test_db().await, test_config()).expect("state")
    }

    pub async fn send(app: Router, request: Request<Body>) -> Response {
        app.oneshot(request).await.expect("infallible")
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn index_renders() {
        let app = create_router(test_state().await);
        let response = send(app, Request::get("/").body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("9-11 Janvier 2026"));
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let app = create_router(test_state().await);
        let response = send(app, Request::get("/static/site.css").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
