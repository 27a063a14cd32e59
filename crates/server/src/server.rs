use axum::{Router, response::Html, routing::get};
use tetramem_shared::AppError;
use tokio::net::TcpListener;

use crate::{
  api,
  utils::{AppState, shutdown_signal},
};

#[axum::debug_handler]
async fn handler() -> Html<&'static str> {
  Html("<h1>Tetramem</h1>")
}

pub async fn server(port: u16, app_state: AppState) -> Result<(), AppError> {
  let app = Router::new().route("/", get(handler)).merge(api::app()).with_state(app_state);

  let addr = format!("0.0.0.0:{port}");
  let listener = TcpListener::bind(&addr).await?;

  tracing::info!("server started at http://{addr}");

  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

  Ok(())
}
