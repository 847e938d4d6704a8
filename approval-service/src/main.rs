mod config;
mod error;
mod events;
mod handlers;
mod lock;
mod models;
mod moderation;
mod notifications;
mod owner_view;
mod routes;
mod sanitize;
mod session;
mod signals;
mod workflow;
#[cfg(test)]
mod tests;

use axum::{body::Body, extract::Request, response::Response, Router};
use http_body_util::BodyExt;
use lambda_http::{
    run, service_fn, Body as LambdaBody, Error, Request as LambdaRequest,
    Response as LambdaResponse,
};
use log::{debug, error, info, trace};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tokio::sync::Mutex;
use tower::ServiceExt;

use crate::config::ServiceConfig;

// Router instance that will be initialized once per Lambda container, so the
// action lock and invitation cache survive between invocations
static ROUTER: OnceCell<Mutex<Option<Router>>> = OnceCell::new();

async fn shared_router() -> Router {
    let mutex = ROUTER.get_or_init(|| Mutex::new(None));
    let mut router_option = mutex.lock().await;

    match router_option.as_ref() {
        Some(router) => router.clone(),
        None => {
            info!("Initializing the Axum router");
            let router = routes::create_router(&ServiceConfig::from_env()).await;
            *router_option = Some(router.clone());
            router
        }
    }
}

// The Lambda handler function
async fn function_handler(event: LambdaRequest) -> Result<LambdaResponse<LambdaBody>, Error> {
    info!(
        "Received Lambda request: method={:?}, path={:?}, query_params={:?}",
        event.method(),
        event.uri().path(),
        event.uri().query()
    );

    let app = shared_router().await;

    let (parts, body) = event.into_parts();
    let body = match body {
        LambdaBody::Empty => Body::empty(),
        LambdaBody::Text(text) => {
            debug!("Request body (text): {} bytes", text.len());
            Body::from(text)
        }
        LambdaBody::Binary(data) => {
            debug!("Request body (binary): {} bytes", data.len());
            Body::from(data)
        }
    };

    let http_request = Request::from_parts(parts, body);

    let response = match app.oneshot(http_request).await {
        Ok(response) => {
            info!("Received response from Axum: status={}", response.status());
            response
        }
        Err(err) => {
            error!("Error from Axum router: {:?}", err);
            return Err(Error::from(format!("Router error: {:?}", err)));
        }
    };

    response_to_lambda(response).await
}

// Convert the Axum response to a format suitable for Lambda
async fn response_to_lambda(response: Response) -> Result<LambdaResponse<LambdaBody>, Error> {
    let (parts, body) = response.into_parts();
    debug!(
        "Converting response: status={}, headers={:?}",
        parts.status, parts.headers
    );

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            error!("Failed to read response body: {:?}", err);
            return Err(Error::from(err));
        }
    };

    let builder = parts
        .headers
        .iter()
        .fold(
            LambdaResponse::builder().status(parts.status),
            |builder, (name, value)| {
                trace!("Adding response header: {}={:?}", name, value);
                builder.header(name, value)
            },
        );

    let lambda_response = if bytes.is_empty() {
        builder.body(LambdaBody::Empty)?
    } else {
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => builder.body(LambdaBody::Text(text))?,
            Err(_) => builder.body(LambdaBody::Binary(bytes.to_vec()))?,
        }
    };

    Ok(lambda_response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Logging initialized with env_logger");

    let config = ServiceConfig::from_env();

    if let Some(function_name) = &config.lambda_function {
        info!(
            "Running in AWS Lambda environment: {} (version: {})",
            function_name,
            std::env::var("AWS_LAMBDA_FUNCTION_VERSION").unwrap_or_else(|_| "unknown".into())
        );
        run(service_fn(function_handler)).await?;
    } else {
        info!("Starting service in non-Lambda environment");
        let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
        info!("listening on {}", addr);

        let app = routes::create_router(&config).await;
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app.into_make_service()).await?;
    }

    info!("Service finished");
    Ok(())
}
