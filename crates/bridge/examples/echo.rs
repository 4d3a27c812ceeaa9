//! Streams a request body through an echo handler over the in-memory runtime,
//! with a slow client reading the response.

use std::convert::Infallible;
use std::time::Duration;

use http::{Request, Response, StatusCode};
use micro_bridge::connection::NativeHandler;
use micro_bridge::handler::make_handler;
use micro_bridge::native::{SinkCommand, request_channel, response_channel};
use micro_bridge::protocol::BodySizeLimit;
use micro_bridge::protocol::body::{RequestBody, ResponseBody};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let handler = NativeHandler::builder(make_handler(echo)).body_size_limit("1M".parse::<BodySizeLimit>().expect("valid limit")).build();

    let head = Request::post("/echo")
        .header("host", "localhost:8080")
        .header("content-type", "text/plain")
        .header("transfer-encoding", "chunked")
        .body(())
        .expect("valid request head");
    let (request, emitter) = request_channel(head);
    let (mut response, mut observer) = response_channel(8);

    let client = tokio::spawn(async move {
        for line in ["one ", "two ", "three ", "four"] {
            if !emitter.write(line).await {
                return;
            }
            info!(line, "client sent");
        }
        emitter.end();
    });

    let reader = tokio::spawn(async move {
        while let Some(command) = observer.next_command().await {
            match command {
                SinkCommand::Head { status, .. } => info!(%status, "response head"),
                SinkCommand::Data(chunk) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    info!(chunk = ?chunk, "client received");
                    observer.flushed(chunk.len());
                }
                SinkCommand::End => break,
                SinkCommand::Destroy(reason) => {
                    error!(reason = ?reason, "response destroyed");
                    break;
                }
            }
        }
    });

    match handler.handle(request, &mut response).await {
        Ok(state) => info!(?state, "exchange finished"),
        Err(e) => error!(cause = %e, "exchange failed"),
    }

    let _ = tokio::join!(client, reader);
}

async fn echo(request: Request<RequestBody>) -> Result<Response<ResponseBody>, Infallible> {
    info!(uri = %request.uri(), "echoing request body");
    let mut response = Response::new(ResponseBody::from(request.into_body()));
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}
