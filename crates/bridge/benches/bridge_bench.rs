use std::convert::Infallible;
use std::hint::black_box;

use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;
use http::{Request, Response};
use http_body_util::BodyExt;
use micro_bridge::connection::{NativeHandler, set_response};
use micro_bridge::handler::make_handler;
use micro_bridge::native::{request_channel, response_channel};
use micro_bridge::protocol::body::{RequestBody, ResponseBody, raw_body};

const CHUNK: &[u8] = &[b'x'; 16 * 1024];
const CHUNKS: usize = 64;

fn upload() -> Request<()> {
    Request::post("/upload")
        .header("host", "localhost")
        .header("content-type", "application/octet-stream")
        .header("content-length", (CHUNK.len() * CHUNKS).to_string())
        .body(())
        .unwrap()
}

async fn echo(req: Request<RequestBody>) -> Result<Response<ResponseBody>, Infallible> {
    Ok(Response::new(ResponseBody::from(req.into_body())))
}

fn bench_incoming_body(c: &mut Criterion) {
    c.bench_function("collect_incoming_body", |b| {
        b.iter(|| {
            let (request, emitter) = request_channel(upload());
            for _ in 0..CHUNKS {
                emitter.data(Bytes::from_static(CHUNK));
            }
            emitter.end();

            let body = raw_body(request, None).unwrap().unwrap();
            black_box(block_on(body.collect()).unwrap().to_bytes());
        });
    });
}

fn bench_set_response(c: &mut Criterion) {
    c.bench_function("write_streamed_response", |b| {
        b.iter(|| {
            let (mut response, observer) = response_channel(usize::MAX);
            let body = ResponseBody::from(Bytes::from_static(CHUNK));
            black_box(block_on(set_response(&mut response, Response::new(body))));
            drop(observer);
        });
    });
}

fn bench_echo_exchange(c: &mut Criterion) {
    let handler = NativeHandler::new(make_handler(echo));

    c.bench_function("echo_exchange", |b| {
        b.iter(|| {
            let (request, emitter) = request_channel(upload());
            for _ in 0..CHUNKS {
                emitter.data(Bytes::from_static(CHUNK));
            }
            emitter.end();

            let (mut response, observer) = response_channel(usize::MAX);
            black_box(block_on(handler.handle(request, &mut response)).unwrap());
            drop(observer);
        });
    });
}

criterion_group!(benches, bench_incoming_body, bench_set_response, bench_echo_exchange);
criterion_main!(benches);
