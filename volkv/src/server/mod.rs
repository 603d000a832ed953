// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The proxy's HTTP surface: a flat namespace where the request path is
//! the key, dispatched on method (GET/HEAD/PUT/DELETE plus the UNLINK
//! extension method for protected deletes).

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use volkv_store::{Error, GetOutcome, Result, Store};

/// Accept loop with graceful shutdown, one task per connection.
pub async fn serve(store: Arc<Store>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    let local_addr = listener.local_addr()?;

    let http_server = ConnBuilder::new(TokioExecutor::new());
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    info!("server is running at http://{local_addr}");

    loop {
        let (socket, _) = tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok(conn) => conn,
                    Err(err) => {
                        error!("error accepting connection: {err}");
                        continue;
                    }
                }
            }
            _ = ctrl_c.as_mut() => {
                break;
            }
        };

        let store = store.clone();
        let service = service_fn(move |req| handle(store.clone(), req));
        let conn = http_server.serve_connection(TokioIo::new(socket), service);
        let conn = graceful.watch(conn.into_owned());
        tokio::spawn(async move {
            let _ = conn.await;
        });
    }

    tokio::select! {
        () = graceful.shutdown() => {
            debug!("gracefully shutdown");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
            debug!("waited 10 seconds for graceful shutdown, aborting");
        }
    }

    info!("server is stopped");
    Ok(())
}

async fn handle(
    store: Arc<Store>,
    req: Request<Incoming>,
) -> core::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let key = req.uri().path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Ok(status_response(StatusCode::BAD_REQUEST));
    }

    let method = req.method().clone();
    let response = match method.as_str() {
        "GET" => match store.get(&key).await {
            Ok(out) => object_response(out),
            Err(err) => error_response(&err),
        },
        "HEAD" => match store.stat(&key).await {
            Ok(checksum) => {
                let mut resp = status_response(StatusCode::OK);
                set_checksum_header(&mut resp, checksum.as_deref());
                resp
            }
            Err(err) => error_response(&err),
        },
        "PUT" => {
            let body = req.into_body().collect().await?.to_bytes();
            if body.is_empty() {
                status_response(StatusCode::LENGTH_REQUIRED)
            } else {
                match store.put(&key, body).await {
                    Ok(()) => status_response(StatusCode::CREATED),
                    Err(err) => error_response(&err),
                }
            }
        }
        "DELETE" => match store.delete(&key).await {
            Ok(()) => status_response(StatusCode::NO_CONTENT),
            Err(err) => error_response(&err),
        },
        "UNLINK" => match store.unlink(&key).await {
            Ok(()) => status_response(StatusCode::NO_CONTENT),
            Err(err) => error_response(&err),
        },
        _ => status_response(StatusCode::METHOD_NOT_ALLOWED),
    };

    debug!(method = %method, %key, status = %response.status(), "request");
    Ok(response)
}

fn object_response(out: GetOutcome) -> Response<Full<Bytes>> {
    let checksum = out.checksum.clone();
    let mut resp = Response::new(Full::new(out.body));
    set_checksum_header(&mut resp, checksum.as_deref());
    resp
}

fn set_checksum_header(resp: &mut Response<Full<Bytes>>, checksum: Option<&str>) {
    if let Some(sum) = checksum {
        if let Ok(value) = HeaderValue::from_str(sum) {
            resp.headers_mut().insert("content-md5", value);
        }
    }
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    let status = match err {
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::LockContention => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    status_response(status)
}
