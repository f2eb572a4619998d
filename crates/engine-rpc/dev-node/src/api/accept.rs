use crate::{
    api::process_request::match_method,
    chain::DevChain,
};

use core::convert::Infallible;

use http_body_util::Full;
use hyper::{
    Error,
    Method,
    Request,
    StatusCode,
    body::Bytes,
    header,
};

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> hyper::Response<Full<Bytes>> {
    let mut response = hyper::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}

/// Accepts an incoming HTTP request, which it responds with
/// the appropriate api call.
#[tracing::instrument(level = "info", skip_all, target = "api::accept_request")]
pub async fn accept_request<B>(
    tx: Request<B>,
    chain: &DevChain,
    client_addr: std::net::SocketAddr,
) -> Result<hyper::Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Error = Error>,
{
    let path = tx.uri().path();
    let method = tx.method().clone();

    if path == "/health" && method == Method::GET {
        return Ok(respond(StatusCode::OK, "text/plain", Bytes::from("ok")));
    }

    if method != Method::POST {
        return Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            Bytes::from("JSON-RPC requests must be POSTed"),
        ));
    }

    tracing::debug!(target = "api::accept_request", "Incoming request");
    let resp = match match_method(tx, chain, client_addr).await {
        Ok(rax) => rax,
        Err(e) => {
            return Ok(respond(
                StatusCode::BAD_REQUEST,
                "text/plain",
                Bytes::from(e.to_string()),
            ));
        }
    };
    Ok(respond(StatusCode::OK, "application/json", Bytes::from(resp)))
}

/// Macros for accepting requests
#[macro_export]
macro_rules! accept {
    (
        $io:expr,
        $chain:expr,
        $client_addr:expr
    ) => {
        let chain = $chain.clone();
        let client_addr = $client_addr;
        // Bind the incoming connection to our service
        if let Err(err) = hyper::server::conn::http1::Builder::new()
            // `service_fn` converts our function in a `Service`
            .serve_connection(
                $io,
                hyper::service::service_fn(move |req| {
                    let chain = chain.clone();
                    async move {
                        $crate::api::accept::accept_request(req, &chain, client_addr).await
                    }
                }),
            )
            .await
        {
            tracing::error!(?err, "Error serving connection");
        }
    };
}
