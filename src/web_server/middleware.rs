use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// The registry changes underneath every response; never let it be cached.
pub(crate) async fn no_cache_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-cache, no-store, must-revalidate, max-age=0"),
    );
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers.insert("Expires", HeaderValue::from_static("0"));

    response
}
