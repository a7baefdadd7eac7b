use actix_cors::Cors;
use actix_web::http::{header, Method};

/// CORS policy for the configured origins; `*` allows any origin
pub fn cors(allowed_origins: &[String]) -> Cors {
    let base = Cors::default()
        .allowed_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allowed_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allowed_header(header::HeaderName::from_static("x-request-id"))
        .expose_headers([header::HeaderName::from_static("x-request-id")])
        .max_age(3600);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return base.allow_any_origin();
    }

    allowed_origins
        .iter()
        .fold(base, |cors, origin| cors.allowed_origin(origin))
}
