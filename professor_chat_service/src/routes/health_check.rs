use actix_web::HttpResponse;

/// Liveness probe: answers as soon as the server accepts connections, without calling any backend
#[tracing::instrument(name = "Health check")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
