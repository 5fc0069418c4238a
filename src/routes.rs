use crate::{
    api::{attendance, attendance_request, movement, reimbursement},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / requests_per_min as u64).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let checkin_limiter = Arc::new(build_limiter(config.rate_checkin_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/check-in, /attendance/check-out
                    .service(
                        web::resource("/check-in")
                            .wrap(checkin_limiter.clone())
                            .route(web::post().to(attendance::check_in)),
                    )
                    .service(
                        web::resource("/check-out")
                            .wrap(checkin_limiter)
                            .route(web::post().to(attendance::check_out)),
                    )
                    // /attendance/{employee_id}/{date}
                    .service(
                        web::resource("/{employee_id}/{date}")
                            .route(web::get().to(attendance::get_attendance_day)),
                    ),
            )
            .service(
                web::scope("/attendance-requests")
                    .service(
                        web::resource("")
                            .route(web::post().to(attendance_request::create_request))
                            .route(web::get().to(attendance_request::list_pending)),
                    )
                    .service(
                        web::resource("/{id}").route(web::get().to(attendance_request::get_request)),
                    )
                    .service(
                        web::resource("/{id}/decision")
                            .route(web::put().to(attendance_request::decide_request)),
                    ),
            )
            .service(
                web::scope("/movement")
                    .service(web::resource("/points").route(web::post().to(movement::record_point)))
                    .service(
                        web::resource("/{employee_id}/{date}")
                            .route(web::get().to(movement::get_trail)),
                    )
                    .service(
                        web::resource("/{employee_id}/{date}/recompute")
                            .route(web::post().to(movement::recompute_trail)),
                    ),
            )
            .service(
                web::scope("/reimbursement-batches")
                    .service(web::resource("").route(web::post().to(reimbursement::create_batch)))
                    .service(web::resource("/{id}").route(web::get().to(reimbursement::get_batch)))
                    .service(
                        web::resource("/{id}/processing")
                            .route(web::put().to(reimbursement::start_processing)),
                    )
                    .service(
                        web::resource("/{id}/complete")
                            .route(web::put().to(reimbursement::complete_batch)),
                    )
                    .service(
                        web::resource("/{id}/fail").route(web::put().to(reimbursement::fail_batch)),
                    ),
            ),
    );
}
