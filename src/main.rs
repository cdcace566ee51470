mod config;
mod error;
mod geometry;
mod model;
mod pipeline;
mod poller;
mod schedule;
mod store;
mod vendor;

#[cfg(test)]
mod test_utils;

use std::env;
use std::sync::Arc;

use actix_web::{get, middleware::Logger, web, App, HttpResponse, HttpServer, Responder};
use serde_json::json;
use tokio::select;

use crate::config::Config;
use crate::error::{EtaError, EtaResult};
use crate::geometry::GeometryIndex;
use crate::model::{GradientBoostedModel, SegmentTimeModel};
use crate::pipeline::preprocess::StopBinning;
use crate::schedule::Schedule;
use crate::store::Store;
use crate::vendor::VendorClient;

#[derive(Clone)]
pub struct ContextData {
    config: Config,
    schedule: Arc<Schedule>,
    geometry: Arc<GeometryIndex>,
    binning: Arc<StopBinning>,
    model: Arc<dyn SegmentTimeModel>,
    vendor: VendorClient,
    store: Store,
}

#[get("/ok")]
async fn ok() -> EtaResult<impl Responder> {
    Ok(HttpResponse::Ok().finish())
}

#[get("/routes")]
async fn get_routes(ctx: web::Data<ContextData>) -> EtaResult<impl Responder> {
    let routes = ctx.schedule.route_summaries();
    let response = web::Json(json!({
        "routes": routes,
    }));
    Ok(response)
}

#[get("/trips/{trip_id}")]
async fn get_trip(
    params: web::Path<(String,)>,
    ctx: web::Data<ContextData>,
) -> EtaResult<impl Responder> {
    let (trip_id,) = params.into_inner();

    let trip = ctx
        .schedule
        .trip_detail(&trip_id)
        .ok_or_else(|| EtaError::Response(404, format!("Unknown trip {trip_id}")))?;
    let response = web::Json(json!({
        "trip": trip,
    }));
    Ok(response)
}

#[get("/trips/{trip_id}/stops")]
async fn get_trip_stops(
    params: web::Path<(String,)>,
    ctx: web::Data<ContextData>,
) -> EtaResult<impl Responder> {
    let (trip_id,) = params.into_inner();

    let stops = ctx
        .schedule
        .trip_stops(&trip_id)
        .ok_or_else(|| EtaError::Response(404, format!("Unknown trip {trip_id}")))?;

    let mut rows = Vec::with_capacity(stops.len());
    for stop in stops {
        let etas = ctx.store.stop_etas(&stop.id).await?;
        rows.push(json!({
            "id": stop.id,
            "order": stop.order,
            "name": stop.name,
            "lat": stop.lat,
            "lon": stop.lon,
            "etas": etas,
        }));
    }

    let response = web::Json(json!({
        "stops": rows,
    }));
    Ok(response)
}

#[get("/stops/{stop_id}/etas")]
async fn get_stop_etas(
    params: web::Path<(String,)>,
    ctx: web::Data<ContextData>,
) -> EtaResult<impl Responder> {
    let (stop_id,) = params.into_inner();

    if ctx.schedule.stop(&stop_id).is_none() {
        return Err(EtaError::Response(404, format!("Unknown stop {stop_id}")));
    }
    let etas = ctx.store.stop_etas(&stop_id).await?;
    let response = web::Json(json!({
        "stop_etas": etas,
    }));
    Ok(response)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::try_init().ok();

    log::debug!("Debug logging enabled");

    dotenvy::from_filename(".env").ok();

    let config = Config::from_env();

    let schedule = Arc::new(
        Schedule::load(&config.data_dir, &config.corridors).expect("Failed to load schedule"),
    );
    let geometry =
        Arc::new(GeometryIndex::build(&schedule).expect("Failed to build geometry index"));
    let binning = Arc::new(StopBinning::build(
        &schedule.stop_mean_eta,
        config.congestion_bins,
    ));
    let model: Arc<dyn SegmentTimeModel> = Arc::new(
        GradientBoostedModel::from_file(&config.model_path).expect("Failed to load model"),
    );
    let vendor = VendorClient::new(&config).expect("Failed to build vendor client");
    let store = Store::connect(&config.redis_url)
        .await
        .expect("Failed to connect to store");

    let listen_address = config.listen_address.clone();
    let ctx = ContextData {
        config,
        schedule,
        geometry,
        binning,
        model,
        vendor,
        store,
    };

    let poller = poller::run_poller(ctx.clone());

    log::info!("Starting server at {}", listen_address);

    let server_ctx = ctx.clone();
    let server = HttpServer::new(move || {
        let logger = Logger::default();

        let mut cors = actix_cors::Cors::default()
            .allowed_methods(vec!["GET"])
            .allowed_headers(vec!["accept"]);

        if let Ok(allowed_origin) = env::var("ALLOW_ORIGIN") {
            if allowed_origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(&allowed_origin);
            }
        }

        App::new()
            .wrap(logger)
            .wrap(cors)
            .app_data(web::Data::new(server_ctx.clone()))
            .service(ok)
            .service(get_routes)
            .service(get_trip)
            .service(get_trip_stops)
            .service(get_stop_etas)
    })
    .bind(listen_address)?
    .run();

    select! {
        res = server => {
            log::info!("Server stopped");
            res?;
            Ok::<_, std::io::Error>(())
        },
        res = poller => {
            log::info!("Ingestion loop stopped");
            res?;
            Ok(())
        }
    }?;

    Ok(())
}
