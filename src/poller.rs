use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::error::EtaResult;
use crate::pipeline::{self, RawFix};
use crate::ContextData;

/// Ingest-and-predict loop. Polls the vendor on a fixed period, fans out
/// one task per vehicle, and publishes the results. Runs forever.
pub async fn run_poller(ctx: ContextData) -> EtaResult<()> {
    log::info!(
        "Ingestion loop is running, polling every {:?}",
        ctx.config.poll_period
    );

    let mut interval = tokio::time::interval(ctx.config.poll_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let now_local = Utc::now().with_timezone(&ctx.config.timezone);
        if ctx.config.is_quiet_hour(now_local.hour()) {
            log::debug!("Quiet hours, skipping tick");
            continue;
        }

        let positions = match ctx.vendor.fetch_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                // The client already retried with fresh credentials; give
                // this tick up and poll again.
                log::error!("Error fetching vendor positions: {}", e);
                continue;
            }
        };

        let mut per_vehicle: HashMap<String, Vec<RawFix>> = HashMap::new();
        for position in positions {
            if !ctx.config.corridors.contains(&position.koridor) {
                continue;
            }
            per_vehicle
                .entry(position.bus_code.clone())
                .or_default()
                .push(position.into_fix(true));
        }

        let vehicles = per_vehicle.len();
        let mut tasks = JoinSet::new();
        for (bus_code, fixes) in per_vehicle {
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let result = process_vehicle(&ctx, &bus_code, fixes).await;
                (bus_code, result)
            });
        }

        let mut published = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Some(stops)))) => published += stops,
                Ok((_, Ok(None))) => {}
                Ok((bus_code, Err(e))) => {
                    log::error!("Error processing vehicle {}: {}", bus_code, e);
                }
                Err(e) => log::error!("Vehicle task failed: {}", e),
            }
        }
        log::debug!(
            "Tick complete: {} vehicles, {} stop etas published",
            vehicles,
            published
        );

        let stop_ids: Vec<String> = ctx
            .schedule
            .stops
            .iter()
            .map(|stop| stop.stop_id.clone())
            .collect();
        if let Err(e) = ctx.store.prune_expired_etas(&stop_ids, Utc::now()).await {
            log::error!("Error pruning expired etas: {}", e);
        }
    }
}

/// One vehicle's tick: store the fresh fixes, run the pipeline over the
/// retained window, publish. Returns the number of stop ETAs published, or
/// None when the vehicle produced no result.
async fn process_vehicle(
    ctx: &ContextData,
    bus_code: &str,
    new_fixes: Vec<RawFix>,
) -> EtaResult<Option<usize>> {
    let config = &ctx.config;

    let history = ctx.store.history(bus_code, config.history_cap).await?;
    let now_local = Utc::now().with_timezone(&config.timezone);
    ctx.store
        .push_fixes(
            bus_code,
            &new_fixes,
            config.history_cap,
            history_expiry(now_local),
        )
        .await?;

    // The retained history must already be deep enough; this tick's fixes
    // only start counting from the next one.
    if history.len() < config.min_window {
        log::debug!(
            "Vehicle {} has {} retained fixes, not predicting yet",
            bus_code,
            history.len()
        );
        return Ok(None);
    }

    let mut window = history;
    window.extend(new_fixes);

    let outcome = match pipeline::run_vehicle(
        &ctx.geometry,
        &ctx.binning,
        ctx.model.as_ref(),
        config,
        window,
    ) {
        Ok(outcome) => outcome,
        Err(e) if e.is_expected() => {
            log::debug!("Vehicle {}: {}", bus_code, e);
            return Ok(None);
        }
        // Unexpected failures bubble to the tick loop, which logs them; the
        // vehicle still publishes nothing this tick.
        Err(e) => return Err(e.into()),
    };

    for eta in &outcome.etas {
        let arrival = now_local + Duration::seconds(eta.eta_seconds.round() as i64);
        ctx.store
            .put_stop_eta(&eta.stop_id, &outcome.bus_code, arrival.to_rfc3339())
            .await?;
    }
    ctx.store.publish_vehicle(&outcome).await?;

    Ok(Some(outcome.etas.len()))
}

/// History keys expire at 01:00 local the following calendar day.
fn history_expiry(now_local: DateTime<Tz>) -> i64 {
    let tz = now_local.timezone();
    (now_local.date_naive() + chrono::Days::new(1))
        .and_hms_opt(1, 0, 0)
        .and_then(|naive| naive.and_local_timezone(tz).earliest())
        .map(|expiry| expiry.timestamp())
        .unwrap_or_else(|| (now_local + Duration::days(1)).timestamp())
}
